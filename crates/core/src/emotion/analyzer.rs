use crate::emotion::Emotion;
use crate::face::{
    Blendshapes, MOUTH_FROWN_LEFT, MOUTH_FROWN_RIGHT, MOUTH_SMILE_LEFT, MOUTH_SMILE_RIGHT,
};
use serde::{Deserialize, Serialize};

/// Averaged intensity above which a smile (or frown) counts. Strict.
pub const EMOTION_THRESHOLD: f32 = 0.25;

/// Left/right averaged mouth scores for one frame.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct EmotionSample {
    pub smile: f32,
    pub frown: f32,
}

impl EmotionSample {
    pub fn new(smile: f32, frown: f32) -> Self {
        Self { smile, frown }
    }

    pub fn from_blendshapes(shapes: &Blendshapes) -> Self {
        Self {
            smile: (shapes.score(MOUTH_SMILE_LEFT) + shapes.score(MOUTH_SMILE_RIGHT)) / 2.0,
            frown: (shapes.score(MOUTH_FROWN_LEFT) + shapes.score(MOUTH_FROWN_RIGHT)) / 2.0,
        }
    }

    pub fn classify(&self) -> Emotion {
        classify(self.smile, self.frown)
    }

    /// Confidence shown next to the label. Presentation only; the label
    /// never depends on it.
    pub fn display_percent(&self, emotion: Emotion) -> u8 {
        let score = match emotion {
            Emotion::Neutral => (1.0 - (self.smile + self.frown)).max(0.0),
            Emotion::Happy => self.smile,
            Emotion::Sad => self.frown,
        };
        (score * 100.0).round().clamp(0.0, 100.0) as u8
    }
}

/// Smile is checked before frown, so a face that is both smiling and
/// frowning past the threshold reads as happy.
pub fn classify(avg_smile: f32, avg_frown: f32) -> Emotion {
    if avg_smile > EMOTION_THRESHOLD {
        Emotion::Happy
    } else if avg_frown > EMOTION_THRESHOLD {
        Emotion::Sad
    } else {
        Emotion::Neutral
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn smile_wins_over_frown() {
        assert_eq!(classify(0.3, 0.9), Emotion::Happy);
        assert_eq!(classify(0.2, 0.9), Emotion::Sad);
        assert_eq!(classify(0.1, 0.05), Emotion::Neutral);
    }

    #[test]
    fn threshold_is_strict() {
        assert_eq!(classify(0.25, 0.0), Emotion::Neutral);
        assert_eq!(classify(0.250_000_1, 0.0), Emotion::Happy);
        assert_eq!(classify(0.0, 0.25), Emotion::Neutral);
        assert_eq!(classify(0.0, 0.250_000_1), Emotion::Sad);
    }

    #[test]
    fn exactly_one_label_over_a_grid() {
        for i in 0..=20 {
            for j in 0..=20 {
                let smile = i as f32 / 20.0;
                let frown = j as f32 / 20.0;
                let label = classify(smile, frown);
                let expected = if smile > EMOTION_THRESHOLD {
                    Emotion::Happy
                } else if frown > EMOTION_THRESHOLD {
                    Emotion::Sad
                } else {
                    Emotion::Neutral
                };
                assert_eq!(label, expected, "smile={smile} frown={frown}");
            }
        }
    }

    #[test]
    fn averages_left_and_right() {
        let shapes = Blendshapes::new()
            .with(MOUTH_SMILE_LEFT, 0.4)
            .with(MOUTH_SMILE_RIGHT, 0.2)
            .with(MOUTH_FROWN_LEFT, 0.1)
            .with("jawOpen", 0.9);
        let sample = EmotionSample::from_blendshapes(&shapes);
        assert!((sample.smile - 0.3).abs() < 1e-6);
        assert!((sample.frown - 0.05).abs() < 1e-6);
        assert_eq!(sample.classify(), Emotion::Happy);
    }

    #[test]
    fn one_sided_smile_can_stay_neutral() {
        let shapes = Blendshapes::new().with(MOUTH_SMILE_LEFT, 0.45);
        assert_eq!(EmotionSample::from_blendshapes(&shapes).classify(), Emotion::Neutral);
    }

    #[test]
    fn display_percent_per_label() {
        let neutral = EmotionSample::new(0.1, 0.05);
        assert_eq!(neutral.display_percent(Emotion::Neutral), 85);

        let happy = EmotionSample::new(0.62, 0.0);
        assert_eq!(happy.display_percent(Emotion::Happy), 62);

        let sad = EmotionSample::new(0.0, 0.3);
        assert_eq!(sad.display_percent(Emotion::Sad), 30);

        let saturated = EmotionSample::new(0.7, 0.6);
        assert_eq!(saturated.display_percent(Emotion::Neutral), 0);
    }
}
