use crate::emotion::Emotion;
use crate::util::RingBuffer;
use serde::{Deserialize, Serialize};

/// Temporal smoothing of per-frame labels.
///
/// `Off` reports every frame's raw label, which flickers when a score hovers
/// around the threshold. Majority voting trades that flicker for a delay of
/// up to half the window.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum SmoothingPolicy {
    #[default]
    Off,
    MajorityVote { window: usize },
}

impl SmoothingPolicy {
    /// A window of 0 or 1 is the same as no smoothing.
    pub fn from_window(window: usize) -> Self {
        if window <= 1 {
            Self::Off
        } else {
            Self::MajorityVote { window }
        }
    }
}

#[derive(Clone, Debug)]
pub struct EmotionSmoother {
    recent: Option<RingBuffer<Emotion>>,
}

impl EmotionSmoother {
    pub fn new(policy: SmoothingPolicy) -> Self {
        let recent = match policy {
            SmoothingPolicy::Off => None,
            SmoothingPolicy::MajorityVote { window } => Some(RingBuffer::new(window.max(1))),
        };
        Self { recent }
    }

    pub fn push(&mut self, raw: Emotion) -> Emotion {
        let Some(recent) = self.recent.as_mut() else {
            return raw;
        };
        recent.push(raw);

        let mut counts = [(Emotion::Neutral, 0usize), (Emotion::Happy, 0), (Emotion::Sad, 0)];
        for label in recent.iter() {
            if let Some(slot) = counts.iter_mut().find(|(e, _)| e == label) {
                slot.1 += 1;
            }
        }
        let best = counts.iter().map(|(_, n)| *n).max().unwrap_or(0);
        // Ties go to the newest label so a fresh change is not held back
        // longer than necessary.
        if counts.iter().any(|(e, n)| *e == raw && *n == best) {
            return raw;
        }
        counts
            .iter()
            .find(|(_, n)| *n == best)
            .map(|(e, _)| *e)
            .unwrap_or(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn off_passes_raw_labels_through() {
        let mut s = EmotionSmoother::new(SmoothingPolicy::Off);
        assert_eq!(s.push(Emotion::Happy), Emotion::Happy);
        assert_eq!(s.push(Emotion::Neutral), Emotion::Neutral);
        assert_eq!(s.push(Emotion::Happy), Emotion::Happy);
    }

    #[test]
    fn majority_vote_suppresses_single_frame_flicker() {
        let mut s = EmotionSmoother::new(SmoothingPolicy::MajorityVote { window: 5 });
        for _ in 0..4 {
            s.push(Emotion::Neutral);
        }
        assert_eq!(s.push(Emotion::Happy), Emotion::Neutral);
        assert_eq!(s.push(Emotion::Neutral), Emotion::Neutral);
    }

    #[test]
    fn majority_vote_follows_sustained_change() {
        let mut s = EmotionSmoother::new(SmoothingPolicy::MajorityVote { window: 3 });
        s.push(Emotion::Neutral);
        s.push(Emotion::Neutral);
        assert_eq!(s.push(Emotion::Sad), Emotion::Neutral);
        assert_eq!(s.push(Emotion::Sad), Emotion::Sad);
    }

    #[test]
    fn small_windows_disable_smoothing() {
        assert_eq!(SmoothingPolicy::from_window(0), SmoothingPolicy::Off);
        assert_eq!(SmoothingPolicy::from_window(1), SmoothingPolicy::Off);
        assert_eq!(
            SmoothingPolicy::from_window(7),
            SmoothingPolicy::MajorityVote { window: 7 }
        );
    }
}
