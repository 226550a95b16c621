mod detection;
mod recorded;

use crate::emotion::{Emotion, EmotionSample};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

pub use detection::{DetectionHandle, DetectionLoop};
pub use recorded::RecordedFaceTracker;

pub const MOUTH_SMILE_LEFT: &str = "mouthSmileLeft";
pub const MOUTH_SMILE_RIGHT: &str = "mouthSmileRight";
pub const MOUTH_FROWN_LEFT: &str = "mouthFrownLeft";
pub const MOUTH_FROWN_RIGHT: &str = "mouthFrownRight";

/// Named expression intensities reported by the tracker for one face.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct Blendshapes {
    scores: BTreeMap<String, f32>,
}

impl Blendshapes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, score: f32) -> Self {
        self.scores.insert(name.to_owned(), score);
        self
    }

    /// Missing categories read as zero intensity.
    pub fn score(&self, name: &str) -> f32 {
        self.scores.get(name).copied().unwrap_or(0.0)
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, f32)> for Blendshapes {
    fn from_iter<I: IntoIterator<Item = (S, f32)>>(iter: I) -> Self {
        Self {
            scores: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Landmark {
    pub x: f64,
    pub y: f64,
}

impl Landmark {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Landmark) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct FaceFrame {
    pub blendshapes: Blendshapes,
    #[serde(default)]
    pub landmarks: Vec<Landmark>,
}

#[derive(thiserror::Error, Debug)]
pub enum FaceError {
    #[error("face tracker failed to load: {0}")]
    LoadFailed(String),

    #[error("face detection failed: {0}")]
    DetectionFailed(String),
}

/// A face landmark/blendshape provider bound to its frame source.
///
/// `Ok(None)` means the frame was processed and no face was found.
pub trait FaceTracker: Send {
    fn detect(&mut self, timestamp: Duration) -> Result<Option<FaceFrame>, FaceError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DetectorStatus {
    Loading,
    Unavailable,
    NoFace,
    Tracking { emotion: Emotion, percent: u8 },
}

impl fmt::Display for DetectorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetectorStatus::Loading => f.write_str("model loading"),
            DetectorStatus::Unavailable => f.write_str("face tracking unavailable"),
            DetectorStatus::NoFace => f.write_str("show your face"),
            DetectorStatus::Tracking { emotion, percent } => {
                write!(f, "{} / {percent}%", emotion.title())
            }
        }
    }
}

/// Latest detection result, published on a watch channel.
#[derive(Clone, Debug, PartialEq)]
pub struct FaceState {
    pub status: DetectorStatus,
    pub emotion: Emotion,
    pub sample: EmotionSample,
    pub landmarks: Vec<Landmark>,
}

impl FaceState {
    pub fn loading() -> Self {
        Self {
            status: DetectorStatus::Loading,
            ..Self::inactive()
        }
    }

    /// State used when no tracker is configured at all.
    pub fn inactive() -> Self {
        Self {
            status: DetectorStatus::Unavailable,
            emotion: Emotion::Neutral,
            sample: EmotionSample::default(),
            landmarks: Vec::new(),
        }
    }

    pub fn is_face_detected(&self) -> bool {
        matches!(self.status, DetectorStatus::Tracking { .. })
    }
}
