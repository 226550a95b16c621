//! Face-reading features for the physiognomy persona.
//!
//! Two ratios are measured from face-mesh landmarks. Both divide one
//! distance by another, so they do not depend on image resolution or on how
//! far the face is from the camera.

mod classifier;

use crate::face::Landmark;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use classifier::{rank, AnimalClassifier, AnimalMatch, ClassifierError, HttpImageClassifier};

pub const FOREHEAD_TOP: usize = 10;
pub const LEFT_EYE_LOWER: usize = 145;
pub const CHIN: usize = 152;
pub const LEFT_EYE_UPPER: usize = 159;
pub const BROW_CENTER: usize = 168;
pub const FACE_LEFT_EDGE: usize = 234;
pub const RIGHT_EYE_LOWER: usize = 374;
pub const RIGHT_EYE_UPPER: usize = 386;
pub const FACE_RIGHT_EDGE: usize = 454;

pub const EYE_RATIO_THRESHOLD: f64 = 0.06;
pub const FOREHEAD_RATIO_THRESHOLD: f64 = 0.3;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum PhysiognomyError {
    #[error("landmark {0} missing (got {1} points)")]
    MissingLandmark(usize, usize),

    #[error("degenerate face geometry: {0} is zero")]
    Degenerate(&'static str),
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EyeSize {
    Large,
    Small,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ForeheadSize {
    Wide,
    Narrow,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct FaceGeometry {
    pub eye_ratio: f64,
    pub forehead_ratio: f64,
}

impl FaceGeometry {
    pub fn measure(landmarks: &[Landmark]) -> Result<Self, PhysiognomyError> {
        let point = |idx: usize| {
            landmarks
                .get(idx)
                .ok_or(PhysiognomyError::MissingLandmark(idx, landmarks.len()))
        };

        let left_eye = point(LEFT_EYE_UPPER)?.distance(point(LEFT_EYE_LOWER)?);
        let right_eye = point(RIGHT_EYE_UPPER)?.distance(point(RIGHT_EYE_LOWER)?);
        let face_width = point(FACE_LEFT_EDGE)?.distance(point(FACE_RIGHT_EDGE)?);
        let forehead = point(FOREHEAD_TOP)?.distance(point(BROW_CENTER)?);
        let face_height = point(FOREHEAD_TOP)?.distance(point(CHIN)?);

        if face_width == 0.0 {
            return Err(PhysiognomyError::Degenerate("face width"));
        }
        if face_height == 0.0 {
            return Err(PhysiognomyError::Degenerate("face height"));
        }

        Ok(Self {
            eye_ratio: (left_eye + right_eye) / (2.0 * face_width),
            forehead_ratio: forehead / face_height,
        })
    }

    pub fn eyes(&self) -> EyeSize {
        if self.eye_ratio > EYE_RATIO_THRESHOLD {
            EyeSize::Large
        } else {
            EyeSize::Small
        }
    }

    pub fn forehead(&self) -> ForeheadSize {
        if self.forehead_ratio > FOREHEAD_RATIO_THRESHOLD {
            ForeheadSize::Wide
        } else {
            ForeheadSize::Narrow
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PhysiognomyFeatures {
    pub eye_ratio: f64,
    pub forehead_ratio: f64,
    pub eyes: EyeSize,
    pub forehead: ForeheadSize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub animal: Option<AnimalMatch>,
}

impl PhysiognomyFeatures {
    pub fn from_landmarks(landmarks: &[Landmark]) -> Result<Self, PhysiognomyError> {
        let geometry = FaceGeometry::measure(landmarks)?;
        Ok(Self {
            eye_ratio: geometry.eye_ratio,
            forehead_ratio: geometry.forehead_ratio,
            eyes: geometry.eyes(),
            forehead: geometry.forehead(),
            animal: None,
        })
    }

    pub fn with_animal(mut self, animal: Option<AnimalMatch>) -> Self {
        self.animal = animal;
        self
    }

    /// User message handed to the face-reading persona.
    pub fn describe(&self) -> String {
        let mut out = format!(
            "내 얼굴 특징: 눈은 {} (비율 {:.3}), 이마는 {} (비율 {:.3}).",
            match self.eyes {
                EyeSize::Large => "큰 편",
                EyeSize::Small => "작은 편",
            },
            self.eye_ratio,
            match self.forehead {
                ForeheadSize::Wide => "넓은 편",
                ForeheadSize::Narrow => "좁은 편",
            },
            self.forehead_ratio,
        );
        if let Some(animal) = &self.animal {
            out.push_str(&format!(" 닮은 동물: {animal}."));
        }
        out.push_str(" 내 관상을 봐줘!");
        out
    }
}

impl fmt::Display for PhysiognomyFeatures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "eyes={:?} ({:.3}) forehead={:?} ({:.3})",
            self.eyes, self.eye_ratio, self.forehead, self.forehead_ratio
        )?;
        if let Some(animal) = &self.animal {
            write!(f, " animal={animal}")?;
        }
        Ok(())
    }
}
