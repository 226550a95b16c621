use crate::face::{FaceError, FaceFrame, FaceTracker};
use std::path::Path;
use std::time::Duration;

/// Replays tracker output captured as JSON lines, one frame per line.
///
/// A `null` line is a frame without a face. Playback loops at the end so the
/// replay behaves like a live camera for the length of a session.
#[derive(Clone, Debug)]
pub struct RecordedFaceTracker {
    frames: Vec<Option<FaceFrame>>,
    cursor: usize,
}

impl RecordedFaceTracker {
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, FaceError> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
            FaceError::LoadFailed(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<Self, FaceError> {
        let mut frames = Vec::new();
        for (idx, line) in raw.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let frame: Option<FaceFrame> = serde_json::from_str(line).map_err(|e| {
                FaceError::LoadFailed(format!("line {}: {e}", idx + 1))
            })?;
            frames.push(frame);
        }
        if frames.is_empty() {
            return Err(FaceError::LoadFailed("recording has no frames".into()));
        }
        Ok(Self { frames, cursor: 0 })
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl FaceTracker for RecordedFaceTracker {
    fn detect(&mut self, _timestamp: Duration) -> Result<Option<FaceFrame>, FaceError> {
        let frame = self.frames[self.cursor].clone();
        self.cursor = (self.cursor + 1) % self.frames.len();
        Ok(frame)
    }
}
