#[cfg(feature = "rodio")]
mod speaker;
mod mute;
#[cfg(any(feature = "rodio", test))]
mod slot;

use crate::tts::TtsAudio;
use futures::future::BoxFuture;

pub use mute::MutePlayback;
#[cfg(feature = "rodio")]
pub use speaker::SpeakerPlayback;
#[cfg(feature = "playback-device-enum")]
pub use speaker::output_device_names;

#[derive(thiserror::Error, Debug)]
pub enum PlaybackError {
    #[error("audio output unavailable: {details}")]
    AudioOutputUnavailable { details: String },

    #[error("clip rejected: {0}")]
    InvalidClip(String),

    #[error("playback interrupted")]
    Interrupted,
}

/// The single output shared by every voice in the app. Starting a new clip
/// cuts off the one already playing.
pub trait PlaybackSink: Send + Sync {
    /// Resolves once the clip has finished or was stopped.
    fn play(&self, audio: TtsAudio) -> BoxFuture<'_, Result<(), PlaybackError>>;
    fn stop(&self);
}

/// Rejects clips that cannot be rendered.
pub(crate) fn validate_clip(audio: &TtsAudio) -> Result<(), PlaybackError> {
    if audio.sample_rate_hz == 0 || audio.channels == 0 {
        return Err(PlaybackError::InvalidClip(format!(
            "sample_rate_hz={} channels={}",
            audio.sample_rate_hz, audio.channels
        )));
    }
    if audio.pcm_i16.is_empty() {
        return Err(PlaybackError::InvalidClip("no samples".into()));
    }
    if audio.pcm_i16.len() % usize::from(audio.channels) != 0 {
        return Err(PlaybackError::InvalidClip(format!(
            "{} samples do not divide into {} channels",
            audio.pcm_i16.len(),
            audio.channels
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clip(rate: u32, channels: u16, n: usize) -> TtsAudio {
        TtsAudio {
            sample_rate_hz: rate,
            channels,
            pcm_i16: vec![0; n],
        }
    }

    #[test]
    fn well_formed_clip_passes() {
        assert!(validate_clip(&clip(22_050, 1, 10)).is_ok());
        assert!(validate_clip(&clip(44_100, 2, 10)).is_ok());
    }

    #[test]
    fn broken_clips_are_rejected() {
        assert!(matches!(
            validate_clip(&clip(0, 1, 10)),
            Err(PlaybackError::InvalidClip(_))
        ));
        assert!(validate_clip(&clip(22_050, 1, 0)).is_err());
        assert!(validate_clip(&clip(22_050, 2, 3)).is_err());
    }
}
