use crate::decode::duration_from_sample_count;
use crate::playback::{validate_clip, PlaybackError, PlaybackSink};
use crate::tts::TtsAudio;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::sync::atomic::{AtomicUsize, Ordering};

const LOG_TARGET: &str = "playback::mute";

/// Accepts every clip without touching an audio device. Used with `--mute`
/// and on machines that have no output.
#[derive(Debug, Default)]
pub struct MutePlayback {
    played: AtomicUsize,
}

impl MutePlayback {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of clips accepted so far.
    pub fn played(&self) -> usize {
        self.played.load(Ordering::Relaxed)
    }
}

impl PlaybackSink for MutePlayback {
    fn play(&self, audio: TtsAudio) -> BoxFuture<'_, Result<(), PlaybackError>> {
        async move {
            validate_clip(&audio)?;
            let length =
                duration_from_sample_count(audio.sample_rate_hz, audio.channels, audio.pcm_i16.len());
            tracing::debug!(target: LOG_TARGET, length_ms = length.as_millis() as u64, "discarding clip");
            self.played.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }
        .boxed()
    }

    fn stop(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn counts_accepted_clips() {
        let sink = MutePlayback::new();
        let clip = TtsAudio {
            sample_rate_hz: 22_050,
            channels: 1,
            pcm_i16: vec![0; 64],
        };
        sink.play(clip.clone()).await.unwrap();
        sink.play(clip).await.unwrap();
        assert_eq!(sink.played(), 2);
    }

    #[tokio::test]
    async fn invalid_clip_is_an_error() {
        let sink = MutePlayback::new();
        let clip = TtsAudio {
            sample_rate_hz: 0,
            channels: 1,
            pcm_i16: vec![0; 4],
        };
        assert!(sink.play(clip).await.is_err());
        assert_eq!(sink.played(), 0);
    }
}
