use crate::playback::slot::{ClipHandle, ClipSlot};
use crate::playback::{validate_clip, PlaybackError, PlaybackSink};
use crate::tts::TtsAudio;
use futures::future::BoxFuture;
use futures::FutureExt;
use rodio::cpal::traits::{DeviceTrait, HostTrait};
use rodio::source::Source;
use rodio::{OutputStream, OutputStreamBuilder, Sink, StreamError};
use std::sync::{Arc, Mutex, MutexGuard};

const LOG_TARGET: &str = "playback::speaker";

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    match m.lock() {
        Ok(g) => g,
        Err(poisoned) => {
            tracing::warn!(target: LOG_TARGET, "playback lock was poisoned; recovering");
            poisoned.into_inner()
        }
    }
}

/// Plays clips on a real output device through rodio.
///
/// The [`OutputStream`] is opened on first use and kept for the life of the
/// sink; dropping it silences everything routed through it. Only one
/// [`Sink`] is live at a time.
pub struct SpeakerPlayback {
    output_device_name: Option<String>,
    stream: Mutex<Option<OutputStream>>,
    current: ClipSlot<Sink>,
}

impl ClipHandle for Sink {
    fn stop(&self) {
        Sink::stop(self);
    }
}

impl SpeakerPlayback {
    pub fn new() -> Self {
        Self {
            output_device_name: None,
            stream: Mutex::new(None),
            current: ClipSlot::new(),
        }
    }

    pub fn with_output_device_name(mut self, name: impl Into<String>) -> Self {
        self.output_device_name = Some(name.into());
        self
    }

    fn open_stream(&self) -> Result<OutputStream, PlaybackError> {
        tracing::debug!(
            target: LOG_TARGET,
            device = %self.output_device_name.as_deref().unwrap_or("<default>"),
            "opening output stream"
        );
        if let Some(wanted) = self.output_device_name.as_deref() {
            match open_named_stream(wanted) {
                Ok(stream) => return Ok(stream),
                Err(reason) => {
                    tracing::warn!(
                        target: LOG_TARGET,
                        wanted_device = %wanted,
                        reason = %reason,
                        "configured output device unusable; falling back to default"
                    );
                }
            }
        }
        OutputStreamBuilder::open_default_stream().map_err(|e| unavailable(e, "open default output stream"))
    }

    /// Replaces the live sink with a fresh one, stopping whatever it was playing.
    fn fresh_sink(&self) -> Result<Arc<Sink>, PlaybackError> {
        let mut stream = lock(&self.stream);
        if stream.is_none() {
            *stream = Some(self.open_stream()?);
        }
        let Some(stream) = stream.as_ref() else {
            return Err(PlaybackError::AudioOutputUnavailable {
                details: "output stream missing after open".into(),
            });
        };
        let sink = Arc::new(Sink::connect_new(stream.mixer()));
        self.current.install(Arc::clone(&sink));
        Ok(sink)
    }
}

impl Default for SpeakerPlayback {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackSink for SpeakerPlayback {
    fn play(&self, audio: TtsAudio) -> BoxFuture<'_, Result<(), PlaybackError>> {
        async move {
            validate_clip(&audio)?;
            let sink = self.fresh_sink()?;
            sink.append(PcmSource::new(audio.pcm_i16, audio.sample_rate_hz, audio.channels));

            let waiting = Arc::clone(&sink);
            tokio::task::spawn_blocking(move || waiting.sleep_until_end())
                .await
                .map_err(|_| PlaybackError::Interrupted)?;

            self.current.release(&sink);
            Ok(())
        }
        .boxed()
    }

    fn stop(&self) {
        self.current.stop();
    }
}

fn unavailable(err: StreamError, context: &str) -> PlaybackError {
    let mut details = format!("{context}: {err}");
    #[cfg(feature = "playback-device-enum")]
    if let Ok(names) = output_device_names() {
        details.push_str("; available_output_devices=");
        details.push_str(&if names.is_empty() {
            "<none>".to_owned()
        } else {
            names.join(", ")
        });
    }
    PlaybackError::AudioOutputUnavailable { details }
}

fn normalize_device_name(s: &str) -> String {
    s.trim().to_ascii_lowercase()
}

fn open_named_stream(wanted: &str) -> Result<OutputStream, String> {
    let wanted_norm = normalize_device_name(wanted);
    let host = rodio::cpal::default_host();
    let devices = host.output_devices().map_err(|e| e.to_string())?;

    let device = devices
        .into_iter()
        .find(|d| d.name().map(|n| normalize_device_name(&n) == wanted_norm).unwrap_or(false))
        .ok_or_else(|| "device not found".to_owned())?;

    OutputStreamBuilder::from_device(device)
        .and_then(|b| b.open_stream_or_fallback())
        .map_err(|e| e.to_string())
}

#[cfg(feature = "playback-device-enum")]
pub fn output_device_names() -> Result<Vec<String>, PlaybackError> {
    let host = rodio::cpal::default_host();
    let devices = host
        .output_devices()
        .map_err(|e| PlaybackError::AudioOutputUnavailable {
            details: format!("failed to list output devices: {e}"),
        })?;
    Ok(devices
        .map(|d| d.name().unwrap_or_else(|_| "<unnamed>".to_owned()))
        .collect())
}

struct PcmSource {
    samples: std::vec::IntoIter<i16>,
    sample_rate: u32,
    channels: u16,
}

impl PcmSource {
    fn new(samples: Vec<i16>, sample_rate: u32, channels: u16) -> Self {
        Self {
            samples: samples.into_iter(),
            sample_rate,
            channels,
        }
    }
}

impl Iterator for PcmSource {
    type Item = f32;

    fn next(&mut self) -> Option<Self::Item> {
        self.samples.next().map(|s| f32::from(s) / f32::from(i16::MAX))
    }
}

impl Source for PcmSource {
    fn current_span_len(&self) -> Option<usize> {
        None
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn total_duration(&self) -> Option<std::time::Duration> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_names_compare_loosely() {
        assert_eq!(normalize_device_name("  Speakers  "), "speakers");
        assert_eq!(normalize_device_name("HeAdPhOnEs"), "headphones");
    }

    #[test]
    fn pcm_source_scales_to_unit_range() {
        let source = PcmSource::new(vec![0, i16::MAX, -i16::MAX], 22_050, 1);
        assert_eq!(source.channels(), 1);
        assert_eq!(source.sample_rate(), 22_050);
        let samples: Vec<f32> = source.collect();
        assert_eq!(samples, vec![0.0, 1.0, -1.0]);
    }

    #[test]
    fn stop_without_playback_is_harmless() {
        let speaker = SpeakerPlayback::new();
        speaker.stop();
        speaker.stop();
    }
}
