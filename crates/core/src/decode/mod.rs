use crate::tts::TtsAudio;
use std::io::Cursor;
use std::time::Duration;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

const LOG_TARGET: &str = "decode";

#[derive(thiserror::Error, Debug)]
pub enum DecodeError {
    #[error("unrecognised audio container: {0}")]
    Probe(String),

    #[error("audio stream has no default track")]
    NoTrack,

    #[error("audio stream does not declare a sample rate")]
    UnknownSampleRate,

    #[error("no decoder for audio codec: {0}")]
    Codec(String),

    #[error("audio stream read failed: {0}")]
    Read(String),

    #[error("audio stream decoded to zero samples")]
    Empty,
}

pub type Result<T> = std::result::Result<T, DecodeError>;

/// Decodes a compressed clip (mp3 from the cloud voices) into interleaved
/// 16-bit PCM ready for playback.
pub fn decode_audio(bytes: &[u8], extension_hint: Option<&str>) -> Result<TtsAudio> {
    let source = Cursor::new(bytes.to_vec());
    let mss = MediaSourceStream::new(Box::new(source), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = extension_hint {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| DecodeError::Probe(e.to_string()))?;

    let mut format = probed.format;
    let track = format.default_track().ok_or(DecodeError::NoTrack)?;
    let track_id = track.id;
    let codec_params = track.codec_params.clone();
    let sample_rate_hz = codec_params
        .sample_rate
        .ok_or(DecodeError::UnknownSampleRate)?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| DecodeError::Codec(e.to_string()))?;

    let mut pcm_i16: Vec<i16> = Vec::new();
    let mut channels: u16 = codec_params
        .channels
        .map(|c| c.count() as u16)
        .unwrap_or(1);
    let mut sample_buf: Option<SampleBuffer<i16>> = None;
    let mut skipped = 0usize;

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(e) => return Err(DecodeError::Read(e.to_string())),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(SymphoniaError::DecodeError(_)) => {
                skipped += 1;
                continue;
            }
            Err(e) => return Err(DecodeError::Read(e.to_string())),
        };

        let spec = *decoded.spec();
        channels = spec.channels.count() as u16;
        let frames = decoded.capacity() as u64;
        let needs_new = sample_buf
            .as_ref()
            .map(|b| b.capacity() < decoded.capacity() * spec.channels.count())
            .unwrap_or(true);
        if needs_new {
            sample_buf = Some(SampleBuffer::<i16>::new(frames, spec));
        }
        if let Some(buf) = sample_buf.as_mut() {
            buf.copy_interleaved_ref(decoded);
            pcm_i16.extend_from_slice(buf.samples());
        }
    }

    if skipped > 0 {
        tracing::debug!(target: LOG_TARGET, skipped, "skipped corrupt audio packets");
    }
    if pcm_i16.is_empty() {
        return Err(DecodeError::Empty);
    }

    Ok(TtsAudio {
        sample_rate_hz,
        channels: channels.max(1),
        pcm_i16,
    })
}

/// Playback length of an interleaved clip.
pub fn duration_from_sample_count(
    sample_rate_hz: u32,
    channels: u16,
    sample_count: usize,
) -> Duration {
    if sample_rate_hz == 0 || channels == 0 {
        return Duration::from_secs(0);
    }
    let frames = (sample_count / usize::from(channels)) as u128;
    let micros = frames * 1_000_000u128 / u128::from(sample_rate_hz);
    Duration::from_micros(micros.min(u128::from(u64::MAX)) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn garbage_bytes_fail_to_probe() {
        let err = decode_audio(b"definitely not an mp3 stream", Some("mp3")).unwrap_err();
        assert!(matches!(err, DecodeError::Probe(_)), "got {err:?}");
    }

    #[test]
    fn empty_input_is_an_error() {
        assert!(decode_audio(&[], None).is_err());
    }

    #[test]
    fn duration_counts_frames_not_samples() {
        assert_eq!(duration_from_sample_count(22_050, 1, 22_050).as_secs(), 1);
        assert_eq!(
            duration_from_sample_count(24_000, 2, 24_000),
            Duration::from_millis(500)
        );
        assert_eq!(duration_from_sample_count(0, 1, 100), Duration::ZERO);
    }
}
