use crate::config::PiperConfig;
use crate::tts::{TtsAudio, TtsClient, TtsError, TtsRequest};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

const PIPER_SAMPLE_RATE: u32 = 22050;
const PIPER_CHANNELS: u16 = 1;
const WAV_HEADER_BYTES: usize = 44;

/// On-device synthesis through a Piper voice model. Runs without network,
/// which is why it sits at the end of the chain.
#[derive(Clone, Debug)]
pub struct PiperTtsClient {
    config: PiperConfig,
}

impl PiperTtsClient {
    #[must_use]
    pub fn new(config: PiperConfig) -> Self {
        Self { config }
    }
}

/// Piper writes raw s16le; some builds prefix a WAV header anyway.
fn pcm_from_output(raw: &[u8]) -> Vec<i16> {
    let body = if raw.len() > WAV_HEADER_BYTES && &raw[..4] == b"RIFF" {
        &raw[WAV_HEADER_BYTES..]
    } else {
        raw
    };
    body.chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

impl TtsClient for PiperTtsClient {
    fn name(&self) -> &str {
        "piper"
    }

    fn synthesize(&self, request: TtsRequest) -> BoxFuture<'_, Result<TtsAudio, TtsError>> {
        async move {
            let mut child = Command::new(&self.config.binary)
                .arg("--model")
                .arg(&self.config.model)
                .arg("--output_raw")
                .stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .spawn()
                .map_err(|e| {
                    TtsError::Other(format!(
                        "failed to spawn piper at {}: {e}",
                        self.config.binary.display()
                    ))
                })?;

            let mut stdin = child
                .stdin
                .take()
                .ok_or_else(|| TtsError::Other("piper stdin unavailable".into()))?;
            stdin
                .write_all(request.text.as_bytes())
                .await
                .map_err(|e| TtsError::Other(format!("piper stdin write failed: {e}")))?;
            drop(stdin);

            let output = child
                .wait_with_output()
                .await
                .map_err(|e| TtsError::Other(format!("piper process failed: {e}")))?;

            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                return Err(TtsError::Other(format!(
                    "piper exited with {}: {stderr}",
                    output.status
                )));
            }

            let pcm_i16 = pcm_from_output(&output.stdout);
            if pcm_i16.is_empty() {
                return Err(TtsError::Other("piper produced no audio".into()));
            }

            Ok(TtsAudio {
                sample_rate_hz: PIPER_SAMPLE_RATE,
                channels: PIPER_CHANNELS,
                pcm_i16,
            })
        }
        .boxed()
    }
}
