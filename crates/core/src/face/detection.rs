use crate::emotion::{EmotionSample, EmotionSmoother, SmoothingPolicy};
use crate::face::{DetectorStatus, FaceError, FaceState, FaceTracker};
use std::future::Future;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

const LOG_TARGET: &str = "face::detection";

/// Cancellation handle for a running detection loop.
///
/// Dropping the handle cancels the loop as well; `stop` additionally waits
/// for the task (and the tracker it owns) to be released.
pub struct DetectionHandle {
    cancel: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl DetectionHandle {
    pub async fn stop(mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!(target: LOG_TARGET, error = %e, "detection task ended abnormally");
            }
        }
    }
}

pub struct DetectionLoop {
    pub frame_interval: Duration,
    pub smoothing: SmoothingPolicy,
}

impl DetectionLoop {
    pub fn new(frame_interval: Duration, smoothing: SmoothingPolicy) -> Self {
        Self {
            frame_interval,
            smoothing,
        }
    }

    /// Spawns the loop. The tracker is produced by `load`; a load failure
    /// leaves the state at `Unavailable` for the rest of the session.
    pub fn spawn<T, L>(self, load: L) -> (DetectionHandle, watch::Receiver<FaceState>)
    where
        T: FaceTracker + 'static,
        L: Future<Output = Result<T, FaceError>> + Send + 'static,
    {
        let (state_tx, state_rx) = watch::channel(FaceState::loading());
        let (cancel_tx, cancel_rx) = oneshot::channel();

        let task = tokio::spawn(async move {
            let tracker = match load.await {
                Ok(t) => t,
                Err(e) => {
                    tracing::error!(target: LOG_TARGET, error = %e, "face tracker unavailable; detection disabled");
                    state_tx.send_modify(|s| s.status = DetectorStatus::Unavailable);
                    return;
                }
            };
            tracing::info!(target: LOG_TARGET, "face tracker ready");
            self.run(tracker, state_tx, cancel_rx).await;
        });

        (
            DetectionHandle {
                cancel: Some(cancel_tx),
                task: Some(task),
            },
            state_rx,
        )
    }

    async fn run<T: FaceTracker>(
        self,
        mut tracker: T,
        state_tx: watch::Sender<FaceState>,
        mut cancel_rx: oneshot::Receiver<()>,
    ) {
        let started = Instant::now();
        let mut smoother = EmotionSmoother::new(self.smoothing);
        let mut ticker = tokio::time::interval(self.frame_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        state_tx.send_modify(|s| s.status = DetectorStatus::NoFace);

        loop {
            tokio::select! {
                _ = &mut cancel_rx => {
                    tracing::debug!(target: LOG_TARGET, "detection cancelled");
                    break;
                }
                _ = ticker.tick() => {
                    match tracker.detect(started.elapsed()) {
                        Ok(Some(frame)) => {
                            let sample = EmotionSample::from_blendshapes(&frame.blendshapes);
                            let emotion = smoother.push(sample.classify());
                            let percent = sample.display_percent(emotion);
                            state_tx.send_if_modified(|s| {
                                let next = FaceState {
                                    status: DetectorStatus::Tracking { emotion, percent },
                                    emotion,
                                    sample,
                                    landmarks: frame.landmarks,
                                };
                                if *s == next {
                                    return false;
                                }
                                *s = next;
                                true
                            });
                        }
                        Ok(None) => {
                            state_tx.send_if_modified(|s| {
                                if s.status == DetectorStatus::NoFace {
                                    return false;
                                }
                                s.status = DetectorStatus::NoFace;
                                true
                            });
                        }
                        Err(e) => {
                            tracing::warn!(target: LOG_TARGET, error = %e, "skipping frame");
                        }
                    }
                }
            }
        }
    }
}
