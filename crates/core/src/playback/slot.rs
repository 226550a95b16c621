use std::sync::{Arc, Mutex, MutexGuard};

const LOG_TARGET: &str = "playback::slot";

/// Something that is currently producing sound and can be cut off.
pub(crate) trait ClipHandle: Send + Sync {
    fn stop(&self);
}

/// Holds the one clip allowed to play at a time.
///
/// Installing a new handle stops and releases the previous one. A finished
/// clip only clears the slot if it is still the one installed.
pub(crate) struct ClipSlot<H> {
    current: Mutex<Option<Arc<H>>>,
}

impl<H: ClipHandle> ClipSlot<H> {
    pub(crate) fn new() -> Self {
        Self {
            current: Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Arc<H>>> {
        match self.current.lock() {
            Ok(g) => g,
            Err(poisoned) => {
                tracing::warn!(target: LOG_TARGET, "clip slot lock was poisoned; recovering");
                poisoned.into_inner()
            }
        }
    }

    pub(crate) fn install(&self, next: Arc<H>) {
        let previous = self.lock().replace(next);
        if let Some(previous) = previous {
            tracing::debug!(target: LOG_TARGET, "cutting off the previous clip");
            previous.stop();
        }
    }

    pub(crate) fn release(&self, finished: &Arc<H>) {
        let mut current = self.lock();
        if current.as_ref().is_some_and(|c| Arc::ptr_eq(c, finished)) {
            *current = None;
        }
    }

    pub(crate) fn stop(&self) {
        let current = self.lock().take();
        if let Some(current) = current {
            current.stop();
        }
    }

    #[cfg(test)]
    fn is_occupied(&self) -> bool {
        self.lock().is_some()
    }
}
