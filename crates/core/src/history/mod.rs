mod local;
mod remote;

use crate::chat::ChatTurn;
use crate::config::HistoryWindow;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinSet;

pub use local::LocalCache;
pub use remote::{
    PhysiognomyRecord, RemoteStore, StoreError, SupabaseStore, CHAT_TABLE, PHYSIOGNOMY_TABLE,
};

const LOG_TARGET: &str = "history";

#[derive(thiserror::Error, Debug)]
pub enum HistoryError {
    #[error("history cache io failed at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("history cache at {} is not valid json: {source}", .path.display())]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("history could not be encoded: {0}")]
    Encode(#[source] serde_json::Error),
}

/// The most recent `k` turns, oldest first.
pub fn context_window(turns: &[ChatTurn], k: usize) -> &[ChatTurn] {
    &turns[turns.len().saturating_sub(k)..]
}

/// Every turn of the conversation, mirrored to a local cache after each
/// append and copied to the remote store in the background.
///
/// Storage is unbounded; only the context handed to the chat client is cut
/// to the configured window.
pub struct HistoryStore {
    turns: Vec<ChatTurn>,
    window: HistoryWindow,
    local: Option<LocalCache>,
    remote: Option<Arc<dyn RemoteStore>>,
    pending: JoinSet<()>,
}

impl HistoryStore {
    /// A store that only lives in memory.
    pub fn in_memory(window: HistoryWindow) -> Self {
        Self {
            turns: Vec::new(),
            window,
            local: None,
            remote: None,
            pending: JoinSet::new(),
        }
    }

    /// Restores the log from the local cache. A cache that cannot be read
    /// is logged and the session starts empty.
    pub async fn open(
        window: HistoryWindow,
        local: Option<LocalCache>,
        remote: Option<Arc<dyn RemoteStore>>,
    ) -> Self {
        let turns = match &local {
            Some(cache) => match cache.load().await {
                Ok(turns) => {
                    tracing::info!(target: LOG_TARGET, turns = turns.len(), path = %cache.path().display(), "history restored");
                    turns
                }
                Err(e) => {
                    tracing::warn!(target: LOG_TARGET, error = %e, "ignoring unreadable history cache");
                    Vec::new()
                }
            },
            None => Vec::new(),
        };
        if remote.is_none() {
            tracing::info!(target: LOG_TARGET, "no remote store configured; history stays local");
        }
        Self {
            turns,
            window,
            local,
            remote,
            pending: JoinSet::new(),
        }
    }

    pub fn turns(&self) -> &[ChatTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn window(&self) -> HistoryWindow {
        self.window
    }

    /// What the chat client gets to see.
    pub fn context(&self) -> Vec<ChatTurn> {
        context_window(&self.turns, self.window.turns()).to_vec()
    }

    pub async fn append(&mut self, turn: ChatTurn) {
        self.turns.push(turn.clone());
        self.persist_locally().await;

        self.reap_finished();
        if let Some(remote) = &self.remote {
            let remote = Arc::clone(remote);
            self.pending.spawn(async move {
                if let Err(e) = remote.insert_turn(turn).await {
                    tracing::warn!(target: LOG_TARGET, error = %e, "remote history write failed");
                }
            });
        }
    }

    /// Face readings only go to the remote store.
    pub fn record_physiognomy(&mut self, record: PhysiognomyRecord) {
        let Some(remote) = &self.remote else {
            tracing::debug!(target: LOG_TARGET, "no remote store; face reading not recorded");
            return;
        };
        let remote = Arc::clone(remote);
        self.reap_finished();
        self.pending.spawn(async move {
            if let Err(e) = remote.insert_physiognomy(record).await {
                tracing::warn!(target: LOG_TARGET, error = %e, "remote physiognomy write failed");
            }
        });
    }

    /// Forgets every turn, locally and on disk. Remote rows are kept.
    pub async fn clear(&mut self) -> Result<(), HistoryError> {
        self.turns.clear();
        match &self.local {
            Some(cache) => cache.clear().await,
            None => Ok(()),
        }
    }

    /// Waits for background writes still in flight.
    pub async fn flush(&mut self) {
        let outstanding = self.pending.len();
        if outstanding > 0 {
            tracing::debug!(target: LOG_TARGET, outstanding, "waiting for remote writes");
        }
        while let Some(joined) = self.pending.join_next().await {
            if let Err(e) = joined {
                tracing::warn!(target: LOG_TARGET, error = %e, "remote write task ended abnormally");
            }
        }
    }

    /// Drops writes that already completed so a long session does not
    /// accumulate them until `flush`.
    fn reap_finished(&mut self) {
        while let Some(joined) = self.pending.try_join_next() {
            if let Err(e) = joined {
                tracing::warn!(target: LOG_TARGET, error = %e, "remote write task ended abnormally");
            }
        }
    }

    async fn persist_locally(&self) {
        let Some(cache) = &self.local else {
            return;
        };
        if let Err(e) = cache.save(&self.turns).await {
            tracing::warn!(target: LOG_TARGET, error = %e, "failed to update history cache");
        }
    }
}
