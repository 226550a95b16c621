use crate::chat::ChatTurn;
use crate::config::history_cache_path;
use crate::history::HistoryError;
use std::path::{Path, PathBuf};

/// The full turn log as one JSON array on disk, keyed by file name.
#[derive(Clone, Debug)]
pub struct LocalCache {
    path: PathBuf,
}

impl LocalCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Cache file inside the application data directory.
    pub fn in_data_dir(data_dir: &Path) -> Self {
        Self::new(history_cache_path(data_dir))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A cache that was never written is an empty history.
    pub async fn load(&self) -> Result<Vec<ChatTurn>, HistoryError> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(HistoryError::Io { path: self.path.clone(), source: e }),
        };
        serde_json::from_slice(&raw).map_err(|e| HistoryError::Corrupt { path: self.path.clone(), source: e })
    }

    /// Writes to a sibling temp file and renames it over the cache, so a
    /// crash mid-write leaves the previous log intact.
    pub async fn save(&self, turns: &[ChatTurn]) -> Result<(), HistoryError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| HistoryError::Io { path: parent.to_path_buf(), source: e })?;
        }
        let json = serde_json::to_vec_pretty(turns).map_err(HistoryError::Encode)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| HistoryError::Io { path: tmp.clone(), source: e })?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| HistoryError::Io { path: self.path.clone(), source: e })
    }

    pub async fn clear(&self) -> Result<(), HistoryError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(HistoryError::Io { path: self.path.clone(), source: e }),
        }
    }
}
