//! Snapshot export
//!
//! After each successful save the whole synced namespace is written to a
//! timestamped, pretty-printed JSON file so the history can be restored or
//! inspected outside the service.

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use crate::store::Entries;

/// Export-related errors
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Failed to write export file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize snapshot: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Writes snapshots into one directory
#[derive(Debug, Clone)]
pub struct Exporter {
    dir: PathBuf,
}

impl Exporter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `anime_groups_<YYYYmmddTHHMMSSZ>.json`
    pub fn file_name(at: DateTime<Utc>) -> String {
        format!("anime_groups_{}.json", at.format("%Y%m%dT%H%M%SZ"))
    }

    /// Write `snapshot` stamped with the current time
    pub async fn export(&self, snapshot: &Entries) -> Result<PathBuf, ExportError> {
        self.export_at(snapshot, Utc::now()).await
    }

    pub async fn export_at(&self, snapshot: &Entries, at: DateTime<Utc>) -> Result<PathBuf, ExportError> {
        let body = serde_json::to_vec_pretty(snapshot)?;
        tokio::fs::create_dir_all(&self.dir).await?;

        let path = self.dir.join(Self::file_name(at));
        tokio::fs::write(&path, body).await?;
        debug!("Exported {} keys to {}", snapshot.len(), path.display());
        Ok(path)
    }
}
