use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tally_core::Period;
use thiserror::Error;
use tracing::{debug, warn};

use crate::record::PeriodRecord;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Cache record {path} is not valid JSON: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Cache record {path} belongs to {found}, expected {expected}")]
    WrongPeriod {
        path: PathBuf,
        found: Period,
        expected: Period,
    },
    #[error("Failed to serialize cache record: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// One pretty-printed JSON file per month: `<dir>/<YYYY>-<MM>.json`.
///
/// Deleting a file is the supported way to force re-extraction and
/// re-matching of that month.
pub struct CacheStore {
    dir: PathBuf,
}

impl CacheStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn record_path(&self, period: Period) -> PathBuf {
        self.dir.join(format!("{period}.json"))
    }

    fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> CacheError + '_ {
        move |source| CacheError::Io { path: path.to_path_buf(), source }
    }

    /// The persisted record for `period`, or `None` if there is none.
    pub async fn load(&self, period: Period) -> Result<Option<PeriodRecord>, CacheError> {
        let path = self.record_path(period);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Self::io_error(&path)(e)),
        };

        let mut record: PeriodRecord = serde_json::from_slice(&bytes)
            .map_err(|source| CacheError::Corrupt { path: path.clone(), source })?;

        if record.period != period {
            return Err(CacheError::WrongPeriod { path, found: record.period, expected: period });
        }

        let reset = record.repair();
        if reset > 0 {
            warn!(path = %path.display(), reset, "cache record was inconsistent, reset slots to not found");
        }
        debug!(path = %path.display(), statements = record.len(), "cache record loaded");
        Ok(Some(record))
    }

    /// Write `record` as a complete snapshot. The file is written next to
    /// its final name and renamed into place, so readers never see a torn
    /// record.
    pub async fn persist(&self, record: &PeriodRecord) -> Result<(), CacheError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(Self::io_error(&self.dir))?;

        let path = self.record_path(record.period);
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_vec_pretty(record)?;

        tokio::fs::write(&tmp, &json).await.map_err(Self::io_error(&tmp))?;
        tokio::fs::rename(&tmp, &path).await.map_err(Self::io_error(&path))?;

        debug!(path = %path.display(), statements = record.len(), "cache record persisted");
        Ok(())
    }

    /// Remove the record for `period`. Returns whether one existed.
    pub async fn delete(&self, period: Period) -> Result<bool, CacheError> {
        let path = self.record_path(period);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Self::io_error(&path)(e)),
        }
    }
}
