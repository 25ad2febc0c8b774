//! Versioned JSON persistence.
//!
//! Data is stored inside an envelope recording the schema version and the
//! save time:
//!
//! ```json
//! { "version": 2, "savedAt": "2025-01-01T00:00:00Z", "data": { ... } }
//! ```
//!
//! Saves are atomic: the envelope is written to a uniquely named temporary
//! file in the target's directory which then replaces the target. A crash
//! never leaves a half-written file behind, and concurrent saves to the same
//! path never share a temporary file.

use agent_relay_core::environment::{Clock, SystemClock};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Write as _;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;
use thiserror::Error;

/// Errors raised while saving or loading versioned data.
#[derive(Error, Debug)]
pub enum PersistenceError {
    /// Filesystem access failed
    #[error("I/O error on {path}: {source}")]
    Io {
        /// File being accessed
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Stored text is not a valid envelope, or its data does not fit the type
    #[error("Failed to parse stored data: {0}")]
    Parse(#[source] serde_json::Error),

    /// Data could not be serialized
    #[error("Failed to serialize data: {0}")]
    Serialize(#[source] serde_json::Error),

    /// Stored version differs from the expected one
    #[error("Version mismatch: expected {expected}, found {found}")]
    VersionMismatch {
        /// Version this file handles
        expected: u32,
        /// Version found in storage
        found: u32,
    },

    /// A caller migration rejected older data
    #[error("Migration from version {from} failed: {reason}")]
    Migration {
        /// Version the data was stored with
        from: u32,
        /// Why the migration failed
        reason: String,
    },
}

/// On-disk representation of versioned data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope<T> {
    /// Schema version of `data`
    pub version: u32,
    /// When the data was saved
    pub saved_at: DateTime<Utc>,
    /// The payload
    pub data: T,
}

/// A JSON file holding one value of `T` at a fixed schema version.
///
/// # Example
///
/// ```no_run
/// use agent_relay::persistence::VersionedFile;
///
/// # async fn example() -> Result<(), agent_relay::PersistenceError> {
/// let file = VersionedFile::<Vec<String>>::new("state/history.json", 1);
/// file.save(&vec!["hello".to_string()]).await?;
/// let history = file.load().await?.unwrap_or_default();
/// # Ok(())
/// # }
/// ```
pub struct VersionedFile<T> {
    path: PathBuf,
    version: u32,
    clock: Arc<dyn Clock>,
    _data: PhantomData<fn() -> T>,
}

impl<T> VersionedFile<T>
where
    T: Serialize + DeserializeOwned,
{
    /// A file at `path` storing data at schema `version`
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, version: u32) -> Self {
        Self {
            path: path.into(),
            version,
            clock: Arc::new(SystemClock),
            _data: PhantomData,
        }
    }

    /// Builder: Stamp saves using `clock`
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Location of the file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Schema version written by this file
    #[must_use]
    pub const fn version(&self) -> u32 {
        self.version
    }

    /// Atomically replace the file's contents with `data`.
    ///
    /// Missing parent directories are created.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError::Serialize`] if `data` cannot be encoded and
    /// [`PersistenceError::Io`] if writing fails.
    pub async fn save(&self, data: &T) -> Result<(), PersistenceError> {
        let text = self.export_string(data)?;
        let path = self.path.clone();

        tokio::task::spawn_blocking(move || write_atomic(&path, text.as_bytes()))
            .await
            .map_err(|join| io_error(&self.path, std::io::Error::other(join)))??;

        tracing::debug!(path = %self.path.display(), version = self.version, "Saved versioned file");
        Ok(())
    }

    /// Load the stored value.
    ///
    /// Returns `Ok(None)` when nothing has been saved yet.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError::VersionMismatch`] if the file was written at
    /// another version, [`PersistenceError::Parse`] if it is malformed, and
    /// [`PersistenceError::Io`] if it cannot be read.
    pub async fn load(&self) -> Result<Option<T>, PersistenceError> {
        let Some(text) = self.read().await? else {
            return Ok(None);
        };
        self.import_str(&text).map(Some)
    }

    /// Load the stored value, upgrading older versions with `migrate`.
    ///
    /// `migrate` receives the stored version and the raw data. Data from a
    /// newer version is never migrated.
    ///
    /// # Errors
    ///
    /// As [`load`](Self::load), plus [`PersistenceError::Migration`] when
    /// `migrate` fails.
    pub async fn load_with<F>(&self, migrate: F) -> Result<Option<T>, PersistenceError>
    where
        F: FnOnce(u32, serde_json::Value) -> Result<T, String>,
    {
        let Some(text) = self.read().await? else {
            return Ok(None);
        };
        let envelope: Envelope<serde_json::Value> =
            serde_json::from_str(&text).map_err(PersistenceError::Parse)?;

        if envelope.version == self.version {
            return serde_json::from_value(envelope.data)
                .map(Some)
                .map_err(PersistenceError::Parse);
        }
        if envelope.version > self.version {
            return Err(PersistenceError::VersionMismatch {
                expected: self.version,
                found: envelope.version,
            });
        }

        tracing::info!(
            path = %self.path.display(),
            from = envelope.version,
            to = self.version,
            "Migrating versioned file"
        );
        migrate(envelope.version, envelope.data)
            .map(Some)
            .map_err(|reason| PersistenceError::Migration {
                from: envelope.version,
                reason,
            })
    }

    /// Encode `data` as an envelope without touching the file.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError::Serialize`] if `data` cannot be encoded.
    pub fn export_string(&self, data: &T) -> Result<String, PersistenceError> {
        let envelope = Envelope {
            version: self.version,
            saved_at: self.clock.now(),
            data,
        };
        serde_json::to_string_pretty(&envelope).map_err(PersistenceError::Serialize)
    }

    /// Decode an envelope produced by [`export_string`](Self::export_string).
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError::Parse`] for malformed text and
    /// [`PersistenceError::VersionMismatch`] for another version.
    pub fn import_str(&self, text: &str) -> Result<T, PersistenceError> {
        let envelope: Envelope<serde_json::Value> =
            serde_json::from_str(text).map_err(PersistenceError::Parse)?;
        if envelope.version != self.version {
            return Err(PersistenceError::VersionMismatch {
                expected: self.version,
                found: envelope.version,
            });
        }
        serde_json::from_value(envelope.data).map_err(PersistenceError::Parse)
    }

    /// Delete the file; absent files are fine.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError::Io`] if removal fails.
    pub async fn remove(&self) -> Result<(), PersistenceError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(io_error(&self.path, source)),
        }
    }

    async fn read(&self) -> Result<Option<String>, PersistenceError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(io_error(&self.path, source)),
        }
    }

}

impl<T> fmt::Debug for VersionedFile<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VersionedFile")
            .field("path", &self.path)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

/// Write `contents` to a uniquely named sibling temp file, then rename it
/// over `path`. Concurrent writers each get their own temp file; the last
/// rename wins.
fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), PersistenceError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent).map_err(|source| io_error(parent, source))?;

    let mut temp = NamedTempFile::new_in(parent).map_err(|source| io_error(parent, source))?;
    temp.write_all(contents)
        .and_then(|()| temp.as_file().sync_all())
        .map_err(|source| io_error(temp.path(), source))?;

    temp.persist(path).map_err(|err| io_error(path, err.error))?;
    Ok(())
}

fn io_error(path: &Path, source: std::io::Error) -> PersistenceError {
    PersistenceError::Io {
        path: path.to_path_buf(),
        source,
    }
}
