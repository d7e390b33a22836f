//! Storage error types for the worklist dataset store.

use octowl_core::CoreError;

/// Errors that can occur during store operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// No live entry is registered under the index.
    #[error("No dataset at index {0}")]
    UnknownIndex(usize),

    /// Writing an entry to its backing file failed.
    #[error("Failed to save: {file_name} ({source})")]
    Persist {
        /// File name of the entry that could not be written.
        file_name: String,
        #[source]
        source: CoreError,
    },

    /// A file in the data folder could not be read as a dataset.
    #[error("[Worklist] Failed to load: {file_name} ({source})")]
    Load {
        /// File name that failed to load.
        file_name: String,
        #[source]
        source: CoreError,
    },

    /// Deleting a backing file failed.
    #[error("Failed to remove file: {file_name} ({source})")]
    Remove {
        /// File name that could not be deleted.
        file_name: String,
        #[source]
        source: std::io::Error,
    },

    /// The data folder could not be created or listed.
    #[error("Data folder {path} is not accessible ({source})")]
    Folder {
        /// Path of the data folder.
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl StorageError {
    /// Creates a new `Persist` error.
    #[must_use]
    pub fn persist(file_name: impl Into<String>, source: CoreError) -> Self {
        Self::Persist {
            file_name: file_name.into(),
            source,
        }
    }

    /// Creates a new `Load` error.
    #[must_use]
    pub fn load(file_name: impl Into<String>, source: CoreError) -> Self {
        Self::Load {
            file_name: file_name.into(),
            source,
        }
    }

    /// Creates a new `Remove` error.
    #[must_use]
    pub fn remove(file_name: impl Into<String>, source: std::io::Error) -> Self {
        Self::Remove {
            file_name: file_name.into(),
            source,
        }
    }

    /// Creates a new `Folder` error.
    #[must_use]
    pub fn folder(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Folder {
            path: path.display().to_string(),
            source,
        }
    }

    /// True for misuse by the caller (never written to the status log).
    pub fn is_contract_violation(&self) -> bool {
        matches!(self, Self::UnknownIndex(_))
    }
}

/// Result type for store operations.
pub type StorageResult<T> = Result<T, StorageError>;
