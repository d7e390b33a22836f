//! Disk-backed worklist dataset store.
//!
//! [`IndexedStore`] keeps every dataset in memory under a small integer index,
//! tracks which entries have unsaved changes, and persists each entry to one
//! Part-10 file in the data folder.
//!
//! # Example
//!
//! ```ignore
//! use octowl_core::{Dataset, ServerStatus};
//! use octowl_storage::IndexedStore;
//!
//! let mut status = ServerStatus::new();
//! let mut store = IndexedStore::open("./worklist/", "dataset")?;
//! store.load_all(&mut status)?;
//!
//! let index = store.add(Dataset::new());
//! store.save_dirty(&mut status);
//! ```

pub mod error;
pub mod naming;
mod persistence;
pub mod store;

pub use error::{StorageError, StorageResult};
pub use naming::{DEFAULT_PREFIX, FILE_EXTENSION, FileNamer};
pub use store::{Entry, IndexedStore};
