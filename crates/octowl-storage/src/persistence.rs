//! Writing entries back to their files.
//!
//! Every save writes `<data folder>/<file name>` and clears the dirty flag only
//! when the write succeeded. Failures go to the status log and bulk saves carry
//! on with the remaining entries.

use std::path::Path;

use octowl_core::{ServerStatus, part10};

use crate::error::{StorageError, StorageResult};
use crate::store::{Entry, IndexedStore};

impl IndexedStore {
    /// Save the entry at `index`.
    ///
    /// An unknown index is a caller error and is not logged; a failed write
    /// is logged to `status` and leaves the entry dirty.
    pub fn save_one(&mut self, index: usize, status: &mut ServerStatus) -> StorageResult<()> {
        let entry = self
            .entries
            .get_mut(&index)
            .ok_or(StorageError::UnknownIndex(index))?;
        persist(&self.data_folder, entry).inspect_err(|e| status.error(e.to_string()))
    }

    /// Save every entry regardless of its dirty flag. True only if all saved.
    pub fn save_all(&mut self, status: &mut ServerStatus) -> bool {
        self.save_matching(status, |_| true)
    }

    /// Save the dirty entries only; clean entries are not touched.
    /// True only if every attempted save succeeded.
    pub fn save_dirty(&mut self, status: &mut ServerStatus) -> bool {
        self.save_matching(status, Entry::is_dirty)
    }

    fn save_matching(&mut self, status: &mut ServerStatus, select: impl Fn(&Entry) -> bool) -> bool {
        let mut success = true;
        let mut saved = 0usize;
        for entry in self.entries.values_mut().filter(|e| select(e)) {
            match persist(&self.data_folder, entry) {
                Ok(()) => saved += 1,
                Err(e) => {
                    status.error(e.to_string());
                    success = false;
                }
            }
        }
        tracing::debug!(saved, success, "Datasets saved");
        success
    }
}

fn persist(data_folder: &Path, entry: &mut Entry) -> StorageResult<()> {
    part10::write_file(data_folder.join(&entry.file_name), &entry.record)
        .map_err(|source| StorageError::persist(entry.file_name.as_str(), source))?;
    entry.dirty = false;
    tracing::debug!(file_name = %entry.file_name, "Dataset written");
    Ok(())
}
