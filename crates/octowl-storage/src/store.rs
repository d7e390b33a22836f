use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use octowl_core::{Dataset, ServerStatus, part10};

use crate::error::{StorageError, StorageResult};
use crate::naming::FileNamer;

/// One stored dataset plus its persistence metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub(crate) record: Dataset,
    pub(crate) file_name: String,
    pub(crate) dirty: bool,
}

impl Entry {
    pub fn record(&self) -> &Dataset {
        &self.record
    }

    /// Persistence key, fixed when the entry is created.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// True when the record differs from its backing file (or none exists yet).
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }
}

/// Dataset cache keyed by small integer indexes.
///
/// Indexes are handed out min-first: the smallest previously freed index is
/// reused before a new one is allocated, so indexes stay below the high-water
/// mark of live entries. An index freed by `remove` may be handed to a later
/// `add`.
#[derive(Debug)]
pub struct IndexedStore {
    pub(crate) data_folder: PathBuf,
    pub(crate) entries: HashMap<usize, Entry>,
    free_indexes: BTreeSet<usize>,
    namer: FileNamer,
}

impl IndexedStore {
    /// Open a store over `data_folder`, creating the folder if it is missing.
    /// No files are read; call [`IndexedStore::load_all`] for that.
    pub fn open(data_folder: impl Into<PathBuf>, file_prefix: impl Into<String>) -> StorageResult<Self> {
        let data_folder = data_folder.into();
        fs::create_dir_all(&data_folder).map_err(|e| StorageError::folder(&data_folder, e))?;
        Ok(Self {
            data_folder,
            entries: HashMap::new(),
            free_indexes: BTreeSet::new(),
            namer: FileNamer::new(file_prefix),
        })
    }

    pub fn data_folder(&self) -> &Path {
        &self.data_folder
    }

    /// Full path of the backing file for `file_name`.
    pub fn file_path(&self, file_name: &str) -> PathBuf {
        self.data_folder.join(file_name)
    }

    /// Store `record` as a new dirty entry and return its index.
    pub fn add(&mut self, record: Dataset) -> usize {
        let entries = &self.entries;
        let folder = &self.data_folder;
        let file_name = self.namer.next_name(|name| {
            entries.values().any(|e| e.file_name == name) || folder.join(name).exists()
        });
        tracing::debug!(file_name = %file_name, "Adding dataset");
        self.insert(Entry {
            record,
            file_name,
            dirty: true,
        })
    }

    /// Drop the entry at `index` and delete its backing file.
    ///
    /// A failed deletion is written to `status` but the entry is still
    /// released. Returns false if the index was not live.
    pub fn remove(&mut self, index: usize, status: &mut ServerStatus) -> bool {
        let Some(entry) = self.entries.remove(&index) else {
            return false;
        };
        if let Err(e) = self.delete_backing_file(&entry.file_name) {
            status.error(e.to_string());
        }
        self.free_indexes.insert(index);
        true
    }

    pub fn get(&self, index: usize) -> Option<&Entry> {
        self.entries.get(&index)
    }

    pub fn count(&self) -> usize {
        self.entries.len()
    }

    /// Live indexes in ascending order.
    pub fn indexes(&self) -> Vec<usize> {
        let mut indexes: Vec<usize> = self.entries.keys().copied().collect();
        indexes.sort_unstable();
        indexes
    }

    /// Remove every entry and its backing file. Deletion failures are
    /// logged one by one and do not stop the sweep. Returns the number of
    /// files that could not be deleted.
    pub fn clear(&mut self, status: &mut ServerStatus) -> usize {
        let mut failures = 0;
        for entry in std::mem::take(&mut self.entries).into_values() {
            if let Err(e) = self.delete_backing_file(&entry.file_name) {
                status.error(e.to_string());
                failures += 1;
            }
        }
        self.free_indexes.clear();
        failures
    }

    pub fn mark_dirty(&mut self, index: usize) -> bool {
        match self.entries.get_mut(&index) {
            Some(entry) => {
                entry.dirty = true;
                true
            }
            None => false,
        }
    }

    /// Replace the record of a live entry and mark it dirty.
    pub fn update(&mut self, index: usize, record: Dataset) -> bool {
        match self.entries.get_mut(&index) {
            Some(entry) => {
                entry.record = record;
                entry.dirty = true;
                true
            }
            None => false,
        }
    }

    /// Load every regular file in the data folder as a clean entry.
    ///
    /// Files are visited in name order. A file that fails to parse is logged
    /// to `status` and skipped; files already backing a live entry are left
    /// alone. Returns how many entries were added.
    pub fn load_all(&mut self, status: &mut ServerStatus) -> StorageResult<usize> {
        let listing = fs::read_dir(&self.data_folder)
            .map_err(|e| StorageError::folder(&self.data_folder, e))?;

        let mut files = Vec::new();
        for dir_entry in listing {
            match dir_entry {
                Ok(dir_entry) if dir_entry.path().is_file() => {
                    files.push(dir_entry.file_name().to_string_lossy().into_owned());
                }
                Ok(_) => {}
                Err(e) => status.error(StorageError::folder(&self.data_folder, e).to_string()),
            }
        }
        files.sort();

        let mut loaded = 0;
        for file_name in files {
            if self.entries.values().any(|e| e.file_name == file_name) {
                continue;
            }
            match part10::read_file(self.file_path(&file_name)) {
                Ok(record) => {
                    self.insert(Entry {
                        record,
                        file_name,
                        dirty: false,
                    });
                    loaded += 1;
                }
                Err(source) => status.error(StorageError::load(file_name, source).to_string()),
            }
        }

        tracing::info!(
            folder = %self.data_folder.display(),
            loaded,
            total = self.entries.len(),
            "Datasets loaded from disk"
        );
        Ok(loaded)
    }

    fn insert(&mut self, entry: Entry) -> usize {
        let index = self.next_free_index();
        self.entries.insert(index, entry);
        index
    }

    /// Smallest recycled index, else the next index past the live ones.
    fn next_free_index(&mut self) -> usize {
        match self.free_indexes.pop_first() {
            Some(index) => index,
            None => self.entries.len(),
        }
    }

    fn delete_backing_file(&self, file_name: &str) -> StorageResult<()> {
        match fs::remove_file(self.file_path(file_name)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::remove(file_name, e)),
        }
    }
}
