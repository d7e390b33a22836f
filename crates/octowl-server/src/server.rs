//! Thread-safe worklist server facade.
//!
//! Every public operation takes the server lock for its whole duration and
//! runs inside a [`ScopedStatus`], so the status text shows what is being
//! done and every call counts as one request. The status getters are the
//! exception: they read without marking the server busy.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;
use thiserror::Error;

use octowl_core::{Dataset, IDLE, ScopedStatus, ServerStatus, StatusSnapshot, part10};
use octowl_storage::{IndexedStore, StorageError};

use crate::config::{AppConfig, WorklistSettings};
use crate::dimse::{
    CFindRsp, CommandHandler, CommandOutcome, DimseError, DimseMessage, PresentationContext,
};
use crate::transport::{AssociationTransport, NetworkSettings};

const LISTENING: &str = "Listening";

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Storage(#[from] StorageError),
}

struct ServerState {
    status: ServerStatus,
    store: IndexedStore,
    template_file: Option<PathBuf>,
}

struct Shared {
    state: Mutex<ServerState>,
    transport: Arc<dyn AssociationTransport>,
    network: NetworkSettings,
}

/// Modality worklist server: an indexed dataset store, its status log and
/// the association listener, behind one lock.
pub struct WorklistServer {
    shared: Arc<Shared>,
}

impl WorklistServer {
    /// Open the data folder and load every dataset file already in it.
    ///
    /// Files that fail to parse are recorded in the status log; only an
    /// unusable data folder fails construction.
    pub fn new(
        settings: &WorklistSettings,
        network: NetworkSettings,
        transport: Arc<dyn AssociationTransport>,
    ) -> Result<Self, ServerError> {
        let mut status = ServerStatus::new();
        let mut store = IndexedStore::open(&settings.data_folder, settings.file_prefix.as_str())?;
        store.load_all(&mut status)?;
        let template_file = settings
            .template_file
            .clone()
            .filter(|p| !p.as_os_str().is_empty());

        tracing::info!(
            data_folder = %settings.data_folder.display(),
            datasets = store.count(),
            port = network.port,
            ae_title = %network.ae_title,
            "Worklist server created"
        );
        Ok(Self {
            shared: Arc::new(Shared {
                state: Mutex::new(ServerState {
                    status,
                    store,
                    template_file,
                }),
                transport,
                network,
            }),
        })
    }

    pub fn from_config(
        config: &AppConfig,
        transport: Arc<dyn AssociationTransport>,
    ) -> Result<Self, ServerError> {
        Self::new(&config.worklist, config.network.to_settings(), transport)
    }

    pub fn network_settings(&self) -> &NetworkSettings {
        &self.shared.network
    }

    /// Use `path` as the template for new datasets. An empty path clears it.
    /// Returns whether the file currently exists.
    pub fn set_template_file(&self, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        let mut guard = self.shared.state.lock();
        let state = &mut *guard;
        let _scoped = state.status.scoped("Template file setting");
        if path.as_os_str().is_empty() {
            state.template_file = None;
            return false;
        }
        state.template_file = Some(path.to_path_buf());
        path.exists()
    }

    pub fn template_file(&self) -> Option<PathBuf> {
        self.shared.state.lock().template_file.clone()
    }

    /// Add a dataset cloned from the template file, or an empty one when no
    /// template is set or it cannot be read. Returns the new index.
    pub fn add_dataset(&self) -> usize {
        let mut guard = self.shared.state.lock();
        let state = &mut *guard;
        let _scoped = state.status.scoped("Adding a dataset");
        let record = match &state.template_file {
            Some(path) => part10::read_file(path).unwrap_or_else(|e| {
                tracing::warn!(template = %path.display(), error = %e, "Template not usable, adding empty dataset");
                Dataset::new()
            }),
            None => Dataset::new(),
        };
        state.store.add(record)
    }

    pub fn remove_dataset(&self, index: usize) -> bool {
        let mut guard = self.shared.state.lock();
        let state = &mut *guard;
        let mut scoped = state.status.scoped("Deleting a dataset");
        state.store.remove(index, &mut scoped)
    }

    pub fn dataset_count(&self) -> usize {
        let mut guard = self.shared.state.lock();
        let state = &mut *guard;
        let _scoped = state.status.scoped("Getting dataset count");
        state.store.count()
    }

    /// A copy of the dataset at `index`.
    pub fn get_dataset(&self, index: usize) -> Option<Dataset> {
        let mut guard = self.shared.state.lock();
        let state = &mut *guard;
        let _scoped = state.status.scoped("Getting dataset");
        state.store.get(index).map(|entry| entry.record().clone())
    }

    /// Replace the dataset at `index`; the entry becomes dirty.
    pub fn update_dataset(&self, index: usize, record: Dataset) -> bool {
        let mut guard = self.shared.state.lock();
        let state = &mut *guard;
        let _scoped = state.status.scoped("Updating a dataset");
        state.store.update(index, record)
    }

    /// Remove every dataset and its file. Deletions are best effort: a file
    /// that cannot be removed goes to the error log and the entry is released
    /// anyway, so this always returns true.
    pub fn clear_datasets(&self) -> bool {
        let mut guard = self.shared.state.lock();
        let state = &mut *guard;
        let mut scoped = state.status.scoped("Clearing the list");
        let failures = state.store.clear(&mut scoped);
        if failures > 0 {
            tracing::warn!(failures, "Some dataset files could not be deleted");
        }
        true
    }

    /// Open the listen port and accept associations on a background thread.
    /// Starting a running server succeeds without doing anything.
    pub fn start(&self) -> bool {
        let mut guard = self.shared.state.lock();
        let state = &mut *guard;
        let mut scoped = state.status.scoped("Starting");
        if scoped.is_running() {
            return true;
        }

        let network = &self.shared.network;
        if let Err(e) = self.shared.transport.open_listen_port(network) {
            scoped.error(format!("Failed to listen on port {}: {e}", network.port));
            return false;
        }

        let transport = Arc::clone(&self.shared.transport);
        let handler: Arc<dyn CommandHandler> = self.shared.clone();
        let spawned = thread::Builder::new()
            .name("octowl-accept".into())
            .spawn(move || transport.accept_associations(handler));
        if let Err(e) = spawned {
            self.shared.transport.stop_after_current_association();
            scoped.error(format!("Failed to start accept thread: {e}"));
            return false;
        }

        scoped.set_running(true);
        scoped.change_status(LISTENING);
        tracing::info!(port = network.port, ae_title = %network.ae_title, "Worklist server listening");
        true
    }

    /// Stop accepting associations after the current one. Always ends idle.
    pub fn stop(&self) -> bool {
        let mut guard = self.shared.state.lock();
        let state = &mut *guard;
        let mut scoped = ScopedStatus::with_final(&mut state.status, "Stopping", IDLE);
        if !scoped.is_running() {
            return true;
        }
        self.shared.transport.stop_after_current_association();
        scoped.set_running(false);
        tracing::info!("Worklist server stopped");
        true
    }

    pub fn is_running(&self) -> bool {
        self.shared.state.lock().status.is_running()
    }

    /// Multi-line status report. Consumes the pending errors.
    pub fn status(&self) -> String {
        self.shared.state.lock().status.render()
    }

    /// Structured status. Consumes the pending errors.
    pub fn status_snapshot(&self) -> StatusSnapshot {
        self.shared.state.lock().status.take_snapshot()
    }

    pub fn mark_dirty(&self, index: usize) -> bool {
        let mut guard = self.shared.state.lock();
        let state = &mut *guard;
        let _scoped = state.status.scoped("Marking dataset as dirty");
        state.store.mark_dirty(index)
    }

    pub fn save_dirty(&self) -> bool {
        let mut guard = self.shared.state.lock();
        let state = &mut *guard;
        let mut scoped = state.status.scoped("Saving dirty datasets");
        state.store.save_dirty(&mut scoped)
    }

    pub fn save_dataset(&self, index: usize) -> bool {
        let mut guard = self.shared.state.lock();
        let state = &mut *guard;
        let mut scoped = state.status.scoped("Saving a dataset by index");
        state.store.save_one(index, &mut scoped).is_ok()
    }

    pub fn save_all(&self) -> bool {
        let mut guard = self.shared.state.lock();
        let state = &mut *guard;
        let mut scoped = state.status.scoped("Saving all datasets");
        state.store.save_all(&mut scoped)
    }

    /// Pick up dataset files added to the data folder since startup. Files
    /// already backing an entry are skipped. True if at least one file was
    /// loaded; false when nothing new parsed or the folder is unreadable.
    pub fn reload(&self) -> bool {
        let mut guard = self.shared.state.lock();
        let state = &mut *guard;
        let mut scoped = state.status.scoped("Loading all datasets from file");
        match state.store.load_all(&mut scoped) {
            Ok(loaded) => loaded > 0,
            Err(e) => {
                scoped.error(e.to_string());
                false
            }
        }
    }

    /// Worklist query hook, see [`CommandHandler`].
    pub fn handle_incoming_command(
        &self,
        message: Option<&DimseMessage>,
        context: &PresentationContext,
    ) -> Result<CommandOutcome, DimseError> {
        self.shared.handle_incoming_command(message, context)
    }
}

impl Drop for WorklistServer {
    fn drop(&mut self) {
        if self.is_running() {
            self.stop();
        }
    }
}

impl CommandHandler for Shared {
    // Answers every worklist query with an immediate success and no matches.
    fn handle_incoming_command(
        &self,
        message: Option<&DimseMessage>,
        context: &PresentationContext,
    ) -> Result<CommandOutcome, DimseError> {
        self.state.lock().status.record_request();

        let Some(message) = message else {
            return Err(DimseError::illegal_call("no command received"));
        };
        match message {
            DimseMessage::CFindRq(request) => {
                if request.affected_sop_class_uid.trim().is_empty() {
                    return Err(DimseError::illegal_call(
                        "C-FIND-RQ without affected SOP class UID",
                    ));
                }
                tracing::debug!(
                    message_id = request.message_id,
                    context_id = context.id,
                    "Answering worklist query"
                );
                Ok(CommandOutcome::Respond {
                    presentation_context_id: context.id,
                    response: DimseMessage::CFindRsp(CFindRsp::success(request)),
                })
            }
            other => {
                tracing::debug!(command_field = other.command_field(), "Delegating command");
                Ok(CommandOutcome::Delegate)
            }
        }
    }
}
