//! Handle-based access to server instances for foreign callers.

use std::collections::HashMap;
use std::fmt;
use std::num::NonZeroU64;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;

use crate::server::WorklistServer;

/// Opaque, never-zero identifier of a registered server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServerHandle(NonZeroU64);

impl ServerHandle {
    pub fn from_raw(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(Self)
    }

    pub fn get(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for ServerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

pub struct Registry {
    next: AtomicU64,
    servers: RwLock<HashMap<ServerHandle, Arc<WorklistServer>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
            servers: RwLock::new(HashMap::new()),
        }
    }

    pub fn register(&self, server: WorklistServer) -> ServerHandle {
        let mut raw = self.next.fetch_add(1, Ordering::Relaxed);
        // Skip zero after wrap-around.
        if raw == 0 {
            raw = self.next.fetch_add(1, Ordering::Relaxed);
        }
        let handle = ServerHandle(NonZeroU64::new(raw).unwrap_or(NonZeroU64::MIN));
        self.servers.write().insert(handle, Arc::new(server));
        tracing::debug!(%handle, "Server registered");
        handle
    }

    pub fn get(&self, handle: ServerHandle) -> Option<Arc<WorklistServer>> {
        self.servers.read().get(&handle).cloned()
    }

    /// Unregister `handle`. The server stops once the last in-flight call
    /// holding it finishes.
    pub fn release(&self, handle: ServerHandle) -> bool {
        let removed = self.servers.write().remove(&handle);
        if removed.is_some() {
            tracing::debug!(%handle, "Server released");
        }
        removed.is_some()
    }

    pub fn len(&self) -> usize {
        self.servers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.read().is_empty()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

/// Process-wide registry.
pub fn global() -> &'static Registry {
    static REGISTRY: OnceLock<Registry> = OnceLock::new();
    REGISTRY.get_or_init(Registry::new)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorklistSettings;
    use crate::transport::{ChannelTransport, NetworkSettings};

    fn server(dir: &tempfile::TempDir) -> WorklistServer {
        let settings = WorklistSettings {
            data_folder: dir.path().to_path_buf(),
            ..WorklistSettings::default()
        };
        WorklistServer::new(
            &settings,
            NetworkSettings::default(),
            Arc::new(ChannelTransport::new()),
        )
        .unwrap()
    }

    #[test]
    fn test_register_get_release() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Registry::new();
        let a = registry.register(server(&dir));
        let b = registry.register(server(&dir));
        assert_ne!(a, b);
        assert_eq!(registry.len(), 2);

        let held = registry.get(a).unwrap();
        held.add_dataset();
        assert!(registry.release(a));
        assert!(!registry.release(a));
        assert!(registry.get(a).is_none());
        // An in-flight reference stays usable.
        assert_eq!(held.dataset_count(), 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_zero_is_never_a_handle() {
        assert!(ServerHandle::from_raw(0).is_none());
        assert_eq!(ServerHandle::from_raw(3).unwrap().get(), 3);
    }
}
