// src/registry/mod.rs
mod backend;
mod error;

pub use backend::{Backend, BackendSnapshot, HealthStatus};
pub use error::RegistryError;

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use url::Url;

/// A backend definition as supplied by a caller (config bootstrap or the
/// management API's `POST /api/v1/servers`).
#[derive(Debug, Clone)]
pub struct BackendSpec {
    pub id: String,
    pub url: Url,
    pub weight: u32,
}

/// A partial update as supplied by `PUT /api/v1/servers/{id}` (spec §4.1:
/// "modifies weight and/or URL; id is immutable").
#[derive(Debug, Clone, Default)]
pub struct BackendPatch {
    pub url: Option<Url>,
    pub weight: Option<u32>,
}

/// The authoritative, in-memory pool of backends (spec §3 "Registry", §4.1).
///
/// Mutations (`add`/`update`/`remove`) are serialized by an internal
/// `Mutex` so two concurrent `add` calls with the same id can never both
/// succeed (invariant 4). Reads (`get`/`list`/`healthy`) only touch the
/// lock-free `DashMap` and return value copies, never holding anything
/// across I/O, matching the inherited `BackendPool`'s read shape.
pub struct Registry {
    backends: DashMap<String, Arc<Backend>>,
    version: AtomicU64,
    write_lock: Mutex<()>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            backends: DashMap::new(),
            version: AtomicU64::new(0),
            write_lock: Mutex::new(()),
        }
    }

    pub fn with_backends(specs: Vec<BackendSpec>) -> Result<Self, RegistryError> {
        let registry = Self::new();
        for spec in specs {
            registry.insert_unlocked(spec)?;
        }
        Ok(registry)
    }

    fn bump_version(&self) -> u64 {
        self.version.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    fn insert_unlocked(&self, spec: BackendSpec) -> Result<(), RegistryError> {
        if spec.url.scheme() != "http" && spec.url.scheme() != "https" {
            return Err(RegistryError::InvalidUrl(format!(
                "unsupported scheme: {}",
                spec.url.scheme()
            )));
        }
        if self.backends.contains_key(&spec.id) {
            return Err(RegistryError::DuplicateId(spec.id));
        }
        let backend = Arc::new(Backend::new(spec.id.clone(), spec.url, spec.weight));
        self.backends.insert(spec.id, backend);
        self.bump_version();
        Ok(())
    }

    /// Inserts a new backend (spec §4.1 `Add`).
    pub async fn add(&self, spec: BackendSpec) -> Result<BackendSnapshot, RegistryError> {
        let _guard = self.write_lock.lock().await;
        if spec.url.scheme() != "http" && spec.url.scheme() != "https" {
            return Err(RegistryError::InvalidUrl(format!(
                "unsupported scheme: {}",
                spec.url.scheme()
            )));
        }
        if self.backends.contains_key(&spec.id) {
            return Err(RegistryError::DuplicateId(spec.id));
        }
        let backend = Arc::new(Backend::new(spec.id.clone(), spec.url, spec.weight));
        let snapshot = backend.snapshot().await;
        self.backends.insert(spec.id, backend);
        self.bump_version();
        Ok(snapshot)
    }

    /// Applies a partial update (spec §4.1 `Update`). `id` is immutable.
    pub async fn update(
        &self,
        id: &str,
        patch: BackendPatch,
    ) -> Result<BackendSnapshot, RegistryError> {
        let _guard = self.write_lock.lock().await;
        let backend = self
            .backends
            .get(id)
            .map(|e| e.value().clone())
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;

        if let Some(url) = patch.url {
            if url.scheme() != "http" && url.scheme() != "https" {
                return Err(RegistryError::InvalidUrl(format!(
                    "unsupported scheme: {}",
                    url.scheme()
                )));
            }
            backend.set_url(url).await;
        }
        if let Some(weight) = patch.weight {
            backend.set_weight(weight);
        }
        self.bump_version();
        Ok(backend.snapshot().await)
    }

    /// Removes a backend (spec §4.1 `Remove`). In-flight requests retain
    /// their own `Arc<Backend>` clone and complete normally; dropping it
    /// here from the map only prevents *new* selections.
    pub async fn remove(&self, id: &str) -> Result<(), RegistryError> {
        let _guard = self.write_lock.lock().await;
        match self.backends.remove(id) {
            Some(_) => {
                self.bump_version();
                Ok(())
            }
            None => Err(RegistryError::NotFound(id.to_string())),
        }
    }

    pub async fn get(&self, id: &str) -> Result<BackendSnapshot, RegistryError> {
        let backend = self
            .backends
            .get(id)
            .map(|e| e.value().clone())
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        Ok(backend.snapshot().await)
    }

    /// Returns the live handle used by the proxy engine/supervisor to reach
    /// the per-backend atomic counter and health state directly, bypassing
    /// the snapshot copy. `None` if the id is unknown (e.g. raced with a
    /// concurrent removal).
    pub fn get_live(&self, id: &str) -> Option<Arc<Backend>> {
        self.backends.get(id).map(|e| e.value().clone())
    }

    /// All backends, snapshot, id-sorted (spec §4.1 `List`, invariant 2).
    pub async fn list(&self) -> Vec<BackendSnapshot> {
        let mut ids: Vec<String> = self.backends.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(backend) = self.backends.get(&id).map(|e| e.value().clone()) {
                out.push(backend.snapshot().await);
            }
        }
        out
    }

    /// Snapshot of the routable subset (spec §4.1 `Healthy`, invariant 5:
    /// a consistent set is read under no lock spanning I/O, so nothing
    /// already removed before this call began can appear in it).
    pub async fn healthy(&self) -> Vec<BackendSnapshot> {
        let mut out = Vec::new();
        let mut ids: Vec<String> = self.backends.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        for id in ids {
            if let Some(backend) = self.backends.get(&id).map(|e| e.value().clone()) {
                let snap = backend.snapshot().await;
                if snap.health_status.is_eligible() && snap.weight > 0 {
                    out.push(snap);
                }
            }
        }
        out
    }

    pub fn all_live(&self) -> Vec<Arc<Backend>> {
        self.backends.iter().map(|e| e.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    /// Invoked by the health supervisor only (spec §4.1 `SetHealth`); the
    /// data plane never calls this (§7).
    pub async fn set_health(&self, id: &str, success: bool, latency_ms: u64) {
        if let Some(backend) = self.backends.get(id).map(|e| e.value().clone()) {
            backend.record_probe(success, latency_ms).await;
        }
        // Unknown id (removed between tick and completion): discard, per
        // spec §4.3 "no SetHealth call on an unknown id".
    }

    pub async fn set_maintenance(&self, id: &str, on: bool) -> Result<(), RegistryError> {
        let backend = self
            .backends
            .get(id)
            .map(|e| e.value().clone())
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        backend.set_maintenance(on).await;
        Ok(())
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
