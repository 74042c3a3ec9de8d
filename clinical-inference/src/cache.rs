//! Process-wide cache of loaded models
//!
//! One slot per artifact location. A slot's mutex is held for the whole
//! load, so concurrent first requests for the same model wait for a single
//! load and then share its handle; requests for other models proceed
//! independently. A failed load leaves the slot empty and the next request
//! retries.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::error::InferenceResult;
use crate::registry::ModelDescriptor;
use crate::runtime::{LoadedModelHandle, ModelLoader};

type Slot = Arc<Mutex<Option<Arc<LoadedModelHandle>>>>;

pub struct ModelCache {
    loader: Arc<dyn ModelLoader>,
    slots: DashMap<PathBuf, Slot>,
}

impl ModelCache {
    pub fn new(loader: Arc<dyn ModelLoader>) -> Self {
        Self {
            loader,
            slots: DashMap::new(),
        }
    }

    /// Return the resident handle for `descriptor`, loading it at most once
    ///
    /// # Errors
    ///
    /// Propagates the loader's error; nothing is cached in that case.
    pub fn acquire(&self, descriptor: &ModelDescriptor) -> InferenceResult<Arc<LoadedModelHandle>> {
        let slot = self.slot(&descriptor.location);
        let mut guard = slot.lock();

        if let Some(handle) = guard.as_ref() {
            debug!(role = %descriptor.role, location = %descriptor.location.display(), "Model cache hit");
            return Ok(Arc::clone(handle));
        }

        let device = self.loader.select_device();
        info!(
            role = %descriptor.role,
            location = %descriptor.location.display(),
            kind = %descriptor.artifact_kind,
            device = %device,
            "Loading model"
        );

        let started = Instant::now();
        let handle = match self.loader.load(descriptor, device) {
            Ok(handle) => Arc::new(handle),
            Err(e) => {
                warn!(
                    role = %descriptor.role,
                    error_code = e.code(),
                    error = %e,
                    "Model load failed"
                );
                return Err(e);
            }
        };

        info!(
            role = %descriptor.role,
            device = %handle.device(),
            elapsed_ms = started.elapsed().as_millis(),
            "Model loaded"
        );
        *guard = Some(Arc::clone(&handle));
        Ok(handle)
    }

    // Shard guards are released before any slot is locked; a slot stays
    // locked for a whole load.
    fn slot(&self, location: &Path) -> Slot {
        if let Some(slot) = self.slots.get(location).map(|entry| Arc::clone(entry.value())) {
            return slot;
        }
        Arc::clone(self.slots.entry(location.to_path_buf()).or_default().value())
    }

    fn snapshot(&self) -> Vec<Slot> {
        self.slots.iter().map(|entry| Arc::clone(entry.value())).collect()
    }

    /// A handle is resident for `location`; a model still loading is not
    pub fn contains(&self, location: &Path) -> bool {
        let Some(slot) = self.slots.get(location).map(|entry| Arc::clone(entry.value())) else {
            return false;
        };
        slot.try_lock().is_some_and(|guard| guard.is_some())
    }

    /// Resident handles, not counting models still loading
    pub fn len(&self) -> usize {
        self.snapshot()
            .iter()
            .filter(|slot| slot.try_lock().is_some_and(|guard| guard.is_some()))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop the cache's reference; in-flight users keep theirs until done
    pub fn evict(&self, location: &Path) -> bool {
        let Some((_, slot)) = self.slots.remove(location) else {
            return false;
        };
        let evicted = slot.lock().take().is_some();
        if evicted {
            info!(location = %location.display(), "Model evicted");
        }
        evicted
    }

    pub fn clear(&self) {
        let count = self.len();
        self.slots.clear();
        info!(count, "Model cache cleared");
    }
}
