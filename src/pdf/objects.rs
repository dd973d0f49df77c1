//! Lazily-populated store of decoded page objects.
//!
//! The loader registers every image a page declares, then a blocking worker
//! decodes and publishes them one by one. Readers call
//! [`ObjectStore::resolve`], which returns as soon as the object is
//! published (or its decode failed) and gives up after a timeout.
//!
//! Publication bumps a `tokio::sync::watch` counter; a waiting resolver
//! re-checks the map on every bump instead of sleeping.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use pdfqa_core::models::ImageRecord;
use pdfqa_core::{Error, Result};
use tokio::sync::watch;

#[derive(Debug, Clone)]
enum ObjectState {
    Pending,
    Ready(Arc<ImageRecord>),
    Failed(String),
}

/// Decoded image objects of one page, keyed by resource name.
pub struct ObjectStore {
    objects: RwLock<HashMap<String, ObjectState>>,
    version: watch::Sender<u64>,
}

impl Default for ObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectStore {
    pub fn new() -> Self {
        let (version, _) = watch::channel(0);
        Self {
            objects: RwLock::new(HashMap::new()),
            version,
        }
    }

    /// Declare an object that will be published later.
    pub fn register(&self, object_id: &str) {
        self.update(object_id, |slot| {
            slot.get_or_insert(ObjectState::Pending);
        });
    }

    pub fn publish(&self, object_id: &str, image: ImageRecord) {
        let image = Arc::new(image);
        self.update(object_id, |slot| *slot = Some(ObjectState::Ready(image)));
    }

    /// Record that an object will never materialize.
    pub fn fail(&self, object_id: &str, reason: impl Into<String>) {
        let reason = reason.into();
        self.update(object_id, |slot| *slot = Some(ObjectState::Failed(reason)));
    }

    /// Number of objects published successfully so far.
    pub fn ready_count(&self) -> usize {
        self.objects
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .filter(|s| matches!(s, ObjectState::Ready(_)))
            .count()
    }

    /// Wait for `object_id` to be published.
    ///
    /// Fails with [`Error::ObjectUnavailable`] as soon as the object is
    /// marked failed, and with [`Error::ResolutionTimeout`] when nothing is
    /// published for it within `timeout`. Ids that were never registered
    /// behave like pending ones.
    pub async fn resolve(&self, object_id: &str, timeout: Duration) -> Result<Arc<ImageRecord>> {
        // Subscribe before the first check so a publish in between is seen.
        let mut changes = self.version.subscribe();

        let wait = async {
            loop {
                if let Some(outcome) = self.lookup(object_id) {
                    return outcome;
                }
                if changes.changed().await.is_err() {
                    return Err(Error::ObjectUnavailable {
                        object_id: object_id.to_string(),
                        reason: "object store closed".to_string(),
                    });
                }
            }
        };

        match tokio::time::timeout(timeout, wait).await {
            Ok(outcome) => outcome,
            Err(_) => Err(Error::ResolutionTimeout {
                object_id: object_id.to_string(),
                waited: timeout,
            }),
        }
    }

    fn lookup(&self, object_id: &str) -> Option<Result<Arc<ImageRecord>>> {
        let objects = self.objects.read().unwrap_or_else(|e| e.into_inner());
        match objects.get(object_id) {
            Some(ObjectState::Ready(image)) => Some(Ok(image.clone())),
            Some(ObjectState::Failed(reason)) => Some(Err(Error::ObjectUnavailable {
                object_id: object_id.to_string(),
                reason: reason.clone(),
            })),
            Some(ObjectState::Pending) | None => None,
        }
    }

    fn update(&self, object_id: &str, f: impl FnOnce(&mut Option<ObjectState>)) {
        {
            let mut objects = self.objects.write().unwrap_or_else(|e| e.into_inner());
            let mut slot = objects.remove(object_id);
            f(&mut slot);
            if let Some(state) = slot {
                objects.insert(object_id.to_string(), state);
            }
        }
        self.version.send_modify(|v| *v = v.wrapping_add(1));
    }
}
