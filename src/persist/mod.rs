//! Snapshot persistence
//!
//! The ranked regions are written to a single named object: the encoded
//! list goes under the `regions` binary field and the write time under the
//! `last-update` annotation. Fields owned by anyone else are left alone.

pub mod store;

pub use store::{FileObjectStore, MemoryObjectStore, ObjectStore, StoredObject};

use crate::error::PersistError;
use crate::models::Region;
use chrono::Utc;
use std::sync::Arc;

/// Binary field holding the encoded regions
pub const REGIONS_KEY: &str = "regions";

/// Annotation holding the RFC 3339 write time
pub const LAST_UPDATE_ANNOTATION: &str = "last-update";

/// Encode regions the way consumers read them back: compound flags are
/// named `autoRegion` and `portForward`, latencies are nanoseconds
pub fn encode_regions(regions: &[Region]) -> Result<Vec<u8>, PersistError> {
    serde_json::to_vec_pretty(regions).map_err(|e| PersistError::Other(format!("cannot encode regions: {}", e)))
}

pub fn decode_regions(payload: &[u8]) -> Result<Vec<Region>, PersistError> {
    serde_json::from_slice(payload).map_err(|e| PersistError::Other(format!("cannot decode regions: {}", e)))
}

/// Writes snapshots to one object of an [`ObjectStore`]
#[derive(Clone)]
pub struct SnapshotPersister {
    store: Arc<dyn ObjectStore>,
    namespace: String,
    object_name: String,
}

impl SnapshotPersister {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        namespace: impl Into<String>,
        object_name: impl Into<String>,
    ) -> Self {
        Self {
            store,
            namespace: namespace.into(),
            object_name: object_name.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn object_name(&self) -> &str {
        &self.object_name
    }

    /// `<store>/<namespace>/<name>`, for logs
    pub fn describe(&self) -> String {
        format!("{}/{}/{}", self.store.describe(), self.namespace, self.object_name)
    }

    /// Write `regions` to the object, creating it when missing
    pub async fn persist(&self, regions: &[Region]) -> Result<(), PersistError> {
        let payload = encode_regions(regions)?;
        let timestamp = Utc::now().to_rfc3339();

        let existing = self
            .store
            .get(&self.namespace, &self.object_name)
            .await
            .map_err(|e| PersistError::Other(e.to_string()))?;

        match existing {
            None => {
                let mut object = StoredObject::new(&self.namespace, &self.object_name);
                object.binary_data.insert(REGIONS_KEY.to_string(), payload);
                object.annotations.insert(LAST_UPDATE_ANNOTATION.to_string(), timestamp);

                self.store
                    .create(&self.namespace, object)
                    .await
                    .map_err(PersistError::CreateFailed)?;
            }
            Some(mut object) => {
                object.binary_data.insert(REGIONS_KEY.to_string(), payload);
                object.annotations.insert(LAST_UPDATE_ANNOTATION.to_string(), timestamp);

                self.store.update(&self.namespace, object).await?;
            }
        }

        Ok(())
    }

    /// Read back the last persisted regions, `None` if nothing was written yet
    pub async fn load(&self) -> Result<Option<Vec<Region>>, PersistError> {
        let object = self
            .store
            .get(&self.namespace, &self.object_name)
            .await
            .map_err(|e| PersistError::Other(e.to_string()))?;

        match object.as_ref().and_then(|o| o.binary_data.get(REGIONS_KEY)) {
            Some(payload) => decode_regions(payload).map(Some),
            None => Ok(None),
        }
    }
}
