//! Namespaced key/value object stores
//!
//! An object carries a map of binary fields, a map of string annotations
//! and a revision number. `update` only succeeds when the caller's revision
//! matches the stored one, which is how concurrent writers are detected.

use crate::error::StoreError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::{Mutex, RwLock};

/// One stored object
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StoredObject {
    pub name: String,
    pub namespace: String,
    pub annotations: BTreeMap<String, String>,
    pub binary_data: BTreeMap<String, Vec<u8>>,
    /// 0 for an object that has never been stored
    pub revision: u64,
}

impl StoredObject {
    /// New, not yet stored object
    pub fn new(namespace: &str, name: &str) -> Self {
        Self {
            name: name.to_string(),
            namespace: namespace.to_string(),
            ..Default::default()
        }
    }
}

/// Key/value object store with get/create/update semantics
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch an object, `None` when it does not exist
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<StoredObject>, StoreError>;

    /// Store a new object; fails with `AlreadyExists` if it is present
    async fn create(&self, namespace: &str, object: StoredObject) -> Result<StoredObject, StoreError>;

    /// Replace an existing object; fails with `Conflict` on a stale revision
    async fn update(&self, namespace: &str, object: StoredObject) -> Result<StoredObject, StoreError>;

    /// Human-readable location of the store, for logs
    fn describe(&self) -> String;
}

/// Process-local store
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: RwLock<HashMap<(String, String), StoredObject>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<StoredObject>, StoreError> {
        let objects = self.objects.read().await;
        Ok(objects.get(&(namespace.to_string(), name.to_string())).cloned())
    }

    async fn create(&self, namespace: &str, mut object: StoredObject) -> Result<StoredObject, StoreError> {
        let mut objects = self.objects.write().await;
        let key = (namespace.to_string(), object.name.clone());
        if objects.contains_key(&key) {
            return Err(StoreError::AlreadyExists {
                namespace: namespace.to_string(),
                name: object.name,
            });
        }

        object.namespace = namespace.to_string();
        object.revision = 1;
        objects.insert(key, object.clone());
        Ok(object)
    }

    async fn update(&self, namespace: &str, mut object: StoredObject) -> Result<StoredObject, StoreError> {
        let mut objects = self.objects.write().await;
        let key = (namespace.to_string(), object.name.clone());
        let current = objects.get(&key).ok_or_else(|| StoreError::NotFound {
            namespace: namespace.to_string(),
            name: object.name.clone(),
        })?;

        if current.revision != object.revision {
            return Err(StoreError::Conflict {
                namespace: namespace.to_string(),
                name: object.name,
                expected: object.revision,
                found: current.revision,
            });
        }

        object.namespace = namespace.to_string();
        object.revision += 1;
        objects.insert(key, object.clone());
        Ok(object)
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

const META_FILE: &str = "object.json";
const DATA_DIR: &str = "data";

/// On-disk metadata of a file-backed object
#[derive(Debug, Serialize, Deserialize)]
struct ObjectMeta {
    name: String,
    namespace: String,
    #[serde(default)]
    annotations: BTreeMap<String, String>,
    #[serde(default)]
    keys: Vec<String>,
    revision: u64,
}

/// Store keeping each object in `<root>/<namespace>/<name>/`
///
/// Annotations and the revision live in `object.json`; every binary field
/// is a raw file under `data/`, so readers can consume a field directly.
/// Files are replaced through a rename of a temporary sibling. One lock
/// covers reads and writes, so a reader never pairs metadata with data
/// files of another revision.
#[derive(Debug)]
pub struct FileObjectStore {
    root: PathBuf,
    lock: Mutex<()>,
}

impl FileObjectStore {
    /// Open the store, creating the root directory if needed
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();

        if let Ok(existing) = fs::metadata(&root).await {
            if !existing.is_dir() {
                return Err(StoreError::Backend(format!("store root {} is not a directory", root.display())));
            }
        }

        fs::create_dir_all(&root)
            .await
            .map_err(|e| backend(&format!("cannot create store root {}", root.display()), e))?;

        let metadata = fs::metadata(&root)
            .await
            .map_err(|e| backend(&format!("cannot access store root {}", root.display()), e))?;
        if metadata.permissions().readonly() {
            return Err(StoreError::Backend(format!("store root {} is read-only", root.display())));
        }

        Ok(Self {
            root,
            lock: Mutex::new(()),
        })
    }

    /// Root directory of the store
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding one object
    pub fn object_dir(&self, namespace: &str, name: &str) -> Result<PathBuf, StoreError> {
        check_component("namespace", namespace)?;
        check_component("name", name)?;
        Ok(self.root.join(namespace).join(name))
    }

    async fn read_meta(&self, dir: &Path) -> Result<Option<ObjectMeta>, StoreError> {
        match fs::read(dir.join(META_FILE)).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| StoreError::Backend(format!("corrupt object metadata in {}: {}", dir.display(), e))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(backend(&format!("cannot read {}", dir.display()), e)),
        }
    }

    async fn write_object(
        &self,
        dir: &Path,
        object: &StoredObject,
        previous_keys: &[String],
    ) -> Result<(), StoreError> {
        let data_dir = dir.join(DATA_DIR);
        fs::create_dir_all(&data_dir)
            .await
            .map_err(|e| backend(&format!("cannot create {}", data_dir.display()), e))?;

        for (key, value) in &object.binary_data {
            check_component("data key", key)?;
            write_atomic(&data_dir.join(key), value).await?;
        }

        for stale in previous_keys.iter().filter(|k| !object.binary_data.contains_key(*k)) {
            let path = data_dir.join(stale);
            if let Err(e) = fs::remove_file(&path).await {
                if e.kind() != io::ErrorKind::NotFound {
                    return Err(backend(&format!("cannot remove {}", path.display()), e));
                }
            }
        }

        let meta = ObjectMeta {
            name: object.name.clone(),
            namespace: object.namespace.clone(),
            annotations: object.annotations.clone(),
            keys: object.binary_data.keys().cloned().collect(),
            revision: object.revision,
        };
        let encoded = serde_json::to_vec_pretty(&meta)
            .map_err(|e| StoreError::Backend(format!("cannot encode object metadata: {}", e)))?;

        // metadata goes last: it is what makes the new revision visible
        write_atomic(&dir.join(META_FILE), &encoded).await
    }
}

#[async_trait]
impl ObjectStore for FileObjectStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<StoredObject>, StoreError> {
        let dir = self.object_dir(namespace, name)?;
        let _guard = self.lock.lock().await;

        let Some(meta) = self.read_meta(&dir).await? else {
            return Ok(None);
        };

        let mut binary_data = BTreeMap::new();
        for key in meta.keys {
            let path = dir.join(DATA_DIR).join(&key);
            let value = fs::read(&path)
                .await
                .map_err(|e| backend(&format!("cannot read {}", path.display()), e))?;
            binary_data.insert(key, value);
        }

        Ok(Some(StoredObject {
            name: meta.name,
            namespace: meta.namespace,
            annotations: meta.annotations,
            binary_data,
            revision: meta.revision,
        }))
    }

    async fn create(&self, namespace: &str, mut object: StoredObject) -> Result<StoredObject, StoreError> {
        let dir = self.object_dir(namespace, &object.name)?;
        let _guard = self.lock.lock().await;

        if self.read_meta(&dir).await?.is_some() {
            return Err(StoreError::AlreadyExists {
                namespace: namespace.to_string(),
                name: object.name,
            });
        }

        object.namespace = namespace.to_string();
        object.revision = 1;
        self.write_object(&dir, &object, &[]).await?;
        Ok(object)
    }

    async fn update(&self, namespace: &str, mut object: StoredObject) -> Result<StoredObject, StoreError> {
        let dir = self.object_dir(namespace, &object.name)?;
        let _guard = self.lock.lock().await;

        let current = self.read_meta(&dir).await?.ok_or_else(|| StoreError::NotFound {
            namespace: namespace.to_string(),
            name: object.name.clone(),
        })?;

        if current.revision != object.revision {
            return Err(StoreError::Conflict {
                namespace: namespace.to_string(),
                name: object.name,
                expected: object.revision,
                found: current.revision,
            });
        }

        object.namespace = namespace.to_string();
        object.revision += 1;
        self.write_object(&dir, &object, &current.keys).await?;
        Ok(object)
    }

    fn describe(&self) -> String {
        self.root.display().to_string()
    }
}

fn backend(context: &str, error: io::Error) -> StoreError {
    StoreError::Backend(format!("{}: {}", context, error))
}

/// Names become path components, so keep them to one plain segment
fn check_component(what: &str, value: &str) -> Result<(), StoreError> {
    let valid = !value.is_empty()
        && !value.starts_with('.')
        && !value.contains(['/', '\\'])
        && value != "..";
    if valid {
        Ok(())
    } else {
        Err(StoreError::Backend(format!("invalid {} '{}'", what, value)))
    }
}

async fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), StoreError> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{}.tmp", file_name));

    fs::write(&tmp, contents)
        .await
        .map_err(|e| backend(&format!("cannot write {}", tmp.display()), e))?;
    fs::rename(&tmp, path)
        .await
        .map_err(|e| backend(&format!("cannot replace {}", path.display()), e))
}
