//! File-backed key-value store.
//!
//! Keeps one JSON document per namespace at `<dir>/<service>.json`.
//! Every mutation rewrites the whole document through a temporary file
//! and a rename, so a multi-key write lands on disk all at once.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use crate::store::{KeyValueStore, StoreError};

/// Document format version written to disk.
const DOCUMENT_FORMAT: u32 = 1;

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreDocument {
    format: u32,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    entries: BTreeMap<String, String>,
}

/// JSON file store for one namespace.
pub struct FileStore {
    path: PathBuf,
    /// Serializes read-modify-write cycles within this process
    lock: Mutex<()>,
}

impl FileStore {
    /// Open the store for `service` inside `dir`. The file is created lazily
    /// on the first write.
    pub fn open(dir: impl AsRef<Path>, service: &str) -> Self {
        let path = dir.as_ref().join(format!("{}.json", sanitize_service(service)));
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    /// Path of the backing document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Last time the document was written, if it exists.
    pub async fn updated_at(&self) -> Result<Option<DateTime<Utc>>, StoreError> {
        let _guard = self.lock.lock().await;
        Ok(self.read_document().await?.updated_at)
    }

    async fn read_document(&self) -> Result<StoreDocument, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => {
                let doc: StoreDocument = serde_json::from_slice(&bytes)?;
                if doc.format > DOCUMENT_FORMAT {
                    return Err(StoreError::Serialization(format!(
                        "unsupported store format {} in {}",
                        doc.format,
                        self.path.display()
                    )));
                }
                Ok(doc)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Store file {:?} not found, treating as empty", self.path);
                Ok(StoreDocument {
                    format: DOCUMENT_FORMAT,
                    ..StoreDocument::default()
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn write_document(&self, mut doc: StoreDocument) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        doc.format = DOCUMENT_FORMAT;
        doc.updated_at = Some(Utc::now());

        let content = serde_json::to_vec_pretty(&doc)?;
        let tmp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, content).await?;
        tokio::fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }
}

/// Replace path separators and other awkward characters in a service identifier.
fn sanitize_service(service: &str) -> String {
    let cleaned: String = service
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.trim_matches('.').is_empty() {
        "default".to_string()
    } else {
        cleaned
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let _guard = self.lock.lock().await;
        Ok(self.read_document().await?.entries.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.set_many(&[(key, value)]).await
    }

    async fn set_many(&self, entries: &[(&str, &str)]) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let mut doc = self.read_document().await?;
        for (key, value) in entries {
            doc.entries.insert((*key).to_string(), (*value).to_string());
        }
        self.write_document(doc).await
    }

    async fn remove_all(&self) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
