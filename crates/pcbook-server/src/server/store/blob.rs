use super::BlobStore;
use bytes::Bytes;
use parking_lot::RwLock;
use pcbook_core::{Error, Result};
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};
use tokio::{fs, io::AsyncWriteExt};
use uuid::Uuid;

/// A blob that was written in full.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobRecord {
    pub id: String,
    pub owner_id: String,
    pub content_type: String,
    pub size: usize,
    pub path: PathBuf,
}

/// Checks that a content-type tag is a plain file extension such as `.jpg`.
///
/// The tag ends up in a file name, so anything other than an optional leading
/// dot followed by 1 to 16 ASCII alphanumerics is rejected.
pub fn validate_content_type(content_type: &str) -> Result<()> {
    let ext = content_type.strip_prefix('.').unwrap_or(content_type);
    if ext.is_empty() || ext.len() > 16 || !ext.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return Err(Error::invalid_argument(format!(
            "Image type {content_type:?} is not a valid file extension"
        )));
    }
    Ok(())
}

/// A [`BlobStore`] writing each payload to its own file in one directory.
///
/// Files are named `<uuid>.<ext>`. A payload is first written and synced to a
/// `.part` file and then renamed into place, so a failed upload never leaves
/// a file under a final name. Successful writes are indexed in memory.
#[derive(Debug)]
pub struct DiskBlobStore {
    dir: PathBuf,
    max_size: usize,
    blobs: RwLock<HashMap<String, BlobRecord>>,
}

impl DiskBlobStore {
    pub fn new(dir: impl Into<PathBuf>, max_size: usize) -> Self {
        Self {
            dir: dir.into(),
            max_size,
            blobs: RwLock::new(HashMap::new()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn get(&self, id: &str) -> Option<BlobRecord> {
        self.blobs.read().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.read().is_empty()
    }
}

impl BlobStore for DiskBlobStore {
    async fn save(&self, owner_id: &str, content_type: &str, data: Bytes) -> Result<BlobRecord> {
        if data.len() > self.max_size {
            return Err(Error::PayloadTooLarge {
                size: data.len(),
                max: self.max_size,
            });
        }
        validate_content_type(content_type)?;

        let id = Uuid::new_v4().to_string();
        let ext = content_type.strip_prefix('.').unwrap_or(content_type);
        let path = self.dir.join(format!("{id}.{ext}"));
        let part = self.dir.join(format!("{id}.{ext}.part"));

        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| Error::internal(format!("create blob directory: {e}")))?;

        if let Err(e) = write_synced(&part, &data).await {
            let _ = fs::remove_file(&part).await;
            return Err(Error::internal(format!("write blob {id}: {e}")));
        }
        if let Err(e) = fs::rename(&part, &path).await {
            let _ = fs::remove_file(&part).await;
            return Err(Error::internal(format!("commit blob {id}: {e}")));
        }

        let record = BlobRecord {
            id: id.clone(),
            owner_id: owner_id.to_string(),
            content_type: content_type.to_string(),
            size: data.len(),
            path,
        };
        self.blobs.write().insert(id, record.clone());

        tracing::debug!(
            blob_id = %record.id,
            size = record.size,
            path = %record.path.display(),
            "Blob written"
        );
        Ok(record)
    }
}

async fn write_synced(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(path).await?;
    file.write_all(data).await?;
    file.sync_all().await?;
    Ok(())
}
