//! Durable blob storage for ingested file bytes.
//!
//! [`DirBlobStore`] keeps content-addressed copies at
//! `<root>/<first two hex digits>/<sha256 hex>`; storing the same bytes twice
//! is a no-op.

use std::fs::File;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::error::DispatchError;

/// Handle to a stored blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobRef {
    pub key: String,
    pub size: u64,
}

/// Where `DispatcherWrapper::store_file` writes file bytes.
pub trait BlobStore: Send {
    /// Persist the contents of `path` under a key derived from its bytes.
    fn store(&self, filename: &str, path: &Path) -> Result<BlobRef, DispatchError>;
}

#[derive(Debug, Clone)]
pub struct DirBlobStore {
    root: PathBuf,
}

impl DirBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Location of the blob with `key`.
    pub fn blob_path(&self, key: &str) -> PathBuf {
        let shard = key.get(..2).unwrap_or(key);
        self.root.join(shard).join(key)
    }
}

impl BlobStore for DirBlobStore {
    fn store(&self, filename: &str, path: &Path) -> Result<BlobRef, DispatchError> {
        let blob_err = |source| DispatchError::Blob {
            filename: filename.to_string(),
            source,
        };

        // Streamed: data files can be far larger than memory.
        let mut source = File::open(path).map_err(blob_err)?;
        let mut hasher = Sha256::new();
        let size = std::io::copy(&mut source, &mut hasher).map_err(blob_err)?;
        let key = hex::encode(hasher.finalize());

        let dest = self.blob_path(&key);
        if !dest.exists() {
            if let Some(dir) = dest.parent() {
                std::fs::create_dir_all(dir).map_err(blob_err)?;
            }
            let tmp = dest.with_extension("tmp");
            std::fs::copy(path, &tmp).map_err(blob_err)?;
            std::fs::rename(&tmp, &dest).map_err(blob_err)?;
        }

        tracing::debug!(filename, key = %key, size, "stored blob");
        Ok(BlobRef { key, size })
    }
}
