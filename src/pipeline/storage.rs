//! Storage collaborator
//!
//! The pipeline needs two things from storage: a local readable path for an
//! input reference, and a way to persist a local output file and learn its
//! public URL and size.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, StemforgeError};

const UPLOADS_DIR: &str = "uploads";

/// A persisted output file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredObject {
    pub url: String,
    pub size_bytes: u64,
}

pub trait Storage: Send + Sync {
    /// Local readable path for an input reference.
    fn resolve_input(&self, reference: &str) -> Result<PathBuf>;

    /// Persist `local` under `key`.
    fn persist(&self, local: &Path, key: &str) -> Result<StoredObject>;
}

/// Storage rooted at a local directory
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
    base_url: String,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>, base_url: impl Into<String>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(root.join(UPLOADS_DIR))?;
        Ok(Self {
            root,
            base_url: base_url.into(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Copy a file into the uploads area and return its reference.
    pub fn store_upload(&self, source: &Path) -> Result<String> {
        if !source.is_file() {
            return Err(StemforgeError::SourceNotFound {
                path: source.to_path_buf(),
            });
        }
        let name = source
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| StemforgeError::Internal(format!("invalid file name: {}", source.display())))?;
        let reference = format!("{}_{}", &uuid::Uuid::new_v4().simple().to_string()[..8], name);
        fs::copy(source, self.root.join(UPLOADS_DIR).join(&reference))?;
        debug!(reference = %reference, "Upload stored");
        Ok(reference)
    }

    fn url_for(&self, key: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), key)
    }
}

impl Storage for LocalStorage {
    fn resolve_input(&self, reference: &str) -> Result<PathBuf> {
        let path = self.root.join(UPLOADS_DIR).join(reference);
        if path.is_file() {
            Ok(path)
        } else {
            Err(StemforgeError::SourceNotFound { path })
        }
    }

    fn persist(&self, local: &Path, key: &str) -> Result<StoredObject> {
        let dest = self.root.join(key);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        let size_bytes = fs::copy(local, &dest)?;
        Ok(StoredObject {
            url: self.url_for(key),
            size_bytes,
        })
    }
}
