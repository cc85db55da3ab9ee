use std::path::{Path, PathBuf};

use anyhow::Result;
use tokio::fs;
use uuid::Uuid;

/// Where a freshly named upload will live on disk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredLocation {
    pub stored_name: String,
    pub path: PathBuf,
}

/// Upload files laid out as `<root>/<owner_id>/<uuid><ext>`.
#[derive(Clone, Debug)]
pub struct UploadStorage {
    root: PathBuf,
}

impl UploadStorage {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn ensure_root(&self) -> Result<()> {
        fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    /// Generates a fresh stored name for `original_name` and makes sure the
    /// owner's directory exists.
    pub async fn name_for(&self, original_name: &str, owner_id: i64) -> std::io::Result<StoredLocation> {
        let stored_name = format!("{}{}", Uuid::new_v4(), extension_of(original_name));
        let owner_dir = self.owner_dir(owner_id);
        fs::create_dir_all(&owner_dir).await?;
        let path = owner_dir.join(&stored_name);
        Ok(StoredLocation { stored_name, path })
    }

    pub fn resolve(&self, owner_id: i64, stored_name: &str) -> PathBuf {
        self.owner_dir(owner_id).join(stored_name)
    }

    fn owner_dir(&self, owner_id: i64) -> PathBuf {
        self.root.join(owner_id.to_string())
    }
}

/// Lowercased extension of the last path component, dot included. Leading
/// dots belong to the name, so `.bashrc` has none while `file.` keeps `.`.
pub fn extension_of(file_name: &str) -> String {
    let base = file_name.rsplit(['/', '\\']).next().unwrap_or(file_name);
    let stem = base.trim_start_matches('.');
    match stem.rfind('.') {
        Some(index) => stem[index..].to_lowercase(),
        None => String::new(),
    }
}
