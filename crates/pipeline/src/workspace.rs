//! On-disk layout of one order's working files.
//!
//! ```text
//! <orders_root>/<order_id>/
//!     photos/photo_<role>.png
//!     identity/<role>/identity.json
//!     identity/<role>/face_ref_<role>.png
//!     generated/master_<role>.png
//!     generated/page_<page_id>_<role>.png
//!     pages/page_<page_id>.png
//! ```

use std::path::{Path, PathBuf};

use pickabook_core::error::CoreError;
use pickabook_core::types::{OrderId, Role};

#[derive(Debug, Clone)]
pub struct OrderWorkspace {
    order_id: OrderId,
    root: PathBuf,
}

impl OrderWorkspace {
    pub fn new(orders_root: &Path, order_id: OrderId) -> Self {
        Self {
            order_id,
            root: orders_root.join(order_id.to_string()),
        }
    }

    pub fn order_id(&self) -> OrderId {
        self.order_id
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn photo_path(&self, role: &Role) -> PathBuf {
        self.root.join("photos").join(format!("photo_{role}.png"))
    }

    pub fn identity_dir(&self, role: &Role) -> PathBuf {
        self.root.join("identity").join(role.as_str())
    }

    pub fn identity_record_path(&self, role: &Role) -> PathBuf {
        self.identity_dir(role).join("identity.json")
    }

    pub fn face_crop_path(&self, role: &Role) -> PathBuf {
        self.identity_dir(role).join(format!("face_ref_{role}.png"))
    }

    pub fn master_path(&self, role: &Role) -> PathBuf {
        self.root.join("generated").join(format!("master_{role}.png"))
    }

    pub fn page_variant_path(&self, page_id: &str, role: &Role) -> PathBuf {
        self.root
            .join("generated")
            .join(format!("page_{page_id}_{role}.png"))
    }

    pub fn page_output_path(&self, page_id: &str) -> PathBuf {
        self.root.join("pages").join(format!("page_{page_id}.png"))
    }

    /// `path` relative to the order root, for records stored alongside it.
    pub fn relative<'a>(&self, path: &'a Path) -> &'a Path {
        path.strip_prefix(&self.root).unwrap_or(path)
    }
}

/// Write `bytes` to `path`, creating parent directories.
pub async fn write_file(path: &Path, bytes: &[u8]) -> Result<(), CoreError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| CoreError::Storage(format!("Create {}: {e}", parent.display())))?;
    }
    tokio::fs::write(path, bytes)
        .await
        .map_err(|e| CoreError::Storage(format!("Write {}: {e}", path.display())))
}

/// Remove `path` if it exists.
pub async fn remove_if_exists(path: &Path) -> Result<(), CoreError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(CoreError::Storage(format!("Remove {}: {e}", path.display()))),
    }
}

/// Whether `path` exists; I/O errors count as absent.
pub async fn exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}
