//! Page-template descriptors.
//!
//! A book template lives under `<assets_root>/templates/<book_id>/<version>/`
//! with one directory per page (`pages/p001`, `pages/p002`, ...). Each page
//! has a background image and a `slot.json` describing where characters go.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::Role;

pub const BACKGROUND_FILE: &str = "bg.png";
pub const SLOT_FILE: &str = "slot.json";

/// How a character image is fitted into its slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScaleMode {
    /// Stretch to exactly the slot width and height.
    #[default]
    #[serde(rename = "exact")]
    ExactFill,
    /// Scale uniformly to the slot height, shrinking further if the result
    /// is wider than the slot. Centered horizontally, bottom-anchored.
    #[serde(rename = "fit_height")]
    FitHeight,
}

/// Slot geometry in background-pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotRect {
    pub x: i32,
    pub y: i32,
    pub w: u32,
    pub h: u32,
}

impl SlotRect {
    pub fn is_empty(&self) -> bool {
        self.w == 0 || self.h == 0
    }

    /// Y coordinate one past the last row of the slot.
    pub fn bottom(&self) -> i64 {
        i64::from(self.y) + i64::from(self.h)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slot {
    pub slot_id: String,
    pub role: Role,
    #[serde(rename = "bbox_px")]
    pub bbox: SlotRect,
    #[serde(default)]
    pub z_index: i32,
    #[serde(default)]
    pub rotation_deg: f32,
    #[serde(default)]
    pub scale_mode: ScaleMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Canvas {
    pub width_px: u32,
    pub height_px: u32,
}

/// Contents of a page's `slot.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SlotFile {
    #[serde(default)]
    pub page_id: Option<String>,
    #[serde(default)]
    pub canvas: Option<Canvas>,
    #[serde(default)]
    pub slots: Vec<Slot>,
}

impl SlotFile {
    pub fn parse(json: &str, path: &Path) -> Result<Self, CoreError> {
        serde_json::from_str(json).map_err(|e| {
            CoreError::Composition(format!("Invalid slot file {}: {e}", path.display()))
        })
    }
}

/// One page of a book template, resolved on disk.
#[derive(Debug, Clone)]
pub struct PageTemplate {
    pub page_number: u32,
    /// Directory name, e.g. `p001`.
    pub page_id: String,
    pub dir: PathBuf,
    pub canvas: Option<Canvas>,
    pub slots: Vec<Slot>,
}

impl PageTemplate {
    pub fn background_path(&self) -> PathBuf {
        self.dir.join(BACKGROUND_FILE)
    }

    /// Page reference image for `role` (`ref_<role>.png`).
    pub fn reference_path(&self, role: &Role) -> PathBuf {
        self.dir.join(format!("ref_{role}.png"))
    }

    /// Distinct roles placed on this page, in slot order.
    pub fn roles(&self) -> Vec<Role> {
        let mut roles: Vec<Role> = Vec::new();
        for slot in &self.slots {
            if !roles.contains(&slot.role) {
                roles.push(slot.role.clone());
            }
        }
        roles
    }
}

/// Identifies one template version of a book.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateRef {
    pub book_id: String,
    pub version: String,
}

impl TemplateRef {
    pub fn new(book_id: impl Into<String>, version: impl Into<String>) -> Result<Self, CoreError> {
        let book_id = book_id.into();
        let version = version.into();
        for (name, value) in [("book_id", &book_id), ("version", &version)] {
            if !is_safe_component(value) {
                return Err(CoreError::Validation(format!(
                    "Invalid {name} '{value}' for a template path"
                )));
            }
        }
        Ok(Self { book_id, version })
    }

    /// `<assets_root>/templates/<book_id>/<version>`
    pub fn dir(&self, assets_root: &Path) -> PathBuf {
        assets_root
            .join("templates")
            .join(&self.book_id)
            .join(&self.version)
    }

    pub fn pages_dir(&self, assets_root: &Path) -> PathBuf {
        self.dir(assets_root).join("pages")
    }
}

fn is_safe_component(value: &str) -> bool {
    !value.is_empty()
        && value != "."
        && value != ".."
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

/// Candidate master-reference file names for `role`, in lookup order.
pub fn master_reference_names(role: &Role) -> [String; 2] {
    [format!("ref_master_{role}.png"), format!("master_ref_{role}.png")]
}

/// Page number for a page directory name of the form `p<digits>`.
pub fn parse_page_dir_name(name: &str) -> Option<u32> {
    let digits = name.strip_prefix('p')?;
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}
