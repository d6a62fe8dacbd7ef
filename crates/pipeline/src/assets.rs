//! Template library: resolves a book template on disk.

use std::path::{Path, PathBuf};

use image::RgbaImage;
use pickabook_core::error::CoreError;
use pickabook_core::prompt::{BookPrompts, PROMPTS_FILE};
use pickabook_core::template::{
    master_reference_names, parse_page_dir_name, PageTemplate, SlotFile, TemplateRef, SLOT_FILE,
};
use pickabook_core::types::Role;

use crate::workspace::exists;

/// A fully resolved book template: prompts plus every page, ordered by
/// page number.
#[derive(Debug, Clone)]
pub struct BookTemplate {
    pub template: TemplateRef,
    pub dir: PathBuf,
    pub prompts: BookPrompts,
    pub pages: Vec<PageTemplate>,
}

impl BookTemplate {
    /// Master reference image for `role`, if the template ships one.
    pub async fn master_reference(&self, role: &Role) -> Option<PathBuf> {
        for name in master_reference_names(role) {
            let path = self.dir.join(name);
            if exists(&path).await {
                return Some(path);
            }
        }
        None
    }
}

#[derive(Debug, Clone)]
pub struct TemplateLibrary {
    assets_root: PathBuf,
}

impl TemplateLibrary {
    pub fn new(assets_root: impl Into<PathBuf>) -> Self {
        Self {
            assets_root: assets_root.into(),
        }
    }

    pub fn assets_root(&self) -> &Path {
        &self.assets_root
    }

    pub async fn load_book(&self, template: &TemplateRef) -> Result<BookTemplate, CoreError> {
        let dir = template.dir(&self.assets_root);
        let pages_dir = template.pages_dir(&self.assets_root);

        let mut entries = tokio::fs::read_dir(&pages_dir)
            .await
            .map_err(|_| CoreError::TemplateAssetMissing(pages_dir.clone()))?;

        let mut pages = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| CoreError::Storage(format!("Read {}: {e}", pages_dir.display())))?
        {
            let name = entry.file_name();
            let Some(page_number) = name.to_str().and_then(parse_page_dir_name) else {
                continue;
            };
            let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
            if !is_dir {
                continue;
            }
            pages.push(load_page_template(&entry.path(), page_number).await?);
        }
        pages.sort_by_key(|p| p.page_number);

        let prompts = load_prompts(&dir.join(PROMPTS_FILE)).await?;

        tracing::debug!(
            book_id = %template.book_id,
            version = %template.version,
            pages = pages.len(),
            "Loaded book template",
        );

        Ok(BookTemplate {
            template: template.clone(),
            dir,
            prompts,
            pages,
        })
    }
}

/// Load one page directory. A missing `slot.json` yields a page with no
/// slots; the background is checked when the page is composited.
pub async fn load_page_template(dir: &Path, page_number: u32) -> Result<PageTemplate, CoreError> {
    let slot_path = dir.join(SLOT_FILE);
    let slot_file = match tokio::fs::read_to_string(&slot_path).await {
        Ok(json) => SlotFile::parse(&json, &slot_path)?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => SlotFile::default(),
        Err(e) => {
            return Err(CoreError::Storage(format!(
                "Read {}: {e}",
                slot_path.display()
            )))
        }
    };

    let page_id = dir
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .unwrap_or_else(|| format!("p{page_number:03}"));

    Ok(PageTemplate {
        page_number,
        page_id,
        dir: dir.to_path_buf(),
        canvas: slot_file.canvas,
        slots: slot_file.slots,
    })
}

async fn load_prompts(path: &Path) -> Result<BookPrompts, CoreError> {
    match tokio::fs::read_to_string(path).await {
        Ok(json) => BookPrompts::parse(&json),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BookPrompts::default()),
        Err(e) => Err(CoreError::Storage(format!("Read {}: {e}", path.display()))),
    }
}

/// Decode a page background, failing with `TemplateAssetMissing` when the
/// file does not exist.
pub async fn load_background(page: &PageTemplate) -> Result<RgbaImage, CoreError> {
    let path = page.background_path();
    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(CoreError::TemplateAssetMissing(path))
        }
        Err(e) => return Err(CoreError::Storage(format!("Read {}: {e}", path.display()))),
    };
    image::load_from_memory(&bytes)
        .map(|img| img.to_rgba8())
        .map_err(|e| CoreError::Composition(format!("Decode {}: {e}", path.display())))
}
