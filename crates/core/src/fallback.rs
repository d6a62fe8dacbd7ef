//! Character fallback chain.
//!
//! For every role on a page the compositor needs exactly one image. The
//! chain tries, in priority order, the page-specific variant, the order's
//! master character, and finally the user's own photo.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::types::Role;

/// Kind of character image, in priority order (highest first).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CharacterTier {
    PageVariant,
    Master,
    RawPhoto,
}

impl CharacterTier {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PageVariant => "page_variant",
            Self::Master => "master",
            Self::RawPhoto => "raw_photo",
        }
    }
}

impl fmt::Display for CharacterTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An image on disk together with the tier it represents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacterAsset {
    pub tier: CharacterTier,
    pub path: PathBuf,
}

impl CharacterAsset {
    pub fn new(tier: CharacterTier, path: impl Into<PathBuf>) -> Self {
        Self {
            tier,
            path: path.into(),
        }
    }
}

/// Candidate assets for one role on one page.
#[derive(Debug, Clone)]
pub struct FallbackChain {
    role: Role,
    candidates: Vec<CharacterAsset>,
}

impl FallbackChain {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            candidates: Vec::new(),
        }
    }

    /// Offer a candidate; `None` means that tier is unavailable.
    pub fn offer(mut self, tier: CharacterTier, path: Option<PathBuf>) -> Self {
        if let Some(path) = path {
            self.candidates.push(CharacterAsset::new(tier, path));
        }
        self
    }

    pub fn role(&self) -> &Role {
        &self.role
    }

    /// The highest-priority candidate that was offered.
    pub fn resolve(&self) -> Option<&CharacterAsset> {
        self.candidates.iter().min_by_key(|asset| asset.tier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> FallbackChain {
        FallbackChain::new(Role::new("child").unwrap())
    }

    #[test]
    fn page_variant_supersedes_master() {
        let chain = chain()
            .offer(CharacterTier::RawPhoto, Some("photo.png".into()))
            .offer(CharacterTier::Master, Some("master.png".into()))
            .offer(CharacterTier::PageVariant, Some("page.png".into()));
        assert_eq!(chain.resolve().unwrap().tier, CharacterTier::PageVariant);
    }

    #[test]
    fn master_used_when_variant_missing() {
        let chain = chain()
            .offer(CharacterTier::PageVariant, None)
            .offer(CharacterTier::Master, Some("master.png".into()))
            .offer(CharacterTier::RawPhoto, Some("photo.png".into()));
        let asset = chain.resolve().unwrap();
        assert_eq!(asset.tier, CharacterTier::Master);
        assert_eq!(asset.path, PathBuf::from("master.png"));
    }

    #[test]
    fn raw_photo_is_last_resort() {
        let chain = chain()
            .offer(CharacterTier::PageVariant, None)
            .offer(CharacterTier::Master, None)
            .offer(CharacterTier::RawPhoto, Some("photo.png".into()));
        assert_eq!(chain.resolve().unwrap().tier, CharacterTier::RawPhoto);
        assert!(super::FallbackChain::new(Role::new("mom").unwrap()).resolve().is_none());
    }

    #[test]
    fn tier_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&CharacterTier::PageVariant).unwrap(), "\"page_variant\"");
        assert_eq!(CharacterTier::RawPhoto.to_string(), "raw_photo");
    }
}
