use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Orders are keyed by UUID.
pub type OrderId = uuid::Uuid;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Maximum length of a role tag.
const MAX_ROLE_LEN: usize = 32;

/// A character role tag such as `"child"` or `"mom"`.
///
/// Roles join character assets to template slots and also appear in asset
/// file names (`ref_<role>.png`, `master_<role>.png`), so only lowercase
/// ASCII letters, digits and underscores are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Role(String);

impl Role {
    pub fn new(tag: impl Into<String>) -> Result<Self, CoreError> {
        let tag = tag.into();
        if tag.is_empty() || tag.len() > MAX_ROLE_LEN {
            return Err(CoreError::Validation(format!(
                "Role must be 1-{MAX_ROLE_LEN} characters, got '{tag}'"
            )));
        }
        if !tag
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        {
            return Err(CoreError::Validation(format!(
                "Role '{tag}' may only contain lowercase letters, digits, or underscores"
            )));
        }
        Ok(Self(tag))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Role {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        role.0
    }
}
