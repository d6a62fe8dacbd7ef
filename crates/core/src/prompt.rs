//! Book prompt descriptor (`prompts.json`).

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::Role;

pub const PROMPTS_FILE: &str = "prompts.json";

pub const DEFAULT_MASTER_PROMPT: &str = "Use Image 1 as the identity of the {role}: keep the face, \
    hair and {skin_tone} skin tone. Use Image 2 as the pose and body reference. \
    Full body children's book illustration of the {role}, soft lighting, plain white background.";

pub const DEFAULT_PAGE_PROMPT: &str = "Use Image 1 as the identity of the {role} and keep the \
    illustration style exactly. Use Image 2 for the pose, clothing and framing. \
    Full body children's book illustration of the {role}, {skin_tone} skin tone, plain white background.";

pub const DEFAULT_NEGATIVE_PROMPT: &str =
    "photorealistic, real photo, skin texture, pores, ugly, deformed, blurry, low quality";

pub const DEFAULT_STYLE_STRENGTH: f32 = 0.9;

/// Prompt templates for one book. Every field falls back to a built-in
/// default when absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BookPrompts {
    pub master_prompt: String,
    pub page_prompt: String,
    pub negative_prompt: String,
    pub style_strength: f32,
}

impl Default for BookPrompts {
    fn default() -> Self {
        Self {
            master_prompt: DEFAULT_MASTER_PROMPT.to_string(),
            page_prompt: DEFAULT_PAGE_PROMPT.to_string(),
            negative_prompt: DEFAULT_NEGATIVE_PROMPT.to_string(),
            style_strength: DEFAULT_STYLE_STRENGTH,
        }
    }
}

impl BookPrompts {
    pub fn parse(json: &str) -> Result<Self, CoreError> {
        serde_json::from_str(json)
            .map_err(|e| CoreError::Validation(format!("Invalid {PROMPTS_FILE}: {e}")))
    }

    pub fn master(&self, role: &Role, skin_tone: &str) -> String {
        render(&self.master_prompt, role, skin_tone)
    }

    pub fn page(&self, role: &Role, skin_tone: &str) -> String {
        render(&self.page_prompt, role, skin_tone)
    }
}

/// Substitute `{role}` and `{skin_tone}` placeholders.
pub fn render(template: &str, role: &Role, skin_tone: &str) -> String {
    template
        .replace("{role}", role.as_str())
        .replace("{skin_tone}", skin_tone)
}
