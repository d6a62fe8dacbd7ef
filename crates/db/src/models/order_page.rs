//! Composited page record.

use pickabook_core::types::{OrderId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A finished page. Presence of a row means the page is done.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct OrderPage {
    pub id: i64,
    pub order_id: OrderId,
    pub page_number: i32,
    pub page_id: String,
    pub image_url: String,
    pub local_path: Option<String>,
    /// `{"<role>": "<tier>"}` for the character images used.
    pub tiers: serde_json::Value,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpsertOrderPage {
    pub page_number: i32,
    pub page_id: String,
    pub image_url: String,
    pub local_path: Option<String>,
    pub tiers: serde_json::Value,
}
