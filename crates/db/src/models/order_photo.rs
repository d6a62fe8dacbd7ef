//! Uploaded photo for one role of an order.

use pickabook_core::types::{OrderId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct OrderPhoto {
    pub id: i64,
    pub order_id: OrderId,
    pub role: String,
    /// `file://` URL, `http(s)://` URL or local path.
    pub photo_ref: String,
    pub face_index: i32,
    pub created_at: Timestamp,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateOrderPhoto {
    pub role: String,
    pub photo_ref: String,
    pub face_index: Option<i32>,
}
