//! Order entity.

use pickabook_core::error::CoreError;
use pickabook_core::order::OrderState;
use pickabook_core::types::{OrderId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A storybook order and its pipeline state.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Order {
    pub id: OrderId,
    pub book_id: String,
    pub template_version: String,
    pub state: String,
    pub failure_reason: Option<String>,
    pub attempts: i32,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Order {
    pub fn state(&self) -> Result<OrderState, CoreError> {
        self.state.parse()
    }
}

/// DTO for creating an order.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateOrder {
    pub book_id: String,
    /// Defaults to `v1`.
    pub template_version: Option<String>,
}
