//! Postgres-backed [`ProgressStore`].

use std::collections::BTreeSet;

use async_trait::async_trait;
use pickabook_core::error::CoreError;
use pickabook_core::order::OrderState;
use pickabook_core::types::OrderId;
use pickabook_db::models::order_page::UpsertOrderPage;
use pickabook_db::repositories::{OrderPageRepo, OrderRepo};
use pickabook_db::DbPool;
use pickabook_pipeline::{PageRecord, ProgressStore};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Order {0} does not exist")]
    OrderNotFound(OrderId),

    #[error("Page number {0} is out of range")]
    PageNumberOutOfRange(i64),
}

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        CoreError::Storage(err.to_string())
    }
}

#[derive(Clone)]
pub struct PgProgressStore {
    pool: DbPool,
}

impl PgProgressStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProgressStore for PgProgressStore {
    async fn set_state(
        &self,
        order_id: OrderId,
        state: OrderState,
        failure_reason: Option<&str>,
    ) -> Result<(), CoreError> {
        let updated = OrderRepo::set_state(&self.pool, order_id, state, failure_reason)
            .await
            .map_err(StoreError::from)?;
        if !updated {
            return Err(StoreError::OrderNotFound(order_id).into());
        }
        Ok(())
    }

    async fn completed_pages(&self, order_id: OrderId) -> Result<BTreeSet<u32>, CoreError> {
        let numbers = OrderPageRepo::completed_page_numbers(&self.pool, order_id)
            .await
            .map_err(StoreError::from)?;
        numbers
            .into_iter()
            .map(|n| {
                u32::try_from(n)
                    .map_err(|_| CoreError::from(StoreError::PageNumberOutOfRange(n.into())))
            })
            .collect()
    }

    async fn record_page(&self, order_id: OrderId, page: &PageRecord) -> Result<(), CoreError> {
        let page_number = i32::try_from(page.page_number)
            .map_err(|_| StoreError::PageNumberOutOfRange(page.page_number.into()))?;
        let input = UpsertOrderPage {
            page_number,
            page_id: page.page_id.clone(),
            image_url: page.image_url.clone(),
            local_path: page.local_path.clone(),
            tiers: page.tiers_json(),
        };
        OrderPageRepo::upsert(&self.pool, order_id, &input)
            .await
            .map_err(StoreError::from)?;
        // Each finished page keeps the claim fresh.
        OrderRepo::touch(&self.pool, order_id)
            .await
            .map_err(StoreError::from)?;
        Ok(())
    }
}
