//! Repository for the `order_pages` table.

use pickabook_core::types::OrderId;
use sqlx::PgPool;

use crate::models::order_page::{OrderPage, UpsertOrderPage};

/// Column list for `order_pages` queries.
const COLUMNS: &str = "\
    id, order_id, page_number, page_id, image_url, local_path, tiers, \
    created_at, updated_at";

pub struct OrderPageRepo;

impl OrderPageRepo {
    /// Record a finished page, replacing any earlier record for the same
    /// page number. The order's `updated_at` is touched in the same
    /// transaction.
    pub async fn upsert(
        pool: &PgPool,
        order_id: OrderId,
        input: &UpsertOrderPage,
    ) -> Result<OrderPage, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let query = format!(
            "INSERT INTO order_pages (order_id, page_number, page_id, image_url, local_path, tiers) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (order_id, page_number) DO UPDATE SET \
                page_id = EXCLUDED.page_id, \
                image_url = EXCLUDED.image_url, \
                local_path = EXCLUDED.local_path, \
                tiers = EXCLUDED.tiers, \
                updated_at = NOW() \
             RETURNING {COLUMNS}"
        );
        let page = sqlx::query_as::<_, OrderPage>(&query)
            .bind(order_id)
            .bind(input.page_number)
            .bind(&input.page_id)
            .bind(&input.image_url)
            .bind(&input.local_path)
            .bind(&input.tiers)
            .fetch_one(&mut *tx)
            .await?;

        sqlx::query("UPDATE orders SET updated_at = NOW() WHERE id = $1")
            .bind(order_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(page)
    }

    pub async fn list_for_order(
        pool: &PgPool,
        order_id: OrderId,
    ) -> Result<Vec<OrderPage>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM order_pages WHERE order_id = $1 ORDER BY page_number"
        );
        sqlx::query_as::<_, OrderPage>(&query)
            .bind(order_id)
            .fetch_all(pool)
            .await
    }

    /// Page numbers that already have a composited image.
    pub async fn completed_page_numbers(
        pool: &PgPool,
        order_id: OrderId,
    ) -> Result<Vec<i32>, sqlx::Error> {
        sqlx::query_scalar::<_, i32>(
            "SELECT page_number FROM order_pages WHERE order_id = $1 ORDER BY page_number",
        )
        .bind(order_id)
        .fetch_all(pool)
        .await
    }
}
