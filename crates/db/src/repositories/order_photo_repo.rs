//! Repository for the `order_photos` table.

use pickabook_core::types::OrderId;
use sqlx::PgPool;

use crate::models::order_photo::{CreateOrderPhoto, OrderPhoto};

/// Column list for `order_photos` queries.
const COLUMNS: &str = "id, order_id, role, photo_ref, face_index, created_at";

pub struct OrderPhotoRepo;

impl OrderPhotoRepo {
    /// Attach a photo to an order. A second photo for the same role
    /// replaces the first.
    pub async fn add(
        pool: &PgPool,
        order_id: OrderId,
        input: &CreateOrderPhoto,
    ) -> Result<OrderPhoto, sqlx::Error> {
        let query = format!(
            "INSERT INTO order_photos (order_id, role, photo_ref, face_index) \
             VALUES ($1, $2, $3, COALESCE($4, 0)) \
             ON CONFLICT (order_id, role) DO UPDATE SET \
                photo_ref = EXCLUDED.photo_ref, \
                face_index = EXCLUDED.face_index \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, OrderPhoto>(&query)
            .bind(order_id)
            .bind(&input.role)
            .bind(&input.photo_ref)
            .bind(input.face_index)
            .fetch_one(pool)
            .await
    }

    pub async fn list_for_order(
        pool: &PgPool,
        order_id: OrderId,
    ) -> Result<Vec<OrderPhoto>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM order_photos WHERE order_id = $1 ORDER BY id");
        sqlx::query_as::<_, OrderPhoto>(&query)
            .bind(order_id)
            .fetch_all(pool)
            .await
    }
}
