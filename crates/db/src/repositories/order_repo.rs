//! Repository for the `orders` table.

use std::time::Duration;

use pickabook_core::order::OrderState;
use pickabook_core::types::OrderId;
use sqlx::PgPool;

use crate::models::order::{CreateOrder, Order};

/// Column list for `orders` queries.
const COLUMNS: &str = "\
    id, book_id, template_version, state, failure_reason, attempts, \
    started_at, completed_at, created_at, updated_at";

/// States a worker holds an order in while processing it.
const IN_PROGRESS: &str = "'validating', 'generating', 'compositing'";

/// Provides query operations for orders.
pub struct OrderRepo;

impl OrderRepo {
    // ── Queries ──────────────────────────────────────────────────────

    /// Insert a new queued order, returning the created row.
    pub async fn create(pool: &PgPool, input: &CreateOrder) -> Result<Order, sqlx::Error> {
        let query = format!(
            "INSERT INTO orders (id, book_id, template_version) \
             VALUES ($1, $2, COALESCE($3, 'v1')) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Order>(&query)
            .bind(uuid::Uuid::now_v7())
            .bind(&input.book_id)
            .bind(&input.template_version)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: OrderId) -> Result<Option<Order>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM orders WHERE id = $1");
        sqlx::query_as::<_, Order>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Atomically claim the oldest runnable order.
    ///
    /// Runnable means `queued`, or stuck in an in-progress state with no
    /// update for `stale_after` (its worker died) and fewer than
    /// `max_attempts` attempts. The claimed row moves to `validating` and
    /// its attempt counter is bumped. Concurrent workers skip rows already
    /// locked by another claim.
    pub async fn claim_next(
        pool: &PgPool,
        stale_after: Duration,
        max_attempts: i32,
    ) -> Result<Option<Order>, sqlx::Error> {
        let query = format!(
            "UPDATE orders SET \
                state = 'validating', \
                attempts = attempts + 1, \
                failure_reason = NULL, \
                started_at = NOW(), \
                completed_at = NULL, \
                updated_at = NOW() \
             WHERE id = ( \
                SELECT id FROM orders \
                WHERE state = 'queued' \
                   OR (state IN ({IN_PROGRESS}) \
                       AND updated_at < NOW() - make_interval(secs => $1) \
                       AND attempts < $2) \
                ORDER BY created_at \
                FOR UPDATE SKIP LOCKED \
                LIMIT 1 \
             ) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Order>(&query)
            .bind(stale_after.as_secs_f64())
            .bind(max_attempts)
            .fetch_optional(pool)
            .await
    }

    /// Fail stale in-progress orders that have used up `max_attempts`.
    /// Returns how many were failed.
    pub async fn fail_abandoned(
        pool: &PgPool,
        stale_after: Duration,
        max_attempts: i32,
    ) -> Result<u64, sqlx::Error> {
        let query = format!(
            "UPDATE orders SET \
                state = 'failed', \
                failure_reason = 'Abandoned after ' || attempts || ' attempts', \
                completed_at = NOW(), \
                updated_at = NOW() \
             WHERE state IN ({IN_PROGRESS}) \
               AND updated_at < NOW() - make_interval(secs => $1) \
               AND attempts >= $2"
        );
        let result = sqlx::query(&query)
            .bind(stale_after.as_secs_f64())
            .bind(max_attempts)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Refresh `updated_at` so a long-running order is not taken for stale.
    pub async fn touch(pool: &PgPool, id: OrderId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE orders SET updated_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    // ── State transitions ────────────────────────────────────────────

    /// Record a state change. Terminal states stamp `completed_at`;
    /// `failure_reason` is replaced (cleared when `None`).
    pub async fn set_state(
        pool: &PgPool,
        id: OrderId,
        state: OrderState,
        failure_reason: Option<&str>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE orders SET \
                state = $2, \
                failure_reason = $3, \
                completed_at = CASE WHEN $4 THEN NOW() ELSE completed_at END, \
                updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(state.as_str())
        .bind(failure_reason)
        .bind(state.is_terminal())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}
