//! Queue runner.
//!
//! Polls the `orders` table for queued work every `poll_interval` and runs
//! each claimed order through the [`PipelineController`]. Claiming uses
//! [`OrderRepo::claim_next`] (`FOR UPDATE SKIP LOCKED`) so several workers
//! can share one database. Orders left in progress by a crashed worker are
//! reclaimed once stale and resume from their first unrecorded page.

use std::time::Duration;

use pickabook_core::error::CoreError;
use pickabook_core::order::OrderState;
use pickabook_core::template::TemplateRef;
use pickabook_core::types::Role;
use pickabook_db::models::order::Order;
use pickabook_db::models::order_photo::OrderPhoto;
use pickabook_db::repositories::{OrderPhotoRepo, OrderRepo};
use pickabook_db::DbPool;
use pickabook_pipeline::{OrderJob, OrderReport, PhotoInput, PipelineController};
use tokio_util::sync::CancellationToken;

/// How long an in-progress order may go without an update before another
/// worker reclaims it.
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(30 * 60);

/// Claims per order before a stale order is failed instead of reclaimed.
pub const DEFAULT_MAX_ATTEMPTS: i32 = 3;

#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Pipeline(#[from] CoreError),
}

pub struct OrderRunner {
    pool: DbPool,
    controller: PipelineController,
    poll_interval: Duration,
    stale_after: Duration,
    max_attempts: i32,
}

impl OrderRunner {
    pub fn new(pool: DbPool, controller: PipelineController, poll_interval: Duration) -> Self {
        Self {
            pool,
            controller,
            poll_interval,
            stale_after: DEFAULT_STALE_AFTER,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_reclaim(mut self, stale_after: Duration, max_attempts: i32) -> Self {
        self.stale_after = stale_after;
        self.max_attempts = max_attempts;
        self
    }

    /// Process orders until `cancel` fires. Cancellation is observed
    /// between orders; an order in flight runs to completion.
    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!(
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "Order runner started",
        );

        while !cancel.is_cancelled() {
            let idle = match self.process_next().await {
                Ok(Some(_)) => false,
                Ok(None) => true,
                Err(e) => {
                    tracing::error!(error = %e, "Order cycle failed");
                    true
                }
            };
            if !idle {
                continue;
            }

            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        tracing::info!("Order runner shutting down");
    }

    /// Claim and process one runnable order. Returns `None` when there is
    /// nothing to do.
    pub async fn process_next(&self) -> Result<Option<OrderReport>, RunnerError> {
        let abandoned =
            OrderRepo::fail_abandoned(&self.pool, self.stale_after, self.max_attempts).await?;
        if abandoned > 0 {
            tracing::warn!(count = abandoned, max_attempts = self.max_attempts, "Abandoned orders failed");
        }

        let Some(order) =
            OrderRepo::claim_next(&self.pool, self.stale_after, self.max_attempts).await?
        else {
            return Ok(None);
        };
        tracing::info!(
            order_id = %order.id,
            book_id = %order.book_id,
            attempt = order.attempts,
            "Order claimed",
        );

        let photos = OrderPhotoRepo::list_for_order(&self.pool, order.id).await?;
        let job = match build_job(&order, &photos) {
            Ok(job) => job,
            Err(e) => {
                let reason = e.to_string();
                tracing::error!(order_id = %order.id, error = %reason, "Order is malformed");
                OrderRepo::set_state(&self.pool, order.id, OrderState::Failed, Some(&reason)).await?;
                return Ok(None);
            }
        };

        let report = self.controller.run(&job).await?;
        Ok(Some(report))
    }
}

/// Translate stored order rows into a pipeline job.
pub fn build_job(order: &Order, photos: &[OrderPhoto]) -> Result<OrderJob, CoreError> {
    let template = TemplateRef::new(&order.book_id, &order.template_version)?;
    let photos = photos
        .iter()
        .map(|photo| {
            let face_index = usize::try_from(photo.face_index).map_err(|_| {
                CoreError::Validation(format!(
                    "Negative face index {} for role '{}'",
                    photo.face_index, photo.role
                ))
            })?;
            Ok(PhotoInput {
                role: Role::new(photo.role.as_str())?,
                reference: photo.photo_ref.clone(),
                face_index,
            })
        })
        .collect::<Result<Vec<_>, CoreError>>()?;

    Ok(OrderJob {
        order_id: order.id,
        template,
        photos,
    })
}
