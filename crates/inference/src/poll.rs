//! Polling of predictions that outlive the `Prefer: wait` window.

use std::time::Duration;

use crate::api::{ReplicateApi, ReplicateApiError};
use crate::predictions::Prediction;

/// Tunable parameters for prediction polling.
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Delay before the first poll.
    pub initial_delay: Duration,
    /// Upper bound on the delay between polls.
    pub max_delay: Duration,
    /// Factor by which the delay grows after each poll.
    pub multiplier: f64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            multiplier: 1.5,
        }
    }
}

/// Calculate the next poll delay, clamped to [`PollConfig::max_delay`].
pub fn next_delay(current: Duration, config: &PollConfig) -> Duration {
    let next_ms = (current.as_millis() as f64 * config.multiplier) as u64;
    Duration::from_millis(next_ms).min(config.max_delay)
}

/// Poll until `prediction` reaches a terminal status.
///
/// There is no deadline here; callers bound the whole call with the retry
/// policy's per-attempt timeout.
pub async fn wait_for_prediction(
    api: &ReplicateApi,
    mut prediction: Prediction,
    config: &PollConfig,
) -> Result<Prediction, ReplicateApiError> {
    let mut delay = config.initial_delay;
    let mut polls = 0u32;

    while !prediction.status.is_terminal() {
        tokio::time::sleep(delay).await;
        polls += 1;
        prediction = api.get_prediction(&prediction.id).await?;
        tracing::debug!(
            prediction_id = %prediction.id,
            status = ?prediction.status,
            polls,
            "Polled prediction",
        );
        delay = next_delay(delay, config);
    }

    Ok(prediction)
}
