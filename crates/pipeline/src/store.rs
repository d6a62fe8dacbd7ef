//! Persisted per-order progress.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use pickabook_core::error::CoreError;
use pickabook_core::fallback::CharacterTier;
use pickabook_core::order::OrderState;
use pickabook_core::types::{OrderId, Role};

/// A composited page ready to be recorded.
#[derive(Debug, Clone, PartialEq)]
pub struct PageRecord {
    pub page_number: u32,
    pub page_id: String,
    pub image_url: String,
    pub local_path: Option<String>,
    pub tiers: BTreeMap<Role, CharacterTier>,
}

impl PageRecord {
    /// `{"<role>": "<tier>"}`
    pub fn tiers_json(&self) -> serde_json::Value {
        let map: serde_json::Map<String, serde_json::Value> = self
            .tiers
            .iter()
            .map(|(role, tier)| (role.to_string(), serde_json::Value::from(tier.as_str())))
            .collect();
        serde_json::Value::Object(map)
    }
}

/// Where the controller records state changes and finished pages.
#[async_trait]
pub trait ProgressStore: Send + Sync {
    async fn set_state(
        &self,
        order_id: OrderId,
        state: OrderState,
        failure_reason: Option<&str>,
    ) -> Result<(), CoreError>;

    /// Page numbers that already have a composited image.
    async fn completed_pages(&self, order_id: OrderId) -> Result<BTreeSet<u32>, CoreError>;

    /// Record one finished page. Must be atomic per page.
    async fn record_page(&self, order_id: OrderId, page: &PageRecord) -> Result<(), CoreError>;
}

#[derive(Debug, Default)]
struct OrderProgress {
    states: Vec<OrderState>,
    failure_reason: Option<String>,
    pages: BTreeMap<u32, PageRecord>,
}

/// Process-local [`ProgressStore`], used for dry runs and tests.
#[derive(Debug, Default)]
pub struct InMemoryProgressStore {
    orders: Mutex<HashMap<OrderId, OrderProgress>>,
}

impl InMemoryProgressStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every state recorded for `order_id`, oldest first.
    pub fn state_history(&self, order_id: OrderId) -> Vec<OrderState> {
        self.with_order(order_id, |o| o.states.clone())
    }

    pub fn current_state(&self, order_id: OrderId) -> Option<OrderState> {
        self.with_order(order_id, |o| o.states.last().copied())
    }

    pub fn failure_reason(&self, order_id: OrderId) -> Option<String> {
        self.with_order(order_id, |o| o.failure_reason.clone())
    }

    pub fn pages(&self, order_id: OrderId) -> Vec<PageRecord> {
        self.with_order(order_id, |o| o.pages.values().cloned().collect())
    }

    fn with_order<T>(&self, order_id: OrderId, f: impl FnOnce(&mut OrderProgress) -> T) -> T {
        let mut orders = self.orders.lock().unwrap_or_else(|e| e.into_inner());
        f(orders.entry(order_id).or_default())
    }
}

#[async_trait]
impl ProgressStore for InMemoryProgressStore {
    async fn set_state(
        &self,
        order_id: OrderId,
        state: OrderState,
        failure_reason: Option<&str>,
    ) -> Result<(), CoreError> {
        self.with_order(order_id, |o| {
            o.states.push(state);
            o.failure_reason = failure_reason.map(str::to_string);
        });
        Ok(())
    }

    async fn completed_pages(&self, order_id: OrderId) -> Result<BTreeSet<u32>, CoreError> {
        Ok(self.with_order(order_id, |o| o.pages.keys().copied().collect()))
    }

    async fn record_page(&self, order_id: OrderId, page: &PageRecord) -> Result<(), CoreError> {
        self.with_order(order_id, |o| {
            o.pages.insert(page.page_number, page.clone());
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_states_and_pages() {
        let store = InMemoryProgressStore::new();
        let id = uuid::Uuid::nil();
        let mut tiers = BTreeMap::new();
        tiers.insert(Role::new("child").unwrap(), CharacterTier::Master);
        let page = PageRecord {
            page_number: 2,
            page_id: "p002".into(),
            image_url: "file:///x.png".into(),
            local_path: None,
            tiers,
        };

        store.set_state(id, OrderState::Validating, None).await.unwrap();
        store.record_page(id, &page).await.unwrap();
        store.record_page(id, &page).await.unwrap();
        store.set_state(id, OrderState::Failed, Some("boom")).await.unwrap();

        assert_eq!(store.completed_pages(id).await.unwrap(), BTreeSet::from([2]));
        assert_eq!(store.current_state(id), Some(OrderState::Failed));
        assert_eq!(store.failure_reason(id).as_deref(), Some("boom"));
        assert_eq!(page.tiers_json(), serde_json::json!({"child": "master"}));
    }
}
