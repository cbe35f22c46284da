//! In-memory stores backed by DashMap.
//!
//! Production: replace with a relational store that enforces the
//! (test_id, user_id) unique index. These provide the same API surface for
//! development and testing.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{NotifyError, NotifyResult};
use crate::store::{ExperimentStore, InteractionStore};
use crate::types::{
    ABAssignment, ABTest, InteractionRecord, ItemRecord, NotificationEvent, ProductRecord,
    PurchaseRecord, TestStatus, UserAccount,
};

/// Thread-safe store for accounts, catalog, and interaction facts.
pub struct InMemoryInteractionStore {
    accounts: DashMap<String, UserAccount>,
    products: DashMap<String, ProductRecord>,
    purchases: DashMap<String, Vec<PurchaseRecord>>,
    cart_items: DashMap<String, Vec<ItemRecord>>,
    wishlist_items: DashMap<String, Vec<ItemRecord>>,
    notifications: DashMap<String, Vec<NotificationEvent>>,
}

impl InMemoryInteractionStore {
    pub fn new() -> Self {
        debug!("Interaction store initialized (in-memory)");
        Self {
            accounts: DashMap::new(),
            products: DashMap::new(),
            purchases: DashMap::new(),
            cart_items: DashMap::new(),
            wishlist_items: DashMap::new(),
            notifications: DashMap::new(),
        }
    }

    pub fn upsert_account(&self, account: UserAccount) {
        self.accounts.insert(account.user_id.clone(), account);
    }

    pub fn upsert_product(&self, product: ProductRecord) {
        self.products.insert(product.product_id.clone(), product);
    }

    pub fn remove_cart_item(&self, user_id: &str, product_id: &str) {
        if let Some(mut items) = self.cart_items.get_mut(user_id) {
            items.retain(|i| i.product_id != product_id);
        }
    }

    /// Append an interaction fact. Facts are never edited afterwards.
    pub fn record(&self, record: InteractionRecord) {
        match record {
            InteractionRecord::Purchase(p) => {
                self.purchases.entry(p.user_id.clone()).or_default().push(p);
            }
            InteractionRecord::CartAdd(item) => {
                self.cart_items
                    .entry(item.user_id.clone())
                    .or_default()
                    .push(item);
            }
            InteractionRecord::WishlistAdd(item) => {
                self.wishlist_items
                    .entry(item.user_id.clone())
                    .or_default()
                    .push(item);
            }
            InteractionRecord::Notification(event) => {
                self.notifications
                    .entry(event.user_id.clone())
                    .or_default()
                    .push(event);
            }
        }
    }

    pub fn user_count(&self) -> usize {
        self.accounts.len()
    }

    pub fn product_count(&self) -> usize {
        self.products.len()
    }
}

impl Default for InMemoryInteractionStore {
    fn default() -> Self {
        Self::new()
    }
}

fn per_user<T: Clone>(map: &DashMap<String, Vec<T>>, user_id: &str) -> Vec<T> {
    map.get(user_id).map(|v| v.clone()).unwrap_or_default()
}

impl InteractionStore for InMemoryInteractionStore {
    fn account(&self, user_id: &str) -> NotifyResult<Option<UserAccount>> {
        Ok(self.accounts.get(user_id).map(|a| a.clone()))
    }

    fn accounts(&self) -> NotifyResult<Vec<UserAccount>> {
        let mut accounts: Vec<UserAccount> =
            self.accounts.iter().map(|a| a.value().clone()).collect();
        accounts.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        Ok(accounts)
    }

    fn purchases(&self, user_id: &str) -> NotifyResult<Vec<PurchaseRecord>> {
        Ok(per_user(&self.purchases, user_id))
    }

    fn all_purchases(&self) -> NotifyResult<Vec<PurchaseRecord>> {
        let mut all: Vec<PurchaseRecord> = self
            .purchases
            .iter()
            .flat_map(|entry| entry.value().clone())
            .collect();
        all.sort_by(|a, b| {
            a.user_id
                .cmp(&b.user_id)
                .then(a.purchased_at.cmp(&b.purchased_at))
        });
        Ok(all)
    }

    fn cart_items(&self, user_id: &str) -> NotifyResult<Vec<ItemRecord>> {
        Ok(per_user(&self.cart_items, user_id))
    }

    fn wishlist_items(&self, user_id: &str) -> NotifyResult<Vec<ItemRecord>> {
        Ok(per_user(&self.wishlist_items, user_id))
    }

    fn catalog(&self) -> NotifyResult<Vec<ProductRecord>> {
        let mut products: Vec<ProductRecord> =
            self.products.iter().map(|p| p.value().clone()).collect();
        products.sort_by(|a, b| a.product_id.cmp(&b.product_id));
        Ok(products)
    }

    fn notification_history(&self, since: DateTime<Utc>) -> NotifyResult<Vec<NotificationEvent>> {
        let mut events: Vec<NotificationEvent> = self
            .notifications
            .iter()
            .flat_map(|entry| entry.value().clone())
            .filter(|e| e.sent_at >= since)
            .collect();
        events.sort_by(|a, b| a.sent_at.cmp(&b.sent_at).then(a.user_id.cmp(&b.user_id)));
        Ok(events)
    }

    fn record_notification(&self, event: NotificationEvent) -> NotifyResult<()> {
        self.record(InteractionRecord::Notification(event));
        Ok(())
    }

    fn update_engagement_score(&self, user_id: &str, score: f64) -> NotifyResult<()> {
        match self.accounts.get_mut(user_id) {
            Some(mut account) => {
                account.engagement_score = score;
                Ok(())
            }
            None => Err(NotifyError::UserNotFound(user_id.to_string())),
        }
    }
}

/// Experiment persistence. Assignment inserts go through the DashMap entry
/// API, which holds the shard lock across the check and the insert.
pub struct InMemoryExperimentStore {
    tests: DashMap<Uuid, ABTest>,
    assignments: DashMap<(Uuid, String), ABAssignment>,
}

impl InMemoryExperimentStore {
    pub fn new() -> Self {
        info!("Experiment store initialized (in-memory, development mode)");
        Self {
            tests: DashMap::new(),
            assignments: DashMap::new(),
        }
    }

    pub fn assignment_count(&self) -> usize {
        self.assignments.len()
    }
}

impl Default for InMemoryExperimentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ExperimentStore for InMemoryExperimentStore {
    fn insert_test(&self, test: ABTest) -> NotifyResult<()> {
        match self.tests.entry(test.id) {
            Entry::Occupied(_) => Err(NotifyError::Storage(format!(
                "A/B test {} already exists",
                test.id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(test);
                Ok(())
            }
        }
    }

    fn get_test(&self, test_id: &Uuid) -> NotifyResult<Option<ABTest>> {
        Ok(self.tests.get(test_id).map(|t| t.clone()))
    }

    fn list_tests(&self) -> NotifyResult<Vec<ABTest>> {
        let mut tests: Vec<ABTest> = self.tests.iter().map(|t| t.value().clone()).collect();
        tests.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(tests)
    }

    fn transition_status(
        &self,
        test_id: &Uuid,
        from: TestStatus,
        to: TestStatus,
        at: DateTime<Utc>,
    ) -> NotifyResult<bool> {
        let Some(mut test) = self.tests.get_mut(test_id) else {
            return Ok(false);
        };
        if test.status != from {
            return Ok(false);
        }
        test.status = to;
        if to == TestStatus::Running {
            test.started_at = Some(at);
        } else {
            test.ended_at = Some(at);
        }
        Ok(true)
    }

    fn get_assignment(&self, test_id: &Uuid, user_id: &str) -> NotifyResult<Option<ABAssignment>> {
        Ok(self
            .assignments
            .get(&(*test_id, user_id.to_string()))
            .map(|a| a.clone()))
    }

    fn insert_assignment_if_absent(
        &self,
        assignment: ABAssignment,
    ) -> NotifyResult<(ABAssignment, bool)> {
        let key = (assignment.test_id, assignment.user_id.clone());
        match self.assignments.entry(key) {
            Entry::Occupied(existing) => Ok((existing.get().clone(), false)),
            Entry::Vacant(slot) => {
                let stored = slot.insert(assignment);
                Ok((stored.value().clone(), true))
            }
        }
    }

    fn assignments(&self, test_id: &Uuid) -> NotifyResult<Vec<ABAssignment>> {
        let mut assignments: Vec<ABAssignment> = self
            .assignments
            .iter()
            .filter(|entry| entry.key().0 == *test_id)
            .map(|entry| entry.value().clone())
            .collect();
        assignments.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        Ok(assignments)
    }
}
