//! Collaborator interfaces consumed by the decision logic.
//!
//! Concrete persistence and transport live outside this workspace; the
//! in-memory implementations in [`crate::memory`] back tests and the CLI.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::NotifyResult;
use crate::types::{
    ABAssignment, ABTest, ItemRecord, NotificationEvent, ProductRecord, PurchaseRecord,
    TestStatus, UserAccount, UserProfile,
};

/// Builds (or loads) the behavioral profile of a user as of a point in time.
pub trait ProfileStore: Send + Sync {
    /// Profile classified against `now`. Returns `NotifyError::UserNotFound`
    /// for unknown users.
    fn load_profile_at(&self, user_id: &str, now: DateTime<Utc>) -> NotifyResult<UserProfile>;

    fn load_profile(&self, user_id: &str) -> NotifyResult<UserProfile> {
        self.load_profile_at(user_id, Utc::now())
    }
}

/// Read access to historical interaction facts plus the two writes the
/// service performs: logging a sent notification and adjusting engagement.
pub trait InteractionStore: Send + Sync {
    fn account(&self, user_id: &str) -> NotifyResult<Option<UserAccount>>;
    fn accounts(&self) -> NotifyResult<Vec<UserAccount>>;
    fn purchases(&self, user_id: &str) -> NotifyResult<Vec<PurchaseRecord>>;
    fn all_purchases(&self) -> NotifyResult<Vec<PurchaseRecord>>;
    fn cart_items(&self, user_id: &str) -> NotifyResult<Vec<ItemRecord>>;
    fn wishlist_items(&self, user_id: &str) -> NotifyResult<Vec<ItemRecord>>;
    fn catalog(&self) -> NotifyResult<Vec<ProductRecord>>;
    fn notification_history(&self, since: DateTime<Utc>) -> NotifyResult<Vec<NotificationEvent>>;
    fn record_notification(&self, event: NotificationEvent) -> NotifyResult<()>;
    fn update_engagement_score(&self, user_id: &str, score: f64) -> NotifyResult<()>;
}

/// Persistence for A/B tests and their assignments.
pub trait ExperimentStore: Send + Sync {
    fn insert_test(&self, test: ABTest) -> NotifyResult<()>;
    fn get_test(&self, test_id: &Uuid) -> NotifyResult<Option<ABTest>>;
    fn list_tests(&self) -> NotifyResult<Vec<ABTest>>;

    /// Compare-and-set on the test status. Returns `false` when the test is
    /// missing or its status is not `from`. Moving to `Running` stamps
    /// `started_at`; any other target stamps `ended_at`.
    fn transition_status(
        &self,
        test_id: &Uuid,
        from: TestStatus,
        to: TestStatus,
        at: DateTime<Utc>,
    ) -> NotifyResult<bool>;

    fn get_assignment(&self, test_id: &Uuid, user_id: &str) -> NotifyResult<Option<ABAssignment>>;

    /// Atomic insert-if-absent keyed by (test, user). Returns whichever
    /// assignment is stored once the call completes, so the loser of a race
    /// observes the winner's variant, and whether this call inserted it.
    fn insert_assignment_if_absent(
        &self,
        assignment: ABAssignment,
    ) -> NotifyResult<(ABAssignment, bool)>;

    fn assignments(&self, test_id: &Uuid) -> NotifyResult<Vec<ABAssignment>>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryReceipt {
    pub message_id: String,
    pub delivered_at: DateTime<Utc>,
}

/// Outbound transport to end-user devices. Failures surface as
/// `NotifyError::Delivery` carrying the transport's reason.
pub trait NotificationDeliveryService: Send + Sync {
    fn send(
        &self,
        title: &str,
        body: &str,
        metadata: &HashMap<String, String>,
        destination_token: &str,
    ) -> NotifyResult<DeliveryReceipt>;
}
