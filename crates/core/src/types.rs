use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

// ─── Users & Segments ──────────────────────────────────────────────────────

/// Behavioral segment assigned to a user on every profile evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Segment {
    NewUser,
    ActiveUser,
    CartAbandoner,
    InactiveUser,
    RepeatBuyer,
    VipUser,
}

impl Segment {
    pub const ALL: [Segment; 6] = [
        Segment::NewUser,
        Segment::ActiveUser,
        Segment::CartAbandoner,
        Segment::InactiveUser,
        Segment::RepeatBuyer,
        Segment::VipUser,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Segment::NewUser => "new_user",
            Segment::ActiveUser => "active_user",
            Segment::CartAbandoner => "cart_abandoner",
            Segment::InactiveUser => "inactive_user",
            Segment::RepeatBuyer => "repeat_buyer",
            Segment::VipUser => "vip_user",
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationPreferences {
    pub enabled: bool,
    pub frequency: String,
}

impl Default for NotificationPreferences {
    fn default() -> Self {
        Self {
            enabled: true,
            frequency: "normal".to_string(),
        }
    }
}

/// Durable account row for a user. Everything behavioral is derived from
/// interaction records when a profile is built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAccount {
    pub user_id: String,
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub engagement_score: f64,
    #[serde(default)]
    pub notification_preferences: NotificationPreferences,
}

/// A cart or wishlist entry joined with its catalog product.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileItem {
    pub product_id: String,
    pub name: String,
    pub category: String,
    pub price: f64,
    pub added_at: DateTime<Utc>,
}

/// Snapshot of a user's behavior, rebuilt on demand from fresh facts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: String,
    pub segment: Segment,
    pub total_purchases: u32,
    pub avg_order_value: f64,
    pub last_activity: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    /// Ranked by purchase frequency, at most three.
    pub preferred_categories: Vec<String>,
    pub cart_items: Vec<ProfileItem>,
    pub wishlist_items: Vec<ProfileItem>,
    pub engagement_score: f64,
    pub notification_preferences: NotificationPreferences,
}

// ─── Catalog & Interactions ────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub product_id: String,
    pub name: String,
    pub category: String,
    pub subcategory: Option<String>,
    pub price: f64,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseRecord {
    pub user_id: String,
    pub product_id: String,
    pub quantity: u32,
    pub price: f64,
    pub purchased_at: DateTime<Utc>,
}

/// Cart-add or wishlist-add fact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemRecord {
    pub user_id: String,
    pub product_id: String,
    pub added_at: DateTime<Utc>,
}

/// One sent notification and whatever engagement followed it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub user_id: String,
    pub notification_type: NotificationType,
    pub sent_at: DateTime<Utc>,
    pub opened_at: Option<DateTime<Utc>>,
    pub clicked_at: Option<DateTime<Utc>>,
    pub converted_at: Option<DateTime<Utc>>,
    pub personalization_score: f64,
    pub ab_test_group: Option<Variant>,
    /// Experiment the send belonged to; `ab_test_group` is meaningless without it.
    #[serde(default)]
    pub ab_test_id: Option<Uuid>,
}

impl NotificationEvent {
    pub fn opened(&self) -> bool {
        self.opened_at.is_some()
    }

    pub fn clicked(&self) -> bool {
        self.clicked_at.is_some()
    }

    pub fn converted(&self) -> bool {
        self.converted_at.is_some()
    }
}

/// Immutable interaction fact as recorded by the storage layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InteractionRecord {
    Purchase(PurchaseRecord),
    CartAdd(ItemRecord),
    WishlistAdd(ItemRecord),
    Notification(NotificationEvent),
}

// ─── Notifications ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    Welcome,
    CartAbandonment,
    WishlistReminder,
    ReorderSuggestion,
    NewProductAlert,
    PriceDrop,
    BackInStock,
    LoyaltyReward,
    ReEngagement,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::Welcome => "welcome",
            NotificationType::CartAbandonment => "cart_abandonment",
            NotificationType::WishlistReminder => "wishlist_reminder",
            NotificationType::ReorderSuggestion => "reorder_suggestion",
            NotificationType::NewProductAlert => "new_product_alert",
            NotificationType::PriceDrop => "price_drop",
            NotificationType::BackInStock => "back_in_stock",
            NotificationType::LoyaltyReward => "loyalty_reward",
            NotificationType::ReEngagement => "re_engagement",
        }
    }
}

impl fmt::Display for NotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

/// Static template configuration; `{name}` marks a placeholder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationTemplate {
    pub notification_type: NotificationType,
    pub title: String,
    pub body: String,
    pub priority: Priority,
    pub personalization_data: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentTag {
    pub test_id: Uuid,
    pub variant: Variant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationMetadata {
    pub user_segment: Segment,
    pub template_data: serde_json::Value,
    pub generated_at: DateTime<Utc>,
    #[serde(default)]
    pub recommended_product_ids: Vec<String>,
    pub experiment: Option<ExperimentTag>,
}

/// Finished payload handed to the delivery collaborator. Never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonalizedNotification {
    pub id: Uuid,
    pub user_id: String,
    pub title: String,
    pub body: String,
    pub priority: Priority,
    pub notification_type: NotificationType,
    pub personalization_score: f64,
    pub metadata: NotificationMetadata,
}

impl PersonalizedNotification {
    /// Flattened metadata map as consumed by delivery transports.
    pub fn delivery_metadata(&self) -> HashMap<String, String> {
        let mut data = HashMap::new();
        data.insert("notification_id".to_string(), self.id.to_string());
        data.insert("type".to_string(), self.notification_type.to_string());
        data.insert("user_segment".to_string(), self.metadata.user_segment.to_string());
        data.insert(
            "personalization_score".to_string(),
            format!("{:.2}", self.personalization_score),
        );
        if let Some(tag) = &self.metadata.experiment {
            data.insert("ab_test_id".to_string(), tag.test_id.to_string());
            data.insert("ab_test_group".to_string(), tag.variant.to_string());
        }
        data
    }
}

// ─── Recommendations ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub product_id: String,
    pub name: String,
    pub category: String,
    pub price: f64,
    pub score: f64,
}

// ─── Experiments ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Variant {
    A,
    B,
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::A => f.write_str("A"),
            Variant::B => f.write_str("B"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    Draft,
    Running,
    Completed,
    Paused,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ABTest {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub status: TestStatus,
    pub variant_a_config: serde_json::Value,
    pub variant_b_config: serde_json::Value,
    pub traffic_split: f64,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl ABTest {
    pub fn variant_config(&self, variant: Variant) -> &serde_json::Value {
        match variant {
            Variant::A => &self.variant_a_config,
            Variant::B => &self.variant_b_config,
        }
    }
}

/// Write-once assignment of a user to a variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ABAssignment {
    pub test_id: Uuid,
    pub user_id: String,
    pub variant: Variant,
    pub assigned_at: DateTime<Utc>,
}
