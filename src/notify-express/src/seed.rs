//! Sample shop data for local runs: five customers in different lifecycle
//! stages, a small catalog, and a few weeks of notification history.

use chrono::{DateTime, Duration, Timelike, Utc};
use notify_core::memory::InMemoryInteractionStore;
use notify_core::types::{
    InteractionRecord, ItemRecord, NotificationEvent, NotificationPreferences, NotificationType,
    ProductRecord, PurchaseRecord, UserAccount,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub const USER_IDS: [&str; 5] = ["user_001", "user_002", "user_003", "user_004", "user_005"];

const PRODUCTS: [(&str, &str, &str, &str, f64); 5] = [
    ("prod_001", "Premium T-Shirt", "clothing", "shirts", 29.99),
    ("prod_002", "Denim Jacket", "clothing", "jackets", 79.99),
    ("prod_003", "Sneakers", "footwear", "casual", 89.99),
    ("prod_004", "Accessories Set", "accessories", "sets", 39.99),
    ("prod_005", "Limited Edition Watch", "accessories", "watches", 199.99),
];

struct SampleUser {
    user_id: &'static str,
    email: &'static str,
    age_hours: i64,
    idle_hours: i64,
    engagement: f64,
    purchases: &'static [&'static str],
    cart: &'static [&'static str],
    wishlist: &'static [&'static str],
}

const USERS: [SampleUser; 5] = [
    SampleUser {
        user_id: "user_001",
        email: "john@example.com",
        age_hours: 1440,
        idle_hours: 48,
        engagement: 0.85,
        purchases: &["prod_001", "prod_003"],
        cart: &[],
        wishlist: &["prod_005"],
    },
    SampleUser {
        user_id: "user_002",
        email: "jane@example.com",
        age_hours: 72,
        idle_hours: 5,
        engagement: 0.30,
        purchases: &[],
        cart: &[],
        wishlist: &[],
    },
    SampleUser {
        user_id: "user_003",
        email: "mike@example.com",
        age_hours: 960,
        idle_hours: 6,
        engagement: 0.60,
        purchases: &["prod_001"],
        cart: &["prod_002", "prod_004", "prod_005"],
        wishlist: &[],
    },
    SampleUser {
        user_id: "user_004",
        email: "sarah@example.com",
        age_hours: 4800,
        idle_hours: 1080,
        engagement: 0.20,
        purchases: &["prod_002"],
        cart: &[],
        wishlist: &[],
    },
    SampleUser {
        user_id: "user_005",
        email: "alex@example.com",
        age_hours: 3600,
        idle_hours: 24,
        engagement: 0.90,
        purchases: &["prod_001", "prod_002", "prod_004", "prod_005"],
        cart: &[],
        wishlist: &["prod_003"],
    },
];

const HISTORY_TYPES: [NotificationType; 5] = [
    NotificationType::Welcome,
    NotificationType::CartAbandonment,
    NotificationType::WishlistReminder,
    NotificationType::ReorderSuggestion,
    NotificationType::NewProductAlert,
];

/// Populate `store` with the sample shop as of `now`.
pub fn populate(store: &InMemoryInteractionStore, now: DateTime<Utc>, seed: u64) {
    for (product_id, name, category, subcategory, price) in PRODUCTS {
        store.upsert_product(ProductRecord {
            product_id: product_id.to_string(),
            name: name.to_string(),
            category: category.to_string(),
            subcategory: Some(subcategory.to_string()),
            price,
            tags: vec![category.to_string()],
        });
    }

    for user in &USERS {
        let created_at = now - Duration::hours(user.age_hours);
        let last_activity = now - Duration::hours(user.idle_hours);
        store.upsert_account(UserAccount {
            user_id: user.user_id.to_string(),
            email: Some(user.email.to_string()),
            created_at,
            last_activity,
            engagement_score: user.engagement,
            notification_preferences: NotificationPreferences::default(),
        });
        for (i, product_id) in user.purchases.iter().enumerate() {
            let price = PRODUCTS
                .iter()
                .find(|p| p.0 == *product_id)
                .map(|p| p.4)
                .unwrap_or_default();
            store.record(InteractionRecord::Purchase(PurchaseRecord {
                user_id: user.user_id.to_string(),
                product_id: product_id.to_string(),
                quantity: 1,
                price,
                purchased_at: last_activity - Duration::days(i as i64 * 7),
            }));
        }
        for product_id in user.cart {
            store.record(InteractionRecord::CartAdd(ItemRecord {
                user_id: user.user_id.to_string(),
                product_id: product_id.to_string(),
                added_at: last_activity,
            }));
        }
        for product_id in user.wishlist {
            store.record(InteractionRecord::WishlistAdd(ItemRecord {
                user_id: user.user_id.to_string(),
                product_id: product_id.to_string(),
                added_at: last_activity - Duration::days(3),
            }));
        }
    }

    let mut rng = StdRng::seed_from_u64(seed);
    for i in 0..240 {
        let user_id = USER_IDS[i % USER_IDS.len()];
        let sent_at = now
            - Duration::days(rng.gen_range(0..21))
            - Duration::hours(rng.gen_range(0..24))
            - Duration::minutes(rng.gen_range(0..60));
        let hour = sent_at.hour();
        let score: f64 = rng.gen_range(0.5..1.0);
        // Evenings and well-personalized messages get opened more often.
        let evening = if (18..=21).contains(&hour) { 0.2 } else { 0.0 };
        let opened = rng.gen_bool((0.1 + 1.2 * (score - 0.5) + evening).min(0.95));
        let clicked = opened && rng.gen_bool(0.4);
        let converted = clicked && rng.gen_bool(0.25);
        store.record(InteractionRecord::Notification(NotificationEvent {
            user_id: user_id.to_string(),
            notification_type: HISTORY_TYPES[i % HISTORY_TYPES.len()],
            sent_at,
            opened_at: opened.then(|| sent_at + Duration::minutes(12)),
            clicked_at: clicked.then(|| sent_at + Duration::minutes(15)),
            converted_at: converted.then(|| sent_at + Duration::hours(1)),
            personalization_score: score,
            ab_test_group: None,
            ab_test_id: None,
        }));
    }
}
