//! Profile builder — aggregates raw interaction facts into a `UserProfile`.

use chrono::{DateTime, Utc};
use notify_core::error::{NotifyError, NotifyResult};
use notify_core::store::{InteractionStore, ProfileStore};
use notify_core::types::{ItemRecord, ProductRecord, ProfileItem, Segment, UserProfile};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::engine::SegmentationEngine;

const MAX_PREFERRED_CATEGORIES: usize = 3;

pub struct ProfileBuilder {
    store: Arc<dyn InteractionStore>,
    engine: SegmentationEngine,
}

impl ProfileBuilder {
    pub fn new(store: Arc<dyn InteractionStore>, engine: SegmentationEngine) -> Self {
        Self { store, engine }
    }

    /// Build the profile as of `now`. The segment is always recomputed.
    pub fn build_at(&self, user_id: &str, now: DateTime<Utc>) -> NotifyResult<UserProfile> {
        let account = self
            .store
            .account(user_id)?
            .ok_or_else(|| NotifyError::UserNotFound(user_id.to_string()))?;

        let catalog: HashMap<String, ProductRecord> = self
            .store
            .catalog()?
            .into_iter()
            .map(|p| (p.product_id.clone(), p))
            .collect();

        let purchases = self.store.purchases(user_id)?;
        let total_purchases = purchases.len() as u32;
        let avg_order_value = if purchases.is_empty() {
            0.0
        } else {
            purchases.iter().map(|p| p.price).sum::<f64>() / purchases.len() as f64
        };

        let mut category_counts: HashMap<&str, usize> = HashMap::new();
        for purchase in &purchases {
            if let Some(product) = catalog.get(&purchase.product_id) {
                *category_counts.entry(product.category.as_str()).or_insert(0) += 1;
            }
        }
        let mut ranked: Vec<(&str, usize)> = category_counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
        let preferred_categories: Vec<String> = ranked
            .into_iter()
            .take(MAX_PREFERRED_CATEGORIES)
            .map(|(c, _)| c.to_string())
            .collect();

        let cart_items = join_catalog(&self.store.cart_items(user_id)?, &catalog);
        let wishlist_items = join_catalog(&self.store.wishlist_items(user_id)?, &catalog);

        let mut profile = UserProfile {
            user_id: account.user_id,
            segment: Segment::ActiveUser,
            total_purchases,
            avg_order_value,
            last_activity: account.last_activity,
            created_at: account.created_at,
            preferred_categories,
            cart_items,
            wishlist_items,
            engagement_score: account.engagement_score.clamp(0.0, 1.0),
            notification_preferences: account.notification_preferences,
        };
        profile.segment = self.engine.classify(&profile, now);

        debug!(
            user_id = %profile.user_id,
            segment = %profile.segment,
            purchases = profile.total_purchases,
            cart = profile.cart_items.len(),
            "Profile built"
        );
        Ok(profile)
    }
}

impl ProfileStore for ProfileBuilder {
    fn load_profile_at(&self, user_id: &str, now: DateTime<Utc>) -> NotifyResult<UserProfile> {
        self.build_at(user_id, now)
    }
}

/// Items whose product is missing from the catalog are dropped.
fn join_catalog(items: &[ItemRecord], catalog: &HashMap<String, ProductRecord>) -> Vec<ProfileItem> {
    items
        .iter()
        .filter_map(|item| {
            catalog.get(&item.product_id).map(|p| ProfileItem {
                product_id: p.product_id.clone(),
                name: p.name.clone(),
                category: p.category.clone(),
                price: p.price,
                added_at: item.added_at,
            })
        })
        .collect()
}
