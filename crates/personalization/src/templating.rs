//! Notification templates: per-type template library, placeholder filling
//! from a user profile, and the personalization score.

use notify_core::error::{NotifyError, NotifyResult};
use notify_core::types::{NotificationTemplate, NotificationType, Priority, UserProfile};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;

const DEFAULT_CATEGORY: &str = "fashion";
const DEFAULT_WISHLIST_ITEM: &str = "An item";
const DEFAULT_REORDER_PHRASE: &str = "your favorite items";

type FillFn = fn(&UserProfile) -> Vec<(&'static str, String)>;

fn fill_cart(profile: &UserProfile) -> Vec<(&'static str, String)> {
    vec![("item_count", profile.cart_items.len().to_string())]
}

fn fill_wishlist(profile: &UserProfile) -> Vec<(&'static str, String)> {
    let name = profile
        .wishlist_items
        .first()
        .map(|item| item.name.clone())
        .unwrap_or_else(|| DEFAULT_WISHLIST_ITEM.to_string());
    vec![("product_name", name)]
}

fn fill_new_product(profile: &UserProfile) -> Vec<(&'static str, String)> {
    let category = profile
        .preferred_categories
        .first()
        .cloned()
        .unwrap_or_else(|| DEFAULT_CATEGORY.to_string());
    vec![("category", category)]
}

fn fill_reorder(profile: &UserProfile) -> Vec<(&'static str, String)> {
    let phrase = profile
        .preferred_categories
        .first()
        .map(|category| format!("{category} items"))
        .unwrap_or_else(|| DEFAULT_REORDER_PHRASE.to_string());
    vec![("product_name", phrase)]
}

/// Placeholder fillers by notification type. Types without an entry have
/// no placeholders.
const FILLERS: &[(NotificationType, FillFn)] = &[
    (NotificationType::CartAbandonment, fill_cart),
    (NotificationType::WishlistReminder, fill_wishlist),
    (NotificationType::NewProductAlert, fill_new_product),
    (NotificationType::ReorderSuggestion, fill_reorder),
];

pub fn placeholder_values(
    notification_type: NotificationType,
    profile: &UserProfile,
) -> Vec<(&'static str, String)> {
    FILLERS
        .iter()
        .find(|(t, _)| *t == notification_type)
        .map(|(_, fill)| fill(profile))
        .unwrap_or_default()
}

fn substitute(text: &str, values: &[(&'static str, String)]) -> String {
    values.iter().fold(text.to_string(), |acc, (key, value)| {
        acc.replace(&format!("{{{key}}}"), value)
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderedContent {
    pub title: String,
    pub body: String,
}

/// Fill a template for a profile. String `title`/`body` fields in
/// `overrides` (an experiment variant config) replace the template text
/// before placeholders are filled.
pub fn render(
    template: &NotificationTemplate,
    profile: &UserProfile,
    overrides: Option<&serde_json::Value>,
) -> RenderedContent {
    let text_override = |field: &str| {
        overrides
            .and_then(|config| config.get(field))
            .and_then(|v| v.as_str())
            .map(str::to_string)
    };
    let title = text_override("title").unwrap_or_else(|| template.title.clone());
    let body = text_override("body").unwrap_or_else(|| template.body.clone());

    let values = placeholder_values(template.notification_type, profile);
    RenderedContent {
        title: substitute(&title, &values),
        body: substitute(&body, &values),
    }
}

pub fn personalization_score(profile: &UserProfile, notification_type: NotificationType) -> f64 {
    let mut score: f64 = 0.5;
    if !profile.preferred_categories.is_empty() {
        score += 0.2;
    }
    if profile.engagement_score > 0.7 {
        score += 0.2;
    }
    if matches!(
        notification_type,
        NotificationType::CartAbandonment | NotificationType::WishlistReminder
    ) {
        score += 0.1;
    }
    score.clamp(0.0, 1.0)
}

/// Templates configured per notification type.
#[derive(Debug, Clone, Default)]
pub struct TemplateLibrary {
    templates: HashMap<NotificationType, Vec<NotificationTemplate>>,
}

impl TemplateLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// The default message set.
    pub fn standard() -> Self {
        let mut library = Self::new();
        let defaults = [
            (
                NotificationType::Welcome,
                "Welcome aboard! 🎉",
                "Discover your perfect style with exclusive offers just for you!",
                Priority::High,
                json!({"discount": 15, "category": "all"}),
            ),
            (
                NotificationType::CartAbandonment,
                "Complete your order! 🛍️",
                "Your {item_count} item(s) are waiting - finish your order now!",
                Priority::Medium,
                json!({"urgency": "medium", "discount": 10}),
            ),
            (
                NotificationType::WishlistReminder,
                "Your favorites are calling! ❤️",
                "{product_name} from your wishlist is back in stock!",
                Priority::Medium,
                json!({"stock_alert": true}),
            ),
            (
                NotificationType::ReorderSuggestion,
                "Time to restock? 🔄",
                "Based on your history, you might need {product_name} again!",
                Priority::Low,
                json!({"reorder_discount": 5}),
            ),
            (
                NotificationType::NewProductAlert,
                "New {category} collection just dropped! ✨",
                "Discover the latest {category} styles perfectly matched to your taste!",
                Priority::Medium,
                json!({"early_access": true}),
            ),
        ];
        for (notification_type, title, body, priority, data) in defaults {
            library.register(NotificationTemplate {
                notification_type,
                title: title.to_string(),
                body: body.to_string(),
                priority,
                personalization_data: data,
            });
        }
        library
    }

    pub fn register(&mut self, template: NotificationTemplate) {
        self.templates
            .entry(template.notification_type)
            .or_default()
            .push(template);
    }

    pub fn templates_for(&self, notification_type: NotificationType) -> &[NotificationTemplate] {
        self.templates
            .get(&notification_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// First configured template for the type.
    pub fn select(&self, notification_type: NotificationType) -> NotifyResult<&NotificationTemplate> {
        self.templates_for(notification_type)
            .first()
            .ok_or(NotifyError::TemplateNotFound(notification_type))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Utc;
    use notify_core::types::{NotificationPreferences, ProfileItem, Segment};

    fn item(id: &str, name: &str) -> ProfileItem {
        ProfileItem {
            product_id: id.into(),
            name: name.into(),
            category: "clothing".into(),
            price: 20.0,
            added_at: Utc::now(),
        }
    }

    fn profile() -> UserProfile {
        let now = Utc::now();
        UserProfile {
            user_id: "user_003".into(),
            segment: Segment::CartAbandoner,
            total_purchases: 2,
            avg_order_value: 40.0,
            last_activity: now,
            created_at: now,
            preferred_categories: vec![],
            cart_items: vec![],
            wishlist_items: vec![],
            engagement_score: 0.3,
            notification_preferences: NotificationPreferences::default(),
        }
    }

    #[test]
    fn test_cart_abandonment_counts_items() {
        let mut p = profile();
        p.cart_items = vec![item("p1", "Shirt"), item("p2", "Jacket"), item("p3", "Belt")];
        let library = TemplateLibrary::standard();
        let template = library.select(NotificationType::CartAbandonment).unwrap();
        let content = render(template, &p, None);
        assert!(content.body.contains("3 item(s)"));
        assert_eq!(content.title, "Complete your order! 🛍️");
    }

    #[test]
    fn test_missing_data_uses_neutral_defaults() {
        let p = profile();
        let library = TemplateLibrary::standard();

        let wishlist = render(library.select(NotificationType::WishlistReminder).unwrap(), &p, None);
        assert!(!wishlist.body.contains('{'));

        let alert = render(library.select(NotificationType::NewProductAlert).unwrap(), &p, None);
        assert_eq!(alert.title, "New fashion collection just dropped! ✨");

        let reorder = render(library.select(NotificationType::ReorderSuggestion).unwrap(), &p, None);
        assert!(!reorder.body.contains('{'));
    }

    #[test]
    fn test_profile_data_fills_placeholders() {
        let mut p = profile();
        p.preferred_categories = vec!["accessories".into(), "clothing".into()];
        p.wishlist_items = vec![item("p5", "Limited Edition Watch")];
        let library = TemplateLibrary::standard();

        let wishlist = render(library.select(NotificationType::WishlistReminder).unwrap(), &p, None);
        assert_eq!(
            wishlist.body,
            "Limited Edition Watch from your wishlist is back in stock!"
        );
        let reorder = render(library.select(NotificationType::ReorderSuggestion).unwrap(), &p, None);
        assert_eq!(
            reorder.body,
            "Based on your history, you might need accessories items again!"
        );
    }

    #[test]
    fn test_variant_overrides_replace_text_before_filling() {
        let mut p = profile();
        p.cart_items = vec![item("p1", "Shirt")];
        let library = TemplateLibrary::standard();
        let template = library.select(NotificationType::CartAbandonment).unwrap();
        let config = json!({"title": "Still thinking it over?", "body": "{item_count} left in your bag"});
        let content = render(template, &p, Some(&config));
        assert_eq!(content.title, "Still thinking it over?");
        assert_eq!(content.body, "1 left in your bag");
    }

    #[test]
    fn test_unknown_type_has_no_template() {
        let library = TemplateLibrary::standard();
        assert!(matches!(
            library.select(NotificationType::PriceDrop),
            Err(NotifyError::TemplateNotFound(NotificationType::PriceDrop))
        ));
    }

    #[test]
    fn test_personalization_score_bounds() {
        let mut p = profile();
        assert_eq!(personalization_score(&p, NotificationType::Welcome), 0.5);

        p.preferred_categories = vec!["clothing".into()];
        p.engagement_score = 0.9;
        let capped = personalization_score(&p, NotificationType::CartAbandonment);
        assert!((capped - 1.0).abs() < 1e-9 && capped <= 1.0);

        for t in [
            NotificationType::Welcome,
            NotificationType::WishlistReminder,
            NotificationType::ReEngagement,
        ] {
            let s = personalization_score(&p, t);
            assert!((0.0..=1.0).contains(&s));
        }
    }
}
