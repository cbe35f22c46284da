//! Notification service — the request path. Builds a profile, picks and
//! fills a template (optionally under an A/B test), hands the payload to the
//! delivery transport, and logs what was sent.

use chrono::{DateTime, Utc};
use notify_core::config::AppConfig;
use notify_core::error::{NotifyError, NotifyResult};
use notify_core::store::{DeliveryReceipt, InteractionStore, NotificationDeliveryService, ProfileStore};
use notify_core::types::{
    ExperimentTag, NotificationEvent, NotificationMetadata, NotificationType,
    PersonalizedNotification, Recommendation, UserProfile,
};
use notify_experimentation::ExperimentManager;
use notify_intelligent_delivery::EngagementMetric;
use notify_personalization::{personalization_score, render, TemplateLibrary};
use notify_segmentation::{EngagementAction, EngagementTracker, ProfileBuilder, SegmentationEngine};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::{ModelRegistry, ModelSet};

pub struct NotificationService {
    interactions: Arc<dyn InteractionStore>,
    profiles: Arc<ProfileBuilder>,
    models: Arc<ModelRegistry>,
    templates: TemplateLibrary,
    experiments: Arc<ExperimentManager>,
    delivery: Arc<dyn NotificationDeliveryService>,
    tracker: EngagementTracker,
    config: AppConfig,
}

impl NotificationService {
    pub fn new(
        config: AppConfig,
        interactions: Arc<dyn InteractionStore>,
        experiments: Arc<ExperimentManager>,
        delivery: Arc<dyn NotificationDeliveryService>,
    ) -> Self {
        let profiles = Arc::new(ProfileBuilder::new(
            interactions.clone(),
            SegmentationEngine::new(config.segmentation.clone()),
        ));
        Self {
            tracker: EngagementTracker::new(interactions.clone()),
            models: Arc::new(ModelRegistry::new(config.clone())),
            templates: TemplateLibrary::standard(),
            interactions,
            profiles,
            experiments,
            delivery,
            config,
        }
    }

    /// Replace the default template library.
    pub fn with_templates(mut self, templates: TemplateLibrary) -> Self {
        self.templates = templates;
        self
    }

    pub fn experiments(&self) -> &ExperimentManager {
        &self.experiments
    }

    pub fn profile_store(&self) -> Arc<dyn ProfileStore> {
        self.profiles.clone()
    }

    pub fn models(&self) -> Arc<ModelSet> {
        self.models.current()
    }

    pub fn rebuild_models(&self, now: DateTime<Utc>) -> NotifyResult<Arc<ModelSet>> {
        self.models.rebuild(self.interactions.as_ref(), now)
    }

    pub fn profile(&self, user_id: &str) -> NotifyResult<UserProfile> {
        self.profiles.load_profile(user_id)
    }

    /// Hybrid recommendations; empty when the user has no purchase history.
    pub fn recommend(&self, user_id: &str, limit: Option<usize>) -> Vec<Recommendation> {
        let limit = limit.unwrap_or(self.config.recommendation.default_max_results);
        self.models.current().recommendations.hybrid(user_id, limit)
    }

    pub fn predict_engagement(&self, personalization_score: f64, hour: u32, weekday: u32) -> f64 {
        self.models
            .current()
            .predictor
            .predict(personalization_score, hour, weekday)
    }

    /// Behavioral cluster from the last model rebuild; `None` for users
    /// created since.
    pub fn user_cluster(&self, user_id: &str) -> Option<usize> {
        self.models.current().clustering.cluster_of(user_id)
    }

    pub fn optimal_send_hour(&self, metric: EngagementMetric) -> u32 {
        self.models.current().timing.optimal_hour(metric)
    }

    /// Build a personalized notification. With `test_id`, the user is
    /// assigned a variant and that variant's config may override the
    /// template text.
    pub fn generate(
        &self,
        user_id: &str,
        notification_type: NotificationType,
        test_id: Option<Uuid>,
    ) -> NotifyResult<PersonalizedNotification> {
        let profile = self.profile(user_id)?;
        let template = self.templates.select(notification_type)?;

        let (experiment, overrides) = match test_id {
            Some(test_id) => {
                let variant = self.experiments.assign_variant(&test_id, user_id)?;
                let overrides = match self.experiments.get(&test_id) {
                    Ok(test) => Some(test.variant_config(variant).clone()),
                    Err(NotifyError::TestNotFound(_)) => None,
                    Err(e) => return Err(e),
                };
                (Some(ExperimentTag { test_id, variant }), overrides)
            }
            None => (None, None),
        };

        let content = render(template, &profile, overrides.as_ref());
        let score = personalization_score(&profile, notification_type);
        let recommended_product_ids = self
            .recommend(user_id, None)
            .into_iter()
            .map(|r| r.product_id)
            .collect();

        let notification = PersonalizedNotification {
            id: Uuid::new_v4(),
            user_id: profile.user_id.clone(),
            title: content.title,
            body: content.body,
            priority: template.priority,
            notification_type,
            personalization_score: score,
            metadata: NotificationMetadata {
                user_segment: profile.segment,
                template_data: template.personalization_data.clone(),
                generated_at: Utc::now(),
                recommended_product_ids,
                experiment,
            },
        };

        metrics::counter!("notifications.generated").increment(1);
        debug!(
            user_id,
            notification_type = %notification_type,
            segment = %profile.segment,
            score,
            "Generated notification"
        );
        Ok(notification)
    }

    /// Send through the delivery transport and log the send. Returns `None`
    /// when the user has notifications turned off.
    pub fn deliver(
        &self,
        notification: &PersonalizedNotification,
        destination_token: &str,
    ) -> NotifyResult<Option<DeliveryReceipt>> {
        let account = self
            .interactions
            .account(&notification.user_id)?
            .ok_or_else(|| NotifyError::UserNotFound(notification.user_id.clone()))?;
        if !account.notification_preferences.enabled {
            info!(user_id = %notification.user_id, "Notifications disabled, skipping delivery");
            return Ok(None);
        }

        let receipt = match self.delivery.send(
            &notification.title,
            &notification.body,
            &notification.delivery_metadata(),
            destination_token,
        ) {
            Ok(receipt) => receipt,
            Err(e) => {
                metrics::counter!("notifications.delivery_failed").increment(1);
                warn!(
                    user_id = %notification.user_id,
                    notification_id = %notification.id,
                    error = %e,
                    "Delivery failed"
                );
                return Err(e);
            }
        };

        self.interactions.record_notification(NotificationEvent {
            user_id: notification.user_id.clone(),
            notification_type: notification.notification_type,
            sent_at: receipt.delivered_at,
            opened_at: None,
            clicked_at: None,
            converted_at: None,
            personalization_score: notification.personalization_score,
            ab_test_group: notification.metadata.experiment.as_ref().map(|t| t.variant),
            ab_test_id: notification.metadata.experiment.as_ref().map(|t| t.test_id),
        })?;
        metrics::counter!("notifications.delivered").increment(1);
        Ok(Some(receipt))
    }

    /// Adjust the user's engagement score; returns the new score.
    pub fn track_interaction(&self, user_id: &str, action: EngagementAction) -> NotifyResult<f64> {
        self.tracker.record(user_id, action)
    }
}
