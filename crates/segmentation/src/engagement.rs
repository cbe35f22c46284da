//! Engagement score tracking — nudges a user's score after each interaction.

use notify_core::error::{NotifyError, NotifyResult};
use notify_core::store::InteractionStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngagementAction {
    Opened,
    Clicked,
    Converted,
    Unsubscribed,
}

impl EngagementAction {
    pub fn boost(&self) -> f64 {
        match self {
            EngagementAction::Opened => 0.05,
            EngagementAction::Clicked => 0.10,
            EngagementAction::Converted => 0.20,
            EngagementAction::Unsubscribed => -0.30,
        }
    }

    /// Apply the boost to `score`, clamped to [0, 1].
    pub fn apply(&self, score: f64) -> f64 {
        (score + self.boost()).clamp(0.0, 1.0)
    }
}

pub struct EngagementTracker {
    store: Arc<dyn InteractionStore>,
}

impl EngagementTracker {
    pub fn new(store: Arc<dyn InteractionStore>) -> Self {
        Self { store }
    }

    /// Returns the updated score.
    pub fn record(&self, user_id: &str, action: EngagementAction) -> NotifyResult<f64> {
        let account = self
            .store
            .account(user_id)?
            .ok_or_else(|| NotifyError::UserNotFound(user_id.to_string()))?;
        let updated = action.apply(account.engagement_score);
        self.store.update_engagement_score(user_id, updated)?;
        info!(
            user_id = user_id,
            action = ?action,
            from = account.engagement_score,
            to = updated,
            "Updated engagement score"
        );
        Ok(updated)
    }
}
