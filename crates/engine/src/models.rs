//! Model registry — holds the current model set behind a single swappable
//! reference. A rebuild fits every model from fresh data off to the side and
//! publishes the result in one pointer swap, so readers see either the old
//! set or the new one, never a mix.

use chrono::{DateTime, Duration, Utc};
use notify_core::config::AppConfig;
use notify_core::error::NotifyResult;
use notify_core::store::InteractionStore;
use notify_intelligent_delivery::{EngagementPredictor, EngagementSample, TimingOptimizer};
use notify_personalization::RecommendationEngine;
use notify_segmentation::UserClustering;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tracing::{error, info};

pub struct ModelSet {
    pub version: u64,
    pub built_at: DateTime<Utc>,
    pub recommendations: RecommendationEngine,
    pub predictor: EngagementPredictor,
    pub timing: TimingOptimizer,
    pub clustering: UserClustering,
}

impl ModelSet {
    /// Version 0: no data, every model on its fallback.
    pub fn empty(config: &AppConfig, now: DateTime<Utc>) -> Self {
        Self {
            version: 0,
            built_at: now,
            recommendations: RecommendationEngine::empty(config.recommendation.clone()),
            predictor: EngagementPredictor::untrained(config.engagement.default_probability),
            timing: TimingOptimizer::empty(config.timing.clone()),
            clustering: UserClustering::empty(),
        }
    }

    pub fn build(
        store: &dyn InteractionStore,
        config: &AppConfig,
        version: u64,
        now: DateTime<Utc>,
    ) -> NotifyResult<Self> {
        let catalog = store.catalog()?;
        let accounts = store.accounts()?;
        let purchases = store.all_purchases()?;
        let history =
            store.notification_history(now - Duration::days(config.engagement.history_window_days))?;

        let recommendations =
            RecommendationEngine::build(catalog, &purchases, config.recommendation.clone())?;

        let samples: Vec<EngagementSample> = history.iter().map(EngagementSample::from_event).collect();
        let predictor = EngagementPredictor::train(&samples, &config.engagement);
        let timing = TimingOptimizer::fit(&history, config.timing.clone());
        let clustering = UserClustering::fit(&accounts, &purchases, now, &config.clustering);

        Ok(Self {
            version,
            built_at: now,
            recommendations,
            predictor,
            timing,
            clustering,
        })
    }
}

pub struct ModelRegistry {
    current: RwLock<Arc<ModelSet>>,
    /// Serializes rebuilds; readers never take it.
    rebuild_lock: Mutex<()>,
    config: AppConfig,
}

impl ModelRegistry {
    pub fn new(config: AppConfig) -> Self {
        Self {
            current: RwLock::new(Arc::new(ModelSet::empty(&config, Utc::now()))),
            rebuild_lock: Mutex::new(()),
            config,
        }
    }

    pub fn current(&self) -> Arc<ModelSet> {
        self.current.read().clone()
    }

    /// Fit a new model set and publish it. On failure the current set keeps
    /// serving and the error is returned.
    pub fn rebuild(&self, store: &dyn InteractionStore, now: DateTime<Utc>) -> NotifyResult<Arc<ModelSet>> {
        let _guard = self.rebuild_lock.lock();
        let previous = self.current();
        let version = previous.version + 1;

        match ModelSet::build(store, &self.config, version, now) {
            Ok(models) => {
                let models = Arc::new(models);
                *self.current.write() = models.clone();
                metrics::counter!("models.rebuilds").increment(1);
                info!(
                    version,
                    predictor_trained = models.predictor.is_trained(),
                    clusters = models.clustering.cluster_count(),
                    "Published model set"
                );
                Ok(models)
            }
            Err(e) => {
                metrics::counter!("models.rebuild_failures").increment(1);
                error!(
                    version = previous.version,
                    error = %e,
                    "Model rebuild failed, keeping current model set"
                );
                Err(e)
            }
        }
    }
}
