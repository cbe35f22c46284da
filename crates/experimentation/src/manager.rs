//! A/B test lifecycle, sticky variant assignment, and result analysis.

use chrono::{DateTime, Utc};
use notify_core::config::ExperimentConfig;
use notify_core::error::{NotifyError, NotifyResult};
use notify_core::store::{ExperimentStore, InteractionStore};
use notify_core::types::{ABAssignment, ABTest, TestStatus, Variant};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::stats::{self, ConfidenceInterval};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VariantMetrics {
    pub assigned_users: u64,
    pub sent: u64,
    pub opened: u64,
    pub clicked: u64,
    pub converted: u64,
    pub open_rate: f64,
    pub click_rate: f64,
    pub conversion_rate: f64,
}

impl VariantMetrics {
    fn finish(mut self) -> Self {
        self.open_rate = stats::rate_percent(self.opened, self.sent);
        self.click_rate = stats::rate_percent(self.clicked, self.sent);
        self.conversion_rate = stats::rate_percent(self.converted, self.sent);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ABAnalysisResult {
    pub test_id: Uuid,
    pub variant_a: VariantMetrics,
    pub variant_b: VariantMetrics,
    /// Confidence (0..100) that the click rates differ.
    pub significance: f64,
    /// Fixed label; not derived from the data.
    pub confidence_level: f64,
    /// 95% interval for click rate B minus A, in percentage points.
    pub click_rate_difference: ConfidenceInterval,
    pub winner: Variant,
    pub sample_size: u64,
    pub analyzed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AnalysisOutcome {
    Unavailable { reason: String },
    Ready(ABAnalysisResult),
}

impl AnalysisOutcome {
    pub fn result(&self) -> Option<&ABAnalysisResult> {
        match self {
            AnalysisOutcome::Ready(result) => Some(result),
            AnalysisOutcome::Unavailable { .. } => None,
        }
    }
}

pub struct ExperimentManager {
    tests: Arc<dyn ExperimentStore>,
    interactions: Arc<dyn InteractionStore>,
    rng: Mutex<StdRng>,
    config: ExperimentConfig,
}

impl ExperimentManager {
    pub fn new(
        tests: Arc<dyn ExperimentStore>,
        interactions: Arc<dyn InteractionStore>,
        config: ExperimentConfig,
    ) -> Self {
        Self::with_rng(tests, interactions, config, StdRng::from_entropy())
    }

    /// Assignment draws come from `rng`; seed it for reproducible splits.
    pub fn with_rng(
        tests: Arc<dyn ExperimentStore>,
        interactions: Arc<dyn InteractionStore>,
        config: ExperimentConfig,
        rng: StdRng,
    ) -> Self {
        Self {
            tests,
            interactions,
            rng: Mutex::new(rng),
            config,
        }
    }

    pub fn seeded(
        tests: Arc<dyn ExperimentStore>,
        interactions: Arc<dyn InteractionStore>,
        config: ExperimentConfig,
        seed: u64,
    ) -> Self {
        Self::with_rng(tests, interactions, config, StdRng::seed_from_u64(seed))
    }

    pub fn default_traffic_split(&self) -> f64 {
        self.config.default_traffic_split
    }

    /// Create a draft test. `traffic_split` is the share of users sent to A.
    pub fn create(
        &self,
        name: &str,
        description: &str,
        variant_a_config: serde_json::Value,
        variant_b_config: serde_json::Value,
        traffic_split: f64,
    ) -> NotifyResult<Uuid> {
        if !(0.0..=1.0).contains(&traffic_split) {
            return Err(NotifyError::InvalidTrafficSplit(traffic_split));
        }
        let test = ABTest {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: description.to_string(),
            status: TestStatus::Draft,
            variant_a_config,
            variant_b_config,
            traffic_split,
            created_at: Utc::now(),
            started_at: None,
            ended_at: None,
        };
        let id = test.id;
        self.tests.insert_test(test)?;
        info!(test_id = %id, name, traffic_split, "Created A/B test");
        Ok(id)
    }

    pub fn get(&self, test_id: &Uuid) -> NotifyResult<ABTest> {
        self.tests
            .get_test(test_id)?
            .ok_or(NotifyError::TestNotFound(*test_id))
    }

    pub fn list(&self) -> NotifyResult<Vec<ABTest>> {
        self.tests.list_tests()
    }

    /// Draft → Running. Returns `false` when the test is not a draft.
    pub fn start(&self, test_id: &Uuid) -> NotifyResult<bool> {
        self.start_at(test_id, Utc::now())
    }

    pub fn start_at(&self, test_id: &Uuid, at: DateTime<Utc>) -> NotifyResult<bool> {
        let test = self.get(test_id)?;
        let started = self
            .tests
            .transition_status(test_id, TestStatus::Draft, TestStatus::Running, at)?;
        if started {
            info!(test_id = %test_id, "Started A/B test");
        } else {
            warn!(
                test_id = %test_id,
                status = ?test.status,
                "A/B test not started: not in draft"
            );
        }
        Ok(started)
    }

    /// Sticky assignment. An existing assignment is returned unchanged. A
    /// test that is missing or not running yields A without recording it.
    pub fn assign_variant(&self, test_id: &Uuid, user_id: &str) -> NotifyResult<Variant> {
        if let Some(existing) = self.tests.get_assignment(test_id, user_id)? {
            return Ok(existing.variant);
        }

        let test = match self.tests.get_test(test_id)? {
            Some(test) if test.status == TestStatus::Running => test,
            _ => {
                debug!(test_id = %test_id, user_id, "Test not running, defaulting to A");
                return Ok(Variant::A);
            }
        };

        let draw: f64 = self.rng.lock().gen();
        let variant = if draw < test.traffic_split {
            Variant::A
        } else {
            Variant::B
        };

        let (stored, inserted) = self.tests.insert_assignment_if_absent(ABAssignment {
            test_id: *test_id,
            user_id: user_id.to_string(),
            variant,
            assigned_at: Utc::now(),
        })?;
        if inserted {
            metrics::counter!("experiments.assignments").increment(1);
        } else {
            debug!(test_id = %test_id, user_id, "Lost assignment race");
        }
        Ok(stored.variant)
    }

    /// Join assignments with notification events sent since the test started.
    pub fn analyze(&self, test_id: &Uuid) -> NotifyResult<AnalysisOutcome> {
        let test = match self.tests.get_test(test_id)? {
            Some(test) => test,
            None => {
                return Ok(AnalysisOutcome::Unavailable {
                    reason: format!("test {test_id} not found"),
                })
            }
        };
        let Some(started_at) = test.started_at else {
            return Ok(AnalysisOutcome::Unavailable {
                reason: "test has not been started".to_string(),
            });
        };

        let assignments = self.tests.assignments(test_id)?;
        let by_user: HashMap<&str, Variant> = assignments
            .iter()
            .map(|a| (a.user_id.as_str(), a.variant))
            .collect();

        let mut a = VariantMetrics::default();
        let mut b = VariantMetrics::default();
        for assignment in &assignments {
            match assignment.variant {
                Variant::A => a.assigned_users += 1,
                Variant::B => b.assigned_users += 1,
            }
        }
        if a.assigned_users == 0 || b.assigned_users == 0 {
            return Ok(AnalysisOutcome::Unavailable {
                reason: "both variants need at least one assignment".to_string(),
            });
        }

        for event in self.interactions.notification_history(started_at)? {
            if event.ab_test_id != Some(*test_id) {
                continue;
            }
            let Some(group) = event.ab_test_group else {
                continue;
            };
            if event.sent_at < started_at || by_user.get(event.user_id.as_str()) != Some(&group) {
                continue;
            }
            let m = match group {
                Variant::A => &mut a,
                Variant::B => &mut b,
            };
            m.sent += 1;
            m.opened += u64::from(event.opened());
            m.clicked += u64::from(event.clicked());
            m.converted += u64::from(event.converted());
        }
        let a = a.finish();
        let b = b.finish();

        let (p_a, p_b) = (a.click_rate / 100.0, b.click_rate / 100.0);
        let significance = stats::significance(p_a, a.sent, p_b, b.sent);
        let click_rate_difference = stats::difference_interval(p_a, a.sent, p_b, b.sent);
        let winner = if a.click_rate > b.click_rate {
            Variant::A
        } else {
            Variant::B
        };

        info!(
            test_id = %test_id,
            ctr_a = a.click_rate,
            ctr_b = b.click_rate,
            significance,
            winner = %winner,
            "Analyzed A/B test"
        );

        Ok(AnalysisOutcome::Ready(ABAnalysisResult {
            test_id: *test_id,
            sample_size: a.sent + b.sent,
            variant_a: a,
            variant_b: b,
            significance,
            confidence_level: self.config.nominal_confidence_level,
            click_rate_difference,
            winner,
            analyzed_at: Utc::now(),
        }))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Duration;
    use notify_core::memory::{InMemoryExperimentStore, InMemoryInteractionStore};
    use notify_core::types::{InteractionRecord, NotificationEvent, NotificationType};
    use serde_json::json;

    fn manager(seed: u64) -> (ExperimentManager, Arc<InMemoryInteractionStore>) {
        let interactions = Arc::new(InMemoryInteractionStore::new());
        let manager = ExperimentManager::seeded(
            Arc::new(InMemoryExperimentStore::new()),
            interactions.clone(),
            ExperimentConfig::default(),
            seed,
        );
        (manager, interactions)
    }

    fn create(manager: &ExperimentManager, split: f64) -> Uuid {
        manager
            .create("subject line", "emoji vs plain", json!({}), json!({}), split)
            .unwrap()
    }

    #[test]
    fn test_invalid_split_is_rejected() {
        let (manager, _) = manager(1);
        for split in [-0.1, 1.5, f64::NAN] {
            let result = manager.create("t", "", json!({}), json!({}), split);
            assert!(matches!(result, Err(NotifyError::InvalidTrafficSplit(_))));
        }
        assert!(manager.list().unwrap().is_empty());
    }

    #[test]
    fn test_start_only_from_draft() {
        let (manager, _) = manager(1);
        let id = create(&manager, 0.5);
        assert!(manager.start(&id).unwrap());
        assert!(!manager.start(&id).unwrap());
        let test = manager.get(&id).unwrap();
        assert_eq!(test.status, TestStatus::Running);
        assert!(test.started_at.is_some());
        assert!(matches!(
            manager.start(&Uuid::new_v4()),
            Err(NotifyError::TestNotFound(_))
        ));
    }

    #[test]
    fn test_not_running_defaults_to_a_without_recording() {
        let (manager, _) = manager(1);
        let id = create(&manager, 0.0);
        assert_eq!(manager.assign_variant(&id, "u1").unwrap(), Variant::A);
        assert!(manager.tests.get_assignment(&id, "u1").unwrap().is_none());
        assert_eq!(
            manager.assign_variant(&Uuid::new_v4(), "u1").unwrap(),
            Variant::A
        );
    }

    #[test]
    fn test_assignment_is_sticky() {
        let (manager, _) = manager(7);
        let id = create(&manager, 0.5);
        manager.start(&id).unwrap();
        for user in 0..50 {
            let user = format!("user_{user}");
            let first = manager.assign_variant(&id, &user).unwrap();
            let second = manager.assign_variant(&id, &user).unwrap();
            assert_eq!(first, second);
        }
    }

    #[test]
    fn test_extreme_splits() {
        let (manager, _) = manager(3);
        let all_a = create(&manager, 1.0);
        let all_b = create(&manager, 0.0);
        manager.start(&all_a).unwrap();
        manager.start(&all_b).unwrap();
        for user in 0..20 {
            let user = format!("u{user}");
            assert_eq!(manager.assign_variant(&all_a, &user).unwrap(), Variant::A);
            assert_eq!(manager.assign_variant(&all_b, &user).unwrap(), Variant::B);
        }
    }

    #[test]
    fn test_split_converges() {
        let (manager, _) = manager(42);
        let id = create(&manager, 0.5);
        manager.start(&id).unwrap();
        let n = 100_000;
        let a = (0..n)
            .filter(|i| manager.assign_variant(&id, &format!("user_{i}")).unwrap() == Variant::A)
            .count();
        let fraction = a as f64 / n as f64;
        assert!((0.48..=0.52).contains(&fraction), "fraction={fraction}");
    }

    #[test]
    fn test_same_seed_same_assignments() {
        let run = |seed| {
            let (manager, _) = manager(seed);
            let id = create(&manager, 0.5);
            manager.start(&id).unwrap();
            (0..100)
                .map(|i| manager.assign_variant(&id, &format!("u{i}")).unwrap())
                .collect::<Vec<_>>()
        };
        assert_eq!(run(11), run(11));
    }

    #[test]
    fn test_analysis_unavailable_with_one_variant() {
        let (manager, _) = manager(1);
        let id = create(&manager, 1.0);
        assert!(matches!(
            manager.analyze(&id).unwrap(),
            AnalysisOutcome::Unavailable { .. }
        ));
        manager.start(&id).unwrap();
        manager.assign_variant(&id, "u1").unwrap();
        let outcome = manager.analyze(&id).unwrap();
        assert!(outcome.result().is_none());
        assert!(matches!(
            manager.analyze(&Uuid::new_v4()).unwrap(),
            AnalysisOutcome::Unavailable { .. }
        ));
    }

    fn seed_variant(
        manager: &ExperimentManager,
        store: &InMemoryInteractionStore,
        test_id: Uuid,
        variant: Variant,
        prefix: &str,
        sends: usize,
        clicks: usize,
        sent_at: DateTime<Utc>,
    ) {
        for i in 0..sends {
            let user_id = format!("{prefix}_{i}");
            manager
                .tests
                .insert_assignment_if_absent(ABAssignment {
                    test_id,
                    user_id: user_id.clone(),
                    variant,
                    assigned_at: sent_at,
                })
                .unwrap();
            let clicked = (i < clicks).then_some(sent_at);
            store.record(InteractionRecord::Notification(NotificationEvent {
                user_id,
                notification_type: NotificationType::NewProductAlert,
                sent_at,
                opened_at: clicked,
                clicked_at: clicked,
                converted_at: None,
                personalization_score: 0.7,
                ab_test_group: Some(variant),
                ab_test_id: Some(test_id),
            }));
        }
    }

    #[test]
    fn test_analysis_scenario() {
        let (manager, store) = manager(1);
        let id = create(&manager, 0.5);
        let started = Utc::now() - Duration::hours(2);
        manager.start_at(&id, started).unwrap();
        let sent_at = started + Duration::minutes(30);
        seed_variant(&manager, &store, id, Variant::A, "a", 100, 20, sent_at);
        seed_variant(&manager, &store, id, Variant::B, "b", 100, 35, sent_at);

        let outcome = manager.analyze(&id).unwrap();
        let result = outcome.result().unwrap();
        assert_eq!(result.variant_a.click_rate, 20.0);
        assert_eq!(result.variant_b.click_rate, 35.0);
        assert_eq!(result.winner, Variant::B);
        assert_eq!(result.sample_size, 200);
        assert!(result.significance > 0.0 && result.significance < 100.0);
        assert_eq!(result.confidence_level, 95.0);
        assert!(result.click_rate_difference.lower < 15.0);
        assert!(result.click_rate_difference.upper > 15.0);
    }

    #[test]
    fn test_analysis_ignores_sends_from_other_tests() {
        let (manager, store) = manager(1);
        let first = create(&manager, 0.5);
        let second = create(&manager, 0.5);
        let started = Utc::now() - Duration::hours(2);
        manager.start_at(&first, started).unwrap();
        manager.start_at(&second, started).unwrap();
        let sent_at = started + Duration::minutes(10);

        // Same users, same groups in both tests; only the first sends.
        seed_variant(&manager, &store, first, Variant::A, "a", 10, 2, sent_at);
        seed_variant(&manager, &store, first, Variant::B, "b", 10, 8, sent_at);
        for (prefix, variant) in [("a", Variant::A), ("b", Variant::B)] {
            for i in 0..10 {
                manager
                    .tests
                    .insert_assignment_if_absent(ABAssignment {
                        test_id: second,
                        user_id: format!("{prefix}_{i}"),
                        variant,
                        assigned_at: sent_at,
                    })
                    .unwrap();
            }
        }

        let first_result = manager.analyze(&first).unwrap();
        assert_eq!(first_result.result().unwrap().sample_size, 20);

        let second_result = manager.analyze(&second).unwrap();
        let result = second_result.result().unwrap();
        assert_eq!(result.variant_a.assigned_users, 10);
        assert_eq!(result.sample_size, 0);
        assert_eq!(result.variant_b.click_rate, 0.0);
    }

    #[test]
    fn test_analysis_ignores_events_before_start() {
        let (manager, store) = manager(1);
        let id = create(&manager, 0.5);
        let started = Utc::now() - Duration::hours(1);
        manager.start_at(&id, started).unwrap();
        seed_variant(&manager, &store, id, Variant::A, "a", 10, 5, started - Duration::hours(3));
        seed_variant(&manager, &store, id, Variant::B, "b", 10, 1, started + Duration::minutes(5));

        let outcome = manager.analyze(&id).unwrap();
        let result = outcome.result().unwrap();
        assert_eq!(result.variant_a.sent, 0);
        assert_eq!(result.variant_a.assigned_users, 10);
        assert_eq!(result.variant_a.click_rate, 0.0);
        assert_eq!(result.variant_b.sent, 10);
        assert_eq!(result.variant_b.click_rate, 10.0);
        assert_eq!(result.winner, Variant::B);
    }
}
