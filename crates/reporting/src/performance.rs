//! Notification performance reporting — engagement rates over a history
//! window, broken down by type, segment, send hour, day, and
//! personalization score band.

use chrono::{DateTime, Duration, NaiveDate, Timelike, Utc};
use notify_core::error::{NotifyError, NotifyResult};
use notify_core::store::{InteractionStore, ProfileStore};
use notify_core::types::{NotificationEvent, NotificationType, Segment};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, warn};

fn percent(count: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (count as f64 / total as f64 * 10_000.0).round() / 100.0
}

/// Counts and percentage rates for a group of sent notifications.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngagementSummary {
    pub sent: u64,
    pub opened: u64,
    pub clicked: u64,
    pub converted: u64,
    pub open_rate: f64,
    pub click_rate: f64,
    pub conversion_rate: f64,
    pub avg_personalization_score: f64,
}

#[derive(Debug, Clone, Default)]
struct Tally {
    sent: u64,
    opened: u64,
    clicked: u64,
    converted: u64,
    score_sum: f64,
}

impl Tally {
    fn add(&mut self, event: &NotificationEvent) {
        self.sent += 1;
        self.opened += u64::from(event.opened());
        self.clicked += u64::from(event.clicked());
        self.converted += u64::from(event.converted());
        self.score_sum += event.personalization_score;
    }

    fn summary(&self) -> EngagementSummary {
        EngagementSummary {
            sent: self.sent,
            opened: self.opened,
            clicked: self.clicked,
            converted: self.converted,
            open_rate: percent(self.opened, self.sent),
            click_rate: percent(self.clicked, self.sent),
            conversion_rate: percent(self.converted, self.sent),
            avg_personalization_score: if self.sent == 0 {
                0.0
            } else {
                self.score_sum / self.sent as f64
            },
        }
    }
}

fn summarize<'a, K: Ord>(
    events: impl IntoIterator<Item = &'a NotificationEvent>,
    key: impl Fn(&NotificationEvent) -> Option<K>,
) -> BTreeMap<K, EngagementSummary> {
    let mut tallies: BTreeMap<K, Tally> = BTreeMap::new();
    for event in events {
        if let Some(k) = key(event) {
            tallies.entry(k).or_default().add(event);
        }
    }
    tallies.into_iter().map(|(k, t)| (k, t.summary())).collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeMetrics {
    pub notification_type: NotificationType,
    #[serde(flatten)]
    pub metrics: EngagementSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentMetrics {
    pub segment: Segment,
    #[serde(flatten)]
    pub metrics: EngagementSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceReport {
    pub window_days: i64,
    pub overall: EngagementSummary,
    /// Most-sent first.
    pub by_type: Vec<TypeMetrics>,
    /// Most-sent first. Events for users without a profile are left out.
    pub by_segment: Vec<SegmentMetrics>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyMetrics {
    pub date: NaiveDate,
    #[serde(flatten)]
    pub metrics: EngagementSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HourlyMetrics {
    pub hour: u32,
    #[serde(flatten)]
    pub metrics: EngagementSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngagementTrends {
    pub daily: Vec<DailyMetrics>,
    pub hourly: Vec<HourlyMetrics>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersonalizationLevel {
    Low,
    Medium,
    High,
    VeryHigh,
}

impl PersonalizationLevel {
    pub fn from_score(score: f64) -> Self {
        if score < 0.3 {
            PersonalizationLevel::Low
        } else if score < 0.6 {
            PersonalizationLevel::Medium
        } else if score < 0.8 {
            PersonalizationLevel::High
        } else {
            PersonalizationLevel::VeryHigh
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PersonalizationLevel::Low => "Low (0-0.3)",
            PersonalizationLevel::Medium => "Medium (0.3-0.6)",
            PersonalizationLevel::High => "High (0.6-0.8)",
            PersonalizationLevel::VeryHigh => "Very High (0.8-1.0)",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonalizationBucket {
    pub level: PersonalizationLevel,
    #[serde(flatten)]
    pub metrics: EngagementSummary,
}

pub struct PerformanceAnalyzer {
    interactions: Arc<dyn InteractionStore>,
    profiles: Arc<dyn ProfileStore>,
}

impl PerformanceAnalyzer {
    pub fn new(interactions: Arc<dyn InteractionStore>, profiles: Arc<dyn ProfileStore>) -> Self {
        Self {
            interactions,
            profiles,
        }
    }

    fn window(&self, days: i64, now: DateTime<Utc>) -> NotifyResult<Vec<NotificationEvent>> {
        let events = self.interactions.notification_history(now - Duration::days(days))?;
        debug!(days, events = events.len(), "Loaded notification history window");
        Ok(events)
    }

    /// Segment of every recipient, classified as of `now`.
    fn segments(
        &self,
        events: &[NotificationEvent],
        now: DateTime<Utc>,
    ) -> NotifyResult<HashMap<String, Segment>> {
        let mut segments = HashMap::new();
        for event in events {
            if segments.contains_key(&event.user_id) {
                continue;
            }
            match self.profiles.load_profile_at(&event.user_id, now) {
                Ok(profile) => {
                    segments.insert(event.user_id.clone(), profile.segment);
                }
                Err(NotifyError::UserNotFound(_)) => {
                    warn!(user_id = %event.user_id, "No profile for notification recipient");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(segments)
    }

    pub fn performance(&self, days: i64, now: DateTime<Utc>) -> NotifyResult<PerformanceReport> {
        let events = self.window(days, now)?;
        let overall = summarize(&events, |_| Some(())).remove(&()).unwrap_or_default();

        let mut by_type: Vec<TypeMetrics> = summarize(&events, |e| Some(e.notification_type))
            .into_iter()
            .map(|(notification_type, metrics)| TypeMetrics {
                notification_type,
                metrics,
            })
            .collect();
        by_type.sort_by(|a, b| b.metrics.sent.cmp(&a.metrics.sent));

        let segments = self.segments(&events, now)?;
        let mut by_segment: Vec<SegmentMetrics> =
            summarize(&events, |e| segments.get(&e.user_id).copied())
                .into_iter()
                .map(|(segment, metrics)| SegmentMetrics { segment, metrics })
                .collect();
        by_segment.sort_by(|a, b| b.metrics.sent.cmp(&a.metrics.sent));

        Ok(PerformanceReport {
            window_days: days,
            overall,
            by_type,
            by_segment,
            generated_at: now,
        })
    }

    pub fn trends(&self, days: i64, now: DateTime<Utc>) -> NotifyResult<EngagementTrends> {
        let events = self.window(days, now)?;
        let daily = summarize(&events, |e| Some(e.sent_at.date_naive()))
            .into_iter()
            .map(|(date, metrics)| DailyMetrics { date, metrics })
            .collect();
        let hourly = summarize(&events, |e| Some(e.sent_at.hour()))
            .into_iter()
            .map(|(hour, metrics)| HourlyMetrics { hour, metrics })
            .collect();
        Ok(EngagementTrends { daily, hourly })
    }

    /// Engagement by personalization score band, lowest average score first.
    pub fn personalization_effectiveness(
        &self,
        days: i64,
        now: DateTime<Utc>,
    ) -> NotifyResult<Vec<PersonalizationBucket>> {
        let events = self.window(days, now)?;
        let mut buckets: Vec<PersonalizationBucket> = summarize(&events, |e| {
            Some(PersonalizationLevel::from_score(e.personalization_score))
        })
        .into_iter()
        .map(|(level, metrics)| PersonalizationBucket { level, metrics })
        .collect();
        buckets.sort_by(|a, b| {
            a.metrics
                .avg_personalization_score
                .partial_cmp(&b.metrics.avg_personalization_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(buckets)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use notify_core::memory::InMemoryInteractionStore;
    use notify_core::types::{InteractionRecord, NotificationPreferences, UserProfile};

    fn profile(user_id: &str, segment: Segment, created_at: DateTime<Utc>) -> UserProfile {
        UserProfile {
            user_id: user_id.to_string(),
            segment,
            total_purchases: 0,
            avg_order_value: 0.0,
            last_activity: created_at,
            created_at,
            preferred_categories: vec![],
            cart_items: vec![],
            wishlist_items: vec![],
            engagement_score: 0.5,
            notification_preferences: NotificationPreferences::default(),
        }
    }

    struct FixedSegments(HashMap<String, Segment>);

    impl ProfileStore for FixedSegments {
        fn load_profile_at(&self, user_id: &str, now: DateTime<Utc>) -> NotifyResult<UserProfile> {
            let segment = *self
                .0
                .get(user_id)
                .ok_or_else(|| NotifyError::UserNotFound(user_id.to_string()))?;
            Ok(profile(user_id, segment, now))
        }
    }

    /// New for the first week after signup, active afterwards.
    struct SignupDates(HashMap<String, DateTime<Utc>>);

    impl ProfileStore for SignupDates {
        fn load_profile_at(&self, user_id: &str, now: DateTime<Utc>) -> NotifyResult<UserProfile> {
            let created_at = *self
                .0
                .get(user_id)
                .ok_or_else(|| NotifyError::UserNotFound(user_id.to_string()))?;
            let segment = if now - created_at < Duration::days(7) {
                Segment::NewUser
            } else {
                Segment::ActiveUser
            };
            Ok(profile(user_id, segment, created_at))
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
    }

    fn record(
        store: &InMemoryInteractionStore,
        user: &str,
        notification_type: NotificationType,
        sent_at: DateTime<Utc>,
        score: f64,
        opened: bool,
        clicked: bool,
    ) {
        store.record(InteractionRecord::Notification(NotificationEvent {
            user_id: user.into(),
            notification_type,
            sent_at,
            opened_at: opened.then_some(sent_at),
            clicked_at: clicked.then_some(sent_at),
            converted_at: None,
            personalization_score: score,
            ab_test_group: None,
            ab_test_id: None,
        }));
    }

    fn analyzer() -> PerformanceAnalyzer {
        let store = Arc::new(InMemoryInteractionStore::new());
        let t = now();
        let cart = NotificationType::CartAbandonment;
        let welcome = NotificationType::Welcome;
        record(&store, "vip", cart, t - Duration::hours(5), 0.9, true, true);
        record(&store, "vip", cart, t - Duration::hours(4), 0.85, true, false);
        record(&store, "new", welcome, t - Duration::days(1), 0.5, false, false);
        record(&store, "new", cart, t - Duration::days(1), 0.2, true, false);
        record(&store, "ghost", welcome, t - Duration::days(2), 0.65, false, false);
        // Outside a 30-day window.
        record(&store, "vip", welcome, t - Duration::days(45), 0.9, true, true);

        let segments = HashMap::from([
            ("vip".to_string(), Segment::VipUser),
            ("new".to_string(), Segment::NewUser),
        ]);
        PerformanceAnalyzer::new(store, Arc::new(FixedSegments(segments)))
    }

    #[test]
    fn test_overall_and_by_type() {
        let report = analyzer().performance(30, now()).unwrap();
        assert_eq!(report.overall.sent, 5);
        assert_eq!(report.overall.opened, 3);
        assert_eq!(report.overall.open_rate, 60.0);
        assert_eq!(report.overall.click_rate, 20.0);

        assert_eq!(report.by_type[0].notification_type, NotificationType::CartAbandonment);
        assert_eq!(report.by_type[0].metrics.sent, 3);
        assert_eq!(report.by_type[1].metrics.sent, 2);
    }

    #[test]
    fn test_by_segment_skips_unknown_users() {
        let report = analyzer().performance(30, now()).unwrap();
        let total: u64 = report.by_segment.iter().map(|s| s.metrics.sent).sum();
        assert_eq!(total, 4);
        assert_eq!(report.by_segment.len(), 2);
    }

    #[test]
    fn test_segments_are_classified_as_of_report_time() {
        let store = Arc::new(InMemoryInteractionStore::new());
        let t = now();
        record(&store, "fresh", NotificationType::Welcome, t - Duration::hours(2), 0.5, true, false);
        let signups = HashMap::from([("fresh".to_string(), t - Duration::days(2))]);
        let analyzer = PerformanceAnalyzer::new(store, Arc::new(SignupDates(signups)));

        // Two days after signup as of the report; years ago by the wall clock.
        let report = analyzer.performance(30, t).unwrap();
        assert_eq!(report.by_segment.len(), 1);
        assert_eq!(report.by_segment[0].segment, Segment::NewUser);

        let later = analyzer.performance(30, t + Duration::days(10)).unwrap();
        assert_eq!(later.by_segment[0].segment, Segment::ActiveUser);
    }

    #[test]
    fn test_trends_group_by_day_and_hour() {
        let trends = analyzer().trends(30, now()).unwrap();
        assert_eq!(trends.daily.len(), 3);
        assert!(trends.daily.windows(2).all(|w| w[0].date < w[1].date));
        assert!(trends.hourly.windows(2).all(|w| w[0].hour < w[1].hour));
    }

    #[test]
    fn test_personalization_buckets() {
        assert_eq!(PersonalizationLevel::from_score(0.29), PersonalizationLevel::Low);
        assert_eq!(PersonalizationLevel::from_score(0.3), PersonalizationLevel::Medium);
        assert_eq!(PersonalizationLevel::from_score(0.79), PersonalizationLevel::High);
        assert_eq!(PersonalizationLevel::from_score(1.0), PersonalizationLevel::VeryHigh);

        let buckets = analyzer().personalization_effectiveness(30, now()).unwrap();
        let levels: Vec<_> = buckets.iter().map(|b| b.level).collect();
        assert_eq!(
            levels,
            vec![
                PersonalizationLevel::Low,
                PersonalizationLevel::Medium,
                PersonalizationLevel::High,
                PersonalizationLevel::VeryHigh,
            ]
        );
        assert_eq!(buckets[3].metrics.sent, 2);
        assert_eq!(buckets[3].metrics.open_rate, 100.0);
    }
}
