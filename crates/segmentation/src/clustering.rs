//! User clustering — k-means over standardized purchase and engagement
//! features. Clusters are unlabeled and sit next to the rule-based segment;
//! they group users that behave alike without naming the behavior.
//!
//! Centroids are seeded k-means++ from a fixed RNG seed, so a rebuild over
//! the same data yields the same clusters.

use chrono::{DateTime, Utc};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use notify_core::config::ClusteringConfig;
use notify_core::types::{PurchaseRecord, UserAccount};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

const FEATURES: usize = 6;
const SECONDS_PER_DAY: f64 = 86_400.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UserFeatures {
    pub total_purchases: f64,
    pub total_spent: f64,
    pub avg_order_value: f64,
    pub engagement_score: f64,
    pub days_inactive: f64,
    pub account_age_days: f64,
}

impl UserFeatures {
    pub fn from_history(
        account: &UserAccount,
        purchases: &[&PurchaseRecord],
        now: DateTime<Utc>,
    ) -> Self {
        let total_purchases = purchases.len() as f64;
        let total_spent: f64 = purchases
            .iter()
            .map(|p| p.price * f64::from(p.quantity))
            .sum();
        let avg_order_value = if purchases.is_empty() {
            0.0
        } else {
            purchases.iter().map(|p| p.price).sum::<f64>() / total_purchases
        };
        Self {
            total_purchases,
            total_spent,
            avg_order_value,
            engagement_score: account.engagement_score,
            days_inactive: days_between(account.last_activity, now),
            account_age_days: days_between(account.created_at, now),
        }
    }

    fn to_array(self) -> [f64; FEATURES] {
        [
            self.total_purchases,
            self.total_spent,
            self.avg_order_value,
            self.engagement_score,
            self.days_inactive,
            self.account_age_days,
        ]
    }
}

fn days_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_seconds().max(0) as f64 / SECONDS_PER_DAY
}

fn squared_distance(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    let diff = &a - &b;
    diff.dot(&diff)
}

/// Index of the nearest centroid and its squared distance. Ties go to the
/// lower index.
fn nearest(row: ArrayView1<f64>, centroids: &Array2<f64>) -> (usize, f64) {
    let mut best = (0, f64::INFINITY);
    for (c, centroid) in centroids.outer_iter().enumerate() {
        let d = squared_distance(row, centroid);
        if d < best.1 {
            best = (c, d);
        }
    }
    best
}

/// k-means++ seeding: the first centroid uniformly, each next one with
/// probability proportional to its squared distance from the chosen set.
/// Stops early when every remaining row coincides with a centroid.
fn seed_centroids(z: &Array2<f64>, k: usize, rng: &mut StdRng) -> Array2<f64> {
    let n = z.nrows();
    let mut chosen = vec![rng.gen_range(0..n)];
    let mut distances: Vec<f64> = z
        .outer_iter()
        .map(|row| squared_distance(row, z.row(chosen[0])))
        .collect();

    while chosen.len() < k {
        let total: f64 = distances.iter().sum();
        if total <= 0.0 {
            break;
        }
        let mut target = rng.gen::<f64>() * total;
        let mut next = distances.iter().rposition(|d| *d > 0.0).unwrap_or(n - 1);
        for (i, d) in distances.iter().enumerate() {
            if *d <= 0.0 {
                continue;
            }
            if target < *d {
                next = i;
                break;
            }
            target -= d;
        }
        chosen.push(next);
        for (i, row) in z.outer_iter().enumerate() {
            distances[i] = distances[i].min(squared_distance(row, z.row(next)));
        }
    }

    z.select(Axis(0), &chosen)
}

#[derive(Debug, Clone)]
pub struct UserClustering {
    users: HashMap<String, usize>,
    mean: Array1<f64>,
    /// Per-feature standard deviation; 1.0 for constant columns.
    scale: Array1<f64>,
    /// Cluster centers in standardized feature space, clusters × features.
    centroids: Array2<f64>,
    inertia: f64,
}

impl UserClustering {
    /// Model with no clusters; every lookup misses.
    pub fn empty() -> Self {
        Self {
            users: HashMap::new(),
            mean: Array1::zeros(FEATURES),
            scale: Array1::ones(FEATURES),
            centroids: Array2::zeros((0, FEATURES)),
            inertia: 0.0,
        }
    }

    pub fn fit(
        accounts: &[UserAccount],
        purchases: &[PurchaseRecord],
        now: DateTime<Utc>,
        config: &ClusteringConfig,
    ) -> Self {
        if accounts.is_empty() || config.cluster_count == 0 {
            debug!(users = accounts.len(), "Nothing to cluster");
            return Self::empty();
        }

        let mut by_user: HashMap<&str, Vec<&PurchaseRecord>> = HashMap::new();
        for purchase in purchases {
            by_user
                .entry(purchase.user_id.as_str())
                .or_default()
                .push(purchase);
        }

        // Stores hand accounts back in no particular order.
        let mut accounts: Vec<&UserAccount> = accounts.iter().collect();
        accounts.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        let rows: Vec<[f64; FEATURES]> = accounts
            .iter()
            .map(|account| {
                let history = by_user
                    .get(account.user_id.as_str())
                    .map(Vec::as_slice)
                    .unwrap_or_default();
                UserFeatures::from_history(account, history, now).to_array()
            })
            .collect();
        let x = Array2::from_shape_fn((rows.len(), FEATURES), |(i, j)| rows[i][j]);

        let mean = x
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(FEATURES));
        let centered = &x - &mean;
        let scale = centered
            .mapv(|v| v * v)
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::ones(FEATURES))
            .mapv(|var| if var > 1e-12 { var.sqrt() } else { 1.0 });
        let z = &centered / &scale;

        let k = config.cluster_count.min(z.nrows());
        let mut rng = StdRng::seed_from_u64(config.seed);
        let mut centroids = seed_centroids(&z, k, &mut rng);
        let k = centroids.nrows();

        let mut labels = vec![usize::MAX; z.nrows()];
        let mut iterations = 0;
        for _ in 0..config.max_iterations.max(1) {
            iterations += 1;
            let mut changed = false;
            for (i, row) in z.outer_iter().enumerate() {
                let (c, _) = nearest(row, &centroids);
                if labels[i] != c {
                    labels[i] = c;
                    changed = true;
                }
            }
            if !changed {
                break;
            }

            let mut sums = Array2::<f64>::zeros((k, FEATURES));
            let mut counts = vec![0usize; k];
            for (row, &c) in z.outer_iter().zip(&labels) {
                let mut sum = sums.row_mut(c);
                sum += &row;
                counts[c] += 1;
            }
            // An emptied cluster keeps its previous center.
            for (c, count) in counts.iter().enumerate() {
                if *count > 0 {
                    let center = &sums.row(c) / *count as f64;
                    centroids.row_mut(c).assign(&center);
                }
            }
        }

        let inertia: f64 = z
            .outer_iter()
            .zip(&labels)
            .map(|(row, &c)| squared_distance(row, centroids.row(c)))
            .sum();
        let users: HashMap<String, usize> = accounts
            .iter()
            .zip(&labels)
            .map(|(account, &c)| (account.user_id.clone(), c))
            .collect();

        info!(
            users = users.len(),
            clusters = k,
            iterations,
            inertia,
            "Built user clustering model"
        );

        Self {
            users,
            mean,
            scale,
            centroids,
            inertia,
        }
    }

    pub fn cluster_count(&self) -> usize {
        self.centroids.nrows()
    }

    /// Cluster of a user seen at fit time.
    pub fn cluster_of(&self, user_id: &str) -> Option<usize> {
        self.users.get(user_id).copied()
    }

    /// Nearest cluster for features of a user the model has not seen.
    pub fn assign(&self, features: &UserFeatures) -> Option<usize> {
        if self.cluster_count() == 0 {
            return None;
        }
        let x = Array1::from(features.to_array().to_vec());
        let z = (&x - &self.mean) / &self.scale;
        Some(nearest(z.view(), &self.centroids).0)
    }

    /// Users per cluster, indexed by cluster.
    pub fn cluster_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.cluster_count()];
        for c in self.users.values() {
            sizes[*c] += 1;
        }
        sizes
    }

    /// Sum of squared distances from each user to its cluster center.
    pub fn inertia(&self) -> f64 {
        self.inertia
    }
}

impl Default for UserClustering {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use notify_core::types::NotificationPreferences;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
    }

    fn account(user: &str, age_days: i64, idle_days: i64, engagement: f64) -> UserAccount {
        UserAccount {
            user_id: user.into(),
            email: None,
            created_at: now() - Duration::days(age_days),
            last_activity: now() - Duration::days(idle_days),
            engagement_score: engagement,
            notification_preferences: NotificationPreferences::default(),
        }
    }

    fn purchases(user: &str, count: usize, price: f64) -> Vec<PurchaseRecord> {
        (0..count)
            .map(|i| PurchaseRecord {
                user_id: user.into(),
                product_id: format!("p{i}"),
                quantity: 1,
                price,
                purchased_at: now() - Duration::days(i as i64),
            })
            .collect()
    }

    /// Four identical big spenders and four identical dormant users.
    fn two_groups() -> (Vec<UserAccount>, Vec<PurchaseRecord>) {
        let mut accounts = Vec::new();
        let mut history = Vec::new();
        for i in 0..4 {
            let spender = format!("spender_{i}");
            accounts.push(account(&spender, 400, 1, 0.9));
            history.extend(purchases(&spender, 12, 80.0));
            accounts.push(account(&format!("dormant_{i}"), 90, 60, 0.1));
        }
        (accounts, history)
    }

    fn config(cluster_count: usize) -> ClusteringConfig {
        ClusteringConfig {
            cluster_count,
            ..ClusteringConfig::default()
        }
    }

    #[test]
    fn test_features_from_history() {
        let a = account("u1", 10, 2, 0.4);
        let history = purchases("u1", 3, 20.0);
        let refs: Vec<&PurchaseRecord> = history.iter().collect();
        let features = UserFeatures::from_history(&a, &refs, now());
        assert_eq!(features.total_purchases, 3.0);
        assert_eq!(features.total_spent, 60.0);
        assert_eq!(features.avg_order_value, 20.0);
        assert_eq!(features.days_inactive, 2.0);
        assert_eq!(features.account_age_days, 10.0);

        let idle = UserFeatures::from_history(&a, &[], now());
        assert_eq!(idle.avg_order_value, 0.0);
    }

    #[test]
    fn test_separated_groups_land_in_separate_clusters() {
        let (accounts, history) = two_groups();
        let model = UserClustering::fit(&accounts, &history, now(), &config(2));
        assert_eq!(model.cluster_count(), 2);

        let spender = model.cluster_of("spender_0").unwrap();
        let dormant = model.cluster_of("dormant_0").unwrap();
        assert_ne!(spender, dormant);
        for i in 1..4 {
            assert_eq!(model.cluster_of(&format!("spender_{i}")), Some(spender));
            assert_eq!(model.cluster_of(&format!("dormant_{i}")), Some(dormant));
        }
        assert_eq!(model.cluster_sizes(), vec![4, 4]);
        assert!(model.inertia() < 1e-9);
    }

    #[test]
    fn test_same_seed_same_clusters() {
        let mut accounts = Vec::new();
        let mut history = Vec::new();
        for i in 0..30 {
            let user = format!("u{i:02}");
            accounts.push(account(&user, 30 + i * 7, i % 11, (i % 10) as f64 / 10.0));
            history.extend(purchases(&user, (i % 6) as usize, 15.0 + i as f64));
        }
        let first = UserClustering::fit(&accounts, &history, now(), &ClusteringConfig::default());
        accounts.reverse();
        let second = UserClustering::fit(&accounts, &history, now(), &ClusteringConfig::default());
        assert_eq!(first.cluster_count(), 5);
        for a in &accounts {
            assert_eq!(first.cluster_of(&a.user_id), second.cluster_of(&a.user_id));
        }
        assert_eq!(first.cluster_sizes().iter().sum::<usize>(), 30);
    }

    #[test]
    fn test_fewer_users_than_clusters() {
        let accounts = vec![
            account("a", 5, 1, 0.2),
            account("b", 50, 10, 0.5),
            account("c", 500, 100, 0.8),
        ];
        let model = UserClustering::fit(&accounts, &[], now(), &config(5));
        assert_eq!(model.cluster_count(), 3);
        let mut clusters: Vec<usize> = ["a", "b", "c"]
            .iter()
            .filter_map(|u| model.cluster_of(u))
            .collect();
        clusters.sort_unstable();
        clusters.dedup();
        assert_eq!(clusters.len(), 3);
    }

    #[test]
    fn test_assign_unseen_user_to_nearest_cluster() {
        let (accounts, history) = two_groups();
        let model = UserClustering::fit(&accounts, &history, now(), &config(2));
        let newcomer = account("newcomer", 380, 2, 0.85);
        let bought = purchases("newcomer", 11, 75.0);
        let refs: Vec<&PurchaseRecord> = bought.iter().collect();
        let features = UserFeatures::from_history(&newcomer, &refs, now());
        assert_eq!(model.assign(&features), model.cluster_of("spender_0"));
        assert_eq!(model.cluster_of("newcomer"), None);
    }

    #[test]
    fn test_empty_input_has_no_clusters() {
        let model = UserClustering::fit(&[], &[], now(), &ClusteringConfig::default());
        assert_eq!(model.cluster_count(), 0);
        assert_eq!(model.cluster_of("anyone"), None);
        let features = UserFeatures::from_history(&account("x", 1, 1, 0.5), &[], now());
        assert_eq!(model.assign(&features), None);
        assert!(model.cluster_sizes().is_empty());
    }
}
