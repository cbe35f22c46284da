use serde::Deserialize;

/// Root application configuration. Loaded from an optional TOML file and
/// environment variables with the prefix `NOTIFY_EXPRESS__`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub segmentation: SegmentationConfig,
    #[serde(default)]
    pub recommendation: RecommendationConfig,
    #[serde(default)]
    pub engagement: EngagementConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub experiment: ExperimentConfig,
    #[serde(default)]
    pub clustering: ClusteringConfig,
}

/// Thresholds for the segment decision list. Rule order is fixed.
#[derive(Debug, Clone, Deserialize)]
pub struct SegmentationConfig {
    #[serde(default = "default_new_user_days")]
    pub new_user_days: i64,
    #[serde(default = "default_inactive_days")]
    pub inactive_days: i64,
    #[serde(default = "default_cart_recent_days")]
    pub cart_recent_days: i64,
    #[serde(default = "default_vip_min_purchases")]
    pub vip_min_purchases: u32,
    #[serde(default = "default_repeat_min_purchases")]
    pub repeat_min_purchases: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecommendationConfig {
    #[serde(default = "default_neighbor_count")]
    pub neighbor_count: usize,
    #[serde(default = "default_content_neighbors")]
    pub content_neighbors: usize,
    #[serde(default = "default_collaborative_weight")]
    pub collaborative_weight: f64,
    #[serde(default = "default_content_weight")]
    pub content_weight: f64,
    #[serde(default = "default_max_features")]
    pub max_features: usize,
    /// When false, content-based neighbors may include products the user
    /// already bought.
    #[serde(default)]
    pub content_exclude_purchased: bool,
    #[serde(default = "default_max_results")]
    pub default_max_results: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngagementConfig {
    #[serde(default = "default_min_training_samples")]
    pub min_training_samples: usize,
    #[serde(default = "default_probability")]
    pub default_probability: f64,
    #[serde(default = "default_history_window_days")]
    pub history_window_days: i64,
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    #[serde(default = "default_epochs")]
    pub epochs: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TimingConfig {
    #[serde(default = "default_open_hour")]
    pub default_open_hour: u32,
    #[serde(default = "default_click_hour")]
    pub default_click_hour: u32,
    #[serde(default = "default_conversion_hour")]
    pub default_conversion_hour: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExperimentConfig {
    #[serde(default = "default_traffic_split")]
    pub default_traffic_split: f64,
    /// Reported as a fixed label next to the computed significance.
    #[serde(default = "default_nominal_confidence_level")]
    pub nominal_confidence_level: f64,
}

/// K-means over standardized per-user purchase and engagement features.
#[derive(Debug, Clone, Deserialize)]
pub struct ClusteringConfig {
    /// Upper bound; fewer users than clusters caps k at the user count.
    #[serde(default = "default_cluster_count")]
    pub cluster_count: usize,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    #[serde(default = "default_cluster_seed")]
    pub seed: u64,
}

// Default functions
fn default_new_user_days() -> i64 {
    7
}

fn default_inactive_days() -> i64 {
    30
}

fn default_cart_recent_days() -> i64 {
    1
}

fn default_vip_min_purchases() -> u32 {
    10
}

fn default_repeat_min_purchases() -> u32 {
    3
}

fn default_neighbor_count() -> usize {
    5
}

fn default_content_neighbors() -> usize {
    3
}

fn default_collaborative_weight() -> f64 {
    0.7
}

fn default_content_weight() -> f64 {
    0.3
}

fn default_max_features() -> usize {
    1000
}

fn default_max_results() -> usize {
    5
}

fn default_min_training_samples() -> usize {
    10
}

fn default_probability() -> f64 {
    0.5
}

fn default_history_window_days() -> i64 {
    30
}

fn default_learning_rate() -> f64 {
    0.1
}

fn default_epochs() -> usize {
    500
}

fn default_open_hour() -> u32 {
    10
}

fn default_click_hour() -> u32 {
    14
}

fn default_conversion_hour() -> u32 {
    19
}

fn default_traffic_split() -> f64 {
    0.5
}

fn default_nominal_confidence_level() -> f64 {
    95.0
}

fn default_cluster_count() -> usize {
    5
}

fn default_max_iterations() -> usize {
    100
}

fn default_cluster_seed() -> u64 {
    42
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            new_user_days: default_new_user_days(),
            inactive_days: default_inactive_days(),
            cart_recent_days: default_cart_recent_days(),
            vip_min_purchases: default_vip_min_purchases(),
            repeat_min_purchases: default_repeat_min_purchases(),
        }
    }
}

impl Default for RecommendationConfig {
    fn default() -> Self {
        Self {
            neighbor_count: default_neighbor_count(),
            content_neighbors: default_content_neighbors(),
            collaborative_weight: default_collaborative_weight(),
            content_weight: default_content_weight(),
            max_features: default_max_features(),
            content_exclude_purchased: false,
            default_max_results: default_max_results(),
        }
    }
}

impl Default for EngagementConfig {
    fn default() -> Self {
        Self {
            min_training_samples: default_min_training_samples(),
            default_probability: default_probability(),
            history_window_days: default_history_window_days(),
            learning_rate: default_learning_rate(),
            epochs: default_epochs(),
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            default_open_hour: default_open_hour(),
            default_click_hour: default_click_hour(),
            default_conversion_hour: default_conversion_hour(),
        }
    }
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            default_traffic_split: default_traffic_split(),
            nominal_confidence_level: default_nominal_confidence_level(),
        }
    }
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            cluster_count: default_cluster_count(),
            max_iterations: default_max_iterations(),
            seed: default_cluster_seed(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables and an optional config file.
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(true));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("NOTIFY_EXPRESS")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }
}
