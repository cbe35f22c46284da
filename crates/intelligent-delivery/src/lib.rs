//! Intelligent delivery — engagement prediction and send-time optimization.

pub mod engagement;
pub mod send_time;

pub use engagement::{EngagementPredictor, EngagementSample};
pub use send_time::{EngagementMetric, HourlyEngagement, TimingOptimizer};
