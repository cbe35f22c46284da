//! Experimentation — A/B test lifecycle, seeded variant assignment, and
//! two-proportion analysis of click rates.

pub mod manager;
pub mod stats;

pub use manager::{ABAnalysisResult, AnalysisOutcome, ExperimentManager, VariantMetrics};
pub use stats::ConfidenceInterval;
