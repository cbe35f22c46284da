//! Reporting — notification performance, engagement trends, and
//! personalization effectiveness.

pub mod performance;

pub use performance::{
    EngagementSummary, EngagementTrends, PerformanceAnalyzer, PerformanceReport,
    PersonalizationBucket, PersonalizationLevel,
};
