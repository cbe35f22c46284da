//! Behavioral segmentation — profile aggregation from interaction facts,
//! the segment decision list, engagement score tracking, and k-means user
//! clustering.

pub mod builder;
pub mod clustering;
pub mod engagement;
pub mod engine;

pub use builder::ProfileBuilder;
pub use clustering::{UserClustering, UserFeatures};
pub use engagement::{EngagementAction, EngagementTracker};
pub use engine::SegmentationEngine;
