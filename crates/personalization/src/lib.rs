//! Personalization engine — hybrid product recommendations over the catalog
//! and purchase history, plus notification templating.

pub mod catalog;
pub mod recommendations;
pub mod templating;
pub mod tfidf;

pub use catalog::ProductCatalog;
pub use recommendations::{RecommendationEngine, ScoredItem};
pub use templating::{personalization_score, render, RenderedContent, TemplateLibrary};
