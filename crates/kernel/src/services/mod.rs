//! Catalog services that run outside the per-request listing pipeline.

pub mod report;
pub mod seed;

pub use report::{AuthorAnalytics, AuthorStat, CatalogSummary, Reporter};
