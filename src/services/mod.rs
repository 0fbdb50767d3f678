//! Service layer for the harvester.
//!
//! This module contains the building blocks the pipelines wire together:
//! - Upstream access (`WikiApi`, `RateLimitedFetcher`)
//! - Index and content harvesting (`RevisionIndexReader`, `ContentFetcher`)
//! - Author metadata (`UserMetadataCache`, `AuthorResolver`, `UserAnalyzer`)
//! - Conversion and scoring (`ConverterPool`, `Cleaner`, `Differ`)

mod api;
mod cleaner;
mod content;
mod converter;
pub mod differ;
mod fetcher;
mod index;
pub mod user_analyzer;
mod users;

pub use api::WikiApi;
pub use cleaner::{Cleaner, ConversionRequest, ConversionResponse};
pub use content::ContentFetcher;
pub use converter::{ConverterLease, ConverterPool};
pub use differ::{Differ, WordCounts};
pub use fetcher::RateLimitedFetcher;
pub use index::RevisionIndexReader;
pub(crate) use index::send;
pub use user_analyzer::{TagAnalysis, UserAnalyzer, reinforce};
pub use users::{AuthorResolver, UserMetadataCache};
