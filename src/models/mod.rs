// src/models/mod.rs

//! Domain models for the harvester.
//!
//! Wire envelopes of the upstream API, persisted revision and author records,
//! per-revision analysis output, and configuration.

mod analysis;
mod api;
mod author;
mod config;
mod revision;

// Re-export all public types
pub use analysis::{
    AnalysisDebug, ConfidenceVector, DiffResult, Dimension, EditType, ProcessContext,
    RevisionAnalysis,
};
pub use api::{
    ApiErrorBody, ContentBatch, Continuation, PageInfo, Redirect, ResolveQuery, ResolveResponse,
    RevisionIndexPage, RevisionsPage, RevisionsQuery, RevisionsResponse, UserBatch, UserQuery,
};
pub use author::{ANONYMOUS_ID, ANONYMOUS_TAG, AuthorData};
pub use config::{
    ApiConfig, Config, ConverterConfig, MAX_CONTENT_BATCH, MAX_INDEX_PAGE_LIMIT, MAX_USER_BATCH,
    PathsConfig, PreprocessConfig, ScraperConfig,
};
pub use revision::{
    CleanRevision, ContentRequest, ContentSlot, ContentSlots, ContinuationMarker, RevisionContent,
    RevisionMeta, parse_storage_name, storage_name,
};
