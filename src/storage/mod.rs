//! Persistence of harvested documents.
//!
//! Each document owns one directory under the dump root. Revision files are
//! named `{unixTimestamp}-{revisionId}.json` so that re-runs detect already
//! fetched revisions by file presence.

pub mod local;

// Re-export for convenience
pub use local::{DumpStorage, IndexWriter};
