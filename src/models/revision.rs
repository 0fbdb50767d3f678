//! Revision records as fetched, stored, and cleaned.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata of one revision as listed by the revision index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RevisionMeta {
    #[serde(rename = "revid")]
    pub rev_id: u64,

    #[serde(rename = "parentid", default)]
    pub parent_id: u64,

    pub timestamp: DateTime<Utc>,

    /// Byte size of the revision
    #[serde(default)]
    pub size: u64,

    /// Author display name (an IP address for anonymous edits)
    #[serde(default)]
    pub user: String,

    /// Author id, 0 for anonymous or hidden authors
    #[serde(rename = "userid", default)]
    pub user_id: u64,

    #[serde(default)]
    pub comment: String,
}

impl RevisionMeta {
    /// Storage name shared by the raw and cleaned files of this revision.
    pub fn storage_name(&self) -> String {
        storage_name(self.timestamp, self.rev_id)
    }

    /// Request to fetch this revision's content.
    pub fn content_request(&self) -> ContentRequest {
        ContentRequest {
            rev_id: self.rev_id,
            timestamp: self.timestamp,
        }
    }
}

/// Request to fetch the full content of one revision.
///
/// The timestamp lets the fetcher detect an already stored revision
/// without a network call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRequest {
    pub rev_id: u64,
    pub timestamp: DateTime<Utc>,
}

impl ContentRequest {
    pub fn storage_name(&self) -> String {
        storage_name(self.timestamp, self.rev_id)
    }
}

/// `{unixTimestamp}-{revisionId}.json`
pub fn storage_name(timestamp: DateTime<Utc>, rev_id: u64) -> String {
    format!("{}-{}.json", timestamp.timestamp(), rev_id)
}

/// Parse a storage name back into `(unix timestamp, revision id)`.
pub fn parse_storage_name(name: &str) -> Option<(i64, u64)> {
    let stem = name.strip_suffix(".json")?;
    let (ts, id) = stem.split_once('-')?;
    Some((ts.parse().ok()?, id.parse().ok()?))
}

/// Main content slot of a revision.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ContentSlot {
    #[serde(rename = "contentmodel", default)]
    pub content_model: String,

    #[serde(rename = "contentformat", default)]
    pub content_format: String,

    /// Raw markup; empty when the upstream hides the text
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ContentSlots {
    #[serde(default)]
    pub main: ContentSlot,
}

/// Full content of one revision, persisted verbatim to `revs/`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RevisionContent {
    #[serde(rename = "revid")]
    pub rev_id: u64,

    #[serde(rename = "parentid", default)]
    pub parent_id: u64,

    pub timestamp: DateTime<Utc>,

    #[serde(default)]
    pub slots: ContentSlots,

    #[serde(default)]
    pub user: String,

    #[serde(default)]
    pub comment: String,
}

impl RevisionContent {
    /// Raw markup text.
    pub fn markup(&self) -> &str {
        &self.slots.main.content
    }

    pub fn storage_name(&self) -> String {
        storage_name(self.timestamp, self.rev_id)
    }
}

/// Plain-text rendition of a revision, persisted to `clean/`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CleanRevision {
    #[serde(rename = "revid")]
    pub rev_id: u64,

    #[serde(rename = "parentid")]
    pub parent_id: u64,

    pub timestamp: DateTime<Utc>,

    #[serde(rename = "contentformat")]
    pub content_format: String,

    pub content: String,
}

impl CleanRevision {
    pub const FORMAT: &'static str = "plaintext";

    /// Wrap converted text for the given raw revision.
    pub fn from_content(raw: &RevisionContent, text: String) -> Self {
        Self {
            rev_id: raw.rev_id,
            parent_id: raw.parent_id,
            timestamp: raw.timestamp,
            content_format: Self::FORMAT.to_string(),
            content: text,
        }
    }

    pub fn storage_name(&self) -> String {
        storage_name(self.timestamp, self.rev_id)
    }
}

/// Last persisted `(revision, parent)` pair, kept for resumability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContinuationMarker {
    pub rev_id: u64,
    pub parent_id: u64,
}

impl ContinuationMarker {
    /// Parse the `"{revid}-{parentid}"` marker text.
    pub fn parse(text: &str) -> Option<Self> {
        let (rev, parent) = text.trim().split_once('-')?;
        Some(Self {
            rev_id: rev.parse().ok()?,
            parent_id: parent.parse().ok()?,
        })
    }
}

impl std::fmt::Display for ContinuationMarker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.rev_id, self.parent_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_meta_deserializes_upstream_shape() {
        let meta: RevisionMeta = serde_json::from_str(
            r#"{"revid": 42, "parentid": 41, "timestamp": "2024-01-02T03:04:05Z",
                "size": 1200, "user": "Alice", "userid": 7, "comment": "typo"}"#,
        )
        .unwrap();
        assert_eq!(meta.rev_id, 42);
        assert_eq!(meta.user_id, 7);
        assert_eq!(meta.storage_name(), "1704164645-42.json");
    }

    #[test]
    fn test_meta_tolerates_hidden_user() {
        let meta: RevisionMeta = serde_json::from_str(
            r#"{"revid": 5, "parentid": 0, "timestamp": "2001-01-01T00:00:00Z", "userhidden": true}"#,
        )
        .unwrap();
        assert_eq!(meta.user_id, 0);
        assert!(meta.user.is_empty());
    }

    #[test]
    fn test_storage_name_round_trip() {
        let ts = Utc.with_ymd_and_hms(2020, 5, 1, 12, 0, 0).unwrap();
        let name = storage_name(ts, 991);
        assert_eq!(parse_storage_name(&name), Some((ts.timestamp(), 991)));
        assert_eq!(parse_storage_name("notes.txt"), None);
    }

    #[test]
    fn test_marker_parse_and_display() {
        let marker = ContinuationMarker::parse("1200-1199\n").unwrap();
        assert_eq!(marker.rev_id, 1200);
        assert_eq!(marker.parent_id, 1199);
        assert_eq!(marker.to_string(), "1200-1199");
        assert!(ContinuationMarker::parse("garbage").is_none());
    }

    #[test]
    fn test_clean_revision_keeps_identity() {
        let raw: RevisionContent = serde_json::from_str(
            r#"{"revid": 3, "parentid": 2, "timestamp": "2010-01-01T00:00:00Z",
                "slots": {"main": {"contentmodel": "wikitext", "contentformat": "text/x-wiki",
                "content": "'''Bold'''"}}, "user": "Bob", "comment": ""}"#,
        )
        .unwrap();
        assert_eq!(raw.markup(), "'''Bold'''");
        let clean = CleanRevision::from_content(&raw, "Bold".into());
        assert_eq!(clean.content_format, "plaintext");
        assert_eq!(clean.storage_name(), raw.storage_name());
    }
}
