//! Author metadata.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Permission-group tag carried by anonymous authors.
pub const ANONYMOUS_TAG: &str = "*";

/// Author id used upstream for anonymous and hidden authors.
pub const ANONYMOUS_ID: u64 = 0;

/// Trust metadata of one author, cached across runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthorData {
    #[serde(rename = "userid", default)]
    pub user_id: u64,

    #[serde(default)]
    pub name: String,

    #[serde(rename = "editcount", default)]
    pub edit_count: u64,

    #[serde(default)]
    pub registration: Option<DateTime<Utc>>,

    /// Permission-group tags, unique and unordered
    #[serde(default)]
    pub groups: BTreeSet<String>,

    /// Set when the upstream knows no such author
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub missing: bool,
}

impl AuthorData {
    /// Synthetic record for anonymous edits, resolved without a lookup.
    pub fn anonymous(name: impl Into<String>) -> Self {
        Self {
            user_id: ANONYMOUS_ID,
            name: name.into(),
            edit_count: 0,
            registration: None,
            groups: BTreeSet::from([ANONYMOUS_TAG.to_string()]),
            missing: false,
        }
    }
}
