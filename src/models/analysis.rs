//! Per-revision analysis records.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::{AuthorData, RevisionMeta};

/// Revision metadata paired with its resolved author.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProcessContext {
    pub meta: RevisionMeta,
    pub user: AuthorData,
}

/// One of the four author-confidence dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dimension {
    Automation,
    Human,
    Structural,
    Maintenance,
}

/// Four independent 0–100 confidence scores about the author.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfidenceVector {
    pub automation: u8,
    pub human: u8,
    pub structural: u8,
    pub maintenance: u8,
}

impl ConfidenceVector {
    pub fn get(&self, dimension: Dimension) -> u8 {
        match dimension {
            Dimension::Automation => self.automation,
            Dimension::Human => self.human,
            Dimension::Structural => self.structural,
            Dimension::Maintenance => self.maintenance,
        }
    }

    pub fn get_mut(&mut self, dimension: Dimension) -> &mut u8 {
        match dimension {
            Dimension::Automation => &mut self.automation,
            Dimension::Human => &mut self.human,
            Dimension::Structural => &mut self.structural,
            Dimension::Maintenance => &mut self.maintenance,
        }
    }
}

/// Categorical label of an edit derived from its change and balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EditType {
    Formatting,
    Expansion,
    Cleanup,
    Rewrite,
    Mixed,
    Minor,
}

impl EditType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EditType::Formatting => "formatting",
            EditType::Expansion => "expansion",
            EditType::Cleanup => "cleanup",
            EditType::Rewrite => "rewrite",
            EditType::Mixed => "mixed",
            EditType::Minor => "minor",
        }
    }
}

impl fmt::Display for EditType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Word-level diff of a revision against its predecessor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffResult {
    pub inserted: usize,
    pub deleted: usize,
    pub unchanged: usize,

    /// Fraction of content touched, scaled to 0–100
    pub change_score: u8,
    /// One-sidedness of the edit, scaled to 0–100
    pub balance_score: u8,
    /// Disruption relative to retained content, scaled to 0–100
    pub edit_distance_score: u8,
    /// Insertion-weighted change, scaled to 0–100
    pub semantic_change_score: u8,
    /// Blend of semantic and edit-distance scores, scaled to 0–100
    pub final_score: u8,

    /// `None` until the revision has been diffed
    pub type_of_edit: Option<EditType>,
}

/// Errors and warnings collected while analysing one revision.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisDebug {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Consolidated analysis of one revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionAnalysis {
    pub process: ProcessContext,
    pub confidence: ConfidenceVector,
    pub diffs: DiffResult,
    pub debug: AnalysisDebug,
}

impl RevisionAnalysis {
    pub fn new(process: ProcessContext) -> Self {
        Self {
            process,
            confidence: ConfidenceVector::default(),
            diffs: DiffResult::default(),
            debug: AnalysisDebug::default(),
        }
    }

    pub fn rev_id(&self) -> u64 {
        self.process.meta.rev_id
    }

    pub fn record_error(&mut self, error: impl fmt::Display) {
        self.debug.errors.push(error.to_string());
    }

    pub fn record_warning(&mut self, warning: impl fmt::Display) {
        self.debug.warnings.push(warning.to_string());
    }

    pub fn has_errors(&self) -> bool {
        !self.debug.errors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_dimension_access() {
        let mut vector = ConfidenceVector::default();
        *vector.get_mut(Dimension::Structural) = 80;
        assert_eq!(vector.get(Dimension::Structural), 80);
        assert_eq!(vector.structural, 80);
        assert_eq!(vector.get(Dimension::Human), 0);
    }

    #[test]
    fn test_edit_type_serializes_lowercase() {
        let json = serde_json::to_string(&EditType::Rewrite).unwrap();
        assert_eq!(json, "\"rewrite\"");
        assert_eq!(EditType::Mixed.to_string(), "mixed");
    }

    #[test]
    fn test_diff_result_field_names() {
        let value = serde_json::to_value(DiffResult::default()).unwrap();
        assert!(value.get("editDistanceScore").is_some());
        assert!(value.get("typeOfEdit").unwrap().is_null());
    }
}
