//! Word-level diffing and edit scoring.
//!
//! The differ owns the cursor holding the previously cleaned text, so it
//! must see the revisions of one document strictly in sequence.

use similar::{Algorithm, DiffTag, capture_diff_slices};

use crate::models::{DiffResult, EditType};

const SEMANTIC_DELETE_WEIGHT: f64 = 0.7;
const FINAL_SEMANTIC_WEIGHT: f64 = 0.7;
const FINAL_EDIT_DISTANCE_WEIGHT: f64 = 0.3;

/// Word counts of one diff.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WordCounts {
    pub inserted: usize,
    pub deleted: usize,
    pub unchanged: usize,
}

/// Stateful differ comparing each text against the one before it.
#[derive(Debug, Default)]
pub struct Differ {
    previous: String,
}

impl Differ {
    /// Start with an empty cursor, so the first text is fully inserted.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a known previous text.
    pub fn with_previous(previous: impl Into<String>) -> Self {
        Self {
            previous: previous.into(),
        }
    }

    pub fn previous(&self) -> &str {
        &self.previous
    }

    /// Diff `text` against the cursor, then advance the cursor to `text`.
    pub fn diff(&mut self, text: &str) -> DiffResult {
        let counts = count_words(&self.previous, text);
        self.previous = text.to_string();
        score(counts)
    }
}

/// Count inserted, deleted and unchanged words between two texts.
pub fn count_words(old: &str, new: &str) -> WordCounts {
    let old_words: Vec<&str> = old.split_whitespace().collect();
    let new_words: Vec<&str> = new.split_whitespace().collect();

    let mut counts = WordCounts::default();
    for op in capture_diff_slices(Algorithm::Myers, &old_words, &new_words) {
        let old_len = op.old_range().len();
        let new_len = op.new_range().len();
        match op.tag() {
            DiffTag::Equal => counts.unchanged += old_len,
            DiffTag::Delete => counts.deleted += old_len,
            DiffTag::Insert => counts.inserted += new_len,
            DiffTag::Replace => {
                counts.deleted += old_len;
                counts.inserted += new_len;
            }
        }
    }
    counts
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}

/// `(I+D) / (I+D+U)`
pub fn change_ratio(c: WordCounts) -> f64 {
    let touched = (c.inserted + c.deleted) as f64;
    ratio(touched, touched + c.unchanged as f64)
}

/// `|I-D| / (I+D)`, 0 when nothing changed.
pub fn balance_ratio(c: WordCounts) -> f64 {
    let touched = (c.inserted + c.deleted) as f64;
    ratio(c.inserted.abs_diff(c.deleted) as f64, touched)
}

/// `(I+D) / (2U + I+D)`
pub fn edit_distance_ratio(c: WordCounts) -> f64 {
    let touched = (c.inserted + c.deleted) as f64;
    ratio(touched, 2.0 * c.unchanged as f64 + touched)
}

/// `(I + 0.7D) / (U + I + 0.7D)`
pub fn semantic_ratio(c: WordCounts) -> f64 {
    let weighted = c.inserted as f64 + SEMANTIC_DELETE_WEIGHT * c.deleted as f64;
    ratio(weighted, c.unchanged as f64 + weighted)
}

/// Scale a fraction to an integer percentage, truncating.
pub fn to_percent(fraction: f64) -> u8 {
    // Nudge so that exact fractions such as 0.29 do not truncate to 28.
    ((fraction * 100.0) + 1e-9).floor().clamp(0.0, 100.0) as u8
}

/// First matching rule wins.
pub fn classify(change: f64, balance: f64, inserted: usize, deleted: usize) -> EditType {
    if change < 0.05 {
        EditType::Formatting
    } else if change < 0.25 && balance > 0.7 {
        if inserted > deleted {
            EditType::Expansion
        } else {
            EditType::Cleanup
        }
    } else if change >= 0.25 && balance < 0.4 {
        EditType::Rewrite
    } else if change >= 0.15 {
        EditType::Mixed
    } else {
        EditType::Minor
    }
}

/// Derive every score and the edit type from word counts.
pub fn score(counts: WordCounts) -> DiffResult {
    let change = change_ratio(counts);
    let balance = balance_ratio(counts);
    let edit_distance = edit_distance_ratio(counts);
    let semantic = semantic_ratio(counts);
    let final_score =
        FINAL_SEMANTIC_WEIGHT * semantic + FINAL_EDIT_DISTANCE_WEIGHT * edit_distance;

    DiffResult {
        inserted: counts.inserted,
        deleted: counts.deleted,
        unchanged: counts.unchanged,
        change_score: to_percent(change),
        balance_score: to_percent(balance),
        edit_distance_score: to_percent(edit_distance),
        semantic_change_score: to_percent(semantic),
        final_score: to_percent(final_score),
        type_of_edit: Some(classify(change, balance, counts.inserted, counts.deleted)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(inserted: usize, deleted: usize, unchanged: usize) -> WordCounts {
        WordCounts {
            inserted,
            deleted,
            unchanged,
        }
    }

    #[test]
    fn test_first_text_is_fully_inserted() {
        let mut differ = Differ::new();
        let result = differ.diff("the quick brown fox jumps");

        assert_eq!(result.inserted, 5);
        assert_eq!(result.deleted, 0);
        assert_eq!(result.unchanged, 0);
        assert_eq!(result.change_score, 100);
        assert_eq!(result.balance_score, 100);
        assert_eq!(result.type_of_edit, Some(EditType::Mixed));
        assert_eq!(differ.previous(), "the quick brown fox jumps");
    }

    #[test]
    fn test_identical_texts_are_formatting() {
        let mut differ = Differ::with_previous("alpha beta  gamma\ndelta");
        let result = differ.diff("alpha beta gamma delta");

        assert_eq!(result.inserted, 0);
        assert_eq!(result.deleted, 0);
        assert_eq!(result.unchanged, 4);
        assert_eq!(result.change_score, 0);
        assert_eq!(result.balance_score, 0);
        assert_eq!(result.type_of_edit, Some(EditType::Formatting));
    }

    #[test]
    fn test_words_are_the_unit_of_comparison() {
        let c = count_words("one two three four", "one two THREE four five");
        assert_eq!(c, counts(2, 1, 3));
    }

    #[test]
    fn test_balance_safe_without_changes() {
        assert_eq!(balance_ratio(counts(0, 0, 0)), 0.0);
        assert_eq!(balance_ratio(counts(0, 0, 1000)), 0.0);
        let empty = score(counts(0, 0, 0));
        assert_eq!(empty.final_score, 0);
        assert_eq!(empty.type_of_edit, Some(EditType::Formatting));
    }

    #[test]
    fn test_scores_follow_formulas() {
        // I=10, D=5, U=85
        let result = score(counts(10, 5, 85));
        assert_eq!(result.change_score, 15);
        assert_eq!(result.balance_score, 33);
        // 15 / 185
        assert_eq!(result.edit_distance_score, 8);
        // 13.5 / 98.5
        assert_eq!(result.semantic_change_score, 13);
        // 0.7 * 0.13705 + 0.3 * 0.08108
        assert_eq!(result.final_score, 12);
        assert_eq!(result.type_of_edit, Some(EditType::Mixed));
    }

    #[test]
    fn test_classification_rules_in_order() {
        assert_eq!(classify(0.04, 1.0, 1, 0), EditType::Formatting);
        assert_eq!(classify(0.10, 0.9, 9, 1), EditType::Expansion);
        assert_eq!(classify(0.10, 0.9, 1, 9), EditType::Cleanup);
        assert_eq!(classify(0.10, 0.9, 5, 5), EditType::Cleanup);
        assert_eq!(classify(0.30, 0.2, 4, 3), EditType::Rewrite);
        assert_eq!(classify(0.30, 0.5, 6, 2), EditType::Mixed);
        assert_eq!(classify(0.20, 0.5, 6, 2), EditType::Mixed);
        assert_eq!(classify(0.10, 0.5, 6, 2), EditType::Minor);
    }

    #[test]
    fn test_percent_truncates() {
        assert_eq!(to_percent(0.29), 29);
        assert_eq!(to_percent(0.999), 99);
        assert_eq!(to_percent(1.0), 100);
        assert_eq!(to_percent(0.0), 0);
    }

    #[test]
    fn test_exact_change_ratio_is_not_rounded_down() {
        // 29 / 100 is 28.999999999999996 in floating point; plain truncation
        // would report 28
        let result = score(counts(29, 0, 71));
        assert!((29.0_f64 / 100.0) * 100.0 < 29.0);
        assert_eq!(result.change_score, 29);
        assert_eq!(result.semantic_change_score, 29);
        assert_eq!(result.balance_score, 100);
    }
}
