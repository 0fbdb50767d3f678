//! Author confidence scoring from permission-group tags.

use crate::models::{ANONYMOUS_TAG, AuthorData, ConfidenceVector, Dimension};

/// One entry of the reinforcement table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagRule {
    pub tag: &'static str,
    pub dimension: Dimension,
    pub weight: u8,
}

const fn rule(tag: &'static str, dimension: Dimension, weight: u8) -> TagRule {
    TagRule {
        tag,
        dimension,
        weight,
    }
}

/// Tag → (dimension, weight).
pub static RULES: &[TagRule] = &[
    // Automation
    rule("bot", Dimension::Automation, 100),
    rule("global-bot", Dimension::Automation, 80),
    rule("flood", Dimension::Automation, 60),
    rule("templateeditor", Dimension::Automation, 60),
    // Human
    rule("user", Dimension::Human, 85),
    rule("autoconfirmed", Dimension::Human, 85),
    rule("confirmed", Dimension::Human, 85),
    rule("extendedconfirmed", Dimension::Human, 90),
    rule("reviewer", Dimension::Human, 80),
    rule("autoreviewer", Dimension::Human, 80),
    rule("editor", Dimension::Human, 70),
    rule("researcher", Dimension::Human, 60),
    rule("abusefilter", Dimension::Human, 60),
    rule("temp", Dimension::Human, 60),
    rule("temporary-account-viewer", Dimension::Human, 75),
    rule("ipblock-exempt", Dimension::Human, 65),
    // Structural
    rule("sysop", Dimension::Structural, 80),
    rule("global-sysop", Dimension::Structural, 90),
    // Maintenance
    rule("bureaucrat", Dimension::Maintenance, 80),
    rule("checkuser", Dimension::Maintenance, 80),
    rule("rollbacker", Dimension::Maintenance, 80),
    rule("patroller", Dimension::Maintenance, 70),
    rule("extendedmover", Dimension::Maintenance, 65),
    rule("filemover", Dimension::Maintenance, 50),
];

/// Tags that are known but carry no signal.
pub static IGNORED_TAGS: &[&str] = &[ANONYMOUS_TAG];

/// `current + (100 - current) * weight / 100`, in integer arithmetic.
///
/// Never exceeds 100 and never decreases `current`.
pub fn reinforce(current: u8, weight: u8) -> u8 {
    let current = u32::from(current.min(100));
    let weight = u32::from(weight.min(100));
    (current + (100 - current) * weight / 100) as u8
}

pub fn lookup(tag: &str) -> Option<&'static TagRule> {
    RULES.iter().find(|rule| rule.tag == tag)
}

/// Outcome of scoring one author.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagAnalysis {
    pub confidence: ConfidenceVector,
    /// Tags found in neither the rule table nor the ignored set
    pub unknown: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UserAnalyzer;

impl UserAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Reinforce `vector` with every recognised tag.
    pub fn apply_tags<'a, I>(&self, tags: I, mut vector: ConfidenceVector) -> TagAnalysis
    where
        I: IntoIterator<Item = &'a String>,
    {
        let mut unknown = Vec::new();
        for tag in tags {
            match lookup(tag) {
                Some(rule) => {
                    let slot = vector.get_mut(rule.dimension);
                    *slot = reinforce(*slot, rule.weight);
                }
                None if IGNORED_TAGS.contains(&tag.as_str()) => {}
                None => {
                    log::debug!("Unknown author tag '{tag}'");
                    unknown.push(tag.clone());
                }
            }
        }
        TagAnalysis {
            confidence: vector,
            unknown,
        }
    }

    /// Score an author starting from an all-zero vector.
    pub fn analyse(&self, author: &AuthorData) -> TagAnalysis {
        self.apply_tags(&author.groups, ConfidenceVector::default())
    }
}
