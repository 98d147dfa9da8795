//! Substitution rules: ordered `(pattern, replacement)` pairs over opaque text.
//!
//! Every rule runs over the whole working text, replaces every non-overlapping
//! match (leftmost-first), and hands its output to the next rule. Replacement
//! text is never expanded (`$name` stays literal); a [`Replacement::LineBreak`]
//! reuses the line ending found in the matched text.

use regex::{Captures, NoExpand, Regex};
use serde::Serialize;
use std::borrow::Cow;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RuleError {
    #[error("Rule {id}: invalid regular expression: {source}")]
    InvalidPattern {
        id: String,
        #[source]
        source: regex::Error,
    },

    #[error("Rule {id}: literal pattern must not be empty")]
    EmptyLiteral { id: String },
}

/// What a rule searches for.
#[derive(Debug, Clone)]
pub enum Pattern {
    /// Exact substring match
    Literal(String),
    /// Unanchored regular expression
    Regex(Regex),
}

impl Pattern {
    /// Number of non-overlapping matches in `text`.
    pub fn count_matches(&self, text: &str) -> usize {
        match self {
            Pattern::Literal(needle) => text.matches(needle.as_str()).count(),
            Pattern::Regex(re) => re.find_iter(text).count(),
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pattern::Literal(needle) => write!(f, "literal {:?}", needle),
            Pattern::Regex(re) => write!(f, "regex /{}/", re.as_str()),
        }
    }
}

/// What a match is replaced with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Replacement {
    /// Fixed text, inserted as-is
    Verbatim(String),
    /// One line break, `\r\n` if the matched text contained one, else `\n`
    LineBreak,
}

impl Replacement {
    /// Text to insert in place of `matched`.
    pub fn render(&self, matched: &str) -> &str {
        match self {
            Replacement::Verbatim(text) => text,
            Replacement::LineBreak if matched.contains("\r\n") => "\r\n",
            Replacement::LineBreak => "\n",
        }
    }
}

impl From<&str> for Replacement {
    fn from(text: &str) -> Self {
        Replacement::Verbatim(text.to_string())
    }
}

impl From<String> for Replacement {
    fn from(text: String) -> Self {
        Replacement::Verbatim(text)
    }
}

/// A single find-and-replace step.
#[derive(Debug, Clone)]
#[must_use = "SubstitutionRule does nothing until applied"]
pub struct SubstitutionRule {
    /// Stable identifier used in reports
    pub id: String,
    pub pattern: Pattern,
    /// Inserted in place of each match
    pub replacement: Replacement,
}

impl SubstitutionRule {
    /// Create a literal rule. Empty needles are rejected since they would
    /// match between every character.
    pub fn literal(
        id: impl Into<String>,
        needle: impl Into<String>,
        replacement: impl Into<Replacement>,
    ) -> Result<Self, RuleError> {
        let id = id.into();
        let needle = needle.into();
        if needle.is_empty() {
            return Err(RuleError::EmptyLiteral { id });
        }
        Ok(Self {
            id,
            pattern: Pattern::Literal(needle),
            replacement: replacement.into(),
        })
    }

    /// Compile `pattern` and create a regex rule.
    pub fn regex(
        id: impl Into<String>,
        pattern: &str,
        replacement: impl Into<Replacement>,
    ) -> Result<Self, RuleError> {
        let id = id.into();
        let re = Regex::new(pattern).map_err(|source| RuleError::InvalidPattern {
            id: id.clone(),
            source,
        })?;
        Ok(Self::with_regex(id, re, replacement))
    }

    /// Create a regex rule from an already compiled expression.
    pub fn with_regex(
        id: impl Into<String>,
        re: Regex,
        replacement: impl Into<Replacement>,
    ) -> Self {
        Self {
            id: id.into(),
            pattern: Pattern::Regex(re),
            replacement: replacement.into(),
        }
    }

    /// Apply this rule to `text`, returning the new text and the number of
    /// replacements made. Borrows the input when nothing matched.
    pub fn apply<'t>(&self, text: &'t str) -> (Cow<'t, str>, usize) {
        let count = self.pattern.count_matches(text);
        if count == 0 {
            return (Cow::Borrowed(text), 0);
        }

        let replaced = match (&self.pattern, &self.replacement) {
            (Pattern::Literal(needle), replacement) => {
                Cow::Owned(text.replace(needle.as_str(), replacement.render(needle)))
            }
            (Pattern::Regex(re), Replacement::Verbatim(fixed)) => {
                re.replace_all(text, NoExpand(fixed))
            }
            (Pattern::Regex(re), replacement) => re.replace_all(text, |caps: &Captures<'_>| {
                replacement.render(&caps[0]).to_string()
            }),
        };

        (replaced, count)
    }
}

/// Per-rule outcome of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleReport {
    pub id: String,
    pub replacements: usize,
}

/// Result of running a [`RuleSet`] over a string.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "Transform holds the rewritten text"]
pub struct Transform {
    pub text: String,
    pub reports: Vec<RuleReport>,
}

impl Transform {
    /// Total replacements across all rules.
    pub fn total_replacements(&self) -> usize {
        self.reports.iter().map(|r| r.replacements).sum()
    }
}

/// Rules applied in insertion order, each over the previous rule's output.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<SubstitutionRule>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a rule (builder style).
    pub fn with(mut self, rule: SubstitutionRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = &SubstitutionRule> {
        self.rules.iter()
    }

    /// Run every rule in order.
    pub fn apply(&self, text: &str) -> Transform {
        let mut working = text.to_string();
        let mut reports = Vec::with_capacity(self.rules.len());

        for rule in &self.rules {
            let (next, replacements) = rule.apply(&working);
            tracing::debug!(rule = %rule.id, replacements, "applied substitution rule");
            if let Cow::Owned(next) = next {
                working = next;
            }
            reports.push(RuleReport {
                id: rule.id.clone(),
                replacements,
            });
        }

        Transform {
            text: working,
            reports,
        }
    }

    /// Count matches of each rule against `text` without rewriting it.
    ///
    /// Every rule sees the same input, so counts for later rules may differ
    /// from what [`RuleSet::apply`] would report.
    pub fn scan(&self, text: &str) -> Vec<RuleReport> {
        self.rules
            .iter()
            .map(|rule| RuleReport {
                id: rule.id.clone(),
                replacements: rule.pattern.count_matches(text),
            })
            .collect()
    }
}
