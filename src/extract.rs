//! CI token extraction from raw metadata file content.
//!
//! A token is one of the configured prefixes followed by at least
//! `min_digits` digits, on word boundaries, matched case-insensitively.
//! With the defaults this is `\b(?:CI|APM)\d{4,}\b`.

use anyhow::{bail, Result};
use regex::Regex;

use crate::models::CiId;

pub const DEFAULT_PREFIXES: &[&str] = &["CI", "APM"];
pub const DEFAULT_MIN_DIGITS: usize = 4;

/// Compiled CI token pattern.
#[derive(Debug, Clone)]
pub struct TokenPattern {
    regex: Regex,
}

impl TokenPattern {
    pub fn new<S: AsRef<str>>(prefixes: &[S], min_digits: usize) -> Result<Self> {
        if prefixes.is_empty() {
            bail!("at least one CI prefix is required");
        }
        if min_digits == 0 {
            bail!("min_digits must be >= 1");
        }
        let alternation = prefixes
            .iter()
            .map(|p| regex::escape(p.as_ref().trim()))
            .collect::<Vec<_>>()
            .join("|");
        let pattern = format!(r"(?i)\b(?:{})\d{{{},}}\b", alternation, min_digits);
        Ok(Self {
            regex: Regex::new(&pattern)?,
        })
    }

    /// All matches in `text`, uppercased. Duplicates are kept.
    pub fn extract(&self, text: &str) -> Vec<CiId> {
        self.regex
            .find_iter(text)
            .map(|m| CiId::new(m.as_str()))
            .collect()
    }
}

impl Default for TokenPattern {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIXES, DEFAULT_MIN_DIGITS).expect("default CI pattern is valid")
    }
}
