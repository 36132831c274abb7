//! Language tags and the per-session language pair.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LanguageTagError {
    #[error("language tag is empty")]
    Empty,
    #[error("invalid language tag {tag:?}: {reason}")]
    Invalid { tag: String, reason: &'static str },
}

/// IETF-style language tag (`en`, `es`, `pt-br`), normalized to lowercase with
/// `-` separators so that `pt_BR` and `pt-br` compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LanguageTag(String);

impl LanguageTag {
    pub fn parse(raw: &str) -> Result<Self, LanguageTagError> {
        let normalized = raw.trim().to_ascii_lowercase().replace('_', "-");
        if normalized.is_empty() {
            return Err(LanguageTagError::Empty);
        }

        let mut subtags = normalized.split('-');
        let primary = subtags.next().unwrap_or_default();
        if !(2..=8).contains(&primary.len()) || !primary.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(LanguageTagError::Invalid {
                tag: raw.to_string(),
                reason: "primary subtag must be 2-8 letters",
            });
        }
        for subtag in subtags {
            if subtag.is_empty()
                || subtag.len() > 8
                || !subtag.chars().all(|c| c.is_ascii_alphanumeric())
            {
                return Err(LanguageTagError::Invalid {
                    tag: raw.to_string(),
                    reason: "subtags must be 1-8 alphanumeric characters",
                });
            }
        }

        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The primary language subtag (`pt` for `pt-br`).
    pub fn primary(&self) -> &str {
        self.0.split('-').next().unwrap_or(&self.0)
    }
}

impl fmt::Display for LanguageTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for LanguageTag {
    type Err = LanguageTagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for LanguageTag {
    type Error = LanguageTagError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<LanguageTag> for String {
    fn from(tag: LanguageTag) -> Self {
        tag.0
    }
}

/// The two languages a session was opened with, in declaration order
/// (`user1Language`, `user2Language`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LanguagePair {
    pub first: LanguageTag,
    pub second: LanguageTag,
}

impl LanguagePair {
    pub fn new(first: LanguageTag, second: LanguageTag) -> Self {
        Self { first, second }
    }

    /// Two pairs are compatible when they name the same two languages,
    /// regardless of order.
    pub fn is_compatible_with(&self, other: &LanguagePair) -> bool {
        (self.first == other.first && self.second == other.second)
            || (self.first == other.second && self.second == other.first)
    }

    pub fn contains(&self, tag: &LanguageTag) -> bool {
        &self.first == tag || &self.second == tag
    }

    /// Whether a `source -> target` request stays inside this pair.
    pub fn covers(&self, source: &LanguageTag, target: &LanguageTag) -> bool {
        self.contains(source) && self.contains(target)
    }
}

impl fmt::Display for LanguagePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.first, self.second)
    }
}
