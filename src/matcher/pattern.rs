//! Pattern matching implementation.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::codec::{is_pow, DEFAULT_PREFIX};

/// Characters that can appear in a base-58 address.
pub const BASE58_ALPHABET: &str = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

/// What a search session looks for.
///
/// On the wire this is the object `{start?, end?}`; an empty object selects
/// the PoW pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Anchors", into = "Anchors")]
pub enum Criteria {
    /// The PoW prefix followed by a non-zero-leading digit run
    Pow,
    /// Address starts with the string
    Start(String),
    /// Address ends with the string
    End(String),
    /// Address starts with `start` and ends with `end`
    StartAndEnd { start: String, end: String },
}

#[derive(Serialize, Deserialize)]
struct Anchors {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    start: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    end: Option<String>,
}

impl Criteria {
    /// Builds criteria from optional start/end anchors.
    pub fn from_anchors(start: Option<String>, end: Option<String>) -> Self {
        match (start, end) {
            (None, None) => Criteria::Pow,
            (Some(start), None) => Criteria::Start(start),
            (None, Some(end)) => Criteria::End(end),
            (Some(start), Some(end)) => Criteria::StartAndEnd { start, end },
        }
    }

    /// Returns the anchor strings, in start/end order.
    pub fn anchors(&self) -> (Option<&str>, Option<&str>) {
        match self {
            Criteria::Pow => (None, None),
            Criteria::Start(start) => (Some(start.as_str()), None),
            Criteria::End(end) => (None, Some(end.as_str())),
            Criteria::StartAndEnd { start, end } => (Some(start.as_str()), Some(end.as_str())),
        }
    }
}

impl From<Anchors> for Criteria {
    fn from(anchors: Anchors) -> Self {
        Criteria::from_anchors(anchors.start, anchors.end)
    }
}

impl From<Criteria> for Anchors {
    fn from(criteria: Criteria) -> Self {
        let (start, end) = criteria.anchors();
        Anchors {
            start: start.map(str::to_string),
            end: end.map(str::to_string),
        }
    }
}

impl fmt::Display for Criteria {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Criteria::Pow => write!(f, "pow"),
            Criteria::Start(start) => write!(f, "start \"{}\"", start),
            Criteria::End(end) => write!(f, "end \"{}\"", end),
            Criteria::StartAndEnd { start, end } => {
                write!(f, "start \"{}\" + end \"{}\"", start, end)
            }
        }
    }
}

/// Returns the first character of `s` that can never occur in an address.
pub fn find_invalid_char(s: &str) -> Option<char> {
    s.chars().find(|c| !BASE58_ALPHABET.contains(*c))
}

/// A compiled pattern for efficient matching.
///
/// Immutable once built; one instance is shared by every worker of a session.
#[derive(Debug, Clone)]
pub struct Pattern {
    /// The criteria being matched
    criteria: Criteria,
    /// Literal prefix for the PoW pattern
    pow_prefix: String,
}

impl Pattern {
    /// Compiles criteria using the default PoW prefix.
    pub fn new(criteria: Criteria) -> Self {
        Self::with_pow_prefix(criteria, DEFAULT_PREFIX)
    }

    /// Compiles criteria with a custom PoW prefix.
    pub fn with_pow_prefix(criteria: Criteria, pow_prefix: impl Into<String>) -> Self {
        Self {
            criteria,
            pow_prefix: pow_prefix.into(),
        }
    }

    /// Returns the criteria.
    pub fn criteria(&self) -> &Criteria {
        &self.criteria
    }

    /// Returns the PoW prefix.
    pub fn pow_prefix(&self) -> &str {
        &self.pow_prefix
    }

    /// Matches an address against this pattern.
    #[inline]
    pub fn matches(&self, address: &str) -> bool {
        match &self.criteria {
            Criteria::Pow => is_pow(address, &self.pow_prefix),
            Criteria::Start(start) => address.starts_with(start.as_str()),
            Criteria::End(end) => address.ends_with(end.as_str()),
            Criteria::StartAndEnd { start, end } => {
                address.starts_with(start.as_str()) && address.ends_with(end.as_str())
            }
        }
    }

    /// Returns the estimated difficulty (number of attempts to find a match).
    ///
    /// Each anchored base-58 character has 58 possible values. The PoW
    /// pattern needs its prefix plus one non-zero digit (9 of 58 values).
    pub fn estimated_difficulty(&self) -> u64 {
        let anchored = |n: usize| 58u64.saturating_pow(n as u32);
        match &self.criteria {
            Criteria::Pow => anchored(self.pow_prefix.len()).saturating_mul(58) / 9,
            Criteria::Start(s) | Criteria::End(s) => anchored(s.len()),
            Criteria::StartAndEnd { start, end } => anchored(start.len() + end.len()),
        }
    }

    /// Returns a human-readable difficulty estimate.
    pub fn difficulty_description(&self) -> String {
        let diff = self.estimated_difficulty();
        match diff {
            0..=100_000 => "Very Easy (< 1 second)".into(),
            100_001..=10_000_000 => "Easy (seconds to minutes)".into(),
            10_000_001..=1_000_000_000 => "Medium (minutes to hours)".into(),
            1_000_000_001..=100_000_000_000 => "Hard (hours to days)".into(),
            _ => "Very Hard (weeks or more)".into(),
        }
    }
}
