//! Shared value types for the extraction domain.
//!
//! Unlike the newtype identifiers in [`crate::identifiers`], these types carry
//! meaningful values with invariants (input text is non-empty and bounded,
//! proficiency levels come from a closed set) and participate in domain
//! computations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Token accounting
// ---------------------------------------------------------------------------

/// Number of tokens consumed in an LLM API call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TokenCount(u64);

impl TokenCount {
    /// Creates a [`TokenCount`] from a raw integer.
    pub fn new(count: u64) -> Self {
        Self(count)
    }

    /// Returns the underlying integer value.
    pub fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns `true` if this count is zero.
    pub fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Display for TokenCount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::ops::Add for TokenCount {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

/// Token usage reported by a provider for one completion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Tokens in the rendered prompt (system + user).
    pub prompt: TokenCount,
    /// Tokens generated by the model.
    pub completion: TokenCount,
}

impl TokenUsage {
    /// Total tokens billed for the call.
    pub fn total(self) -> TokenCount {
        self.prompt + self.completion
    }
}

// ---------------------------------------------------------------------------
// Proficiency levels
// ---------------------------------------------------------------------------

/// A CEFR proficiency level, used as the *requested* target level for an
/// extraction.
///
/// The level reported back by the model ([`crate::ExtractionResult::language_level`])
/// stays a free-form string; this enum only constrains what callers ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CefrLevel {
    A1,
    A2,
    B1,
    B2,
    C1,
    C2,
}

impl CefrLevel {
    /// All levels from beginner to mastery.
    pub const ALL: [CefrLevel; 6] = [
        CefrLevel::A1,
        CefrLevel::A2,
        CefrLevel::B1,
        CefrLevel::B2,
        CefrLevel::C1,
        CefrLevel::C2,
    ];

    /// Returns the canonical upper-case label (e.g. `"B1"`).
    pub fn as_str(self) -> &'static str {
        match self {
            CefrLevel::A1 => "A1",
            CefrLevel::A2 => "A2",
            CefrLevel::B1 => "B1",
            CefrLevel::B2 => "B2",
            CefrLevel::C1 => "C1",
            CefrLevel::C2 => "C2",
        }
    }
}

impl std::fmt::Display for CefrLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string is not one of the six CEFR labels.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown CEFR level '{0}' (expected one of A1, A2, B1, B2, C1, C2)")]
pub struct ParseCefrLevelError(String);

impl std::str::FromStr for CefrLevel {
    type Err = ParseCefrLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        CefrLevel::ALL
            .into_iter()
            .find(|level| level.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| ParseCefrLevelError(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Input text
// ---------------------------------------------------------------------------

/// Default upper bound on the number of whitespace-separated words accepted
/// as input.
pub const DEFAULT_MAX_INPUT_WORDS: usize = 100;

/// Why a piece of input text was rejected before any LLM call.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum InputTextError {
    /// The text is empty or contains only whitespace.
    #[error("input text is empty")]
    Empty,

    /// The text has more words than the task accepts.
    #[error("input text has {count} words; at most {max} are accepted")]
    TooManyWords {
        /// Whitespace-separated words found.
        count: usize,
        /// Configured limit.
        max: usize,
    },
}

/// Source text accepted for analysis.
///
/// Holds the caller's text verbatim (no trimming or normalisation is applied
/// to what is sent to the model); only the checks are whitespace-aware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceText {
    text: String,
    word_count: usize,
}

impl SourceText {
    /// Validates `text` against the word limit `max_words`.
    pub fn new(text: impl Into<String>, max_words: usize) -> Result<Self, InputTextError> {
        let text = text.into();
        let word_count = text.split_whitespace().count();
        if word_count == 0 {
            return Err(InputTextError::Empty);
        }
        if word_count > max_words {
            return Err(InputTextError::TooManyWords {
                count: word_count,
                max: max_words,
            });
        }
        Ok(Self { text, word_count })
    }

    /// Returns the text as given by the caller.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Number of whitespace-separated words in the text.
    pub fn word_count(&self) -> usize {
        self.word_count
    }
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// A UTC wall-clock timestamp.
///
/// Wraps [`chrono::DateTime<Utc>`] so callers never depend on `chrono` types
/// directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Returns the current UTC time as a [`Timestamp`].
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Creates a [`Timestamp`] from a [`DateTime<Utc>`].
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Returns the underlying [`DateTime<Utc>`].
    pub fn as_datetime(self) -> DateTime<Utc> {
        self.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}
