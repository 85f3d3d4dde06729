//! # Error Classifier
//!
//! Maps a per-asset failure message to a retry category.
//!
//! Transient patterns are checked first, then permanent ones. Anything that
//! matches neither is `Unknown` and is never retried automatically.

use crate::job::AssetError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static TRANSIENT_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?ix)
        time[d\s-]*out | etimedout
        | rate[\s_-]*limit | too\s+many\s+requests | \b429\b
        | \b50[234]\b | bad\s+gateway | gateway\s+time
        | service\s+unavailable | temporarily\s+unavailable
        | network | socket\s+hang\s+up
        | connection\s+(reset|refused|closed|aborted) | econnreset | econnrefused
        | retry",
    )
    .expect("transient pattern is valid")
});

static PERMANENT_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?ix)
        not\s+found | \b404\b
        | unauthori[sz]ed | \b401\b
        | forbidden | \b403\b
        | bad\s+request | \b400\b | malformed | invalid
        | unsupported\s+(format|media|file|type)
        | expired | credentials",
    )
    .expect("permanent pattern is valid")
});

/// Retry category of a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    /// Likely to succeed on retry (timeouts, rate limits, 5xx gateways)
    Transient,
    /// Will not resolve on retry (auth, not found, malformed input)
    Permanent,
    /// Not recognised; treated as not retryable
    Unknown,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Transient => "transient",
            ErrorCategory::Permanent => "permanent",
            ErrorCategory::Unknown => "unknown",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorCategory::Transient)
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A per-asset failure with its retry category
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategorizedError {
    pub asset_id: String,
    pub original_message: String,
    pub category: ErrorCategory,
    /// True iff `category` is `Transient`
    pub retryable: bool,
}

impl CategorizedError {
    pub fn to_asset_error(&self) -> AssetError {
        AssetError::new(&self.asset_id, &self.original_message)
    }
}

/// Category of a raw failure message.
pub fn categorize(message: &str) -> ErrorCategory {
    if TRANSIENT_PATTERN.is_match(message) {
        ErrorCategory::Transient
    } else if PERMANENT_PATTERN.is_match(message) {
        ErrorCategory::Permanent
    } else {
        ErrorCategory::Unknown
    }
}

/// Classify one per-asset failure.
pub fn classify(asset_id: &str, message: &str) -> CategorizedError {
    let category = categorize(message);
    CategorizedError {
        asset_id: asset_id.to_string(),
        original_message: message.to_string(),
        category,
        retryable: category.is_retryable(),
    }
}

/// Failures partitioned by category, order preserved within each group
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedBatch {
    pub transient: Vec<CategorizedError>,
    pub permanent: Vec<CategorizedError>,
    pub unknown: Vec<CategorizedError>,
}

impl ClassifiedBatch {
    pub fn transient_count(&self) -> usize {
        self.transient.len()
    }

    pub fn permanent_count(&self) -> usize {
        self.permanent.len()
    }

    pub fn unknown_count(&self) -> usize {
        self.unknown.len()
    }

    pub fn total(&self) -> usize {
        self.transient.len() + self.permanent.len() + self.unknown.len()
    }

    /// Whether an automatic retry pass has anything to do
    pub fn has_transient(&self) -> bool {
        !self.transient.is_empty()
    }
}

/// Partition a list of per-asset failures by category.
pub fn classify_batch(errors: &[AssetError]) -> ClassifiedBatch {
    let mut batch = ClassifiedBatch::default();
    for error in errors {
        let classified = classify(&error.asset_id, &error.message);
        match classified.category {
            ErrorCategory::Transient => batch.transient.push(classified),
            ErrorCategory::Permanent => batch.permanent.push(classified),
            ErrorCategory::Unknown => batch.unknown.push(classified),
        }
    }
    batch
}
