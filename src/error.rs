//! Crate-wide error type. One variant per error kind named in the design —
//! kernel-level failures never reach this type (they are absorbed into a
//! `+inf` measure, see [`crate::shape_eval`]); everything here is either
//! surfaced as an `AnalysisResult.error` string or returned from the small
//! number of entry points that validate input before an analysis starts.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CshmError {
    #[error("input validation failed: {0}")]
    InputValidation(String),

    #[error("coordination sphere is empty or too small: {0}")]
    CoordinationEmpty(String),

    #[error("no reference library entry for coordination number {0}")]
    NoReference(usize),

    #[error("numeric failure in {stage}: {detail}")]
    NumericFailure { stage: String, detail: String },

    #[error("analysis cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(String),
}

impl CshmError {
    /// The one-line, user-visible message policy of §7: textual, localized
    /// to the failing structure/reference, never a panic across the core
    /// boundary.
    pub fn message(&self) -> String {
        self.to_string()
    }
}
