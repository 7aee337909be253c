//! Error classification shared by every layer.

use serde::Serialize;

/// Transport-independent category of a failure.
///
/// Callers use this to tell "the thing does not exist" apart from "the thing
/// exists but refuses the operation" and from malformed input, without
/// matching on concrete error types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// The referenced order, payment, coupon or product option does not exist.
    NotFound,
    /// The operation is illegal for the current state (transition, owner, stock, ...).
    InvalidState,
    /// Input was rejected before any aggregate was touched.
    Validation,
    /// An external collaborator (payment gateway) failed.
    External,
    /// Storage or other infrastructure fault.
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::InvalidState => "INVALID_STATE",
            ErrorKind::Validation => "VALIDATION",
            ErrorKind::External => "EXTERNAL",
            ErrorKind::Internal => "INTERNAL",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
