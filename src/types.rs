//! Shared types for repowatch

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;

/// Error type for parsing failures
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("branch name cannot be empty")]
    Empty,
    #[error("branch name cannot contain '..'")]
    DotDot,
    #[error("branch name cannot start with '{0}'")]
    InvalidStart(char),
    #[error("branch name cannot end with '{0}'")]
    InvalidEnd(char),
    #[error("branch name cannot contain control characters")]
    ControlCharacter,
}

/// A branch short name, e.g. `main` or `feature/login`.
///
/// Validation rules:
/// - Non-empty
/// - No `..` sequences (path traversal)
/// - Cannot start with `-` (flag injection) or `/`
/// - Cannot end with `/`
/// - No control characters or null bytes
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct BranchName(String);

impl BranchName {
    /// Returns the branch name as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for BranchName {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ParseError::Empty);
        }

        if s.contains("..") {
            return Err(ParseError::DotDot);
        }

        if s.starts_with('-') {
            return Err(ParseError::InvalidStart('-'));
        }

        if s.starts_with('/') {
            return Err(ParseError::InvalidStart('/'));
        }

        if s.ends_with('/') {
            return Err(ParseError::InvalidEnd('/'));
        }

        if s.bytes().any(|b| b == 0 || b < 0x20 || b == 0x7f) {
            return Err(ParseError::ControlCharacter);
        }

        Ok(BranchName(s.to_string()))
    }
}

impl fmt::Display for BranchName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
