use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::error::DomainError;

/// Outcome classification of a single diff run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiffStatus {
    #[serde(rename = "in_progress")]
    InProgress,
    #[serde(rename = "complete")]
    Complete,
}

impl DiffStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Complete => "complete",
        }
    }
}

impl fmt::Display for DiffStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DiffStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in_progress" => Ok(Self::InProgress),
            "complete" => Ok(Self::Complete),
            other => Err(DomainError::InvalidStatus(format!(
                "unknown diff status '{other}'"
            ))),
        }
    }
}

/// Append-only progress record emitted whenever a diff run observes a
/// non-trivial change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryChange {
    pub timestamp: i64,
    pub status: DiffStatus,
    pub num_remaining: i64,
    pub num_target: i64,
    pub completion_percent: f64,
    pub progress_pixels: i64,
    pub regress_pixels: i64,
}
