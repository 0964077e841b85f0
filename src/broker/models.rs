//! Row types for the job store.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::JobKind;

/// Lifecycle status of a job. Terminal states are immutable except for
/// TTL-based eviction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(Self::Pending),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row in `jobs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRow {
    pub uuid: String,
    pub job_id: String,
    pub job_type: JobKind,
    pub job_queue_name: String,
    /// Unix millis after which the job is evictable.
    pub job_expire_at: i64,
    pub url: String,
    /// The validated request, serialized.
    pub payload: String,
    pub api_key_id: Option<String>,
    pub total: i64,
    pub completed: i64,
    pub failed: i64,
    pub credits_used: i64,
    pub origin: Option<String>,
    pub status: JobStatus,
    pub is_success: bool,
    pub error_message: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// One row in `job_results`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResultRow {
    pub uuid: String,
    pub job_uuid: String,
    pub url: String,
    /// Serialized extraction output.
    pub data: String,
    /// `success` or `failed`.
    pub status: String,
    pub created_at: i64,
    pub updated_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_roundtrip_and_terminality() {
        for s in [JobStatus::Pending, JobStatus::Completed, JobStatus::Failed, JobStatus::Cancelled]
        {
            assert_eq!(JobStatus::parse(s.as_str()), Some(s));
        }
        assert!(!JobStatus::Pending.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
        assert_eq!(JobStatus::parse("nope"), None);
    }
}
