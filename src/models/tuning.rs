//! Tuning job model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::algorithm::LogOdd;

/// Lifecycle states of a tuning job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TuningStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl TuningStatus {
    /// The wire representation of this status
    pub fn as_str(&self) -> &'static str {
        match self {
            TuningStatus::Pending => "PENDING",
            TuningStatus::Running => "RUNNING",
            TuningStatus::Completed => "COMPLETED",
            TuningStatus::Failed => "FAILED",
        }
    }

    /// A job is active while it is pending or running
    pub fn is_active(&self) -> bool {
        matches!(self, TuningStatus::Pending | TuningStatus::Running)
    }
}

impl std::str::FromStr for TuningStatus {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(TuningStatus::Pending),
            "RUNNING" => Ok(TuningStatus::Running),
            "COMPLETED" => Ok(TuningStatus::Completed),
            "FAILED" => Ok(TuningStatus::Failed),
            _ => Err(crate::Error::Internal(format!("invalid tuning status: {s}"))),
        }
    }
}

/// Parameters for a tuning job
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema)]
pub struct TuningParams {
    /// Number of true-match pairs to sample for training
    pub true_match_pairs: usize,

    /// Number of non-match pairs to sample for training
    pub non_match_pairs: usize,
}

impl TuningParams {
    pub fn validate(&self) -> crate::Result<()> {
        if self.true_match_pairs == 0 || self.non_match_pairs == 0 {
            return Err(crate::Error::Validation(
                "tuning requires at least one pair of each class".to_string(),
            ));
        }
        Ok(())
    }
}

/// A recommended possible-match window for one algorithm pass
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PassRecommendation {
    /// Index of the pass within the algorithm
    pub pass_index: usize,

    /// Recommended minimum match threshold (window lower bound)
    pub mmt: f64,

    /// Recommended certain match threshold (window upper bound)
    pub cmt: f64,
}

/// Results recorded on a completed tuning job
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct TuningResults {
    /// Number of true-match pairs actually analyzed
    pub true_matches_found: usize,

    /// Number of non-match pairs actually analyzed
    pub non_matches_found: usize,

    /// Estimated per-feature log-odds weights
    pub log_odds: Vec<LogOdd>,

    /// Recommended windows per pass of the tuned algorithm
    pub passes: Vec<PassRecommendation>,

    /// Additional information about the tuning job
    pub details: String,
}

/// A tuning job row
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TuningJob {
    pub id: Uuid,
    pub status: TuningStatus,
    pub params: TuningParams,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<TuningResults>,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [
            TuningStatus::Pending,
            TuningStatus::Running,
            TuningStatus::Completed,
            TuningStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<TuningStatus>().unwrap(), status);
        }
    }

    #[test]
    fn test_active_statuses() {
        assert!(TuningStatus::Pending.is_active());
        assert!(TuningStatus::Running.is_active());
        assert!(!TuningStatus::Completed.is_active());
        assert!(!TuningStatus::Failed.is_active());
    }

    #[test]
    fn test_params_validation() {
        assert!(TuningParams { true_match_pairs: 0, non_match_pairs: 5 }
            .validate()
            .is_err());
        assert!(TuningParams { true_match_pairs: 5, non_match_pairs: 5 }
            .validate()
            .is_ok());
    }
}
