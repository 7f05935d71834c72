//! The top-level pipeline run record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{StageError, StageName};

use super::account::AccountRef;
use super::candidate::Candidate;
use super::prospect::{EnrichedCandidate, QualifiedProspect};

/// Terminal status of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every stage completed without a recorded error.
    Ok,
    /// A stage recorded an error; artifacts up to that point are valid.
    Partial,
    /// The run could not produce meaningful output (resolution failure,
    /// cancellation, or an internal invariant violation).
    Failed,
}

/// Why a candidate was rejected in Stage 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// The scraper returned a per-URL failure for this candidate.
    ScrapeFailed,
    /// Current employer did not match the company name set.
    WrongCompany,
    /// Location did not include the configured city or region.
    WrongLocation,
    /// Connection count below the configured floor.
    LowNetwork,
    /// Title failed the positive keyword list or hit a negative keyword.
    NonTargetRole,
}

/// One entry in the Stage 2 rejection log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rejection {
    /// Canonical profile URL of the rejected candidate.
    pub url: String,
    /// Reason code.
    pub reason: RejectReason,
    /// Supporting evidence (e.g. the employer string that failed to match).
    pub evidence: String,
}

/// Per-stage timing, counts, and cost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageReport {
    /// The stage this report covers.
    pub stage: StageName,
    /// Wall-clock duration of the stage in milliseconds.
    pub duration_ms: u64,
    /// Records produced by the stage.
    pub found: u32,
    /// Records rejected or dropped by the stage.
    pub rejected: u32,
    /// Cost charged to the ledger during the stage.
    pub cost: f64,
}

/// The record of one end-to-end pipeline execution.
///
/// Created on orchestrator entry and mutated only by the orchestrator;
/// terminal once Stage 4 completes or a fatal error is recorded. Carries
/// the per-stage artifacts needed to resume or replay the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRun {
    /// Unique run id.
    pub run_id: String,
    /// The input account.
    pub account: AccountRef,
    /// When the orchestrator entered.
    pub started_at: DateTime<Utc>,
    /// When the run reached a terminal state.
    pub finished_at: Option<DateTime<Utc>>,
    /// Terminal status.
    pub status: RunStatus,
    /// The first terminal stage error, when status is not `ok`.
    pub first_error: Option<StageError>,
    /// Per-stage reports, in execution order.
    pub stages: Vec<StageReport>,
    /// Dataset snapshot id from Stage 1, when the dataset path ran.
    pub snapshot_id: Option<String>,
    /// Total cost charged across all stages (currency-neutral units).
    pub total_cost: f64,
    /// Operator guidance when the run needs intervention (e.g. overflow).
    pub recommendation: Option<String>,
    /// Stage 1 artifact: deduplicated candidates.
    pub stage1_candidates: Vec<Candidate>,
    /// Stage 2 artifact: surviving enriched candidates, in Stage 1 order.
    pub stage2_profiles: Vec<EnrichedCandidate>,
    /// Stage 2 rejection log.
    pub stage2_rejections: Vec<Rejection>,
    /// Stage 3 artifact: qualified prospects, score descending.
    pub stage3_qualified: Vec<QualifiedProspect>,
    /// Queue ids returned by the pending-update sink in Stage 4.
    pub queued_updates: Vec<String>,
}

impl PipelineRun {
    /// Create a fresh run record in the non-terminal starting state.
    pub fn new(run_id: String, account: AccountRef, started_at: DateTime<Utc>) -> Self {
        Self {
            run_id,
            account,
            started_at,
            finished_at: None,
            status: RunStatus::Ok,
            first_error: None,
            stages: Vec::new(),
            snapshot_id: None,
            total_cost: 0.0,
            recommendation: None,
            stage1_candidates: Vec::new(),
            stage2_profiles: Vec::new(),
            stage2_rejections: Vec::new(),
            stage3_qualified: Vec::new(),
            queued_updates: Vec::new(),
        }
    }

    /// Record a stage error, keeping only the first one and downgrading
    /// the run status to at least `partial`.
    pub fn record_error(&mut self, error: StageError) {
        if self.first_error.is_none() {
            self.first_error = Some(error);
        }
        if self.status == RunStatus::Ok {
            self.status = RunStatus::Partial;
        }
    }

    /// The report for a given stage, if it ran.
    pub fn stage_report(&self, stage: StageName) -> Option<&StageReport> {
        self.stages.iter().find(|s| s.stage == stage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn new_run_starts_ok_and_unfinished() {
        let run = PipelineRun::new(
            "run-1".to_string(),
            AccountRef::new("A1", "General Hospital"),
            Utc::now(),
        );
        assert_eq!(run.status, RunStatus::Ok);
        assert!(run.finished_at.is_none());
        assert!(run.first_error.is_none());
    }

    #[test]
    fn record_error_keeps_first_and_downgrades() {
        let mut run = PipelineRun::new(
            "run-1".to_string(),
            AccountRef::new("A1", "General Hospital"),
            Utc::now(),
        );
        run.record_error(StageError::new(
            StageName::Acquire,
            ErrorKind::Overflow,
            "120 records",
        ));
        run.record_error(StageError::new(
            StageName::Rank,
            ErrorKind::ParseError,
            "bad json",
        ));

        assert_eq!(run.status, RunStatus::Partial);
        let first = run.first_error.as_ref().unwrap();
        assert_eq!(first.stage, StageName::Acquire);
        assert_eq!(first.kind, ErrorKind::Overflow);
    }

    #[test]
    fn record_error_does_not_upgrade_failed() {
        let mut run = PipelineRun::new(
            "run-1".to_string(),
            AccountRef::new("A1", "General Hospital"),
            Utc::now(),
        );
        run.status = RunStatus::Failed;
        run.record_error(StageError::new(
            StageName::Sink,
            ErrorKind::Transport,
            "down",
        ));
        assert_eq!(run.status, RunStatus::Failed);
    }

    #[test]
    fn stage_report_lookup() {
        let mut run = PipelineRun::new(
            "run-1".to_string(),
            AccountRef::new("A1", "General Hospital"),
            Utc::now(),
        );
        run.stages.push(StageReport {
            stage: StageName::Acquire,
            duration_ms: 12,
            found: 3,
            rejected: 0,
            cost: 0.5,
        });
        assert_eq!(run.stage_report(StageName::Acquire).unwrap().found, 3);
        assert!(run.stage_report(StageName::Rank).is_none());
    }
}
