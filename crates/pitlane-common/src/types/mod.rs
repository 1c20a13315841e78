//! Common types used across Pitlane

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PitlaneError, Result};

/// Kind of on-track session stored per race
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionType {
    Practice,
    Qualifying,
    SprintQualifying,
    Sprint,
    Race,
}

impl SessionType {
    /// Value stored in the `sessions.type` column
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionType::Practice => "PRACTICE",
            SessionType::Qualifying => "QUALIFYING",
            SessionType::SprintQualifying => "SPRINT_QUALIFYING",
            SessionType::Sprint => "SPRINT",
            SessionType::Race => "RACE",
        }
    }

    /// Classify a free-form session name ("Practice 1", "Sprint Shootout", "Race").
    ///
    /// Matching is case-insensitive. Names that fit no known type return `None`
    /// and are treated as unknown sessions by callers.
    pub fn classify(name: &str) -> Option<Self> {
        let name = name.trim().to_lowercase();
        if name.contains("sprint") && (name.contains("qualifying") || name.contains("shootout")) {
            Some(SessionType::SprintQualifying)
        } else if name.contains("practice") {
            Some(SessionType::Practice)
        } else if name.contains("sprint") {
            Some(SessionType::Sprint)
        } else if name.contains("qualifying") {
            Some(SessionType::Qualifying)
        } else if name == "race" {
            Some(SessionType::Race)
        } else {
            None
        }
    }
}

impl std::str::FromStr for SessionType {
    type Err = PitlaneError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "PRACTICE" => Ok(SessionType::Practice),
            "QUALIFYING" => Ok(SessionType::Qualifying),
            "SPRINT_QUALIFYING" => Ok(SessionType::SprintQualifying),
            "SPRINT" => Ok(SessionType::Sprint),
            "RACE" => Ok(SessionType::Race),
            other => Err(PitlaneError::InvalidSessionType(other.to_string())),
        }
    }
}

impl std::fmt::Display for SessionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a single natural-key write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpsertOutcome {
    /// No row existed for the natural key; one was inserted
    Created,
    /// A row existed and was rewritten, even if nothing changed
    Updated,
    /// A referenced entity could not be resolved; nothing was written
    Skipped,
}

/// Lifecycle of a pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StagePhase {
    #[default]
    Pending,
    Fetching,
    Resolving,
    Writing,
    Done,
    Failed,
}

/// Counters accumulated by one stage and folded by the coordinator
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StageStats {
    /// Stage name
    pub stage: String,
    /// Last phase reached
    pub phase: StagePhase,
    /// Upserts that created a row
    pub created: u64,
    /// Upserts that rewrote an existing row
    pub updated: u64,
    /// Records dropped because a reference did not resolve
    pub skipped: u64,
    /// Items whose processing errored
    pub failed: u64,
    /// Rows written by bulk replace operations
    pub inserted: u64,
    /// Rows removed by bulk replace operations
    pub deleted: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: i64,
}

impl StageStats {
    pub fn new(stage: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            started_at: Some(Utc::now()),
            ..Default::default()
        }
    }

    /// Move to the next phase
    pub fn enter(&mut self, phase: StagePhase) {
        debug!(stage = %self.stage, from = ?self.phase, to = ?phase, "Stage phase change");
        self.phase = phase;
    }

    pub fn record(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Created => self.created += 1,
            UpsertOutcome::Updated => self.updated += 1,
            UpsertOutcome::Skipped => self.skipped += 1,
        }
    }

    pub fn inc_skipped(&mut self) {
        self.skipped += 1;
    }

    pub fn inc_failed(&mut self) {
        self.failed += 1;
    }

    /// Account for a delete-then-insert replacement
    pub fn add_replaced(&mut self, deleted: u64, inserted: u64) {
        self.deleted += deleted;
        self.inserted += inserted;
    }

    /// Fold another stage's counters into this one
    pub fn merge(&mut self, other: &StageStats) {
        self.created += other.created;
        self.updated += other.updated;
        self.skipped += other.skipped;
        self.failed += other.failed;
        self.inserted += other.inserted;
        self.deleted += other.deleted;
    }

    /// Total records touched, written or not
    pub fn total(&self) -> u64 {
        self.created + self.updated + self.skipped + self.failed + self.inserted
    }

    /// Mark stats as completed
    pub fn complete(&mut self) {
        self.finish(StagePhase::Done);
    }

    /// Mark stats as failed
    pub fn fail(&mut self) {
        self.finish(StagePhase::Failed);
    }

    fn finish(&mut self, phase: StagePhase) {
        self.enter(phase);
        self.completed_at = Some(Utc::now());
        if let (Some(start), Some(end)) = (self.started_at, self.completed_at) {
            self.duration_ms = (end - start).num_milliseconds();
        }
    }
}

/// Outcome of one coordinator step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Success,
    Error,
}

/// One entry of a [`RunReport`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepReport {
    pub step: String,
    pub status: StepStatus,
    /// Hard steps abort the run when they fail
    pub hard: bool,
    pub duration: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<StageStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepReport {
    pub fn success(step: impl Into<String>, hard: bool, duration: i64, stats: Option<StageStats>) -> Self {
        Self {
            step: step.into(),
            status: StepStatus::Success,
            hard,
            duration,
            stats,
            error: None,
        }
    }

    pub fn error(step: impl Into<String>, hard: bool, duration: i64, error: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            status: StepStatus::Error,
            hard,
            duration,
            stats: None,
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == StepStatus::Success
    }
}

/// Structured result returned by every pipeline trigger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub success: bool,
    pub message: String,
    pub steps: Vec<StepReport>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl RunReport {
    pub fn begin() -> Self {
        Self {
            success: false,
            message: String::new(),
            steps: Vec::new(),
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn push(&mut self, step: StepReport) {
        self.steps.push(step);
    }

    /// Close the report with its final verdict
    pub fn finish(mut self, success: bool, message: impl Into<String>) -> Self {
        self.success = success;
        self.message = message.into();
        self.completed_at = Some(Utc::now());
        self
    }

    /// Report for a run that never started because another run holds the lock
    pub fn rejected(reason: &PitlaneError) -> Self {
        Self::begin().finish(false, reason.to_string())
    }

    /// Fold the stats of every successful step
    pub fn totals(&self) -> StageStats {
        let mut totals = StageStats::new("total");
        for stats in self.steps.iter().filter_map(|s| s.stats.as_ref()) {
            totals.merge(stats);
        }
        totals
    }

    pub fn failed_steps(&self) -> impl Iterator<Item = &StepReport> {
        self.steps.iter().filter(|s| !s.is_success())
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_session_names() {
        assert_eq!(SessionType::classify("Practice 1"), Some(SessionType::Practice));
        assert_eq!(SessionType::classify("practice 3"), Some(SessionType::Practice));
        assert_eq!(SessionType::classify("QUALIFYING"), Some(SessionType::Qualifying));
        assert_eq!(SessionType::classify("Sprint"), Some(SessionType::Sprint));
        assert_eq!(SessionType::classify("Sprint Shootout"), Some(SessionType::SprintQualifying));
        assert_eq!(SessionType::classify("Sprint Qualifying"), Some(SessionType::SprintQualifying));
        assert_eq!(SessionType::classify("Race"), Some(SessionType::Race));
        assert_eq!(SessionType::classify("Unknown"), None);
    }

    #[test]
    fn test_session_type_round_trips_column_value() {
        for ty in [
            SessionType::Practice,
            SessionType::Qualifying,
            SessionType::SprintQualifying,
            SessionType::Sprint,
            SessionType::Race,
        ] {
            assert_eq!(ty.as_str().parse::<SessionType>().unwrap(), ty);
        }
        assert!("WARMUP".parse::<SessionType>().is_err());
    }

    #[test]
    fn test_stage_stats_record_and_merge() {
        let mut a = StageStats::new("drivers");
        a.record(UpsertOutcome::Created);
        a.record(UpsertOutcome::Updated);
        a.record(UpsertOutcome::Skipped);
        a.inc_failed();

        let mut b = StageStats::new("results");
        b.add_replaced(10, 12);

        a.merge(&b);
        assert_eq!(a.created, 1);
        assert_eq!(a.updated, 1);
        assert_eq!(a.skipped, 1);
        assert_eq!(a.failed, 1);
        assert_eq!(a.deleted, 10);
        assert_eq!(a.inserted, 12);
        assert_eq!(a.total(), 16);
    }

    #[test]
    fn test_stage_stats_complete_sets_phase() {
        let mut stats = StageStats::new("seasons");
        stats.enter(StagePhase::Writing);
        stats.complete();
        assert_eq!(stats.phase, StagePhase::Done);
        assert!(stats.completed_at.is_some());
        assert!(stats.duration_ms >= 0);

        let mut failed = StageStats::new("circuits");
        failed.fail();
        assert_eq!(failed.phase, StagePhase::Failed);
    }

    #[test]
    fn test_run_report_serializes_contract_fields() {
        let mut report = RunReport::begin();
        report.push(StepReport::success("Seasons", true, 12, None));
        report.push(StepReport::error("Sprint Race Results", false, 5, "boom"));
        let report = report.finish(true, "done");

        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["message"], "done");
        assert_eq!(json["steps"][0]["step"], "Seasons");
        assert_eq!(json["steps"][0]["status"], "success");
        assert_eq!(json["steps"][1]["status"], "error");
        assert_eq!(json["steps"][1]["error"], "boom");
        assert_eq!(report.failed_steps().count(), 1);
    }

    #[test]
    fn test_rejected_report_has_no_steps() {
        let report = RunReport::rejected(&PitlaneError::RunInProgress {
            owner: "scheduler".to_string(),
        });
        assert!(!report.success);
        assert!(report.steps.is_empty());
        assert!(report.message.contains("scheduler"));
    }
}
