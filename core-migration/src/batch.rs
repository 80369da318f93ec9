//! # Batch State
//!
//! Named progress records, one per batch kind.
//!
//! ## State Machine
//!
//! ```text
//! Idle → Running → Completed ─┐
//!           └────→ Cancelled ─┴→ Idle (reset)
//! ```
//!
//! A run owns its record from the first reset to the last; observers may
//! only raise the cancellation flag while it is running. The outcome of the
//! last run survives the final reset.

use crate::{MigrationError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Kinds
// ============================================================================

/// The long-running operation a record tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BatchKind {
    Import,
    RegenerateThumbnails,
    Unlink,
}

impl BatchKind {
    pub const ALL: [BatchKind; 3] = [
        BatchKind::Import,
        BatchKind::RegenerateThumbnails,
        BatchKind::Unlink,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BatchKind::Import => "import",
            BatchKind::RegenerateThumbnails => "regenerate-thumbnails",
            BatchKind::Unlink => "unlink",
        }
    }
}

impl FromStr for BatchKind {
    type Err = MigrationError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "import" => Ok(BatchKind::Import),
            "regenerate-thumbnails" | "regenerate" => Ok(BatchKind::RegenerateThumbnails),
            "unlink" => Ok(BatchKind::Unlink),
            _ => Err(MigrationError::UnknownKind(s.to_string())),
        }
    }
}

impl fmt::Display for BatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Status Types
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    #[default]
    Idle,
    Running,
    Completed,
    Cancelled,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Idle => "idle",
            BatchStatus::Running => "running",
            BatchStatus::Completed => "completed",
            BatchStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BatchStatus::Completed | BatchStatus::Cancelled)
    }

    /// Check a transition against the state machine
    pub fn validate_transition(&self, to: BatchStatus) -> Result<()> {
        let valid = match (self, to) {
            (_, BatchStatus::Idle) => true,
            (BatchStatus::Idle, BatchStatus::Running) => true,
            (BatchStatus::Running, BatchStatus::Running) => true,
            (BatchStatus::Running, BatchStatus::Completed) => true,
            (BatchStatus::Running, BatchStatus::Cancelled) => true,
            _ => false,
        };

        if !valid {
            return Err(MigrationError::InvalidStateTransition {
                from: self.as_str().to_string(),
                to: to.as_str().to_string(),
            });
        }
        Ok(())
    }
}

impl FromStr for BatchStatus {
    type Err = MigrationError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "idle" => Ok(BatchStatus::Idle),
            "running" => Ok(BatchStatus::Running),
            "completed" => Ok(BatchStatus::Completed),
            "cancelled" => Ok(BatchStatus::Cancelled),
            _ => Err(MigrationError::BatchState(format!("invalid status {}", s))),
        }
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunOutcome {
    Completed,
    Cancelled,
}

impl RunOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunOutcome::Completed => "completed",
            RunOutcome::Cancelled => "cancelled",
        }
    }

    pub fn status(&self) -> BatchStatus {
        match self {
            RunOutcome::Completed => BatchStatus::Completed,
            RunOutcome::Cancelled => BatchStatus::Cancelled,
        }
    }
}

impl FromStr for RunOutcome {
    type Err = MigrationError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "completed" => Ok(RunOutcome::Completed),
            "cancelled" => Ok(RunOutcome::Cancelled),
            _ => Err(MigrationError::BatchState(format!("invalid outcome {}", s))),
        }
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Progress Record
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchState {
    pub kind: BatchKind,
    pub status: BatchStatus,
    pub total: u64,
    /// 1-based position of the item being processed; 0 before the first
    pub current: u64,
    pub current_file_name: String,
    pub running: bool,
    pub cancel_requested: bool,
    pub last_outcome: Option<RunOutcome>,
    pub updated_at: DateTime<Utc>,
}

impl BatchState {
    pub fn idle(kind: BatchKind) -> Self {
        Self {
            kind,
            status: BatchStatus::Idle,
            total: 0,
            current: 0,
            current_file_name: String::new(),
            running: false,
            cancel_requested: false,
            last_outcome: None,
            updated_at: Utc::now(),
        }
    }

    /// Progress percentage (0-100)
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 0;
        }
        ((self.current as f64 / self.total as f64) * 100.0).min(100.0) as u8
    }

    /// Clear counters and flags, keeping the last outcome
    pub fn reset(&mut self) {
        let last_outcome = self.last_outcome;
        *self = Self::idle(self.kind);
        self.last_outcome = last_outcome;
    }

    pub fn set_running(&mut self, running: bool) -> Result<()> {
        if running {
            self.status.validate_transition(BatchStatus::Running)?;
            self.status = BatchStatus::Running;
        }
        self.running = running;
        self.touch();
        Ok(())
    }

    pub fn set_total(&mut self, total: u64) {
        self.total = total;
        self.touch();
    }

    /// Move the position; it never goes back while a run is active
    pub fn set_current(&mut self, current: u64) -> Result<()> {
        if self.running && current < self.current {
            return Err(MigrationError::ProgressRegression {
                kind: self.kind.to_string(),
                current: self.current,
                requested: current,
            });
        }
        self.current = current;
        self.touch();
        Ok(())
    }

    pub fn set_current_file(&mut self, name: &str) {
        self.current_file_name = name.to_string();
        self.touch();
    }

    pub fn set_cancel(&mut self, cancel: bool) {
        self.cancel_requested = cancel;
        self.touch();
    }

    pub fn finish(&mut self, outcome: RunOutcome) -> Result<()> {
        self.status.validate_transition(outcome.status())?;
        self.status = outcome.status();
        self.running = false;
        self.last_outcome = Some(outcome);
        self.touch();
        Ok(())
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_round_trip_and_aliases() {
        for kind in BatchKind::ALL {
            assert_eq!(kind.as_str().parse::<BatchKind>().unwrap(), kind);
        }
        assert_eq!(
            "regenerate".parse::<BatchKind>().unwrap(),
            BatchKind::RegenerateThumbnails
        );
        assert!(matches!(
            "resize".parse::<BatchKind>(),
            Err(MigrationError::UnknownKind(_))
        ));
    }

    #[test]
    fn test_status_transitions() {
        assert!(BatchStatus::Idle.validate_transition(BatchStatus::Running).is_ok());
        assert!(BatchStatus::Running
            .validate_transition(BatchStatus::Cancelled)
            .is_ok());
        assert!(BatchStatus::Completed
            .validate_transition(BatchStatus::Idle)
            .is_ok());

        assert!(BatchStatus::Idle
            .validate_transition(BatchStatus::Completed)
            .is_err());
        assert!(BatchStatus::Completed
            .validate_transition(BatchStatus::Running)
            .is_err());
    }

    #[test]
    fn test_run_lifecycle() {
        let mut state = BatchState::idle(BatchKind::Import);
        state.set_running(true).unwrap();
        state.set_total(4);
        state.set_current(1).unwrap();
        state.set_current_file("a.jpg");
        state.set_current(2).unwrap();
        assert_eq!(state.percent(), 50);

        state.finish(RunOutcome::Completed).unwrap();
        assert!(!state.running);
        assert_eq!(state.status, BatchStatus::Completed);

        state.reset();
        assert_eq!(state.status, BatchStatus::Idle);
        assert_eq!(state.current, 0);
        assert_eq!(state.total, 0);
        assert!(state.current_file_name.is_empty());
        assert_eq!(state.last_outcome, Some(RunOutcome::Completed));
    }

    #[test]
    fn test_current_never_decreases_while_running() {
        let mut state = BatchState::idle(BatchKind::Unlink);
        state.set_running(true).unwrap();
        state.set_current(3).unwrap();

        assert!(matches!(
            state.set_current(2),
            Err(MigrationError::ProgressRegression { current: 3, requested: 2, .. })
        ));
        assert_eq!(state.current, 3);
    }

    #[test]
    fn test_finish_requires_running() {
        let mut state = BatchState::idle(BatchKind::Import);
        assert!(state.finish(RunOutcome::Completed).is_err());
    }
}
