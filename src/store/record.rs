//! Step Records
//!
//! The persisted unit of durable state: one record per
//! `(workflow_id, step_key)` carrying a small status state machine.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::StoreError;

/// Separator between a step name and its ordinal.
pub const KEY_SEPARATOR: char = '-';

/// Status of one recorded step attempt.
///
/// A record only exists once an attempt has started, so there is no
/// pending state. `Completed` and `Failed` are terminal for their ordinal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepStatus {
    /// Attempt started; its outcome has not been recorded yet
    Running,
    /// Side effect finished and its output was recorded
    Completed,
    /// Side effect failed, or the attempt was abandoned by a crash
    Failed,
}

impl StepStatus {
    /// Returns the stored representation of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }

    /// Returns true if no further transition is allowed.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }

    /// Checks whether a record may move from `self` to `next`.
    pub fn can_transition_to(&self, next: StepStatus) -> bool {
        matches!(
            (self, next),
            (Self::Running, Self::Completed) | (Self::Running, Self::Failed)
        )
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StepStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RUNNING" => Ok(Self::Running),
            "COMPLETED" => Ok(Self::Completed),
            "FAILED" => Ok(Self::Failed),
            other => Err(StoreError::Serialization(format!(
                "unknown step status '{}'",
                other
            ))),
        }
    }
}

/// Durable identity of a step attempt: `name-ordinal`.
///
/// The ordinal is whatever follows the *last* separator, so step names
/// may themselves contain dashes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StepKey {
    name: String,
    ordinal: u64,
}

impl StepKey {
    pub fn new(name: impl Into<String>, ordinal: u64) -> Self {
        Self {
            name: name.into(),
            ordinal,
        }
    }

    /// Parses a stored key, reading the ordinal numerically.
    pub fn parse(key: &str) -> Result<Self, StoreError> {
        let invalid = || StoreError::InvalidStepKey(key.to_string());

        let (name, ordinal) = key.rsplit_once(KEY_SEPARATOR).ok_or_else(invalid)?;
        if name.is_empty() {
            return Err(invalid());
        }
        let ordinal = ordinal.parse::<u64>().map_err(|_| invalid())?;

        Ok(Self::new(name, ordinal))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ordinal(&self) -> u64 {
        self.ordinal
    }
}

impl fmt::Display for StepKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.name, KEY_SEPARATOR, self.ordinal)
    }
}

/// One durably recorded attempt of a named step within one workflow run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    /// Workflow this attempt belongs to
    pub workflow_id: String,

    /// `name-ordinal` identity, unique within the workflow
    pub step_key: String,

    /// Current status
    pub status: StepStatus,

    /// JSON payload, present only once the step is completed
    pub output: Option<String>,

    /// When the attempt was recorded as running
    pub started_at: DateTime<Utc>,

    /// When the attempt reached a terminal status
    pub finished_at: Option<DateTime<Utc>>,
}

impl StepRecord {
    /// Creates a fresh `RUNNING` record.
    pub fn running(workflow_id: &str, step_key: &str) -> Self {
        Self {
            workflow_id: workflow_id.to_string(),
            step_key: step_key.to_string(),
            status: StepStatus::Running,
            output: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Parses the record's key into name and ordinal.
    pub fn key(&self) -> Result<StepKey, StoreError> {
        StepKey::parse(&self.step_key)
    }

    /// Moves the record to a terminal status.
    ///
    /// Only `RUNNING` records may transition; the output is kept only
    /// for completed records.
    pub fn transition(&mut self, next: StepStatus, output: Option<String>) -> Result<(), StoreError> {
        if !self.status.can_transition_to(next) {
            return Err(StoreError::InvalidTransition {
                step_key: self.step_key.clone(),
                from: self.status,
                to: next,
            });
        }

        self.status = next;
        self.output = if next == StepStatus::Completed { output } else { None };
        self.finished_at = Some(Utc::now());
        Ok(())
    }
}

/// Sorts records by numeric ordinal, leaving unparseable keys last.
pub fn sort_by_ordinal(records: &mut [StepRecord]) {
    records.sort_by_key(|record| {
        record
            .key()
            .map(|key| key.ordinal())
            .unwrap_or(u64::MAX)
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_key_display() {
        let key = StepKey::new("createEmployee", 3);
        assert_eq!(key.to_string(), "createEmployee-3");
    }

    #[test]
    fn test_step_key_parse() {
        let key = StepKey::parse("provisionLaptop-12").unwrap();
        assert_eq!(key.name(), "provisionLaptop");
        assert_eq!(key.ordinal(), 12);
    }

    #[test]
    fn test_step_key_parse_name_with_dashes() {
        let key = StepKey::parse("send-welcome-email-7").unwrap();
        assert_eq!(key.name(), "send-welcome-email");
        assert_eq!(key.ordinal(), 7);
    }

    #[test]
    fn test_step_key_parse_rejects_malformed() {
        assert!(StepKey::parse("noOrdinal").is_err());
        assert!(StepKey::parse("step-abc").is_err());
        assert!(StepKey::parse("-4").is_err());
        assert!(StepKey::parse("step-").is_err());
    }

    #[test]
    fn test_ordinal_sort_is_numeric() {
        let mut records = vec![
            StepRecord::running("wf", "a-10"),
            StepRecord::running("wf", "a-9"),
            StepRecord::running("wf", "b-2"),
        ];
        sort_by_ordinal(&mut records);

        let keys: Vec<_> = records.iter().map(|r| r.step_key.as_str()).collect();
        assert_eq!(keys, vec!["b-2", "a-9", "a-10"]);
    }

    #[test]
    fn test_status_transitions() {
        assert!(StepStatus::Running.can_transition_to(StepStatus::Completed));
        assert!(StepStatus::Running.can_transition_to(StepStatus::Failed));
        assert!(!StepStatus::Completed.can_transition_to(StepStatus::Failed));
        assert!(!StepStatus::Failed.can_transition_to(StepStatus::Completed));
        assert!(!StepStatus::Failed.can_transition_to(StepStatus::Running));
    }

    #[test]
    fn test_record_transition_drops_output_on_failure() {
        let mut record = StepRecord::running("wf", "a-1");
        record
            .transition(StepStatus::Failed, Some("\"ignored\"".to_string()))
            .unwrap();

        assert_eq!(record.status, StepStatus::Failed);
        assert!(record.output.is_none());
        assert!(record.finished_at.is_some());
    }

    #[test]
    fn test_record_terminal_is_final() {
        let mut record = StepRecord::running("wf", "a-1");
        record
            .transition(StepStatus::Completed, Some("1".to_string()))
            .unwrap();

        let err = record.transition(StepStatus::Failed, None).unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { .. }));
        assert_eq!(record.output.as_deref(), Some("1"));
    }

    #[test]
    fn test_status_string_roundtrip() {
        for status in [StepStatus::Running, StepStatus::Completed, StepStatus::Failed] {
            assert_eq!(status.as_str().parse::<StepStatus>().unwrap(), status);
        }
        assert!("PENDING".parse::<StepStatus>().is_err());
    }

    #[test]
    fn test_status_serializes_uppercase() {
        let json = serde_json::to_string(&StepStatus::Completed).unwrap();
        assert_eq!(json, "\"COMPLETED\"");
    }
}
