//! Per-cycle reports and cumulative counters.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ClassifierError, EngineError};

/// Where one appliance ended up in one cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ApplianceOutcome {
    /// Observed OFF; no dwell record remains.
    Cleared,
    /// ON but under the threshold (zero on the first ON observation).
    Waiting { elapsed_secs: u64 },
    /// Classifier said keep it on.
    StaysOn,
    /// Power flag committed to OFF and dwell record removed.
    TurnedOff,
    /// Missing or undecodable power value.
    Skipped { reason: String },
    StoreUnavailable { detail: String },
    ClassifierError { detail: String },
    SchemaMismatch { detail: String },
    /// Power flag written but the dwell record could not be cleared.
    PartialCommitInconsistency { detail: String },
    /// A store call exceeded the call timeout.
    Unavailable { stage: String },
}

impl ApplianceOutcome {
    /// Stable snake_case name, used for counters and logs.
    pub fn label(&self) -> &'static str {
        match self {
            ApplianceOutcome::Cleared => "cleared",
            ApplianceOutcome::Waiting { .. } => "waiting",
            ApplianceOutcome::StaysOn => "stays_on",
            ApplianceOutcome::TurnedOff => "turned_off",
            ApplianceOutcome::Skipped { .. } => "skipped",
            ApplianceOutcome::StoreUnavailable { .. } => "store_unavailable",
            ApplianceOutcome::ClassifierError { .. } => "classifier_error",
            ApplianceOutcome::SchemaMismatch { .. } => "schema_mismatch",
            ApplianceOutcome::PartialCommitInconsistency { .. } => "partial_commit_inconsistency",
            ApplianceOutcome::Unavailable { .. } => "unavailable",
        }
    }

    /// True when the appliance could not be evaluated cleanly.
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            ApplianceOutcome::StoreUnavailable { .. }
                | ApplianceOutcome::ClassifierError { .. }
                | ApplianceOutcome::SchemaMismatch { .. }
                | ApplianceOutcome::PartialCommitInconsistency { .. }
                | ApplianceOutcome::Unavailable { .. }
        )
    }
}

impl From<EngineError> for ApplianceOutcome {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::StoreUnavailable(e) => ApplianceOutcome::StoreUnavailable {
                detail: e.to_string(),
            },
            EngineError::Classifier(e @ ClassifierError::WrongWidth { .. }) => {
                ApplianceOutcome::SchemaMismatch {
                    detail: e.to_string(),
                }
            }
            EngineError::Classifier(e) => ApplianceOutcome::ClassifierError {
                detail: e.to_string(),
            },
            e @ EngineError::SchemaMismatch { .. } => ApplianceOutcome::SchemaMismatch {
                detail: e.to_string(),
            },
            EngineError::PartialCommit(detail) => {
                ApplianceOutcome::PartialCommitInconsistency { detail }
            }
            EngineError::Timeout { stage, .. } => ApplianceOutcome::Unavailable {
                stage: stage.to_string(),
            },
            e @ EngineError::MalformedSnapshot { .. } => ApplianceOutcome::StoreUnavailable {
                detail: e.to_string(),
            },
        }
    }
}

/// Everything one cycle did, keyed by appliance id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleReport {
    pub at: DateTime<Utc>,
    pub appliances: BTreeMap<String, ApplianceOutcome>,
}

impl CycleReport {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self {
            at,
            appliances: BTreeMap::new(),
        }
    }

    pub fn outcome(&self, appliance: &str) -> Option<&ApplianceOutcome> {
        self.appliances.get(appliance)
    }

    pub fn turned_off(&self) -> impl Iterator<Item = &str> {
        self.appliances
            .iter()
            .filter(|(_, o)| **o == ApplianceOutcome::TurnedOff)
            .map(|(id, _)| id.as_str())
    }

    pub fn error_count(&self) -> usize {
        self.appliances.values().filter(|o| o.is_error()).count()
    }

    /// Outcome label → count.
    pub fn tally(&self) -> BTreeMap<&'static str, u64> {
        let mut counts = BTreeMap::new();
        for outcome in self.appliances.values() {
            *counts.entry(outcome.label()).or_insert(0) += 1;
        }
        counts
    }
}

/// Counters accumulated over the engine's lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleStats {
    pub cycles: u64,
    /// Cycles that could not read the appliance snapshot at all.
    pub failed_cycles: u64,
    pub outcomes: BTreeMap<String, u64>,
    pub last_cycle_at: Option<DateTime<Utc>>,
}

impl CycleStats {
    pub fn record(&mut self, report: &CycleReport) {
        self.cycles += 1;
        self.last_cycle_at = Some(report.at);
        for (label, count) in report.tally() {
            *self.outcomes.entry(label.to_string()).or_insert(0) += count;
        }
    }

    pub fn record_failure(&mut self, at: DateTime<Utc>) {
        self.cycles += 1;
        self.failed_cycles += 1;
        self.last_cycle_at = Some(at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use powerwatch_state::StoreError;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, 18, 0, 0).unwrap()
    }

    #[test]
    fn outcome_serializes_with_tag() {
        let json = serde_json::to_value(ApplianceOutcome::Waiting { elapsed_secs: 60 }).unwrap();
        assert_eq!(json, serde_json::json!({"outcome": "waiting", "elapsed_secs": 60}));
        let json = serde_json::to_value(ApplianceOutcome::TurnedOff).unwrap();
        assert_eq!(json, serde_json::json!({"outcome": "turned_off"}));
    }

    #[test]
    fn errors_map_to_outcomes() {
        let store: ApplianceOutcome = EngineError::from(StoreError::Read("boom".into())).into();
        assert_eq!(store.label(), "store_unavailable");

        let width: ApplianceOutcome =
            EngineError::from(ClassifierError::WrongWidth { expected: 3, got: 5 }).into();
        assert_eq!(width.label(), "schema_mismatch");

        let timeout: ApplianceOutcome = EngineError::Timeout {
            stage: "fetch",
            timeout_ms: 10,
        }
        .into();
        assert_eq!(timeout, ApplianceOutcome::Unavailable { stage: "fetch".into() });
        assert!(timeout.is_error());
    }

    #[test]
    fn report_tally_and_stats() {
        let mut report = CycleReport::new(at());
        report.appliances.insert("B1".into(), ApplianceOutcome::TurnedOff);
        report.appliances.insert("B2".into(), ApplianceOutcome::Cleared);
        report.appliances.insert("B3".into(), ApplianceOutcome::Cleared);
        report.appliances.insert(
            "B4".into(),
            ApplianceOutcome::ClassifierError { detail: "x".into() },
        );

        assert_eq!(report.turned_off().collect::<Vec<_>>(), vec!["B1"]);
        assert_eq!(report.error_count(), 1);
        assert_eq!(report.tally()["cleared"], 2);

        let mut stats = CycleStats::default();
        stats.record(&report);
        stats.record(&report);
        stats.record_failure(at());
        assert_eq!(stats.cycles, 3);
        assert_eq!(stats.failed_cycles, 1);
        assert_eq!(stats.outcomes["turned_off"], 2);
        assert_eq!(stats.last_cycle_at, Some(at()));
    }
}
