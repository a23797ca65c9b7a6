//! The shutoff engine: one polling cycle over every known appliance.
//!
//! For each appliance, under its guard:
//!
//! 1. read the power flag (missing or undecodable → `Skipped`)
//! 2. fold it into the dwell tracker (`Cleared` / `JustStarted` stop here)
//! 3. under the threshold → `Waiting`
//! 4. otherwise build a feature vector and ask the classifier
//! 5. label 1 → write the flag OFF, then drop the dwell record
//!
//! Every store and classifier call is bounded by the call timeout. A failed
//! step is recorded for that appliance only; the cycle moves on.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{watch, RwLock};
use tracing::{debug, error, info, warn};

use powerwatch_state::{Layout, PowerState, SharedStore};

use crate::classifier::{ensure_schema, Classifier, Decision};
use crate::dwell::{DwellState, DwellTracker};
use crate::error::{ClassifierError, EngineError};
use crate::features::{FeaturePolicy, FeatureVector};
use crate::guard::ApplianceLocks;
use crate::report::{ApplianceOutcome, CycleReport, CycleStats};

/// Tunables for a cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnginePolicy {
    /// Minimum dwell before a decision is attempted.
    pub threshold: Duration,
    /// Upper bound on each store or classifier call.
    pub call_timeout: Duration,
    pub features: FeaturePolicy,
}

impl Default for EnginePolicy {
    fn default() -> Self {
        Self {
            threshold: Duration::from_secs(120),
            call_timeout: Duration::from_secs(2),
            features: FeaturePolicy::default(),
        }
    }
}

/// Read-only view of one appliance, for inspection endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplianceView {
    pub id: String,
    /// `None` when the stored flag cannot be decoded.
    pub powered: Option<bool>,
    pub raw: Value,
    pub dwell_since: Option<DateTime<Utc>>,
    pub dwell_secs: Option<u64>,
}

#[derive(Default)]
struct EngineStatus {
    last_report: Option<CycleReport>,
    stats: CycleStats,
}

/// The auto-shutoff decision engine.
pub struct ShutoffEngine {
    store: Arc<dyn SharedStore>,
    classifier: Arc<dyn Classifier>,
    tracker: DwellTracker,
    layout: Layout,
    policy: EnginePolicy,
    locks: ApplianceLocks,
    status: RwLock<EngineStatus>,
}

impl ShutoffEngine {
    /// Build an engine. Fails if the classifier does not accept vectors of
    /// the configured feature schema.
    pub fn new(
        store: Arc<dyn SharedStore>,
        classifier: Arc<dyn Classifier>,
        layout: Layout,
        policy: EnginePolicy,
    ) -> Result<Self, EngineError> {
        ensure_schema(classifier.as_ref(), policy.features.schema)?;
        let tracker = DwellTracker::new(store.clone(), layout.clone());
        Ok(Self {
            store,
            classifier,
            tracker,
            layout,
            policy,
            locks: ApplianceLocks::new(),
            status: RwLock::new(EngineStatus::default()),
        })
    }

    pub fn policy(&self) -> &EnginePolicy {
        &self.policy
    }

    /// Run one cycle at `now`.
    ///
    /// Errors only when the appliance snapshot itself cannot be read; every
    /// per-appliance failure is reported inside the returned report.
    pub async fn run_cycle(&self, now: DateTime<Utc>) -> Result<CycleReport, EngineError> {
        let ids = match self.appliance_ids().await {
            Ok(ids) => ids,
            Err(e) => {
                self.status.write().await.stats.record_failure(now);
                return Err(e);
            }
        };

        let mut report = CycleReport::new(now);
        for id in &ids {
            let outcome = self.evaluate(id, now).await;
            if outcome.is_error() {
                warn!(appliance = %id, outcome = outcome.label(), ?outcome, "appliance not evaluated");
            }
            report.appliances.insert(id.clone(), outcome);
        }

        let known: HashSet<String> = ids.into_iter().collect();
        self.locks.retain_known(&known).await;

        let mut status = self.status.write().await;
        status.stats.record(&report);
        status.last_report = Some(report.clone());
        Ok(report)
    }

    /// Ids under the appliance root, sorted.
    pub async fn appliance_ids(&self) -> Result<Vec<String>, EngineError> {
        let root = &self.layout.appliance_root;
        let snapshot = self.bounded("snapshot", self.store.get(root)).await?;
        match snapshot {
            None => Ok(Vec::new()),
            Some(Value::Object(map)) => Ok(map.keys().cloned().collect()),
            Some(_) => Err(EngineError::MalformedSnapshot { path: root.clone() }),
        }
    }

    /// Evaluate one appliance while holding its guard.
    async fn evaluate(&self, id: &str, now: DateTime<Utc>) -> ApplianceOutcome {
        let _guard = self.locks.acquire(id).await;
        match self.decide(id, now).await {
            Ok(outcome) => outcome,
            Err(e) => e.into(),
        }
    }

    async fn decide(&self, id: &str, now: DateTime<Utc>) -> Result<ApplianceOutcome, EngineError> {
        let path = self.layout.appliance_path(id);
        let Some(raw) = self.bounded("fetch", self.store.get(&path)).await? else {
            return Ok(ApplianceOutcome::Skipped {
                reason: "appliance disappeared".to_string(),
            });
        };
        let Some(power) = PowerState::decode(&raw) else {
            return Ok(ApplianceOutcome::Skipped {
                reason: format!("unrecognized power value {raw}"),
            });
        };

        let dwell = self
            .bounded("observe", self.tracker.observe(id, power.powered, now))
            .await?;
        let elapsed = match dwell {
            DwellState::Cleared | DwellState::NotTracking => return Ok(ApplianceOutcome::Cleared),
            DwellState::JustStarted => return Ok(ApplianceOutcome::Waiting { elapsed_secs: 0 }),
            DwellState::Dwelling(elapsed) if elapsed < self.policy.threshold => {
                debug!(appliance = %id, elapsed_secs = elapsed.as_secs(), "under threshold");
                return Ok(ApplianceOutcome::Waiting {
                    elapsed_secs: elapsed.as_secs(),
                });
            }
            DwellState::Dwelling(elapsed) => elapsed,
        };

        let features = FeatureVector::build(
            &self.policy.features,
            self.policy.threshold,
            elapsed,
            power.powered,
            now,
        );
        let decision = self.classify(id, &features).await?;
        debug!(appliance = %id, ?features, ?decision, "classified");

        match decision {
            Decision::StayOn => Ok(ApplianceOutcome::StaysOn),
            Decision::TurnOff => self.commit_off(id, &path, power).await,
        }
    }

    async fn classify(&self, id: &str, features: &FeatureVector) -> Result<Decision, EngineError> {
        let input = features.to_vec();
        let timeout = self.policy.call_timeout;
        let label = match tokio::time::timeout(timeout, self.classifier.predict(&input)).await {
            Ok(label) => label?,
            Err(_) => {
                warn!(appliance = %id, timeout_ms = timeout.as_millis() as u64, "classifier timed out");
                return Err(ClassifierError::Inference(format!(
                    "timed out after {}ms",
                    timeout.as_millis()
                ))
                .into());
            }
        };
        Ok(Decision::from_label(label)?)
    }

    /// Write the flag OFF, then clear the dwell record. A failed flag write
    /// leaves everything as it was; a failed clear after a good flag write is
    /// a partial commit that the next cycle repairs when it observes OFF.
    async fn commit_off(
        &self,
        id: &str,
        path: &str,
        power: PowerState,
    ) -> Result<ApplianceOutcome, EngineError> {
        self.bounded("commit", self.store.set(path, power.encode(false)))
            .await?;

        if let Err(e) = self.bounded("clear", self.tracker.clear(id)).await {
            return Err(EngineError::PartialCommit(format!(
                "power set off but dwell record not cleared: {e}"
            )));
        }

        info!(appliance = %id, "appliance turned off");
        Ok(ApplianceOutcome::TurnedOff)
    }

    /// Await a store call under the call timeout.
    async fn bounded<T, E, F>(&self, stage: &'static str, fut: F) -> Result<T, EngineError>
    where
        F: Future<Output = Result<T, E>>,
        E: Into<EngineError>,
    {
        let timeout = self.policy.call_timeout;
        match tokio::time::timeout(timeout, fut).await {
            Ok(result) => result.map_err(Into::into),
            Err(_) => Err(EngineError::Timeout {
                stage,
                timeout_ms: timeout.as_millis() as u64,
            }),
        }
    }

    /// Current view of one appliance, `None` if it is not in the store.
    pub async fn inspect(
        &self,
        id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<ApplianceView>, EngineError> {
        let path = self.layout.appliance_path(id);
        let Some(raw) = self.bounded("fetch", self.store.get(&path)).await? else {
            return Ok(None);
        };
        let record = self.bounded("dwell", self.tracker.record(id)).await?;
        Ok(Some(ApplianceView {
            id: id.to_string(),
            powered: PowerState::decode(&raw).map(|p| p.powered),
            raw,
            dwell_since: record.map(|r| r.since),
            dwell_secs: record.map(|r| (now - r.since).num_seconds().max(0) as u64),
        }))
    }

    /// Views of every appliance under the root.
    pub async fn inspect_all(&self, now: DateTime<Utc>) -> Result<Vec<ApplianceView>, EngineError> {
        let mut views = Vec::new();
        for id in self.appliance_ids().await? {
            if let Some(view) = self.inspect(&id, now).await? {
                views.push(view);
            }
        }
        Ok(views)
    }

    pub async fn last_report(&self) -> Option<CycleReport> {
        self.status.read().await.last_report.clone()
    }

    pub async fn stats(&self) -> CycleStats {
        self.status.read().await.stats.clone()
    }

    /// Run cycles on a fixed period until `shutdown` fires.
    pub async fn run(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = interval.as_secs(), "shutoff engine started");

        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    match self.run_cycle(Utc::now()).await {
                        Ok(report) => info!(
                            appliances = report.appliances.len(),
                            turned_off = report.turned_off().count(),
                            errors = report.error_count(),
                            "cycle complete"
                        ),
                        Err(e) => error!(error = %e, "cycle failed"),
                    }
                }
                _ = shutdown.changed() => {
                    info!("shutoff engine shutting down");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::ClassifyFuture;
    use chrono::TimeZone;
    use powerwatch_core::FeatureSchema;
    use powerwatch_state::RedbStore;
    use serde_json::json;
    use std::sync::Mutex;

    /// Returns a fixed label and remembers every input.
    struct FixedClassifier {
        label: u32,
        width: usize,
        seen: Mutex<Vec<Vec<f64>>>,
    }

    impl FixedClassifier {
        fn new(label: u32) -> Arc<Self> {
            Arc::new(Self {
                label,
                width: 3,
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    impl Classifier for FixedClassifier {
        fn feature_count(&self) -> usize {
            self.width
        }

        fn predict<'a>(&'a self, features: &'a [f64]) -> ClassifyFuture<'a> {
            self.seen.lock().unwrap().push(features.to_vec());
            let label = self.label;
            Box::pin(async move { Ok(label) })
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, 18, 0, 0).unwrap()
    }

    fn minutes(n: i64) -> DateTime<Utc> {
        t0() + chrono::Duration::minutes(n)
    }

    fn engine_with(classifier: Arc<dyn Classifier>) -> (Arc<RedbStore>, ShutoffEngine) {
        let store = Arc::new(RedbStore::open_in_memory().unwrap());
        let engine = ShutoffEngine::new(
            store.clone(),
            classifier,
            Layout::default(),
            EnginePolicy::default(),
        )
        .unwrap();
        (store, engine)
    }

    #[test]
    fn schema_mismatch_fails_construction() {
        let store = Arc::new(RedbStore::open_in_memory().unwrap());
        let policy = EnginePolicy {
            features: FeaturePolicy {
                schema: FeatureSchema::Full,
                ..FeaturePolicy::default()
            },
            ..EnginePolicy::default()
        };
        let result = ShutoffEngine::new(store, FixedClassifier::new(1), Layout::default(), policy);
        assert!(matches!(result, Err(EngineError::SchemaMismatch { .. })));
    }

    #[tokio::test]
    async fn empty_store_gives_empty_report() {
        let (_store, engine) = engine_with(FixedClassifier::new(1));
        let report = engine.run_cycle(t0()).await.unwrap();
        assert!(report.appliances.is_empty());
    }

    #[tokio::test]
    async fn off_appliance_is_cleared() {
        let (store, engine) = engine_with(FixedClassifier::new(1));
        store.set("appliances/B1", json!("0")).await.unwrap();
        store.set("dwell/B1", json!(t0().to_rfc3339())).await.unwrap();

        let report = engine.run_cycle(minutes(5)).await.unwrap();
        assert_eq!(report.outcome("B1"), Some(&ApplianceOutcome::Cleared));
        assert!(store.get("dwell/B1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn integer_flags_are_written_back_as_integers() {
        let (store, engine) = engine_with(FixedClassifier::new(1));
        store.set("appliances/B1", json!(1)).await.unwrap();

        engine.run_cycle(t0()).await.unwrap();
        let report = engine.run_cycle(minutes(2)).await.unwrap();
        assert_eq!(report.outcome("B1"), Some(&ApplianceOutcome::TurnedOff));
        assert_eq!(store.get("appliances/B1").await.unwrap(), Some(json!(0)));
    }

    #[tokio::test]
    async fn unknown_power_value_is_skipped() {
        let (store, engine) = engine_with(FixedClassifier::new(1));
        store.set("appliances/B1", json!("maybe")).await.unwrap();

        let report = engine.run_cycle(t0()).await.unwrap();
        assert!(matches!(report.outcome("B1"), Some(ApplianceOutcome::Skipped { .. })));
        assert!(store.get("dwell/B1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn classifier_sees_clamped_dwell() {
        let classifier = FixedClassifier::new(0);
        let (store, engine) = engine_with(classifier.clone());
        store.set("appliances/B1", json!("1")).await.unwrap();

        engine.run_cycle(t0()).await.unwrap();
        engine.run_cycle(minutes(7)).await.unwrap();

        let seen = classifier.seen.lock().unwrap().clone();
        assert_eq!(seen, vec![vec![2.0, 1.0, 0.0]]);
    }

    #[tokio::test]
    async fn malformed_label_is_classifier_error() {
        let (store, engine) = engine_with(FixedClassifier::new(7));
        store.set("appliances/B1", json!("1")).await.unwrap();

        engine.run_cycle(t0()).await.unwrap();
        let report = engine.run_cycle(minutes(2)).await.unwrap();
        assert!(matches!(
            report.outcome("B1"),
            Some(ApplianceOutcome::ClassifierError { .. })
        ));
        assert_eq!(store.get("appliances/B1").await.unwrap(), Some(json!("1")));
    }

    #[tokio::test]
    async fn snapshot_must_be_an_object() {
        let (store, engine) = engine_with(FixedClassifier::new(1));
        store.set("appliances", json!("oops")).await.unwrap();

        let err = engine.run_cycle(t0()).await.unwrap_err();
        assert!(matches!(err, EngineError::MalformedSnapshot { .. }));
        assert_eq!(engine.stats().await.failed_cycles, 1);
    }

    #[tokio::test]
    async fn last_report_and_stats_track_cycles() {
        let (store, engine) = engine_with(FixedClassifier::new(1));
        store.set("appliances/B1", json!("1")).await.unwrap();
        assert!(engine.last_report().await.is_none());

        engine.run_cycle(t0()).await.unwrap();
        engine.run_cycle(minutes(2)).await.unwrap();

        let last = engine.last_report().await.unwrap();
        assert_eq!(last.at, minutes(2));
        let stats = engine.stats().await;
        assert_eq!(stats.cycles, 2);
        assert_eq!(stats.outcomes["waiting"], 1);
        assert_eq!(stats.outcomes["turned_off"], 1);
    }

    #[tokio::test]
    async fn inspect_reports_power_and_dwell() {
        let (store, engine) = engine_with(FixedClassifier::new(0));
        store.set("appliances/B1", json!("1")).await.unwrap();
        store.set("appliances/B2", json!(0)).await.unwrap();
        engine.run_cycle(t0()).await.unwrap();

        let view = engine.inspect("B1", minutes(1)).await.unwrap().unwrap();
        assert_eq!(view.powered, Some(true));
        assert_eq!(view.dwell_since, Some(t0()));
        assert_eq!(view.dwell_secs, Some(60));

        assert!(engine.inspect("B9", t0()).await.unwrap().is_none());
        assert_eq!(engine.inspect_all(t0()).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn run_loop_stops_on_shutdown() {
        let (_store, engine) = engine_with(FixedClassifier::new(0));
        let engine = Arc::new(engine);
        let (tx, rx) = watch::channel(false);

        let handle = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.run(Duration::from_millis(10), rx).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(engine.stats().await.cycles >= 1);
    }
}
