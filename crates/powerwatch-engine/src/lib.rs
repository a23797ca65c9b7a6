//! powerwatch-engine — the appliance auto-shutoff decision engine.
//!
//! One call to [`ShutoffEngine::run_cycle`] walks every appliance in the
//! shared store, tracks how long each has been continuously ON, and once the
//! dwell threshold is reached asks a [`Classifier`] whether to switch it off.
//!
//! # Per-appliance state machine
//!
//! ```text
//! OFF ──(ON observed)──▶ JUST_STARTED ──(next ON)──▶ WAITING
//!  ▲                                                   │ elapsed ≥ threshold
//!  │                                                   ▼
//!  └──────────── TURNED_OFF ◀──(label 1)──────────  DECIDING
//!                                                      │ label 0
//!                                    STAYS_ON ◀────────┘ (loops to WAITING)
//! ```
//!
//! Dwell start times live in the store (see [`DwellTracker`]), so separate
//! invocations share no in-process state. Each appliance's read-decide-commit
//! sequence runs under a per-appliance guard; failures are reported per
//! appliance in the [`CycleReport`] and never abort the rest of the cycle.

pub mod classifier;
pub mod dwell;
pub mod engine;
pub mod error;
pub mod features;
pub mod guard;
pub mod report;

pub use classifier::{ensure_schema, Classifier, ClassifyFuture, Decision, DecisionTree};
pub use dwell::{DwellState, DwellTracker};
pub use engine::{ApplianceView, EnginePolicy, ShutoffEngine};
pub use error::{ClassifierError, EngineError};
pub use features::{FeaturePolicy, FeatureVector};
pub use guard::ApplianceLocks;
pub use report::{ApplianceOutcome, CycleReport, CycleStats};
