//! Policy types shared across powerwatch crates.

use serde::{Deserialize, Serialize};

/// Shape of the feature vector handed to the classifier.
///
/// Fields are always emitted in the order dwell minutes, load during
/// window, load after window, time-of-day bucket, weekday; each schema is a
/// prefix of the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureSchema {
    /// `[dwell_minutes, load_during_window, load_after_window]`
    #[default]
    Basic,
    /// `Basic` plus the time-of-day bucket.
    TimeOfDay,
    /// `TimeOfDay` plus the weekday (Monday = 0).
    Full,
}

impl FeatureSchema {
    /// Number of fields in a vector of this schema.
    pub fn width(self) -> usize {
        match self {
            FeatureSchema::Basic => 3,
            FeatureSchema::TimeOfDay => 4,
            FeatureSchema::Full => 5,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            FeatureSchema::Basic => "basic",
            FeatureSchema::TimeOfDay => "time_of_day",
            FeatureSchema::Full => "full",
        }
    }
}

/// Which dwell value is fed to the classifier once the threshold is crossed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DwellMinutesPolicy {
    /// Always the threshold, in whole minutes.
    #[default]
    ClampToThreshold,
    /// The true elapsed time, in whole minutes.
    Elapsed,
}

/// How `load_after_window` is filled in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadAfterPolicy {
    #[default]
    Zero,
    One,
    /// Mirrors the appliance's power state before the decision.
    MirrorState,
}
