//! Feature vectors handed to the classifier once an appliance has dwelled
//! past the threshold.

use std::time::Duration;

use chrono::{DateTime, Datelike, NaiveTime, Utc};
use serde::Serialize;

use powerwatch_core::{DwellMinutesPolicy, FeatureSchema, LoadAfterPolicy};

/// How feature vectors are shaped and filled in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeaturePolicy {
    pub schema: FeatureSchema,
    pub dwell_minutes: DwellMinutesPolicy,
    pub load_after_window: LoadAfterPolicy,
    /// Office window in UTC; may wrap past midnight.
    pub office_start: NaiveTime,
    pub office_end: NaiveTime,
}

impl Default for FeaturePolicy {
    fn default() -> Self {
        Self {
            schema: FeatureSchema::Basic,
            dwell_minutes: DwellMinutesPolicy::ClampToThreshold,
            load_after_window: LoadAfterPolicy::Zero,
            office_start: NaiveTime::from_hms_opt(9, 0, 0).unwrap_or_default(),
            office_end: NaiveTime::from_hms_opt(17, 0, 0).unwrap_or_default(),
        }
    }
}

impl FeaturePolicy {
    /// Whether `now` falls inside the office window.
    pub fn in_office_hours(&self, now: DateTime<Utc>) -> bool {
        let t = now.time();
        if self.office_start <= self.office_end {
            self.office_start <= t && t < self.office_end
        } else {
            t >= self.office_start || t < self.office_end
        }
    }
}

/// One classifier input. Built fresh per decision and never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FeatureVector {
    pub dwell_minutes: i64,
    pub load_during_window: u8,
    pub load_after_window: u8,
    pub time_of_day_bucket: Option<u8>,
    pub weekday: Option<u8>,
}

impl FeatureVector {
    /// Build the vector for an appliance that has been ON for `elapsed`
    /// (at or past `threshold`) and was `powered_before` the decision.
    pub fn build(
        policy: &FeaturePolicy,
        threshold: Duration,
        elapsed: Duration,
        powered_before: bool,
        now: DateTime<Utc>,
    ) -> Self {
        let dwell = match policy.dwell_minutes {
            DwellMinutesPolicy::ClampToThreshold => threshold,
            DwellMinutesPolicy::Elapsed => elapsed,
        };
        let load_after_window = match policy.load_after_window {
            LoadAfterPolicy::Zero => 0,
            LoadAfterPolicy::One => 1,
            LoadAfterPolicy::MirrorState => u8::from(powered_before),
        };
        let (time_of_day_bucket, weekday) = match policy.schema {
            FeatureSchema::Basic => (None, None),
            FeatureSchema::TimeOfDay => (Some(u8::from(policy.in_office_hours(now))), None),
            FeatureSchema::Full => (
                Some(u8::from(policy.in_office_hours(now))),
                Some(now.weekday().num_days_from_monday() as u8),
            ),
        };

        Self {
            dwell_minutes: (dwell.as_secs() / 60) as i64,
            // The appliance was ON for the whole window to get here.
            load_during_window: 1,
            load_after_window,
            time_of_day_bucket,
            weekday,
        }
    }

    /// Ordered numeric form: dwell, during, after, then the optional fields
    /// that are present.
    pub fn to_vec(&self) -> Vec<f64> {
        let mut out = vec![
            self.dwell_minutes as f64,
            f64::from(self.load_during_window),
            f64::from(self.load_after_window),
        ];
        out.extend(self.time_of_day_bucket.map(f64::from));
        out.extend(self.weekday.map(f64::from));
        out
    }
}
