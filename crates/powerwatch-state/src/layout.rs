//! Where appliance state lives in the tree, and how it is encoded.
//!
//! Power flags sit at `<appliance_root>/<id>` as `"1"`/`"0"` strings or
//! `1`/`0` integers (booleans are accepted too). Dwell records sit at
//! `<dwell_root>/<id>` as ISO-8601 timestamps.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::store::{join, normalize};

/// Path layout for appliance power flags and dwell bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layout {
    pub appliance_root: String,
    pub dwell_root: String,
}

impl Default for Layout {
    fn default() -> Self {
        Self::new("appliances", "dwell")
    }
}

impl Layout {
    pub fn new(appliance_root: &str, dwell_root: &str) -> Self {
        Self {
            appliance_root: normalize(appliance_root),
            dwell_root: normalize(dwell_root),
        }
    }

    pub fn appliance_path(&self, id: &str) -> String {
        join(&self.appliance_root, id)
    }

    pub fn dwell_path(&self, id: &str) -> String {
        join(&self.dwell_root, id)
    }
}

/// How a power flag was written, so a commit can write back in kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerEncoding {
    Text,
    Integer,
    Bool,
}

/// A decoded appliance power flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PowerState {
    pub powered: bool,
    pub encoding: PowerEncoding,
}

impl PowerState {
    /// Decode a stored power flag. Returns `None` for anything that is not
    /// `"1"`, `"0"`, `1`, `0`, `true` or `false`.
    pub fn decode(value: &Value) -> Option<Self> {
        let (powered, encoding) = match value {
            Value::String(s) => match s.trim() {
                "1" => (true, PowerEncoding::Text),
                "0" => (false, PowerEncoding::Text),
                _ => return None,
            },
            Value::Number(n) => match n.as_u64()? {
                1 => (true, PowerEncoding::Integer),
                0 => (false, PowerEncoding::Integer),
                _ => return None,
            },
            Value::Bool(b) => (*b, PowerEncoding::Bool),
            _ => return None,
        };
        Some(Self { powered, encoding })
    }

    /// Encode `powered` using this flag's original encoding.
    pub fn encode(&self, powered: bool) -> Value {
        match self.encoding {
            PowerEncoding::Text => Value::String(if powered { "1" } else { "0" }.to_string()),
            PowerEncoding::Integer => Value::from(u8::from(powered)),
            PowerEncoding::Bool => Value::Bool(powered),
        }
    }
}

/// The instant an appliance was first seen ON in its current ON-streak.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DwellRecord {
    pub since: DateTime<Utc>,
}

impl DwellRecord {
    pub fn new(since: DateTime<Utc>) -> Self {
        Self { since }
    }

    pub fn to_value(&self) -> Value {
        Value::String(self.since.to_rfc3339())
    }

    /// Parse a stored record. Accepts RFC 3339 and offset-less ISO-8601
    /// timestamps (the latter read as UTC).
    pub fn from_value(value: &Value) -> Option<Self> {
        let text = value.as_str()?.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
            return Some(Self::new(dt.with_timezone(&Utc)));
        }
        NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|naive| Self::new(naive.and_utc()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn layout_paths() {
        let layout = Layout::new("/Status/", "dwell");
        assert_eq!(layout.appliance_path("B1"), "Status/B1");
        assert_eq!(layout.dwell_path("B1"), "dwell/B1");
    }

    #[test]
    fn power_decodes_strings_and_integers() {
        assert_eq!(
            PowerState::decode(&json!("1")),
            Some(PowerState { powered: true, encoding: PowerEncoding::Text })
        );
        assert_eq!(
            PowerState::decode(&json!(0)),
            Some(PowerState { powered: false, encoding: PowerEncoding::Integer })
        );
        assert_eq!(PowerState::decode(&json!(true)).map(|p| p.powered), Some(true));
        assert!(PowerState::decode(&json!("on")).is_none());
        assert!(PowerState::decode(&json!(2)).is_none());
        assert!(PowerState::decode(&json!(null)).is_none());
    }

    #[test]
    fn power_encodes_in_kind() {
        let text = PowerState::decode(&json!("1")).unwrap();
        assert_eq!(text.encode(false), json!("0"));
        let int = PowerState::decode(&json!(1)).unwrap();
        assert_eq!(int.encode(false), json!(0));
    }

    #[test]
    fn dwell_record_parses_both_forms() {
        let t0 = Utc.with_ymd_and_hms(2024, 3, 4, 18, 0, 0).unwrap();
        let record = DwellRecord::new(t0);
        assert_eq!(DwellRecord::from_value(&record.to_value()), Some(record));
        assert_eq!(
            DwellRecord::from_value(&json!("2024-03-04T18:00:00.000000")),
            Some(record)
        );
        assert!(DwellRecord::from_value(&json!("yesterday")).is_none());
        assert!(DwellRecord::from_value(&json!(12)).is_none());
    }
}
