use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A timestamped text entry as exchanged between frontend and backend.
///
/// Field names are capitalized on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    #[serde(rename = "Timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "Text")]
    pub text: String,
}

impl Entry {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            text: text.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_entry_wire_format() {
        let entry = Entry {
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap(),
            text: "hello".to_string(),
        };
        let json = serde_json::to_string(&entry).unwrap();
        assert_eq!(json, r#"{"Timestamp":"2024-03-01T12:30:00Z","Text":"hello"}"#);
    }

    #[test]
    fn test_entry_accepts_offset_timestamps() {
        let entry: Entry =
            serde_json::from_str(r#"{"Timestamp":"2024-03-01T14:30:00+02:00","Text":"hi"}"#)
                .unwrap();
        assert_eq!(
            entry.timestamp,
            Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap()
        );
    }
}
