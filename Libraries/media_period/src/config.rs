use serde::{Deserialize, Serialize};

/// Settings handed down to every chunk stream a period creates.
///
/// The period itself never retries anything; the retry budget lives here so
/// that each stream applies it to its own loads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeriodConfig {
    /// Minimum number of times a chunk load is retried before the error is surfaced.
    pub min_loadable_retry_count: u32,
    /// Offset between the device clock and the server clock, in milliseconds.
    pub elapsed_realtime_offset_ms: i64,
}

impl Default for PeriodConfig {
    fn default() -> Self {
        Self {
            min_loadable_retry_count: 3,
            elapsed_realtime_offset_ms: 0,
        }
    }
}

impl PeriodConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config = PeriodConfig::from_json(r#"{ "elapsed_realtime_offset_ms": -250 }"#).unwrap();
        assert_eq!(config.min_loadable_retry_count, 3);
        assert_eq!(config.elapsed_realtime_offset_ms, -250);
    }

    #[test]
    fn rejects_unknown_types() {
        assert!(PeriodConfig::from_json(r#"{ "min_loadable_retry_count": "many" }"#).is_err());
    }
}
