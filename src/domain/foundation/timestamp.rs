//! UTC timestamps for `created_at` columns.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Server-assigned creation time. Breaks ties between expenses on the same date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Wraps a value read from a `timestamptz` column.
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Shifts by `secs`; negative moves backwards.
    pub fn plus_secs(&self, secs: i64) -> Self {
        Self(self.0 + Duration::seconds(secs))
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Self::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orders_by_instant() {
        let created = Timestamp::now();
        assert!(created.plus_secs(-5) < created);
        assert!(created < created.plus_secs(5));
    }

    #[test]
    fn serializes_as_rfc3339() {
        let dt = DateTime::parse_from_rfc3339("2024-01-15T09:30:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let json = serde_json::to_string(&Timestamp::from_datetime(dt)).unwrap();
        assert_eq!(json, "\"2024-01-15T09:30:00Z\"");
    }
}
