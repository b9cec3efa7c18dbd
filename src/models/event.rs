use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Impression,
    Click,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Impression => "impression",
            EventKind::Click => "click",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "impression" | "view" => Ok(EventKind::Impression),
            "click" => Ok(EventKind::Click),
            other => Err(format!("unknown event kind '{other}'")),
        }
    }
}

/// One impression or click of a banner. Never mutated once recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricEvent {
    pub unit_id: i64,
    pub kind: EventKind,
    pub at: DateTime<Utc>,
}

impl MetricEvent {
    pub fn impression(unit_id: i64, at: DateTime<Utc>) -> Self {
        Self {
            unit_id,
            kind: EventKind::Impression,
            at,
        }
    }

    pub fn click(unit_id: i64, at: DateTime<Utc>) -> Self {
        Self {
            unit_id,
            kind: EventKind::Click,
            at,
        }
    }
}
