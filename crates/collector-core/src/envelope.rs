//! The standard response shape every tool-style query returns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvelopeMetadata {
    pub time_range: TimeRange,
    pub event_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolEnvelope<T> {
    pub summary: String,
    pub data: T,
    pub issues: Vec<String>,
    pub metadata: EnvelopeMetadata,
}

impl<T> ToolEnvelope<T> {
    pub fn new(summary: impl Into<String>, data: T, from: DateTime<Utc>, event_count: usize) -> Self {
        Self {
            summary: summary.into(),
            data,
            issues: Vec::new(),
            metadata: EnvelopeMetadata {
                time_range: TimeRange { from, to: Utc::now() },
                event_count,
                session_id: None,
            },
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.metadata.session_id = Some(session_id.into());
        self
    }

    pub fn with_issues(mut self, issues: Vec<String>) -> Self {
        self.issues = issues;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_carries_summary_and_data_through() {
        let envelope = ToolEnvelope::new("3 requests", vec![1, 2, 3], Utc::now(), 3);
        assert_eq!(envelope.summary, "3 requests");
        assert_eq!(envelope.data, vec![1, 2, 3]);
        assert_eq!(envelope.metadata.event_count, 3);
        assert!(envelope.metadata.session_id.is_none());
    }

    #[test]
    fn with_session_sets_metadata_session_id() {
        let envelope = ToolEnvelope::new("ok", (), Utc::now(), 0).with_session("s1");
        assert_eq!(envelope.metadata.session_id.as_deref(), Some("s1"));
    }
}
