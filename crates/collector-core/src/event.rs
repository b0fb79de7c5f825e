//! The event model: a tagged union over observed-event kinds, all sharing
//! a common header. Events are immutable once constructed; nothing in
//! this crate offers a way to mutate a stored event after ingestion.

use serde::{Deserialize, Serialize};

/// Header fields every event carries regardless of tag.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventHeader {
    pub event_id: String,
    pub session_id: String,
    /// Producer-assigned wall-clock milliseconds. Not assumed monotonic
    /// across events; callers that need causal order must sort on it.
    pub timestamp: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleLevel {
    Log,
    Warn,
    Error,
    Info,
    Debug,
    Trace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DbOperation {
    Select,
    Insert,
    Update,
    Delete,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VitalRating {
    Good,
    NeedsImprovement,
    Poor,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct GraphQlInfo {
    #[serde(rename = "type")]
    pub op_type: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ScrollPosition {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RenderProfile {
    pub component_name: String,
    pub render_count: u32,
    pub total_duration: f64,
    pub avg_duration: f64,
    pub render_velocity: f64,
    pub suspicious: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionBody {
    pub app_name: String,
    pub connected_at: i64,
    pub sdk_version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkBody {
    pub method: String,
    pub url: String,
    pub status: u16,
    pub duration: f64,
    #[serde(default)]
    pub request_headers: std::collections::BTreeMap<String, String>,
    #[serde(default)]
    pub response_headers: std::collections::BTreeMap<String, String>,
    #[serde(default)]
    pub request_size: Option<u64>,
    #[serde(default)]
    pub response_size: Option<u64>,
    #[serde(default)]
    pub graphql: Option<GraphQlInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConsoleBody {
    pub level: ConsoleLevel,
    pub message: String,
    #[serde(default)]
    pub args: Vec<serde_json::Value>,
    #[serde(default)]
    pub stack_trace: Option<String>,
    #[serde(default)]
    pub source_file: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StateBody {
    pub store_id: String,
    pub library: String,
    pub phase: String,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub diff: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RenderBody {
    pub profiles: Vec<RenderProfile>,
    pub total_renders: u32,
    #[serde(default)]
    pub suspicious_components: Vec<String>,
    pub snapshot_window_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PerformanceBody {
    pub metric_name: String,
    pub value: f64,
    pub unit: String,
    #[serde(default)]
    pub rating: Option<VitalRating>,
    #[serde(default)]
    pub element: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DatabaseBody {
    pub query: String,
    pub normalized_query: String,
    pub duration: f64,
    pub operation: DbOperation,
    #[serde(default)]
    pub tables_accessed: Vec<String>,
    #[serde(default)]
    pub rows_returned: Option<u64>,
    #[serde(default)]
    pub rows_affected: Option<u64>,
    pub source: String,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DomSnapshotBody {
    pub url: String,
    pub html: String,
    pub viewport: Viewport,
    pub scroll_position: ScrollPosition,
    pub element_count: u32,
    pub truncated: bool,
}

/// `recon_*` events are opaque payloads to the core; the scanner and its
/// categories live outside the specified substrate. We keep the category
/// name (taken from the tag, e.g. `recon_scan`) and forward the body
/// verbatim.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReconBody {
    pub category: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// A single stored observation. Tagged on `event_type` for wire
/// compatibility with producers; the tag also doubles as the ring key in
/// [`crate::store::EventStore`].
///
/// `Serialize` is hand-written below rather than derived: `Recon`'s tag is
/// the dynamic `recon_*` name carried in `body.category`, which doesn't
/// fit the static `#[serde(tag = "eventType")]` used by the other eight
/// variants. `Deserialize` stays derived: `Recon` is `#[serde(skip)]`
/// there and reconstructed separately in [`RawEventFrame::into_event`].
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "eventType", rename_all = "snake_case")]
pub enum Event {
    Session {
        #[serde(flatten)]
        header: EventHeader,
        #[serde(flatten)]
        body: SessionBody,
    },
    Network {
        #[serde(flatten)]
        header: EventHeader,
        #[serde(flatten)]
        body: NetworkBody,
    },
    Console {
        #[serde(flatten)]
        header: EventHeader,
        #[serde(flatten)]
        body: ConsoleBody,
    },
    State {
        #[serde(flatten)]
        header: EventHeader,
        #[serde(flatten)]
        body: StateBody,
    },
    Render {
        #[serde(flatten)]
        header: EventHeader,
        #[serde(flatten)]
        body: RenderBody,
    },
    Performance {
        #[serde(flatten)]
        header: EventHeader,
        #[serde(flatten)]
        body: PerformanceBody,
    },
    Database {
        #[serde(flatten)]
        header: EventHeader,
        #[serde(flatten)]
        body: DatabaseBody,
    },
    DomSnapshot {
        #[serde(flatten)]
        header: EventHeader,
        #[serde(flatten)]
        body: DomSnapshotBody,
    },
    /// Catches every `recon_*` tag; `body.category` retains the exact tag.
    #[serde(skip)]
    Recon {
        header: EventHeader,
        body: ReconBody,
    },
}

/// Mirrors `Event`'s eight statically-tagged variants for `Serialize`
/// only; `Recon` is handled separately in `Event`'s own `Serialize` impl
/// since its tag isn't known at compile time.
#[derive(Serialize)]
#[serde(tag = "eventType", rename_all = "snake_case")]
enum EventWire<'a> {
    Session {
        #[serde(flatten)]
        header: &'a EventHeader,
        #[serde(flatten)]
        body: &'a SessionBody,
    },
    Network {
        #[serde(flatten)]
        header: &'a EventHeader,
        #[serde(flatten)]
        body: &'a NetworkBody,
    },
    Console {
        #[serde(flatten)]
        header: &'a EventHeader,
        #[serde(flatten)]
        body: &'a ConsoleBody,
    },
    State {
        #[serde(flatten)]
        header: &'a EventHeader,
        #[serde(flatten)]
        body: &'a StateBody,
    },
    Render {
        #[serde(flatten)]
        header: &'a EventHeader,
        #[serde(flatten)]
        body: &'a RenderBody,
    },
    Performance {
        #[serde(flatten)]
        header: &'a EventHeader,
        #[serde(flatten)]
        body: &'a PerformanceBody,
    },
    Database {
        #[serde(flatten)]
        header: &'a EventHeader,
        #[serde(flatten)]
        body: &'a DatabaseBody,
    },
    DomSnapshot {
        #[serde(flatten)]
        header: &'a EventHeader,
        #[serde(flatten)]
        body: &'a DomSnapshotBody,
    },
}

impl Serialize for Event {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            Event::Session { header, body } => EventWire::Session { header, body }.serialize(serializer),
            Event::Network { header, body } => EventWire::Network { header, body }.serialize(serializer),
            Event::Console { header, body } => EventWire::Console { header, body }.serialize(serializer),
            Event::State { header, body } => EventWire::State { header, body }.serialize(serializer),
            Event::Render { header, body } => EventWire::Render { header, body }.serialize(serializer),
            Event::Performance { header, body } => EventWire::Performance { header, body }.serialize(serializer),
            Event::Database { header, body } => EventWire::Database { header, body }.serialize(serializer),
            Event::DomSnapshot { header, body } => EventWire::DomSnapshot { header, body }.serialize(serializer),
            Event::Recon { header, body } => {
                use serde::ser::SerializeMap;
                let mut map = serializer.serialize_map(None)?;
                map.serialize_entry("eventType", &body.category)?;
                map.serialize_entry("eventId", &header.event_id)?;
                map.serialize_entry("sessionId", &header.session_id)?;
                map.serialize_entry("timestamp", &header.timestamp)?;
                if let serde_json::Value::Object(obj) = &body.payload {
                    for (k, v) in obj {
                        if !matches!(k.as_str(), "eventType" | "eventId" | "sessionId" | "timestamp") {
                            map.serialize_entry(k, v)?;
                        }
                    }
                }
                map.end()
            }
        }
    }
}

/// The set of tags the store keeps separate rings for. `Recon` tags are
/// not pre-enumerated; each distinct `recon_*` name gets its own ring,
/// keyed by [`EventKind::Recon`]'s inner string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    Session,
    Network,
    Console,
    State,
    Render,
    Performance,
    Database,
    DomSnapshot,
    Recon(String),
}

impl Event {
    pub fn header(&self) -> &EventHeader {
        match self {
            Event::Session { header, .. }
            | Event::Network { header, .. }
            | Event::Console { header, .. }
            | Event::State { header, .. }
            | Event::Render { header, .. }
            | Event::Performance { header, .. }
            | Event::Database { header, .. }
            | Event::DomSnapshot { header, .. }
            | Event::Recon { header, .. } => header,
        }
    }

    pub fn event_id(&self) -> &str {
        &self.header().event_id
    }

    pub fn session_id(&self) -> &str {
        &self.header().session_id
    }

    pub fn timestamp(&self) -> i64 {
        self.header().timestamp
    }

    pub fn kind(&self) -> EventKind {
        match self {
            Event::Session { .. } => EventKind::Session,
            Event::Network { .. } => EventKind::Network,
            Event::Console { .. } => EventKind::Console,
            Event::State { .. } => EventKind::State,
            Event::Render { .. } => EventKind::Render,
            Event::Performance { .. } => EventKind::Performance,
            Event::Database { .. } => EventKind::Database,
            Event::DomSnapshot { .. } => EventKind::DomSnapshot,
            Event::Recon { body, .. } => EventKind::Recon(body.category.clone()),
        }
    }
}

/// A raw, pre-dispatch inbound record: just enough to find the tag and
/// session before we commit to a concrete body shape. The collector
/// server and the store both parse through this first.
#[derive(Debug, Clone, Deserialize)]
pub struct RawEventFrame {
    #[serde(rename = "eventType")]
    pub event_type: String,
    #[serde(flatten)]
    pub rest: serde_json::Value,
}

/// Outcome of resolving a [`RawEventFrame`] that has already made it past
/// JSON decoding: it has an `eventType` and a flattened body object, but
/// that doesn't guarantee the tag or body are actually valid. This is the
/// §7 `invalid-event` kind; a frame that never parses as JSON at all (or
/// doesn't even carry an `eventType`) never reaches this type, it's an
/// `invalid-frame` and is rejected earlier, in `decode_inbound`.
#[derive(Debug)]
pub enum DecodedEvent {
    Event(Event),
    /// Tag isn't one of the known event types and isn't a `recon_*`
    /// passthrough, or a known tag is missing a required header/body
    /// field (e.g. `console` without `sessionId`).
    InvalidEvent,
}

impl RawEventFrame {
    /// Resolve into a concrete [`Event`], tolerating unknown tags by
    /// routing them to `Recon` (soft error: unknown event tags are
    /// counted, not fatal). Any other rejection, truly unrecognized tag,
    /// or a recognized tag missing required fields, comes back as
    /// `DecodedEvent::InvalidEvent` rather than silently disappearing.
    pub fn into_event(self) -> DecodedEvent {
        let mut obj = match self.rest {
            serde_json::Value::Object(map) => map,
            // `rest` is captured via `#[serde(flatten)]` into a `Value`,
            // which always yields an object for a frame that decoded as
            // `RawEventFrame` at all; kept as a defensive fallback.
            _ => return DecodedEvent::InvalidEvent,
        };
        obj.insert("eventType".to_string(), serde_json::Value::String(self.event_type.clone()));
        let value = serde_json::Value::Object(obj);

        match serde_json::from_value::<Event>(value.clone()) {
            Ok(event) => DecodedEvent::Event(event),
            Err(_) if self.event_type.starts_with("recon_") => {
                match serde_json::from_value::<EventHeader>(value.clone()) {
                    Ok(header) => DecodedEvent::Event(Event::Recon {
                        header,
                        body: ReconBody {
                            category: self.event_type,
                            payload: value,
                        },
                    }),
                    Err(_) => DecodedEvent::InvalidEvent,
                }
            }
            Err(_) => DecodedEvent::InvalidEvent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn console_event_round_trips() {
        let event = Event::Console {
            header: EventHeader {
                event_id: "e1".into(),
                session_id: "s1".into(),
                timestamp: 1000,
            },
            body: ConsoleBody {
                level: ConsoleLevel::Error,
                message: "boom".into(),
                args: vec![],
                stack_trace: None,
                source_file: None,
            },
        };
        let json = serde_json::to_value(&event).unwrap();
        let decoded: Event = serde_json::from_value(json).unwrap();
        assert_eq!(event, decoded);
    }

    #[test]
    fn raw_frame_routes_unknown_recon_tag_softly() {
        let raw = RawEventFrame {
            event_type: "recon_element_tree".into(),
            rest: serde_json::json!({
                "eventId": "e2",
                "sessionId": "s1",
                "timestamp": 2000,
                "nodes": 12
            }),
        };
        let event = match raw.into_event() {
            DecodedEvent::Event(event) => event,
            DecodedEvent::InvalidEvent => panic!("recon tag should decode softly"),
        };
        assert_eq!(event.event_id(), "e2");
        matches!(event.kind(), EventKind::Recon(ref c) if c == "recon_element_tree");
    }

    #[test]
    fn recon_event_serializes_with_its_dynamic_tag_and_decodes_back() {
        let event = Event::Recon {
            header: EventHeader {
                event_id: "e2".into(),
                session_id: "s1".into(),
                timestamp: 2000,
            },
            body: ReconBody {
                category: "recon_element_tree".into(),
                payload: serde_json::json!({
                    "eventId": "e2",
                    "sessionId": "s1",
                    "timestamp": 2000,
                    "nodes": 12
                }),
            },
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["eventType"], "recon_element_tree");
        assert_eq!(json["nodes"], 12);

        let raw: RawEventFrame = serde_json::from_value(json).unwrap();
        let decoded = match raw.into_event() {
            DecodedEvent::Event(event) => event,
            DecodedEvent::InvalidEvent => panic!("recon frame should round-trip"),
        };
        assert_eq!(decoded.event_id(), "e2");
        matches!(decoded.kind(), EventKind::Recon(ref c) if c == "recon_element_tree");
    }

    #[test]
    fn raw_frame_rejects_truly_unknown_tag() {
        let raw = RawEventFrame {
            event_type: "not_a_real_tag".into(),
            rest: serde_json::json!({"eventId": "e3", "sessionId": "s1", "timestamp": 1}),
        };
        assert!(matches!(raw.into_event(), DecodedEvent::InvalidEvent));
    }

    #[test]
    fn raw_frame_rejects_missing_header_field() {
        let raw = RawEventFrame {
            event_type: "console".into(),
            rest: serde_json::json!({"sessionId": "s1", "timestamp": 1, "level": "error", "message": "x"}),
        };
        assert!(matches!(raw.into_event(), DecodedEvent::InvalidEvent));
    }
}
