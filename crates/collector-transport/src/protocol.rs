//! Wire frame shapes (§6): inbound frames are either event records (§3)
//! or `command_reply { requestId, data | error }`; outbound frames are
//! `{ command, requestId, params }`. Frames are self-describing text
//! records; unknown fields are ignorable, `recon_*` tags route softly
//! to `Event::Recon`, and anything else unrecognized is a counted,
//! non-fatal discard (see `collector_core::RawEventFrame::into_event`
//! and `DecodeOutcome` below).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use collector_core::{DecodedEvent, Event, RawEventFrame};

/// A decoded inbound frame, one level up from `RawEventFrame`, already
/// resolved to either a concrete `Event` or a command reply.
#[derive(Clone)]
pub enum InboundMessage {
    Event(Event),
    CommandReply {
        request_id: String,
        data: Option<Value>,
        error: Option<String>,
    },
}

/// Result of [`decode_inbound`]; distinguishes the two §7 discard kinds
/// instead of collapsing both into a bare `None`: a frame that never made
/// it to JSON (or a recognizable shape) is `InvalidFrame`; one that parsed
/// but named an unrecognized tag or omitted a required field is
/// `InvalidEvent`.
#[derive(Debug)]
pub enum DecodeOutcome {
    Message(InboundMessage),
    InvalidEvent,
    InvalidFrame,
}

/// Shape of a `command_reply` frame. Deserializing this first and
/// checking `frame_type` lets a plain event record (no `type` field)
/// fall through to `RawEventFrame` without us hand-rolling the
/// discriminant logic.
#[derive(Debug, Clone, Deserialize)]
struct CommandReplyFrame {
    #[serde(rename = "type")]
    frame_type: String,
    #[serde(rename = "requestId")]
    request_id: String,
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

/// Decodes one inbound text frame. `InvalidFrame` covers anything that
/// never parses as a recognizable `command_reply` or event record at all
/// (malformed JSON, no `eventType`); `InvalidEvent` covers a frame that
/// parsed fine but named an unknown tag or omitted a required field. The
/// connection is never torn down over either; callers just count and
/// discard.
pub fn decode_inbound(text: &str) -> DecodeOutcome {
    if let Ok(reply) = serde_json::from_str::<CommandReplyFrame>(text) {
        if reply.frame_type == "command_reply" {
            return DecodeOutcome::Message(InboundMessage::CommandReply {
                request_id: reply.request_id,
                data: reply.data,
                error: reply.error,
            });
        }
    }
    let raw: RawEventFrame = match serde_json::from_str(text) {
        Ok(raw) => raw,
        Err(_) => return DecodeOutcome::InvalidFrame,
    };
    match raw.into_event() {
        DecodedEvent::Event(event) => DecodeOutcome::Message(InboundMessage::Event(event)),
        DecodedEvent::InvalidEvent => DecodeOutcome::InvalidEvent,
    }
}

/// An outbound command frame (§4.5/§6): `capture_dom_snapshot`,
/// `recon_scan`, `recon_element_snapshot`, or any future SDK-side verb;
/// the core doesn't interpret `command`, only correlates `requestId`.
#[derive(Debug, Clone, Serialize)]
pub struct CommandFrame {
    pub command: String,
    #[serde(rename = "requestId")]
    pub request_id: String,
    pub params: Value,
}

/// Everything the server may write down an `/sdk` socket. Today that's
/// only outbound commands, but keeping this an enum (rather than just
/// serializing `CommandFrame` directly) leaves room for a future
/// server-initiated frame kind without reshaping the writer task.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum OutboundFrame {
    Command(CommandFrame),
}

impl OutboundFrame {
    pub fn command(command: impl Into<String>, request_id: impl Into<String>, params: Value) -> Self {
        OutboundFrame::Command(CommandFrame {
            command: command.into(),
            request_id: request_id.into(),
            params,
        })
    }

    /// Outbound writer queues never drop a command frame on overflow;
    /// only best-effort frames are evictable (spec.md §5). The core
    /// currently has exactly one outbound frame kind and it's always a
    /// command, but this keeps the distinction explicit at the type the
    /// queue actually inspects.
    pub fn is_command(&self) -> bool {
        matches!(self, OutboundFrame::Command(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_session_event_frame() {
        let text = r#"{"eventType":"session","eventId":"e1","sessionId":"s1","timestamp":1000,"appName":"demo","connectedAt":1000,"sdkVersion":"1.0.0"}"#;
        match decode_inbound(text) {
            DecodeOutcome::Message(InboundMessage::Event(Event::Session { header, .. })) => {
                assert_eq!(header.session_id, "s1");
            }
            other => panic!("expected session event, got {other:?}"),
        }
    }

    #[test]
    fn decodes_command_reply_frame() {
        let text = r#"{"type":"command_reply","requestId":"r1","data":{"ok":true}}"#;
        match decode_inbound(text) {
            DecodeOutcome::Message(InboundMessage::CommandReply { request_id, data, error }) => {
                assert_eq!(request_id, "r1");
                assert_eq!(data, Some(serde_json::json!({"ok": true})));
                assert!(error.is_none());
            }
            other => panic!("expected command reply, got {other:?}"),
        }
    }

    #[test]
    fn decodes_command_reply_with_error() {
        let text = r#"{"type":"command_reply","requestId":"r2","error":"selector not found"}"#;
        match decode_inbound(text) {
            DecodeOutcome::Message(InboundMessage::CommandReply { error: Some(e), .. }) => {
                assert_eq!(e, "selector not found");
            }
            other => panic!("expected command reply with error, got {other:?}"),
        }
    }

    #[test]
    fn rejects_garbage_text_as_invalid_frame() {
        assert!(matches!(decode_inbound("not json at all"), DecodeOutcome::InvalidFrame));
        assert!(matches!(
            decode_inbound(r#"{"nothing":"recognizable"}"#),
            DecodeOutcome::InvalidFrame
        ));
    }

    #[test]
    fn rejects_unknown_tag_as_invalid_event() {
        let text = r#"{"eventType":"not_a_real_tag","eventId":"e1","sessionId":"s1","timestamp":1}"#;
        assert!(matches!(decode_inbound(text), DecodeOutcome::InvalidEvent));
    }

    #[test]
    fn command_frame_serializes_with_camel_case_request_id() {
        let frame = OutboundFrame::command("capture_dom_snapshot", "r1", serde_json::json!({"maxSize": 1000}));
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["command"], "capture_dom_snapshot");
        assert_eq!(json["requestId"], "r1");
        assert_eq!(json["params"]["maxSize"], 1000);
    }
}

impl std::fmt::Debug for InboundMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InboundMessage::Event(e) => write!(f, "InboundMessage::Event({:?})", e.kind()),
            InboundMessage::CommandReply { request_id, .. } => {
                write!(f, "InboundMessage::CommandReply({request_id})")
            }
        }
    }
}
