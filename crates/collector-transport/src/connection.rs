//! Per-connection reader/writer tasks for an accepted `/sdk` or `/events`
//! socket (C4). `/sdk` is bidirectional and session-scoped: it ingests
//! events, buffers anything arriving before the session frame, and
//! drains outbound commands through a dedicated writer task. `/events`
//! is broadcast-only: it never reads anything meaningful from the
//! client, only watches for close.

use std::collections::VecDeque;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};

use collector_core::Event;

use crate::protocol::{decode_inbound, DecodeOutcome, InboundMessage};
use crate::registry::{OutboundQueue, SessionTransport};
use crate::server::CollectorServer;

pub async fn sdk_upgrade(State(server): State<Arc<CollectorServer>>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_sdk_socket(socket, server))
}

pub async fn events_upgrade(State(server): State<Arc<CollectorServer>>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_events_socket(socket, server))
}

async fn handle_sdk_socket(socket: WebSocket, server: Arc<CollectorServer>) {
    let (mut sink, mut stream) = socket.split();

    let queue = OutboundQueue::new(server.config.outbound_queue_cap);
    let transport = SessionTransport::new(queue.clone());

    let writer_queue = queue.clone();
    let writer = tokio::spawn(async move {
        while let Some(frame) = writer_queue.pop().await {
            let text = match serde_json::to_string(&frame) {
                Ok(text) => text,
                Err(error) => {
                    tracing::warn!(%error, "failed to encode outbound command frame");
                    continue;
                }
            };
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let mut known_session: Option<String> = None;
    let mut pre_session_buffer: VecDeque<Event> = VecDeque::new();

    while let Some(message) = stream.next().await {
        let message = match message {
            Ok(message) => message,
            Err(_) => break,
        };
        match message {
            Message::Text(text) => match decode_inbound(&text) {
                DecodeOutcome::Message(InboundMessage::Event(event)) => handle_inbound_event(
                    &server,
                    &transport,
                    &mut known_session,
                    &mut pre_session_buffer,
                    event,
                ),
                DecodeOutcome::Message(InboundMessage::CommandReply { request_id, data, error }) => {
                    server.router.resolve(&request_id, data, error);
                }
                DecodeOutcome::InvalidEvent => {
                    server.store.record_invalid_event();
                    tracing::warn!("discarded frame with unrecognized tag or missing field");
                }
                DecodeOutcome::InvalidFrame => {
                    server.store.record_invalid_frame();
                    tracing::warn!("discarded malformed inbound frame");
                }
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    queue.close();
    let _ = writer.await;

    if let Some(session_id) = known_session {
        server.registry.unregister(&session_id);
        server.router.disconnect_session(&session_id);
        tracing::info!(session_id, "sdk session disconnected");
    }
}

/// Routes one decoded inbound event: pre-session traffic is buffered
/// (capped, oldest-evicted) until the session frame arrives, at which
/// point the session is registered and the whole buffer flushes in
/// order (spec.md §4.4).
fn handle_inbound_event(
    server: &Arc<CollectorServer>,
    transport: &SessionTransport,
    known_session: &mut Option<String>,
    buffer: &mut VecDeque<Event>,
    event: Event,
) {
    if known_session.is_none() {
        if let Event::Session { ref header, ref body } = event {
            let session_id = header.session_id.clone();
            server.registry.register(&session_id, &body.app_name, transport.clone());
            *known_session = Some(session_id);
            store_and_broadcast(server, event);
            while let Some(buffered) = buffer.pop_front() {
                store_and_broadcast(server, buffered);
            }
            return;
        }
        if buffer.len() >= server.config.session_buffer_cap {
            buffer.pop_front();
            tracing::warn!("pre-session buffer full, dropped oldest buffered event");
        }
        buffer.push_back(event);
        return;
    }

    // A session frame mid-stream (reconnect announced on the same
    // socket, or a redundant re-announce) just re-registers idempotently.
    if let Event::Session { ref header, ref body } = event {
        server.registry.register(&header.session_id, &body.app_name, transport.clone());
    }
    store_and_broadcast(server, event);
}

fn store_and_broadcast(server: &Arc<CollectorServer>, event: Event) {
    if server.store.add(event.clone()).is_ok() {
        server.broadcaster.publish(event);
    }
}

async fn handle_events_socket(socket: WebSocket, server: Arc<CollectorServer>) {
    let (mut sink, mut stream) = socket.split();
    let mut rx = server.broadcaster.subscribe();

    loop {
        tokio::select! {
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    _ => {}
                }
            }
            event = rx.recv() => {
                match event {
                    Ok(event) => {
                        let Ok(text) = serde_json::to_string(&event) else { continue };
                        if sink.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "events subscriber lagged, dropping connection");
                        break;
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }
}
