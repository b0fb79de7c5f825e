//! Builders for constructing well-formed events without repeating the
//! full header boilerplate at every call site. Used by this crate's own
//! unit tests and by `collector-transport`/`collector-app` integration
//! tests.

use crate::event::*;

fn header(session_id: &str, event_id: &str, timestamp: i64) -> EventHeader {
    EventHeader {
        event_id: event_id.to_string(),
        session_id: session_id.to_string(),
        timestamp,
    }
}

pub fn session_event(session_id: &str, event_id: &str, timestamp: i64, app_name: &str) -> Event {
    Event::Session {
        header: header(session_id, event_id, timestamp),
        body: SessionBody {
            app_name: app_name.to_string(),
            connected_at: timestamp,
            sdk_version: "1.0.0".to_string(),
        },
    }
}

pub fn console_event(session_id: &str, event_id: &str, timestamp: i64, message: &str) -> Event {
    Event::Console {
        header: header(session_id, event_id, timestamp),
        body: ConsoleBody {
            level: ConsoleLevel::Error,
            message: message.to_string(),
            args: vec![],
            stack_trace: None,
            source_file: None,
        },
    }
}

pub fn network_event(
    session_id: &str,
    event_id: &str,
    timestamp: i64,
    method: &str,
    url: &str,
    status: u16,
    duration: f64,
) -> Event {
    Event::Network {
        header: header(session_id, event_id, timestamp),
        body: NetworkBody {
            method: method.to_string(),
            url: url.to_string(),
            status,
            duration,
            request_headers: Default::default(),
            response_headers: Default::default(),
            request_size: None,
            response_size: None,
            graphql: None,
        },
    }
}

pub fn database_event(
    session_id: &str,
    event_id: &str,
    timestamp: i64,
    query: &str,
    duration: f64,
) -> Event {
    Event::Database {
        header: header(session_id, event_id, timestamp),
        body: DatabaseBody {
            query: query.to_string(),
            normalized_query: crate::normalize::normalize_query(query),
            duration,
            operation: DbOperation::Select,
            tables_accessed: crate::normalize::parse_tables_accessed(query),
            rows_returned: None,
            rows_affected: None,
            source: "test".to_string(),
            error: None,
        },
    }
}

pub fn state_event(session_id: &str, event_id: &str, timestamp: i64, store_id: &str) -> Event {
    Event::State {
        header: header(session_id, event_id, timestamp),
        body: StateBody {
            store_id: store_id.to_string(),
            library: "redux".to_string(),
            phase: "update".to_string(),
            action: None,
            diff: None,
        },
    }
}

pub fn render_event(session_id: &str, event_id: &str, timestamp: i64, profiles: Vec<RenderProfile>) -> Event {
    Event::Render {
        header: header(session_id, event_id, timestamp),
        body: RenderBody {
            profiles,
            total_renders: 1,
            suspicious_components: vec![],
            snapshot_window_ms: 1000,
        },
    }
}

pub fn render_profile(component_name: &str, render_count: u32) -> RenderProfile {
    RenderProfile {
        component_name: component_name.to_string(),
        render_count,
        total_duration: render_count as f64,
        avg_duration: 1.0,
        render_velocity: render_count as f64,
        suspicious: render_count > 10,
    }
}

pub fn performance_event(
    session_id: &str,
    event_id: &str,
    timestamp: i64,
    metric_name: &str,
    value: f64,
    rating: Option<VitalRating>,
) -> Event {
    Event::Performance {
        header: header(session_id, event_id, timestamp),
        body: PerformanceBody {
            metric_name: metric_name.to_string(),
            value,
            unit: "ms".to_string(),
            rating,
            element: None,
        },
    }
}

pub fn dom_snapshot_event(session_id: &str, event_id: &str, timestamp: i64, url: &str) -> Event {
    Event::DomSnapshot {
        header: header(session_id, event_id, timestamp),
        body: DomSnapshotBody {
            url: url.to_string(),
            html: "<html></html>".to_string(),
            viewport: Viewport { width: 1280, height: 720 },
            scroll_position: ScrollPosition { x: 0.0, y: 0.0 },
            element_count: 10,
            truncated: false,
        },
    }
}
