//! Event store (C2): one ring per event tag, with a typed query API.
//!
//! Ingestion takes the relevant ring's lock for the duration of one
//! append; queries copy the ring's current slice under lock and then
//! filter outside it.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use chrono::Utc;

use crate::error::{CollectorError, Result};
use crate::event::{ConsoleLevel, DbOperation, Event, EventKind};
use crate::ring::RingLog;
use crate::session::SessionInfo;

const DEFAULT_RING_CAPACITY: usize = 10_000;

/// A ring plus the set of event-ids currently held in it, so duplicate
/// `eventId`s within one ring can be rejected in O(1) without scanning.
struct Dedup {
    ring: RingLog<Event>,
    ids: HashSet<String>,
}

impl Dedup {
    fn new(capacity: usize) -> Self {
        Self {
            ring: RingLog::new(capacity),
            ids: HashSet::new(),
        }
    }

    /// Returns `true` if the event was inserted, `false` if it was a
    /// duplicate of an id already present in this ring.
    fn insert(&mut self, event: Event) -> bool {
        if self.ids.contains(event.event_id()) {
            return false;
        }
        self.ids.insert(event.event_id().to_string());
        if let Some(evicted) = self.ring.push(event) {
            self.ids.remove(evicted.event_id());
        }
        true
    }

    fn snapshot(&self) -> Vec<Event> {
        self.ring.iter().cloned().collect()
    }

    fn len(&self) -> usize {
        self.ring.len()
    }

    fn clear(&mut self) {
        self.ring.clear();
        self.ids.clear();
    }
}

/// Time-window filter shared by every query: retains events whose
/// `timestamp >= now - sinceSeconds*1000`.
#[derive(Debug, Clone, Default)]
pub struct TimeFilter {
    pub since_seconds: Option<i64>,
}

impl TimeFilter {
    fn cutoff_ms(&self) -> Option<i64> {
        self.since_seconds
            .map(|s| Utc::now().timestamp_millis() - s * 1000)
    }

    fn keep(&self, ts: i64) -> bool {
        self.cutoff_ms().map(|cutoff| ts >= cutoff).unwrap_or(true)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConsoleFilter {
    pub since_seconds: Option<i64>,
    pub level: Option<ConsoleLevel>,
    pub search: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct NetworkFilter {
    pub since_seconds: Option<i64>,
    pub method: Option<String>,
    pub search: Option<String>,
    pub status_min: Option<u16>,
    pub status_max: Option<u16>,
    pub min_duration: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct DatabaseFilter {
    pub since_seconds: Option<i64>,
    pub operation: Option<DbOperation>,
    pub search: Option<String>,
    pub min_duration: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct RenderFilter {
    pub since_seconds: Option<i64>,
    pub search: Option<String>,
}

/// Per-type ring capacities; all default to 10,000.
#[derive(Debug, Clone)]
pub struct StoreCapacities {
    pub session: usize,
    pub network: usize,
    pub console: usize,
    pub state: usize,
    pub render: usize,
    pub performance: usize,
    pub database: usize,
    pub dom_snapshot: usize,
    pub recon: usize,
}

impl Default for StoreCapacities {
    fn default() -> Self {
        Self {
            session: DEFAULT_RING_CAPACITY,
            network: DEFAULT_RING_CAPACITY,
            console: DEFAULT_RING_CAPACITY,
            state: DEFAULT_RING_CAPACITY,
            render: DEFAULT_RING_CAPACITY,
            performance: DEFAULT_RING_CAPACITY,
            database: DEFAULT_RING_CAPACITY,
            dom_snapshot: DEFAULT_RING_CAPACITY,
            recon: DEFAULT_RING_CAPACITY,
        }
    }
}

/// Per-session info joined with event counts, as returned by
/// `getSessionInfo`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SessionInfoWithCounts {
    #[serde(flatten)]
    pub info: SessionInfo,
    pub event_count: usize,
}

pub struct EventStore {
    capacities: StoreCapacities,
    session: Mutex<Dedup>,
    network: Mutex<Dedup>,
    console: Mutex<Dedup>,
    state: Mutex<Dedup>,
    render: Mutex<Dedup>,
    performance: Mutex<Dedup>,
    database: Mutex<Dedup>,
    dom_snapshot: Mutex<Dedup>,
    recon: Mutex<HashMap<String, Dedup>>,
    invalid_frame_count: std::sync::atomic::AtomicU64,
    invalid_event_count: std::sync::atomic::AtomicU64,
}

impl EventStore {
    pub fn new(capacities: StoreCapacities) -> Self {
        Self {
            session: Mutex::new(Dedup::new(capacities.session)),
            network: Mutex::new(Dedup::new(capacities.network)),
            console: Mutex::new(Dedup::new(capacities.console)),
            state: Mutex::new(Dedup::new(capacities.state)),
            render: Mutex::new(Dedup::new(capacities.render)),
            performance: Mutex::new(Dedup::new(capacities.performance)),
            database: Mutex::new(Dedup::new(capacities.database)),
            dom_snapshot: Mutex::new(Dedup::new(capacities.dom_snapshot)),
            recon: Mutex::new(HashMap::new()),
            capacities,
            invalid_frame_count: std::sync::atomic::AtomicU64::new(0),
            invalid_event_count: std::sync::atomic::AtomicU64::new(0),
        }
    }

    /// Classifies `event` by tag and pushes it into the matching ring.
    /// Rejects with `InvalidEvent` if the session id is empty; a decoded
    /// event with an unknown tag never reaches here (see
    /// `RawEventFrame::into_event`).
    pub fn add(&self, event: Event) -> Result<()> {
        if event.session_id().is_empty() {
            self.invalid_event_count
                .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            return Err(CollectorError::InvalidEvent);
        }
        match event.kind() {
            EventKind::Session => {
                self.session.lock().unwrap().insert(event);
            }
            EventKind::Network => {
                self.network.lock().unwrap().insert(event);
            }
            EventKind::Console => {
                self.console.lock().unwrap().insert(event);
            }
            EventKind::State => {
                self.state.lock().unwrap().insert(event);
            }
            EventKind::Render => {
                self.render.lock().unwrap().insert(event);
            }
            EventKind::Performance => {
                self.performance.lock().unwrap().insert(event);
            }
            EventKind::Database => {
                self.database.lock().unwrap().insert(event);
            }
            EventKind::DomSnapshot => {
                self.dom_snapshot.lock().unwrap().insert(event);
            }
            EventKind::Recon(category) => {
                let mut recon = self.recon.lock().unwrap();
                recon
                    .entry(category)
                    .or_insert_with(|| Dedup::new(self.capacities.recon))
                    .insert(event);
            }
        }
        Ok(())
    }

    pub fn record_invalid_frame(&self) {
        self.invalid_frame_count
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    }

    /// Counts a frame that decoded as JSON but named an unrecognized
    /// event tag or omitted a required field, distinct from
    /// `record_invalid_frame`, which counts frames that never decoded at
    /// all (see `collector_transport::protocol::DecodeOutcome`).
    pub fn record_invalid_event(&self) {
        self.invalid_event_count
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    }

    pub fn invalid_frame_count(&self) -> u64 {
        self.invalid_frame_count.load(std::sync::atomic::Ordering::Relaxed)
    }

    pub fn invalid_event_count(&self) -> u64 {
        self.invalid_event_count.load(std::sync::atomic::Ordering::Relaxed)
    }

    pub fn get_session_events(&self, filter: &TimeFilter) -> Vec<Event> {
        newest_first(self.session.lock().unwrap().snapshot(), filter)
    }

    pub fn get_network_requests(&self, filter: &NetworkFilter) -> Vec<Event> {
        let time = TimeFilter {
            since_seconds: filter.since_seconds,
        };
        let events = newest_first(self.network.lock().unwrap().snapshot(), &time);
        events
            .into_iter()
            .filter(|e| match e {
                Event::Network { body, .. } => {
                    filter
                        .method
                        .as_ref()
                        .map(|m| m.eq_ignore_ascii_case(&body.method))
                        .unwrap_or(true)
                        && filter
                            .search
                            .as_ref()
                            .map(|s| body.url.to_lowercase().contains(&s.to_lowercase()))
                            .unwrap_or(true)
                        && filter.status_min.map(|min| body.status >= min).unwrap_or(true)
                        && filter.status_max.map(|max| body.status <= max).unwrap_or(true)
                        && filter
                            .min_duration
                            .map(|min| body.duration >= min)
                            .unwrap_or(true)
                }
                _ => false,
            })
            .collect()
    }

    pub fn get_console_messages(&self, filter: &ConsoleFilter) -> Vec<Event> {
        let time = TimeFilter {
            since_seconds: filter.since_seconds,
        };
        let events = newest_first(self.console.lock().unwrap().snapshot(), &time);
        events
            .into_iter()
            .filter(|e| match e {
                Event::Console { body, .. } => {
                    filter.level.map(|l| l == body.level).unwrap_or(true)
                        && filter
                            .search
                            .as_ref()
                            .map(|s| body.message.to_lowercase().contains(&s.to_lowercase()))
                            .unwrap_or(true)
                }
                _ => false,
            })
            .collect()
    }

    pub fn get_state_changes(&self, filter: &TimeFilter) -> Vec<Event> {
        newest_first(self.state.lock().unwrap().snapshot(), filter)
    }

    pub fn get_render_profiles(&self, filter: &RenderFilter) -> Vec<Event> {
        let time = TimeFilter {
            since_seconds: filter.since_seconds,
        };
        let events = newest_first(self.render.lock().unwrap().snapshot(), &time);
        events
            .into_iter()
            .filter(|e| match e {
                Event::Render { body, .. } => filter
                    .search
                    .as_ref()
                    .map(|s| {
                        let needle = s.to_lowercase();
                        body.profiles
                            .iter()
                            .any(|p| p.component_name.to_lowercase().contains(&needle))
                    })
                    .unwrap_or(true),
                _ => false,
            })
            .collect()
    }

    pub fn get_performance_metrics(&self, filter: &TimeFilter) -> Vec<Event> {
        newest_first(self.performance.lock().unwrap().snapshot(), filter)
    }

    pub fn get_database_queries(&self, filter: &DatabaseFilter) -> Vec<Event> {
        let time = TimeFilter {
            since_seconds: filter.since_seconds,
        };
        let events = newest_first(self.database.lock().unwrap().snapshot(), &time);
        events
            .into_iter()
            .filter(|e| match e {
                Event::Database { body, .. } => {
                    filter.operation.map(|o| o == body.operation).unwrap_or(true)
                        && filter
                            .search
                            .as_ref()
                            .map(|s| body.query.to_lowercase().contains(&s.to_lowercase()))
                            .unwrap_or(true)
                        && filter
                            .min_duration
                            .map(|min| body.duration >= min)
                            .unwrap_or(true)
                }
                _ => false,
            })
            .collect()
    }

    pub fn get_dom_snapshots(&self, filter: &TimeFilter) -> Vec<Event> {
        newest_first(self.dom_snapshot.lock().unwrap().snapshot(), filter)
    }

    pub fn get_recon_events(&self, category: &str, filter: &TimeFilter) -> Vec<Event> {
        let recon = self.recon.lock().unwrap();
        match recon.get(category) {
            Some(dedup) => newest_first(dedup.snapshot(), filter),
            None => Vec::new(),
        }
    }

    /// Merges every ring (optionally restricted to `tags`) into a single
    /// stream sorted ascending by timestamp.
    pub fn get_event_timeline(&self, tags: Option<&[EventKind]>) -> Vec<Event> {
        let mut all = self.all_events_snapshot();
        if let Some(tags) = tags {
            all.retain(|e| tags.contains(&e.kind()));
        }
        all.sort_by_key(|e| e.timestamp());
        all
    }

    fn all_events_snapshot(&self) -> Vec<Event> {
        let mut all = Vec::new();
        all.extend(self.session.lock().unwrap().snapshot());
        all.extend(self.network.lock().unwrap().snapshot());
        all.extend(self.console.lock().unwrap().snapshot());
        all.extend(self.state.lock().unwrap().snapshot());
        all.extend(self.render.lock().unwrap().snapshot());
        all.extend(self.performance.lock().unwrap().snapshot());
        all.extend(self.database.lock().unwrap().snapshot());
        all.extend(self.dom_snapshot.lock().unwrap().snapshot());
        for dedup in self.recon.lock().unwrap().values() {
            all.extend(dedup.snapshot());
        }
        all
    }

    /// Joins session-registry snapshots with this store's per-session
    /// event counts.
    pub fn get_session_info(&self, sessions: &[SessionInfo]) -> Vec<SessionInfoWithCounts> {
        let all = self.all_events_snapshot();
        sessions
            .iter()
            .map(|info| {
                let event_count = all.iter().filter(|e| e.session_id() == info.session_id).count();
                SessionInfoWithCounts {
                    info: info.clone(),
                    event_count,
                }
            })
            .collect()
    }

    /// Sum of ring sizes across every type.
    pub fn event_count(&self) -> usize {
        self.session.lock().unwrap().len()
            + self.network.lock().unwrap().len()
            + self.console.lock().unwrap().len()
            + self.state.lock().unwrap().len()
            + self.render.lock().unwrap().len()
            + self.performance.lock().unwrap().len()
            + self.database.lock().unwrap().len()
            + self.dom_snapshot.lock().unwrap().len()
            + self
                .recon
                .lock()
                .unwrap()
                .values()
                .map(|d| d.len())
                .sum::<usize>()
    }

    pub fn clear(&self) {
        self.session.lock().unwrap().clear();
        self.network.lock().unwrap().clear();
        self.console.lock().unwrap().clear();
        self.state.lock().unwrap().clear();
        self.render.lock().unwrap().clear();
        self.performance.lock().unwrap().clear();
        self.database.lock().unwrap().clear();
        self.dom_snapshot.lock().unwrap().clear();
        self.recon.lock().unwrap().clear();
        self.invalid_frame_count.store(0, std::sync::atomic::Ordering::Relaxed);
        self.invalid_event_count.store(0, std::sync::atomic::Ordering::Relaxed);
    }
}

fn newest_first(mut events: Vec<Event>, filter: &TimeFilter) -> Vec<Event> {
    events.retain(|e| filter.keep(e.timestamp()));
    events.reverse();
    events
}
