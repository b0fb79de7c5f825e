//! API-discovery engine (C7): folds `network` events into per-endpoint
//! statistics and flags p95 regressions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::detector::{Evidence, Issue, Severity};
use crate::event::Event;
use crate::normalize::endpoint_key;

/// Bounded reservoir of durations for one endpoint, capped at 1,000
/// samples. Kept sorted on insert (insertion-sort cost is fine at this
/// cap) so percentile reads are O(1) index lookups.
const SAMPLE_CAP: usize = 1_000;

#[derive(Debug, Clone)]
struct Reservoir {
    durations: Vec<f64>,
    seen: usize,
}

impl Reservoir {
    fn new() -> Self {
        Self {
            durations: Vec::new(),
            seen: 0,
        }
    }

    fn insert(&mut self, value: f64) {
        self.seen += 1;
        if self.durations.len() < SAMPLE_CAP {
            let idx = self.durations.partition_point(|d| *d <= value);
            self.durations.insert(idx, value);
        } else {
            // Reservoir-style replacement: evict a pseudo-random slot so
            // the bound sample doesn't calcify into only the oldest
            // readings once an endpoint is hot.
            let slot = self.seen % SAMPLE_CAP;
            self.durations.remove(slot);
            let idx = self.durations.partition_point(|d| *d <= value);
            self.durations.insert(idx, value);
        }
    }

    fn percentile(&self, p: f64) -> f64 {
        if self.durations.is_empty() {
            return 0.0;
        }
        let rank = ((p * (self.durations.len() - 1) as f64).round()) as usize;
        self.durations[rank.min(self.durations.len() - 1)]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointStats {
    pub method: String,
    pub path_template: String,
    pub sample_count: usize,
    pub avg_duration_ms: f64,
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
    pub error_rate: f64,
    pub last_seen_at: i64,
    pub statuses: BTreeMap<u16, usize>,
    pub graphql_operations: Vec<String>,
}

/// Builds one `EndpointStats` per distinct `{method, pathTemplate}` key
/// observed in `events`.
pub fn aggregate(events: &[Event]) -> BTreeMap<String, EndpointStats> {
    let mut reservoirs: BTreeMap<String, Reservoir> = BTreeMap::new();
    let mut stats: BTreeMap<String, EndpointStats> = BTreeMap::new();

    let mut network: Vec<&Event> = events.iter().filter(|e| matches!(e, Event::Network { .. })).collect();
    network.sort_by_key(|e| e.timestamp());

    for e in network {
        let Event::Network { body, .. } = e else { unreachable!() };
        let key = endpoint_key(&body.method, &body.url);
        let entry = stats.entry(key.clone()).or_insert_with(|| EndpointStats {
            method: body.method.to_uppercase(),
            path_template: crate::normalize::path_template(&body.url),
            sample_count: 0,
            avg_duration_ms: 0.0,
            p50: 0.0,
            p95: 0.0,
            p99: 0.0,
            error_rate: 0.0,
            last_seen_at: 0,
            statuses: BTreeMap::new(),
            graphql_operations: Vec::new(),
        });
        entry.sample_count += 1;
        entry.last_seen_at = e.timestamp();
        *entry.statuses.entry(body.status).or_insert(0) += 1;
        if let Some(gql) = &body.graphql {
            if !entry.graphql_operations.contains(&gql.name) {
                entry.graphql_operations.push(gql.name.clone());
            }
        }
        let reservoir = reservoirs.entry(key).or_insert_with(Reservoir::new);
        reservoir.insert(body.duration);
    }

    for (key, entry) in stats.iter_mut() {
        let reservoir = &reservoirs[key];
        let errors: usize = entry.statuses.iter().filter(|(code, _)| **code >= 400).map(|(_, n)| n).sum();
        entry.error_rate = errors as f64 / entry.sample_count as f64;
        entry.avg_duration_ms = reservoir.durations.iter().sum::<f64>() / reservoir.durations.len().max(1) as f64;
        entry.p50 = reservoir.percentile(0.50);
        entry.p95 = reservoir.percentile(0.95);
        entry.p99 = reservoir.percentile(0.99);
    }

    stats
}

/// Splits each endpoint's chronologically-ordered durations into an
/// older baseline half and a newer recent half and flags endpoints whose
/// recent p95 has regressed past both a relative and an absolute floor.
pub fn detect_regressions(events: &[Event]) -> Vec<Issue> {
    let mut by_endpoint: BTreeMap<String, Vec<&Event>> = BTreeMap::new();
    for e in events {
        if let Event::Network { body, .. } = e {
            by_endpoint.entry(endpoint_key(&body.method, &body.url)).or_default().push(e);
        }
    }

    let mut issues = Vec::new();
    for (key, mut group) in by_endpoint {
        group.sort_by_key(|e| e.timestamp());
        if group.len() < 20 {
            continue;
        }
        let mid = group.len() / 2;
        let (baseline, recent) = group.split_at(mid);
        let baseline_p95 = percentile_of(baseline, 0.95);
        let recent_p95 = percentile_of(recent, 0.95);
        if recent_p95 > baseline_p95 * 1.5 && recent_p95 > 200.0 {
            issues.push(Issue {
                severity: Severity::High,
                pattern: "api-degradation".to_string(),
                title: format!("{} has regressed", key),
                description: format!(
                    "p95 latency rose from {:.0}ms to {:.0}ms",
                    baseline_p95, recent_p95
                ),
                evidence: Evidence {
                    first_event_id: recent.first().unwrap().event_id().to_string(),
                    last_event_id: recent.last().unwrap().event_id().to_string(),
                    count: recent.len(),
                },
                suggestion: None,
            });
        }
    }
    issues
}

fn percentile_of(events: &[&Event], p: f64) -> f64 {
    let mut durations: Vec<f64> = events
        .iter()
        .filter_map(|e| match e {
            Event::Network { body, .. } => Some(body.duration),
            _ => None,
        })
        .collect();
    durations.sort_by(|a, b| a.partial_cmp(b).unwrap());
    if durations.is_empty() {
        return 0.0;
    }
    let rank = ((p * (durations.len() - 1) as f64).round()) as usize;
    durations[rank.min(durations.len() - 1)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures::*;

    #[test]
    fn aggregate_groups_by_method_and_path_template() {
        let events = vec![
            network_event("s1", "e1", 1, "GET", "/api/users/1", 200, 10.0),
            network_event("s1", "e2", 2, "GET", "/api/users/2", 200, 20.0),
        ];
        let stats = aggregate(&events);
        assert_eq!(stats.len(), 1);
        let entry = stats.get("GET /api/users/:id").unwrap();
        assert_eq!(entry.sample_count, 2);
    }

    #[test]
    fn error_rate_counts_4xx_and_5xx() {
        let events = vec![
            network_event("s1", "e1", 1, "GET", "/x", 200, 10.0),
            network_event("s1", "e2", 2, "GET", "/x", 500, 10.0),
        ];
        let stats = aggregate(&events);
        let entry = stats.get("GET /x").unwrap();
        assert_eq!(entry.error_rate, 0.5);
    }

    #[test]
    fn regression_detected_when_recent_p95_jumps() {
        // S5.
        let mut events = Vec::new();
        for i in 0..20 {
            events.push(network_event("s1", &format!("base{i}"), i, "GET", "/api/users/123", 200, 50.0));
        }
        for i in 0..20 {
            events.push(network_event("s1", &format!("recent{i}"), 1000 + i, "GET", "/api/users/123", 200, 500.0));
        }
        let issues = detect_regressions(&events);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].pattern, "api-degradation");
        assert_eq!(issues[0].evidence.count, 20);
    }

    #[test]
    fn regression_not_flagged_below_sample_floor() {
        let events = vec![network_event("s1", "e1", 1, "GET", "/x", 200, 900.0)];
        assert!(detect_regressions(&events).is_empty());
    }
}
