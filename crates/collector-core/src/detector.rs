//! Issue detector (C6): a pure function from an event window to a ranked
//! list of issues. Stateless across calls; callers pass whatever window
//! they want scanned. Calling it twice with the same window
//! always yields the same result.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::event::{ConsoleLevel, Event, VitalRating};
use crate::normalize::endpoint_key;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Issue {
    pub severity: Severity,
    pub pattern: String,
    pub title: String,
    pub description: String,
    pub evidence: Evidence,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Evidence {
    pub first_event_id: String,
    pub last_event_id: String,
    pub count: usize,
}

/// Runs every window-local rule (everything in the §4.6 table except API
/// degradation, which folds the whole ring rather than a window) over
/// `events` and returns issues sorted by severity descending, then by the
/// evidence's first-occurrence timestamp ascending. `events` need not be
/// pre-sorted; rules that care about time order sort their own working
/// copy.
pub fn detect(events: &[Event]) -> Vec<Issue> {
    let mut issues = Vec::new();
    issues.extend(failed_requests(events));
    issues.extend(slow_requests(events));
    issues.extend(request_storms(events));
    issues.extend(error_spam(events));
    issues.extend(high_error_rate(events));
    issues.extend(slow_queries(events));
    issues.extend(n_plus_one(events));
    issues.extend(render_suspicion(events));
    issues.extend(poor_web_vitals(events));
    rank(events, issues)
}

/// The full §4.6 rule table, including the API-discovery engine's
/// regression rule (§4.7); this is the operation the `detect_issues`
/// tool surface (§6) names. Kept separate from [`detect`] so the latter
/// stays a narrow, independently-testable pure function per rule, while
/// this is the one callers reaching for "every issue" should use.
pub fn detect_issues(events: &[Event]) -> Vec<Issue> {
    let mut issues = detect(events);
    issues.extend(crate::api_discovery::detect_regressions(events));
    rank(events, issues)
}

fn rank(events: &[Event], issues: Vec<Issue>) -> Vec<Issue> {
    let first_seen_ts = |issue: &Issue| -> i64 {
        events
            .iter()
            .find(|e| e.event_id() == issue.evidence.first_event_id)
            .map(|e| e.timestamp())
            .unwrap_or(i64::MAX)
    };
    let mut ranked: Vec<(i64, Issue)> = issues.into_iter().map(|i| (first_seen_ts(&i), i)).collect();
    ranked.sort_by(|(ts_a, a), (ts_b, b)| b.severity.cmp(&a.severity).then_with(|| ts_a.cmp(ts_b)));
    ranked.into_iter().map(|(_, issue)| issue).collect()
}

fn failed_requests(events: &[Event]) -> Vec<Issue> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::Network { body, .. } if body.status >= 400 => {
                let severity = if body.status >= 500 { Severity::High } else { Severity::Medium };
                Some(Issue {
                    severity,
                    pattern: "failed-request".to_string(),
                    title: format!("{} {} failed", body.method, body.url),
                    description: format!("Request returned status {}", body.status),
                    evidence: Evidence {
                        first_event_id: e.event_id().to_string(),
                        last_event_id: e.event_id().to_string(),
                        count: 1,
                    },
                    suggestion: None,
                })
            }
            _ => None,
        })
        .collect()
}

fn slow_requests(events: &[Event]) -> Vec<Issue> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::Network { body, .. } if body.duration > 3000.0 => Some(Issue {
                severity: Severity::Medium,
                pattern: "slow-request".to_string(),
                title: format!("{} {} is slow", body.method, body.url),
                description: format!("Request took {:.0}ms", body.duration),
                evidence: Evidence {
                    first_event_id: e.event_id().to_string(),
                    last_event_id: e.event_id().to_string(),
                    count: 1,
                },
                suggestion: None,
            }),
            _ => None,
        })
        .collect()
}

/// Same `{method, normalized url}` more than 10 times within any 5s span.
fn request_storms(events: &[Event]) -> Vec<Issue> {
    let mut groups: HashMap<String, Vec<&Event>> = HashMap::new();
    for e in events {
        if let Event::Network { body, .. } = e {
            let key = endpoint_key(&body.method, &body.url);
            groups.entry(key).or_default().push(e);
        }
    }
    let mut issues = Vec::new();
    for (key, mut group) in groups {
        group.sort_by_key(|e| e.timestamp());
        if let Some((count, first, last)) = max_window_over(&group, 5_000, 10) {
            issues.push(Issue {
                severity: Severity::Medium,
                pattern: "request-storm".to_string(),
                title: format!("Request storm on {}", key),
                description: format!("{} requests to {} within 5s", count, key),
                evidence: Evidence {
                    first_event_id: first.event_id().to_string(),
                    last_event_id: last.event_id().to_string(),
                    count,
                },
                suggestion: Some("Check for a render loop or missing memoization".to_string()),
            });
        }
    }
    issues
}

fn error_spam(events: &[Event]) -> Vec<Issue> {
    let mut groups: HashMap<&str, Vec<&Event>> = HashMap::new();
    for e in events {
        if let Event::Console { body, .. } = e {
            if body.level == ConsoleLevel::Error {
                groups.entry(body.message.as_str()).or_default().push(e);
            }
        }
    }
    let mut issues = Vec::new();
    for (message, mut group) in groups {
        group.sort_by_key(|e| e.timestamp());
        if let Some((count, first, last)) = max_window_over(&group, 10_000, 5) {
            issues.push(Issue {
                severity: Severity::Medium,
                pattern: "error-spam".to_string(),
                title: "Repeated console error".to_string(),
                description: format!("\"{}\" logged {} times within 10s", message, count),
                evidence: Evidence {
                    first_event_id: first.event_id().to_string(),
                    last_event_id: last.event_id().to_string(),
                    count,
                },
                suggestion: None,
            });
        }
    }
    issues
}

fn high_error_rate(events: &[Event]) -> Vec<Issue> {
    let console: Vec<&Event> = events.iter().filter(|e| matches!(e, Event::Console { .. })).collect();
    if console.len() < 20 {
        return Vec::new();
    }
    let errors: Vec<&&Event> = console
        .iter()
        .filter(|e| matches!(e, Event::Console { body, .. } if body.level == ConsoleLevel::Error))
        .collect();
    let rate = errors.len() as f64 / console.len() as f64;
    if rate <= 0.2 {
        return Vec::new();
    }
    let mut sorted = console.clone();
    sorted.sort_by_key(|e| e.timestamp());
    vec![Issue {
        severity: Severity::High,
        pattern: "high-error-rate".to_string(),
        title: "High console error rate".to_string(),
        description: format!("{:.0}% of console output is errors ({} of {})", rate * 100.0, errors.len(), console.len()),
        evidence: Evidence {
            first_event_id: sorted.first().unwrap().event_id().to_string(),
            last_event_id: sorted.last().unwrap().event_id().to_string(),
            count: errors.len(),
        },
        suggestion: None,
    }]
}

fn slow_queries(events: &[Event]) -> Vec<Issue> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::Database { body, .. } if body.duration > 500.0 => Some(Issue {
                severity: Severity::Medium,
                pattern: "slow-query".to_string(),
                title: "Slow database query".to_string(),
                description: format!("Query took {:.0}ms: {}", body.duration, body.normalized_query),
                evidence: Evidence {
                    first_event_id: e.event_id().to_string(),
                    last_event_id: e.event_id().to_string(),
                    count: 1,
                },
                suggestion: None,
            }),
            _ => None,
        })
        .collect()
}

/// Same `normalizedQuery` executed more than 10 times within 2s from one
/// session.
fn n_plus_one(events: &[Event]) -> Vec<Issue> {
    let mut groups: HashMap<(&str, &str), Vec<&Event>> = HashMap::new();
    for e in events {
        if let Event::Database { header, body } = e {
            groups
                .entry((header.session_id.as_str(), body.normalized_query.as_str()))
                .or_default()
                .push(e);
        }
    }
    let mut issues = Vec::new();
    for ((_, query), mut group) in groups {
        group.sort_by_key(|e| e.timestamp());
        if let Some((count, first, last)) = max_window_over(&group, 2_000, 10) {
            issues.push(Issue {
                severity: Severity::High,
                pattern: "n-plus-one".to_string(),
                title: "Possible N+1 query".to_string(),
                description: format!("\"{}\" executed {} times within 2s", query, count),
                evidence: Evidence {
                    first_event_id: first.event_id().to_string(),
                    last_event_id: last.event_id().to_string(),
                    count,
                },
                suggestion: Some("Batch these queries or add eager loading".to_string()),
            });
        }
    }
    issues
}

fn render_suspicion(events: &[Event]) -> Vec<Issue> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::Render { body, .. } if !body.suspicious_components.is_empty() => Some(Issue {
                severity: Severity::Medium,
                pattern: "render-suspicion".to_string(),
                title: "Suspicious re-render pattern".to_string(),
                description: format!("Components re-rendering excessively: {}", body.suspicious_components.join(", ")),
                evidence: Evidence {
                    first_event_id: e.event_id().to_string(),
                    last_event_id: e.event_id().to_string(),
                    count: body.suspicious_components.len(),
                },
                suggestion: None,
            }),
            _ => None,
        })
        .collect()
}

fn poor_web_vitals(events: &[Event]) -> Vec<Issue> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::Performance { body, .. } if body.rating == Some(VitalRating::Poor) => Some(Issue {
                severity: Severity::Medium,
                pattern: "poor-web-vital".to_string(),
                title: format!("Poor {}", body.metric_name),
                description: format!("{} measured {:.1}{}", body.metric_name, body.value, body.unit),
                evidence: Evidence {
                    first_event_id: e.event_id().to_string(),
                    last_event_id: e.event_id().to_string(),
                    count: 1,
                },
                suggestion: None,
            }),
            _ => None,
        })
        .collect()
}

/// Returns `(count, first, last)` for the largest run within any
/// `window_ms` span that exceeds `threshold`, scanning `sorted` (already
/// ordered ascending by timestamp) with a sliding-window two-pointer pass.
fn max_window_over<'a>(
    sorted: &[&'a Event],
    window_ms: i64,
    threshold: usize,
) -> Option<(usize, &'a Event, &'a Event)> {
    let mut best: Option<(usize, &Event, &Event)> = None;
    let mut start = 0;
    for end in 0..sorted.len() {
        while sorted[end].timestamp() - sorted[start].timestamp() > window_ms {
            start += 1;
        }
        let count = end - start + 1;
        if count > threshold {
            let candidate = (count, sorted[start], sorted[end]);
            if best.map(|(c, ..)| candidate.0 > c).unwrap_or(true) {
                best = Some(candidate);
            }
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures::*;

    #[test]
    fn n_plus_one_fires_for_twelve_identical_queries_in_one_second() {
        // S4.
        let events: Vec<Event> = (0..12)
            .map(|i| database_event("s1", &format!("e{i}"), i * 50, "SELECT * FROM users WHERE id = ?", 5.0))
            .collect();
        let issues = detect(&events);
        let n_plus_one: Vec<&Issue> = issues.iter().filter(|i| i.pattern == "n-plus-one").collect();
        assert_eq!(n_plus_one.len(), 1);
        assert_eq!(n_plus_one[0].severity, Severity::High);
        assert_eq!(n_plus_one[0].evidence.count, 12);
    }

    #[test]
    fn failed_request_severity_depends_on_status() {
        let events = vec![
            network_event("s1", "e1", 1, "GET", "/x", 404, 10.0),
            network_event("s1", "e2", 2, "GET", "/y", 503, 10.0),
        ];
        let issues = detect(&events);
        let by_id = |id: &str| issues.iter().find(|i| i.evidence.first_event_id == id).unwrap();
        assert_eq!(by_id("e1").severity, Severity::Medium);
        assert_eq!(by_id("e2").severity, Severity::High);
    }

    #[test]
    fn detect_is_pure_for_the_same_input() {
        // Calling detect twice with the same input must agree.
        let events = vec![network_event("s1", "e1", 1, "GET", "/x", 500, 10.0)];
        assert_eq!(detect(&events), detect(&events));
    }

    #[test]
    fn high_error_rate_requires_minimum_sample_size() {
        let mut events = Vec::new();
        for i in 0..5 {
            events.push(console_event("s1", &format!("e{i}"), i, "boom"));
        }
        // Only 5 console events total; rule requires >= 20 samples.
        assert!(detect(&events).iter().all(|i| i.pattern != "high-error-rate"));
    }

    #[test]
    fn poor_web_vital_tolerates_missing_rating_elsewhere() {
        let events = vec![
            performance_event("s1", "e1", 1, "LCP", 5000.0, Some(VitalRating::Poor)),
            performance_event("s1", "e2", 2, "server.ttfb", 50.0, None),
        ];
        let issues = detect(&events);
        assert_eq!(issues.iter().filter(|i| i.pattern == "poor-web-vital").count(), 1);
    }

    #[test]
    fn severity_ordering_places_high_before_medium() {
        let events = vec![
            network_event("s1", "slow", 1, "GET", "/slow", 200, 4000.0),
            network_event("s1", "fail", 2, "GET", "/fail", 500, 10.0),
        ];
        let issues = detect(&events);
        assert_eq!(issues[0].evidence.first_event_id, "fail");
    }

    #[test]
    fn detect_issues_folds_in_api_degradation_alongside_window_rules() {
        // S5, reached through the combined entry point rather than
        // api_discovery::detect_regressions directly.
        let mut events = vec![network_event("s1", "fail", 0, "GET", "/boom", 500, 10.0)];
        for i in 0..20 {
            events.push(network_event("s1", &format!("base{i}"), i + 1, "GET", "/api/users/123", 200, 50.0));
        }
        for i in 0..20 {
            events.push(network_event("s1", &format!("recent{i}"), 1000 + i, "GET", "/api/users/123", 200, 500.0));
        }
        let issues = detect_issues(&events);
        assert!(issues.iter().any(|i| i.pattern == "api-degradation"));
        assert!(issues.iter().any(|i| i.pattern == "failed-request"));
    }
}
