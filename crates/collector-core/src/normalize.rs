//! Query and URL normalization used as equivalence keys by the issue
//! detector (C6, N+1 rule) and the API-discovery engine (C7, endpoint
//! key derivation).

use once_cell::sync::Lazy;
use regex::Regex;

static STRING_LITERAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"'[^']*'|\"[^\"]*\"").unwrap());
static NUMBER_LITERAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\d+(\.\d+)?\b").unwrap());
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static UUID_SEGMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$").unwrap()
});
static NUMERIC_SEGMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+$").unwrap());

/// Replaces string and numeric literals with `?` and collapses
/// whitespace, producing a stable equivalence key for otherwise-identical
/// queries. Idempotent: `normalize_query(normalize_query(q)) == normalize_query(q)`.
pub fn normalize_query(query: &str) -> String {
    let no_strings = STRING_LITERAL.replace_all(query, "?");
    let no_numbers = NUMBER_LITERAL.replace_all(&no_strings, "?");
    let collapsed = WHITESPACE.replace_all(&no_numbers, " ");
    collapsed.trim().to_string()
}

/// Extracts the table names a query touches. Deliberately ignorant of
/// whitespace formatting: `parse_tables_accessed` on the same query with
/// different whitespace returns the same set (in the same order of first
/// appearance).
pub fn parse_tables_accessed(query: &str) -> Vec<String> {
    static TABLE_REF: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"(?i)\b(?:from|join|into|update)\s+([a-zA-Z_][a-zA-Z0-9_\.]*)").unwrap()
    });
    let mut seen = std::collections::HashSet::new();
    let mut tables = Vec::new();
    for cap in TABLE_REF.captures_iter(query) {
        let table = cap[1].trim_matches('`').to_string();
        if seen.insert(table.clone()) {
            tables.push(table);
        }
    }
    tables
}

/// Derives the endpoint key's path template: numeric and UUID-shaped
/// segments become `:id`; the query string is dropped entirely.
pub fn path_template(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.split('/')
        .map(|segment| {
            if segment.is_empty() {
                segment.to_string()
            } else if NUMERIC_SEGMENT.is_match(segment) || UUID_SEGMENT.is_match(segment) {
                ":id".to_string()
            } else {
                segment.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// `METHOD + ' ' + pathTemplate`.
pub fn endpoint_key(method: &str, url: &str) -> String {
    format!("{} {}", method.to_uppercase(), path_template(url))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_is_idempotent() {
        let q = "SELECT * FROM users WHERE id = 123 AND name = 'bob'";
        let once = normalize_query(q);
        let twice = normalize_query(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn normalize_collapses_whitespace_and_literals() {
        let a = normalize_query("SELECT * FROM users WHERE id = 1");
        let b = normalize_query("SELECT  *   FROM users\nWHERE id   =   42");
        assert_eq!(a, b);
    }

    #[test]
    fn tables_accessed_ignores_whitespace_changes() {
        let a = parse_tables_accessed("SELECT * FROM users JOIN orders ON users.id = orders.user_id");
        let b = parse_tables_accessed("SELECT *\nFROM   users\nJOIN orders ON users.id=orders.user_id");
        assert_eq!(a, b);
        assert_eq!(a, vec!["users".to_string(), "orders".to_string()]);
    }

    #[test]
    fn path_template_replaces_numeric_and_uuid_segments() {
        assert_eq!(path_template("/api/users/123"), "/api/users/:id");
        assert_eq!(
            path_template("/api/orders/550e8400-e29b-41d4-a716-446655440000/items"),
            "/api/orders/:id/items"
        );
        assert_eq!(path_template("/api/users/123?active=true"), "/api/users/:id");
    }

    #[test]
    fn endpoint_key_joins_method_and_template() {
        assert_eq!(endpoint_key("get", "/api/users/123"), "GET /api/users/:id");
    }

    proptest::proptest! {
        #[test]
        fn normalize_query_is_idempotent_for_any_input(q in ".*") {
            let once = normalize_query(&q);
            let twice = normalize_query(&once);
            proptest::prop_assert_eq!(once, twice);
        }

        #[test]
        fn path_template_is_idempotent_for_any_path(segments in proptest::collection::vec("[a-zA-Z0-9_-]{0,8}", 0..6)) {
            let url = format!("/{}", segments.join("/"));
            let once = path_template(&url);
            let twice = path_template(&once);
            proptest::prop_assert_eq!(once, twice);
        }
    }

    #[test_case::test_case("/api/users/1" => "/api/users/:id"; "short numeric id")]
    #[test_case::test_case("/api/users/999999999" => "/api/users/:id"; "long numeric id")]
    #[test_case::test_case("/api/users/abc" => "/api/users/abc"; "non-numeric segment untouched")]
    #[test_case::test_case("/api/v1/users" => "/api/v1/users"; "version segment untouched")]
    fn path_template_table(url: &str) -> String {
        path_template(url)
    }
}
