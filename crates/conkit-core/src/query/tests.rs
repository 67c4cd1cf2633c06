use super::*;
use crate::error::ToolError;
use crate::session::RepositoryAnalysis;
use chrono::Duration;
use std::path::PathBuf;

fn base_time() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

/// Session created `minutes` after the base time, accessed at the same moment
fn session_at(id: &str, minutes: i64, labels: &[&str]) -> SessionState {
    let mut s = SessionState::new(id, PathBuf::from("/tmp/ws").join(id), Duration::hours(1));
    let t = base_time() + Duration::minutes(minutes);
    s.created_at = t;
    s.last_accessed = t;
    s.expires_at = t + Duration::hours(1);
    for label in labels {
        s.add_label(*label);
    }
    s
}

fn ids(result: &QueryResult) -> Vec<&str> {
    result
        .sessions
        .iter()
        .map(|s| s.session_id.as_str())
        .collect()
}

#[test]
fn test_all_labels_is_conjunctive() {
    let sessions = vec![
        session_at("ab", 0, &["a", "b"]),
        session_at("a", 1, &["a"]),
        session_at("b", 2, &["b"]),
        session_at("abc", 3, &["a", "b", "c"]),
    ];
    let query = SessionQuery::new().with_labels(["a", "b"]);
    let result = query_sessions(&sessions, &query, base_time());

    assert_eq!(ids(&result), vec!["abc", "ab"]);
    assert_eq!(result.total, 2);
}

#[test]
fn test_any_labels_is_disjunctive() {
    let sessions = vec![
        session_at("ab", 0, &["a", "b"]),
        session_at("a", 1, &["a"]),
        session_at("b", 2, &["b"]),
        session_at("none", 3, &["c"]),
    ];
    let query = SessionQuery::new()
        .with_any_labels(["a", "b"])
        .sorted_by(SortBy::Created, SortOrder::Asc);
    let result = query_sessions(&sessions, &query, base_time());

    assert_eq!(ids(&result), vec!["ab", "a", "b"]);
}

#[test]
fn test_labels_and_any_labels_compose() {
    let sessions = vec![
        session_at("x", 0, &["env:prod", "team:a"]),
        session_at("y", 1, &["env:prod", "team:b"]),
        session_at("z", 2, &["env:dev", "team:a"]),
    ];
    let query = SessionQuery::new()
        .with_labels(["env:prod"])
        .with_any_labels(["team:a", "team:c"]);
    let result = query_sessions(&sessions, &query, base_time());
    assert_eq!(ids(&result), vec!["x"]);
}

#[test]
fn test_k8s_label_map_must_match_exactly() {
    let mut web = session_at("web", 0, &[]);
    web.k8s_labels.insert("app".into(), "web".into());
    web.k8s_labels.insert("tier".into(), "frontend".into());
    let mut api = session_at("api", 1, &[]);
    api.k8s_labels.insert("app".into(), "api".into());

    let sessions = vec![web, api];
    let query = SessionQuery::new().with_k8s_label("app", "web");
    assert_eq!(ids(&query_sessions(&sessions, &query, base_time())), vec!["web"]);

    let query = SessionQuery::new()
        .with_k8s_label("app", "web")
        .with_k8s_label("tier", "backend");
    assert!(query_sessions(&sessions, &query, base_time()).sessions.is_empty());
}

#[test]
fn test_time_ranges_are_inclusive() {
    let sessions: Vec<_> = (0..5)
        .map(|i| session_at(&format!("s{}", i), i * 10, &[]))
        .collect();

    let query = SessionQuery {
        created_after: Some(base_time() + Duration::minutes(10)),
        created_before: Some(base_time() + Duration::minutes(40)),
        sort_by: SortBy::Created,
        order: SortOrder::Asc,
        ..SessionQuery::default()
    };
    let result = query_sessions(&sessions, &query, base_time());
    assert_eq!(ids(&result), vec!["s1", "s2", "s3", "s4"]);

    let query = SessionQuery {
        created_after: Some(sessions[2].created_at),
        created_before: Some(sessions[2].created_at),
        ..SessionQuery::default()
    };
    let result = query_sessions(&sessions, &query, base_time());
    assert_eq!(ids(&result), vec!["s2"]);

    let query = SessionQuery {
        expires_before: Some(base_time() + Duration::minutes(70)),
        ..SessionQuery::default()
    };
    let result = query_sessions(&sessions, &query, base_time());
    assert_eq!(ids(&result), vec!["s1", "s0"]);
}

#[test]
fn test_state_predicates() {
    let mut failed = session_at("failed", 0, &[]);
    failed.last_error = Some(ToolError::new("build_image", "build_error", "boom", true));
    let mut busy = session_at("busy", 1, &[]);
    busy.start_job("job-1", "build_image");
    let mut analysed = session_at("analysed", 2, &[]);
    analysed.repo_analysis = Some(RepositoryAnalysis {
        language: "go".into(),
        ..RepositoryAnalysis::default()
    });
    analysed.repo_url = Some("https://github.com/acme/app".into());
    let sessions = vec![failed, busy, analysed];

    let q = SessionQuery {
        has_last_error: Some(true),
        ..SessionQuery::default()
    };
    assert_eq!(ids(&query_sessions(&sessions, &q, base_time())), vec!["failed"]);

    let q = SessionQuery {
        has_active_jobs: Some(true),
        ..SessionQuery::default()
    };
    assert_eq!(ids(&query_sessions(&sessions, &q, base_time())), vec!["busy"]);

    let q = SessionQuery {
        has_analysis: Some(false),
        sort_by: SortBy::Created,
        order: SortOrder::Asc,
        ..SessionQuery::default()
    };
    assert_eq!(
        ids(&query_sessions(&sessions, &q, base_time())),
        vec!["failed", "busy"]
    );

    let q = SessionQuery {
        repo_url: Some("https://github.com/acme/app".into()),
        ..SessionQuery::default()
    };
    assert_eq!(ids(&query_sessions(&sessions, &q, base_time())), vec!["analysed"]);
}

#[test]
fn test_status_predicate() {
    let live = session_at("live", 0, &[]);
    let mut over = session_at("over", 1, &[]);
    over.disk_usage = over.max_disk_usage + 1;
    let sessions = vec![live, over];

    // Two hours after base: both are past expiry, but quota wins for "over"
    let later = base_time() + Duration::hours(2);
    let q = SessionQuery::new().with_status(SessionStatus::Expired);
    assert_eq!(ids(&query_sessions(&sessions, &q, later)), vec!["live"]);

    let q = SessionQuery::new().with_status(SessionStatus::QuotaExceeded);
    assert_eq!(ids(&query_sessions(&sessions, &q, later)), vec!["over"]);

    let q = SessionQuery::new().with_status(SessionStatus::Active);
    assert_eq!(ids(&query_sessions(&sessions, &q, base_time())), vec!["live"]);
}

#[test]
fn test_default_sort_is_accessed_descending() {
    let mut sessions = vec![
        session_at("old", 0, &[]),
        session_at("mid", 5, &[]),
        session_at("new", 10, &[]),
    ];
    sessions[0].last_accessed = base_time() + Duration::minutes(20);

    let result = query_sessions(&sessions, &SessionQuery::new(), base_time());
    assert_eq!(ids(&result), vec!["old", "new", "mid"]);
}

#[test]
fn test_ties_break_by_id() {
    let sessions = vec![
        session_at("c", 0, &[]),
        session_at("a", 0, &[]),
        session_at("b", 0, &[]),
    ];
    let result = query_sessions(&sessions, &SessionQuery::new(), base_time());
    assert_eq!(ids(&result), vec!["a", "b", "c"]);
}

#[test]
fn test_pagination_returns_third_to_fifth() {
    let sessions: Vec<_> = (0..10)
        .map(|i| session_at(&format!("s{}", i), i, &[]))
        .collect();
    let query = SessionQuery::new()
        .sorted_by(SortBy::Created, SortOrder::Asc)
        .paginate(2, 3);
    let result = query_sessions(&sessions, &query, base_time());

    assert_eq!(ids(&result), vec!["s2", "s3", "s4"]);
    assert_eq!(result.total, 10);
    assert_eq!(result.offset, 2);
    assert_eq!(result.limit, Some(3));
    assert!(result.has_more());
}

#[test]
fn test_pagination_clamps() {
    let sessions: Vec<_> = (0..4)
        .map(|i| session_at(&format!("s{}", i), i, &[]))
        .collect();
    let asc = SessionQuery::new().sorted_by(SortBy::Created, SortOrder::Asc);

    // Fewer than limit available
    let result = query_sessions(&sessions, &asc.clone().paginate(2, 3), base_time());
    assert_eq!(ids(&result), vec!["s2", "s3"]);
    assert!(!result.has_more());

    // Zero or negative limit means unlimited
    let result = query_sessions(&sessions, &asc.clone().paginate(0, 0), base_time());
    assert_eq!(result.sessions.len(), 4);
    assert_eq!(result.limit, None);
    let result = query_sessions(&sessions, &asc.clone().paginate(1, -5), base_time());
    assert_eq!(result.sessions.len(), 3);

    // Negative offset is zero, offset past the end is empty
    let result = query_sessions(&sessions, &asc.clone().paginate(-3, 1), base_time());
    assert_eq!(ids(&result), vec!["s0"]);
    let result = query_sessions(&sessions, &asc.paginate(10, 2), base_time());
    assert!(result.sessions.is_empty());
    assert_eq!(result.offset, 4);
    assert_eq!(result.total, 4);
}

#[test]
fn test_query_deserializes_with_defaults() {
    let query: SessionQuery =
        serde_json::from_str(r#"{"labels":["a"],"sort_by":"created","order":"asc","limit":5}"#)
            .unwrap();
    assert_eq!(query.labels, vec!["a"]);
    assert_eq!(query.sort_by, SortBy::Created);
    assert_eq!(query.order, SortOrder::Asc);
    assert_eq!(query.offset, 0);
    assert_eq!(query.limit, 5);
    assert_eq!("expires".parse::<SortBy>().unwrap(), SortBy::Expires);
}
