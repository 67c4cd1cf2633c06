use super::*;

fn session(ttl_hours: i64) -> SessionState {
    SessionState::new("s1", PathBuf::from("/tmp/ws/s1"), Duration::hours(ttl_hours))
}

#[test]
fn test_new_session_invariants() {
    let s = session(DEFAULT_TTL_HOURS);
    assert!(s.expires_at > s.created_at);
    assert_eq!(s.created_at, s.last_accessed);
    assert_eq!(s.max_disk_usage, DEFAULT_MAX_DISK_USAGE);
    assert_eq!(s.status_at(Utc::now()), SessionStatus::Active);
}

#[test]
fn test_zero_ttl_still_expires_after_creation() {
    let s = SessionState::new("s1", PathBuf::from("/tmp"), Duration::zero());
    assert!(s.expires_at > s.created_at);
}

#[test]
fn test_touch_is_monotonic() {
    let mut s = session(1);
    let future = Utc::now() + Duration::hours(1);
    s.last_accessed = future;
    s.touch();
    assert_eq!(s.last_accessed, future);
}

#[test]
fn test_status_precedence() {
    let mut s = session(1);
    s.expires_at = Utc::now() - Duration::minutes(1);
    assert_eq!(s.status_at(Utc::now()), SessionStatus::Expired);

    s.max_disk_usage = 10;
    s.disk_usage = 11;
    assert_eq!(s.status_at(Utc::now()), SessionStatus::QuotaExceeded);
}

#[test]
fn test_job_lifecycle() {
    let mut s = session(1);
    s.start_job("job-1", "build_image");
    assert!(s.has_active_jobs());

    assert!(s.set_job_status("job-1", JobStatus::Completed, Some("ok".into()), None));
    let job = &s.active_jobs["job-1"];
    assert!(job.completed_at.is_some());
    assert!(job.duration_ms.is_some());
    assert!(!s.has_active_jobs());

    assert!(!s.set_job_status("missing", JobStatus::Failed, None, None));
}

#[test]
fn test_execution_history_is_bounded() {
    let mut s = session(1);
    for i in 0..(MAX_EXECUTION_HISTORY + 5) {
        s.begin_tool_execution(format!("exec-{i}"), "analyze_repository");
    }
    assert_eq!(s.execution_history.len(), MAX_EXECUTION_HISTORY);
    assert_eq!(s.execution_history[0].execution_id, "exec-5");
}

#[test]
fn test_finish_tool_execution_accumulates_tokens() {
    let mut s = session(1);
    s.begin_tool_execution("e1", "generate_dockerfile");
    s.begin_tool_execution("e2", "build_image");

    assert!(s.finish_tool_execution("e1", true, 120, None));
    assert!(s.finish_tool_execution("e2", false, 30, Some("exit 1".into())));
    assert_eq!(s.token_usage, 150);
    assert_eq!(s.execution_history[1].success, Some(false));
    assert!(!s.finish_tool_execution("nope", true, 1, None));
}

#[test]
fn test_logs_are_bounded() {
    let mut logs = Vec::new();
    SessionState::append_logs(&mut logs, (0..MAX_LOG_LINES + 10).map(|i| i.to_string()));
    assert_eq!(logs.len(), MAX_LOG_LINES);
    assert_eq!(logs[0], "10");
}

#[test]
fn test_labels_and_summary() {
    let mut s = session(1);
    assert!(s.add_label("env:prod"));
    assert!(!s.add_label("env:prod"));
    s.add_label("team:a");
    assert!(s.has_label("env:prod"));

    let summary = s.summary();
    assert_eq!(summary.labels, vec!["env:prod".to_string(), "team:a".to_string()]);
    assert!(s.remove_label("team:a"));
    assert!(!s.remove_label("team:a"));
}

#[test]
fn test_serde_round_trip_keeps_defaults() {
    let s = session(1);
    let json = serde_json::to_string(&s).unwrap();
    let back: SessionState = serde_json::from_str(&json).unwrap();
    assert_eq!(back, s);

    // Records written before optional fields existed still load.
    let minimal = serde_json::json!({
        "session_id": "old",
        "workspace_dir": "/tmp/old",
        "created_at": s.created_at,
        "last_accessed": s.last_accessed,
        "expires_at": s.expires_at,
    });
    let old: SessionState = serde_json::from_value(minimal).unwrap();
    assert_eq!(old.max_disk_usage, DEFAULT_MAX_DISK_USAGE);
    assert!(old.labels.is_empty());
}
