//! Session administration commands
//!
//! `conkit sessions list`: query persisted sessions
//! `conkit sessions show`: one session with its conversation
//! `conkit sessions delete`: remove record and workspace
//! `conkit sessions gc`: run one garbage collection sweep
//! `conkit sessions stats`: counts and disk usage
//! `conkit sessions label`: edit labels

use super::{ListArgs, SessionCommands};
use crate::config::AppConfig;
use anyhow::{Context, Result};
use chrono::Utc;
use conkit_core::utils::format_bytes;
use conkit_core::{
    format_error_for_cli, query_sessions, CallContext, SessionManager, SessionQuery,
    SessionState, SortOrder, StoreBackend,
};
use conkit_workflow::ConversationState;
use std::sync::Arc;

/// Turns shown by `sessions show`
const RECENT_TURNS: usize = 5;

/// Run a sessions subcommand.
pub async fn run(cmd: SessionCommands, config: &AppConfig) -> Result<()> {
    let ctx = CallContext::background();
    let manager = open_manager(&ctx, config).await?;

    let outcome = match cmd {
        SessionCommands::List(args) => list(&ctx, &manager, args).await,
        SessionCommands::Show { id, json } => show(&ctx, &manager, config, &id, json).await,
        SessionCommands::Delete { id, force } => delete(&ctx, &manager, &id, force).await,
        SessionCommands::Gc => gc(&ctx, &manager).await,
        SessionCommands::Stats { json } => stats(&manager, json).await,
        SessionCommands::Label {
            id,
            add,
            remove,
            k8s,
        } => label(&ctx, &manager, &id, add, remove, k8s).await,
    };

    if let Err(e) = manager.store().close().await {
        tracing::warn!(error = %e, "Failed to close session store");
    }
    outcome
}

// ── Helpers ──────────────────────────────────────────────────────────

/// Open the configured store and rehydrate live sessions
pub async fn open_manager(ctx: &CallContext, config: &AppConfig) -> Result<SessionManager> {
    let data_dir = config.data_dir();
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("Failed to create data directory {}", data_dir.display()))?;

    let store = StoreBackend::from_config(ctx, &config.sessions.store, &data_dir)
        .await
        .map_err(friendly)
        .context("Failed to open session store")?;
    let manager = SessionManager::new(config.manager_config(), Arc::new(store)).map_err(friendly)?;
    manager.load_existing(ctx).await.map_err(friendly)?;
    Ok(manager)
}

fn friendly(error: conkit_core::Error) -> anyhow::Error {
    anyhow::anyhow!(format_error_for_cli(&error).trim_end().to_string())
}

fn confirm(prompt: &str) -> bool {
    use std::io::{self, Write};
    print!("{prompt} [y/N] ");
    io::stdout().flush().ok();
    let mut input = String::new();
    if io::stdin().read_line(&mut input).is_ok() {
        matches!(input.trim(), "y" | "Y" | "yes" | "YES")
    } else {
        false
    }
}

fn to_query(args: &ListArgs) -> SessionQuery {
    let mut query = SessionQuery::new()
        .with_labels(args.labels.iter().cloned())
        .with_any_labels(args.any_labels.iter().cloned())
        .sorted_by(
            args.sort,
            if args.asc {
                SortOrder::Asc
            } else {
                SortOrder::Desc
            },
        )
        .paginate(args.offset, args.limit);
    for (key, value) in &args.k8s_labels {
        query = query.with_k8s_label(key, value);
    }
    if let Some(status) = args.status {
        query = query.with_status(status);
    }
    query.repo_url = args.repo_url.clone();
    query.has_last_error = args.has_error;
    query.has_active_jobs = args.has_active_jobs;
    query.created_after = args.created_after;
    query.created_before = args.created_before;
    query.accessed_after = args.accessed_after;
    query.accessed_before = args.accessed_before;
    query
}

// ── List ─────────────────────────────────────────────────────────────

async fn list(ctx: &CallContext, manager: &SessionManager, args: ListArgs) -> Result<()> {
    // Expired records stay queryable until the store purges them
    let records = manager.store().load_all(ctx).await.map_err(friendly)?;
    let query = to_query(&args);
    let now = Utc::now();
    let result = query_sessions(&records, &query, now);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result.summaries_at(now))?);
        return Ok(());
    }

    if result.sessions.is_empty() {
        println!("No sessions match.");
        return Ok(());
    }

    println!(
        "{:<34} {:<15} {:<20} {:<10} LABELS",
        "SESSION", "STATUS", "LAST ACCESSED", "DISK"
    );
    for summary in result.summaries_at(now) {
        println!(
            "{:<34} {:<15} {:<20} {:<10} {}",
            summary.session_id,
            summary.status.to_string(),
            summary.last_accessed.format("%Y-%m-%d %H:%M:%S"),
            format_bytes(summary.disk_usage),
            summary.labels.join(","),
        );
    }
    println!(
        "\nShowing {}-{} of {}{}",
        result.offset + 1,
        result.offset + result.sessions.len(),
        result.total,
        if result.has_more() {
            " (use --offset for more)"
        } else {
            ""
        }
    );
    Ok(())
}

// ── Show ─────────────────────────────────────────────────────────────

async fn find(ctx: &CallContext, manager: &SessionManager, id: &str) -> Result<SessionState> {
    match manager.get(id).await {
        Ok(session) => Ok(session),
        Err(_) => manager.store().load(ctx, id).await.map_err(friendly),
    }
}

async fn show(
    ctx: &CallContext,
    manager: &SessionManager,
    config: &AppConfig,
    id: &str,
    json: bool,
) -> Result<()> {
    let session = find(ctx, manager, id).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&session)?);
        return Ok(());
    }

    let summary = session.summary();
    println!("\nSession {}", summary.session_id);
    println!("─────────────────────────────────────────");
    println!("Status:         {}", summary.status);
    println!("Created:        {}", summary.created_at.to_rfc3339());
    println!("Last accessed:  {}", summary.last_accessed.to_rfc3339());
    println!("Expires:        {}", summary.expires_at.to_rfc3339());
    println!(
        "Disk:           {} of {}",
        format_bytes(session.disk_usage),
        format_bytes(session.max_disk_usage)
    );
    if let Some(repo) = session.repo_url.as_ref().or(session.repo_path.as_ref()) {
        println!("Repository:     {}", repo);
    }
    if let Some(analysis) = &session.repo_analysis {
        println!(
            "Analysis:       {}{}",
            analysis.language,
            analysis
                .framework
                .as_deref()
                .map(|f| format!(" / {}", f))
                .unwrap_or_default()
        );
    }
    if let Some(image) = &session.image_ref {
        println!("Image:          {}", image);
    }
    if let Some(deployment) = &session.deployment {
        println!(
            "Deployment:     {} ({})",
            deployment.namespace,
            if deployment.healthy { "healthy" } else { "not healthy" }
        );
    }
    if !summary.labels.is_empty() {
        println!("Labels:         {}", summary.labels.join(", "));
    }
    for (key, value) in &session.k8s_labels {
        println!("K8s label:      {}={}", key, value);
    }
    if summary.active_jobs > 0 {
        println!("Active jobs:    {}", summary.active_jobs);
    }
    if let Some(error) = &session.last_error {
        println!("Last error:     [{}] {}", error.tool, error.message);
    }

    let conversation = ConversationState::restore(&session, config.preferences.clone());
    println!("\nConversation");
    println!("─────────────────────────────────────────");
    println!(
        "Stage:          {} {}",
        conversation.stage,
        conversation.stage.progress_label().unwrap_or_default()
    );
    println!("Autopilot:      {}", if conversation.autopilot { "on" } else { "off" });
    println!("Turns:          {}", conversation.history.len());
    println!("Artifacts:      {}", conversation.artifacts.len());
    if let Some(pending) = &conversation.pending_decision {
        println!("Waiting on:     {}", pending.question);
    }
    let skip = conversation.history.len().saturating_sub(RECENT_TURNS);
    for turn in conversation.history.iter().skip(skip) {
        let first_line = turn.assistant_message.lines().next().unwrap_or_default();
        println!(
            "  [{}] {}{} -> {}",
            turn.stage,
            if turn.automatic { "(auto) " } else { "" },
            turn.user_input,
            first_line
        );
    }
    Ok(())
}

// ── Delete ───────────────────────────────────────────────────────────

async fn delete(ctx: &CallContext, manager: &SessionManager, id: &str, force: bool) -> Result<()> {
    if !force && !confirm(&format!("Delete session {} and its workspace?", id)) {
        println!("Cancelled.");
        return Ok(());
    }
    manager.delete(ctx, id).await.map_err(friendly)?;
    println!("Deleted session {}", id);
    Ok(())
}

// ── GC ───────────────────────────────────────────────────────────────

async fn gc(ctx: &CallContext, manager: &SessionManager) -> Result<()> {
    let report = manager.garbage_collect(ctx).await.map_err(friendly)?;
    println!("Expired sessions removed:   {}", report.expired_removed);
    println!("Orphan workspaces removed:  {}", report.orphan_workspaces_removed);
    println!("Store records purged:       {}", report.store_purged);
    if report.failures > 0 {
        println!("Failures (see logs):        {}", report.failures);
    }
    Ok(())
}

// ── Stats ────────────────────────────────────────────────────────────

async fn stats(manager: &SessionManager, json: bool) -> Result<()> {
    let stats = manager.stats().await;
    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("\nConkit Session Statistics");
    println!("─────────────────────────");
    println!("Backend:          {}", stats.store_backend);
    println!("Sessions:         {} / {}", stats.total_sessions, stats.max_sessions);
    println!("Active:           {}", stats.active_sessions);
    println!("Expired:          {}", stats.expired_sessions);
    println!("Failed:           {}", stats.failed_sessions);
    println!("Over quota:       {}", stats.quota_exceeded_sessions);
    println!("Average age:      {:.0}s", stats.average_age_seconds);
    println!("Disk usage:       {}", format_bytes(stats.total_disk_usage));
    Ok(())
}

// ── Label ────────────────────────────────────────────────────────────

async fn label(
    ctx: &CallContext,
    manager: &SessionManager,
    id: &str,
    add: Vec<String>,
    remove: Vec<String>,
    k8s: Vec<(String, String)>,
) -> Result<()> {
    if add.is_empty() && remove.is_empty() && k8s.is_empty() {
        anyhow::bail!("Nothing to change: pass --add, --remove or --k8s");
    }

    for label in &add {
        if manager.add_label(ctx, id, label).await.map_err(friendly)? {
            println!("+ {}", label);
        }
    }
    for label in &remove {
        if manager.remove_label(ctx, id, label).await.map_err(friendly)? {
            println!("- {}", label);
        }
    }
    for (key, value) in &k8s {
        manager
            .set_k8s_label(ctx, id, key, value)
            .await
            .map_err(friendly)?;
        println!("= {}={}", key, value);
    }

    let session = manager.get(id).await.map_err(friendly)?;
    let labels: Vec<&str> = session.labels.iter().map(String::as_str).collect();
    println!("Labels: {}", labels.join(", "));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use clap::Parser;
    use conkit_core::{SessionStatus, SortBy};

    fn list_args(argv: &[&str]) -> ListArgs {
        let mut full = vec!["conkit", "sessions", "list"];
        full.extend_from_slice(argv);
        match Cli::try_parse_from(full).unwrap().command {
            Some(Commands::Sessions(SessionCommands::List(args))) => args,
            other => panic!("unexpected command: {:?}", other),
        }
    }

    fn memory_config(temp: &tempfile::TempDir) -> AppConfig {
        let mut config = AppConfig {
            data_dir: Some(temp.path().display().to_string()),
            ..AppConfig::default()
        };
        config.sessions.store.backend = "memory".to_string();
        config
    }

    #[test]
    fn test_query_from_flags() {
        let args = list_args(&[
            "--label", "env:prod", "--any-label", "team:a", "--k8s", "app=web", "--status",
            "active", "--has-error", "false", "--offset", "2", "--limit", "0",
        ]);
        let query = to_query(&args);

        assert_eq!(query.labels, vec!["env:prod"]);
        assert_eq!(query.any_labels, vec!["team:a"]);
        assert_eq!(query.k8s_labels.get("app").map(String::as_str), Some("web"));
        assert_eq!(query.status, Some(SessionStatus::Active));
        assert_eq!(query.has_last_error, Some(false));
        assert_eq!(query.sort_by, SortBy::Accessed);
        assert_eq!(query.order, SortOrder::Desc);
        assert_eq!(query.offset, 2);
        assert_eq!(query.limit, 0);
    }

    #[tokio::test]
    async fn test_open_manager_and_label() {
        let temp = tempfile::TempDir::new().unwrap();
        let config = memory_config(&temp);
        let ctx = CallContext::background();

        let manager = open_manager(&ctx, &config).await.unwrap();
        assert_eq!(manager.store().backend_name(), "memory");
        manager.get_or_create(&ctx, Some("s1")).await.unwrap();

        label(
            &ctx,
            &manager,
            "s1",
            vec!["env:prod".to_string()],
            Vec::new(),
            vec![("app".to_string(), "web".to_string())],
        )
        .await
        .unwrap();

        let session = manager.get("s1").await.unwrap();
        assert!(session.has_label("env:prod"));
        assert_eq!(session.k8s_labels.get("app").map(String::as_str), Some("web"));
    }

    #[tokio::test]
    async fn test_label_requires_a_change() {
        let temp = tempfile::TempDir::new().unwrap();
        let config = memory_config(&temp);
        let ctx = CallContext::background();
        let manager = open_manager(&ctx, &config).await.unwrap();

        let err = label(&ctx, &manager, "s1", Vec::new(), Vec::new(), Vec::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Nothing to change"));
    }

    #[tokio::test]
    async fn test_forced_delete_of_unknown_session_fails() {
        let temp = tempfile::TempDir::new().unwrap();
        let config = memory_config(&temp);
        let ctx = CallContext::background();
        let manager = open_manager(&ctx, &config).await.unwrap();

        assert!(delete(&ctx, &manager, "missing", true).await.is_err());
    }
}
