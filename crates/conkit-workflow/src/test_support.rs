//! Fixtures shared by the workflow unit tests

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use conkit_core::{
    CallContext, ManifestEntry, MemoryStore, PersistenceError, RepositoryAnalysis, Result,
    RetryPolicy, SecurityScanSummary, SessionManager, SessionManagerConfig, SessionState,
    SessionStore, ToolError,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

use crate::engine::{WorkflowConfig, WorkflowEngine};
use crate::preferences::{MemoryPreferenceStore, UserPreferences};
use crate::tools::*;

/// Result every tool returns when nothing goes wrong
pub(crate) fn happy_response(request: &ToolRequest) -> ToolResponse {
    match request {
        ToolRequest::PreflightCheck(_) => ToolResponse::PreflightCheck(PreflightReport {
            passed: true,
            failures: Vec::new(),
        }),
        ToolRequest::AnalyzeRepository(_) => ToolResponse::AnalyzeRepository(RepositoryAnalysis {
            language: "go".to_string(),
            framework: Some("gin".to_string()),
            port: Some(8080),
            dependencies: vec!["github.com/gin-gonic/gin".to_string()],
            entry_points: vec!["main.go".to_string()],
            suggestions: Vec::new(),
        }),
        ToolRequest::GenerateDockerfile(_) => ToolResponse::GenerateDockerfile(DockerfileResult {
            content: "FROM golang:1.22\nCOPY . .\nRUN go build -o /app\nCMD [\"/app\"]\n"
                .to_string(),
            path: Some("Dockerfile".to_string()),
            validation: None,
        }),
        ToolRequest::BuildImage(p) => ToolResponse::BuildImage(BuildResult {
            image_id: "sha256:abc123".to_string(),
            image_ref: format!("{}:{}", p.image_name, p.tag),
            size_bytes: Some(25 * 1024 * 1024),
            logs: vec!["Step 1/4".to_string(), "Successfully built".to_string()],
            preview: p.dry_run.then(|| BuildPreview {
                base_image: "golang:1.22".to_string(),
                layers: 4,
                estimated_size_bytes: 25 * 1024 * 1024,
            }),
        }),
        ToolRequest::PushImage(p) => ToolResponse::PushImage(PushResult {
            image_ref: format!("{}/{}", p.registry, p.image_ref),
            digest: Some("sha256:def456".to_string()),
        }),
        ToolRequest::ScanImage(p) => ToolResponse::ScanImage(SecurityScanSummary {
            image_ref: p.image_ref.clone(),
            critical: 0,
            high: 1,
            medium: 2,
            low: 3,
            scanner: Some("trivy".to_string()),
            scanned_at: Utc::now(),
        }),
        ToolRequest::GenerateManifests(p) => ToolResponse::GenerateManifests(ManifestsResult {
            manifests: vec![
                ManifestEntry {
                    name: p.app_name.clone(),
                    kind: "Deployment".to_string(),
                    path: None,
                    content: format!("kind: Deployment\nmetadata:\n  name: {}\n", p.app_name),
                    applied: false,
                },
                ManifestEntry {
                    name: format!("{}-service", p.app_name),
                    kind: "Service".to_string(),
                    path: None,
                    content: "kind: Service\n".to_string(),
                    applied: false,
                },
            ],
        }),
        ToolRequest::DeployKubernetes(p) => ToolResponse::DeployKubernetes(DeployResult {
            resources: vec![format!("deployment/{}", p.app_name)],
            dry_run_preview: p.dry_run.then(|| "+ replicas: 1".to_string()),
            logs: vec!["deployment.apps configured".to_string()],
        }),
        ToolRequest::CheckHealth(_) => ToolResponse::CheckHealth(HealthReport {
            healthy: true,
            ready_replicas: 1,
            desired_replicas: 1,
            message: None,
        }),
        ToolRequest::RollbackDeployment(p) => ToolResponse::RollbackDeployment(RollbackResult {
            image_ref: p.image_ref.clone(),
        }),
    }
}

/// Orchestrator that answers every call through `script` and logs tool names
pub(crate) fn scripted<F>(script: F) -> (MockToolOrchestrator, Arc<Mutex<Vec<String>>>)
where
    F: Fn(&ToolRequest) -> std::result::Result<ToolResponse, ToolError> + Send + Sync + 'static,
{
    let calls = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&calls);
    let mut mock = MockToolOrchestrator::new();
    mock.expect_execute_tool().returning(move |_, request, _| {
        seen.lock().unwrap().push(request.tool_name().to_string());
        script(&request)
    });
    (mock, calls)
}

/// Orchestrator that always succeeds
pub(crate) fn happy() -> (MockToolOrchestrator, Arc<Mutex<Vec<String>>>) {
    scripted(|request| Ok(happy_response(request)))
}

/// Engine settings with millisecond delays
pub(crate) fn fast_config() -> WorkflowConfig {
    WorkflowConfig::new()
        .with_deployment_retries(3, Duration::from_millis(1))
        .with_tool_retry(
            RetryPolicy::new()
                .with_max_attempts(2)
                .with_initial_delay(Duration::from_millis(1))
                .with_max_delay(Duration::from_millis(5))
                .with_jitter(false),
        )
}

/// Session manager over `store` with workspaces in `temp`
pub(crate) fn manager(temp: &TempDir, store: Arc<dyn SessionStore>) -> Arc<SessionManager> {
    let config = SessionManagerConfig::new(temp.path().join("ws"));
    Arc::new(SessionManager::new(config, store).unwrap())
}

/// Engine over a memory store
pub(crate) fn engine_with(
    temp: &TempDir,
    orchestrator: MockToolOrchestrator,
    preferences: UserPreferences,
    config: WorkflowConfig,
) -> WorkflowEngine {
    engine_on(temp, Arc::new(MemoryStore::new()), orchestrator, preferences, config)
}

/// Engine over `store`
pub(crate) fn engine_on(
    temp: &TempDir,
    store: Arc<dyn SessionStore>,
    orchestrator: MockToolOrchestrator,
    preferences: UserPreferences,
    config: WorkflowConfig,
) -> WorkflowEngine {
    WorkflowEngine::new(
        manager(temp, store),
        Arc::new(orchestrator),
        Arc::new(MemoryPreferenceStore::new(preferences)),
        config,
    )
}

/// Preferences that run the whole pipeline unattended
pub(crate) fn autopilot_prefs() -> UserPreferences {
    UserPreferences {
        autopilot: true,
        skip_confirmations: true,
        registry: Some("registry.example.com".to_string()),
        ..UserPreferences::default()
    }
}

/// Memory store whose writes can be switched to fail
#[derive(Default)]
pub(crate) struct FlakyStore {
    inner: MemoryStore,
    fail_writes: AtomicBool,
}

impl FlakyStore {
    pub(crate) fn set_failing(&self, failing: bool) {
        self.fail_writes.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl SessionStore for FlakyStore {
    async fn save(&self, ctx: &CallContext, session: &SessionState) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(PersistenceError::Write("disk full".to_string()).into());
        }
        self.inner.save(ctx, session).await
    }

    async fn load(&self, ctx: &CallContext, session_id: &str) -> Result<SessionState> {
        self.inner.load(ctx, session_id).await
    }

    async fn delete(&self, ctx: &CallContext, session_id: &str) -> Result<bool> {
        self.inner.delete(ctx, session_id).await
    }

    async fn list(&self, ctx: &CallContext) -> Result<Vec<String>> {
        self.inner.list(ctx).await
    }

    async fn load_all(&self, ctx: &CallContext) -> Result<Vec<SessionState>> {
        self.inner.load_all(ctx).await
    }

    async fn cleanup_expired(&self, ctx: &CallContext, retention: ChronoDuration) -> Result<usize> {
        self.inner.cleanup_expired(ctx, retention).await
    }

    async fn close(&self) -> Result<()> {
        self.inner.close().await
    }

    fn backend_name(&self) -> &'static str {
        "flaky"
    }
}
