//! User preferences and where they come from

use async_trait::async_trait;
use conkit_core::{CallContext, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

/// Kubernetes resource requests and limits
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceLimits {
    /// CPU request, e.g. `100m`
    pub cpu_request: Option<String>,
    /// CPU limit
    pub cpu_limit: Option<String>,
    /// Memory request, e.g. `128Mi`
    pub memory_request: Option<String>,
    /// Memory limit
    pub memory_limit: Option<String>,
}

impl ResourceLimits {
    /// Whether nothing is set
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cpu_request.is_none()
            && self.cpu_limit.is_none()
            && self.memory_request.is_none()
            && self.memory_limit.is_none()
    }
}

/// Preferences applied to a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserPreferences {
    /// Target namespace
    pub namespace: String,
    /// Replica count
    pub replicas: u32,
    /// Kubernetes service type
    pub service_type: String,
    /// Dockerfile optimization goal
    pub optimization: String,
    /// Base image override
    pub base_image: Option<String>,
    /// Build platform
    pub platform: Option<String>,
    /// Extra build args
    pub build_args: BTreeMap<String, String>,
    /// Preferred registry host
    pub registry: Option<String>,
    /// Skip dry-run previews and confirmations
    pub skip_confirmations: bool,
    /// Offer rollback first when a deployment fails
    pub auto_rollback: bool,
    /// Advance through stages without waiting for input
    pub autopilot: bool,
    /// Generate liveness/readiness probes
    pub health_checks: bool,
    /// Requests and limits
    pub resources: ResourceLimits,
}

impl Default for UserPreferences {
    fn default() -> Self {
        Self {
            namespace: "default".to_string(),
            replicas: 1,
            service_type: "ClusterIP".to_string(),
            optimization: "balanced".to_string(),
            base_image: None,
            platform: None,
            build_args: BTreeMap::new(),
            registry: None,
            skip_confirmations: false,
            auto_rollback: true,
            autopilot: false,
            health_checks: true,
            resources: ResourceLimits::default(),
        }
    }
}

/// Source of default preferences for new conversations
#[async_trait]
pub trait PreferenceStore: Send + Sync {
    /// Defaults for `user_id`, or global defaults when unknown
    async fn load(&self, ctx: &CallContext, user_id: Option<&str>) -> Result<UserPreferences>;

    /// Remember preferences for `user_id`
    async fn save(&self, ctx: &CallContext, user_id: &str, prefs: UserPreferences) -> Result<()>;
}

/// In-process preference store seeded with fixed defaults
#[derive(Debug, Default)]
pub struct MemoryPreferenceStore {
    defaults: UserPreferences,
    users: RwLock<HashMap<String, UserPreferences>>,
}

impl MemoryPreferenceStore {
    /// Store handing out `defaults` to unknown users
    #[must_use]
    pub fn new(defaults: UserPreferences) -> Self {
        Self {
            defaults,
            users: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl PreferenceStore for MemoryPreferenceStore {
    async fn load(&self, ctx: &CallContext, user_id: Option<&str>) -> Result<UserPreferences> {
        ctx.check("load preferences")?;
        let users = self.users.read().await;
        Ok(user_id
            .and_then(|id| users.get(id))
            .cloned()
            .unwrap_or_else(|| self.defaults.clone()))
    }

    async fn save(&self, ctx: &CallContext, user_id: &str, prefs: UserPreferences) -> Result<()> {
        ctx.check("save preferences")?;
        self.users.write().await.insert(user_id.to_string(), prefs);
        Ok(())
    }
}
