//! Tool boundary
//!
//! Every tool the workflow can invoke has exactly one parameter type and one
//! result type. [`ToolRequest`] and [`ToolResponse`] are the tagged unions an
//! orchestrator sees; [`ToolCall`] ties each parameter type to its result so
//! handlers get typed values back.

mod dispatcher;
mod types;

#[cfg(test)]
mod tests;

pub use dispatcher::{ToolCallRecord, ToolDispatcher, ToolOutcome};
pub use types::{
    AnalysisResult, AnalyzeParams, BuildParams, BuildPreview, BuildResult, DeployParams,
    DeployResult, DockerfileParams, DockerfileResult, HealthParams, HealthReport, ManifestParams,
    ManifestsResult, PreflightParams, PreflightReport, PushParams, PushResult, RollbackParams,
    RollbackResult, ScanParams, ScanResult,
};

use async_trait::async_trait;
use conkit_core::{CallContext, ToolError};
use serde::{Deserialize, Serialize};

/// Tool invocation, tagged by tool name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "tool", content = "params", rename_all = "snake_case")]
pub enum ToolRequest {
    /// Environment checks before the pipeline starts
    PreflightCheck(PreflightParams),
    /// Detect language, framework and port
    AnalyzeRepository(AnalyzeParams),
    /// Produce a Dockerfile
    GenerateDockerfile(DockerfileParams),
    /// Build (or preview) the image
    BuildImage(BuildParams),
    /// Push to a registry
    PushImage(PushParams),
    /// Vulnerability scan
    ScanImage(ScanParams),
    /// Produce Kubernetes manifests
    GenerateManifests(ManifestParams),
    /// Apply manifests to a cluster
    DeployKubernetes(DeployParams),
    /// Check rollout health
    CheckHealth(HealthParams),
    /// Roll back to an earlier image
    RollbackDeployment(RollbackParams),
}

/// Tool result, tagged by tool name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "tool", content = "result", rename_all = "snake_case")]
pub enum ToolResponse {
    /// `preflight_check` result
    PreflightCheck(PreflightReport),
    /// `analyze_repository` result
    AnalyzeRepository(AnalysisResult),
    /// `generate_dockerfile` result
    GenerateDockerfile(DockerfileResult),
    /// `build_image` result
    BuildImage(BuildResult),
    /// `push_image` result
    PushImage(PushResult),
    /// `scan_image` result
    ScanImage(ScanResult),
    /// `generate_manifests` result
    GenerateManifests(ManifestsResult),
    /// `deploy_kubernetes` result
    DeployKubernetes(DeployResult),
    /// `check_health` result
    CheckHealth(HealthReport),
    /// `rollback_deployment` result
    RollbackDeployment(RollbackResult),
}

impl ToolRequest {
    /// Wire name of the tool
    #[must_use]
    pub fn tool_name(&self) -> &'static str {
        match self {
            Self::PreflightCheck(_) => "preflight_check",
            Self::AnalyzeRepository(_) => "analyze_repository",
            Self::GenerateDockerfile(_) => "generate_dockerfile",
            Self::BuildImage(_) => "build_image",
            Self::PushImage(_) => "push_image",
            Self::ScanImage(_) => "scan_image",
            Self::GenerateManifests(_) => "generate_manifests",
            Self::DeployKubernetes(_) => "deploy_kubernetes",
            Self::CheckHealth(_) => "check_health",
            Self::RollbackDeployment(_) => "rollback_deployment",
        }
    }
}

impl ToolResponse {
    /// Wire name of the tool that produced this result
    #[must_use]
    pub fn tool_name(&self) -> &'static str {
        match self {
            Self::PreflightCheck(_) => "preflight_check",
            Self::AnalyzeRepository(_) => "analyze_repository",
            Self::GenerateDockerfile(_) => "generate_dockerfile",
            Self::BuildImage(_) => "build_image",
            Self::PushImage(_) => "push_image",
            Self::ScanImage(_) => "scan_image",
            Self::GenerateManifests(_) => "generate_manifests",
            Self::DeployKubernetes(_) => "deploy_kubernetes",
            Self::CheckHealth(_) => "check_health",
            Self::RollbackDeployment(_) => "rollback_deployment",
        }
    }
}

/// Error for a result whose variant does not belong to the request
pub fn unexpected_response(expected: &str, got: &ToolResponse) -> ToolError {
    ToolError::new(
        expected,
        "unexpected_response",
        format!(
            "orchestrator answered {} with a {} result",
            expected,
            got.tool_name()
        ),
        false,
    )
}

/// A parameter type bound to its tool and result type
pub trait ToolCall: Into<ToolRequest> + Send {
    /// Typed result
    type Output: Send;

    /// Wire name of the tool
    const NAME: &'static str;

    /// Pull the typed result out of a response, `None` on a variant mismatch
    fn extract(response: ToolResponse) -> Option<Self::Output>;
}

macro_rules! tool_call {
    ($params:ty => $variant:ident($output:ty), $name:literal) => {
        impl From<$params> for ToolRequest {
            fn from(params: $params) -> Self {
                ToolRequest::$variant(params)
            }
        }

        impl ToolCall for $params {
            type Output = $output;
            const NAME: &'static str = $name;

            fn extract(response: ToolResponse) -> Option<$output> {
                match response {
                    ToolResponse::$variant(output) => Some(output),
                    _ => None,
                }
            }
        }
    };
}

tool_call!(PreflightParams => PreflightCheck(PreflightReport), "preflight_check");
tool_call!(AnalyzeParams => AnalyzeRepository(AnalysisResult), "analyze_repository");
tool_call!(DockerfileParams => GenerateDockerfile(DockerfileResult), "generate_dockerfile");
tool_call!(BuildParams => BuildImage(BuildResult), "build_image");
tool_call!(PushParams => PushImage(PushResult), "push_image");
tool_call!(ScanParams => ScanImage(ScanResult), "scan_image");
tool_call!(ManifestParams => GenerateManifests(ManifestsResult), "generate_manifests");
tool_call!(DeployParams => DeployKubernetes(DeployResult), "deploy_kubernetes");
tool_call!(HealthParams => CheckHealth(HealthReport), "check_health");
tool_call!(RollbackParams => RollbackDeployment(RollbackResult), "rollback_deployment");

/// Executes tools on behalf of a session
///
/// Implementations must be safe to call concurrently for different sessions.
/// A failure is a [`ToolError`] value; `retryable` marks failures worth
/// trying again.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ToolOrchestrator: Send + Sync {
    /// Run one tool
    async fn execute_tool(
        &self,
        ctx: &CallContext,
        request: ToolRequest,
        session_id: &str,
    ) -> Result<ToolResponse, ToolError>;
}
