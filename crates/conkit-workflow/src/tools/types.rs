//! Parameter and result payloads, one pair per tool

use conkit_core::session::{
    DockerfileValidation, ManifestEntry, RepositoryAnalysis, SecurityScanSummary,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::preferences::ResourceLimits;

/// `preflight_check` parameters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PreflightParams {
    /// Named checks to run; empty runs the orchestrator's default set
    #[serde(default)]
    pub checks: Vec<String>,
}

/// `preflight_check` result
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PreflightReport {
    /// Every check passed
    pub passed: bool,
    /// Failed check descriptions
    #[serde(default)]
    pub failures: Vec<String>,
}

/// `analyze_repository` parameters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalyzeParams {
    /// Remote repository
    pub repo_url: Option<String>,
    /// Local checkout
    pub repo_path: Option<String>,
    /// Branch to analyze
    pub branch: Option<String>,
}

/// `generate_dockerfile` parameters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DockerfileParams {
    /// Detected language
    pub language: String,
    /// Detected framework
    pub framework: Option<String>,
    /// Base image override
    pub base_image: Option<String>,
    /// Optimization goal (size, speed, security, balanced)
    pub optimization: String,
    /// Exposed port
    pub port: Option<u16>,
}

/// `generate_dockerfile` result
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DockerfileResult {
    /// Dockerfile text
    pub content: String,
    /// Where the orchestrator wrote it, if anywhere
    pub path: Option<String>,
    /// Lint findings
    pub validation: Option<DockerfileValidation>,
}

/// `build_image` parameters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildParams {
    /// Image repository name
    pub image_name: String,
    /// Image tag
    pub tag: String,
    /// Target platform, e.g. `linux/amd64`
    pub platform: Option<String>,
    /// `--build-arg` values
    #[serde(default)]
    pub build_args: BTreeMap<String, String>,
    /// Only report what the build would do
    #[serde(default)]
    pub dry_run: bool,
}

/// Preview returned by a dry-run build
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildPreview {
    /// Resolved base image
    pub base_image: String,
    /// Layer count
    pub layers: u32,
    /// Expected image size
    pub estimated_size_bytes: u64,
}

/// `build_image` result
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildResult {
    /// Local image id
    pub image_id: String,
    /// `name:tag` reference
    pub image_ref: String,
    /// Image size
    pub size_bytes: Option<u64>,
    /// Build output
    #[serde(default)]
    pub logs: Vec<String>,
    /// Set for dry runs
    pub preview: Option<BuildPreview>,
}

/// `push_image` parameters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PushParams {
    /// Local image reference
    pub image_ref: String,
    /// Target registry host
    pub registry: String,
}

/// `push_image` result
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PushResult {
    /// Fully qualified pushed reference
    pub image_ref: String,
    /// Content digest
    pub digest: Option<String>,
}

/// `scan_image` parameters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanParams {
    /// Image to scan
    pub image_ref: String,
}

/// `generate_manifests` parameters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ManifestParams {
    /// Application name (DNS label)
    pub app_name: String,
    /// Target namespace
    pub namespace: String,
    /// Image to run
    pub image_ref: String,
    /// Replica count
    pub replicas: u32,
    /// Service type
    pub service_type: String,
    /// Container port
    pub port: Option<u16>,
    /// Requests and limits
    pub resources: Option<ResourceLimits>,
    /// Add liveness/readiness probes
    #[serde(default)]
    pub health_checks: bool,
}

/// `generate_manifests` result
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ManifestsResult {
    /// Generated manifests
    pub manifests: Vec<ManifestEntry>,
}

/// `deploy_kubernetes` parameters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeployParams {
    /// Application name
    pub app_name: String,
    /// Target namespace
    pub namespace: String,
    /// Image to run
    pub image_ref: String,
    /// Server-side dry run only
    #[serde(default)]
    pub dry_run: bool,
    /// Block until pods are ready
    #[serde(default)]
    pub wait_for_ready: bool,
    /// Wait timeout
    pub timeout_seconds: u64,
}

/// `deploy_kubernetes` result
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeployResult {
    /// Applied resources, e.g. `deployment/web`
    #[serde(default)]
    pub resources: Vec<String>,
    /// Diff shown for dry runs
    pub dry_run_preview: Option<String>,
    /// Apply output
    #[serde(default)]
    pub logs: Vec<String>,
}

/// `check_health` parameters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthParams {
    /// Application name
    pub app_name: String,
    /// Namespace
    pub namespace: String,
    /// How long to wait for readiness
    pub timeout_seconds: u64,
}

/// `check_health` result
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    /// All replicas ready
    pub healthy: bool,
    /// Ready replicas
    pub ready_replicas: u32,
    /// Desired replicas
    pub desired_replicas: u32,
    /// Detail when unhealthy
    pub message: Option<String>,
}

/// `rollback_deployment` parameters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RollbackParams {
    /// Application name
    pub app_name: String,
    /// Namespace
    pub namespace: String,
    /// Image to roll back to
    pub image_ref: String,
}

/// `rollback_deployment` result
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RollbackResult {
    /// Image now running
    pub image_ref: String,
}

/// `analyze_repository` result
pub type AnalysisResult = RepositoryAnalysis;
/// `scan_image` result
pub type ScanResult = SecurityScanSummary;
