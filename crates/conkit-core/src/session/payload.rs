//! Stage payloads stored on a session
//!
//! These are the typed results each pipeline stage leaves behind. Tool
//! responses carry the same types, so nothing crosses the orchestrator
//! boundary as an untyped map.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Result of analysing a repository
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepositoryAnalysis {
    /// Primary language, e.g. `go`, `python`
    pub language: String,
    /// Detected framework, if any
    #[serde(default)]
    pub framework: Option<String>,
    /// Port the application listens on
    #[serde(default)]
    pub port: Option<u16>,
    /// Declared dependencies
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Build or entry files that drove the analysis
    #[serde(default)]
    pub entry_points: Vec<String>,
    /// Free-text findings
    #[serde(default)]
    pub suggestions: Vec<String>,
}

/// Outcome of validating a Dockerfile
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DockerfileValidation {
    /// No blocking errors
    pub valid: bool,
    /// Blocking problems
    #[serde(default)]
    pub errors: Vec<String>,
    /// Non-blocking findings
    #[serde(default)]
    pub warnings: Vec<String>,
}

/// Dockerfile and image build state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DockerfileState {
    /// Generated Dockerfile text
    #[serde(default)]
    pub content: Option<String>,
    /// Path inside the workspace
    #[serde(default)]
    pub path: Option<String>,
    /// Image has been built
    #[serde(default)]
    pub built: bool,
    /// Image has been pushed
    #[serde(default)]
    pub pushed: bool,
    /// When the last successful build finished
    #[serde(default)]
    pub build_time: Option<DateTime<Utc>>,
    /// Image id reported by the builder
    #[serde(default)]
    pub image_id: Option<String>,
    /// Image size in bytes
    #[serde(default)]
    pub size_bytes: Option<u64>,
    /// Validation result for the current content
    #[serde(default)]
    pub validation: Option<DockerfileValidation>,
}

/// Vulnerability counts from an image scan
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityScanSummary {
    /// Scanned image
    pub image_ref: String,
    /// Critical findings
    pub critical: u32,
    /// High findings
    pub high: u32,
    /// Medium findings
    pub medium: u32,
    /// Low findings
    pub low: u32,
    /// Scanner that produced the report
    #[serde(default)]
    pub scanner: Option<String>,
    /// When the scan ran
    pub scanned_at: DateTime<Utc>,
}

impl SecurityScanSummary {
    /// Total number of findings
    #[must_use]
    pub fn total(&self) -> u32 {
        self.critical + self.high + self.medium + self.low
    }

    /// Whether the scan found anything critical or high
    #[must_use]
    pub fn has_blocking_findings(&self) -> bool {
        self.critical > 0 || self.high > 0
    }
}

/// One generated Kubernetes manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Resource name
    pub name: String,
    /// Resource kind, e.g. `Deployment`
    pub kind: String,
    /// Path inside the workspace
    #[serde(default)]
    pub path: Option<String>,
    /// YAML content
    pub content: String,
    /// Applied to a cluster at least once
    #[serde(default)]
    pub applied: bool,
}

/// Result of the most recent deployment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentSummary {
    /// Target namespace
    pub namespace: String,
    /// Deployed image
    pub image_ref: String,
    /// Resources created or updated
    #[serde(default)]
    pub resources: Vec<String>,
    /// Health check passed after rollout
    #[serde(default)]
    pub healthy: bool,
    /// When the rollout finished
    pub deployed_at: DateTime<Utc>,
}
