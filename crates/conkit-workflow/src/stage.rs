//! Pipeline stages

use serde::{Deserialize, Serialize};

/// Conversation stage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Nothing has happened yet
    #[default]
    Init,
    /// Waiting for the repository to containerize
    Welcome,
    /// Repository analysis
    Analysis,
    /// Dockerfile generation
    Dockerfile,
    /// Image build
    Build,
    /// Image push and optional scan
    Push,
    /// Kubernetes manifest generation
    Manifests,
    /// Cluster deployment and health check
    Deployment,
    /// Pipeline finished
    Completed,
    /// A stage failed beyond in-stage recovery
    Error,
}

/// Working stages in pipeline order
const PIPELINE: [Stage; 7] = [
    Stage::Welcome,
    Stage::Analysis,
    Stage::Dockerfile,
    Stage::Build,
    Stage::Push,
    Stage::Manifests,
    Stage::Deployment,
];

impl Stage {
    /// Returns the string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Welcome => "welcome",
            Self::Analysis => "analysis",
            Self::Dockerfile => "dockerfile",
            Self::Build => "build",
            Self::Push => "push",
            Self::Manifests => "manifests",
            Self::Deployment => "deployment",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }

    /// Stage reached on success, `None` for terminal stages
    #[must_use]
    pub fn next(&self) -> Option<Stage> {
        match self {
            Self::Init => Some(Self::Welcome),
            Self::Welcome => Some(Self::Analysis),
            Self::Analysis => Some(Self::Dockerfile),
            Self::Dockerfile => Some(Self::Build),
            Self::Build => Some(Self::Push),
            Self::Push => Some(Self::Manifests),
            Self::Manifests => Some(Self::Deployment),
            Self::Deployment => Some(Self::Completed),
            Self::Completed | Self::Error => None,
        }
    }

    /// Completed or Error
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }

    /// 1-based position among the working stages, with the pipeline length
    #[must_use]
    pub fn progress(&self) -> Option<(usize, usize)> {
        match self {
            Self::Init => Some((1, PIPELINE.len())),
            Self::Completed => Some((PIPELINE.len(), PIPELINE.len())),
            _ => PIPELINE
                .iter()
                .position(|s| s == self)
                .map(|i| (i + 1, PIPELINE.len())),
        }
    }

    /// Short progress marker such as `[Step 4/7]`
    #[must_use]
    pub fn progress_label(&self) -> Option<String> {
        self.progress()
            .map(|(step, total)| format!("[Step {}/{}]", step, total))
    }

    /// One-line introduction shown when the stage is entered
    #[must_use]
    pub fn intro(&self) -> &'static str {
        match self {
            Self::Init | Self::Welcome => "Let's get your application containerized.",
            Self::Analysis => "Analyzing your repository.",
            Self::Dockerfile => "Preparing a Dockerfile.",
            Self::Build => "Building the container image.",
            Self::Push => "Publishing the image.",
            Self::Manifests => "Preparing Kubernetes manifests.",
            Self::Deployment => "Deploying to Kubernetes.",
            Self::Completed => "All done.",
            Self::Error => "Something went wrong.",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "init" => Ok(Self::Init),
            "welcome" => Ok(Self::Welcome),
            "analysis" | "analyze" => Ok(Self::Analysis),
            "dockerfile" => Ok(Self::Dockerfile),
            "build" => Ok(Self::Build),
            "push" => Ok(Self::Push),
            "manifests" => Ok(Self::Manifests),
            "deployment" | "deploy" => Ok(Self::Deployment),
            "completed" => Ok(Self::Completed),
            "error" => Ok(Self::Error),
            other => Err(format!("unknown stage: {}", other)),
        }
    }
}
