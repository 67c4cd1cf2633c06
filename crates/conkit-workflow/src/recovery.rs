//! Failure classification and recovery options

use crate::response::ResponseOption;
use crate::stage::Stage;

/// Error type tag derived from a failure message
#[must_use]
pub fn classify_error(message: &str) -> &'static str {
    let msg = message.to_lowercase();
    if msg.contains("build") {
        "build_error"
    } else if msg.contains("push") {
        "push_error"
    } else if msg.contains("deploy") {
        "deployment_error"
    } else if msg.contains("manifest") {
        "manifest_error"
    } else if msg.contains("dockerfile") {
        "dockerfile_error"
    } else if msg.contains("network") {
        "network_error"
    } else if msg.contains("auth") {
        "authentication_error"
    } else if msg.contains("registry") {
        "registry_error"
    } else {
        "unknown_error"
    }
}

/// How bad a failure looks from its message
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Worth a note
    Medium,
    /// Needs attention
    High,
    /// Retrying will not help
    Critical,
}

/// Severity derived from a failure message
#[must_use]
pub fn error_severity(message: &str) -> Severity {
    let msg = message.to_lowercase();
    if msg.contains("fatal") || msg.contains("critical") {
        Severity::Critical
    } else if msg.contains("warning") && !msg.contains("error") {
        Severity::Medium
    } else {
        Severity::High
    }
}

/// Options offered when a stage fails without a tailored recovery path.
///
/// Retry is always offered and skip is offered unless the failure is fatal.
#[must_use]
pub fn fallback_options(stage: Stage, fatal: bool) -> Vec<ResponseOption> {
    let mut options = vec![ResponseOption::new("retry", "Retry operation")];
    match stage {
        Stage::Build => {
            options.push(ResponseOption::new("logs", "Show build logs"));
            options.push(ResponseOption::new("modify", "Modify Dockerfile"));
        }
        Stage::Deployment => {
            options.push(ResponseOption::new("manifests", "Review manifests"));
            options.push(ResponseOption::new("rebuild", "Rebuild image"));
        }
        Stage::Manifests => {
            options.push(ResponseOption::new("regenerate", "Regenerate manifests"));
        }
        _ => {}
    }
    if !fatal {
        options.push(ResponseOption::new("skip", "Skip this stage"));
    }
    options
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(options: &[ResponseOption]) -> Vec<&str> {
        options.iter().map(|o| o.id.as_str()).collect()
    }

    #[test]
    fn test_classify_error() {
        assert_eq!(classify_error("docker build exited 1"), "build_error");
        assert_eq!(classify_error("Push denied"), "push_error");
        assert_eq!(classify_error("deployment timed out"), "deployment_error");
        assert_eq!(classify_error("invalid manifest"), "manifest_error");
        assert_eq!(classify_error("unauthorized: authentication required"), "authentication_error");
        assert_eq!(classify_error("something odd"), "unknown_error");
    }

    #[test]
    fn test_severity() {
        assert_eq!(error_severity("fatal: out of disk"), Severity::Critical);
        assert_eq!(error_severity("warning: deprecated flag"), Severity::Medium);
        assert_eq!(error_severity("exit status 1"), Severity::High);
    }

    #[test]
    fn test_fallback_options_per_stage() {
        assert_eq!(
            ids(&fallback_options(Stage::Build, false)),
            vec!["retry", "logs", "modify", "skip"]
        );
        assert_eq!(
            ids(&fallback_options(Stage::Deployment, true)),
            vec!["retry", "manifests", "rebuild"]
        );
        assert_eq!(
            ids(&fallback_options(Stage::Manifests, false)),
            vec!["retry", "regenerate", "skip"]
        );
        assert_eq!(ids(&fallback_options(Stage::Push, true)), vec!["retry"]);
    }
}
