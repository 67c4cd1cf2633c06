use async_trait::async_trait;
use conkit_core::{DockerfileState, Error, Result};
use tracing::warn;

use super::{mentions, StageHandler, Turn};
use crate::recovery::{error_severity, fallback_options, Severity};
use crate::response::{ConversationResponse, ResponseOption, ResponseStatus};
use crate::stage::Stage;
use crate::state::ConversationState;
use crate::tools::DockerfileParams;

/// Generates and validates the Dockerfile
pub struct DockerfileHandler;

#[async_trait]
impl StageHandler for DockerfileHandler {
    async fn handle(
        &self,
        turn: &mut Turn<'_>,
        state: &mut ConversationState,
        input: &str,
    ) -> Result<ConversationResponse> {
        let session = turn.session().await?;
        let Some(analysis) = session.repo_analysis.clone() else {
            return Err(Error::Workflow(
                "the repository has to be analyzed before a Dockerfile can be generated".to_string(),
            ));
        };

        let keep_existing = session.dockerfile.content.is_some()
            && mentions(input, &["continue", "build", "skip", "yes"])
            && !mentions(input, &["regenerate"]);
        if keep_existing {
            state.set_stage(Stage::Build);
            return Ok(ConversationResponse::success(
                Stage::Build,
                "Keeping the current Dockerfile. Next I'll build the image.",
            )
            .continue_with("build"));
        }

        let params = DockerfileParams {
            language: analysis.language.clone(),
            framework: analysis.framework.clone(),
            base_image: state.preferences.base_image.clone(),
            optimization: state.preferences.optimization.clone(),
            port: analysis.port,
        };

        let result = match turn.call(params).await? {
            Ok(result) => result,
            Err(err) => {
                let fatal = !err.retryable || error_severity(&err.message) == Severity::Critical;
                state.last_tool_error = Some(err.clone());
                return Ok(ConversationResponse::tool_failure(
                    Stage::Dockerfile,
                    format!("Dockerfile generation failed: {}", err.message),
                    err,
                )
                .with_options(fallback_options(Stage::Dockerfile, fatal)));
            }
        };

        let path = match result.path.clone() {
            Some(path) => Some(path),
            None => {
                let target = session.workspace_dir.join("Dockerfile");
                match tokio::fs::write(&target, &result.content).await {
                    Ok(()) => Some(target.display().to_string()),
                    Err(e) => {
                        warn!(session_id = %turn.session_id(), error = %e, "Failed to write Dockerfile to workspace");
                        None
                    }
                }
            }
        };

        let errors = result
            .validation
            .as_ref()
            .map(|v| v.errors.clone())
            .unwrap_or_default();
        let content = result.content.clone();
        turn.update_session(move |s| {
            s.dockerfile = DockerfileState {
                content: Some(result.content),
                path,
                validation: result.validation,
                ..DockerfileState::default()
            };
            s.image_ref = None;
        })
        .await?;

        state.clear_artifacts("dockerfile");
        state.add_artifact("dockerfile", "Dockerfile", content.clone());
        state.context.build_dry_run_complete = false;
        state.last_tool_error = None;

        if !errors.is_empty() {
            let mut response = ConversationResponse::new(
                Stage::Dockerfile,
                ResponseStatus::Warning,
                format!(
                    "I generated a Dockerfile, but validation found problems:\n- {}\n\nRegenerate it, or continue anyway?",
                    errors.join("\n- ")
                ),
            );
            response.options = vec![
                ResponseOption::recommended("regenerate", "Regenerate the Dockerfile"),
                ResponseOption::new("continue", "Continue with this Dockerfile"),
            ];
            return Ok(response);
        }

        state.set_stage(Stage::Build);
        Ok(ConversationResponse::success(
            Stage::Build,
            format!("Here is your Dockerfile:\n\n```dockerfile\n{}\n```", content.trim_end()),
        )
        .with_options(vec![
            ResponseOption::recommended("build", "Build the image"),
            ResponseOption::new("modify", "Change the Dockerfile"),
        ])
        .continue_with("build"))
    }
}
