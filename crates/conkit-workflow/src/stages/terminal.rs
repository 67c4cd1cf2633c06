use async_trait::async_trait;
use conkit_core::Result;

use super::{mentions, StageHandler, Turn};
use crate::response::{ConversationResponse, ResponseOption, ResponseStatus};
use crate::stage::Stage;
use crate::state::{ConversationState, WorkflowContext};

/// Recovery choices after a stage failed for good
pub struct ErrorStageHandler;

#[async_trait]
impl StageHandler for ErrorStageHandler {
    async fn handle(
        &self,
        turn: &mut Turn<'_>,
        state: &mut ConversationState,
        input: &str,
    ) -> Result<ConversationResponse> {
        let failed = state.context.failed_stage.unwrap_or(Stage::Welcome);

        if mentions(input, &["restart", "start over"]) {
            state.context = WorkflowContext::default();
            state.last_tool_error = None;
            state.set_stage(Stage::Welcome);
            return Ok(ConversationResponse::new(
                Stage::Welcome,
                ResponseStatus::Processing,
                "Starting over.",
            )
            .continue_with("continue"));
        }
        if mentions(input, &["rebuild"]) {
            turn.update_session(|s| {
                s.dockerfile.built = false;
                s.dockerfile.pushed = false;
            })
            .await?;
            state.context.build_dry_run_complete = false;
            return Ok(recover(state, Stage::Build, "Rebuilding the image.", "build"));
        }
        if mentions(input, &["modify"]) {
            turn.update_session(|s| s.k8s_manifests.clear()).await?;
            state.clear_artifacts("k8s-manifest");
            state.context.app_name = None;
            return Ok(recover(state, Stage::Manifests, "Let's revisit the manifests.", "continue"));
        }
        if mentions(input, &["retry"]) {
            // retry re-enters the failed stage with a fresh allowance
            return Ok(recover(
                state,
                failed,
                &format!("Returning to {}.", failed),
                "continue",
            ));
        }

        let mut response = ConversationResponse::new(
            Stage::Error,
            ResponseStatus::Error,
            format!(
                "The {} stage could not complete. How would you like to recover?",
                failed
            ),
        );
        response.options = vec![
            ResponseOption::new("retry", format!("Retry {}", failed)),
            ResponseOption::new("modify", "Change the manifests"),
            ResponseOption::new("rebuild", "Rebuild the image"),
            ResponseOption::new("restart", "Start over"),
        ];
        Ok(response)
    }
}

fn recover(
    state: &mut ConversationState,
    stage: Stage,
    message: &str,
    action: &str,
) -> ConversationResponse {
    state.context.failed_stage = None;
    state.context.deployment_retry_count = 0;
    state.context.awaiting_health = false;
    state.last_tool_error = None;
    state.set_stage(stage);
    ConversationResponse::new(stage, ResponseStatus::Processing, message).continue_with(action)
}

/// Wrap-up once the application is deployed
pub struct CompletedHandler;

#[async_trait]
impl StageHandler for CompletedHandler {
    async fn handle(
        &self,
        turn: &mut Turn<'_>,
        state: &mut ConversationState,
        input: &str,
    ) -> Result<ConversationResponse> {
        if mentions(input, &["restart", "new"]) {
            state.context = WorkflowContext::default();
            state.artifacts.clear();
            turn.update_session(|s| {
                s.repo_url = None;
                s.repo_path = None;
            })
            .await?;
            state.set_stage(Stage::Welcome);
            return Ok(ConversationResponse::success(Stage::Welcome, "Let's containerize another application.")
                .continue_with("continue"));
        }
        if mentions(input, &["deploy"]) {
            state.set_stage(Stage::Deployment);
            return Ok(ConversationResponse::success(Stage::Deployment, "Deploying again.")
                .continue_with("deploy"));
        }

        let session = turn.session().await?;
        let mut lines = vec!["Everything is done.".to_string()];
        if let Some(image) = &session.image_ref {
            lines.push(format!("- Image: {}", image));
        }
        if let Some(deployment) = &session.deployment {
            lines.push(format!(
                "- Deployed to '{}' ({})",
                deployment.namespace,
                if deployment.healthy { "healthy" } else { "not healthy" }
            ));
        }
        lines.push(format!("- Artifacts: {}", state.artifacts.len()));

        let mut response =
            ConversationResponse::new(Stage::Completed, ResponseStatus::Success, lines.join("\n"));
        response.options = vec![
            ResponseOption::new("redeploy", "Deploy again"),
            ResponseOption::new("restart", "Containerize another application"),
        ];
        Ok(response)
    }
}
