use async_trait::async_trait;
use chrono::Utc;
use conkit_core::utils::format_bytes;
use conkit_core::{Error, Result, SessionState};
use tracing::debug;

use super::{mentions, suggest_app_name, StageHandler, Turn};
use crate::response::{ConversationResponse, ResponseOption, ResponseStatus};
use crate::stage::Stage;
use crate::state::ConversationState;
use crate::tools::BuildParams;

const LOG_TAIL: usize = 20;

/// Builds the image, offering a dry-run preview first
pub struct BuildHandler;

#[async_trait]
impl StageHandler for BuildHandler {
    async fn handle(
        &self,
        turn: &mut Turn<'_>,
        state: &mut ConversationState,
        input: &str,
    ) -> Result<ConversationResponse> {
        let session = turn.session().await?;
        if session.dockerfile.content.is_none() {
            return Err(Error::Workflow(
                "a Dockerfile is needed before the image can be built".to_string(),
            ));
        }

        if mentions(input, &["skip"]) {
            state.set_stage(Stage::Push);
            return Ok(ConversationResponse::success(
                Stage::Push,
                "Skipping the build. Let's publish the image.",
            )
            .continue_with("continue"));
        }

        if mentions(input, &["modify"]) {
            state.set_stage(Stage::Dockerfile);
            return Ok(ConversationResponse::waiting(
                Stage::Dockerfile,
                "What should change? Adjust your preferences (base image, optimization) and reply 'regenerate'.",
            )
            .with_options(vec![ResponseOption::recommended(
                "regenerate",
                "Regenerate the Dockerfile",
            )]));
        }

        if mentions(input, &["logs"]) {
            return Ok(show_logs(&session));
        }

        let confirmed = mentions(input, &["yes", "proceed"]);
        let preview_wanted = !state.context.build_dry_run_complete
            && !confirmed
            && !state.preferences.skip_confirmations
            && !state.autopilot;
        if preview_wanted {
            state.context.build_dry_run_complete = true;
            if let Some(preview) = dry_run(turn, state, &session).await? {
                return Ok(preview);
            }
        }

        execute_build(turn, state, &session).await
    }
}

fn build_params(state: &ConversationState, session: &SessionState, dry_run: bool) -> BuildParams {
    BuildParams {
        image_name: state
            .context
            .app_name
            .clone()
            .unwrap_or_else(|| suggest_app_name(session)),
        tag: "latest".to_string(),
        platform: state.preferences.platform.clone(),
        build_args: state.preferences.build_args.clone(),
        dry_run,
    }
}

/// Preview response, or `None` when no preview could be produced
async fn dry_run(
    turn: &mut Turn<'_>,
    state: &ConversationState,
    session: &SessionState,
) -> Result<Option<ConversationResponse>> {
    let result = match turn.call(build_params(state, session, true)).await? {
        Ok(result) => result,
        Err(err) => {
            debug!(error = %err, "Build preview unavailable, building directly");
            return Ok(None);
        }
    };
    let Some(preview) = result.preview else {
        return Ok(None);
    };

    let message = format!(
        "Build preview:\n- Base image: {}\n- Layers: {}\n- Estimated size: {}\n\nProceed with the build?",
        preview.base_image,
        preview.layers,
        format_bytes(preview.estimated_size_bytes)
    );
    Ok(Some(
        ConversationResponse::waiting(Stage::Build, message).with_options(vec![
            ResponseOption::recommended("yes", "Yes, build it"),
            ResponseOption::new("modify", "Change the Dockerfile"),
            ResponseOption::new("skip", "Skip the build"),
        ]),
    ))
}

async fn execute_build(
    turn: &mut Turn<'_>,
    state: &mut ConversationState,
    session: &SessionState,
) -> Result<ConversationResponse> {
    let result = match turn.call(build_params(state, session, false)).await? {
        Ok(result) => result,
        Err(err) => {
            state.last_tool_error = Some(err.clone());
            return Ok(ConversationResponse::tool_failure(
                Stage::Build,
                format!("The build failed: {}\n\nWould you like to:", err.message),
                err,
            )
            .with_options(vec![
                ResponseOption::recommended("retry", "Retry the build"),
                ResponseOption::new("logs", "Show build logs"),
                ResponseOption::new("modify", "Change the Dockerfile"),
            ]));
        }
    };

    let image_ref = result.image_ref.clone();
    let size = result.size_bytes;
    turn.update_session(move |s| {
        s.dockerfile.built = true;
        s.dockerfile.pushed = false;
        s.dockerfile.build_time = Some(Utc::now());
        s.dockerfile.image_id = Some(result.image_id);
        s.dockerfile.size_bytes = result.size_bytes;
        s.image_ref = Some(result.image_ref);
        SessionState::append_logs(&mut s.build_logs, result.logs);
    })
    .await?;

    state.add_artifact("image", "Container image", image_ref.clone());
    state.last_tool_error = None;
    state.set_stage(Stage::Push);

    let size = size.map(|b| format!(" ({})", format_bytes(b))).unwrap_or_default();
    Ok(ConversationResponse::success(
        Stage::Push,
        format!("Built {}{}. Where should it go next?", image_ref, size),
    )
    .with_options(vec![
        ResponseOption::recommended("push", "Push to a registry"),
        ResponseOption::new("local", "Keep it local"),
        ResponseOption::new("scan", "Scan for vulnerabilities first"),
    ])
    .continue_with("push"))
}

fn show_logs(session: &SessionState) -> ConversationResponse {
    let message = if session.build_logs.is_empty() {
        "There are no build logs yet.".to_string()
    } else {
        let start = session.build_logs.len().saturating_sub(LOG_TAIL);
        format!(
            "Last build output:\n\n```\n{}\n```",
            session.build_logs[start..].join("\n")
        )
    };
    ConversationResponse::new(Stage::Build, ResponseStatus::Success, message).with_options(vec![
        ResponseOption::recommended("retry", "Retry the build"),
        ResponseOption::new("modify", "Change the Dockerfile"),
    ])
}
