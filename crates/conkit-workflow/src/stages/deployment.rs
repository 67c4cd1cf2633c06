use async_trait::async_trait;
use chrono::Utc;
use conkit_core::{DeploymentSummary, Error, Result, SessionState};
use tracing::{info, warn};

use super::{deployable_image, mentions, suggest_app_name, StageHandler, Turn};
use crate::response::{ConversationResponse, ResponseOption, ResponseStatus};
use crate::stage::Stage;
use crate::state::ConversationState;
use crate::tools::{DeployParams, HealthParams, RollbackParams};

const DEPLOY_TIMEOUT_SECS: u64 = 300;
const HEALTH_TIMEOUT_SECS: u64 = 60;
const LOG_TAIL: usize = 30;

/// Applies manifests, verifies health and handles rollback
pub struct DeploymentHandler;

#[async_trait]
impl StageHandler for DeploymentHandler {
    async fn handle(
        &self,
        turn: &mut Turn<'_>,
        state: &mut ConversationState,
        input: &str,
    ) -> Result<ConversationResponse> {
        let session = turn.session().await?;
        if session.k8s_manifests.is_empty() {
            return Err(Error::Workflow(
                "there are no manifests to deploy".to_string(),
            ));
        }
        let target = Target::resolve(state, &session)?;

        if mentions(input, &["modify"]) {
            state.set_stage(Stage::Manifests);
            return Ok(ConversationResponse::success(
                Stage::Manifests,
                "Back to the manifests.",
            )
            .continue_with("modify"));
        }
        if mentions(input, &["cancel"]) {
            return Ok(ConversationResponse::waiting(
                Stage::Deployment,
                "Deployment cancelled. Nothing was applied.",
            )
            .with_options(vec![
                ResponseOption::recommended("deploy", "Deploy now"),
                ResponseOption::new("modify", "Change the manifests"),
            ]));
        }
        if mentions(input, &["logs"]) {
            return Ok(show_logs(&session));
        }
        if mentions(input, &["rollback"]) {
            return rollback(turn, state, &session, &target).await;
        }
        if mentions(input, &["dry", "preview"]) {
            return dry_run(turn, state, &target).await;
        }
        if state.context.awaiting_health {
            if mentions(input, &["wait", "check"]) {
                return verify_health(turn, state, &target).await;
            }
            if mentions(input, &["continue"]) {
                state.context.awaiting_health = false;
                state.set_stage(Stage::Completed);
                return Ok(ConversationResponse::new(
                    Stage::Completed,
                    ResponseStatus::Warning,
                    format!(
                        "Deployment of {} finished, but health checks have not passed yet.",
                        target.app_name
                    ),
                ));
            }
        }

        if mentions(input, &["retry"]) {
            let retries = state.context.deployment_retry_count;
            let max = turn.config().deployment_max_retries;
            if retries >= max {
                warn!(session_id = %turn.session_id(), retries, "Deployment retries exhausted");
                state.fail_into_error_stage(Stage::Deployment);
                return Ok(ConversationResponse::new(
                    Stage::Error,
                    ResponseStatus::Error,
                    format!(
                        "Maximum retry attempts ({}) reached. The deployment needs manual attention:\n\
                         - check the cluster has capacity and the namespace exists\n\
                         - confirm the image can be pulled from the cluster\n\
                         - review the manifests or rebuild the image",
                        max
                    ),
                )
                .with_options(vec![
                    ResponseOption::recommended("modify", "Change the manifests"),
                    ResponseOption::new("rebuild", "Rebuild the image"),
                ]));
            }
            let delay = turn.config().deployment_retry_delay * (retries + 1);
            info!(session_id = %turn.session_id(), retry = retries + 1, delay_ms = delay.as_millis() as u64, "Retrying deployment");
            turn.ctx().sleep(delay, "deployment retry").await?;
            state.context.deployment_retry_count = retries + 1;
        }

        deploy(turn, state, &target).await
    }
}

/// Where and what to deploy
struct Target {
    app_name: String,
    namespace: String,
    image_ref: String,
}

impl Target {
    fn resolve(state: &ConversationState, session: &SessionState) -> Result<Self> {
        let image_ref = deployable_image(session).ok_or_else(|| {
            Error::Workflow("there is no image to deploy".to_string())
        })?;
        Ok(Self {
            app_name: state
                .context
                .app_name
                .clone()
                .unwrap_or_else(|| suggest_app_name(session)),
            namespace: state.preferences.namespace.clone(),
            image_ref,
        })
    }

    fn deploy_params(&self, dry_run: bool) -> DeployParams {
        DeployParams {
            app_name: self.app_name.clone(),
            namespace: self.namespace.clone(),
            image_ref: self.image_ref.clone(),
            dry_run,
            wait_for_ready: !dry_run,
            timeout_seconds: DEPLOY_TIMEOUT_SECS,
        }
    }
}

async fn deploy(
    turn: &mut Turn<'_>,
    state: &mut ConversationState,
    target: &Target,
) -> Result<ConversationResponse> {
    let result = match turn.call(target.deploy_params(false)).await? {
        Ok(result) => result,
        Err(err) => {
            state.last_tool_error = Some(err.clone());
            let session = turn.session().await?;
            let rollback_available = session.last_known_good.is_some() && state.preferences.auto_rollback;
            let options = if rollback_available {
                vec![
                    ResponseOption::recommended("rollback", "Roll back to the last working image"),
                    ResponseOption::new("logs", "Show deployment logs"),
                    ResponseOption::new("retry", "Retry the deployment"),
                ]
            } else {
                vec![
                    ResponseOption::new("logs", "Show deployment logs"),
                    ResponseOption::recommended("retry", "Retry the deployment"),
                    ResponseOption::new("modify", "Change the manifests"),
                ]
            };
            return Ok(ConversationResponse::tool_failure(
                Stage::Deployment,
                format!(
                    "Deployment failed ({} of {} retries used): {}",
                    state.context.deployment_retry_count,
                    turn.config().deployment_max_retries,
                    err.message
                ),
                err,
            )
            .with_options(options));
        }
    };

    let resources = result.resources.clone();
    turn.update_session(move |s| {
        for manifest in s.k8s_manifests.values_mut() {
            manifest.applied = true;
        }
        SessionState::append_logs(&mut s.deploy_logs, result.logs);
    })
    .await?;
    state.context.deployment_retry_count = 0;
    state.last_tool_error = None;

    let namespace = target.namespace.clone();
    let image_ref = target.image_ref.clone();
    turn.update_session(move |s| {
        s.deployment = Some(DeploymentSummary {
            namespace,
            image_ref,
            resources,
            healthy: false,
            deployed_at: Utc::now(),
        });
    })
    .await?;

    verify_health(turn, state, target).await
}

async fn verify_health(
    turn: &mut Turn<'_>,
    state: &mut ConversationState,
    target: &Target,
) -> Result<ConversationResponse> {
    let params = HealthParams {
        app_name: target.app_name.clone(),
        namespace: target.namespace.clone(),
        timeout_seconds: HEALTH_TIMEOUT_SECS,
    };
    let unhealthy = match turn.call(params).await? {
        Ok(report) if report.healthy => None,
        Ok(report) => Some(report.message.unwrap_or_else(|| {
            format!(
                "{} of {} replicas ready",
                report.ready_replicas, report.desired_replicas
            )
        })),
        Err(err) => Some(err.message),
    };

    if let Some(reason) = unhealthy {
        state.context.awaiting_health = true;
        return Ok(ConversationResponse::new(
            Stage::Deployment,
            ResponseStatus::Warning,
            format!(
                "{} was applied, but it is not healthy yet: {}",
                target.app_name, reason
            ),
        )
        .with_options(vec![
            ResponseOption::recommended("wait", "Check again"),
            ResponseOption::new("logs", "Show deployment logs"),
            ResponseOption::new("continue", "Finish anyway"),
        ]));
    }

    let image_ref = target.image_ref.clone();
    turn.update_session(move |s| {
        if let Some(deployment) = s.deployment.as_mut() {
            deployment.healthy = true;
        }
        s.last_known_good = Some(image_ref);
    })
    .await?;
    state.context.awaiting_health = false;
    state.set_stage(Stage::Completed);

    Ok(ConversationResponse::success(
        Stage::Completed,
        format!(
            "{} is running in namespace '{}'.\n\nTry it with:\n  kubectl port-forward -n {} svc/{}-service 8080:80",
            target.app_name, target.namespace, target.namespace, target.app_name
        ),
    ))
}

async fn dry_run(
    turn: &mut Turn<'_>,
    state: &mut ConversationState,
    target: &Target,
) -> Result<ConversationResponse> {
    let result = match turn.call(target.deploy_params(true)).await? {
        Ok(result) => result,
        Err(err) => {
            state.last_tool_error = Some(err.clone());
            return Ok(ConversationResponse::tool_failure(
                Stage::Deployment,
                format!("The preview failed: {}", err.message),
                err,
            )
            .with_options(vec![
                ResponseOption::recommended("deploy", "Deploy anyway"),
                ResponseOption::new("modify", "Change the manifests"),
            ]));
        }
    };

    let message = match result.dry_run_preview.filter(|p| !p.trim().is_empty()) {
        Some(preview) => format!("These changes would be applied:\n\n```diff\n{}\n```", preview.trim_end()),
        None => "No changes detected.".to_string(),
    };
    Ok(ConversationResponse::waiting(Stage::Deployment, message).with_options(vec![
        ResponseOption::recommended("deploy", "Apply the changes"),
        ResponseOption::new("cancel", "Don't deploy"),
    ]))
}

async fn rollback(
    turn: &mut Turn<'_>,
    state: &mut ConversationState,
    session: &SessionState,
    target: &Target,
) -> Result<ConversationResponse> {
    let Some(previous) = session.last_known_good.clone() else {
        return Ok(ConversationResponse::new(
            Stage::Deployment,
            ResponseStatus::Warning,
            "There is no earlier working deployment to roll back to.",
        )
        .with_options(vec![
            ResponseOption::recommended("retry", "Retry the deployment"),
            ResponseOption::new("modify", "Change the manifests"),
        ]));
    };

    let params = RollbackParams {
        app_name: target.app_name.clone(),
        namespace: target.namespace.clone(),
        image_ref: previous,
    };
    let options = vec![
        ResponseOption::new("retry", "Retry the new deployment"),
        ResponseOption::new("modify", "Change the manifests"),
    ];
    match turn.call(params).await? {
        Ok(result) => {
            let restored = result.image_ref.clone();
            turn.update_session(move |s| {
                if let Some(deployment) = s.deployment.as_mut() {
                    deployment.image_ref = restored;
                    deployment.healthy = true;
                }
            })
            .await?;
            state.last_tool_error = None;
            Ok(ConversationResponse::new(
                Stage::Deployment,
                ResponseStatus::Warning,
                format!("Rolled back {} to {}.", target.app_name, result.image_ref),
            )
            .with_options(options))
        }
        Err(err) => {
            state.last_tool_error = Some(err.clone());
            Ok(ConversationResponse::tool_failure(
                Stage::Deployment,
                format!("Rollback failed: {}", err.message),
                err,
            )
            .with_options(options))
        }
    }
}

fn show_logs(session: &SessionState) -> ConversationResponse {
    let message = if session.deploy_logs.is_empty() {
        "There are no deployment logs yet.".to_string()
    } else {
        let start = session.deploy_logs.len().saturating_sub(LOG_TAIL);
        format!(
            "Last deployment output:\n\n```\n{}\n```",
            session.deploy_logs[start..].join("\n")
        )
    };
    ConversationResponse::new(Stage::Deployment, ResponseStatus::Success, message).with_options(vec![
        ResponseOption::recommended("retry", "Retry the deployment"),
        ResponseOption::new("modify", "Change the manifests"),
    ])
}
