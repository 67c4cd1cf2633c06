use async_trait::async_trait;
use conkit_core::validation::is_dns_label;
use conkit_core::{Error, Result, SessionState};

use super::{deployable_image, mentions, suggest_app_name, StageHandler, Turn};
use crate::response::{ConversationResponse, ResponseOption};
use crate::stage::Stage;
use crate::state::{ConversationState, DecisionPoint};
use crate::tools::ManifestParams;

const CONFIG_DECISION: &str = "k8s-config";

/// Generates Kubernetes manifests for the image
pub struct ManifestsHandler;

#[async_trait]
impl StageHandler for ManifestsHandler {
    async fn handle(
        &self,
        turn: &mut Turn<'_>,
        state: &mut ConversationState,
        input: &str,
    ) -> Result<ConversationResponse> {
        let session = turn.session().await?;
        let Some(image) = deployable_image(&session) else {
            return Err(Error::Workflow(
                "manifests need a built or pushed image".to_string(),
            ));
        };

        if mentions(input, &["skip"]) {
            state.pending_decision = None;
            state.set_stage(Stage::Completed);
            return Ok(ConversationResponse::success(
                Stage::Completed,
                format!("Skipping deployment. Your image is ready: {}", image),
            ));
        }

        if mentions(input, &["modify"]) {
            turn.update_session(|s| s.k8s_manifests.clear()).await?;
            state.clear_artifacts("k8s-manifest");
            state.context.app_name = None;
            return Ok(ask_app_name(state, &suggest_app_name(&session)));
        }

        if state.context.app_name.is_none() {
            let answer = turn
                .decision()
                .filter(|d| d.decision_id == CONFIG_DECISION)
                .map(|d| d.value().trim().to_lowercase())
                .filter(|name| is_dns_label(name));
            if let Some(answer) = answer {
                state.context.app_name = Some(answer);
            } else {
                let suggested = suggest_app_name(&session);
                if state.preferences.skip_confirmations || state.autopilot {
                    state.context.app_name = Some(suggested);
                } else {
                    return Ok(ask_app_name(state, &suggested));
                }
            }
            state.pending_decision = None;
            return generate(turn, state, &session, image).await;
        }

        if session.k8s_manifests.is_empty() || mentions(input, &["regenerate"]) {
            return generate(turn, state, &session, image).await;
        }

        if mentions(input, &["dry", "preview"]) {
            state.set_stage(Stage::Deployment);
            return Ok(ConversationResponse::success(
                Stage::Deployment,
                "Let's preview the changes before applying them.",
            )
            .continue_with("dry-run"));
        }
        if mentions(input, &["deploy"]) {
            state.set_stage(Stage::Deployment);
            return Ok(ConversationResponse::success(
                Stage::Deployment,
                "Deploying the manifests.",
            )
            .continue_with("deploy"));
        }
        if mentions(input, &["review"]) {
            let full = session
                .k8s_manifests
                .values()
                .map(|m| format!("# {} ({})\n{}", m.name, m.kind, m.content.trim_end()))
                .collect::<Vec<_>>()
                .join("\n---\n");
            return Ok(
                ConversationResponse::waiting(Stage::Manifests, format!("```yaml\n{}\n```", full))
                    .with_options(manifest_options()),
            );
        }

        Ok(ConversationResponse::waiting(Stage::Manifests, summarize(&session))
            .with_options(manifest_options()))
    }

    fn accepts(&self, decision: &DecisionPoint, input: &str) -> bool {
        decision.id == CONFIG_DECISION && is_dns_label(&input.trim().to_lowercase())
    }
}

async fn generate(
    turn: &mut Turn<'_>,
    state: &mut ConversationState,
    session: &SessionState,
    image: String,
) -> Result<ConversationResponse> {
    let app_name = state
        .context
        .app_name
        .clone()
        .unwrap_or_else(|| suggest_app_name(session));
    let prefs = &state.preferences;
    let params = ManifestParams {
        app_name,
        namespace: prefs.namespace.clone(),
        image_ref: image,
        replicas: prefs.replicas,
        service_type: prefs.service_type.clone(),
        port: session.repo_analysis.as_ref().and_then(|a| a.port),
        resources: (!prefs.resources.is_empty()).then(|| prefs.resources.clone()),
        health_checks: prefs.health_checks,
    };

    let result = match turn.call(params).await? {
        Ok(result) => result,
        Err(err) => {
            state.last_tool_error = Some(err.clone());
            return Ok(ConversationResponse::tool_failure(
                Stage::Manifests,
                format!("Manifest generation failed: {}", err.message),
                err,
            )
            .with_options(vec![
                ResponseOption::recommended("retry", "Try again"),
                ResponseOption::new("modify", "Change the configuration"),
                ResponseOption::new("skip", "Skip deployment"),
            ]));
        }
    };

    state.clear_artifacts("k8s-manifest");
    for manifest in &result.manifests {
        state.add_artifact("k8s-manifest", manifest.name.clone(), manifest.content.clone());
    }
    let manifests = result.manifests;
    turn.update_session(move |s| {
        s.k8s_manifests = manifests
            .into_iter()
            .map(|m| (format!("{}/{}", m.kind, m.name), m))
            .collect();
    })
    .await?;
    state.last_tool_error = None;

    let session = turn.session().await?;
    Ok(ConversationResponse::success(Stage::Manifests, summarize(&session))
        .with_options(manifest_options())
        .continue_with("deploy"))
}

fn ask_app_name(state: &mut ConversationState, suggested: &str) -> ConversationResponse {
    let question = format!(
        "What should the application be called in Kubernetes? Reply with a name, or '{}' to use the suggestion.",
        suggested
    );
    let decision = DecisionPoint::new(CONFIG_DECISION, Stage::Manifests, question.clone())
        .with_options(vec![ResponseOption::recommended(suggested, suggested)]);
    let decision = DecisionPoint {
        default: Some(suggested.to_string()),
        ..decision
    };
    state.set_pending_decision(decision.clone());
    ConversationResponse::waiting(Stage::Manifests, question).with_decision(decision)
}

fn summarize(session: &SessionState) -> String {
    let lines = session
        .k8s_manifests
        .values()
        .map(|m| format!("- {} {}", m.kind, m.name))
        .collect::<Vec<_>>()
        .join("\n");
    format!("Generated manifests:\n{}\n\nReady to deploy?", lines)
}

fn manifest_options() -> Vec<ResponseOption> {
    vec![
        ResponseOption::recommended("deploy", "Deploy to the cluster"),
        ResponseOption::new("review", "Show the full manifests"),
        ResponseOption::new("modify", "Change the configuration"),
        ResponseOption::new("dry-run", "Preview the changes"),
    ]
}
