use async_trait::async_trait;
use conkit_core::{Error, Result, SessionState};

use super::{deployable_image, mentions, StageHandler, Turn};
use crate::response::{ConversationResponse, ResponseOption, ResponseStatus};
use crate::stage::Stage;
use crate::state::{ConversationState, DecisionPoint};
use crate::tools::{PushParams, ScanParams};

const REGISTRY_DECISION: &str = "registry";

/// Publishes the built image, optionally scanning it first
pub struct PushHandler;

#[async_trait]
impl StageHandler for PushHandler {
    async fn handle(
        &self,
        turn: &mut Turn<'_>,
        state: &mut ConversationState,
        input: &str,
    ) -> Result<ConversationResponse> {
        let session = turn.session().await?;
        let Some(image) = deployable_image(&session) else {
            return Err(Error::Workflow(
                "there is no built image to publish".to_string(),
            ));
        };

        if mentions(input, &["scan"]) {
            return scan(turn, state, image).await;
        }

        if mentions(input, &["skip", "local"]) {
            state.pending_decision = None;
            state.set_stage(Stage::Manifests);
            return Ok(ConversationResponse::success(
                Stage::Manifests,
                format!("Keeping {} local. Next I'll generate Kubernetes manifests.", image),
            )
            .continue_with("continue"));
        }

        let answer = input.trim().to_lowercase();
        if answer == REGISTRY_DECISION {
            turn.update_session(|s| s.registry = None).await?;
            return Ok(ask_registry(state, None));
        }
        if matches!(answer.as_str(), "acr" | "ecr" | "custom") {
            return Ok(ask_registry(state, Some(answer.as_str())));
        }

        let registry = registry_from_input(input)
            .or_else(|| state.preferences.registry.clone())
            .or_else(|| session.registry.clone());
        let Some(registry) = registry else {
            return Ok(ask_registry(state, None));
        };
        state.pending_decision = None;

        push(turn, state, &session, image, registry).await
    }

    fn accepts(&self, decision: &DecisionPoint, input: &str) -> bool {
        decision.matching_option(input).is_some() || registry_from_input(input).is_some()
    }
}

async fn push(
    turn: &mut Turn<'_>,
    state: &mut ConversationState,
    session: &SessionState,
    image: String,
    registry: String,
) -> Result<ConversationResponse> {
    let params = PushParams {
        image_ref: image,
        registry: registry.clone(),
    };
    let result = match turn.call(params).await? {
        Ok(result) => result,
        Err(err) => {
            state.last_tool_error = Some(err.clone());
            return Ok(ConversationResponse::tool_failure(
                Stage::Push,
                format!("Pushing to {} failed: {}", registry, err.message),
                err,
            )
            .with_options(vec![
                ResponseOption::recommended("retry", "Retry the push"),
                ResponseOption::new("local", "Skip the push and keep the image local"),
                ResponseOption::new("registry", "Choose another registry"),
            ]));
        }
    };

    let pushed = result.image_ref.clone();
    turn.update_session(move |s| {
        s.registry = Some(registry);
        s.image_ref = Some(result.image_ref);
        s.dockerfile.pushed = true;
    })
    .await?;

    state.add_artifact("image", "Published image", pushed.clone());
    state.last_tool_error = None;
    state.set_stage(Stage::Manifests);

    let mut message = format!("Pushed {}.", pushed);
    if let Some(scan) = session.security_scan.as_ref().filter(|s| s.has_blocking_findings()) {
        message.push_str(&format!(
            " Note: the last scan reported {} critical and {} high findings.",
            scan.critical, scan.high
        ));
    }
    message.push_str(" Next I'll generate Kubernetes manifests.");
    Ok(ConversationResponse::success(Stage::Manifests, message).continue_with("continue"))
}

async fn scan(
    turn: &mut Turn<'_>,
    state: &mut ConversationState,
    image: String,
) -> Result<ConversationResponse> {
    let options = vec![
        ResponseOption::recommended("push", "Push to a registry"),
        ResponseOption::new("local", "Keep it local"),
    ];

    let summary = match turn.call(ScanParams { image_ref: image }).await? {
        Ok(summary) => summary,
        Err(err) => {
            state.last_tool_error = Some(err.clone());
            let mut response = ConversationResponse::tool_failure(
                Stage::Push,
                format!("The security scan failed: {}. You can still publish the image.", err.message),
                err,
            )
            .with_options(options);
            response.status = ResponseStatus::Warning;
            return Ok(response);
        }
    };

    let status = if summary.has_blocking_findings() {
        ResponseStatus::Warning
    } else {
        ResponseStatus::Success
    };
    let message = format!(
        "Scan of {} found {} issue(s): {} critical, {} high, {} medium, {} low.",
        summary.image_ref,
        summary.total(),
        summary.critical,
        summary.high,
        summary.medium,
        summary.low
    );
    turn.update_session(move |s| s.security_scan = Some(summary))
        .await?;

    Ok(ConversationResponse::new(Stage::Push, status, message).with_options(options))
}

fn ask_registry(state: &mut ConversationState, provider: Option<&str>) -> ConversationResponse {
    let question = match provider {
        Some("acr") => "Send your Azure registry host, e.g. myteam.azurecr.io".to_string(),
        Some("ecr") => {
            "Send your ECR host, e.g. 123456789012.dkr.ecr.us-east-1.amazonaws.com".to_string()
        }
        Some(_) => "Send the registry host, e.g. registry.example.com:5000".to_string(),
        None => "Which registry should I push to?".to_string(),
    };
    let decision = DecisionPoint::new(REGISTRY_DECISION, Stage::Push, question.clone()).with_options(vec![
        ResponseOption::new("dockerhub", "Docker Hub"),
        ResponseOption::new("gcr", "Google Container Registry"),
        ResponseOption::new("acr", "Azure Container Registry"),
        ResponseOption::new("ecr", "Amazon ECR"),
        ResponseOption::new("custom", "Another registry"),
        ResponseOption::new("local", "Skip the push"),
    ]);
    state.set_pending_decision(decision.clone());
    ConversationResponse::waiting(Stage::Push, question).with_decision(decision)
}

/// Registry host named by `input`, if it names one
fn registry_from_input(input: &str) -> Option<String> {
    let input = input.trim().to_lowercase();
    match input.as_str() {
        "dockerhub" | "docker.io" => return Some("docker.io".to_string()),
        "gcr" => return Some("gcr.io".to_string()),
        _ => {}
    }
    let host_like = !input.is_empty()
        && !input.chars().any(char::is_whitespace)
        && input.contains(['.', ':', '/']);
    host_like.then(|| input.trim_end_matches('/').to_string())
}
