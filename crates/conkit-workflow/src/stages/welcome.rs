use async_trait::async_trait;
use conkit_core::Result;

use super::{StageHandler, Turn};
use crate::response::{ConversationResponse, ResponseOption};
use crate::stage::Stage;
use crate::state::{ConversationState, DecisionPoint};

const REPOSITORY_DECISION: &str = "repository";

/// Greets the user and collects the repository
pub struct WelcomeHandler;

#[async_trait]
impl StageHandler for WelcomeHandler {
    async fn handle(
        &self,
        turn: &mut Turn<'_>,
        state: &mut ConversationState,
        input: &str,
    ) -> Result<ConversationResponse> {
        if state.stage == Stage::Init {
            state.set_stage(Stage::Welcome);
        }

        if is_repository_reference(input) {
            let reference = input.trim().to_string();
            let remote = is_remote(&reference);
            let stored = reference.clone();
            turn.update_session(move |s| {
                if remote {
                    s.repo_url = Some(stored);
                } else {
                    s.repo_path = Some(stored);
                }
            })
            .await?;
            return Ok(start_analysis(state, &reference));
        }

        let session = turn.session().await?;
        if let Some(existing) = session.repo_url.or(session.repo_path) {
            return Ok(start_analysis(state, &existing));
        }

        let decision = DecisionPoint::new(
            REPOSITORY_DECISION,
            Stage::Welcome,
            "Which repository should I containerize? Send a Git URL or a local path.",
        );
        state.set_pending_decision(decision.clone());

        let mut message = String::from(
            "Welcome! I'll take your application from source code to a running \
             Kubernetes deployment: analysis, Dockerfile, image build and push, \
             manifests, and rollout.",
        );
        if state.autopilot {
            message.push_str("\n\nAutopilot is on, so I'll move through the stages on my own.");
        } else {
            message.push_str("\n\nSay 'autopilot' at any time to let me move through the stages on my own.");
        }
        message.push_str("\n\n");
        message.push_str(&decision.question);

        Ok(ConversationResponse::waiting(Stage::Welcome, message).with_decision(decision))
    }

    fn accepts(&self, decision: &DecisionPoint, input: &str) -> bool {
        decision.id == REPOSITORY_DECISION && is_repository_reference(input)
    }
}

fn start_analysis(state: &mut ConversationState, reference: &str) -> ConversationResponse {
    state.pending_decision = None;
    state.set_stage(Stage::Analysis);
    ConversationResponse::success(
        Stage::Analysis,
        format!("Got it. Next I'll analyze {}.", reference),
    )
    .with_options(vec![ResponseOption::recommended("analyze", "Analyze the repository")])
    .continue_with("analyze")
}

/// Whether `input` reads as a Git URL or filesystem path
pub(crate) fn is_repository_reference(input: &str) -> bool {
    let input = input.trim();
    if input.is_empty() || input.chars().any(char::is_whitespace) {
        return false;
    }
    is_remote(input)
        || ["/", "./", "../", "~/"]
            .iter()
            .any(|prefix| input.starts_with(prefix))
}

fn is_remote(input: &str) -> bool {
    ["http://", "https://", "git@", "ssh://", "git://"]
        .iter()
        .any(|prefix| input.starts_with(prefix))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_reference_detection() {
        assert!(is_repository_reference("https://github.com/acme/web"));
        assert!(is_repository_reference("git@github.com:acme/web.git"));
        assert!(is_repository_reference("./services/api"));
        assert!(is_repository_reference("/home/me/app"));
        assert!(!is_repository_reference("hello there"));
        assert!(!is_repository_reference("autopilot"));
        assert!(!is_repository_reference(""));
    }
}
