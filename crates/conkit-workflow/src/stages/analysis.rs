use async_trait::async_trait;
use conkit_core::{Error, Result, RepositoryAnalysis};

use super::{StageHandler, Turn};
use crate::recovery::fallback_options;
use crate::response::{ConversationResponse, ResponseOption};
use crate::stage::Stage;
use crate::state::ConversationState;
use crate::tools::AnalyzeParams;

/// Runs repository analysis
pub struct AnalysisHandler;

#[async_trait]
impl StageHandler for AnalysisHandler {
    async fn handle(
        &self,
        turn: &mut Turn<'_>,
        state: &mut ConversationState,
        _input: &str,
    ) -> Result<ConversationResponse> {
        let session = turn.session().await?;
        if session.repo_url.is_none() && session.repo_path.is_none() {
            return Err(Error::Workflow(
                "no repository has been selected yet".to_string(),
            ));
        }

        let branch = state
            .context
            .extra
            .get("branch")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        let params = AnalyzeParams {
            repo_url: session.repo_url.clone(),
            repo_path: session.repo_path.clone(),
            branch,
        };

        let analysis = match turn.call(params).await? {
            Ok(analysis) => analysis,
            Err(err) => {
                state.last_tool_error = Some(err.clone());
                // Later stages depend on the analysis, so it cannot be skipped
                return Ok(ConversationResponse::tool_failure(
                    Stage::Analysis,
                    format!("Repository analysis failed: {}", err.message),
                    err,
                )
                .with_options(fallback_options(Stage::Analysis, true)));
            }
        };

        let summary = describe(&analysis);
        state.add_artifact("analysis", "Repository analysis", summary.clone());
        turn.update_session(move |s| s.repo_analysis = Some(analysis))
            .await?;

        state.last_tool_error = None;
        state.set_stage(Stage::Dockerfile);
        Ok(ConversationResponse::success(
            Stage::Dockerfile,
            format!("{}\n\nNext I'll generate a Dockerfile.", summary),
        )
        .with_options(vec![ResponseOption::recommended(
            "generate",
            "Generate a Dockerfile",
        )])
        .continue_with("generate"))
    }
}

fn describe(analysis: &RepositoryAnalysis) -> String {
    let mut lines = vec![format!("Language: {}", analysis.language)];
    if let Some(framework) = &analysis.framework {
        lines.push(format!("Framework: {}", framework));
    }
    if let Some(port) = analysis.port {
        lines.push(format!("Port: {}", port));
    }
    if !analysis.dependencies.is_empty() {
        lines.push(format!("Dependencies: {}", analysis.dependencies.len()));
    }
    if !analysis.entry_points.is_empty() {
        lines.push(format!("Entry points: {}", analysis.entry_points.join(", ")));
    }
    for suggestion in &analysis.suggestions {
        lines.push(format!("Tip: {}", suggestion));
    }
    format!("Analysis complete.\n{}", lines.join("\n"))
}
