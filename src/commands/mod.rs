//! User-facing command handlers.
//!
//! Each handler drives `CoreState` and returns printable output. Errors come
//! back as the user message, ready to show as-is.

pub mod grading;
pub mod history;

use std::sync::Arc;

use serde::Serialize;

use crate::models::{ErrorCategory, GradingResult};
use crate::pipeline::grading::{GradingBackend, GradingError};
use crate::pipeline::render::{render_report, ResultView, ViewMode, ViewState};

/// Granular grading-service status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusLevel {
    /// Service reachable and model installed
    Ready,
    /// Service reachable but the model is missing
    ModelMissing,
    /// Service not reachable or other fatal error
    Error,
}

/// Grading service availability.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    pub model: String,
    pub level: StatusLevel,
    /// Human-readable status summary.
    pub summary: String,
}

/// Check the grading service is up and `model` is installed.
///
/// Runs on a blocking thread (HTTP call).
pub async fn health_check(backend: Arc<dyn GradingBackend>, model: String) -> ServiceStatus {
    let probe_model = model.clone();
    let outcome = tokio::task::spawn_blocking(move || backend.is_model_available(&probe_model))
        .await
        .unwrap_or_else(|e| Err(GradingError::Interrupted(e.to_string())));

    let (level, summary) = match outcome {
        Ok(true) => (StatusLevel::Ready, format!("Grading ready: {model}")),
        Ok(false) => (
            StatusLevel::ModelMissing,
            format!("Service running, but model '{model}' is not installed"),
        ),
        Err(e) => (StatusLevel::Error, format!("Grading service unavailable: {e}")),
    };
    tracing::debug!(?level, "Health check");

    ServiceStatus {
        model,
        level,
        summary,
    }
}

/// How a result is displayed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisplayOptions {
    pub json: bool,
    pub category: Option<ErrorCategory>,
    pub page: Option<u32>,
    pub corrected: bool,
}

impl DisplayOptions {
    fn view_state(&self) -> ViewState {
        ViewState {
            selected_error: None,
            category_filter: self.category,
            page_filter: self.page,
            mode: if self.corrected {
                ViewMode::Corrected
            } else {
                ViewMode::Annotated
            },
        }
    }
}

/// Text report, or JSON with the aligned segments and view state.
pub fn render_result(result: &GradingResult, options: &DisplayOptions) -> Result<String, String> {
    let view = ResultView::with_state(result, options.view_state());
    if options.json {
        let payload = serde_json::json!({
            "result": result,
            "segments": view.segments(),
            "view": view.state(),
            "text": view.text(),
        });
        serde_json::to_string_pretty(&payload).map_err(|e| e.to_string())
    } else {
        Ok(render_report(&view))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::grading::fixtures::{error, result};
    use crate::pipeline::grading::MockGradingBackend;

    #[tokio::test]
    async fn health_ready_with_reachable_backend() {
        let backend = Arc::new(MockGradingBackend::new("{}"));
        let status = health_check(backend, "gemma3:12b".into()).await;
        assert_eq!(status.level, StatusLevel::Ready);
        assert!(status.summary.contains("gemma3:12b"));
    }

    #[tokio::test]
    async fn health_error_when_unreachable() {
        let backend = MockGradingBackend::failing(GradingError::Connection("http://x".into()));
        let status = health_check(Arc::new(backend), "m".into()).await;
        assert_eq!(status.level, StatusLevel::Error);
    }

    #[test]
    fn json_output_carries_segments_and_view() {
        let graded = result(
            "I has a book",
            vec![error("has", "have", ErrorCategory::Grammar, Some(1))],
        );
        let options = DisplayOptions {
            json: true,
            corrected: true,
            page: Some(1),
            ..DisplayOptions::default()
        };
        let out: serde_json::Value =
            serde_json::from_str(&render_result(&graded, &options).unwrap()).unwrap();

        assert_eq!(out["result"]["errorCount"], 1);
        assert_eq!(out["segments"][1]["kind"], "marked");
        assert_eq!(out["view"]["mode"], "corrected");
        assert_eq!(out["view"]["page_filter"], 1);
        assert_eq!(out["text"], "I have a book");
    }

    #[test]
    fn text_output_uses_report() {
        let graded = result("fine", vec![]);
        let out = render_result(&graded, &DisplayOptions::default()).unwrap();
        assert!(out.starts_with("Score: 6.5/10"));
    }
}
