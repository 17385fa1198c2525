use std::sync::Arc;
use std::time::Instant;

use super::parser::parse_grading_response;
use super::prompt::{build_instruction, response_schema};
use super::types::{GradingBackend, GradingRequest, PagePart};
use super::GradingError;
use crate::models::GradingResult;
use crate::pipeline::preprocess::PreparedImage;

/// Grades a set of prepared pages with one model call.
pub struct Grader {
    backend: Arc<dyn GradingBackend>,
}

impl Grader {
    pub fn new(backend: Arc<dyn GradingBackend>) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &Arc<dyn GradingBackend> {
        &self.backend
    }

    /// Send every page and parse the verdict. No retry.
    pub async fn grade(&self, images: &[PreparedImage]) -> Result<GradingResult, GradingError> {
        let request = build_request(images)?;
        let backend = self.backend.clone();
        let pages = request.page_count();

        let raw = tokio::task::spawn_blocking(move || {
            let _span = tracing::info_span!("grade_submission", pages).entered();
            let start = Instant::now();
            let result = backend.complete(&request);
            tracing::info!(
                elapsed_ms = %start.elapsed().as_millis(),
                ok = result.is_ok(),
                "Grading call finished"
            );
            result
        })
        .await
        .map_err(|e| GradingError::Interrupted(e.to_string()))??;

        let result = parse_grading_response(&raw);
        match &result {
            Ok(graded) => tracing::info!(
                score = graded.score(),
                errors = graded.error_count(),
                "Submission graded"
            ),
            Err(e) => tracing::warn!(
                error = %e,
                response_len = raw.len(),
                "Grading response rejected"
            ),
        }
        result
    }
}

/// Label every page in order and attach the instruction block.
pub fn build_request(images: &[PreparedImage]) -> Result<GradingRequest, GradingError> {
    if images.is_empty() {
        return Err(GradingError::NoImages);
    }

    Ok(GradingRequest {
        pages: images
            .iter()
            .enumerate()
            .map(|(i, image)| PagePart::from_image(i, image))
            .collect(),
        instruction: build_instruction(images.len()),
        schema: response_schema(),
    })
}
