use std::sync::Mutex;

use super::GradingError;
use crate::pipeline::preprocess::PreparedImage;

/// One labelled page of a grading request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PagePart {
    /// "Page N content:" (1-based, in submission order).
    pub label: String,
    pub base64: String,
    pub mime_type: String,
}

/// Everything sent to the grading model in one call.
#[derive(Debug, Clone, PartialEq)]
pub struct GradingRequest {
    pub pages: Vec<PagePart>,
    pub instruction: String,
    /// JSON schema the response must follow.
    pub schema: serde_json::Value,
}

impl GradingRequest {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}

/// Label placed in front of page `index` (0-based).
pub fn page_label(index: usize) -> String {
    format!("Page {} content:", index + 1)
}

impl PagePart {
    pub fn from_image(index: usize, image: &PreparedImage) -> Self {
        Self {
            label: page_label(index),
            base64: image.base64.clone(),
            mime_type: image.mime_type.clone(),
        }
    }
}

/// Multimodal model that turns a grading request into raw response text.
///
/// Calls are blocking; async callers go through `spawn_blocking`.
pub trait GradingBackend: Send + Sync {
    fn complete(&self, request: &GradingRequest) -> Result<String, GradingError>;

    /// Check the service is up and `model` is installed.
    fn is_model_available(&self, model: &str) -> Result<bool, GradingError>;
}

/// Mock grading backend for testing. Returns a configurable response and
/// remembers the last request.
pub struct MockGradingBackend {
    response: Result<String, GradingError>,
    last_request: Mutex<Option<GradingRequest>>,
    calls: Mutex<usize>,
}

impl MockGradingBackend {
    pub fn new(response: &str) -> Self {
        Self {
            response: Ok(response.to_string()),
            last_request: Mutex::new(None),
            calls: Mutex::new(0),
        }
    }

    pub fn failing(error: GradingError) -> Self {
        Self {
            response: Err(error),
            last_request: Mutex::new(None),
            calls: Mutex::new(0),
        }
    }

    pub fn last_request(&self) -> Option<GradingRequest> {
        self.last_request.lock().ok().and_then(|r| r.clone())
    }

    pub fn calls(&self) -> usize {
        self.calls.lock().map(|c| *c).unwrap_or(0)
    }
}

impl GradingBackend for MockGradingBackend {
    fn complete(&self, request: &GradingRequest) -> Result<String, GradingError> {
        if let Ok(mut calls) = self.calls.lock() {
            *calls += 1;
        }
        if let Ok(mut last) = self.last_request.lock() {
            *last = Some(request.clone());
        }
        self.response.clone()
    }

    fn is_model_available(&self, _model: &str) -> Result<bool, GradingError> {
        match &self.response {
            Ok(_) => Ok(true),
            Err(e) => Err(e.clone()),
        }
    }
}
