pub mod types;
pub mod prompt;
pub mod parser;
pub mod ollama;
pub mod client;

pub use types::*;
pub use prompt::*;
pub use parser::*;
pub use ollama::*;
pub use client::*;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GradingError {
    #[error("No images to grade")]
    NoImages,

    #[error("Grading model returned an empty response")]
    EmptyResponse,

    #[error("Invalid grading response: {0}")]
    InvalidResponse(String),

    #[error("Submission is unreadable: {0}")]
    Unreadable(String),

    #[error("Grading service is not reachable at {0}")]
    Connection(String),

    #[error("HTTP client error: {0}")]
    Http(String),

    #[error("Grading service returned error (status {status}): {body}")]
    Service { status: u16, body: String },

    #[error("Grading task did not complete: {0}")]
    Interrupted(String),
}

/// Reason shown when the model flags a submission unreadable without saying why.
pub const DEFAULT_UNREADABLE_REASON: &str = "The AI could not read the handwriting.";

impl GradingError {
    /// One dismissible message for the user.
    pub fn user_message(&self) -> String {
        match self {
            Self::NoImages => "Add at least one page before grading.".into(),
            Self::EmptyResponse | Self::InvalidResponse(_) => {
                "The AI response was not valid. Please try again.".into()
            }
            Self::Unreadable(reason) => reason.clone(),
            Self::Connection(_) | Self::Http(_) | Self::Service { .. } | Self::Interrupted(_) => {
                "The grading service ran into a problem. Please try again.".into()
            }
        }
    }

    /// True for failures of the service or transport rather than the content.
    pub fn is_service_failure(&self) -> bool {
        matches!(
            self,
            Self::Connection(_) | Self::Http(_) | Self::Service { .. } | Self::Interrupted(_)
        )
    }
}
