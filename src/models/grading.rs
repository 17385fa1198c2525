//! Grading result types shared by the grading client, the renderer and the
//! history store.
//!
//! Field names follow the camelCase JSON contract of the grading model and
//! of the persisted history file.

use serde::{Deserialize, Serialize};

use super::enums::ErrorCategory;

/// One mistake reported by the grading model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetail {
    /// Verbatim erroneous substring as it appears in the recognized text.
    pub wrong: String,
    /// Suggested replacement.
    pub correct: String,
    #[serde(rename = "type")]
    pub category: ErrorCategory,
    pub explanation: String,
    /// Always present on fresh responses; optional for older history files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    /// Sentence the error was found in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_instruction: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SentenceAnalysis {
    pub original: String,
    pub corrected: String,
    pub is_correct: bool,
    pub feedback: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assessment {
    pub strength: String,
    pub weakness: String,
    pub improvement: String,
    /// Summary addressed to the student's parents.
    pub parent_report: String,
}

/// Wire shape of a grading result.
///
/// Every non-`Option` field is required: serde rejects a response that
/// omits one. `errorCount` is accepted but never trusted.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradingRecord {
    pub is_readable: bool,
    #[serde(default)]
    pub unreadable_reason: Option<String>,
    pub recognized_text: String,
    pub score: f64,
    #[serde(default)]
    pub error_count: Option<u32>,
    pub correct_sentences: u32,
    pub total_sentences: u32,
    pub errors: Vec<ErrorDetail>,
    pub sentence_analysis: Vec<SentenceAnalysis>,
    pub assessment: Assessment,
}

/// Finalized outcome of one grading call.
///
/// Fields are private so the `error_count == errors.len()` invariant holds
/// for every value: construction always goes through `From<GradingRecord>`,
/// both for fresh responses and for history loaded from disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "GradingRecord")]
pub struct GradingResult {
    is_readable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    unreadable_reason: Option<String>,
    recognized_text: String,
    score: f64,
    error_count: u32,
    correct_sentences: u32,
    total_sentences: u32,
    errors: Vec<ErrorDetail>,
    sentence_analysis: Vec<SentenceAnalysis>,
    assessment: Assessment,
}

impl From<GradingRecord> for GradingResult {
    fn from(record: GradingRecord) -> Self {
        let error_count = record.errors.len() as u32;
        if let Some(reported) = record.error_count {
            if reported != error_count {
                tracing::debug!(
                    reported,
                    actual = error_count,
                    "Model error count disagrees with error list"
                );
            }
        }
        let unreadable_reason = if record.is_readable {
            None
        } else {
            record.unreadable_reason
        };

        Self {
            is_readable: record.is_readable,
            unreadable_reason,
            recognized_text: record.recognized_text,
            score: record.score,
            error_count,
            correct_sentences: record.correct_sentences,
            total_sentences: record.total_sentences,
            errors: record.errors,
            sentence_analysis: record.sentence_analysis,
            assessment: record.assessment,
        }
    }
}

impl GradingResult {
    pub fn is_readable(&self) -> bool {
        self.is_readable
    }

    pub fn unreadable_reason(&self) -> Option<&str> {
        self.unreadable_reason.as_deref()
    }

    pub fn recognized_text(&self) -> &str {
        &self.recognized_text
    }

    /// Overall score on a 0–10 scale.
    pub fn score(&self) -> f64 {
        self.score
    }

    /// Always the length of `errors()`.
    pub fn error_count(&self) -> u32 {
        self.error_count
    }

    pub fn correct_sentences(&self) -> u32 {
        self.correct_sentences
    }

    pub fn total_sentences(&self) -> u32 {
        self.total_sentences
    }

    pub fn errors(&self) -> &[ErrorDetail] {
        &self.errors
    }

    pub fn sentence_analysis(&self) -> &[SentenceAnalysis] {
        &self.sentence_analysis
    }

    pub fn assessment(&self) -> &Assessment {
        &self.assessment
    }

    /// Number of whitespace-separated words in the recognized text.
    pub fn word_count(&self) -> usize {
        self.recognized_text.split_whitespace().count()
    }

    /// Sentences the model marked as incorrect, in original order.
    pub fn sentences_with_errors(&self) -> impl Iterator<Item = &SentenceAnalysis> {
        self.sentence_analysis.iter().filter(|s| !s.is_correct)
    }

    pub fn score_band(&self) -> ScoreBand {
        ScoreBand::from_score(self.score)
    }
}

/// Coarse score bucket used for colouring and summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreBand {
    /// 8.5 and above.
    Excellent,
    /// 7 to 8.5.
    Good,
    /// 5 to 7.
    Fair,
    NeedsWork,
}

impl ScoreBand {
    pub fn from_score(score: f64) -> Self {
        if score >= 8.5 {
            Self::Excellent
        } else if score >= 7.0 {
            Self::Good
        } else if score >= 5.0 {
            Self::Fair
        } else {
            Self::NeedsWork
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Excellent => "excellent",
            Self::Good => "good",
            Self::Fair => "fair",
            Self::NeedsWork => "needs work",
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn error(
        wrong: &str,
        correct: &str,
        category: ErrorCategory,
        page: Option<u32>,
    ) -> ErrorDetail {
        ErrorDetail {
            wrong: wrong.into(),
            correct: correct.into(),
            category,
            explanation: format!("'{wrong}' should be '{correct}'"),
            page,
            context: None,
            task_name: None,
            task_instruction: None,
        }
    }

    pub fn assessment() -> Assessment {
        Assessment {
            strength: "Clear ideas".into(),
            weakness: "Verb agreement".into(),
            improvement: "Practise present simple".into(),
            parent_report: "Your child has mastered basic word order.".into(),
        }
    }

    pub fn result(text: &str, errors: Vec<ErrorDetail>) -> GradingResult {
        GradingResult::from(GradingRecord {
            is_readable: true,
            unreadable_reason: None,
            recognized_text: text.into(),
            score: 6.5,
            error_count: None,
            correct_sentences: 1,
            total_sentences: 2,
            errors,
            sentence_analysis: vec![
                SentenceAnalysis {
                    original: "I has a book.".into(),
                    corrected: "I have a book.".into(),
                    is_correct: false,
                    feedback: "Use 'have' with 'I'.".into(),
                    page: Some(1),
                },
                SentenceAnalysis {
                    original: "It is red.".into(),
                    corrected: "It is red.".into(),
                    is_correct: true,
                    feedback: "Correct.".into(),
                    page: Some(1),
                },
            ],
            assessment: assessment(),
        })
    }
}
