use serde_json::{json, Value};

use crate::models::ErrorCategory;

/// Instruction block sent after the page images.
pub fn build_instruction(page_count: usize) -> String {
    let categories = ErrorCategory::all()
        .iter()
        .map(|c| c.as_str())
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        r#"You are a senior English teacher and linguist with excellent handwriting recognition (OCR) skills. Review the student's work across the {page_count} page image(s) above.

HANDWRITING RECOGNITION:
1. Read every handwriting style carefully: slanted, cursive, a child's unformed letters, faded ink.
2. When a word or character is ambiguous ('5' and 'S', 'u' and 'v', 'n' and 'r'), use the sentence context and English grammar to infer what the student meant.
3. 'recognizedText' must reflect exactly what the student wrote, original mistakes included.

ANALYSIS PRIORITIES:
1. Complex structures: tenses, conditionals, passive voice, relative clauses, subject-verb agreement in complex sentences.
2. Sentence construction: run-on sentences, fragments, pointless repetition, awkward or unnatural phrasing.
3. Do NOT count capitalization or punctuation slips as errors unless they change the meaning of the sentence.

PAGES:
- Record the page each error is on (page 1, page 2, ...).
- Prefer page numbers written by the teacher on the sheet; otherwise use the image order.
- Every item in 'errors' and 'sentenceAnalysis' must have a 'page' field.

ERRORS:
- 'wrong' must be copied verbatim from 'recognizedText' so it can be located there.
- 'type' is one of: {categories}.

PARENT REPORT (assessment.parentReport):
- Structure: [what the student has mastered] -> [specific recurring mistakes] -> [a real example from the work with its correction] -> [the rule explained simply].
- No greetings, promises or remarks about handwriting neatness or attitude. Subject matter only.

TECHNICAL:
- Check every word on every page.
- score = (correctSentences / totalSentences) * 10.
- If the pages cannot be read, set isReadable to false and explain why in unreadableReason.

Return ONLY the JSON object."#
    )
}

/// JSON schema of the expected response.
///
/// `errorCount` is listed for the model's benefit but is not required;
/// the count is always recomputed from `errors`.
pub fn response_schema() -> Value {
    let categories: Vec<&str> = ErrorCategory::all().iter().map(|c| c.as_str()).collect();

    json!({
        "type": "object",
        "properties": {
            "isReadable": { "type": "boolean" },
            "unreadableReason": { "type": "string" },
            "recognizedText": { "type": "string" },
            "score": { "type": "number" },
            "errorCount": { "type": "integer" },
            "correctSentences": { "type": "integer" },
            "totalSentences": { "type": "integer" },
            "errors": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "wrong": { "type": "string" },
                        "correct": { "type": "string" },
                        "type": { "type": "string", "enum": categories },
                        "explanation": { "type": "string" },
                        "page": { "type": "integer" }
                    },
                    "required": ["wrong", "correct", "type", "explanation", "page"]
                }
            },
            "sentenceAnalysis": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "original": { "type": "string" },
                        "corrected": { "type": "string" },
                        "isCorrect": { "type": "boolean" },
                        "feedback": { "type": "string" },
                        "page": { "type": "integer" }
                    },
                    "required": ["original", "corrected", "isCorrect", "feedback", "page"]
                }
            },
            "assessment": {
                "type": "object",
                "properties": {
                    "strength": { "type": "string" },
                    "weakness": { "type": "string" },
                    "improvement": { "type": "string" },
                    "parentReport": { "type": "string" }
                },
                "required": ["strength", "weakness", "improvement", "parentReport"]
            }
        },
        "required": REQUIRED_FIELDS
    })
}

/// Top-level fields every response must carry.
pub const REQUIRED_FIELDS: &[&str] = &[
    "isReadable",
    "recognizedText",
    "score",
    "errors",
    "sentenceAnalysis",
    "assessment",
    "correctSentences",
    "totalSentences",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instruction_mentions_page_count() {
        assert!(build_instruction(3).contains("3 page image(s)"));
    }

    #[test]
    fn instruction_lists_categories() {
        let text = build_instruction(1);
        for category in ErrorCategory::all() {
            assert!(text.contains(category.as_str()));
        }
    }

    #[test]
    fn schema_requires_core_fields_not_error_count() {
        let schema = response_schema();
        let required: Vec<&str> = schema["required"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap())
            .collect();
        assert_eq!(required.len(), 8);
        assert!(required.contains(&"score"));
        assert!(!required.contains(&"errorCount"));
    }

    #[test]
    fn schema_restricts_error_type() {
        let schema = response_schema();
        let allowed = &schema["properties"]["errors"]["items"]["properties"]["type"]["enum"];
        assert_eq!(allowed.as_array().unwrap().len(), 5);
    }
}
