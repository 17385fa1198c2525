use serde_json::{Map, Value};

use super::{GradingError, DEFAULT_UNREADABLE_REASON};
use crate::models::{GradingRecord, GradingResult};

/// Parse the model's raw text into a validated `GradingResult`.
///
/// An unreadable verdict is checked before the strict schema pass, so a
/// response flagged unreadable may omit the other fields.
pub fn parse_grading_response(response: &str) -> Result<GradingResult, GradingError> {
    let trimmed = response.trim();
    if trimmed.is_empty() {
        return Err(GradingError::EmptyResponse);
    }

    let json_str = strip_code_fence(trimmed);
    let value: Value = serde_json::from_str(json_str)
        .map_err(|e| GradingError::InvalidResponse(format!("not valid JSON: {e}")))?;

    let Value::Object(fields) = &value else {
        return Err(GradingError::InvalidResponse(
            "expected a single JSON object".into(),
        ));
    };

    if fields.get("isReadable").and_then(Value::as_bool) == Some(false) {
        let reason = fields
            .get("unreadableReason")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .unwrap_or(DEFAULT_UNREADABLE_REASON);
        return Err(GradingError::Unreadable(reason.to_string()));
    }

    require_item_pages(fields, "errors")?;
    require_item_pages(fields, "sentenceAnalysis")?;

    let record: GradingRecord = serde_json::from_value(value)
        .map_err(|e| GradingError::InvalidResponse(e.to_string()))?;

    Ok(GradingResult::from(record))
}

/// Every item of the `key` array must carry an integer `page`.
///
/// Stored history may hold items without a page, so the shared model types
/// keep `page` optional and the check lives here, on fresh responses only.
fn require_item_pages(fields: &Map<String, Value>, key: &str) -> Result<(), GradingError> {
    let Some(items) = fields.get(key).and_then(Value::as_array) else {
        return Ok(());
    };
    for (i, item) in items.iter().enumerate() {
        if item.get("page").and_then(Value::as_u64).is_none() {
            return Err(GradingError::InvalidResponse(format!(
                "{key}[{i}] is missing an integer `page`"
            )));
        }
    }
    Ok(())
}

/// Strip an optional ```json ... ``` (or bare ```) fence around the payload.
fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.trim_end();
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
