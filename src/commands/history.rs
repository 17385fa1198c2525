//! History commands.

use super::{render_result, DisplayOptions};
use crate::core_state::CoreState;

/// One line per entry, newest first.
pub fn list_history(state: &CoreState, json: bool) -> Result<String, String> {
    let entries = state.show_history().map_err(|e| e.user_message())?;

    if json {
        return serde_json::to_string_pretty(&entries).map_err(|e| e.to_string());
    }
    if entries.is_empty() {
        return Ok("No graded submissions yet.\n".to_string());
    }

    Ok(entries
        .iter()
        .map(|entry| {
            let when = entry
                .created_local()
                .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_default();
            format!(
                "{}  {}  {}  score {:.1}  {} errors  {} words\n",
                entry.id,
                when,
                entry.title,
                entry.result.score(),
                entry.result.error_count(),
                entry.result.word_count()
            )
        })
        .collect())
}

/// Re-render a stored result. No grading call is made.
pub fn show_history(
    state: &CoreState,
    id: &str,
    options: &DisplayOptions,
) -> Result<String, String> {
    let result = state.select_history(id).map_err(|e| e.user_message())?;
    render_result(&result, options)
}

pub fn delete_history(state: &CoreState, id: &str) -> Result<String, String> {
    state.delete_history(id).map_err(|e| e.user_message())?;
    Ok(format!("Deleted {id}\n"))
}

pub fn clear_history(state: &CoreState) -> Result<String, String> {
    state.clear_history().map_err(|e| e.user_message())?;
    Ok("History cleared\n".to_string())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::history::HistoryStore;
    use crate::models::grading::fixtures::result;
    use crate::pipeline::grading::MockGradingBackend;
    use crate::pipeline::intake::NoProgress;
    use crate::pipeline::preprocess::ImagePreparer;

    fn state_with_history(dir: &tempfile::TempDir, texts: &[&str]) -> (CoreState, Vec<String>) {
        let path = dir.path().join("history_v1.json");
        let mut store = HistoryStore::open(&path);
        let ids = texts
            .iter()
            .map(|t| store.add(result(t, vec![])).unwrap().id.clone())
            .collect();

        let state = CoreState::new(
            ImagePreparer::standard(),
            Arc::new(MockGradingBackend::new("{}")),
            HistoryStore::open(&path),
            Arc::new(NoProgress),
        )
        .unwrap();
        (state, ids)
    }

    #[test]
    fn empty_history_message() {
        let dir = tempfile::tempdir().unwrap();
        let (state, _) = state_with_history(&dir, &[]);
        assert_eq!(list_history(&state, false).unwrap(), "No graded submissions yet.\n");
        assert_eq!(list_history(&state, true).unwrap(), "[]");
    }

    #[test]
    fn list_shows_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let (state, ids) = state_with_history(&dir, &["one two", "three"]);
        let out = list_history(&state, false).unwrap();
        let lines: Vec<_> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with(&ids[1]));
        assert!(lines[1].contains("2 words"));
        assert!(lines[0].contains("Submission "));
    }

    #[test]
    fn show_delete_clear() {
        let dir = tempfile::tempdir().unwrap();
        let (state, ids) = state_with_history(&dir, &["a", "b"]);

        let shown = show_history(&state, &ids[0], &DisplayOptions::default()).unwrap();
        assert!(shown.contains("Recognized text:\na"));

        delete_history(&state, &ids[0]).unwrap();
        assert!(show_history(&state, &ids[0], &DisplayOptions::default()).is_err());

        clear_history(&state).unwrap();
        assert_eq!(list_history(&state, true).unwrap(), "[]");
    }
}
