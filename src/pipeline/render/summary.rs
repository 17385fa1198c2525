//! Plain-text report for terminal output.

use super::alignment::Segment;
use super::view::{ResultView, ViewMode};

/// Full report: score header, text, error list, sentence notes, assessment.
pub fn render_report(view: &ResultView<'_>) -> String {
    let result = view.result();
    let mut out = format!(
        "Score: {:.1}/10 ({})\nErrors: {}   Words: {}   Correct sentences: {}/{}\n",
        result.score(),
        result.score_band().label(),
        result.error_count(),
        result.word_count(),
        result.correct_sentences(),
        result.total_sentences()
    );

    let state = view.state();
    if state.category_filter.is_some() || state.page_filter.is_some() {
        let category = state.category_filter.map_or("all", |c| c.as_str());
        let page = state
            .page_filter
            .map_or_else(|| "all".to_string(), |p| p.to_string());
        out.push_str(&format!("Filter: category {category}, page {page}\n"));
    }

    out.push('\n');
    match state.mode {
        ViewMode::Annotated => {
            out.push_str("Recognized text:\n");
            out.push_str(&annotated_text(view));
        }
        ViewMode::Corrected => {
            out.push_str("Corrected text:\n");
            out.push_str(&view.text());
        }
    }
    out.push('\n');

    let visible = view.visible_errors();
    if !visible.is_empty() {
        out.push_str(&format!("\nErrors ({}):\n", visible.len()));
        for (i, error) in visible {
            let page = error.page.map(|p| format!(", page {p}")).unwrap_or_default();
            out.push_str(&format!(
                "  #{} [{}{}] {} -> {}\n      {}\n",
                i + 1,
                error.category,
                page,
                error.wrong,
                error.correct,
                error.explanation
            ));
        }
    }

    let mut flagged = result.sentences_with_errors().peekable();
    if flagged.peek().is_some() {
        out.push_str("\nSentences with errors:\n");
        for sentence in flagged {
            out.push_str(&format!(
                "  - \"{}\"\n    -> \"{}\"\n    {}\n",
                sentence.original, sentence.corrected, sentence.feedback
            ));
        }
    }

    let assessment = result.assessment();
    out.push_str(&format!(
        "\nAssessment:\n  Strength:    {}\n  Weakness:    {}\n  Improvement: {}\n",
        assessment.strength, assessment.weakness, assessment.improvement
    ));
    out.push_str(&format!("\nParent report:\n  {}\n", assessment.parent_report));

    out
}

/// Recognized text with active errors bracketed as `[wrong -> correct]`.
/// The selected error is starred; filtered-out errors stay plain.
pub fn annotated_text(view: &ResultView<'_>) -> String {
    view.display_segments()
        .into_iter()
        .map(|display| match display.segment {
            Segment::Plain { text } => text.clone(),
            Segment::Marked {
                text, correction, ..
            } if display.active => {
                if display.selected {
                    format!("[*{text} -> {correction}*]")
                } else {
                    format!("[{text} -> {correction}]")
                }
            }
            Segment::Marked { text, .. } => text.clone(),
        })
        .collect()
}
