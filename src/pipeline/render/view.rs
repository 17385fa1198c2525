//! View state over an aligned result.
//!
//! Alignment runs once per result. Selection, filters and mode only change
//! how the computed segments are presented.

use serde::Serialize;

use super::alignment::{align, Segment};
use crate::models::{ErrorCategory, ErrorDetail, GradingResult};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewMode {
    /// Recognized text with marked errors.
    #[default]
    Annotated,
    /// Marked spans replaced by their corrections.
    Corrected,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ViewState {
    pub selected_error: Option<usize>,
    pub category_filter: Option<ErrorCategory>,
    pub page_filter: Option<u32>,
    pub mode: ViewMode,
}

impl ViewState {
    /// True when `error` passes both filters. An error without a page only
    /// passes when no page filter is set.
    pub fn passes_filters(&self, error: &ErrorDetail) -> bool {
        let category_ok = self.category_filter.map_or(true, |c| error.category == c);
        let page_ok = self.page_filter.map_or(true, |p| error.page == Some(p));
        category_ok && page_ok
    }
}

/// A segment plus its presentation flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisplaySegment<'a> {
    pub segment: &'a Segment,
    /// Marked and passing the filters. Always false for plain runs.
    pub active: bool,
    pub selected: bool,
}

/// An aligned result with its view state.
#[derive(Debug, Clone)]
pub struct ResultView<'a> {
    result: &'a GradingResult,
    segments: Vec<Segment>,
    state: ViewState,
}

impl<'a> ResultView<'a> {
    pub fn new(result: &'a GradingResult) -> Self {
        Self {
            result,
            segments: align(result.recognized_text(), result.errors()),
            state: ViewState::default(),
        }
    }

    pub fn with_state(result: &'a GradingResult, state: ViewState) -> Self {
        let mut view = Self::new(result);
        view.state = state;
        view
    }

    pub fn result(&self) -> &GradingResult {
        self.result
    }

    pub fn state(&self) -> &ViewState {
        &self.state
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Select an error, or clear the selection when it is already selected.
    /// Out-of-range indices are ignored.
    pub fn toggle_selection(&mut self, error_index: usize) {
        if error_index >= self.result.errors().len() {
            return;
        }
        self.state.selected_error = if self.state.selected_error == Some(error_index) {
            None
        } else {
            Some(error_index)
        };
    }

    pub fn set_category_filter(&mut self, category: Option<ErrorCategory>) {
        self.state.category_filter = category;
    }

    pub fn set_page_filter(&mut self, page: Option<u32>) {
        self.state.page_filter = page;
    }

    pub fn set_mode(&mut self, mode: ViewMode) {
        self.state.mode = mode;
    }

    pub fn is_active(&self, error_index: usize) -> bool {
        self.result
            .errors()
            .get(error_index)
            .is_some_and(|e| self.state.passes_filters(e))
    }

    pub fn display_segments(&self) -> Vec<DisplaySegment<'_>> {
        self.segments
            .iter()
            .map(|segment| {
                let index = segment.error_index();
                DisplaySegment {
                    segment,
                    active: index.is_some_and(|i| self.is_active(i)),
                    selected: index.is_some() && index == self.state.selected_error,
                }
            })
            .collect()
    }

    /// Errors passing the filters, with their indices.
    pub fn visible_errors(&self) -> Vec<(usize, &ErrorDetail)> {
        self.result
            .errors()
            .iter()
            .enumerate()
            .filter(|(_, e)| self.state.passes_filters(e))
            .collect()
    }

    /// Distinct pages referenced by the errors, ascending.
    pub fn pages(&self) -> Vec<u32> {
        let mut pages: Vec<u32> = self.result.errors().iter().filter_map(|e| e.page).collect();
        pages.sort_unstable();
        pages.dedup();
        pages
    }

    /// Text for the current mode. In corrected mode every marked span is
    /// replaced by its correction, regardless of filters.
    pub fn text(&self) -> String {
        match self.state.mode {
            ViewMode::Annotated => self.result.recognized_text().to_string(),
            ViewMode::Corrected => self
                .segments
                .iter()
                .map(|s| match s {
                    Segment::Plain { text } => text.as_str(),
                    Segment::Marked { correction, .. } => correction.as_str(),
                })
                .collect(),
        }
    }
}
