//! Anchoring reported errors onto the recognized text.
//!
//! The model reports each error as a verbatim substring (`wrong`) with no
//! position. Every occurrence of every substring is a candidate; candidates
//! are ordered by position and accepted greedily so marked spans never
//! overlap. Errors that collide with an earlier span, or never occur, are
//! left unanchored.

use serde::Serialize;

use crate::models::{ErrorCategory, ErrorDetail};

/// A run of the recognized text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Segment {
    Plain {
        text: String,
    },
    Marked {
        text: String,
        /// Index into the result's error list.
        error_index: usize,
        category: ErrorCategory,
        correction: String,
    },
}

impl Segment {
    pub fn text(&self) -> &str {
        match self {
            Self::Plain { text } | Self::Marked { text, .. } => text,
        }
    }

    pub fn error_index(&self) -> Option<usize> {
        match self {
            Self::Plain { .. } => None,
            Self::Marked { error_index, .. } => Some(*error_index),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Candidate {
    start: usize,
    end: usize,
    error_index: usize,
}

/// Split `text` into plain and marked segments.
///
/// Concatenating the segment texts always yields `text` unchanged.
pub fn align(text: &str, errors: &[ErrorDetail]) -> Vec<Segment> {
    let mut candidates: Vec<Candidate> = errors
        .iter()
        .enumerate()
        .flat_map(|(i, error)| {
            find_all_case_insensitive(text, &error.wrong)
                .into_iter()
                .map(move |(start, end)| Candidate {
                    start,
                    end,
                    error_index: i,
                })
        })
        .collect();

    candidates.sort_by(|a, b| {
        a.start
            .cmp(&b.start)
            .then((b.end - b.start).cmp(&(a.end - a.start)))
            .then(a.error_index.cmp(&b.error_index))
    });

    let mut segments = Vec::new();
    let mut cursor = 0;

    for candidate in candidates {
        if candidate.start < cursor {
            continue;
        }
        if candidate.start > cursor {
            segments.push(Segment::Plain {
                text: text[cursor..candidate.start].to_string(),
            });
        }
        let error = &errors[candidate.error_index];
        segments.push(Segment::Marked {
            text: text[candidate.start..candidate.end].to_string(),
            error_index: candidate.error_index,
            category: error.category,
            correction: error.correct.clone(),
        });
        cursor = candidate.end;
    }

    if cursor < text.len() {
        segments.push(Segment::Plain {
            text: text[cursor..].to_string(),
        });
    }

    segments
}

/// Byte ranges of every non-overlapping occurrence of `needle` in
/// `haystack`, ignoring case. Scanning resumes after each match.
/// A blank needle never matches.
fn find_all_case_insensitive(haystack: &str, needle: &str) -> Vec<(usize, usize)> {
    if needle.trim().is_empty() {
        return Vec::new();
    }

    let needle_chars: Vec<char> = needle.chars().collect();
    let mut matches = Vec::new();
    let mut from = 0;

    while from < haystack.len() {
        let found = haystack[from..]
            .char_indices()
            .find_map(|(offset, _)| {
                let start = from + offset;
                match_at(haystack, start, &needle_chars).map(|end| (start, end))
            });

        match found {
            Some((start, end)) => {
                matches.push((start, end));
                from = end;
            }
            None => break,
        }
    }

    matches
}

/// End byte offset if `needle` matches `haystack` at `start`, char by char,
/// ignoring case.
fn match_at(haystack: &str, start: usize, needle: &[char]) -> Option<usize> {
    let mut chars = haystack[start..].char_indices();
    let mut end = start;
    for expected in needle {
        let (offset, actual) = chars.next()?;
        if !chars_eq_ignore_case(actual, *expected) {
            return None;
        }
        end = start + offset + actual.len_utf8();
    }
    Some(end)
}

fn chars_eq_ignore_case(a: char, b: char) -> bool {
    a == b || a.to_lowercase().eq(b.to_lowercase())
}
