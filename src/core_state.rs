//! Session state behind the user-facing surface.
//!
//! `CoreState` owns the long-lived services (filter worker, preparer,
//! grader, history) and the per-session working set. All methods take
//! `&self`: state sits behind short-lived locks, and the `processing` /
//! `loading` flags refuse a second intake or grading while one is running.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;

use crate::history::{HistoryError, HistoryStore};
use crate::models::{GradingResult, HistoryEntry};
use crate::pipeline::grading::{GradingBackend, GradingError, Grader};
use crate::pipeline::intake::{run_intake, IntakeError, ProgressSink, SourceFile};
use crate::pipeline::preprocess::{FilterError, FilterWorker, ImagePreparer, PreparedImage};

/// How long a success notice stays visible.
pub const NOTICE_TTL: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Screen {
    /// Image selection and grading.
    #[default]
    Main,
    History,
    Result,
}

#[derive(Debug, Clone)]
struct Notice {
    message: String,
    posted_at: Instant,
}

#[derive(Default)]
struct Session {
    screen: Screen,
    images: Vec<PreparedImage>,
    result: Option<GradingResult>,
    error: Option<String>,
    notice: Option<Notice>,
}

// ═══════════════════════════════════════════════════════════
// CoreState
// ═══════════════════════════════════════════════════════════

pub struct CoreState {
    worker: FilterWorker,
    preparer: ImagePreparer,
    grader: Grader,
    history: Mutex<HistoryStore>,
    session: Mutex<Session>,
    progress: Arc<dyn ProgressSink>,
    /// Batch intake in progress.
    processing: AtomicBool,
    /// Grading call in progress.
    loading: AtomicBool,
}

impl CoreState {
    /// Start a session. Spawns the filter worker.
    pub fn new(
        preparer: ImagePreparer,
        backend: Arc<dyn GradingBackend>,
        history: HistoryStore,
        progress: Arc<dyn ProgressSink>,
    ) -> Result<Self, CoreError> {
        Ok(Self {
            worker: FilterWorker::spawn()?,
            preparer,
            grader: Grader::new(backend),
            history: Mutex::new(history),
            session: Mutex::new(Session::default()),
            progress,
            processing: AtomicBool::new(false),
            loading: AtomicBool::new(false),
        })
    }

    fn session(&self) -> Result<MutexGuard<'_, Session>, CoreError> {
        self.session.lock().map_err(|_| CoreError::LockPoisoned)
    }

    fn history_store(&self) -> Result<MutexGuard<'_, HistoryStore>, CoreError> {
        self.history.lock().map_err(|_| CoreError::LockPoisoned)
    }

    // ── Working set ─────────────────────────────────────────

    /// Prepare `files` and append them to the working set.
    ///
    /// All-or-nothing: on failure the working set is unchanged and the error
    /// is also kept as the session's user message. Returns the number of
    /// images added.
    pub async fn add_files(&self, files: Vec<SourceFile>) -> Result<usize, CoreError> {
        if files.is_empty() {
            return Ok(0);
        }
        let _busy = self.acquire(&self.processing)?;
        self.session()?.error = None;

        match run_intake(&files, &self.preparer, &self.worker, self.progress.clone()).await {
            Ok(images) => {
                let count = images.len();
                let mut session = self.session()?;
                session.images.extend(images);
                session.notice = Some(Notice {
                    message: received_message(count),
                    posted_at: Instant::now(),
                });
                Ok(count)
            }
            Err(e) => {
                self.session()?.error = Some(e.to_string());
                Err(e.into())
            }
        }
    }

    /// Drop one prepared image. Returns false when the id is unknown.
    pub fn remove_image(&self, id: &str) -> Result<bool, CoreError> {
        let mut session = self.session()?;
        let before = session.images.len();
        session.images.retain(|img| img.id != id);
        Ok(session.images.len() != before)
    }

    pub fn images(&self) -> Result<Vec<PreparedImage>, CoreError> {
        Ok(self.session()?.images.clone())
    }

    // ── Grading ─────────────────────────────────────────────

    /// Grade the whole working set.
    ///
    /// Success shows the result and records it in history. An unreadable
    /// verdict, or any other failure, leaves history untouched and sets the
    /// session's user message.
    pub async fn start_grading(&self) -> Result<GradingResult, CoreError> {
        let _busy = self.acquire(&self.loading)?;
        let images = {
            let mut session = self.session()?;
            session.error = None;
            session.images.clone()
        };

        let graded = match self.grader.grade(&images).await {
            Ok(graded) => graded,
            Err(e) => {
                let mut session = self.session()?;
                session.error = Some(e.user_message());
                session.result = None;
                return Err(e.into());
            }
        };

        if let Err(e) = self.history_store()?.add(graded.clone()) {
            // The result is still shown; only persistence failed.
            tracing::warn!(error = %e, "Could not save graded result to history");
        }

        let mut session = self.session()?;
        session.result = Some(graded.clone());
        session.screen = Screen::Result;
        Ok(graded)
    }

    // ── Navigation ──────────────────────────────────────────

    /// Back to an empty main screen.
    pub fn reset(&self) -> Result<(), CoreError> {
        *self.session()? = Session::default();
        Ok(())
    }

    pub fn show_history(&self) -> Result<Vec<HistoryEntry>, CoreError> {
        self.session()?.screen = Screen::History;
        Ok(self.history_store()?.list().to_vec())
    }

    /// Re-display a past result without grading again.
    pub fn select_history(&self, id: &str) -> Result<GradingResult, CoreError> {
        let result = self
            .history_store()?
            .get(id)
            .map(|entry| entry.result.clone())
            .ok_or_else(|| CoreError::History(HistoryError::NotFound(id.to_string())))?;

        let mut session = self.session()?;
        session.result = Some(result.clone());
        session.screen = Screen::Result;
        Ok(result)
    }

    pub fn delete_history(&self, id: &str) -> Result<(), CoreError> {
        self.history_store()?.delete(id)?;
        Ok(())
    }

    pub fn clear_history(&self) -> Result<(), CoreError> {
        self.history_store()?.clear()?;
        Ok(())
    }

    // ── Read-only view ──────────────────────────────────────

    pub fn screen(&self) -> Result<Screen, CoreError> {
        Ok(self.session()?.screen)
    }

    pub fn current_result(&self) -> Result<Option<GradingResult>, CoreError> {
        Ok(self.session()?.result.clone())
    }

    /// Current user-facing error message, if any.
    pub fn error(&self) -> Result<Option<String>, CoreError> {
        Ok(self.session()?.error.clone())
    }

    pub fn dismiss_error(&self) -> Result<(), CoreError> {
        self.session()?.error = None;
        Ok(())
    }

    /// Success notice, if still within its display window.
    pub fn notice(&self) -> Result<Option<String>, CoreError> {
        self.notice_at(Instant::now())
    }

    fn notice_at(&self, now: Instant) -> Result<Option<String>, CoreError> {
        let mut session = self.session()?;
        let expired = session
            .notice
            .as_ref()
            .is_some_and(|n| now.saturating_duration_since(n.posted_at) >= NOTICE_TTL);
        if expired {
            session.notice = None;
        }
        Ok(session.notice.as_ref().map(|n| n.message.clone()))
    }

    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::SeqCst)
    }

    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::SeqCst)
    }

    fn acquire<'a>(&self, flag: &'a AtomicBool) -> Result<BusyGuard<'a>, CoreError> {
        if self.is_processing() || self.is_loading() {
            return Err(CoreError::Busy);
        }
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| CoreError::Busy)?;
        Ok(BusyGuard(flag))
    }
}

/// Clears a busy flag when dropped.
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

fn received_message(count: usize) -> String {
    if count == 1 {
        "Received 1 image".to_string()
    } else {
        format!("Received {count} images")
    }
}

// ═══════════════════════════════════════════════════════════
// Error types
// ═══════════════════════════════════════════════════════════

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Another intake or grading is already running")]
    Busy,
    #[error("Internal lock error")]
    LockPoisoned,
    #[error(transparent)]
    Intake(#[from] IntakeError),
    #[error(transparent)]
    Grading(#[from] GradingError),
    #[error("History error: {0}")]
    History(#[from] HistoryError),
    #[error("Could not start the pixel filter: {0}")]
    Worker(#[from] FilterError),
}

impl CoreError {
    /// Message for the user. Grading failures use their curated wording.
    pub fn user_message(&self) -> String {
        match self {
            Self::Grading(e) => e.user_message(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use image::{DynamicImage, ImageOutputFormat, Rgb, RgbImage};

    use super::*;
    use crate::pipeline::grading::MockGradingBackend;
    use crate::pipeline::intake::{FailingConverter, FormatNormalizer, NoProgress};
    use crate::pipeline::preprocess::{NoOpOrientationCorrector, PrepareConfig};

    const GRADED: &str = r#"{
        "isReadable": true,
        "recognizedText": "I has a cat.",
        "score": 0,
        "correctSentences": 0,
        "totalSentences": 1,
        "errors": [{"wrong": "has", "correct": "have", "type": "Grammar", "explanation": "I + have", "page": 1}],
        "sentenceAnalysis": [{"original": "I has a cat.", "corrected": "I have a cat.", "isCorrect": false, "feedback": "Agreement.", "page": 1}],
        "assessment": {"strength": "s", "weakness": "w", "improvement": "i", "parentReport": "p"}
    }"#;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([90, 90, 90])))
            .write_to(&mut cursor, ImageOutputFormat::Png)
            .unwrap();
        cursor.into_inner()
    }

    fn state_with(backend: Arc<MockGradingBackend>, dir: &tempfile::TempDir) -> CoreState {
        let preparer = ImagePreparer::new(
            FormatNormalizer::new(Box::new(FailingConverter)),
            Box::new(NoOpOrientationCorrector),
            PrepareConfig::default(),
        );
        CoreState::new(
            preparer,
            backend,
            HistoryStore::open(dir.path().join("history_v1.json")),
            Arc::new(NoProgress),
        )
        .unwrap()
    }

    fn pages(n: usize) -> Vec<SourceFile> {
        (0..n)
            .map(|i| SourceFile::new(format!("page-{i}.png"), png(16, 16)))
            .collect()
    }

    #[tokio::test]
    async fn add_files_appends_and_posts_notice() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_with(Arc::new(MockGradingBackend::new(GRADED)), &dir);

        assert_eq!(state.add_files(pages(2)).await.unwrap(), 2);
        assert_eq!(state.add_files(pages(1)).await.unwrap(), 1);

        assert_eq!(state.images().unwrap().len(), 3);
        assert_eq!(state.notice().unwrap().as_deref(), Some("Received 1 image"));
        assert!(!state.is_processing());
    }

    #[tokio::test]
    async fn notice_expires_after_ttl() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_with(Arc::new(MockGradingBackend::new(GRADED)), &dir);
        state.add_files(pages(2)).await.unwrap();

        let later = Instant::now() + NOTICE_TTL + Duration::from_millis(10);
        assert_eq!(state.notice_at(later).unwrap(), None);
        assert_eq!(state.notice().unwrap(), None);
    }

    #[tokio::test]
    async fn failed_batch_keeps_working_set() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_with(Arc::new(MockGradingBackend::new(GRADED)), &dir);
        state.add_files(pages(1)).await.unwrap();

        let mut batch = pages(2);
        batch.push(SourceFile::new("broken.jpg", b"garbage".to_vec()));
        let err = state.add_files(batch).await.unwrap_err();

        assert!(matches!(
            err,
            CoreError::Intake(IntakeError::FileFailed { index: 3, .. })
        ));
        assert_eq!(state.images().unwrap().len(), 1);
        assert!(state.error().unwrap().unwrap().contains("broken.jpg"));
    }

    #[tokio::test]
    async fn remove_image_by_id() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_with(Arc::new(MockGradingBackend::new(GRADED)), &dir);
        state.add_files(pages(2)).await.unwrap();

        let id = state.images().unwrap()[0].id.clone();
        assert!(state.remove_image(&id).unwrap());
        assert!(!state.remove_image(&id).unwrap());
        assert_eq!(state.images().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn grading_shows_result_and_records_history() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(MockGradingBackend::new(GRADED));
        let state = state_with(backend.clone(), &dir);
        state.add_files(pages(2)).await.unwrap();

        let graded = state.start_grading().await.unwrap();
        assert_eq!(graded.error_count(), 1);
        assert_eq!(state.screen().unwrap(), Screen::Result);
        assert_eq!(state.current_result().unwrap(), Some(graded));
        assert_eq!(state.show_history().unwrap().len(), 1);
        assert_eq!(backend.last_request().unwrap().pages.len(), 2);
        assert!(!state.is_loading());
    }

    #[tokio::test]
    async fn grading_without_images_fails() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(MockGradingBackend::new(GRADED));
        let state = state_with(backend.clone(), &dir);

        let err = state.start_grading().await.unwrap_err();
        assert!(matches!(err, CoreError::Grading(GradingError::NoImages)));
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn unreadable_result_not_stored() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(MockGradingBackend::new(
            r#"{"isReadable": false, "unreadableReason": "Too dark"}"#,
        ));
        let state = state_with(backend, &dir);
        state.add_files(pages(1)).await.unwrap();

        let err = state.start_grading().await.unwrap_err();
        assert!(matches!(err, CoreError::Grading(GradingError::Unreadable(_))));
        assert_eq!(state.error().unwrap().as_deref(), Some("Too dark"));
        assert_eq!(state.current_result().unwrap(), None);
        assert!(state.show_history().unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_score_not_stored() {
        let dir = tempfile::tempdir().unwrap();
        let mut value: serde_json::Value = serde_json::from_str(GRADED).unwrap();
        value.as_object_mut().unwrap().remove("score");
        let state = state_with(Arc::new(MockGradingBackend::new(&value.to_string())), &dir);
        state.add_files(pages(1)).await.unwrap();

        let err = state.start_grading().await.unwrap_err();
        assert!(matches!(err, CoreError::Grading(GradingError::InvalidResponse(_))));
        assert!(state.show_history().unwrap().is_empty());
        assert!(!dir.path().join("history_v1.json").exists());
    }

    #[tokio::test]
    async fn service_failure_sets_user_message() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(MockGradingBackend::failing(GradingError::Connection(
            "http://localhost:11434".into(),
        )));
        let state = state_with(backend, &dir);
        state.add_files(pages(1)).await.unwrap();

        assert!(state.start_grading().await.is_err());
        let message = state.error().unwrap().unwrap();
        assert!(message.contains("grading service"));

        state.dismiss_error().unwrap();
        assert_eq!(state.error().unwrap(), None);
    }

    #[tokio::test]
    async fn second_grading_refused_while_loading() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_with(Arc::new(MockGradingBackend::new(GRADED)), &dir);
        state.add_files(pages(1)).await.unwrap();

        let (first, second) = tokio::join!(state.start_grading(), state.start_grading());
        assert!(first.is_ok());
        assert!(matches!(second, Err(CoreError::Busy)));
    }

    #[tokio::test]
    async fn history_select_delete_clear() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_with(Arc::new(MockGradingBackend::new(GRADED)), &dir);
        state.add_files(pages(1)).await.unwrap();
        state.start_grading().await.unwrap();
        state.start_grading().await.unwrap();

        state.reset().unwrap();
        assert_eq!(state.screen().unwrap(), Screen::Main);
        assert!(state.images().unwrap().is_empty());

        let entries = state.show_history().unwrap();
        assert_eq!(state.screen().unwrap(), Screen::History);
        assert_eq!(entries.len(), 2);

        let selected = state.select_history(&entries[1].id).unwrap();
        assert_eq!(selected, entries[1].result);
        assert_eq!(state.screen().unwrap(), Screen::Result);

        state.delete_history(&entries[0].id).unwrap();
        assert_eq!(state.show_history().unwrap().len(), 1);
        assert!(matches!(
            state.select_history("unknown"),
            Err(CoreError::History(HistoryError::NotFound(_)))
        ));

        state.clear_history().unwrap();
        assert!(state.show_history().unwrap().is_empty());
    }

    #[test]
    fn received_message_pluralizes() {
        assert_eq!(received_message(1), "Received 1 image");
        assert_eq!(received_message(4), "Received 4 images");
    }
}
