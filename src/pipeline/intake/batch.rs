//! Sequential batch intake: source files in, prepared pages out.
//!
//! A batch is all-or-nothing. The first file that fails aborts the run and
//! everything prepared so far in this batch is dropped.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinHandle;

use super::progress::{
    percent_done, random_status_message, IntakeEvent, ProgressSink, STATUS_ROTATION_INTERVAL,
};
use super::{IntakeError, SourceFile};
use crate::pipeline::preprocess::{FilterWorker, ImagePreparer, PreparedImage};

/// Read every path into memory, in order.
pub fn load_sources<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<SourceFile>, IntakeError> {
    paths
        .iter()
        .map(|p| SourceFile::from_path(p.as_ref()))
        .collect()
}

/// Prepare `files` one after another.
///
/// Reports progress before each file and rotates the status message every
/// [`STATUS_ROTATION_INTERVAL`] while running. An empty list returns
/// immediately without events.
pub async fn run_intake(
    files: &[SourceFile],
    preparer: &ImagePreparer,
    worker: &FilterWorker,
    progress: Arc<dyn ProgressSink>,
) -> Result<Vec<PreparedImage>, IntakeError> {
    if files.is_empty() {
        return Ok(Vec::new());
    }

    let start = Instant::now();
    let total = files.len();
    progress.report(IntakeEvent::Started { total });

    let _rotation = StatusRotation::start(progress.clone());
    let mut prepared = Vec::with_capacity(total);

    for (i, file) in files.iter().enumerate() {
        progress.report(IntakeEvent::Progress {
            current: i + 1,
            total,
            percent: percent_done(i, total),
            file_name: file.name.clone(),
        });

        match preparer.prepare(file, worker).await {
            Ok(image) => prepared.push(image),
            Err(source) => {
                let err = IntakeError::FileFailed {
                    index: i + 1,
                    total,
                    name: file.name.clone(),
                    source,
                };
                tracing::warn!(
                    index = i + 1,
                    total,
                    file = %file.name,
                    discarded = prepared.len(),
                    error = %err,
                    "Batch intake aborted"
                );
                progress.report(IntakeEvent::Failed {
                    error: err.to_string(),
                });
                return Err(err);
            }
        }
    }

    let duration_ms = start.elapsed().as_millis() as u64;
    progress.report(IntakeEvent::Completed {
        prepared: prepared.len(),
        duration_ms,
    });
    tracing::info!(count = prepared.len(), duration_ms, "Batch intake complete");

    Ok(prepared)
}

/// Background task emitting a random status message on a fixed interval.
/// Stops when dropped.
struct StatusRotation {
    task: JoinHandle<()>,
}

impl StatusRotation {
    fn start(progress: Arc<dyn ProgressSink>) -> Self {
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(STATUS_ROTATION_INTERVAL);
            loop {
                ticker.tick().await;
                progress.report(IntakeEvent::Status {
                    message: random_status_message().to_string(),
                });
            }
        });
        Self { task }
    }
}

impl Drop for StatusRotation {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::time::Duration;

    use image::{DynamicImage, ImageOutputFormat, Rgb, RgbImage};

    use super::*;
    use crate::pipeline::intake::{FailingConverter, FormatNormalizer, RecordingProgress};
    use crate::pipeline::preprocess::{NoOpOrientationCorrector, PrepareConfig, PrepareError};

    fn png(width: u32, height: u32) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([120, 120, 120])))
            .write_to(&mut cursor, ImageOutputFormat::Png)
            .unwrap();
        cursor.into_inner()
    }

    fn preparer() -> ImagePreparer {
        ImagePreparer::new(
            FormatNormalizer::new(Box::new(FailingConverter)),
            Box::new(NoOpOrientationCorrector),
            PrepareConfig::default(),
        )
    }

    fn progress_events(events: &[IntakeEvent]) -> Vec<(usize, usize, u8)> {
        events
            .iter()
            .filter_map(|e| match e {
                IntakeEvent::Progress {
                    current,
                    total,
                    percent,
                    ..
                } => Some((*current, *total, *percent)),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn prepares_all_files_in_order() {
        let worker = FilterWorker::spawn().unwrap();
        let sink = Arc::new(RecordingProgress::default());
        let files = vec![
            SourceFile::new("a.png", png(10, 10)),
            SourceFile::new("b.png", png(20, 10)),
            SourceFile::new("c.png", png(30, 10)),
        ];

        let images = run_intake(&files, &preparer(), &worker, sink.clone())
            .await
            .unwrap();

        let names: Vec<_> = images.iter().map(|i| i.source_name.as_str()).collect();
        assert_eq!(names, ["a.png", "b.png", "c.png"]);
        assert_eq!(images[2].width, 30);

        let events = sink.events();
        assert_eq!(events.first(), Some(&IntakeEvent::Started { total: 3 }));
        assert!(matches!(
            events.last(),
            Some(IntakeEvent::Completed { prepared: 3, .. })
        ));
        assert_eq!(
            progress_events(&events),
            [(1, 3, 0), (2, 3, 33), (3, 3, 67)]
        );
    }

    #[tokio::test]
    async fn failure_discards_whole_batch() {
        let worker = FilterWorker::spawn().unwrap();
        let sink = Arc::new(RecordingProgress::default());
        let files = vec![
            SourceFile::new("a.png", png(10, 10)),
            SourceFile::new("broken.jpg", b"not an image at all".to_vec()),
            SourceFile::new("c.png", png(10, 10)),
        ];

        let err = run_intake(&files, &preparer(), &worker, sink.clone())
            .await
            .unwrap_err();

        match err {
            IntakeError::FileFailed {
                index,
                total,
                ref name,
                ref source,
            } => {
                assert_eq!(index, 2);
                assert_eq!(total, 3);
                assert_eq!(name, "broken.jpg");
                assert!(matches!(source, PrepareError::Decode { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }

        let events = sink.events();
        // Third file never started
        assert_eq!(progress_events(&events).len(), 2);
        assert!(matches!(events.last(), Some(IntakeEvent::Failed { .. })));
    }

    #[tokio::test]
    async fn empty_batch_is_noop() {
        let worker = FilterWorker::spawn().unwrap();
        let sink = Arc::new(RecordingProgress::default());

        let images = run_intake(&[], &preparer(), &worker, sink.clone())
            .await
            .unwrap();
        assert!(images.is_empty());
        assert!(sink.events().is_empty());
    }

    #[test]
    fn load_sources_stops_at_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("one.png");
        std::fs::write(&present, png(2, 2)).unwrap();
        let missing = dir.path().join("two.png");

        assert_eq!(load_sources(&[&present]).unwrap().len(), 1);
        let err = load_sources(&[&present, &missing]).unwrap_err();
        assert!(matches!(err, IntakeError::FileRead { .. }));
    }

    fn status_count(sink: &RecordingProgress) -> usize {
        sink.events()
            .iter()
            .filter(|e| matches!(e, IntakeEvent::Status { .. }))
            .count()
    }

    #[tokio::test(start_paused = true)]
    async fn status_rotates_on_interval_and_stops_on_drop() {
        let sink = Arc::new(RecordingProgress::default());
        let rotation = StatusRotation::start(sink.clone());

        tokio::time::sleep(STATUS_ROTATION_INTERVAL * 2 + Duration::from_millis(100)).await;
        let while_running = status_count(&sink);
        assert!(while_running >= 2, "only {while_running} status events");

        drop(rotation);
        tokio::task::yield_now().await;
        tokio::time::sleep(STATUS_ROTATION_INTERVAL * 3).await;
        assert_eq!(status_count(&sink), while_running);
    }
}
