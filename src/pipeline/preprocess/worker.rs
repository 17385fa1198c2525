//! Dedicated thread for the pixel filter.
//!
//! Orchestration runs on a single-threaded runtime; the per-pixel loop over a
//! 1600px page would stall it, so the buffer is moved to a worker thread and
//! the caller awaits a future for the result.
//!
//! Every job carries a correlation token which the worker echoes back. A reply
//! with the wrong token is reported as an error instead of being handed to the
//! caller.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::thread::JoinHandle;

use tokio::sync::oneshot;

use super::filter::{apply_contrast_filter, PixelBuffer};
use super::FilterError;

/// Filter function run on the worker thread.
pub type FilterFn = fn(PixelBuffer) -> Result<PixelBuffer, FilterError>;

struct FilterJob {
    token: u64,
    buffer: PixelBuffer,
    reply: oneshot::Sender<FilterReply>,
}

struct FilterReply {
    token: u64,
    result: Result<PixelBuffer, FilterError>,
}

/// Handle to the filter thread.
///
/// Created once per session and dropped (or `shutdown()`) when the session
/// ends; dropping closes the job channel and joins the thread.
pub struct FilterWorker {
    jobs: Option<mpsc::Sender<FilterJob>>,
    handle: Option<JoinHandle<()>>,
    next_token: AtomicU64,
}

impl FilterWorker {
    /// Start the worker with the production contrast filter.
    pub fn spawn() -> Result<Self, FilterError> {
        Self::spawn_with(apply_contrast_filter)
    }

    /// Start the worker with a custom filter function.
    pub fn spawn_with(filter: FilterFn) -> Result<Self, FilterError> {
        let (tx, rx) = mpsc::channel::<FilterJob>();

        let handle = std::thread::Builder::new()
            .name("pixel-filter".into())
            .spawn(move || worker_loop(rx, filter))
            .map_err(|e| FilterError::WorkerSpawn(e.to_string()))?;

        tracing::debug!("Pixel filter worker started");

        Ok(Self {
            jobs: Some(tx),
            handle: Some(handle),
            next_token: AtomicU64::new(1),
        })
    }

    /// Move `buffer` to the worker and wait for the filtered buffer.
    pub async fn filter(&self, buffer: PixelBuffer) -> Result<PixelBuffer, FilterError> {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        let (reply_tx, reply_rx) = oneshot::channel();

        let jobs = self.jobs.as_ref().ok_or(FilterError::WorkerGone)?;
        jobs.send(FilterJob {
            token,
            buffer,
            reply: reply_tx,
        })
        .map_err(|_| FilterError::WorkerGone)?;

        let reply = reply_rx.await.map_err(|_| FilterError::WorkerGone)?;
        check_reply(token, reply)
    }

    /// Stop accepting jobs and join the thread. Jobs already queued finish.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        // Closing the channel ends `worker_loop`.
        self.jobs.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::warn!("Pixel filter worker panicked");
            } else {
                tracing::debug!("Pixel filter worker stopped");
            }
        }
    }
}

impl Drop for FilterWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn worker_loop(jobs: mpsc::Receiver<FilterJob>, filter: FilterFn) {
    while let Ok(job) = jobs.recv() {
        let started = std::time::Instant::now();
        let pixels = job.buffer.data.len() / 4;
        let result = filter(job.buffer);

        tracing::trace!(
            token = job.token,
            pixels,
            elapsed_ms = %started.elapsed().as_millis(),
            "Pixel filter job done"
        );

        // The caller may have gone away; nothing to do then.
        let _ = job.reply.send(FilterReply {
            token: job.token,
            result,
        });
    }
}

fn check_reply(expected: u64, reply: FilterReply) -> Result<PixelBuffer, FilterError> {
    if reply.token != expected {
        return Err(FilterError::TokenMismatch {
            expected,
            actual: reply.token,
        });
    }
    reply.result
}
