//! Progress reporting for batch intake.

use std::sync::Mutex;
use std::time::Duration;

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

/// How often the status message changes while a batch is running.
pub const STATUS_ROTATION_INTERVAL: Duration = Duration::from_secs(2);

/// Messages shown while pages are being prepared.
pub const STATUS_MESSAGES: &[&str] = &[
    "Sharpening the handwriting...",
    "Straightening out the pages...",
    "Boosting ink contrast...",
    "Getting the pages ready for the teacher...",
    "Almost there, tidying up the scans...",
];

/// Pick a status message at random.
pub fn random_status_message() -> &'static str {
    STATUS_MESSAGES
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(STATUS_MESSAGES[0])
}

/// Completion percentage, rounded. An empty batch counts as complete.
pub fn percent_done(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    ((done as f64 / total as f64) * 100.0).round().min(100.0) as u8
}

// ═══════════════════════════════════════════
// Intake Events
// ═══════════════════════════════════════════

/// Event emitted while a batch is being prepared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum IntakeEvent {
    Started {
        total: usize,
    },
    /// A file is about to be prepared. `current` is 1-based.
    Progress {
        current: usize,
        total: usize,
        percent: u8,
        file_name: String,
    },
    /// The rotating status line changed.
    Status {
        message: String,
    },
    Completed {
        prepared: usize,
        duration_ms: u64,
    },
    Failed {
        error: String,
    },
}

/// Receives intake events. Implementations must not block.
pub trait ProgressSink: Send + Sync {
    fn report(&self, event: IntakeEvent);
}

/// Drops every event.
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _event: IntakeEvent) {}
}

/// Forwards events to `tracing`.
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn report(&self, event: IntakeEvent) {
        match event {
            IntakeEvent::Started { total } => tracing::info!(total, "Preparing images"),
            IntakeEvent::Progress {
                current,
                total,
                percent,
                file_name,
            } => tracing::info!(current, total, percent, file = %file_name, "Preparing image"),
            IntakeEvent::Status { message } => tracing::info!("{message}"),
            IntakeEvent::Completed {
                prepared,
                duration_ms,
            } => tracing::info!(prepared, duration_ms, "Images ready"),
            IntakeEvent::Failed { error } => tracing::warn!(%error, "Image intake failed"),
        }
    }
}

/// Records every event, for tests.
#[derive(Default)]
pub struct RecordingProgress {
    events: Mutex<Vec<IntakeEvent>>,
}

impl RecordingProgress {
    pub fn events(&self) -> Vec<IntakeEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl ProgressSink for RecordingProgress {
    fn report(&self, event: IntakeEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_rounds() {
        assert_eq!(percent_done(0, 3), 0);
        assert_eq!(percent_done(1, 3), 33);
        assert_eq!(percent_done(2, 3), 67);
        assert_eq!(percent_done(3, 3), 100);
        assert_eq!(percent_done(0, 0), 100);
    }

    #[test]
    fn random_message_is_from_list() {
        for _ in 0..20 {
            assert!(STATUS_MESSAGES.contains(&random_status_message()));
        }
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let json = serde_json::to_value(IntakeEvent::Progress {
            current: 2,
            total: 4,
            percent: 25,
            file_name: "p2.jpg".into(),
        })
        .unwrap();
        assert_eq!(json["type"], "Progress");
        assert_eq!(json["current"], 2);
        assert_eq!(json["file_name"], "p2.jpg");
    }

    #[test]
    fn recorder_keeps_order() {
        let sink = RecordingProgress::default();
        sink.report(IntakeEvent::Started { total: 1 });
        sink.report(IntakeEvent::Status {
            message: "x".into(),
        });
        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], IntakeEvent::Started { total: 1 });
    }
}
