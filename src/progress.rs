//! Observer trait for task lifecycle events.
//!
//! Inject an [`Arc<dyn TaskObserver>`] via
//! [`crate::config::ConversionConfigBuilder::observer`] to receive events as
//! a background worker moves a task through its stages. The CLI renders them
//! as a spinner; a server could forward them to a websocket.
//!
//! # Example
//!
//! ```rust
//! use edgequake_pdf2docx::{ConversionConfig, Stage, TaskObserver};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct StageCounter(AtomicUsize);
//!
//! impl TaskObserver for StageCounter {
//!     fn on_stage_complete(&self, _task_id: &str, _stage: Stage) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!     }
//! }
//!
//! let config = ConversionConfig::builder()
//!     .observer(Arc::new(StageCounter(AtomicUsize::new(0))) as Arc<dyn TaskObserver>)
//!     .build()
//!     .unwrap();
//! ```

use crate::task::TaskStatus;
use std::fmt;
use std::sync::Arc;

/// The three sequential stages of a conversion task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Extraction,
    Enhancement,
    Rendering,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Extraction => "extraction",
            Stage::Enhancement => "enhancement",
            Stage::Rendering => "rendering",
        })
    }
}

/// Called by the orchestrator as it drives a task.
///
/// Implementations must be `Send + Sync`: several tasks run concurrently and
/// each reports from its own worker. All methods have default no-op
/// implementations so callers only override what they care about.
pub trait TaskObserver: Send + Sync {
    /// Called after every status transition, including the initial `pending`.
    fn on_status(&self, task_id: &str, status: TaskStatus) {
        let _ = (task_id, status);
    }

    /// Called just before a stage starts.
    fn on_stage_start(&self, task_id: &str, stage: Stage) {
        let _ = (task_id, stage);
    }

    /// Called when a stage finished with its primary path.
    fn on_stage_complete(&self, task_id: &str, stage: Stage) {
        let _ = (task_id, stage);
    }

    /// Called when a stage fell back instead of failing the task.
    fn on_stage_degraded(&self, task_id: &str, stage: Stage, reason: &str) {
        let _ = (task_id, stage, reason);
    }

    /// Called once when the task reaches `failed`.
    fn on_task_failed(&self, task_id: &str, error: &str) {
        let _ = (task_id, error);
    }
}

/// A no-op implementation for callers that don't need events.
pub struct NoopObserver;

impl TaskObserver for NoopObserver {}

/// Convenience alias matching the type stored in [`crate::config::ConversionConfig`].
pub type ObserverHandle = Arc<dyn TaskObserver>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Tracking {
        statuses: AtomicUsize,
        completes: AtomicUsize,
        degraded: AtomicUsize,
    }

    impl TaskObserver for Tracking {
        fn on_status(&self, _task_id: &str, _status: TaskStatus) {
            self.statuses.fetch_add(1, Ordering::SeqCst);
        }

        fn on_stage_complete(&self, _task_id: &str, _stage: Stage) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_stage_degraded(&self, _task_id: &str, _stage: Stage, _reason: &str) {
            self.degraded.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_observer_does_not_panic() {
        let o = NoopObserver;
        o.on_status("t", TaskStatus::Pending);
        o.on_stage_start("t", Stage::Extraction);
        o.on_stage_degraded("t", Stage::Enhancement, "no credentials");
        o.on_task_failed("t", "boom");
    }

    #[test]
    fn tracking_observer_receives_events() {
        let o = Tracking::default();
        o.on_status("t", TaskStatus::Processing);
        o.on_stage_complete("t", Stage::Extraction);
        o.on_stage_degraded("t", Stage::Enhancement, "timeout");
        o.on_stage_complete("t", Stage::Rendering);
        o.on_status("t", TaskStatus::Done);

        assert_eq!(o.statuses.load(Ordering::SeqCst), 2);
        assert_eq!(o.completes.load(Ordering::SeqCst), 2);
        assert_eq!(o.degraded.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn stage_display() {
        assert_eq!(Stage::Rendering.to_string(), "rendering");
    }
}
