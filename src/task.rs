//! Task records and the shared registry.
//!
//! Exactly one worker writes a given task; status queries read concurrently.
//! Entries are replaced whole under a short write lock, so a reader never
//! sees a half-updated task. Terminal tasks are immutable.

use crate::error::Pdf2DocxError;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::{PoisonError, RwLock};
use tracing::debug;

/// `pending → processing → {done, failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Processing,
    Done,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Done | TaskStatus::Failed)
    }

    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_become(self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (TaskStatus::Pending, TaskStatus::Processing)
                | (TaskStatus::Pending, TaskStatus::Failed)
                | (TaskStatus::Processing, TaskStatus::Done)
                | (TaskStatus::Processing, TaskStatus::Failed)
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Processing => "processing",
            TaskStatus::Done => "done",
            TaskStatus::Failed => "failed",
        })
    }
}

/// One submitted conversion.
#[derive(Debug, Clone, Serialize)]
pub struct ConversionTask {
    pub task_id: String,
    pub status: TaskStatus,
    /// Set exactly when `status` is `Failed`.
    pub error: Option<String>,
    /// Set once the renderer has written an artifact; kept on `Done`,
    /// cleared on `Failed` since a rejected artifact is removed.
    pub output_path: Option<PathBuf>,
    #[serde(skip)]
    seq: u64,
}

impl ConversionTask {
    pub fn new(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            status: TaskStatus::Pending,
            error: None,
            output_path: None,
            seq: 0,
        }
    }
}

#[derive(Default)]
struct Inner {
    tasks: HashMap<String, ConversionTask>,
    next_seq: u64,
}

/// Bounded in-memory task registry.
///
/// When full, the oldest terminal tasks are evicted; in-flight tasks are never
/// dropped.
pub struct TaskStore {
    inner: RwLock<Inner>,
    max_tasks: usize,
}

impl TaskStore {
    pub fn new(max_tasks: usize) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            max_tasks: max_tasks.max(1),
        }
    }

    pub fn insert(&self, mut task: ConversionTask) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        task.seq = inner.next_seq;
        inner.next_seq += 1;
        inner.tasks.insert(task.task_id.clone(), task);

        while inner.tasks.len() > self.max_tasks {
            let oldest = inner
                .tasks
                .values()
                .filter(|t| t.status.is_terminal())
                .min_by_key(|t| t.seq)
                .map(|t| t.task_id.clone());
            match oldest {
                Some(id) => {
                    debug!("Evicting finished task {}", id);
                    inner.tasks.remove(&id);
                }
                None => break,
            }
        }
    }

    pub fn get(&self, task_id: &str) -> Result<ConversionTask, Pdf2DocxError> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner
            .tasks
            .get(task_id)
            .cloned()
            .ok_or_else(|| Pdf2DocxError::TaskNotFound {
                task_id: task_id.to_string(),
            })
    }

    /// Move a task to `status`, recording the error or output path.
    ///
    /// Illegal transitions (including any move out of a terminal state) are
    /// rejected with `Internal`.
    pub fn transition(
        &self,
        task_id: &str,
        status: TaskStatus,
        error: Option<String>,
        output_path: Option<PathBuf>,
    ) -> Result<(), Pdf2DocxError> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let current = inner
            .tasks
            .get(task_id)
            .ok_or_else(|| Pdf2DocxError::TaskNotFound {
                task_id: task_id.to_string(),
            })?;
        if !current.status.can_become(status) {
            return Err(Pdf2DocxError::Internal(format!(
                "task {task_id}: illegal transition {} → {status}",
                current.status
            )));
        }
        let updated = ConversionTask {
            task_id: current.task_id.clone(),
            status,
            error,
            output_path,
            seq: current.seq,
        };
        inner.tasks.insert(task_id.to_string(), updated);
        Ok(())
    }

    /// Record the artifact of a `Processing` task before it is verified.
    pub fn record_output(&self, task_id: &str, output_path: PathBuf) -> Result<(), Pdf2DocxError> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let task = inner
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| Pdf2DocxError::TaskNotFound {
                task_id: task_id.to_string(),
            })?;
        if task.status != TaskStatus::Processing {
            return Err(Pdf2DocxError::Internal(format!(
                "task {task_id}: output recorded while {}",
                task.status
            )));
        }
        task.output_path = Some(output_path);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .tasks
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
