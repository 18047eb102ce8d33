//! Asynchronous conversion service: submit, poll, fetch.
//!
//! ```text
//! submit ─▶ validate ─▶ uploads/{id}.pdf ─▶ pending ─▶ spawn worker
//!
//! worker: processing
//!         ├─ extraction   temp/{id}/raw.md       (fallback: text-only)
//!         ├─ enhancement  temp/{id}/enhanced.md  (fallback: identity copy)
//!         └─ rendering    outputs/{id}.docx      (no fallback)
//!         ─▶ done | failed
//! cleanup: temp/{id} removed on done; the upload removed either way;
//!          a rejected outputs/{id}.docx removed on failure
//! ```
//!
//! One worker per task, stages strictly sequential. Tasks share nothing but
//! the [`TaskStore`]. A panic inside a worker fails its task instead of
//! leaving it `processing`.

use crate::config::ConversionConfig;
use crate::error::Pdf2DocxError;
use crate::pipeline::docx::{verify_artifact, DocumentRenderer, PandocRenderer, DOCX_MEDIA_TYPE};
use crate::pipeline::enhance::Enhancer;
use crate::pipeline::extract::Extractor;
use crate::pipeline::input::validate_upload;
use crate::pipeline::llm::resolve_chat_client;
use crate::pipeline::stage::StageOutcome;
use crate::progress::{NoopObserver, Stage, TaskObserver};
use crate::task::{ConversionTask, TaskStatus, TaskStore};
use futures::FutureExt;
use serde::Serialize;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tracing::{error, info, warn};
use uuid::Uuid;

/// What a status query returns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub task_id: String,
    pub status: TaskStatus,
    pub error: Option<String>,
}

impl From<ConversionTask> for StatusReport {
    fn from(task: ConversionTask) -> Self {
        Self {
            task_id: task.task_id,
            status: task.status,
            error: task.error,
        }
    }
}

/// A finished document, ready to hand to a client.
#[derive(Debug, Clone)]
pub struct TaskArtifact {
    pub bytes: Vec<u8>,
    pub media_type: &'static str,
    pub filename: String,
}

struct Shared {
    config: ConversionConfig,
    store: TaskStore,
    extractor: Extractor,
    enhancer: Enhancer,
    renderer: Arc<dyn DocumentRenderer>,
    observer: Arc<dyn TaskObserver>,
}

/// The task orchestrator. Cheap to clone; clones share one registry.
#[derive(Clone)]
pub struct ConversionService {
    shared: Arc<Shared>,
}

impl ConversionService {
    pub fn new(
        config: ConversionConfig,
        extractor: Extractor,
        enhancer: Enhancer,
        renderer: Arc<dyn DocumentRenderer>,
    ) -> Self {
        let observer = config
            .observer
            .clone()
            .unwrap_or_else(|| Arc::new(NoopObserver) as Arc<dyn TaskObserver>);
        Self {
            shared: Arc::new(Shared {
                store: TaskStore::new(config.max_tasks),
                config,
                extractor,
                enhancer,
                renderer,
                observer,
            }),
        }
    }

    /// Wire the production collaborators from `config`.
    ///
    /// Missing model credentials are not an error: extraction then runs
    /// text-only and enhancement degrades to an identity copy.
    pub fn from_config(config: ConversionConfig) -> Self {
        let client = match resolve_chat_client(&config) {
            Ok(c) => Some(c),
            Err(e) => {
                warn!("No LLM provider available — {}", e);
                None
            }
        };
        let extractor = Extractor::from_config(&config, client.clone());
        let enhancer = Enhancer::new(client, &config);
        let renderer = Arc::new(PandocRenderer::from_config(&config));
        Self::new(config, extractor, enhancer, renderer)
    }

    pub fn config(&self) -> &ConversionConfig {
        &self.shared.config
    }

    /// Accept a PDF and start converting it in the background.
    ///
    /// A wrong extension or an oversized upload is rejected here and never
    /// becomes a task. Unreadable content is accepted and fails the task
    /// during extraction. Must be called from within a tokio runtime.
    pub async fn submit(
        &self,
        bytes: &[u8],
        filename: Option<&str>,
    ) -> Result<StatusReport, Pdf2DocxError> {
        let shared = &self.shared;
        validate_upload(bytes, filename, shared.config.max_upload_bytes)?;

        let task_id = Uuid::new_v4().to_string();
        let uploads = shared.config.uploads_dir();
        tokio::fs::create_dir_all(&uploads)
            .await
            .map_err(|e| Pdf2DocxError::io(&uploads, e))?;
        let upload = uploads.join(format!("{task_id}.pdf"));
        tokio::fs::write(&upload, bytes)
            .await
            .map_err(|e| Pdf2DocxError::io(&upload, e))?;

        shared.store.insert(ConversionTask::new(&task_id));
        shared.observer.on_status(&task_id, TaskStatus::Pending);
        info!(
            "Task {} accepted: {} bytes{}",
            task_id,
            bytes.len(),
            filename.map(|n| format!(" from '{n}'")).unwrap_or_default()
        );

        let worker = Arc::clone(shared);
        let id = task_id.clone();
        tokio::spawn(async move { worker.run(id, upload).await });

        Ok(StatusReport {
            task_id,
            status: TaskStatus::Pending,
            error: None,
        })
    }

    pub fn status(&self, task_id: &str) -> Result<StatusReport, Pdf2DocxError> {
        self.shared.store.get(task_id).map(StatusReport::from)
    }

    /// Fetch the rendered document of a `done` task.
    pub async fn result(&self, task_id: &str) -> Result<TaskArtifact, Pdf2DocxError> {
        let task = self.shared.store.get(task_id)?;
        match task.status {
            TaskStatus::Done => {}
            TaskStatus::Failed => {
                return Err(Pdf2DocxError::TaskFailed {
                    task_id: task.task_id,
                    error: task.error.unwrap_or_default(),
                })
            }
            status => {
                return Err(Pdf2DocxError::TaskNotReady {
                    task_id: task.task_id,
                    status: status.to_string(),
                })
            }
        }

        let path = task.output_path.ok_or_else(|| {
            Pdf2DocxError::Internal(format!("task {task_id} is done without an output path"))
        })?;
        verify_artifact(&path).await?;
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| Pdf2DocxError::io(&path, e))?;
        Ok(TaskArtifact {
            bytes,
            media_type: DOCX_MEDIA_TYPE,
            filename: format!("{task_id}.docx"),
        })
    }

    /// Poll until the task is terminal.
    pub async fn wait(&self, task_id: &str, poll: Duration) -> Result<StatusReport, Pdf2DocxError> {
        loop {
            let report = self.status(task_id)?;
            if report.status.is_terminal() {
                return Ok(report);
            }
            sleep(poll).await;
        }
    }
}

impl Shared {
    fn set_status(
        &self,
        task_id: &str,
        status: TaskStatus,
        error: Option<String>,
        output: Option<PathBuf>,
    ) {
        match self.store.transition(task_id, status, error, output) {
            Ok(()) => self.observer.on_status(task_id, status),
            // Evicted, or already terminal.
            Err(e) => error!("Task {}: status update to {} lost — {}", task_id, status, e),
        }
    }

    /// Report a stage outcome and turn it into a plain result.
    fn settle<T>(&self, task_id: &str, stage: Stage, outcome: StageOutcome<T>) -> Result<T, Pdf2DocxError> {
        match outcome {
            StageOutcome::Succeeded(v) => {
                self.observer.on_stage_complete(task_id, stage);
                Ok(v)
            }
            StageOutcome::Degraded { value, reason } => {
                warn!("Task {}: {} degraded — {}", task_id, stage, reason);
                self.observer.on_stage_degraded(task_id, stage, &reason);
                Ok(value)
            }
            StageOutcome::Fatal(e) => Err(e),
        }
    }

    fn output_for(&self, task_id: &str) -> PathBuf {
        self.config.outputs_dir().join(format!("{task_id}.docx"))
    }

    async fn run(self: Arc<Self>, task_id: String, upload: PathBuf) {
        let scratch = self.config.temp_dir().join(&task_id);
        let output = self.output_for(&task_id);

        let outcome = AssertUnwindSafe(async {
            self.set_status(&task_id, TaskStatus::Processing, None, None);
            self.stages(&task_id, &upload, &scratch, &output).await
        })
        .catch_unwind()
        .await
        .unwrap_or_else(|payload| {
            Err(Pdf2DocxError::Internal(format!(
                "worker panicked: {}",
                panic_message(payload.as_ref())
            )))
        });

        // Cleanup happens before the terminal status is published.
        if let Err(e) = tokio::fs::remove_file(&upload).await {
            warn!("Task {}: could not remove upload {} — {}", task_id, upload.display(), e);
        }

        match outcome {
            Ok(()) => {
                if let Err(e) = tokio::fs::remove_dir_all(&scratch).await {
                    warn!("Task {}: could not remove {} — {}", task_id, scratch.display(), e);
                }
                self.set_status(&task_id, TaskStatus::Done, None, Some(output));
                info!("Task {} done", task_id);
            }
            Err(e) => {
                if tokio::fs::try_exists(&output).await.unwrap_or(false) {
                    if let Err(e) = tokio::fs::remove_file(&output).await {
                        warn!("Task {}: could not remove {} — {}", task_id, output.display(), e);
                    }
                }
                let message = e.to_string();
                error!("Task {} failed: {}", task_id, message);
                self.set_status(&task_id, TaskStatus::Failed, Some(message.clone()), None);
                self.observer.on_task_failed(&task_id, &message);
            }
        }
    }

    async fn stages(
        &self,
        task_id: &str,
        upload: &Path,
        scratch: &Path,
        output: &Path,
    ) -> Result<(), Pdf2DocxError> {
        tokio::fs::create_dir_all(scratch)
            .await
            .map_err(|e| Pdf2DocxError::io(scratch, e))?;

        self.observer.on_stage_start(task_id, Stage::Extraction);
        let raw = self.settle(task_id, Stage::Extraction, self.extractor.run(upload).await)?;
        let raw_path = scratch.join("raw.md");
        write_text(&raw_path, &raw).await?;

        self.observer.on_stage_start(task_id, Stage::Enhancement);
        let enhanced = self.settle(task_id, Stage::Enhancement, self.enhancer.run(&raw).await)?;
        let enhanced_path = scratch.join("enhanced.md");
        write_text(&enhanced_path, &enhanced).await?;

        self.observer.on_stage_start(task_id, Stage::Rendering);
        let outputs = self.config.outputs_dir();
        tokio::fs::create_dir_all(&outputs)
            .await
            .map_err(|e| Pdf2DocxError::io(&outputs, e))?;
        self.renderer.render(&enhanced_path, output).await?;
        if let Err(e) = self.store.record_output(task_id, output.to_path_buf()) {
            warn!("Task {}: output path not recorded — {}", task_id, e);
        }
        verify_artifact(output).await?;
        self.observer.on_stage_complete(task_id, Stage::Rendering);

        Ok(())
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

async fn write_text(path: &Path, text: &str) -> Result<(), Pdf2DocxError> {
    tokio::fs::write(path, text)
        .await
        .map_err(|e| Pdf2DocxError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_payloads_become_messages() {
        let literal: Box<dyn Any + Send> = Box::new("index out of bounds");
        assert_eq!(panic_message(literal.as_ref()), "index out of bounds");
        let owned: Box<dyn Any + Send> = Box::new(String::from("bad page 3"));
        assert_eq!(panic_message(owned.as_ref()), "bad page 3");
        let other: Box<dyn Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(other.as_ref()), "non-string panic payload");
    }

    #[test]
    fn report_from_task() {
        let report = StatusReport::from(ConversionTask::new("abc"));
        assert_eq!(report.status, TaskStatus::Pending);
        assert!(report.error.is_none());
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"status\":\"pending\""), "got: {json}");
    }
}
