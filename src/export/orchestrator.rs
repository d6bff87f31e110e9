//! Export orchestrator: the lifecycle of a single export job.
//!
//! One orchestrator drives at most one job at a time. `start` builds the
//! composition, submits it to the external compositor and polls the task on
//! a spawned driver; `stop` cancels best-effort and resets. All state
//! transitions and every callback invocation happen under the orchestrator's
//! mutex, so progress and completion for one job are strictly ordered and a
//! returned `stop` means no further callbacks fire.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::composition::builder;
use crate::composition::types::SourceClip;
use crate::config::Config;
use crate::engine::{CompositorEngine, ExportTask, TaskStatus};
use crate::error::{ExportError, MergeError, Result};
use crate::export::thumbnail;
use crate::overlay::layout::OverlayElement;
use crate::overlay::types::OverlayFragment;

/// Progress callback, fraction in [0, 1]
pub type ProgressFn = Box<dyn FnMut(f32) + Send + 'static>;

/// Completion callback, invoked exactly once per job that reaches a terminal
/// result
pub type CompletionFn = Box<dyn FnOnce(Result<ExportOutput>) + Send + 'static>;

/// Payload of a successful export
#[derive(Debug, Clone)]
pub struct ExportOutput {
    /// Encoded video bytes
    pub video: Vec<u8>,

    /// Encoded JPEG preview bytes
    pub thumbnail: Vec<u8>,
}

/// Lifecycle of one export job
#[derive(Debug, Clone, PartialEq)]
pub enum JobState {
    Idle,
    Running,

    /// Terminal; the cached output location replays on the next `start`
    Finished(PathBuf),

    /// Terminal; the next `start` begins a fresh job
    Failed(String),
}

struct Inner<E: CompositorEngine> {
    state: JobState,

    /// Bumped on every new job and on `stop`; stale drivers drop out
    generation: u64,

    task: Option<Arc<E::Task>>,

    /// Overlay handles stay owned by the job for its entire lifetime,
    /// released only on completion or cancellation
    overlays: Vec<OverlayElement>,

    progress_cb: Option<ProgressFn>,
    completion_cb: Option<CompletionFn>,
}

/// Drives one export job at a time against an external compositor engine
pub struct ExportOrchestrator<E: CompositorEngine> {
    engine: Arc<E>,
    config: Config,
    clips: Vec<SourceClip>,
    fragments: Vec<OverlayFragment>,
    inner: Arc<Mutex<Inner<E>>>,
}

impl<E: CompositorEngine> ExportOrchestrator<E> {
    pub fn new(
        engine: E,
        clips: Vec<SourceClip>,
        fragments: Vec<OverlayFragment>,
        config: Config,
    ) -> Self {
        Self {
            engine: Arc::new(engine),
            config,
            clips,
            fragments,
            inner: Arc::new(Mutex::new(Inner {
                state: JobState::Idle,
                generation: 0,
                task: None,
                overlays: Vec::new(),
                progress_cb: None,
                completion_cb: None,
            })),
        }
    }

    /// Convenience constructor for a single source clip
    pub fn single<P: Into<PathBuf>>(
        engine: E,
        video: P,
        fragments: Vec<OverlayFragment>,
        config: Config,
    ) -> Self {
        Self::new(engine, vec![SourceClip::new(video.into())], fragments, config)
    }

    /// Current job state snapshot
    pub fn state(&self) -> JobState {
        self.inner.lock().expect("state lock").state.clone()
    }

    /// Output location of the last finished job, if any
    pub fn output_location(&self) -> Option<PathBuf> {
        match &self.inner.lock().expect("state lock").state {
            JobState::Finished(path) => Some(path.clone()),
            _ => None,
        }
    }

    /// Begin an export, or replay the cached result of a finished one.
    ///
    /// No-op while a job is already running. After a prior success the
    /// cached output is loaded again and completion fires without touching
    /// the compositor. Callbacks run under the orchestrator's internal lock
    /// and must not call back into the same orchestrator.
    pub fn start<P, C>(&self, on_progress: P, on_completion: C)
    where
        P: FnMut(f32) + Send + 'static,
        C: FnOnce(Result<ExportOutput>) + Send + 'static,
    {
        let mut inner = self.inner.lock().expect("state lock");
        match inner.state.clone() {
            JobState::Running => {
                debug!("start ignored: a job is already running");
            }
            JobState::Finished(path) => {
                let generation = inner.generation;
                drop(inner);
                info!("replaying cached export result from {:?}", path);
                let engine = self.engine.clone();
                let inner = self.inner.clone();
                tokio::spawn(async move {
                    let result = finalize(engine.as_ref(), &path).await;
                    // A stop issued mid-replay silences it like a running job
                    let guard = inner.lock().expect("state lock");
                    if guard.generation != generation {
                        return;
                    }
                    on_completion(result);
                });
            }
            JobState::Idle | JobState::Failed(_) => {
                inner.state = JobState::Running;
                inner.generation += 1;
                inner.task = None;
                inner.overlays.clear();
                inner.progress_cb = Some(Box::new(on_progress));
                inner.completion_cb = Some(Box::new(on_completion));
                let generation = inner.generation;
                drop(inner);

                tokio::spawn(drive_job(
                    self.engine.clone(),
                    self.inner.clone(),
                    self.clips.clone(),
                    self.fragments.clone(),
                    self.config.clone(),
                    generation,
                ));
            }
        }
    }

    /// Cancel any in-flight job and reset to `Idle`.
    ///
    /// Cancellation of the underlying compositor work is best-effort and
    /// asynchronous, but once this returns no further callbacks fire for the
    /// stopped job.
    pub fn stop(&self) {
        let mut inner = self.inner.lock().expect("state lock");
        inner.generation += 1;
        if let Some(task) = inner.task.take() {
            task.cancel();
        }
        inner.progress_cb = None;
        inner.completion_cb = None;
        inner.overlays.clear();
        inner.state = JobState::Idle;
        debug!("export stopped, state reset to idle");
    }
}

/// Read the finished file and capture its preview. Both must succeed; a
/// missing thumbnail is a failure, never a silent partial success.
async fn finalize<E: CompositorEngine>(engine: &E, path: &Path) -> Result<ExportOutput> {
    let video = tokio::fs::read(path).await.map_err(|e| ExportError::OutputReadFailed {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    let thumbnail = thumbnail::capture(engine, path).await?;
    Ok(ExportOutput { video, thumbnail })
}

async fn drive_job<E: CompositorEngine>(
    engine: Arc<E>,
    inner: Arc<Mutex<Inner<E>>>,
    clips: Vec<SourceClip>,
    fragments: Vec<OverlayFragment>,
    config: Config,
    generation: u64,
) {
    let request = match builder::build(engine.as_ref(), &clips, &fragments, &config).await {
        Ok(request) => request,
        Err(e) => {
            finish(&inner, generation, Err(e));
            return;
        }
    };
    let output = request.output.clone();

    {
        let mut guard = inner.lock().expect("state lock");
        if guard.generation != generation {
            return;
        }
        guard.overlays = request.overlays.clone();
    }

    let task = match engine.submit(request).await {
        Ok(task) => Arc::new(task),
        Err(e) => {
            finish(&inner, generation, Err(e));
            return;
        }
    };

    {
        let mut guard = inner.lock().expect("state lock");
        if guard.generation != generation {
            // Stopped while submitting; the job is already abandoned
            task.cancel();
            return;
        }
        guard.task = Some(task.clone());
    }

    let mut poll = tokio::time::interval(Duration::from_millis(100));
    let status = loop {
        poll.tick().await;
        let status = task.status();
        if !status.is_transient() {
            break status;
        }

        let fraction = task.progress();
        let mut guard = inner.lock().expect("state lock");
        if guard.generation != generation {
            return;
        }
        if let Some(cb) = guard.progress_cb.as_mut() {
            cb(fraction);
        }
    };

    let result = match status {
        TaskStatus::Completed => finalize(engine.as_ref(), &output).await.map(|out| (output, out)),
        TaskStatus::Unknown if output.exists() => {
            // Ambiguous terminal state but the file is there; trust the file
            warn!("compositor reported unknown status with output present, treating as success");
            finalize(engine.as_ref(), &output).await.map(|out| (output, out))
        }
        TaskStatus::Unknown => Err(ExportError::CompositorFailed {
            reason: "terminal status unknown and no output file produced".to_string(),
        }
        .into()),
        TaskStatus::Failed(reason) => Err(ExportError::CompositorFailed { reason }.into()),
        TaskStatus::Cancelled => Err(ExportError::CompositorCancelled.into()),
        TaskStatus::Waiting | TaskStatus::Exporting => unreachable!("loop exits on terminal status"),
    };

    finish(&inner, generation, result);
}

/// Enter a terminal state and deliver the completion exactly once. Stale
/// generations (a stopped job) deliver nothing.
fn finish<E: CompositorEngine>(
    inner: &Arc<Mutex<Inner<E>>>,
    generation: u64,
    result: std::result::Result<(PathBuf, ExportOutput), MergeError>,
) {
    let mut guard = inner.lock().expect("state lock");
    if guard.generation != generation {
        return;
    }

    guard.task = None;
    guard.overlays.clear();
    guard.progress_cb = None;
    let completion = guard.completion_cb.take();

    match result {
        Ok((path, output)) => {
            info!("export finished: {} video bytes", output.video.len());
            guard.state = JobState::Finished(path);
            if let Some(cb) = completion {
                cb(Ok(output));
            }
        }
        Err(e) => {
            warn!("export failed: {}", e);
            guard.state = JobState::Failed(e.to_string());
            if let Some(cb) = completion {
                cb(Err(e));
            }
        }
    }
}
