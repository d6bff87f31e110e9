//! Scripted engine for unit tests: probes answer from a fixture table and
//! submitted tasks walk through staged progress before settling on a
//! configured terminal status.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use image::{Rgb, RgbImage};

use crate::composition::types::{AssetInfo, ExportRequest};
use crate::engine::{CompositorEngine, ExportTask, TaskStatus};
use crate::error::{ExportError, Result};

/// How a mock export run ends
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MockOutcome {
    /// Write the output file, report `Completed`
    Complete,

    /// Report `Failed` without producing a file
    Fail,

    /// Write the output file but report `Unknown` (ambiguous terminal state)
    UnknownWithFile,

    /// Stay transient until cancelled
    Hold,
}

pub struct MockEngine {
    assets: HashMap<PathBuf, AssetInfo>,
    outcome: MockOutcome,
    submits: Arc<AtomicUsize>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self {
            assets: HashMap::new(),
            outcome: MockOutcome::Complete,
            submits: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_asset<P: Into<PathBuf>>(mut self, path: P, info: AssetInfo) -> Self {
        self.assets.insert(path.into(), info);
        self
    }

    pub fn with_outcome(mut self, outcome: MockOutcome) -> Self {
        self.outcome = outcome;
        self
    }

    /// Shared submit counter, for asserting cache replays never re-submit
    pub fn submit_counter(&self) -> Arc<AtomicUsize> {
        self.submits.clone()
    }
}

struct MockShared {
    status: Mutex<TaskStatus>,
    progress: AtomicU32,
    cancelled: AtomicBool,
}

pub struct MockTask {
    shared: Arc<MockShared>,
}

impl ExportTask for MockTask {
    fn status(&self) -> TaskStatus {
        self.shared.status.lock().expect("status lock").clone()
    }

    fn progress(&self) -> f32 {
        f32::from_bits(self.shared.progress.load(Ordering::Relaxed))
    }

    fn cancel(&self) {
        self.shared.cancelled.store(true, Ordering::SeqCst);
    }
}

async fn run_task(shared: Arc<MockShared>, outcome: MockOutcome, output: PathBuf) {
    let steps = [0.25f32, 0.5, 0.75];
    for step in steps {
        tokio::time::sleep(Duration::from_millis(5)).await;
        if shared.cancelled.load(Ordering::SeqCst) {
            *shared.status.lock().expect("status lock") = TaskStatus::Cancelled;
            return;
        }
        shared.progress.store(step.to_bits(), Ordering::Relaxed);
        *shared.status.lock().expect("status lock") = TaskStatus::Exporting;
    }

    if outcome == MockOutcome::Hold {
        loop {
            tokio::time::sleep(Duration::from_millis(5)).await;
            if shared.cancelled.load(Ordering::SeqCst) {
                *shared.status.lock().expect("status lock") = TaskStatus::Cancelled;
                return;
            }
        }
    }

    let final_status = match outcome {
        MockOutcome::Complete => {
            let _ = std::fs::write(&output, b"mock encoded video payload");
            shared.progress.store(1.0f32.to_bits(), Ordering::Relaxed);
            TaskStatus::Completed
        }
        MockOutcome::UnknownWithFile => {
            let _ = std::fs::write(&output, b"mock encoded video payload");
            TaskStatus::Unknown
        }
        MockOutcome::Fail => TaskStatus::Failed("mock compositor failure".to_string()),
        MockOutcome::Hold => unreachable!(),
    };
    *shared.status.lock().expect("status lock") = final_status;
}

impl CompositorEngine for MockEngine {
    type Task = MockTask;

    async fn probe(&self, path: &Path) -> Result<AssetInfo> {
        if let Some(info) = self.assets.get(path) {
            return Ok(info.clone());
        }
        // Files the mock task itself wrote have no fixture; answer with a
        // generic finished-file shape so previews of mock outputs work
        if path.exists() {
            return Ok(AssetInfo {
                duration: 1.0,
                video: Some(crate::composition::types::VideoStreamInfo {
                    width: 640,
                    height: 360,
                    rotation: 0,
                }),
                has_audio: true,
            });
        }
        Err(ExportError::InvalidAsset {
            path: path.display().to_string(),
            reason: "no fixture for path".to_string(),
        }
        .into())
    }

    async fn submit(&self, request: ExportRequest) -> Result<Self::Task> {
        self.submits.fetch_add(1, Ordering::SeqCst);

        let shared = Arc::new(MockShared {
            status: Mutex::new(TaskStatus::Waiting),
            progress: AtomicU32::new(0.0f32.to_bits()),
            cancelled: AtomicBool::new(false),
        });
        tokio::spawn(run_task(shared.clone(), self.outcome, request.output));

        Ok(MockTask { shared })
    }

    async fn extract_frame(&self, path: &Path, _at_seconds: f64) -> Result<RgbImage> {
        if !path.exists() {
            return Err(ExportError::ThumbnailExtractionFailed {
                reason: format!("no output at {:?}", path),
            }
            .into());
        }
        Ok(RgbImage::from_pixel(16, 16, Rgb([12, 34, 56])))
    }
}
