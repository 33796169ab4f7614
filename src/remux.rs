//! Remux job execution.
//!
//! [`RemuxOrchestrator::run`] returns a [`RemuxHandle`] immediately and drives FFmpeg on a
//! worker thread. Progress flows through an unbounded channel; the terminal outcome goes
//! through a oneshot channel, so at most one outcome can ever be delivered per job.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Child;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};

use crate::error::AppError;
use crate::ffmpeg::discovery::get_ffmpeg_path;
use crate::ffmpeg::{
    ProgressParser, for_each_line, is_interrupted_exit_code, parse_ffmpeg_error, spawn_ffmpeg,
};
use crate::media::MediaIndexer;

pub const FAILED_MESSAGE: &str = "Remux execution failed";

/// A built stream-copy invocation. Immutable once created by the builder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemuxJob {
    input_path: PathBuf,
    output_path: PathBuf,
    output_format: String,
    command_args: Vec<OsString>,
}

impl RemuxJob {
    pub(crate) fn new(
        input_path: PathBuf,
        output_path: PathBuf,
        output_format: String,
        command_args: Vec<OsString>,
    ) -> Self {
        Self {
            input_path,
            output_path,
            output_format,
            command_args,
        }
    }

    pub fn input_path(&self) -> &Path {
        &self.input_path
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// Lowercased container name, also the output extension.
    pub fn output_format(&self) -> &str {
        &self.output_format
    }

    pub fn command_args(&self) -> &[OsString] {
        &self.command_args
    }

    pub fn mime_hint(&self) -> String {
        format!("video/{}", self.output_format)
    }
}

/// Processed fraction in [0, 1]. Successive values are not guaranteed to increase.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RemuxProgress {
    pub fraction: f32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum RemuxOutcome {
    #[serde(rename_all = "camelCase")]
    Success { output_path: PathBuf },
    Cancelled,
    /// `code` is FFmpeg's exit code, or -1 when it never ran.
    Failed {
        message: String,
        log: String,
        code: Option<i32>,
    },
}

impl RemuxOutcome {
    fn failed(log: String, code: Option<i32>) -> Self {
        Self::Failed {
            message: FAILED_MESSAGE.to_string(),
            log,
            code,
        }
    }

    /// User-facing cause derived from the exit code and log; `None` unless failed.
    pub fn failure_summary(&self) -> Option<String> {
        match self {
            Self::Failed { log, code, .. } => Some(parse_ffmpeg_error(log, *code).summary),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Idle,
    Running,
    Succeeded,
    Cancelled,
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Cancelled | Self::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExitClass {
    Success,
    Cancelled,
    Failed,
}

/// A clean exit wins even if a cancel raced it; otherwise a requested cancel or
/// FFmpeg's interrupted exit code counts as cancellation.
fn classify_exit(success: bool, code: Option<i32>, cancel_requested: bool) -> ExitClass {
    if success {
        ExitClass::Success
    } else if cancel_requested || is_interrupted_exit_code(code) {
        ExitClass::Cancelled
    } else {
        ExitClass::Failed
    }
}

/// Shared between the worker and any number of [`RemuxCanceller`]s.
#[derive(Debug)]
struct JobControl {
    state: Mutex<JobState>,
    child: Mutex<Option<Child>>,
    cancel_requested: AtomicBool,
}

impl JobControl {
    fn new() -> Self {
        Self {
            state: Mutex::new(JobState::Idle),
            child: Mutex::new(None),
            cancel_requested: AtomicBool::new(false),
        }
    }

    fn set_state(&self, state: JobState) {
        *self.state.lock() = state;
    }

    fn cancel_requested(&self) -> bool {
        self.cancel_requested.load(Ordering::SeqCst)
    }

    fn kill_child(&self) {
        if let Some(child) = self.child.lock().as_mut() {
            log::info!(target: "quickmux::remux", "Terminating FFmpeg process");
            let _ = child.kill();
        }
    }
}

/// Cloneable cancel/observe side of a job.
#[derive(Debug, Clone)]
pub struct RemuxCanceller {
    control: Arc<JobControl>,
}

impl RemuxCanceller {
    /// Request cancellation. Surfaces as [`RemuxOutcome::Cancelled`] unless the job already
    /// finished. Safe to call from any thread, any number of times.
    pub fn cancel(&self) {
        if self.control.state.lock().is_terminal() {
            return;
        }
        self.control.cancel_requested.store(true, Ordering::SeqCst);
        self.control.kill_child();
    }

    pub fn state(&self) -> JobState {
        *self.control.state.lock()
    }
}

pub struct RemuxHandle {
    output_path: PathBuf,
    progress: mpsc::UnboundedReceiver<RemuxProgress>,
    outcome: oneshot::Receiver<RemuxOutcome>,
    canceller: RemuxCanceller,
}

impl RemuxHandle {
    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    pub fn cancel(&self) {
        self.canceller.cancel();
    }

    pub fn state(&self) -> JobState {
        self.canceller.state()
    }

    pub fn canceller(&self) -> RemuxCanceller {
        self.canceller.clone()
    }

    pub fn into_parts(
        self,
    ) -> (
        mpsc::UnboundedReceiver<RemuxProgress>,
        oneshot::Receiver<RemuxOutcome>,
        RemuxCanceller,
    ) {
        (self.progress, self.outcome, self.canceller)
    }

    /// Blocks the calling thread; must not be called from inside an async runtime.
    pub fn wait_blocking(mut self, mut on_progress: impl FnMut(RemuxProgress)) -> RemuxOutcome {
        while let Some(progress) = self.progress.blocking_recv() {
            on_progress(progress);
        }
        self.outcome.blocking_recv().unwrap_or_else(|_| lost_outcome())
    }

    pub async fn wait(mut self, mut on_progress: impl FnMut(RemuxProgress)) -> RemuxOutcome {
        while let Some(progress) = self.progress.recv().await {
            on_progress(progress);
        }
        self.outcome.await.unwrap_or_else(|_| lost_outcome())
    }
}

fn lost_outcome() -> RemuxOutcome {
    RemuxOutcome::failed(
        "remux worker stopped without reporting an outcome".to_string(),
        None,
    )
}

/// Runs remux jobs against one FFmpeg binary, notifying `indexer` after each success.
#[derive(Clone)]
pub struct RemuxOrchestrator {
    ffmpeg: PathBuf,
    indexer: Arc<dyn MediaIndexer>,
}

impl RemuxOrchestrator {
    pub fn new(ffmpeg: impl Into<PathBuf>, indexer: Arc<dyn MediaIndexer>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            indexer,
        }
    }

    pub fn discover(indexer: Arc<dyn MediaIndexer>) -> Result<Self, AppError> {
        Ok(Self::new(get_ffmpeg_path()?, indexer))
    }

    /// Dispatches `job` and returns without blocking. `total_duration_ms` of 0 means unknown.
    pub fn run(&self, job: RemuxJob, total_duration_ms: u64) -> RemuxHandle {
        let control = Arc::new(JobControl::new());
        let (progress_tx, progress_rx) = mpsc::unbounded_channel();
        let (outcome_tx, outcome_rx) = oneshot::channel();
        let output_path = job.output_path().to_path_buf();

        control.set_state(JobState::Running);
        let worker = JobWorker {
            ffmpeg: self.ffmpeg.clone(),
            indexer: Arc::clone(&self.indexer),
            control: Arc::clone(&control),
        };
        thread::spawn(move || {
            let outcome = worker.execute(&job, total_duration_ms, progress_tx);
            worker.control.set_state(match &outcome {
                RemuxOutcome::Success { .. } => JobState::Succeeded,
                RemuxOutcome::Cancelled => JobState::Cancelled,
                RemuxOutcome::Failed { .. } => JobState::Failed,
            });
            let _ = outcome_tx.send(outcome);
        });

        RemuxHandle {
            output_path,
            progress: progress_rx,
            outcome: outcome_rx,
            canceller: RemuxCanceller { control },
        }
    }
}

struct JobWorker {
    ffmpeg: PathBuf,
    indexer: Arc<dyn MediaIndexer>,
    control: Arc<JobControl>,
}

impl JobWorker {
    /// Consumes the progress sender so the channel closes before the outcome is sent.
    fn execute(
        &self,
        job: &RemuxJob,
        total_duration_ms: u64,
        progress_tx: mpsc::UnboundedSender<RemuxProgress>,
    ) -> RemuxOutcome {
        let preexisting = job.output_path().exists();
        let (child, stderr) = match spawn_ffmpeg(&self.ffmpeg, job.command_args()) {
            Ok(spawned) => spawned,
            Err(e) => {
                log::error!(target: "quickmux::remux", "{}", e);
                return RemuxOutcome::failed(e.to_string(), Some(-1));
            }
        };
        *self.control.child.lock() = Some(child);
        if self.control.cancel_requested() {
            self.control.kill_child();
        }

        let mut parser = ProgressParser::new(total_duration_ms);
        for_each_line(stderr, |line| {
            if let Some(progress) = parser.feed_line(line) {
                let _ = progress_tx.send(progress);
            }
        });
        drop(progress_tx);

        let child = self.control.child.lock().take();
        let status = match child.map(|mut c| c.wait()) {
            Some(Ok(status)) => status,
            Some(Err(e)) => {
                log::error!(target: "quickmux::remux", "Failed to wait for FFmpeg: {}", e);
                remove_partial_output(job.output_path(), preexisting);
                return RemuxOutcome::failed(parser.finish(), None);
            }
            None => {
                remove_partial_output(job.output_path(), preexisting);
                return RemuxOutcome::failed(parser.finish(), None);
            }
        };

        let code = status.code();
        match classify_exit(status.success(), code, self.control.cancel_requested()) {
            ExitClass::Success => {
                log::info!(
                    target: "quickmux::remux",
                    "Remux completed: {}",
                    job.output_path().display()
                );
                self.indexer
                    .notify_indexed(job.output_path(), &job.mime_hint());
                RemuxOutcome::Success {
                    output_path: job.output_path().to_path_buf(),
                }
            }
            ExitClass::Cancelled => {
                log::warn!(target: "quickmux::remux", "Remux cancelled (code={:?})", code);
                remove_partial_output(job.output_path(), preexisting);
                RemuxOutcome::Cancelled
            }
            ExitClass::Failed => {
                let log = parser.finish();
                log::error!(
                    target: "quickmux::remux",
                    "Remux failed (code={:?}): {}",
                    code,
                    parse_ffmpeg_error(&log, code).summary
                );
                remove_partial_output(job.output_path(), preexisting);
                RemuxOutcome::failed(log, code)
            }
        }
    }
}

/// Deletes what an unfinished job wrote, so a retry is not refused. A file that was
/// already there before the job started belongs to someone else and is kept.
fn remove_partial_output(path: &Path, preexisting: bool) {
    if preexisting || !path.exists() {
        return;
    }
    match fs::remove_file(path) {
        Ok(()) => log::debug!(
            target: "quickmux::remux",
            "Removed partial output {}",
            path.display()
        ),
        Err(e) => log::warn!(
            target: "quickmux::remux",
            "Failed to remove partial output {}: {}",
            path.display(),
            e
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_exit_is_success_even_after_cancel() {
        assert_eq!(classify_exit(true, Some(0), false), ExitClass::Success);
        assert_eq!(classify_exit(true, Some(0), true), ExitClass::Success);
    }

    #[test]
    fn requested_cancel_or_interrupt_code_is_cancelled() {
        assert_eq!(classify_exit(false, None, true), ExitClass::Cancelled);
        assert_eq!(classify_exit(false, Some(1), true), ExitClass::Cancelled);
        assert_eq!(classify_exit(false, Some(255), false), ExitClass::Cancelled);
    }

    #[test]
    fn other_exits_fail() {
        assert_eq!(classify_exit(false, Some(1), false), ExitClass::Failed);
        assert_eq!(classify_exit(false, None, false), ExitClass::Failed);
    }

    #[test]
    fn failed_outcome_carries_fixed_message() {
        let outcome = RemuxOutcome::failed("log text".into(), Some(1));
        assert_eq!(
            outcome,
            RemuxOutcome::Failed {
                message: "Remux execution failed".into(),
                log: "log text".into(),
                code: Some(1),
            }
        );
    }

    #[test]
    fn failure_summary_comes_from_log_and_exit_code() {
        let outcome = RemuxOutcome::failed(
            "[mp4 @ 0x1] Could not find tag for codec pcm_s16le\n".into(),
            Some(1),
        );
        assert_eq!(
            outcome.failure_summary().as_deref(),
            Some("A stream's codec is not supported by the target container.")
        );
        let spawn_failure = RemuxOutcome::failed("Failed to spawn FFmpeg".into(), Some(-1));
        assert_eq!(
            spawn_failure.failure_summary().as_deref(),
            Some("FFmpeg not found or failed to start.")
        );
        assert_eq!(RemuxOutcome::Cancelled.failure_summary(), None);
    }

    #[test]
    fn partial_output_is_removed_unless_it_predates_the_job() {
        let dir = tempfile::tempdir().unwrap();
        let created = dir.path().join("created.mp4");
        std::fs::write(&created, b"partial").unwrap();
        remove_partial_output(&created, false);
        assert!(!created.exists());

        let owned = dir.path().join("owned.mp4");
        std::fs::write(&owned, b"keep").unwrap();
        remove_partial_output(&owned, true);
        assert_eq!(std::fs::read(&owned).unwrap(), b"keep");

        remove_partial_output(&dir.path().join("missing.mp4"), false);
    }

    #[test]
    fn outcome_serializes_with_status_tag() {
        let json = serde_json::to_value(RemuxOutcome::Success {
            output_path: PathBuf::from("/out/movie.mp4"),
        })
        .unwrap();
        assert_eq!(json["status"], "success");
        assert_eq!(json["outputPath"], "/out/movie.mp4");
        let json = serde_json::to_value(RemuxOutcome::Cancelled).unwrap();
        assert_eq!(json["status"], "cancelled");
    }

    #[test]
    fn terminal_states() {
        assert!(!JobState::Idle.is_terminal());
        assert!(!JobState::Running.is_terminal());
        assert!(JobState::Failed.is_terminal());
    }
}
