use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use parking_lot::Mutex;
use quickmux_core::RemuxConfig;
use quickmux_core::error::AppError;
use quickmux_core::media::LogIndexer;
use quickmux_core::remux::{RemuxCanceller, RemuxHandle, RemuxOutcome, RemuxProgress};
use quickmux_core::sidecar_api;
use serde::Deserialize;
use serde_json::{Value, json};

#[derive(Debug, Deserialize)]
struct RpcRequest {
    id: u64,
    method: String,
    #[serde(default)]
    params: Value,
}

#[derive(Debug, serde::Serialize)]
struct RpcSuccess {
    id: u64,
    result: Value,
}

#[derive(Debug, serde::Serialize)]
struct RpcFailure {
    id: u64,
    error: RpcErrorPayload,
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct RpcErrorPayload {
    summary: String,
    detail: String,
}

#[derive(Debug, serde::Serialize)]
struct RpcEvent {
    event: String,
    payload: Value,
}

#[derive(Debug, Clone)]
struct ActiveJob {
    job_id: u64,
    canceller: Option<RemuxCanceller>,
}

/// One remux at a time; a second request is rejected while one is active.
#[derive(Clone)]
struct JobRegistry {
    active_job: Arc<Mutex<Option<ActiveJob>>>,
    next_job_id: Arc<AtomicU64>,
}

impl JobRegistry {
    fn new() -> Self {
        Self {
            active_job: Arc::new(Mutex::new(None)),
            next_job_id: Arc::new(AtomicU64::new(1)),
        }
    }

    fn begin_job(&self) -> Result<u64, AppError> {
        let mut guard = self.active_job.lock();
        if let Some(existing) = guard.as_ref() {
            return Err(AppError::from(format!(
                "Another remux is already running (jobId={})",
                existing.job_id
            )));
        }
        let job_id = self.next_job_id.fetch_add(1, Ordering::Relaxed);
        *guard = Some(ActiveJob {
            job_id,
            canceller: None,
        });
        Ok(job_id)
    }

    fn attach_canceller(&self, job_id: u64, canceller: RemuxCanceller) {
        if let Some(active) = self.active_job.lock().as_mut()
            && active.job_id == job_id
        {
            active.canceller = Some(canceller);
        }
    }

    fn finish_job(&self, job_id: u64) {
        let mut guard = self.active_job.lock();
        if guard.as_ref().is_some_and(|active| active.job_id == job_id) {
            *guard = None;
        }
    }

    fn current_job(&self) -> Option<ActiveJob> {
        self.active_job.lock().clone()
    }
}

struct ActiveJobGuard {
    registry: JobRegistry,
    job_id: u64,
}

impl ActiveJobGuard {
    fn new(registry: JobRegistry, job_id: u64) -> Self {
        Self { registry, job_id }
    }
}

impl Drop for ActiveJobGuard {
    fn drop(&mut self) {
        self.registry.finish_job(self.job_id);
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
enum MediaInspectParams {
    Metadata {
        #[serde(rename = "inputPath")]
        input_path: String,
        #[serde(rename = "thumbnailPath")]
        thumbnail_path: Option<PathBuf>,
    },
    CommandPreview {
        #[serde(rename = "inputPath")]
        input_path: Option<String>,
        #[serde(rename = "outputFormat")]
        output_format: String,
    },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MediaRemuxParams {
    input_path: String,
    output_format: String,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct MediaCancelParams {
    job_id: Option<u64>,
}

type SharedWriter = Arc<Mutex<io::Stdout>>;

fn write_json_line<T: serde::Serialize>(writer: &mut impl Write, value: &T) -> io::Result<()> {
    serde_json::to_writer(&mut *writer, value)
        .map_err(|e| io::Error::other(format!("serialize response: {}", e)))?;
    writer.write_all(b"\n")?;
    writer.flush()
}

fn write_json_line_shared<T: serde::Serialize>(writer: &SharedWriter, value: &T) -> io::Result<()> {
    let mut guard = writer.lock();
    write_json_line(&mut *guard, value)
}

fn emit_rpc_event(writer: &SharedWriter, event: &str, payload: Value) {
    let message = RpcEvent {
        event: event.to_string(),
        payload,
    };
    let _ = write_json_line_shared(writer, &message);
}

fn emit_job_progress(writer: &SharedWriter, job_id: u64, progress: RemuxProgress) {
    emit_rpc_event(
        writer,
        "media.job.progress",
        json!({ "jobId": job_id, "progress": progress.fraction }),
    );
}

fn emit_job_outcome(writer: &SharedWriter, job_id: u64, outcome: RemuxOutcome) {
    let summary = outcome.failure_summary();
    match outcome {
        RemuxOutcome::Success { output_path } => emit_rpc_event(
            writer,
            "media.job.complete",
            json!({ "jobId": job_id, "outputPath": output_path }),
        ),
        RemuxOutcome::Cancelled => {
            emit_rpc_event(writer, "media.job.cancelled", json!({ "jobId": job_id }))
        }
        RemuxOutcome::Failed { message, log, code } => {
            let summary = summary.unwrap_or_else(|| message.clone());
            emit_rpc_event(
                writer,
                "media.job.error",
                json!({
                    "jobId": job_id,
                    "message": message,
                    "summary": summary,
                    "detail": log,
                    "code": code,
                }),
            )
        }
    }
}

fn parse_error_payload(err: &AppError) -> RpcErrorPayload {
    match err {
        AppError::FfmpegFailed { code, stderr } if *code == -1 => RpcErrorPayload {
            summary: stderr.clone(),
            detail: stderr.clone(),
        },
        AppError::FfmpegFailed { code, stderr } => {
            let parsed = quickmux_core::ffmpeg::parse_ffmpeg_error(stderr, Some(*code));
            RpcErrorPayload {
                summary: parsed.summary,
                detail: parsed.detail,
            }
        }
        _ => {
            let text = err.to_string();
            RpcErrorPayload {
                summary: text.clone(),
                detail: text,
            }
        }
    }
}

fn params_from_value<T: serde::de::DeserializeOwned>(params: Value) -> Result<T, AppError> {
    serde_json::from_value(params)
        .map_err(|e| AppError::from(format!("Invalid params payload: {}", e)))
}

fn to_result_value<T: serde::Serialize>(value: T, what: &str) -> Result<Value, AppError> {
    serde_json::to_value(value)
        .map_err(|e| AppError::from(format!("Failed to serialize {}: {}", what, e)))
}

fn dispatch_sync(
    method: &str,
    params: Value,
    config: &RemuxConfig,
    jobs: &JobRegistry,
) -> Result<Value, AppError> {
    match method {
        "app.capabilities" => to_result_value(
            sidecar_api::app_capabilities(config),
            "app capabilities",
        ),
        "media.inspect" => match params_from_value(params)? {
            MediaInspectParams::Metadata {
                input_path,
                thumbnail_path,
            } => to_result_value(
                sidecar_api::inspect_media(input_path, thumbnail_path)?,
                "metadata",
            ),
            MediaInspectParams::CommandPreview {
                input_path,
                output_format,
            } => Ok(Value::String(sidecar_api::preview_remux_command(
                config,
                input_path,
                &output_format,
            ))),
        },
        "media.cancel" => {
            let parsed: MediaCancelParams = params_from_value(params)?;
            match (jobs.current_job(), parsed.job_id) {
                (None, Some(job_id)) => Err(AppError::from(format!("Unknown jobId: {}", job_id))),
                (None, None) => Ok(json!({ "cancelled": false, "jobId": Value::Null })),
                (Some(active), Some(job_id)) if active.job_id != job_id => {
                    Err(AppError::from(format!("Unknown jobId: {}", job_id)))
                }
                (Some(active), _) => {
                    if let Some(canceller) = &active.canceller {
                        canceller.cancel();
                    }
                    Ok(json!({ "cancelled": true, "jobId": active.job_id }))
                }
            }
        }
        _ => Err(AppError::from(format!("Unknown method: {}", method))),
    }
}

fn write_response(writer: &SharedWriter, id: u64, result: Result<Value, AppError>) {
    let response = match result {
        Ok(result) => serde_json::to_value(RpcSuccess { id, result })
            .map_err(|e| io::Error::other(format!("serialize success: {}", e))),
        Err(err) => serde_json::to_value(RpcFailure {
            id,
            error: parse_error_payload(&err),
        })
        .map_err(|e| io::Error::other(format!("serialize failure: {}", e))),
    };

    match response {
        Ok(value) => {
            let _ = write_json_line_shared(writer, &value);
        }
        Err(err) => {
            let failure = RpcFailure {
                id,
                error: RpcErrorPayload {
                    summary: "Serialization error".to_string(),
                    detail: err.to_string(),
                },
            };
            let _ = write_json_line_shared(writer, &failure);
        }
    }
}

/// Replies with `{jobId, outputPath}` once FFmpeg is started, then reports progress and
/// the outcome as events from a watcher thread.
fn handle_media_remux(
    request: RpcRequest,
    writer: &SharedWriter,
    config: &RemuxConfig,
    jobs: &JobRegistry,
) -> Option<thread::JoinHandle<()>> {
    let parsed: MediaRemuxParams = match params_from_value(request.params) {
        Ok(parsed) => parsed,
        Err(err) => {
            write_response(writer, request.id, Err(err));
            return None;
        }
    };
    let job_id = match jobs.begin_job() {
        Ok(job_id) => job_id,
        Err(err) => {
            write_response(writer, request.id, Err(err));
            return None;
        }
    };
    let job_guard = ActiveJobGuard::new(jobs.clone(), job_id);

    let handle: RemuxHandle = match sidecar_api::start_remux(
        config,
        Arc::new(LogIndexer),
        parsed.input_path,
        &parsed.output_format,
    ) {
        Ok(handle) => handle,
        Err(err) => {
            write_response(writer, request.id, Err(err));
            return None;
        }
    };
    jobs.attach_canceller(job_id, handle.canceller());
    write_response(
        writer,
        request.id,
        Ok(json!({ "jobId": job_id, "outputPath": handle.output_path() })),
    );

    let writer = Arc::clone(writer);
    Some(thread::spawn(move || {
        let outcome = handle.wait_blocking(|progress| emit_job_progress(&writer, job_id, progress));
        // Free the slot first so a client reacting to the outcome event can start the next job.
        drop(job_guard);
        emit_job_outcome(&writer, job_id, outcome);
    }))
}

fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();
}

fn main() -> io::Result<()> {
    init_logging();
    let config = RemuxConfig::load().map_err(|e| io::Error::other(e.to_string()))?;
    log::info!(
        target: "quickmux::sidecar",
        "Sidecar ready: output_dir={}, formats={:?}",
        config.effective_output_dir().display(),
        config.effective_formats()
    );

    let stdin = io::stdin();
    let stdout: SharedWriter = Arc::new(Mutex::new(io::stdout()));
    let jobs = JobRegistry::new();
    let mut watchers: Vec<thread::JoinHandle<()>> = Vec::new();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                let failure = RpcFailure {
                    id: 0,
                    error: RpcErrorPayload {
                        summary: "Invalid input stream".to_string(),
                        detail: err.to_string(),
                    },
                };
                let _ = write_json_line_shared(&stdout, &failure);
                continue;
            }
        };

        if line.trim().is_empty() {
            continue;
        }

        let request: RpcRequest = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(err) => {
                let failure = RpcFailure {
                    id: 0,
                    error: RpcErrorPayload {
                        summary: "Invalid request".to_string(),
                        detail: err.to_string(),
                    },
                };
                let _ = write_json_line_shared(&stdout, &failure);
                continue;
            }
        };

        log::debug!(
            target: "quickmux::sidecar",
            "Request id={} method={}",
            request.id,
            request.method
        );
        if request.method == "media.remux" {
            if let Some(watcher) = handle_media_remux(request, &stdout, &config, &jobs) {
                watchers.push(watcher);
            }
        } else {
            let result = dispatch_sync(&request.method, request.params, &config, &jobs);
            write_response(&stdout, request.id, result);
        }
        watchers.retain(|w| !w.is_finished());
    }

    for watcher in watchers {
        let _ = watcher.join();
    }
    Ok(())
}
