//! Map FFmpeg exit codes and well-known stream-copy errors to short user-facing summaries.
//!
//! Exit codes are from ffmpeg.c: 1 (general), 123 (hard exit), 255 (interrupted by signal).
//! -1 is used for spawn failure. The diagnostic log is kept as detail.

use serde::Serialize;

/// Exit code FFmpeg returns after SIGINT/SIGTERM.
pub const INTERRUPTED_EXIT_CODE: i32 = 255;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FfmpegErrorPayload {
    pub summary: String,
    pub detail: String,
}

/// Log fragments that explain a failed stream copy better than the exit code does.
const KNOWN_LOG_CAUSES: &[(&str, &str)] = &[
    ("already exists", "Output file already exists."),
    (
        "could not find tag for codec",
        "A stream's codec is not supported by the target container.",
    ),
    (
        "not currently supported in container",
        "A stream's codec is not supported by the target container.",
    ),
    ("invalid data found when processing input", "Input is not a readable video."),
    ("no such file or directory", "Input or output path does not exist."),
    ("permission denied", "Permission denied writing the output."),
];

pub fn is_interrupted_exit_code(code: Option<i32>) -> bool {
    code == Some(INTERRUPTED_EXIT_CODE)
}

/// Summary from the log when a known cause appears, else from the exit code.
pub fn parse_ffmpeg_error(log: &str, exit_code: Option<i32>) -> FfmpegErrorPayload {
    let summary = known_log_cause(log)
        .map(str::to_string)
        .or_else(|| exit_code.and_then(known_exit_code_summary))
        .unwrap_or_else(|| match exit_code {
            Some(code) => format!("FFmpeg failed (exit code {}).", code),
            None => fallback_summary(log),
        });
    FfmpegErrorPayload {
        summary,
        detail: log.trim().to_string(),
    }
}

fn known_log_cause(log: &str) -> Option<&'static str> {
    let lower = log.to_lowercase();
    KNOWN_LOG_CAUSES
        .iter()
        .find(|(needle, _)| lower.contains(needle))
        .map(|(_, summary)| *summary)
}

fn known_exit_code_summary(code: i32) -> Option<String> {
    match code {
        -1 => Some("FFmpeg not found or failed to start.".into()),
        1 => Some("FFmpeg failed.".into()),
        123 | INTERRUPTED_EXIT_CODE => Some("Remux was stopped.".into()),
        _ => None,
    }
}

const ELLIPSIS: &str = "…";

/// Last non-empty log line, truncated to `max_len` bytes on a char boundary.
fn fallback_summary(log: &str) -> String {
    let max_len = 120;
    let last = log
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("FFmpeg failed.");
    if last.len() <= max_len {
        return last.to_string();
    }
    let mut cut = max_len - ELLIPSIS.len();
    while !last.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}{}", &last[..cut], ELLIPSIS)
}
