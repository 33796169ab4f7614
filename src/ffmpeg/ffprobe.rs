//! FFprobe-based container metadata: duration, size, and the first video stream.

use std::path::Path;
use std::process::{Command, Stdio};

#[cfg(windows)]
use std::os::windows::process::CommandExt;

use serde::Deserialize;

use super::discovery::get_ffprobe_path;
use crate::error::AppError;

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
    size: Option<String>,
    #[serde(default)]
    format_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    #[serde(default)]
    codec_name: Option<String>,
    /// Per-stream duration, used when the container header omits one.
    #[serde(default)]
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: Option<FfprobeFormat>,
    streams: Option<Vec<FfprobeStream>>,
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoMetadata {
    /// `None` when neither the container nor the video stream reports a duration.
    pub duration_ms: Option<u64>,
    pub width: u32,
    pub height: u32,
    pub size: Option<u64>,
    pub codec_name: Option<String>,
    pub format_name: Option<String>,
}

fn parse_seconds_ms(s: &str) -> Option<u64> {
    let secs: f64 = s.trim().parse().ok()?;
    (secs.is_finite() && secs >= 0.0).then(|| (secs * 1000.0).round() as u64)
}

/// Duration comes from the container, else the first video stream.
pub fn parse_ffprobe_json(json: &str) -> Result<VideoMetadata, AppError> {
    let output: FfprobeOutput = serde_json::from_str(json)
        .map_err(|e| AppError::ProbeFailed(format!("invalid ffprobe JSON: {}", e)))?;

    let format = output.format.as_ref();
    let video_stream = output
        .streams
        .as_ref()
        .and_then(|streams| streams.iter().find(|s| s.codec_type.as_deref() == Some("video")));

    let duration_ms = format
        .and_then(|f| f.duration.as_deref())
        .and_then(parse_seconds_ms)
        .or_else(|| {
            video_stream
                .and_then(|s| s.duration.as_deref())
                .and_then(parse_seconds_ms)
        });
    let size = format
        .and_then(|f| f.size.as_ref())
        .and_then(|s| s.trim().parse::<u64>().ok());

    Ok(VideoMetadata {
        duration_ms,
        width: video_stream.and_then(|s| s.width).unwrap_or(0),
        height: video_stream.and_then(|s| s.height).unwrap_or(0),
        size,
        codec_name: video_stream.and_then(|s| s.codec_name.clone()),
        format_name: format.and_then(|f| f.format_name.clone()),
    })
}

/// Probes `path` with ffprobe. A non-zero exit is `ProbeFailed`.
pub fn get_video_metadata_impl(path: &Path) -> Result<VideoMetadata, AppError> {
    let ffprobe = get_ffprobe_path()?;

    log::debug!(
        target: "quickmux::ffmpeg::ffprobe",
        "get_video_metadata: path={}",
        path.display()
    );

    let mut cmd = Command::new(&ffprobe);
    cmd.args([
        "-v",
        "quiet",
        "-print_format",
        "json",
        "-show_format",
        "-show_streams",
    ])
    .arg(path)
    .stdin(Stdio::null());
    #[cfg(windows)]
    cmd.creation_flags(0x08000000); // CREATE_NO_WINDOW
    let output = cmd
        .output()
        .map_err(|e| AppError::ProbeFailed(format!("failed to run ffprobe: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(AppError::ProbeFailed(format!(
            "exit {}: {}",
            output.status.code().unwrap_or(-1),
            stderr.trim()
        )));
    }

    let json = String::from_utf8(output.stdout)
        .map_err(|_| AppError::ProbeFailed("ffprobe output was not valid UTF-8".into()))?;

    parse_ffprobe_json(&json)
}
