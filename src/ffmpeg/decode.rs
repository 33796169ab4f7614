//! Single-frame decode through FFmpeg, piped back as a PPM image.

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

#[cfg(windows)]
use std::os::windows::process::CommandExt;

use super::discovery::get_ffmpeg_path;
use crate::error::AppError;
use crate::frame::PixelFrame;
use crate::thumbnail::FrameDecoder;

/// `-ss` before `-i` seeks the demuxer first, then decodes up to the closest frame.
pub fn build_frame_extract_args(input_path: &Path, timestamp_ms: u64) -> Vec<OsString> {
    let seek = format!("{:.3}", timestamp_ms as f64 / 1000.0);
    let mut args: Vec<OsString> = ["-hide_banner", "-v", "error", "-ss", seek.as_str()]
        .into_iter()
        .map(OsString::from)
        .collect();
    args.push("-i".into());
    args.push(input_path.as_os_str().to_os_string());
    args.extend(
        ["-frames:v", "1", "-f", "image2pipe", "-c:v", "ppm", "pipe:1"]
            .into_iter()
            .map(OsString::from),
    );
    args
}

#[derive(Debug, Clone)]
pub struct FfmpegFrameDecoder {
    ffmpeg: PathBuf,
}

impl FfmpegFrameDecoder {
    pub fn new(ffmpeg: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
        }
    }

    pub fn discover() -> Result<Self, AppError> {
        Ok(Self::new(get_ffmpeg_path()?))
    }
}

impl FrameDecoder for FfmpegFrameDecoder {
    fn decode_frame_at(&self, path: &Path, timestamp_ms: u64) -> Result<PixelFrame, AppError> {
        let args = build_frame_extract_args(path, timestamp_ms);
        let mut cmd = Command::new(&self.ffmpeg);
        cmd.args(&args).stdin(Stdio::null());
        #[cfg(windows)]
        cmd.creation_flags(0x08000000); // CREATE_NO_WINDOW
        let output = cmd
            .output()
            .map_err(|e| AppError::decode_failed(timestamp_ms, format!("spawn: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AppError::decode_failed(
                timestamp_ms,
                format!(
                    "exit {}: {}",
                    output.status.code().unwrap_or(-1),
                    stderr.trim()
                ),
            ));
        }
        if output.stdout.is_empty() {
            return Err(AppError::decode_failed(timestamp_ms, "no frame at timestamp"));
        }

        PixelFrame::from_ppm(&output.stdout)
            .map_err(|e| AppError::decode_failed(timestamp_ms, e.to_string()))
    }
}
