//! App error type for inspection and remux commands. Implements Display and Serialize for the sidecar.

use crate::ffmpeg::parse_ffmpeg_error;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    FfmpegNotFound(String),

    #[error("FFmpeg failed (code {code}): {stderr}")]
    FfmpegFailed { code: i32, stderr: String },

    /// The media handle does not resolve to a readable local file.
    #[error("Input not found: {0}")]
    NotFound(String),

    #[error("Unsupported output format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    #[error("Image encoding failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("Video duration unavailable")]
    DurationUnavailable,

    #[error("Frame decode failed at {timestamp_ms}ms: {reason}")]
    DecodeFailed { timestamp_ms: u64, reason: String },

    #[error("ffprobe failed: {0}")]
    ProbeFailed(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl AppError {
    pub fn not_found(handle: impl Into<String>) -> Self {
        Self::NotFound(handle.into())
    }

    pub fn decode_failed(timestamp_ms: u64, reason: impl Into<String>) -> Self {
        Self::DecodeFailed {
            timestamp_ms,
            reason: reason.into(),
        }
    }
}

impl serde::Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            AppError::FfmpegFailed { code, stderr } => {
                let payload = parse_ffmpeg_error(stderr, Some(*code));
                let json =
                    serde_json::json!({ "summary": payload.summary, "detail": payload.detail });
                serializer.serialize_str(&json.to_string())
            }
            _ => serializer.serialize_str(&self.to_string()),
        }
    }
}

impl From<String> for AppError {
    fn from(s: String) -> Self {
        AppError::FfmpegFailed {
            code: -1,
            stderr: s,
        }
    }
}

impl From<&str> for AppError {
    fn from(s: &str) -> Self {
        s.to_string().into()
    }
}
