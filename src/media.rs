//! Media handles and the inspect / prepare-remux facade over probe, thumbnail and builder.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::config::RemuxConfig;
use crate::error::AppError;
use crate::ffmpeg::ffprobe::{VideoMetadata, get_video_metadata_impl};
use crate::ffmpeg::{RemuxCommandBuilder, path_to_string};
use crate::remux::RemuxJob;
use crate::thumbnail::{FrameDecoder, ThumbnailResult, ThumbnailSelector};

/// Opaque reference to a source video: a local path or a `file://` URI.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MediaHandle(String);

impl MediaHandle {
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for MediaHandle {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for MediaHandle {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&Path> for MediaHandle {
    fn from(path: &Path) -> Self {
        Self(path_to_string(path))
    }
}

pub trait PathResolver {
    fn resolve_path(&self, handle: &MediaHandle) -> Result<PathBuf, AppError>;
}

impl<R: PathResolver + ?Sized> PathResolver for &R {
    fn resolve_path(&self, handle: &MediaHandle) -> Result<PathBuf, AppError> {
        (**self).resolve_path(handle)
    }
}

/// Resolves plain paths and `file://` URIs to existing regular files.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalPathResolver;

impl PathResolver for LocalPathResolver {
    fn resolve_path(&self, handle: &MediaHandle) -> Result<PathBuf, AppError> {
        let raw = handle.as_str().trim();
        if raw.is_empty() {
            return Err(AppError::not_found(raw));
        }
        let path = if raw.starts_with("file:") {
            url::Url::parse(raw)
                .ok()
                .and_then(|u| u.to_file_path().ok())
                .ok_or_else(|| AppError::not_found(raw))?
        } else {
            PathBuf::from(raw)
        };
        if !path.is_file() {
            return Err(AppError::not_found(raw));
        }
        Ok(path)
    }
}

/// Told about every file a successful remux produced.
pub trait MediaIndexer: Send + Sync {
    fn notify_indexed(&self, path: &Path, mime_hint: &str);
}

/// Indexer for hosts without a media library; only records the event in the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogIndexer;

impl MediaIndexer for LogIndexer {
    fn notify_indexed(&self, path: &Path, mime_hint: &str) {
        log::info!(
            target: "quickmux::media",
            "New media available: {} ({})",
            path.display(),
            mime_hint
        );
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaProbe {
    /// 0 when the container does not report a duration.
    pub duration_ms: u64,
    pub file_size_bytes: u64,
    pub width: u32,
    pub height: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub codec_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format_name: Option<String>,
}

pub fn probe(path: &Path) -> Result<MediaProbe, AppError> {
    merge_probe(path, get_video_metadata_impl(path))
}

/// An ffprobe failure degrades to an unknown duration; only a missing file is an error.
pub fn merge_probe(
    path: &Path,
    metadata: Result<VideoMetadata, AppError>,
) -> Result<MediaProbe, AppError> {
    let fs_size = match fs::metadata(path) {
        Ok(m) => m.len(),
        Err(_) => return Err(AppError::not_found(path_to_string(path))),
    };
    let metadata = match metadata {
        Ok(metadata) => metadata,
        Err(e) => {
            log::warn!(
                target: "quickmux::media",
                "Probe failed for {}, duration unknown: {}",
                path.display(),
                e
            );
            VideoMetadata::default()
        }
    };
    Ok(MediaProbe {
        duration_ms: metadata.duration_ms.unwrap_or(0),
        file_size_bytes: metadata.size.unwrap_or(fs_size),
        width: metadata.width,
        height: metadata.height,
        codec_name: metadata.codec_name,
        format_name: metadata.format_name,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaDisplayInfo {
    pub path: PathBuf,
    pub file_name: String,
    pub duration_ms: u64,
    pub width: u32,
    pub height: u32,
    pub size: u64,
    pub size_mb: f64,
    pub has_thumbnail: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub codec_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format_name: Option<String>,
}

/// Resolution prefers the selected frame and falls back to the probed stream.
pub fn display_info(path: &Path, probe: &MediaProbe, thumbnail: &ThumbnailResult) -> MediaDisplayInfo {
    let (width, height) = if thumbnail.frame.is_some() {
        thumbnail.resolution
    } else {
        (probe.width, probe.height)
    };
    MediaDisplayInfo {
        path: path.to_path_buf(),
        file_name: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        duration_ms: probe.duration_ms,
        width,
        height,
        size: probe.file_size_bytes,
        size_mb: probe.file_size_bytes as f64 / (1024.0 * 1024.0),
        has_thumbnail: thumbnail.frame.is_some(),
        codec_name: probe.codec_name.clone(),
        format_name: probe.format_name.clone(),
    }
}

/// Thumbnail selection from an already-probed duration. Unknown duration means no thumbnail.
pub fn thumbnail_for<D: FrameDecoder>(
    selector: &ThumbnailSelector<D>,
    path: &Path,
    duration_ms: u64,
) -> Result<ThumbnailResult, AppError> {
    match selector.select(path, Some(duration_ms)) {
        Err(AppError::DurationUnavailable) => Ok(ThumbnailResult::none(duration_ms)),
        other => other,
    }
}

pub fn inspect<R: PathResolver, D: FrameDecoder>(
    resolver: &R,
    selector: &ThumbnailSelector<D>,
    handle: &MediaHandle,
) -> Result<(MediaDisplayInfo, ThumbnailResult), AppError> {
    let path = resolver.resolve_path(handle)?;
    let probed = probe(&path)?;
    let thumbnail = thumbnail_for(selector, &path, probed.duration_ms)?;
    Ok((display_info(&path, &probed, &thumbnail), thumbnail))
}

/// A built job plus its probed duration for progress. The format is validated before the
/// handle is resolved.
pub fn prepare_remux<R: PathResolver>(
    resolver: &R,
    config: &RemuxConfig,
    handle: &MediaHandle,
    output_format: &str,
) -> Result<(RemuxJob, MediaProbe), AppError> {
    let builder = RemuxCommandBuilder::from_config(config);
    builder.ensure_supported(output_format)?;
    let path = resolver.resolve_path(handle)?;
    let job = builder.build(&path, output_format, &config.effective_output_dir())?;
    let probed = probe(&path)?;
    Ok((job, probed))
}
