use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::RemuxConfig;
use crate::error::AppError;
use crate::ffmpeg::{
    FfmpegFrameDecoder, RemuxCommandBuilder, build_remux_args, format_args_for_display_multiline,
};
use crate::media::{self, LocalPathResolver, MediaDisplayInfo, MediaHandle, MediaIndexer};
use crate::remux::{RemuxHandle, RemuxOrchestrator};
use crate::thumbnail::ThumbnailSelector;

pub const PROTOCOL_VERSION: u8 = 1;

#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppCapabilitiesResult {
    pub protocol_version: u8,
    pub formats: Vec<String>,
    pub output_dir: PathBuf,
}

pub fn app_capabilities(config: &RemuxConfig) -> AppCapabilitiesResult {
    AppCapabilitiesResult {
        protocol_version: PROTOCOL_VERSION,
        formats: config.effective_formats(),
        output_dir: config.effective_output_dir(),
    }
}

#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectMediaResult {
    #[serde(flatten)]
    pub info: MediaDisplayInfo,
    /// Set when a thumbnail was found and written.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_path: Option<PathBuf>,
}

/// Display info for `input_path`; the thumbnail is written as a PNG to `thumbnail_path`
/// when one is requested and a non-black frame exists.
pub fn inspect_media(
    input_path: String,
    thumbnail_path: Option<PathBuf>,
) -> Result<InspectMediaResult, AppError> {
    let selector = ThumbnailSelector::new(FfmpegFrameDecoder::discover()?);
    let (info, thumbnail) = media::inspect(
        &LocalPathResolver,
        &selector,
        &MediaHandle::from(input_path),
    )?;

    let written = match (thumbnail_path, thumbnail.frame.as_ref()) {
        (Some(dest), Some(frame)) => {
            frame.save_png(&dest)?;
            log::debug!(
                target: "quickmux::sidecar",
                "Wrote thumbnail {} ({}x{})",
                dest.display(),
                frame.width(),
                frame.height()
            );
            Some(dest)
        }
        _ => None,
    };
    Ok(InspectMediaResult {
        info,
        thumbnail_path: written,
    })
}

/// The command a remux would run, one flag per line. Never touches the disk.
pub fn preview_remux_command(
    config: &RemuxConfig,
    input_path: Option<String>,
    output_format: &str,
) -> String {
    let builder = RemuxCommandBuilder::from_config(config);
    let args = match builder.ensure_supported(output_format) {
        Ok(format) => {
            let input = input_path.as_deref().unwrap_or("<input>");
            let stem = Path::new(input)
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "<output>".to_string());
            let output = config
                .effective_output_dir()
                .join(format!("{}.{}", stem, format));
            build_remux_args(Path::new(input), &output)
        }
        Err(e) => vec!["# error".into(), e.to_string().into()],
    };
    format!("ffmpeg\n{}", format_args_for_display_multiline(&args))
}

/// Validates, builds and dispatches a remux. Returns as soon as FFmpeg is started.
pub fn start_remux(
    config: &RemuxConfig,
    indexer: Arc<dyn MediaIndexer>,
    input_path: String,
    output_format: &str,
) -> Result<RemuxHandle, AppError> {
    let (job, probed) = media::prepare_remux(
        &LocalPathResolver,
        config,
        &MediaHandle::from(input_path),
        output_format,
    )?;
    let orchestrator = RemuxOrchestrator::discover(indexer)?;
    log::info!(
        target: "quickmux::sidecar",
        "Starting remux {} -> {}",
        job.input_path().display(),
        job.output_path().display()
    );
    Ok(orchestrator.run(job, probed.duration_ms))
}
