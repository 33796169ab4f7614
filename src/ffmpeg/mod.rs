mod builder;
mod decode;
pub mod discovery;
mod error;
pub mod ffprobe;
mod progress;
mod runner;

pub use builder::{RemuxCommandBuilder, build_remux_args, format_args_for_display_multiline};
pub use decode::{FfmpegFrameDecoder, build_frame_extract_args};
pub use error::{
    FfmpegErrorPayload, INTERRUPTED_EXIT_CODE, is_interrupted_exit_code, parse_ffmpeg_error,
};
pub use progress::{ProgressParser, parse_time, progress_fraction};
pub use runner::{for_each_line, spawn_ffmpeg};

/// Path to string for FFmpeg args or logging.
pub fn path_to_string(path: &(impl AsRef<std::path::Path> + ?Sized)) -> String {
    path.as_ref().to_string_lossy().to_string()
}
