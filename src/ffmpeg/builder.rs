use std::ffi::{OsStr, OsString};
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::{DEFAULT_FORMATS, RemuxConfig};
use crate::error::AppError;
use crate::remux::RemuxJob;

use super::path_to_string;

/// Stream-copy every stream into the new container; `-stats` keeps periodic
/// `time=` progress lines coming on stderr.
/// Paths are passed through as `OsStr`, so non-UTF-8 names reach FFmpeg unchanged.
pub fn build_remux_args(input_path: &Path, output_path: &Path) -> Vec<OsString> {
    [
        OsStr::new("-hide_banner"),
        OsStr::new("-i"),
        input_path.as_os_str(),
        OsStr::new("-c"),
        OsStr::new("copy"),
        output_path.as_os_str(),
        OsStr::new("-stats"),
    ]
    .into_iter()
    .map(OsString::from)
    .collect()
}

/// Builds [`RemuxJob`]s against an allow-list of output containers.
#[derive(Debug, Clone)]
pub struct RemuxCommandBuilder {
    formats: Vec<String>,
}

impl Default for RemuxCommandBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_FORMATS.iter().copied())
    }
}

impl RemuxCommandBuilder {
    pub fn new<S: AsRef<str>>(formats: impl IntoIterator<Item = S>) -> Self {
        Self {
            formats: formats
                .into_iter()
                .map(|f| f.as_ref().to_lowercase())
                .collect(),
        }
    }

    pub fn from_config(config: &RemuxConfig) -> Self {
        Self::new(config.effective_formats())
    }

    pub fn formats(&self) -> &[String] {
        &self.formats
    }

    /// Lowercased format if it is on the allow-list. Touches nothing on disk.
    pub fn ensure_supported(&self, output_format: &str) -> Result<String, AppError> {
        let format = output_format.trim().to_lowercase();
        if self.formats.contains(&format) {
            Ok(format)
        } else {
            Err(AppError::UnsupportedFormat(output_format.to_string()))
        }
    }

    /// `destination_dir/<input stem>.<format>`. Does not execute anything; the only side
    /// effect is creating `destination_dir` when it is missing.
    pub fn build(
        &self,
        input_path: &Path,
        output_format: &str,
        destination_dir: &Path,
    ) -> Result<RemuxJob, AppError> {
        let format = self.ensure_supported(output_format)?;
        let stem = input_path
            .file_stem()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AppError::not_found(path_to_string(input_path)))?;

        let mut file_name = stem.to_os_string();
        file_name.push(".");
        file_name.push(&format);
        let output_path: PathBuf = destination_dir.join(file_name);

        if !destination_dir.exists() {
            log::debug!(
                target: "quickmux::ffmpeg::builder",
                "Creating output directory {}",
                destination_dir.display()
            );
            fs::create_dir_all(destination_dir)?;
        }

        let args = build_remux_args(input_path, &output_path);
        log::debug!(
            target: "quickmux::ffmpeg::builder",
            "Building remux command: format={}, input={} -> output={}",
            format,
            input_path.display(),
            output_path.display()
        );
        Ok(RemuxJob::new(
            input_path.to_path_buf(),
            output_path,
            format,
            args,
        ))
    }
}

/// One flag (with its value, when it has one) per line, for command previews.
pub fn format_args_for_display_multiline(args: &[OsString]) -> String {
    let args: Vec<String> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
    let mut lines = Vec::new();
    let mut i = 0;
    while i < args.len() {
        let arg = &args[i];
        let takes_value = arg.starts_with('-')
            && args.get(i + 1).is_some_and(|next| !next.starts_with('-'));
        if takes_value {
            lines.push(format!("  {} {}", arg, args[i + 1]));
            i += 2;
        } else {
            lines.push(format!("  {}", arg));
            i += 1;
        }
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_derives_output_from_input_stem() {
        let dir = tempfile::tempdir().expect("tempdir");
        let job = RemuxCommandBuilder::default()
            .build(Path::new("/videos/movie.mkv"), "mp4", dir.path())
            .unwrap();
        assert_eq!(job.output_path(), dir.path().join("movie.mp4"));
        assert_eq!(job.output_format(), "mp4");
        assert_eq!(job.input_path(), Path::new("/videos/movie.mkv"));
    }

    #[test]
    fn command_is_stream_copy_with_stats() {
        let dir = tempfile::tempdir().expect("tempdir");
        let job = RemuxCommandBuilder::default()
            .build(Path::new("/videos/movie.mkv"), "mp4", dir.path())
            .unwrap();
        let expected: Vec<OsString> = [
            OsStr::new("-hide_banner"),
            OsStr::new("-i"),
            OsStr::new("/videos/movie.mkv"),
            OsStr::new("-c"),
            OsStr::new("copy"),
            job.output_path().as_os_str(),
            OsStr::new("-stats"),
        ]
        .into_iter()
        .map(OsString::from)
        .collect();
        assert_eq!(job.command_args(), expected.as_slice());
    }

    #[test]
    fn format_is_lowercased_in_extension() {
        let dir = tempfile::tempdir().expect("tempdir");
        let job = RemuxCommandBuilder::default()
            .build(Path::new("clip.mov"), "MKV", dir.path())
            .unwrap();
        assert_eq!(job.output_path(), dir.path().join("clip.mkv"));
        assert_eq!(job.output_format(), "mkv");
    }

    #[test]
    fn unsupported_format_rejected_before_touching_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let dest = dir.path().join("never-created");
        let err = RemuxCommandBuilder::default()
            .build(Path::new("movie.mkv"), "exe", &dest)
            .unwrap_err();
        assert!(matches!(err, AppError::UnsupportedFormat(f) if f == "exe"));
        assert!(!dest.exists());
    }

    #[test]
    fn missing_destination_is_created() {
        let dir = tempfile::tempdir().expect("tempdir");
        let dest = dir.path().join("Movies").join("Quickmux");
        RemuxCommandBuilder::default()
            .build(Path::new("movie.mkv"), "webm", &dest)
            .unwrap();
        assert!(dest.is_dir());
    }

    #[test]
    fn allow_list_is_configurable() {
        let builder = RemuxCommandBuilder::new(["mkv"]);
        assert!(builder.ensure_supported("mkv").is_ok());
        assert!(builder.ensure_supported("mp4").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn non_utf8_paths_reach_the_command_unchanged() {
        use std::os::unix::ffi::OsStrExt;

        let dir = tempfile::tempdir().expect("tempdir");
        let input = Path::new(OsStr::from_bytes(b"/videos/caf\xe9.mkv"));
        let job = RemuxCommandBuilder::default()
            .build(input, "mp4", dir.path())
            .unwrap();
        let args = job.command_args();
        assert_eq!(args[2].as_os_str(), input.as_os_str());
        assert_eq!(
            args[5].as_os_str(),
            dir.path().join(OsStr::from_bytes(b"caf\xe9.mp4")).as_os_str()
        );
    }

    #[test]
    fn display_groups_flags_with_values() {
        let args = build_remux_args(Path::new("/in.mkv"), Path::new("/out.mp4"));
        assert_eq!(
            format_args_for_display_multiline(&args),
            "  -hide_banner\n  -i /in.mkv\n  -c copy\n  /out.mp4\n  -stats"
        );
    }
}
