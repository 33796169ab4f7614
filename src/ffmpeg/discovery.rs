//! Locates the `ffmpeg` and `ffprobe` binaries.
//!
//! Order: `FFMPEG_PATH` env, a binary next to the current executable, `PATH`,
//! then common install locations. The ffmpeg result is cached for the process lifetime.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::error::AppError;

static FFMPEG_PATH_CACHE: OnceLock<PathBuf> = OnceLock::new();

#[cfg(target_os = "windows")]
fn executable_name(base: &str) -> String {
    format!("{base}.exe")
}

#[cfg(not(target_os = "windows"))]
fn executable_name(base: &str) -> String {
    base.to_string()
}

fn common_dirs() -> Vec<PathBuf> {
    #[cfg(target_os = "macos")]
    {
        vec![
            PathBuf::from("/opt/homebrew/bin"),
            PathBuf::from("/usr/local/bin"),
            PathBuf::from("/opt/local/bin"),
        ]
    }

    #[cfg(target_os = "windows")]
    {
        vec![
            PathBuf::from("C:\\ffmpeg\\bin"),
            PathBuf::from("C:\\Program Files\\ffmpeg\\bin"),
        ]
    }

    #[cfg(all(unix, not(target_os = "macos")))]
    {
        vec![PathBuf::from("/usr/bin"), PathBuf::from("/usr/local/bin")]
    }

    #[cfg(not(any(target_os = "macos", target_os = "windows", unix)))]
    {
        vec![]
    }
}

/// First `PATH` entry containing `base` as a file.
pub fn find_in_path(base: &str) -> Option<PathBuf> {
    let name = executable_name(base);
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(&name))
        .find(|candidate| candidate.is_file())
}

/// Binary bundled next to the running executable.
fn find_bundled(base: &str) -> Option<PathBuf> {
    let exe = std::env::current_exe().ok()?;
    let path = exe.parent()?.join(executable_name(base));
    path.is_file().then_some(path)
}

fn search(base: &str) -> Option<PathBuf> {
    if let Some(p) = find_bundled(base) {
        log::debug!(
            target: "quickmux::ffmpeg::discovery",
            "{} found next to executable: {}",
            base,
            p.display()
        );
        return Some(p);
    }
    if let Some(p) = find_in_path(base) {
        log::debug!(
            target: "quickmux::ffmpeg::discovery",
            "{} found in PATH: {}",
            base,
            p.display()
        );
        return Some(p);
    }
    common_dirs()
        .into_iter()
        .map(|dir| dir.join(executable_name(base)))
        .find(|p| p.is_file())
}

fn resolve_ffmpeg_path() -> Result<PathBuf, AppError> {
    if let Some(env_path) = std::env::var_os("FFMPEG_PATH") {
        let p = PathBuf::from(env_path);
        if p.is_file() {
            log::debug!(
                target: "quickmux::ffmpeg::discovery",
                "FFmpeg path from FFMPEG_PATH env: {}",
                p.display()
            );
            return Ok(p);
        }
        log::warn!(
            target: "quickmux::ffmpeg::discovery",
            "FFMPEG_PATH does not point to a file: {}",
            p.display()
        );
    }

    search("ffmpeg").ok_or_else(|| {
        log::error!(
            target: "quickmux::ffmpeg::discovery",
            "FFmpeg not found in PATH or common locations"
        );
        AppError::FfmpegNotFound(
            "FFmpeg not found. Please install FFmpeg on your system:\n  - macOS: brew install ffmpeg\n  - Linux: sudo apt install ffmpeg\n  - Windows: Download from https://ffmpeg.org/download.html"
                .to_string(),
        )
    })
}

/// Get FFmpeg path. Cached for process lifetime.
pub fn get_ffmpeg_path() -> Result<&'static Path, AppError> {
    if let Some(path) = FFMPEG_PATH_CACHE.get() {
        return Ok(path.as_path());
    }
    let path = resolve_ffmpeg_path()?;
    Ok(FFMPEG_PATH_CACHE.get_or_init(|| path).as_path())
}

/// Paths to try for ffprobe given an ffmpeg binary path (suffixed first, then plain).
pub fn ffprobe_candidates(ffmpeg_path: &Path) -> Vec<PathBuf> {
    let Some(parent) = ffmpeg_path.parent() else {
        return vec![];
    };
    let mut candidates = Vec::with_capacity(2);
    let suffix = ffmpeg_path
        .file_stem()
        .and_then(|s| s.to_str())
        .and_then(|stem| stem.strip_prefix("ffmpeg"))
        .filter(|suffix| !suffix.is_empty());
    if let Some(suffix) = suffix {
        candidates.push(parent.join(executable_name(&format!("ffprobe{suffix}"))));
    }
    candidates.push(parent.join(executable_name("ffprobe")));
    candidates
}

/// ffprobe from the ffmpeg directory when present (they ship together), else a regular search.
pub fn get_ffprobe_path() -> Result<PathBuf, AppError> {
    let ffmpeg = get_ffmpeg_path()?;
    if let Some(found) = ffprobe_candidates(ffmpeg).into_iter().find(|c| c.is_file()) {
        return Ok(found);
    }
    search("ffprobe").ok_or_else(|| {
        AppError::from(format!(
            "ffprobe not found next to {} or in PATH",
            ffmpeg.display()
        ))
    })
}
