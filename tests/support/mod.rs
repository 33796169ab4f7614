#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};

use parking_lot::Mutex;
use quickmux_core::MediaIndexer;
use quickmux_core::ffmpeg::ffprobe::get_video_metadata_impl;

/// Collects every indexing notification for later assertions.
#[derive(Default)]
pub struct RecordingIndexer {
    calls: Mutex<Vec<(PathBuf, String)>>,
}

impl RecordingIndexer {
    pub fn calls(&self) -> Vec<(PathBuf, String)> {
        self.calls.lock().clone()
    }
}

impl MediaIndexer for RecordingIndexer {
    fn notify_indexed(&self, path: &Path, mime_hint: &str) {
        self.calls
            .lock()
            .push((path.to_path_buf(), mime_hint.to_string()));
    }
}

/// A stand-in transcoder: `/bin/sh` script that runs `body` with the real arguments in `$@`.
#[cfg(unix)]
pub fn write_fake_ffmpeg(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{}\n", body)).expect("write fake ffmpeg");
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod fake ffmpeg");
    path
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum VideoKind {
    /// Moving colour test pattern.
    Pattern,
    /// Solid black for the whole duration.
    Black,
}

pub struct IntegrationEnv {
    pub ffmpeg: PathBuf,
    dir: tempfile::TempDir,
}

impl IntegrationEnv {
    pub fn new() -> Self {
        let ffmpeg = quickmux_core::ffmpeg::discovery::get_ffmpeg_path()
            .expect("FFmpeg not found")
            .to_path_buf();
        let dir = tempfile::tempdir().expect("tempdir");
        Self { ffmpeg, dir }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn with_test_video(&self, input_name: &str, duration_secs: f32, kind: VideoKind) -> PathBuf {
        let output_path = self.path(input_name);
        let status = create_test_video(&self.ffmpeg, &output_path, duration_secs, kind)
            .expect("failed to create test video");
        assert!(status.success(), "ffmpeg failed to create test video");
        output_path
    }
}

pub fn create_test_video(
    ffmpeg: &Path,
    output_path: &Path,
    duration_secs: f32,
    kind: VideoKind,
) -> std::io::Result<ExitStatus> {
    let source = match kind {
        VideoKind::Pattern => format!("testsrc=duration={}:size=320x240:rate=25", duration_secs),
        VideoKind::Black => format!("color=c=black:size=320x240:rate=25:duration={}", duration_secs),
    };
    Command::new(ffmpeg)
        .args([
            "-loglevel",
            "error",
            "-y",
            "-f",
            "lavfi",
            "-i",
            &source,
            "-c:v",
            "mpeg4",
            "-pix_fmt",
            "yuv420p",
            output_path.to_string_lossy().as_ref(),
        ])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
}

pub fn duration_ms(path: &Path) -> u64 {
    get_video_metadata_impl(path)
        .expect("probe test video")
        .duration_ms
        .expect("test video has a duration")
}
