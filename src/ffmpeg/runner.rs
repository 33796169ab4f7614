//! FFmpeg process spawning and log-line splitting.
//!
//! FFmpeg writes its log and `-stats` output to stderr. Stats updates end in `\r`
//! rather than `\n`, so both characters terminate a line here; otherwise progress
//! would only surface when the process exits.

use std::ffi::OsString;
use std::io::{BufRead, BufReader, ErrorKind, Read};
use std::path::Path;
use std::process::{Child, ChildStderr, Command, Stdio};

#[cfg(windows)]
use std::os::windows::process::CommandExt;

use crate::error::AppError;

/// Spawn `program` with `args`, stdin and stdout closed, stderr piped.
pub fn spawn_ffmpeg(program: &Path, args: &[OsString]) -> Result<(Child, ChildStderr), AppError> {
    let input_arg = args
        .iter()
        .position(|a| a == "-i")
        .and_then(|i| args.get(i + 1));
    log::debug!(
        target: "quickmux::ffmpeg::runner",
        "Spawning FFmpeg: path={}, input={:?}, args={}",
        program.display(),
        input_arg,
        args.len()
    );

    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped());
    #[cfg(windows)]
    cmd.creation_flags(0x08000000); // CREATE_NO_WINDOW
    let mut child = cmd
        .spawn()
        .map_err(|e| AppError::from(format!("Failed to spawn FFmpeg: {}", e)))?;

    match child.stderr.take() {
        Some(stderr) => Ok((child, stderr)),
        None => {
            let _ = child.kill();
            let _ = child.wait();
            Err(AppError::from("Failed to capture stderr"))
        }
    }
}

/// Calls `on_line` for every non-empty `\n`- or `\r`-terminated line until EOF.
/// Invalid UTF-8 is replaced rather than dropped.
pub fn for_each_line<R: Read>(reader: R, mut on_line: impl FnMut(&str)) {
    let mut reader = BufReader::new(reader);
    let mut line_buf: Vec<u8> = Vec::with_capacity(256);
    let mut emit = |buf: &mut Vec<u8>| {
        if buf.is_empty() {
            return;
        }
        {
            let line = String::from_utf8_lossy(buf);
            if !line.trim().is_empty() {
                on_line(&line);
            }
        }
        buf.clear();
    };

    loop {
        let available = match reader.fill_buf() {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                log::warn!(
                    target: "quickmux::ffmpeg::runner",
                    "Stopped reading FFmpeg output: {}",
                    e
                );
                break;
            }
        };
        if available.is_empty() {
            break;
        }
        let (consumed, line_done) = match available.iter().position(|&b| b == b'\n' || b == b'\r') {
            Some(idx) => {
                line_buf.extend_from_slice(&available[..idx]);
                (idx + 1, true)
            }
            None => {
                line_buf.extend_from_slice(available);
                (available.len(), false)
            }
        };
        reader.consume(consumed);
        if line_done {
            emit(&mut line_buf);
        }
    }
    emit(&mut line_buf);
}
