use regex::Regex;
use std::sync::LazyLock;

use crate::remux::RemuxProgress;

static TIME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"time=(\S*)").expect("invalid time regex"));

/// `-stats` lines start with this; they repeat several times a second and stay out of the log.
const FRAME_MARKER: &str = "frame=";

/// Best-effort `HH:MM:SS[.ff]` to seconds. Anything unparseable yields 0.
pub fn parse_time(time: &str) -> f64 {
    let parts: Vec<&str> = time.trim().split(':').collect();
    if parts.len() != 3 {
        return 0.0;
    }
    let mut seconds = 0.0_f64;
    for (part, scale) in parts.iter().zip([3600.0, 60.0, 1.0]) {
        match part.parse::<f64>() {
            Ok(v) if v.is_finite() => seconds += v * scale,
            _ => return 0.0,
        }
    }
    seconds.max(0.0)
}

/// `elapsed / total` clamped to [0, 1]. An unknown (zero) total uses a one-second divisor.
pub fn progress_fraction(elapsed_secs: f64, total_duration_ms: u64) -> f32 {
    let total_secs = if total_duration_ms == 0 {
        1.0
    } else {
        total_duration_ms as f64 / 1000.0
    };
    ((elapsed_secs / total_secs) as f32).clamp(0.0, 1.0)
}

/// Per-job log consumer: turns `time=` fields into progress and keeps every
/// non-stats line as diagnostic text. `finish` consumes the parser, so a finished
/// job cannot be fed again.
#[derive(Debug)]
pub struct ProgressParser {
    total_duration_ms: u64,
    log: String,
}

impl ProgressParser {
    pub fn new(total_duration_ms: u64) -> Self {
        Self {
            total_duration_ms,
            log: String::new(),
        }
    }

    /// Progress for lines carrying a `time=` field, `None` otherwise.
    pub fn feed_line(&mut self, line: &str) -> Option<RemuxProgress> {
        let line = line.trim();
        if !line.is_empty() && !line.starts_with(FRAME_MARKER) {
            self.log.push_str(line);
            self.log.push('\n');
        }

        let caps = TIME_RE.captures(line)?;
        let elapsed = parse_time(&caps[1]);
        Some(RemuxProgress {
            fraction: progress_fraction(elapsed, self.total_duration_ms),
        })
    }

    pub fn finish(self) -> String {
        self.log
    }
}
