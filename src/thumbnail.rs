//! Thumbnail selection: sample a fixed schedule of offsets and keep the first frame
//! that is not near-black.
//!
//! The search is greedy and order-sensitive: earlier offsets win even if a later frame
//! would look better, and at most five frames are decoded.

use std::path::Path;

use serde::Serialize;

use crate::error::AppError;
use crate::frame::{DEFAULT_BLACK_THRESHOLD, PixelFrame, is_black};

/// Relative positions into the duration, in the order they are tried.
pub const SAMPLE_OFFSETS: [f64; 5] = [0.1, 0.3, 0.5, 0.7, 0.9];

/// Decodes the frame closest to a timestamp. Implementations may snap to a nearby frame.
pub trait FrameDecoder {
    fn decode_frame_at(&self, path: &Path, timestamp_ms: u64) -> Result<PixelFrame, AppError>;
}

impl<D: FrameDecoder + ?Sized> FrameDecoder for &D {
    fn decode_frame_at(&self, path: &Path, timestamp_ms: u64) -> Result<PixelFrame, AppError> {
        (**self).decode_frame_at(path, timestamp_ms)
    }
}

pub fn sample_timestamp_ms(duration_ms: u64, offset: f64) -> u64 {
    (duration_ms as f64 * offset).round() as u64
}

/// Lazy `(timestamp_ms, decode result)` candidates over [`SAMPLE_OFFSETS`].
/// Nothing is decoded until the iterator is advanced.
pub struct FrameSampler<'a, D: ?Sized> {
    decoder: &'a D,
    path: &'a Path,
    duration_ms: u64,
    next: usize,
}

impl<'a, D: FrameDecoder + ?Sized> FrameSampler<'a, D> {
    pub fn new(decoder: &'a D, path: &'a Path, duration_ms: u64) -> Self {
        Self {
            decoder,
            path,
            duration_ms,
            next: 0,
        }
    }
}

impl<D: FrameDecoder + ?Sized> Iterator for FrameSampler<'_, D> {
    type Item = (u64, Result<PixelFrame, AppError>);

    fn next(&mut self) -> Option<Self::Item> {
        let offset = *SAMPLE_OFFSETS.get(self.next)?;
        self.next += 1;
        let timestamp_ms = sample_timestamp_ms(self.duration_ms, offset);
        Some((
            timestamp_ms,
            self.decoder.decode_frame_at(self.path, timestamp_ms),
        ))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = SAMPLE_OFFSETS.len() - self.next;
        (remaining, Some(remaining))
    }
}

/// `resolution` equals the frame's dimensions when a frame is present, `(0, 0)` otherwise.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThumbnailResult {
    #[serde(skip)]
    pub frame: Option<PixelFrame>,
    pub duration_ms: u64,
    pub resolution: (u32, u32),
}

impl ThumbnailResult {
    pub fn none(duration_ms: u64) -> Self {
        Self {
            frame: None,
            duration_ms,
            resolution: (0, 0),
        }
    }

    pub fn with_frame(frame: PixelFrame, duration_ms: u64) -> Self {
        Self {
            resolution: frame.dimensions(),
            frame: Some(frame),
            duration_ms,
        }
    }
}

pub struct ThumbnailSelector<D> {
    decoder: D,
    threshold: u8,
}

impl<D: FrameDecoder> ThumbnailSelector<D> {
    pub fn new(decoder: D) -> Self {
        Self {
            decoder,
            threshold: DEFAULT_BLACK_THRESHOLD,
        }
    }

    pub fn with_threshold(mut self, threshold: u8) -> Self {
        self.threshold = threshold;
        self
    }

    /// Picks the first non-black sampled frame. An unknown or zero duration fails with
    /// `DurationUnavailable`; per-frame decode failures only skip that offset.
    pub fn select(
        &self,
        path: &Path,
        duration_ms: Option<u64>,
    ) -> Result<ThumbnailResult, AppError> {
        let duration_ms = duration_ms
            .filter(|&d| d > 0)
            .ok_or(AppError::DurationUnavailable)?;

        for (timestamp_ms, decoded) in FrameSampler::new(&self.decoder, path, duration_ms) {
            let frame = match decoded {
                Ok(frame) => frame,
                Err(e) => {
                    log::warn!(
                        target: "quickmux::thumbnail",
                        "Skipping candidate at {}ms: {}",
                        timestamp_ms,
                        e
                    );
                    continue;
                }
            };
            match is_black(&frame, self.threshold) {
                Ok(false) => {
                    log::debug!(
                        target: "quickmux::thumbnail",
                        "Selected thumbnail at {}ms ({}x{})",
                        timestamp_ms,
                        frame.width(),
                        frame.height()
                    );
                    return Ok(ThumbnailResult::with_frame(frame, duration_ms));
                }
                Ok(true) => {
                    log::trace!(target: "quickmux::thumbnail", "Black frame at {}ms", timestamp_ms);
                }
                Err(e) => {
                    log::warn!(
                        target: "quickmux::thumbnail",
                        "Skipping candidate at {}ms: {}",
                        timestamp_ms,
                        e
                    );
                }
            }
        }

        log::debug!(
            target: "quickmux::thumbnail",
            "No non-black frame found in {}",
            path.display()
        );
        Ok(ThumbnailResult::none(duration_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap;

    enum Candidate {
        Black,
        Bright,
        Broken,
        Empty,
    }

    /// Serves a scripted candidate per timestamp and records every decode request.
    struct ScriptedDecoder {
        frames: HashMap<u64, Candidate>,
        calls: RefCell<Vec<u64>>,
    }

    impl ScriptedDecoder {
        fn new(frames: impl IntoIterator<Item = (u64, Candidate)>) -> Self {
            Self {
                frames: frames.into_iter().collect(),
                calls: RefCell::new(Vec::new()),
            }
        }
    }

    impl FrameDecoder for ScriptedDecoder {
        fn decode_frame_at(&self, _path: &Path, timestamp_ms: u64) -> Result<PixelFrame, AppError> {
            self.calls.borrow_mut().push(timestamp_ms);
            match self.frames.get(&timestamp_ms) {
                Some(Candidate::Bright) => Ok(PixelFrame::filled(4, 2, [120, 130, 140])),
                Some(Candidate::Black) => Ok(PixelFrame::filled(4, 2, [0, 0, 0])),
                Some(Candidate::Empty) => Ok(PixelFrame::filled(0, 0, [0, 0, 0])),
                Some(Candidate::Broken) | None => Err(AppError::decode_failed(timestamp_ms, "no frame")),
            }
        }
    }

    #[test]
    fn stops_at_first_non_black_candidate() {
        let decoder = ScriptedDecoder::new([
            (1000, Candidate::Black),
            (3000, Candidate::Black),
            (5000, Candidate::Bright),
            (7000, Candidate::Bright),
        ]);
        let selector = ThumbnailSelector::new(&decoder);
        let result = selector.select(Path::new("/v.mp4"), Some(10_000)).unwrap();

        assert_eq!(*decoder.calls.borrow(), vec![1000, 3000, 5000]);
        assert_eq!(result.resolution, (4, 2));
        assert_eq!(result.duration_ms, 10_000);
        assert!(result.frame.is_some());
    }

    #[test]
    fn decode_failures_are_skipped() {
        let decoder = ScriptedDecoder::new([
            (1000, Candidate::Broken),
            (3000, Candidate::Empty),
            (5000, Candidate::Bright),
        ]);
        let result = ThumbnailSelector::new(&decoder)
            .select(Path::new("/v.mp4"), Some(10_000))
            .unwrap();
        assert_eq!(result.resolution, (4, 2));
        assert_eq!(decoder.calls.borrow().len(), 3);
    }

    #[test]
    fn all_black_yields_no_thumbnail_after_five_attempts() {
        let decoder = ScriptedDecoder::new(
            [1000, 3000, 5000, 7000, 9000].map(|t| (t, Candidate::Black)),
        );
        let result = ThumbnailSelector::new(&decoder)
            .select(Path::new("/v.mp4"), Some(10_000))
            .unwrap();
        assert_eq!(result, ThumbnailResult::none(10_000));
        assert_eq!(*decoder.calls.borrow(), vec![1000, 3000, 5000, 7000, 9000]);
    }

    #[test]
    fn missing_or_zero_duration_is_unavailable() {
        let decoder = ScriptedDecoder::new([]);
        let selector = ThumbnailSelector::new(&decoder);
        assert!(matches!(
            selector.select(Path::new("/v.mp4"), None),
            Err(AppError::DurationUnavailable)
        ));
        assert!(matches!(
            selector.select(Path::new("/v.mp4"), Some(0)),
            Err(AppError::DurationUnavailable)
        ));
        assert!(decoder.calls.borrow().is_empty());
    }

    #[test]
    fn sampler_is_lazy() {
        let decoder = ScriptedDecoder::new([]);
        let mut sampler = FrameSampler::new(&decoder, Path::new("/v.mp4"), 2_000);
        assert_eq!(sampler.size_hint(), (5, Some(5)));
        assert!(decoder.calls.borrow().is_empty());
        let (ts, _) = sampler.next().unwrap();
        assert_eq!(ts, 200);
        assert_eq!(*decoder.calls.borrow(), vec![200]);
        assert_eq!(sampler.count(), 4);
    }

    #[test]
    fn threshold_is_configurable() {
        let decoder = ScriptedDecoder::new([(1000, Candidate::Bright)]);
        // Every pixel averages 130, so a threshold above that makes it black.
        let result = ThumbnailSelector::new(&decoder)
            .with_threshold(200)
            .select(Path::new("/v.mp4"), Some(10_000))
            .unwrap();
        assert!(result.frame.is_none());
    }
}
