#![cfg(feature = "integration-test-api")]

mod support;

use std::fs;
use std::sync::Arc;

use quickmux_core::ffmpeg::{FfmpegFrameDecoder, RemuxCommandBuilder};
use quickmux_core::media::{self, LocalPathResolver, MediaHandle};
use quickmux_core::{RemuxOrchestrator, RemuxOutcome, ThumbnailSelector, is_black};
use support::{IntegrationEnv, RecordingIndexer, VideoKind, duration_ms};

#[test]
fn pattern_video_yields_non_black_thumbnail() {
    let env = IntegrationEnv::new();
    let input = env.with_test_video("pattern.mp4", 3.0, VideoKind::Pattern);

    let selector = ThumbnailSelector::new(FfmpegFrameDecoder::new(&env.ffmpeg));
    let result = selector
        .select(&input, Some(duration_ms(&input)))
        .expect("select thumbnail");

    let frame = result.frame.expect("thumbnail frame");
    assert_eq!(result.resolution, (320, 240));
    assert!(!is_black(&frame, 10).unwrap());
}

#[test]
fn black_video_has_no_thumbnail() {
    let env = IntegrationEnv::new();
    let input = env.with_test_video("black.mp4", 2.0, VideoKind::Black);

    let selector = ThumbnailSelector::new(FfmpegFrameDecoder::new(&env.ffmpeg));
    let result = selector
        .select(&input, Some(duration_ms(&input)))
        .expect("select thumbnail");

    assert!(result.frame.is_none());
    assert_eq!(result.resolution, (0, 0));
}

#[test]
fn inspect_reports_duration_size_and_resolution() {
    let env = IntegrationEnv::new();
    let input = env.with_test_video("inspect.mp4", 2.0, VideoKind::Pattern);

    let selector = ThumbnailSelector::new(FfmpegFrameDecoder::new(&env.ffmpeg));
    let (info, thumbnail) =
        media::inspect(&LocalPathResolver, &selector, &MediaHandle::from(input.as_path()))
            .expect("inspect");

    assert!(info.duration_ms >= 1_900, "duration {}", info.duration_ms);
    assert_eq!(info.size, fs::metadata(&input).unwrap().len());
    assert_eq!((info.width, info.height), (320, 240));
    assert!(info.has_thumbnail);
    assert!(thumbnail.frame.is_some());
}

#[test]
fn remux_to_mkv_succeeds_with_bounded_progress() {
    let env = IntegrationEnv::new();
    let input = env.with_test_video("source.mp4", 2.0, VideoKind::Pattern);
    let indexer = Arc::new(RecordingIndexer::default());

    let job = RemuxCommandBuilder::default()
        .build(&input, "mkv", &env.path("out"))
        .expect("build job");
    let output = job.output_path().to_path_buf();
    let orchestrator = RemuxOrchestrator::new(&env.ffmpeg, indexer.clone());

    let mut fractions = Vec::new();
    let outcome = orchestrator
        .run(job, duration_ms(&input))
        .wait_blocking(|p| fractions.push(p.fraction));

    assert_eq!(
        outcome,
        RemuxOutcome::Success {
            output_path: output.clone()
        }
    );
    assert!(output.is_file());
    assert!(fractions.iter().all(|f| (0.0..=1.0).contains(f)));
    assert_eq!(indexer.calls(), vec![(output.clone(), "video/mkv".to_string())]);
    assert!(duration_ms(&output) >= 1_900);
}

#[test]
fn existing_output_fails_instead_of_overwriting() {
    let env = IntegrationEnv::new();
    let input = env.with_test_video("clip.mp4", 1.0, VideoKind::Pattern);
    let out_dir = env.path("out");

    let job = RemuxCommandBuilder::default()
        .build(&input, "mkv", &out_dir)
        .expect("build job");
    fs::write(job.output_path(), b"keep me").unwrap();
    let indexer = Arc::new(RecordingIndexer::default());
    let orchestrator = RemuxOrchestrator::new(&env.ffmpeg, indexer.clone());

    let outcome = orchestrator.run(job, 1_000).wait_blocking(|_| {});

    match outcome {
        RemuxOutcome::Failed { message, log, .. } => {
            assert_eq!(message, "Remux execution failed");
            assert!(log.contains("already exists"), "log: {}", log);
        }
        other => panic!("expected Failed, got {:?}", other),
    }
    assert_eq!(fs::read(out_dir.join("clip.mkv")).unwrap(), b"keep me");
    assert!(indexer.calls().is_empty());
}
