//! Encoder process tests
//!
//! A small shell script stands in for ffmpeg: it copies descriptor 3 into the
//! file named by its last argument and records its arguments next to it.

#![cfg(unix)]

use chrono::{Local, TimeZone};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use wscapture_core::{CaptureError, EncoderConfig, FfmpegEncoder, FrameSink, SessionConfig};

const COPY_SCRIPT: &str = r#"#!/bin/sh
for arg; do out="$arg"; done
printf '%s\n' "$@" > args.txt
cat <&3 > "$out"
"#;

const FAILING_SCRIPT: &str = r#"#!/bin/sh
cat <&3 > /dev/null
exit 3
"#;

const MARKER_SCRIPT: &str = r#"#!/bin/sh
touch spawned
cat <&3 > /dev/null
"#;

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn test_config(video_dir: &Path, program: &Path) -> SessionConfig {
    SessionConfig::new(64, 48, 30.0, 2.0, video_dir)
        .unwrap()
        .with_encoder(EncoderConfig {
            program: program.to_string_lossy().into_owned(),
            container: "mkv".to_string(),
            options: vec!["-codec:v".to_string(), "libx264".to_string()],
        })
}

fn fixed_time() -> chrono::DateTime<Local> {
    Local.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap()
}

#[tokio::test]
async fn test_frames_reach_output_file() {
    let scripts = tempfile::tempdir().unwrap();
    let videos = tempfile::tempdir().unwrap();
    let program = write_script(scripts.path(), "encoder.sh", COPY_SCRIPT);
    let config = test_config(videos.path(), &program);

    let mut encoder = FfmpegEncoder::open_at(&config, fixed_time()).unwrap();
    assert_eq!(encoder.file_name(), "2024-05-01T12-30-00.mkv");
    assert_eq!(encoder.output_path(), Some(encoder.path()));

    let frame = vec![0x7fu8; config.frame_byte_size()];
    encoder.write(&frame).await.unwrap();
    encoder.write(&frame).await.unwrap();
    encoder.close().await.unwrap();

    let written = std::fs::read(videos.path().join("2024-05-01T12-30-00.mkv")).unwrap();
    assert_eq!(written.len(), 2 * config.frame_byte_size());
    assert!(written.iter().all(|b| *b == 0x7f));
}

#[tokio::test]
async fn test_encoder_arguments() {
    let scripts = tempfile::tempdir().unwrap();
    let videos = tempfile::tempdir().unwrap();
    let program = write_script(scripts.path(), "encoder.sh", COPY_SCRIPT);
    let config = test_config(videos.path(), &program);

    let mut encoder = FfmpegEncoder::open_at(&config, fixed_time()).unwrap();
    encoder.close().await.unwrap();

    let args = std::fs::read_to_string(videos.path().join("args.txt")).unwrap();
    let args: Vec<&str> = args.lines().collect();
    assert_eq!(
        args,
        vec![
            "-hide_banner",
            "-loglevel",
            "warning",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgb0",
            "-r",
            "30",
            "-s",
            "64x48",
            "-i",
            "pipe:3",
            "-codec:v",
            "libx264",
            "2024-05-01T12-30-00.mkv",
        ]
    );
}

#[tokio::test]
async fn test_existing_file_is_never_overwritten() {
    let scripts = tempfile::tempdir().unwrap();
    let videos = tempfile::tempdir().unwrap();
    let program = write_script(scripts.path(), "encoder.sh", MARKER_SCRIPT);
    let config = test_config(videos.path(), &program);

    let existing = videos.path().join("2024-05-01T12-30-00.mkv");
    std::fs::write(&existing, b"keep me").unwrap();

    let err = FfmpegEncoder::open_at(&config, fixed_time()).unwrap_err();
    assert!(matches!(err, CaptureError::AlreadyExists { .. }));
    assert_eq!(err.error_code(), "ALREADY_EXISTS");

    assert_eq!(std::fs::read(&existing).unwrap(), b"keep me");
    assert!(!videos.path().join("spawned").exists());
}

#[tokio::test]
async fn test_same_second_collision() {
    let scripts = tempfile::tempdir().unwrap();
    let videos = tempfile::tempdir().unwrap();
    let program = write_script(scripts.path(), "encoder.sh", COPY_SCRIPT);
    let config = test_config(videos.path(), &program);

    let mut first = FfmpegEncoder::open_at(&config, fixed_time()).unwrap();
    // The first encoder's script creates the output once it starts copying.
    let expected = videos.path().join(first.file_name());
    for _ in 0..100 {
        if expected.exists() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }

    let err = FfmpegEncoder::open_at(&config, fixed_time()).unwrap_err();
    assert!(matches!(err, CaptureError::AlreadyExists { .. }));

    let frame = vec![1u8; config.frame_byte_size()];
    first.write(&frame).await.unwrap();
    first.close().await.unwrap();
    assert_eq!(
        std::fs::metadata(&expected).unwrap().len() as usize,
        config.frame_byte_size()
    );
}

#[tokio::test]
async fn test_output_directory_created() {
    let scripts = tempfile::tempdir().unwrap();
    let root = tempfile::tempdir().unwrap();
    let videos = root.path().join("nested").join("videos");
    let program = write_script(scripts.path(), "encoder.sh", COPY_SCRIPT);
    let config = test_config(&videos, &program);

    let mut encoder = FfmpegEncoder::open_at(&config, fixed_time()).unwrap();
    encoder.close().await.unwrap();
    assert!(videos.join("2024-05-01T12-30-00.mkv").exists());
}

#[tokio::test]
async fn test_missing_encoder_binary() {
    let videos = tempfile::tempdir().unwrap();
    let config = test_config(videos.path(), Path::new("/nonexistent/wscapture-ffmpeg"));

    let err = FfmpegEncoder::open_at(&config, fixed_time()).unwrap_err();
    assert!(matches!(err, CaptureError::EncoderSpawnFailed { .. }));
}

#[tokio::test]
async fn test_failed_exit_reported_on_close() {
    let scripts = tempfile::tempdir().unwrap();
    let videos = tempfile::tempdir().unwrap();
    let program = write_script(scripts.path(), "encoder.sh", FAILING_SCRIPT);
    let config = test_config(videos.path(), &program);

    let mut encoder = FfmpegEncoder::open_at(&config, fixed_time()).unwrap();
    encoder.write(&vec![0u8; config.frame_byte_size()]).await.unwrap();

    let err = encoder.close().await.unwrap_err();
    match err {
        CaptureError::EncoderExit { status } => assert_eq!(status.code(), Some(3)),
        other => panic!("Expected EncoderExit, got {:?}", other),
    }
}

#[tokio::test]
async fn test_write_after_close_fails() {
    let scripts = tempfile::tempdir().unwrap();
    let videos = tempfile::tempdir().unwrap();
    let program = write_script(scripts.path(), "encoder.sh", COPY_SCRIPT);
    let config = test_config(videos.path(), &program);

    let mut encoder = FfmpegEncoder::open_at(&config, fixed_time()).unwrap();
    encoder.close().await.unwrap();

    assert!(matches!(
        encoder.write(&[0u8; 4]).await,
        Err(CaptureError::SinkClosed)
    ));
    assert!(matches!(encoder.close().await, Err(CaptureError::SinkClosed)));
}
