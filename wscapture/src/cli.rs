//! Command-line flags

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use wscapture_core::{CaptureError, EncodeOptions, EncoderConfig, SessionConfig};

/// Sizes accepted as `<height>p`
pub const PRESET_SIZES: [(u32, u32); 7] = [
    (426, 240),
    (640, 360),
    (854, 480),
    (1280, 720),
    (1920, 1080),
    (2560, 1440),
    (3840, 2160),
];

/// Frame dimensions in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSize {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

/// Rejected `--size` value
#[derive(Error, Debug, PartialEq, Eq)]
pub enum SizeError {
    /// Neither `<width>x<height>` nor `<height>p`
    #[error("invalid size: should have format <width>x<height> or <height>p")]
    Format,
    /// Unknown `<height>p` preset
    #[error("invalid size {size:?}: valid presets are {presets}")]
    UnknownPreset {
        /// Value given on the command line
        size: String,
        /// Comma-separated list of presets
        presets: String,
    },
    /// Width is not a positive integer
    #[error("invalid width {0:?}")]
    Width(String),
    /// Height is not a positive integer
    #[error("invalid height {0:?}")]
    Height(String),
}

/// Rejected duration value
#[derive(Error, Debug, PartialEq, Eq)]
#[error("invalid duration {0:?}: expected a number followed by ms, s, m or h")]
pub struct DurationError(String);

/// Record frames streamed from a web page into video files
#[derive(Debug, Parser)]
#[command(name = "wscapture", version)]
pub struct Args {
    /// Listen at address
    #[arg(long = "http", value_name = "ADDR", default_value = "localhost:8080")]
    pub listen: String,

    /// Directory to store videos
    #[arg(long, value_name = "DIR", default_value = "videos")]
    pub videos: PathBuf,

    /// Video size, <width>x<height> or <height>p
    #[arg(long, default_value = "640x480", value_parser = parse_size)]
    pub size: FrameSize,

    /// Record at this many frames per second
    #[arg(long, value_name = "FPS", default_value_t = 30.0)]
    pub rate: f64,

    /// Length of video to record, in seconds, or -1 for unlimited
    #[arg(long, value_name = "SECONDS", default_value_t = -1.0, allow_negative_numbers = true)]
    pub length: f64,

    /// WebSocket timeout
    #[arg(long, default_value = "10s", value_parser = parse_duration)]
    pub timeout: Duration,

    /// WebSocket ping interval
    #[arg(long = "ping-interval", default_value = "20s", value_parser = parse_duration)]
    pub ping_interval: Duration,

    /// Video container format
    #[arg(long, default_value = "mkv")]
    pub format: String,

    /// Encoder executable
    #[arg(long, value_name = "PATH", default_value = "ffmpeg")]
    pub ffmpeg: String,

    /// FFmpeg codec
    #[arg(long, default_value = "libx264")]
    pub codec: String,

    /// CRF (lower numbers are higher quality)
    #[arg(long)]
    pub crf: Option<u32>,

    /// Encoder preset
    #[arg(long)]
    pub preset: Option<String>,

    /// Encoder profile
    #[arg(long)]
    pub profile: Option<String>,

    /// Video pixel format
    #[arg(long = "pix-fmt", alias = "pix_fmt")]
    pub pix_fmt: Option<String>,

    /// Encoder tuning
    #[arg(long)]
    pub tune: Option<String>,

    /// Flip frames vertically
    #[arg(long)]
    pub flip: bool,

    /// Extra encoder options
    #[arg(
        long = "encode-options",
        alias = "encode_options",
        value_name = "OPTIONS",
        default_value = "",
        allow_hyphen_values = true
    )]
    pub encode_options: String,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// Encoder options selected by the flags
    pub fn encode_options(&self) -> EncodeOptions {
        EncodeOptions {
            codec: self.codec.clone(),
            crf: self.crf,
            preset: self.preset.clone(),
            profile: self.profile.clone(),
            tune: self.tune.clone(),
            pix_fmt: self.pix_fmt.clone(),
            flip: self.flip,
            extra: self.encode_options.clone(),
        }
    }

    /// Session configuration selected by the flags
    pub fn session_config(&self) -> Result<SessionConfig, CaptureError> {
        let config = SessionConfig::new(
            self.size.width,
            self.size.height,
            self.rate,
            self.length,
            &self.videos,
        )?
        .with_timeout(self.timeout)
        .with_ping_interval(self.ping_interval)
        .with_encoder(EncoderConfig {
            program: self.ffmpeg.clone(),
            container: self.format.clone(),
            options: self.encode_options().to_args(),
        });
        config.validate()?;
        Ok(config)
    }
}

/// Parse `<width>x<height>` or a `<height>p` preset
pub fn parse_size(size: &str) -> Result<FrameSize, SizeError> {
    let Some((width, height)) = size.split_once('x') else {
        let height = size
            .strip_suffix('p')
            .and_then(|height| height.parse::<u32>().ok())
            .ok_or(SizeError::Format)?;
        return PRESET_SIZES
            .iter()
            .find(|(_, h)| *h == height)
            .map(|&(width, height)| FrameSize { width, height })
            .ok_or_else(|| SizeError::UnknownPreset {
                size: size.to_string(),
                presets: PRESET_SIZES
                    .iter()
                    .map(|(_, h)| format!("{}p", h))
                    .collect::<Vec<_>>()
                    .join(", "),
            });
    };

    let width = positive(width).ok_or_else(|| SizeError::Width(width.to_string()))?;
    let height = positive(height).ok_or_else(|| SizeError::Height(height.to_string()))?;
    Ok(FrameSize { width, height })
}

fn positive(value: &str) -> Option<u32> {
    value.parse::<u32>().ok().filter(|n| *n > 0)
}

/// Parse `<n>ms`, `<n>s`, `<n>m`, `<n>h`, or bare seconds
pub fn parse_duration(value: &str) -> Result<Duration, DurationError> {
    let invalid = || DurationError(value.to_string());
    let trimmed = value.trim();
    let (number, unit) = match trimmed.find(|c: char| c.is_ascii_alphabetic()) {
        Some(i) => trimmed.split_at(i),
        None => (trimmed, "s"),
    };
    let number: f64 = number.parse().map_err(|_| invalid())?;
    let scale = match unit {
        "ms" => 0.001,
        "s" => 1.0,
        "m" => 60.0,
        "h" => 3600.0,
        _ => return Err(invalid()),
    };
    if !number.is_finite() || number < 0.0 {
        return Err(invalid());
    }
    Ok(Duration::from_secs_f64(number * scale))
}
