//! Session configuration and encoder options

use crate::error::CaptureError;
use std::path::PathBuf;
use std::time::Duration;

/// Bytes per pixel in an incoming frame (R, G, B, unused)
pub const BYTES_PER_PIXEL: usize = 4;

/// Default read/write deadline for socket operations
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default keep-alive ping interval
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(20);

/// How the external encoder is launched
#[derive(Debug, Clone, PartialEq)]
pub struct EncoderConfig {
    /// Encoder executable
    pub program: String,
    /// Container extension of the output file, without the dot
    pub container: String,
    /// Options appended verbatim after the built-in input options
    pub options: Vec<String>,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            program: "ffmpeg".to_string(),
            container: "mkv".to_string(),
            options: Vec::new(),
        }
    }
}

/// Immutable configuration shared by every session of a server
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Frames per second
    pub framerate: f64,
    /// Target length in seconds, `None` when unbounded
    pub length: Option<f64>,
    /// Deadline applied to every socket receive and send
    pub timeout: Duration,
    /// Keep-alive ping interval
    pub ping_interval: Duration,
    /// Directory receiving one output file per session
    pub video_dir: PathBuf,
    /// Encoder launch parameters
    pub encoder: EncoderConfig,
}

impl SessionConfig {
    /// Create a validated configuration.
    ///
    /// A negative `length_secs` means the recording is unbounded.
    pub fn new(
        width: u32,
        height: u32,
        framerate: f64,
        length_secs: f64,
        video_dir: impl Into<PathBuf>,
    ) -> Result<Self, CaptureError> {
        let config = Self {
            width,
            height,
            framerate,
            length: (length_secs >= 0.0).then_some(length_secs),
            timeout: DEFAULT_TIMEOUT,
            ping_interval: DEFAULT_PING_INTERVAL,
            video_dir: video_dir.into(),
            encoder: EncoderConfig::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Set the socket deadline
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the keep-alive interval
    pub fn with_ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }

    /// Set the encoder launch parameters
    pub fn with_encoder(mut self, encoder: EncoderConfig) -> Self {
        self.encoder = encoder;
        self
    }

    /// Check every field against its allowed range
    pub fn validate(&self) -> Result<(), CaptureError> {
        if self.width == 0 {
            return Err(invalid("width", "must be positive"));
        }
        if self.height == 0 {
            return Err(invalid("height", "must be positive"));
        }
        if !self.framerate.is_finite() || self.framerate <= 0.0 {
            return Err(invalid("framerate", "must be a positive number"));
        }
        if let Some(length) = self.length {
            if !length.is_finite() {
                return Err(invalid("length", "must be finite"));
            }
        }
        if self.timeout.is_zero() {
            return Err(invalid("timeout", "must be non-zero"));
        }
        if self.ping_interval.is_zero() {
            return Err(invalid("ping_interval", "must be non-zero"));
        }
        if self.encoder.program.is_empty() {
            return Err(invalid("encoder.program", "must not be empty"));
        }
        if self.encoder.container.is_empty() || self.encoder.container.contains('/') {
            return Err(invalid("encoder.container", "must be a plain file extension"));
        }
        Ok(())
    }

    /// Exact size of every valid frame message
    pub fn frame_byte_size(&self) -> usize {
        self.width as usize * self.height as usize * BYTES_PER_PIXEL
    }

    /// Number of frames the client should capture, if bounded
    pub fn target_frames(&self) -> Option<u64> {
        self.length
            .map(|seconds| (seconds * self.framerate).round().max(0.0) as u64)
    }

    /// Frame count announced in the start message, `-1` when unbounded
    pub fn start_length(&self) -> i64 {
        self.target_frames().map_or(-1, |frames| frames as i64)
    }
}

fn invalid(field: &str, reason: &str) -> CaptureError {
    CaptureError::InvalidConfiguration {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

/// Encoder options chosen by the operator
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeOptions {
    /// Video codec name
    pub codec: String,
    /// Constant rate factor (lower numbers are higher quality)
    pub crf: Option<u32>,
    /// Encoder preset
    pub preset: Option<String>,
    /// Encoder profile
    pub profile: Option<String>,
    /// Encoder tuning
    pub tune: Option<String>,
    /// Output pixel format
    pub pix_fmt: Option<String>,
    /// Flip frames vertically (WebGL read-back is bottom-to-top)
    pub flip: bool,
    /// Free-form options, split on whitespace
    pub extra: String,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            codec: "libx264".to_string(),
            crf: None,
            preset: None,
            profile: None,
            tune: None,
            pix_fmt: None,
            flip: false,
            extra: String::new(),
        }
    }
}

impl EncodeOptions {
    /// Build the encoder argument list
    pub fn to_args(&self) -> Vec<String> {
        let mut crf = self.crf;
        let mut preset = self.preset.clone();
        if self.codec == "libx264" {
            crf.get_or_insert(18);
            preset.get_or_insert_with(|| "fast".to_string());
        }

        let mut args = vec!["-codec:v".to_string(), self.codec.clone()];
        if let Some(crf) = crf {
            args.extend(["-crf".to_string(), crf.to_string()]);
        }
        if let Some(preset) = preset {
            args.extend(["-preset".to_string(), preset]);
        }
        if let Some(profile) = &self.profile {
            args.extend(["-profile:v".to_string(), profile.clone()]);
        }
        if let Some(tune) = &self.tune {
            args.extend(["-tune:v".to_string(), tune.clone()]);
        }
        if let Some(pix_fmt) = &self.pix_fmt {
            args.extend(["-pix_fmt".to_string(), pix_fmt.clone()]);
        }
        if self.flip {
            args.extend(["-vf".to_string(), "vflip".to_string()]);
        }
        args.extend(self.extra.split_whitespace().map(str::to_string));
        args
    }
}
