//! Encoding process manager
//!
//! Spawns the external encoder with an extra inherited pipe on descriptor 3
//! and streams raw frames into it. The encoder's own stdout/stderr pass
//! through untouched.

use crate::config::SessionConfig;
use crate::error::CaptureError;
use crate::sink::FrameSink;
use async_trait::async_trait;
use chrono::{DateTime, Local};
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, IntoRawFd, OwnedFd, RawFd};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::net::unix::pipe;
use tokio::process::{Child, Command};

/// Output file names are the session start time at second resolution
pub const FILE_NAME_FORMAT: &str = "%Y-%m-%dT%H-%M-%S";

/// Descriptor number the encoder reads frames from
const INPUT_FD: RawFd = 3;

/// Frame sink that pipes raw frames into an ffmpeg process
#[derive(Debug)]
pub struct FfmpegEncoder {
    child: Child,
    pipe: Option<pipe::Sender>,
    path: PathBuf,
    file_name: String,
}

impl FfmpegEncoder {
    /// Start an encoder writing a new file named after the current time
    pub fn open(config: &SessionConfig) -> Result<Self, CaptureError> {
        Self::open_at(config, Local::now())
    }

    /// Start an encoder writing a new file named after `started_at`.
    ///
    /// Fails with [`CaptureError::AlreadyExists`] if that file is already
    /// present; nothing is spawned in that case.
    pub fn open_at(config: &SessionConfig, started_at: DateTime<Local>) -> Result<Self, CaptureError> {
        let dir = &config.video_dir;
        std::fs::create_dir_all(dir).map_err(|source| CaptureError::OutputDirectory {
            path: dir.clone(),
            source,
        })?;

        let file_name = output_file_name(started_at, &config.encoder.container);
        let path = dir.join(&file_name);
        ensure_vacant(&path)?;

        // Both ends are owned from here on, so every early return closes them.
        let (read_end, write_end) = create_pipe().map_err(|source| CaptureError::PipeFailed { source })?;
        let sender = pipe::Sender::from_owned_fd(write_end)
            .map_err(|source| CaptureError::PipeFailed { source })?;

        let mut command = Command::new(&config.encoder.program);
        command
            .args(input_args(config))
            .args(&config.encoder.options)
            .arg(&file_name)
            .current_dir(dir)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
        let input = read_end.as_raw_fd();
        // SAFETY: the closure only calls async-signal-safe libc functions.
        unsafe {
            command.pre_exec(move || attach_input(input));
        }

        let child = command
            .spawn()
            .map_err(|source| CaptureError::EncoderSpawnFailed {
                program: config.encoder.program.clone(),
                source,
            })?;
        drop(read_end);

        tracing::debug!(
            "Started {} (pid {:?}) writing {}",
            config.encoder.program,
            child.id(),
            path.display()
        );

        Ok(Self {
            child,
            pipe: Some(sender),
            path,
            file_name,
        })
    }

    /// Full path of the output file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Name of the output file inside the output directory
    pub fn file_name(&self) -> &str {
        &self.file_name
    }
}

#[async_trait]
impl FrameSink for FfmpegEncoder {
    async fn write(&mut self, frame: &[u8]) -> Result<(), CaptureError> {
        let pipe = self.pipe.as_mut().ok_or(CaptureError::SinkClosed)?;
        // write_all retries short writes until the whole frame is in the pipe
        pipe.write_all(frame)
            .await
            .map_err(|source| CaptureError::SinkWrite { source })
    }

    async fn close(&mut self) -> Result<(), CaptureError> {
        let pipe = self.pipe.take().ok_or(CaptureError::SinkClosed)?;
        // EOF for the encoder
        let pipe_result = close_pipe(pipe);

        let process_result = match self.child.wait().await {
            Ok(status) if status.success() => Ok(()),
            Ok(status) => Err(CaptureError::EncoderExit { status }),
            Err(source) => Err(CaptureError::EncoderWait { source }),
        };
        combine_close(pipe_result, process_result)?;

        tracing::info!("Wrote {}", self.file_name);
        Ok(())
    }

    fn output_path(&self) -> Option<&Path> {
        Some(&self.path)
    }
}

/// Merge the two close-time results; the process outcome wins.
fn combine_close(
    pipe_result: io::Result<()>,
    process_result: Result<(), CaptureError>,
) -> Result<(), CaptureError> {
    process_result?;
    pipe_result.map_err(|source| CaptureError::PipeClose { source })
}

/// Close the write end, reporting what close(2) says
fn close_pipe(pipe: pipe::Sender) -> io::Result<()> {
    let fd = pipe.into_nonblocking_fd()?;
    close_fd(fd.into_raw_fd())
}

fn close_fd(fd: RawFd) -> io::Result<()> {
    // SAFETY: the caller gives up ownership of `fd`.
    if unsafe { libc::close(fd) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// File name for an output started at `started_at`
pub fn output_file_name(started_at: DateTime<Local>, container: &str) -> String {
    format!("{}.{}", started_at.format(FILE_NAME_FORMAT), container)
}

fn ensure_vacant(path: &Path) -> Result<(), CaptureError> {
    match std::fs::symlink_metadata(path) {
        Ok(_) => Err(CaptureError::AlreadyExists {
            path: path.to_path_buf(),
        }),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(CaptureError::OutputPath {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Built-in options describing the raw input stream
pub fn input_args(config: &SessionConfig) -> Vec<String> {
    vec![
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "warning".to_string(),
        "-f".to_string(),
        "rawvideo".to_string(),
        "-pix_fmt".to_string(),
        "rgb0".to_string(),
        "-r".to_string(),
        config.framerate.to_string(),
        "-s".to_string(),
        format!("{}x{}", config.width, config.height),
        "-i".to_string(),
        format!("pipe:{}", INPUT_FD),
    ]
}

/// Allocate a close-on-exec pipe, returning (read end, write end)
fn create_pipe() -> io::Result<(OwnedFd, OwnedFd)> {
    let mut fds = [0 as libc::c_int; 2];

    #[cfg(target_os = "linux")]
    let ret = unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC) };
    #[cfg(not(target_os = "linux"))]
    let ret = unsafe { libc::pipe(fds.as_mut_ptr()) };

    if ret != 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: pipe just returned two fresh descriptors that nothing else owns.
    let (read_end, write_end) = unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) };

    #[cfg(not(target_os = "linux"))]
    for fd in [read_end.as_raw_fd(), write_end.as_raw_fd()] {
        set_cloexec(fd, true)?;
    }

    Ok((read_end, write_end))
}

/// Runs in the child between fork and exec
fn attach_input(fd: RawFd) -> io::Result<()> {
    if fd == INPUT_FD {
        // dup2 onto itself would leave FD_CLOEXEC set
        return set_cloexec(fd, false);
    }
    if unsafe { libc::dup2(fd, INPUT_FD) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

fn set_cloexec(fd: RawFd, on: bool) -> io::Result<()> {
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFD) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    let flags = if on {
        flags | libc::FD_CLOEXEC
    } else {
        flags & !libc::FD_CLOEXEC
    };
    if unsafe { libc::fcntl(fd, libc::F_SETFD, flags) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}
