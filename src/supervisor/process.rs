//! Transcoder process seam
//!
//! [`Transcoder`] launches one run of the external process and hands back
//! its two output streams. [`FfmpegTranscoder`] is the real implementation:
//! fragmented MP4 on stdout, JPEG stills on file descriptor 4, log lines on
//! stderr.

use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::pin::Pin;
use std::process::Stdio;
use std::sync::Arc;

use tokio::io::AsyncRead;

/// Boxed output stream of a transcoder process
pub type OutputStream = Pin<Box<dyn AsyncRead + Send>>;

/// Receives each log line the transcoder writes
pub type LogSink = Arc<dyn Fn(&str) + Send + Sync>;

/// Default sink: forward log lines to `tracing` at debug level
pub fn tracing_log_sink() -> LogSink {
    Arc::new(|line: &str| {
        tracing::debug!(target: "ipcam_live::transcoder", "{}", line);
    })
}

/// Output streams of a running transcoder
pub struct TranscodeOutputs {
    /// Fragmented MP4 bytes
    pub media: OutputStream,
    /// Concatenated JPEG images
    pub frames: OutputStream,
    /// Process log, if captured
    pub log: Option<OutputStream>,
}

/// Handle to a running transcoder process
pub trait ProcessHandle: Send + 'static {
    /// Wait for the process to exit, returning its exit code if it has one
    ///
    /// Must be cancel safe: it is polled inside `select!`.
    fn wait(&mut self) -> impl Future<Output = io::Result<Option<i32>>> + Send;

    /// Terminate the process
    fn kill(&mut self) -> impl Future<Output = io::Result<()>> + Send;

    /// OS process id, if any
    fn id(&self) -> Option<u32>;
}

/// Launches transcoder processes
pub trait Transcoder: Send + Sync + 'static {
    /// Process handle type
    type Process: ProcessHandle;

    /// Spawn one run with the given argument list
    fn spawn(&self, args: &[String]) -> io::Result<(Self::Process, TranscodeOutputs)>;
}

impl ProcessHandle for tokio::process::Child {
    async fn wait(&mut self) -> io::Result<Option<i32>> {
        let status = tokio::process::Child::wait(self).await?;
        Ok(status.code())
    }

    async fn kill(&mut self) -> io::Result<()> {
        tokio::process::Child::kill(self).await
    }

    fn id(&self) -> Option<u32> {
        tokio::process::Child::id(self)
    }
}

/// File descriptor the child writes JPEG frames to (`pipe:4`)
pub const FRAMES_FD: i32 = 4;

/// Runs the `ffmpeg` executable
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    program: PathBuf,
}

impl FfmpegTranscoder {
    /// Use `ffmpeg` from `PATH`
    pub fn new() -> Self {
        Self::with_program("ffmpeg")
    }

    /// Use a specific executable
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Executable path
    pub fn program(&self) -> &PathBuf {
        &self.program
    }
}

impl Default for FfmpegTranscoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
impl Transcoder for FfmpegTranscoder {
    type Process = tokio::process::Child;

    fn spawn(&self, args: &[String]) -> io::Result<(Self::Process, TranscodeOutputs)> {
        use std::os::fd::AsRawFd;

        let (frames_read, frames_write) = pipe::cloexec_pipe()?;
        let write_fd = frames_write.as_raw_fd();

        let mut command = tokio::process::Command::new(&self.program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // SAFETY: the closure only calls async-signal-safe libc functions
        unsafe {
            command.pre_exec(move || pipe::install_at(write_fd, FRAMES_FD));
        }

        let mut child = command.spawn()?;
        // the child holds its own copy now
        drop(frames_write);

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "transcoder stdout not captured"))?;
        let stderr = child.stderr.take();
        let frames = tokio::net::unix::pipe::Receiver::from_owned_fd(frames_read)?;

        tracing::debug!(
            program = %self.program.display(),
            pid = ?child.id(),
            "Transcoder spawned"
        );

        let outputs = TranscodeOutputs {
            media: Box::pin(stdout),
            frames: Box::pin(frames),
            log: stderr.map(|s| Box::pin(s) as OutputStream),
        };
        Ok((child, outputs))
    }
}

#[cfg(not(unix))]
impl Transcoder for FfmpegTranscoder {
    type Process = tokio::process::Child;

    fn spawn(&self, _args: &[String]) -> io::Result<(Self::Process, TranscodeOutputs)> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "image pipe on a numbered descriptor requires a unix platform",
        ))
    }
}

#[cfg(unix)]
mod pipe {
    use std::io;
    use std::os::fd::{FromRawFd, OwnedFd, RawFd};

    fn set_cloexec(fd: RawFd) -> io::Result<()> {
        // SAFETY: fcntl on a descriptor we own
        let rc = unsafe { libc::fcntl(fd, libc::F_SETFD, libc::FD_CLOEXEC) };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    /// Create a pipe whose ends are not inherited across exec
    pub(super) fn cloexec_pipe() -> io::Result<(OwnedFd, OwnedFd)> {
        let mut fds: [libc::c_int; 2] = [-1, -1];
        // SAFETY: fds points to two writable ints
        if unsafe { libc::pipe(fds.as_mut_ptr()) } < 0 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: pipe() returned two fresh descriptors that nothing else owns
        let (read, write) = unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) };

        set_cloexec(fds[0])?;
        set_cloexec(fds[1])?;
        Ok((read, write))
    }

    /// Runs in the forked child: place `fd` at `target` and keep it open
    /// across exec
    pub(super) fn install_at(fd: RawFd, target: RawFd) -> io::Result<()> {
        // SAFETY: dup2/fcntl are async-signal-safe
        unsafe {
            if fd == target {
                if libc::fcntl(target, libc::F_SETFD, 0) < 0 {
                    return Err(io::Error::last_os_error());
                }
            } else if libc::dup2(fd, target) < 0 {
                return Err(io::Error::last_os_error());
            }
        }
        Ok(())
    }
}
