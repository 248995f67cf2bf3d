//! Error types
//!
//! The crate-level [`Error`] wraps one sub-enum per concern. Recoverable,
//! user-facing misses (fragment not in the window, no running session) are
//! not errors; they are reported as values by the cache and the HLS endpoint.

use std::io;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Debug)]
pub enum Error {
    /// I/O failure (pipes, process handles)
    Io(io::Error),
    /// Container or codec parsing failure
    Media(MediaError),
    /// Process supervision failure
    Supervisor(SupervisorError),
    /// Invalid transcode parameters
    Params(ParamsError),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Media(e) => write!(f, "Media error: {}", e),
            Error::Supervisor(e) => write!(f, "Supervisor error: {}", e),
            Error::Params(e) => write!(f, "Parameter error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Media(e) => Some(e),
            Error::Supervisor(e) => Some(e),
            Error::Params(e) => Some(e),
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<MediaError> for Error {
    fn from(e: MediaError) -> Self {
        Error::Media(e)
    }
}

impl From<SupervisorError> for Error {
    fn from(e: SupervisorError) -> Self {
        Error::Supervisor(e)
    }
}

impl From<ParamsError> for Error {
    fn from(e: ParamsError) -> Self {
        Error::Params(e)
    }
}

/// Container and codec parsing errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaError {
    /// Box header declares a size smaller than the header itself
    InvalidBox { box_type: [u8; 4], size: u64 },
    /// Box exceeds the configured maximum
    BoxTooLarge { box_type: [u8; 4], size: u64 },
    /// Malformed AVCDecoderConfigurationRecord
    InvalidAvcConfig,
    /// Malformed AudioSpecificConfig / esds descriptor
    InvalidAacConfig,
}

impl std::fmt::Display for MediaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaError::InvalidBox { box_type, size } => write!(
                f,
                "Invalid box '{}' with size {}",
                String::from_utf8_lossy(box_type),
                size
            ),
            MediaError::BoxTooLarge { box_type, size } => write!(
                f,
                "Box '{}' too large: {} bytes",
                String::from_utf8_lossy(box_type),
                size
            ),
            MediaError::InvalidAvcConfig => write!(f, "Invalid AVC decoder configuration"),
            MediaError::InvalidAacConfig => write!(f, "Invalid AAC audio configuration"),
        }
    }
}

impl std::error::Error for MediaError {}

/// Process supervision errors
#[derive(Debug)]
pub enum SupervisorError {
    /// A session is already active; it must be stopped first
    AlreadyRunning,
    /// The transcoder executable could not be launched
    Spawn(io::Error),
}

impl std::fmt::Display for SupervisorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SupervisorError::AlreadyRunning => {
                write!(f, "A transcode session is already running")
            }
            SupervisorError::Spawn(e) => write!(f, "Failed to spawn transcoder: {}", e),
        }
    }
}

impl std::error::Error for SupervisorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SupervisorError::AlreadyRunning => None,
            SupervisorError::Spawn(e) => Some(e),
        }
    }
}

/// Transcode parameter errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamsError {
    /// No source (RTSP) URL was given
    MissingSourceUrl,
}

impl std::fmt::Display for ParamsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParamsError::MissingSourceUrl => write!(f, "Missing rtsp url"),
        }
    }
}

impl std::error::Error for ParamsError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        assert_eq!(
            SupervisorError::AlreadyRunning.to_string(),
            "A transcode session is already running"
        );
        assert_eq!(ParamsError::MissingSourceUrl.to_string(), "Missing rtsp url");

        let err = MediaError::InvalidBox {
            box_type: *b"moof",
            size: 4,
        };
        assert_eq!(err.to_string(), "Invalid box 'moof' with size 4");
    }

    #[test]
    fn test_from_conversions() {
        let err: Error = SupervisorError::AlreadyRunning.into();
        assert!(matches!(
            err,
            Error::Supervisor(SupervisorError::AlreadyRunning)
        ));

        let err: Error = io::Error::new(io::ErrorKind::NotFound, "ffmpeg").into();
        assert!(matches!(err, Error::Io(_)));
        assert!(std::error::Error::source(&err).is_some());
    }
}
