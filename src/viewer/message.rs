//! Viewer push-channel protocol

use std::str::FromStr;

use bytes::Bytes;

/// Message pushed to a viewer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewerMessage {
    /// MIME descriptor for `MediaSource.addSourceBuffer`
    Mime(String),
    /// Initialization segment
    Initialization(Bytes),
    /// One media fragment
    Segment { sequence: u64, data: Bytes },
    /// One JPEG still
    Jpeg(Bytes),
}

impl ViewerMessage {
    /// Event name on the push channel
    pub fn event_name(&self) -> &'static str {
        match self {
            ViewerMessage::Mime(_) => "mime",
            ViewerMessage::Initialization(_) => "initialization",
            ViewerMessage::Segment { .. } => "segment",
            ViewerMessage::Jpeg(_) => "jpeg",
        }
    }
}

/// Request from an MSE viewer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MseCommand {
    /// Send the MIME descriptor (now or once ready)
    Mime,
    /// Send the initialization segment (now or once ready)
    Initialization,
    /// Send one fragment newer than the last one sent
    Segment,
    /// Send the latest fragment and every later one
    Segments,
    /// Stop sending fragments
    Stop,
}

impl FromStr for MseCommand {
    type Err = UnknownCommand;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "mime" => Ok(MseCommand::Mime),
            "initialization" => Ok(MseCommand::Initialization),
            "segment" => Ok(MseCommand::Segment),
            "segments" => Ok(MseCommand::Segments),
            "stop" => Ok(MseCommand::Stop),
            other => Err(UnknownCommand(other.to_string())),
        }
    }
}

/// Text that is not an MSE command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownCommand(pub String);

impl std::fmt::Display for UnknownCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Unknown viewer command: {:?}", self.0)
    }
}

impl std::error::Error for UnknownCommand {}

/// Reasons a viewer cannot join
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinError {
    /// Nothing is being transcoded
    NoActiveSession,
}

impl std::fmt::Display for JoinError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JoinError::NoActiveSession => write!(f, "No active transcode session"),
        }
    }
}

impl std::error::Error for JoinError {}
