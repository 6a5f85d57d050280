//! Errors raised by the session controller and by transport implementations
use derive_more::Display;
use thiserror::Error;

use crate::transport::TrackKind;

#[derive(Error, Debug)]
pub enum Error {
    //Config Errors
    #[error("Endpoint id is required before joining a session")]
    EndpointIdMissing,
    #[error("Channel name is required before joining a session")]
    ChannelNameMissing,

    //Connect Errors
    #[error("Unable to connect to session: {_0}")]
    ConnectFailed(String),

    //Teardown Errors
    #[error("Unable to stop {kind} track: {reason}")]
    TrackStopFailed { kind: TrackKind, reason: String },
    #[error("Unable to close {kind} track: {reason}")]
    TrackCloseFailed { kind: TrackKind, reason: String },
    #[error("Unable to leave session: {_0}")]
    LeaveFailed(String),

    //Lifecycle Errors
    #[error("A session is already active")]
    SessionAlreadyActive,
    #[error("No session is active")]
    SessionNotActive,
    #[error("{_0} device is unavailable")]
    DeviceUnavailable(TrackKind),
    #[error("Track has already been closed")]
    TrackClosed,

    //Misc
    #[error("Session controller is no longer running")]
    ControllerStopped,
    #[error("{0}")]
    OtherWithContext(String),
    #[error(transparent)]
    Any(#[from] anyhow::Error),
}

/// Broad classification of [`Error`] used when deciding how to present a failure
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid user input. The user may correct it and retry
    #[display(fmt = "config")]
    Config,
    /// The transport refused or failed the connection
    #[display(fmt = "connect")]
    Connect,
    /// A release step failed while leaving. Teardown still completed
    #[display(fmt = "teardown")]
    Teardown,
    /// The request does not fit the current session state
    #[display(fmt = "lifecycle")]
    Lifecycle,
    #[display(fmt = "internal")]
    Internal,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::EndpointIdMissing | Error::ChannelNameMissing => ErrorKind::Config,
            Error::ConnectFailed(_) => ErrorKind::Connect,
            Error::TrackStopFailed { .. } | Error::TrackCloseFailed { .. } | Error::LeaveFailed(_) => {
                ErrorKind::Teardown
            }
            Error::SessionAlreadyActive
            | Error::SessionNotActive
            | Error::DeviceUnavailable(_)
            | Error::TrackClosed => ErrorKind::Lifecycle,
            _ => ErrorKind::Internal,
        }
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for Error {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        Error::ControllerStopped
    }
}

impl From<tokio::sync::oneshot::error::RecvError> for Error {
    fn from(_: tokio::sync::oneshot::error::RecvError) -> Self {
        Error::ControllerStopped
    }
}
