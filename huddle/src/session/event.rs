use derive_more::Display;
use futures::stream::BoxStream;

use super::{LocalDeviceState, SessionState};
use crate::transport::{Participant, ParticipantId, TrackKind};

/// Step of the leave sequence, in the order they run
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum TeardownStep {
    #[display(fmt = "stop track")]
    StopTrack,
    #[display(fmt = "close track")]
    CloseTrack,
    #[display(fmt = "leave")]
    Leave,
}

/// Drives the UI
#[derive(Debug, Display, Clone, PartialEq, Eq)]
pub enum SessionEventKind {
    #[display(fmt = "session state changed to {}", state)]
    StateChanged { state: SessionState },
    #[display(fmt = "devices changed ({})", devices)]
    DevicesChanged { devices: LocalDeviceState },
    #[display(fmt = "participant {} joined", participant)]
    ParticipantJoined { participant: Participant },
    #[display(fmt = "participant {} left", participant)]
    ParticipantLeft { participant: Participant },
    /// The host left, so the session is being torn down
    #[display(fmt = "The host has ended the session.")]
    HostEndedSession { host_id: ParticipantId },
    #[display(fmt = "failed to join session: {}", reason)]
    ConnectFailed { reason: String },
    #[display(fmt = "connection lost: {}", reason)]
    ConnectionLost { reason: String },
    /// The session continues without this track
    #[display(fmt = "{} unavailable: {}", kind, reason)]
    TrackUnavailable { kind: TrackKind, reason: String },
    /// A release step failed. The remaining steps still ran
    #[display(fmt = "teardown step '{}' failed: {}", step, reason)]
    TeardownFailed { step: TeardownStep, reason: String },
}

pub struct SessionEventStream(pub BoxStream<'static, SessionEventKind>);

impl core::ops::Deref for SessionEventStream {
    type Target = BoxStream<'static, SessionEventKind>;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl core::ops::DerefMut for SessionEventStream {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}
