//! The transport is the RTC client that does the real work of a call:
//! - connecting to a channel and leaving it
//! - capturing local audio/video and publishing it
//! - tracking who else is in the channel
//!
//! The session controller only orchestrates calls across this boundary.
mod track;

pub use track::*;

use async_trait::async_trait;
use derive_more::Display;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::{error::Error, Extension};

/// Numeric id the transport assigns to everyone in a channel
pub type ParticipantId = u32;

#[derive(Debug, Display, Clone, Copy, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[display(fmt = "{}", id)]
pub struct Participant {
    pub id: ParticipantId,
    pub is_local: bool,
}

impl Participant {
    pub fn remote(id: ParticipantId) -> Self {
        Self {
            id,
            is_local: false,
        }
    }

    pub fn local(id: ParticipantId) -> Self {
        Self { id, is_local: true }
    }
}

/// RTC client used by the session controller
#[async_trait]
pub trait Transport: Extension + Send + Sync {
    /// Joins `channel_name` under the application identified by `endpoint_id`.
    /// Resolves once the transport is connected and returns the local participant id.
    async fn connect(
        &mut self,
        endpoint_id: &str,
        channel_name: &str,
        access_token: Option<&str>,
    ) -> Result<ParticipantId, Error>;

    /// Leaves the current channel
    async fn leave(&mut self) -> Result<(), Error>;

    /// Makes the given tracks visible to the rest of the channel
    async fn publish_tracks(&mut self, tracks: &[SharedTrack]) -> Result<(), Error>;

    async fn acquire_microphone_track(&mut self, enabled: bool) -> Result<SharedTrack, Error>;

    async fn acquire_camera_track(&mut self, enabled: bool) -> Result<SharedTrack, Error>;

    /// Membership and connection events. Dropping the stream unsubscribes.
    async fn subscribe(&mut self) -> Result<TransportEventStream, Error>;

    fn is_connected(&self) -> bool;

    /// Remote participants in the order they joined. Never contains the local participant.
    fn remote_participants(&self) -> Vec<Participant>;
}

#[derive(Debug, Display, Clone, PartialEq, Eq)]
pub enum TransportEventKind {
    #[display(fmt = "participant {} joined", participant)]
    ParticipantJoined { participant: Participant },
    #[display(fmt = "participant {} left", participant)]
    ParticipantLeft { participant: Participant },
    /// The transport dropped the connection on its own
    #[display(fmt = "connection lost: {}", reason)]
    ConnectionLost { reason: String },
}

pub struct TransportEventStream(pub BoxStream<'static, TransportEventKind>);

impl core::ops::Deref for TransportEventStream {
    type Target = BoxStream<'static, TransportEventKind>;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl core::ops::DerefMut for TransportEventStream {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}
