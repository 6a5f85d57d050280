use async_trait::async_trait;
use huddle::{
    error::Error,
    sync::Mutex,
    transport::{LocalTrack, TrackKind},
};
use uuid::Uuid;

use crate::{Operation, WeakRoom};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackStatus {
    Live,
    Stopped,
    Closed,
}

#[derive(Debug)]
struct TrackInner {
    enabled: bool,
    status: TrackStatus,
}

/// Capture track handed out by [`crate::LoopbackTransport`]. Nothing is captured;
/// the track only records what was done to it.
pub struct LoopbackTrack {
    id: Uuid,
    kind: TrackKind,
    inner: Mutex<TrackInner>,
    room: WeakRoom,
}

impl LoopbackTrack {
    pub(crate) fn new(kind: TrackKind, enabled: bool, room: WeakRoom) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            inner: Mutex::new(TrackInner {
                enabled,
                status: TrackStatus::Live,
            }),
            room,
        }
    }

    pub fn status(&self) -> TrackStatus {
        self.inner.lock().status
    }

    fn ensure_open(&self) -> Result<(), Error> {
        match self.status() {
            TrackStatus::Closed => Err(Error::TrackClosed),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl LocalTrack for LoopbackTrack {
    fn id(&self) -> Uuid {
        self.id
    }

    fn kind(&self) -> TrackKind {
        self.kind
    }

    fn is_enabled(&self) -> bool {
        self.inner.lock().enabled
    }

    async fn set_enabled(&self, enabled: bool) -> Result<(), Error> {
        self.ensure_open()?;
        self.room.record(Operation::SetTrackEnabled {
            kind: self.kind,
            enabled,
        });
        self.inner.lock().enabled = enabled;
        Ok(())
    }

    async fn stop(&self) -> Result<(), Error> {
        self.ensure_open()?;
        self.room.record(Operation::StopTrack { kind: self.kind });
        if let Some(reason) = self.room.stop_failure(self.kind) {
            return Err(Error::TrackStopFailed {
                kind: self.kind,
                reason,
            });
        }
        self.inner.lock().status = TrackStatus::Stopped;
        Ok(())
    }

    async fn close(&self) -> Result<(), Error> {
        self.ensure_open()?;
        self.room.record(Operation::CloseTrack { kind: self.kind });
        if let Some(reason) = self.room.close_failure(self.kind) {
            return Err(Error::TrackCloseFailed {
                kind: self.kind,
                reason,
            });
        }
        self.inner.lock().status = TrackStatus::Closed;
        Ok(())
    }
}
