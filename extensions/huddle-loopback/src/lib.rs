//! In-process transport that stands in for a real RTC client.
//!
//! A [`LoopbackRoom`] is the simulated channel. The transport created from it
//! connects instantly (or after a configured delay), and callers use the room to
//! move remote participants in and out, drop the connection, inject failures and
//! inspect the calls the transport received.
mod track;

pub use track::{LoopbackTrack, TrackStatus};

use std::{
    collections::HashMap,
    sync::{Arc, Weak},
    time::Duration,
};

use async_trait::async_trait;
use huddle::{
    error::Error,
    sync::RwLock,
    transport::{
        Participant, ParticipantId, SharedTrack, TrackKind, Transport, TransportEventKind,
        TransportEventStream,
    },
    Extension,
};
use indexmap::IndexMap;
use tokio::sync::broadcast;

/// Participant id handed to the local side unless configured otherwise
pub const DEFAULT_LOCAL_ID: ParticipantId = 1;

/// A call the transport received, in the order it was received
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Connect {
        endpoint_id: String,
        channel_name: String,
        access_token: Option<String>,
    },
    Leave,
    AcquireTrack {
        kind: TrackKind,
        enabled: bool,
    },
    Publish {
        tracks: Vec<TrackKind>,
    },
    SetTrackEnabled {
        kind: TrackKind,
        enabled: bool,
    },
    StopTrack {
        kind: TrackKind,
    },
    CloseTrack {
        kind: TrackKind,
    },
}

#[derive(Default)]
struct Failures {
    connect: Option<String>,
    unconfirmed_connect: bool,
    publish: Option<String>,
    leave: Option<String>,
    acquire: HashMap<TrackKind, String>,
    stop: HashMap<TrackKind, String>,
    close: HashMap<TrackKind, String>,
}

struct RoomInner {
    local_id: ParticipantId,
    connected: bool,
    channel: Option<String>,
    connect_delay: Option<Duration>,
    remote: IndexMap<ParticipantId, Participant>,
    tracks: Vec<Arc<LoopbackTrack>>,
    published: Vec<SharedTrack>,
    operations: Vec<Operation>,
    failures: Failures,
}

/// Shared view of a simulated channel
#[derive(Clone)]
pub struct LoopbackRoom {
    inner: Arc<RwLock<RoomInner>>,
    event_ch: broadcast::Sender<TransportEventKind>,
}

impl Default for LoopbackRoom {
    fn default() -> Self {
        Self::new(DEFAULT_LOCAL_ID)
    }
}

impl LoopbackRoom {
    pub fn new(local_id: ParticipantId) -> Self {
        let (event_ch, _rx) = broadcast::channel(1024);
        Self {
            inner: Arc::new(RwLock::new(RoomInner {
                local_id,
                connected: false,
                channel: None,
                connect_delay: None,
                remote: IndexMap::new(),
                tracks: vec![],
                published: vec![],
                operations: vec![],
                failures: Failures::default(),
            })),
            event_ch,
        }
    }

    /// Creates a transport attached to this room
    pub fn transport(&self) -> LoopbackTransport {
        LoopbackTransport { room: self.clone() }
    }

    pub fn is_connected(&self) -> bool {
        self.inner.read().connected
    }

    /// Channel the transport is connected to
    pub fn channel(&self) -> Option<String> {
        self.inner.read().channel.clone()
    }

    /// Makes `connect` wait before resolving, as a real network would
    pub fn set_connect_delay(&self, delay: Duration) {
        self.inner.write().connect_delay = Some(delay);
    }

    /// Adds a remote participant to the channel. Returns false if `id` is
    /// already present or belongs to the local side.
    pub fn add_remote(&self, id: ParticipantId) -> bool {
        let participant = Participant::remote(id);
        let connected = {
            let mut inner = self.inner.write();
            if inner.local_id == id || inner.remote.contains_key(&id) {
                return false;
            }
            inner.remote.insert(id, participant);
            inner.connected
        };
        if connected {
            self.emit(TransportEventKind::ParticipantJoined { participant });
        }
        true
    }

    /// Removes a remote participant from the channel. Returns false if `id` was not present.
    pub fn remove_remote(&self, id: ParticipantId) -> bool {
        let (removed, connected) = {
            let mut inner = self.inner.write();
            (inner.remote.shift_remove(&id), inner.connected)
        };
        match removed {
            Some(participant) => {
                if connected {
                    self.emit(TransportEventKind::ParticipantLeft { participant });
                }
                true
            }
            None => false,
        }
    }

    /// Drops the connection as if the network went away
    pub fn drop_connection(&self, reason: impl Into<String>) {
        let was_connected = {
            let mut inner = self.inner.write();
            let was_connected = inner.connected;
            inner.connected = false;
            inner.channel = None;
            was_connected
        };
        if was_connected {
            self.emit(TransportEventKind::ConnectionLost {
                reason: reason.into(),
            });
        }
    }

    /// Delivers `event` to every subscriber regardless of room state
    pub fn emit(&self, event: TransportEventKind) {
        tracing::trace!(%event, "loopback event");
        let _ = self.event_ch.send(event);
    }

    /// Number of live event subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.event_ch.receiver_count()
    }

    pub fn fail_next_connect(&self, reason: impl Into<String>) {
        self.inner.write().failures.connect = Some(reason.into());
    }

    /// Makes the next `connect` resolve without an active connection. The room
    /// still holds the channel until `leave` is called.
    pub fn leave_next_connect_unconfirmed(&self) {
        self.inner.write().failures.unconfirmed_connect = true;
    }

    pub fn fail_publish(&self, reason: impl Into<String>) {
        self.inner.write().failures.publish = Some(reason.into());
    }

    pub fn fail_leave(&self, reason: impl Into<String>) {
        self.inner.write().failures.leave = Some(reason.into());
    }

    pub fn fail_track_acquire(&self, kind: TrackKind, reason: impl Into<String>) {
        self.inner.write().failures.acquire.insert(kind, reason.into());
    }

    pub fn fail_track_stop(&self, kind: TrackKind, reason: impl Into<String>) {
        self.inner.write().failures.stop.insert(kind, reason.into());
    }

    pub fn fail_track_close(&self, kind: TrackKind, reason: impl Into<String>) {
        self.inner.write().failures.close.insert(kind, reason.into());
    }

    pub fn operations(&self) -> Vec<Operation> {
        self.inner.read().operations.clone()
    }

    pub fn connect_calls(&self) -> usize {
        self.count(|op| matches!(op, Operation::Connect { .. }))
    }

    pub fn leave_calls(&self) -> usize {
        self.count(|op| matches!(op, Operation::Leave))
    }

    pub fn count(&self, f: impl Fn(&Operation) -> bool) -> usize {
        self.inner.read().operations.iter().filter(|op| f(op)).count()
    }

    /// Every track handed out, including released ones
    pub fn tracks(&self) -> Vec<Arc<LoopbackTrack>> {
        self.inner.read().tracks.clone()
    }

    /// Kinds of the tracks currently published
    pub fn published(&self) -> Vec<TrackKind> {
        self.inner.read().published.iter().map(|t| t.kind()).collect()
    }

    pub(crate) fn record(&self, op: Operation) {
        self.inner.write().operations.push(op);
    }

    pub(crate) fn downgrade(&self) -> WeakRoom {
        WeakRoom(Arc::downgrade(&self.inner))
    }
}

/// Room reference held by tracks, so a room and its tracks do not keep each other alive
pub(crate) struct WeakRoom(Weak<RwLock<RoomInner>>);

impl WeakRoom {
    pub(crate) fn record(&self, op: Operation) {
        if let Some(inner) = self.0.upgrade() {
            inner.write().operations.push(op);
        }
    }

    // Stop and close failures are sticky so a track fails every time it is asked
    pub(crate) fn stop_failure(&self, kind: TrackKind) -> Option<String> {
        let inner = self.0.upgrade()?;
        let reason = inner.read().failures.stop.get(&kind).cloned();
        reason
    }

    pub(crate) fn close_failure(&self, kind: TrackKind) -> Option<String> {
        let inner = self.0.upgrade()?;
        let reason = inner.read().failures.close.get(&kind).cloned();
        reason
    }
}

pub struct LoopbackTransport {
    room: LoopbackRoom,
}

impl LoopbackTransport {
    fn acquire(&self, kind: TrackKind, enabled: bool) -> Result<SharedTrack, Error> {
        self.room.record(Operation::AcquireTrack { kind, enabled });
        let mut inner = self.room.inner.write();
        if let Some(reason) = inner.failures.acquire.get(&kind) {
            tracing::debug!(%kind, "refusing to hand out track: {reason}");
            return Err(Error::DeviceUnavailable(kind));
        }
        let track = Arc::new(LoopbackTrack::new(kind, enabled, self.room.downgrade()));
        inner.tracks.push(track.clone());
        Ok(track)
    }
}

impl Extension for LoopbackTransport {
    fn id(&self) -> String {
        "huddle-loopback".to_string()
    }

    fn name(&self) -> String {
        "Loopback Transport".into()
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn connect(
        &mut self,
        endpoint_id: &str,
        channel_name: &str,
        access_token: Option<&str>,
    ) -> Result<ParticipantId, Error> {
        self.room.record(Operation::Connect {
            endpoint_id: endpoint_id.into(),
            channel_name: channel_name.into(),
            access_token: access_token.map(String::from),
        });

        let delay = self.room.inner.read().connect_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut inner = self.room.inner.write();
        if let Some(reason) = inner.failures.connect.take() {
            return Err(Error::ConnectFailed(reason));
        }
        if inner.channel.is_some() {
            return Err(Error::ConnectFailed("already connected".into()));
        }
        inner.channel = Some(channel_name.to_string());
        if std::mem::take(&mut inner.failures.unconfirmed_connect) {
            tracing::debug!(channel = channel_name, "loopback connect left unconfirmed");
            return Ok(inner.local_id);
        }
        inner.connected = true;
        tracing::debug!(channel = channel_name, "loopback connected");
        Ok(inner.local_id)
    }

    async fn leave(&mut self) -> Result<(), Error> {
        self.room.record(Operation::Leave);
        let mut inner = self.room.inner.write();
        inner.connected = false;
        inner.channel = None;
        inner.published.clear();
        match inner.failures.leave.take() {
            Some(reason) => Err(Error::LeaveFailed(reason)),
            None => Ok(()),
        }
    }

    async fn publish_tracks(&mut self, tracks: &[SharedTrack]) -> Result<(), Error> {
        self.room.record(Operation::Publish {
            tracks: tracks.iter().map(|t| t.kind()).collect(),
        });
        let mut inner = self.room.inner.write();
        if let Some(reason) = inner.failures.publish.take() {
            return Err(Error::OtherWithContext(reason));
        }
        if !inner.connected {
            return Err(Error::SessionNotActive);
        }
        inner.published.extend(tracks.iter().cloned());
        Ok(())
    }

    async fn acquire_microphone_track(&mut self, enabled: bool) -> Result<SharedTrack, Error> {
        self.acquire(TrackKind::Microphone, enabled)
    }

    async fn acquire_camera_track(&mut self, enabled: bool) -> Result<SharedTrack, Error> {
        self.acquire(TrackKind::Camera, enabled)
    }

    async fn subscribe(&mut self) -> Result<TransportEventStream, Error> {
        let mut rx = self.room.event_ch.subscribe();
        let stream = async_stream::stream! {
            loop {
                match rx.recv().await {
                    Ok(event) => yield event,
                    Err(broadcast::error::RecvError::Closed) => break,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("loopback event subscriber skipped {n} events");
                    }
                };
            }
        };
        Ok(TransportEventStream(Box::pin(stream)))
    }

    fn is_connected(&self) -> bool {
        self.room.is_connected()
    }

    fn remote_participants(&self) -> Vec<Participant> {
        let inner = self.room.inner.read();
        if !inner.connected {
            return vec![];
        }
        inner.remote.values().copied().collect()
    }
}

#[cfg(test)]
mod test {
    use futures::StreamExt;
    use huddle::transport::{LocalTrack, Participant, TrackKind, Transport, TransportEventKind};

    use crate::{LoopbackRoom, Operation, TrackStatus};

    #[tokio::test]
    async fn roster_is_visible_only_while_connected() -> anyhow::Result<()> {
        let room = LoopbackRoom::default();
        let mut transport = room.transport();
        assert!(room.add_remote(7));
        assert!(!room.add_remote(7));
        assert!(!room.add_remote(crate::DEFAULT_LOCAL_ID));
        assert!(transport.remote_participants().is_empty());

        let local = transport.connect("A1", "room1", None).await?;
        assert_eq!(local, crate::DEFAULT_LOCAL_ID);
        assert_eq!(room.channel().as_deref(), Some("room1"));
        assert_eq!(transport.remote_participants(), vec![Participant::remote(7)]);

        room.add_remote(3);
        let ids: Vec<_> = transport.remote_participants().iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![7, 3]);

        transport.leave().await?;
        assert!(transport.remote_participants().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn membership_events_follow_the_room() -> anyhow::Result<()> {
        let room = LoopbackRoom::default();
        let mut transport = room.transport();
        let mut events = transport.subscribe().await?;
        assert_eq!(room.subscriber_count(), 1);

        // not connected yet, so nothing is delivered
        room.add_remote(9);
        transport.connect("A1", "room1", None).await?;
        room.remove_remote(9);
        room.drop_connection("network unreachable");

        assert_eq!(
            events.next().await,
            Some(TransportEventKind::ParticipantLeft {
                participant: Participant::remote(9)
            })
        );
        assert_eq!(
            events.next().await,
            Some(TransportEventKind::ConnectionLost {
                reason: "network unreachable".into()
            })
        );

        drop(events);
        assert_eq!(room.subscriber_count(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn injected_connect_failure_is_used_once() -> anyhow::Result<()> {
        let room = LoopbackRoom::default();
        let mut transport = room.transport();
        room.fail_next_connect("invalid token");

        assert!(transport.connect("A1", "room1", Some("t")).await.is_err());
        assert!(!transport.is_connected());
        transport.connect("A1", "room1", Some("t")).await?;
        assert!(transport.is_connected());
        assert_eq!(room.connect_calls(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn lagging_subscriber_keeps_receiving() -> anyhow::Result<()> {
        let room = LoopbackRoom::default();
        let mut transport = room.transport();
        let mut events = transport.subscribe().await?;

        for i in 0..1030 {
            room.emit(TransportEventKind::ConnectionLost {
                reason: i.to_string(),
            });
        }

        // the oldest six were overwritten; the stream resumes at the first retained event
        assert_eq!(
            events.next().await,
            Some(TransportEventKind::ConnectionLost { reason: "6".into() })
        );
        Ok(())
    }

    #[tokio::test]
    async fn unconfirmed_connect_holds_the_channel_until_leave() -> anyhow::Result<()> {
        let room = LoopbackRoom::default();
        let mut transport = room.transport();
        room.leave_next_connect_unconfirmed();

        transport.connect("A1", "room1", None).await?;
        assert!(!transport.is_connected());
        assert_eq!(room.channel().as_deref(), Some("room1"));
        assert!(transport.connect("A1", "room1", None).await.is_err());

        transport.leave().await?;
        transport.connect("A1", "room1", None).await?;
        assert!(transport.is_connected());
        Ok(())
    }

    #[tokio::test]
    async fn tracks_record_their_lifecycle() -> anyhow::Result<()> {
        let room = LoopbackRoom::default();
        let mut transport = room.transport();
        transport.connect("A1", "room1", None).await?;

        let mic = transport.acquire_microphone_track(false).await?;
        assert_eq!(room.tracks()[0].id(), mic.id());
        assert!(!mic.is_enabled());
        mic.set_enabled(true).await?;
        assert!(mic.is_enabled());
        transport.publish_tracks(&[mic.clone()]).await?;
        assert_eq!(room.published(), vec![TrackKind::Microphone]);

        mic.stop().await?;
        mic.close().await?;
        assert!(mic.set_enabled(false).await.is_err());
        assert_eq!(room.tracks()[0].status(), TrackStatus::Closed);

        assert_eq!(
            room.operations(),
            vec![
                Operation::Connect {
                    endpoint_id: "A1".into(),
                    channel_name: "room1".into(),
                    access_token: None,
                },
                Operation::AcquireTrack {
                    kind: TrackKind::Microphone,
                    enabled: false
                },
                Operation::SetTrackEnabled {
                    kind: TrackKind::Microphone,
                    enabled: true
                },
                Operation::Publish {
                    tracks: vec![TrackKind::Microphone]
                },
                Operation::StopTrack {
                    kind: TrackKind::Microphone
                },
                Operation::CloseTrack {
                    kind: TrackKind::Microphone
                },
            ]
        );
        Ok(())
    }
}
