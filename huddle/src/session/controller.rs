use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::{
    broadcast,
    mpsc::{self, UnboundedReceiver, UnboundedSender},
    oneshot,
};

use super::{
    ControllerConfig, HostPolicy, LocalDeviceState, SessionConfig, SessionEventKind,
    SessionEventStream, SessionState, TeardownStep,
};
use crate::{
    error::Error,
    sync::RwLock,
    transport::{
        Participant, ParticipantId, SharedTrack, TrackKind, Transport, TransportEventKind,
        TransportEventStream,
    },
};

#[derive(Debug, Clone, Copy)]
enum DeviceToggle {
    Set(bool),
    Flip,
}

#[derive(Debug)]
enum Cmd {
    Join {
        config: SessionConfig,
        rsp: oneshot::Sender<Result<(), Error>>,
    },
    Leave {
        rsp: oneshot::Sender<()>,
    },
    UpdateDevice {
        kind: TrackKind,
        toggle: DeviceToggle,
        rsp: oneshot::Sender<LocalDeviceState>,
    },
    ParticipantLeft {
        participant: Participant,
        rsp: oneshot::Sender<()>,
    },
    Shutdown {
        rsp: oneshot::Sender<()>,
    },
}

/// Everything the presentation layer may read about the session
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub devices: LocalDeviceState,
    pub config: SessionConfig,
    pub local_participant: Option<Participant>,
    pub remote_participants: Vec<Participant>,
    pub host_id: Option<ParticipantId>,
}

/// Handle to the session lifecycle controller.
///
/// The controller runs as a single task that owns the transport, the local
/// tracks and the session state. Commands and transport events are handled
/// one at a time, so at most one join or leave sequence is ever in flight.
/// The task stops once every handle is dropped or [`SessionController::shutdown`]
/// is called, leaving any active session first.
#[derive(Clone)]
pub struct SessionController {
    ch: UnboundedSender<Cmd>,
    snapshot: Arc<RwLock<SessionSnapshot>>,
    ui_event_ch: broadcast::Sender<SessionEventKind>,
}

impl SessionController {
    /// Takes ownership of `transport` and subscribes to its events for the
    /// lifetime of the controller.
    pub async fn new(
        mut transport: Box<dyn Transport>,
        config: ControllerConfig,
    ) -> Result<Self, Error> {
        tracing::debug!(transport = %transport.name(), "starting session controller");
        let events = transport.subscribe().await?;

        let (tx, cmd_rx) = mpsc::unbounded_channel();
        let (ui_event_ch, _rx) = broadcast::channel(config.event_capacity.max(1));
        let snapshot = Arc::new(RwLock::new(SessionSnapshot::default()));

        let session = Session {
            transport,
            host_policy: config.host,
            first_joiner: None,
            state: SessionState::Idle,
            devices: LocalDeviceState::default(),
            config: SessionConfig::default(),
            local: None,
            tracks: Vec::new(),
            snapshot: snapshot.clone(),
            ui_event_ch: ui_event_ch.clone(),
        };
        session.sync_snapshot();

        tokio::spawn(async move {
            run(session, events, cmd_rx).await;
        });

        Ok(Self {
            ch: tx,
            snapshot,
            ui_event_ch,
        })
    }

    /// The event stream notifies the UI of session related events
    pub fn subscribe(&self) -> SessionEventStream {
        let mut rx = self.ui_event_ch.subscribe();
        let stream = async_stream::stream! {
            loop {
                match rx.recv().await {
                    Ok(event) => yield event,
                    Err(broadcast::error::RecvError::Closed) => break,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("session event subscriber skipped {n} events");
                    }
                };
            }
        };
        SessionEventStream(Box::pin(stream))
    }

    /// Joins the session described by `config`. Resolves once the transport
    /// has connected, or has failed to.
    pub async fn request_join(&self, config: SessionConfig) -> Result<(), Error> {
        config.validate()?;
        let (tx, rx) = oneshot::channel();
        self.ch.send(Cmd::Join { config, rsp: tx })?;
        rx.await?
    }

    /// Leaves the current session. Does nothing if no session is active.
    pub async fn request_leave(&self) -> Result<(), Error> {
        let (tx, rx) = oneshot::channel();
        self.ch.send(Cmd::Leave { rsp: tx })?;
        rx.await?;
        Ok(())
    }

    pub async fn set_microphone_enabled(&self, enabled: bool) -> Result<LocalDeviceState, Error> {
        self.update_device(TrackKind::Microphone, DeviceToggle::Set(enabled))
            .await
    }

    pub async fn set_camera_enabled(&self, enabled: bool) -> Result<LocalDeviceState, Error> {
        self.update_device(TrackKind::Camera, DeviceToggle::Set(enabled))
            .await
    }

    pub async fn toggle_microphone(&self) -> Result<LocalDeviceState, Error> {
        self.update_device(TrackKind::Microphone, DeviceToggle::Flip)
            .await
    }

    pub async fn toggle_camera(&self) -> Result<LocalDeviceState, Error> {
        self.update_device(TrackKind::Camera, DeviceToggle::Flip)
            .await
    }

    /// Applies the host departure policy to `participant`. Transport events are
    /// routed here automatically; this entry point exists for callers that
    /// receive membership changes through another channel.
    pub async fn on_participant_left(&self, participant: Participant) -> Result<(), Error> {
        let (tx, rx) = oneshot::channel();
        self.ch.send(Cmd::ParticipantLeft {
            participant,
            rsp: tx,
        })?;
        rx.await?;
        Ok(())
    }

    /// Leaves any active session and stops the controller task.
    /// Every handle fails with [`Error::ControllerStopped`] afterwards.
    pub async fn shutdown(&self) -> Result<(), Error> {
        let (tx, rx) = oneshot::channel();
        self.ch.send(Cmd::Shutdown { rsp: tx })?;
        rx.await?;
        Ok(())
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.read().clone()
    }

    pub fn state(&self) -> SessionState {
        self.snapshot.read().state
    }

    pub fn devices(&self) -> LocalDeviceState {
        self.snapshot.read().devices
    }

    pub fn session_config(&self) -> SessionConfig {
        self.snapshot.read().config.clone()
    }

    pub fn local_participant(&self) -> Option<Participant> {
        self.snapshot.read().local_participant
    }

    pub fn remote_participants(&self) -> Vec<Participant> {
        self.snapshot.read().remote_participants.clone()
    }

    /// The host for the current session, if one is known
    pub fn host_id(&self) -> Option<ParticipantId> {
        self.snapshot.read().host_id
    }

    async fn update_device(
        &self,
        kind: TrackKind,
        toggle: DeviceToggle,
    ) -> Result<LocalDeviceState, Error> {
        let (tx, rx) = oneshot::channel();
        self.ch.send(Cmd::UpdateDevice {
            kind,
            toggle,
            rsp: tx,
        })?;
        Ok(rx.await?)
    }
}

struct Session {
    transport: Box<dyn Transport>,
    host_policy: HostPolicy,
    first_joiner: Option<ParticipantId>,
    state: SessionState,
    devices: LocalDeviceState,
    config: SessionConfig,
    local: Option<Participant>,
    tracks: Vec<SharedTrack>,
    snapshot: Arc<RwLock<SessionSnapshot>>,
    ui_event_ch: broadcast::Sender<SessionEventKind>,
}

impl Session {
    fn host_id(&self) -> Option<ParticipantId> {
        match self.host_policy {
            HostPolicy::Fixed(id) => Some(id),
            HostPolicy::FirstJoiner => self.first_joiner,
        }
    }

    fn emit(&self, event: SessionEventKind) {
        // no subscribers is not an error
        let _ = self.ui_event_ch.send(event);
    }

    fn remote_roster(&self) -> Vec<Participant> {
        let mut roster = self.transport.remote_participants();
        roster.retain(|p| !p.is_local);
        roster
    }

    fn sync_snapshot(&self) {
        let remote_participants = if self.state.is_idle() {
            vec![]
        } else {
            self.remote_roster()
        };
        *self.snapshot.write() = SessionSnapshot {
            state: self.state,
            devices: self.devices,
            config: self.config.clone(),
            local_participant: self.local,
            remote_participants,
            host_id: self.host_id(),
        };
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state == state {
            return;
        }
        tracing::debug!(from = %self.state, to = %state, "session state changed");
        self.state = state;
        self.sync_snapshot();
        self.emit(SessionEventKind::StateChanged { state });
    }

    #[tracing::instrument(skip_all, fields(endpoint = %config.endpoint_id, channel = %config.channel_name))]
    async fn join(&mut self, config: SessionConfig) -> Result<(), Error> {
        config.validate()?;
        if !self.state.is_idle() {
            tracing::debug!(state = %self.state, "tried to join while a session is in progress");
            return Err(Error::SessionAlreadyActive);
        }

        self.config = config;
        self.set_state(SessionState::Joining);

        let result = self
            .transport
            .connect(
                &self.config.endpoint_id,
                &self.config.channel_name,
                self.config.access_token(),
            )
            .await;

        let connected = match result {
            // never claim Connected without the transport agreeing
            Ok(id) if self.transport.is_connected() => Ok(id),
            Ok(_) => {
                if let Err(e) = self.transport.leave().await {
                    tracing::warn!("failed to release unconfirmed connection: {e}");
                }
                Err(Error::ConnectFailed(
                    "transport did not report an active connection".into(),
                ))
            }
            Err(e) => Err(e),
        };

        let local_id = match connected {
            Ok(id) => id,
            Err(e) => {
                let reason = match e {
                    Error::ConnectFailed(reason) => reason,
                    other => other.to_string(),
                };
                tracing::warn!("failed to join session: {reason}");
                self.config = SessionConfig::default();
                self.set_state(SessionState::Idle);
                self.emit(SessionEventKind::ConnectFailed {
                    reason: reason.clone(),
                });
                return Err(Error::ConnectFailed(reason));
            }
        };

        self.local = Some(Participant::local(local_id));
        if let HostPolicy::FirstJoiner = self.host_policy {
            self.first_joiner = self.remote_roster().first().map(|p| p.id);
        }

        self.acquire_tracks().await;
        if !self.tracks.is_empty() {
            if let Err(e) = self.transport.publish_tracks(&self.tracks).await {
                tracing::error!("failed to publish local tracks: {e}");
                for track in &self.tracks {
                    self.emit(SessionEventKind::TrackUnavailable {
                        kind: track.kind(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(local_id, "joined session");
        self.set_state(SessionState::Connected);
        Ok(())
    }

    async fn acquire_tracks(&mut self) {
        let microphone = self
            .transport
            .acquire_microphone_track(self.devices.microphone_enabled)
            .await;
        let camera = self
            .transport
            .acquire_camera_track(self.devices.camera_enabled)
            .await;

        for (kind, track) in [
            (TrackKind::Microphone, microphone),
            (TrackKind::Camera, camera),
        ] {
            match track {
                Ok(track) => {
                    tracing::debug!(%kind, id = %track.id(), "acquired local track");
                    self.tracks.push(track)
                }
                Err(e) => {
                    tracing::warn!("continuing without {kind} track: {e}");
                    self.emit(SessionEventKind::TrackUnavailable {
                        kind,
                        reason: e.to_string(),
                    });
                }
            }
        }
    }

    /// Stops and closes every local track, leaves the transport and clears the
    /// session. Every step runs even when an earlier one fails.
    async fn leave(&mut self) {
        if !self.state.is_active() {
            tracing::debug!(state = %self.state, "leave requested with no active session");
            return;
        }
        self.set_state(SessionState::Leaving);

        let tracks = std::mem::take(&mut self.tracks);
        for track in &tracks {
            if let Err(e) = track.stop().await {
                self.teardown_failed(TeardownStep::StopTrack, e);
            }
        }
        for track in &tracks {
            if let Err(e) = track.close().await {
                self.teardown_failed(TeardownStep::CloseTrack, e);
            }
        }
        drop(tracks);

        if let Err(e) = self.transport.leave().await {
            self.teardown_failed(TeardownStep::Leave, e);
        }

        self.config = SessionConfig::default();
        self.devices = LocalDeviceState::default();
        self.local = None;
        self.first_joiner = None;
        self.emit(SessionEventKind::DevicesChanged {
            devices: self.devices,
        });
        self.set_state(SessionState::Idle);
        tracing::info!("call ended and session cleared");
    }

    fn teardown_failed(&self, step: TeardownStep, error: Error) {
        tracing::warn!(%step, "teardown step failed: {error}");
        self.emit(SessionEventKind::TeardownFailed {
            step,
            reason: error.to_string(),
        });
    }

    async fn update_device(&mut self, kind: TrackKind, toggle: DeviceToggle) -> LocalDeviceState {
        let current = match kind {
            TrackKind::Microphone => &mut self.devices.microphone_enabled,
            TrackKind::Camera => &mut self.devices.camera_enabled,
        };
        let enabled = match toggle {
            DeviceToggle::Set(enabled) => enabled,
            DeviceToggle::Flip => !*current,
        };
        *current = enabled;

        if let Some(track) = self.tracks.iter().find(|track| track.kind() == kind) {
            if let Err(e) = track.set_enabled(enabled).await {
                tracing::warn!("failed to apply {kind} toggle to track: {e}");
            }
        }

        tracing::debug!(%kind, enabled, "device toggled");
        self.sync_snapshot();
        self.emit(SessionEventKind::DevicesChanged {
            devices: self.devices,
        });
        self.devices
    }

    fn on_participant_joined(&mut self, participant: Participant) {
        if participant.is_local {
            return;
        }
        if let HostPolicy::FirstJoiner = self.host_policy {
            if self.first_joiner.is_none() && self.state.is_active() {
                tracing::debug!(host_id = participant.id, "first remote participant is host");
                self.first_joiner = Some(participant.id);
            }
        }
        self.sync_snapshot();
        self.emit(SessionEventKind::ParticipantJoined { participant });
    }

    async fn on_participant_left(&mut self, participant: Participant) {
        if participant.is_local {
            return;
        }
        tracing::debug!(id = participant.id, "participant left");
        self.sync_snapshot();
        self.emit(SessionEventKind::ParticipantLeft { participant });

        // Idle and Leaving both mean the session is already over
        if !self.state.is_active() {
            return;
        }
        if let Some(host_id) = self.host_id() {
            if host_id == participant.id {
                tracing::info!(host_id, "host has left the call, ending session");
                self.emit(SessionEventKind::HostEndedSession { host_id });
                self.leave().await;
            }
        }
    }

    async fn on_connection_lost(&mut self, reason: String) {
        if !self.state.is_active() {
            return;
        }
        tracing::warn!("transport connection lost: {reason}");
        self.emit(SessionEventKind::ConnectionLost { reason });
        self.leave().await;
    }

    async fn handle_transport_event(&mut self, event: TransportEventKind) {
        match event {
            TransportEventKind::ParticipantJoined { participant } => {
                self.on_participant_joined(participant)
            }
            TransportEventKind::ParticipantLeft { participant } => {
                self.on_participant_left(participant).await
            }
            TransportEventKind::ConnectionLost { reason } => self.on_connection_lost(reason).await,
        }
    }
}

async fn run(
    mut session: Session,
    mut events: TransportEventStream,
    mut cmd_rx: UnboundedReceiver<Cmd>,
) {
    let mut events_open = true;

    loop {
        tokio::select! {
            opt = cmd_rx.recv() => {
                let cmd = match opt {
                    Some(r) => r,
                    None => {
                        tracing::debug!("session controller cmd_rx channel is closed. quitting");
                        break;
                    }
                };
                match cmd {
                    Cmd::Join { config, rsp } => {
                        let r = session.join(config).await;
                        let _ = rsp.send(r);
                    }
                    Cmd::Leave { rsp } => {
                        session.leave().await;
                        let _ = rsp.send(());
                    }
                    Cmd::UpdateDevice { kind, toggle, rsp } => {
                        let devices = session.update_device(kind, toggle).await;
                        let _ = rsp.send(devices);
                    }
                    Cmd::ParticipantLeft { participant, rsp } => {
                        session.on_participant_left(participant).await;
                        let _ = rsp.send(());
                    }
                    Cmd::Shutdown { rsp } => {
                        cmd_rx.close();
                        session.leave().await;
                        let _ = rsp.send(());
                        break;
                    }
                }
            }
            opt = events.next(), if events_open => {
                match opt {
                    Some(event) => session.handle_transport_event(event).await,
                    None => {
                        tracing::warn!("transport event stream closed");
                        events_open = false;
                    }
                }
            }
        }
    }

    // release anything still held before the subscription goes away
    session.leave().await;
    drop(events);
    tracing::debug!("session controller stopped");
}
