use std::time::Duration;

use futures::StreamExt;
use huddle::session::{
    ControllerConfig, SessionConfig, SessionController, SessionEventKind, SessionEventStream,
    SessionState,
};
use huddle_loopback::LoopbackRoom;

pub const HOST_ID: u32 = 12345;

#[allow(dead_code)]
pub async fn create_controller(
    config: ControllerConfig,
) -> anyhow::Result<(SessionController, LoopbackRoom)> {
    let room = LoopbackRoom::default();
    let controller = SessionController::new(Box::new(room.transport()), config).await?;
    Ok((controller, room))
}

/// Controller already connected to "room1" with [`HOST_ID`] present as a remote participant
#[allow(dead_code)]
pub async fn connected_controller() -> anyhow::Result<(SessionController, LoopbackRoom)> {
    let (controller, room) = create_controller(ControllerConfig::default()).await?;
    room.add_remote(HOST_ID);
    controller
        .request_join(SessionConfig::new("A1", "room1"))
        .await?;
    assert_eq!(controller.state(), SessionState::Connected);
    Ok((controller, room))
}

/// Waits for the first event accepted by `f`
#[allow(dead_code)]
pub async fn wait_for_event<F>(
    stream: &mut SessionEventStream,
    f: F,
) -> anyhow::Result<SessionEventKind>
where
    F: Fn(&SessionEventKind) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match stream.next().await {
                Some(event) if f(&event) => return Ok(event),
                Some(_) => continue,
                None => anyhow::bail!("session event stream closed"),
            }
        }
    })
    .await?
}

#[allow(dead_code)]
pub async fn wait_for_state(
    stream: &mut SessionEventStream,
    state: SessionState,
) -> anyhow::Result<()> {
    wait_for_event(stream, |event| {
        matches!(event, SessionEventKind::StateChanged { state: s } if *s == state)
    })
    .await?;
    Ok(())
}

/// Polls `f` until it holds
#[allow(dead_code)]
pub async fn eventually<F>(f: F) -> anyhow::Result<()>
where
    F: Fn() -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        while !f() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await?;
    Ok(())
}

/// Gives the controller a moment to process anything still queued
#[allow(dead_code)]
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}
