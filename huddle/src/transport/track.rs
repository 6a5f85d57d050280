use std::sync::Arc;

use async_trait::async_trait;
use derive_more::Display;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Error;

#[derive(Debug, Display, Clone, Copy, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    #[display(fmt = "microphone")]
    Microphone,
    #[display(fmt = "camera")]
    Camera,
}

/// A locally captured audio or video stream.
///
/// A track holds an open capture device until it is stopped and closed.
/// `stop` ends capture, `close` releases the device. Callers must stop a
/// track before closing it.
#[async_trait]
pub trait LocalTrack: Send + Sync {
    fn id(&self) -> Uuid;

    fn kind(&self) -> TrackKind;

    fn is_enabled(&self) -> bool;

    /// Mutes or unmutes the track without releasing the device
    async fn set_enabled(&self, enabled: bool) -> Result<(), Error>;

    async fn stop(&self) -> Result<(), Error>;

    async fn close(&self) -> Result<(), Error>;
}

pub type SharedTrack = Arc<dyn LocalTrack>;
