use derive_more::Display;
use serde::{Deserialize, Serialize};

#[derive(Default, Debug, Display, Clone, Copy, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    #[default]
    #[display(fmt = "idle")]
    Idle,
    #[display(fmt = "joining")]
    Joining,
    #[display(fmt = "connected")]
    Connected,
    #[display(fmt = "leaving")]
    Leaving,
}

impl SessionState {
    pub fn is_idle(&self) -> bool {
        matches!(self, SessionState::Idle)
    }

    /// Joining or Connected. Only an active session can be left
    pub fn is_active(&self) -> bool {
        matches!(self, SessionState::Joining | SessionState::Connected)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalDeviceState {
    pub microphone_enabled: bool,
    pub camera_enabled: bool,
}

impl Default for LocalDeviceState {
    fn default() -> Self {
        Self {
            microphone_enabled: true,
            camera_enabled: true,
        }
    }
}

impl std::fmt::Display for LocalDeviceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "microphone: {}, camera: {}",
            on_off(self.microphone_enabled),
            on_off(self.camera_enabled)
        )
    }
}

fn on_off(enabled: bool) -> &'static str {
    if enabled {
        "on"
    } else {
        "off"
    }
}
