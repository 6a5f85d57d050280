use serde::{Deserialize, Serialize};

use crate::{error::Error, transport::ParticipantId};

/// Participant id treated as host when nothing else is configured
pub const DEFAULT_HOST_ID: ParticipantId = 12345;

/// Connection details collected from the user.
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub endpoint_id: String,
    pub channel_name: String,
    #[serde(default)]
    pub access_token: Option<String>,
}

impl SessionConfig {
    pub fn new(endpoint_id: impl Into<String>, channel_name: impl Into<String>) -> Self {
        Self {
            endpoint_id: endpoint_id.into(),
            channel_name: channel_name.into(),
            access_token: None,
        }
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    /// Both the endpoint id and the channel name must be present before joining
    pub fn validate(&self) -> Result<(), Error> {
        if self.endpoint_id.is_empty() {
            return Err(Error::EndpointIdMissing);
        }
        if self.channel_name.is_empty() {
            return Err(Error::ChannelNameMissing);
        }
        Ok(())
    }

    /// An empty token is the same as no token
    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref().filter(|token| !token.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.endpoint_id.is_empty() && self.channel_name.is_empty() && self.access_token.is_none()
    }
}

/// Decides which remote participant is the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostPolicy {
    /// The host is always the participant with this id
    Fixed(ParticipantId),
    /// The first remote participant seen after connecting is the host
    FirstJoiner,
}

impl Default for HostPolicy {
    fn default() -> Self {
        HostPolicy::Fixed(DEFAULT_HOST_ID)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub host: HostPolicy,
    /// Capacity of the session event channel. Slow subscribers skip events past this
    pub event_capacity: usize,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            host: HostPolicy::default(),
            event_capacity: 1024,
        }
    }
}

impl ControllerConfig {
    pub fn with_host_id(mut self, id: ParticipantId) -> Self {
        self.host = HostPolicy::Fixed(id);
        self
    }
}
