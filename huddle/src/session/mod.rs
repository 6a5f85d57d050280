//! Session lifecycle: joining and leaving a call, toggling local devices and
//! ending the session when the host departs.
//!
//! ```text
//! Idle --request_join--> Joining --connected--> Connected
//!  ^                        |                       |
//!  |                  connect failed          request_leave / host left / connection lost
//!  |                        v                       v
//!  +------------------------+<------------------ Leaving
//! ```
mod config;
mod controller;
mod event;
mod state;

pub use config::*;
pub use controller::{SessionController, SessionSnapshot};
pub use event::*;
pub use state::*;
