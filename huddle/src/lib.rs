pub mod sync {
    pub use parking_lot::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
    pub use std::sync::Arc;
}

pub mod error;
pub mod session;
pub mod transport;

/// Describes a transport implementation to the rest of the application
pub trait Extension {
    /// Returns an id of the extension. Should be the crate name (eg in a `huddle-transport-ext` format)
    fn id(&self) -> String;

    /// Returns the name of an extension
    fn name(&self) -> String;

    /// Returns the description of the extension
    fn description(&self) -> String {
        format!(
            "{} is an extension that is designed to be used as a call transport",
            self.name()
        )
    }
}
