//! Reliable-UDP transport: a non-blocking host with a background worker thread, events
//! flowing to the game thread over an `SpscRing`.

pub mod error;
pub mod event;
pub mod host;

pub use error::{Error, Result};
pub use event::{Event, Packet, PeerId};
pub use host::{Host, HostConfig, HostLifecycle, Role, SendFlags};
