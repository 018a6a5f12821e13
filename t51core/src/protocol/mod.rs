//! Binary packet codec and dispatch, built from a single schema declaration (`packets.rs`).

pub mod dispatch;
pub mod packets;
pub mod schema;
pub mod wire;

pub use dispatch::{dispatch_buffer, dispatch_fn_table, DispatchFn, PacketHandler};
pub use packets::{AnyPacket, PacketId, PACKET_COUNT};
pub use wire::{WireResult, WireValue};
