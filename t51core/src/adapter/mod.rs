//! Role-specific network adapters sitting above a `Host`. Each adapter classifies host events
//! and feeds received bytes into the packet dispatcher; the per-role `network_tick` function
//! is the shared draining routine both client and server build on.

pub mod client;
pub mod server;

pub use client::ClientAdapter;
pub use server::{ServerAdapter, SessionId};

use crate::net::SendFlags;

const RELIABLE_CHANNEL: u8 = 0;
const UNRELIABLE_CHANNEL: u8 = 1;

/// Reliable traffic (join, create, tower-create) rides channel 0; everything else
/// (input/state snapshots) rides the unreliable channel.
fn channel_for(flags: SendFlags) -> u8 {
    match flags {
        SendFlags::Reliable => RELIABLE_CHANNEL,
        SendFlags::Unsequenced | SendFlags::UnreliableFragment => UNRELIABLE_CHANNEL,
    }
}
