//! Client-side network adapter. Simpler than the server's: one server peer, a connected
//! boolean, and send routines that refuse to queue while disconnected.

use super::channel_for;
use crate::net::{Event, Host, PeerId, SendFlags};
use crate::protocol::dispatch::{dispatch_buffer, DispatchFn, PacketHandler};
use crate::protocol::packets::{send_fn_table, AnyPacket, PACKET_COUNT};
use log::warn;

#[derive(Debug)]
pub struct NotConnected;

pub struct ClientAdapter {
    server_peer: Option<PeerId>,
    connected: bool,
}

impl ClientAdapter {
    pub fn new() -> ClientAdapter {
        ClientAdapter {
            server_peer: None,
            connected: false,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// `Host::client_connect` blocks until it observes the host's one Connect event and pops
    /// it off the ring itself, so `network_tick` never sees it to drive `on_connect` through
    /// the usual path. Callers invoke this once, right after `client_connect` returns
    /// successfully, using `Host::server_peer` as the peer id.
    pub fn mark_connected(&mut self, peer: PeerId) {
        self.on_connect(peer);
    }

    fn on_connect(&mut self, peer: PeerId) {
        self.server_peer = Some(peer);
        self.connected = true;
    }

    fn on_disconnect(&mut self, peer: PeerId) {
        if self.server_peer == Some(peer) {
            self.server_peer = None;
            self.connected = false;
        }
    }

    /// Refuses to queue while disconnected so callers don't have to check `is_connected`
    /// themselves before every send.
    pub fn send(&self, host: &Host, flags: SendFlags, pkt: &AnyPacket) -> Result<(), NotConnected> {
        let peer = self.server_peer.filter(|_| self.connected).ok_or(NotConnected)?;
        let mut buf = Vec::new();
        send_fn_table()[pkt.id() as usize](pkt, &mut buf);
        if host.send(peer, channel_for(flags), flags, buf).is_err() {
            warn!("send to server failed, packet not queued");
        }
        Ok(())
    }
}

impl Default for ClientAdapter {
    fn default() -> ClientAdapter {
        ClientAdapter::new()
    }
}

/// Drains the host's event ring, updating `adapter`'s connection state and invoking
/// `on_connect`/`on_disconnect` callbacks, then walking Receive events through `dispatch_fn`.
pub fn network_tick<H, FC, FD>(
    adapter: &mut ClientAdapter,
    host: &Host,
    handler: &mut H,
    table: &[DispatchFn<H>; PACKET_COUNT],
    mut on_connect: FC,
    mut on_disconnect: FD,
) where
    H: PacketHandler,
    FC: FnMut(PeerId),
    FD: FnMut(PeerId),
{
    while let Some(event) = host.check_events() {
        match event {
            Event::Connect { peer, .. } => {
                adapter.on_connect(peer);
                on_connect(peer);
            }
            Event::Disconnect { peer, .. } => {
                adapter.on_disconnect(peer);
                on_disconnect(peer);
            }
            Event::Receive { peer, packet, .. } => {
                dispatch_buffer(&packet.data, peer, handler, table);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::{HostConfig, Role};

    fn test_host() -> Host {
        Host::create(HostConfig::client("127.0.0.1:1".parse().unwrap(), 2)).unwrap()
    }

    #[test]
    fn send_while_disconnected_is_refused() {
        let adapter = ClientAdapter::new();
        let host = test_host();
        let pkt: AnyPacket = crate::protocol::packets::CSPlayerJoinRequest {}.into();

        assert!(adapter.send(&host, SendFlags::Reliable, &pkt).is_err());
    }

    #[test]
    fn send_after_connect_is_allowed() {
        let mut adapter = ClientAdapter::new();
        adapter.on_connect(0);
        assert!(adapter.is_connected());

        let host = test_host();
        let pkt: AnyPacket = crate::protocol::packets::CSPlayerJoinRequest {}.into();
        assert!(adapter.send(&host, SendFlags::Reliable, &pkt).is_ok());
    }

    #[test]
    fn disconnect_for_a_different_peer_is_ignored() {
        let mut adapter = ClientAdapter::new();
        adapter.on_connect(5);
        adapter.on_disconnect(6);
        assert!(adapter.is_connected());
    }

    #[test]
    fn role_is_reported_as_client() {
        let config = HostConfig::client("127.0.0.1:1".parse().unwrap(), 2);
        assert_eq!(config.role, Role::Client);
    }
}
