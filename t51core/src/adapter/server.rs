//! Server-side network adapter. Maintains a dense array of sessions up to `max_sessions` and
//! a peer→session `HashMap` instead of a raw pointer stashed on the peer: it is attached
//! synchronously inside `on_connect`, before `network_tick` can dispatch a Receive event for
//! that same peer, and read only by this adapter and its caller's handlers.

use super::channel_for;
use crate::net::{Event, Host, PeerId, SendFlags};
use crate::protocol::dispatch::{dispatch_buffer, DispatchFn, PacketHandler};
use crate::protocol::packets::{send_fn_table, AnyPacket, PACKET_COUNT};
use hashbrown::HashMap;
use log::{debug, warn};

pub type SessionId = u32;

const DISCONNECT_REASON_FULL: u32 = 0;

struct Session {
    id: SessionId,
    peer: PeerId,
}

pub struct ServerAdapter {
    sessions: Vec<Session>,
    peer_to_session: HashMap<PeerId, SessionId>,
    max_sessions: usize,
    next_session_id: SessionId,
}

impl ServerAdapter {
    pub fn new(max_sessions: usize) -> ServerAdapter {
        ServerAdapter {
            sessions: Vec::with_capacity(max_sessions),
            peer_to_session: HashMap::new(),
            max_sessions,
            next_session_id: 0,
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn session_of(&self, peer: PeerId) -> Option<SessionId> {
        self.peer_to_session.get(&peer).copied()
    }

    pub fn peer_of(&self, session: SessionId) -> Option<PeerId> {
        self.sessions.iter().find(|s| s.id == session).map(|s| s.peer)
    }

    /// If the table is full, gracefully disconnects the new peer with reason 0 and admits
    /// nothing. Otherwise allocates a monotonically increasing session id and attaches it to
    /// the peer slot before returning.
    fn on_connect(&mut self, host: &Host, peer: PeerId) -> Option<SessionId> {
        if self.sessions.len() >= self.max_sessions {
            warn!("session table full ({}), disconnecting peer {}", self.max_sessions, peer);
            let _ = host.disconnect_later(peer, DISCONNECT_REASON_FULL);
            return None;
        }

        let id = self.next_session_id;
        self.next_session_id = self.next_session_id.wrapping_add(1);
        self.sessions.push(Session { id, peer });
        self.peer_to_session.insert(peer, id);
        debug!("peer {} admitted as session {}", peer, id);
        Some(id)
    }

    /// Swap-removes the session (last element into the gap) and drops the peer slot. Returns
    /// the session id that was removed, if the peer had one.
    fn on_disconnect(&mut self, peer: PeerId) -> Option<SessionId> {
        let session = self.peer_to_session.remove(&peer)?;
        if let Some(index) = self.sessions.iter().position(|s| s.peer == peer) {
            self.sessions.swap_remove(index);
        }
        debug!("peer {} (session {}) disconnected", peer, session);
        Some(session)
    }

    /// Sends one packet to a single session by id. A buffer is allocated, `send_fn[pkt.id()]`
    /// writes id + fields into it, and it is handed to the host; on queue failure the buffer is
    /// simply dropped since nothing else retained a reference to it.
    pub fn send(&self, host: &Host, session: SessionId, flags: SendFlags, pkt: &AnyPacket) {
        if let Some(peer) = self.peer_of(session) {
            let mut buf = Vec::new();
            send_fn_table()[pkt.id() as usize](pkt, &mut buf);
            if host.send(peer, channel_for(flags), flags, buf).is_err() {
                warn!("send to session {} failed, packet not queued", session);
            }
        }
    }

    pub fn broadcast(&self, host: &Host, flags: SendFlags, pkt: &AnyPacket) {
        let mut buf = Vec::new();
        send_fn_table()[pkt.id() as usize](pkt, &mut buf);
        if host.broadcast(channel_for(flags), flags, buf).is_err() {
            warn!("broadcast failed, packet not queued");
        }
    }
}

/// Drains the host's event ring. Connect/Disconnect are routed through the adapter's own
/// session bookkeeping and then through the caller's `on_connect`/`on_disconnect` callbacks
/// (so the server binary can create/destroy the associated player); Receive events walk their
/// concatenated packets through `dispatch_buffer`.
pub fn network_tick<H, FC, FD>(
    adapter: &mut ServerAdapter,
    host: &Host,
    handler: &mut H,
    table: &[DispatchFn<H>; PACKET_COUNT],
    mut on_connect: FC,
    mut on_disconnect: FD,
) where
    H: PacketHandler,
    FC: FnMut(SessionId, PeerId),
    FD: FnMut(SessionId),
{
    while let Some(event) = host.check_events() {
        match event {
            Event::Connect { peer, .. } => {
                if let Some(session) = adapter.on_connect(host, peer) {
                    on_connect(session, peer);
                }
            }
            Event::Disconnect { peer, .. } => {
                if let Some(session) = adapter.on_disconnect(peer) {
                    on_disconnect(session);
                }
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
    use crate::net::HostConfig;

    fn test_host() -> Host {
        Host::create(HostConfig::server("127.0.0.1:0".parse().unwrap(), 8, 2)).unwrap()
    }

    #[test]
    fn connect_allocates_monotonic_session_ids() {
        let mut adapter = ServerAdapter::new(2);
        let host = test_host();

        let s0 = adapter.on_connect(&host, 0).unwrap();
        let s1 = adapter.on_connect(&host, 1).unwrap();
        assert_eq!(s0, 0);
        assert_eq!(s1, 1);
        assert_eq!(adapter.session_count(), 2);
        assert_eq!(adapter.session_of(0), Some(0));

        host.destroy();
    }

    #[test]
    fn connect_beyond_capacity_is_refused() {
        let mut adapter = ServerAdapter::new(1);
        let host = test_host();

        assert!(adapter.on_connect(&host, 0).is_some());
        assert!(adapter.on_connect(&host, 1).is_none());
        assert_eq!(adapter.session_count(), 1);

        host.destroy();
    }

    #[test]
    fn disconnect_swap_removes_the_session() {
        let mut adapter = ServerAdapter::new(4);
        let host = test_host();

        adapter.on_connect(&host, 0);
        adapter.on_connect(&host, 1);
        adapter.on_connect(&host, 2);

        let removed = adapter.on_disconnect(0).unwrap();
        assert_eq!(removed, 0);
        assert_eq!(adapter.session_count(), 2);
        assert!(adapter.session_of(0).is_none());
        assert!(adapter.session_of(1).is_some());
        assert!(adapter.session_of(2).is_some());

        host.destroy();
    }
}
