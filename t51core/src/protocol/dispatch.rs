//! Packet dispatch: walks a (possibly multi-packet) buffer, deserializing and invoking one
//! `PacketHandler` method per packet. `dispatch_fn_table` builds the `dispatch_fn[PACKET_COUNT]`
//! table, generic over whatever role-specific context implements `PacketHandler`.

use crate::net::PeerId;
use crate::protocol::packets::*;
use crate::protocol::wire::WireResult;

/// Implemented once per role (server session context, client session context). Unexpected
/// packets for a role are still dispatchable -- the handler just logs and ignores them -- so
/// a single generic dispatch table covers both roles.
pub trait PacketHandler {
    fn handle_cs_player_join_request(&mut self, pkt: &CSPlayerJoinRequest, peer: PeerId);
    fn handle_sc_player_join_response(&mut self, pkt: &SCPlayerJoinResponse, peer: PeerId);
    fn handle_cs_player_input_snapshot(&mut self, pkt: &CSPlayerInputSnapshot, peer: PeerId);
    fn handle_sc_player_state_snapshot(&mut self, pkt: &SCPlayerStateSnapshot, peer: PeerId);
    fn handle_sc_player_create(&mut self, pkt: &SCPlayerCreate, peer: PeerId);
    fn handle_cs_tower_build_request(&mut self, pkt: &CSTowerBuildRequest, peer: PeerId);
    fn handle_sc_tower_create(&mut self, pkt: &SCTowerCreate, peer: PeerId);
}

/// `dispatch_fn[id]`: deserializes one packet body (the id byte has already been consumed by
/// the caller) and invokes the matching handler method.
pub type DispatchFn<H> = fn(&[u8], &mut usize, PeerId, &mut H) -> WireResult<()>;

fn dispatch_cs_player_join_request<H: PacketHandler>(
    buf: &[u8],
    offset: &mut usize,
    peer: PeerId,
    handler: &mut H,
) -> WireResult<()> {
    let pkt = CSPlayerJoinRequest::deserialize_body(buf, offset)?;
    handler.handle_cs_player_join_request(&pkt, peer);
    Ok(())
}

fn dispatch_sc_player_join_response<H: PacketHandler>(
    buf: &[u8],
    offset: &mut usize,
    peer: PeerId,
    handler: &mut H,
) -> WireResult<()> {
    let pkt = SCPlayerJoinResponse::deserialize_body(buf, offset)?;
    handler.handle_sc_player_join_response(&pkt, peer);
    Ok(())
}

fn dispatch_cs_player_input_snapshot<H: PacketHandler>(
    buf: &[u8],
    offset: &mut usize,
    peer: PeerId,
    handler: &mut H,
) -> WireResult<()> {
    let pkt = CSPlayerInputSnapshot::deserialize_body(buf, offset)?;
    handler.handle_cs_player_input_snapshot(&pkt, peer);
    Ok(())
}

fn dispatch_sc_player_state_snapshot<H: PacketHandler>(
    buf: &[u8],
    offset: &mut usize,
    peer: PeerId,
    handler: &mut H,
) -> WireResult<()> {
    let pkt = SCPlayerStateSnapshot::deserialize_body(buf, offset)?;
    handler.handle_sc_player_state_snapshot(&pkt, peer);
    Ok(())
}

fn dispatch_sc_player_create<H: PacketHandler>(
    buf: &[u8],
    offset: &mut usize,
    peer: PeerId,
    handler: &mut H,
) -> WireResult<()> {
    let pkt = SCPlayerCreate::deserialize_body(buf, offset)?;
    handler.handle_sc_player_create(&pkt, peer);
    Ok(())
}

fn dispatch_cs_tower_build_request<H: PacketHandler>(
    buf: &[u8],
    offset: &mut usize,
    peer: PeerId,
    handler: &mut H,
) -> WireResult<()> {
    let pkt = CSTowerBuildRequest::deserialize_body(buf, offset)?;
    handler.handle_cs_tower_build_request(&pkt, peer);
    Ok(())
}

fn dispatch_sc_tower_create<H: PacketHandler>(
    buf: &[u8],
    offset: &mut usize,
    peer: PeerId,
    handler: &mut H,
) -> WireResult<()> {
    let pkt = SCTowerCreate::deserialize_body(buf, offset)?;
    handler.handle_sc_tower_create(&pkt, peer);
    Ok(())
}

/// Builds `dispatch_fn[PACKET_COUNT]`, indexed by packet id, for a given handler type.
pub fn dispatch_fn_table<H: PacketHandler>() -> [DispatchFn<H>; PACKET_COUNT] {
    [
        dispatch_cs_player_join_request::<H>,
        dispatch_sc_player_join_response::<H>,
        dispatch_cs_player_input_snapshot::<H>,
        dispatch_sc_player_state_snapshot::<H>,
        dispatch_sc_player_create::<H>,
        dispatch_cs_tower_build_request::<H>,
        dispatch_sc_tower_create::<H>,
    ]
}

/// Walks `buf`, reading one id byte at a time and invoking the matching `dispatch_fn` entry,
/// until the buffer is consumed. An id `>= PACKET_COUNT` discards the remainder and logs a
/// warning, matching the multi-packet-datagram contract.
pub fn dispatch_buffer<H: PacketHandler>(
    buf: &[u8],
    peer: PeerId,
    handler: &mut H,
    table: &[DispatchFn<H>; PACKET_COUNT],
) {
    let mut offset = 0;
    while offset < buf.len() {
        let id = buf[offset];
        if id as usize >= PACKET_COUNT {
            log::warn!(
                "dropping {} trailing byte(s) after unknown packet id {} from peer {}",
                buf.len() - offset,
                id,
                peer
            );
            return;
        }
        offset += 1;

        if let Err(err) = table[id as usize](buf, &mut offset, peer, handler) {
            log::warn!(
                "dropping malformed packet (id {}) from peer {}: {}",
                id,
                peer,
                err
            );
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingHandler {
        join_requests: Vec<PeerId>,
        input_snapshots: Vec<(PeerId, CSPlayerInputSnapshot)>,
        tower_build_requests: Vec<(PeerId, CSTowerBuildRequest)>,
    }

    impl PacketHandler for RecordingHandler {
        fn handle_cs_player_join_request(&mut self, _pkt: &CSPlayerJoinRequest, peer: PeerId) {
            self.join_requests.push(peer);
        }
        fn handle_sc_player_join_response(&mut self, _pkt: &SCPlayerJoinResponse, _peer: PeerId) {}
        fn handle_cs_player_input_snapshot(&mut self, pkt: &CSPlayerInputSnapshot, peer: PeerId) {
            self.input_snapshots.push((peer, pkt.clone()));
        }
        fn handle_sc_player_state_snapshot(&mut self, _pkt: &SCPlayerStateSnapshot, _peer: PeerId) {}
        fn handle_sc_player_create(&mut self, _pkt: &SCPlayerCreate, _peer: PeerId) {}
        fn handle_cs_tower_build_request(&mut self, pkt: &CSTowerBuildRequest, peer: PeerId) {
            self.tower_build_requests.push((peer, pkt.clone()));
        }
        fn handle_sc_tower_create(&mut self, _pkt: &SCTowerCreate, _peer: PeerId) {}
    }

    #[test]
    fn dispatcher_walks_concatenated_packets_in_order() {
        let join = CSPlayerJoinRequest {};
        let input = CSPlayerInputSnapshot {
            input_command: InputCommand {
                tick_number: 0x0102030405060708,
                axis_x: -1,
                axis_y: 1,
            },
        };

        let mut buf = Vec::new();
        join.serialize(&mut buf);
        input.serialize(&mut buf);

        let table = dispatch_fn_table::<RecordingHandler>();
        let mut handler = RecordingHandler::default();
        dispatch_buffer(&buf, 7, &mut handler, &table);

        assert_eq!(handler.join_requests, vec![7]);
        assert_eq!(handler.input_snapshots, vec![(7, input)]);
    }

    #[test]
    fn dispatcher_drops_remainder_on_unknown_id() {
        let buf = vec![PACKET_COUNT as u8, 0xAA, 0xBB];
        let table = dispatch_fn_table::<RecordingHandler>();
        let mut handler = RecordingHandler::default();
        dispatch_buffer(&buf, 1, &mut handler, &table);

        assert!(handler.join_requests.is_empty());
        assert!(handler.tower_build_requests.is_empty());
    }

    #[test]
    fn all_dispatch_fn_entries_are_populated() {
        let table = dispatch_fn_table::<RecordingHandler>();
        assert_eq!(table.len(), PACKET_COUNT);
    }
}
