//! The canonical packet set. This is the single declaration site: every field, on every
//! packet, is declared here once and nowhere else.

use crate::protocol::schema::{define_composite, define_packets};

define_composite!(InputCommand {
    tick_number: u64,
    axis_x: i32,
    axis_y: i32,
});

define_packets! {
    0 => CSPlayerJoinRequest {},
    1 => SCPlayerJoinResponse {
        success: u8,
        player_id: u32,
        world_l: i32,
        world_w: i32,
        spawn_x: f32,
        spawn_y: f32,
    },
    2 => CSPlayerInputSnapshot {
        input_command: InputCommand,
    },
    3 => SCPlayerStateSnapshot {
        tick_number: u64,
        x_pos: f32,
        y_pos: f32,
    },
    4 => SCPlayerCreate {
        player_id: u32,
        spawn_x: f32,
        spawn_y: f32,
    },
    5 => CSTowerBuildRequest {
        x_pos: f32,
        y_pos: f32,
        tower_def_index: u32,
    },
    6 => SCTowerCreate {
        x_pos: f32,
        y_pos: f32,
        tower_def_index: u32,
        tower_id: u32,
    },
}

/// `send_fn[id]`: serializes an `AnyPacket` into `buf`. Each entry is a distinct adapter for
/// its own packet id; callers index the table by `pkt.id()` (see `adapter::server`/
/// `adapter::client`) so the wire bytes for a given id are always produced by that id's own
/// adapter rather than by a shared dispatch-on-variant path.
pub type SendFn = fn(&AnyPacket, &mut Vec<u8>);

fn send_cs_player_join_request(pkt: &AnyPacket, buf: &mut Vec<u8>) {
    if let AnyPacket::CSPlayerJoinRequest(p) = pkt {
        p.serialize(buf);
    }
}

fn send_sc_player_join_response(pkt: &AnyPacket, buf: &mut Vec<u8>) {
    if let AnyPacket::SCPlayerJoinResponse(p) = pkt {
        p.serialize(buf);
    }
}

fn send_cs_player_input_snapshot(pkt: &AnyPacket, buf: &mut Vec<u8>) {
    if let AnyPacket::CSPlayerInputSnapshot(p) = pkt {
        p.serialize(buf);
    }
}

fn send_sc_player_state_snapshot(pkt: &AnyPacket, buf: &mut Vec<u8>) {
    if let AnyPacket::SCPlayerStateSnapshot(p) = pkt {
        p.serialize(buf);
    }
}

fn send_sc_player_create(pkt: &AnyPacket, buf: &mut Vec<u8>) {
    if let AnyPacket::SCPlayerCreate(p) = pkt {
        p.serialize(buf);
    }
}

fn send_cs_tower_build_request(pkt: &AnyPacket, buf: &mut Vec<u8>) {
    if let AnyPacket::CSTowerBuildRequest(p) = pkt {
        p.serialize(buf);
    }
}

fn send_sc_tower_create(pkt: &AnyPacket, buf: &mut Vec<u8>) {
    if let AnyPacket::SCTowerCreate(p) = pkt {
        p.serialize(buf);
    }
}

/// Builds `send_fn[PACKET_COUNT]`, one genuine per-id adapter per slot, indexed the same way
/// `dispatch_fn_table` is indexed on the receive side.
pub fn send_fn_table() -> [SendFn; PACKET_COUNT] {
    [
        send_cs_player_join_request,
        send_sc_player_join_response,
        send_cs_player_input_snapshot,
        send_sc_player_state_snapshot,
        send_sc_player_create,
        send_cs_tower_build_request,
        send_sc_tower_create,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_snapshot_wire_size_is_seventeen() {
        assert_eq!(CSPlayerInputSnapshot::WIRE_SIZE, 17);
    }

    #[test]
    fn codec_round_trip_matches_known_byte_layout() {
        let pkt = CSPlayerInputSnapshot {
            input_command: InputCommand {
                tick_number: 0x0102030405060708,
                axis_x: -1,
                axis_y: 1,
            },
        };

        let mut buf = Vec::new();
        pkt.serialize(&mut buf);

        assert_eq!(
            buf,
            vec![
                CSPlayerInputSnapshot::ID,
                0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08,
                0xFF, 0xFF, 0xFF, 0xFF,
                0x00, 0x00, 0x00, 0x01,
            ]
        );

        let mut offset = 1;
        let decoded = CSPlayerInputSnapshot::deserialize_body(&buf, &mut offset).unwrap();
        assert_eq!(decoded, pkt);
        assert_eq!(offset, buf.len());
    }

    #[test]
    fn packet_count_matches_declared_set() {
        assert_eq!(PACKET_COUNT, 7);
    }

    #[test]
    fn packet_id_from_u8_rejects_out_of_range() {
        assert!(PacketId::from_u8(6).is_some());
        assert!(PacketId::from_u8(7).is_none());
    }

    #[test]
    fn empty_packet_wire_size_is_one() {
        assert_eq!(CSPlayerJoinRequest::WIRE_SIZE, 1);
    }

    #[test]
    fn send_fn_table_has_one_entry_per_packet() {
        assert_eq!(send_fn_table().len(), PACKET_COUNT);
    }

    #[test]
    fn send_fn_table_entry_matches_the_packet_its_id_names() {
        let table = send_fn_table();
        let pkt: AnyPacket = CSTowerBuildRequest {
            x_pos: 1.0,
            y_pos: 2.0,
            tower_def_index: 3,
        }
        .into();

        let mut buf = Vec::new();
        table[pkt.id() as usize](&pkt, &mut buf);

        let mut expected = Vec::new();
        pkt.serialize(&mut expected);
        assert_eq!(buf, expected);
    }

    #[test]
    fn send_fn_table_entry_ignores_a_mismatched_variant() {
        let table = send_fn_table();
        let pkt: AnyPacket = CSPlayerJoinRequest {}.into();

        let mut buf = Vec::new();
        table[SCTowerCreate::ID as usize](&pkt, &mut buf);
        assert!(buf.is_empty());
    }

    #[test]
    fn any_packet_serializes_through_its_own_variant() {
        let pkt: AnyPacket = SCTowerCreate {
            x_pos: 1.0,
            y_pos: 2.0,
            tower_def_index: 3,
            tower_id: 4,
        }
        .into();

        assert_eq!(pkt.id(), SCTowerCreate::ID);

        let mut buf = Vec::new();
        pkt.serialize(&mut buf);
        assert_eq!(buf.len(), SCTowerCreate::WIRE_SIZE);
    }
}
