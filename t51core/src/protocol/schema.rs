//! Declarative packet schema. `define_composite!` and `define_packets!` are the single
//! declaration site for everything the wire format needs: struct layout, size, and
//! (de)serialization. Adding a field or a packet means editing one macro invocation in
//! `packets.rs`, not four hand-kept tables.

/// Declares a fixed-layout value built out of other `WireValue`s. Used for field groups that
/// appear inside more than one packet (e.g. an input command), so the group is written and
/// read as a unit.
macro_rules! define_composite {
    ($name:ident { $( $field:ident : $ty:ty ),* $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq)]
        pub struct $name {
            $( pub $field: $ty ),*
        }

        impl $crate::protocol::wire::WireValue for $name {
            const WIRE_SIZE: usize = 0 $( + <$ty as $crate::protocol::wire::WireValue>::WIRE_SIZE )*;

            fn write_wire(&self, buf: &mut Vec<u8>) {
                $( self.$field.write_wire(buf); )*
            }

            fn read_wire(buf: &[u8], offset: &mut usize) -> $crate::protocol::wire::WireResult<Self> {
                $( let $field = <$ty as $crate::protocol::wire::WireValue>::read_wire(buf, offset)?; )*
                Ok($name { $( $field ),* })
            }
        }
    };
}

/// Declares the full packet set. Each packet gets a struct, an `ID` byte, a `WIRE_SIZE`
/// (including the id byte), and `serialize`/`deserialize_body` methods. The macro also emits
/// `PacketId`, `PACKET_COUNT`, and an `AnyPacket` enum covering every variant -- the two
/// lookup tables in `packets.rs` are built from these.
macro_rules! define_packets {
    ( $( $id:expr => $name:ident { $( $field:ident : $ty:ty ),* $(,)? } ),* $(,)? ) => {
        $(
            #[derive(Debug, Clone, PartialEq)]
            pub struct $name {
                $( pub $field: $ty ),*
            }

            impl $name {
                pub const ID: u8 = $id;
                pub const WIRE_SIZE: usize =
                    1 $( + <$ty as $crate::protocol::wire::WireValue>::WIRE_SIZE )*;

                pub fn serialize(&self, buf: &mut Vec<u8>) {
                    buf.push(Self::ID);
                    $( self.$field.write_wire(buf); )*
                }

                pub fn deserialize_body(
                    buf: &[u8],
                    offset: &mut usize,
                ) -> $crate::protocol::wire::WireResult<Self> {
                    $( let $field = <$ty as $crate::protocol::wire::WireValue>::read_wire(buf, offset)?; )*
                    Ok($name { $( $field ),* })
                }
            }
        )*

        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        #[repr(u8)]
        pub enum PacketId {
            $( $name = $id ),*
        }

        impl PacketId {
            pub fn from_u8(id: u8) -> Option<PacketId> {
                match id {
                    $( $id => Some(PacketId::$name), )*
                    _ => None,
                }
            }
        }

        pub const PACKET_COUNT: usize = 0usize $( + { const _UNUSED: u8 = $id; 1 } )*;

        /// A type-erased packet, tagged by variant. Used by the send path so a single
        /// `send_fn` table can serialize any packet kind without the caller matching on it.
        #[derive(Debug, Clone, PartialEq)]
        pub enum AnyPacket {
            $( $name($name) ),*
        }

        impl AnyPacket {
            pub fn id(&self) -> u8 {
                match self {
                    $( AnyPacket::$name(_) => $name::ID, )*
                }
            }

            pub fn serialize(&self, buf: &mut Vec<u8>) {
                match self {
                    $( AnyPacket::$name(p) => p.serialize(buf), )*
                }
            }
        }

        $(
            impl From<$name> for AnyPacket {
                fn from(p: $name) -> AnyPacket {
                    AnyPacket::$name(p)
                }
            }
        )*
    };
}

pub(crate) use define_composite;
pub(crate) use define_packets;
