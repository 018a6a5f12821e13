/// Index identifying a peer inside a host's peer table. Stable for the lifetime of the
/// connection; reused only after the corresponding Disconnect event has been observed.
pub type PeerId = usize;

/// An owned packet payload, as received off the wire. Ownership passes from the worker
/// thread to whichever code pops the event off the ring; past that point nothing else can
/// read it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub data: Vec<u8>,
}

impl Packet {
    pub fn new(data: Vec<u8>) -> Packet {
        Packet { data }
    }
}

/// The tagged union of events a host's worker thread can produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Connect { peer: PeerId, data: u32 },
    Disconnect { peer: PeerId, data: u32 },
    Receive {
        peer: PeerId,
        channel: u8,
        packet: Packet,
    },
}

impl Event {
    pub fn peer(&self) -> PeerId {
        match self {
            Event::Connect { peer, .. } => *peer,
            Event::Disconnect { peer, .. } => *peer,
            Event::Receive { peer, .. } => *peer,
        }
    }
}
