//! Primitive wire encoding: big-endian, two's-complement, IEEE 754 reinterpreted as same-width
//! unsigned ints. No padding, no alignment, no self-describing tags -- correctness depends on
//! both ends sharing the same schema (see `schema.rs`).

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io;

pub type WireResult<T> = io::Result<T>;

/// Checks that `len` bytes are available at `offset` before a read, matching the "short
/// buffer" protocol error kind.
#[inline]
fn check_len(buf: &[u8], offset: usize, len: usize) -> WireResult<()> {
    if offset + len > buf.len() {
        Err(io::ErrorKind::UnexpectedEof.into())
    } else {
        Ok(())
    }
}

/// A type serializable to/from the wire format. Implemented for every primitive;
/// `schema.rs`'s `define_composite!`/`define_packets!` macros implement it for generated
/// composite and packet types by concatenating field-wise.
pub trait WireValue: Sized {
    const WIRE_SIZE: usize;

    fn write_wire(&self, buf: &mut Vec<u8>);
    fn read_wire(buf: &[u8], offset: &mut usize) -> WireResult<Self>;
}

impl WireValue for u8 {
    const WIRE_SIZE: usize = 1;

    fn write_wire(&self, buf: &mut Vec<u8>) {
        buf.push(*self);
    }

    fn read_wire(buf: &[u8], offset: &mut usize) -> WireResult<Self> {
        check_len(buf, *offset, 1)?;
        let v = buf[*offset];
        *offset += 1;
        Ok(v)
    }
}

impl WireValue for i8 {
    const WIRE_SIZE: usize = 1;

    fn write_wire(&self, buf: &mut Vec<u8>) {
        buf.push(*self as u8);
    }

    fn read_wire(buf: &[u8], offset: &mut usize) -> WireResult<Self> {
        check_len(buf, *offset, 1)?;
        let v = buf[*offset] as i8;
        *offset += 1;
        Ok(v)
    }
}

macro_rules! impl_wire_value {
    ($ty:ty, $size:expr, $write_fn:ident, $read_fn:ident) => {
        impl WireValue for $ty {
            const WIRE_SIZE: usize = $size;

            fn write_wire(&self, buf: &mut Vec<u8>) {
                buf.$write_fn::<BigEndian>(*self)
                    .expect("writes into a Vec<u8> never fail");
            }

            fn read_wire(buf: &[u8], offset: &mut usize) -> WireResult<Self> {
                check_len(buf, *offset, $size)?;
                let mut slice = &buf[*offset..*offset + $size];
                let v = slice.$read_fn::<BigEndian>()?;
                *offset += $size;
                Ok(v)
            }
        }
    };
}

impl_wire_value!(u16, 2, write_u16, read_u16);
impl_wire_value!(u32, 4, write_u32, read_u32);
impl_wire_value!(u64, 8, write_u64, read_u64);
impl_wire_value!(i16, 2, write_i16, read_i16);
impl_wire_value!(i32, 4, write_i32, read_i32);
impl_wire_value!(i64, 8, write_i64, read_i64);
impl_wire_value!(f32, 4, write_f32, read_f32);
impl_wire_value!(f64, 8, write_f64, read_f64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn u64_round_trip_big_endian() {
        let mut buf = Vec::new();
        0x0102030405060708u64.write_wire(&mut buf);
        assert_eq!(buf, vec![0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08]);

        let mut off = 0;
        assert_eq!(u64::read_wire(&buf, &mut off).unwrap(), 0x0102030405060708);
        assert_eq!(off, 8);
    }

    #[test]
    fn i32_negative_one_is_all_ones() {
        let mut buf = Vec::new();
        (-1i32).write_wire(&mut buf);
        assert_eq!(buf, vec![0xFF, 0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn short_buffer_errors() {
        let buf = [0u8; 2];
        let mut off = 0;
        assert!(u32::read_wire(&buf, &mut off).is_err());
    }
}
