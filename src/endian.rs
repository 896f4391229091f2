//! Unaligned big-endian loads/stores over byte slices.
//!
//! Every multi-byte field read out of a BGP or MRT buffer goes through here rather
//! than through a struct overlay: the wire buffers handed to this crate are
//! attacker-controlled and never guaranteed to be aligned, so a direct `&T` cast
//! over untrusted bytes (as the C implementation this crate replaces relies on)
//! is undefined behavior in Rust. The teacher (`bgpkit-parser`) reaches for
//! `zerocopy::big_endian::{U16, U32}` wherever the surrounding bytes are a fixed,
//! compile-time-known struct (see its `mrt_header.rs`); this crate does the same
//! for fixed headers and falls back to the helpers below for the data-dependent
//! TPA walk, where no single struct layout applies.

use zerocopy::byteorder::big_endian::{U16 as BeU16, U32 as BeU32, U64 as BeU64};
use zerocopy::FromBytes;

/// Reads a big-endian `u16` out of `buf[0..2]`. Panics if `buf.len() < 2`; callers
/// are expected to bounds-check against the framing length before calling.
#[inline]
pub fn read_u16(buf: &[u8]) -> u16 {
    BeU16::read_from_bytes(&buf[..2]).unwrap().get()
}

/// Reads a big-endian `u32` out of `buf[0..4]`.
#[inline]
pub fn read_u32(buf: &[u8]) -> u32 {
    BeU32::read_from_bytes(&buf[..4]).unwrap().get()
}

/// Reads a big-endian `u64` out of `buf[0..8]`.
#[inline]
pub fn read_u64(buf: &[u8]) -> u64 {
    BeU64::read_from_bytes(&buf[..8]).unwrap().get()
}

/// Writes `v` as big-endian into `buf[0..2]`.
#[inline]
pub fn write_u16(buf: &mut [u8], v: u16) {
    buf[..2].copy_from_slice(&v.to_be_bytes());
}

/// Writes `v` as big-endian into `buf[0..4]`.
#[inline]
pub fn write_u32(buf: &mut [u8], v: u32) {
    buf[..4].copy_from_slice(&v.to_be_bytes());
}

/// Tries to read a big-endian `u16`, returning `None` instead of panicking when
/// `buf` is short. Used at TPA/attribute boundaries where shortness is an
/// expected (if malformed) input rather than a caller bug.
#[inline]
pub fn try_read_u16(buf: &[u8]) -> Option<u16> {
    if buf.len() < 2 {
        return None;
    }
    Some(read_u16(buf))
}

#[inline]
pub fn try_read_u32(buf: &[u8]) -> Option<u32> {
    if buf.len() < 4 {
        return None;
    }
    Some(read_u32(buf))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_u16() {
        let mut buf = [0u8; 2];
        write_u16(&mut buf, 0xBEEF);
        assert_eq!(read_u16(&buf), 0xBEEF);
    }

    #[test]
    fn roundtrip_u32() {
        let mut buf = [0u8; 4];
        write_u32(&mut buf, 0xDEAD_BEEF);
        assert_eq!(read_u32(&buf), 0xDEAD_BEEF);
    }

    #[test]
    fn short_reads_are_none() {
        assert_eq!(try_read_u16(&[1]), None);
        assert_eq!(try_read_u32(&[1, 2, 3]), None);
    }
}
