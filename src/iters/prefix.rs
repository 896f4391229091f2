//! MP prefix iteration (spec §4.3): every NLRI reachable from an UPDATE,
//! across WITHDRAWN, NLRI, MP_REACH, and MP_UNREACH, in that wire order
//! (the order `PFXMTCH` short-circuits over, spec §4.5).
//!
//! Grounded on the teacher's `attr_14_15_nlri.rs` for the MP_REACH/MP_UNREACH
//! next-hop-then-NLRI layout.

use crate::afi::{Afi, Safi};
use crate::endian::{read_u16, try_read_u16};
use crate::error::ParserError;
use crate::message::attrs::{AttrIter, AttrKind, RawAttr};
use crate::message::{Message, MsgFlags};
use crate::report;

/// One NLRI entry, regardless of which field it was found in.
#[derive(Debug, Clone, Copy)]
pub struct Prefix<'a> {
    pub afi: Afi,
    pub safi: Safi,
    pub width_bits: u8,
    pub bytes: &'a [u8],
    pub path_id: Option<u32>,
}

/// Which field a [`Prefix`] was pulled from, used by `PFXMTCH`'s documented
/// iteration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefixSource {
    Withdrawn,
    Nlri,
    MpReach,
    MpUnreach,
}

fn parse_v4_field<'a>(
    field: &'a [u8],
    add_path: bool,
    source: PrefixSource,
) -> Result<Vec<(PrefixSource, Prefix<'a>)>, ParserError> {
    let mut out = Vec::new();
    let mut cursor = 0usize;
    while cursor < field.len() {
        let path_id = if add_path {
            let pid = try_read_u32_at(field, cursor)?;
            cursor += 4;
            Some(pid)
        } else {
            None
        };
        let width = *field
            .get(cursor)
            .ok_or_else(|| report!(ParserError::TruncatedPrefix))?;
        if width > 32 {
            return Err(report!(ParserError::BadPrefixWidth(width)));
        }
        let byte_len = width.div_ceil(8) as usize;
        let bytes = field
            .get(cursor + 1..cursor + 1 + byte_len)
            .ok_or_else(|| report!(ParserError::TruncatedPrefix))?;
        out.push((
            source,
            Prefix {
                afi: Afi::Ipv4,
                safi: Safi::Unicast,
                width_bits: width,
                bytes,
                path_id,
            },
        ));
        cursor += 1 + byte_len;
    }
    Ok(out)
}

fn try_read_u32_at(buf: &[u8], at: usize) -> Result<u32, ParserError> {
    buf.get(at..at + 4)
        .and_then(try_read_u32_slice)
        .ok_or_else(|| report!(ParserError::TruncatedPrefix))
}

fn try_read_u32_slice(b: &[u8]) -> Option<u32> {
    Some(crate::endian::read_u32(b))
}

fn parse_mp_nlri<'a>(
    value: &'a [u8],
    source: PrefixSource,
    add_path: bool,
) -> Result<Vec<(PrefixSource, Prefix<'a>)>, ParserError> {
    let afi_raw = try_read_u16(value).ok_or_else(|| report!(ParserError::TruncatedAttribute))?;
    let afi = Afi::from_wire(afi_raw)?;
    let safi_raw = *value.get(2).ok_or_else(|| report!(ParserError::TruncatedAttribute))?;
    let safi = Safi::from_wire(safi_raw)?;

    let (prefixes_field, max_width) = match source {
        PrefixSource::MpReach => {
            let nh_len = *value.get(3).ok_or_else(|| report!(ParserError::TruncatedAttribute))? as usize;
            let after_nh = value
                .get(4 + nh_len..)
                .ok_or_else(|| report!(ParserError::TruncatedAttribute))?;
            // one reserved byte (RFC 4760 §5)
            let rest = after_nh
                .get(1..)
                .ok_or_else(|| report!(ParserError::TruncatedAttribute))?;
            (rest, afi.max_width())
        }
        PrefixSource::MpUnreach => (&value[3..], afi.max_width()),
        _ => unreachable!(),
    };

    let mut out = Vec::new();
    let mut cursor = 0usize;
    while cursor < prefixes_field.len() {
        let path_id = if add_path {
            let pid = try_read_u32_at(prefixes_field, cursor)?;
            cursor += 4;
            Some(pid)
        } else {
            None
        };
        let width = *prefixes_field
            .get(cursor)
            .ok_or_else(|| report!(ParserError::TruncatedPrefix))?;
        if width > max_width {
            return Err(report!(ParserError::BadPrefixWidth(width)));
        }
        let byte_len = width.div_ceil(8) as usize;
        let bytes = prefixes_field
            .get(cursor + 1..cursor + 1 + byte_len)
            .ok_or_else(|| report!(ParserError::TruncatedPrefix))?;
        out.push((
            source,
            Prefix {
                afi,
                safi,
                width_bits: width,
                bytes,
                path_id,
            },
        ));
        cursor += 1 + byte_len;
    }
    if cursor != prefixes_field.len() {
        return Err(report!(ParserError::TruncatedPrefix));
    }
    Ok(out)
}

fn attr_value<'a>(tpa: &'a [u8], msg: &Message<'_>, kind: AttrKind, code: u8) -> Result<Option<&'a [u8]>, ParserError> {
    if let Some(offset) = msg.attrs().offset_of(tpa, kind)? {
        for raw in AttrIter::new(&tpa[offset as usize..]) {
            let raw: RawAttr = raw?;
            if raw.code == code {
                return Ok(Some(raw.value));
            }
            break;
        }
    }
    Ok(None)
}

/// Collects every prefix in wire/spec order: WITHDRAWN, NLRI, MP_REACH,
/// MP_UNREACH. Eager rather than a lazy cursor since all four fields must be
/// fully decoded to detect truncation regardless of how many the caller
/// consumes; `PFXMTCH`'s short-circuit just stops folding over this Vec early.
pub fn iterate_prefixes<'a>(msg: &'a Message<'a>) -> Result<Vec<(PrefixSource, Prefix<'a>)>, ParserError> {
    let add_path = msg.flags().contains(MsgFlags::ADD_PATH);
    let mut out = Vec::new();
    out.extend(parse_v4_field(msg.withdrawn()?, add_path, PrefixSource::Withdrawn)?);
    out.extend(parse_v4_field(msg.nlri()?, add_path, PrefixSource::Nlri)?);

    let tpa = msg.tpa()?;
    if let Some(v) = attr_value(tpa, msg, AttrKind::MpReach, 14)? {
        out.extend(parse_mp_nlri(v, PrefixSource::MpReach, add_path)?);
    }
    if let Some(v) = attr_value(tpa, msg, AttrKind::MpUnreach, 15)? {
        out.extend(parse_mp_nlri(v, PrefixSource::MpUnreach, add_path)?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MsgFlags;

    fn update_with_nlri(nlri: &[u8]) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&[0x00, 0x00]); // withdrawn len = 0
        body.extend_from_slice(&[0x00, 0x00]); // TPA len = 0
        body.extend_from_slice(nlri);
        let mut msg = vec![0xFFu8; 16];
        let total = 19 + body.len();
        msg.extend_from_slice(&(total as u16).to_be_bytes());
        msg.push(0x02); // UPDATE
        msg.extend_from_slice(&body);
        msg
    }

    #[test]
    fn add_path_v4_nlri_yields_once() {
        let mut nlri = Vec::new();
        nlri.extend_from_slice(&7u32.to_be_bytes()); // path id
        nlri.push(24); // width
        nlri.extend_from_slice(&[10, 0, 0]);
        let bytes = update_with_nlri(&nlri);
        let msg = Message::from_buffer(&bytes, MsgFlags::ADD_PATH).unwrap();
        let prefixes = iterate_prefixes(&msg).unwrap();
        assert_eq!(prefixes.len(), 1);
        let (source, p) = prefixes[0];
        assert_eq!(source, PrefixSource::Nlri);
        assert_eq!(p.width_bits, 24);
        assert_eq!(p.bytes, &[10, 0, 0]);
        assert_eq!(p.path_id, Some(7));
    }

    #[test]
    fn width_33_is_rejected() {
        let mut nlri = Vec::new();
        nlri.push(33);
        nlri.extend_from_slice(&[10, 0, 0, 0]);
        let bytes = update_with_nlri(&nlri);
        let msg = Message::from_buffer(&bytes, MsgFlags::empty()).unwrap();
        let err = iterate_prefixes(&msg).unwrap_err();
        assert!(matches!(err, ParserError::BadPrefixWidth(33)));
    }

    #[test]
    fn width_zero_is_valid() {
        let nlri = [0u8];
        let bytes = update_with_nlri(&nlri);
        let msg = Message::from_buffer(&bytes, MsgFlags::empty()).unwrap();
        let prefixes = iterate_prefixes(&msg).unwrap();
        assert_eq!(prefixes[0].1.width_bits, 0);
        assert_eq!(prefixes[0].1.bytes, &[] as &[u8]);
    }
}
