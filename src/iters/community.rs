//! Community iteration (spec §4.3): plain (4-byte), extended (8-byte), and
//! large (12-byte) communities, yielded as raw uninterpreted words — "no
//! semantic interpretation is done at this layer".
//!
//! Grounded on the teacher's `Community`/`ExtendedCommunity`/`LargeCommunity`
//! wire shapes (`models/bgp/community.rs`) for the encodings, though this
//! layer deliberately stops short of the teacher's semantic decoding (well
//! known community names, extended community sub-type dispatch): that
//! belongs to `COMMTCH`'s constant pool (§ vm/commmatch.rs), not here.

use crate::error::ParserError;
use crate::message::attrs::{AttrIter, AttrKind, RawAttr};
use crate::message::Message;
use crate::report;
use num_enum::TryFromPrimitive;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommunityWord {
    Plain([u8; 4]),
    Extended([u8; 8]),
    Large([u8; 12]),
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

fn chunk_words<const N: usize>(
    value: &[u8],
    wrap: impl Fn([u8; N]) -> CommunityWord,
) -> Result<Vec<CommunityWord>, ParserError> {
    if value.len() % N != 0 {
        return Err(report!(ParserError::TruncatedAttribute));
    }
    Ok(value
        .chunks_exact(N)
        .map(|c| {
            let mut a = [0u8; N];
            a.copy_from_slice(c);
            wrap(a)
        })
        .collect())
}

/// Every community word attached to the message, in COMMUNITY, then
/// EXTENDED_COMMUNITY, then LARGE_COMMUNITY order.
pub fn iterate_communities(msg: &Message<'_>) -> Result<Vec<CommunityWord>, ParserError> {
    let tpa = msg.tpa()?;
    let mut out = Vec::new();
    if let Some(v) = attr_value(tpa, msg, AttrKind::Community, 8)? {
        out.extend(chunk_words::<4>(v, CommunityWord::Plain)?);
    }
    if let Some(v) = attr_value(tpa, msg, AttrKind::ExtendedCommunity, 16)? {
        out.extend(chunk_words::<8>(v, CommunityWord::Extended)?);
    }
    if let Some(v) = attr_value(tpa, msg, AttrKind::LargeCommunity, 32)? {
        out.extend(chunk_words::<12>(v, CommunityWord::Large)?);
    }
    Ok(out)
}

/// Well-known plain-community values (RFC 1997/8092), typed so a caller can
/// name one in a match arm or print it, grounded on the full
/// `BGP_COMMUNITY_*` catalog in `original_source/lonetix/include/df/bgp/bgp.h`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u32)]
pub enum WellKnownCommunity {
    PlannedShut = 0xFFFF_0000,
    AcceptOwn = 0xFFFF_0001,
    RouteFilterTranslatedV4 = 0xFFFF_0002,
    RouteFilterV4 = 0xFFFF_0003,
    RouteFilterTranslatedV6 = 0xFFFF_0004,
    RouteFilterV6 = 0xFFFF_0005,
    LlgrStale = 0xFFFF_0006,
    NoLlgr = 0xFFFF_0007,
    AcceptOwnNexthop = 0xFFFF_0008,
    StandbyPe = 0xFFFF_0009,
    Blackhole = 0xFFFF_029A,
    NoExport = 0xFFFF_FF01,
    NoAdvertise = 0xFFFF_FF02,
    NoExportSubconfed = 0xFFFF_FF03,
    NoPeer = 0xFFFF_FF04,
}

impl WellKnownCommunity {
    pub const fn to_bytes(self) -> [u8; 4] {
        (self as u32).to_be_bytes()
    }
}

impl std::fmt::Display for WellKnownCommunity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            WellKnownCommunity::PlannedShut => "planned-shut",
            WellKnownCommunity::AcceptOwn => "accept-own",
            WellKnownCommunity::RouteFilterTranslatedV4 => "route-filter-translated-v4",
            WellKnownCommunity::RouteFilterV4 => "route-filter-v4",
            WellKnownCommunity::RouteFilterTranslatedV6 => "route-filter-translated-v6",
            WellKnownCommunity::RouteFilterV6 => "route-filter-v6",
            WellKnownCommunity::LlgrStale => "llgr-stale",
            WellKnownCommunity::NoLlgr => "no-llgr",
            WellKnownCommunity::AcceptOwnNexthop => "accept-own-nexthop",
            WellKnownCommunity::StandbyPe => "standby-pe",
            WellKnownCommunity::Blackhole => "blackhole",
            WellKnownCommunity::NoExport => "no-export",
            WellKnownCommunity::NoAdvertise => "no-advertise",
            WellKnownCommunity::NoExportSubconfed => "no-export-subconfed",
            WellKnownCommunity::NoPeer => "no-peer",
        };
        f.write_str(name)
    }
}

/// Wire-width byte constants for `COMMTCH` constant pools, one per
/// [`WellKnownCommunity`] variant.
pub mod well_known {
    use super::WellKnownCommunity as W;

    pub const PLANNED_SHUT: [u8; 4] = W::PlannedShut.to_bytes();
    pub const ACCEPT_OWN: [u8; 4] = W::AcceptOwn.to_bytes();
    pub const ROUTE_FILTER_TRANSLATED_V4: [u8; 4] = W::RouteFilterTranslatedV4.to_bytes();
    pub const ROUTE_FILTER_V4: [u8; 4] = W::RouteFilterV4.to_bytes();
    pub const ROUTE_FILTER_TRANSLATED_V6: [u8; 4] = W::RouteFilterTranslatedV6.to_bytes();
    pub const ROUTE_FILTER_V6: [u8; 4] = W::RouteFilterV6.to_bytes();
    pub const LLGR_STALE: [u8; 4] = W::LlgrStale.to_bytes();
    pub const NO_LLGR: [u8; 4] = W::NoLlgr.to_bytes();
    pub const ACCEPT_OWN_NEXTHOP: [u8; 4] = W::AcceptOwnNexthop.to_bytes();
    pub const STANDBY_PE: [u8; 4] = W::StandbyPe.to_bytes();
    pub const BLACKHOLE: [u8; 4] = W::Blackhole.to_bytes();
    pub const NO_EXPORT: [u8; 4] = W::NoExport.to_bytes();
    pub const NO_ADVERTISE: [u8; 4] = W::NoAdvertise.to_bytes();
    pub const NO_EXPORT_SUBCONFED: [u8; 4] = W::NoExportSubconfed.to_bytes();
    pub const NO_PEER: [u8; 4] = W::NoPeer.to_bytes();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MsgFlags;

    fn update_with_attr(code: u8, value: &[u8]) -> Vec<u8> {
        let mut attr = vec![0xC0, code, value.len() as u8];
        attr.extend_from_slice(value);
        let mut body = Vec::new();
        body.extend_from_slice(&[0x00, 0x00]);
        body.extend_from_slice(&(attr.len() as u16).to_be_bytes());
        body.extend_from_slice(&attr);
        let mut msg = vec![0xFFu8; 16];
        let total = 19 + body.len();
        msg.extend_from_slice(&(total as u16).to_be_bytes());
        msg.push(0x02);
        msg.extend_from_slice(&body);
        msg
    }

    #[test]
    fn plain_communities_chunked() {
        let bytes = update_with_attr(8, &well_known::NO_EXPORT);
        let msg = Message::from_buffer(&bytes, MsgFlags::empty()).unwrap();
        let words = iterate_communities(&msg).unwrap();
        assert_eq!(words, vec![CommunityWord::Plain(well_known::NO_EXPORT)]);
    }

    #[test]
    fn well_known_bytes_round_trip_and_display() {
        assert_eq!(well_known::NO_PEER, WellKnownCommunity::NoPeer.to_bytes());
        let parsed = WellKnownCommunity::try_from(u32::from_be_bytes(well_known::BLACKHOLE)).unwrap();
        assert_eq!(parsed, WellKnownCommunity::Blackhole);
        assert_eq!(parsed.to_string(), "blackhole");
    }
}
