//! MRT record framing and MRT-to-BGP message reconstruction (spec §4.4).
//!
//! Grounded on the teacher's `parser/mrt/mrt_header.rs` (record header
//! layout, including the `BGP4MP_ET` extended-timestamp variant carried over
//! as a SPEC_FULL.md §7 supplement) and `parser/mrt/messages/table_dump_v2`
//! for the PEER_INDEX_TABLE / RIB_* subtype catalog.

use crate::afi::Afi;
use crate::endian::{read_u16, read_u32};
use crate::error::ParserError;
use crate::message::attrs::{AttrIter, RawAttr};
use crate::message::{Message, MsgFlags};
use crate::report;
use num_enum::TryFromPrimitive;

pub const MRT_HEADER_LEN: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u16)]
pub enum MrtType {
    TableDump = 12,
    TableDumpV2 = 13,
    Bgp4Mp = 16,
    /// Extended-timestamp variant (SPEC_FULL.md §7 supplement): same body
    /// shape as [`MrtType::Bgp4Mp`], with 4 extra microsecond bytes between
    /// the 12-byte header and the payload. Not in spec.md's source but
    /// present throughout real-world archives (BGPKIT's among them).
    Bgp4MpEt = 17,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u16)]
pub enum TableDumpV2Subtype {
    PeerIndexTable = 1,
    RibIpv4Unicast = 2,
    RibIpv4Multicast = 3,
    RibIpv6Unicast = 4,
    RibIpv6Multicast = 5,
    RibGeneric = 6,
    /// Not handled: no counterpart geo-location record type.
    GeoPeerTable = 7,
    RibIpv4UnicastAddPath = 8,
    RibIpv4MulticastAddPath = 9,
    RibIpv6UnicastAddPath = 10,
    RibIpv6MulticastAddPath = 11,
    RibGenericAddPath = 12,
}

impl TableDumpV2Subtype {
    /// True for the five subtypes this crate can reconstruct into BGP
    /// UPDATEs: the four AFI-specific RIB subtypes (ADD_PATH or not) and
    /// RIB_GENERIC. `GEO_PEER_TABLE` carries no routing information and has
    /// no reconstruction counterpart.
    pub fn is_rib(&self) -> bool {
        !matches!(self, TableDumpV2Subtype::PeerIndexTable | TableDumpV2Subtype::GeoPeerTable)
    }

    /// True for the ADD_PATH-carrying variants, where each RIB_ENTRY gains a
    /// 4-byte path identifier ahead of its attribute length (RFC 7911).
    pub fn is_add_path(&self) -> bool {
        matches!(
            self,
            TableDumpV2Subtype::RibIpv4UnicastAddPath
                | TableDumpV2Subtype::RibIpv4MulticastAddPath
                | TableDumpV2Subtype::RibIpv6UnicastAddPath
                | TableDumpV2Subtype::RibIpv6MulticastAddPath
                | TableDumpV2Subtype::RibGenericAddPath
        )
    }

    /// AFI implied by an AFI-specific subtype (`None` for `RIB_GENERIC`,
    /// whose AFI is instead carried per-record).
    pub fn implied_afi(&self) -> Option<Afi> {
        match self {
            TableDumpV2Subtype::RibIpv4Unicast
            | TableDumpV2Subtype::RibIpv4Multicast
            | TableDumpV2Subtype::RibIpv4UnicastAddPath
            | TableDumpV2Subtype::RibIpv4MulticastAddPath => Some(Afi::Ipv4),
            TableDumpV2Subtype::RibIpv6Unicast
            | TableDumpV2Subtype::RibIpv6Multicast
            | TableDumpV2Subtype::RibIpv6UnicastAddPath
            | TableDumpV2Subtype::RibIpv6MulticastAddPath => Some(Afi::Ipv6),
            _ => None,
        }
    }
}

/// TABLE_DUMP (v1, RFC 6396 §4.2) subtype: which address family the record's
/// fixed-width prefix/peer-address fields use. Unlike TABLE_DUMPV2, v1 has no
/// RIB_GENERIC escape hatch or ADD_PATH variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u16)]
pub enum TableDumpSubtype {
    AfiIpv4 = 1,
    AfiIpv6 = 2,
}

impl TableDumpSubtype {
    pub fn afi(&self) -> Afi {
        match self {
            TableDumpSubtype::AfiIpv4 => Afi::Ipv4,
            TableDumpSubtype::AfiIpv6 => Afi::Ipv6,
        }
    }
}

/// One legacy TABLE_DUMP record (RFC 6396 §4.2): a single full RIB row, no
/// PEER_INDEX_TABLE indirection and no ADD_PATH, capped at a 2-byte peer AS.
pub struct TableDumpRow<'a> {
    pub view_number: u16,
    pub sequence_number: u16,
    pub prefix_bytes: &'a [u8],
    pub prefix_width: u8,
    pub peer_ip_bytes: &'a [u8],
    pub peer_as: u16,
    pub originated_time: u32,
    pub attrs: &'a [u8],
}

impl<'a> TableDumpRow<'a> {
    pub fn to_entry(&self, afi: Afi) -> RibEntry<'a> {
        RibEntry {
            afi,
            prefix_bytes: self.prefix_bytes,
            prefix_width: self.prefix_width,
            path_id: None,
            attrs: self.attrs,
        }
    }
}

/// Parses a TABLE_DUMP (v1) record body, per `subtype`'s implied address
/// family.
pub fn parse_table_dump_row(body: &[u8], subtype: TableDumpSubtype) -> Result<TableDumpRow<'_>, ParserError> {
    let view_number = try_u16(body, 0)?;
    let sequence_number = try_u16(body, 2)?;

    let addr_len = if subtype.afi() == Afi::Ipv6 { 16 } else { 4 };
    let prefix_bytes = body.get(4..4 + addr_len).ok_or_else(|| report!(ParserError::TruncatedMrt))?;
    let mut pos = 4 + addr_len;

    let prefix_width = *body.get(pos).ok_or_else(|| report!(ParserError::TruncatedMrt))?;
    pos += 1;
    // status byte: ignored, RFC 6396 says it's always 1 in practice.
    pos += 1;
    let originated_time = try_u32(body, pos)?;
    pos += 4;

    let peer_ip_bytes = body.get(pos..pos + addr_len).ok_or_else(|| report!(ParserError::TruncatedMrt))?;
    pos += addr_len;

    let peer_as = try_u16(body, pos)?;
    pos += 2;

    let attr_len = try_u16(body, pos)? as usize;
    pos += 2;
    let attrs = body.get(pos..pos + attr_len).ok_or_else(|| report!(ParserError::TruncatedMrt))?;

    Ok(TableDumpRow {
        view_number,
        sequence_number,
        prefix_bytes,
        prefix_width,
        peer_ip_bytes,
        peer_as,
        originated_time,
        attrs,
    })
}

/// BGP4MP (RFC 6396 §4.4) subtypes. The AS4 variants widen the peer/local AS
/// fields from 2 to 4 bytes; the `_LOCAL` variants differ only in how the
/// collector obtained the message (loopback vs a real peering session) and
/// share the same body layout as their non-`_LOCAL` counterpart; the
/// `_ADDPATH` variants carry an RFC 7911 path id inside the embedded BGP
/// UPDATE itself, not in the MRT wrapper, so they decode identically here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u16)]
pub enum Bgp4MpSubtype {
    StateChange = 0,
    Message = 1,
    MessageAs4 = 4,
    StateChangeAs4 = 5,
    MessageLocal = 6,
    MessageAs4Local = 7,
    MessageAddPath = 8,
    MessageAs4AddPath = 9,
    MessageLocalAddPath = 10,
    MessageAs4LocalAddPath = 11,
}

impl Bgp4MpSubtype {
    fn is_as4(&self) -> bool {
        matches!(
            self,
            Bgp4MpSubtype::MessageAs4
                | Bgp4MpSubtype::StateChangeAs4
                | Bgp4MpSubtype::MessageAs4Local
                | Bgp4MpSubtype::MessageAs4AddPath
                | Bgp4MpSubtype::MessageAs4LocalAddPath
        )
    }

    /// False for the two STATE_CHANGE subtypes, which carry a peer FSM
    /// transition rather than a wire BGP message.
    pub fn carries_message(&self) -> bool {
        !matches!(self, Bgp4MpSubtype::StateChange | Bgp4MpSubtype::StateChangeAs4)
    }
}

/// Extracts the embedded BGP wire message from a BGP4MP record body, if any.
/// Returns `None` for the STATE_CHANGE subtypes. The peer/local-AS width
/// (2 or 4 bytes) and peer/local-address width (4 or 16 bytes per `afi`)
/// vary by subtype; everything after those fixed-width fields is the
/// untouched BGP message, framed and ready for [`Message::from_buffer`].
pub fn bgp4mp_embedded_message<'a>(body: &'a [u8], subtype: Bgp4MpSubtype) -> Result<Option<&'a [u8]>, ParserError> {
    if !subtype.carries_message() {
        return Ok(None);
    }

    let as_width = if subtype.is_as4() { 4 } else { 2 };
    let mut pos = 2 * as_width; // peer_as, local_as
    pos += 2; // interface index
    let afi_raw = try_u16(body, pos)?;
    pos += 2;
    let afi = Afi::from_wire(afi_raw)?;
    let addr_width = if matches!(afi, Afi::Ipv6) { 16 } else { 4 };
    pos += 2 * addr_width; // peer_ip, local_ip

    let msg = body.get(pos..).ok_or_else(|| report!(ParserError::TruncatedMrt))?;
    Ok(Some(msg))
}

/// A parsed 12-byte MRT record header plus its still-undecoded body.
#[derive(Debug, Clone, Copy)]
pub struct MrtRecord<'a> {
    pub timestamp: u32,
    pub mrt_type: u16,
    pub subtype: u16,
    pub body: &'a [u8],
    microseconds: Option<u32>,
}

impl<'a> MrtRecord<'a> {
    /// Parses one record header + body out of `buf`, returning the record and
    /// the remaining bytes after it (so callers can loop over an archive).
    ///
    /// `BGP4MP_ET` records carry 4 extra big-endian microsecond bytes between
    /// the common header and the payload, with `length` counting those 4
    /// bytes as part of the record (teacher's `mrt_header.rs`: `length -= 4`
    /// after reading the microsecond field). `microsecond_timestamp()` on the
    /// returned record recovers that value; for every other MRT type it is
    /// `None`.
    pub fn parse(buf: &'a [u8]) -> Result<(MrtRecord<'a>, &'a [u8]), ParserError> {
        if buf.len() < MRT_HEADER_LEN {
            return Err(report!(ParserError::TruncatedMrt));
        }
        let timestamp = read_u32(&buf[0..4]);
        let mrt_type = read_u16(&buf[4..6]);
        let subtype = read_u16(&buf[6..8]);
        let mut length = read_u32(&buf[8..12]) as usize;

        let mut header_len = MRT_HEADER_LEN;
        let mut microseconds = None;
        if mrt_type == MrtType::Bgp4MpEt as u16 {
            if length < 4 {
                return Err(report!(ParserError::TruncatedMrt));
            }
            let micros_bytes = buf
                .get(MRT_HEADER_LEN..MRT_HEADER_LEN + 4)
                .ok_or_else(|| report!(ParserError::TruncatedMrt))?;
            microseconds = Some(read_u32(micros_bytes));
            header_len += 4;
            length -= 4;
        }

        let body = buf
            .get(header_len..header_len + length)
            .ok_or_else(|| report!(ParserError::TruncatedMrt))?;
        let rest = &buf[header_len + length..];
        Ok((
            MrtRecord {
                timestamp,
                mrt_type,
                subtype,
                body,
                microseconds,
            },
            rest,
        ))
    }

    pub fn mrt_type(&self) -> Result<MrtType, ParserError> {
        MrtType::try_from(self.mrt_type).map_err(|_| report!(ParserError::BadMrtType(self.mrt_type)))
    }

    /// Sub-second offset for `BGP4MP_ET` records; `None` for every other
    /// MRT type (spec §7 supplement).
    pub fn microsecond_timestamp(&self) -> Option<u32> {
        self.microseconds
    }
}

/// A single TABLE_DUMPV2 RIB entry's worth of information needed to
/// reconstruct a BGP UPDATE: the prefix key, an optional ADD_PATH path id,
/// and the verbatim path-attribute blob (same `(flags, code, len, value)`
/// shape as a TPA).
pub struct RibEntry<'a> {
    pub afi: Afi,
    pub prefix_bytes: &'a [u8],
    pub prefix_width: u8,
    pub path_id: Option<u32>,
    pub attrs: &'a [u8],
}

fn encode_attr(flags: u8, code: u8, value: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(3 + value.len());
    if value.len() > 255 {
        out.push(flags | 0x10);
        out.push(code);
        out.extend_from_slice(&(value.len() as u16).to_be_bytes());
    } else {
        out.push(flags & !0x10);
        out.push(code);
        out.push(value.len() as u8);
    }
    out.extend_from_slice(value);
    out
}

/// Detects whether an MP_REACH value uses the TABLE_DUMPV2 AFI/SAFI-omitted
/// convention (`nh_len` + next-hop + reserved byte only) or the non-standard
/// full form some producers emit (AFI + SAFI + `nh_len` + next-hop +
/// reserved). Returns `Ok(true)` for the omitted (standard) form.
fn is_omitted_header_form(value: &[u8]) -> bool {
    // Omitted form: value[0] is nh_len, total length == 1 + nh_len + 1.
    if let Some(&nh_len) = value.first() {
        if value.len() == 1 + nh_len as usize + 1 {
            return true;
        }
    }
    false
}

fn is_full_header_form(value: &[u8], expected_afi: u16) -> bool {
    if value.len() < 4 {
        return false;
    }
    let afi = read_u16(&value[0..2]);
    if afi != expected_afi {
        return false;
    }
    let nh_len = value[3];
    value.len() == 4 + nh_len as usize + 1
}

fn validate_mp_reach_shape(value: &[u8], afi: Afi, flags: MsgFlags) -> Result<(), ParserError> {
    let afi_raw = afi as u16;
    let omitted = is_omitted_header_form(value);
    let full = is_full_header_form(value, afi_raw);
    if flags.contains(MsgFlags::STRICT_RFC6396) {
        if omitted {
            Ok(())
        } else {
            Err(report!(ParserError::BadRibV2MpReach))
        }
    } else if omitted || full {
        Ok(())
    } else {
        Err(report!(ParserError::BadRibV2MpReach))
    }
}

/// One row of the TABLE_DUMPV2 PEER_INDEX_TABLE (RFC 6396 §4.3.1): the
/// collector's view of a single peering session, indexed by position in
/// `PeerIndexTable::peers`.
pub struct PeerEntry<'a> {
    pub asn_is_four_byte: bool,
    pub bgp_id: u32,
    pub ip_is_v6: bool,
    pub ip_bytes: &'a [u8],
    pub asn: u32,
}

/// A parsed PEER_INDEX_TABLE body: every RIB row in the same archive refers
/// back into `peers` by index rather than repeating the peer's identity.
pub struct PeerIndexTable<'a> {
    pub collector_bgp_id: u32,
    pub view_name: &'a str,
    pub peers: Vec<PeerEntry<'a>>,
}

/// Parses a PEER_INDEX_TABLE record body (RFC 6396 §4.3.1).
pub fn parse_peer_index_table(body: &[u8]) -> Result<PeerIndexTable<'_>, ParserError> {
    let mut pos = 0usize;
    let collector_bgp_id = try_u32(body, pos)?;
    pos += 4;
    let view_name_len = try_u16(body, pos)? as usize;
    pos += 2;
    let view_name_bytes = body.get(pos..pos + view_name_len).ok_or_else(|| report!(ParserError::TruncatedPeerV2))?;
    let view_name = std::str::from_utf8(view_name_bytes).map_err(|_| report!(ParserError::TruncatedPeerV2))?;
    pos += view_name_len;

    let peer_count = try_u16(body, pos)? as usize;
    pos += 2;

    let mut peers = Vec::with_capacity(peer_count);
    for _ in 0..peer_count {
        let peer_type = *body.get(pos).ok_or_else(|| report!(ParserError::BadPeerIndex))?;
        pos += 1;
        let asn_is_four_byte = peer_type & 0x02 != 0;
        let ip_is_v6 = peer_type & 0x01 != 0;

        let bgp_id = try_u32(body, pos)?;
        pos += 4;

        let ip_len = if ip_is_v6 { 16 } else { 4 };
        let ip_bytes = body.get(pos..pos + ip_len).ok_or_else(|| report!(ParserError::TruncatedPeerV2))?;
        pos += ip_len;

        let asn = if asn_is_four_byte {
            let v = try_u32(body, pos)?;
            pos += 4;
            v
        } else {
            let v = try_u16(body, pos)? as u32;
            pos += 2;
            v
        };

        peers.push(PeerEntry {
            asn_is_four_byte,
            bgp_id,
            ip_is_v6,
            ip_bytes,
            asn,
        });
    }

    if peers.len() != peer_count {
        return Err(report!(ParserError::BadPeerIndexCount));
    }

    Ok(PeerIndexTable {
        collector_bgp_id,
        view_name,
        peers,
    })
}

/// One RIB_ENTRY (RFC 6396 §4.3.4), before it is paired with the prefix key
/// its enclosing RIB_IPV4_UNICAST / RIB_IPV6_UNICAST / RIB_GENERIC record
/// carries. `peer_index` resolves into [`PeerIndexTable::peers`].
pub struct RibRow<'a> {
    pub peer_index: u16,
    pub originated_time: u32,
    pub path_id: Option<u32>,
    pub attrs: &'a [u8],
}

impl<'a> RibRow<'a> {
    /// Pairs this row with its record's prefix key, producing the
    /// [`RibEntry`] `rebuild_from_rib` consumes.
    pub fn to_entry(&self, afi: Afi, prefix_bytes: &'a [u8], prefix_width: u8) -> RibEntry<'a> {
        RibEntry {
            afi,
            prefix_bytes,
            prefix_width,
            path_id: self.path_id,
            attrs: self.attrs,
        }
    }
}

fn parse_rib_rows(body: &[u8], mut pos: usize, add_path: bool) -> Result<Vec<RibRow<'_>>, ParserError> {
    let entry_count = try_u16(body, pos)? as usize;
    pos += 2;

    let mut rows = Vec::with_capacity(entry_count);
    for _ in 0..entry_count {
        let peer_index = try_u16(body, pos)?;
        pos += 2;
        let originated_time = try_u32(body, pos)?;
        pos += 4;
        let path_id = if add_path {
            let v = try_u32(body, pos)?;
            pos += 4;
            Some(v)
        } else {
            None
        };
        let attr_len = try_u16(body, pos)? as usize;
        pos += 2;
        let attrs = body.get(pos..pos + attr_len).ok_or_else(|| report!(ParserError::TruncatedRibV2))?;
        pos += attr_len;
        rows.push(RibRow {
            peer_index,
            originated_time,
            path_id,
            attrs,
        });
    }

    if rows.len() != entry_count {
        return Err(report!(ParserError::BadRibV2Count));
    }
    Ok(rows)
}

/// A parsed RIB_IPV4_UNICAST / RIB_IPV6_UNICAST record body (RFC 6396
/// §4.3.2): one prefix key shared by every row in `rows`.
pub struct RibAfiRecord<'a> {
    pub sequence_number: u32,
    pub prefix_bytes: &'a [u8],
    pub prefix_width: u8,
    pub rows: Vec<RibRow<'a>>,
}

/// Parses a RIB_IPV4_UNICAST / RIB_IPV6_UNICAST record body. `add_path` must
/// be set for the ADD_PATH-carrying v2 subtypes (each row gains a 4-byte
/// path identifier ahead of its attribute length).
pub fn parse_rib_afi_record(body: &[u8], add_path: bool) -> Result<RibAfiRecord<'_>, ParserError> {
    let sequence_number = try_u32(body, 0)?;
    let prefix_width = *body.get(4).ok_or_else(|| report!(ParserError::TruncatedRibV2))?;
    let prefix_byte_len = prefix_width.div_ceil(8) as usize;
    let prefix_bytes = body.get(5..5 + prefix_byte_len).ok_or_else(|| report!(ParserError::TruncatedRibV2))?;
    let rows = parse_rib_rows(body, 5 + prefix_byte_len, add_path)?;
    Ok(RibAfiRecord {
        sequence_number,
        prefix_bytes,
        prefix_width,
        rows,
    })
}

/// A parsed RIB_GENERIC record body (RFC 6396 §4.3.3): unlike the AFI-
/// specific subtypes, AFI/SAFI are carried explicitly per record rather than
/// implied by the MRT subtype.
pub struct RibGenericRecord<'a> {
    pub sequence_number: u32,
    pub afi: Afi,
    pub safi: u8,
    pub prefix_bytes: &'a [u8],
    pub prefix_width: u8,
    pub rows: Vec<RibRow<'a>>,
}

/// Parses a RIB_GENERIC record body.
pub fn parse_rib_generic_record(body: &[u8], add_path: bool) -> Result<RibGenericRecord<'_>, ParserError> {
    let sequence_number = try_u32(body, 0)?;
    let afi_raw = try_u16(body, 4)?;
    let afi = Afi::from_wire(afi_raw)?;
    let safi = *body.get(6).ok_or_else(|| report!(ParserError::TruncatedRibV2))?;
    let prefix_width = *body.get(7).ok_or_else(|| report!(ParserError::TruncatedRibV2))?;
    let prefix_byte_len = prefix_width.div_ceil(8) as usize;
    let prefix_bytes = body.get(8..8 + prefix_byte_len).ok_or_else(|| report!(ParserError::TruncatedRibV2))?;
    let rows = parse_rib_rows(body, 8 + prefix_byte_len, add_path)?;
    Ok(RibGenericRecord {
        sequence_number,
        afi,
        safi,
        prefix_bytes,
        prefix_width,
        rows,
    })
}

fn try_u16(body: &[u8], pos: usize) -> Result<u16, ParserError> {
    body.get(pos..pos + 2)
        .and_then(crate::endian::try_read_u16)
        .ok_or_else(|| report!(ParserError::TruncatedPeerV2))
}

fn try_u32(body: &[u8], pos: usize) -> Result<u32, ParserError> {
    body.get(pos..pos + 4)
        .and_then(crate::endian::try_read_u32)
        .ok_or_else(|| report!(ParserError::TruncatedPeerV2))
}

/// Reconstructs a legal BGP UPDATE message from one TABLE_DUMP /
/// TABLE_DUMPV2 RIB row (spec §4.4).
///
/// For IPv4, the attributes are copied verbatim and a single-entry NLRI
/// suffix is synthesized from `entry.prefix_bytes`/`entry.prefix_width`
/// (+ path id under `MsgFlags::ADD_PATH`); there is no WITHDRAWN.
///
/// For IPv6, `entry.attrs` must already contain an MP_REACH attribute (its
/// shape validated per `MsgFlags::STRICT_RFC6396`, spec §4.4's lax/strict
/// reconstruction); its absence is `ParserError::RibNoMpReach`.
pub fn rebuild_from_rib(entry: &RibEntry<'_>, flags: MsgFlags) -> Result<Message<'static>, ParserError> {
    let mut out_attrs = Vec::new();
    let mut found_mp_reach = false;
    let mut mp_reach_offset: Option<u16> = None;
    let mut mp_unreach_offset: Option<u16> = None;
    let mut cursor = 0u16;

    for raw in AttrIter::new(entry.attrs) {
        let raw: RawAttr = raw?;
        match raw.code {
            15 => {
                // MP_UNREACH_NLRI
                if flags.contains(MsgFlags::STRIP_UNREACH) {
                    continue;
                }
                let value: &[u8] = if flags.contains(MsgFlags::CLEAR_UNREACH) { &[] } else { raw.value };
                mp_unreach_offset = Some(cursor);
                let encoded = encode_attr(raw.flags, raw.code, value);
                cursor += encoded.len() as u16;
                out_attrs.push(encoded);
            }
            14 => {
                // MP_REACH_NLRI
                found_mp_reach = true;
                validate_mp_reach_shape(raw.value, entry.afi, flags)?;
                mp_reach_offset = Some(cursor);
                let encoded = encode_attr(raw.flags, raw.code, raw.value);
                cursor += encoded.len() as u16;
                out_attrs.push(encoded);
            }
            _ => {
                let encoded = encode_attr(raw.flags, raw.code, raw.value);
                cursor += encoded.len() as u16;
                out_attrs.push(encoded);
            }
        }
    }

    if matches!(entry.afi, Afi::Ipv6) && !found_mp_reach {
        return Err(report!(ParserError::RibNoMpReach));
    }

    let tpa: Vec<u8> = out_attrs.concat();

    let mut body = Vec::new();
    body.extend_from_slice(&0u16.to_be_bytes()); // withdrawn len = 0
    body.extend_from_slice(&(tpa.len() as u16).to_be_bytes());
    body.extend_from_slice(&tpa);

    if matches!(entry.afi, Afi::Ipv4) {
        if let Some(pid) = entry.path_id {
            body.extend_from_slice(&pid.to_be_bytes());
        }
        body.push(entry.prefix_width);
        let byte_len = entry.prefix_width.div_ceil(8) as usize;
        body.extend_from_slice(&entry.prefix_bytes[..byte_len]);
    }

    let mut buf = vec![0xFFu8; 16];
    let total_len = 19 + body.len();
    buf.extend_from_slice(&(total_len as u16).to_be_bytes());
    buf.push(2); // UPDATE
    buf.extend_from_slice(&body);

    let mut msg_flags = flags | MsgFlags::RIBV2;
    if entry.path_id.is_some() {
        msg_flags |= MsgFlags::ADD_PATH;
    }
    let msg = Message::from_owned(buf, msg_flags)?;

    // Seed the offset cache from the scan already performed above, so
    // downstream iterators do no re-scanning (spec §4.4, last paragraph).
    if let Some(off) = mp_reach_offset {
        msg.attrs().seed(crate::message::attrs::AttrKind::MpReach, off);
    }
    if let Some(off) = mp_unreach_offset {
        msg.attrs().seed(crate::message::attrs::AttrKind::MpUnreach, off);
    }
    Ok(msg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iters::iterate_prefixes;

    #[test]
    fn v4_rib_rebuild_yields_one_prefix() {
        let attrs = encode_attr(0x40, 1, &[0]); // ORIGIN = IGP
        let entry = RibEntry {
            afi: Afi::Ipv4,
            prefix_bytes: &[10, 0, 0],
            prefix_width: 24,
            path_id: None,
            attrs: &attrs,
        };
        let msg = rebuild_from_rib(&entry, MsgFlags::empty()).unwrap();
        let prefixes = iterate_prefixes(&msg).unwrap();
        assert_eq!(prefixes.len(), 1);
        assert_eq!(prefixes[0].1.bytes, &[10, 0, 0]);
        assert_eq!(prefixes[0].1.width_bits, 24);
    }

    #[test]
    fn v6_rib_without_mp_reach_errors() {
        let attrs = encode_attr(0x40, 1, &[0]);
        let entry = RibEntry {
            afi: Afi::Ipv6,
            prefix_bytes: &[0x20, 0x01, 0x0d, 0xb8],
            prefix_width: 32,
            path_id: None,
            attrs: &attrs,
        };
        let err = rebuild_from_rib(&entry, MsgFlags::empty()).unwrap_err();
        assert!(matches!(err, ParserError::RibNoMpReach));
    }

    #[test]
    fn lax_accepts_nonstandard_mp_reach_shape() {
        // full (non-omitted) form: AFI=2 (v6) + SAFI=1 + nh_len=16 + nh + reserved
        let mut mp_reach_value = vec![0x00, 0x02, 0x01, 16];
        mp_reach_value.extend_from_slice(&[0u8; 16]);
        mp_reach_value.push(0); // reserved
        let attrs = encode_attr(0xC0, 14, &mp_reach_value);
        let entry = RibEntry {
            afi: Afi::Ipv6,
            prefix_bytes: &[0x20, 0x01],
            prefix_width: 16,
            path_id: None,
            attrs: &attrs,
        };
        assert!(rebuild_from_rib(&entry, MsgFlags::empty()).is_ok());
        let err = rebuild_from_rib(&entry, MsgFlags::STRICT_RFC6396).unwrap_err();
        assert!(matches!(err, ParserError::BadRibV2MpReach));
    }

    #[test]
    fn subtype_classification() {
        assert!(TableDumpV2Subtype::RibIpv4UnicastAddPath.is_add_path());
        assert!(!TableDumpV2Subtype::RibIpv4Unicast.is_add_path());
        assert_eq!(TableDumpV2Subtype::RibIpv6Multicast.implied_afi(), Some(Afi::Ipv6));
        assert_eq!(TableDumpV2Subtype::RibGeneric.implied_afi(), None);
        assert!(!TableDumpV2Subtype::PeerIndexTable.is_rib());
    }

    #[test]
    fn bgp4mp_et_strips_microsecond_field() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&1_700_000_000u32.to_be_bytes()); // timestamp
        buf.extend_from_slice(&(MrtType::Bgp4MpEt as u16).to_be_bytes());
        buf.extend_from_slice(&1u16.to_be_bytes()); // subtype
        buf.extend_from_slice(&7u32.to_be_bytes()); // length = 4 micros + 3 body
        buf.extend_from_slice(&123_456u32.to_be_bytes()); // microseconds
        buf.extend_from_slice(&[0xAA, 0xBB, 0xCC]); // body

        let (record, rest) = MrtRecord::parse(&buf).unwrap();
        assert_eq!(record.microsecond_timestamp(), Some(123_456));
        assert_eq!(record.body, &[0xAA, 0xBB, 0xCC]);
        assert!(rest.is_empty());
    }

    #[test]
    fn peer_index_table_round_trip() {
        let mut body = Vec::new();
        body.extend_from_slice(&0x0A0B0C0Du32.to_be_bytes()); // collector bgp id
        let view = b"example-view";
        body.extend_from_slice(&(view.len() as u16).to_be_bytes());
        body.extend_from_slice(view);
        body.extend_from_slice(&2u16.to_be_bytes()); // peer count

        // peer 0: v4 address, 2-byte ASN
        body.push(0x00);
        body.extend_from_slice(&0x01020304u32.to_be_bytes());
        body.extend_from_slice(&[192, 0, 2, 1]);
        body.extend_from_slice(&65000u16.to_be_bytes());

        // peer 1: v6 address, 4-byte ASN
        body.push(0x03);
        body.extend_from_slice(&0x05060708u32.to_be_bytes());
        body.extend_from_slice(&[0x20, 0x01, 0x0d, 0xb8, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1]);
        body.extend_from_slice(&400_000u32.to_be_bytes());

        let table = parse_peer_index_table(&body).unwrap();
        assert_eq!(table.collector_bgp_id, 0x0A0B0C0D);
        assert_eq!(table.view_name, "example-view");
        assert_eq!(table.peers.len(), 2);
        assert!(!table.peers[0].ip_is_v6);
        assert_eq!(table.peers[0].asn, 65000);
        assert!(table.peers[1].ip_is_v6);
        assert_eq!(table.peers[1].asn, 400_000);
    }

    #[test]
    fn rib_afi_record_with_add_path() {
        let mut body = Vec::new();
        body.extend_from_slice(&42u32.to_be_bytes()); // sequence number
        body.push(24); // prefix width
        body.extend_from_slice(&[10, 0, 0]); // prefix bytes
        body.extend_from_slice(&1u16.to_be_bytes()); // entry count

        body.extend_from_slice(&0u16.to_be_bytes()); // peer index
        body.extend_from_slice(&1_700_000_000u32.to_be_bytes()); // originated time
        body.extend_from_slice(&7u32.to_be_bytes()); // path id
        let attrs = encode_attr(0x40, 1, &[0]);
        body.extend_from_slice(&(attrs.len() as u16).to_be_bytes());
        body.extend_from_slice(&attrs);

        let record = parse_rib_afi_record(&body, true).unwrap();
        assert_eq!(record.sequence_number, 42);
        assert_eq!(record.prefix_width, 24);
        assert_eq!(record.rows.len(), 1);
        assert_eq!(record.rows[0].path_id, Some(7));

        let entry = record.rows[0].to_entry(Afi::Ipv4, record.prefix_bytes, record.prefix_width);
        let msg = rebuild_from_rib(&entry, MsgFlags::empty()).unwrap();
        let prefixes = iterate_prefixes(&msg).unwrap();
        assert_eq!(prefixes[0].1.path_id, Some(7));
    }

    #[test]
    fn rib_generic_record_parses_afi_safi() {
        let mut body = Vec::new();
        body.extend_from_slice(&9u32.to_be_bytes());
        body.extend_from_slice(&(Afi::Ipv6 as u16).to_be_bytes());
        body.push(1); // safi = unicast
        body.push(32); // prefix width
        body.extend_from_slice(&[0x20, 0x01, 0x0d, 0xb8]);
        body.extend_from_slice(&0u16.to_be_bytes()); // entry count = 0

        let record = parse_rib_generic_record(&body, false).unwrap();
        assert_eq!(record.sequence_number, 9);
        assert_eq!(record.afi, Afi::Ipv6);
        assert_eq!(record.safi, 1);
        assert!(record.rows.is_empty());
    }

    #[test]
    fn table_dump_v1_row_rebuilds() {
        let mut body = Vec::new();
        body.extend_from_slice(&1u16.to_be_bytes()); // view number
        body.extend_from_slice(&2u16.to_be_bytes()); // sequence number
        body.extend_from_slice(&[10, 0, 0, 0]); // prefix
        body.push(24); // prefix width
        body.push(1); // status
        body.extend_from_slice(&1_700_000_000u32.to_be_bytes()); // originated time
        body.extend_from_slice(&[192, 0, 2, 1]); // peer ip
        body.extend_from_slice(&65000u16.to_be_bytes()); // peer as
        let attrs = encode_attr(0x40, 1, &[0]);
        body.extend_from_slice(&(attrs.len() as u16).to_be_bytes());
        body.extend_from_slice(&attrs);

        let row = parse_table_dump_row(&body, TableDumpSubtype::AfiIpv4).unwrap();
        assert_eq!(row.view_number, 1);
        assert_eq!(row.peer_as, 65000);
        assert_eq!(row.prefix_width, 24);

        let entry = row.to_entry(Afi::Ipv4);
        let msg = rebuild_from_rib(&entry, MsgFlags::empty()).unwrap();
        let prefixes = iterate_prefixes(&msg).unwrap();
        assert_eq!(prefixes[0].1.bytes, &[10, 0, 0]);
    }

    #[test]
    fn bgp4mp_message_extracts_embedded_update() {
        let mut body = Vec::new();
        body.extend_from_slice(&65000u16.to_be_bytes()); // peer as
        body.extend_from_slice(&65001u16.to_be_bytes()); // local as
        body.extend_from_slice(&1u16.to_be_bytes()); // interface index
        body.extend_from_slice(&(Afi::Ipv4 as u16).to_be_bytes());
        body.extend_from_slice(&[192, 0, 2, 1]); // peer ip
        body.extend_from_slice(&[192, 0, 2, 2]); // local ip

        let mut bgp_msg = vec![0xFFu8; 16];
        bgp_msg.extend_from_slice(&19u16.to_be_bytes());
        bgp_msg.push(4); // KEEPALIVE
        body.extend_from_slice(&bgp_msg);

        let embedded = bgp4mp_embedded_message(&body, Bgp4MpSubtype::Message).unwrap().unwrap();
        assert_eq!(embedded, bgp_msg.as_slice());

        let state_change = bgp4mp_embedded_message(&[0u8; 16], Bgp4MpSubtype::StateChange).unwrap();
        assert!(state_change.is_none());
    }
}
