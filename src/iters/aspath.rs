//! AS path iteration with AS4 merge (spec §4.3).
//!
//! Reconstructs a single logical path across AS_PATH and AS4_PATH when the
//! session negotiated 16-bit ASNs but the peer advertised 32-bit ASNs via
//! AS4_PATH (RFC 6793 §4.2.3). Grounded on the teacher's `AsPath`
//! (`models/bgp/aspath`) for the segment/iterator shape; the merge algorithm
//! itself has no teacher counterpart (the teacher never negotiates 16-bit
//! sessions) and is written directly from RFC 4893/6793.

use crate::asn::Asn;
use crate::endian::{read_u16, read_u32};
use crate::error::ParserError;
use crate::message::attrs::{AttrIter, AttrKind, RawAttr};
use crate::message::{Message, MsgFlags};
use crate::report;
use smallvec::SmallVec;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegType {
    Set = 1,
    Sequence = 2,
}

impl SegType {
    fn from_wire(v: u8) -> Result<Self, ParserError> {
        match v {
            1 => Ok(SegType::Set),
            2 => Ok(SegType::Sequence),
            _ => Err(report!(ParserError::BadSegType(v))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Segment {
    pub seg_type: SegType,
    pub asns: SmallVec<[Asn; 8]>,
}

fn find_attr<'a>(tpa: &'a [u8], msg: &Message<'_>, kind: AttrKind, code: u8) -> Result<Option<&'a [u8]>, ParserError> {
    if let Some(offset) = msg.attrs().offset_of(tpa, kind)? {
        let rest = &tpa[offset as usize..];
        for raw in AttrIter::new(rest) {
            let raw: RawAttr = raw?;
            if raw.code == code {
                return Ok(Some(raw.value));
            }
            break;
        }
    }
    Ok(None)
}

fn parse_segments(value: &[u8], asn_width: usize) -> Result<Vec<Segment>, ParserError> {
    let mut segs = Vec::new();
    let mut cursor = 0usize;
    while cursor < value.len() {
        let seg_type = SegType::from_wire(
            *value.get(cursor).ok_or_else(|| report!(ParserError::TruncatedAttribute))?,
        )?;
        let count = *value
            .get(cursor + 1)
            .ok_or_else(|| report!(ParserError::TruncatedAttribute))? as usize;
        let body_len = count * asn_width;
        let body = value
            .get(cursor + 2..cursor + 2 + body_len)
            .ok_or_else(|| report!(ParserError::TruncatedAttribute))?;
        let mut asns = SmallVec::with_capacity(count);
        for chunk in body.chunks_exact(asn_width) {
            let asn = if asn_width == 2 {
                Asn::new_16bit(read_u16(chunk))
            } else {
                Asn::new_32bit(read_u32(chunk))
            };
            asns.push(asn);
        }
        segs.push(Segment { seg_type, asns });
        cursor += 2 + body_len;
    }
    Ok(segs)
}

/// Replaces the trailing `AS_TRANS`-bearing portion of `as_path` with
/// `as4_path`, preserving the leading segments of `as_path` untouched (RFC
/// 4893 §4.2.3). If `as4_path` carries more ASNs than `as_path`, it is
/// ignored wholesale (Open Question (a), resolved literally per RFC 4893 in
/// `DESIGN.md`): a widened path must never be shorter than the session saw.
fn merge_as4(as_path: Vec<Segment>, as4_path: Vec<Segment>) -> Vec<Segment> {
    let as_path_count: usize = as_path.iter().map(|s| s.asns.len()).sum();
    let as4_count: usize = as4_path.iter().map(|s| s.asns.len()).sum();
    if as4_count > as_path_count || as4_count == 0 {
        return as_path;
    }
    let keep = as_path_count - as4_count;
    let mut result = Vec::new();
    let mut remaining = keep;
    for seg in as_path {
        if remaining == 0 {
            break;
        }
        if seg.asns.len() <= remaining {
            remaining -= seg.asns.len();
            result.push(seg);
        } else {
            let mut s = seg;
            s.asns.truncate(remaining);
            remaining = 0;
            result.push(s);
        }
    }
    result.extend(as4_path);
    result
}

/// One yielded element of the merged AS path: the segment it belongs to, its
/// index within the segment's ASN list, and the ASN value.
#[derive(Debug, Clone, Copy)]
pub struct AsPathElem {
    pub seg_type: SegType,
    pub index_in_segment: usize,
    pub asn: Asn,
}

/// Lazily builds and exposes the merged AS path for one UPDATE message.
/// Construction does the segment parse + AS4 merge eagerly (it is cheap
/// relative to a TPA walk already performed by the offset cache); the
/// `iter()` method returns the lazy per-element cursor the spec describes.
pub struct AsPathView {
    segments: Vec<Segment>,
}

impl AsPathView {
    pub fn build(msg: &Message<'_>) -> Result<Self, ParserError> {
        let tpa = msg.tpa()?;
        let as_path_bytes = find_attr(tpa, msg, AttrKind::AsPath, 2)?;
        let as4_path_bytes = find_attr(tpa, msg, AttrKind::As4Path, 17)?;
        let asn_width = if msg.flags().contains(MsgFlags::ASN32BIT) { 4 } else { 2 };
        let as_path = match as_path_bytes {
            Some(v) => parse_segments(v, asn_width)?,
            None => Vec::new(),
        };
        let segments = match (msg.flags().contains(MsgFlags::ASN32BIT), as4_path_bytes) {
            (false, Some(as4_bytes)) => {
                let as4_path = parse_segments(as4_bytes, 4)?;
                merge_as4(as_path, as4_path)
            }
            _ => as_path,
        };
        Ok(AsPathView { segments })
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Sequence-only view: AS_SETs are skipped, matching `ASMTCH`'s
    /// "AS-sequence portions of the merged path" contract; set members are
    /// surfaced separately via [`AsPathView::set_candidates`].
    pub fn iter(&self) -> impl Iterator<Item = AsPathElem> + '_ {
        self.segments.iter().flat_map(|seg| {
            seg.asns.iter().enumerate().map(move |(i, &asn)| AsPathElem {
                seg_type: seg.seg_type,
                index_in_segment: i,
                asn,
            })
        })
    }

    /// Every ASN appearing in an AS_SET segment, each a candidate branch for
    /// `ASMTCH` (spec §4.5: "every element contributes a candidate branch").
    pub fn set_candidates(&self) -> impl Iterator<Item = Asn> + '_ {
        self.segments
            .iter()
            .filter(|s| s.seg_type == SegType::Set)
            .flat_map(|s| s.asns.iter().copied())
    }
}
