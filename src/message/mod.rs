//! Message framing (spec §4.2): the 19-byte BGP header, the small flag set a
//! [`Message`] carries, and the typed-view accessors.
//!
//! Grounded on the teacher's `BgpMessage`/`parser/bgp/messages.rs` for the
//! marker/length/type layout, generalized to carry the zero-copy "owns or
//! borrows" duality and the lazy attribute-offset cache the spec requires.

pub mod attrs;

use crate::endian::{read_u16, try_read_u16};
use crate::error::ParserError;
use crate::report;
use bitflags::bitflags;
use num_enum::TryFromPrimitive;
use std::io::Read;

pub use attrs::{AttrKind, AttrTable};

/// Size of the fixed BGP header: 16-byte marker + 2-byte length + 1-byte type.
pub const HEADER_LEN: usize = 19;
/// Default maximum message length (RFC 4271 §4.1).
pub const MAX_LEN: usize = 4096;
/// Maximum message length with the "extended message" capability (RFC 8654).
pub const MAX_LEN_EXTENDED: usize = 65535;

bitflags! {
    /// Per-message flags, spec §3 "Message carries a small set of flags".
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MsgFlags: u16 {
        /// Buffer is borrowed, not owned; `clear()` is then a no-op past the
        /// allocator (there is nothing for this crate to free).
        const UNOWNED        = 0x0001;
        /// Session negotiated 4-byte ASNs end-to-end (RFC 6793 capability).
        const ASN32BIT        = 0x0002;
        /// Session negotiated ADD_PATH (RFC 7911): NLRI carries a path id.
        const ADD_PATH        = 0x0004;
        /// Session negotiated extended messages (RFC 8654): length window
        /// widens to `[19, 65535]`.
        const EXTENDED        = 0x0008;
        /// Message was synthesized by [`crate::mrt::rebuild_from_rib`] from a
        /// TABLE_DUMPV2 RIB entry, rather than decoded off the wire.
        const RIBV2            = 0x0010;
        /// Rebuild-only: reject any MP_REACH shape other than the
        /// AFI/SAFI-omitted TABLE_DUMPV2 convention.
        const STRICT_RFC6396 = 0x0020;
        /// Rebuild-only: drop MP_UNREACH from the rebuilt attribute set.
        const STRIP_UNREACH    = 0x0040;
        /// Rebuild-only: keep MP_UNREACH but zero its value length.
        const CLEAR_UNREACH    = 0x0080;
    }
}

/// Wire type octet, spec §4.2's "known set".
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum MsgType {
    Open = 1,
    Update = 2,
    Notification = 3,
    Keepalive = 4,
    RouteRefresh = 5,
    Close = 255,
}

/// The buffer a [`Message`] is built over: owned when the caller wants this
/// crate to manage the lifetime, borrowed when the caller already owns a
/// longer-lived slice (e.g. a page straight out of an mmap'd archive).
#[derive(Debug)]
enum MsgBuf<'a> {
    Owned(Vec<u8>),
    Borrowed(&'a [u8]),
}

impl<'a> MsgBuf<'a> {
    fn as_slice(&self) -> &[u8] {
        match self {
            MsgBuf::Owned(v) => v.as_slice(),
            MsgBuf::Borrowed(b) => b,
        }
    }
}

/// A framed BGP message: a validated buffer plus the lazily-populated
/// attribute offset cache described in spec §3/§4.3.
#[derive(Debug)]
pub struct Message<'a> {
    buf: MsgBuf<'a>,
    flags: MsgFlags,
    attrs: AttrTable,
    cleared: bool,
}

impl<'a> Message<'a> {
    #[inline]
    pub fn bytes(&self) -> &[u8] {
        if self.cleared {
            return &[];
        }
        self.buf.as_slice()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bytes().len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn flags(&self) -> MsgFlags {
        self.flags
    }

    #[inline]
    pub fn flags_mut(&mut self) -> &mut MsgFlags {
        &mut self.flags
    }

    #[inline]
    pub fn msg_type(&self) -> MsgType {
        // Validated by `from_buffer`/`read`, so this never panics on a live Message.
        MsgType::try_from(self.bytes()[18]).expect("message constructed with unvalidated type")
    }

    /// The Total Path Attributes segment of an UPDATE message: everything after
    /// the withdrawn-routes field up to (not including) the trailing NLRI.
    /// Only meaningful when `msg_type() == Update`.
    pub(crate) fn tpa(&self) -> Result<&[u8], ParserError> {
        let body = &self.bytes()[HEADER_LEN..];
        let wlen = try_read_u16(body).ok_or_else(|| report!(ParserError::TruncatedAttribute))? as usize;
        let after_withdrawn = body
            .get(2 + wlen..)
            .ok_or_else(|| report!(ParserError::TruncatedAttribute))?;
        let tpa_len = try_read_u16(after_withdrawn)
            .ok_or_else(|| report!(ParserError::TruncatedAttribute))? as usize;
        after_withdrawn
            .get(2..2 + tpa_len)
            .ok_or_else(|| report!(ParserError::TruncatedAttribute))
    }

    /// Byte range of the withdrawn-routes field value (no length prefix).
    pub(crate) fn withdrawn(&self) -> Result<&[u8], ParserError> {
        let body = &self.bytes()[HEADER_LEN..];
        let wlen = try_read_u16(body).ok_or_else(|| report!(ParserError::TruncatedAttribute))? as usize;
        body.get(2..2 + wlen)
            .ok_or_else(|| report!(ParserError::TruncatedAttribute))
    }

    /// Byte range of the trailing NLRI field (runs to the end of the message).
    pub(crate) fn nlri(&self) -> Result<&[u8], ParserError> {
        let body = &self.bytes()[HEADER_LEN..];
        let wlen = try_read_u16(body).ok_or_else(|| report!(ParserError::TruncatedAttribute))? as usize;
        let after_withdrawn = body
            .get(2 + wlen..)
            .ok_or_else(|| report!(ParserError::TruncatedAttribute))?;
        let tpa_len = try_read_u16(after_withdrawn)
            .ok_or_else(|| report!(ParserError::TruncatedAttribute))? as usize;
        after_withdrawn
            .get(2 + tpa_len..)
            .ok_or_else(|| report!(ParserError::TruncatedAttribute))
    }

    pub(crate) fn attrs(&self) -> &AttrTable {
        &self.attrs
    }

    /// Typed OPEN view. Spec §4.2: fails with `BadType` if the stored type
    /// octet doesn't match.
    pub fn as_open(&self) -> Result<OpenView<'_>, ParserError> {
        if self.msg_type() != MsgType::Open {
            return Err(report!(ParserError::BadType));
        }
        Ok(OpenView { msg: self })
    }

    pub fn as_update(&self) -> Result<UpdateView<'_>, ParserError> {
        if self.msg_type() != MsgType::Update {
            return Err(report!(ParserError::BadType));
        }
        Ok(UpdateView { msg: self })
    }

    pub fn as_notification(&self) -> Result<NotificationView<'_>, ParserError> {
        if self.msg_type() != MsgType::Notification {
            return Err(report!(ParserError::BadType));
        }
        Ok(NotificationView { msg: self })
    }

    pub fn as_route_refresh(&self) -> Result<RouteRefreshView<'_>, ParserError> {
        if self.msg_type() != MsgType::RouteRefresh {
            return Err(report!(ParserError::BadType));
        }
        Ok(RouteRefreshView { msg: self })
    }

    /// Validate framing and construct a [`Message`] over `bytes`.
    ///
    /// Copies `bytes` into an owned buffer unless `flags` contains
    /// [`MsgFlags::UNOWNED`], in which case the returned `Message` borrows `bytes`
    /// and cannot outlive it.
    pub fn from_buffer(bytes: &'a [u8], flags: MsgFlags) -> Result<Message<'a>, ParserError> {
        validate_framing(bytes, flags)?;
        let buf = if flags.contains(MsgFlags::UNOWNED) {
            MsgBuf::Borrowed(bytes)
        } else {
            MsgBuf::Owned(bytes.to_vec())
        };
        Ok(Message {
            buf,
            flags,
            attrs: AttrTable::default(),
            cleared: false,
        })
    }

    /// Validates and wraps an already-owned buffer (e.g. one assembled by
    /// [`crate::mrt::rebuild_from_rib`]) without requiring a borrow of
    /// caller-held bytes. `UNOWNED` is cleared regardless of `flags`: the
    /// buffer is moved in, so there is nothing external to borrow from.
    pub fn from_owned(bytes: Vec<u8>, mut flags: MsgFlags) -> Result<Message<'static>, ParserError> {
        flags.remove(MsgFlags::UNOWNED);
        validate_framing(&bytes, flags)?;
        Ok(Message {
            buf: MsgBuf::Owned(bytes),
            flags,
            attrs: AttrTable::default(),
            cleared: false,
        })
    }

    /// Reads exactly one framed message from `stream`. Always produces an owned
    /// message (`UNOWNED` is cleared regardless of the passed-in flags: a stream
    /// read has no caller-owned buffer to borrow from).
    pub fn read<R: Read>(stream: &mut R, mut flags: MsgFlags) -> Result<Message<'static>, ParserError> {
        flags.remove(MsgFlags::UNOWNED);
        let mut header = [0u8; HEADER_LEN];
        read_exact_or_err(stream, &mut header)?;
        let body_len = read_u16(&header[16..18]) as usize;
        let limit = if flags.contains(MsgFlags::EXTENDED) {
            MAX_LEN_EXTENDED
        } else {
            MAX_LEN
        };
        if !(HEADER_LEN..=limit).contains(&body_len) {
            return Err(report!(ParserError::Oversized));
        }
        let mut buf = vec![0u8; body_len];
        buf[..HEADER_LEN].copy_from_slice(&header);
        read_exact_or_err(stream, &mut buf[HEADER_LEN..])?;
        validate_framing(&buf, flags)?;
        Ok(Message {
            buf: MsgBuf::Owned(buf),
            flags,
            attrs: AttrTable::default(),
            cleared: false,
        })
    }

    /// Returns the buffer to the allocator unless the message is unowned.
    /// Idempotent: calling twice is a no-op the second time.
    pub fn clear(&mut self) {
        if self.cleared {
            return;
        }
        if let MsgBuf::Owned(v) = &mut self.buf {
            *v = Vec::new();
        }
        self.cleared = true;
    }
}

fn read_exact_or_err<R: Read>(stream: &mut R, buf: &mut [u8]) -> Result<(), ParserError> {
    stream.read_exact(buf).map_err(|e| report!(ParserError::Io(e)))
}

fn validate_framing(bytes: &[u8], flags: MsgFlags) -> Result<(), ParserError> {
    if bytes.len() < HEADER_LEN {
        return Err(report!(ParserError::TruncatedMsg));
    }
    if bytes[..16].iter().any(|&b| b != 0xFF) {
        return Err(report!(ParserError::BadMarker));
    }
    let length = read_u16(&bytes[16..18]) as usize;
    let limit = if flags.contains(MsgFlags::EXTENDED) {
        MAX_LEN_EXTENDED
    } else {
        MAX_LEN
    };
    if length < HEADER_LEN || length > limit {
        return Err(report!(ParserError::Oversized));
    }
    if bytes.len() != length {
        return Err(report!(ParserError::TruncatedMsg));
    }
    let type_octet = bytes[18];
    if MsgType::try_from(type_octet).is_err() {
        return Err(report!(ParserError::BadType));
    }
    if type_octet == MsgType::Open as u8 {
        // OPEN body: version(1) + my_as(2) + holdtime(2) + bgp_id(4) + opt_len(1) + opt_params
        let body = &bytes[HEADER_LEN..];
        if body.len() < 10 {
            return Err(report!(ParserError::BadOpenLength));
        }
        let opt_len = body[9] as usize;
        if body.len() != 10 + opt_len {
            return Err(report!(ParserError::BadOpenLength));
        }
    }
    Ok(())
}

/// Typed view over an OPEN message.
pub struct OpenView<'m> {
    msg: &'m Message<'m>,
}

impl<'m> OpenView<'m> {
    pub fn version(&self) -> u8 {
        self.msg.bytes()[HEADER_LEN]
    }

    pub fn my_asn(&self) -> u16 {
        read_u16(&self.msg.bytes()[HEADER_LEN + 1..])
    }

    pub fn hold_time(&self) -> u16 {
        read_u16(&self.msg.bytes()[HEADER_LEN + 3..])
    }

    pub fn bgp_id(&self) -> [u8; 4] {
        let b = &self.msg.bytes()[HEADER_LEN + 5..HEADER_LEN + 9];
        [b[0], b[1], b[2], b[3]]
    }

    pub fn opt_params(&self) -> &[u8] {
        let opt_len = self.msg.bytes()[HEADER_LEN + 9] as usize;
        &self.msg.bytes()[HEADER_LEN + 10..HEADER_LEN + 10 + opt_len]
    }
}

pub struct UpdateView<'m> {
    msg: &'m Message<'m>,
}

impl<'m> UpdateView<'m> {
    pub fn message(&self) -> &'m Message<'m> {
        self.msg
    }
}

pub struct NotificationView<'m> {
    msg: &'m Message<'m>,
}

impl<'m> NotificationView<'m> {
    pub fn code(&self) -> u8 {
        self.msg.bytes()[HEADER_LEN]
    }

    pub fn subcode(&self) -> u8 {
        self.msg.bytes()[HEADER_LEN + 1]
    }

    pub fn data(&self) -> &[u8] {
        &self.msg.bytes()[HEADER_LEN + 2..]
    }

    /// RFC name for this notification's code/subcode pair, e.g. "Bad Peer
    /// AS" (spec §7 supplement; see [`crate::notification`]).
    pub fn description(&self) -> &'static str {
        crate::notification::describe(self.code(), self.subcode())
    }

    /// Typed decomposition of `code()`/`subcode()` (spec §7 supplement: "the
    /// `as_notification` accessor exposes code/subcode as typed values
    /// rather than raw bytes").
    pub fn error(&self) -> crate::notification::NotifError {
        crate::notification::NotifError::new(self.code(), self.subcode())
    }
}

pub struct RouteRefreshView<'m> {
    msg: &'m Message<'m>,
}

impl<'m> RouteRefreshView<'m> {
    pub fn afi(&self) -> u16 {
        read_u16(&self.msg.bytes()[HEADER_LEN..])
    }

    pub fn safi(&self) -> u8 {
        self.msg.bytes()[HEADER_LEN + 3]
    }
}
