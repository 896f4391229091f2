/*!
error module defines the error types used in bgp-vm-parser, plus the thread-local
"last error" carrier described by the filter VM's C heritage (`Bgp_GetErrStat()`/
`Bgp_SetErrFunc()` in the original `lonetix` library this crate's VM opcodes are
modeled on).

The carrier is additive: every fallible entry point in this crate still returns a
`Result<_, ParserError>`. The thread-local slot exists so host code that evaluates
many VM programs per message can cheaply ask "what broke last" without threading an
out-parameter through every call, mirroring the upstream API surface this crate
replaces.
*/
use std::cell::RefCell;
use std::fmt::{self, Display, Formatter};
use std::io;

/// Top level error type covering the three categories described in the spec:
/// message/framing decode errors, MRT decode errors, and filter VM errors.
#[derive(Debug)]
pub enum ParserError {
    // ---- I/O -----------------------------------------------------------
    Io(io::Error),

    // ---- message / framing errors ---------------------------------------
    NoMemory,
    BadType,
    NoAddPath,
    BadAttrType(u8),
    BadSegType(u8),
    BadMarker,
    TruncatedMsg,
    Oversized,
    BadOpenLength,
    BadAggregator,
    BadAggregator4,
    DupNlriAttr,
    BadPrefixWidth(u8),
    TruncatedPrefix,
    TruncatedAttribute,
    AfiUnsupported(u16),
    SafiUnsupported(u8),

    // ---- MRT errors ------------------------------------------------------
    BadMrtType(u16),
    TruncatedMrt,
    BadPeerIndexCount,
    TruncatedPeerV2,
    BadRibV2Count,
    TruncatedRibV2,
    BadRibV2MpReach,
    RibNoMpReach,
    BadPeerIndex,

    // ---- filter VM errors (sticky inside a run) ---------------------------
    BadVm,
    NoProgram,
    BadCommMatch(String),
    AsMatchSize,
    AsGrpLimit,
    BadAsMatch(String),
    BadJump,
    IllegalOpcode(u8),
    Oom,
    BadEndBlk,
    StackUnderflow,
    StackOverflow,
    BadFunction(u16),
    BadConstant(u16),
    /// Wraps an underlying decode error surfaced while a VM program ran.
    MsgErr(Box<ParserError>),
    BadOperand,

    /// Catch-all for conditions not worth a dedicated variant, matching the
    /// teacher's own `ParserError::ParseError(String)` escape hatch.
    ParseError(String),
}

impl std::error::Error for ParserError {}

impl Display for ParserError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ParserError::Io(e) => write!(f, "i/o error: {e}"),
            ParserError::NoMemory => write!(f, "memory allocation failure"),
            ParserError::BadType => write!(f, "wrong message type for requested view"),
            ParserError::NoAddPath => write!(f, "message is not ADD_PATH enabled"),
            ParserError::BadAttrType(c) => write!(f, "wrong attribute type for requested view: {c}"),
            ParserError::BadSegType(t) => write!(f, "illegal AS_PATH segment type: {t}"),
            ParserError::BadMarker => write!(f, "invalid or corrupted BGP marker"),
            ParserError::TruncatedMsg => write!(f, "truncated BGP message"),
            ParserError::Oversized => write!(f, "oversized BGP message"),
            ParserError::BadOpenLength => write!(f, "inconsistent OPEN message length"),
            ParserError::BadAggregator => write!(f, "malformed AGGREGATOR attribute"),
            ParserError::BadAggregator4 => write!(f, "malformed AS4_AGGREGATOR attribute"),
            ParserError::DupNlriAttr => write!(f, "duplicate MP_REACH/MP_UNREACH attribute"),
            ParserError::BadPrefixWidth(w) => write!(f, "illegal prefix width: {w}"),
            ParserError::TruncatedPrefix => write!(f, "truncated prefix"),
            ParserError::TruncatedAttribute => write!(f, "truncated BGP attribute"),
            ParserError::AfiUnsupported(afi) => write!(f, "unsupported AFI: {afi}"),
            ParserError::SafiUnsupported(safi) => write!(f, "unsupported SAFI: {safi}"),
            ParserError::BadMrtType(t) => write!(f, "unknown MRT record type: {t}"),
            ParserError::TruncatedMrt => write!(f, "truncated MRT record"),
            ParserError::BadPeerIndexCount => write!(f, "incoherent PEER_INDEX_TABLE peer count"),
            ParserError::TruncatedPeerV2 => write!(f, "truncated PEER_INDEX_TABLE peer entry"),
            ParserError::BadRibV2Count => write!(f, "incoherent TABLE_DUMPV2 RIB entry count"),
            ParserError::TruncatedRibV2 => write!(f, "truncated TABLE_DUMPV2 RIB entry"),
            ParserError::BadRibV2MpReach => write!(f, "illegal MP_REACH in TABLE_DUMPV2 RIB entry"),
            ParserError::RibNoMpReach => write!(f, "IPv6 RIB entry lacks MP_REACH_NLRI"),
            ParserError::BadPeerIndex => write!(f, "out of bounds peer index"),
            ParserError::BadVm => write!(f, "VM is in a failed setup state"),
            ParserError::NoProgram => write!(f, "VM has no program loaded"),
            ParserError::BadCommMatch(s) => write!(f, "invalid COMMUNITY match expression: {s}"),
            ParserError::AsMatchSize => write!(f, "AS-path pattern exceeds per-message heap budget"),
            ParserError::AsGrpLimit => write!(f, "AS-path pattern has too many nested groups"),
            ParserError::BadAsMatch(s) => write!(f, "inconsistent AS-path match rules: {s}"),
            ParserError::BadJump => write!(f, "jump instruction targets beyond program END"),
            ParserError::IllegalOpcode(op) => write!(f, "illegal VM opcode: {op:#04x}"),
            ParserError::Oom => write!(f, "VM heap exhausted"),
            ParserError::BadEndBlk => write!(f, "ENDBLK with no matching BLK"),
            ParserError::StackUnderflow => write!(f, "VM stack underflow"),
            ParserError::StackOverflow => write!(f, "VM stack overflow"),
            ParserError::BadFunction(i) => write!(f, "CALL references bad function index: {i}"),
            ParserError::BadConstant(i) => write!(f, "LOADK references bad constant index: {i}"),
            ParserError::MsgErr(inner) => write!(f, "message decode error during VM run: {inner}"),
            ParserError::BadOperand => write!(f, "bad VM instruction operand"),
            ParserError::ParseError(s) => write!(f, "{s}"),
        }
    }
}

impl From<io::Error> for ParserError {
    fn from(e: io::Error) -> Self {
        ParserError::Io(e)
    }
}

impl ParserError {
    /// `BGP_ISVMERR` equivalent.
    pub fn is_vm_error(&self) -> bool {
        matches!(
            self,
            ParserError::BadVm
                | ParserError::NoProgram
                | ParserError::BadCommMatch(_)
                | ParserError::AsMatchSize
                | ParserError::AsGrpLimit
                | ParserError::BadAsMatch(_)
                | ParserError::BadJump
                | ParserError::IllegalOpcode(_)
                | ParserError::Oom
                | ParserError::BadEndBlk
                | ParserError::StackUnderflow
                | ParserError::StackOverflow
                | ParserError::BadFunction(_)
                | ParserError::BadConstant(_)
                | ParserError::MsgErr(_)
                | ParserError::BadOperand
        )
    }

    /// `BGP_ISMSGERR` equivalent.
    pub fn is_message_error(&self) -> bool {
        matches!(
            self,
            ParserError::NoMemory
                | ParserError::BadType
                | ParserError::NoAddPath
                | ParserError::BadAttrType(_)
                | ParserError::BadSegType(_)
                | ParserError::BadMarker
                | ParserError::TruncatedMsg
                | ParserError::Oversized
                | ParserError::BadOpenLength
                | ParserError::BadAggregator
                | ParserError::BadAggregator4
                | ParserError::DupNlriAttr
                | ParserError::BadPrefixWidth(_)
                | ParserError::TruncatedPrefix
                | ParserError::TruncatedAttribute
                | ParserError::AfiUnsupported(_)
                | ParserError::SafiUnsupported(_)
        )
    }

    /// `BGP_ISMRTERR` equivalent.
    pub fn is_mrt_error(&self) -> bool {
        matches!(
            self,
            ParserError::BadMrtType(_)
                | ParserError::TruncatedMrt
                | ParserError::BadPeerIndexCount
                | ParserError::TruncatedPeerV2
                | ParserError::BadRibV2Count
                | ParserError::TruncatedRibV2
                | ParserError::BadRibV2MpReach
                | ParserError::RibNoMpReach
                | ParserError::BadPeerIndex
        )
    }

    /// A cheap `Copy` summary of this error, suitable for the thread-local slot.
    pub fn code(&self) -> ErrorCode {
        ErrorCode::from(self)
    }
}

/// `Copy` discriminant for `ParserError`, used by the thread-local error slot and
/// the installable error handler since `ParserError` itself may carry an `io::Error`
/// or heap-allocated detail that isn't worth cloning on every decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorCode {
    Io,
    NoMemory,
    BadType,
    NoAddPath,
    BadAttrType,
    BadSegType,
    BadMarker,
    TruncatedMsg,
    Oversized,
    BadOpenLength,
    BadAggregator,
    BadAggregator4,
    DupNlriAttr,
    BadPrefixWidth,
    TruncatedPrefix,
    TruncatedAttribute,
    AfiUnsupported,
    SafiUnsupported,
    BadMrtType,
    TruncatedMrt,
    BadPeerIndexCount,
    TruncatedPeerV2,
    BadRibV2Count,
    TruncatedRibV2,
    BadRibV2MpReach,
    RibNoMpReach,
    BadPeerIndex,
    BadVm,
    NoProgram,
    BadCommMatch,
    AsMatchSize,
    AsGrpLimit,
    BadAsMatch,
    BadJump,
    IllegalOpcode,
    Oom,
    BadEndBlk,
    StackUnderflow,
    StackOverflow,
    BadFunction,
    BadConstant,
    MsgErr,
    BadOperand,
    ParseError,
}

impl From<&ParserError> for ErrorCode {
    fn from(e: &ParserError) -> Self {
        match e {
            ParserError::Io(_) => ErrorCode::Io,
            ParserError::NoMemory => ErrorCode::NoMemory,
            ParserError::BadType => ErrorCode::BadType,
            ParserError::NoAddPath => ErrorCode::NoAddPath,
            ParserError::BadAttrType(_) => ErrorCode::BadAttrType,
            ParserError::BadSegType(_) => ErrorCode::BadSegType,
            ParserError::BadMarker => ErrorCode::BadMarker,
            ParserError::TruncatedMsg => ErrorCode::TruncatedMsg,
            ParserError::Oversized => ErrorCode::Oversized,
            ParserError::BadOpenLength => ErrorCode::BadOpenLength,
            ParserError::BadAggregator => ErrorCode::BadAggregator,
            ParserError::BadAggregator4 => ErrorCode::BadAggregator4,
            ParserError::DupNlriAttr => ErrorCode::DupNlriAttr,
            ParserError::BadPrefixWidth(_) => ErrorCode::BadPrefixWidth,
            ParserError::TruncatedPrefix => ErrorCode::TruncatedPrefix,
            ParserError::TruncatedAttribute => ErrorCode::TruncatedAttribute,
            ParserError::AfiUnsupported(_) => ErrorCode::AfiUnsupported,
            ParserError::SafiUnsupported(_) => ErrorCode::SafiUnsupported,
            ParserError::BadMrtType(_) => ErrorCode::BadMrtType,
            ParserError::TruncatedMrt => ErrorCode::TruncatedMrt,
            ParserError::BadPeerIndexCount => ErrorCode::BadPeerIndexCount,
            ParserError::TruncatedPeerV2 => ErrorCode::TruncatedPeerV2,
            ParserError::BadRibV2Count => ErrorCode::BadRibV2Count,
            ParserError::TruncatedRibV2 => ErrorCode::TruncatedRibV2,
            ParserError::BadRibV2MpReach => ErrorCode::BadRibV2MpReach,
            ParserError::RibNoMpReach => ErrorCode::RibNoMpReach,
            ParserError::BadPeerIndex => ErrorCode::BadPeerIndex,
            ParserError::BadVm => ErrorCode::BadVm,
            ParserError::NoProgram => ErrorCode::NoProgram,
            ParserError::BadCommMatch(_) => ErrorCode::BadCommMatch,
            ParserError::AsMatchSize => ErrorCode::AsMatchSize,
            ParserError::AsGrpLimit => ErrorCode::AsGrpLimit,
            ParserError::BadAsMatch(_) => ErrorCode::BadAsMatch,
            ParserError::BadJump => ErrorCode::BadJump,
            ParserError::IllegalOpcode(_) => ErrorCode::IllegalOpcode,
            ParserError::Oom => ErrorCode::Oom,
            ParserError::BadEndBlk => ErrorCode::BadEndBlk,
            ParserError::StackUnderflow => ErrorCode::StackUnderflow,
            ParserError::StackOverflow => ErrorCode::StackOverflow,
            ParserError::BadFunction(_) => ErrorCode::BadFunction,
            ParserError::BadConstant(_) => ErrorCode::BadConstant,
            ParserError::MsgErr(_) => ErrorCode::MsgErr,
            ParserError::BadOperand => ErrorCode::BadOperand,
            ParserError::ParseError(_) => ErrorCode::ParseError,
        }
    }
}

/// Source location captured at the point an error was reported, forwarded to the
/// installed error handler unaltered.
#[derive(Debug, Clone, Copy)]
pub struct SourceLocation {
    pub file: &'static str,
    pub line: u32,
}

impl Display for SourceLocation {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

type ErrorHandler = dyn Fn(ErrorCode, SourceLocation);

thread_local! {
    static LAST_ERROR: RefCell<Option<ErrorCode>> = const { RefCell::new(None) };
    static ERROR_HANDLER: RefCell<Option<Box<ErrorHandler>>> = const { RefCell::new(None) };
}

/// Install a handler invoked on every error emission. Pass `None` to restore the
/// default *ignore* behavior (store only, matching `BGP_ERR_IGN`).
pub fn set_error_handler(handler: Option<Box<ErrorHandler>>) {
    ERROR_HANDLER.with(|h| *h.borrow_mut() = handler);
}

/// Sentinel handler terminating the process on the first error, after logging it
/// (`BGP_ERR_QUIT` equivalent). There is no portable, safe stack trace to capture
/// here, so this relies on `RUST_BACKTRACE` and `log` for diagnostics.
pub fn abort_handler(code: ErrorCode, loc: SourceLocation) {
    log::error!("fatal: {code:?} at {loc}");
    std::process::abort();
}

/// Current thread's last reported error code, if any. Getters never clear the slot.
pub fn last_error() -> Option<ErrorCode> {
    LAST_ERROR.with(|c| *c.borrow())
}

#[doc(hidden)]
pub fn report_error(code: ErrorCode, loc: SourceLocation) {
    LAST_ERROR.with(|c| *c.borrow_mut() = Some(code));
    ERROR_HANDLER.with(|h| {
        if let Some(f) = h.borrow().as_ref() {
            f(code, loc);
        }
    });
}

/// Report a [`ParserError`] through the thread-local carrier, returning it
/// unchanged so call sites can do `return Err(report!(ParserError::BadMarker))`.
#[macro_export]
macro_rules! report {
    ($err:expr) => {{
        let e = $err;
        $crate::error::report_error(
            $crate::error::ErrorCode::from(&e),
            $crate::error::SourceLocation {
                file: file!(),
                line: line!(),
            },
        );
        e
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_category_partition() {
        assert!(ParserError::BadJump.is_vm_error());
        assert!(!ParserError::BadJump.is_message_error());
        assert!(ParserError::BadMarker.is_message_error());
        assert!(ParserError::TruncatedMrt.is_mrt_error());
    }

    #[test]
    fn last_error_getter_is_idempotent() {
        set_error_handler(None);
        let _ = report!(ParserError::BadMarker);
        assert_eq!(last_error(), Some(ErrorCode::BadMarker));
        assert_eq!(last_error(), Some(ErrorCode::BadMarker));
    }
}
