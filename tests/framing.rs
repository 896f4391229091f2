//! End-to-end message-framing scenarios (spec §8): boundaries and the three
//! concrete framing scenarios spec.md lists verbatim.

use bgp_vm_parser::message::{Message, MsgFlags};
use bgp_vm_parser::{MsgType, ParserError};

fn keepalive(length_hi_lo: [u8; 2]) -> Vec<u8> {
    let mut bytes = vec![0xFFu8; 16];
    bytes.extend_from_slice(&length_hi_lo);
    bytes.push(0x04);
    bytes
}

/// Scenario 1: 16 bytes 0xFF + 0x00 0x13 + 0x04 -> KEEPALIVE, no body.
#[test]
fn keepalive_framing_scenario() {
    let bytes = keepalive([0x00, 0x13]);
    let mut msg = Message::from_buffer(&bytes, MsgFlags::empty()).unwrap();
    assert_eq!(msg.msg_type(), MsgType::Keepalive);
    assert_eq!(msg.len(), 19);
    msg.clear();
    msg.clear(); // idempotent past the allocator
    assert_eq!(msg.len(), 0);
}

/// Scenario 2: identical but first marker byte is 0x00 -> bad_marker, no
/// buffer kept.
#[test]
fn malformed_marker_rejected() {
    let mut bytes = keepalive([0x00, 0x13]);
    bytes[0] = 0x00;
    let err = Message::from_buffer(&bytes, MsgFlags::empty()).unwrap_err();
    assert!(matches!(err, ParserError::BadMarker));
}

/// Length boundary: 19 (header only) accepted, 18 rejected as truncated.
#[test]
fn length_19_accepted_18_rejected() {
    let ok = keepalive([0x00, 0x13]);
    assert!(Message::from_buffer(&ok, MsgFlags::empty()).is_ok());

    let mut short = keepalive([0x00, 0x12]);
    short.truncate(18);
    let err = Message::from_buffer(&short, MsgFlags::empty()).unwrap_err();
    assert!(matches!(err, ParserError::TruncatedMsg));
}

fn padded_update(total_len: usize) -> Vec<u8> {
    let mut bytes = vec![0xFFu8; 16];
    bytes.extend_from_slice(&(total_len as u16).to_be_bytes());
    bytes.push(0x02); // UPDATE
    bytes.extend_from_slice(&[0x00, 0x00]); // withdrawn len
    bytes.extend_from_slice(&[0x00, 0x00]); // TPA len
    bytes.resize(total_len, 0);
    bytes
}

/// Length = 4096 accepted without the extended flag; 4097 rejected.
#[test]
fn non_extended_length_boundary() {
    let at_limit = padded_update(4096);
    assert!(Message::from_buffer(&at_limit, MsgFlags::empty()).is_ok());

    let over_limit = padded_update(4097);
    let err = Message::from_buffer(&over_limit, MsgFlags::empty()).unwrap_err();
    assert!(matches!(err, ParserError::Oversized));
}

/// With the extended flag the window widens to 65535; a length past the
/// non-extended limit (4097) that would be rejected without the flag is
/// accepted with it, up to the 65535 ceiling the 2-byte length field allows.
#[test]
fn extended_length_boundary() {
    let at_limit = padded_update(65535);
    assert!(Message::from_buffer(&at_limit, MsgFlags::EXTENDED).is_ok());

    let past_non_extended_limit = padded_update(4097);
    assert!(Message::from_buffer(&past_non_extended_limit, MsgFlags::EXTENDED).is_ok());
    let err = Message::from_buffer(&past_non_extended_limit, MsgFlags::empty()).unwrap_err();
    assert!(matches!(err, ParserError::Oversized));
}

/// Scenario 3: ADD_PATH v4 NLRI `[path_id=7, width=24, 10.0.0]` yields
/// `(afi=v4, width=24, bytes=10.0.0, path_id=7)` exactly once.
#[test]
fn add_path_v4_nlri_yields_single_prefix() {
    use bgp_vm_parser::iters::iterate_prefixes;

    let mut body = Vec::new();
    body.extend_from_slice(&[0x00, 0x00]); // withdrawn len
    body.extend_from_slice(&[0x00, 0x00]); // TPA len
    body.extend_from_slice(&7u32.to_be_bytes()); // path id
    body.push(24); // width
    body.extend_from_slice(&[10, 0, 0]); // prefix bytes

    let mut bytes = vec![0xFFu8; 16];
    let total = 19 + body.len();
    bytes.extend_from_slice(&(total as u16).to_be_bytes());
    bytes.push(0x02);
    bytes.extend_from_slice(&body);

    let msg = Message::from_buffer(&bytes, MsgFlags::ADD_PATH).unwrap();
    let prefixes = iterate_prefixes(&msg).unwrap();
    assert_eq!(prefixes.len(), 1);
    let (_, p) = &prefixes[0];
    assert_eq!(p.width_bits, 24);
    assert_eq!(p.bytes, &[10, 0, 0]);
    assert_eq!(p.path_id, Some(7));
}

/// Prefix width 0 is valid; width 33 (IPv4) is `bad_prefix_width`.
#[test]
fn prefix_width_boundaries() {
    use bgp_vm_parser::iters::iterate_prefixes;

    let build = |width: u8, prefix_bytes: &[u8]| -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&[0x00, 0x00]);
        body.extend_from_slice(&[0x00, 0x00]);
        body.push(width);
        body.extend_from_slice(prefix_bytes);
        let mut bytes = vec![0xFFu8; 16];
        let total = 19 + body.len();
        bytes.extend_from_slice(&(total as u16).to_be_bytes());
        bytes.push(0x02);
        bytes.extend_from_slice(&body);
        bytes
    };

    let zero_width = build(0, &[]);
    let msg = Message::from_buffer(&zero_width, MsgFlags::empty()).unwrap();
    let prefixes = iterate_prefixes(&msg).unwrap();
    assert_eq!(prefixes[0].1.width_bits, 0);

    let too_wide = build(33, &[10, 0, 0, 0]);
    let msg = Message::from_buffer(&too_wide, MsgFlags::empty()).unwrap();
    let err = iterate_prefixes(&msg).unwrap_err();
    assert!(matches!(err, ParserError::BadPrefixWidth(33)));
}

/// Typed-view accessor contract: requesting the wrong view fails `bad_type`.
#[test]
fn typed_view_mismatch_is_bad_type() {
    let bytes = keepalive([0x00, 0x13]);
    let msg = Message::from_buffer(&bytes, MsgFlags::empty()).unwrap();
    let err = msg.as_update().unwrap_err();
    assert!(matches!(err, ParserError::BadType));
}
