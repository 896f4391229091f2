//! End-to-end filter-VM scenarios driven off full wire messages (spec §8).

use bgp_vm_parser::iters::AsPathView;
use bgp_vm_parser::message::{Message, MsgFlags};
use bgp_vm_parser::vm::{Bgpvm, CommExpr, PrefixSet, ProgramBuilder};
use std::str::FromStr;

fn segment(seg_type: u8, asns: &[(u32, bool)]) -> Vec<u8> {
    let mut out = vec![seg_type, asns.len() as u8];
    for &(value, four_byte) in asns {
        if four_byte {
            out.extend_from_slice(&value.to_be_bytes());
        } else {
            out.extend_from_slice(&(value as u16).to_be_bytes());
        }
    }
    out
}

fn update_with_attrs(attrs: &[u8], nlri: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(&[0x00, 0x00]); // withdrawn len
    body.extend_from_slice(&(attrs.len() as u16).to_be_bytes());
    body.extend_from_slice(attrs);
    body.extend_from_slice(nlri);

    let mut bytes = vec![0xFFu8; 16];
    let total = 19 + body.len();
    bytes.extend_from_slice(&(total as u16).to_be_bytes());
    bytes.push(0x02);
    bytes.extend_from_slice(&body);
    bytes
}

fn attr(flags: u8, code: u8, value: &[u8]) -> Vec<u8> {
    let mut out = vec![flags, code, value.len() as u8];
    out.extend_from_slice(value);
    out
}

/// Spec §8 scenario 4: 16-bit session, AS_PATH = SEQUENCE[65000, AS_TRANS,
/// AS_TRANS], AS4_PATH = SEQUENCE[70000, 80000] -> merged [65000, 70000, 80000].
#[test]
fn as4_merge_end_to_end() {
    let as_path_value = segment(2, &[(65000, false), (23456, false), (23456, false)]);
    let as4_path_value = segment(2, &[(70000, true), (80000, true)]);

    let mut attrs = Vec::new();
    attrs.extend_from_slice(&attr(0x40, 2, &as_path_value));
    attrs.extend_from_slice(&attr(0xC0, 17, &as4_path_value));

    let bytes = update_with_attrs(&attrs, &[24, 10, 0, 0]);
    let msg = Message::from_buffer(&bytes, MsgFlags::empty()).unwrap();

    let view = AsPathView::build(&msg).unwrap();
    let flat: Vec<u32> = view.iter().map(|e| e.asn.to_u32()).collect();
    assert_eq!(flat, vec![65000, 70000, 80000]);
}

/// `ASMTCH` over a message whose merged AS path matches the compiled
/// pattern; combined with `PFXMTCH` via `AND`.
#[test]
fn combined_prefix_and_aspath_filter() {
    let as_path_value = segment(2, &[(65000, true), (70000, true), (80000, true)]);
    let attrs = attr(0x40, 2, &as_path_value);
    let bytes = update_with_attrs(&attrs, &[16, 10, 1]);
    let msg = Message::from_buffer(&bytes, MsgFlags::ASN32BIT).unwrap();

    let mut set = PrefixSet::new();
    set.insert(ipnet::IpNet::from_str("10.0.0.0/8").unwrap());

    let mut builder = ProgramBuilder::new();
    let set_idx = builder.add_prefix_set(set);
    let pat_idx = builder.add_as_pattern("65000 .* 80000").unwrap();
    builder.pfx_match(set_idx);
    builder.as_match(pat_idx);
    builder.and();
    builder.end();
    let program = builder.build().unwrap();

    let mut vm = Bgpvm::new();
    vm.program(program);
    assert!(vm.run(&msg).unwrap());
}

/// `COMMTCH` with an `OR` expression over two well-known communities.
#[test]
fn community_match_or_expression() {
    use bgp_vm_parser::iters::community::{well_known, CommunityWord};

    let comm_attr = attr(0xC0, 8, &well_known::NO_EXPORT);
    let bytes = update_with_attrs(&comm_attr, &[24, 192, 0, 2]);
    let msg = Message::from_buffer(&bytes, MsgFlags::empty()).unwrap();

    let expr = CommExpr::Or(
        Box::new(CommExpr::Literal(CommunityWord::Plain(well_known::NO_EXPORT))),
        Box::new(CommExpr::Literal(CommunityWord::Plain(well_known::NO_ADVERTISE))),
    );

    let mut builder = ProgramBuilder::new();
    let expr_idx = builder.add_comm_expr(expr).unwrap();
    builder.comm_match(expr_idx).end();
    let program = builder.build().unwrap();

    let mut vm = Bgpvm::new();
    vm.program(program);
    assert!(vm.run(&msg).unwrap());
}

/// A decode error surfaced while evaluating a message-query opcode halts
/// the VM with `msg_err` wrapping the underlying cause (spec §4.5/§7).
#[test]
fn underlying_decode_error_becomes_msg_err() {
    use bgp_vm_parser::ParserError;

    // AS_PATH segment claims 2 sequence ASNs (4 bytes) but the attribute
    // value only carries 2 bytes worth: truncated partway through the
    // segment's ASN list.
    let mut as_path_value = vec![2u8, 2]; // SEQUENCE, count=2
    as_path_value.extend_from_slice(&65000u16.to_be_bytes()); // only one ASN present
    let bad_as_path = attr(0x40, 2, &as_path_value);
    let bytes = update_with_attrs(&bad_as_path, &[24, 10, 0, 0]);
    let msg = Message::from_buffer(&bytes, MsgFlags::empty()).unwrap();

    let mut builder = ProgramBuilder::new();
    let pat_idx = builder.add_as_pattern("*").unwrap();
    builder.as_match(pat_idx).end();
    let program = builder.build().unwrap();

    let mut vm = Bgpvm::new();
    vm.program(program);
    let err = vm.run(&msg).unwrap_err();
    assert!(matches!(err, ParserError::MsgErr(_)));
}
