//! End-to-end MRT record parsing and reconstruction scenarios (spec §4.4,
//! §8 scenario 5): bytes -> MrtRecord -> rebuild_from_rib -> same downstream
//! pipeline as a live-decoded message.

use bgp_vm_parser::afi::Afi;
use bgp_vm_parser::iters::iterate_prefixes;
use bgp_vm_parser::message::MsgFlags;
use bgp_vm_parser::mrt::{self, MrtRecord, MrtType, RibEntry};
use bgp_vm_parser::ParserError;

fn encode_origin_attr() -> Vec<u8> {
    // flags=0x40 (well-known transitive), code=1 (ORIGIN), len=1, value=0 (IGP)
    vec![0x40, 1, 1, 0]
}

/// A full TABLE_DUMPV2 RIB_IPV4_UNICAST MRT record containing one entry,
/// parsed via `MrtRecord::parse` and then reconstructed end to end.
#[test]
fn full_v4_rib_record_pipeline() {
    let attrs = encode_origin_attr();

    let mut rib_body = Vec::new();
    rib_body.extend_from_slice(&7u32.to_be_bytes()); // sequence number
    rib_body.push(24); // prefix width
    rib_body.extend_from_slice(&[192, 0, 2]); // prefix bytes
    rib_body.extend_from_slice(&1u16.to_be_bytes()); // entry count

    rib_body.extend_from_slice(&0u16.to_be_bytes()); // peer index
    rib_body.extend_from_slice(&1_700_000_000u32.to_be_bytes()); // originated time
    rib_body.extend_from_slice(&(attrs.len() as u16).to_be_bytes());
    rib_body.extend_from_slice(&attrs);

    let mut record_bytes = Vec::new();
    record_bytes.extend_from_slice(&1_700_000_000u32.to_be_bytes());
    record_bytes.extend_from_slice(&(MrtType::TableDumpV2 as u16).to_be_bytes());
    record_bytes.extend_from_slice(&2u16.to_be_bytes()); // RIB_IPV4_UNICAST subtype
    record_bytes.extend_from_slice(&(rib_body.len() as u32).to_be_bytes());
    record_bytes.extend_from_slice(&rib_body);

    let (record, rest) = MrtRecord::parse(&record_bytes).unwrap();
    assert!(rest.is_empty());
    assert_eq!(record.mrt_type().unwrap(), MrtType::TableDumpV2);

    let parsed = mrt::parse_rib_afi_record(record.body, false).unwrap();
    assert_eq!(parsed.rows.len(), 1);
    let entry = parsed.rows[0].to_entry(Afi::Ipv4, parsed.prefix_bytes, parsed.prefix_width);

    let msg = mrt::rebuild_from_rib(&entry, MsgFlags::empty()).unwrap();
    // spec §8 invariant 4: rebuilt message passes framing validation and
    // yields exactly one prefix equal to the RIB key.
    let prefixes = iterate_prefixes(&msg).unwrap();
    assert_eq!(prefixes.len(), 1);
    assert_eq!(prefixes[0].1.bytes, &[192, 0, 2]);
    assert_eq!(prefixes[0].1.width_bits, 24);
}

/// Spec §8 scenario 5: TABLE_DUMPV2 RIB_IPV6_UNICAST entry with a
/// non-standard (AFI/SAFI-embedded) MP_REACH. Lax mode reconstructs;
/// strict mode fails `bad_ribv2_mp_reach`.
#[test]
fn v6_lax_vs_strict_mp_reach_reconstruction() {
    let mut mp_reach_value = vec![0x00, 0x02, 0x01, 16]; // AFI=2 SAFI=1 nh_len=16
    mp_reach_value.extend_from_slice(&[0u8; 16]); // next hop
    mp_reach_value.push(0); // reserved, no NLRI needed for this check
    let mut attrs = Vec::new();
    attrs.push(0xC0); // optional, transitive, partial
    attrs.push(14); // MP_REACH_NLRI
    attrs.push(mp_reach_value.len() as u8);
    attrs.extend_from_slice(&mp_reach_value);

    let entry = RibEntry {
        afi: Afi::Ipv6,
        prefix_bytes: &[0x20, 0x01, 0x0d, 0xb8],
        prefix_width: 32,
        path_id: None,
        attrs: &attrs,
    };

    assert!(mrt::rebuild_from_rib(&entry, MsgFlags::empty()).is_ok());
    let err = mrt::rebuild_from_rib(&entry, MsgFlags::STRICT_RFC6396).unwrap_err();
    assert!(matches!(err, ParserError::BadRibV2MpReach));
}

/// An IPv6 RIB entry with no MP_REACH at all is `rib_no_mp_reach`.
#[test]
fn v6_rib_without_mp_reach_is_rejected() {
    let attrs = encode_origin_attr();
    let entry = RibEntry {
        afi: Afi::Ipv6,
        prefix_bytes: &[0x20, 0x01],
        prefix_width: 16,
        path_id: None,
        attrs: &attrs,
    };
    let err = mrt::rebuild_from_rib(&entry, MsgFlags::empty()).unwrap_err();
    assert!(matches!(err, ParserError::RibNoMpReach));
}

/// `strip_unreach` drops MP_UNREACH from the rebuilt attribute set entirely;
/// observed here through the VM's `HASATTR` opcode, the only public way to
/// probe TPA membership from outside the crate.
#[test]
fn strip_unreach_removes_attribute() {
    use bgp_vm_parser::vm::{Bgpvm, ProgramBuilder};

    let origin = encode_origin_attr();
    let mut mp_unreach_value = vec![0x00, 0x01, 0x01]; // AFI=1 SAFI=1
    mp_unreach_value.push(24);
    mp_unreach_value.extend_from_slice(&[10, 0, 0]);
    let mut mp_unreach_attr = vec![0xC0, 15, mp_unreach_value.len() as u8];
    mp_unreach_attr.extend_from_slice(&mp_unreach_value);

    let mut attrs = Vec::new();
    attrs.extend_from_slice(&origin);
    attrs.extend_from_slice(&mp_unreach_attr);

    let entry = RibEntry {
        afi: Afi::Ipv4,
        prefix_bytes: &[192, 0, 2],
        prefix_width: 24,
        path_id: None,
        attrs: &attrs,
    };

    let mut has_unreach = ProgramBuilder::new();
    has_unreach.has_attr(15).end();
    let program = has_unreach.build().unwrap();

    let kept = mrt::rebuild_from_rib(&entry, MsgFlags::empty()).unwrap();
    let mut vm = Bgpvm::new();
    vm.program(program);
    assert!(vm.run(&kept).unwrap());

    let stripped = mrt::rebuild_from_rib(&entry, MsgFlags::STRIP_UNREACH).unwrap();
    assert!(!vm.run(&stripped).unwrap());
}
