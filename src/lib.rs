/*!
bgp-vm-parser is a zero-copy BGP-4/MRT decoding library paired with a small
bytecode filter VM for selecting which messages matter to the caller.

It has the following features:
- **zero-copy where it counts**: a [`Message`] can borrow straight out of an
  mmap'd archive page; only the lazily-built attribute offset cache is
  mutable state, and that state is cheap (fixed-size, no allocation).
- **RFC-careful framing**: marker/length/type validation, AS4_PATH merge
  (RFC 6793), ADD_PATH (RFC 7911), and extended messages (RFC 8654) are all
  handled at the framing layer rather than left to callers.
- **MRT archive reconstruction**: TABLE_DUMP and TABLE_DUMPV2 RIB rows
  (including the ADD_PATH-carrying subtypes) rebuild into legal BGP UPDATE
  messages, lax or strict per caller preference.
- **a filter VM, not a filter enum**: [`vm::Bgpvm`] runs a compiled program
  against a message and returns a verdict, so a host can change what it's
  looking for without recompiling the crate that looks.

# Examples

## Framing a BGP message

```
use bgp_vm_parser::message::{Message, MsgFlags};

let mut bytes = vec![0xFFu8; 16];
bytes.extend_from_slice(&[0x00, 0x13, 0x04]); // length 19, type KEEPALIVE
let msg = Message::from_buffer(&bytes, MsgFlags::empty()).unwrap();
assert_eq!(msg.len(), 19);
```

## Running a compiled filter program

```
use bgp_vm_parser::message::{Message, MsgFlags};
use bgp_vm_parser::vm::{Bgpvm, PrefixSet, ProgramBuilder};
use std::str::FromStr;

let mut allowed = PrefixSet::new();
allowed.insert(ipnet::IpNet::from_str("10.0.0.0/8").unwrap());

let mut builder = ProgramBuilder::new();
let set_idx = builder.add_prefix_set(allowed);
builder.pfx_match(set_idx).end();
let program = builder.build().unwrap();

let mut vm = Bgpvm::new();
vm.program(program);
```

# RFCs covered

- [RFC 4271](https://datatracker.ietf.org/doc/html/rfc4271): A Border Gateway Protocol 4 (BGP-4)
- [RFC 4760](https://datatracker.ietf.org/doc/html/rfc4760): Multiprotocol Extensions for BGP-4
- [RFC 4486](https://datatracker.ietf.org/doc/html/rfc4486): Subcodes for BGP Cease Notification Message
- [RFC 4893](https://datatracker.ietf.org/doc/html/rfc4893) / [RFC 6793](https://datatracker.ietf.org/doc/html/rfc6793): BGP Support for Four-Octet AS Number Space
- [RFC 6396](https://datatracker.ietf.org/doc/html/rfc6396): Multi-Threaded Routing Toolkit (MRT) Routing Information Export Format
- [RFC 7606](https://datatracker.ietf.org/doc/html/rfc7606): Revised Error Handling for BGP UPDATE Messages
- [RFC 7911](https://datatracker.ietf.org/doc/html/rfc7911): Advertisement of Multiple Paths in BGP (ADD-PATH)
- [RFC 8654](https://datatracker.ietf.org/doc/html/rfc8654): Extended Message Support for BGP

# Command Line Tool

Built with the `cli` feature, `bgp-vm-parser` bundles a small utility binary
that reads an MRT archive (local path or, with the `remote` feature, an
`http(s)://` URL) and runs a compiled filter program against every message,
printing only the ones that pass.

```bash
cargo install --path . --features cli
bgp-vm-parser --program filter.bin updates.20231029.2015.bz2
```

Run `bgp-vm-parser --help` for the full flag list.
*/

pub mod afi;
pub mod asn;
pub mod endian;
pub mod error;
pub mod iters;
pub mod message;
pub mod mrt;
pub mod notification;
pub mod vm;

pub use asn::{Asn, AsnWidth};
pub use error::ParserError;
pub use message::{Message, MsgFlags, MsgType};
pub use mrt::{MrtRecord, MrtType};
pub use vm::{Bgpvm, Program, ProgramBuilder};
