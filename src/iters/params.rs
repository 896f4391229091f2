//! OPEN optional-parameter and capability iteration (SPEC_FULL.md §7
//! supplement: spec.md's Iterators row mentions "capabilities" but spec §4
//! never details the wire shape, so this is filled in from RFC 5492/2858/
//! 2918/6793/7911, in the teacher's `capabilities.rs` idiom).

use crate::error::ParserError;
use crate::message::OpenView;
use crate::report;

/// OPEN optional parameter type codes (RFC 5492 reserves 2 for CAPABILITY;
/// this crate only has use for that one, everything else is opaque).
const PARAM_CAPABILITY: u8 = 2;

#[derive(Debug, Clone, Copy)]
pub struct Param<'a> {
    pub param_type: u8,
    pub value: &'a [u8],
}

/// Lazy cursor over `opt_params`.
pub struct ParamIter<'a> {
    buf: &'a [u8],
    cursor: usize,
}

impl<'a> ParamIter<'a> {
    pub fn new(open: &OpenView<'a>) -> Self {
        ParamIter {
            buf: open.opt_params(),
            cursor: 0,
        }
    }
}

impl<'a> Iterator for ParamIter<'a> {
    type Item = Result<Param<'a>, ParserError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor >= self.buf.len() {
            return None;
        }
        let param_type = self.buf[self.cursor];
        let len = match self.buf.get(self.cursor + 1) {
            Some(&l) => l as usize,
            None => return Some(Err(report!(ParserError::TruncatedAttribute))),
        };
        let value = match self.buf.get(self.cursor + 2..self.cursor + 2 + len) {
            Some(v) => v,
            None => return Some(Err(report!(ParserError::TruncatedAttribute))),
        };
        self.cursor += 2 + len;
        Some(Ok(Param { param_type, value }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Multiprotocol { afi: u16, safi: u8 },
    RouteRefresh,
    GracefulRestart,
    FourOctetAsn(u32),
    AddPath { afi: u16, safi: u8, send: bool, receive: bool },
    Unknown { code: u8 },
}

/// Flattens every CAPABILITY optional parameter into its individual
/// capability entries (a single OPEN param can carry several back to back).
pub fn iterate_capabilities<'a>(open: &OpenView<'a>) -> impl Iterator<Item = Result<Capability, ParserError>> + 'a {
    ParamIter::new(open).flat_map(|p| -> Vec<Result<Capability, ParserError>> {
        let p = match p {
            Ok(p) => p,
            Err(e) => return vec![Err(e)],
        };
        if p.param_type != PARAM_CAPABILITY {
            return vec![];
        }
        let mut out = Vec::new();
        let mut cursor = 0usize;
        while cursor < p.value.len() {
            let code = p.value[cursor];
            let len = match p.value.get(cursor + 1) {
                Some(&l) => l as usize,
                None => {
                    out.push(Err(report!(ParserError::TruncatedAttribute)));
                    break;
                }
            };
            let body = match p.value.get(cursor + 2..cursor + 2 + len) {
                Some(b) => b,
                None => {
                    out.push(Err(report!(ParserError::TruncatedAttribute)));
                    break;
                }
            };
            out.push(decode_capability(code, body));
            cursor += 2 + len;
        }
        out
    })
}

fn decode_capability(code: u8, body: &[u8]) -> Result<Capability, ParserError> {
    match code {
        1 if body.len() == 4 => Ok(Capability::Multiprotocol {
            afi: crate::endian::read_u16(&body[0..2]),
            safi: body[3],
        }),
        2 => Ok(Capability::RouteRefresh),
        64 => Ok(Capability::GracefulRestart),
        65 if body.len() == 4 => Ok(Capability::FourOctetAsn(crate::endian::read_u32(body))),
        69 if body.len() >= 4 => Ok(Capability::AddPath {
            afi: crate::endian::read_u16(&body[0..2]),
            safi: body[2],
            send: body[3] & 0x01 != 0,
            receive: body[3] & 0x02 != 0,
        }),
        _ => Ok(Capability::Unknown { code }),
    }
}
