//! Boolean community-match expression tree for `COMMTCH` (spec §4.5).
//!
//! Grounded on the teacher's `Community`/`ExtendedCommunity`/`LargeCommunity`
//! wire shapes (reused here via [`crate::iters::community::CommunityWord`])
//! for the literal encodings; the boolean-tree evaluator itself has no
//! teacher counterpart (the teacher's filters only ever test "contains one
//! community", never an AND/OR/NOT tree) and is written directly from the
//! spec's "boolean expression tree over community literals" wording.

use crate::error::ParserError;
use crate::iters::community::CommunityWord;
use crate::report;

/// Mirrors `MAX_GROUP_DEPTH` in `asmatch`: both match-expression languages
/// share the same "bounded nesting, else a program error" discipline spec
/// §4.5 requires of `ASMTCH` and extends here to `COMMTCH`.
const MAX_DEPTH: usize = 32;

#[derive(Debug, Clone)]
pub enum CommExpr {
    Literal(CommunityWord),
    Not(Box<CommExpr>),
    And(Box<CommExpr>, Box<CommExpr>),
    Or(Box<CommExpr>, Box<CommExpr>),
}

impl CommExpr {
    fn depth(&self) -> usize {
        match self {
            CommExpr::Literal(_) => 1,
            CommExpr::Not(inner) => 1 + inner.depth(),
            CommExpr::And(a, b) | CommExpr::Or(a, b) => 1 + a.depth().max(b.depth()),
        }
    }

    /// Rejects over-deep trees before they ever reach `COMMTCH`'s evaluator;
    /// called once at program-build time (see `ProgramBuilder::add_comm_expr`).
    pub fn validate(&self) -> Result<(), ParserError> {
        if self.depth() > MAX_DEPTH {
            return Err(report!(ParserError::BadCommMatch(
                "expression tree exceeds max nesting depth".into()
            )));
        }
        Ok(())
    }

    /// True iff this expression is satisfied by the community words attached
    /// to the message being evaluated, no semantic interpretation beyond
    /// raw-word equality (the `iters::community` layer already stops short
    /// of decoding well-known meanings; `COMMTCH` tests literal identity
    /// only, matching spec §4.3's "no semantic interpretation is done at
    /// this layer").
    pub fn eval(&self, present: &[CommunityWord]) -> bool {
        match self {
            CommExpr::Literal(w) => present.contains(w),
            CommExpr::Not(inner) => !inner.eval(present),
            CommExpr::And(a, b) => a.eval(present) && b.eval(present),
            CommExpr::Or(a, b) => a.eval(present) || b.eval(present),
        }
    }

    /// Serializes this expression tree as a tag-prefixed byte stream, used by
    /// `Program::to_bytes` (spec §6 "VM program format ... constant pool
    /// (type-tagged entries)"). Literal community words are stored at their
    /// native wire width (4/8/12 bytes) rather than padded to a common size.
    pub fn encode(&self, out: &mut Vec<u8>) {
        match self {
            CommExpr::Literal(CommunityWord::Plain(w)) => {
                out.push(0);
                out.push(0);
                out.extend_from_slice(w);
            }
            CommExpr::Literal(CommunityWord::Extended(w)) => {
                out.push(0);
                out.push(1);
                out.extend_from_slice(w);
            }
            CommExpr::Literal(CommunityWord::Large(w)) => {
                out.push(0);
                out.push(2);
                out.extend_from_slice(w);
            }
            CommExpr::Not(inner) => {
                out.push(1);
                inner.encode(out);
            }
            CommExpr::And(a, b) => {
                out.push(2);
                a.encode(out);
                b.encode(out);
            }
            CommExpr::Or(a, b) => {
                out.push(3);
                a.encode(out);
                b.encode(out);
            }
        }
    }

    /// Inverse of [`CommExpr::encode`]; advances `pos` past the bytes consumed.
    pub fn decode(buf: &[u8], pos: &mut usize) -> Result<CommExpr, ParserError> {
        let tag = *read_n::<1>(buf, pos)?.first().unwrap();
        Ok(match tag {
            0 => {
                let kind = *read_n::<1>(buf, pos)?.first().unwrap();
                match kind {
                    0 => CommExpr::Literal(CommunityWord::Plain(read_n::<4>(buf, pos)?)),
                    1 => CommExpr::Literal(CommunityWord::Extended(read_n::<8>(buf, pos)?)),
                    2 => CommExpr::Literal(CommunityWord::Large(read_n::<12>(buf, pos)?)),
                    other => return Err(report!(ParserError::BadCommMatch(format!("unknown literal width tag {other}")))),
                }
            }
            1 => CommExpr::Not(Box::new(CommExpr::decode(buf, pos)?)),
            2 => {
                let a = CommExpr::decode(buf, pos)?;
                let b = CommExpr::decode(buf, pos)?;
                CommExpr::And(Box::new(a), Box::new(b))
            }
            3 => {
                let a = CommExpr::decode(buf, pos)?;
                let b = CommExpr::decode(buf, pos)?;
                CommExpr::Or(Box::new(a), Box::new(b))
            }
            other => return Err(report!(ParserError::BadCommMatch(format!("unknown expression tag {other}")))),
        })
    }
}

fn read_n<const N: usize>(buf: &[u8], pos: &mut usize) -> Result<[u8; N], ParserError> {
    let slice = buf
        .get(*pos..*pos + N)
        .ok_or_else(|| report!(ParserError::BadCommMatch("truncated expression encoding".into())))?;
    let mut out = [0u8; N];
    out.copy_from_slice(slice);
    *pos += N;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn and_or_not_compose() {
        let no_export = CommExpr::Literal(CommunityWord::Plain(0xFFFF_FF01u32.to_be_bytes()));
        let no_advertise = CommExpr::Literal(CommunityWord::Plain(0xFFFF_FF02u32.to_be_bytes()));
        let expr = CommExpr::Or(Box::new(no_export.clone()), Box::new(no_advertise));
        let present = vec![CommunityWord::Plain(0xFFFF_FF01u32.to_be_bytes())];
        assert!(expr.eval(&present));
        assert!(!CommExpr::Not(Box::new(no_export)).eval(&present));
    }

    #[test]
    fn over_deep_tree_rejected() {
        let mut expr = CommExpr::Literal(CommunityWord::Plain([0; 4]));
        for _ in 0..=MAX_DEPTH {
            expr = CommExpr::Not(Box::new(expr));
        }
        assert!(expr.validate().is_err());
    }
}
