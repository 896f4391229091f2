//! Compiled AS-path pattern matching for `ASMTCH` (spec §4.5).
//!
//! Patterns are tokenized ASN sequences supporting literals, `.` (any one
//! ASN), `*` (zero or more, postfix), `?` (zero or one, postfix), `|`
//! (alternation), and parenthesized grouping up to a bounded nesting depth.
//! Grounded on the *idea* of an AS-path pattern language from the teacher's
//! `ComparableRegex`-based `as_path` filter (`parser/filter.rs`), but
//! reimplemented as an explicit, budget-bounded NFA (a Pike-style bytecode
//! VM, the same construction `regex`'s own engine uses internally) rather
//! than handing a stringified path to the `regex` crate: the spec requires
//! the compiled size to be inspectable and capped (`as_match_size`), which an
//! opaque external engine can't expose.

use crate::error::ParserError;
use crate::report;

const MAX_GROUP_DEPTH: usize = 16;
/// Per-message heap budget for a compiled pattern, in NFA instructions.
const MAX_PROGRAM_SIZE: usize = 4096;

#[derive(Debug, Clone)]
enum Ast {
    Literal(u32),
    AnyOne,
    Concat(Vec<Ast>),
    Alt(Vec<Ast>),
    Star(Box<Ast>),
    Opt(Box<Ast>),
}

struct Parser {
    tokens: Vec<String>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn new(pattern: &str) -> Self {
        let spaced = pattern.replace('(', " ( ").replace(')', " ) ").replace('|', " | ");
        let tokens = spaced.split_whitespace().map(str::to_owned).collect::<Vec<_>>();
        Parser { tokens, pos: 0, depth: 0 }
    }

    fn peek(&self) -> Option<&str> {
        self.tokens.get(self.pos).map(String::as_str)
    }

    fn bump(&mut self) -> Option<String> {
        let t = self.peek().map(str::to_owned);
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn parse_alt(&mut self) -> Result<Ast, ParserError> {
        let mut branches = vec![self.parse_concat()?];
        while self.peek() == Some("|") {
            self.bump();
            branches.push(self.parse_concat()?);
        }
        Ok(if branches.len() == 1 {
            branches.pop().unwrap()
        } else {
            Ast::Alt(branches)
        })
    }

    fn parse_concat(&mut self) -> Result<Ast, ParserError> {
        let mut atoms = Vec::new();
        while let Some(tok) = self.peek().map(str::to_owned) {
            if tok == "|" || tok == ")" {
                break;
            }
            atoms.push(self.parse_postfixed_atom()?);
        }
        if atoms.is_empty() {
            return Err(report!(ParserError::BadAsMatch("empty alternative".into())));
        }
        Ok(Ast::Concat(atoms))
    }

    fn parse_postfixed_atom(&mut self) -> Result<Ast, ParserError> {
        let atom = self.parse_atom()?;
        match self.peek() {
            Some("*") => {
                self.bump();
                Ok(Ast::Star(Box::new(atom)))
            }
            Some("?") => {
                self.bump();
                Ok(Ast::Opt(Box::new(atom)))
            }
            _ => Ok(atom),
        }
    }

    fn parse_atom(&mut self) -> Result<Ast, ParserError> {
        match self.bump().as_deref() {
            Some("(") => {
                self.depth += 1;
                if self.depth > MAX_GROUP_DEPTH {
                    return Err(report!(ParserError::AsGrpLimit));
                }
                let inner = self.parse_alt()?;
                self.depth -= 1;
                if self.bump().as_deref() != Some(")") {
                    return Err(report!(ParserError::BadAsMatch("unbalanced group".into())));
                }
                Ok(inner)
            }
            Some(".") => Ok(Ast::AnyOne),
            Some(tok) => tok
                .parse::<u32>()
                .map(Ast::Literal)
                .map_err(|_| report!(ParserError::BadAsMatch(format!("not an ASN or operator: {tok}")))),
            None => Err(report!(ParserError::BadAsMatch("unexpected end of pattern".into()))),
        }
    }
}

/// A single Pike-VM instruction over the token alphabet (ASNs), mirroring
/// the same bytecode shape `regex`'s internal engine compiles a character
/// regex down to.
#[derive(Debug, Clone, Copy)]
enum Inst {
    Char(u32),
    Any,
    Split(usize, usize),
    Jmp(usize),
    Match,
}

struct Compiler {
    prog: Vec<Inst>,
}

impl Compiler {
    fn emit(&mut self, ast: &Ast) -> Result<(), ParserError> {
        match ast {
            Ast::Literal(v) => self.prog.push(Inst::Char(*v)),
            Ast::AnyOne => self.prog.push(Inst::Any),
            Ast::Concat(items) => {
                for i in items {
                    self.emit(i)?;
                }
            }
            Ast::Alt(branches) => {
                // split -> branch1; jmp end; branch2; ...; end:
                let mut jmp_fixups = Vec::new();
                for (i, b) in branches.iter().enumerate() {
                    if i + 1 < branches.len() {
                        let split_pc = self.prog.len();
                        self.prog.push(Inst::Split(0, 0)); // fixed up below
                        self.emit(b)?;
                        let jmp_pc = self.prog.len();
                        self.prog.push(Inst::Jmp(0));
                        jmp_fixups.push(jmp_pc);
                        let next_pc = self.prog.len();
                        self.prog[split_pc] = Inst::Split(split_pc + 1, next_pc);
                    } else {
                        self.emit(b)?;
                    }
                }
                let end = self.prog.len();
                for pc in jmp_fixups {
                    self.prog[pc] = Inst::Jmp(end);
                }
            }
            Ast::Star(inner) => {
                let split_pc = self.prog.len();
                self.prog.push(Inst::Split(0, 0));
                let body_start = self.prog.len();
                self.emit(inner)?;
                self.prog.push(Inst::Jmp(split_pc));
                let end = self.prog.len();
                self.prog[split_pc] = Inst::Split(body_start, end);
            }
            Ast::Opt(inner) => {
                let split_pc = self.prog.len();
                self.prog.push(Inst::Split(0, 0));
                let body_start = self.prog.len();
                self.emit(inner)?;
                let end = self.prog.len();
                self.prog[split_pc] = Inst::Split(body_start, end);
            }
        }
        if self.prog.len() > MAX_PROGRAM_SIZE {
            return Err(report!(ParserError::AsMatchSize));
        }
        Ok(())
    }
}

/// A compiled AS-path pattern, ready to test against merged-path sequences.
/// Retains its source text so a [`crate::vm::Program`] built from it can
/// round-trip through `to_bytes`/`from_bytes`: the NFA itself has no
/// practical un-compile step, but recompiling from `source` on load is cheap
/// and keeps the wire format independent of this module's internal `Inst`
/// encoding.
pub struct AsPattern {
    prog: Vec<Inst>,
    source: String,
}

impl AsPattern {
    pub fn compile(pattern: &str) -> Result<Self, ParserError> {
        let mut parser = Parser::new(pattern);
        let ast = parser.parse_alt()?;
        if parser.peek().is_some() {
            return Err(report!(ParserError::BadAsMatch("trailing tokens after pattern".into())));
        }
        let mut compiler = Compiler { prog: Vec::new() };
        compiler.emit(&ast)?;
        compiler.prog.push(Inst::Match);
        Ok(AsPattern {
            prog: compiler.prog,
            source: pattern.to_owned(),
        })
    }

    /// The pattern text this value was compiled from.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// True iff `seq` contains some contiguous run matching the pattern
    /// (spec's `ASMTCH` evaluates over the AS-sequence portion of the merged
    /// path; AS_SETs contribute one candidate branch per element, handled by
    /// the caller re-running this per candidate substitution).
    pub fn matches(&self, seq: &[u32]) -> bool {
        for start in 0..=seq.len() {
            if self.matches_at(seq, start) {
                return true;
            }
        }
        false
    }

    fn matches_at(&self, seq: &[u32], start: usize) -> bool {
        // Pike VM (thread list) simulation, no backtracking blowup.
        let mut clist: Vec<usize> = Vec::new();
        let mut nlist: Vec<usize> = Vec::new();
        add_thread(&self.prog, &mut clist, 0);
        let mut pos = start;
        loop {
            if clist.iter().any(|&pc| matches!(self.prog[pc], Inst::Match)) {
                return true;
            }
            if pos >= seq.len() {
                return false;
            }
            nlist.clear();
            for &pc in &clist {
                match self.prog[pc] {
                    Inst::Char(v) if v == seq[pos] => add_thread(&self.prog, &mut nlist, pc + 1),
                    Inst::Any => add_thread(&self.prog, &mut nlist, pc + 1),
                    _ => {}
                }
            }
            if nlist.is_empty() {
                return false;
            }
            std::mem::swap(&mut clist, &mut nlist);
            pos += 1;
        }
    }
}

fn add_thread(prog: &[Inst], list: &mut Vec<usize>, pc: usize) {
    if list.contains(&pc) {
        return;
    }
    match prog[pc] {
        Inst::Split(a, b) => {
            add_thread(prog, list, a);
            add_thread(prog, list, b);
        }
        Inst::Jmp(a) => add_thread(prog, list, a),
        _ => list.push(pc),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_sequence_matches() {
        let pat = AsPattern::compile("65000 . 80000").unwrap();
        assert!(pat.matches(&[65000, 70000, 80000]));
        assert!(!pat.matches(&[65000, 80000]));
    }

    #[test]
    fn star_matches_zero_or_more() {
        let pat = AsPattern::compile("65000 100* 80000").unwrap();
        assert!(pat.matches(&[65000, 80000]));
        assert!(pat.matches(&[65000, 100, 100, 80000]));
    }

    #[test]
    fn alternation_and_grouping() {
        let pat = AsPattern::compile("(65000|65001) 80000").unwrap();
        assert!(pat.matches(&[65001, 80000]));
        assert!(!pat.matches(&[65002, 80000]));
    }

    #[test]
    fn group_depth_limit_enforced() {
        let mut pattern = String::new();
        for _ in 0..=MAX_GROUP_DEPTH {
            pattern.push('(');
        }
        pattern.push_str("65000");
        for _ in 0..=MAX_GROUP_DEPTH {
            pattern.push(')');
        }
        let err = AsPattern::compile(&pattern).unwrap_err();
        assert!(matches!(err, ParserError::AsGrpLimit));
    }
}
