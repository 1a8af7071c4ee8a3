// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Regular expression → NFA compilation via the `regex-syntax` HIR.
//!
//! The byte alphabet matters: Unicode classes are expanded to UTF-8 byte
//! range sequences, so the resulting machine can be fed a JSON string one
//! byte at a time.

use anyhow::Result;
use regex_syntax::hir::{Class, Hir, HirKind, Look, Repetition};
use regex_syntax::utf8::Utf8Sequences;

use super::{Nfa, StateId};
use crate::error::CompileError;

// Counted repetitions expand by copying their sub-machine; anything this
// large in a property pattern is pathological input.
const MAX_COPIES: u32 = 512;

pub(super) fn pattern(text: &str, opaque: usize) -> Result<Nfa> {
    let mut parser = regex_syntax::Parser::new();
    let hir = parser.parse(text).map_err(|err| CompileError::UnsupportedRegex {
        pattern: text.to_string(),
        reason: err.to_string(),
    })?;

    let (anchor_start, anchor_end, seq) = split_anchors(&hir);

    let mut nfa = Nfa::new();
    if !anchor_start {
        nfa.add_range(0, 0x00, 0xff, 0);
    }
    let mut exit = 0;
    for item in seq {
        exit = compile_hir(&mut nfa, item, exit, text)?;
    }
    let accept = if anchor_end {
        exit
    } else {
        let acc = nfa.add_state();
        nfa.add_eps(exit, acc);
        nfa.add_range(acc, 0x00, 0xff, acc);
        acc
    };
    nfa.set_opaque(accept, opaque);
    Ok(nfa)
}

/// Peel a leading `^` and a trailing `$` off the pattern. Anchors
/// anywhere else are rejected by `compile_hir`.
fn split_anchors(hir: &Hir) -> (bool, bool, Vec<&Hir>) {
    match hir.kind() {
        HirKind::Look(Look::Start) => (true, false, Vec::new()),
        HirKind::Look(Look::End) => (false, true, Vec::new()),
        HirKind::Concat(items) => {
            let mut rest: Vec<&Hir> = items.iter().collect();
            let mut start = false;
            let mut end = false;
            if let Some(HirKind::Look(Look::Start)) = rest.first().map(|h| h.kind()) {
                start = true;
                rest.remove(0);
            }
            if let Some(HirKind::Look(Look::End)) = rest.last().map(|h| h.kind()) {
                end = true;
                rest.pop();
            }
            (start, end, rest)
        }
        _ => (false, false, vec![hir]),
    }
}

/// Compile `hir` starting at `from`; returns the exit state.
fn compile_hir(nfa: &mut Nfa, hir: &Hir, from: StateId, pattern: &str) -> Result<StateId> {
    match hir.kind() {
        HirKind::Empty => Ok(from),

        HirKind::Literal(lit) => {
            let mut cur = from;
            for &b in lit.0.iter() {
                let next = nfa.add_state();
                nfa.add_range(cur, b, b, next);
                cur = next;
            }
            Ok(cur)
        }

        HirKind::Class(class) => Ok(compile_class(nfa, class, from)),

        HirKind::Look(_) => Err(unsupported(
            pattern,
            "look-around is only supported as a leading ^ or trailing $",
        )),

        HirKind::Repetition(rep) => compile_repetition(nfa, rep, from, pattern),

        HirKind::Capture(cap) => compile_hir(nfa, &cap.sub, from, pattern),

        HirKind::Concat(items) => {
            let mut cur = from;
            for item in items {
                cur = compile_hir(nfa, item, cur, pattern)?;
            }
            Ok(cur)
        }

        HirKind::Alternation(items) => {
            let join = nfa.add_state();
            for item in items {
                let exit = compile_hir(nfa, item, from, pattern)?;
                nfa.add_eps(exit, join);
            }
            Ok(join)
        }
    }
}

fn compile_class(nfa: &mut Nfa, class: &Class, from: StateId) -> StateId {
    let to = nfa.add_state();
    match class {
        Class::Bytes(cls) => {
            for r in cls.ranges() {
                nfa.add_range(from, r.start(), r.end(), to);
            }
        }
        Class::Unicode(cls) => {
            for r in cls.ranges() {
                for seq in Utf8Sequences::new(r.start(), r.end()) {
                    let ranges = seq.as_slice();
                    let mut cur = from;
                    for (i, ur) in ranges.iter().enumerate() {
                        let next = if i + 1 == ranges.len() {
                            to
                        } else {
                            nfa.add_state()
                        };
                        nfa.add_range(cur, ur.start, ur.end, next);
                        cur = next;
                    }
                }
            }
        }
    }
    to
}

fn compile_repetition(
    nfa: &mut Nfa,
    rep: &Repetition,
    from: StateId,
    pattern: &str,
) -> Result<StateId> {
    if rep.min > MAX_COPIES || rep.max.is_some_and(|m| m - rep.min > MAX_COPIES) {
        return Err(unsupported(pattern, "counted repetition too large"));
    }

    let mut cur = from;
    for _ in 0..rep.min {
        cur = compile_hir(nfa, &rep.sub, cur, pattern)?;
    }
    match rep.max {
        None => {
            let loop_st = nfa.add_state();
            nfa.add_eps(cur, loop_st);
            let exit = compile_hir(nfa, &rep.sub, loop_st, pattern)?;
            nfa.add_eps(exit, loop_st);
            Ok(loop_st)
        }
        Some(max) => {
            let join = nfa.add_state();
            nfa.add_eps(cur, join);
            for _ in rep.min..max {
                cur = compile_hir(nfa, &rep.sub, cur, pattern)?;
                nfa.add_eps(cur, join);
            }
            Ok(join)
        }
    }
}

fn unsupported(pattern: &str, reason: &str) -> anyhow::Error {
    anyhow::Error::new(CompileError::UnsupportedRegex {
        pattern: pattern.to_string(),
        reason: reason.to_string(),
    })
}
