// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Union-DFA compilation for a MATCH_SWITCH's cases.
//!
//! Every case's literals and patterns are compiled to NFAs carrying the
//! case index as their end-state payload, unioned in insertion order and
//! determinized. A DFA end state subsuming several cases triggers the
//! merge rule: the later case's constraints fold into the earlier one
//! (token-consuming SWITCH constraints append, token-pure checks
//! prepend) and the absorbed case is dropped, with surviving indices
//! compacted densely.

use anyhow::Result;

use super::{and_of, Cnode, MatchCase};
use crate::ast::Dialect;
use crate::fsm::{Dfa, Nfa};

pub(super) fn compile(cases: &mut Vec<MatchCase>) -> Result<Dfa> {
    let mut nfa = Nfa::new();
    for (ix, case) in cases.iter().enumerate() {
        for ms in &case.matchset {
            let sub = match ms.dialect {
                Dialect::Literal => Nfa::literal(&ms.text, ix),
                Dialect::Native => Nfa::pattern(&ms.text, ix)?,
            };
            nfa.union(&sub);
        }
    }

    let mut merged_into: Vec<Option<usize>> = vec![None; cases.len()];
    let mut dfa = nfa.determinize(|opaques| {
        let mut resolved: Vec<usize> = Vec::with_capacity(opaques.len());
        for &o in opaques {
            let r = resolve(&merged_into, o);
            if !resolved.contains(&r) {
                resolved.push(r);
            }
        }
        let base = resolved[0];
        for &other in &resolved[1..] {
            merge_case(cases, base, other);
            merged_into[other] = Some(base);
        }
        base
    });

    // Compact: absorbed cases disappear, survivors renumber densely and
    // the DFA payloads follow.
    let mut remap: Vec<Option<usize>> = vec![None; merged_into.len()];
    let mut next = 0;
    for (ix, m) in merged_into.iter().enumerate() {
        if m.is_none() {
            remap[ix] = Some(next);
            next += 1;
        }
    }
    let old = std::mem::take(cases);
    for (ix, case) in old.into_iter().enumerate() {
        if merged_into[ix].is_none() {
            cases.push(case);
        }
    }
    for st in 0..dfa.num_states() {
        if let Some(o) = dfa.opaque(st) {
            let r = resolve(&merged_into, o);
            dfa.set_opaque(st, remap[r]);
        }
    }
    Ok(dfa)
}

fn resolve(merged_into: &[Option<usize>], mut ix: usize) -> usize {
    while let Some(next) = merged_into[ix] {
        ix = next;
    }
    ix
}

/// The merge rule. SWITCH constraints lower to token-consuming frames
/// and must keep input order, so they append; everything else is a pure
/// check and runs up front.
fn merge_case(cases: &mut [MatchCase], base: usize, other: usize) {
    let other_matchset = std::mem::take(&mut cases[other].matchset);
    let other_constraint = std::mem::replace(&mut cases[other].constraint, Cnode::Valid);
    cases[base].matchset.extend(other_matchset);

    let base_constraint = std::mem::replace(&mut cases[base].constraint, Cnode::Valid);
    let mut list = flatten_and(base_constraint);
    for child in flatten_and(other_constraint) {
        if is_consuming(&child) {
            list.push(child);
        } else {
            list.insert(0, child);
        }
    }
    cases[base].constraint = and_of(list);
}

fn flatten_and(node: Cnode) -> Vec<Cnode> {
    match node {
        Cnode::And(children) => children,
        Cnode::Valid => Vec::new(),
        other => vec![other],
    }
}

fn is_consuming(node: &Cnode) -> bool {
    matches!(node, Cnode::Switch(_))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Regexp;
    use crate::cnode::bool_switch;

    fn case(ms: Regexp, constraint: Cnode) -> MatchCase {
        MatchCase {
            matchset: vec![ms],
            constraint,
        }
    }

    #[test]
    fn distinct_literals_stay_distinct() {
        let mut cases = vec![
            case(Regexp::literal("a"), Cnode::ObjReqbit { bit: 0 }),
            case(Regexp::literal("b"), Cnode::ObjReqbit { bit: 1 }),
        ];
        let dfa = compile(&mut cases).unwrap();
        assert_eq!(cases.len(), 2);
        assert_eq!(dfa.accepts("a"), Some(0));
        assert_eq!(dfa.accepts("b"), Some(1));
        assert_eq!(dfa.accepts("c"), None);
    }

    #[test]
    fn identical_literals_merge_pure_first() {
        let mut cases = vec![
            case(Regexp::literal("a"), bool_switch(true)),
            case(Regexp::literal("a"), Cnode::ObjReqbit { bit: 0 }),
        ];
        let dfa = compile(&mut cases).unwrap();
        assert_eq!(cases.len(), 1);
        assert_eq!(dfa.accepts("a"), Some(0));
        assert_eq!(cases[0].matchset.len(), 2);

        // the pure REQBIT prepends ahead of the consuming SWITCH
        let Cnode::And(children) = &cases[0].constraint else {
            panic!("expected AND, got {}", cases[0].constraint.type_name());
        };
        assert!(matches!(children[0], Cnode::ObjReqbit { bit: 0 }));
        assert!(matches!(children[1], Cnode::Switch(_)));
    }

    #[test]
    fn merge_is_stable_across_shared_end_states() {
        // literal "a" overlaps the pattern a+ on "a" only; the pattern's
        // other strings still dispatch to the surviving case.
        let mut cases = vec![
            case(Regexp::literal("a"), Cnode::ObjReqbit { bit: 0 }),
            case(Regexp::native("^a+$"), Cnode::ObjReqbit { bit: 1 }),
        ];
        let dfa = compile(&mut cases).unwrap();
        assert_eq!(cases.len(), 1);
        assert_eq!(dfa.accepts("a"), Some(0));
        assert_eq!(dfa.accepts("aa"), Some(0));
        assert_eq!(dfa.accepts("b"), None);
    }

    #[test]
    fn empty_case_set_builds_an_empty_machine() {
        let mut cases = Vec::new();
        let dfa = compile(&mut cases).unwrap();
        assert!(cases.is_empty());
        assert_eq!(dfa.accepts(""), None);
        assert_eq!(dfa.accepts("anything"), None);
    }

    #[test]
    fn three_way_merge_keeps_first_base() {
        let mut cases = vec![
            case(Regexp::literal("k"), Cnode::ObjReqbit { bit: 0 }),
            case(Regexp::native("^k$"), Cnode::ObjReqbit { bit: 1 }),
            case(Regexp::native("k"), Cnode::ObjReqbit { bit: 2 }),
        ];
        let dfa = compile(&mut cases).unwrap();
        assert_eq!(cases.len(), 1);
        assert_eq!(dfa.accepts("k"), Some(0));
        assert_eq!(cases[0].matchset.len(), 3);
    }
}
