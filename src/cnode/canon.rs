// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Canonicalization: rewrite a raw constraint tree until the IR lowering
//! preconditions hold.
//!
//! 1. The type SWITCH distributes above every boolean combinator, so one
//!    SWITCH sits at the top: `AND(SWITCH, SWITCH)` becomes a SWITCH of
//!    arm-wise ANDs, and likewise for OR/XOR/NOT.
//! 2. Boolean algebra over the VALID/INVALID units simplifies away, and
//!    nested same-op combinators flatten. Rewrites run to quiescence.
//! 3. Object arms normalize: `OBJ_REQUIRED` becomes per-name bit-setting
//!    match cases plus one `OBJ_REQMASK` sibling, property matches merge
//!    with them into a single `MATCH_SWITCH`, and the switch's union DFA
//!    is compiled with end-state case aggregation.

use std::rc::Rc;

use anyhow::Result;

use super::{and_of, bool_switch, matches, Arms, Cnode, MatchCase};
use crate::ast::Regexp;
use crate::error::invariant;
use crate::events::{Event, NUM_EVENTS};

/// Rewrite a raw cnode tree into canonical form.
pub fn canonify(node: Cnode) -> Result<Cnode> {
    let node = match simplify_fixpoint(node)? {
        Cnode::Valid => bool_switch(true),
        Cnode::Invalid => bool_switch(false),
        other => other,
    };
    let mut arms = match node {
        Cnode::Switch(arms) => arms,
        other => {
            return Err(invariant(format!(
                "canonical form requires a type SWITCH at the top, found {}",
                other.type_name()
            )))
        }
    };
    let obj = Event::ObjectBeg.index();
    let taken = std::mem::replace(&mut arms[obj], Cnode::Invalid);
    arms[obj] = normalize_object_arm(taken)?;
    let arr = Event::ArrayBeg.index();
    let taken = std::mem::replace(&mut arms[arr], Cnode::Invalid);
    arms[arr] = normalize_array_arm(taken)?;
    Ok(Cnode::Switch(arms))
}

fn simplify_fixpoint(mut node: Cnode) -> Result<Cnode> {
    loop {
        let mut changed = false;
        node = simplify(node, &mut changed)?;
        if !changed {
            return Ok(node);
        }
    }
}

fn simplify_children(children: Vec<Cnode>, changed: &mut bool) -> Result<Vec<Cnode>> {
    children
        .into_iter()
        .map(|c| simplify(c, changed))
        .collect()
}

fn simplify(node: Cnode, changed: &mut bool) -> Result<Cnode> {
    match node {
        Cnode::And(children) => {
            let children = simplify_children(children, changed)?;
            let mut out = Vec::with_capacity(children.len());
            for child in children {
                match child {
                    Cnode::And(sub) => {
                        *changed = true;
                        out.extend(sub);
                    }
                    Cnode::Valid => *changed = true,
                    Cnode::Invalid => {
                        *changed = true;
                        return Ok(Cnode::Invalid);
                    }
                    other => out.push(other),
                }
            }
            match out.len() {
                0 => Ok(Cnode::Valid),
                1 => {
                    *changed = true;
                    Ok(and_of(out))
                }
                _ => {
                    if out.iter().any(|c| matches!(c, Cnode::Switch(_))) {
                        *changed = true;
                        Ok(Cnode::Switch(zip_many(switches_of("AND", out)?, Cnode::And)))
                    } else {
                        Ok(Cnode::And(out))
                    }
                }
            }
        }

        Cnode::Or(children) => {
            let children = simplify_children(children, changed)?;
            let mut out = Vec::with_capacity(children.len());
            for child in children {
                match child {
                    Cnode::Or(sub) => {
                        *changed = true;
                        out.extend(sub);
                    }
                    Cnode::Invalid => *changed = true,
                    Cnode::Valid => {
                        *changed = true;
                        return Ok(Cnode::Valid);
                    }
                    other => out.push(other),
                }
            }
            match out.len() {
                0 => Ok(Cnode::Invalid),
                1 => {
                    *changed = true;
                    Ok(out.remove(0))
                }
                _ => {
                    if out.iter().any(|c| matches!(c, Cnode::Switch(_))) {
                        *changed = true;
                        Ok(Cnode::Switch(zip_many(switches_of("OR", out)?, Cnode::Or)))
                    } else {
                        Ok(Cnode::Or(out))
                    }
                }
            }
        }

        Cnode::Xor(children) => {
            // XOR is "exactly one holds"; it is not associative, so
            // nested XORs never flatten.
            let children = simplify_children(children, changed)?;
            let mut out = Vec::with_capacity(children.len());
            let mut nvalid = 0usize;
            for child in children {
                match child {
                    Cnode::Valid => {
                        *changed = true;
                        nvalid += 1;
                    }
                    Cnode::Invalid => *changed = true,
                    other => out.push(other),
                }
            }
            if nvalid >= 2 {
                return Ok(Cnode::Invalid);
            }
            if out.is_empty() {
                return Ok(if nvalid == 1 {
                    Cnode::Valid
                } else {
                    Cnode::Invalid
                });
            }
            if nvalid == 1 {
                // one member already holds, so no other may
                *changed = true;
                return Ok(Cnode::Not(Box::new(Cnode::Or(out))));
            }
            match out.len() {
                1 => {
                    *changed = true;
                    Ok(out.remove(0))
                }
                _ => {
                    if out.iter().any(|c| matches!(c, Cnode::Switch(_))) {
                        *changed = true;
                        Ok(Cnode::Switch(zip_many(switches_of("XOR", out)?, Cnode::Xor)))
                    } else {
                        Ok(Cnode::Xor(out))
                    }
                }
            }
        }

        Cnode::Not(child) => {
            let child = simplify(*child, changed)?;
            match child {
                Cnode::Valid => {
                    *changed = true;
                    Ok(Cnode::Invalid)
                }
                Cnode::Invalid => {
                    *changed = true;
                    Ok(Cnode::Valid)
                }
                Cnode::Not(inner) => {
                    *changed = true;
                    Ok(*inner)
                }
                Cnode::Switch(arms) => {
                    // Negation distributes per type. The structural arms
                    // stay INVALID: those tokens never start a value, and
                    // negation must not resurrect them.
                    *changed = true;
                    let arms: Arms = *arms;
                    let mut iter = arms.into_iter();
                    let negated: Arms = std::array::from_fn(|ix| {
                        let arm = iter.next().unwrap_or(Cnode::Invalid);
                        if crate::events::ALL_EVENTS[ix].starts_value() {
                            Cnode::Not(Box::new(arm))
                        } else {
                            Cnode::Invalid
                        }
                    });
                    Ok(Cnode::Switch(Box::new(negated)))
                }
                other => Ok(Cnode::Not(Box::new(other))),
            }
        }

        Cnode::Switch(arms) => {
            let arms: Arms = *arms;
            let mut iter = arms.into_iter();
            let mut failed = None;
            let simplified: Arms = std::array::from_fn(|_| {
                match iter.next() {
                    Some(arm) => match simplify(arm, changed) {
                        Ok(arm) => arm,
                        Err(err) => {
                            failed.get_or_insert(err);
                            Cnode::Invalid
                        }
                    },
                    None => Cnode::Invalid,
                }
            });
            match failed {
                Some(err) => Err(err),
                None => Ok(Cnode::Switch(Box::new(simplified))),
            }
        }

        other => Ok(other),
    }
}

/// All children of a distributing combinator must themselves be type
/// SWITCHes; anything else is a malformed tree.
fn switches_of(op: &str, children: Vec<Cnode>) -> Result<Vec<Box<Arms>>> {
    let mut out = Vec::with_capacity(children.len());
    for child in children {
        match child {
            Cnode::Switch(arms) => out.push(arms),
            other => {
                return Err(invariant(format!(
                    "cannot distribute {op} over a {}",
                    other.type_name()
                )))
            }
        }
    }
    Ok(out)
}

/// Combine several switches arm-wise.
fn zip_many(switches: Vec<Box<Arms>>, combine: impl Fn(Vec<Cnode>) -> Cnode) -> Box<Arms> {
    let mut slots: Vec<Vec<Cnode>> = (0..NUM_EVENTS)
        .map(|_| Vec::with_capacity(switches.len()))
        .collect();
    for sw in switches {
        let arms: Arms = *sw;
        for (ix, arm) in arms.into_iter().enumerate() {
            slots[ix].push(arm);
        }
    }
    let arms: Arms = std::array::from_fn(|ix| {
        let mut list = std::mem::take(&mut slots[ix]);
        if list.len() == 1 {
            list.remove(0)
        } else {
            combine(list)
        }
    });
    Box::new(arms)
}

/// Rewrite an OBJECT arm into its canonical shape:
/// `AND(OBJ_REQMASK?, MATCH_SWITCH, COUNT_RANGE…)`. The mask precedes
/// the switch so that case lowering can reference it. Every arm with an
/// object-structural constraint ends up with exactly one MATCH_SWITCH,
/// possibly with zero cases.
fn normalize_object_arm(arm: Cnode) -> Result<Cnode> {
    if matches!(arm, Cnode::Valid | Cnode::Invalid) {
        return Ok(arm);
    }
    let children = match arm {
        Cnode::And(children) => children,
        other => vec![other],
    };

    let mut cases: Vec<MatchCase> = Vec::new();
    let mut defaults: Vec<Cnode> = Vec::new();
    let mut reqnames: Vec<Rc<str>> = Vec::new();
    let mut counts: Vec<Cnode> = Vec::new();
    let mut rest: Vec<Cnode> = Vec::new();
    let mut structural = false;

    for child in children {
        match child {
            Cnode::ObjPropSet {
                matches: prop_matches,
                default: prop_default,
            } => {
                structural = true;
                for m in prop_matches {
                    match m {
                        Cnode::ObjPropMatch {
                            pattern,
                            constraint,
                        } => cases.push(MatchCase {
                            matchset: vec![pattern],
                            constraint: canonify(*constraint)?,
                        }),
                        other => {
                            return Err(invariant(format!(
                                "OBJ_PROP_SET children must be OBJ_PROP_MATCH, found {}",
                                other.type_name()
                            )))
                        }
                    }
                }
                if let Some(d) = prop_default {
                    // raw for now; several defaults AND together before
                    // one canonicalization below
                    defaults.push(*d);
                }
            }
            Cnode::ObjRequired(names) => {
                structural = true;
                for name in names {
                    if !reqnames.iter().any(|n| *n == name) {
                        reqnames.push(name);
                    }
                }
            }
            Cnode::CountRange { .. } => counts.push(child),
            Cnode::ObjPropMatch { .. }
            | Cnode::ObjReqbit { .. }
            | Cnode::ObjReqmask { .. }
            | Cnode::MatchSwitch { .. } => {
                return Err(invariant(format!(
                    "{} cannot appear unnormalized in an OBJECT arm",
                    child.type_name()
                )));
            }
            other => rest.push(other),
        }
    }

    if !structural && counts.is_empty() {
        // No object-structural constraints; residual combinators are
        // reported by the lowering.
        return Ok(and_of(rest));
    }

    let nbits = reqnames.len();
    for (bit, name) in reqnames.into_iter().enumerate() {
        cases.push(MatchCase {
            matchset: vec![Regexp::literal(name)],
            constraint: Cnode::ObjReqbit { bit },
        });
    }
    let dfa = matches::compile(&mut cases)?;
    let default = if defaults.is_empty() {
        Cnode::Valid
    } else {
        canonify(and_of(defaults))?
    };

    let mut out = Vec::new();
    if nbits > 0 {
        out.push(Cnode::ObjReqmask { nbits });
    }
    out.push(Cnode::MatchSwitch {
        dfa,
        cases,
        default: Box::new(default),
    });
    out.extend(counts);
    out.extend(rest);
    Ok(and_of(out))
}

/// Canonify the subschemas nested under ARRAY-arm constraints.
fn normalize_array_arm(arm: Cnode) -> Result<Cnode> {
    if matches!(arm, Cnode::Valid | Cnode::Invalid) {
        return Ok(arm);
    }
    let children = match arm {
        Cnode::And(children) => children,
        other => vec![other],
    };
    let mut out = Vec::with_capacity(children.len());
    for child in children {
        out.push(match child {
            Cnode::ArrItem(items) => Cnode::ArrItem(
                items
                    .into_iter()
                    .map(canonify)
                    .collect::<Result<Vec<_>>>()?,
            ),
            Cnode::ArrAdditional(sub) => Cnode::ArrAdditional(Box::new(canonify(*sub)?)),
            Cnode::ArrContains(sub) => Cnode::ArrContains(Box::new(canonify(*sub)?)),
            other => other,
        });
    }
    Ok(and_of(out))
}
