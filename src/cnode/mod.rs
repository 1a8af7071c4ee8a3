// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The constraint tree ("cnode") between the schema AST and the IR.
//!
//! [`from_ast`] builds a raw tree of per-type constraints under boolean
//! combinators; [`canonify`] rewrites it into the canonical form the IR
//! lowering requires: exactly one type `SWITCH` on top, object arms
//! normalized to a single `MATCH_SWITCH` with a compiled union DFA.

mod build;
mod canon;
mod matches;

use std::fmt::Write as _;
use std::rc::Rc;

pub use build::from_ast;
pub use canon::canonify;

use crate::ast::{Dialect, Regexp};
use crate::events::{ALL_EVENTS, NUM_EVENTS};
use crate::fsm::Dfa;

/// One arm per token event; the arity makes SWITCH total by type.
pub type Arms = [Cnode; NUM_EVENTS];

/// Which bounds of a `NUM_RANGE` are meaningful, and whether they are
/// exclusive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RangeFlags(u32);

impl RangeFlags {
    pub const MIN: RangeFlags = RangeFlags(1 << 0);
    pub const MAX: RangeFlags = RangeFlags(1 << 1);
    pub const EXCL_MIN: RangeFlags = RangeFlags(1 << 2);
    pub const EXCL_MAX: RangeFlags = RangeFlags(1 << 3);

    pub fn has(self, bit: RangeFlags) -> bool {
        self.0 & bit.0 != 0
    }

    pub fn set(&mut self, bit: RangeFlags) {
        self.0 |= bit.0;
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

/// A pattern set paired with the constraint it triggers. The matchset
/// keeps every literal/pattern that was merged into this case, for
/// diagnostics and the IR dump.
#[derive(Debug, Clone)]
pub struct MatchCase {
    pub matchset: Vec<Regexp>,
    pub constraint: Cnode,
}

#[derive(Debug, Clone)]
pub enum Cnode {
    // leaves
    Valid,
    Invalid,

    // control
    And(Vec<Cnode>),
    Or(Vec<Cnode>),
    Xor(Vec<Cnode>),
    Not(Box<Cnode>),
    Switch(Box<Arms>),

    // numbers
    NumInteger,
    NumRange {
        flags: RangeFlags,
        min: f64,
        max: f64,
    },

    // strings
    StrMatch {
        regexp: Regexp,
        dfa: Dfa,
    },

    // arrays
    ArrItem(Vec<Cnode>),
    ArrAdditional(Box<Cnode>),
    ArrUnique,
    ArrContains(Box<Cnode>),

    // objects
    ObjPropSet {
        matches: Vec<Cnode>,
        /// Constraint on properties no match recognizes, from
        /// `additionalProperties`; becomes the MATCH_SWITCH default.
        default: Option<Box<Cnode>>,
    },
    ObjPropMatch {
        pattern: Regexp,
        constraint: Box<Cnode>,
    },
    ObjRequired(Vec<Rc<str>>),
    ObjReqmask {
        nbits: usize,
    },
    ObjReqbit {
        bit: usize,
    },
    CountRange {
        min: usize,
        max: Option<usize>,
    },
    MatchSwitch {
        dfa: Dfa,
        cases: Vec<MatchCase>,
        default: Box<Cnode>,
    },
}

impl Cnode {
    pub fn type_name(&self) -> &'static str {
        match self {
            Cnode::Valid => "VALID",
            Cnode::Invalid => "INVALID",
            Cnode::And(_) => "AND",
            Cnode::Or(_) => "OR",
            Cnode::Xor(_) => "XOR",
            Cnode::Not(_) => "NOT",
            Cnode::Switch(_) => "SWITCH",
            Cnode::NumInteger => "NUM_INTEGER",
            Cnode::NumRange { .. } => "NUM_RANGE",
            Cnode::StrMatch { .. } => "STR_MATCH",
            Cnode::ArrItem(_) => "ARR_ITEM",
            Cnode::ArrAdditional(_) => "ARR_ADDITIONAL",
            Cnode::ArrUnique => "ARR_UNIQUE",
            Cnode::ArrContains(_) => "ARR_CONTAINS",
            Cnode::ObjPropSet { .. } => "OBJ_PROP_SET",
            Cnode::ObjPropMatch { .. } => "OBJ_PROP_MATCH",
            Cnode::ObjRequired(_) => "OBJ_REQUIRED",
            Cnode::ObjReqmask { .. } => "OBJ_REQMASK",
            Cnode::ObjReqbit { .. } => "OBJ_REQBIT",
            Cnode::CountRange { .. } => "COUNT_RANGE",
            Cnode::MatchSwitch { .. } => "MATCH_SWITCH",
        }
    }

    /// Textual form used by canonicalizer tests.
    pub fn dump(&self) -> String {
        let mut buf = String::new();
        dump_inner(&mut buf, self, 0);
        buf.push('\n');
        buf
    }
}

/// A SWITCH whose value arms are all `valid`; the cnode form of the
/// boolean schemas. `NONE`, `OBJECT_END` and `ARRAY_END` stay INVALID:
/// they never start a value.
pub(crate) fn bool_switch(valid: bool) -> Cnode {
    let arms: Arms = std::array::from_fn(|ix| {
        if ALL_EVENTS[ix].starts_value() && valid {
            Cnode::Valid
        } else {
            Cnode::Invalid
        }
    });
    Cnode::Switch(Box::new(arms))
}

/// Collapse a conjunction to its simplest carrier.
pub(crate) fn and_of(mut children: Vec<Cnode>) -> Cnode {
    match children.len() {
        0 => Cnode::Valid,
        1 => children.remove(0),
        _ => Cnode::And(children),
    }
}

pub(crate) fn matchset_text(ms: &Regexp) -> String {
    match ms.dialect {
        Dialect::Literal => format!("MATCHSET(LITERAL, \"{}\")", ms.text),
        Dialect::Native => format!("MATCHSET(PATTERN, \"{}\")", ms.text),
    }
}

fn indent(buf: &mut String, n: usize) {
    for _ in 0..n {
        buf.push(' ');
    }
}

fn dump_list(buf: &mut String, name: &str, children: &[Cnode], ind: usize) {
    if children.is_empty() {
        let _ = write!(buf, "{name}()");
        return;
    }
    let _ = write!(buf, "{name}(\n");
    for (i, child) in children.iter().enumerate() {
        dump_inner(buf, child, ind + 2);
        buf.push_str(if i + 1 < children.len() { ",\n" } else { "\n" });
    }
    indent(buf, ind);
    buf.push(')');
}

fn dump_inner(buf: &mut String, node: &Cnode, ind: usize) {
    indent(buf, ind);
    match node {
        Cnode::Valid | Cnode::Invalid | Cnode::NumInteger | Cnode::ArrUnique => {
            buf.push_str(node.type_name());
        }

        Cnode::And(children) | Cnode::Or(children) | Cnode::Xor(children) => {
            dump_list(buf, node.type_name(), children, ind);
        }

        Cnode::Not(child) => {
            buf.push_str("NOT(\n");
            dump_inner(buf, child, ind + 2);
            buf.push('\n');
            indent(buf, ind);
            buf.push(')');
        }

        Cnode::Switch(arms) => {
            buf.push_str("SWITCH(\n");
            for (ix, arm) in arms.iter().enumerate() {
                indent(buf, ind + 2);
                let _ = write!(buf, "${}:\n", ALL_EVENTS[ix].name());
                dump_inner(buf, arm, ind + 4);
                buf.push_str(if ix + 1 < arms.len() { ",\n" } else { "\n" });
            }
            indent(buf, ind);
            buf.push(')');
        }

        Cnode::NumRange { flags, min, max } => {
            buf.push_str("NUM_RANGE(");
            if flags.has(RangeFlags::EXCL_MIN) {
                let _ = write!(buf, "{min:.1} < ");
            } else if flags.has(RangeFlags::MIN) {
                let _ = write!(buf, "{min:.1} <= ");
            }
            buf.push('x');
            if flags.has(RangeFlags::EXCL_MAX) {
                let _ = write!(buf, " < {max:.1}");
            } else if flags.has(RangeFlags::MAX) {
                let _ = write!(buf, " <= {max:.1}");
            }
            buf.push(')');
        }

        Cnode::StrMatch { regexp, .. } => {
            let kind = match regexp.dialect {
                Dialect::Literal => "LITERAL",
                Dialect::Native => "PATTERN",
            };
            let _ = write!(buf, "STR_MATCH({kind}, \"{}\")", regexp.text);
        }

        Cnode::ArrItem(children) => dump_list(buf, "ARR_ITEM", children, ind),

        Cnode::ArrAdditional(child) | Cnode::ArrContains(child) => {
            let _ = write!(buf, "{}(\n", node.type_name());
            dump_inner(buf, child, ind + 2);
            buf.push('\n');
            indent(buf, ind);
            buf.push(')');
        }

        Cnode::ObjPropSet { matches, default } => {
            buf.push_str("OBJ_PROP_SET(\n");
            for (i, m) in matches.iter().enumerate() {
                dump_inner(buf, m, ind + 2);
                let last = i + 1 == matches.len() && default.is_none();
                buf.push_str(if last { "\n" } else { ",\n" });
            }
            if let Some(d) = default {
                indent(buf, ind + 2);
                buf.push_str("DEFAULT(\n");
                dump_inner(buf, d, ind + 4);
                buf.push('\n');
                indent(buf, ind + 2);
                buf.push_str(")\n");
            }
            indent(buf, ind);
            buf.push(')');
        }

        Cnode::ObjPropMatch {
            pattern,
            constraint,
        } => {
            buf.push_str("OBJ_PROP_MATCH(\n");
            indent(buf, ind + 2);
            let _ = write!(buf, "{},\n", matchset_text(pattern));
            dump_inner(buf, constraint, ind + 2);
            buf.push('\n');
            indent(buf, ind);
            buf.push(')');
        }

        Cnode::ObjRequired(names) => {
            buf.push_str("OBJ_REQUIRED(");
            for (i, name) in names.iter().enumerate() {
                if i > 0 {
                    buf.push_str(", ");
                }
                let _ = write!(buf, "\"{name}\"");
            }
            buf.push(')');
        }

        Cnode::ObjReqmask { nbits } => {
            let _ = write!(buf, "OBJ_REQMASK(nbits={nbits})");
        }

        Cnode::ObjReqbit { bit } => {
            let _ = write!(buf, "OBJ_REQBIT(bit={bit})");
        }

        Cnode::CountRange { min, max } => match max {
            Some(max) => {
                let _ = write!(buf, "COUNT_RANGE({min}, {max})");
            }
            None => {
                let _ = write!(buf, "COUNT_RANGE({min}, -)");
            }
        },

        Cnode::MatchSwitch { cases, default, .. } => {
            buf.push_str("MATCH_SWITCH(\n");
            indent(buf, ind + 2);
            buf.push_str("DEFAULT(\n");
            dump_inner(buf, default, ind + 4);
            buf.push('\n');
            indent(buf, ind + 2);
            buf.push_str(if cases.is_empty() { ")\n" } else { "),\n" });
            for (i, case) in cases.iter().enumerate() {
                indent(buf, ind + 2);
                buf.push_str("CASE(\n");
                for ms in &case.matchset {
                    indent(buf, ind + 4);
                    let _ = write!(buf, "{},\n", matchset_text(ms));
                }
                dump_inner(buf, &case.constraint, ind + 4);
                buf.push('\n');
                indent(buf, ind + 2);
                buf.push(')');
                buf.push_str(if i + 1 < cases.len() { ",\n" } else { "\n" });
            }
            indent(buf, ind);
            buf.push(')');
        }
    }
}
