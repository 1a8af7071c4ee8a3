// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Canonical cnode tree → IR.
//!
//! Translation starts at the type SWITCH: read one token, branch on its
//! type through an IF chain whose tail is the majority of VALID/INVALID
//! arms. Ties go to INVALID, since the structural arms always are.
//! NUMBER arms lower to predicates over `TOK_NUM`; OBJECT arms build the
//! property loop below; the remaining value arms are a known-unimplemented
//! area and lower to NOP when they carry residual constraints.

use anyhow::{bail, Result};

use super::{Expr, Frame, InvalidCode, Mcase, Stmt};
use crate::cnode::{Cnode, RangeFlags};
use crate::error::invariant;
use crate::events::Event;

const OBJ_LOOP: &str = "L_OBJ";

/// Translate a canonical cnode tree into the root frame of a validation
/// program.
pub fn translate(top: &Cnode) -> Result<Stmt> {
    let Cnode::Switch(arms) = top else {
        return Err(invariant(format!(
            "translation must start at a SWITCH node, found {}",
            top.type_name()
        )));
    };

    let mut frame = Frame::new();

    let mut count_valid = 0;
    let mut count_invalid = 0;
    for arm in arms.iter() {
        match arm {
            Cnode::Valid => count_valid += 1,
            Cnode::Invalid => count_invalid += 1,
            _ => {}
        }
    }
    // At least two arms are always INVALID (OBJECT_END, ARRAY_END), so a
    // tie means INVALID.
    let dft_valid = count_valid > count_invalid;

    let mut chain: Vec<(Event, Stmt)> = Vec::new();
    for (ix, arm) in arms.iter().enumerate() {
        let Some(ev) = Event::from_index(ix) else {
            continue;
        };
        match arm {
            Cnode::Valid if dft_valid => continue,
            Cnode::Invalid if !dft_valid => continue,
            _ => {}
        }
        let br_true = match arm {
            Cnode::Valid => Stmt::Valid,
            Cnode::Invalid => Stmt::Invalid(InvalidCode::UnexpectedToken),
            other => translate_type(ev, other, &mut frame)?,
        };
        chain.push((ev, br_true));
    }

    let mut tail = if dft_valid {
        Stmt::Valid
    } else {
        Stmt::Invalid(InvalidCode::UnexpectedToken)
    };
    for (ev, br_true) in chain.into_iter().rev() {
        tail = stmt_if(Expr::Istok(ev), br_true, tail);
    }

    frame.stmts.push(Stmt::Token);
    frame.stmts.push(tail);
    Ok(Stmt::Frame(frame))
}

fn translate_type(ev: Event, arm: &Cnode, frame: &mut Frame) -> Result<Stmt> {
    match ev {
        Event::Number => translate_number(arm),
        Event::ObjectBeg => translate_object(arm, frame),

        // Residual constraints on these arms are not lowered yet.
        Event::None
        | Event::Null
        | Event::True
        | Event::False
        | Event::String
        | Event::ArrayBeg => Ok(Stmt::Nop),

        Event::ObjectEnd | Event::ArrayEnd => Err(invariant(format!(
            "event {} cannot carry a constraint arm",
            ev.name()
        ))),
    }
}

fn translate_number(top: &Cnode) -> Result<Stmt> {
    match top {
        Cnode::Valid => Ok(Stmt::Valid),
        Cnode::Invalid => Ok(Stmt::Invalid(InvalidCode::UnexpectedToken)),

        Cnode::NumInteger | Cnode::NumRange { .. } => {
            let (cond, code) = number_check(top)?;
            Ok(stmt_if(cond, Stmt::Valid, Stmt::Invalid(code)))
        }

        Cnode::And(children) => {
            let mut checks = Vec::with_capacity(children.len());
            for child in children {
                checks.push(number_check(child)?);
            }
            let mut tail = Stmt::Valid;
            for (cond, code) in checks.into_iter().rev() {
                tail = stmt_if(cond, tail, Stmt::Invalid(code));
            }
            Ok(tail)
        }

        Cnode::Or(_) | Cnode::Not(_) | Cnode::Xor(_) => {
            bail!("cnode {} is not yet implemented for NUMBER", top.type_name())
        }

        other => Err(invariant(format!(
            "invalid cnode type {} for NUMBER",
            other.type_name()
        ))),
    }
}

fn number_check(node: &Cnode) -> Result<(Expr, InvalidCode)> {
    match node {
        Cnode::NumInteger => Ok((
            Expr::Isint(Box::new(Expr::TokNum)),
            InvalidCode::NotInteger,
        )),

        Cnode::NumRange { flags, min, max } => {
            let lower = if flags.has(RangeFlags::EXCL_MIN) {
                Some(Expr::Gt(Box::new(Expr::TokNum), Box::new(Expr::Num(*min))))
            } else if flags.has(RangeFlags::MIN) {
                Some(Expr::Ge(Box::new(Expr::TokNum), Box::new(Expr::Num(*min))))
            } else {
                None
            };
            let upper = if flags.has(RangeFlags::EXCL_MAX) {
                Some(Expr::Lt(Box::new(Expr::TokNum), Box::new(Expr::Num(*max))))
            } else if flags.has(RangeFlags::MAX) {
                Some(Expr::Le(Box::new(Expr::TokNum), Box::new(Expr::Num(*max))))
            } else {
                None
            };
            let cond = match (lower, upper) {
                (Some(l), Some(u)) => Expr::And(Box::new(l), Box::new(u)),
                (Some(l), None) => l,
                (None, Some(u)) => u,
                (None, None) => return Err(invariant("NUM_RANGE without bounds")),
            };
            Ok((cond, InvalidCode::Number))
        }

        other => bail!(
            "cnode {} is not yet implemented for NUMBER",
            other.type_name()
        ),
    }
}

/// Object-lowering context: the frame under construction, the four
/// insertion points of the object skeleton, and the match/reqmask
/// handles the cnode children fill in as they are visited.
struct ObjectBuilder<'a> {
    frame: &'a mut Frame,
    pre_loop: Vec<Stmt>,
    pre_match: Vec<Stmt>,
    post_match: Vec<Stmt>,
    /// Post-loop checks, chained through `br_true` so that all pass or
    /// the first fails.
    post_loop: Vec<(Expr, InvalidCode)>,
    cases: Vec<Mcase>,
    default_case: Option<Stmt>,
    match_ind: usize,
    have_match: bool,
    reqmask: Option<usize>,
}

fn translate_object(top: &Cnode, frame: &mut Frame) -> Result<Stmt> {
    let loop_ind = frame.alloc_loop();
    let mut builder = ObjectBuilder {
        frame,
        pre_loop: Vec::new(),
        pre_match: Vec::new(),
        post_match: Vec::new(),
        post_loop: Vec::new(),
        cases: Vec::new(),
        default_case: None,
        match_ind: 0,
        have_match: false,
        reqmask: None,
    };

    translate_obj_inner(top, &mut builder)?;

    let ObjectBuilder {
        pre_loop,
        pre_match,
        post_match,
        post_loop,
        cases,
        default_case,
        match_ind,
        ..
    } = builder;

    let default_case = match default_case {
        Some(stmt) => stmt,
        None => obj_default_case(),
    };

    let mut inner = pre_match;
    inner.push(Stmt::Match {
        name: "dfa",
        ind: match_ind,
        cases,
        default_case: Box::new(default_case),
    });
    inner.extend(post_match);

    let loop_stmts = vec![
        Stmt::Token,
        stmt_if(
            Expr::Istok(Event::ObjectEnd),
            Stmt::Break {
                name: OBJ_LOOP,
                ind: loop_ind,
            },
            Stmt::Seq(inner),
        ),
    ];

    let mut seq = pre_loop;
    seq.push(Stmt::Loop {
        name: OBJ_LOOP,
        ind: loop_ind,
        stmts: loop_stmts,
    });

    let mut tail = Stmt::Valid;
    for (cond, code) in post_loop.into_iter().rev() {
        tail = stmt_if(cond, tail, Stmt::Invalid(code));
    }
    seq.push(tail);

    Ok(Stmt::Seq(seq))
}

fn translate_obj_inner(top: &Cnode, builder: &mut ObjectBuilder) -> Result<()> {
    match top {
        Cnode::Valid | Cnode::Invalid => Err(invariant(
            "the top node of an OBJECT arm cannot be VALID or INVALID",
        )),

        Cnode::ObjRequired(_) | Cnode::ObjPropSet { .. } => Err(invariant(format!(
            "canonified cnode trees should not have {} nodes",
            top.type_name()
        ))),

        Cnode::MatchSwitch {
            dfa,
            cases,
            default,
        } => {
            if builder.have_match {
                return Err(invariant("an object frame owns exactly one MATCH_SWITCH"));
            }
            builder.have_match = true;

            // Clone the union DFA and renumber its end states with the
            // dense 1-based case numbers the executor dispatches on.
            let mut dfa = dfa.clone();
            let mut mcases = Vec::with_capacity(cases.len());
            for (ix, case) in cases.iter().enumerate() {
                let stmt = obj_mcase_translate(&case.constraint, builder)?;
                mcases.push(Mcase {
                    which: ix + 1,
                    matchset: case.matchset.clone(),
                    stmt,
                });
            }
            for st in 0..dfa.num_states() {
                if let Some(o) = dfa.opaque(st) {
                    dfa.set_opaque(st, Some(o + 1));
                }
            }

            builder.default_case = Some(match default.as_ref() {
                Cnode::Valid => obj_default_case(),
                other => translate(other)?,
            });

            let ind = builder.frame.alloc_matcher("dfa", dfa);
            builder.match_ind = ind;
            builder.cases = mcases;
            Ok(())
        }

        Cnode::CountRange { min, max } => {
            let ind = builder.frame.alloc_counter("num_props");
            builder.post_match.push(Stmt::Incr {
                label: "num_props",
                ind,
            });
            if *min > 0 {
                builder.post_loop.push((
                    Expr::Ge(
                        Box::new(Expr::Count {
                            label: "num_props",
                            ind,
                        }),
                        Box::new(Expr::Size(*min)),
                    ),
                    InvalidCode::TooFewProps,
                ));
            }
            if let Some(max) = max {
                builder.post_loop.push((
                    Expr::Le(
                        Box::new(Expr::Count {
                            label: "num_props",
                            ind,
                        }),
                        Box::new(Expr::Size(*max)),
                    ),
                    InvalidCode::TooManyProps,
                ));
            }
            Ok(())
        }

        Cnode::ObjReqmask { nbits } => {
            // canonicalization guarantees a single reqmask per object
            if builder.reqmask.is_some() {
                return Err(invariant("an object frame owns exactly one reqmask"));
            }
            let ind = builder.frame.alloc_bitvec("reqmask", *nbits);
            builder.reqmask = Some(ind);
            builder.post_loop.push((
                Expr::Btestall {
                    label: "reqmask",
                    ind,
                },
                InvalidCode::MissingRequiredProperties,
            ));
            Ok(())
        }

        Cnode::And(children) => {
            for child in children {
                translate_obj_inner(child, builder)?;
            }
            Ok(())
        }

        Cnode::Or(_) | Cnode::Not(_) | Cnode::Xor(_) => {
            bail!("cnode {} is not yet implemented for OBJECT", top.type_name())
        }

        Cnode::Switch(_) | Cnode::ObjPropMatch { .. } | Cnode::ObjReqbit { .. } => {
            Err(invariant(format!(
                "cnode {} should not be at the top level of an OBJECT",
                top.type_name()
            )))
        }

        Cnode::ArrItem(_)
        | Cnode::ArrAdditional(_)
        | Cnode::ArrUnique
        | Cnode::ArrContains(_)
        | Cnode::StrMatch { .. }
        | Cnode::NumRange { .. }
        | Cnode::NumInteger => Err(invariant(format!(
            "invalid cnode type {} for OBJECT",
            top.type_name()
        ))),
    }
}

fn obj_mcase_translate(ctree: &Cnode, builder: &mut ObjectBuilder) -> Result<Stmt> {
    if let Cnode::And(children) = ctree {
        let mut stmts = Vec::with_capacity(children.len());
        for child in children {
            stmts.push(obj_mcase_translate_inner(child, builder)?);
        }
        return Ok(Stmt::Seq(stmts));
    }
    obj_mcase_translate_inner(ctree, builder)
}

fn obj_mcase_translate_inner(ctree: &Cnode, builder: &mut ObjectBuilder) -> Result<Stmt> {
    match ctree {
        Cnode::ObjReqbit { bit } => {
            let Some(ind) = builder.reqmask else {
                return Err(invariant("OBJ_REQBIT outside a frame with a reqmask"));
            };
            Ok(Stmt::Bset {
                label: "reqmask",
                ind,
                bit: *bit,
            })
        }
        other => translate(other),
    }
}

/// The default match case consumes the unmatched property value and
/// accepts it.
fn obj_default_case() -> Stmt {
    let mut frame = Frame::new();
    frame.stmts.push(Stmt::Token);
    frame.stmts.push(Stmt::Valid);
    Stmt::Frame(frame)
}

fn stmt_if(cond: Expr, br_true: Stmt, br_false: Stmt) -> Stmt {
    Stmt::If {
        cond,
        br_true: Box::new(br_true),
        br_false: Box::new(br_false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cnode;
    use crate::parser;
    use serde_json::json;

    fn lower(doc: serde_json::Value) -> Stmt {
        let ast = parser::parse(&doc).unwrap();
        let canon = cnode::canonify(cnode::from_ast(&ast).unwrap()).unwrap();
        translate(&canon).unwrap()
    }

    fn root_frame(stmt: &Stmt) -> &Frame {
        let Stmt::Frame(frame) = stmt else {
            panic!("expected a root FRAME");
        };
        frame
    }

    #[test]
    fn translation_requires_a_switch() {
        assert!(translate(&Cnode::Valid).is_err());
        assert!(translate(&Cnode::NumInteger).is_err());
    }

    #[test]
    fn root_frame_reads_a_token_first() {
        let program = lower(json!({"type": "integer"}));
        let frame = root_frame(&program);
        assert!(matches!(frame.stmts[0], Stmt::Token));
        assert!(matches!(frame.stmts[1], Stmt::If { .. }));
    }

    #[test]
    fn default_arm_follows_the_majority() {
        // {} has seven VALID value arms against three INVALID: the chain
        // tail is VALID and only the INVALID arms get IFs.
        let program = lower(json!({}));
        let frame = root_frame(&program);
        let mut ifs = 0;
        let mut cursor = &frame.stmts[1];
        loop {
            match cursor {
                Stmt::If { br_false, .. } => {
                    ifs += 1;
                    cursor = br_false.as_ref();
                }
                Stmt::Valid => break,
                other => panic!("unexpected chain tail {other:?}"),
            }
        }
        assert_eq!(ifs, 3);

        // a single-type schema flips the majority to INVALID
        let program = lower(json!({"type": "integer"}));
        let frame = root_frame(&program);
        let Stmt::If { br_false, .. } = &frame.stmts[1] else {
            panic!("expected IF chain");
        };
        assert!(matches!(
            **br_false,
            Stmt::Invalid(InvalidCode::UnexpectedToken)
        ));
    }

    #[test]
    fn object_frame_registers_matcher_counter_and_bitvec() {
        let program = lower(json!({
            "type": "object",
            "properties": {"x": {"type": "integer"}},
            "required": ["x", "y"],
            "minProperties": 1,
            "maxProperties": 3
        }));
        let frame = root_frame(&program);
        assert_eq!(frame.matchers.len(), 1);
        assert_eq!(frame.counters.len(), 1);
        assert_eq!(frame.bitvecs.len(), 1);
        assert_eq!(frame.bitvecs[0].nbits, 2);
        assert_eq!(frame.nloops, 1);
        // dense indices
        assert_eq!(frame.matchers[0].ind, 0);
        assert_eq!(frame.counters[0].ind, 0);
        assert_eq!(frame.bitvecs[0].ind, 0);
    }

    #[test]
    fn match_cases_are_numbered_from_one() {
        let program = lower(json!({
            "type": "object",
            "properties": {"a": {}, "b": {}}
        }));
        let frame = root_frame(&program);
        let Stmt::If { br_true, .. } = &frame.stmts[1] else {
            panic!("expected IF");
        };
        let Stmt::Seq(seq) = &**br_true else {
            panic!("expected SEQ");
        };
        let Stmt::Loop { stmts, .. } = &seq[0] else {
            panic!("expected LOOP");
        };
        let Stmt::If { br_false, .. } = &stmts[1] else {
            panic!("expected loop IF");
        };
        let Stmt::Seq(inner) = &**br_false else {
            panic!("expected inner SEQ");
        };
        let Stmt::Match { cases, ind, .. } = &inner[0] else {
            panic!("expected MATCH");
        };
        assert_eq!(*ind, frame.matchers[0].ind);
        let which: Vec<usize> = cases.iter().map(|c| c.which).collect();
        assert_eq!(which, [1, 2]);
        // the matcher's end states dispatch on exactly these numbers
        let dfa = &frame.matchers[0].dfa;
        assert_eq!(dfa.accepts("a"), Some(1));
        assert_eq!(dfa.accepts("b"), Some(2));
        assert_eq!(dfa.accepts("z"), None);
    }

    #[test]
    fn required_only_case_sets_its_bit() {
        let program = lower(json!({"type": "object", "required": ["k"]}));
        let frame = root_frame(&program);
        let Stmt::If { br_true, .. } = &frame.stmts[1] else {
            panic!("expected IF");
        };
        let Stmt::Seq(seq) = &**br_true else {
            panic!("expected SEQ");
        };
        let Stmt::Loop { stmts, .. } = &seq[0] else {
            panic!("expected LOOP");
        };
        let Stmt::If { br_false, .. } = &stmts[1] else {
            panic!("expected loop IF");
        };
        let Stmt::Seq(inner) = &**br_false else {
            panic!("expected inner SEQ");
        };
        let Stmt::Match { cases, .. } = &inner[0] else {
            panic!("expected MATCH");
        };
        assert!(matches!(
            cases[0].stmt,
            Stmt::Bset {
                label: "reqmask",
                ind: 0,
                bit: 0
            }
        ));
        // and the post-loop checks the whole mask
        let Stmt::If { cond, br_false, .. } = &seq[1] else {
            panic!("expected post-loop check");
        };
        assert!(matches!(cond, Expr::Btestall { label: "reqmask", .. }));
        assert!(matches!(
            **br_false,
            Stmt::Invalid(InvalidCode::MissingRequiredProperties)
        ));
    }

    #[test]
    fn number_arm_combines_integer_and_range() {
        let program = lower(json!({"type": "integer", "minimum": 0}));
        let frame = root_frame(&program);
        let Stmt::If { br_true, .. } = &frame.stmts[1] else {
            panic!("expected IF");
        };
        // outer check: ISINT; inner: GE
        let Stmt::If { cond, br_true, .. } = &**br_true else {
            panic!("expected ISINT check");
        };
        assert!(matches!(cond, Expr::Isint(_)));
        let Stmt::If { cond, br_true, .. } = &**br_true else {
            panic!("expected range check");
        };
        assert!(matches!(cond, Expr::Ge(_, _)));
        assert!(matches!(**br_true, Stmt::Valid));
    }

    #[test]
    fn multi_valued_number_enums_are_not_lowered() {
        let ast = parser::parse(&json!({"type": "number", "enum": [1, 2]})).unwrap();
        let canon = cnode::canonify(cnode::from_ast(&ast).unwrap()).unwrap();
        assert!(translate(&canon).is_err());
    }

    #[test]
    fn additional_properties_false_rejects_in_the_default_case() {
        let program = lower(json!({"type": "object", "additionalProperties": false}));
        let frame = root_frame(&program);
        let Stmt::If { br_true, .. } = &frame.stmts[1] else {
            panic!("expected IF");
        };
        let Stmt::Seq(seq) = &**br_true else {
            panic!("expected SEQ");
        };
        let Stmt::Loop { stmts, .. } = &seq[0] else {
            panic!("expected LOOP");
        };
        let Stmt::If { br_false, .. } = &stmts[1] else {
            panic!("expected loop IF");
        };
        let Stmt::Seq(inner) = &**br_false else {
            panic!("expected inner SEQ");
        };
        let Stmt::Match { default_case, .. } = &inner[0] else {
            panic!("expected MATCH");
        };
        let Stmt::Frame(default_frame) = &**default_case else {
            panic!("expected default frame");
        };
        assert!(matches!(default_frame.stmts[0], Stmt::Token));
        assert!(matches!(
            default_frame.stmts[1],
            Stmt::Invalid(InvalidCode::UnexpectedToken)
        ));
    }
}
