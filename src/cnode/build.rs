// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Schema AST → raw constraint tree.
//!
//! Each schema becomes a type `SWITCH` whose arms carry the per-type
//! constraints; combinators and enum constraints stack above it and are
//! pushed down by the canonicalizer.

use anyhow::{bail, Result};
use serde_json::Value;

use super::{bool_switch, Arms, Cnode, RangeFlags};
use crate::ast::{Dialect, Kws, Regexp, Schema, SomeOf, Types};
use crate::error::CompileError;
use crate::events::{Event, ALL_EVENTS};
use crate::fsm::Nfa;

/// Convert a schema AST into a raw cnode tree.
pub fn from_ast(schema: &Schema) -> Result<Cnode> {
    build(schema)
}

fn build(schema: &Schema) -> Result<Cnode> {
    if schema.kws.has(Kws::HAS_REF) {
        bail!(CompileError::UnresolvedRef {
            reference: schema.refr.as_deref().unwrap_or_default().to_string(),
        });
    }
    if schema.kws.has(Kws::VALUE) {
        return Ok(bool_switch(schema.value));
    }

    // Constraints the IR model cannot express yet; rejecting beats
    // emitting a program that silently accepts what it should check.
    if schema.kws.has(Kws::MULTIPLE_OF) {
        bail!(CompileError::UnsupportedKeyword {
            keyword: "multipleOf"
        });
    }
    if !schema.dependencies_strings.is_empty() || !schema.dependencies_schema.is_empty() {
        bail!(CompileError::UnsupportedKeyword {
            keyword: "dependencies"
        });
    }
    if schema.property_names.is_some() {
        bail!(CompileError::UnsupportedKeyword {
            keyword: "propertyNames"
        });
    }

    let mut arms = type_gate(schema.types);
    attach(&mut arms, Event::Number, number_constraints(schema));
    attach(&mut arms, Event::String, string_constraints(schema)?);
    attach(&mut arms, Event::ArrayBeg, array_constraints(schema)?);
    attach(&mut arms, Event::ObjectBeg, object_constraints(schema)?);
    let switch = Cnode::Switch(Box::new(arms));

    let mut all = vec![switch];
    if !schema.xenum.is_empty() {
        all.push(enum_switch(&schema.xenum)?);
    }
    if let Some(some_of) = &schema.some_of {
        all.push(build_some_of(some_of)?);
    }
    if let Some(not) = &schema.not {
        all.push(Cnode::Not(Box::new(build(not)?)));
    }
    Ok(if all.len() == 1 {
        all.remove(0)
    } else {
        Cnode::And(all)
    })
}

/// Base arms from the `type` bitmap. Every arm is defined: the SWITCH is
/// total by type from the moment it exists.
fn type_gate(types: Types) -> Arms {
    std::array::from_fn(|ix| {
        let allowed = match ALL_EVENTS[ix] {
            Event::None | Event::ObjectEnd | Event::ArrayEnd => false,
            Event::Null => types.allows(Types::NULL),
            Event::True | Event::False => types.allows(Types::BOOLEAN),
            Event::Number => types.allows(Types::NUMBER) || types.allows(Types::INTEGER),
            Event::String => types.allows(Types::STRING),
            Event::ObjectBeg => types.allows(Types::OBJECT),
            Event::ArrayBeg => types.allows(Types::ARRAY),
        };
        if allowed {
            Cnode::Valid
        } else {
            Cnode::Invalid
        }
    })
}

/// AND constraints into an arm. An INVALID arm stays INVALID: the type
/// is not permitted, so its constraints are vacuous.
fn attach(arms: &mut Arms, ev: Event, constraints: Vec<Cnode>) {
    if constraints.is_empty() {
        return;
    }
    let arm = &mut arms[ev.index()];
    if matches!(arm, Cnode::Invalid) {
        return;
    }
    let mut constraints = constraints;
    *arm = if constraints.len() == 1 {
        constraints.remove(0)
    } else {
        Cnode::And(constraints)
    };
}

fn number_constraints(schema: &Schema) -> Vec<Cnode> {
    let mut out = Vec::new();
    // "integer" alone constrains the token; alongside "number" any
    // numeric value already satisfies one permitted type.
    if schema.types.has(Types::INTEGER) && !schema.types.has(Types::NUMBER) {
        out.push(Cnode::NumInteger);
    }

    let mut flags = RangeFlags::default();
    if schema.kws.has(Kws::MINIMUM) {
        flags.set(if schema.exclusive_minimum {
            RangeFlags::EXCL_MIN
        } else {
            RangeFlags::MIN
        });
    }
    if schema.kws.has(Kws::MAXIMUM) {
        flags.set(if schema.exclusive_maximum {
            RangeFlags::EXCL_MAX
        } else {
            RangeFlags::MAX
        });
    }
    if !flags.is_empty() {
        out.push(Cnode::NumRange {
            flags,
            min: schema.minimum,
            max: schema.maximum,
        });
    }
    out
}

fn string_constraints(schema: &Schema) -> Result<Vec<Cnode>> {
    let mut out = Vec::new();
    if schema.kws.has(Kws::MIN_LENGTH) || schema.kws.has(Kws::MAX_LENGTH) {
        out.push(Cnode::CountRange {
            min: if schema.kws.has(Kws::MIN_LENGTH) {
                schema.min_length
            } else {
                0
            },
            max: if schema.kws.has(Kws::MAX_LENGTH) {
                Some(schema.max_length)
            } else {
                None
            },
        });
    }
    if let Some(pattern) = &schema.pattern {
        out.push(str_match(pattern)?);
    }
    Ok(out)
}

fn array_constraints(schema: &Schema) -> Result<Vec<Cnode>> {
    let mut out = Vec::new();
    if !schema.items.is_empty() {
        let items = schema.items.iter().map(build).collect::<Result<Vec<_>>>()?;
        out.push(Cnode::ArrItem(items));
    }
    if let Some(additional) = &schema.additional_items {
        out.push(Cnode::ArrAdditional(Box::new(build(additional)?)));
    }
    if schema.kws.has(Kws::MIN_ITEMS) || schema.kws.has(Kws::MAX_ITEMS) {
        out.push(Cnode::CountRange {
            min: if schema.kws.has(Kws::MIN_ITEMS) {
                schema.min_items
            } else {
                0
            },
            max: if schema.kws.has(Kws::MAX_ITEMS) {
                Some(schema.max_items)
            } else {
                None
            },
        });
    }
    if schema.unique_items {
        out.push(Cnode::ArrUnique);
    }
    if let Some(contains) = &schema.contains {
        out.push(Cnode::ArrContains(Box::new(build(contains)?)));
    }
    Ok(out)
}

fn object_constraints(schema: &Schema) -> Result<Vec<Cnode>> {
    let mut out = Vec::new();
    if !schema.properties.is_empty() || schema.additional_properties.is_some() {
        let mut matches = Vec::with_capacity(schema.properties.len());
        for ps in &schema.properties {
            matches.push(Cnode::ObjPropMatch {
                pattern: ps.pattern.clone(),
                constraint: Box::new(build(&ps.schema)?),
            });
        }
        let default = match &schema.additional_properties {
            Some(sub) => Some(Box::new(build(sub)?)),
            None => None,
        };
        out.push(Cnode::ObjPropSet { matches, default });
    }
    if !schema.required.is_empty() {
        out.push(Cnode::ObjRequired(schema.required.clone()));
    }
    if schema.kws.has(Kws::MIN_PROPERTIES) || schema.kws.has(Kws::MAX_PROPERTIES) {
        out.push(Cnode::CountRange {
            min: if schema.kws.has(Kws::MIN_PROPERTIES) {
                schema.min_properties
            } else {
                0
            },
            max: if schema.kws.has(Kws::MAX_PROPERTIES) {
                Some(schema.max_properties)
            } else {
                None
            },
        });
    }
    Ok(out)
}

fn str_match(regexp: &Regexp) -> Result<Cnode> {
    let nfa = match regexp.dialect {
        Dialect::Literal => Nfa::literal(&regexp.text, 0),
        Dialect::Native => Nfa::pattern(&regexp.text, 0)?,
    };
    Ok(Cnode::StrMatch {
        regexp: regexp.clone(),
        dfa: nfa.determinize(|ops| ops[0]),
    })
}

/// `enum`/`const`: a SWITCH of per-type equality leaves, AND-ed above the
/// main switch by the caller. Numbers become point ranges, strings become
/// literal matches, and the scalar literals claim their arm outright.
fn enum_switch(members: &[Value]) -> Result<Cnode> {
    let mut null_ok = false;
    let mut true_ok = false;
    let mut false_ok = false;
    let mut nums: Vec<Cnode> = Vec::new();
    let mut strs: Vec<Cnode> = Vec::new();

    for member in members {
        match member {
            Value::Null => null_ok = true,
            Value::Bool(true) => true_ok = true,
            Value::Bool(false) => false_ok = true,
            Value::Number(_) => {
                let Some(v) = member.as_f64() else {
                    bail!(CompileError::MalformedKeyword {
                        keyword: "enum",
                        expected: "a representable number",
                        got: member.to_string(),
                    });
                };
                let mut flags = RangeFlags::default();
                flags.set(RangeFlags::MIN);
                flags.set(RangeFlags::MAX);
                nums.push(Cnode::NumRange {
                    flags,
                    min: v,
                    max: v,
                });
            }
            Value::String(s) => strs.push(str_match(&Regexp::literal(s.as_str()))?),
            Value::Array(_) | Value::Object(_) => bail!(CompileError::NonScalarEnumMember {
                keyword: "enum",
                member: member.to_string(),
            }),
        }
    }

    let mut arms: Arms = std::array::from_fn(|ix| {
        let ok = match ALL_EVENTS[ix] {
            Event::Null => null_ok,
            Event::True => true_ok,
            Event::False => false_ok,
            _ => false,
        };
        if ok {
            Cnode::Valid
        } else {
            Cnode::Invalid
        }
    });
    if !nums.is_empty() {
        arms[Event::Number.index()] = or_of(nums);
    }
    if !strs.is_empty() {
        arms[Event::String.index()] = or_of(strs);
    }
    Ok(Cnode::Switch(Box::new(arms)))
}

fn or_of(mut children: Vec<Cnode>) -> Cnode {
    if children.len() == 1 {
        children.remove(0)
    } else {
        Cnode::Or(children)
    }
}

fn build_some_of(some_of: &SomeOf) -> Result<Cnode> {
    let mut children = some_of
        .set
        .iter()
        .map(build)
        .collect::<Result<Vec<_>>>()?;
    let n = children.len();
    if n == 1 {
        return Ok(children.remove(0));
    }
    if some_of.min == n && some_of.max == n {
        return Ok(Cnode::And(children));
    }
    if some_of.min == 1 && some_of.max == n {
        return Ok(Cnode::Or(children));
    }
    if some_of.min == 1 && some_of.max == 1 {
        return Ok(Cnode::Xor(children));
    }
    bail!(CompileError::UnsupportedCombinator {
        min: some_of.min,
        max: some_of.max,
        n,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser;
    use serde_json::json;

    fn raw(doc: Value) -> Cnode {
        from_ast(&parser::parse(&doc).unwrap()).unwrap()
    }

    #[test]
    fn integer_schema_gates_arms() {
        let Cnode::Switch(arms) = raw(json!({"type": "integer"})) else {
            panic!("expected a SWITCH");
        };
        assert!(matches!(arms[Event::Number.index()], Cnode::NumInteger));
        assert!(matches!(arms[Event::String.index()], Cnode::Invalid));
        assert!(matches!(arms[Event::ObjectEnd.index()], Cnode::Invalid));
        assert!(matches!(arms[Event::None.index()], Cnode::Invalid));
    }

    #[test]
    fn integer_with_number_drops_the_check() {
        let Cnode::Switch(arms) = raw(json!({"type": ["integer", "number"]})) else {
            panic!("expected a SWITCH");
        };
        assert!(matches!(arms[Event::Number.index()], Cnode::Valid));
    }

    #[test]
    fn empty_schema_permits_values_only() {
        let Cnode::Switch(arms) = raw(json!({})) else {
            panic!("expected a SWITCH");
        };
        for ev in ALL_EVENTS {
            let arm = &arms[ev.index()];
            if ev.starts_value() {
                assert!(matches!(arm, Cnode::Valid), "arm {}", ev.name());
            } else {
                assert!(matches!(arm, Cnode::Invalid), "arm {}", ev.name());
            }
        }
    }

    #[test]
    fn combinators_stack_above_the_switch() {
        let node = raw(json!({"allOf": [{"type": "string"}, {"minLength": 1}]}));
        let Cnode::And(children) = node else {
            panic!("expected AND");
        };
        assert_eq!(children.len(), 2);
        assert!(matches!(children[0], Cnode::Switch(_)));
        assert!(matches!(children[1], Cnode::And(_)));
    }

    #[test]
    fn one_of_builds_xor() {
        let node = raw(json!({"oneOf": [{"type": "string"}, {"type": "number"}]}));
        let Cnode::And(children) = node else {
            panic!("expected AND");
        };
        assert!(matches!(children[1], Cnode::Xor(_)));
    }

    #[test]
    fn object_keywords_build_prop_set() {
        let node = raw(json!({
            "type": "object",
            "properties": {"a": {"type": "integer"}},
            "required": ["a", "b"],
            "minProperties": 1
        }));
        let Cnode::Switch(arms) = node else {
            panic!("expected SWITCH");
        };
        let Cnode::And(obj) = &arms[Event::ObjectBeg.index()] else {
            panic!("expected AND in object arm");
        };
        assert!(matches!(obj[0], Cnode::ObjPropSet { .. }));
        assert!(matches!(&obj[1], Cnode::ObjRequired(names) if names.len() == 2));
        assert!(matches!(obj[2], Cnode::CountRange { min: 1, max: None }));
    }

    #[test]
    fn additional_properties_fills_the_default() {
        let node = raw(json!({"type": "object", "additionalProperties": false}));
        let Cnode::Switch(arms) = node else {
            panic!("expected SWITCH");
        };
        let Cnode::ObjPropSet { matches, default } = &arms[Event::ObjectBeg.index()] else {
            panic!("expected OBJ_PROP_SET");
        };
        assert!(matches.is_empty());
        assert!(matches!(default.as_deref(), Some(Cnode::Switch(_))));
    }

    #[test]
    fn scalar_enum_members_specialize_per_type() {
        let node = raw(json!({"enum": [null, true, 5, "x"]}));
        let Cnode::And(children) = node else {
            panic!("expected AND");
        };
        let Cnode::Switch(arms) = &children[1] else {
            panic!("expected enum SWITCH");
        };
        assert!(matches!(arms[Event::Null.index()], Cnode::Valid));
        assert!(matches!(arms[Event::True.index()], Cnode::Valid));
        assert!(matches!(arms[Event::False.index()], Cnode::Invalid));
        assert!(matches!(
            arms[Event::Number.index()],
            Cnode::NumRange { min, max, .. } if min == 5.0 && max == 5.0
        ));
        assert!(matches!(arms[Event::String.index()], Cnode::StrMatch { .. }));
    }

    #[test]
    fn unsupported_keywords_are_diagnosed() {
        let unsupported = [
            json!({"multipleOf": 2}),
            json!({"dependencies": {"a": ["b"]}}),
            json!({"propertyNames": {"minLength": 1}}),
            json!({"$ref": "#/definitions/x"}),
            json!({"enum": [[1, 2]]}),
        ];
        for doc in unsupported {
            let ast = parser::parse(&doc).unwrap();
            assert!(from_ast(&ast).is_err(), "{doc}");
        }
    }

    #[test]
    fn boolean_schemas_gate_every_value_arm() {
        let Cnode::Switch(arms) = raw(json!(true)) else {
            panic!("expected SWITCH");
        };
        assert!(matches!(arms[Event::Null.index()], Cnode::Valid));
        assert!(matches!(arms[Event::ObjectEnd.index()], Cnode::Invalid));

        let Cnode::Switch(arms) = raw(json!(false)) else {
            panic!("expected SWITCH");
        };
        assert!(matches!(arms[Event::Null.index()], Cnode::Invalid));
        assert!(matches!(arms[Event::ObjectBeg.index()], Cnode::Invalid));
    }
}
