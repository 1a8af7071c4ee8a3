// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Fills the schema AST from a parsed JSON document.
//!
//! Keywords are processed in a fixed order so that the resulting AST does
//! not depend on document key order. Unknown keywords are ignored, as the
//! schema specification requires for annotations; known keywords with a
//! malformed value are a compile error rather than silently dropped.

use std::rc::Rc;

use anyhow::{bail, Result};
use serde_json::Value;

use crate::ast::{Kws, PropertyNames, PropertySchema, Regexp, Schema, SomeOf, Types};
use crate::error::CompileError;

/// Parse a schema document into an AST.
///
/// Boolean documents are the boolean schemas: `true` accepts every
/// instance, `false` rejects every instance.
pub fn parse(doc: &Value) -> Result<Schema> {
    match doc {
        Value::Bool(b) => {
            let mut schema = Schema::default();
            schema.kws.set(Kws::VALUE);
            schema.value = *b;
            Ok(schema)
        }
        Value::Object(_) => parse_object(doc),
        _ => bail!(CompileError::MalformedKeyword {
            keyword: "<document>",
            expected: "an object or boolean schema",
            got: short(doc),
        }),
    }
}

fn parse_object(doc: &Value) -> Result<Schema> {
    let mut schema = Schema::default();

    // `$ref` wins over everything else; the remaining keywords are not
    // even inspected.
    if let Some(r) = doc.get("$ref") {
        schema.kws.set(Kws::HAS_REF);
        schema.refr = Some(expect_string("$ref", r)?);
        return Ok(schema);
    }

    parse_metadata(doc, &mut schema)?;
    parse_types(doc, &mut schema)?;
    parse_numeric(doc, &mut schema)?;
    parse_string(doc, &mut schema)?;
    parse_array(doc, &mut schema)?;
    parse_object_kws(doc, &mut schema)?;
    parse_combinators(doc, &mut schema)?;

    Ok(schema)
}

fn parse_metadata(doc: &Value, schema: &mut Schema) -> Result<()> {
    if let Some(v) = doc.get("$id") {
        schema.id = Some(expect_string("$id", v)?);
    }
    if let Some(v) = doc.get("title") {
        schema.title = Some(expect_string("title", v)?);
    }
    if let Some(v) = doc.get("description") {
        schema.description = Some(expect_string("description", v)?);
    }
    if let Some(v) = doc.get("definitions") {
        let Value::Object(map) = v else {
            bail!(malformed("definitions", "an object of schemas", v));
        };
        for (name, sub) in map {
            schema.definitions.push((Rc::from(name.as_str()), parse(sub)?));
        }
    }
    Ok(())
}

fn parse_types(doc: &Value, schema: &mut Schema) -> Result<()> {
    let Some(v) = doc.get("type") else {
        return Ok(());
    };
    match v {
        Value::String(name) => schema.types.set(type_bit(name)?),
        Value::Array(names) => {
            if names.is_empty() {
                bail!(malformed("type", "a type name or non-empty array", v));
            }
            for name in names {
                let Value::String(name) = name else {
                    bail!(malformed("type", "an array of type names", name));
                };
                schema.types.set(type_bit(name)?);
            }
        }
        _ => bail!(malformed("type", "a type name or array of type names", v)),
    }
    Ok(())
}

fn type_bit(name: &str) -> Result<Types> {
    Ok(match name {
        "null" => Types::NULL,
        "boolean" => Types::BOOLEAN,
        "integer" => Types::INTEGER,
        "number" => Types::NUMBER,
        "string" => Types::STRING,
        "array" => Types::ARRAY,
        "object" => Types::OBJECT,
        _ => bail!(CompileError::MalformedKeyword {
            keyword: "type",
            expected: "a JSON type name",
            got: name.to_string(),
        }),
    })
}

fn parse_numeric(doc: &Value, schema: &mut Schema) -> Result<()> {
    if let Some(v) = doc.get("multipleOf") {
        let n = expect_number("multipleOf", v)?;
        if n <= 0.0 {
            bail!(malformed("multipleOf", "a number > 0", v));
        }
        schema.kws.set(Kws::MULTIPLE_OF);
        schema.multiple_of = n;
    }

    if let Some(v) = doc.get("maximum") {
        schema.kws.set(Kws::MAXIMUM);
        schema.maximum = expect_number("maximum", v)?;
        schema.exclusive_maximum = false;
    }
    if let Some(v) = doc.get("minimum") {
        schema.kws.set(Kws::MINIMUM);
        schema.minimum = expect_number("minimum", v)?;
        schema.exclusive_minimum = false;
    }

    // Both exclusive forms are accepted: the boolean form marks the bound
    // parsed above as exclusive, the numeric form is its own bound and
    // overrides like any repeated keyword.
    if let Some(v) = doc.get("exclusiveMaximum") {
        match v {
            Value::Bool(b) => schema.exclusive_maximum = *b,
            Value::Number(_) => {
                schema.kws.set(Kws::MAXIMUM);
                schema.maximum = expect_number("exclusiveMaximum", v)?;
                schema.exclusive_maximum = true;
            }
            _ => bail!(malformed("exclusiveMaximum", "a boolean or number", v)),
        }
    }
    if let Some(v) = doc.get("exclusiveMinimum") {
        match v {
            Value::Bool(b) => schema.exclusive_minimum = *b,
            Value::Number(_) => {
                schema.kws.set(Kws::MINIMUM);
                schema.minimum = expect_number("exclusiveMinimum", v)?;
                schema.exclusive_minimum = true;
            }
            _ => bail!(malformed("exclusiveMinimum", "a boolean or number", v)),
        }
    }
    Ok(())
}

fn parse_string(doc: &Value, schema: &mut Schema) -> Result<()> {
    if let Some(v) = doc.get("maxLength") {
        schema.kws.set(Kws::MAX_LENGTH);
        schema.max_length = expect_count("maxLength", v)?;
    }
    if let Some(v) = doc.get("minLength") {
        schema.kws.set(Kws::MIN_LENGTH);
        schema.min_length = expect_count("minLength", v)?;
    }
    if let Some(v) = doc.get("pattern") {
        schema.pattern = Some(Regexp::native(expect_string("pattern", v)?));
    }
    Ok(())
}

fn parse_array(doc: &Value, schema: &mut Schema) -> Result<()> {
    if let Some(v) = doc.get("items") {
        match v {
            Value::Array(subs) => {
                if subs.is_empty() {
                    bail!(malformed("items", "a schema or non-empty array", v));
                }
                for sub in subs {
                    schema.items.push(parse(sub)?);
                }
            }
            _ => {
                schema.kws.set(Kws::SINGLETON_ITEMS);
                schema.items.push(parse(v)?);
            }
        }
    }
    if let Some(v) = doc.get("additionalItems") {
        schema.additional_items = Some(Box::new(parse(v)?));
    }
    if let Some(v) = doc.get("uniqueItems") {
        let Value::Bool(b) = v else {
            bail!(malformed("uniqueItems", "a boolean", v));
        };
        schema.unique_items = *b;
    }
    if let Some(v) = doc.get("contains") {
        schema.contains = Some(Box::new(parse(v)?));
    }
    if let Some(v) = doc.get("maxItems") {
        schema.kws.set(Kws::MAX_ITEMS);
        schema.max_items = expect_count("maxItems", v)?;
    }
    if let Some(v) = doc.get("minItems") {
        schema.kws.set(Kws::MIN_ITEMS);
        schema.min_items = expect_count("minItems", v)?;
    }
    Ok(())
}

fn parse_object_kws(doc: &Value, schema: &mut Schema) -> Result<()> {
    // Literal keys before pattern keys, each group in document order;
    // downstream case numbering follows this ordering.
    if let Some(v) = doc.get("properties") {
        let Value::Object(map) = v else {
            bail!(malformed("properties", "an object of schemas", v));
        };
        for (key, sub) in map {
            schema.properties.push(PropertySchema {
                pattern: Regexp::literal(key.as_str()),
                schema: parse(sub)?,
            });
        }
    }
    if let Some(v) = doc.get("patternProperties") {
        let Value::Object(map) = v else {
            bail!(malformed("patternProperties", "an object of schemas", v));
        };
        for (key, sub) in map {
            schema.properties.push(PropertySchema {
                pattern: Regexp::native(key.as_str()),
                schema: parse(sub)?,
            });
        }
    }
    if let Some(v) = doc.get("additionalProperties") {
        schema.additional_properties = Some(Box::new(parse(v)?));
    }

    if let Some(v) = doc.get("required") {
        let Value::Array(names) = v else {
            bail!(malformed("required", "an array of strings", v));
        };
        for name in names {
            let Value::String(name) = name else {
                bail!(malformed("required", "an array of strings", name));
            };
            // The keyword is a set; a repeated name requires nothing new.
            if !schema.required.iter().any(|n| n.as_ref() == name.as_str()) {
                schema.required.push(Rc::from(name.as_str()));
            }
        }
    }

    if let Some(v) = doc.get("dependencies") {
        let Value::Object(map) = v else {
            bail!(malformed("dependencies", "an object", v));
        };
        for (key, dep) in map {
            match dep {
                Value::Array(names) => {
                    let mut set = Vec::with_capacity(names.len());
                    for name in names {
                        let Value::String(name) = name else {
                            bail!(malformed("dependencies", "strings in array form", name));
                        };
                        set.push(Rc::from(name.as_str()));
                    }
                    schema.dependencies_strings.push(PropertyNames {
                        pattern: Regexp::literal(key.as_str()),
                        set,
                    });
                }
                _ => schema.dependencies_schema.push(PropertySchema {
                    pattern: Regexp::literal(key.as_str()),
                    schema: parse(dep)?,
                }),
            }
        }
    }

    if let Some(v) = doc.get("propertyNames") {
        schema.property_names = Some(Box::new(parse(v)?));
    }

    if let Some(v) = doc.get("maxProperties") {
        schema.kws.set(Kws::MAX_PROPERTIES);
        schema.max_properties = expect_count("maxProperties", v)?;
    }
    if let Some(v) = doc.get("minProperties") {
        schema.kws.set(Kws::MIN_PROPERTIES);
        schema.min_properties = expect_count("minProperties", v)?;
    }
    Ok(())
}

fn parse_combinators(doc: &Value, schema: &mut Schema) -> Result<()> {
    if let Some(v) = doc.get("enum") {
        let Value::Array(members) = v else {
            bail!(malformed("enum", "a non-empty array", v));
        };
        if members.is_empty() {
            bail!(malformed("enum", "a non-empty array", v));
        }
        schema.xenum = members.clone();
    }
    if let Some(v) = doc.get("const") {
        schema.xenum = vec![v.clone()];
    }

    for (keyword, kind) in [
        ("allOf", SomeOfKind::All),
        ("anyOf", SomeOfKind::Any),
        ("oneOf", SomeOfKind::One),
    ] {
        let Some(v) = doc.get(keyword) else {
            continue;
        };
        let Value::Array(subs) = v else {
            bail!(malformed(keyword, "a non-empty array of schemas", v));
        };
        if subs.is_empty() {
            bail!(malformed(keyword, "a non-empty array of schemas", v));
        }
        let mut set = Vec::with_capacity(subs.len());
        for sub in subs {
            set.push(parse(sub)?);
        }
        let n = set.len();
        let (min, max) = match kind {
            SomeOfKind::All => (n, n),
            SomeOfKind::Any => (1, n),
            SomeOfKind::One => (1, 1),
        };
        schema.some_of = Some(SomeOf { min, max, set });
    }

    if let Some(v) = doc.get("not") {
        schema.not = Some(Box::new(parse(v)?));
    }
    Ok(())
}

enum SomeOfKind {
    All,
    Any,
    One,
}

fn expect_string(keyword: &'static str, v: &Value) -> Result<Rc<str>> {
    match v {
        Value::String(s) => Ok(Rc::from(s.as_str())),
        _ => bail!(malformed(keyword, "a string", v)),
    }
}

fn expect_number(keyword: &'static str, v: &Value) -> Result<f64> {
    match v.as_f64() {
        Some(n) => Ok(n),
        None => bail!(malformed(keyword, "a number", v)),
    }
}

fn expect_count(keyword: &'static str, v: &Value) -> Result<usize> {
    match v.as_u64().and_then(|n| usize::try_from(n).ok()) {
        Some(n) => Ok(n),
        None => bail!(malformed(keyword, "a non-negative integer", v)),
    }
}

fn malformed(keyword: &'static str, expected: &'static str, got: &Value) -> CompileError {
    CompileError::MalformedKeyword {
        keyword,
        expected,
        got: short(got),
    }
}

fn short(v: &Value) -> String {
    let text = v.to_string();
    if text.chars().count() > 40 {
        let head: String = text.chars().take(40).collect();
        format!("{head}…")
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn presence_bits_distinguish_zero_from_absent() {
        let with = parse(&json!({"maximum": 0})).unwrap();
        assert!(with.kws.has(Kws::MAXIMUM));
        assert_eq!(with.maximum, 0.0);

        let without = parse(&json!({})).unwrap();
        assert!(!without.kws.has(Kws::MAXIMUM));
    }

    #[test]
    fn boolean_schemas() {
        let t = parse(&json!(true)).unwrap();
        assert!(t.kws.has(Kws::VALUE));
        assert!(t.value);

        let f = parse(&json!(false)).unwrap();
        assert!(f.kws.has(Kws::VALUE));
        assert!(!f.value);
    }

    #[test]
    fn ref_ignores_other_keywords() {
        let s = parse(&json!({"$ref": "#/definitions/a", "type": "string"})).unwrap();
        assert!(s.kws.has(Kws::HAS_REF));
        assert_eq!(s.refr.as_deref(), Some("#/definitions/a"));
        assert!(s.types.is_empty());
    }

    #[test]
    fn exclusive_bound_forms() {
        // draft-04: boolean marks the plain bound exclusive
        let s = parse(&json!({"maximum": 10, "exclusiveMaximum": true})).unwrap();
        assert!(s.kws.has(Kws::MAXIMUM));
        assert!(s.exclusive_maximum);
        assert_eq!(s.maximum, 10.0);

        // draft-07: the numeric form is the bound
        let s = parse(&json!({"exclusiveMaximum": 10})).unwrap();
        assert!(s.kws.has(Kws::MAXIMUM));
        assert!(s.exclusive_maximum);
        assert_eq!(s.maximum, 10.0);

        let s = parse(&json!({"minimum": 3})).unwrap();
        assert!(s.kws.has(Kws::MINIMUM));
        assert!(!s.exclusive_minimum);
    }

    #[test]
    fn singleton_items_flagged() {
        let single = parse(&json!({"items": {"type": "string"}})).unwrap();
        assert!(single.kws.has(Kws::SINGLETON_ITEMS));
        assert_eq!(single.items.len(), 1);

        let ordered = parse(&json!({"items": [{"type": "string"}, {}]})).unwrap();
        assert!(!ordered.kws.has(Kws::SINGLETON_ITEMS));
        assert_eq!(ordered.items.len(), 2);
    }

    #[test]
    fn properties_carry_dialects() {
        let s = parse(&json!({
            "properties": {"a": {}},
            "patternProperties": {"^x": {}}
        }))
        .unwrap();
        assert_eq!(s.properties.len(), 2);
        assert_eq!(s.properties[0].pattern, Regexp::literal("a"));
        assert_eq!(s.properties[1].pattern, Regexp::native("^x"));
    }

    #[test]
    fn required_deduplicates() {
        let s = parse(&json!({"required": ["a", "b", "a"]})).unwrap();
        let names: Vec<&str> = s.required.iter().map(|n| n.as_ref()).collect();
        assert_eq!(names, ["a", "b"]);
    }

    #[test]
    fn some_of_bounds() {
        let s = parse(&json!({"allOf": [{}, {}]})).unwrap();
        let some_of = s.some_of.unwrap();
        assert_eq!((some_of.min, some_of.max), (2, 2));

        let s = parse(&json!({"anyOf": [{}, {}, {}]})).unwrap();
        let some_of = s.some_of.unwrap();
        assert_eq!((some_of.min, some_of.max), (1, 3));

        let s = parse(&json!({"oneOf": [{}, {}]})).unwrap();
        let some_of = s.some_of.unwrap();
        assert_eq!((some_of.min, some_of.max), (1, 1));
    }

    #[test]
    fn const_is_singleton_enum() {
        let s = parse(&json!({"const": 5})).unwrap();
        assert_eq!(s.xenum, vec![json!(5)]);
    }

    #[test]
    fn malformed_keyword_is_an_error() {
        assert!(parse(&json!({"type": 7})).is_err());
        assert!(parse(&json!({"multipleOf": 0})).is_err());
        assert!(parse(&json!({"required": "a"})).is_err());
        assert!(parse(&json!(42)).is_err());
    }
}
