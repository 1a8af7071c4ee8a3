// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::rc::Rc;

use serde::Serialize;

/// Keyword presence bitmap.
///
/// Multiple occurrences of a keyword override the previous instance.
/// A bit in this bitmap indicates that the corresponding field holds a
/// meaningful value; this matters because `"maximum": 0` and an absent
/// `maximum` must remain distinguishable.
///
/// Some keywords are not tracked here because their fields carry their
/// own presence information:
///
/// * `items`, `additionalItems`, `contains`: empty/`None`
/// * `uniqueItems`: defaults false
/// * `pattern`, `propertyNames`, `not`: `None`
/// * `required`, `properties`/`patternProperties`, `enum`/`const`,
///   `allOf`/`anyOf`/`oneOf`, `dependencies`, `definitions`: empty set
/// * `type`: empty bitmap
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Kws(u32);

impl Kws {
    pub const VALUE: Kws = Kws(1 << 0);

    pub const MULTIPLE_OF: Kws = Kws(1 << 1);
    pub const MAXIMUM: Kws = Kws(1 << 2); // also "exclusiveMaximum"
    pub const MINIMUM: Kws = Kws(1 << 3); // also "exclusiveMinimum"

    pub const MIN_LENGTH: Kws = Kws(1 << 5);
    pub const MAX_LENGTH: Kws = Kws(1 << 6);

    pub const MIN_ITEMS: Kws = Kws(1 << 7);
    pub const MAX_ITEMS: Kws = Kws(1 << 8);

    pub const MIN_PROPERTIES: Kws = Kws(1 << 9);
    pub const MAX_PROPERTIES: Kws = Kws(1 << 10);

    /// `items` was a single subschema rather than an array.
    pub const SINGLETON_ITEMS: Kws = Kws(1 << 11);

    /// `$ref` is present; every other keyword must be ignored.
    pub const HAS_REF: Kws = Kws(1 << 12);

    pub fn has(self, bit: Kws) -> bool {
        self.0 & bit.0 != 0
    }

    pub fn set(&mut self, bit: Kws) {
        self.0 |= bit.0;
    }
}

/// Bitmap of JSON types permitted by the `type` keyword. Empty means the
/// keyword is absent and every type is permitted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Types(u32);

impl Types {
    pub const NULL: Types = Types(1 << 0);
    pub const BOOLEAN: Types = Types(1 << 1);
    pub const INTEGER: Types = Types(1 << 2);
    pub const NUMBER: Types = Types(1 << 3);
    pub const STRING: Types = Types(1 << 4);
    pub const ARRAY: Types = Types(1 << 5);
    pub const OBJECT: Types = Types(1 << 6);

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn has(self, bit: Types) -> bool {
        self.0 & bit.0 != 0
    }

    pub fn set(&mut self, bit: Types) {
        self.0 |= bit.0;
    }

    /// Whether a value of the given primitive class is permitted. An
    /// empty bitmap permits everything.
    pub fn allows(self, bit: Types) -> bool {
        self.is_empty() || self.has(bit)
    }
}

/// How the text of a [`Regexp`] is to be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Dialect {
    /// An exact string: matches the whole key, no metacharacters.
    Literal,
    /// A native regular expression with unanchored search semantics.
    Native,
}

/// A regular expression as carried by the schema: `pattern`,
/// `patternProperties` keys, and literal `properties`/`required` names.
/// FSMs are compiled from the text on demand during canonicalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Regexp {
    pub dialect: Dialect,
    pub text: Rc<str>,
}

impl Regexp {
    pub fn literal(text: impl Into<Rc<str>>) -> Regexp {
        Regexp {
            dialect: Dialect::Literal,
            text: text.into(),
        }
    }

    pub fn native(text: impl Into<Rc<str>>) -> Regexp {
        Regexp {
            dialect: Dialect::Native,
            text: text.into(),
        }
    }
}

/// One `properties`/`patternProperties` entry: a key pattern paired with
/// the subschema its values must satisfy. Literal keys and regexp keys
/// share this carrier, distinguished by the pattern dialect.
#[derive(Debug, Clone)]
pub struct PropertySchema {
    pub pattern: Regexp,
    pub schema: Schema,
}

/// One string-form `dependencies` entry: when a property matching
/// `pattern` is present, every name in `set` is required.
#[derive(Debug, Clone)]
pub struct PropertyNames {
    pub pattern: Regexp,
    pub set: Vec<Rc<str>>,
}

/// `allOf` / `anyOf` / `oneOf`, encoded by how many members must hold:
/// allOf is (n, n), anyOf is (1, n), oneOf is (1, 1).
#[derive(Debug, Clone, Default)]
pub struct SomeOf {
    pub min: usize,
    pub max: usize,
    pub set: Vec<Schema>,
}

/// Direct in-memory representation of a schema document's keywords.
///
/// Fields gated by [`Kws`] bits hold meaningful values only when the bit
/// is set; the rest use sentinel values as documented on [`Kws`].
#[derive(Debug, Clone, Default)]
pub struct Schema {
    pub kws: Kws,

    /// Boolean schema (`true` accepts everything, `false` rejects
    /// everything); meaningful when `KWS::VALUE` is set.
    pub value: bool,

    pub refr: Option<Rc<str>>,

    pub multiple_of: f64, // > 0

    /// `maximum` is "exclusiveMaximum" rather than "maximum".
    pub exclusive_maximum: bool,
    pub exclusive_minimum: bool,
    pub maximum: f64,
    pub minimum: f64,

    pub pattern: Option<Regexp>,

    // min/max fields are only valid when the matching Kws bits are set.
    // Otherwise the defaults are: min is 0, max is unbounded.
    pub max_length: usize,
    pub min_length: usize,
    pub max_items: usize,
    pub min_items: usize,
    pub max_properties: usize,
    pub min_properties: usize,

    /// 1 or more; empty means absent. `KWS::SINGLETON_ITEMS` records
    /// whether the keyword was a single subschema.
    pub items: Vec<Schema>,
    pub additional_items: Option<Box<Schema>>,

    pub unique_items: bool, // defaults false

    pub contains: Option<Box<Schema>>,

    /// Unique property names from `required`.
    pub required: Vec<Rc<str>>,

    /// `properties` (literal keys) and `patternProperties` (regexp keys)
    /// carried together; literals come first.
    pub properties: Vec<PropertySchema>,

    pub additional_properties: Option<Box<Schema>>,

    /// `dependencies`, array form.
    pub dependencies_strings: Vec<PropertyNames>,

    /// `dependencies`, schema form.
    pub dependencies_schema: Vec<PropertySchema>,

    pub property_names: Option<Box<Schema>>,

    /// `enum` is an unordered set; `const` is an enum of a single item.
    pub xenum: Vec<serde_json::Value>,

    pub types: Types,

    pub some_of: Option<SomeOf>,

    pub not: Option<Box<Schema>>,

    pub definitions: Vec<(Rc<str>, Schema)>,

    pub id: Option<Rc<str>>,
    pub title: Option<Rc<str>>,
    pub description: Option<Rc<str>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kws_bits_are_distinct() {
        let bits = [
            Kws::VALUE,
            Kws::MULTIPLE_OF,
            Kws::MAXIMUM,
            Kws::MINIMUM,
            Kws::MIN_LENGTH,
            Kws::MAX_LENGTH,
            Kws::MIN_ITEMS,
            Kws::MAX_ITEMS,
            Kws::MIN_PROPERTIES,
            Kws::MAX_PROPERTIES,
            Kws::SINGLETON_ITEMS,
            Kws::HAS_REF,
        ];
        for (i, a) in bits.iter().enumerate() {
            for (j, b) in bits.iter().enumerate() {
                assert_eq!(i == j, a == b);
            }
        }
    }

    #[test]
    fn empty_types_allow_everything() {
        let t = Types::default();
        assert!(t.is_empty());
        assert!(t.allows(Types::OBJECT));
        assert!(t.allows(Types::NULL));

        let mut t = Types::default();
        t.set(Types::STRING);
        assert!(t.allows(Types::STRING));
        assert!(!t.allows(Types::OBJECT));
    }
}
