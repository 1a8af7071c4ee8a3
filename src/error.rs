// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use thiserror::Error;

/// Schema-compile diagnostics.
///
/// These cover the first error regime: a schema that cannot be compiled.
/// Validation outcomes of a JSON document are not errors; they are
/// `INVALID` statements in the emitted IR. Internal invariant violations
/// (a canonical-form node showing up where canonicalization should have
/// removed it) also surface through this enum; they indicate a compiler
/// bug rather than a user error, and there is no recovery from either
/// kind: the first violated invariant fails the compile.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    #[error("unresolved $ref `{reference}`: reference resolution must complete before compilation")]
    UnresolvedRef { reference: String },

    #[error("keyword `{keyword}` is not supported yet")]
    UnsupportedKeyword { keyword: &'static str },

    #[error("`{keyword}` member `{member}` is not a scalar; deep equality is not supported yet")]
    NonScalarEnumMember {
        keyword: &'static str,
        member: String,
    },

    #[error("keyword `{keyword}` expects {expected}, got `{got}`")]
    MalformedKeyword {
        keyword: &'static str,
        expected: &'static str,
        got: String,
    },

    #[error("unsupported regular expression `{pattern}`: {reason}")]
    UnsupportedRegex { pattern: String, reason: String },

    #[error("combinator bounds ({min}, {max}) over {n} schemas do not map to allOf/anyOf/oneOf")]
    UnsupportedCombinator { min: usize, max: usize, n: usize },

    #[error("internal invariant violated: {0}")]
    Invariant(String),
}

/// Shorthand for the internal-invariant variant; these are compiler bugs.
pub(crate) fn invariant(msg: impl Into<String>) -> anyhow::Error {
    anyhow::Error::new(CompileError::Invariant(msg.into()))
}
