// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! schemir compiles a JSON Schema document into an intermediate
//! representation (IR) that drives a streaming JSON validator.
//!
//! The compile pipeline has three stages, each producing a tree that the
//! next stage consumes whole:
//!
//! 1. [`parser`] fills the schema [`ast`] from a `serde_json::Value`.
//! 2. [`cnode`] rewrites the AST into a canonical constraint tree keyed
//!    per top-level JSON type, building one union DFA per property-match
//!    switch along the way.
//! 3. [`ir`] lowers the canonical tree into statements and expressions
//!    over a SAX-style token stream ([`events::Event`]).
//!
//! Executing the emitted IR over a concrete token stream yields VALID or
//! a specific INVALID code; the executor itself is an external
//! collaborator and is not part of this crate.
//!
//! ```
//! # use serde_json::json;
//! # fn main() -> anyhow::Result<()> {
//! let schema = json!({"type": "integer"});
//! let program = schemir::compile(&schema)?;
//! println!("{}", schemir::ir::dump(&program));
//! # Ok(())
//! # }
//! ```

pub mod ast;
pub mod cnode;
mod error;
pub mod events;
pub mod fsm;
pub mod ir;
pub mod parser;

pub use error::CompileError;
pub use events::Event;
pub use ir::InvalidCode;

use anyhow::Result;

/// Compile a JSON Schema document into a validation program.
///
/// The returned statement is always a [`ir::Stmt::Frame`], the root frame
/// of the program. Reference resolution is assumed complete before entry;
/// a schema that still carries `$ref` is a compile error.
pub fn compile(doc: &serde_json::Value) -> Result<ir::Stmt> {
    let schema = parser::parse(doc)?;
    compile_ast(&schema)
}

/// Compile an already-parsed schema AST into a validation program.
pub fn compile_ast(schema: &ast::Schema) -> Result<ir::Stmt> {
    let raw = cnode::from_ast(schema)?;
    let canon = cnode::canonify(raw)?;
    ir::translate(&canon)
}
