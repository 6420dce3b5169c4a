//! The expression dialect: conditions, updates, and projections.
//!
//! Expressions move through three stages:
//!
//! 1. **Lexing**: the raw string becomes tokens, with `#name` and `:value`
//!    placeholders kept intact.
//! 2. **Parsing**: a recursive-descent pass builds the [`ast`] types.
//! 3. **Evaluation**: [`evaluator::ExprEnv`] runs the tree against an item
//!    with the request's substitution maps.

pub mod ast;
pub mod evaluator;
pub mod parser;

pub use ast::{Expr, Operand, Path, Update};
pub use evaluator::ExprEnv;
pub use parser::{parse_condition, parse_projection, parse_update, ExprError};
