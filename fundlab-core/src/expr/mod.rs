//! Plot expressions: axis and size formulas, filter predicates.
//!
//! Pipeline: `lexer::tokenize` → `parser::parse` (AST) → `bind` (column
//! lookup, kind selection, static types) → `eval` per ticker.
//!
//! Grammar, lowest precedence first:
//!
//! ```text
//! or         := and ( "|" and )*
//! and        := comparison ( "&" comparison )*
//! comparison := additive ( ("<" | "<=" | ">" | ">=" | "==" | "!=") additive )?
//! additive   := term ( ("+" | "-") term )*
//! term       := unary ( ("*" | "/") unary )*
//! unary      := "-" unary | primary
//! primary    := number | string | "true" | "false" | ident
//!             | ident "(" args ")" | "(" or ")"
//! ```
//!
//! An expression reads exactly one data kind. Quarter columns resolve to the
//! latest Q4 value; `cagr` and `mean` reduce the Q4 series.

pub mod ast;
pub mod bind;
pub mod eval;
pub mod lexer;
pub mod parser;
pub mod resolver;
pub mod types;

pub use ast::{BinaryOp, Call, Expr, Literal, Reduction};
pub use resolver::{CompiledExpr, ExpressionResolver};
pub use types::{ExprType, Scalar};

use thiserror::Error;

use crate::domain::DataKind;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ExpressionError {
    #[error("expression is empty")]
    Empty,

    #[error("syntax error at position {position}: {message}")]
    Syntax { position: usize, message: String },

    #[error("unknown column '{0}'")]
    UnknownColumn(String),

    #[error("unknown function '{0}'")]
    UnknownFunction(String),

    #[error("{function}() takes {expected} argument(s), got {actual}")]
    Arity {
        function: String,
        expected: String,
        actual: usize,
    },

    #[error("invalid argument to {function}(): {message}")]
    Argument { function: String, message: String },

    #[error("type error: {0}")]
    Type(String),

    #[error("column '{column}' is {second} data but the expression already reads {first} data")]
    CrossKind {
        first: DataKind,
        second: DataKind,
        column: String,
    },

    #[error("column '{column}' is {kind} data, which cannot be plotted")]
    NotPlottable { column: String, kind: DataKind },
}
