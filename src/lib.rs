//! Prefix-notation domains compiled to SQL expression trees and converted to
//! nested rule trees.
//!
//! ```text
//! ["|", ["state", "=", "open"], ["partner_id.name", "ilike", "jo"]]
//!        │
//!        ├─ parser        → BoolExpr<Condition>
//!        ├─ sql_compiler  → joins + sea_query Condition
//!        └─ rule_tree     → {"combinator": "or", "rules": [...]}
//! ```

pub mod ast;
pub mod config;
pub mod domain;
pub mod error;
pub mod joins;
pub mod operators;
pub mod parser;
pub mod query;
pub mod rule_tree;
pub mod sql_compiler;

pub use ast::{BoolExpr, Condition, Domain, DomainItem, FieldRef, FuncArg, FuncName, FunctionCall, Literal, Operand};
pub use config::{CompilerConfig, ConfigError, ForeignKeyConfig};
pub use error::{Error, Result};
pub use joins::{CustomJoin, ForeignKey, ForeignKeyProvider, JoinSession, JoinSpec, NoRelations};
pub use operators::{BoolOp, CompareOp, JoinKind};
pub use parser::{parse, Parser};
pub use query::{OOQuery, SelectField, SelectOptions};
pub use rule_tree::{from_tree, to_tree, Combinator, Rule, RuleTree};
pub use sql_compiler::{CompiledDomain, Dialect, SqlCompiler};
