//! Error type shared by the parser, the join resolver and the converters.

use thiserror::Error as ThisError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Every failure is an input-validation failure: a bad domain, a bad rule tree
/// or metadata that cannot satisfy a relational path.
#[derive(Debug, Clone, PartialEq, ThisError)]
pub enum Error {
    /// Malformed condition, unknown marker or a marker without enough operands.
    #[error("invalid expression: {0}")]
    InvalidExpression(String),

    #[error("operator {0} is not supported")]
    UnsupportedOperator(String),

    /// The foreign-key provider knows no relation `field` on `table`.
    #[error("no relation `{field}` on table `{table}`")]
    UnresolvedRelation { table: String, field: String },

    /// The target dialect has no SQL form for this join kind.
    #[error("join `{}` is not supported by {}", kind.code(), dialect.name())]
    UnsupportedJoin {
        kind: crate::operators::JoinKind,
        dialect: crate::sql_compiler::Dialect,
    },

    #[error("invalid rule: {0}")]
    InvalidRule(String),

    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),
}

impl Error {
    pub(crate) fn invalid_expression(message: impl Into<String>) -> Self {
        Self::InvalidExpression(message.into())
    }

    pub(crate) fn invalid_rule(message: impl Into<String>) -> Self {
        Self::InvalidRule(message.into())
    }
}
