//! The operator registry for the domain language.
//!
//! Boolean markers, comparison tokens and join-type annotation codes are all
//! closed sets. Adding an operator means adding a variant and a table row.

use crate::error::{Error, Result};
use sea_query::JoinType;
use std::fmt;

/// A boolean operator marker appearing between conditions in a domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoolOp {
    And, // &
    Or,  // |
    Not, // !
}

impl BoolOp {
    pub fn from_marker(marker: &str) -> Option<Self> {
        match marker {
            "&" => Some(Self::And),
            "|" => Some(Self::Or),
            "!" => Some(Self::Not),
            _ => None,
        }
    }

    pub fn marker(self) -> &'static str {
        match self {
            Self::And => "&",
            Self::Or => "|",
            Self::Not => "!",
        }
    }

    /// Number of operands popped off the parser stack.
    pub fn arity(self) -> usize {
        match self {
            Self::And | Self::Or => 2,
            Self::Not => 1,
        }
    }
}

/// A comparison operator in the middle of a condition tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Eq,       // =
    NotEq,    // != <>
    Lt,       // <
    Lte,      // <=
    Gt,       // >
    Gte,      // >=
    Like,     // like =like
    NotLike,  // not like
    ILike,    // ilike =ilike
    NotILike, // not ilike
    In,       // in
    NotIn,    // not in
}

const COMPARE_TOKENS: &[(&str, CompareOp)] = &[
    ("=", CompareOp::Eq),
    ("!=", CompareOp::NotEq),
    ("<>", CompareOp::NotEq),
    ("<", CompareOp::Lt),
    ("<=", CompareOp::Lte),
    (">", CompareOp::Gt),
    (">=", CompareOp::Gte),
    ("like", CompareOp::Like),
    ("=like", CompareOp::Like),
    ("not like", CompareOp::NotLike),
    ("ilike", CompareOp::ILike),
    ("=ilike", CompareOp::ILike),
    ("not ilike", CompareOp::NotILike),
    ("in", CompareOp::In),
    ("not in", CompareOp::NotIn),
];

impl CompareOp {
    /// Looks a token up in the registry, failing with `UnsupportedOperator`.
    pub fn from_token(token: &str) -> Result<Self> {
        COMPARE_TOKENS
            .iter()
            .find(|(t, _)| *t == token)
            .map(|(_, op)| *op)
            .ok_or_else(|| Error::UnsupportedOperator(token.to_string()))
    }

    /// Canonical token; aliases such as `<>` collapse onto it.
    pub fn token(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::NotEq => "!=",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Like => "like",
            Self::NotLike => "not like",
            Self::ILike => "ilike",
            Self::NotILike => "not ilike",
            Self::In => "in",
            Self::NotIn => "not in",
        }
    }

    pub fn is_membership(self) -> bool {
        matches!(self, Self::In | Self::NotIn)
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// Join type selected by a `hop(CODE)` annotation on a relational path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum JoinKind {
    #[default]
    Inner, // I
    Left,       // L
    LeftOuter,  // LO
    Right,      // R
    RightOuter, // RO
    Full,       // F
    FullOuter,  // FO
    Cross,      // C
}

impl JoinKind {
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "I" => Some(Self::Inner),
            "L" => Some(Self::Left),
            "LO" => Some(Self::LeftOuter),
            "R" => Some(Self::Right),
            "RO" => Some(Self::RightOuter),
            "F" => Some(Self::Full),
            "FO" => Some(Self::FullOuter),
            "C" => Some(Self::Cross),
            _ => None,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Self::Inner => "I",
            Self::Left => "L",
            Self::LeftOuter => "LO",
            Self::Right => "R",
            Self::RightOuter => "RO",
            Self::Full => "F",
            Self::FullOuter => "FO",
            Self::Cross => "C",
        }
    }

    /// The sea-query join this kind renders as. SQL has no distinct LEFT OUTER
    /// or plain FULL, so those fold onto their equivalents.
    pub fn join_type(self) -> JoinType {
        match self {
            Self::Inner => JoinType::InnerJoin,
            Self::Left | Self::LeftOuter => JoinType::LeftJoin,
            Self::Right | Self::RightOuter => JoinType::RightJoin,
            Self::Full | Self::FullOuter => JoinType::FullOuterJoin,
            Self::Cross => JoinType::CrossJoin,
        }
    }
}

/// Splits a hop such as `partner_id(L)` into its name and join kind.
///
/// A hop without annotation is an INNER join.
pub fn parse_hop(hop: &str) -> Result<(&str, JoinKind)> {
    let Some(open) = hop.find('(') else {
        return Ok((hop, JoinKind::Inner));
    };

    let (name, rest) = hop.split_at(open);
    let code = rest
        .strip_prefix('(')
        .and_then(|r| r.strip_suffix(')'))
        .ok_or_else(|| Error::invalid_expression(format!("malformed join annotation in `{hop}`")))?;

    let kind = JoinKind::from_code(code.trim()).ok_or_else(|| {
        Error::invalid_expression(format!("unknown join type `{code}` in `{hop}`"))
    })?;

    if name.is_empty() {
        return Err(Error::invalid_expression(format!("empty relation name in `{hop}`")));
    }

    Ok((name, kind))
}
