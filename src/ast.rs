//! Data model of a domain: condition tuples, operator markers and the boolean
//! tree the parser builds from them.

use serde::Serialize;

/// A literal right-hand value, mapped 1:1 onto JSON scalars and arrays.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<Literal>),
}

impl From<bool> for Literal {
    fn from(value: bool) -> Self {
        Literal::Bool(value)
    }
}

impl From<i64> for Literal {
    fn from(value: i64) -> Self {
        Literal::Int(value)
    }
}

impl From<i32> for Literal {
    fn from(value: i32) -> Self {
        Literal::Int(value.into())
    }
}

impl From<f64> for Literal {
    fn from(value: f64) -> Self {
        Literal::Float(value)
    }
}

impl From<&str> for Literal {
    fn from(value: &str) -> Self {
        Literal::Text(value.to_string())
    }
}

impl From<String> for Literal {
    fn from(value: String) -> Self {
        Literal::Text(value)
    }
}

impl<T: Into<Literal>> From<Vec<T>> for Literal {
    fn from(values: Vec<T>) -> Self {
        Literal::List(values.into_iter().map(Into::into).collect())
    }
}

/// An explicit reference to another column, `{"field": "a.b"}` in JSON.
///
/// A bare string on the right-hand side is always a literal; comparing two
/// columns requires this wrapper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldRef {
    pub field: String,
}

impl FieldRef {
    pub fn new(field: impl Into<String>) -> Self {
        Self { field: field.into() }
    }
}

/// Functions accepted as right-hand values and as select columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FuncName {
    Coalesce,
    Greatest,
    Least,
    Concat,
    Max,
    Min,
    Sum,
    Avg,
    Count,
}

impl FuncName {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "coalesce" => Some(Self::Coalesce),
            "greatest" => Some(Self::Greatest),
            "least" => Some(Self::Least),
            "concat" => Some(Self::Concat),
            "max" => Some(Self::Max),
            "min" => Some(Self::Min),
            "sum" => Some(Self::Sum),
            "avg" => Some(Self::Avg),
            "count" => Some(Self::Count),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Coalesce => "coalesce",
            Self::Greatest => "greatest",
            Self::Least => "least",
            Self::Concat => "concat",
            Self::Max => "max",
            Self::Min => "min",
            Self::Sum => "sum",
            Self::Avg => "avg",
            Self::Count => "count",
        }
    }

    /// Aggregates take exactly one argument.
    pub fn is_aggregate(self) -> bool {
        matches!(
            self,
            Self::Max | Self::Min | Self::Sum | Self::Avg | Self::Count
        )
    }
}

/// A function argument. Arguments are field references unless explicitly
/// wrapped as `{"literal": value}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FuncArg {
    Field(String),
    Literal(LiteralArg),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiteralArg {
    pub literal: Literal,
}

impl FuncArg {
    pub fn field(path: impl Into<String>) -> Self {
        FuncArg::Field(path.into())
    }

    pub fn literal(value: impl Into<Literal>) -> Self {
        FuncArg::Literal(LiteralArg {
            literal: value.into(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionCall {
    pub function: FuncName,
    pub args: Vec<FuncArg>,
}

impl FunctionCall {
    pub fn new(function: FuncName, args: Vec<FuncArg>) -> Self {
        Self { function, args }
    }

    /// Field paths among the arguments, in argument order.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.args.iter().filter_map(|arg| match arg {
            FuncArg::Field(path) => Some(path.as_str()),
            FuncArg::Literal(_) => None,
        })
    }
}

/// Right-hand side of a condition.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Operand {
    Field(FieldRef),
    Function(FunctionCall),
    Value(Literal),
}

macro_rules! operand_from_literal {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Operand {
                fn from(value: $ty) -> Self {
                    Operand::Value(value.into())
                }
            }
        )*
    };
}

operand_from_literal!(bool, i64, i32, f64, &str, String);

impl From<Literal> for Operand {
    fn from(value: Literal) -> Self {
        Operand::Value(value)
    }
}

impl<T: Into<Literal>> From<Vec<T>> for Operand {
    fn from(values: Vec<T>) -> Self {
        Operand::Value(values.into())
    }
}

impl From<FieldRef> for Operand {
    fn from(field: FieldRef) -> Self {
        Operand::Field(field)
    }
}

impl From<FunctionCall> for Operand {
    fn from(call: FunctionCall) -> Self {
        Operand::Function(call)
    }
}

/// A `(field, operator, value)` tuple.
///
/// The operator is kept as written; it is checked against the registry when the
/// domain is parsed, not when the tuple is built.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub field: String,
    pub operator: String,
    pub value: Operand,
}

impl Condition {
    pub fn new(
        field: impl Into<String>,
        operator: impl Into<String>,
        value: impl Into<Operand>,
    ) -> Self {
        Self {
            field: field.into(),
            operator: operator.into(),
            value: value.into(),
        }
    }
}

/// One element of a domain array.
#[derive(Debug, Clone, PartialEq)]
pub enum DomainItem {
    /// A boolean marker such as `|`. Unknown markers are rejected by the parser.
    Operator(String),
    Condition(Condition),
}

impl DomainItem {
    pub fn or() -> Self {
        DomainItem::Operator("|".to_string())
    }

    pub fn and() -> Self {
        DomainItem::Operator("&".to_string())
    }

    pub fn not() -> Self {
        DomainItem::Operator("!".to_string())
    }

    pub fn cond(
        field: impl Into<String>,
        operator: impl Into<String>,
        value: impl Into<Operand>,
    ) -> Self {
        DomainItem::Condition(Condition::new(field, operator, value))
    }
}

impl From<Condition> for DomainItem {
    fn from(condition: Condition) -> Self {
        DomainItem::Condition(condition)
    }
}

/// A flat prefix-notation domain.
pub type Domain = Vec<DomainItem>;

/// Boolean tree over leaves of type `T`.
///
/// `And` and `Or` are kept flat: build them through [`BoolExpr::and`] and
/// [`BoolExpr::or`], which splice same-kind children instead of nesting them.
#[derive(Debug, Clone, PartialEq)]
pub enum BoolExpr<T> {
    Leaf(T),
    And(Vec<BoolExpr<T>>),
    Or(Vec<BoolExpr<T>>),
    Not(Box<BoolExpr<T>>),
}

impl<T> BoolExpr<T> {
    pub fn and(children: impl IntoIterator<Item = BoolExpr<T>>) -> Self {
        let mut flat = Vec::new();
        for child in children {
            match child {
                BoolExpr::And(grandchildren) => flat.extend(grandchildren),
                other => flat.push(other),
            }
        }
        BoolExpr::And(flat)
    }

    pub fn or(children: impl IntoIterator<Item = BoolExpr<T>>) -> Self {
        let mut flat = Vec::new();
        for child in children {
            match child {
                BoolExpr::Or(grandchildren) => flat.extend(grandchildren),
                other => flat.push(other),
            }
        }
        BoolExpr::Or(flat)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(child: BoolExpr<T>) -> Self {
        BoolExpr::Not(Box::new(child))
    }

    /// Leaves in left-to-right order.
    pub fn leaves(&self) -> Vec<&T> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a T>) {
        match self {
            BoolExpr::Leaf(leaf) => out.push(leaf),
            BoolExpr::And(children) | BoolExpr::Or(children) => {
                for child in children {
                    child.collect_leaves(out);
                }
            }
            BoolExpr::Not(inner) => inner.collect_leaves(out),
        }
    }

    /// True when no `And` directly contains an `And` and no `Or` an `Or`.
    pub fn is_flat(&self) -> bool {
        match self {
            BoolExpr::Leaf(_) => true,
            BoolExpr::And(children) => children
                .iter()
                .all(|c| !matches!(c, BoolExpr::And(_)) && c.is_flat()),
            BoolExpr::Or(children) => children
                .iter()
                .all(|c| !matches!(c, BoolExpr::Or(_)) && c.is_flat()),
            BoolExpr::Not(inner) => inner.is_flat(),
        }
    }

    /// Rebuilds the tree with every leaf passed through `f`, stopping at the
    /// first error.
    pub fn try_map<U, E>(self, f: &mut impl FnMut(T) -> Result<U, E>) -> Result<BoolExpr<U>, E> {
        Ok(match self {
            BoolExpr::Leaf(leaf) => BoolExpr::Leaf(f(leaf)?),
            BoolExpr::And(children) => BoolExpr::And(
                children
                    .into_iter()
                    .map(|c| c.try_map(f))
                    .collect::<Result<_, _>>()?,
            ),
            BoolExpr::Or(children) => BoolExpr::Or(
                children
                    .into_iter()
                    .map(|c| c.try_map(f))
                    .collect::<Result<_, _>>()?,
            ),
            BoolExpr::Not(inner) => BoolExpr::Not(Box::new(inner.try_map(f)?)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(n: i32) -> BoolExpr<i32> {
        BoolExpr::Leaf(n)
    }

    #[test]
    fn test_and_splices_and_children() {
        let inner = BoolExpr::and([leaf(1), leaf(2)]);
        let outer = BoolExpr::and([inner, leaf(3)]);
        assert_eq!(outer, BoolExpr::And(vec![leaf(1), leaf(2), leaf(3)]));
        assert!(outer.is_flat());
    }

    #[test]
    fn test_different_kinds_stay_nested() {
        let or = BoolExpr::or([leaf(1), leaf(2)]);
        let and = BoolExpr::and([or.clone(), leaf(3)]);
        assert_eq!(and, BoolExpr::And(vec![or, leaf(3)]));
    }

    #[test]
    fn test_leaves_in_order() {
        let expr = BoolExpr::and([
            BoolExpr::or([leaf(1), BoolExpr::not(leaf(2))]),
            leaf(3),
        ]);
        assert_eq!(expr.leaves(), vec![&1, &2, &3]);
    }

    #[test]
    fn test_is_flat_detects_nesting() {
        let nested: BoolExpr<i32> = BoolExpr::Or(vec![BoolExpr::Or(vec![leaf(1)]), leaf(2)]);
        assert!(!nested.is_flat());
    }

    #[test]
    fn test_try_map_stops_on_error() {
        let expr = BoolExpr::and([leaf(1), leaf(-2), leaf(3)]);
        let mut seen = Vec::new();
        let result: Result<BoolExpr<u32>, String> = expr.try_map(&mut |n| {
            seen.push(n);
            u32::try_from(n).map_err(|_| format!("negative {n}"))
        });
        assert_eq!(result, Err("negative -2".to_string()));
        assert_eq!(seen, vec![1, -2]);
    }

    #[test]
    fn test_condition_value_conversions() {
        let c = Condition::new("tags", "in", vec!["a", "b"]);
        assert_eq!(
            c.value,
            Operand::Value(Literal::List(vec![
                Literal::Text("a".into()),
                Literal::Text("b".into())
            ]))
        );
        let f = Condition::new("a", "=", FieldRef::new("b"));
        assert_eq!(f.value, Operand::Field(FieldRef::new("b")));
    }
}
