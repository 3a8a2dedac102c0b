//! Domain compiler that binds a domain to resolved columns and renders it with sea-query.

use crate::ast::{BoolExpr, Condition, DomainItem, FuncArg, FuncName, FunctionCall, Literal, Operand};
use crate::error::{Error, Result};
use crate::joins::{ColumnRef, ForeignKeyProvider, JoinSession, JoinSpec, TableRef};
use crate::operators::{CompareOp, JoinKind};
use crate::parser::Parser;
use sea_query::extension::postgres::PgBinOper;
use sea_query::{
    Alias, Asterisk, BinOper, Condition as SqlCondition, ConditionalStatement, Expr, Func,
    Iden, Keyword, MysqlQueryBuilder, PostgresQueryBuilder, SelectStatement, SimpleExpr,
    SqliteQueryBuilder, Value,
};
use serde::{Deserialize, Serialize};

/// Table or table-alias identifier for sea-query
#[derive(Debug, Clone)]
pub struct TableName(pub String);

impl Iden for TableName {
    fn unquoted(&self, s: &mut dyn std::fmt::Write) {
        let _ = s.write_str(&self.0);
    }
}

/// Column identifier wrapper
#[derive(Debug, Clone)]
pub struct ColumnName(pub String);

impl Iden for ColumnName {
    fn unquoted(&self, s: &mut dyn std::fmt::Write) {
        let _ = s.write_str(&self.0);
    }
}

/// SQL flavour used when rendering statements to text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[default]
    Postgres,
    Mysql,
    Sqlite,
}

impl Dialect {
    pub fn name(self) -> &'static str {
        match self {
            Dialect::Postgres => "postgres",
            Dialect::Mysql => "mysql",
            Dialect::Sqlite => "sqlite",
        }
    }

    /// MySQL has no FULL OUTER JOIN.
    pub fn supports_join(self, kind: JoinKind) -> bool {
        !(self == Dialect::Mysql && matches!(kind, JoinKind::Full | JoinKind::FullOuter))
    }

    /// Renders a statement built by [`select_from`] and [`to_condition`] for this dialect.
    pub fn render(self, select: &SelectStatement) -> String {
        match self {
            Dialect::Postgres => select.to_string(PostgresQueryBuilder),
            Dialect::Mysql => select.to_string(MysqlQueryBuilder),
            Dialect::Sqlite => select.to_string(SqliteQueryBuilder),
        }
    }
}

/// Right-hand side after every embedded field has been resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum BoundOperand {
    Column(ColumnRef),
    Value(Literal),
    Function(BoundFunction),
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoundFunction {
    pub function: FuncName,
    pub args: Vec<BoundOperand>,
}

/// A condition whose columns point at concrete table instances.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundCondition {
    pub left: ColumnRef,
    pub op: CompareOp,
    pub right: BoundOperand,
}

/// Joins plus the bound filter tree of one compiled domain.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledDomain {
    pub root: TableRef,
    pub joins: Vec<JoinSpec>,
    pub filter: BoolExpr<BoundCondition>,
}

impl CompiledDomain {
    pub fn condition(&self, dialect: Dialect) -> SqlCondition {
        to_condition(&self.filter, dialect)
    }

    /// `SELECT * FROM root AS t0 <joins> WHERE <filter>`
    pub fn select(&self, dialect: Dialect) -> Result<SelectStatement> {
        let mut select = SelectStatement::new();
        select_from(&mut select, &self.root, &self.joins, dialect)?;
        select.column(Asterisk);
        select.cond_where(self.condition(dialect));
        Ok(select)
    }

    pub fn to_sql(&self, dialect: Dialect) -> Result<String> {
        Ok(dialect.render(&self.select(dialect)?))
    }
}

/// Compiler bound to one root table and one metadata source
pub struct SqlCompiler<'a> {
    table: String,
    foreign_keys: &'a dyn ForeignKeyProvider,
    dialect: Dialect,
}

impl<'a> SqlCompiler<'a> {
    pub fn new(table: impl Into<String>, foreign_keys: &'a dyn ForeignKeyProvider) -> Self {
        Self {
            table: table.into(),
            foreign_keys,
            dialect: Dialect::default(),
        }
    }

    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// A fresh join session rooted at this compiler's table.
    pub fn session(&self) -> JoinSession<'a> {
        JoinSession::new(self.table.clone(), self.foreign_keys)
    }

    /// Compile a domain in its own session
    pub fn compile(&self, domain: &[DomainItem]) -> Result<CompiledDomain> {
        let mut session = self.session();
        let filter = compile_in(&mut session, domain)?;
        let root = session.root().clone();
        let joins = session.into_joins();
        tracing::debug!(
            table = %self.table,
            joins = joins.len(),
            conditions = filter.leaves().len(),
            "compiled domain"
        );
        Ok(CompiledDomain { root, joins, filter })
    }

    /// `SELECT * FROM table AS t0 <joins> WHERE <domain>` for the configured dialect.
    pub fn select(&self, domain: &[DomainItem]) -> Result<SelectStatement> {
        self.compile(domain)?.select(self.dialect)
    }

    pub fn to_sql(&self, domain: &[DomainItem]) -> Result<String> {
        self.compile(domain)?.to_sql(self.dialect)
    }
}

/// Compile a domain inside a caller-owned session.
///
/// Joins accumulate in `session`; nothing is rolled back on error, so a session
/// that saw a failed compile should be discarded.
pub fn compile_in(session: &mut JoinSession<'_>, domain: &[DomainItem]) -> Result<BoolExpr<BoundCondition>> {
    Parser::new(domain).parse_with(|condition| bind_condition(session, condition))
}

/// Resolve the left field and every field embedded in the right-hand side.
pub fn bind_condition(session: &mut JoinSession<'_>, condition: &Condition) -> Result<BoundCondition> {
    let op = CompareOp::from_token(&condition.operator)?;
    let left = session.resolve_field(&condition.field)?.column;
    let right = bind_operand(session, &condition.value)?;
    Ok(BoundCondition { left, op, right })
}

fn bind_operand(session: &mut JoinSession<'_>, operand: &Operand) -> Result<BoundOperand> {
    Ok(match operand {
        Operand::Field(field) => BoundOperand::Column(session.resolve_field(&field.field)?.column),
        Operand::Function(call) => BoundOperand::Function(bind_function(session, call)?),
        Operand::Value(literal) => BoundOperand::Value(literal.clone()),
    })
}

/// Every argument is a field unless wrapped as a literal.
pub fn bind_function(session: &mut JoinSession<'_>, call: &FunctionCall) -> Result<BoundFunction> {
    check_arity(call)?;
    let args = call
        .args
        .iter()
        .map(|arg| match arg {
            FuncArg::Field(path) => Ok(BoundOperand::Column(session.resolve_field(path)?.column)),
            FuncArg::Literal(wrapped) => Ok(BoundOperand::Value(wrapped.literal.clone())),
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(BoundFunction {
        function: call.function,
        args,
    })
}

fn check_arity(call: &FunctionCall) -> Result<()> {
    let n = call.args.len();
    let ok = match call.function {
        FuncName::Count => n <= 1,
        f if f.is_aggregate() => n == 1,
        _ => n >= 1,
    };
    if ok {
        Ok(())
    } else {
        Err(Error::invalid_expression(format!(
            "{}() does not take {n} arguments",
            call.function.name()
        )))
    }
}

/// Adds `FROM root AS alias` and every join in session order.
///
/// Fails before touching `select` when `dialect` cannot express one of the joins.
pub fn select_from(
    select: &mut SelectStatement,
    root: &TableRef,
    joins: &[JoinSpec],
    dialect: Dialect,
) -> Result<()> {
    if let Some(join) = joins.iter().find(|join| !dialect.supports_join(join.kind)) {
        return Err(Error::UnsupportedJoin {
            kind: join.kind,
            dialect,
        });
    }

    select.from_as(TableName(root.name.clone()), TableName(root.alias.clone()));
    for join in joins {
        select.join_as(
            join.kind.join_type(),
            TableName(join.right.name.clone()),
            TableName(join.right.alias.clone()),
            Expr::col((
                TableName(join.left.alias.clone()),
                ColumnName(join.left_column.clone()),
            ))
            .equals((
                TableName(join.right.alias.clone()),
                ColumnName(join.right_column.clone()),
            )),
        );
    }
    Ok(())
}

/// n-ary AND / OR map onto sea-query's `Condition::all` / `Condition::any`.
pub fn to_condition(expr: &BoolExpr<BoundCondition>, dialect: Dialect) -> SqlCondition {
    match expr {
        BoolExpr::Leaf(condition) => SqlCondition::all().add(condition.to_expr(dialect)),
        BoolExpr::And(children) => children
            .iter()
            .fold(SqlCondition::all(), |acc, child| acc.add(to_condition(child, dialect))),
        BoolExpr::Or(children) => children
            .iter()
            .fold(SqlCondition::any(), |acc, child| acc.add(to_condition(child, dialect))),
        BoolExpr::Not(inner) => to_condition(inner, dialect).not(),
    }
}

pub fn column_expr(column: &ColumnRef) -> SimpleExpr {
    Expr::col((
        TableName(column.table.alias.clone()),
        ColumnName(column.column.clone()),
    ))
    .into()
}

/// Convert a domain literal to a sea-query expression
pub fn literal_expr(literal: &Literal) -> SimpleExpr {
    match literal {
        Literal::Null => SimpleExpr::Keyword(Keyword::Null),
        Literal::Bool(b) => SimpleExpr::Value(Value::Bool(Some(*b))),
        Literal::Int(n) => SimpleExpr::Value(Value::BigInt(Some(*n))),
        Literal::Float(f) => SimpleExpr::Value(Value::Double(Some(*f))),
        Literal::Text(s) => SimpleExpr::Value(Value::String(Some(Box::new(s.clone())))),
        Literal::List(items) => SimpleExpr::Tuple(items.iter().map(literal_expr).collect()),
    }
}

impl BoundOperand {
    pub fn to_expr(&self) -> SimpleExpr {
        match self {
            BoundOperand::Column(column) => column_expr(column),
            BoundOperand::Value(literal) => literal_expr(literal),
            BoundOperand::Function(call) => call.to_expr(),
        }
    }
}

impl BoundFunction {
    pub fn to_expr(&self) -> SimpleExpr {
        let mut args: Vec<SimpleExpr> = self.args.iter().map(BoundOperand::to_expr).collect();
        let call = match self.function {
            FuncName::Coalesce => Func::coalesce(args),
            FuncName::Greatest => Func::greatest(args),
            FuncName::Least => Func::least(args),
            FuncName::Concat => Func::cust(Alias::new("CONCAT")).args(args),
            aggregate => {
                let arg = if args.is_empty() {
                    Expr::col(Asterisk).into()
                } else {
                    args.swap_remove(0)
                };
                match aggregate {
                    FuncName::Max => Func::max(arg),
                    FuncName::Min => Func::min(arg),
                    FuncName::Sum => Func::sum(arg),
                    FuncName::Avg => Func::avg(arg),
                    _ => Func::count(arg),
                }
            }
        };
        SimpleExpr::FunctionCall(call)
    }
}

impl BoundCondition {
    /// `ilike` is native only on Postgres; elsewhere both sides are lowered
    /// and compared with `LIKE`.
    pub fn to_expr(&self, dialect: Dialect) -> SimpleExpr {
        let left = Expr::expr(column_expr(&self.left));
        match (self.op, &self.right) {
            (CompareOp::Eq, BoundOperand::Value(Literal::Null)) => left.is_null(),
            (CompareOp::NotEq, BoundOperand::Value(Literal::Null)) => left.is_not_null(),
            (CompareOp::In, BoundOperand::Value(Literal::List(items))) => {
                left.is_in(items.iter().map(literal_expr))
            }
            (CompareOp::NotIn, BoundOperand::Value(Literal::List(items))) => {
                left.is_not_in(items.iter().map(literal_expr))
            }
            (CompareOp::In, right) => left.is_in([right.to_expr()]),
            (CompareOp::NotIn, right) => left.is_not_in([right.to_expr()]),
            (op @ (CompareOp::ILike | CompareOp::NotILike), right) if dialect != Dialect::Postgres => {
                let like = if op == CompareOp::ILike {
                    BinOper::Like
                } else {
                    BinOper::NotLike
                };
                SimpleExpr::Binary(
                    Box::new(SimpleExpr::FunctionCall(Func::lower(column_expr(&self.left)))),
                    like,
                    Box::new(SimpleExpr::FunctionCall(Func::lower(right.to_expr()))),
                )
            }
            (op, right) => SimpleExpr::Binary(
                Box::new(column_expr(&self.left)),
                bin_oper(op),
                Box::new(right.to_expr()),
            ),
        }
    }
}

fn bin_oper(op: CompareOp) -> BinOper {
    match op {
        CompareOp::Eq => BinOper::Equal,
        CompareOp::NotEq => BinOper::NotEqual,
        CompareOp::Lt => BinOper::SmallerThan,
        CompareOp::Lte => BinOper::SmallerThanOrEqual,
        CompareOp::Gt => BinOper::GreaterThan,
        CompareOp::Gte => BinOper::GreaterThanOrEqual,
        CompareOp::Like => BinOper::Like,
        CompareOp::NotLike => BinOper::NotLike,
        CompareOp::ILike => BinOper::PgOperator(PgBinOper::ILike),
        CompareOp::NotILike => BinOper::PgOperator(PgBinOper::NotILike),
        CompareOp::In => BinOper::In,
        CompareOp::NotIn => BinOper::NotIn,
    }
}
