//! `OOQuery`: a select statement over one root table whose fields, ordering and
//! filter all resolve relations through one shared join session.
//!
//! ```text
//! let mut q = OOQuery::new("sale_order", &fks);
//! q.select(["name", "partner_id.name"], SelectOptions::default())?;
//! let stmt = q.filter(&domain)?;
//! ```
//!
//! Each `select` starts a new session. `filter` compiles against the session of
//! the last `select`, so a relation used by both a column and a condition is
//! joined once.

use crate::ast::{DomainItem, FuncArg, FunctionCall};
use crate::error::{Error, Result};
use crate::joins::{ForeignKeyProvider, JoinSession};
use crate::sql_compiler::{self, bind_function, column_expr, Dialect, TableName};
use indexmap::IndexMap;
use sea_query::{
    Alias, Asterisk, ConditionalStatement, NullOrdering, Order, OrderedStatement,
    SelectStatement, SimpleExpr,
};

/// One selected output column.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectField {
    Column(String),
    Function(FunctionCall),
}

impl From<&str> for SelectField {
    fn from(path: &str) -> Self {
        SelectField::Column(path.to_string())
    }
}

impl From<String> for SelectField {
    fn from(path: String) -> Self {
        SelectField::Column(path)
    }
}

impl From<FunctionCall> for SelectField {
    fn from(call: FunctionCall) -> Self {
        SelectField::Function(call)
    }
}

impl SelectField {
    /// `a.b.c` -> `a_b_c`; functions -> `<name>_<first field>`
    pub fn default_alias(&self) -> String {
        match self {
            SelectField::Column(path) => path.replace('.', "_"),
            SelectField::Function(call) => match call.fields().next() {
                Some(first) => format!("{}_{}", call.function.name(), first.replace('.', "_")),
                None => call.function.name().to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SelectOptions {
    /// `path[.asc|.desc][.nulls_first|.nulls_last]`
    pub order_by: Vec<String>,
    pub group_by: Vec<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    /// Default alias -> alias to emit instead.
    pub aliases: IndexMap<String, String>,
}

#[derive(Debug, Clone, PartialEq)]
struct OrderItem {
    path: String,
    order: Order,
    nulls: Option<NullOrdering>,
}

fn parse_order(item: &str) -> Result<OrderItem> {
    let mut parts: Vec<&str> = item.split('.').collect();

    let nulls = match parts.last() {
        Some(&"nulls_first") => Some(NullOrdering::First),
        Some(&"nulls_last") => Some(NullOrdering::Last),
        _ => None,
    };
    if nulls.is_some() {
        parts.pop();
    }

    let order = match parts.last() {
        Some(&"desc") => Order::Desc,
        _ => Order::Asc,
    };
    if matches!(parts.last(), Some(&"asc") | Some(&"desc")) {
        parts.pop();
    }

    if parts.is_empty() || parts.iter().any(|p| p.is_empty()) {
        return Err(Error::invalid_expression(format!("cannot order by `{item}`")));
    }

    Ok(OrderItem {
        path: parts.join("."),
        order,
        nulls,
    })
}

pub struct OOQuery<'a> {
    table: String,
    foreign_keys: &'a dyn ForeignKeyProvider,
    session: JoinSession<'a>,
    columns: Vec<(SimpleExpr, String)>,
    order_by: Vec<(SimpleExpr, OrderItem)>,
    group_by: Vec<SimpleExpr>,
    limit: Option<u64>,
    offset: Option<u64>,
    dialect: Dialect,
}

impl<'a> OOQuery<'a> {
    pub fn new(table: impl Into<String>, foreign_keys: &'a dyn ForeignKeyProvider) -> Self {
        let table = table.into();
        Self {
            session: JoinSession::new(table.clone(), foreign_keys),
            table,
            foreign_keys,
            columns: Vec::new(),
            order_by: Vec::new(),
            group_by: Vec::new(),
            limit: None,
            offset: None,
            dialect: Dialect::default(),
        }
    }

    /// Dialect used by [`OOQuery::filter`] for dialect-specific operators and joins.
    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    pub fn session(&self) -> &JoinSession<'a> {
        &self.session
    }

    /// Starts a new session and resolves every selected path through it.
    ///
    /// An empty field list selects `t0.*`.
    pub fn select<F>(
        &mut self,
        fields: impl IntoIterator<Item = F>,
        options: SelectOptions,
    ) -> Result<&mut Self>
    where
        F: Into<SelectField>,
    {
        self.session = JoinSession::new(self.table.clone(), self.foreign_keys);

        let mut columns = Vec::new();
        for field in fields {
            let field = field.into();
            let default = field.default_alias();
            let alias = options.aliases.get(&default).cloned().unwrap_or(default);
            let expr = match &field {
                SelectField::Column(path) => column_expr(&self.session.resolve_field(path)?.column),
                SelectField::Function(call) => bind_function(&mut self.session, call)?.to_expr(),
            };
            columns.push((expr, alias));
        }

        let mut order_by = Vec::new();
        for item in &options.order_by {
            let item = parse_order(item)?;
            let expr = column_expr(&self.session.resolve_field(&item.path)?.column);
            order_by.push((expr, item));
        }

        let mut group_by = Vec::new();
        for path in &options.group_by {
            group_by.push(column_expr(&self.session.resolve_field(path)?.column));
        }

        tracing::debug!(
            table = %self.table,
            columns = columns.len(),
            joins = self.session.joins().len(),
            "select"
        );

        self.columns = columns;
        self.order_by = order_by;
        self.group_by = group_by;
        self.limit = options.limit;
        self.offset = options.offset;
        Ok(self)
    }

    /// Compiles `domain` in the current session and builds the statement.
    pub fn filter(&mut self, domain: &[DomainItem]) -> Result<SelectStatement> {
        self.build(domain, self.dialect)
    }

    pub fn to_sql(&mut self, domain: &[DomainItem], dialect: Dialect) -> Result<String> {
        Ok(dialect.render(&self.build(domain, dialect)?))
    }

    fn build(&mut self, domain: &[DomainItem], dialect: Dialect) -> Result<SelectStatement> {
        let filter = sql_compiler::compile_in(&mut self.session, domain)?;

        let mut select = SelectStatement::new();
        sql_compiler::select_from(&mut select, self.session.root(), self.session.joins(), dialect)?;

        if self.columns.is_empty() {
            select.column((TableName(self.session.root().alias.clone()), Asterisk));
        }
        for (expr, alias) in &self.columns {
            select.expr_as(expr.clone(), Alias::new(alias));
        }

        select.cond_where(sql_compiler::to_condition(&filter, dialect));

        if !self.group_by.is_empty() {
            select.add_group_by(self.group_by.iter().cloned());
        }
        for (expr, item) in &self.order_by {
            match &item.nulls {
                Some(nulls) => {
                    select.order_by_expr_with_nulls(expr.clone(), item.order.clone(), nulls.clone())
                }
                None => select.order_by_expr(expr.clone(), item.order.clone()),
            };
        }
        if let Some(limit) = self.limit {
            select.limit(limit);
        }
        if let Some(offset) = self.offset {
            select.offset(offset);
        }

        Ok(select)
    }
}

/// `count(path)` shorthand for select lists.
pub fn count(path: &str) -> SelectField {
    SelectField::Function(FunctionCall::new(
        crate::ast::FuncName::Count,
        vec![FuncArg::field(path)],
    ))
}
