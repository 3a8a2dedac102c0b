//! Join resolution for dotted field paths.
//!
//! A [`JoinSession`] walks `a.b.c` hop by hop from the root table, asking a
//! [`ForeignKeyProvider`] how each hop joins, and keeps every join it creates
//! under the cumulative path (`a`, `a.b`). A session belongs to one query being
//! built: its aliases and join order are meaningless for any other query.

use crate::error::{Error, Result};
use crate::operators::{parse_hop, JoinKind};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Alias of the root table in every session.
pub const ROOT_ALIAS: &str = "t0";

/// Physical description of one relation, as reported by the metadata source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub foreign_table_name: String,
    /// Column on the source table.
    pub column_name: String,
    /// Key column on `foreign_table_name`.
    pub foreign_column_name: String,
}

impl ForeignKey {
    pub fn new(
        foreign_table_name: impl Into<String>,
        column_name: impl Into<String>,
        foreign_column_name: impl Into<String>,
    ) -> Self {
        Self {
            foreign_table_name: foreign_table_name.into(),
            column_name: column_name.into(),
            foreign_column_name: foreign_column_name.into(),
        }
    }
}

/// Source of foreign-key metadata: `(table, field) -> relation`.
pub trait ForeignKeyProvider {
    fn foreign_key(&self, table: &str, field: &str) -> Option<ForeignKey>;
}

impl<F> ForeignKeyProvider for F
where
    F: Fn(&str, &str) -> Option<ForeignKey>,
{
    fn foreign_key(&self, table: &str, field: &str) -> Option<ForeignKey> {
        self(table, field)
    }
}

/// Provider for tables without relations; every dotted path fails to resolve.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRelations;

impl ForeignKeyProvider for NoRelations {
    fn foreign_key(&self, _table: &str, _field: &str) -> Option<ForeignKey> {
        None
    }
}

/// One instance of a table inside a query. Self joins give the same `name`
/// several aliases.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableRef {
    pub name: String,
    pub alias: String,
}

impl TableRef {
    pub fn new(name: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alias: alias.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnRef {
    pub table: TableRef,
    pub column: String,
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.table.alias, self.column)
    }
}

/// `left JOIN right ON left.left_column = right.right_column`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinSpec {
    /// Path that first produced this join.
    pub key: String,
    pub left: TableRef,
    pub right: TableRef,
    pub kind: JoinKind,
    pub left_column: String,
    pub right_column: String,
}

impl JoinSpec {
    fn same_relation(&self, left: &TableRef, table: &str, join: &CustomJoin) -> bool {
        self.left == *left
            && self.right.name == table
            && self.kind == join.kind
            && self.left_column == join.left_column
            && self.right_column == join.right_column
    }
}

/// A join supplied by the caller instead of the metadata provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomJoin {
    pub table: String,
    pub kind: JoinKind,
    /// Column on the table the path has reached so far.
    pub left_column: String,
    /// Column on `table`.
    pub right_column: String,
}

impl CustomJoin {
    pub fn new(
        table: impl Into<String>,
        kind: JoinKind,
        left_column: impl Into<String>,
        right_column: impl Into<String>,
    ) -> Self {
        Self {
            table: table.into(),
            kind,
            left_column: left_column.into(),
            right_column: right_column.into(),
        }
    }
}

/// Outcome of resolving a dotted field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedField {
    pub column: ColumnRef,
    /// Keys of the joins walked through, root first.
    pub joins: Vec<String>,
}

pub struct JoinSession<'a> {
    root: TableRef,
    foreign_keys: &'a dyn ForeignKeyProvider,
    seeded: IndexMap<String, CustomJoin>,
    cache: IndexMap<String, usize>,
    joins: Vec<JoinSpec>,
}

impl<'a> JoinSession<'a> {
    pub fn new(root_table: impl Into<String>, foreign_keys: &'a dyn ForeignKeyProvider) -> Self {
        Self {
            root: TableRef::new(root_table, ROOT_ALIAS),
            foreign_keys,
            seeded: IndexMap::new(),
            cache: IndexMap::new(),
            joins: Vec::new(),
        }
    }

    pub fn root(&self) -> &TableRef {
        &self.root
    }

    /// Joins materialized so far, in the order they must be emitted.
    pub fn joins(&self) -> &[JoinSpec] {
        &self.joins
    }

    pub fn into_joins(self) -> Vec<JoinSpec> {
        self.joins
    }

    /// Cached path keys, in insertion order. Several keys may share a join.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.cache.keys().map(String::as_str)
    }

    pub fn join(&self, path: &str) -> Option<&JoinSpec> {
        let key = canonical_key(path).ok()?;
        self.cache.get(&key).map(|&index| &self.joins[index])
    }

    /// Registers a join for `path` that the metadata provider cannot derive.
    ///
    /// Nothing is emitted until a field actually walks through `path`. A path
    /// this session has already resolved cannot be seeded any more.
    pub fn seed_join(&mut self, path: &str, join: CustomJoin) -> Result<()> {
        let key = canonical_key(path)?;
        if self.cache.contains_key(&key) {
            return Err(Error::invalid_expression(format!(
                "`{key}` is already joined in this session"
            )));
        }
        tracing::debug!(%key, table = %join.table, "seed custom join");
        self.seeded.insert(key, join);
        Ok(())
    }

    /// Walks `hops` from the root and returns the join reached by the last one.
    pub fn resolve_path(&mut self, hops: &[&str]) -> Result<&JoinSpec> {
        let (_, used) = self.walk(hops)?;
        match used.last() {
            Some(&index) => Ok(&self.joins[index]),
            None => Err(Error::invalid_expression("empty relation path")),
        }
    }

    /// Resolves `a.b.column` to `column` on the table instance reached via `a.b`.
    pub fn resolve_field(&mut self, field: &str) -> Result<ResolvedField> {
        let mut hops: Vec<&str> = field.split('.').collect();
        let column = hops.pop().unwrap_or_default();
        if column.is_empty() || column.contains('(') {
            return Err(Error::invalid_expression(format!(
                "`{field}` does not end in a column name"
            )));
        }

        let (table, used) = self.walk(&hops)?;
        Ok(ResolvedField {
            column: ColumnRef {
                table,
                column: column.to_string(),
            },
            joins: used.iter().map(|&i| self.joins[i].key.clone()).collect(),
        })
    }

    fn walk(&mut self, hops: &[&str]) -> Result<(TableRef, Vec<usize>)> {
        let mut current = self.root.clone();
        let mut key = String::new();
        let mut used = Vec::with_capacity(hops.len());

        for hop in hops {
            let (name, kind) = parse_hop(hop)?;
            push_segment(&mut key, name, kind);

            let cached = self.cache.get(&key).copied();
            let index = match cached {
                Some(index) => index,
                None => self.materialize(&key, &current, name, kind)?,
            };
            current = self.joins[index].right.clone();
            used.push(index);
        }

        Ok((current, used))
    }

    fn materialize(&mut self, key: &str, left: &TableRef, hop: &str, kind: JoinKind) -> Result<usize> {
        let join = match self.seeded.get(key) {
            Some(custom) => custom.clone(),
            None => {
                let fk = self.foreign_keys.foreign_key(&left.name, hop).ok_or_else(|| {
                    Error::UnresolvedRelation {
                        table: left.name.clone(),
                        field: hop.to_string(),
                    }
                })?;
                CustomJoin::new(fk.foreign_table_name, kind, fk.column_name, fk.foreign_column_name)
            }
        };

        let existing = self
            .joins
            .iter()
            .position(|j| j.same_relation(left, &join.table, &join));

        let index = match existing {
            Some(index) => {
                tracing::debug!(%key, shared_with = %self.joins[index].key, "reuse equivalent join");
                index
            }
            None => {
                let alias = format!("t{}", self.joins.len() + 1);
                tracing::debug!(%key, table = %join.table, %alias, kind = join.kind.code(), "new join");
                self.joins.push(JoinSpec {
                    key: key.to_string(),
                    left: left.clone(),
                    right: TableRef::new(join.table, alias),
                    kind: join.kind,
                    left_column: join.left_column,
                    right_column: join.right_column,
                });
                self.joins.len() - 1
            }
        };

        self.cache.insert(key.to_string(), index);
        Ok(index)
    }
}

/// INNER is implied, so `a(I).b` and `a.b` name the same joins.
fn push_segment(key: &mut String, name: &str, kind: JoinKind) {
    if !key.is_empty() {
        key.push('.');
    }
    key.push_str(name);
    if kind != JoinKind::Inner {
        key.push('(');
        key.push_str(kind.code());
        key.push(')');
    }
}

fn canonical_key(path: &str) -> Result<String> {
    let mut key = String::new();
    for hop in path.split('.') {
        let (name, kind) = parse_hop(hop)?;
        push_segment(&mut key, name, kind);
    }
    Ok(key)
}
