//! Conversion between flat domains and nested `{combinator, rules}` trees.
//!
//! The tree form is what query-builder front ends exchange as JSON:
//!
//! ```json
//! {"combinator": "or", "rules": [
//!     {"field": "state", "operator": "=", "value": "open"},
//!     {"field": "name", "operator": "contains", "value": "jo"}
//! ]}
//! ```
//!
//! Operators are translated through a small vocabulary on the way in and back.

use crate::ast::{Condition, Domain, DomainItem, Literal, Operand};
use crate::domain::operand_from_json;
use crate::error::{Error, Result};
use crate::operators::BoolOp;
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Domain operator -> tree operator. Anything not listed passes through.
const TREE_OPERATORS: &[(&str, &str)] = &[
    ("<>", "!="),
    ("=like", "like"),
    ("ilike", "contains"),
    ("=ilike", "contains"),
    ("not ilike", "!contains"),
    ("not in", "!in"),
];

/// Tree operator -> domain operator.
const DOMAIN_OPERATORS: &[(&str, &str)] = &[
    ("contains", "ilike"),
    ("!contains", "not ilike"),
    ("!in", "not in"),
];

fn translate<'a>(table: &[(&str, &'a str)], operator: &'a str) -> &'a str {
    table
        .iter()
        .find(|(from, _)| *from == operator)
        .map_or(operator, |&(_, to)| to)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Combinator {
    And,
    Or,
}

impl Combinator {
    fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "and" => Some(Combinator::And),
            "or" => Some(Combinator::Or),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rule {
    pub field: String,
    pub operator: String,
    pub value: Operand,
}

impl Rule {
    pub fn new(field: impl Into<String>, operator: impl Into<String>, value: impl Into<Operand>) -> Self {
        Self {
            field: field.into(),
            operator: operator.into(),
            value: value.into(),
        }
    }

    fn from_condition(condition: &Condition) -> Self {
        Self {
            field: condition.field.clone(),
            operator: translate(TREE_OPERATORS, &condition.operator).to_string(),
            value: condition.value.clone(),
        }
    }

    fn to_condition(&self) -> Condition {
        let operator = translate(DOMAIN_OPERATORS, &self.operator);
        let value = match (&self.value, operator) {
            (Operand::Value(Literal::Text(text)), "in" | "not in") => Operand::Value(Literal::List(
                text.split(',')
                    .map(|token| Literal::Text(token.trim().to_string()))
                    .collect(),
            )),
            (value, _) => value.clone(),
        };
        Condition {
            field: self.field.clone(),
            operator: operator.to_string(),
            value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RuleTree {
    Query {
        combinator: Combinator,
        rules: Vec<RuleTree>,
    },
    Rule(Rule),
}

impl RuleTree {
    /// Builds a query node, splicing children that share its combinator.
    pub fn query(combinator: Combinator, children: impl IntoIterator<Item = RuleTree>) -> Self {
        let mut rules = Vec::new();
        for child in children {
            match child {
                RuleTree::Query {
                    combinator: inner,
                    rules: nested,
                } if inner == combinator => rules.extend(nested),
                other => rules.push(other),
            }
        }
        RuleTree::Query { combinator, rules }
    }

    pub fn empty() -> Self {
        RuleTree::Query {
            combinator: Combinator::And,
            rules: Vec::new(),
        }
    }

    /// Collapses a query whose only child is a query, and splices
    /// same-combinator children at every level.
    pub fn optimize(self) -> Self {
        match self {
            RuleTree::Query { combinator, rules } => {
                let rules: Vec<_> = rules.into_iter().map(RuleTree::optimize).collect();
                if rules.len() == 1 && matches!(rules[0], RuleTree::Query { .. }) {
                    return rules.into_iter().next().unwrap_or_else(RuleTree::empty);
                }
                RuleTree::query(combinator, rules)
            }
            rule => rule,
        }
    }

    /// No query directly contains a query with its own combinator.
    pub fn is_flat(&self) -> bool {
        match self {
            RuleTree::Rule(_) => true,
            RuleTree::Query { combinator, rules } => rules.iter().all(|child| match child {
                RuleTree::Query { combinator: inner, .. } if inner == combinator => false,
                other => other.is_flat(),
            }),
        }
    }

    /// Decodes untyped JSON, naming the first missing or malformed field.
    pub fn from_json(value: &Value) -> Result<Self> {
        let Value::Object(map) = value else {
            return Err(Error::invalid_rule(format!("expected an object, found {value}")));
        };

        if map.contains_key("combinator") || map.contains_key("rules") {
            query_from_json(map)
        } else {
            rule_from_json(map).map(RuleTree::Rule)
        }
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| Error::invalid_rule(format!("rule tree is not valid JSON: {e}")))?;
        Self::from_json(&value)
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

fn query_from_json(map: &Map<String, Value>) -> Result<RuleTree> {
    let name = map
        .get("combinator")
        .ok_or_else(|| Error::invalid_rule("missing field `combinator`"))?;
    let combinator = name
        .as_str()
        .and_then(Combinator::from_name)
        .ok_or_else(|| Error::invalid_rule(format!("unknown combinator {name}")))?;

    let Some(Value::Array(rules)) = map.get("rules") else {
        return Err(Error::invalid_rule("missing field `rules`"));
    };

    Ok(RuleTree::Query {
        combinator,
        rules: rules.iter().map(RuleTree::from_json).collect::<Result<_>>()?,
    })
}

fn rule_from_json(map: &Map<String, Value>) -> Result<Rule> {
    let text = |key: &str| {
        map.get(key)
            .and_then(Value::as_str)
            .ok_or_else(|| Error::invalid_rule(format!("missing field `{key}`")))
    };
    let field = text("field")?;
    let operator = text("operator")?;
    let value = map
        .get("value")
        .ok_or_else(|| Error::invalid_rule("missing field `value`"))?;
    let value = operand_from_json(value).map_err(|e| Error::invalid_rule(format!("rule `{field}`: {e}")))?;

    Ok(Rule::new(field, operator, value))
}

impl<'de> Deserialize<'de> for RuleTree {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        RuleTree::from_json(&value).map_err(de::Error::custom)
    }
}

/// Domain -> rule tree.
///
/// Reads the domain right to left like the parser does. `&` and `|` build
/// two-rule queries, leftovers are joined by AND, and the result is optimized.
pub fn to_tree(domain: &[DomainItem]) -> Result<RuleTree> {
    let mut stack: Vec<RuleTree> = Vec::with_capacity(domain.len());

    for (position, item) in domain.iter().enumerate().rev() {
        match item {
            DomainItem::Condition(condition) => stack.push(RuleTree::Rule(Rule::from_condition(condition))),
            DomainItem::Operator(marker) => {
                let combinator = match BoolOp::from_marker(marker) {
                    Some(BoolOp::And) => Combinator::And,
                    Some(BoolOp::Or) => Combinator::Or,
                    Some(BoolOp::Not) => {
                        return Err(Error::invalid_expression(format!(
                            "`!` at position {position} has no rule-tree form"
                        )));
                    }
                    None => {
                        return Err(Error::invalid_expression(format!(
                            "unknown operator `{marker}` at position {position}"
                        )));
                    }
                };
                let (Some(left), Some(right)) = (stack.pop(), stack.pop()) else {
                    return Err(Error::invalid_expression(format!(
                        "operator `{marker}` at position {position} needs two operands"
                    )));
                };
                stack.push(RuleTree::query(combinator, [left, right]));
            }
        }
    }

    stack.reverse();
    let root = match stack.len() {
        1 => match stack.pop() {
            Some(RuleTree::Rule(rule)) => RuleTree::query(Combinator::And, [RuleTree::Rule(rule)]),
            Some(query) => query,
            None => RuleTree::empty(),
        },
        _ => RuleTree::query(Combinator::And, stack),
    };
    Ok(root.optimize())
}

/// Rule tree -> domain.
///
/// AND children are concatenated. An OR of `k` rules becomes `k - 1` leading
/// `|` markers followed by each child's domain.
pub fn from_tree(tree: &RuleTree) -> Domain {
    let mut domain = Vec::new();
    push_tree(tree, &mut domain);
    domain
}

fn push_tree(tree: &RuleTree, domain: &mut Domain) {
    match tree {
        RuleTree::Rule(rule) => domain.push(DomainItem::Condition(rule.to_condition())),
        RuleTree::Query { combinator, rules } => {
            if *combinator == Combinator::Or {
                domain.extend(std::iter::repeat_with(DomainItem::or).take(rules.len().saturating_sub(1)));
            }
            for rule in rules {
                push_tree(rule, domain);
            }
        }
    }
}
