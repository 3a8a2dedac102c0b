//! JSON form of domains.
//!
//! A domain is a JSON array whose elements are either marker strings (`"|"`,
//! `"&"`, `"!"`) or 3-element condition arrays `[field, operator, value]`.
//! Right-hand values decode by shape:
//!
//! - `{"field": "a.b"}` is a column reference
//! - `{"function": "coalesce", "args": ["a", {"literal": 0}]}` is a function call
//! - anything else is a literal (a bare string is never a column)

use crate::ast::{
    Condition, Domain, DomainItem, FieldRef, FuncArg, FuncName, FunctionCall, Literal, Operand,
};
use crate::error::{Error, Result};
use serde::de::{self, Deserializer};
use serde::ser::{SerializeTuple, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Decodes a domain from JSON text.
pub fn from_json_str(text: &str) -> Result<Domain> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| Error::invalid_expression(format!("domain is not valid JSON: {e}")))?;
    from_json(&value)
}

pub fn from_json(value: &Value) -> Result<Domain> {
    let Value::Array(items) = value else {
        return Err(Error::invalid_expression("domain must be a JSON array"));
    };
    items.iter().map(item_from_json).collect()
}

pub fn to_json(domain: &[DomainItem]) -> Value {
    Value::Array(domain.iter().map(item_to_json).collect())
}

pub fn item_from_json(value: &Value) -> Result<DomainItem> {
    match value {
        Value::String(marker) => Ok(DomainItem::Operator(marker.clone())),
        Value::Array(parts) => condition_from_json(parts).map(DomainItem::Condition),
        other => Err(Error::invalid_expression(format!(
            "expected a condition or an operator, found {other}"
        ))),
    }
}

fn condition_from_json(parts: &[Value]) -> Result<Condition> {
    let [field, operator, value] = parts else {
        return Err(Error::invalid_expression(format!(
            "a condition has 3 elements, found {}",
            parts.len()
        )));
    };

    let field = field
        .as_str()
        .ok_or_else(|| Error::invalid_expression(format!("condition field must be a string, found {field}")))?;
    let operator = operator.as_str().ok_or_else(|| {
        Error::invalid_expression(format!("condition operator must be a string, found {operator}"))
    })?;

    Ok(Condition {
        field: field.to_string(),
        operator: operator.to_string(),
        value: operand_from_json(value)?,
    })
}

pub fn operand_from_json(value: &Value) -> Result<Operand> {
    match value {
        Value::Object(map) if map.contains_key("field") => field_ref_from_json(map).map(Operand::Field),
        Value::Object(map) if map.contains_key("function") => {
            function_from_json(map).map(Operand::Function)
        }
        other => literal_from_json(other).map(Operand::Value),
    }
}

fn field_ref_from_json(map: &Map<String, Value>) -> Result<FieldRef> {
    match (map.len(), map.get("field")) {
        (1, Some(Value::String(field))) => Ok(FieldRef::new(field.clone())),
        _ => Err(Error::invalid_expression(format!(
            "a field reference is {{\"field\": \"name\"}}, found {}",
            Value::Object(map.clone())
        ))),
    }
}

fn function_from_json(map: &Map<String, Value>) -> Result<FunctionCall> {
    let name = map
        .get("function")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::invalid_expression("function name must be a string"))?;
    let function = FuncName::from_name(name)
        .ok_or_else(|| Error::invalid_expression(format!("unknown function `{name}`")))?;

    let args = match map.get("args") {
        None => Vec::new(),
        Some(Value::Array(args)) => args
            .iter()
            .map(func_arg_from_json)
            .collect::<Result<Vec<_>>>()?,
        Some(other) => {
            return Err(Error::invalid_expression(format!(
                "function args must be an array, found {other}"
            )));
        }
    };

    Ok(FunctionCall::new(function, args))
}

fn func_arg_from_json(value: &Value) -> Result<FuncArg> {
    match value {
        Value::String(path) => Ok(FuncArg::Field(path.clone())),
        Value::Object(map) if map.len() == 1 && map.contains_key("literal") => {
            Ok(FuncArg::literal(literal_from_json(&map["literal"])?))
        }
        other => Err(Error::invalid_expression(format!(
            "function arguments are field names or {{\"literal\": value}}, found {other}"
        ))),
    }
}

pub fn literal_from_json(value: &Value) -> Result<Literal> {
    Ok(match value {
        Value::Null => Literal::Null,
        Value::Bool(b) => Literal::Bool(*b),
        Value::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => Literal::Int(i),
            // integers past i64 would only survive as a lossy float
            (None, Some(f)) if !n.is_u64() => Literal::Float(f),
            _ => {
                return Err(Error::invalid_expression(format!(
                    "integer {n} does not fit in 64 signed bits"
                )))
            }
        },
        Value::String(s) => Literal::Text(s.clone()),
        Value::Array(items) => Literal::List(
            items
                .iter()
                .map(literal_from_json)
                .collect::<Result<Vec<_>>>()?,
        ),
        Value::Object(_) => {
            return Err(Error::invalid_expression(format!(
                "objects are not literal values: {value}"
            )));
        }
    })
}

fn item_to_json(item: &DomainItem) -> Value {
    serde_json::to_value(item).unwrap_or(Value::Null)
}

impl Serialize for Condition {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut tuple = serializer.serialize_tuple(3)?;
        tuple.serialize_element(&self.field)?;
        tuple.serialize_element(&self.operator)?;
        tuple.serialize_element(&self.value)?;
        tuple.end()
    }
}

impl Serialize for DomainItem {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            DomainItem::Operator(marker) => serializer.serialize_str(marker),
            DomainItem::Condition(condition) => condition.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for DomainItem {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        item_from_json(&value).map_err(de::Error::custom)
    }
}

impl<'de> Deserialize<'de> for Operand {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        operand_from_json(&value).map_err(de::Error::custom)
    }
}
