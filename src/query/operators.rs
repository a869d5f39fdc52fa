//! Operator dispatch and scalar coercion.
//!
//! Every `$`-prefixed key coming from a query string must be one of the
//! [`Operator`] variants; anything else (`$where`, `$function`, `$expr`, ...)
//! is rejected before a database ever sees it.

use mongodb::bson::{Bson, DateTime, Document, oid::ObjectId};

use super::path::FieldPath;
use super::qs::QueryValue;
use crate::config::QueryConfig;
use crate::errors::QueryError;

/// Declared type of a document field, used to coerce query string values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FieldKind {
    String,
    /// Integer or floating point
    Number,
    Integer,
    Boolean,
    /// RFC 3339 text or epoch milliseconds
    Date,
    ObjectId,
    /// Document identifier: an ObjectId when the text is 24 hex digits,
    /// otherwise the string itself
    Id,
    /// Guess from the text: ObjectId, integer, float, boolean, then string
    #[default]
    Any,
}

/// Recognised query operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    Nin,
    All,
    Regex,
    Options,
    Exists,
    /// Case-insensitive substring match
    Like,
    IsNull,
    NotNull,
    Size,
}

impl Operator {
    #[must_use]
    pub fn parse(key: &str) -> Option<Self> {
        Some(match key {
            "$eq" => Self::Eq,
            "$ne" => Self::Ne,
            "$gt" => Self::Gt,
            "$gte" => Self::Gte,
            "$lt" => Self::Lt,
            "$lte" => Self::Lte,
            "$in" => Self::In,
            "$nin" => Self::Nin,
            "$all" => Self::All,
            "$regex" => Self::Regex,
            "$options" => Self::Options,
            "$exists" => Self::Exists,
            "$like" => Self::Like,
            "$isNull" => Self::IsNull,
            "$notNull" => Self::NotNull,
            "$size" => Self::Size,
            _ => return None,
        })
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "$eq",
            Self::Ne => "$ne",
            Self::Gt => "$gt",
            Self::Gte => "$gte",
            Self::Lt => "$lt",
            Self::Lte => "$lte",
            Self::In => "$in",
            Self::Nin => "$nin",
            Self::All => "$all",
            Self::Regex => "$regex",
            Self::Options => "$options",
            Self::Exists => "$exists",
            Self::Like => "$like",
            Self::IsNull => "$isNull",
            Self::NotNull => "$notNull",
            Self::Size => "$size",
        }
    }
}

/// Escape regex metacharacters so the value matches literally.
#[must_use]
pub fn escape_regex(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(
            c,
            '\\' | '^' | '$' | '.' | '|' | '?' | '*' | '+' | '(' | ')' | '[' | ']' | '{' | '}'
        ) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn parse_bool(field: &FieldPath, raw: &str) -> Result<bool, QueryError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(QueryError::invalid_value(field.to_string(), "a boolean", raw)),
    }
}

fn parse_number(raw: &str) -> Option<Bson> {
    if let Ok(int) = raw.parse::<i64>() {
        return Some(Bson::Int64(int));
    }
    raw.parse::<f64>()
        .ok()
        .filter(|float| float.is_finite())
        .map(Bson::Double)
}

/// Convert one decoded query string value to BSON according to the field kind.
///
/// The literal `null` is `Null` for every kind.
///
/// # Errors
///
/// Returns [`QueryError::InvalidValue`] when the text does not fit the kind.
pub fn coerce_scalar(kind: FieldKind, raw: &str, field: &FieldPath) -> Result<Bson, QueryError> {
    if raw == "null" {
        return Ok(Bson::Null);
    }
    let name = || field.to_string();

    match kind {
        FieldKind::String => Ok(Bson::String(raw.to_string())),
        FieldKind::Number => {
            parse_number(raw.trim()).ok_or_else(|| QueryError::invalid_value(name(), "a number", raw))
        }
        FieldKind::Integer => raw
            .trim()
            .parse::<i64>()
            .map(Bson::Int64)
            .map_err(|_| QueryError::invalid_value(name(), "an integer", raw)),
        FieldKind::Boolean => parse_bool(field, raw).map(Bson::Boolean),
        FieldKind::Date => DateTime::parse_rfc3339_str(raw.trim())
            .ok()
            .or_else(|| raw.trim().parse::<i64>().ok().map(DateTime::from_millis))
            .map(Bson::DateTime)
            .ok_or_else(|| QueryError::invalid_value(name(), "an RFC 3339 date", raw)),
        FieldKind::ObjectId => ObjectId::parse_str(raw.trim())
            .map(Bson::ObjectId)
            .map_err(|_| QueryError::invalid_value(name(), "an ObjectId", raw)),
        FieldKind::Id => Ok(ObjectId::parse_str(raw)
            .map_or_else(|_| Bson::String(raw.to_string()), Bson::ObjectId)),
        FieldKind::Any => Ok(ObjectId::parse_str(raw)
            .map(Bson::ObjectId)
            .ok()
            .or_else(|| parse_number(raw))
            .unwrap_or_else(|| match raw {
                "true" => Bson::Boolean(true),
                "false" => Bson::Boolean(false),
                _ => Bson::String(raw.to_string()),
            })),
    }
}

fn expect_scalar<'a>(
    field: &FieldPath,
    operator: Operator,
    value: &'a QueryValue,
) -> Result<&'a str, QueryError> {
    value.as_scalar().ok_or_else(|| {
        QueryError::invalid_value(
            field.to_string(),
            "a single value",
            &format!("{} with nested value", operator.as_str()),
        )
    })
}

/// A flat list, or a comma separated scalar.
fn list_values<'a>(field: &FieldPath, value: &'a QueryValue) -> Result<Vec<&'a str>, QueryError> {
    match value {
        QueryValue::Scalar(raw) => Ok(raw
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .collect()),
        _ => value.scalars().ok_or_else(|| {
            QueryError::invalid_value(field.to_string(), "a list of values", "nested object")
        }),
    }
}

/// Insert one operator, refusing to overwrite an earlier one on the same field.
fn put(
    document: &mut Document,
    field: &FieldPath,
    key: &str,
    value: impl Into<Bson>,
) -> Result<(), QueryError> {
    if document.contains_key(key) {
        return Err(QueryError::invalid_parameter(
            field.to_string(),
            format!("operators on this field both set '{key}'"),
        ));
    }
    document.insert(key, value);
    Ok(())
}

/// Translate an operator map (`{"$gte": "18", "$lt": "65"}`) into the
/// corresponding database operator document.
///
/// # Errors
///
/// Unknown operators, malformed values and over-long patterns are rejected,
/// as are two operators writing the same key (`$eq` and `$isNull=true`,
/// `$regex` and `$like`) and `$options` without `$regex`.
pub fn build_operator_document(
    field: &FieldPath,
    kind: FieldKind,
    operators: &[(String, QueryValue)],
    config: &QueryConfig,
) -> Result<Document, QueryError> {
    let mut document = Document::new();

    for (key, value) in operators {
        let operator = Operator::parse(key).ok_or_else(|| QueryError::UnknownOperator {
            field: field.to_string(),
            operator: key.clone(),
        })?;

        match operator {
            Operator::Eq | Operator::Ne | Operator::Gt | Operator::Gte | Operator::Lt | Operator::Lte => {
                let raw = expect_scalar(field, operator, value)?;
                put(&mut document, field, operator.as_str(), coerce_scalar(kind, raw, field)?)?;
            }
            Operator::In | Operator::Nin | Operator::All => {
                let values = list_values(field, value)?
                    .into_iter()
                    .map(|raw| coerce_scalar(kind, raw, field))
                    .collect::<Result<Vec<Bson>, _>>()?;
                put(&mut document, field, operator.as_str(), values)?;
            }
            Operator::Regex => {
                let raw = expect_scalar(field, operator, value)?;
                if raw.chars().count() > config.max_regex_length {
                    return Err(QueryError::ValueTooLong {
                        field: field.to_string(),
                        max: config.max_regex_length,
                    });
                }
                put(&mut document, field, "$regex", raw)?;
            }
            Operator::Options => {
                let raw = expect_scalar(field, operator, value)?;
                if !raw.chars().all(|c| matches!(c, 'i' | 'm' | 's' | 'x')) {
                    return Err(QueryError::invalid_value(
                        field.to_string(),
                        "regex options from 'imsx'",
                        raw,
                    ));
                }
                put(&mut document, field, "$options", raw)?;
            }
            Operator::Exists => {
                let raw = expect_scalar(field, operator, value)?;
                put(&mut document, field, "$exists", parse_bool(field, raw)?)?;
            }
            Operator::Like => {
                let raw = expect_scalar(field, operator, value)?;
                put(&mut document, field, "$regex", escape_regex(raw))?;
                put(&mut document, field, "$options", "i")?;
            }
            Operator::IsNull | Operator::NotNull => {
                let raw = expect_scalar(field, operator, value)?;
                let wants_null = parse_bool(field, raw)? == (operator == Operator::IsNull);
                let key = if wants_null { "$eq" } else { "$ne" };
                put(&mut document, field, key, Bson::Null)?;
            }
            Operator::Size => {
                let raw = expect_scalar(field, operator, value)?;
                let size = raw.trim().parse::<u32>().map_err(|_| {
                    QueryError::invalid_value(field.to_string(), "a non-negative integer", raw)
                })?;
                put(&mut document, field, "$size", i64::from(size))?;
            }
        }
    }

    if document.contains_key("$options") && !document.contains_key("$regex") {
        return Err(QueryError::invalid_parameter(
            field.to_string(),
            "'$options' requires '$regex'",
        ));
    }
    Ok(document)
}

/// Condition for one field: a scalar is equality, a list is `$in` and a map
/// is a set of operators.
///
/// # Errors
///
/// Nested lists, unknown operators and values that do not fit `kind`.
pub fn build_field_condition(
    field: &FieldPath,
    kind: FieldKind,
    value: &QueryValue,
    config: &QueryConfig,
) -> Result<Bson, QueryError> {
    match value {
        QueryValue::Scalar(raw) => coerce_scalar(kind, raw, field),
        QueryValue::List(_) => {
            let values = value
                .scalars()
                .ok_or_else(|| {
                    QueryError::invalid_value(field.to_string(), "a list of values", "nested list")
                })?
                .into_iter()
                .map(|raw| coerce_scalar(kind, raw, field))
                .collect::<Result<Vec<Bson>, _>>()?;
            let mut document = Document::new();
            document.insert("$in", values);
            Ok(Bson::Document(document))
        }
        QueryValue::Map(operators) => {
            build_operator_document(field, kind, operators, config).map(Bson::Document)
        }
    }
}
