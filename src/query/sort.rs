use std::collections::BTreeMap;

use mongodb::bson::{Document, doc};

use super::path::FieldPath;
use super::populate::PopulateSet;
use super::qs::QueryValue;
use super::schema::QuerySchema;
use crate::errors::QueryError;

/// Sort documents for the root query and each populate level.
#[derive(Debug, Clone, PartialEq)]
pub struct SortSpec {
    pub root: Document,
    pub levels: BTreeMap<FieldPath, Document>,
}

impl Default for SortSpec {
    fn default() -> Self {
        Self {
            root: doc! { "_id": 1 },
            levels: BTreeMap::new(),
        }
    }
}

fn parse_direction(field: &str, direction: &str) -> Result<i32, QueryError> {
    match direction.trim().to_ascii_lowercase().as_str() {
        "" | "asc" | "ascending" | "1" => Ok(1),
        "desc" | "descending" | "-1" => Ok(-1),
        _ => Err(QueryError::InvalidSort {
            field: field.to_string(),
            direction: direction.to_string(),
        }),
    }
}

/// Split one `field`, `-field` or `field:desc` item.
fn parse_item(item: &str) -> Result<(&str, i32), QueryError> {
    if let Some((field, direction)) = item.split_once(':') {
        return Ok((field.trim(), parse_direction(field, direction)?));
    }
    match item.strip_prefix('-') {
        Some(field) => Ok((field.trim(), -1)),
        None => Ok((item.trim_start_matches('+').trim(), 1)),
    }
}

struct SortBuilder<'a> {
    schema: &'a QuerySchema,
    populate: &'a PopulateSet,
    spec: SortSpec,
}

impl SortBuilder<'_> {
    fn push(&mut self, path: &FieldPath, direction: i32) -> Result<(), QueryError> {
        self.schema.check_sortable(path)?;
        match self.populate.route(path) {
            Some((level, rest)) => {
                self.spec
                    .levels
                    .entry(level.clone())
                    .or_default()
                    .insert(rest.to_string(), direction);
            }
            None => {
                self.spec.root.insert(path.to_string(), direction);
            }
        }
        Ok(())
    }

    fn push_list(&mut self, raw: &str) -> Result<(), QueryError> {
        for item in raw.split(',').map(str::trim).filter(|item| !item.is_empty()) {
            let (field, direction) = parse_item(item)?;
            let path = FieldPath::parse(field, &self.schema.config)?;
            self.push(&path, direction)?;
        }
        Ok(())
    }

    fn push_map(
        &mut self,
        prefix: Option<&FieldPath>,
        entries: &[(String, QueryValue)],
    ) -> Result<(), QueryError> {
        for (key, value) in entries {
            let path = FieldPath::parse(key, &self.schema.config)?;
            let path = match prefix {
                Some(prefix) => prefix.join(&path),
                None => path,
            };
            path.check_depth(&self.schema.config)?;
            match value {
                QueryValue::Scalar(direction) => {
                    let direction = parse_direction(&path.to_string(), direction)?;
                    self.push(&path, direction)?;
                }
                QueryValue::Map(children) => self.push_map(Some(&path), children)?,
                QueryValue::List(_) => {
                    return Err(QueryError::InvalidSort {
                        field: path.to_string(),
                        direction: "a list".to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Parse the `sort` parameter.
///
/// Accepted forms: `sort=name,-age`, `sort=age:desc`, repeated `sort=` keys
/// and `sort[age]=desc` (`asc`, `desc`, `1`, `-1`). Without any sort the
/// root is ordered by `_id` so pagination stays stable.
///
/// # Errors
///
/// Unknown directions, invalid or non-sortable fields.
pub fn parse_sort(
    value: Option<&QueryValue>,
    schema: &QuerySchema,
    populate: &PopulateSet,
) -> Result<SortSpec, QueryError> {
    let mut builder = SortBuilder {
        schema,
        populate,
        spec: SortSpec {
            root: Document::new(),
            levels: BTreeMap::new(),
        },
    };

    match value {
        None => {}
        Some(QueryValue::Scalar(raw)) => builder.push_list(raw)?,
        Some(QueryValue::List(items)) => {
            for item in items {
                let raw = item.as_scalar().ok_or_else(|| {
                    QueryError::invalid_parameter("sort", "expected a list of fields")
                })?;
                builder.push_list(raw)?;
            }
        }
        Some(QueryValue::Map(entries)) => builder.push_map(None, entries)?,
    }

    let mut spec = builder.spec;
    if spec.root.is_empty() {
        spec.root = doc! { "_id": 1 };
    }
    Ok(spec)
}
