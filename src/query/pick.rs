//! Field selection (`pick=title,author.name`).
//!
//! Picking happens twice: as a database projection, so unneeded fields are
//! never loaded, and as [`pick_fields`] on the rendered JSON, which trims the
//! populated sub-documents down to exactly the requested paths.

use std::collections::BTreeMap;

use mongodb::bson::Document;
use serde_json::{Map, Value};

use super::path::FieldPath;
use super::populate::PopulateSet;
use super::qs::QueryValue;
use super::schema::QuerySchema;
use crate::errors::QueryError;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PickSpec {
    /// Paths kept in the response; empty keeps everything
    pub paths: Vec<FieldPath>,
    pub root: Option<Document>,
    pub levels: BTreeMap<FieldPath, Document>,
}

/// Add `path` to an inclusion projection without creating path collisions
/// (`a` together with `a.b` is rejected by the server).
fn include(projection: &mut Document, path: &str) {
    let covered = projection.keys().any(|existing| {
        existing == path
            || path
                .strip_prefix(existing.as_str())
                .is_some_and(|rest| rest.starts_with('.'))
    });
    if covered {
        return;
    }
    let nested: Vec<String> = projection
        .keys()
        .filter(|existing| {
            existing
                .strip_prefix(path)
                .is_some_and(|rest| rest.starts_with('.'))
        })
        .cloned()
        .collect();
    for key in nested {
        projection.remove(&key);
    }
    projection.insert(path, 1_i32);
}

/// Parse the `pick` parameter.
///
/// # Errors
///
/// Invalid field paths, or a `pick` that is not a list of paths.
pub fn parse_pick(
    value: Option<&QueryValue>,
    schema: &QuerySchema,
    populate: &PopulateSet,
) -> Result<PickSpec, QueryError> {
    let Some(value) = value else {
        return Ok(PickSpec::default());
    };
    let raw_items = value
        .scalars()
        .ok_or_else(|| QueryError::invalid_parameter("pick", "expected a list of fields"))?;

    let mut spec = PickSpec::default();
    for item in raw_items.iter().flat_map(|raw| raw.split(',')) {
        let item = item.trim();
        if item.is_empty() {
            continue;
        }
        let path = FieldPath::parse(item, &schema.config)?;
        if !spec.paths.contains(&path) {
            spec.paths.push(path);
        }
    }
    if spec.paths.is_empty() {
        return Ok(spec);
    }

    // Populated references stay in the response whenever anything is picked.
    for level in populate.levels() {
        if !spec.paths.iter().any(|path| path.starts_with(level)) {
            spec.paths.push(level.clone());
        }
    }

    let mut root = Document::new();
    for path in &spec.paths {
        include(&mut root, path.first());
        if let Some((level, rest)) = populate.route(path) {
            include(
                spec.levels.entry(level.clone()).or_default(),
                &rest.to_string(),
            );
        }
    }
    spec.root = Some(root);
    Ok(spec)
}

/// Keep only the picked paths of a rendered document or list of documents.
/// `_id` is always kept.
#[must_use]
pub fn pick_fields(value: &Value, paths: &[FieldPath]) -> Value {
    if paths.is_empty() {
        return value.clone();
    }
    let segments: Vec<&[String]> = paths.iter().map(FieldPath::segments).collect();
    pick_segments(value, &segments)
}

fn pick_segments(value: &Value, paths: &[&[String]]) -> Value {
    match value {
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| pick_segments(item, paths))
                .collect(),
        ),
        Value::Object(object) => {
            let mut picked = Map::new();
            if let Some(id) = object.get("_id") {
                picked.insert("_id".to_string(), id.clone());
            }
            for (key, child) in object {
                let below: Vec<&[String]> = paths
                    .iter()
                    .filter_map(|path| match path.split_first() {
                        Some((first, rest)) if first == key => Some(rest),
                        _ => None,
                    })
                    .collect();
                if below.is_empty() {
                    continue;
                }
                let value = if below.iter().any(|rest| rest.is_empty()) {
                    child.clone()
                } else {
                    pick_segments(child, &below)
                };
                picked.insert(key.clone(), value);
            }
            Value::Object(picked)
        }
        other => other.clone(),
    }
}
