//! `match`, `filter` and `search` parameters.
//!
//! - `match[field]=value` is plain equality (a list becomes `$in`).
//! - `filter[field][$op]=value` conditions must all hold.
//! - `search[field][$op]=value` conditions are alternatives; `search=text`
//!   runs `$like` over the resource's searchable fields.
//!
//! Conditions on fields below a populated reference are moved to that
//! populate level, so they restrict which referenced documents are attached
//! rather than which root documents are returned.

use std::collections::BTreeMap;

use mongodb::bson::{Bson, Document, doc};

use super::operators::{build_field_condition, build_operator_document, escape_regex};
use super::path::FieldPath;
use super::populate::PopulateSet;
use super::qs::QueryValue;
use super::schema::QuerySchema;
use crate::errors::QueryError;

/// Translated conditions for the root query and each populate level.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Conditions {
    pub root: Document,
    pub levels: BTreeMap<FieldPath, Document>,
}

#[derive(Default)]
struct Branches {
    root: Vec<Document>,
    levels: BTreeMap<FieldPath, Vec<Document>>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mode {
    Match,
    Filter,
    Search,
}

impl Mode {
    fn parameter(self) -> &'static str {
        match self {
            Self::Match => "match",
            Self::Filter => "filter",
            Self::Search => "search",
        }
    }
}

struct Translator<'a> {
    schema: &'a QuerySchema,
    populate: &'a PopulateSet,
}

/// Combine branches: nothing, the single branch, or an `$and`/`$or` of all.
fn combine(mut branches: Vec<Document>, operator: &str) -> Document {
    match branches.len() {
        0 => Document::new(),
        1 => branches.remove(0),
        _ => doc! { operator: branches },
    }
}

fn entries<'v>(parameter: &str, value: &'v QueryValue) -> Result<&'v [(String, QueryValue)], QueryError> {
    match value {
        QueryValue::Map(entries) => Ok(entries),
        _ => Err(QueryError::invalid_parameter(
            parameter,
            "expected field conditions such as filter[name]=value",
        )),
    }
}

impl Translator<'_> {
    fn field_path(
        &self,
        prefix: Option<&FieldPath>,
        key: &str,
    ) -> Result<FieldPath, QueryError> {
        let path = FieldPath::parse(key, &self.schema.config)?;
        let path = match prefix {
            Some(prefix) => prefix.join(&path),
            None => path,
        };
        path.check_depth(&self.schema.config)?;
        Ok(path)
    }

    /// Place a finished field condition at the root or at its populate level.
    fn emit(
        &self,
        mode: Mode,
        path: &FieldPath,
        condition: Bson,
        routable: bool,
        out: &mut Branches,
    ) -> Result<(), QueryError> {
        self.schema.check_filterable(mode.parameter(), path)?;

        match self.populate.route(path) {
            Some((level, rest)) => {
                if mode == Mode::Search {
                    return Err(QueryError::invalid_parameter(
                        "search",
                        format!("cannot search on populated field '{path}'"),
                    ));
                }
                if !routable {
                    return Err(QueryError::invalid_parameter(
                        mode.parameter(),
                        format!("'{path}' is populated and cannot be used inside $and/$or"),
                    ));
                }
                out.levels
                    .entry(level.clone())
                    .or_default()
                    .push(doc! { rest.to_string(): condition });
            }
            None => out.root.push(doc! { path.to_string(): condition }),
        }
        Ok(())
    }

    fn translate_match(&self, value: &QueryValue, out: &mut Branches) -> Result<(), QueryError> {
        for (key, value) in entries("match", value)? {
            self.match_entry(None, key, value, out)?;
        }
        Ok(())
    }

    fn match_entry(
        &self,
        prefix: Option<&FieldPath>,
        key: &str,
        value: &QueryValue,
        out: &mut Branches,
    ) -> Result<(), QueryError> {
        if key.starts_with('$') {
            return Err(QueryError::invalid_parameter(
                "match",
                format!("operator '{key}' is not allowed, use filter instead"),
            ));
        }
        let path = self.field_path(prefix, key)?;
        match value {
            QueryValue::Map(children) => {
                for (child, value) in children {
                    self.match_entry(Some(&path), child, value, out)?;
                }
                Ok(())
            }
            _ => {
                let kind = self.schema.kind_of(&path);
                let condition = build_field_condition(&path, kind, value, &self.schema.config)?;
                self.emit(Mode::Match, &path, condition, true, out)
            }
        }
    }

    fn translate_tree(
        &self,
        mode: Mode,
        prefix: Option<&FieldPath>,
        tree: &[(String, QueryValue)],
        routable: bool,
        out: &mut Branches,
    ) -> Result<(), QueryError> {
        for (key, value) in tree {
            if prefix.is_none() && (key == "$and" || key == "$or") {
                if let Some(logical) = self.logical(mode, key, value)? {
                    out.root.push(logical);
                }
                continue;
            }
            if key.starts_with('$') {
                return Err(QueryError::UnknownOperator {
                    field: prefix.map_or_else(|| mode.parameter().to_string(), ToString::to_string),
                    operator: key.clone(),
                });
            }

            let path = self.field_path(prefix, key)?;
            let QueryValue::Map(children) = value else {
                let kind = self.schema.kind_of(&path);
                let condition = build_field_condition(&path, kind, value, &self.schema.config)?;
                self.emit(mode, &path, condition, routable, out)?;
                continue;
            };

            let (operators, nested): (Vec<_>, Vec<_>) =
                children.iter().cloned().partition(|(k, _)| k.starts_with('$'));
            if !operators.is_empty() {
                let kind = self.schema.kind_of(&path);
                let condition =
                    build_operator_document(&path, kind, &operators, &self.schema.config)?;
                self.emit(mode, &path, Bson::Document(condition), routable, out)?;
            }
            if !nested.is_empty() {
                self.translate_tree(mode, Some(&path), &nested, routable, out)?;
            }
        }
        Ok(())
    }

    /// `$and` / `$or`: a list of sub-trees, each translated to one document.
    fn logical(&self, mode: Mode, key: &str, value: &QueryValue) -> Result<Option<Document>, QueryError> {
        let items: Vec<&QueryValue> = match value {
            QueryValue::List(items) => items.iter().collect(),
            QueryValue::Map(_) => vec![value],
            QueryValue::Scalar(_) => {
                return Err(QueryError::invalid_parameter(
                    mode.parameter(),
                    format!("{key} expects a list of conditions"),
                ));
            }
        };

        let mut branches = Vec::with_capacity(items.len());
        for item in items {
            let QueryValue::Map(tree) = item else {
                return Err(QueryError::invalid_parameter(
                    mode.parameter(),
                    format!("{key} expects a list of conditions"),
                ));
            };
            let mut inner = Branches::default();
            self.translate_tree(mode, None, tree, false, &mut inner)?;
            let branch = combine(inner.root, "$and");
            if !branch.is_empty() {
                branches.push(branch);
            }
        }

        Ok((!branches.is_empty()).then(|| doc! { key: branches }))
    }

    fn translate_search(&self, value: &QueryValue, out: &mut Branches) -> Result<(), QueryError> {
        if let Some(text) = value.as_scalar() {
            let text = text.trim();
            if text.is_empty() {
                return Ok(());
            }
            if self.schema.searchable.is_empty() {
                return Err(QueryError::invalid_parameter(
                    "search",
                    "this resource has no searchable fields",
                ));
            }
            if text.chars().count() > self.schema.config.max_regex_length {
                return Err(QueryError::ValueTooLong {
                    field: "search".to_string(),
                    max: self.schema.config.max_regex_length,
                });
            }
            let pattern = escape_regex(text);
            for field in &self.schema.searchable {
                out.root.push(doc! {
                    *field: { "$regex": pattern.as_str(), "$options": "i" }
                });
            }
            return Ok(());
        }
        self.translate_tree(Mode::Search, None, entries("search", value)?, false, out)
    }
}

/// Translate `match`, `filter` and `search` of a decoded query string.
///
/// # Errors
///
/// Any invalid field, operator or value, fields that are not filterable and
/// searches on populated fields.
pub fn build_conditions(
    params: &QueryValue,
    schema: &QuerySchema,
    populate: &PopulateSet,
) -> Result<Conditions, QueryError> {
    let translator = Translator { schema, populate };
    let mut all = Branches::default();

    if let Some(value) = params.get("match") {
        translator.translate_match(value, &mut all)?;
    }
    if let Some(value) = params.get("filter") {
        translator.translate_tree(Mode::Filter, None, entries("filter", value)?, true, &mut all)?;
    }
    if let Some(value) = params.get("search") {
        let mut any = Branches::default();
        translator.translate_search(value, &mut any)?;
        let alternatives = combine(any.root, "$or");
        if !alternatives.is_empty() {
            all.root.push(alternatives);
        }
    }

    Ok(Conditions {
        root: combine(all.root, "$and"),
        levels: all
            .levels
            .into_iter()
            .map(|(level, branches)| (level, combine(branches, "$and")))
            .collect(),
    })
}
