//! Populate (join-like expansion) options.
//!
//! A resource declares its references by full dotted path:
//!
//! ```rust
//! # use mongocrate::ReferenceDef;
//! let references = vec![
//!     ReferenceDef::one("author", "users"),
//!     ReferenceDef::many("comments", "comments"),
//!     ReferenceDef::one("comments.author", "users"),
//! ];
//! # assert_eq!(references.len(), 3);
//! ```
//!
//! `populate=comments.author` then expands `comments` and, inside every
//! comment, `author`. Filter, sort and pick keys below a populated path are
//! routed to that level, so `filter[author.name]=Ada&populate=author` filters
//! the populated authors rather than the root documents.

use std::collections::BTreeMap;

use mongodb::bson::Document;

use super::path::FieldPath;
use super::qs::QueryValue;
use super::schema::QuerySchema;
use crate::errors::QueryError;

/// A field holding the `_id` (or list of `_id`s) of documents in another collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferenceDef {
    /// Full dotted path from the root resource
    pub path: &'static str,
    /// Collection the referenced documents live in
    pub collection: &'static str,
    /// The field holds a list of references
    pub many: bool,
}

impl ReferenceDef {
    #[must_use]
    pub const fn one(path: &'static str, collection: &'static str) -> Self {
        Self {
            path,
            collection,
            many: false,
        }
    }

    #[must_use]
    pub const fn many(path: &'static str, collection: &'static str) -> Self {
        Self {
            path,
            collection,
            many: true,
        }
    }
}

/// One level of population, ready to execute.
#[derive(Debug, Clone, PartialEq)]
pub struct PopulateOptions {
    /// Path relative to the documents of the parent level
    pub path: FieldPath,
    /// Path from the root resource
    pub full_path: FieldPath,
    pub collection: String,
    pub many: bool,
    /// Extra condition the referenced documents must satisfy
    pub filter: Document,
    pub projection: Option<Document>,
    pub sort: Document,
    pub populate: Vec<PopulateOptions>,
}

/// Per-level options collected from the other query parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LevelOptions {
    pub filter: Document,
    pub projection: Option<Document>,
    pub sort: Document,
}

/// The populate levels a request asked for, ancestors included.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PopulateSet {
    /// Sorted by ascending segment count
    levels: Vec<FieldPath>,
}

impl PopulateSet {
    /// Read the `populate` parameter (`a,b.c` or a list).
    ///
    /// # Errors
    ///
    /// Fails on unknown references and chains deeper than
    /// `max_populate_depth`.
    pub fn parse(value: Option<&QueryValue>, schema: &QuerySchema) -> Result<Self, QueryError> {
        let Some(value) = value else {
            return Ok(Self::default());
        };
        let raw_items = value
            .scalars()
            .ok_or_else(|| QueryError::invalid_parameter("populate", "expected a list of paths"))?;

        let mut levels: Vec<FieldPath> = Vec::new();
        for item in raw_items.iter().flat_map(|raw| raw.split(',')) {
            let item = item.trim();
            if item.is_empty() {
                continue;
            }
            let path = FieldPath::parse(item, &schema.config)?;
            if schema.reference(&path).is_none() {
                return Err(QueryError::UnknownPopulate {
                    path: path.to_string(),
                });
            }

            let chain: Vec<FieldPath> = schema
                .references
                .iter()
                .filter_map(|reference| FieldPath::parse(reference.path, &schema.config).ok())
                .filter(|candidate| path.starts_with(candidate))
                .collect();
            if chain.len() > schema.config.max_populate_depth {
                return Err(QueryError::PopulateTooDeep {
                    path: path.to_string(),
                    max_depth: schema.config.max_populate_depth,
                });
            }
            for level in chain {
                if !levels.contains(&level) {
                    levels.push(level);
                }
            }
        }

        levels.sort_by(|a, b| a.len().cmp(&b.len()).then_with(|| a.cmp(b)));
        Ok(Self { levels })
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    #[must_use]
    pub fn levels(&self) -> &[FieldPath] {
        &self.levels
    }

    /// The deepest populated level strictly above `path`, with the remainder
    /// of `path` relative to it.
    #[must_use]
    pub fn route(&self, path: &FieldPath) -> Option<(&FieldPath, FieldPath)> {
        self.levels
            .iter()
            .rev()
            .find_map(|level| path.strip_prefix(level).map(|rest| (level, rest)))
    }

    fn parent_of(&self, level: &FieldPath) -> Option<&FieldPath> {
        self.levels
            .iter()
            .rev()
            .find(|candidate| level.strip_prefix(candidate).is_some())
    }

    /// Assemble the option tree, consuming the per-level options.
    #[must_use]
    pub fn build(
        &self,
        schema: &QuerySchema,
        mut options: BTreeMap<FieldPath, LevelOptions>,
    ) -> Vec<PopulateOptions> {
        self.levels
            .iter()
            .filter(|level| self.parent_of(level).is_none())
            .filter_map(|level| self.build_level(level, schema, &mut options))
            .collect()
    }

    fn build_level(
        &self,
        full_path: &FieldPath,
        schema: &QuerySchema,
        options: &mut BTreeMap<FieldPath, LevelOptions>,
    ) -> Option<PopulateOptions> {
        let reference = schema.reference(full_path)?;
        let path = self
            .parent_of(full_path)
            .and_then(|parent| full_path.strip_prefix(parent))
            .unwrap_or_else(|| full_path.clone());

        let children: Vec<PopulateOptions> = self
            .levels
            .iter()
            .filter(|child| self.parent_of(child) == Some(full_path))
            .filter_map(|child| self.build_level(child, schema, options))
            .collect();

        let LevelOptions {
            filter,
            mut projection,
            sort,
        } = options.remove(full_path).unwrap_or_default();

        // A projected level still needs the fields its children populate from.
        if let Some(projection) = projection.as_mut() {
            for child in &children {
                projection.insert(child.path.first(), 1_i32);
            }
        }

        Some(PopulateOptions {
            path,
            full_path: full_path.clone(),
            collection: reference.collection.to_string(),
            many: reference.many,
            filter,
            projection,
            sort,
            populate: children,
        })
    }
}
