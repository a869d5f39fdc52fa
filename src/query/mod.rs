//! # Query string translation
//!
//! Turns a list endpoint's query string into a MongoDB filter, sort,
//! projection and populate plan.
//!
//! | Parameter  | Example                              | Effect                                  |
//! |------------|--------------------------------------|-----------------------------------------|
//! | `match`    | `match[status]=open`                 | equality, lists become `$in`            |
//! | `filter`   | `filter[age][$gte]=18`               | operator conditions, all must hold      |
//! | `search`   | `search=ada` / `search[name][$like]=ad` | alternatives, any may hold           |
//! | `sort`     | `sort=-createdAt,name`               | ordering, default `_id` ascending       |
//! | `populate` | `populate=author,comments.author`    | replace references by their documents   |
//! | `pick`     | `pick=title,author.name`             | field selection                         |
//! | `limit` / `offset` / `page` | `limit=10&page=2`   | pagination                              |
//! | `distinct` | `distinct=status`                    | distinct values of one field            |
//! | `random`   | `random=3`                           | random sample of matching documents     |
//!
//! Every `$` key must be a known [`Operator`]; nesting is clamped to
//! [`QueryConfig::max_depth`](crate::QueryConfig::max_depth).
//!
//! ```rust
//! use mongocrate::query::{QuerySchema, QuerySpec};
//! use mongodb::bson::doc;
//!
//! let spec = QuerySpec::from_query_string(
//!     Some("filter[age][$gte]=18&sort=-age&limit=5"),
//!     &QuerySchema::default(),
//! )
//! .unwrap();
//! assert_eq!(spec.filter, doc! { "age": { "$gte": 18_i64 } });
//! assert_eq!(spec.sort, doc! { "age": -1 });
//! assert_eq!(spec.limit, 5);
//! ```

pub mod conditions;
pub mod operators;
pub mod pagination;
pub mod path;
pub mod pick;
pub mod populate;
pub mod qs;
pub mod schema;
pub mod sort;

use std::collections::BTreeMap;

use mongodb::bson::Document;

pub use conditions::{Conditions, build_conditions};
pub use operators::{FieldKind, Operator, build_field_condition, escape_regex};
pub use pagination::{Pagination, parse_pagination};
pub use path::FieldPath;
pub use pick::{PickSpec, parse_pick, pick_fields};
pub use populate::{LevelOptions, PopulateOptions, PopulateSet, ReferenceDef};
pub use qs::{QueryValue, parse_query_string};
pub use schema::QuerySchema;
pub use sort::{SortSpec, parse_sort};

use crate::errors::QueryError;
use crate::traits::CRUDResource;

const KNOWN_PARAMETERS: &[&str] = &[
    "match", "filter", "search", "sort", "populate", "pick", "limit", "offset", "page",
    "distinct", "random",
];

/// Everything a list request asks for, ready to hand to the driver.
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySpec {
    pub filter: Document,
    pub sort: Document,
    pub projection: Option<Document>,
    /// Paths kept in the rendered response
    pub pick: Vec<FieldPath>,
    pub populate: Vec<PopulateOptions>,
    pub skip: u64,
    pub limit: u64,
    pub distinct: Option<FieldPath>,
    /// Sample size for `random`
    pub random: Option<u64>,
}

impl QuerySpec {
    /// Translate a raw (percent-encoded) query string.
    ///
    /// # Errors
    ///
    /// Returns the first [`QueryError`] found in any parameter.
    pub fn from_query_string(raw: Option<&str>, schema: &QuerySchema) -> Result<Self, QueryError> {
        let params = parse_query_string(raw.unwrap_or_default(), &schema.config)?;
        if let QueryValue::Map(entries) = &params {
            for (key, _) in entries {
                if !KNOWN_PARAMETERS.contains(&key.as_str()) {
                    tracing::debug!(parameter = %key, "Ignoring unknown query parameter");
                }
            }
        }

        let populate = PopulateSet::parse(params.get("populate"), schema)?;
        let conditions = build_conditions(&params, schema, &populate)?;
        let sort = parse_sort(params.get("sort"), schema, &populate)?;
        let pick = parse_pick(params.get("pick"), schema, &populate)?;
        let pagination = parse_pagination(&params, &schema.config)?;
        let distinct = parse_distinct(params.get("distinct"), schema, &populate)?;
        let random = parse_random(params.get("random"), schema)?;
        if distinct.is_some() && random.is_some() {
            return Err(QueryError::invalid_parameter(
                "random",
                "cannot be combined with distinct",
            ));
        }

        let mut levels: BTreeMap<FieldPath, LevelOptions> = BTreeMap::new();
        for (level, filter) in conditions.levels {
            levels.entry(level).or_default().filter = filter;
        }
        for (level, sort) in sort.levels {
            levels.entry(level).or_default().sort = sort;
        }
        for (level, projection) in pick.levels {
            levels.entry(level).or_default().projection = Some(projection);
        }

        Ok(Self {
            filter: conditions.root,
            sort: sort.root,
            projection: pick.root,
            pick: pick.paths,
            populate: populate.build(schema, levels),
            skip: pagination.offset,
            limit: pagination.limit,
            distinct,
            random,
        })
    }

    /// [`from_query_string`](Self::from_query_string) with the schema
    /// declared by a resource.
    ///
    /// # Errors
    ///
    /// See [`from_query_string`](Self::from_query_string).
    pub fn for_resource<T: CRUDResource>(raw: Option<&str>) -> Result<Self, QueryError> {
        Self::from_query_string(raw, &QuerySchema::of::<T>())
    }
}

fn single<'v>(value: &'v QueryValue, parameter: &'static str) -> Result<&'v str, QueryError> {
    value
        .as_scalar()
        .map(str::trim)
        .ok_or_else(|| QueryError::invalid_parameter(parameter, "expected a single value"))
}

fn parse_distinct(
    value: Option<&QueryValue>,
    schema: &QuerySchema,
    populate: &PopulateSet,
) -> Result<Option<FieldPath>, QueryError> {
    let Some(value) = value else {
        return Ok(None);
    };
    let path = FieldPath::parse(single(value, "distinct")?, &schema.config)?;
    schema.check_filterable("distinct", &path)?;
    if populate.levels().iter().any(|level| path.starts_with(level)) {
        return Err(QueryError::invalid_parameter(
            "distinct",
            format!("'{path}' is populated"),
        ));
    }
    Ok(Some(path))
}

/// `random=true` samples one document, `random=<n>` samples `n`.
fn parse_random(value: Option<&QueryValue>, schema: &QuerySchema) -> Result<Option<u64>, QueryError> {
    let Some(value) = value else {
        return Ok(None);
    };
    let raw = single(value, "random")?;
    let size = match raw.to_ascii_lowercase().as_str() {
        "" | "false" | "0" => return Ok(None),
        "true" => 1,
        _ => raw
            .parse::<u64>()
            .map_err(|_| QueryError::invalid_value("random", "true or a sample size", raw))?,
    };
    Ok(Some(schema.config.clamp_limit(size)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QueryConfig;
    use mongodb::bson::doc;

    fn schema() -> QuerySchema {
        QuerySchema {
            fields: vec![("age", FieldKind::Integer)],
            references: vec![
                ReferenceDef::one("author", "users"),
                ReferenceDef::many("comments", "comments"),
                ReferenceDef::one("comments.author", "users"),
            ],
            ..QuerySchema::default()
        }
    }

    fn spec(raw: &str) -> Result<QuerySpec, QueryError> {
        QuerySpec::from_query_string(Some(raw), &schema())
    }

    fn path(raw: &str) -> FieldPath {
        FieldPath::parse(raw, &QueryConfig::default()).unwrap()
    }

    #[test]
    fn test_empty_query_string() {
        let spec = QuerySpec::from_query_string(None, &schema()).unwrap();
        assert_eq!(spec.filter, Document::new());
        assert_eq!(spec.sort, doc! { "_id": 1 });
        assert_eq!(spec.projection, None);
        assert!(spec.populate.is_empty());
        assert_eq!((spec.skip, spec.limit), (0, 20));
        assert_eq!(spec.distinct, None);
        assert_eq!(spec.random, None);
    }

    #[test]
    fn test_unknown_parameters_are_ignored() {
        let spec = spec("utm_source=mail&age=3").unwrap();
        assert_eq!(spec.filter, Document::new());
    }

    #[test]
    fn test_populate_levels_collect_options() {
        let spec = spec(
            "populate=comments.author\
             &filter[comments.approved]=true\
             &filter[comments.author.active]=true\
             &sort=-comments.createdAt\
             &pick=title,comments.text",
        )
        .unwrap();

        assert_eq!(spec.filter, Document::new());
        assert_eq!(spec.projection, Some(doc! { "title": 1, "comments": 1 }));
        assert_eq!(spec.populate.len(), 1);

        let comments = &spec.populate[0];
        assert_eq!(comments.path, path("comments"));
        assert_eq!(comments.filter, doc! { "approved": true });
        assert_eq!(comments.sort, doc! { "createdAt": -1 });
        assert_eq!(
            comments.projection,
            Some(doc! { "text": 1, "author": 1 })
        );

        let author = &comments.populate[0];
        assert_eq!(author.full_path, path("comments.author"));
        assert_eq!(author.filter, doc! { "active": true });
        assert_eq!(author.projection, None);
    }

    #[test]
    fn test_distinct() {
        assert_eq!(spec("distinct=age").unwrap().distinct, Some(path("age")));
        assert!(spec("distinct=$age").is_err());
        assert!(matches!(
            spec("populate=author&distinct=author.name"),
            Err(QueryError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_random() {
        assert_eq!(spec("random=true").unwrap().random, Some(1));
        assert_eq!(spec("random=5").unwrap().random, Some(5));
        assert_eq!(spec("random=500").unwrap().random, Some(100));
        assert_eq!(spec("random=false").unwrap().random, None);
        assert!(spec("random=lots").is_err());
        assert!(spec("random=2&distinct=age").is_err());
    }

    #[test]
    fn test_colliding_operators_do_not_drop_conditions() {
        assert!(matches!(
            spec("filter[a][$eq]=5&filter[a][$isNull]=true"),
            Err(QueryError::InvalidParameter { .. })
        ));
        assert!(matches!(
            spec("filter[a][$regex]=^x&filter[a][$like]=y"),
            Err(QueryError::InvalidParameter { .. })
        ));
        assert!(matches!(
            spec("filter[a][$options]=i"),
            Err(QueryError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_string_ids_are_filterable() {
        assert_eq!(spec("filter[_id]=my-slug").unwrap().filter, doc! { "_id": "my-slug" });
        assert_eq!(
            spec("match[_id][]=my-slug&match[_id][]=64b7f1f2a1b2c3d4e5f60718")
                .unwrap()
                .filter,
            doc! {
                "_id": {
                    "$in": [
                        "my-slug",
                        mongodb::bson::oid::ObjectId::parse_str("64b7f1f2a1b2c3d4e5f60718").unwrap(),
                    ],
                },
            }
        );
    }

    #[test]
    fn test_errors_surface() {
        assert!(matches!(
            spec("populate=nothing"),
            Err(QueryError::UnknownPopulate { .. })
        ));
        assert!(matches!(
            spec("filter[age]=abc"),
            Err(QueryError::InvalidValue { .. })
        ));
        assert!(matches!(
            spec("sort=age:up"),
            Err(QueryError::InvalidSort { .. })
        ));
    }
}
