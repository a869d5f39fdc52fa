use super::operators::FieldKind;
use super::path::FieldPath;
use super::populate::ReferenceDef;
use crate::config::QueryConfig;
use crate::errors::QueryError;
use crate::traits::CRUDResource;

/// What a resource exposes to the query string.
///
/// Empty `filterable` or `sortable` lists mean "any syntactically valid
/// field". Field names are full dotted paths from the root document, so a
/// field of a populated reference is declared as `author.name`.
#[derive(Debug, Clone, Default)]
pub struct QuerySchema {
    pub fields: Vec<(&'static str, FieldKind)>,
    pub filterable: Vec<&'static str>,
    pub sortable: Vec<&'static str>,
    pub searchable: Vec<&'static str>,
    pub references: Vec<ReferenceDef>,
    pub config: QueryConfig,
}

impl QuerySchema {
    #[must_use]
    pub fn of<T: CRUDResource>() -> Self {
        Self {
            fields: T::fields(),
            filterable: T::filterable_fields(),
            sortable: T::sortable_fields(),
            searchable: T::searchable_fields(),
            references: T::references(),
            config: T::query_config(),
        }
    }

    /// Declared kind of a field; `_id` defaults to [`FieldKind::Id`].
    #[must_use]
    pub fn kind_of(&self, path: &FieldPath) -> FieldKind {
        let dotted = path.to_string();
        if let Some((_, kind)) = self.fields.iter().find(|(name, _)| *name == dotted) {
            return *kind;
        }
        if path.segments().last().is_some_and(|last| last == "_id") {
            return FieldKind::Id;
        }
        FieldKind::Any
    }

    /// Fail unless the field may be used in filters.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::UnknownField`] naming `parameter`.
    pub fn check_filterable(&self, parameter: &'static str, path: &FieldPath) -> Result<(), QueryError> {
        check_listed(&self.filterable, parameter, path)
    }

    /// Fail unless the field may be used for sorting.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::UnknownField`].
    pub fn check_sortable(&self, path: &FieldPath) -> Result<(), QueryError> {
        check_listed(&self.sortable, "sort", path)
    }

    #[must_use]
    pub fn reference(&self, path: &FieldPath) -> Option<&ReferenceDef> {
        let dotted = path.to_string();
        self.references.iter().find(|reference| reference.path == dotted)
    }
}

/// A path is allowed when it or one of its ancestors is listed, so listing
/// `address` exposes `address.city` too.
fn check_listed(
    allowed: &[&'static str],
    parameter: &'static str,
    path: &FieldPath,
) -> Result<(), QueryError> {
    if allowed.is_empty() {
        return Ok(());
    }
    let dotted = path.to_string();
    let listed = allowed.iter().any(|name| {
        dotted == *name
            || dotted
                .strip_prefix(name)
                .is_some_and(|rest| rest.starts_with('.'))
    });
    if listed {
        Ok(())
    } else {
        Err(QueryError::UnknownField {
            parameter,
            field: dotted,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(raw: &str) -> FieldPath {
        FieldPath::parse(raw, &QueryConfig::default()).unwrap()
    }

    #[test]
    fn test_kind_lookup() {
        let schema = QuerySchema {
            fields: vec![("age", FieldKind::Integer), ("author.name", FieldKind::String)],
            ..QuerySchema::default()
        };
        assert_eq!(schema.kind_of(&path("age")), FieldKind::Integer);
        assert_eq!(schema.kind_of(&path("author.name")), FieldKind::String);
        assert_eq!(schema.kind_of(&path("_id")), FieldKind::Id);
        assert_eq!(schema.kind_of(&path("author._id")), FieldKind::Id);
        assert_eq!(schema.kind_of(&path("other")), FieldKind::Any);
    }

    #[test]
    fn test_listed_fields_and_descendants() {
        let schema = QuerySchema {
            filterable: vec!["name", "address"],
            ..QuerySchema::default()
        };
        assert!(schema.check_filterable("filter", &path("name")).is_ok());
        assert!(schema.check_filterable("filter", &path("address.city")).is_ok());
        assert!(schema.check_filterable("filter", &path("addresses")).is_err());
        let err = schema.check_filterable("match", &path("password")).unwrap_err();
        assert_eq!(
            err,
            QueryError::UnknownField {
                parameter: "match",
                field: "password".to_string(),
            }
        );
    }

    #[test]
    fn test_empty_list_allows_everything() {
        let schema = QuerySchema::default();
        assert!(schema.check_sortable(&path("anything.at.all")).is_ok());
    }
}
