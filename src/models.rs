use serde::Deserialize;
use utoipa::openapi::tag::{Tag, TagBuilder};
use utoipa::{IntoParams, ToSchema};

use crate::traits::CRUDResource;

/// Query parameters accepted by list endpoints.
///
/// The handlers read the raw query string, because bracket keys such as
/// `filter[age][$gte]=18` do not fit a flat struct. This type exists to
/// describe the parameters in OpenAPI documents:
///
/// ```rust,ignore
/// #[utoipa::path(get, path = "/posts", params(mongocrate::ListQuery))]
/// async fn list_posts() {}
/// ```
///
/// # Filtering
/// - `match[status]=open`: exact match; repeat the key for "any of".
/// - `filter[age][$gte]=18`: operators `$eq`, `$ne`, `$gt`, `$gte`, `$lt`,
///   `$lte`, `$in`, `$nin`, `$all`, `$regex`, `$options`, `$exists`,
///   `$like`, `$isNull`, `$notNull`, `$size`. All conditions must hold.
/// - `filter[$or][0][a]=1&filter[$or][1][b]=2`: alternatives.
/// - `search=text`, or `search[name][$like]=ad`: any condition may hold.
///
/// # Population
/// `populate=author,comments.author` replaces stored references by the
/// referenced documents. Filter, sort and pick keys below a populated path
/// apply to the populated documents.
///
/// # Pagination
/// `limit` and either `offset` or `page` (1-based). Responses carry
/// `Content-Range` and `X-Total-Count` headers.
#[derive(Debug, Deserialize, IntoParams, ToSchema, Default)]
#[into_params(parameter_in = Query)]
pub struct ListQuery {
    /// Exact match on a field, written as `match[field]=value`.
    #[serde(rename = "match")]
    #[param(example = "match[status]=open")]
    pub match_: Option<String>,
    /// Operator conditions, written as `filter[field][$operator]=value`.
    #[param(example = "filter[age][$gte]=18")]
    pub filter: Option<String>,
    /// Free text over the searchable fields, or `search[field][$operator]=value`.
    #[param(example = "ada")]
    pub search: Option<String>,
    /// Comma separated fields; `-field` or `field:desc` sorts descending.
    #[param(example = "-createdAt,name")]
    pub sort: Option<String>,
    /// Comma separated reference paths to expand.
    #[param(example = "author,comments.author")]
    pub populate: Option<String>,
    /// Comma separated fields to return.
    #[param(example = "title,author.name")]
    pub pick: Option<String>,
    /// Page size.
    #[param(example = 20)]
    pub limit: Option<u64>,
    /// Number of items to skip.
    #[param(example = 0)]
    pub offset: Option<u64>,
    /// Page number (1-based), used when `offset` is absent.
    #[param(example = 1)]
    pub page: Option<u64>,
    /// Return the distinct values of this field instead of documents.
    #[param(example = "status")]
    pub distinct: Option<String>,
    /// `true` or a sample size: return random matching documents.
    #[param(example = "3")]
    pub random: Option<String>,
}

/// OpenAPI tag grouping the endpoints of a resource, named after its plural
/// name and described by [`CRUDResource::RESOURCE_DESCRIPTION`].
#[must_use]
pub fn resource_tag<T: CRUDResource>() -> Tag {
    let description = Some(T::RESOURCE_DESCRIPTION).filter(|text| !text.is_empty());
    TagBuilder::new()
        .name(T::RESOURCE_NAME_PLURAL)
        .description(description)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::Validatable;
    use serde::Serialize;

    #[derive(Serialize, Deserialize)]
    struct Note {
        text: String,
    }

    impl Validatable for Note {}

    struct Notes;

    impl CRUDResource for Notes {
        type CreateModel = Note;
        type UpdateModel = Note;

        const COLLECTION_NAME: &'static str = "notes";
        const RESOURCE_NAME_SINGULAR: &'static str = "note";
        const RESOURCE_NAME_PLURAL: &'static str = "notes";
        const RESOURCE_DESCRIPTION: &'static str = "Short notes";
    }

    #[test]
    fn test_resource_tag() {
        let tag = resource_tag::<Notes>();
        assert_eq!(tag.name, "notes");
        assert_eq!(tag.description.as_deref(), Some("Short notes"));
    }

    #[test]
    fn test_documented_parameter_names() {
        let names: Vec<String> = ListQuery::into_params(|| None)
            .into_iter()
            .map(|parameter| parameter.name)
            .collect();
        for expected in [
            "match", "filter", "search", "sort", "populate", "pick", "limit", "offset", "page",
            "distinct", "random",
        ] {
            assert!(names.iter().any(|name| name == expected), "missing {expected}");
        }
    }
}
