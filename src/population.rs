//! Execution of [`PopulateOptions`]: replace stored references by the
//! documents they point to.

use std::collections::{HashMap, HashSet};

use futures::{FutureExt, TryStreamExt, future::BoxFuture};
use mongodb::Database;
use mongodb::bson::{Bson, Document, doc};
use mongodb::options::FindOptions;

use crate::errors::ApiError;
use crate::query::PopulateOptions;

/// Visit every value stored at `segments`, walking through embedded
/// documents and arrays of embedded documents.
fn visit(document: &mut Document, segments: &[String], apply: &mut dyn FnMut(&mut Bson)) {
    let Some((first, rest)) = segments.split_first() else {
        return;
    };
    let Some(value) = document.get_mut(first) else {
        return;
    };
    if rest.is_empty() {
        apply(value);
        return;
    }
    match value {
        Bson::Document(inner) => visit(inner, rest, apply),
        Bson::Array(items) => {
            for item in items {
                if let Bson::Document(inner) = item {
                    visit(inner, rest, apply);
                }
            }
        }
        _ => {}
    }
}

fn is_reference(value: &Bson) -> bool {
    !matches!(value, Bson::Null | Bson::Undefined | Bson::Document(_) | Bson::Array(_))
}

fn reference_key(value: &Bson) -> String {
    value.to_string()
}

/// Populate `documents` in place, level by level and recursively.
///
/// A single stored reference becomes the referenced document, or `null` when
/// it does not exist or is excluded by the level filter. A stored list
/// becomes the list of referenced documents: in stored order, or in the
/// level's sort order when it has one. Missing documents are dropped from
/// lists; repeated references are kept.
///
/// # Errors
///
/// Returns [`ApiError::Database`] when a lookup fails.
pub fn populate_documents<'a>(
    db: &'a Database,
    documents: &'a mut [Document],
    levels: &'a [PopulateOptions],
) -> BoxFuture<'a, Result<(), ApiError>> {
    async move {
        for level in levels {
            populate_level(db, documents, level).await?;
        }
        Ok(())
    }
    .boxed()
}

/// Distinct stored references at `segments`, in first-seen order.
fn collect_references(documents: &mut [Document], segments: &[String]) -> Vec<Bson> {
    let mut ids: Vec<Bson> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    for document in documents.iter_mut() {
        visit(document, segments, &mut |value| {
            let stored: Vec<&Bson> = match &*value {
                Bson::Array(items) => items.iter().filter(|item| is_reference(item)).collect(),
                other if is_reference(other) => vec![other],
                _ => Vec::new(),
            };
            for id in stored {
                if seen.insert(reference_key(id)) {
                    ids.push(id.clone());
                }
            }
        });
    }
    ids
}

/// Replace the references at `segments` by the `fetched` documents.
///
/// With `sorted`, lists follow the order of `fetched`; otherwise they keep
/// the stored order. Repeated references are kept either way.
fn substitute(documents: &mut [Document], segments: &[String], fetched: Vec<Document>, sorted: bool) {
    let mut rank: HashMap<String, usize> = HashMap::with_capacity(fetched.len());
    let mut by_id: HashMap<String, Document> = HashMap::with_capacity(fetched.len());
    for document in fetched {
        if let Some(id) = document.get("_id") {
            let key = reference_key(id);
            let position = rank.len();
            rank.entry(key.clone()).or_insert(position);
            by_id.insert(key, document);
        }
    }

    for document in documents.iter_mut() {
        visit(document, segments, &mut |value| match value {
            Bson::Array(items) => {
                let mut found: Vec<(usize, Bson)> = items
                    .iter()
                    .filter_map(|item| {
                        let key = reference_key(item);
                        let position = *rank.get(&key)?;
                        Some((position, Bson::Document(by_id.get(&key)?.clone())))
                    })
                    .collect();
                if sorted {
                    found.sort_by_key(|(position, _)| *position);
                }
                *items = found.into_iter().map(|(_, document)| document).collect();
            }
            other => {
                if is_reference(other) {
                    *other = by_id
                        .get(&reference_key(other))
                        .cloned()
                        .map_or(Bson::Null, Bson::Document);
                }
            }
        });
    }
}

async fn populate_level(
    db: &Database,
    documents: &mut [Document],
    level: &PopulateOptions,
) -> Result<(), ApiError> {
    let segments = level.path.segments();

    let ids = collect_references(documents, segments);
    if ids.is_empty() {
        return Ok(());
    }

    let mut filter = doc! { "_id": { "$in": ids } };
    if !level.filter.is_empty() {
        filter = doc! { "$and": [filter, level.filter.clone()] };
    }
    let mut options = FindOptions::default();
    options.projection.clone_from(&level.projection);
    if !level.sort.is_empty() {
        options.sort = Some(level.sort.clone());
    }

    tracing::debug!(
        collection = %level.collection,
        path = %level.full_path,
        "Populating references"
    );
    let mut fetched: Vec<Document> = db
        .collection::<Document>(&level.collection)
        .find(filter)
        .with_options(options)
        .await?
        .try_collect()
        .await?;
    populate_documents(db, &mut fetched, &level.populate).await?;

    substitute(documents, segments, fetched, !level.sort.is_empty());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::oid::ObjectId;

    fn segments(path: &str) -> Vec<String> {
        path.split('.').map(str::to_string).collect()
    }

    #[test]
    fn test_visit_walks_embedded_arrays() {
        let mut document = doc! {
            "comments": [
                { "author": "a" },
                { "author": "b" },
                { "text": "no author" },
            ],
        };
        let mut seen = Vec::new();
        visit(&mut document, &segments("comments.author"), &mut |value| {
            seen.push(value.clone());
        });
        assert_eq!(seen, vec![Bson::from("a"), Bson::from("b")]);
    }

    #[test]
    fn test_visit_replaces_in_place() {
        let mut document = doc! { "meta": { "owner": "x" } };
        visit(&mut document, &segments("meta.owner"), &mut |value| {
            *value = Bson::Null;
        });
        assert_eq!(document, doc! { "meta": { "owner": Bson::Null } });
    }

    #[test]
    fn test_reference_detection() {
        assert!(is_reference(&Bson::ObjectId(ObjectId::new())));
        assert!(is_reference(&Bson::from("slug")));
        assert!(!is_reference(&Bson::Null));
        assert!(!is_reference(&Bson::Document(doc! {})));
    }

    #[test]
    fn test_reference_keys_distinguish_types() {
        assert_ne!(reference_key(&Bson::from("1")), reference_key(&Bson::Int32(1)));
    }

    fn ids<const N: usize>() -> [ObjectId; N] {
        std::array::from_fn(|_| ObjectId::new())
    }

    #[test]
    fn test_collect_references_deduplicates() {
        let [a, b] = ids();
        let mut documents = vec![
            doc! { "author": a, "comments": [b, a, Bson::Null] },
            doc! { "author": a, "comments": [] },
            doc! { "author": Bson::Null },
        ];
        assert_eq!(
            collect_references(&mut documents, &segments("author")),
            vec![Bson::ObjectId(a)]
        );
        assert_eq!(
            collect_references(&mut documents, &segments("comments")),
            vec![Bson::ObjectId(b), Bson::ObjectId(a)]
        );
    }

    #[test]
    fn test_single_reference_becomes_document_or_null() {
        let [found, missing] = ids();
        let mut documents = vec![
            doc! { "title": "one", "author": found },
            doc! { "title": "two", "author": missing },
            doc! { "title": "three", "author": Bson::Null },
        ];
        let fetched = vec![doc! { "_id": found, "name": "Ada" }];
        substitute(&mut documents, &segments("author"), fetched, false);

        assert_eq!(documents[0], doc! { "title": "one", "author": { "_id": found, "name": "Ada" } });
        assert_eq!(documents[1], doc! { "title": "two", "author": Bson::Null });
        assert_eq!(documents[2], doc! { "title": "three", "author": Bson::Null });
    }

    #[test]
    fn test_filtered_out_reference_becomes_null() {
        let [hidden] = ids();
        let mut documents = vec![doc! { "author": hidden }];
        substitute(&mut documents, &segments("author"), Vec::new(), false);
        assert_eq!(documents[0], doc! { "author": Bson::Null });
    }

    #[test]
    fn test_list_keeps_stored_order_and_drops_missing() {
        let [a, b, c, gone] = ids();
        let mut documents = vec![doc! { "comments": [c, gone, a, b] }];
        let fetched = vec![
            doc! { "_id": a, "text": "a" },
            doc! { "_id": b, "text": "b" },
            doc! { "_id": c, "text": "c" },
        ];
        substitute(&mut documents, &segments("comments"), fetched, false);
        assert_eq!(
            documents[0],
            doc! { "comments": [
                { "_id": c, "text": "c" },
                { "_id": a, "text": "a" },
                { "_id": b, "text": "b" },
            ] }
        );
    }

    #[test]
    fn test_list_follows_fetched_order_when_sorted() {
        let [a, b, c] = ids();
        let mut documents = vec![doc! { "comments": [a, b, c] }];
        let fetched = vec![
            doc! { "_id": c, "score": 1 },
            doc! { "_id": a, "score": 2 },
        ];
        substitute(&mut documents, &segments("comments"), fetched, true);
        assert_eq!(
            documents[0],
            doc! { "comments": [{ "_id": c, "score": 1 }, { "_id": a, "score": 2 }] }
        );
    }

    #[test]
    fn test_repeated_references_survive_both_orders() {
        let [a, b] = ids();
        let fetched = || vec![doc! { "_id": b, "n": 1 }, doc! { "_id": a, "n": 2 }];

        let mut unsorted = vec![doc! { "tags": [a, b, a] }];
        substitute(&mut unsorted, &segments("tags"), fetched(), false);
        assert_eq!(
            unsorted[0],
            doc! { "tags": [{ "_id": a, "n": 2 }, { "_id": b, "n": 1 }, { "_id": a, "n": 2 }] }
        );

        let mut sorted = vec![doc! { "tags": [a, b, a] }];
        substitute(&mut sorted, &segments("tags"), fetched(), true);
        assert_eq!(
            sorted[0],
            doc! { "tags": [{ "_id": b, "n": 1 }, { "_id": a, "n": 2 }, { "_id": a, "n": 2 }] }
        );
    }

    #[test]
    fn test_nested_references_inside_arrays() {
        let [ada] = ids();
        let mut documents = vec![doc! { "comments": [{ "text": "hi", "author": ada }] }];
        substitute(
            &mut documents,
            &segments("comments.author"),
            vec![doc! { "_id": ada, "name": "Ada" }],
            false,
        );
        assert_eq!(
            documents[0],
            doc! { "comments": [{ "text": "hi", "author": { "_id": ada, "name": "Ada" } }] }
        );
    }
}
