use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{self, Bson, Document, doc, oid::ObjectId};
use mongodb::options::{FindOneAndUpdateOptions, FindOneOptions, FindOptions, ReturnDocument};
use mongodb::{Collection, Database};
use serde::{Serialize, de::DeserializeOwned};

use crate::config::QueryConfig;
use crate::errors::ApiError;
use crate::population::populate_documents;
use crate::query::{FieldKind, FieldPath, QuerySpec, ReferenceDef};
use crate::validation::Validatable;

/// Identifiers that look like an ObjectId (24 hex digits) are matched as one,
/// anything else as a plain string `_id`.
#[must_use]
pub fn id_to_bson(id: &str) -> Bson {
    ObjectId::parse_str(id).map_or_else(|_| Bson::String(id.to_string()), Bson::ObjectId)
}

#[must_use]
pub fn id_filter(id: &str) -> Document {
    doc! { "_id": id_to_bson(id) }
}

fn with_filter(base: Document, extra: &Document) -> Document {
    if extra.is_empty() {
        base
    } else {
        doc! { "$and": [base, extra.clone()] }
    }
}

fn as_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// A collection exposed as a REST resource.
///
/// Reads return raw [`Document`]s because populated references change their
/// shape per request. Writes go through the typed `CreateModel` and
/// `UpdateModel`, which are validated before anything reaches the database.
/// Update models should skip `None` fields
/// (`#[serde(skip_serializing_if = "Option::is_none")]`) so that partial
/// updates only `$set` what was sent.
#[async_trait]
pub trait CRUDResource: Sized + Send + Sync + 'static {
    type CreateModel: DeserializeOwned + Serialize + Validatable + Send + Sync;
    type UpdateModel: DeserializeOwned + Serialize + Validatable + Send + Sync;

    const COLLECTION_NAME: &'static str;
    const RESOURCE_NAME_SINGULAR: &'static str;
    const RESOURCE_NAME_PLURAL: &'static str;
    const RESOURCE_DESCRIPTION: &'static str = "";

    #[must_use]
    fn collection(db: &Database) -> Collection<Document> {
        db.collection(Self::COLLECTION_NAME)
    }

    /// Declared field kinds used to coerce query values. Undeclared fields
    /// are guessed from the text.
    #[must_use]
    fn fields() -> Vec<(&'static str, FieldKind)> {
        vec![]
    }

    /// Fields usable in `match`, `filter`, `search` and `distinct`.
    /// Empty allows any field.
    #[must_use]
    fn filterable_fields() -> Vec<&'static str> {
        vec![]
    }

    /// Empty allows any field.
    #[must_use]
    fn sortable_fields() -> Vec<&'static str> {
        vec![]
    }

    /// Fields scanned by a plain `search=text`.
    #[must_use]
    fn searchable_fields() -> Vec<&'static str> {
        vec![]
    }

    #[must_use]
    fn references() -> Vec<ReferenceDef> {
        vec![]
    }

    #[must_use]
    fn query_config() -> QueryConfig {
        QueryConfig::default()
    }

    async fn get_all(db: &Database, spec: &QuerySpec) -> Result<Vec<Document>, ApiError> {
        tracing::debug!(
            collection = Self::COLLECTION_NAME,
            filter = %spec.filter,
            skip = spec.skip,
            limit = spec.limit,
            "Listing documents"
        );
        let mut options = FindOptions::default();
        options.sort = Some(spec.sort.clone());
        options.projection.clone_from(&spec.projection);
        options.skip = Some(spec.skip);
        options.limit = Some(as_i64(spec.limit));

        let mut documents: Vec<Document> = Self::collection(db)
            .find(spec.filter.clone())
            .with_options(options)
            .await?
            .try_collect()
            .await?;
        populate_documents(db, &mut documents, &spec.populate).await?;
        Ok(documents)
    }

    async fn total_count(db: &Database, filter: &Document) -> Result<u64, ApiError> {
        Ok(Self::collection(db).count_documents(filter.clone()).await?)
    }

    /// Fetch one document; the query's filter, projection and populate
    /// still apply.
    async fn get_one(db: &Database, id: &str, spec: &QuerySpec) -> Result<Document, ApiError> {
        tracing::debug!(collection = Self::COLLECTION_NAME, id, "Fetching document");
        let mut options = FindOneOptions::default();
        options.projection.clone_from(&spec.projection);

        let document = Self::collection(db)
            .find_one(with_filter(id_filter(id), &spec.filter))
            .with_options(options)
            .await?
            .ok_or_else(|| ApiError::not_found(Self::RESOURCE_NAME_SINGULAR, Some(id.to_string())))?;

        let mut documents = [document];
        populate_documents(db, &mut documents, &spec.populate).await?;
        let [document] = documents;
        Ok(document)
    }

    async fn create(db: &Database, create_model: Self::CreateModel) -> Result<Document, ApiError> {
        create_model.validate()?;
        let document = bson::to_document(&create_model)?;
        let collection = Self::collection(db);

        let inserted = collection.insert_one(document).await?;
        tracing::debug!(
            collection = Self::COLLECTION_NAME,
            id = %inserted.inserted_id,
            "Created document"
        );
        collection
            .find_one(doc! { "_id": inserted.inserted_id })
            .await?
            .ok_or_else(|| ApiError::internal("Created document could not be read back", None))
    }

    async fn update(
        db: &Database,
        id: &str,
        update_model: Self::UpdateModel,
    ) -> Result<Document, ApiError> {
        update_model.validate()?;
        let mut changes = bson::to_document(&update_model)?;
        changes.remove("_id");
        if changes.is_empty() {
            return Err(ApiError::bad_request("No fields to update"));
        }

        let mut options = FindOneAndUpdateOptions::default();
        options.return_document = Some(ReturnDocument::After);

        tracing::debug!(collection = Self::COLLECTION_NAME, id, "Updating document");
        Self::collection(db)
            .find_one_and_update(id_filter(id), doc! { "$set": changes })
            .with_options(options)
            .await?
            .ok_or_else(|| ApiError::not_found(Self::RESOURCE_NAME_SINGULAR, Some(id.to_string())))
    }

    async fn delete(db: &Database, id: &str) -> Result<String, ApiError> {
        let result = Self::collection(db).delete_one(id_filter(id)).await?;
        if result.deleted_count == 0 {
            return Err(ApiError::not_found(
                Self::RESOURCE_NAME_SINGULAR,
                Some(id.to_string()),
            ));
        }
        tracing::debug!(collection = Self::COLLECTION_NAME, id, "Deleted document");
        Ok(id.to_string())
    }

    async fn delete_many(db: &Database, ids: Vec<String>) -> Result<Vec<String>, ApiError> {
        let values: Vec<Bson> = ids.iter().map(|id| id_to_bson(id)).collect();
        let result = Self::collection(db)
            .delete_many(doc! { "_id": { "$in": values } })
            .await?;
        tracing::debug!(
            collection = Self::COLLECTION_NAME,
            requested = ids.len(),
            deleted = result.deleted_count,
            "Deleted documents"
        );
        Ok(ids)
    }

    /// Distinct values of one field among the documents matching `filter`.
    async fn distinct(
        db: &Database,
        field: &FieldPath,
        filter: &Document,
    ) -> Result<Vec<Bson>, ApiError> {
        Ok(Self::collection(db)
            .distinct(field.to_string(), filter.clone())
            .await?)
    }

    /// Random sample of `size` documents matching the query's filter.
    async fn random(db: &Database, spec: &QuerySpec, size: u64) -> Result<Vec<Document>, ApiError> {
        let mut pipeline = vec![
            doc! { "$match": spec.filter.clone() },
            doc! { "$sample": { "size": as_i64(size) } },
        ];
        if let Some(projection) = &spec.projection {
            pipeline.push(doc! { "$project": projection.clone() });
        }

        let mut documents: Vec<Document> = Self::collection(db)
            .aggregate(pipeline)
            .await?
            .try_collect()
            .await?;
        populate_documents(db, &mut documents, &spec.populate).await?;
        Ok(documents)
    }
}
