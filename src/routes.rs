use axum::{
    Json, Router,
    extract::{Path, RawQuery, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get},
};
use mongodb::Database;
use mongodb::bson::Document;
use serde_json::Value;

use crate::errors::ApiError;
use crate::query::{FieldPath, QuerySpec, pick_fields};
use crate::response::{Paginated, render_bson, render_document};
use crate::traits::CRUDResource;

fn render_picked(documents: Vec<Document>, pick: &[FieldPath]) -> Vec<Value> {
    documents
        .into_iter()
        .map(|document| pick_fields(&render_document(document), pick))
        .collect()
}

/// List documents, or their distinct values (`distinct=field`), or a random
/// sample (`random=n`).
pub async fn get_all<T: CRUDResource>(
    State(db): State<Database>,
    RawQuery(query): RawQuery,
) -> Result<Response, ApiError> {
    let spec = QuerySpec::for_resource::<T>(query.as_deref())?;

    if let Some(field) = &spec.distinct {
        let values = T::distinct(&db, field, &spec.filter).await?;
        let values: Vec<Value> = values.into_iter().map(render_bson).collect();
        return Ok(Json(values).into_response());
    }

    if let Some(size) = spec.random {
        let documents = T::random(&db, &spec, size).await?;
        return Ok(Json(render_picked(documents, &spec.pick)).into_response());
    }

    let documents = T::get_all(&db, &spec).await?;
    let total = T::total_count(&db, &spec.filter).await?;
    Ok(Paginated {
        items: render_picked(documents, &spec.pick),
        offset: spec.skip,
        limit: spec.limit,
        total,
        resource_name: T::RESOURCE_NAME_PLURAL,
    }
    .into_response())
}

/// Fetch one document; `populate`, `pick` and filters apply.
pub async fn get_one<T: CRUDResource>(
    State(db): State<Database>,
    Path(id): Path<String>,
    RawQuery(query): RawQuery,
) -> Result<Json<Value>, ApiError> {
    let spec = QuerySpec::for_resource::<T>(query.as_deref())?;
    let document = T::get_one(&db, &id, &spec).await?;
    Ok(Json(pick_fields(&render_document(document), &spec.pick)))
}

pub async fn create_one<T: CRUDResource>(
    State(db): State<Database>,
    Json(payload): Json<T::CreateModel>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let document = T::create(&db, payload).await?;
    Ok((StatusCode::CREATED, Json(render_document(document))))
}

pub async fn update_one<T: CRUDResource>(
    State(db): State<Database>,
    Path(id): Path<String>,
    Json(payload): Json<T::UpdateModel>,
) -> Result<Json<Value>, ApiError> {
    let document = T::update(&db, &id, payload).await?;
    Ok(Json(render_document(document)))
}

pub async fn delete_one<T: CRUDResource>(
    State(db): State<Database>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    T::delete(&db, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Delete by a JSON list of ids; responds with the requested ids.
pub async fn delete_many<T: CRUDResource>(
    State(db): State<Database>,
    Json(ids): Json<Vec<String>>,
) -> Result<Json<Vec<String>>, ApiError> {
    if ids.is_empty() {
        return Err(ApiError::bad_request("No ids given"));
    }
    Ok(Json(T::delete_many(&db, ids).await?))
}

/// Router with every CRUD endpoint of `T`:
///
/// | Method           | Path     | Handler          |
/// |------------------|----------|------------------|
/// | `GET`            | `/`      | [`get_all`]      |
/// | `POST`           | `/`      | [`create_one`]   |
/// | `DELETE`         | `/batch` | [`delete_many`]  |
/// | `GET`            | `/{id}`  | [`get_one`]      |
/// | `PUT` / `PATCH`  | `/{id}`  | [`update_one`]   |
/// | `DELETE`         | `/{id}`  | [`delete_one`]   |
///
/// ```rust,ignore
/// let app = Router::new().nest("/posts", crud_router::<Post>(&db));
/// ```
pub fn crud_router<T: CRUDResource>(db: &Database) -> Router {
    Router::new()
        .route("/", get(get_all::<T>).post(create_one::<T>))
        .route("/batch", delete(delete_many::<T>))
        .route(
            "/{id}",
            get(get_one::<T>)
                .put(update_one::<T>)
                .patch(update_one::<T>)
                .delete(delete_one::<T>),
        )
        .with_state(db.clone())
}
