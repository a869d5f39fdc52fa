#![allow(dead_code)]

use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response};
use mongocrate::validation::validators::{validate_length, validate_range};
use mongocrate::{
    CRUDResource, FieldKind, ReferenceDef, Validatable, ValidationErrors, crud_router,
};
use mongodb::bson::oid::ObjectId;
use mongodb::{Client, Database};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower::ServiceExt;

pub struct Post;

#[derive(Debug, Serialize, Deserialize)]
pub struct NewPost {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default)]
    pub views: i64,
    #[serde(default)]
    pub published: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<ObjectId>,
    #[serde(default)]
    pub comments: Vec<ObjectId>,
}

impl Validatable for NewPost {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        errors.check(validate_length("title", &self.title, Some(1), Some(200)));
        errors.check(validate_range("views", self.views, Some(0), None));
        errors.result()
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct PostChanges {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub views: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published: Option<bool>,
}

impl Validatable for PostChanges {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if let Some(title) = &self.title {
            errors.check(validate_length("title", title, Some(1), Some(200)));
        }
        if let Some(views) = self.views {
            errors.check(validate_range("views", views, Some(0), None));
        }
        errors.result()
    }
}

impl CRUDResource for Post {
    type CreateModel = NewPost;
    type UpdateModel = PostChanges;

    const COLLECTION_NAME: &'static str = "posts";
    const RESOURCE_NAME_SINGULAR: &'static str = "post";
    const RESOURCE_NAME_PLURAL: &'static str = "posts";
    const RESOURCE_DESCRIPTION: &'static str = "Blog posts";

    fn fields() -> Vec<(&'static str, FieldKind)> {
        vec![
            ("title", FieldKind::String),
            ("body", FieldKind::String),
            ("views", FieldKind::Integer),
            ("published", FieldKind::Boolean),
            ("author", FieldKind::ObjectId),
            ("author.name", FieldKind::String),
            ("comments.approved", FieldKind::Boolean),
        ]
    }

    fn filterable_fields() -> Vec<&'static str> {
        vec!["_id", "title", "body", "views", "published", "author", "comments"]
    }

    fn sortable_fields() -> Vec<&'static str> {
        vec!["_id", "title", "views", "comments"]
    }

    fn searchable_fields() -> Vec<&'static str> {
        vec!["title", "body"]
    }

    fn references() -> Vec<ReferenceDef> {
        vec![
            ReferenceDef::one("author", "users"),
            ReferenceDef::many("comments", "comments"),
            ReferenceDef::one("comments.author", "users"),
        ]
    }
}

pub struct User;

#[derive(Debug, Serialize, Deserialize)]
pub struct NewUser {
    pub name: String,
    pub email: String,
}

impl Validatable for NewUser {}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserChanges {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Validatable for UserChanges {}

impl CRUDResource for User {
    type CreateModel = NewUser;
    type UpdateModel = UserChanges;

    const COLLECTION_NAME: &'static str = "users";
    const RESOURCE_NAME_SINGULAR: &'static str = "user";
    const RESOURCE_NAME_PLURAL: &'static str = "users";
}

/// Database handle that never connects: requests rejected before any
/// database access can run against it.
pub async fn offline_database() -> Database {
    Client::with_uri_str("mongodb://localhost:27017")
        .await
        .expect("valid connection string")
        .database("mongocrate_offline")
}

/// Fresh database on the server named by `MONGODB_URI`, or `None` when the
/// variable is unset.
pub async fn live_database() -> Option<Database> {
    let uri = std::env::var("MONGODB_URI").ok()?;
    let client = Client::with_uri_str(&uri)
        .await
        .expect("MONGODB_URI must be a valid connection string");
    Some(client.database(&format!("mongocrate_test_{}", ObjectId::new())))
}

pub fn setup_app(db: &Database) -> Router {
    let api = Router::new()
        .nest("/posts", crud_router::<Post>(db))
        .nest("/users", crud_router::<User>(db));
    Router::new().nest("/api/v1", api)
}

pub async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> Response<Body> {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_string(&body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    app.clone().oneshot(request).await.unwrap()
}

pub async fn json_body(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
