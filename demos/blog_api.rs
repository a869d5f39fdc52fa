//! Blog API with posts, users and comments.
//!
//! ```bash
//! MONGODB_URI=mongodb://localhost:27017 cargo run --example blog_api
//! ```
//!
//! Then try:
//!
//! ```bash
//! curl -s -X POST localhost:3000/users -H 'Content-Type: application/json' \
//!   -d '{"name": "Ada", "email": "ada@example.com"}'
//! curl -s -X POST localhost:3000/posts -H 'Content-Type: application/json' \
//!   -d '{"title": "Hello", "author": "<user id>"}'
//! curl -s -g 'localhost:3000/posts?populate=author&filter[title][$like]=hel&pick=title,author.name'
//! ```

use axum::Router;
use mongocrate::validation::validators::{validate_length, validate_required};
use mongocrate::{
    CRUDResource, FieldKind, ReferenceDef, Validatable, ValidationErrors, crud_router,
};
use mongodb::Client;
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

struct Post;

#[derive(Serialize, Deserialize)]
struct NewPost {
    title: String,
    #[serde(default)]
    body: String,
    #[serde(default)]
    published: bool,
    author: ObjectId,
    #[serde(default)]
    comments: Vec<ObjectId>,
}

impl Validatable for NewPost {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        errors.check(validate_length("title", &self.title, Some(1), Some(200)));
        errors.result()
    }
}

#[derive(Serialize, Deserialize)]
struct PostChanges {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    published: Option<bool>,
}

impl Validatable for PostChanges {}

impl CRUDResource for Post {
    type CreateModel = NewPost;
    type UpdateModel = PostChanges;

    const COLLECTION_NAME: &'static str = "posts";
    const RESOURCE_NAME_SINGULAR: &'static str = "post";
    const RESOURCE_NAME_PLURAL: &'static str = "posts";

    fn fields() -> Vec<(&'static str, FieldKind)> {
        vec![
            ("title", FieldKind::String),
            ("published", FieldKind::Boolean),
            ("author", FieldKind::ObjectId),
        ]
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

struct User;

#[derive(Serialize, Deserialize)]
struct NewUser {
    name: String,
    email: String,
}

impl Validatable for NewUser {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        errors.check(validate_required("name", &self.name));
        if !self.email.contains('@') {
            errors.add(mongocrate::ValidationError::new("email", "Must be an email address"));
        }
        errors.result()
    }
}

#[derive(Serialize, Deserialize)]
struct UserChanges {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

impl Validatable for UserChanges {}

impl CRUDResource for User {
    type CreateModel = NewUser;
    type UpdateModel = UserChanges;

    const COLLECTION_NAME: &'static str = "users";
    const RESOURCE_NAME_SINGULAR: &'static str = "user";
    const RESOURCE_NAME_PLURAL: &'static str = "users";

    fn filterable_fields() -> Vec<&'static str> {
        vec!["_id", "name", "email"]
    }
}

struct Comment;

#[derive(Serialize, Deserialize)]
struct NewComment {
    text: String,
    author: ObjectId,
    #[serde(default)]
    approved: bool,
}

impl Validatable for NewComment {}

#[derive(Serialize, Deserialize)]
struct CommentChanges {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    approved: Option<bool>,
}

impl Validatable for CommentChanges {}

impl CRUDResource for Comment {
    type CreateModel = NewComment;
    type UpdateModel = CommentChanges;

    const COLLECTION_NAME: &'static str = "comments";
    const RESOURCE_NAME_SINGULAR: &'static str = "comment";
    const RESOURCE_NAME_PLURAL: &'static str = "comments";

    fn references() -> Vec<ReferenceDef> {
        vec![ReferenceDef::one("author", "users")]
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(tracing::Level::DEBUG)
        .compact()
        .init();

    let uri = std::env::var("MONGODB_URI").unwrap_or_else(|_| "mongodb://localhost:27017".into());
    let db = Client::with_uri_str(&uri).await?.database("mongocrate_blog");

    let app = Router::new()
        .nest("/posts", crud_router::<Post>(&db))
        .nest("/users", crud_router::<User>(&db))
        .nest("/comments", crud_router::<Comment>(&db));

    let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
    tracing::info!("Blog API listening on http://localhost:3000");
    axum::serve(listener, app).await?;
    Ok(())
}
