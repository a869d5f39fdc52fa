//! # mongocrate
//!
//! Generic REST CRUD endpoints for MongoDB collections on Axum, driven by a
//! query string language for filtering, searching, sorting, pagination,
//! field selection and population of references.
//!
//! ```rust,ignore
//! use mongocrate::{CRUDResource, FieldKind, ReferenceDef, Validatable, crud_router};
//!
//! struct Post;
//!
//! #[derive(Serialize, Deserialize)]
//! struct NewPost { title: String, author: ObjectId }
//! impl Validatable for NewPost {}
//!
//! #[async_trait::async_trait]
//! impl CRUDResource for Post {
//!     type CreateModel = NewPost;
//!     type UpdateModel = PostChanges;
//!
//!     const COLLECTION_NAME: &'static str = "posts";
//!     const RESOURCE_NAME_SINGULAR: &'static str = "post";
//!     const RESOURCE_NAME_PLURAL: &'static str = "posts";
//!
//!     fn references() -> Vec<ReferenceDef> {
//!         vec![ReferenceDef::one("author", "users")]
//!     }
//! }
//!
//! let app = Router::new().nest("/posts", crud_router::<Post>(&db));
//! // GET /posts?filter[title][$like]=rust&populate=author&sort=-createdAt&limit=10
//! ```

pub mod config;
pub mod errors;
pub mod models;
pub mod pagination;
pub mod population;
pub mod query;
pub mod response;
pub mod routes;
pub mod traits;
pub mod validation;

pub use config::QueryConfig;
pub use errors::{ApiError, QueryError};
pub use models::{ListQuery, resource_tag};
pub use pagination::calculate_content_range;
pub use population::populate_documents;
pub use query::{FieldKind, FieldPath, PopulateOptions, QuerySchema, QuerySpec, ReferenceDef, pick_fields};
pub use response::{Paginated, render_document};
pub use routes::crud_router;
pub use traits::CRUDResource;
pub use validation::{Validatable, ValidationError, ValidationErrors};
