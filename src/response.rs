//! BSON to JSON rendering and list responses.

use axum::{
    Json,
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use mongodb::bson::{Bson, Document};
use serde_json::{Map, Value};

use crate::pagination::calculate_content_range;

/// Render a document as plain JSON: ObjectIds become hex strings, dates RFC
/// 3339 strings and everything else its relaxed extended JSON form.
#[must_use]
pub fn render_document(document: Document) -> Value {
    Value::Object(
        document
            .into_iter()
            .map(|(key, value)| (key, render_bson(value)))
            .collect::<Map<String, Value>>(),
    )
}

#[must_use]
pub fn render_bson(value: Bson) -> Value {
    match value {
        Bson::ObjectId(id) => Value::String(id.to_hex()),
        Bson::DateTime(date) => date
            .try_to_rfc3339_string()
            .map_or_else(|_| Value::from(date.timestamp_millis()), Value::String),
        Bson::Document(document) => render_document(document),
        Bson::Array(items) => Value::Array(items.into_iter().map(render_bson).collect()),
        Bson::Int32(number) => Value::from(number),
        Bson::Int64(number) => Value::from(number),
        Bson::Double(number) => Value::from(number),
        other => other.into_relaxed_extjson(),
    }
}

/// A page of a list endpoint: the items as a JSON array plus the
/// `Content-Range` and `X-Total-Count` headers.
#[derive(Debug)]
pub struct Paginated {
    pub items: Vec<Value>,
    pub offset: u64,
    pub limit: u64,
    pub total: u64,
    pub resource_name: &'static str,
}

impl Paginated {
    #[must_use]
    pub fn headers(&self) -> HeaderMap {
        calculate_content_range(self.offset, self.limit, self.total, self.resource_name)
    }
}

impl IntoResponse for Paginated {
    fn into_response(self) -> Response {
        let headers = self.headers();
        (headers, Json(self.items)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use mongodb::bson::{DateTime, doc, oid::ObjectId};
    use serde_json::json;

    #[test]
    fn test_render_plain_values() {
        let rendered = render_document(doc! {
            "name": "Ada",
            "age": 36,
            "score": 1.5,
            "active": true,
            "nothing": Bson::Null,
            "tags": ["a", "b"],
        });
        assert_eq!(
            rendered,
            json!({
                "name": "Ada",
                "age": 36,
                "score": 1.5,
                "active": true,
                "nothing": null,
                "tags": ["a", "b"],
            })
        );
    }

    #[test]
    fn test_render_object_ids_and_dates() {
        let id = ObjectId::new();
        let rendered = render_document(doc! {
            "_id": id,
            "author": { "_id": id },
            "at": DateTime::from_millis(0),
        });
        assert_eq!(rendered["_id"], json!(id.to_hex()));
        assert_eq!(rendered["author"]["_id"], json!(id.to_hex()));
        assert_eq!(rendered["at"], json!("1970-01-01T00:00:00Z"));
    }

    #[test]
    fn test_paginated_response_headers() {
        let response = Paginated {
            items: vec![json!({ "a": 1 })],
            offset: 0,
            limit: 10,
            total: 1,
            resource_name: "things",
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("Content-Range").unwrap(),
            "things 0-0/1"
        );
        assert_eq!(response.headers().get("X-Total-Count").unwrap(), "1");
    }
}
