use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use serde::Deserialize;

use crate::app::services::AppServices;
use crate::app::dto;

pub fn router() -> Router {
    Router::new()
        .route("/payable", get(payable))
        .route("/resubmittable", get(resubmittable))
}

#[derive(Debug, Deserialize)]
pub struct AuthorQuery {
    pub author: Option<String>,
}

pub async fn payable(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<AuthorQuery>,
) -> axum::response::Response {
    let items = services
        .list_payable(query.author.as_deref())
        .into_iter()
        .map(|(submission, billing)| {
            serde_json::json!({
                "submission": dto::submission_to_json(submission),
                "billing": dto::billing_to_json(billing),
            })
        })
        .collect::<Vec<_>>();

    (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
}

pub async fn resubmittable(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<AuthorQuery>,
) -> axum::response::Response {
    let items = services
        .list_resubmittable(query.author.as_deref())
        .into_iter()
        .map(dto::submission_to_json)
        .collect::<Vec<_>>();

    (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
}
