use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde::Deserialize;

use scholarhub_core::AggregateId;
use scholarhub_submissions::{SubmissionId, SubmissionStatus};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", post(submit).get(list_submissions))
        .route("/:id", get(get_submission))
        .route("/:id/transition", post(transition))
        .route("/:id/resubmit", post(resubmit))
}

pub async fn submit(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::SubmitRequest>,
) -> axum::response::Response {
    let draft = match body.into_draft() {
        Ok(draft) => draft,
        Err(msg) => return errors::json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
    };

    let id = match services.submit(draft) {
        Ok(id) => id,
        Err(e) => return errors::dispatch_error_to_response(e),
    };

    (
        StatusCode::CREATED,
        Json(serde_json::json!({ "id": id.to_string() })),
    )
        .into_response()
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
}

pub async fn list_submissions(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<ListQuery>,
) -> axum::response::Response {
    let status = match query.status.as_deref() {
        None => None,
        Some(raw) => match raw.parse::<SubmissionStatus>() {
            Ok(status) => Some(status),
            Err(e) => {
                return errors::json_error(StatusCode::BAD_REQUEST, "invalid_status", e.to_string());
            }
        },
    };

    let items = services
        .list_submissions(status)
        .into_iter()
        .map(dto::submission_to_json)
        .collect::<Vec<_>>();

    (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
}

pub async fn get_submission(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let Ok(agg) = id.parse::<AggregateId>() else {
        return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid submission id");
    };

    match services.submission(SubmissionId::new(agg)) {
        Some(rm) => (StatusCode::OK, Json(dto::submission_to_json(rm))).into_response(),
        None => errors::json_error(StatusCode::NOT_FOUND, "not_found", "submission not found"),
    }
}

pub async fn transition(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(body): Json<dto::TransitionRequest>,
) -> axum::response::Response {
    let Ok(agg) = id.parse::<AggregateId>() else {
        return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid submission id");
    };
    let target = match body.target.parse::<SubmissionStatus>() {
        Ok(target) => target,
        Err(e) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "invalid_status", e.to_string());
        }
    };

    let submission_id = SubmissionId::new(agg);
    if let Err(e) = services.transition(submission_id, target) {
        return errors::dispatch_error_to_response(e);
    }

    (
        StatusCode::OK,
        Json(serde_json::json!({
            "id": submission_id.to_string(),
            "status": target.as_str(),
        })),
    )
        .into_response()
}

pub async fn resubmit(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(body): Json<dto::SubmitRequest>,
) -> axum::response::Response {
    let Ok(agg) = id.parse::<AggregateId>() else {
        return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid submission id");
    };
    let draft = match body.into_draft() {
        Ok(draft) => draft,
        Err(msg) => return errors::json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
    };

    let original = SubmissionId::new(agg);
    let successor = match services.resubmit(original, draft) {
        Ok(successor) => successor,
        Err(e) => return errors::dispatch_error_to_response(e),
    };

    (
        StatusCode::CREATED,
        Json(serde_json::json!({
            "id": successor.to_string(),
            "resubmission_of": original.to_string(),
        })),
    )
        .into_response()
}
