use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::Utc;

use scholarhub_billing::{AttemptId, FeeAmount, InvoiceId, PaymentMethod, SettlementOutcome};
use scholarhub_core::AggregateId;
use scholarhub_submissions::SubmissionId;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

/// Invoice operations addressed by submission (merged under `/submissions`).
pub fn invoice_router() -> Router {
    Router::new().route("/:id/invoice", post(create_invoice).get(get_invoice))
}

/// Invoice-addressed operations (mounted under `/invoices`).
pub fn router() -> Router {
    Router::new()
        .route("/:id/attempts", post(record_attempt))
        .route("/expire-overdue", post(expire_overdue))
}

/// Gateway callback surface (mounted under `/attempts`).
pub fn attempts_router() -> Router {
    Router::new().route("/:id/settle", post(settle))
}

pub async fn create_invoice(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(body): Json<dto::CreateInvoiceRequest>,
) -> axum::response::Response {
    let Ok(agg) = id.parse::<AggregateId>() else {
        return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid submission id");
    };

    let amount = match (body.usd_cents, body.mwk) {
        (None, None) => None,
        (usd_cents, mwk) => Some(FeeAmount::new(
            usd_cents.unwrap_or_default(),
            mwk.unwrap_or_default(),
        )),
    };

    let due_date = match body.due_date.as_deref() {
        None => None,
        Some(raw) => match chrono::DateTime::parse_from_rfc3339(raw) {
            Ok(dt) => Some(dt.with_timezone(&Utc)),
            Err(_) => {
                return errors::json_error(
                    StatusCode::BAD_REQUEST,
                    "invalid_due_date",
                    "due_date must be RFC3339",
                );
            }
        },
    };

    match services.create_invoice(SubmissionId::new(agg), amount, due_date) {
        Ok(rm) => (StatusCode::CREATED, Json(dto::billing_to_json(rm))).into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn get_invoice(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let Ok(agg) = id.parse::<AggregateId>() else {
        return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid submission id");
    };

    match services.billing(SubmissionId::new(agg)) {
        Some(rm) => (StatusCode::OK, Json(dto::billing_to_json(rm))).into_response(),
        None => errors::json_error(StatusCode::NOT_FOUND, "not_found", "no invoice for submission"),
    }
}

pub async fn record_attempt(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(body): Json<dto::RecordAttemptRequest>,
) -> axum::response::Response {
    let Ok(agg) = id.parse::<AggregateId>() else {
        return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid invoice id");
    };
    let method = match body.method.parse::<PaymentMethod>() {
        Ok(method) => method,
        Err(e) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "invalid_method", e.to_string());
        }
    };

    match services.record_payment_attempt(InvoiceId::new(agg), method) {
        Ok(attempt_id) => (
            StatusCode::CREATED,
            Json(serde_json::json!({ "attempt_id": attempt_id.to_string() })),
        )
            .into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn settle(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(body): Json<dto::SettleRequest>,
) -> axum::response::Response {
    let Ok(agg) = id.parse::<AggregateId>() else {
        return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid attempt id");
    };
    let outcome = match body.outcome.as_str() {
        "succeeded" => SettlementOutcome::Succeeded,
        "failed" => SettlementOutcome::Failed,
        other => {
            return errors::json_error(
                StatusCode::BAD_REQUEST,
                "invalid_outcome",
                format!("outcome must be succeeded or failed, got {other}"),
            );
        }
    };

    match services.settle_payment(AttemptId::new(agg), outcome) {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({ "attempt_id": agg.to_string() })),
        )
            .into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn expire_overdue(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::ExpireOverdueRequest>,
) -> axum::response::Response {
    let now = match body.now.as_deref() {
        None => Utc::now(),
        Some(raw) => match chrono::DateTime::parse_from_rfc3339(raw) {
            Ok(dt) => dt.with_timezone(&Utc),
            Err(_) => {
                return errors::json_error(
                    StatusCode::BAD_REQUEST,
                    "invalid_now",
                    "now must be RFC3339",
                );
            }
        },
    };

    match services.expire_overdue(now) {
        Ok(expired) => {
            (StatusCode::OK, Json(serde_json::json!({ "expired": expired }))).into_response()
        }
        Err(e) => errors::dispatch_error_to_response(e),
    }
}
