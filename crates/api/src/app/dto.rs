//! Request/response DTOs and JSON mapping helpers.

use std::collections::BTreeSet;

use serde::Deserialize;
use serde_json::{Value as JsonValue, json};

use scholarhub_core::DocumentId;
use scholarhub_infra::projections::billing::BillingReadModel;
use scholarhub_infra::projections::submissions::SubmissionReadModel;
use scholarhub_submissions::{AbstractContent, DocumentRef, ResearchField, SubmissionDraft};

/// Uploaded-document handle as sent by the form capture layer.
#[derive(Debug, Deserialize)]
pub struct DocumentRefRequest {
    pub document_id: DocumentId,
    pub file_name: String,
}

/// Raw draft fields from the submission (or resubmission) form.
#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub institution: String,
    pub field: Option<String>,
    pub year: Option<i32>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    pub abstract_text: Option<String>,
    pub document: Option<DocumentRefRequest>,
}

impl SubmitRequest {
    /// Map the raw form fields into a draft.
    ///
    /// An unknown field string is reported here; presence validation belongs
    /// to the domain (`SubmissionDraft::validate`).
    pub fn into_draft(self) -> Result<SubmissionDraft, String> {
        let field = match self.field.as_deref() {
            None | Some("") => None,
            Some(raw) => Some(raw.parse::<ResearchField>().map_err(|e| e.to_string())?),
        };

        Ok(SubmissionDraft {
            full_name: self.full_name,
            email: self.email,
            country: self.country,
            institution: self.institution,
            field,
            year: self.year,
            title: self.title,
            keywords: self.keywords.into_iter().collect::<BTreeSet<_>>(),
            abstract_text: self.abstract_text,
            document: self.document.map(|d| DocumentRef {
                document_id: d.document_id,
                file_name: d.file_name,
            }),
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct TransitionRequest {
    pub target: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateInvoiceRequest {
    pub usd_cents: Option<u64>,
    pub mwk: Option<u64>,
    /// RFC3339; defaults to the configured fee schedule.
    pub due_date: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RecordAttemptRequest {
    pub method: String,
}

#[derive(Debug, Deserialize)]
pub struct SettleRequest {
    pub outcome: String,
}

#[derive(Debug, Deserialize)]
pub struct ExpireOverdueRequest {
    /// RFC3339; defaults to the server clock.
    pub now: Option<String>,
}

pub fn submission_to_json(rm: SubmissionReadModel) -> JsonValue {
    let content = match &rm.content {
        AbstractContent::Inline(text) => json!({ "kind": "inline", "text": text }),
        AbstractContent::Document(doc) => json!({
            "kind": "document",
            "document_id": doc.document_id.to_string(),
            "file_name": doc.file_name,
        }),
    };

    json!({
        "id": rm.submission_id.to_string(),
        "title": rm.title,
        "author": {
            "full_name": rm.author.full_name,
            "email": rm.author.email,
            "country": rm.author.country,
            "institution": rm.author.institution,
        },
        "field": rm.field.as_str(),
        "year": rm.year,
        "keywords": rm.keywords.iter().collect::<Vec<_>>(),
        "content": content,
        "status": rm.status.as_str(),
        "payment_status": payment_status_str(rm.payment_status),
        "resubmission_of": rm.resubmission_of.map(|id| id.to_string()),
        "resubmitted_to": rm.resubmitted_to.map(|id| id.to_string()),
        "submitted_at": rm.submitted_at.to_rfc3339(),
        "updated_at": rm.updated_at.to_rfc3339(),
    })
}

pub fn billing_to_json(rm: BillingReadModel) -> JsonValue {
    json!({
        "submission_id": rm.submission_id.to_string(),
        "invoice": {
            "id": rm.invoice.invoice_id.to_string(),
            "amount": {
                "usd_cents": rm.invoice.amount.usd_cents,
                "mwk": rm.invoice.amount.mwk,
            },
            "due_date": rm.invoice.due_date.to_rfc3339(),
            "status": invoice_status_str(rm.invoice.status),
            "attempts": rm.invoice.attempts.iter().map(|a| json!({
                "id": a.attempt_id.to_string(),
                "method": a.method.as_str(),
                "outcome": attempt_outcome_str(a.outcome),
                "requested_at": a.requested_at.to_rfc3339(),
                "settled_at": a.settled_at.map(|t| t.to_rfc3339()),
            })).collect::<Vec<_>>(),
        },
        "past_invoice_ids": rm.past_invoice_ids.iter().map(|id| id.to_string()).collect::<Vec<_>>(),
        "updated_at": rm.updated_at.to_rfc3339(),
    })
}

pub fn payment_status_str(status: scholarhub_submissions::PaymentStatus) -> &'static str {
    match status {
        scholarhub_submissions::PaymentStatus::NotApplicable => "not_applicable",
        scholarhub_submissions::PaymentStatus::Pending => "pending",
        scholarhub_submissions::PaymentStatus::Paid => "paid",
    }
}

pub fn invoice_status_str(status: scholarhub_billing::InvoiceStatus) -> &'static str {
    match status {
        scholarhub_billing::InvoiceStatus::Open => "open",
        scholarhub_billing::InvoiceStatus::Paid => "paid",
        scholarhub_billing::InvoiceStatus::Expired => "expired",
    }
}

pub fn attempt_outcome_str(outcome: scholarhub_billing::AttemptOutcome) -> &'static str {
    match outcome {
        scholarhub_billing::AttemptOutcome::Pending => "pending",
        scholarhub_billing::AttemptOutcome::Succeeded => "succeeded",
        scholarhub_billing::AttemptOutcome::Failed => "failed",
    }
}
