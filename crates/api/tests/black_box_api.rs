use reqwest::StatusCode;
use serde_json::{Value, json};

use scholarhub_infra::config::AppConfig;

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Build the same router as prod, but bind to an ephemeral port.
        let app = scholarhub_api::app::build_app(AppConfig::default()).await;
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, handle }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn draft_body(title: &str, email: &str) -> Value {
    json!({
        "full_name": "Thandiwe Banda",
        "email": email,
        "country": "Malawi",
        "institution": "University of Malawi",
        "field": "agriculture",
        "year": 2025,
        "title": title,
        "keywords": ["ai", "maize"],
        "abstract_text": "Model-driven irrigation scheduling for smallholder farms.",
    })
}

async fn submit(client: &reqwest::Client, base: &str, title: &str, email: &str) -> String {
    let res = client
        .post(format!("{base}/submissions"))
        .json(&draft_body(title, email))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    res.json::<Value>().await.unwrap()["id"]
        .as_str()
        .unwrap()
        .to_string()
}

async fn transition(client: &reqwest::Client, base: &str, id: &str, target: &str) -> StatusCode {
    client
        .post(format!("{base}/submissions/{id}/transition"))
        .json(&json!({ "target": target }))
        .send()
        .await
        .unwrap()
        .status()
}

#[tokio::test(flavor = "multi_thread")]
async fn health_is_public() {
    let srv = TestServer::spawn().await;
    let res = reqwest::get(format!("{}/health", srv.base_url)).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test(flavor = "multi_thread")]
async fn submission_lifecycle_through_payment() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let base = &srv.base_url;

    let id = submit(&client, base, "AI in Agriculture", "thandiwe@unima.mw").await;

    // Submitted → UnderReview → Accepted.
    assert_eq!(transition(&client, base, &id, "under_review").await, StatusCode::OK);
    assert_eq!(transition(&client, base, &id, "accepted").await, StatusCode::OK);

    // Acceptance opened exactly one invoice.
    let res = client
        .get(format!("{base}/submissions/{id}/invoice"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let billing = res.json::<Value>().await.unwrap();
    assert_eq!(billing["invoice"]["status"], "open");
    let invoice_id = billing["invoice"]["id"].as_str().unwrap().to_string();

    // The submission shows up as payable.
    let res = client
        .get(format!("{base}/dashboard/payable?author=thandiwe@unima.mw"))
        .send()
        .await
        .unwrap();
    let payable = res.json::<Value>().await.unwrap();
    assert_eq!(payable["items"].as_array().unwrap().len(), 1);

    // Record a card attempt and settle it via the callback surface.
    let res = client
        .post(format!("{base}/invoices/{invoice_id}/attempts"))
        .json(&json!({ "method": "card" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let attempt_id = res.json::<Value>().await.unwrap()["attempt_id"]
        .as_str()
        .unwrap()
        .to_string();

    let res = client
        .post(format!("{base}/attempts/{attempt_id}/settle"))
        .json(&json!({ "outcome": "succeeded" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    // Settlement reconciled both sides.
    let submission = client
        .get(format!("{base}/submissions/{id}"))
        .send()
        .await
        .unwrap()
        .json::<Value>()
        .await
        .unwrap();
    assert_eq!(submission["status"], "accepted");
    assert_eq!(submission["payment_status"], "paid");

    let billing = client
        .get(format!("{base}/submissions/{id}/invoice"))
        .send()
        .await
        .unwrap()
        .json::<Value>()
        .await
        .unwrap();
    assert_eq!(billing["invoice"]["status"], "paid");
    assert_eq!(billing["invoice"]["attempts"][0]["outcome"], "succeeded");

    // Settling the same outcome again is a no-op; flipping it conflicts.
    let res = client
        .post(format!("{base}/attempts/{attempt_id}/settle"))
        .json(&json!({ "outcome": "succeeded" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client
        .post(format!("{base}/attempts/{attempt_id}/settle"))
        .json(&json!({ "outcome": "failed" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);

    // Nothing payable remains for this author.
    let payable = client
        .get(format!("{base}/dashboard/payable?author=thandiwe@unima.mw"))
        .send()
        .await
        .unwrap()
        .json::<Value>()
        .await
        .unwrap();
    assert!(payable["items"].as_array().unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn drafts_are_validated_with_field_names() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{}/submissions", srv.base_url))
        .json(&json!({ "country": "Malawi" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let body = res.json::<Value>().await.unwrap();
    assert_eq!(body["error"], "validation_error");
    let message = body["message"].as_str().unwrap();
    for field in ["full_name", "email", "field", "title", "abstract"] {
        assert!(message.contains(field), "expected {field} in: {message}");
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn review_shortcuts_are_rejected() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let base = &srv.base_url;

    let id = submit(&client, base, "Climate Resilience", "kondwani@must.ac.mw").await;

    // Submitted → Published is not in the transition table.
    let res = client
        .post(format!("{base}/submissions/{id}/transition"))
        .json(&json!({ "target": "published" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = res.json::<Value>().await.unwrap();
    assert_eq!(body["error"], "illegal_transition");

    // Neither is UnderReview → Published.
    assert_eq!(transition(&client, base, &id, "under_review").await, StatusCode::OK);
    assert_eq!(
        transition(&client, base, &id, "published").await,
        StatusCode::UNPROCESSABLE_ENTITY
    );

    // Unknown ids are distinguished from illegal transitions.
    let missing = uuid::Uuid::now_v7();
    let res = client
        .post(format!("{base}/submissions/{missing}/transition"))
        .json(&json!({ "target": "under_review" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test(flavor = "multi_thread")]
async fn rejected_submissions_resubmit_once() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let base = &srv.base_url;

    let id = submit(&client, base, "Public Health Access", "chikondi@kuhes.ac.mw").await;
    assert_eq!(transition(&client, base, &id, "under_review").await, StatusCode::OK);
    assert_eq!(transition(&client, base, &id, "rejected").await, StatusCode::OK);

    let resubmittable = client
        .get(format!(
            "{base}/dashboard/resubmittable?author=chikondi@kuhes.ac.mw"
        ))
        .send()
        .await
        .unwrap()
        .json::<Value>()
        .await
        .unwrap();
    assert_eq!(resubmittable["items"].as_array().unwrap().len(), 1);

    let res = client
        .post(format!("{base}/submissions/{id}/resubmit"))
        .json(&draft_body(
            "Public Health Access (revised)",
            "chikondi@kuhes.ac.mw",
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let body = res.json::<Value>().await.unwrap();
    let successor = body["id"].as_str().unwrap().to_string();
    assert_eq!(body["resubmission_of"].as_str().unwrap(), id);

    // Original is retained unchanged apart from the link.
    let original = client
        .get(format!("{base}/submissions/{id}"))
        .send()
        .await
        .unwrap()
        .json::<Value>()
        .await
        .unwrap();
    assert_eq!(original["status"], "rejected");
    assert_eq!(original["resubmitted_to"].as_str().unwrap(), successor);

    let successor_row = client
        .get(format!("{base}/submissions/{successor}"))
        .send()
        .await
        .unwrap()
        .json::<Value>()
        .await
        .unwrap();
    assert_eq!(successor_row["status"], "submitted");
    assert_eq!(successor_row["resubmission_of"].as_str().unwrap(), id);

    // Only one active resubmission per rejected record.
    let res = client
        .post(format!("{base}/submissions/{id}/resubmit"))
        .json(&draft_body(
            "Public Health Access (rev 2)",
            "chikondi@kuhes.ac.mw",
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
}

#[tokio::test(flavor = "multi_thread")]
async fn overdue_invoices_expire_via_operator_endpoint() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let base = &srv.base_url;

    let id = submit(&client, base, "Digital Finance Study", "mirriam@unilia.ac.mw").await;
    assert_eq!(transition(&client, base, &id, "under_review").await, StatusCode::OK);
    assert_eq!(transition(&client, base, &id, "accepted").await, StatusCode::OK);

    // Sweep with a clock far past the default due date.
    let future = (chrono::Utc::now() + chrono::Duration::days(45)).to_rfc3339();
    let res = client
        .post(format!("{base}/invoices/expire-overdue"))
        .json(&json!({ "now": future }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.json::<Value>().await.unwrap()["expired"], 1);

    let billing = client
        .get(format!("{base}/submissions/{id}/invoice"))
        .send()
        .await
        .unwrap()
        .json::<Value>()
        .await
        .unwrap();
    assert_eq!(billing["invoice"]["status"], "expired");

    // Expiry never touches the submission's own payment reconciliation.
    let submission = client
        .get(format!("{base}/submissions/{id}"))
        .send()
        .await
        .unwrap()
        .json::<Value>()
        .await
        .unwrap();
    assert_eq!(submission["payment_status"], "pending");

    // Re-triggering the accepted-state logic opens a fresh invoice.
    let res = client
        .post(format!("{base}/submissions/{id}/invoice"))
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let billing = res.json::<Value>().await.unwrap();
    assert_eq!(billing["invoice"]["status"], "open");
    assert_eq!(billing["past_invoice_ids"].as_array().unwrap().len(), 1);
}
