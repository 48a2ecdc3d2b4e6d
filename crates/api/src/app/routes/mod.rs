use axum::Router;

pub mod billing;
pub mod dashboard;
pub mod submissions;
pub mod system;

pub fn router() -> Router {
    Router::new()
        .nest(
            "/submissions",
            submissions::router().merge(billing::invoice_router()),
        )
        .nest("/invoices", billing::router())
        .nest("/attempts", billing::attempts_router())
        .nest("/dashboard", dashboard::router())
}
