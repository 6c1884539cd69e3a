//! HTTP surface: server-rendered pages plus the `/api/tests` JSON proxy.

use anyhow::Result;
use axum::{
    Extension, Router,
    body::Body,
    extract::MatchedPath,
    http::{HeaderName, HeaderValue, Request},
    routing::get,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{Span, info, info_span};
use ulid::Ulid;

pub mod handlers;
pub mod pages;
pub mod session;
pub mod state;

pub use session::RequestSession;
pub use state::{AppState, WebConfig};

use handlers::{auth, dashboard, health, tests};

/// Routes without layers; the state is attached as an extension.
#[must_use]
pub fn routes() -> Router {
    Router::new()
        .route("/", get(dashboard::home))
        .route("/health", get(health::health))
        .route("/auth", get(auth::auth_index))
        .route("/auth/signin", get(auth::sign_in_page).post(auth::sign_in))
        .route("/auth/register", get(auth::register_page).post(auth::register))
        .route("/auth/signout", get(auth::sign_out_page).post(auth::sign_out))
        .route("/auth/error", get(auth::error_page))
        .route("/auth/oauth/{provider}", get(auth::oauth_start))
        .route("/auth/oauth/{provider}/callback", get(auth::oauth_callback))
        .route("/dashboard", get(dashboard::dashboard))
        .route("/dashboard/user", get(dashboard::user))
        .route("/dashboard/admin", get(dashboard::admin))
        .route("/dashboard/guest", get(dashboard::guest))
        .route("/unauthorized", get(dashboard::unauthorized))
        .route("/tests", get(tests::list_view))
        .route("/tests/{id}", get(tests::detail_view))
        .route("/api/tests", get(tests::api_list).post(tests::api_create))
        .route(
            "/api/tests/{id}",
            get(tests::api_get)
                .put(tests::api_update)
                .delete(tests::api_delete),
        )
}

/// Full application router with request ids, tracing and the shared state.
#[must_use]
pub fn router(state: Arc<AppState>) -> Router {
    routes().layer(
        ServiceBuilder::new()
            .layer(SetRequestHeaderLayer::if_not_present(
                HeaderName::from_static("x-request-id"),
                |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
            ))
            .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                "x-request-id",
            )))
            .layer(TraceLayer::new_for_http().make_span_with(make_span))
            .layer(Extension(state)),
    )
}

/// Start the server
/// # Errors
/// Return error if failed to bind or serve
pub async fn serve(port: u16, state: AppState) -> Result<()> {
    let app = router(Arc::new(state));

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {err}");
            }
            info!("Gracefully shutdown");
        })
        .await?;

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}
