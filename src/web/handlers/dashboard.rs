//! Role-based dashboards.

use crate::{
    features::auth::guards::RouteGuard,
    web::{pages, session::RequestSession},
};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

pub async fn home() -> impl IntoResponse {
    pages::home()
}

/// Sends admins to the admin panel and everybody else to the user dashboard.
pub async fn dashboard(session: RequestSession) -> Response {
    match session.guard(RouteGuard::require_auth()).await {
        Ok(signed_in) if signed_in.is_admin() => session.redirect("/dashboard/admin"),
        Ok(_) => session.redirect("/dashboard/user"),
        Err(response) => response,
    }
}

pub async fn user(session: RequestSession) -> Response {
    match session.guard(RouteGuard::require_auth()).await {
        Ok(signed_in) => session.finish(pages::user_dashboard(&signed_in)),
        Err(response) => response,
    }
}

pub async fn admin(session: RequestSession) -> Response {
    match session.guard(RouteGuard::require_admin()).await {
        Ok(signed_in) => session.finish(pages::admin_dashboard(&signed_in)),
        Err(response) => response,
    }
}

pub async fn guest() -> impl IntoResponse {
    pages::guest_dashboard()
}

pub async fn unauthorized() -> impl IntoResponse {
    (StatusCode::FORBIDDEN, pages::unauthorized())
}
