//! HTTP surface of the college complaint desk.
//!
//! # Layout
//! - `/api/register`, `/api/login`, `/api/logout`, `/api/me`: students and administrators
//! - `/api/complaints/...`: filing, triage, comments, search, export
//! - `/api/departments`, `/api/courses`, `/api/complaint-categories`: cached reference data
//! - `/api/student-complaints/...`: rows from the CSV mirror
//! - `/api/stats`, `/api/notifications/{user_id}`, `/api/health`
//!
//! Failed administrator logins are counted per account and locked out with
//! a 429. Every response carries the hardening headers in `SECURITY_HEADERS`.
//!
//! Every handler that changes a student or complaint pokes the mirror worker
//! once the database has committed.
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    Router,
    http::{
        HeaderName, HeaderValue, Method,
        header::{
            CONTENT_SECURITY_POLICY, CONTENT_TYPE, COOKIE, STRICT_TRANSPORT_SECURITY,
            X_CONTENT_TYPE_OPTIONS, X_FRAME_OPTIONS, X_XSS_PROTECTION,
        },
    },
    routing::{get, patch, post},
};
use signal::{
    ctrl_c,
    unix::{SignalKind, signal},
};
use tokio::{net::TcpListener, signal};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    set_header::SetResponseHeaderLayer,
    trace::TraceLayer,
};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

pub mod cache;
pub mod config;
pub mod error;
pub mod lockout;
pub mod routes;
pub mod session;
pub mod state;
pub mod utils;

use routes::*;
use state::AppState;

const SECURITY_HEADERS: [(HeaderName, &str); 5] = [
    (X_CONTENT_TYPE_OPTIONS, "nosniff"),
    (X_FRAME_OPTIONS, "DENY"),
    (X_XSS_PROTECTION, "1; mode=block"),
    (STRICT_TRANSPORT_SECURITY, "max-age=31536000; includeSubDomains"),
    (
        CONTENT_SECURITY_POLICY,
        "default-src 'self'; script-src 'self' 'unsafe-inline'; style-src 'self' 'unsafe-inline'",
    ),
];

/// Installs the global `tracing` subscriber, filtered by `RUST_LOG`.
pub fn init_tracing() {
    if fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init()
        .is_err()
    {
        warn!("Tracing subscriber already installed");
    }
}

fn allowed_origins(origins: &[String]) -> AllowOrigin {
    if origins.is_empty() {
        return AllowOrigin::mirror_request();
    }

    AllowOrigin::list(origins.iter().filter_map(|origin| match origin.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring invalid CORS origin {origin:?}");
            None
        }
    }))
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(allowed_origins(&state.config.cors_origins))
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, COOKIE])
        .max_age(std::time::Duration::from_secs(60 * 60));

    let api = Router::new()
        .route("/register", post(register_handler))
        .route("/login", post(login_handler))
        .route("/logout", post(logout_handler))
        .route("/me", get(me_handler))
        .route(
            "/complaints",
            post(create_complaint_handler).get(list_complaints_handler),
        )
        .route("/complaints/search", get(search_handler))
        .route("/complaints/export", get(export_handler))
        .route("/complaints/bulk-update", post(bulk_update_handler))
        .route("/complaints/{id}/status", patch(status_handler))
        .route("/complaints/{id}/priority", patch(priority_handler))
        .route(
            "/complaints/{id}/comments",
            post(add_comment_handler).get(list_comments_handler),
        )
        .route("/departments", get(departments_handler))
        .route("/departments/{id}/categories", get(department_categories_handler))
        .route("/courses", get(courses_handler))
        .route("/courses/{department_id}", get(department_courses_handler))
        .route("/complaint-categories", get(categories_handler))
        .route("/student/{student_id}", get(student_handler))
        .route("/student-complaints/{student_id}", get(student_complaints_handler))
        .route("/all-student-complaints", get(all_student_complaints_handler))
        .route("/stats", get(stats_handler))
        .route("/notifications/{user_id}", get(notifications_handler))
        .route("/health", get(health_handler));

    let mut router = Router::new()
        .nest("/api", api)
        .fallback(not_found_handler)
        .layer(cors);
    for (name, value) in SECURITY_HEADERS {
        router = router.layer(SetResponseHeaderLayer::if_not_present(
            name,
            HeaderValue::from_static(value),
        ));
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}

pub async fn start_server(state: Arc<AppState>) -> Result<()> {
    info!("Starting server...");

    let app = build_router(state.clone());

    let address = format!("0.0.0.0:{}", state.config.port);
    info!("Binding to {address}");

    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {address}"))?;
    info!("Server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutting down...");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }

        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                warn!("Failed to install signal handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
