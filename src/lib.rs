//! Accounts is a user store and administration service authenticating with
//! an email or a username.

#![forbid(unsafe_code)]
pub mod auth;
pub mod config;
pub mod crypto;
mod database;
pub mod error;
mod router;
pub mod telemetry;
pub mod user;

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::http::{Method, StatusCode, header};
use axum::routing::{get, post};
use axum::{Router, middleware as AxumMiddleware};
use error::ServerError;
use metrics_exporter_prometheus::PrometheusHandle;
use tower::ServiceBuilder;
use tower_http::LatencyUnit;
use tower_http::cors::{Any, CorsLayer};
use tower_http::sensitive_headers::SetSensitiveHeadersLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{
    DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer,
};

use crate::auth::Authenticator;
use crate::crypto::PasswordManager;
use crate::user::{
    MemoryUserStore, NewUser, PostgresUserStore, UserManager, UserStore,
};

const SUPERUSER_EMAIL: &str = "SUPERUSER_EMAIL";
const SUPERUSER_PASSWORD: &str = "SUPERUSER_PASSWORD";

/// MUST NEVER be used in production.
#[cfg(test)]
pub async fn make_request(
    app: Router,
    method: Method,
    path: &str,
    credentials: Option<(&str, &str)>,
    body: String,
) -> axum::http::Response<axum::body::Body> {
    use axum::extract::Request;
    use base64::Engine;
    use tower::util::ServiceExt;

    let mut request = Request::builder()
        .method(method)
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json");

    if let Some((identifier, password)) = credentials {
        let encoded = base64::engine::general_purpose::STANDARD
            .encode(format!("{identifier}:{password}"));
        request = request.header(header::AUTHORIZATION, format!("Basic {encoded}"));
    }

    app.oneshot(request.body(axum::body::Body::from(body)).unwrap())
        .await
        .unwrap()
}

/// State sharing between routes.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<config::Configuration>,
    pub store: Arc<dyn UserStore>,
    pub users: UserManager,
    pub auth: Authenticator,
    pub metrics: Option<PrometheusHandle>,
}

/// Create router.
pub fn app(state: AppState) -> Router {
    let middleware = ServiceBuilder::new()
        // Add high level tracing/logging to all requests.
        .layer(
            TraceLayer::new_for_http()
                .on_body_chunk(|chunk: &Bytes, latency: Duration, _span: &tracing::Span| {
                    tracing::trace!(size_bytes = chunk.len(), latency = ?latency, "sending body chunk")
                })
                .make_span_with(DefaultMakeSpan::new().include_headers(true).level(tracing::Level::INFO))
                .on_request(DefaultOnRequest::new())
                .on_response(DefaultOnResponse::new().include_headers(true).latency_unit(LatencyUnit::Micros)),
        )
        // Set a timeout.
        .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, Duration::from_secs(10)))
        // Remove senstive headers from trace.
        .layer(SetSensitiveHeadersLayer::new([header::AUTHORIZATION, header::COOKIE]))
        // Add CORS preflight support.
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::OPTIONS])
                .allow_headers(Any)
                .vary([header::AUTHORIZATION]),
        );

    Router::new()
        // `GET /status.json` goes to `status`.
        .route("/status.json", get(router::status::status))
        // `GET /metrics` goes to `metrics`.
        .route("/metrics", get(router::status::metrics))
        // `POST /login` goes to `login`.
        .route("/login", post(router::login::handler))
        .nest("/admin", router::admin::router(state.clone()))
        .with_state(state)
        .route_layer(AxumMiddleware::from_fn(telemetry::track))
        .layer(middleware)
}

/// Initialize the application state.
pub async fn initialize_state() -> Result<AppState, Box<dyn std::error::Error>>
{
    // read configuration file. let it in memory.
    let config = config::Configuration::default().read();

    let store: Arc<dyn UserStore> = match config.postgres {
        Some(ref config) => {
            let db = database::Database::new(
                &config.address,
                config
                    .username
                    .as_deref()
                    .unwrap_or(database::DEFAULT_CREDENTIALS),
                config
                    .password
                    .as_deref()
                    .unwrap_or(database::DEFAULT_CREDENTIALS),
                config
                    .database
                    .as_deref()
                    .unwrap_or(database::DEFAULT_DATABASE_NAME),
                config.pool_size.unwrap_or(database::DEFAULT_POOL_SIZE),
            )
            .await?;

            // execute migrations scripts on start.
            db.migrate().await?;

            Arc::new(PostgresUserStore::new(db.postgres))
        },
        None => {
            tracing::warn!(
                "missing `postgres` entry on `config.yaml` file, users are kept in memory"
            );
            Arc::new(MemoryUserStore::new())
        },
    };

    let hasher = Arc::new(PasswordManager::new(config.argon2.clone())?);
    let users = UserManager::new(Arc::clone(&store), hasher.clone());
    let auth = Authenticator::new(Arc::clone(&store), hasher)?;

    let state = AppState {
        config,
        store,
        users,
        auth,
        metrics: None,
    };

    if let (Ok(email), Ok(password)) = (
        std::env::var(SUPERUSER_EMAIL),
        std::env::var(SUPERUSER_PASSWORD),
    ) {
        bootstrap_superuser(&state, &email, &password).await?;
    }

    Ok(state)
}

/// Create a first superuser unless `email` is already registered.
async fn bootstrap_superuser(
    state: &AppState,
    email: &str,
    password: &str,
) -> error::Result<()> {
    if state.store.find_by_identifier(email).await?.is_some() {
        tracing::debug!("superuser already exists");
        return Ok(());
    }

    state
        .users
        .create_superuser(NewUser {
            email: Some(email.to_owned()),
            password: Some(password.to_owned()),
            ..Default::default()
        })
        .await?;

    Ok(())
}
