//! HTTP mode: a small JSON API over the same operations as the tool server.
//!
//! Every response carries permissive CORS headers and a JSON envelope
//! `{status, message, ...payload, timestamp}`.

mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::Request;
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, MethodRouter};
use axum::{Json, Router};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use tower_http::trace::TraceLayer;

use crate::config::{AppCredential, ConfigDiagnostics, Settings};
use crate::error::GithubAppError;
use crate::figma::FigmaClient;
use crate::installation::{GithubApp, InstallationResolver};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    github: Result<Arc<InstallationResolver>, String>,
    figma: Arc<FigmaClient>,
    diagnostics: ConfigDiagnostics,
}

impl AppState {
    pub fn new(
        github: Result<Arc<InstallationResolver>, String>,
        figma: FigmaClient,
        diagnostics: ConfigDiagnostics,
    ) -> Self {
        Self {
            github,
            figma: Arc::new(figma),
            diagnostics,
        }
    }

    /// Build state from settings. A missing or invalid GitHub App credential
    /// does not stop the server; GitHub routes report it per request.
    pub fn from_settings(settings: &Settings) -> Self {
        let github = AppCredential::from_settings(settings)
            .and_then(|credential| GithubApp::new(&credential))
            .map(|app| Arc::new(InstallationResolver::new(Arc::new(app))))
            .map_err(|e| {
                tracing::warn!(error = %e, "GitHub App not configured; GitHub routes will fail");
                e.to_string()
            });

        let figma = FigmaClient::new(
            settings.figma_api_url(),
            settings.figma_token().map(String::from),
            settings.figma_project_id().map(String::from),
        );

        Self::new(github, figma, settings.diagnostics())
    }

    fn github(&self) -> Result<&InstallationResolver, ApiError> {
        match &self.github {
            Ok(resolver) => Ok(resolver.as_ref()),
            Err(message) => Err(ApiError::from(GithubAppError::Configuration(message.clone()))
                .with_detail("debug", serde_json::json!(self.diagnostics))),
        }
    }
}

/// One entry of the route table; also what the endpoint catalog lists.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Endpoint {
    pub method: &'static str,
    pub path: &'static str,
    pub description: &'static str,
}

const fn endpoint(method: &'static str, path: &'static str, description: &'static str) -> Endpoint {
    Endpoint {
        method,
        path,
        description,
    }
}

/// Ordered route table. Paths are matched exactly, never by prefix. A known
/// path hit with another method answers like an unknown path.
fn route_table() -> Vec<(Endpoint, MethodRouter<AppState>)> {
    vec![
        (
            endpoint("GET", "/test", "Check the GitHub App connection"),
            get(handlers::test_connection),
        ),
        (
            endpoint("GET", "/installations", "List GitHub App installations"),
            get(handlers::list_installations),
        ),
        (
            endpoint("GET", "/repos", "List repositories of the default installation"),
            get(handlers::list_repos),
        ),
        (
            endpoint(
                "POST",
                "/repos/create-file",
                "Create or update a file {owner, repo, path, content, message, branch?}",
            ),
            post(handlers::create_file),
        ),
        (
            endpoint("GET", "/debug", "Report which credentials are configured"),
            get(handlers::debug),
        ),
        (
            endpoint("GET", "/figma/test", "Check the Figma token"),
            get(handlers::figma_test),
        ),
        (
            endpoint("GET", "/figma/project", "List files of the configured Figma project"),
            get(handlers::figma_project),
        ),
        (
            endpoint("GET", "/figma/file/{file_key}", "Fetch a Figma file (depth 2)"),
            get(handlers::figma_file),
        ),
        (
            endpoint(
                "GET",
                "/figma/file/{file_key}/{node_id}",
                "Fetch one node of a Figma file (depth 2)",
            ),
            get(handlers::figma_file_node),
        ),
        (
            endpoint(
                "GET",
                "/figma/page/{file_key}/{page_id}",
                "Fetch one page of a Figma file (depth 3)",
            ),
            get(handlers::figma_page),
        ),
    ]
}

pub fn endpoints() -> Vec<Endpoint> {
    route_table().into_iter().map(|(e, _)| e).collect()
}

pub fn router(state: AppState) -> Router {
    route_table()
        .into_iter()
        .fold(Router::<AppState>::new(), |router, (endpoint, handler)| {
            router.route(endpoint.path, handler.fallback(handlers::catalog))
        })
        .fallback(handlers::catalog)
        .layer(middleware::from_fn(cors))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "HTTP server listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

fn apply_cors(headers: &mut HeaderMap) {
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type"),
    );
}

/// Preflight short-circuits with an empty 200 on any path.
async fn cors(request: Request, next: Next) -> Response {
    let mut response = if request.method() == Method::OPTIONS {
        StatusCode::OK.into_response()
    } else {
        next.run(request).await
    };
    apply_cors(response.headers_mut());
    response
}

fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn envelope(status: &str, message: String, payload: Value) -> Map<String, Value> {
    let mut body = Map::new();
    body.insert("status".to_string(), Value::String(status.to_string()));
    body.insert("message".to_string(), Value::String(message));
    if let Value::Object(fields) = payload {
        body.extend(fields);
    }
    body.insert("timestamp".to_string(), Value::String(timestamp()));
    body
}

pub(crate) fn success(message: impl Into<String>, payload: Value) -> Response {
    (
        StatusCode::OK,
        Json(Value::Object(envelope("success", message.into(), payload))),
    )
        .into_response()
}

/// Error response: status from the error kind, envelope with `status: "error"`.
#[derive(Debug)]
pub struct ApiError {
    error: GithubAppError,
    details: Map<String, Value>,
}

impl ApiError {
    fn with_detail(mut self, key: &str, value: Value) -> Self {
        self.details.insert(key.to_string(), value);
        self
    }
}

impl From<GithubAppError> for ApiError {
    fn from(error: GithubAppError) -> Self {
        Self {
            error,
            details: Map::new(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.error.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            tracing::error!(error = %self.error, kind = self.error.kind(), "Request failed");
        } else {
            tracing::debug!(error = %self.error, kind = self.error.kind(), "Request rejected");
        }

        let mut payload = self.details;
        payload.insert("kind".to_string(), Value::String(self.error.kind().to_string()));
        if let GithubAppError::Validation(violations) = &self.error {
            payload.insert("violations".to_string(), serde_json::json!(violations));
        }

        let body = envelope("error", self.error.to_string(), Value::Object(payload));
        (status, Json(Value::Object(body))).into_response()
    }
}
