use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{endpoints, envelope, success, ApiError, AppState};
use crate::error::{FieldViolation, GithubAppError};
use crate::operations::{self, FileChangeRequest, FileWriteKind};

type ApiResult = Result<Response, ApiError>;

const PER_PAGE: u8 = 30;

pub(super) async fn test_connection(State(state): State<AppState>) -> ApiResult {
    let installations = state.github()?.installations(PER_PAGE).await?;

    let summary: Vec<Value> = installations
        .iter()
        .map(|i| {
            json!({
                "id": i.id,
                "account": i.account,
                "target_type": i.target_type,
            })
        })
        .collect();

    Ok(success(
        "GitHub App connection successful",
        json!({
            "installations_count": summary.len(),
            "installations": summary,
        }),
    ))
}

pub(super) async fn list_installations(State(state): State<AppState>) -> ApiResult {
    let installations = state.github()?.installations(PER_PAGE).await?;
    Ok(success(
        format!("Found {} installation(s)", installations.len()),
        json!({
            "count": installations.len(),
            "installations": installations,
        }),
    ))
}

pub(super) async fn list_repos(State(state): State<AppState>) -> ApiResult {
    let resolver = state.github()?;
    let installation_id = resolver.default_installation_id().await?;
    let github = resolver.resolve(Some(installation_id)).await?;
    let (total_count, repositories) =
        operations::installation_repositories(&github, PER_PAGE).await?;

    Ok(success(
        format!("Found {} repositories", repositories.len()),
        json!({
            "installation_id": installation_id,
            "total_count": total_count,
            "count": repositories.len(),
            "repositories": repositories,
        }),
    ))
}

#[derive(Debug, Default, Deserialize)]
struct CreateFileBody {
    owner: Option<String>,
    repo: Option<String>,
    path: Option<String>,
    content: Option<String>,
    message: Option<String>,
    branch: Option<String>,
}

/// Parse the fully read request body. A JSON string holding a JSON document
/// (double-encoded body) is unwrapped once.
fn parse_body(body: &[u8]) -> Result<CreateFileBody, GithubAppError> {
    let invalid = |e: serde_json::Error| GithubAppError::invalid_field("body", e.to_string());

    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(GithubAppError::invalid_field("body", "Request body is empty"));
    }
    let value: Value = serde_json::from_slice(body).map_err(invalid)?;
    let value = match value {
        Value::String(inner) => serde_json::from_str(&inner).map_err(invalid)?,
        other => other,
    };
    if !value.is_object() {
        return Err(GithubAppError::invalid_field("body", "Expected a JSON object"));
    }
    serde_json::from_value(value).map_err(invalid)
}

impl CreateFileBody {
    fn into_change(self) -> Result<FileChangeRequest, GithubAppError> {
        let mut violations = Vec::new();
        let mut take = |value: Option<String>, field: &str| {
            if value.is_none() {
                violations.push(FieldViolation::new(field, "Required"));
            }
            value.unwrap_or_default()
        };

        let change = FileChangeRequest {
            owner: take(self.owner, "owner"),
            repo: take(self.repo, "repo"),
            path: take(self.path, "path"),
            content: take(self.content, "content"),
            message: take(self.message, "message"),
            branch: self.branch.filter(|b| !b.is_empty()),
        };

        if violations.is_empty() {
            Ok(change)
        } else {
            Err(GithubAppError::Validation(violations))
        }
    }
}

pub(super) async fn create_file(State(state): State<AppState>, body: Bytes) -> ApiResult {
    let change = parse_body(&body)?.into_change()?;
    let github = state.github()?.resolve(None).await?;
    let written = operations::put_file(&github, &change).await?;

    let message = match written.kind {
        FileWriteKind::Created => "File created successfully",
        FileWriteKind::Updated => "File updated successfully",
    };
    Ok(success(
        message,
        json!({
            "action": written.kind,
            "url": written.html_url,
            "sha": written.sha,
            "path": change.path,
        }),
    ))
}

pub(super) async fn debug(State(state): State<AppState>) -> Response {
    let body = envelope(
        "debug",
        "Environment check".to_string(),
        json!({ "debug": state.diagnostics }),
    );
    (StatusCode::OK, Json(Value::Object(body))).into_response()
}

pub(super) async fn figma_test(State(state): State<AppState>) -> ApiResult {
    let me = state.figma.me().await?;
    Ok(success("Figma connection successful", json!({ "user": me })))
}

pub(super) async fn figma_project(State(state): State<AppState>) -> ApiResult {
    let project = state.figma.project_files().await?;
    Ok(success("Figma project files", json!({ "project": project })))
}

pub(super) async fn figma_file(
    State(state): State<AppState>,
    Path(file_key): Path<String>,
) -> ApiResult {
    let file = state.figma.file(&file_key, None).await?;
    Ok(success("Figma file", json!({ "file": file })))
}

pub(super) async fn figma_file_node(
    State(state): State<AppState>,
    Path((file_key, node_id)): Path<(String, String)>,
) -> ApiResult {
    let file = state.figma.file(&file_key, Some(&node_id)).await?;
    Ok(success("Figma node", json!({ "file": file })))
}

pub(super) async fn figma_page(
    State(state): State<AppState>,
    Path((file_key, page_id)): Path<(String, String)>,
) -> ApiResult {
    let page = state.figma.page(&file_key, &page_id).await?;
    Ok(success("Figma page", json!({ "page": page })))
}

/// Unknown paths answer with the endpoint catalog.
pub(super) async fn catalog() -> Response {
    success(
        "GitHub App bridge is running",
        json!({ "endpoints": endpoints() }),
    )
}
