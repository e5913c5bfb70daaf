//! GitHub REST operations shared by the tool server and the HTTP routes.
//!
//! Each function performs one logical operation against an
//! installation-scoped client and reshapes the response.

use base64::Engine;
use octocrab::Octocrab;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::GithubAppError;

/// Parameters for creating or updating one repository file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChangeRequest {
    pub owner: String,
    pub repo: String,
    pub path: String,
    /// Raw text; encoded to base64 before it is sent.
    pub content: String,
    pub message: String,
    /// Target branch; the repository default branch when absent.
    pub branch: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileWriteKind {
    Created,
    Updated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileWrite {
    pub kind: FileWriteKind,
    pub html_url: Option<String>,
    pub sha: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileRead {
    File { content: String },
    Directory { entries: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RepoSummary {
    pub name: String,
    pub full_name: Option<String>,
    pub description: Option<String>,
    pub private: bool,
    pub html_url: Option<String>,
    pub updated_at: Option<String>,
}

impl RepoSummary {
    fn from_json(r: &Value) -> Self {
        Self {
            name: r
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            full_name: str_field(r, "full_name"),
            description: str_field(r, "description"),
            private: r.get("private").and_then(Value::as_bool).unwrap_or(false),
            html_url: str_field(r, "html_url"),
            updated_at: str_field(r, "updated_at"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ListReposQuery<'a> {
    #[serde(rename = "type")]
    pub repo_type: &'a str,
    pub sort: &'a str,
    pub per_page: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedRepo {
    pub full_name: Option<String>,
    pub html_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedPull {
    pub number: Option<u64>,
    pub html_url: Option<String>,
}

fn str_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(String::from)
}

/// Validate that a GitHub owner/repo name doesn't contain characters that
/// could be used for URL injection in raw API routes.
pub fn sanitize_github_name(name: &str, field: &str) -> Result<(), GithubAppError> {
    if name.is_empty() {
        return Err(GithubAppError::invalid_field(field, "must not be empty"));
    }
    for ch in ['/', '?', '#', '%', '\0', ' ', '\n', '\t'] {
        if name.contains(ch) {
            return Err(GithubAppError::invalid_field(
                field,
                format!("contains invalid character '{}'", ch.escape_default()),
            ));
        }
    }
    Ok(())
}

/// Validate a value for use in URL paths or query params. Unlike
/// `sanitize_github_name`, this allows slashes (for branch names like
/// `feature/foo` or file paths like `src/main.rs`).
pub fn sanitize_url_value(value: &str, field: &str) -> Result<(), GithubAppError> {
    if value.is_empty() {
        return Err(GithubAppError::invalid_field(field, "must not be empty"));
    }
    for ch in ['?', '#', '&', '\0', '\n', '\r', '\t'] {
        if value.contains(ch) {
            return Err(GithubAppError::invalid_field(field, "contains invalid character"));
        }
    }
    Ok(())
}

/// Percent-encode each segment of a repository path, keeping the slashes.
fn encode_path(path: &str) -> String {
    path.trim_matches('/')
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

fn contents_route(owner: &str, repo: &str, path: &str) -> String {
    format!("/repos/{}/{}/contents/{}", owner, repo, encode_path(path))
}

#[derive(Serialize)]
struct RefQuery<'a> {
    #[serde(rename = "ref", skip_serializing_if = "Option::is_none")]
    git_ref: Option<&'a str>,
}

#[derive(Serialize)]
struct PerPage {
    per_page: u8,
}

pub async fn create_repo(
    github: &Octocrab,
    name: &str,
    description: Option<&str>,
    private: bool,
) -> Result<CreatedRepo, GithubAppError> {
    sanitize_github_name(name, "name")?;

    let mut body = serde_json::json!({ "name": name, "private": private });
    if let Some(description) = description {
        body["description"] = Value::String(description.to_string());
    }

    let response: Value = github.post("/user/repos", Some(&body)).await?;
    tracing::info!(repo = name, private, "Created repository");

    Ok(CreatedRepo {
        full_name: str_field(&response, "full_name"),
        html_url: str_field(&response, "html_url"),
    })
}

/// Repositories of the authenticated account (`GET /user/repos`).
pub async fn list_repos(
    github: &Octocrab,
    query: &ListReposQuery<'_>,
) -> Result<Vec<RepoSummary>, GithubAppError> {
    let response: Vec<Value> = github.get("/user/repos", Some(query)).await?;
    Ok(response.iter().map(RepoSummary::from_json).collect())
}

/// Repositories the installation was granted (`GET /installation/repositories`).
pub async fn installation_repositories(
    github: &Octocrab,
    per_page: u8,
) -> Result<(u64, Vec<RepoSummary>), GithubAppError> {
    let response: Value = github
        .get("/installation/repositories", Some(&PerPage { per_page }))
        .await?;

    let repos: Vec<RepoSummary> = response
        .get("repositories")
        .and_then(Value::as_array)
        .map(|arr| arr.iter().map(RepoSummary::from_json).collect())
        .unwrap_or_default();
    let total = response
        .get("total_count")
        .and_then(Value::as_u64)
        .unwrap_or(repos.len() as u64);
    Ok((total, repos))
}

/// Look up the blob sha of an existing file. `Ok(None)` when GitHub answers 404.
async fn existing_file_sha(
    github: &Octocrab,
    change: &FileChangeRequest,
) -> Result<Option<String>, GithubAppError> {
    let route = contents_route(&change.owner, &change.repo, &change.path);
    let query = RefQuery {
        git_ref: change.branch.as_deref(),
    };

    match github.get::<Value, _, _>(&route, Some(&query)).await {
        Ok(Value::Array(_)) => Err(GithubAppError::invalid_field(
            "path",
            format!("{} is a directory, not a file", change.path),
        )),
        Ok(existing) => Ok(str_field(&existing, "sha")),
        Err(e) => {
            let err = GithubAppError::from(e);
            if err.is_not_found() {
                Ok(None)
            } else {
                Err(err)
            }
        }
    }
}

/// Create or update a file. An existing file is updated with its current blob
/// sha as precondition; a missing one is created without a precondition.
pub async fn put_file(
    github: &Octocrab,
    change: &FileChangeRequest,
) -> Result<FileWrite, GithubAppError> {
    sanitize_github_name(&change.owner, "owner")?;
    sanitize_github_name(&change.repo, "repo")?;
    sanitize_url_value(&change.path, "path")?;
    if let Some(branch) = &change.branch {
        sanitize_url_value(branch, "branch")?;
    }

    let sha = existing_file_sha(github, change).await?;

    let mut body = serde_json::json!({
        "message": change.message,
        "content": base64::engine::general_purpose::STANDARD.encode(change.content.as_bytes()),
    });
    if let Some(branch) = &change.branch {
        body["branch"] = Value::String(branch.clone());
    }
    if let Some(sha) = &sha {
        body["sha"] = Value::String(sha.clone());
    }

    let route = contents_route(&change.owner, &change.repo, &change.path);
    let response: Value = github.put(&route, Some(&body)).await?;

    let kind = if sha.is_some() {
        FileWriteKind::Updated
    } else {
        FileWriteKind::Created
    };
    tracing::info!(
        owner = %change.owner,
        repo = %change.repo,
        path = %change.path,
        ?kind,
        "Wrote file"
    );

    Ok(FileWrite {
        kind,
        html_url: response
            .pointer("/content/html_url")
            .and_then(Value::as_str)
            .map(String::from),
        sha: response
            .pointer("/content/sha")
            .and_then(Value::as_str)
            .map(String::from),
    })
}

pub async fn read_file(
    github: &Octocrab,
    owner: &str,
    repo: &str,
    path: &str,
    git_ref: Option<&str>,
) -> Result<FileRead, GithubAppError> {
    sanitize_github_name(owner, "owner")?;
    sanitize_github_name(repo, "repo")?;
    sanitize_url_value(path, "path")?;
    if let Some(git_ref) = git_ref {
        sanitize_url_value(git_ref, "ref")?;
    }

    let response: Value = github
        .get(contents_route(owner, repo, path), Some(&RefQuery { git_ref }))
        .await?;

    if let Value::Array(entries) = &response {
        return Ok(FileRead::Directory {
            entries: entries
                .iter()
                .filter_map(|e| e.get("path").and_then(Value::as_str))
                .map(String::from)
                .collect(),
        });
    }

    // GitHub returns base64 with embedded newlines
    let cleaned: String = response
        .get("content")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .chars()
        .filter(|ch| !ch.is_whitespace())
        .collect();
    let content = base64::engine::general_purpose::STANDARD
        .decode(&cleaned)
        .ok()
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .ok_or_else(|| GithubAppError::Other(format!("{path} has undecodable content")))?;

    Ok(FileRead::File { content })
}

#[derive(Debug, Deserialize)]
struct GitRef {
    object: GitObject,
}

#[derive(Debug, Deserialize)]
struct GitObject {
    sha: String,
}

/// Create `refs/heads/<branch>` pointing at the head of `from_branch`.
pub async fn create_branch(
    github: &Octocrab,
    owner: &str,
    repo: &str,
    branch: &str,
    from_branch: &str,
) -> Result<(), GithubAppError> {
    sanitize_github_name(owner, "owner")?;
    sanitize_github_name(repo, "repo")?;
    sanitize_url_value(branch, "branch")?;
    sanitize_url_value(from_branch, "from_branch")?;

    let source: GitRef = github
        .get(
            format!("/repos/{}/{}/git/ref/heads/{}", owner, repo, from_branch),
            None::<&()>,
        )
        .await?;

    let body = serde_json::json!({
        "ref": format!("refs/heads/{branch}"),
        "sha": &source.object.sha,
    });
    let _: Value = github
        .post(format!("/repos/{}/{}/git/refs", owner, repo), Some(&body))
        .await?;

    tracing::info!(owner, repo, branch, from_branch, sha = %source.object.sha, "Created branch");
    Ok(())
}

pub async fn create_pull_request(
    github: &Octocrab,
    owner: &str,
    repo: &str,
    title: &str,
    head: &str,
    base: &str,
    body: Option<&str>,
) -> Result<CreatedPull, GithubAppError> {
    sanitize_github_name(owner, "owner")?;
    sanitize_github_name(repo, "repo")?;

    let mut request = serde_json::json!({
        "title": title,
        "head": head,
        "base": base,
    });
    if let Some(body) = body {
        request["body"] = Value::String(body.to_string());
    }

    let response: Value = github
        .post(format!("/repos/{}/{}/pulls", owner, repo), Some(&request))
        .await?;

    let pull = CreatedPull {
        number: response.get("number").and_then(Value::as_u64),
        html_url: str_field(&response, "html_url"),
    };
    tracing::info!(owner, repo, head, base, number = ?pull.number, "Created pull request");
    Ok(pull)
}
