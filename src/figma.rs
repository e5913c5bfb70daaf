//! Read-only Figma REST passthrough.

use serde_json::{Map, Value};

use crate::error::GithubAppError;

/// Depth requested when fetching a whole file or a single node.
pub const FILE_DEPTH: u8 = 2;
/// Depth requested when fetching one page.
pub const PAGE_DEPTH: u8 = 3;

/// Visual attributes copied verbatim from a Figma node.
const VISUAL_ATTRIBUTES: [&str; 6] = [
    "fills",
    "strokes",
    "effects",
    "absoluteBoundingBox",
    "constraints",
    "style",
];

#[derive(Clone)]
pub struct FigmaClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
    project_id: Option<String>,
}

impl std::fmt::Debug for FigmaClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FigmaClient")
            .field("base_url", &self.base_url)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("project_id", &self.project_id)
            .finish()
    }
}

impl FigmaClient {
    pub fn new(
        base_url: impl Into<String>,
        token: Option<String>,
        project_id: Option<String>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
            project_id,
        }
    }

    fn token(&self) -> Result<&str, GithubAppError> {
        self.token.as_deref().ok_or_else(|| {
            GithubAppError::Configuration("FIGMA_ACCESS_TOKEN not set".to_string())
        })
    }

    async fn get_json(&self, path: &str, query: &[(&str, String)]) -> Result<Value, GithubAppError> {
        let token = self.token()?;
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!(%url, "Figma request");

        let response = self
            .http
            .get(&url)
            .header("X-Figma-Token", token)
            .query(query)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body: Value = response.json().await.unwrap_or(Value::Null);
            let message = body
                .get("err")
                .or_else(|| body.get("message"))
                .and_then(Value::as_str)
                .map(String::from)
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("error").to_string());
            return Err(GithubAppError::Figma {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json().await?)
    }

    /// Identity of the token owner.
    pub async fn me(&self) -> Result<Value, GithubAppError> {
        let me = self.get_json("/me", &[]).await?;
        Ok(serde_json::json!({
            "id": me.get("id"),
            "handle": me.get("handle"),
            "email": me.get("email"),
        }))
    }

    /// Files of the configured project.
    pub async fn project_files(&self) -> Result<Value, GithubAppError> {
        let project_id = self.project_id.as_deref().ok_or_else(|| {
            GithubAppError::Configuration("FIGMA_PROJECT_ID not set".to_string())
        })?;
        let path = format!("/projects/{}/files", urlencoding::encode(project_id));
        let response = self.get_json(&path, &[]).await?;

        let files: Vec<Value> = response
            .get("files")
            .and_then(Value::as_array)
            .map(|files| {
                files
                    .iter()
                    .map(|f| {
                        serde_json::json!({
                            "key": f.get("key"),
                            "name": f.get("name"),
                            "last_modified": f.get("last_modified"),
                            "thumbnail_url": f.get("thumbnail_url"),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(serde_json::json!({
            "project_id": project_id,
            "name": response.get("name"),
            "count": files.len(),
            "files": files,
        }))
    }

    /// A whole file, or a single node of it when `node_id` is given.
    pub async fn file(&self, file_key: &str, node_id: Option<&str>) -> Result<Value, GithubAppError> {
        match node_id {
            Some(node_id) => self.node(file_key, node_id, FILE_DEPTH).await,
            None => {
                let path = format!("/files/{}", urlencoding::encode(file_key));
                let response = self
                    .get_json(&path, &[("depth", FILE_DEPTH.to_string())])
                    .await?;
                Ok(serde_json::json!({
                    "name": response.get("name"),
                    "last_modified": response.get("lastModified"),
                    "version": response.get("version"),
                    "document": response.get("document").map(reshape_node),
                }))
            }
        }
    }

    /// One page of a file.
    pub async fn page(&self, file_key: &str, page_id: &str) -> Result<Value, GithubAppError> {
        self.node(file_key, page_id, PAGE_DEPTH).await
    }

    async fn node(&self, file_key: &str, node_id: &str, depth: u8) -> Result<Value, GithubAppError> {
        let path = format!("/files/{}/nodes", urlencoding::encode(file_key));
        let response = self
            .get_json(
                &path,
                &[("ids", node_id.to_string()), ("depth", depth.to_string())],
            )
            .await?;

        let document = response
            .pointer(&format!("/nodes/{}/document", escape_pointer(node_id)))
            .ok_or_else(|| GithubAppError::NotFound(format!("node {node_id} in {file_key}")))?;

        Ok(serde_json::json!({
            "name": response.get("name"),
            "last_modified": response.get("lastModified"),
            "node": reshape_node(document),
        }))
    }
}

/// JSON pointer escaping for node ids such as `1:2`.
fn escape_pointer(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}

/// Copy a node's structural fields and allow-listed visual attributes,
/// recursing into children. `characters` is exposed as `text`.
pub fn reshape_node(node: &Value) -> Value {
    let mut out = Map::new();

    for key in ["id", "name", "type"] {
        if let Some(v) = node.get(key) {
            out.insert(key.to_string(), v.clone());
        }
    }
    for key in VISUAL_ATTRIBUTES {
        if let Some(v) = node.get(key) {
            out.insert(key.to_string(), v.clone());
        }
    }
    if let Some(text) = node.get("characters") {
        out.insert("text".to_string(), text.clone());
    }
    if let Some(children) = node.get("children").and_then(Value::as_array) {
        out.insert(
            "children".to_string(),
            Value::Array(children.iter().map(reshape_node).collect()),
        );
    }

    Value::Object(out)
}
