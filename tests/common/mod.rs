#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use github_app_mcp::error::GithubAppError;
use github_app_mcp::installation::{AppInstallations, Installation, InstallationResolver};
use octocrab::Octocrab;

/// Stands in for a GitHub App: fixed installations, and token-authenticated
/// clients pointed at the mock server.
pub struct StubApp {
    pub base_url: String,
    pub installations: Vec<u64>,
    pub resolved: Mutex<Vec<u64>>,
}

impl StubApp {
    pub fn new(base_url: impl Into<String>, installations: Vec<u64>) -> Arc<Self> {
        Arc::new(Self {
            base_url: base_url.into(),
            installations,
            resolved: Mutex::new(Vec::new()),
        })
    }

    pub fn resolved(&self) -> Vec<u64> {
        self.resolved.lock().unwrap().clone()
    }
}

#[async_trait]
impl AppInstallations for StubApp {
    async fn list_installations(&self, per_page: u8) -> Result<Vec<Installation>, GithubAppError> {
        Ok(self
            .installations
            .iter()
            .take(per_page as usize)
            .map(|id| Installation {
                id: *id,
                account: Some(format!("account-{id}")),
                app_id: Some(1),
                target_type: Some("Organization".to_string()),
                permissions: serde_json::json!({"contents": "write"}),
                created_at: Some("2024-01-01T00:00:00Z".to_string()),
            })
            .collect())
    }

    async fn installation_client(&self, installation_id: u64) -> Result<Octocrab, GithubAppError> {
        self.resolved.lock().unwrap().push(installation_id);
        Ok(Octocrab::builder()
            .personal_token(format!("ghs_{installation_id}"))
            .base_uri(self.base_url.as_str())?
            .build()?)
    }
}

pub fn resolver(app: &Arc<StubApp>) -> Arc<InstallationResolver> {
    Arc::new(InstallationResolver::new(app.clone() as Arc<dyn AppInstallations>))
}

pub fn not_found() -> serde_json::Value {
    serde_json::json!({
        "message": "Not Found",
        "documentation_url": "https://docs.github.com/rest"
    })
}
