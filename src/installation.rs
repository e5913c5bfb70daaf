//! GitHub App authentication and installation-scoped client resolution.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use octocrab::models::{AppId, InstallationId};
use octocrab::Octocrab;
use serde::{Deserialize, Serialize};

use crate::config::AppCredential;
use crate::error::GithubAppError;

/// A GitHub App installation as reported by `GET /app/installations`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Installation {
    pub id: u64,
    pub account: Option<String>,
    pub app_id: Option<u64>,
    pub target_type: Option<String>,
    pub permissions: serde_json::Value,
    pub created_at: Option<String>,
}

#[derive(Deserialize)]
struct RawInstallation {
    id: u64,
    #[serde(default)]
    account: Option<RawAccount>,
    #[serde(default)]
    app_id: Option<u64>,
    #[serde(default)]
    target_type: Option<String>,
    #[serde(default)]
    permissions: serde_json::Value,
    #[serde(default)]
    created_at: Option<String>,
}

#[derive(Deserialize)]
struct RawAccount {
    login: Option<String>,
}

impl From<RawInstallation> for Installation {
    fn from(raw: RawInstallation) -> Self {
        Self {
            id: raw.id,
            account: raw.account.and_then(|a| a.login),
            app_id: raw.app_id,
            target_type: raw.target_type,
            permissions: raw.permissions,
            created_at: raw.created_at,
        }
    }
}

/// What the resolver needs from a GitHub App: enumerate its installations and
/// mint a client scoped to one of them.
#[async_trait]
pub trait AppInstallations: Send + Sync {
    async fn list_installations(&self, per_page: u8) -> Result<Vec<Installation>, GithubAppError>;

    async fn installation_client(&self, installation_id: u64) -> Result<Octocrab, GithubAppError>;
}

/// octocrab client authenticated with the App's JWT.
pub struct GithubApp {
    client: Octocrab,
}

impl GithubApp {
    pub fn new(credential: &AppCredential) -> Result<Self, GithubAppError> {
        let key = jsonwebtoken::EncodingKey::from_rsa_pem(credential.private_key_pem().as_bytes())
            .map_err(|e| {
                GithubAppError::Configuration(format!("Invalid GitHub App private key: {e}"))
            })?;

        let client = Octocrab::builder()
            .app(AppId(credential.app_id), key)
            .base_uri(credential.api_url.as_str())?
            .build()?;

        tracing::debug!(
            app_id = credential.app_id,
            api_url = %credential.api_url,
            oauth_client = credential.has_oauth_client(),
            "Created GitHub App client"
        );

        Ok(Self { client })
    }
}

#[async_trait]
impl AppInstallations for GithubApp {
    async fn list_installations(&self, per_page: u8) -> Result<Vec<Installation>, GithubAppError> {
        let raw: Vec<RawInstallation> = self
            .client
            .get("/app/installations", Some(&[("per_page", per_page)]))
            .await?;
        Ok(raw.into_iter().map(Installation::from).collect())
    }

    async fn installation_client(&self, installation_id: u64) -> Result<Octocrab, GithubAppError> {
        Ok(self.client.installation(InstallationId(installation_id))?)
    }
}

/// Default page size when looking up the first installation.
const DEFAULT_PER_PAGE: u8 = 30;

/// Resolves an optional installation id to an installation-scoped client.
///
/// Clients are memoised per installation id and the default installation
/// (first in API order) is remembered for the life of the resolver. Concurrent
/// first calls may both resolve; whichever finishes last wins the cache slot,
/// and the clients are interchangeable.
pub struct InstallationResolver {
    app: Arc<dyn AppInstallations>,
    clients: RwLock<HashMap<u64, Octocrab>>,
    default_installation: RwLock<Option<u64>>,
}

impl InstallationResolver {
    pub fn new(app: Arc<dyn AppInstallations>) -> Self {
        Self {
            app,
            clients: RwLock::new(HashMap::new()),
            default_installation: RwLock::new(None),
        }
    }

    pub async fn installations(&self, per_page: u8) -> Result<Vec<Installation>, GithubAppError> {
        self.app.list_installations(per_page).await
    }

    pub async fn resolve(&self, installation_id: Option<u64>) -> Result<Octocrab, GithubAppError> {
        let id = match installation_id {
            Some(id) => id,
            None => self.default_installation_id().await?,
        };

        if let Some(client) = self.cached(id) {
            return Ok(client);
        }

        let client = self.app.installation_client(id).await?;
        tracing::debug!(installation_id = id, "Resolved installation client");
        self.clients
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, client.clone());
        Ok(client)
    }

    /// The id of the installation used when callers do not name one.
    pub async fn default_installation_id(&self) -> Result<u64, GithubAppError> {
        let cached = *self
            .default_installation
            .read()
            .unwrap_or_else(|e| e.into_inner());
        if let Some(id) = cached {
            return Ok(id);
        }

        let installations = self.app.list_installations(DEFAULT_PER_PAGE).await?;
        let first = installations
            .first()
            .ok_or(GithubAppError::NoInstallationsFound)?;

        tracing::info!(
            installation_id = first.id,
            account = first.account.as_deref().unwrap_or("unknown"),
            "Using first installation as default"
        );
        *self
            .default_installation
            .write()
            .unwrap_or_else(|e| e.into_inner()) = Some(first.id);
        Ok(first.id)
    }

    fn cached(&self, id: u64) -> Option<Octocrab> {
        self.clients
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&id)
            .cloned()
    }
}
