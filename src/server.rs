use std::sync::Arc;

use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::*;
use rmcp::service::RequestContext;
use rmcp::{schemars, tool, tool_router, RoleServer, ServerHandler};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::GithubAppError;
use crate::installation::InstallationResolver;
use crate::operations::{self, FileChangeRequest, FileRead, FileWriteKind, ListReposQuery};
use crate::validate::validate_arguments;

/// Names of every tool the server exposes, in catalog order.
pub const TOOL_NAMES: [&str; 7] = [
    "list_installations",
    "create_repo",
    "list_repos",
    "create_file",
    "read_file",
    "create_branch",
    "create_pull_request",
];

#[derive(Clone)]
pub struct GithubAppServer {
    resolver: Arc<InstallationResolver>,
    tool_router: ToolRouter<Self>,
}

// -- Tool parameter types --

fn default_per_page() -> u8 {
    30
}

fn default_branch() -> String {
    "main".to_string()
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct ListInstallationsParams {
    #[schemars(description = "Results per page", range(min = 1, max = 100))]
    #[serde(default = "default_per_page")]
    pub per_page: u8,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct CreateRepoParams {
    #[schemars(description = "Installation ID (optional)", range(min = 1))]
    #[serde(default)]
    pub installation_id: Option<u64>,

    #[schemars(description = "Repository name")]
    pub name: String,

    #[schemars(description = "Repository description")]
    #[serde(default)]
    pub description: Option<String>,

    #[schemars(description = "Make repository private")]
    #[serde(default)]
    pub private: bool,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RepoType {
    #[default]
    Owner,
    Public,
    Private,
}

impl RepoType {
    fn as_str(self) -> &'static str {
        match self {
            RepoType::Owner => "owner",
            RepoType::Public => "public",
            RepoType::Private => "private",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RepoSort {
    Created,
    #[default]
    Updated,
    Pushed,
    FullName,
}

impl RepoSort {
    fn as_str(self) -> &'static str {
        match self {
            RepoSort::Created => "created",
            RepoSort::Updated => "updated",
            RepoSort::Pushed => "pushed",
            RepoSort::FullName => "full_name",
        }
    }
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct ListReposParams {
    #[schemars(description = "Installation ID (optional)", range(min = 1))]
    #[serde(default)]
    pub installation_id: Option<u64>,

    #[schemars(description = "Repository type filter")]
    #[serde(default, rename = "type")]
    pub repo_type: RepoType,

    #[schemars(description = "Sort order")]
    #[serde(default)]
    pub sort: RepoSort,

    #[schemars(description = "Results per page", range(min = 1, max = 100))]
    #[serde(default = "default_per_page")]
    pub per_page: u8,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct CreateFileParams {
    #[schemars(description = "Installation ID (optional)", range(min = 1))]
    #[serde(default)]
    pub installation_id: Option<u64>,

    #[schemars(description = "Repository owner")]
    pub owner: String,

    #[schemars(description = "Repository name")]
    pub repo: String,

    #[schemars(description = "File path")]
    pub path: String,

    #[schemars(description = "File content")]
    pub content: String,

    #[schemars(description = "Commit message")]
    pub message: String,

    #[schemars(description = "Branch name")]
    #[serde(default = "default_branch")]
    pub branch: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct ReadFileParams {
    #[schemars(description = "Installation ID (optional)", range(min = 1))]
    #[serde(default)]
    pub installation_id: Option<u64>,

    #[schemars(description = "Repository owner")]
    pub owner: String,

    #[schemars(description = "Repository name")]
    pub repo: String,

    #[schemars(description = "File path")]
    pub path: String,

    #[schemars(description = "Branch, tag, or commit SHA")]
    #[serde(default, rename = "ref")]
    pub git_ref: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct CreateBranchParams {
    #[schemars(description = "Installation ID (optional)", range(min = 1))]
    #[serde(default)]
    pub installation_id: Option<u64>,

    #[schemars(description = "Repository owner")]
    pub owner: String,

    #[schemars(description = "Repository name")]
    pub repo: String,

    #[schemars(description = "New branch name")]
    pub branch: String,

    #[schemars(description = "Source branch")]
    #[serde(default = "default_branch")]
    pub from_branch: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct CreatePullRequestParams {
    #[schemars(description = "Installation ID (optional)", range(min = 1))]
    #[serde(default)]
    pub installation_id: Option<u64>,

    #[schemars(description = "Repository owner")]
    pub owner: String,

    #[schemars(description = "Repository name")]
    pub repo: String,

    #[schemars(description = "PR title")]
    pub title: String,

    #[schemars(description = "Source branch")]
    pub head: String,

    #[schemars(description = "Target branch")]
    #[serde(default = "default_branch")]
    pub base: String,

    #[schemars(description = "PR description")]
    #[serde(default)]
    pub body: Option<String>,
}

impl GithubAppServer {
    pub fn new(resolver: Arc<InstallationResolver>) -> Self {
        Self {
            resolver,
            tool_router: Self::tool_router(),
        }
    }

    fn err(&self, e: GithubAppError) -> ErrorData {
        e.to_mcp_error()
    }

    /// Every registered tool with its generated input schema.
    pub fn tools(&self) -> Vec<Tool> {
        let mut tools = self.tool_router.list_all();
        tools.sort_by_key(|t| {
            TOOL_NAMES
                .iter()
                .position(|name| *name == t.name.as_ref())
                .unwrap_or(TOOL_NAMES.len())
        });
        tools
    }

    /// Look up, validate and execute one tool call.
    pub async fn dispatch(
        &self,
        name: &str,
        arguments: JsonObject,
    ) -> Result<CallToolResult, ErrorData> {
        let tool = self
            .tool_router
            .list_all()
            .into_iter()
            .find(|t| t.name == name)
            .ok_or_else(|| {
                ErrorData::new(
                    ErrorCode::METHOD_NOT_FOUND,
                    format!("Unknown tool: {name}"),
                    None,
                )
            })?;

        let violations = validate_arguments(&tool.input_schema, &arguments);
        if !violations.is_empty() {
            tracing::debug!(tool = name, ?violations, "Rejected tool arguments");
            return Err(self.err(GithubAppError::Validation(violations)));
        }

        tracing::debug!(tool = name, "Calling tool");
        match name {
            "list_installations" => self.list_installations(parse(arguments)?).await,
            "create_repo" => self.create_repo(parse(arguments)?).await,
            "list_repos" => self.list_repos(parse(arguments)?).await,
            "create_file" => self.create_file(parse(arguments)?).await,
            "read_file" => self.read_file(parse(arguments)?).await,
            "create_branch" => self.create_branch(parse(arguments)?).await,
            "create_pull_request" => self.create_pull_request(parse(arguments)?).await,
            _ => Err(ErrorData::new(
                ErrorCode::METHOD_NOT_FOUND,
                format!("Unknown tool: {name}"),
                None,
            )),
        }
    }
}

fn parse<T: DeserializeOwned>(arguments: JsonObject) -> Result<Parameters<T>, ErrorData> {
    serde_json::from_value(serde_json::Value::Object(arguments))
        .map(Parameters)
        .map_err(|e| GithubAppError::invalid_field("arguments", e.to_string()).to_mcp_error())
}

fn json_text(value: &serde_json::Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
}

// -- MCP tool handlers --

#[tool_router]
impl GithubAppServer {
    #[tool(
        name = "list_installations",
        description = "List GitHub App installations"
    )]
    async fn list_installations(
        &self,
        Parameters(params): Parameters<ListInstallationsParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let installations = self
            .resolver
            .installations(params.per_page)
            .await
            .map_err(|e| self.err(e))?;

        let text = json_text(&serde_json::json!(installations));
        Ok(CallToolResult::success(vec![Content::text(text)]))
    }

    #[tool(name = "create_repo", description = "Create a new GitHub repository")]
    async fn create_repo(
        &self,
        Parameters(params): Parameters<CreateRepoParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let github = self
            .resolver
            .resolve(params.installation_id)
            .await
            .map_err(|e| self.err(e))?;

        let repo = operations::create_repo(
            &github,
            &params.name,
            params.description.as_deref(),
            params.private,
        )
        .await
        .map_err(|e| self.err(e))?;

        Ok(CallToolResult::success(vec![Content::text(format!(
            "Repository created successfully: {}",
            repo.html_url.as_deref().unwrap_or(&params.name)
        ))]))
    }

    #[tool(name = "list_repos", description = "List user repositories")]
    async fn list_repos(
        &self,
        Parameters(params): Parameters<ListReposParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let github = self
            .resolver
            .resolve(params.installation_id)
            .await
            .map_err(|e| self.err(e))?;

        let query = ListReposQuery {
            repo_type: params.repo_type.as_str(),
            sort: params.sort.as_str(),
            per_page: params.per_page,
        };
        let repos = operations::list_repos(&github, &query)
            .await
            .map_err(|e| self.err(e))?;

        let text = json_text(&serde_json::json!(repos));
        Ok(CallToolResult::success(vec![Content::text(text)]))
    }

    #[tool(
        name = "create_file",
        description = "Create or update a file in a repository"
    )]
    async fn create_file(
        &self,
        Parameters(params): Parameters<CreateFileParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let github = self
            .resolver
            .resolve(params.installation_id)
            .await
            .map_err(|e| self.err(e))?;

        let change = FileChangeRequest {
            owner: params.owner,
            repo: params.repo,
            path: params.path,
            content: params.content,
            message: params.message,
            branch: Some(params.branch),
        };
        let written = operations::put_file(&github, &change)
            .await
            .map_err(|e| self.err(e))?;

        let verb = match written.kind {
            FileWriteKind::Created => "created",
            FileWriteKind::Updated => "updated",
        };
        Ok(CallToolResult::success(vec![Content::text(format!(
            "File {} successfully: {}",
            verb,
            written.html_url.as_deref().unwrap_or(&change.path)
        ))]))
    }

    #[tool(name = "read_file", description = "Read a file from a repository")]
    async fn read_file(
        &self,
        Parameters(params): Parameters<ReadFileParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let github = self
            .resolver
            .resolve(params.installation_id)
            .await
            .map_err(|e| self.err(e))?;

        let file = operations::read_file(
            &github,
            &params.owner,
            &params.repo,
            &params.path,
            params.git_ref.as_deref(),
        )
        .await
        .map_err(|e| self.err(e))?;

        let text = match file {
            FileRead::File { content } => content,
            FileRead::Directory { entries } => {
                let mut text = "Path is a directory, not a file".to_string();
                for entry in entries {
                    text.push_str("\n");
                    text.push_str(&entry);
                }
                text
            }
        };
        Ok(CallToolResult::success(vec![Content::text(text)]))
    }

    #[tool(name = "create_branch", description = "Create a new branch")]
    async fn create_branch(
        &self,
        Parameters(params): Parameters<CreateBranchParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let github = self
            .resolver
            .resolve(params.installation_id)
            .await
            .map_err(|e| self.err(e))?;

        operations::create_branch(
            &github,
            &params.owner,
            &params.repo,
            &params.branch,
            &params.from_branch,
        )
        .await
        .map_err(|e| self.err(e))?;

        Ok(CallToolResult::success(vec![Content::text(format!(
            "Branch '{}' created successfully from '{}'",
            params.branch, params.from_branch
        ))]))
    }

    #[tool(name = "create_pull_request", description = "Create a pull request")]
    async fn create_pull_request(
        &self,
        Parameters(params): Parameters<CreatePullRequestParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let github = self
            .resolver
            .resolve(params.installation_id)
            .await
            .map_err(|e| self.err(e))?;

        let pull = operations::create_pull_request(
            &github,
            &params.owner,
            &params.repo,
            &params.title,
            &params.head,
            &params.base,
            params.body.as_deref(),
        )
        .await
        .map_err(|e| self.err(e))?;

        Ok(CallToolResult::success(vec![Content::text(format!(
            "Pull request created successfully: {}",
            pull.html_url.as_deref().unwrap_or("(no url)")
        ))]))
    }
}

impl ServerHandler for GithubAppServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "github-app-mcp".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                ..Default::default()
            },
            instructions: Some(
                "GitHub App server. Use list_installations to see where the app is installed; \
                 every other tool accepts an optional installation_id and defaults to the first \
                 installation. create_repo/list_repos manage repositories, read_file/create_file \
                 read and write files, create_branch and create_pull_request prepare changes."
                    .to_string(),
            ),
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, ErrorData> {
        Ok(ListToolsResult::with_all_items(self.tools()))
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, ErrorData> {
        self.dispatch(&request.name, request.arguments.unwrap_or_default())
            .await
    }
}
