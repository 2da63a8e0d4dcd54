//! Backend-as-a-service client: the ports the sync engines depend on and
//! their REST implementation.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use tokio::sync::watch;

use crate::{
    config::BackendCfg,
    sync::{
        cursor::PageRange,
        model::{JobRow, JobStatus, Profile, TemplateRow},
    },
};

/// Google OAuth helpers.
pub mod auth;
/// Edge function invocation.
pub mod functions;
/// Row queries and RPCs.
pub mod rest;
/// Auth session lifecycle.
pub mod session;
/// Token and session persistence.
pub mod session_store;
/// Object storage: uploads and signed URLs.
pub mod storage;

use session::AuthSession;

/// Queries and RPCs over the `jobs` table.
#[async_trait]
pub trait JobsBackend: Send + Sync {
    /// Rows in `range`, newest first.
    async fn list_jobs(&self, range: PageRange) -> Result<Vec<JobRow>>;
    async fn fetch_job(&self, job_id: &str) -> Result<Option<JobRow>>;
    /// `create_job` RPC; returns the new job id.
    async fn create_job(&self, template_id: &str) -> Result<String>;
    /// `update_job_status` RPC.
    async fn update_job_status(
        &self,
        job_id: &str,
        status: JobStatus,
        error_msg: Option<&str>,
    ) -> Result<()>;
}

/// Queries over the `templates` table.
#[async_trait]
pub trait TemplatesBackend: Send + Sync {
    /// Rows in `range`, newest first, optionally filtered by a
    /// case-insensitive substring of the name.
    async fn list_templates(
        &self,
        range: PageRange,
        name_filter: Option<&str>,
    ) -> Result<Vec<TemplateRow>>;
    async fn fetch_template(&self, id: &str) -> Result<Option<TemplateRow>>;
}

#[async_trait]
pub trait ProfileBackend: Send + Sync {
    async fn fetch_profile(&self) -> Result<Option<Profile>>;
}

/// Private object storage.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Upload (upsert) `bytes` at `path`.
    async fn upload(&self, bucket: &str, path: &str, bytes: Vec<u8>, content_type: &str)
    -> Result<()>;
    async fn create_signed_url(&self, bucket: &str, path: &str, ttl_secs: u64) -> Result<String>;
    /// One entry per input path, same order; `None` where signing failed.
    async fn create_signed_urls(
        &self,
        bucket: &str,
        paths: &[String],
        ttl_secs: u64,
    ) -> Result<Vec<Option<String>>>;
}

/// Keeps the access token usable before a request goes out.
#[async_trait]
pub trait SessionRefresher: Send + Sync {
    /// Refresh the session when its token is close to expiry.
    async fn refresh_if_expiring(&self) -> Result<()>;
}

/// Remote function invocation.
#[async_trait]
pub trait FunctionInvoker: Send + Sync {
    async fn invoke(&self, name: &str, payload: serde_json::Value) -> Result<()>;
}

/// REST client for one backend project. Requests are signed with the
/// current session's access token, or the anon key when signed out.
#[derive(Clone)]
pub struct BackendClient {
    http: Client,
    base_url: String,
    anon_key: String,
    session: watch::Receiver<Option<AuthSession>>,
}

impl BackendClient {
    pub fn new(
        http: Client,
        cfg: &BackendCfg,
        session: watch::Receiver<Option<AuthSession>>,
    ) -> Self {
        Self {
            http,
            base_url: cfg.url.trim_end_matches('/').to_string(),
            anon_key: cfg.anon_key.clone(),
            session,
        }
    }

    pub(crate) fn http(&self) -> &Client {
        &self.http
    }

    /// Absolute URL for a path below the project root.
    pub(crate) fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn bearer(&self) -> String {
        self.session
            .borrow()
            .as_ref()
            .map(|s| s.access_token.clone())
            .unwrap_or_else(|| self.anon_key.clone())
    }

    /// Attach `apikey` and bearer headers.
    pub(crate) fn authed(&self, req: RequestBuilder) -> RequestBuilder {
        req.header("apikey", &self.anon_key).bearer_auth(self.bearer())
    }
}

/// Convert non-2xx responses into a structured error.
pub(crate) async fn ensure_success(resp: reqwest::Response) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_else(|_| "".into());
    Err(anyhow!("HTTP status {status} error: {body}"))
}

/// Percent-encode each segment of an object key, keeping the slashes.
pub(crate) fn encode_object_path(path: &str) -> String {
    path.split('/')
        .map(|seg| urlencoding::encode(seg).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}
