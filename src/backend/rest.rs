//! Row queries and RPCs over the REST endpoint (`/rest/v1`).

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};

use super::{BackendClient, JobsBackend, ProfileBackend, TemplatesBackend, ensure_success};
use crate::sync::{
    cursor::PageRange,
    model::{JobRow, JobStatus, Profile, TemplateRow},
};

/// `create_job` RPC body.
#[derive(Debug, Serialize)]
struct CreateJobReq<'a> {
    template_id: &'a str,
}

/// `update_job_status` RPC body.
#[derive(Debug, Serialize)]
struct UpdateStatusReq<'a> {
    job_id: &'a str,
    new_status: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_msg: Option<&'a str>,
}

impl BackendClient {
    /// GET rows from `table` with PostgREST query parameters.
    async fn select<T: DeserializeOwned>(&self, table: &str, params: &[(&str, String)]) -> Result<Vec<T>> {
        let url = self.endpoint(&format!("/rest/v1/{table}"));
        let req = self.authed(self.http().get(url)).query(params);
        let resp = ensure_success(req.send().await?).await?;
        Ok(resp.json::<Vec<T>>().await?)
    }

    /// POST a remote procedure call and return its JSON result.
    async fn rpc<B: Serialize + Sync>(&self, name: &str, body: &B) -> Result<serde_json::Value> {
        let url = self.endpoint(&format!("/rest/v1/rpc/{name}"));
        let resp = self.authed(self.http().post(url)).json(body).send().await?;
        let resp = ensure_success(resp).await?;
        let text = resp.text().await?;
        if text.trim().is_empty() {
            return Ok(serde_json::Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }
}

/// `offset`/`limit` pair for an inclusive range.
fn range_params(range: PageRange) -> [(&'static str, String); 2] {
    [
        ("offset", range.start.to_string()),
        ("limit", range.len().to_string()),
    ]
}

/// `ilike` operand matching `query` anywhere in the column.
///
/// `%`, `_` and `\` are escaped for LIKE. PostgREST turns every `*` into `%`,
/// so a literal `*` can only be matched by the single-character wildcard.
/// The value is double-quoted so `,.:()` need no special handling.
pub(crate) fn contains_pattern(query: &str) -> String {
    let mut like = String::with_capacity(query.len() + 2);
    for c in query.chars() {
        match c {
            '\\' | '%' | '_' => {
                like.push('\\');
                like.push(c);
            }
            '*' => like.push('_'),
            c => like.push(c),
        }
    }
    let mut quoted = String::with_capacity(like.len() + 4);
    for c in like.chars() {
        if matches!(c, '\\' | '"') {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    format!("ilike.\"*{quoted}*\"")
}

#[async_trait]
impl JobsBackend for BackendClient {
    async fn list_jobs(&self, range: PageRange) -> Result<Vec<JobRow>> {
        let mut params = vec![
            ("select", "*".to_string()),
            ("order", "created_at.desc".to_string()),
        ];
        params.extend(range_params(range));
        self.select("jobs", &params).await
    }

    async fn fetch_job(&self, job_id: &str) -> Result<Option<JobRow>> {
        let params = [
            ("select", "*".to_string()),
            ("id", format!("eq.{job_id}")),
            ("limit", "1".to_string()),
        ];
        let rows: Vec<JobRow> = self.select("jobs", &params).await?;
        Ok(rows.into_iter().next())
    }

    async fn create_job(&self, template_id: &str) -> Result<String> {
        let v = self.rpc("create_job", &CreateJobReq { template_id }).await?;
        v.as_str()
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .ok_or_else(|| anyhow!("create_job returned no id: {v}"))
    }

    async fn update_job_status(
        &self,
        job_id: &str,
        status: JobStatus,
        error_msg: Option<&str>,
    ) -> Result<()> {
        let body = UpdateStatusReq {
            job_id,
            new_status: status.as_str(),
            error_msg,
        };
        self.rpc("update_job_status", &body).await?;
        Ok(())
    }
}

#[async_trait]
impl TemplatesBackend for BackendClient {
    async fn list_templates(
        &self,
        range: PageRange,
        name_filter: Option<&str>,
    ) -> Result<Vec<TemplateRow>> {
        let mut params = vec![
            ("select", "*".to_string()),
            ("order", "created_at.desc".to_string()),
        ];
        if let Some(q) = name_filter.map(str::trim).filter(|q| !q.is_empty()) {
            params.push(("name", contains_pattern(q)));
        }
        params.extend(range_params(range));
        self.select("templates", &params).await
    }

    async fn fetch_template(&self, id: &str) -> Result<Option<TemplateRow>> {
        let params = [
            ("select", "*".to_string()),
            ("id", format!("eq.{id}")),
            ("limit", "1".to_string()),
        ];
        let rows: Vec<TemplateRow> = self.select("templates", &params).await?;
        Ok(rows.into_iter().next())
    }
}

#[async_trait]
impl ProfileBackend for BackendClient {
    async fn fetch_profile(&self) -> Result<Option<Profile>> {
        let params = [
            ("select", "full_name,avatar_url".to_string()),
            ("limit", "1".to_string()),
        ];
        let rows: Vec<Profile> = self.select("profiles", &params).await?;
        Ok(rows.into_iter().next())
    }
}
