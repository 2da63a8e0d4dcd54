//! Edge function invocation (`/functions/v1`).

use anyhow::Result;
use async_trait::async_trait;

use super::{BackendClient, FunctionInvoker, ensure_success};

#[async_trait]
impl FunctionInvoker for BackendClient {
    async fn invoke(&self, name: &str, payload: serde_json::Value) -> Result<()> {
        let url = self.endpoint(&format!("/functions/v1/{name}"));
        let resp = self
            .authed(self.http().post(url))
            .json(&payload)
            .send()
            .await?;
        ensure_success(resp).await?;
        Ok(())
    }
}
