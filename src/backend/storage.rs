//! Object storage API helpers (`/storage/v1`).

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::{BackendClient, ObjectStorage, encode_object_path, ensure_success};

/// Single signed URL request body.
#[derive(Debug, Serialize)]
struct SignReq {
    #[serde(rename = "expiresIn")]
    expires_in: u64,
}

/// Batch signed URL request body.
#[derive(Debug, Serialize)]
struct SignManyReq<'a> {
    #[serde(rename = "expiresIn")]
    expires_in: u64,
    paths: &'a [String],
}

/// Single signed URL response; the URL is relative to `/storage/v1`.
#[derive(Debug, Deserialize)]
struct SignResp {
    #[serde(rename = "signedURL")]
    signed_url: String,
}

/// One entry of the batch response.
#[derive(Debug, Deserialize)]
struct SignManyEntry {
    #[serde(rename = "signedURL", default)]
    signed_url: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    path: Option<String>,
}

impl BackendClient {
    /// Turn a relative signed path into an absolute URL.
    fn absolute_signed(&self, relative: &str) -> String {
        if relative.starts_with("http://") || relative.starts_with("https://") {
            relative.to_string()
        } else {
            self.endpoint(&format!("/storage/v1{relative}"))
        }
    }

    /// Download `url` into `dir` and return the written file path.
    pub async fn download_to(&self, url: &str, dir: &Path, file_name: &str) -> Result<PathBuf> {
        let resp = self.http().get(url).send().await?;
        let bytes = ensure_success(resp).await?.bytes().await?;
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("create {}", dir.display()))?;
        let dest = dir.join(file_name);
        tokio::fs::write(&dest, &bytes)
            .await
            .with_context(|| format!("write {}", dest.display()))?;
        Ok(dest)
    }
}

#[async_trait]
impl ObjectStorage for BackendClient {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<()> {
        let url = self.endpoint(&format!(
            "/storage/v1/object/{}/{}",
            bucket,
            encode_object_path(path)
        ));
        let resp = self
            .authed(self.http().post(url))
            .header("content-type", content_type)
            .header("x-upsert", "true")
            .body(bytes)
            .send()
            .await?;
        ensure_success(resp).await?;
        Ok(())
    }

    async fn create_signed_url(&self, bucket: &str, path: &str, ttl_secs: u64) -> Result<String> {
        let url = self.endpoint(&format!(
            "/storage/v1/object/sign/{}/{}",
            bucket,
            encode_object_path(path)
        ));
        let resp = self
            .authed(self.http().post(url))
            .json(&SignReq {
                expires_in: ttl_secs,
            })
            .send()
            .await?;
        let signed = ensure_success(resp).await?.json::<SignResp>().await?;
        Ok(self.absolute_signed(&signed.signed_url))
    }

    async fn create_signed_urls(
        &self,
        bucket: &str,
        paths: &[String],
        ttl_secs: u64,
    ) -> Result<Vec<Option<String>>> {
        let url = self.endpoint(&format!("/storage/v1/object/sign/{bucket}"));
        let resp = self
            .authed(self.http().post(url))
            .json(&SignManyReq {
                expires_in: ttl_secs,
                paths,
            })
            .send()
            .await?;
        let entries = ensure_success(resp)
            .await?
            .json::<Vec<SignManyEntry>>()
            .await?;
        if entries.len() != paths.len() {
            return Err(anyhow!(
                "sign batch returned {} entries for {} paths",
                entries.len(),
                paths.len()
            ));
        }
        Ok(entries
            .into_iter()
            .map(|e| match (e.signed_url, e.error) {
                (Some(u), None) => Some(self.absolute_signed(&u)),
                (_, err) => {
                    tracing::warn!(
                        "no signed url for {}: {}",
                        e.path.as_deref().unwrap_or("?"),
                        err.as_deref().unwrap_or("missing")
                    );
                    None
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::test_support::client_for;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn upload_posts_raw_bytes_with_upsert() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/storage/v1/object/jobs/u1/j1/input.png"))
            .and(header("content-type", "image/png"))
            .and(header("x-upsert", "true"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "Key": "jobs/u1/j1/input.png" })))
            .expect(1)
            .mount(&server)
            .await;

        let (client, _tx) = client_for(&server, Some("tok"));
        client
            .upload("jobs", "u1/j1/input.png", vec![1, 2, 3], "image/png")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn single_sign_returns_absolute_url() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/storage/v1/object/sign/templates/t1/preview.png"))
            .and(body_json(serde_json::json!({ "expiresIn": 3600 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "signedURL": "/object/sign/templates/t1/preview.png?token=abc"
            })))
            .mount(&server)
            .await;

        let (client, _tx) = client_for(&server, Some("tok"));
        let url = client
            .create_signed_url("templates", "t1/preview.png", 3600)
            .await
            .unwrap();
        assert_eq!(
            url,
            format!(
                "{}/storage/v1/object/sign/templates/t1/preview.png?token=abc",
                server.uri()
            )
        );
    }

    #[tokio::test]
    async fn batch_sign_keeps_order_and_nulls_failures() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/storage/v1/object/sign/jobs"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                { "path": "u1/j1/output.png", "signedURL": null, "error": "Either the object does not exist or you do not have access to it" },
                { "path": "u1/j1/input.png", "signedURL": "/object/sign/jobs/u1/j1/input.png?token=x", "error": null }
            ])))
            .mount(&server)
            .await;

        let (client, _tx) = client_for(&server, Some("tok"));
        let urls = client
            .create_signed_urls(
                "jobs",
                &["u1/j1/output.png".into(), "u1/j1/input.png".into()],
                60,
            )
            .await
            .unwrap();
        assert_eq!(urls[0], None);
        assert!(urls[1].as_deref().unwrap().ends_with("/storage/v1/object/sign/jobs/u1/j1/input.png?token=x"));
    }

    #[tokio::test]
    async fn download_writes_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/img"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![9u8; 16]))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let (client, _tx) = client_for(&server, None);
        let dest = client
            .download_to(&format!("{}/img", server.uri()), dir.path(), "out.jpg")
            .await
            .unwrap();
        assert_eq!(std::fs::read(dest).unwrap().len(), 16);
    }
}
