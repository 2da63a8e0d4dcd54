//! 非公開ストレージオブジェクトの署名付きURL解決。

use anyhow::{Result, anyhow};
use std::sync::Arc;

use crate::backend::ObjectStorage;

/// 1バケット分の期限付きURLをストレージに問い合わせる。状態は持たない。
#[derive(Clone)]
pub struct SignedUrlResolver {
    storage: Arc<dyn ObjectStorage>,
    bucket: String,
    ttl_secs: u64,
}

impl SignedUrlResolver {
    pub fn new(storage: Arc<dyn ObjectStorage>, bucket: impl Into<String>, ttl_secs: u64) -> Self {
        Self {
            storage,
            bucket: bucket.into(),
            ttl_secs,
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub async fn resolve(&self, path: &str) -> Result<String> {
        self.storage
            .create_signed_url(&self.bucket, path, self.ttl_secs)
            .await
    }

    /// 順序を保つ一括署名。署名できなかった要素は `None`。
    pub async fn resolve_many(&self, paths: &[String]) -> Result<Vec<Option<String>>> {
        if paths.is_empty() {
            return Ok(Vec::new());
        }
        let urls = self
            .storage
            .create_signed_urls(&self.bucket, paths, self.ttl_secs)
            .await?;
        if urls.len() != paths.len() {
            return Err(anyhow!(
                "signed url batch returned {} entries for {} paths",
                urls.len(),
                paths.len()
            ));
        }
        Ok(urls)
    }

    /// ジョブの2つのURLを `(output, input)` で返す。
    pub async fn resolve_pair(&self, output: String, input: String) -> Result<(Option<String>, Option<String>)> {
        let mut urls = self.resolve_many(&[output, input]).await?.into_iter();
        let output = urls.next().flatten();
        let input = urls.next().flatten();
        Ok((output, input))
    }
}
