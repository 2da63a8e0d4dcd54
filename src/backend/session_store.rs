//! Local persistence for the auth session and Google OAuth tokens.

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Serialize, de::DeserializeOwned};
use sha2::{Digest, Sha256};
use std::{collections::HashMap, io::ErrorKind, path::PathBuf, sync::Arc};
use tokio::{
    fs,
    io::{AsyncWriteExt, BufWriter},
    sync::Mutex,
};
use yup_oauth2::storage::{TokenInfo, TokenStorage, TokenStorageError};

type Entries = HashMap<String, serde_json::Value>;

/// JSON file holding named entries (`session.json`).
///
/// Writes are serialized through a lock so the OAuth flow and the session
/// manager never interleave a read-modify-write.
#[derive(Clone)]
pub struct FileTokenStorage {
    /// Location of the store on disk.
    path: PathBuf,
    lock: Arc<Mutex<()>>,
}

/// Stable, filesystem-neutral hash of a key.
fn hash_key(parts: &[&str]) -> String {
    let joined = parts.join(" ");
    URL_SAFE_NO_PAD.encode(Sha256::digest(joined.as_bytes()))
}

impl FileTokenStorage {
    /// Create a new storage backed by the given path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// Key for the OAuth token of a scope set (order-insensitive).
    fn oauth_key(scopes: &[&str]) -> String {
        let mut v: Vec<&str> = scopes.to_vec();
        v.sort_unstable();
        v.dedup();
        format!("oauth_token:{}", hash_key(&v))
    }

    /// Key for the auth session of one backend project.
    pub fn session_key(project_url: &str) -> String {
        format!("session:{}", hash_key(&[project_url.trim_end_matches('/')]))
    }

    pub async fn get_entry<T: DeserializeOwned>(&self, key: &str) -> anyhow::Result<Option<T>> {
        let _g = self.lock.lock().await;
        let mut map = self.load_map().await?;
        match map.remove(key) {
            Some(v) => Ok(Some(serde_json::from_value(v)?)),
            None => Ok(None),
        }
    }

    pub async fn set_entry<T: Serialize>(&self, key: &str, value: &T) -> anyhow::Result<()> {
        let value = serde_json::to_value(value)?;
        let _g = self.lock.lock().await;
        let mut map = self.load_map().await?;
        map.insert(key.to_string(), value);
        self.save_map(&map).await
    }

    pub async fn remove_entry(&self, key: &str) -> anyhow::Result<()> {
        let _g = self.lock.lock().await;
        let mut map = self.load_map().await?;
        if map.remove(key).is_some() {
            self.save_map(&map).await?;
        }
        Ok(())
    }

    /// Load the entire map from disk.
    async fn load_map(&self) -> anyhow::Result<Entries> {
        match fs::read(&self.path).await {
            Ok(data) => {
                if data.is_empty() {
                    return Ok(HashMap::new());
                }
                Ok(serde_json::from_slice(&data)?)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Persist the map to disk, creating directories if needed.
    async fn save_map(&self, map: &Entries) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).await?;
        }
        let data = serde_json::to_vec_pretty(map)?;
        let file = fs::File::create(&self.path).await?;
        let mut writer = BufWriter::new(file);
        writer.write_all(&data).await?;
        writer.flush().await?;
        Ok(())
    }
}

fn storage_err(e: anyhow::Error) -> TokenStorageError {
    TokenStorageError::Other(e.to_string().into())
}

#[async_trait]
impl TokenStorage for FileTokenStorage {
    /// Store or replace the token for the given scopes.
    async fn set(&self, scopes: &[&str], token: TokenInfo) -> Result<(), TokenStorageError> {
        self.set_entry(&Self::oauth_key(scopes), &token)
            .await
            .map_err(storage_err)
    }

    /// Retrieve the token for the given scopes, if present.
    async fn get(&self, scopes: &[&str]) -> Option<TokenInfo> {
        self.get_entry(&Self::oauth_key(scopes)).await.ok().flatten()
    }
}
