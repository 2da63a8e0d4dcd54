//! 認証セッションのライフサイクル（サインイン、復元、更新、サインアウト）。

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::sync::watch;

use super::{SessionRefresher, auth, ensure_success, session_store::FileTokenStorage};
use crate::config::BackendCfg;

/// アクセストークン失効のこの秒数前から更新する。
const REFRESH_MARGIN_SECS: i64 = 60;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// ローカルに保存するサインイン済みセッション。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuthSession {
    pub access_token: String,
    pub refresh_token: String,
    /// Unix秒。
    pub expires_at: i64,
    pub user: AuthUser,
}

impl AuthSession {
    pub fn expires_within(&self, secs: i64) -> bool {
        self.expires_at - Utc::now().timestamp() <= secs
    }
}

/// トークンエンドポイントの応答。
#[derive(Debug, Deserialize)]
struct TokenResp {
    access_token: String,
    refresh_token: String,
    expires_in: i64,
    #[serde(default)]
    expires_at: Option<i64>,
    user: AuthUser,
}

impl From<TokenResp> for AuthSession {
    fn from(r: TokenResp) -> Self {
        Self {
            expires_at: r
                .expires_at
                .unwrap_or_else(|| Utc::now().timestamp() + r.expires_in),
            access_token: r.access_token,
            refresh_token: r.refresh_token,
            user: r.user,
        }
    }
}

/// 現在のセッションを持ち、変更のたびに通知する。
pub struct SessionManager {
    http: Client,
    base_url: String,
    anon_key: String,
    storage: FileTokenStorage,
    key: String,
    tx: watch::Sender<Option<AuthSession>>,
}

impl SessionManager {
    pub fn new(http: Client, cfg: &BackendCfg, storage: FileTokenStorage) -> Self {
        let (tx, _rx) = watch::channel(None);
        Self {
            http,
            base_url: cfg.url.trim_end_matches('/').to_string(),
            anon_key: cfg.anon_key.clone(),
            key: FileTokenStorage::session_key(&cfg.url),
            storage,
            tx,
        }
    }

    /// サインイン中なら現在のセッション。
    pub fn session(&self) -> Option<AuthSession> {
        self.tx.borrow().clone()
    }

    /// サインイン・更新・サインアウトで通知されるReceiver。
    pub fn subscribe(&self) -> watch::Receiver<Option<AuthSession>> {
        self.tx.subscribe()
    }

    pub fn storage(&self) -> &FileTokenStorage {
        &self.storage
    }

    /// 保存済みセッションを読み込み、期限切れなら更新する。
    /// 更新できないセッションは破棄する。
    pub async fn restore(&self) -> Result<Option<AuthSession>> {
        let Some(saved) = self.storage.get_entry::<AuthSession>(&self.key).await? else {
            return Ok(None);
        };
        if !saved.expires_within(REFRESH_MARGIN_SECS) {
            self.tx.send_replace(Some(saved.clone()));
            return Ok(Some(saved));
        }
        match self.refresh(&saved.refresh_token).await {
            Ok(s) => Ok(Some(s)),
            Err(e) => {
                tracing::warn!("stored session could not be refreshed: {e:#}");
                self.publish(None).await?;
                Ok(None)
            }
        }
    }

    /// Googleの同意フローを通し、IDトークンをセッションに交換する。
    pub async fn sign_in_with_google(&self, client_secret: &Path) -> Result<AuthSession> {
        let authn = auth::authenticator(client_secret, self.storage.clone()).await?;
        let id_token = auth::google_id_token(&authn).await?;
        self.sign_in_with_id_token("google", &id_token).await
    }

    pub async fn sign_in_with_id_token(&self, provider: &str, id_token: &str) -> Result<AuthSession> {
        let body = serde_json::json!({ "provider": provider, "id_token": id_token });
        let session = self.token_request("id_token", &body).await?;
        tracing::info!("signed in as {}", session.user.id);
        self.publish(Some(session.clone())).await?;
        Ok(session)
    }

    /// 失効間近ならアクセストークンを更新する。
    pub async fn ensure_fresh(&self) -> Result<()> {
        let Some(current) = self.session() else {
            return Ok(());
        };
        if current.expires_within(REFRESH_MARGIN_SECS) {
            self.refresh(&current.refresh_token).await?;
        }
        Ok(())
    }

    /// サーバー側で失効させ（失敗は無視）、ローカルのセッションを消す。
    pub async fn sign_out(&self) -> Result<()> {
        if let Some(current) = self.session() {
            let url = format!("{}/auth/v1/logout", self.base_url);
            let res = self
                .http
                .post(url)
                .header("apikey", &self.anon_key)
                .bearer_auth(&current.access_token)
                .send()
                .await;
            match res {
                Ok(resp) => {
                    if let Err(e) = ensure_success(resp).await {
                        tracing::warn!("logout rejected: {e}");
                    }
                }
                Err(e) => tracing::warn!("logout request failed: {e}"),
            }
        }
        self.publish(None).await?;
        tracing::info!("signed out");
        Ok(())
    }

    async fn refresh(&self, refresh_token: &str) -> Result<AuthSession> {
        let body = serde_json::json!({ "refresh_token": refresh_token });
        let session = self.token_request("refresh_token", &body).await?;
        tracing::info!("session refreshed");
        self.publish(Some(session.clone())).await?;
        Ok(session)
    }

    async fn token_request(&self, grant_type: &str, body: &serde_json::Value) -> Result<AuthSession> {
        let url = format!("{}/auth/v1/token", self.base_url);
        let resp = self
            .http
            .post(url)
            .query(&[("grant_type", grant_type)])
            .header("apikey", &self.anon_key)
            .json(body)
            .send()
            .await?;
        let resp = ensure_success(resp)
            .await
            .map_err(|e| anyhow!("{grant_type} grant failed: {e}"))?;
        Ok(resp.json::<TokenResp>().await?.into())
    }

    /// 保存して通知する。
    async fn publish(&self, session: Option<AuthSession>) -> Result<()> {
        match &session {
            Some(s) => self.storage.set_entry(&self.key, s).await?,
            None => self.storage.remove_entry(&self.key).await?,
        }
        self.tx.send_replace(session);
        Ok(())
    }
}

#[async_trait]
impl SessionRefresher for SessionManager {
    async fn refresh_if_expiring(&self) -> Result<()> {
        self.ensure_fresh().await
    }
}
