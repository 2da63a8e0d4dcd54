//! バックエンドへのサインインに使うGoogle IDトークンを得るOAuthフロー。

use anyhow::{Context, Result, anyhow};
use std::{future::Future, path::Path, pin::Pin, result::Result as StdResult};
use yup_oauth2::authenticator::Authenticator;
use yup_oauth2::authenticator_delegate::{DefaultInstalledFlowDelegate, InstalledFlowDelegate};
use yup_oauth2::{
    DefaultHyperClientBuilder, HyperClientBuilder, InstalledFlowAuthenticator,
    InstalledFlowReturnMethod,
};

use super::session_store::FileTokenStorage;

/// アプリ全体で使うAuthenticator型。
pub type InstalledAuth =
    Authenticator<<DefaultHyperClientBuilder as HyperClientBuilder>::Connector>;

/// GoogleにIDトークンを返させるためのスコープ。
pub const SCOPES: [&str; 3] = ["openid", "email", "profile"];

#[derive(Copy, Clone)]
/// ブラウザで同意画面を開き、標準のフロー処理へ委譲するデリゲート。
struct InstalledFlowBrowserDelegate;

/// ブラウザを起動し、標準のインストールフローへフォールバックする。
async fn browser_user_url(url: &str, need_code: bool) -> StdResult<String, String> {
    // URLは既定のデリゲートも表示するので、起動失敗はログだけ残す。
    if let Err(e) = webbrowser::open(url) {
        tracing::warn!("could not open browser: {e}");
    }
    DefaultInstalledFlowDelegate
        .present_user_url(url, need_code)
        .await
}

impl InstalledFlowDelegate for InstalledFlowBrowserDelegate {
    fn present_user_url<'a>(
        &'a self,
        url: &'a str,
        need_code: bool,
    ) -> Pin<Box<dyn Future<Output = StdResult<String, String>> + Send + 'a>> {
        Box::pin(browser_user_url(url, need_code))
    }
}

/// トークンを `storage` に保存するInstalled Flow用のAuthenticatorを構築する。
pub async fn authenticator(client_secret: &Path, storage: FileTokenStorage) -> Result<InstalledAuth> {
    let secret = yup_oauth2::read_application_secret(client_secret)
        .await
        .with_context(|| format!("read client secret {}", client_secret.display()))?;

    // ブラウザへのリダイレクトでコードを受け取る。

    let auth = InstalledFlowAuthenticator::builder(secret, InstalledFlowReturnMethod::HTTPRedirect)
        .with_storage(Box::new(storage))
        .flow_delegate(Box::new(InstalledFlowBrowserDelegate))
        .build()
        .await?;

    Ok(auth)
}

/// 同意フローを実行（または再利用）してGoogleのIDトークンを返す。
pub async fn google_id_token(authn: &InstalledAuth) -> Result<String> {
    authn
        .id_token(&SCOPES)
        .await?
        .ok_or_else(|| anyhow!("Google did not return an id token"))
}
