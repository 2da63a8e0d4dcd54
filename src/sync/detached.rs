//! 投げっぱなしの非同期処理。

use std::future::Future;

/// ハンドルを返さずに `work` をランタイムへ流す。
///
/// 結果は誰も待たない。エラーはログに書いて捨て、リトライもしない。
pub fn spawn_detached<F>(label: &'static str, work: F)
where
    F: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    tokio::spawn(async move {
        match work.await {
            Ok(()) => tracing::debug!("{label} finished"),
            Err(e) => tracing::error!("{label} failed: {e:#}"),
        }
    });
}
