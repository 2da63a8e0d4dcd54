//! クライアント側の同期コア。ジョブとテンプレートの購読可能なコレクション、
//! ページング、ポーリング、署名付きURLの反映を扱う。

pub mod cursor;
pub mod detached;
pub mod jobs;
pub mod model;
pub mod poller;
pub mod resolver;
pub mod store;
pub mod templates;

#[cfg(test)]
pub mod testing;

/// 1ページ取得の結果。取得はエラーを返さず、ログに残すだけ。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FetchOutcome {
    /// 別の取得が進行中だったので捨てた。
    Skipped,
    /// `has_more` がすでにfalse。
    Exhausted,
    /// 失敗。要素はそのままでローディングだけ解除する。
    Failed,
    /// リセットか新しい検索に置き換えられたので行を捨てた。
    Stale,
    Fetched { received: usize },
}

/// 1回のポーリングの集計。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PollReport {
    pub checked: usize,
    pub changed: usize,
    pub failed: usize,
}
