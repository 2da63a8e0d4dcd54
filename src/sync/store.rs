//! 購読可能で重複のないコレクションストア。
//!
//! 状態は `tokio::sync::watch` の中にあり、読み手はスナップショットか
//! Receiverを受け取る。変更は下のマージ操作だけで行う。各操作は現在の状態と
//! 入力だけで結果が決まるので、初回取得・ポーリング・URL解決が調停なしに書き込める。

use std::{collections::HashSet, sync::Arc};
use tokio::sync::watch;

use super::{cursor::PageCursor, model::Keyed};

/// 1コレクションの描画に必要なものすべて。
#[derive(Clone, Debug, PartialEq)]
pub struct CollectionState<T> {
    pub items: Vec<T>,
    pub cursor: PageCursor,
    /// 空なら絞り込みなし。
    pub search_query: String,
    pub is_loading: bool,
    /// 明示的なプルリフレッシュの間だけ立つ。
    pub is_refreshing: bool,
    /// リセットのたびに増える。古い値の付いた取得結果は破棄する。
    pub generation: u64,
}

impl<T> CollectionState<T> {
    fn new(page_size: u32) -> Self {
        Self {
            items: Vec::new(),
            cursor: PageCursor::new(page_size),
            search_query: String::new(),
            is_loading: false,
            is_refreshing: false,
            generation: 0,
        }
    }
}

/// 取得したページのマージ方法。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Merge {
    /// ページ0：そのページで全体を置き換える。
    Replace,
    /// 2ページ目以降：未知のIDだけ追加する。
    Append,
}

/// コレクションの共有ハンドル。cloneしても同じ状態を指す。
pub struct Store<T> {
    tx: Arc<watch::Sender<CollectionState<T>>>,
}

impl<T> Clone for Store<T> {
    fn clone(&self) -> Self {
        Self {
            tx: Arc::clone(&self.tx),
        }
    }
}

impl<T: Keyed + Clone> Store<T> {
    pub fn new(page_size: u32) -> Self {
        let (tx, _rx) = watch::channel(CollectionState::new(page_size));
        Self { tx: Arc::new(tx) }
    }

    /// 変更通知。Receiverは常に最新状態を見る。
    pub fn subscribe(&self) -> watch::Receiver<CollectionState<T>> {
        self.tx.subscribe()
    }

    pub fn snapshot(&self) -> CollectionState<T> {
        self.tx.borrow().clone()
    }

    /// 全体をcloneせずに読む。
    pub fn with<R>(&self, f: impl FnOnce(&CollectionState<T>) -> R) -> R {
        f(&self.tx.borrow())
    }

    pub fn get(&self, id: &str) -> Option<T> {
        self.with(|s| s.items.iter().find(|r| r.key() == id).cloned())
    }

    /// 要素とページングを消して新しい世代を始め、その世代を返す。
    pub fn reset(&self) -> u64 {
        let mut generation = 0;
        self.tx.send_modify(|s| {
            s.items.clear();
            s.cursor.reset();
            s.is_loading = false;
            s.generation += 1;
            generation = s.generation;
        });
        generation
    }

    /// 検索クエリも差し替える [`Store::reset`]。
    pub fn reset_with_query(&self, query: &str) -> u64 {
        let mut generation = 0;
        self.tx.send_modify(|s| {
            s.items.clear();
            s.cursor.reset();
            s.is_loading = false;
            s.search_query = query.to_string();
            s.generation += 1;
            generation = s.generation;
        });
        generation
    }

    /// 取得開始を記録し、対象の世代とクエリを返す。
    pub fn begin_fetch(&self) -> (u64, String) {
        let mut tag = (0, String::new());
        self.tx.send_modify(|s| {
            s.is_loading = true;
            tag = (s.generation, s.search_query.clone());
        });
        tag
    }

    /// `generation` がまだ現行ならローディングを解除する。
    pub fn end_fetch(&self, generation: u64) {
        self.tx.send_if_modified(|s| {
            if s.generation != generation || !s.is_loading {
                return false;
            }
            s.is_loading = false;
            true
        });
    }

    /// 取得ページをマージしてカーソルに記録し、同じ書き込みでローディングを解除する。
    /// 置き換え済みの世代なら何もせず `false` を返す。
    pub fn apply_page(&self, generation: u64, page: u32, records: Vec<T>, merge: Merge) -> bool {
        let received = records.len();
        self.tx.send_if_modified(|s| {
            if s.generation != generation {
                return false;
            }
            match merge {
                Merge::Replace => {
                    s.items.clear();
                    append_unique(&mut s.items, records);
                }
                Merge::Append => append_unique(&mut s.items, records),
            }
            s.cursor.record(page, received);
            s.is_loading = false;
            true
        })
    }

    /// 先頭（最新）に追加する。同じIDがあればその場で置き換える。
    pub fn insert_front(&self, record: T) {
        self.tx.send_modify(|s| {
            match s.items.iter_mut().find(|r| r.key() == record.key()) {
                Some(existing) => *existing = record,
                None => s.items.insert(0, record),
            }
        });
    }

    /// `id` のレコードに `f` を適用する。存在したかを返す。
    pub fn patch(&self, id: &str, f: impl FnOnce(&mut T)) -> bool {
        self.tx.send_if_modified(|s| match s.items.iter_mut().find(|r| r.key() == id) {
            Some(r) => {
                f(r);
                true
            }
            None => false,
        })
    }

    pub fn set_refreshing(&self, refreshing: bool) {
        self.tx.send_if_modified(|s| {
            let changed = s.is_refreshing != refreshing;
            s.is_refreshing = refreshing;
            changed
        });
    }
}

/// ID重複を除いて追加する。`incoming` 内の重複も先勝ちで除く。
fn append_unique<T: Keyed>(items: &mut Vec<T>, incoming: Vec<T>) {
    let mut seen: HashSet<String> = items.iter().map(|r| r.key().to_string()).collect();
    for record in incoming {
        if seen.insert(record.key().to_string()) {
            items.push(record);
        }
    }
}
