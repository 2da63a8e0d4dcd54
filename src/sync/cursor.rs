//! ページングカーソルと、コレクションごとの多重取得ガード。

use std::sync::{
    Mutex,
    atomic::{AtomicU64, Ordering},
};

/// 1ページ分の行範囲（両端を含む）。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageRange {
    pub start: u32,
    pub end: u32,
}

impl PageRange {
    pub fn len(&self) -> u32 {
        self.end.saturating_sub(self.start).saturating_add(1)
    }
}

/// 1コレクション分の `(page, page_size, has_more)` を保持する。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageCursor {
    /// 最後に読み込めたページ（0始まり）。
    page: u32,
    page_size: u32,
    has_more: bool,
}

impl PageCursor {
    pub fn new(page_size: u32) -> Self {
        Self {
            page: 0,
            page_size: page_size.max(1),
            has_more: true,
        }
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    /// 範囲 `[page*size, page*size + size - 1]`。
    pub fn range(&self, page: u32) -> PageRange {
        let start = page.saturating_mul(self.page_size);
        PageRange {
            start,
            end: start.saturating_add(self.page_size - 1),
        }
    }

    /// `load_more` が要求すべきページ。末尾まで読んだら `None`。
    pub fn next_page(&self) -> Option<u32> {
        self.has_more.then(|| self.page + 1)
    }

    /// `page` の取得結果を記録する。件数がページサイズ未満なら終端とみなす。
    pub fn record(&mut self, page: u32, received: usize) {
        self.has_more = received >= self.page_size as usize;
        if received > 0 {
            self.page = page;
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.page_size);
    }
}

static NEXT_TICKET: AtomicU64 = AtomicU64::new(1);

/// 多重取得ガード。1コレクションにつき同時に走る取得は1つまで。
///
/// 取得中に来た要求はキューせず捨てる。検索やリフレッシュは
/// [`FetchGate::force_enter`] でゲートを奪い、古いチケットは何も解放しない。
#[derive(Debug, Default)]
pub struct FetchGate {
    in_flight: Mutex<Option<u64>>,
}

impl FetchGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_busy(&self) -> bool {
        self.lock().is_some()
    }

    /// 取得中でなければ入る。
    pub fn try_enter(&self) -> Option<FetchTicket<'_>> {
        let mut slot = self.lock();
        if slot.is_some() {
            return None;
        }
        let id = NEXT_TICKET.fetch_add(1, Ordering::Relaxed);
        *slot = Some(id);
        Some(FetchTicket { gate: self, id })
    }

    /// 取得中のものを無視して入る。
    pub fn force_enter(&self) -> FetchTicket<'_> {
        let id = NEXT_TICKET.fetch_add(1, Ordering::Relaxed);
        *self.lock() = Some(id);
        FetchTicket { gate: self, id }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<u64>> {
        // 中身はただのOptionなので、poisonされても値はそのまま使える。
        self.in_flight.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// 取得中に保持し、dropでゲートを解放する。
#[derive(Debug)]
pub struct FetchTicket<'a> {
    gate: &'a FetchGate,
    id: u64,
}

impl Drop for FetchTicket<'_> {
    fn drop(&mut self) {
        let mut slot = self.gate.lock();
        if *slot == Some(self.id) {
            *slot = None;
        }
    }
}
