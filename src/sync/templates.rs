//! テンプレート一覧。ページングと検索ができ、プレビューURLは後から署名する。

use std::sync::Arc;

use tokio::task::JoinSet;

use super::{
    FetchOutcome,
    cursor::{FetchGate, FetchTicket},
    model::Template,
    resolver::SignedUrlResolver,
    store::{Merge, Store},
};
use crate::backend::TemplatesBackend;

struct Inner {
    backend: Arc<dyn TemplatesBackend>,
    resolver: SignedUrlResolver,
    store: Store<Template>,
    gate: FetchGate,
}

#[derive(Clone)]
pub struct TemplateBrowser {
    inner: Arc<Inner>,
}

impl TemplateBrowser {
    pub fn new(
        backend: Arc<dyn TemplatesBackend>,
        resolver: SignedUrlResolver,
        store: Store<Template>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                backend,
                resolver,
                store,
                gate: FetchGate::new(),
            }),
        }
    }

    pub fn store(&self) -> &Store<Template> {
        &self.inner.store
    }

    pub fn find(&self, id: &str) -> Option<Template> {
        self.inner.store.get(id)
    }

    pub async fn fetch_page(&self, page: u32) -> FetchOutcome {
        let Some(ticket) = self.inner.gate.try_enter() else {
            tracing::debug!("templates fetch of page {page} skipped: fetch in flight");
            return FetchOutcome::Skipped;
        };
        self.fetch_with(ticket, page).await
    }

    pub async fn load_more(&self) -> FetchOutcome {
        if self.inner.gate.is_busy() {
            return FetchOutcome::Skipped;
        }
        match self.inner.store.with(|s| s.cursor.next_page()) {
            Some(page) => self.fetch_page(page).await,
            None => FetchOutcome::Exhausted,
        }
    }

    /// 検索クエリを保ったままページ0を読み直す。
    pub async fn refresh(&self) -> FetchOutcome {
        self.inner.store.reset();
        self.force_first_page().await
    }

    /// 名前の絞り込みを差し替えてページ0から読み直す。
    ///
    /// 前のクエリで走っている取得は置き換えられ、その行は届いても捨てる。
    pub async fn search(&self, query: &str) -> FetchOutcome {
        tracing::debug!("template search {query:?}");
        self.inner.store.reset_with_query(query);
        self.force_first_page().await
    }

    /// 検索クエリも消す全体リセット。
    pub async fn pull_to_refresh(&self) -> FetchOutcome {
        let store = &self.inner.store;
        store.set_refreshing(true);
        store.reset_with_query("");
        let outcome = self.force_first_page().await;
        store.set_refreshing(false);
        outcome
    }

    pub fn clear(&self) {
        self.inner.store.reset_with_query("");
    }

    /// テンプレート1件の署名付きプレビュー。読み込み済みページに無ければ
    /// バックエンドから引く。
    pub async fn preview_for(&self, template_id: &str) -> anyhow::Result<Option<Template>> {
        let mut template = match self.find(template_id) {
            Some(t) if t.preview_url.is_some() => return Ok(Some(t)),
            Some(t) => t,
            None => match self.inner.backend.fetch_template(template_id).await? {
                Some(row) => Template::skeleton(&row),
                None => return Ok(None),
            },
        };
        template.preview_url = Some(self.inner.resolver.resolve(&template.preview_path).await?);
        Ok(Some(template))
    }

    async fn force_first_page(&self) -> FetchOutcome {
        let ticket = self.inner.gate.force_enter();
        self.fetch_with(ticket, 0).await
    }

    async fn fetch_with(&self, ticket: FetchTicket<'_>, page: u32) -> FetchOutcome {
        let inner = &self.inner;
        let (generation, query) = inner.store.begin_fetch();
        let range = inner.store.with(|s| s.cursor.range(page));
        let filter = Some(query.trim()).filter(|q| !q.is_empty());

        let rows = match inner.backend.list_templates(range, filter).await {
            Ok(rows) => rows,
            Err(e) => {
                tracing::error!("error fetching templates page {page}: {e:#}");
                inner.store.end_fetch(generation);
                return FetchOutcome::Failed;
            }
        };

        let received = rows.len();
        let templates: Vec<Template> = rows.iter().map(Template::skeleton).collect();
        let merge = if page == 0 { Merge::Replace } else { Merge::Append };
        if !inner
            .store
            .apply_page(generation, page, templates.clone(), merge)
        {
            tracing::debug!("discarding templates page {page} for {query:?}: superseded");
            return FetchOutcome::Stale;
        }
        tracing::info!("templates page {page} ({query:?}): {received} rows");

        // ローディングは解除済み。プレビュー解決中も次ページの要求を受け付ける。
        drop(ticket);
        let mut set = JoinSet::new();
        for t in templates {
            let resolver = inner.resolver.clone();
            let store = inner.store.clone();
            set.spawn(async move {
                match resolver.resolve(&t.preview_path).await {
                    Ok(url) => {
                        store.patch(&t.id, |rec| rec.preview_url = Some(url));
                    }
                    Err(e) => tracing::warn!("preview url for template {} failed: {e:#}", t.id),
                }
            });
        }
        while set.join_next().await.is_some() {}

        FetchOutcome::Fetched { received }
    }
}
