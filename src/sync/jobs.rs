//! ジョブのライフサイクル管理。作成、アップロード、一覧、ポーリング、URL反映。

use std::{path::Path, sync::Arc, time::Duration};

use chrono::Utc;
use tokio::task::JoinSet;

use super::{
    FetchOutcome, PollReport,
    cursor::{FetchGate, FetchTicket},
    detached::spawn_detached,
    model::{Job, JobRow, JobStats, JobStatus, job_input_path},
    poller::PollGuard,
    resolver::SignedUrlResolver,
    store::{Merge, Store},
};
use crate::backend::{FunctionInvoker, JobsBackend, ObjectStorage, SessionRefresher};

/// 入力画像のアップロードに失敗したジョブに保存するメッセージ。
pub const UPLOAD_FAILED_MSG: &str = "Failed to upload input image";

/// [`JobEngine::create_job`] がユーザーへ返すエラー。
#[derive(Debug, thiserror::Error)]
pub enum CreateJobError {
    #[error("failed to create job: {0:#}")]
    Create(#[source] anyhow::Error),
    #[error("failed to upload image for job {job_id}: {source:#}")]
    Upload {
        job_id: String,
        #[source]
        source: anyhow::Error,
    },
}

/// `[sync]` 設定から取る調整値。
#[derive(Clone, Debug)]
pub struct JobSettings {
    pub poll_interval: Duration,
    /// アップロード成功後に呼ぶエッジ関数。
    pub process_function: String,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            process_function: "main".into(),
        }
    }
}

struct Inner {
    backend: Arc<dyn JobsBackend>,
    storage: Arc<dyn ObjectStorage>,
    functions: Arc<dyn FunctionInvoker>,
    resolver: SignedUrlResolver,
    store: Store<Job>,
    gate: FetchGate,
    settings: JobSettings,
}

/// 共有ハンドル。cloneは同じコレクションを操作する。
#[derive(Clone)]
pub struct JobEngine {
    inner: Arc<Inner>,
}

/// ジョブを表示する画面が開いている間、ポーリングを生かしておく。
///
/// drop（unwind中も含む）でタイマーが止まる。
#[must_use = "polling stops as soon as the view guard is dropped"]
pub struct ActiveJobsView {
    poll: PollGuard,
}

impl ActiveJobsView {
    pub fn deactivate(self) {
        self.poll.stop();
        tracing::debug!("jobs view deactivated");
    }
}

/// トークン更新の失敗はログだけ残して処理を続ける。
async fn keep_fresh(session: &dyn SessionRefresher) {
    if let Err(e) = session.refresh_if_expiring().await {
        tracing::warn!("token refresh before jobs request failed: {e:#}");
    }
}

impl JobEngine {
    pub fn new(
        backend: Arc<dyn JobsBackend>,
        storage: Arc<dyn ObjectStorage>,
        functions: Arc<dyn FunctionInvoker>,
        resolver: SignedUrlResolver,
        store: Store<Job>,
        settings: JobSettings,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                backend,
                storage,
                functions,
                resolver,
                store,
                gate: FetchGate::new(),
                settings,
            }),
        }
    }

    pub fn store(&self) -> &Store<Job> {
        &self.inner.store
    }

    pub fn stats(&self) -> JobStats {
        self.inner.store.with(|s| JobStats::tally(&s.items))
    }

    /// 画面表示時：一覧を更新し、未完了ジョブのポーリングを始める。
    ///
    /// 初回更新と各tickの前に `session` でアクセストークンを更新する。
    pub fn activate(&self, session: Arc<dyn SessionRefresher>) -> ActiveJobsView {
        let engine = self.clone();
        let mount_session = Arc::clone(&session);
        tokio::spawn(async move {
            keep_fresh(mount_session.as_ref()).await;
            engine.refresh().await;
        });
        let engine = self.clone();
        let poll = PollGuard::start(self.inner.settings.poll_interval, move || {
            let engine = engine.clone();
            let session = Arc::clone(&session);
            async move {
                keep_fresh(session.as_ref()).await;
                engine.poll_pending_jobs().await;
            }
        });
        tracing::debug!("jobs view activated");
        ActiveJobsView { poll }
    }

    /// ジョブを作成し、写真をアップロードして処理関数へ渡す。
    /// 処理の完了ではなく、処理を投げた時点で返る。
    pub async fn create_job(
        &self,
        user_id: &str,
        template_id: &str,
        image: &Path,
    ) -> Result<String, CreateJobError> {
        let inner = &self.inner;
        let job_id = inner
            .backend
            .create_job(template_id)
            .await
            .map_err(CreateJobError::Create)?;
        tracing::info!("job {job_id} created for template {template_id}");

        inner.store.insert_front(Job {
            job_id: job_id.clone(),
            user_id: user_id.to_string(),
            template_id: template_id.to_string(),
            status: JobStatus::Created,
            created_at: Utc::now(),
            generated_image_url: None,
            input_image_url: None,
            error_msg: None,
        });
        self.transition(&job_id, JobStatus::Uploading, None).await;

        let upload = async {
            let bytes = tokio::fs::read(image).await?;
            let path = job_input_path(user_id, &job_id);
            inner
                .storage
                .upload(inner.resolver.bucket(), &path, bytes, "image/png")
                .await
        };
        if let Err(source) = upload.await {
            tracing::error!("upload for job {job_id} failed: {source:#}");
            self.transition(&job_id, JobStatus::Failed, Some(UPLOAD_FAILED_MSG))
                .await;
            return Err(CreateJobError::Upload { job_id, source });
        }

        self.transition(&job_id, JobStatus::Processing, None).await;
        self.dispatch_processing(&job_id);
        Ok(job_id)
    }

    /// 処理関数を投げっぱなしで呼ぶ。待たず、リトライもしない。
    /// 失敗はログだけで、ジョブは `processing` のまま残る。
    pub fn dispatch_processing(&self, job_id: &str) {
        let functions = Arc::clone(&self.inner.functions);
        let name = self.inner.settings.process_function.clone();
        let payload = serde_json::json!({ "job_id": job_id });
        spawn_detached("process function", async move {
            functions.invoke(&name, payload).await
        });
    }

    /// ステータスをバックエンドへ送り、ローカルにも反映する。
    /// RPCの失敗はログに残し、ローカルのレコードは進める。
    async fn transition(&self, job_id: &str, status: JobStatus, error_msg: Option<&str>) {
        if let Err(e) = self
            .inner
            .backend
            .update_job_status(job_id, status, error_msg)
            .await
        {
            tracing::warn!("update_job_status({job_id}, {status}) failed: {e:#}");
        }
        self.inner.store.patch(job_id, |j| {
            j.status = status;
            j.error_msg = error_msg.map(str::to_string);
        });
    }

    /// 1ページ取得する。別の取得が進行中なら捨てる。
    pub async fn fetch_page(&self, page: u32) -> FetchOutcome {
        let Some(ticket) = self.inner.gate.try_enter() else {
            tracing::debug!("jobs fetch of page {page} skipped: fetch in flight");
            return FetchOutcome::Skipped;
        };
        self.fetch_with(ticket, page).await
    }

    /// 次のページ。末尾まで読んだか取得中なら何もしない。
    pub async fn load_more(&self) -> FetchOutcome {
        if self.inner.gate.is_busy() {
            return FetchOutcome::Skipped;
        }
        match self.inner.store.with(|s| s.cursor.next_page()) {
            Some(page) => self.fetch_page(page).await,
            None => FetchOutcome::Exhausted,
        }
    }

    /// コレクションを消してページ0を読み直す。進行中の取得は置き換える。
    pub async fn refresh(&self) -> FetchOutcome {
        self.inner.store.reset();
        let ticket = self.inner.gate.force_enter();
        self.fetch_with(ticket, 0).await
    }

    /// すべて忘れる（サインアウト時）。
    pub fn clear(&self) {
        self.inner.store.reset();
    }

    async fn fetch_with(&self, ticket: FetchTicket<'_>, page: u32) -> FetchOutcome {
        let inner = &self.inner;
        let (generation, _) = inner.store.begin_fetch();
        let range = inner.store.with(|s| s.cursor.range(page));

        let rows = match inner.backend.list_jobs(range).await {
            Ok(rows) => rows,
            Err(e) => {
                tracing::error!("error fetching jobs page {page}: {e:#}");
                inner.store.end_fetch(generation);
                return FetchOutcome::Failed;
            }
        };

        let received = rows.len();
        let skeletons = rows.iter().map(Job::skeleton).collect();
        let merge = if page == 0 { Merge::Replace } else { Merge::Append };
        if !inner.store.apply_page(generation, page, skeletons, merge) {
            tracing::debug!("discarding jobs page {page}: superseded");
            return FetchOutcome::Stale;
        }
        tracing::info!("jobs page {page}: {received} rows");

        // ローディングは解除済み。URL解決中も次ページの要求を受け付ける。
        drop(ticket);
        self.resolve_urls(rows).await;
        FetchOutcome::Fetched { received }
    }

    /// 各行の生成画像URLと入力画像URLを並列に解決し、揃った行から反映する。
    async fn resolve_urls(&self, rows: Vec<JobRow>) {
        let mut set = JoinSet::new();
        for row in rows {
            let resolver = self.inner.resolver.clone();
            let store = self.inner.store.clone();
            set.spawn(async move {
                let job = Job::skeleton(&row);
                match resolver.resolve_pair(job.output_path(), job.input_path()).await {
                    Ok((output, input)) => {
                        store.patch(&row.id, |j| {
                            j.generated_image_url = output;
                            j.input_image_url = input;
                        });
                    }
                    Err(e) => tracing::warn!("signed urls for job {} failed: {e:#}", row.id),
                }
            });
        }
        while set.join_next().await.is_some() {}
    }

    /// 未完了ジョブを1回ずつ確認する。
    ///
    /// `completed` になったジョブは2つのURLと同時に書き込む。URLが取れなければ
    /// レコードはそのままにして次のtickで再試行する。
    pub async fn poll_pending_jobs(&self) -> PollReport {
        let inner = &self.inner;
        let pending: Vec<(String, JobStatus)> = inner.store.with(|s| {
            s.items
                .iter()
                .filter(|j| j.status.is_pending())
                .map(|j| (j.job_id.clone(), j.status))
                .collect()
        });

        let mut report = PollReport::default();
        for (job_id, seen) in pending {
            report.checked += 1;
            let row = match inner.backend.fetch_job(&job_id).await {
                Ok(Some(row)) => row,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!("error polling job {job_id}: {e:#}");
                    report.failed += 1;
                    continue;
                }
            };
            if row.status == seen {
                continue;
            }

            if row.status == JobStatus::Completed {
                let job = Job::skeleton(&row);
                match inner
                    .resolver
                    .resolve_pair(job.output_path(), job.input_path())
                    .await
                {
                    Ok((output, input)) => {
                        inner.store.patch(&job_id, |j| {
                            j.status = JobStatus::Completed;
                            j.error_msg = None;
                            j.generated_image_url = output;
                            j.input_image_url = input;
                        });
                    }
                    Err(e) => {
                        tracing::warn!("job {job_id} completed but urls failed: {e:#}");
                        report.failed += 1;
                        continue;
                    }
                }
            } else {
                inner.store.patch(&job_id, |j| {
                    j.status = row.status;
                    j.error_msg = row.error_msg.clone();
                });
            }
            tracing::info!("job {job_id}: {seen} -> {}", row.status);
            report.changed += 1;
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::testing::{FAKE_USER, FakeBackend, job_row};
    use std::io::Write;

    fn engine(backend: &Arc<FakeBackend>, page_size: u32) -> JobEngine {
        JobEngine::new(
            backend.clone(),
            backend.clone(),
            backend.clone(),
            SignedUrlResolver::new(backend.clone(), "jobs", 3600),
            Store::new(page_size),
            JobSettings::default(),
        )
    }

    fn ids(e: &JobEngine) -> Vec<String> {
        e.store()
            .with(|s| s.items.iter().map(|j| j.job_id.clone()).collect())
    }

    fn photo() -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"\x89PNG fake").unwrap();
        f
    }

    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn eight_jobs_in_pages_of_six() {
        let backend = FakeBackend::new();
        backend.seed_jobs(8);
        let e = engine(&backend, 6);

        assert_eq!(e.fetch_page(0).await, FetchOutcome::Fetched { received: 6 });
        let s = e.store().snapshot();
        assert_eq!(s.items.len(), 6);
        assert!(s.cursor.has_more());
        assert!(!s.is_loading);
        for j in &s.items {
            assert_eq!(
                j.generated_image_url.as_deref(),
                Some(format!("https://signed.test/jobs/{FAKE_USER}/{}/output.png?ttl=3600", j.job_id).as_str())
            );
            assert!(j.input_image_url.is_some());
        }
        // レコードごとに1バッチ
        assert_eq!(backend.calls().sign_batches, 6);

        assert_eq!(e.load_more().await, FetchOutcome::Fetched { received: 2 });
        let s = e.store().snapshot();
        assert_eq!(s.items.len(), 8);
        assert!(!s.cursor.has_more());
        assert_eq!(e.load_more().await, FetchOutcome::Exhausted);
        assert_eq!(backend.calls().list_jobs, 2);
    }

    #[tokio::test]
    async fn one_bad_url_does_not_block_others() {
        let backend = FakeBackend::new();
        backend.seed_jobs(3);
        backend.fail_sign_path(&format!("{FAKE_USER}/job-1/output.png"));
        let e = engine(&backend, 6);
        e.fetch_page(0).await;
        let j0 = e.store().get("job-0").unwrap();
        let j1 = e.store().get("job-1").unwrap();
        let j2 = e.store().get("job-2").unwrap();
        assert!(j0.generated_image_url.is_some());
        assert!(j1.generated_image_url.is_none());
        assert!(j1.input_image_url.is_some());
        assert!(j2.generated_image_url.is_some());
    }

    #[tokio::test]
    async fn empty_result_ends_pagination() {
        let backend = FakeBackend::new();
        let e = engine(&backend, 6);
        assert_eq!(e.fetch_page(0).await, FetchOutcome::Fetched { received: 0 });
        let s = e.store().snapshot();
        assert!(s.items.is_empty());
        assert!(!s.cursor.has_more());
    }

    #[tokio::test]
    async fn fetch_error_clears_loading_and_keeps_items() {
        let backend = FakeBackend::new();
        backend.seed_jobs(3);
        let e = engine(&backend, 6);
        e.fetch_page(0).await;
        backend.fail_list(true);
        assert_eq!(e.fetch_page(1).await, FetchOutcome::Failed);
        let s = e.store().snapshot();
        assert_eq!(s.items.len(), 3);
        assert!(!s.is_loading);
    }

    #[tokio::test(start_paused = true)]
    async fn load_more_during_fetch_is_dropped() {
        let backend = FakeBackend::new();
        backend.seed_jobs(12);
        let e = engine(&backend, 6);
        e.fetch_page(0).await;

        backend.delay_job_list(Duration::from_secs(2));
        let first = tokio::spawn({
            let e = e.clone();
            async move { e.load_more().await }
        });
        settle().await;
        assert!(e.store().snapshot().is_loading);

        assert_eq!(e.load_more().await, FetchOutcome::Skipped);
        assert_eq!(e.fetch_page(1).await, FetchOutcome::Skipped);
        assert_eq!(first.await.unwrap(), FetchOutcome::Fetched { received: 6 });

        assert_eq!(backend.calls().list_jobs, 2);
        assert_eq!(ids(&e).len(), 12);
    }

    #[tokio::test(start_paused = true)]
    async fn load_more_is_accepted_while_urls_resolve() {
        let backend = FakeBackend::new();
        backend.seed_jobs(12);
        backend.delay_signing(Duration::from_secs(3));
        let e = engine(&backend, 6);

        let first = tokio::spawn({
            let e = e.clone();
            async move { e.fetch_page(0).await }
        });
        settle().await;
        let s = e.store().snapshot();
        assert_eq!(s.items.len(), 6);
        assert!(!s.is_loading);
        assert!(s.items.iter().all(|j| j.generated_image_url.is_none()));

        assert_eq!(e.load_more().await, FetchOutcome::Fetched { received: 6 });
        assert_eq!(first.await.unwrap(), FetchOutcome::Fetched { received: 6 });
        let s = e.store().snapshot();
        assert_eq!(s.items.len(), 12);
        assert!(s.items.iter().all(|j| j.generated_image_url.is_some()));
        assert_eq!(backend.calls().list_jobs, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_token_refresh_does_not_stop_polling() {
        let backend = FakeBackend::new();
        backend.push_job(job_row("p1", JobStatus::Processing, 0));
        backend.fail_token_refresh(true);
        let e = engine(&backend, 6);

        let _view = e.activate(backend.clone());
        settle().await;
        assert_eq!(ids(&e), ["p1"]);

        backend.set_server_status("p1", JobStatus::Completed);
        tokio::time::sleep(Duration::from_millis(5_100)).await;
        settle().await;
        assert_eq!(backend.calls().token_checks, 2);
        assert_eq!(e.store().get("p1").unwrap().status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn refresh_replaces_everything_with_page_zero() {
        let backend = FakeBackend::new();
        backend.seed_jobs(8);
        let e = engine(&backend, 6);
        e.fetch_page(0).await;
        e.load_more().await;
        assert_eq!(ids(&e).len(), 8);

        backend.push_job(job_row("fresh", JobStatus::Processing, 100));
        e.refresh().await;
        let s = e.store().snapshot();
        assert_eq!(s.items.len(), 6);
        assert_eq!(s.items[0].job_id, "fresh");
        assert!(s.cursor.has_more());
        assert_eq!(s.cursor.page(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_supersedes_slow_fetch() {
        let backend = FakeBackend::new();
        backend.seed_jobs(12);
        let e = engine(&backend, 6);
        e.fetch_page(0).await;

        backend.delay_job_list(Duration::from_secs(5));
        let slow = tokio::spawn({
            let e = e.clone();
            async move { e.load_more().await }
        });
        settle().await;
        backend.delay_job_list(Duration::from_secs(1));
        let refreshed = e.refresh().await;
        assert_eq!(refreshed, FetchOutcome::Fetched { received: 6 });
        assert_eq!(slow.await.unwrap(), FetchOutcome::Stale);

        let s = e.store().snapshot();
        assert_eq!(s.items.len(), 6);
        assert_eq!(s.cursor.page(), 0);
        assert!(!s.is_loading);
    }

    #[tokio::test]
    async fn poll_patches_completed_with_both_urls_at_once() {
        let backend = FakeBackend::new();
        backend.push_job(job_row("p1", JobStatus::Processing, 0));
        backend.push_job(job_row("done", JobStatus::Completed, -1));
        let e = engine(&backend, 6);
        e.fetch_page(0).await;
        let mut rx = e.store().subscribe();
        rx.borrow_and_update();

        backend.set_server_status("p1", JobStatus::Completed);
        let report = e.poll_pending_jobs().await;
        assert_eq!(
            report,
            PollReport {
                checked: 1,
                changed: 1,
                failed: 0
            }
        );
        assert!(rx.has_changed().unwrap());
        let j = rx.borrow_and_update().items[0].clone();
        assert_eq!(j.status, JobStatus::Completed);
        assert!(j.generated_image_url.is_some());
        assert!(j.input_image_url.is_some());
        // 完了済みジョブは再取得しない
        assert_eq!(backend.calls().fetch_job, 1);
    }

    #[tokio::test]
    async fn poll_leaves_completed_job_pending_when_urls_fail() {
        let backend = FakeBackend::new();
        backend.push_job(job_row("p1", JobStatus::Processing, 0));
        let e = engine(&backend, 6);
        e.fetch_page(0).await;

        backend.set_server_status("p1", JobStatus::Completed);
        backend.fail_sign_batches(true);
        let report = e.poll_pending_jobs().await;
        assert_eq!((report.changed, report.failed), (0, 1));
        assert_eq!(e.store().get("p1").unwrap().status, JobStatus::Processing);

        // 次のtickでは成功する
        backend.fail_sign_batches(false);
        let report = e.poll_pending_jobs().await;
        assert_eq!(report.changed, 1);
        let j = e.store().get("p1").unwrap();
        assert_eq!(j.status, JobStatus::Completed);
        assert!(j.generated_image_url.is_some());
    }

    #[tokio::test]
    async fn poll_failure_for_one_job_skips_only_that_job() {
        let backend = FakeBackend::new();
        backend.push_job(job_row("a", JobStatus::Uploading, 0));
        backend.push_job(job_row("b", JobStatus::Created, -1));
        let e = engine(&backend, 6);
        e.fetch_page(0).await;

        backend.fail_fetch_job("a");
        backend.set_server_status("a", JobStatus::Failed);
        backend.set_server_status("b", JobStatus::Processing);
        let report = e.poll_pending_jobs().await;
        assert_eq!(report.failed, 1);
        assert_eq!(report.changed, 1);
        assert_eq!(e.store().get("a").unwrap().status, JobStatus::Uploading);
        assert_eq!(e.store().get("b").unwrap().status, JobStatus::Processing);
    }

    #[tokio::test]
    async fn create_job_uploads_and_dispatches() {
        let backend = FakeBackend::new();
        let e = engine(&backend, 6);
        let img = photo();

        let job_id = e.create_job(FAKE_USER, "t7", img.path()).await.unwrap();
        settle().await;

        assert_eq!(
            backend.uploads(),
            vec![("jobs".to_string(), format!("{FAKE_USER}/{job_id}/input.png"), 9)]
        );
        let statuses: Vec<JobStatus> = backend.status_updates().into_iter().map(|u| u.1).collect();
        assert_eq!(statuses, [JobStatus::Uploading, JobStatus::Processing]);
        assert_eq!(
            backend.invocations(),
            vec![("main".to_string(), serde_json::json!({ "job_id": job_id }))]
        );
        let j = e.store().get(&job_id).unwrap();
        assert_eq!(j.status, JobStatus::Processing);
        assert_eq!(j.template_id, "t7");
    }

    #[tokio::test]
    async fn upload_failure_marks_job_failed_without_dispatch() {
        let backend = FakeBackend::new();
        backend.fail_upload(true);
        let e = engine(&backend, 6);
        let img = photo();

        let err = e.create_job(FAKE_USER, "t1", img.path()).await.unwrap_err();
        let CreateJobError::Upload { job_id, .. } = err else {
            panic!("expected upload error, got {err:?}");
        };
        settle().await;

        let j = e.store().get(&job_id).unwrap();
        assert_eq!(j.status, JobStatus::Failed);
        assert_eq!(j.error_msg.as_deref(), Some(UPLOAD_FAILED_MSG));
        assert_eq!(backend.calls().invocations, 0);
        let server = backend.server_job(&job_id).unwrap();
        assert_eq!(server.status, JobStatus::Failed);
        assert_eq!(server.error_msg.as_deref(), Some(UPLOAD_FAILED_MSG));
    }

    #[tokio::test]
    async fn unreadable_photo_is_an_upload_failure() {
        let backend = FakeBackend::new();
        let e = engine(&backend, 6);
        let err = e
            .create_job(FAKE_USER, "t1", Path::new("/definitely/not/here.png"))
            .await
            .unwrap_err();
        assert!(matches!(err, CreateJobError::Upload { .. }));
        assert_eq!(backend.calls().uploads, 0);
    }

    #[tokio::test]
    async fn dispatch_failure_is_not_surfaced() {
        let backend = FakeBackend::new();
        backend.fail_invoke(true);
        let e = engine(&backend, 6);
        let img = photo();
        let job_id = e.create_job(FAKE_USER, "t1", img.path()).await.unwrap();
        settle().await;
        assert_eq!(backend.calls().invocations, 1);
        assert_eq!(e.store().get(&job_id).unwrap().status, JobStatus::Processing);
    }

    #[tokio::test(start_paused = true)]
    async fn activate_polls_until_deactivated() {
        let backend = FakeBackend::new();
        backend.push_job(job_row("p1", JobStatus::Processing, 0));
        let e = engine(&backend, 6);

        let view = e.activate(backend.clone());
        settle().await;
        assert_eq!(ids(&e), ["p1"]);
        assert_eq!(backend.calls().token_checks, 1);

        tokio::time::sleep(Duration::from_millis(5_100)).await;
        settle().await;
        assert_eq!(backend.calls().fetch_job, 1);
        assert_eq!(backend.calls().token_checks, 2);

        view.deactivate();
        backend.set_server_status("p1", JobStatus::Completed);
        tokio::time::sleep(Duration::from_secs(30)).await;
        settle().await;
        assert_eq!(backend.calls().fetch_job, 1);
        assert_eq!(e.store().get("p1").unwrap().status, JobStatus::Processing);
    }

    #[tokio::test]
    async fn stats_follow_the_store() {
        let backend = FakeBackend::new();
        backend.push_job(job_row("a", JobStatus::Uploading, 0));
        backend.push_job(job_row("b", JobStatus::Completed, -1));
        let e = engine(&backend, 6);
        e.fetch_page(0).await;
        let s = e.stats();
        assert_eq!((s.total, s.completed, s.processing), (2, 1, 1));
        e.clear();
        assert_eq!(e.stats().total, 0);
    }
}
