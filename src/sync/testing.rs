//! 同期エンジンのテストで使うインメモリのバックエンド。

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use crate::{
    backend::{
        FunctionInvoker, JobsBackend, ObjectStorage, ProfileBackend, SessionRefresher,
        TemplatesBackend, rest::contains_pattern,
    },
    sync::{
        cursor::PageRange,
        model::{JobRow, JobStatus, Profile, TemplateRow},
    },
};

pub const FAKE_USER: &str = "u1";

/// 通信回数を検証するためのカウンター。
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Calls {
    pub list_jobs: usize,
    pub fetch_job: usize,
    pub list_templates: usize,
    pub sign_single: usize,
    pub sign_batches: usize,
    pub uploads: usize,
    pub invocations: usize,
    pub token_checks: usize,
}

#[derive(Default)]
struct FakeState {
    jobs: Vec<JobRow>,
    templates: Vec<TemplateRow>,
    next_job: u32,
    fail_list: bool,
    fail_upload: bool,
    fail_invoke: bool,
    fail_fetch_job: HashSet<String>,
    fail_sign: HashSet<String>,
    fail_sign_batches: bool,
    fail_token_refresh: bool,
    sign_delay: Option<Duration>,
    list_delay: Option<Duration>,
    template_delays: HashMap<String, Duration>,
    calls: Calls,
    uploads: Vec<(String, String, usize)>,
    invocations: Vec<(String, serde_json::Value)>,
    status_updates: Vec<(String, JobStatus, Option<String>)>,
}

#[derive(Default)]
pub struct FakeBackend {
    state: Mutex<FakeState>,
}

pub fn ts(minutes: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).single().unwrap() + ChronoDuration::minutes(minutes)
}

pub fn job_row(id: &str, status: JobStatus, minutes: i64) -> JobRow {
    JobRow {
        id: id.into(),
        user_id: FAKE_USER.into(),
        template_id: "t1".into(),
        status,
        created_at: ts(minutes),
        error_msg: None,
    }
}

pub fn template_row(id: &str, name: &str) -> TemplateRow {
    TemplateRow {
        id: id.into(),
        name: Some(name.into()),
        image_path: None,
    }
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    /// 完了済みジョブを `n` 件。最新は `job-0`。
    pub fn seed_jobs(&self, n: usize) {
        let mut s = self.lock();
        for i in 0..n {
            s.jobs
                .push(job_row(&format!("job-{i}"), JobStatus::Completed, -(i as i64)));
        }
    }

    pub fn push_job(&self, row: JobRow) {
        self.lock().jobs.push(row);
    }

    pub fn push_template(&self, row: TemplateRow) {
        self.lock().templates.push(row);
    }

    pub fn set_server_status(&self, id: &str, status: JobStatus) {
        if let Some(j) = self.lock().jobs.iter_mut().find(|j| j.id == id) {
            j.status = status;
        }
    }

    pub fn server_job(&self, id: &str) -> Option<JobRow> {
        self.lock().jobs.iter().find(|j| j.id == id).cloned()
    }

    pub fn fail_list(&self, fail: bool) {
        self.lock().fail_list = fail;
    }

    pub fn fail_upload(&self, fail: bool) {
        self.lock().fail_upload = fail;
    }

    pub fn fail_invoke(&self, fail: bool) {
        self.lock().fail_invoke = fail;
    }

    pub fn fail_fetch_job(&self, id: &str) {
        self.lock().fail_fetch_job.insert(id.into());
    }

    pub fn fail_sign_path(&self, path: &str) {
        self.lock().fail_sign.insert(path.into());
    }

    pub fn fail_sign_batches(&self, fail: bool) {
        self.lock().fail_sign_batches = fail;
    }

    pub fn fail_token_refresh(&self, fail: bool) {
        self.lock().fail_token_refresh = fail;
    }

    pub fn delay_signing(&self, d: Duration) {
        self.lock().sign_delay = Some(d);
    }

    pub fn delay_job_list(&self, d: Duration) {
        self.lock().list_delay = Some(d);
    }

    pub fn delay_template_query(&self, query: &str, d: Duration) {
        self.lock().template_delays.insert(query.into(), d);
    }

    pub fn calls(&self) -> Calls {
        self.lock().calls.clone()
    }

    pub fn uploads(&self) -> Vec<(String, String, usize)> {
        self.lock().uploads.clone()
    }

    pub fn invocations(&self) -> Vec<(String, serde_json::Value)> {
        self.lock().invocations.clone()
    }

    pub fn status_updates(&self) -> Vec<(String, JobStatus, Option<String>)> {
        self.lock().status_updates.clone()
    }

    async fn sign_pause(&self) {
        let delay = self.lock().sign_delay;
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }
    }

    fn signed(bucket: &str, path: &str, ttl: u64) -> String {
        format!("https://signed.test/{bucket}/{path}?ttl={ttl}")
    }
}

fn slice<T: Clone>(rows: &[T], range: PageRange) -> Vec<T> {
    rows.iter()
        .skip(range.start as usize)
        .take(range.len() as usize)
        .cloned()
        .collect()
}

#[async_trait]
impl JobsBackend for FakeBackend {
    async fn list_jobs(&self, range: PageRange) -> Result<Vec<JobRow>> {
        let delay = {
            let mut s = self.lock();
            s.calls.list_jobs += 1;
            s.list_delay
        };
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }
        let s = self.lock();
        if s.fail_list {
            return Err(anyhow!("connection reset"));
        }
        let mut rows = s.jobs.clone();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(slice(&rows, range))
    }

    async fn fetch_job(&self, job_id: &str) -> Result<Option<JobRow>> {
        let mut s = self.lock();
        s.calls.fetch_job += 1;
        if s.fail_fetch_job.contains(job_id) {
            return Err(anyhow!("timeout fetching {job_id}"));
        }
        Ok(s.jobs.iter().find(|j| j.id == job_id).cloned())
    }

    async fn create_job(&self, template_id: &str) -> Result<String> {
        let mut s = self.lock();
        s.next_job += 1;
        let id = format!("new-{}", s.next_job);
        let mut row = job_row(&id, JobStatus::Created, 1_000 + s.next_job as i64);
        row.template_id = template_id.into();
        s.jobs.push(row);
        Ok(id)
    }

    async fn update_job_status(
        &self,
        job_id: &str,
        status: JobStatus,
        error_msg: Option<&str>,
    ) -> Result<()> {
        let mut s = self.lock();
        s.status_updates
            .push((job_id.into(), status, error_msg.map(str::to_string)));
        if let Some(j) = s.jobs.iter_mut().find(|j| j.id == job_id) {
            j.status = status;
            j.error_msg = error_msg.map(str::to_string);
        }
        Ok(())
    }
}

#[async_trait]
impl TemplatesBackend for FakeBackend {
    async fn list_templates(
        &self,
        range: PageRange,
        name_filter: Option<&str>,
    ) -> Result<Vec<TemplateRow>> {
        let delay = {
            let mut s = self.lock();
            s.calls.list_templates += 1;
            s.template_delays.get(name_filter.unwrap_or("")).copied()
        };
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }
        let s = self.lock();
        if s.fail_list {
            return Err(anyhow!("connection reset"));
        }
        // 実クライアントと同じ演算子を組み立て、PostgRESTと同じ規則で照合する。
        let pattern = name_filter.map(|q| parse_ilike(&contains_pattern(q)));
        let rows: Vec<TemplateRow> = s
            .templates
            .iter()
            .filter(|t| match &pattern {
                Some(p) => t.name.as_deref().is_some_and(|name| {
                    let name: Vec<char> = name.to_lowercase().chars().collect();
                    like_match(p, &name)
                }),
                None => true,
            })
            .cloned()
            .collect();
        Ok(slice(&rows, range))
    }

    async fn fetch_template(&self, id: &str) -> Result<Option<TemplateRow>> {
        Ok(self.lock().templates.iter().find(|t| t.id == id).cloned())
    }
}

#[async_trait]
impl ProfileBackend for FakeBackend {
    async fn fetch_profile(&self) -> Result<Option<Profile>> {
        Ok(Some(Profile {
            full_name: Some("Test User".into()),
            avatar_url: None,
        }))
    }
}

#[async_trait]
impl ObjectStorage for FakeBackend {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        _content_type: &str,
    ) -> Result<()> {
        let mut s = self.lock();
        s.calls.uploads += 1;
        if s.fail_upload {
            return Err(anyhow!("HTTP status 413 error: payload too large"));
        }
        s.uploads.push((bucket.into(), path.into(), bytes.len()));
        Ok(())
    }

    async fn create_signed_url(&self, bucket: &str, path: &str, ttl_secs: u64) -> Result<String> {
        self.sign_pause().await;
        let mut s = self.lock();
        s.calls.sign_single += 1;
        if s.fail_sign.contains(path) {
            return Err(anyhow!("object not found: {path}"));
        }
        Ok(Self::signed(bucket, path, ttl_secs))
    }

    async fn create_signed_urls(
        &self,
        bucket: &str,
        paths: &[String],
        ttl_secs: u64,
    ) -> Result<Vec<Option<String>>> {
        self.sign_pause().await;
        let mut s = self.lock();
        s.calls.sign_batches += 1;
        if s.fail_sign_batches {
            return Err(anyhow!("storage unavailable"));
        }
        Ok(paths
            .iter()
            .map(|p| (!s.fail_sign.contains(p)).then(|| Self::signed(bucket, p, ttl_secs)))
            .collect())
    }
}

#[async_trait]
impl FunctionInvoker for FakeBackend {
    async fn invoke(&self, name: &str, payload: serde_json::Value) -> Result<()> {
        let mut s = self.lock();
        s.calls.invocations += 1;
        s.invocations.push((name.into(), payload));
        if s.fail_invoke {
            return Err(anyhow!("edge function returned 500"));
        }
        Ok(())
    }
}

#[async_trait]
impl SessionRefresher for FakeBackend {
    async fn refresh_if_expiring(&self) -> Result<()> {
        let mut s = self.lock();
        s.calls.token_checks += 1;
        if s.fail_token_refresh {
            return Err(anyhow!("refresh token revoked"));
        }
        Ok(())
    }
}

#[derive(Debug, PartialEq)]
enum Like {
    Lit(char),
    One,
    Any,
}

/// `ilike."..."` 形式の演算子をLIKEパターンへ戻す（小文字化済み）。
fn parse_ilike(operand: &str) -> Vec<Like> {
    let value = operand.strip_prefix("ilike.").unwrap_or(operand);
    let unquoted: String = match value.strip_prefix('"').and_then(|v| v.strip_suffix('"')) {
        Some(inner) => {
            let mut out = String::new();
            let mut chars = inner.chars();
            while let Some(c) = chars.next() {
                match c {
                    '\\' => out.extend(chars.next()),
                    c => out.push(c),
                }
            }
            out
        }
        None => value.to_string(),
    };

    let mut tokens = Vec::new();
    let mut chars = unquoted.to_lowercase().chars().collect::<Vec<_>>().into_iter();
    while let Some(c) = chars.next() {
        tokens.push(match c {
            '\\' => match chars.next() {
                Some(esc) => Like::Lit(esc),
                None => Like::Lit('\\'),
            },
            '*' | '%' => Like::Any,
            '_' => Like::One,
            c => Like::Lit(c),
        });
    }
    tokens
}

fn like_match(pattern: &[Like], text: &[char]) -> bool {
    match pattern.split_first() {
        None => text.is_empty(),
        Some((Like::Any, rest)) => (0..=text.len()).any(|i| like_match(rest, &text[i..])),
        Some((Like::One, rest)) => !text.is_empty() && like_match(rest, &text[1..]),
        Some((Like::Lit(c), rest)) => text.first() == Some(c) && like_match(rest, &text[1..]),
    }
}
