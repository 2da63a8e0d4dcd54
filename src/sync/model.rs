//! コレクションストアが保持するジョブとテンプレートのレコード。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 名前のないテンプレートに使う表示名。
pub const UNTITLED_TEMPLATE: &str = "Untitled";

/// 安定したIDで引けるレコード。ストアはこのキーで重複を除く。
pub trait Keyed {
    fn key(&self) -> &str;
}

/// 生成ジョブのサーバー側ステータス。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Created,
    Uploading,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    /// ポーリングで再確認し続ける状態か。
    pub fn is_pending(self) -> bool {
        matches!(self, Self::Created | Self::Uploading | Self::Processing)
    }

    /// `update_job_status` RPCに渡す名前。
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Uploading => "uploading",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// バックエンドが返す `jobs` テーブルの行。
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct JobRow {
    pub id: String,
    pub user_id: String,
    pub template_id: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub error_msg: Option<String>,
}

/// 作品一覧に表示する1件の生成リクエスト。
#[derive(Clone, Debug, PartialEq)]
pub struct Job {
    pub job_id: String,
    pub user_id: String,
    pub template_id: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    /// `status == Completed` になって初めて意味を持つ。
    pub generated_image_url: Option<String>,
    pub input_image_url: Option<String>,
    pub error_msg: Option<String>,
}

impl Job {
    /// 骨組みレコード。IDとステータスだけで、URLは未解決。
    pub fn skeleton(row: &JobRow) -> Self {
        Self {
            job_id: row.id.clone(),
            user_id: row.user_id.clone(),
            template_id: row.template_id.clone(),
            status: row.status,
            created_at: row.created_at,
            generated_image_url: None,
            input_image_url: None,
            error_msg: row.error_msg.clone(),
        }
    }

    /// アップロードした写真のストレージキー。
    pub fn input_path(&self) -> String {
        job_input_path(&self.user_id, &self.job_id)
    }

    /// 生成画像のストレージキー。
    pub fn output_path(&self) -> String {
        job_output_path(&self.user_id, &self.job_id)
    }

    /// 一覧に出すURL。完了後は生成画像、それまでは入力写真。
    pub fn display_url(&self) -> Option<&str> {
        if self.status == JobStatus::Completed {
            self.generated_image_url.as_deref()
        } else {
            self.input_image_url.as_deref()
        }
    }
}

impl Keyed for Job {
    fn key(&self) -> &str {
        &self.job_id
    }
}

pub fn job_input_path(user_id: &str, job_id: &str) -> String {
    format!("{user_id}/{job_id}/input.png")
}

pub fn job_output_path(user_id: &str, job_id: &str) -> String {
    format!("{user_id}/{job_id}/output.png")
}

/// バックエンドが返す `templates` テーブルの行。
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct TemplateRow {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub image_path: Option<String>,
}

/// 選択できる生成スタイル。
#[derive(Clone, Debug, PartialEq)]
pub struct Template {
    pub id: String,
    pub name: String,
    /// templatesバケット内のプレビュー画像のキー。
    pub preview_path: String,
    pub preview_url: Option<String>,
}

impl Template {
    pub fn skeleton(row: &TemplateRow) -> Self {
        let name = row
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(UNTITLED_TEMPLATE)
            .to_string();
        let preview_path = row
            .image_path
            .clone()
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| format!("{}/preview.png", row.id));
        Self {
            id: row.id.clone(),
            name,
            preview_path,
            preview_url: None,
        }
    }
}

impl Keyed for Template {
    fn key(&self) -> &str {
        &self.id
    }
}

/// サインイン中ユーザーの `profiles` 行。
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

/// 作品一覧の上に出す集計。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct JobStats {
    pub total: usize,
    pub completed: usize,
    /// アップロード中または処理中のジョブ数。
    pub processing: usize,
}

impl JobStats {
    pub fn tally(jobs: &[Job]) -> Self {
        jobs.iter().fold(Self::default(), |mut acc, j| {
            acc.total += 1;
            match j.status {
                JobStatus::Completed => acc.completed += 1,
                JobStatus::Processing | JobStatus::Uploading => acc.processing += 1,
                _ => {}
            }
            acc
        })
    }
}
