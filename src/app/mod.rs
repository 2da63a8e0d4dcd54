//! TUIのイベントループ、入力処理、状態管理。

mod handlers;
mod render;

use anyhow::Result;
use crossterm::event::{self, Event};
use std::{path::PathBuf, time::Duration};
use tokio::sync::{mpsc, watch};

use crate::{
    backend::session::AuthUser,
    config::Config,
    events::{Screen, UiState},
    input::InputBoxState,
    shortcuts::Shortcuts,
    sync::{
        model::{Job, Profile, Template},
        store::CollectionState,
    },
    ui::Tui,
    wizard,
    worker::{self, SharedStores, WorkerCmd, WorkerEvent},
};

use handlers::{handle_key, is_ctrl_c};
use render::draw;

/// 入力処理と描画で共有するアプリ状態。
pub struct App {
    /// 永続化された設定ファイルのパス。
    pub cfg_path: PathBuf,
    /// メモリ上の現在設定。
    pub cfg: Config,
    /// 選択位置やステータスなどUI固有の状態。
    pub ui: UiState,
    /// ジョブ一覧（Workerのストアを購読）。
    pub jobs: watch::Receiver<CollectionState<Job>>,
    /// テンプレート一覧（Workerのストアを購読）。
    pub templates: watch::Receiver<CollectionState<Template>>,
    /// サインイン中のユーザー。
    pub user: Option<AuthUser>,
    /// プロフィール（名前・アバター）。
    pub profile: Option<Profile>,
    /// ジョブ詳細に表示する元テンプレート。
    pub preview: Option<Template>,
    /// 生成に使う写真のパス。
    pub photo_path: String,
    /// Workerへのコマンド送信チャネル。
    pub worker_tx: mpsc::Sender<WorkerCmd>,
    /// Workerからのイベント受信チャネル。
    pub worker_rx: mpsc::Receiver<WorkerEvent>,

    /// 設定画面で編集するプロジェクトURL。
    pub backend_url: String,
    /// 設定画面で編集するanonキー。
    pub anon_key: String,
    /// 設定画面で編集するクライアントシークレットのパス。
    pub client_secret: String,

    /// 入力ボックスの状態（入力中はSome）。
    pub input_box: Option<InputBoxState>,
    /// 初期設定ウィザードの状態。
    pub wizard_state: wizard::WizardState,
    /// ショートカットキー設定。
    pub shortcuts: Shortcuts,
}

impl App {
    /// 画面を切り替え、ジョブ画面の出入りに合わせてポーリングを開始・停止する。
    pub fn go_to(&mut self, screen: Screen) -> Result<()> {
        let was = self.ui.screen.shows_jobs();
        let will = screen.shows_jobs();
        self.ui.screen = screen;
        self.ui.error = None;
        if !was && will {
            self.send(WorkerCmd::ActivateJobs)?;
        } else if was && !will {
            self.send(WorkerCmd::DeactivateJobs)?;
        }
        Ok(())
    }

    /// UIスレッドを止めずにWorkerへ送る。
    pub fn send(&self, cmd: WorkerCmd) -> Result<()> {
        self.worker_tx
            .try_send(cmd)
            .map_err(|e| anyhow::anyhow!("worker unavailable: {e}"))
    }

    pub fn selected_template(&self) -> Option<Template> {
        let id = self.ui.open_template.as_deref()?;
        self.templates
            .borrow()
            .items
            .iter()
            .find(|t| t.id == id)
            .cloned()
    }

    pub fn selected_job(&self) -> Option<Job> {
        let id = self.ui.open_job.as_deref()?;
        self.jobs
            .borrow()
            .items
            .iter()
            .find(|j| j.job_id == id)
            .cloned()
    }

    /// 設定画面用の編集バッファを設定値から再読み込みする。
    pub fn reload_settings_buffers(&mut self) {
        self.backend_url = self.cfg.backend.url.clone();
        self.anon_key = self.cfg.backend.anon_key.clone();
        self.client_secret = self.cfg.google.client_secret_path.clone();
    }

    /// 編集バッファを設定へ反映して保存し、Workerへ通知する。
    pub fn commit_settings(&mut self) -> Result<()> {
        self.cfg.backend.url = self.backend_url.trim().to_string();
        self.cfg.backend.anon_key = self.anon_key.trim().to_string();
        self.cfg.google.client_secret_path = self.client_secret.trim().to_string();
        self.cfg.save(&self.cfg_path)?;
        self.send(WorkerCmd::SaveSettings(self.cfg.clone()))
    }
}

/// ユーザーが終了するまでメインTUIループを回す。
pub async fn run_app(terminal: &mut Tui) -> Result<()> {
    // 設定ファイルを読み込む（初回はデフォルトを生成）。
    let cfg_path = PathBuf::from("config.toml");
    let cfg = Config::load_or_default(&cfg_path)?;

    let shortcuts = Shortcuts::load_or_default("shortcut.toml")?;

    // Worker通信用のコマンド/イベントチャネルを作る。
    let (tx_cmd, rx_cmd) = mpsc::channel::<WorkerCmd>(64);
    let (tx_ev, rx_ev) = mpsc::channel::<WorkerEvent>(256);

    // ストアはUIとWorkerで共有する。
    let stores = SharedStores::new(&cfg);
    let jobs = stores.jobs.subscribe();
    let templates = stores.templates.subscribe();
    tokio::spawn(worker::run(rx_cmd, tx_ev, cfg.clone(), stores));

    // 設定が揃うまではウィザード、揃っていればセッション復元を待つ。
    let (initial_screen, status) = if cfg.is_complete() {
        (Screen::SignIn, "Restoring session...")
    } else {
        (Screen::InitialSetup, "Setup required")
    };

    let mut app = App {
        cfg_path,
        cfg: cfg.clone(),
        ui: UiState::new(initial_screen),
        jobs,
        templates,
        user: None,
        profile: None,
        preview: None,
        photo_path: String::new(),
        worker_tx: tx_cmd,
        worker_rx: rx_ev,
        backend_url: String::new(),
        anon_key: String::new(),
        client_secret: String::new(),
        input_box: None,
        wizard_state: wizard::WizardState::new(),
        shortcuts,
    };
    app.ui.status = status.into();
    app.reload_settings_buffers();

    loop {
        terminal.draw(|f| draw(f, &app))?;

        // 入力処理の前にWorkerイベントを消化する。
        while let Ok(ev) = app.worker_rx.try_recv() {
            handle_worker_event(&mut app, ev)?;
        }

        // UIの応答性確保のため短いタイムアウトで入力をポーリングする。
        if event::poll(Duration::from_millis(50))?
            && let Event::Key(k) = event::read()?
        {
            if is_ctrl_c(&k) {
                break;
            }
            if handle_key(&mut app, k)? {
                break;
            }
        }
    }
    Ok(())
}

/// WorkerイベントをUI状態へ反映する。
fn handle_worker_event(app: &mut App, ev: WorkerEvent) -> Result<()> {
    match ev {
        WorkerEvent::SessionChanged(Some(user)) => {
            app.ui.status = format!(
                "Signed in as {}",
                user.email.as_deref().unwrap_or(&user.id)
            );
            app.user = Some(user);
            if app.ui.screen == Screen::SignIn {
                app.ui.template_selected = 0;
                app.go_to(Screen::Templates)?;
                app.send(WorkerCmd::RefreshTemplates)?;
            }
        }
        WorkerEvent::SessionChanged(None) => {
            app.user = None;
            app.profile = None;
            app.preview = None;
            if app.ui.screen.requires_session() {
                app.go_to(Screen::SignIn)?;
            }
            app.ui.status = "Signed out".into();
        }
        WorkerEvent::ProfileLoaded(p) => app.profile = Some(p),
        WorkerEvent::JobCreated(job_id) => {
            app.ui.creating_job = false;
            app.ui.log.push(format!("created job {job_id}"));
            // 生成はバックグラウンドで進むので一覧で状態を追う。
            if app.user.is_some() {
                app.ui.job_selected = 0;
                app.go_to(Screen::Creations)?;
            }
            app.ui.status = format!("Job {job_id} is processing");
        }
        WorkerEvent::JobCreateFailed(s) => {
            app.ui.creating_job = false;
            app.ui.log.push(format!("error: {s}"));
            app.ui.status = "Generation failed".into();
            app.ui.error = Some(s);
        }
        WorkerEvent::TemplatePreview(t) => app.preview = t,
        WorkerEvent::Downloaded(path) => {
            app.ui.status = format!("Saved {}", path.display());
        }
        WorkerEvent::Log(s) => app.ui.log.push(s),
        WorkerEvent::Error(s) => {
            app.ui.log.push(format!("error: {s}"));
            app.ui.error = Some(s);
        }
    }
    Ok(())
}
