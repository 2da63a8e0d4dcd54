//! Background worker: owns the backend connection and the sync engines and
//! runs UI commands against them.

use std::{future::Future, path::PathBuf, sync::Arc};

use chrono::{DateTime, Utc};
use reqwest::Client;
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};

use crate::{
    backend::{
        BackendClient, ProfileBackend,
        session::{AuthSession, AuthUser, SessionManager},
        session_store::FileTokenStorage,
    },
    config::Config,
    sync::{
        jobs::{ActiveJobsView, JobEngine, JobSettings},
        model::{Job, Profile, Template},
        resolver::SignedUrlResolver,
        store::Store,
        templates::TemplateBrowser,
    },
};

/// Session and Google tokens live here.
const SESSION_FILE: &str = "session.json";

/// Commands sent from the UI to the worker.
#[derive(Debug)]
pub enum WorkerCmd {
    /// Persisted settings changed; reconnect with them.
    SaveSettings(Config),
    SignIn,
    SignOut,
    RefreshTemplates,
    LoadMoreTemplates,
    SearchTemplates(String),
    PullToRefreshTemplates,
    /// A jobs view was opened: refresh and start polling.
    ActivateJobs,
    /// The last jobs view was closed: stop polling.
    DeactivateJobs,
    RefreshJobs,
    LoadMoreJobs,
    CreateJob {
        template_id: String,
        image_path: PathBuf,
    },
    /// Save a generated image to the download directory.
    DownloadImage { url: String },
    /// Template shown on the job detail screen.
    FetchPreview(String),
}

/// Events emitted by the worker for UI updates. Collection changes are not
/// sent here; the UI watches the stores directly.
#[derive(Clone, Debug)]
pub enum WorkerEvent {
    SessionChanged(Option<AuthUser>),
    ProfileLoaded(Profile),
    JobCreated(String),
    /// Job creation or upload failed; the UI stays on the template.
    JobCreateFailed(String),
    TemplatePreview(Option<Template>),
    Downloaded(PathBuf),
    /// Informational log message.
    Log(String),
    /// User-visible error message.
    Error(String),
}

/// Collections shared between the worker and the UI.
#[derive(Clone)]
pub struct SharedStores {
    pub jobs: Store<Job>,
    pub templates: Store<Template>,
}

impl SharedStores {
    pub fn new(cfg: &Config) -> Self {
        Self {
            jobs: Store::new(cfg.sync.jobs_page_size),
            templates: Store::new(cfg.sync.templates_page_size),
        }
    }
}

/// Everything bound to one backend configuration.
struct Services {
    session: Arc<SessionManager>,
    client: BackendClient,
    jobs: JobEngine,
    templates: TemplateBrowser,
    client_secret: PathBuf,
    download_dir: PathBuf,
    session_watch: JoinHandle<()>,
}

impl Drop for Services {
    fn drop(&mut self) {
        self.session_watch.abort();
    }
}

/// Main worker loop: connect, then dispatch commands as they arrive.
pub async fn run(
    mut rx: mpsc::Receiver<WorkerCmd>,
    tx: mpsc::Sender<WorkerEvent>,
    cfg: Config,
    stores: SharedStores,
) {
    tracing::info!("worker started");
    let mut services = connect(&cfg, &stores, &tx).await;
    let mut jobs_view: Option<ActiveJobsView> = None;

    while let Some(cmd) = rx.recv().await {
        tracing::debug!("worker command: {cmd:?}");
        if let WorkerCmd::SaveSettings(new_cfg) = cmd {
            tracing::info!("settings updated, reconnecting");
            jobs_view = None;
            drop(services.take());
            services = connect(&new_cfg, &stores, &tx).await;
            notify(&tx, WorkerEvent::Log("settings updated".into())).await;
            continue;
        }
        let Some(svc) = &services else {
            let msg = "backend is not configured (press t)".to_string();
            let ev = match cmd {
                WorkerCmd::CreateJob { .. } => WorkerEvent::JobCreateFailed(msg),
                _ => WorkerEvent::Error(msg),
            };
            notify(&tx, ev).await;
            continue;
        };
        handle(svc, cmd, &mut jobs_view, &tx);
    }
    tracing::info!("worker stopped");
}

/// Build services for `cfg` and restore any saved session.
async fn connect(
    cfg: &Config,
    stores: &SharedStores,
    tx: &mpsc::Sender<WorkerEvent>,
) -> Option<Services> {
    if !cfg.is_complete() {
        tracing::warn!("backend settings incomplete; staying offline");
        return None;
    }

    let http = Client::new();
    let session = Arc::new(SessionManager::new(
        http.clone(),
        &cfg.backend,
        FileTokenStorage::new(SESSION_FILE),
    ));
    let client = BackendClient::new(http, &cfg.backend, session.subscribe());
    let shared = Arc::new(client.clone());
    let ttl = cfg.storage.signed_url_ttl_secs;

    let jobs = JobEngine::new(
        shared.clone(),
        shared.clone(),
        shared.clone(),
        SignedUrlResolver::new(shared.clone(), cfg.storage.jobs_bucket.clone(), ttl),
        stores.jobs.clone(),
        JobSettings {
            poll_interval: cfg.sync.poll_interval(),
            process_function: cfg.sync.process_function.clone(),
        },
    );
    let templates = TemplateBrowser::new(
        shared.clone(),
        SignedUrlResolver::new(shared, cfg.storage.templates_bucket.clone(), ttl),
        stores.templates.clone(),
    );

    let session_watch = watch_session(
        session.subscribe(),
        client.clone(),
        jobs.clone(),
        templates.clone(),
        tx.clone(),
    );

    if let Err(e) = session.restore().await {
        tracing::error!("session restore failed: {e:#}");
        notify(tx, WorkerEvent::Error(format!("session restore failed: {e}"))).await;
    }
    tracing::info!("connected to {}", cfg.backend.url);

    Some(Services {
        session,
        client,
        jobs,
        templates,
        client_secret: PathBuf::from(&cfg.google.client_secret_path),
        download_dir: PathBuf::from(&cfg.storage.download_dir),
        session_watch,
    })
}

/// Forward session changes to the UI. Signing in loads the profile; signing
/// out clears both collections.
fn watch_session(
    mut rx: watch::Receiver<Option<AuthSession>>,
    client: BackendClient,
    jobs: JobEngine,
    templates: TemplateBrowser,
    tx: mpsc::Sender<WorkerEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        // `Some(None)` would mean "known signed out"; start unknown.
        let mut last: Option<Option<String>> = None;
        loop {
            let user = rx.borrow_and_update().as_ref().map(|s| s.user.clone());
            let id = user.as_ref().map(|u| u.id.clone());
            if last.as_ref() != Some(&id) {
                if user.is_none() {
                    jobs.clear();
                    templates.clear();
                }
                let signed_in = user.is_some();
                notify(&tx, WorkerEvent::SessionChanged(user)).await;
                if signed_in {
                    match client.fetch_profile().await {
                        Ok(Some(p)) => notify(&tx, WorkerEvent::ProfileLoaded(p)).await,
                        Ok(None) => tracing::info!("no profile row for this user"),
                        Err(e) => tracing::warn!("profile fetch failed: {e:#}"),
                    }
                }
                last = Some(id);
            }
            if rx.changed().await.is_err() {
                break;
            }
        }
    })
}

fn handle(
    svc: &Services,
    cmd: WorkerCmd,
    jobs_view: &mut Option<ActiveJobsView>,
    tx: &mpsc::Sender<WorkerEvent>,
) {
    match cmd {
        WorkerCmd::SaveSettings(_) => {}

        WorkerCmd::SignIn => {
            let session = svc.session.clone();
            let secret = svc.client_secret.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                tracing::info!("google sign-in started");
                if let Err(e) = session.sign_in_with_google(&secret).await {
                    tracing::error!("sign-in failed: {e:#}");
                    notify(&tx, WorkerEvent::Error(format!("sign-in failed: {e}"))).await;
                }
            });
        }

        WorkerCmd::SignOut => {
            *jobs_view = None;
            let session = svc.session.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                if let Err(e) = session.sign_out().await {
                    tracing::error!("sign-out failed: {e:#}");
                    notify(&tx, WorkerEvent::Error(format!("sign-out failed: {e}"))).await;
                }
            });
        }

        WorkerCmd::RefreshTemplates => {
            let templates = svc.templates.clone();
            with_fresh_session(&svc.session, async move {
                templates.refresh().await;
            });
        }
        WorkerCmd::LoadMoreTemplates => {
            let templates = svc.templates.clone();
            with_fresh_session(&svc.session, async move {
                templates.load_more().await;
            });
        }
        WorkerCmd::SearchTemplates(query) => {
            let templates = svc.templates.clone();
            with_fresh_session(&svc.session, async move {
                templates.search(&query).await;
            });
        }
        WorkerCmd::PullToRefreshTemplates => {
            let templates = svc.templates.clone();
            with_fresh_session(&svc.session, async move {
                templates.pull_to_refresh().await;
            });
        }

        WorkerCmd::ActivateJobs => {
            if jobs_view.is_none() {
                *jobs_view = Some(svc.jobs.activate(svc.session.clone()));
            }
        }
        WorkerCmd::DeactivateJobs => {
            if let Some(view) = jobs_view.take() {
                view.deactivate();
            }
        }
        WorkerCmd::RefreshJobs => {
            let jobs = svc.jobs.clone();
            with_fresh_session(&svc.session, async move {
                jobs.refresh().await;
            });
        }
        WorkerCmd::LoadMoreJobs => {
            let jobs = svc.jobs.clone();
            with_fresh_session(&svc.session, async move {
                jobs.load_more().await;
            });
        }

        WorkerCmd::CreateJob {
            template_id,
            image_path,
        } => {
            let Some(user) = svc.session.session().map(|s| s.user) else {
                let _ = tx.try_send(WorkerEvent::JobCreateFailed("sign in first".into()));
                return;
            };
            let jobs = svc.jobs.clone();
            let tx = tx.clone();
            with_fresh_session(&svc.session, async move {
                match jobs.create_job(&user.id, &template_id, &image_path).await {
                    Ok(job_id) => notify(&tx, WorkerEvent::JobCreated(job_id)).await,
                    Err(e) => {
                        tracing::error!("create job failed: {e}");
                        notify(&tx, WorkerEvent::JobCreateFailed(e.to_string())).await;
                    }
                }
            });
        }

        WorkerCmd::DownloadImage { url } => {
            let client = svc.client.clone();
            let dir = svc.download_dir.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                let name = download_file_name(Utc::now());
                match client.download_to(&url, &dir, &name).await {
                    Ok(path) => {
                        tracing::info!("saved image to {}", path.display());
                        notify(&tx, WorkerEvent::Downloaded(path)).await;
                    }
                    Err(e) => {
                        tracing::error!("download failed: {e:#}");
                        notify(&tx, WorkerEvent::Error(format!("download failed: {e}"))).await;
                    }
                }
            });
        }

        WorkerCmd::FetchPreview(template_id) => {
            let templates = svc.templates.clone();
            let tx = tx.clone();
            with_fresh_session(&svc.session, async move {
                match templates.preview_for(&template_id).await {
                    Ok(t) => notify(&tx, WorkerEvent::TemplatePreview(t)).await,
                    Err(e) => tracing::warn!("preview for {template_id} failed: {e:#}"),
                }
            });
        }
    }
}

/// Run `work` after making sure the access token is not about to expire.
fn with_fresh_session<F>(session: &Arc<SessionManager>, work: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    let session = session.clone();
    tokio::spawn(async move {
        if let Err(e) = session.ensure_fresh().await {
            tracing::warn!("token refresh failed: {e:#}");
        }
        work.await;
    });
}

async fn notify(tx: &mpsc::Sender<WorkerEvent>, ev: WorkerEvent) {
    if tx.send(ev).await.is_err() {
        tracing::debug!("ui gone; dropping worker event");
    }
}

/// `delulily_<unix millis>.jpg`
pub fn download_file_name(now: DateTime<Utc>) -> String {
    format!("delulily_{}.jpg", now.timestamp_millis())
}
