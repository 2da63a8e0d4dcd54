//! キー入力ハンドラー関数。

use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use std::path::{Path, PathBuf};

use crate::{
    events::Screen,
    input::{InputBoxState, InputCallbackId},
    shortcuts::matches_shortcut,
    sync::model::JobStatus,
    wizard::WizardStep,
    worker::WorkerCmd,
};

use super::App;

/// キー入力を1件処理し、終了すべきならtrueを返す。
pub fn handle_key(app: &mut App, k: KeyEvent) -> Result<bool> {
    // 入力ボックスが開いていれば最優先で処理する。
    if app.input_box.is_some() {
        return handle_input_box_key(app, k);
    }

    match app.ui.screen {
        Screen::SignIn => handle_sign_in_key(app, k),
        Screen::Templates => handle_templates_key(app, k),
        Screen::TemplateDetail => handle_template_detail_key(app, k),
        Screen::Creations => handle_creations_key(app, k),
        Screen::JobDetail => handle_job_detail_key(app, k),
        Screen::Settings => handle_settings_key(app, k),
        Screen::InitialSetup => handle_wizard_key(app, k),
    }
}

/// Ctrl+Cかどうかを判定する。
pub fn is_ctrl_c(k: &KeyEvent) -> bool {
    k.modifiers.contains(KeyModifiers::CONTROL) && k.code == KeyCode::Char('c')
}

/// サインイン状態に応じた戻り先。
fn home_screen(app: &App) -> Screen {
    if app.user.is_some() {
        Screen::Templates
    } else {
        Screen::SignIn
    }
}

fn open_settings(app: &mut App) -> Result<()> {
    app.reload_settings_buffers();
    app.go_to(Screen::Settings)?;
    app.ui.status = "Settings".into();
    Ok(())
}

/// 選択を1行下げる。末尾に達したら次ページを要求する（無限スクロール）。
fn step_down(selected: &mut usize, len: usize, can_load_more: bool) -> bool {
    if *selected + 1 < len {
        *selected += 1;
    }
    can_load_more && *selected + 1 >= len
}

fn handle_sign_in_key(app: &mut App, k: KeyEvent) -> Result<bool> {
    let sc = &app.shortcuts.sign_in;

    if matches_shortcut(&k, &sc.quit) {
        return Ok(true);
    } else if matches_shortcut(&k, &sc.settings) {
        open_settings(app)?;
    } else if matches_shortcut(&k, &sc.sign_in) {
        // ブラウザでGoogleの同意画面を開く。
        app.send(WorkerCmd::SignIn)?;
        app.ui.error = None;
        app.ui.status = "Waiting for Google sign-in in your browser...".into();
    }
    Ok(false)
}

fn handle_templates_key(app: &mut App, k: KeyEvent) -> Result<bool> {
    let sc = app.shortcuts.templates.clone();
    let (len, can_load_more, query) = {
        let s = app.templates.borrow();
        (
            s.items.len(),
            s.cursor.has_more() && !s.is_loading,
            s.search_query.clone(),
        )
    };

    if matches_shortcut(&k, &sc.quit) {
        return Ok(true);
    } else if matches_shortcut(&k, &sc.settings) {
        open_settings(app)?;
    } else if matches_shortcut(&k, &sc.creations) {
        app.ui.job_selected = 0;
        app.go_to(Screen::Creations)?;
    } else if matches_shortcut(&k, &sc.search) {
        app.input_box = Some(InputBoxState::new(
            "Search templates:",
            &query,
            InputCallbackId::TemplateSearch,
        ));
    } else if matches_shortcut(&k, &sc.refresh) {
        // 検索条件も含めて全てリセットする。
        app.ui.template_selected = 0;
        app.send(WorkerCmd::PullToRefreshTemplates)?;
    } else if matches_shortcut(&k, &sc.load_more) {
        app.send(WorkerCmd::LoadMoreTemplates)?;
    } else if matches_shortcut(&k, &sc.down) {
        if step_down(&mut app.ui.template_selected, len, can_load_more) {
            app.send(WorkerCmd::LoadMoreTemplates)?;
        }
    } else if matches_shortcut(&k, &sc.up) {
        app.ui.template_selected = app.ui.template_selected.saturating_sub(1);
    } else if matches_shortcut(&k, &sc.enter) {
        let id = app
            .templates
            .borrow()
            .items
            .get(app.ui.template_selected)
            .map(|t| t.id.clone());
        if let Some(id) = id {
            app.ui.open_template = Some(id);
            app.go_to(Screen::TemplateDetail)?;
        }
    } else if matches_shortcut(&k, &sc.sign_out) {
        app.send(WorkerCmd::SignOut)?;
    }
    Ok(false)
}

fn handle_template_detail_key(app: &mut App, k: KeyEvent) -> Result<bool> {
    let sc = app.shortcuts.template_detail.clone();

    if matches_shortcut(&k, &sc.back) {
        app.go_to(Screen::Templates)?;
    } else if matches_shortcut(&k, &sc.photo) {
        app.input_box = Some(InputBoxState::new(
            "Photo path:",
            &app.photo_path,
            InputCallbackId::PhotoPath,
        ));
    } else if matches_shortcut(&k, &sc.generate) {
        // 作成中の二重送信を防ぐ。
        if app.ui.creating_job {
            return Ok(false);
        }
        let Some(template) = app.selected_template() else {
            return Ok(false);
        };
        if app.photo_path.trim().is_empty() {
            app.ui.error = Some("Choose a photo first (p)".into());
            return Ok(false);
        }
        app.send(WorkerCmd::CreateJob {
            template_id: template.id,
            image_path: expand_home(app.photo_path.trim()),
        })?;
        // 一覧への遷移は処理を投げ終えてから（JobCreated受信時）行う。
        app.ui.creating_job = true;
        app.ui.error = None;
        app.ui.status = format!("Generating with {}...", template.name);
    }
    Ok(false)
}

fn handle_creations_key(app: &mut App, k: KeyEvent) -> Result<bool> {
    let sc = app.shortcuts.creations.clone();
    let (len, can_load_more) = {
        let s = app.jobs.borrow();
        (s.items.len(), s.cursor.has_more() && !s.is_loading)
    };

    if matches_shortcut(&k, &sc.back) {
        app.go_to(Screen::Templates)?;
    } else if matches_shortcut(&k, &sc.refresh) {
        app.ui.job_selected = 0;
        app.send(WorkerCmd::RefreshJobs)?;
    } else if matches_shortcut(&k, &sc.load_more) {
        app.send(WorkerCmd::LoadMoreJobs)?;
    } else if matches_shortcut(&k, &sc.down) {
        if step_down(&mut app.ui.job_selected, len, can_load_more) {
            app.send(WorkerCmd::LoadMoreJobs)?;
        }
    } else if matches_shortcut(&k, &sc.up) {
        app.ui.job_selected = app.ui.job_selected.saturating_sub(1);
    } else if matches_shortcut(&k, &sc.enter) {
        let job = app.jobs.borrow().items.get(app.ui.job_selected).cloned();
        if let Some(job) = job {
            app.preview = None;
            app.send(WorkerCmd::FetchPreview(job.template_id))?;
            app.ui.open_job = Some(job.job_id);
            app.go_to(Screen::JobDetail)?;
        }
    }
    Ok(false)
}

fn handle_job_detail_key(app: &mut App, k: KeyEvent) -> Result<bool> {
    let sc = app.shortcuts.job_detail.clone();

    if matches_shortcut(&k, &sc.back) {
        app.go_to(Screen::Creations)?;
    } else if matches_shortcut(&k, &sc.download) {
        let Some(job) = app.selected_job() else {
            return Ok(false);
        };
        match (job.status, job.generated_image_url) {
            (JobStatus::Completed, Some(url)) => {
                app.send(WorkerCmd::DownloadImage { url })?;
                app.ui.status = "Downloading...".into();
            }
            _ => app.ui.error = Some("The image is not ready yet".into()),
        }
    }
    Ok(false)
}

fn handle_settings_key(app: &mut App, k: KeyEvent) -> Result<bool> {
    let sc = app.shortcuts.settings.clone();

    if matches_shortcut(&k, &sc.cancel) {
        // 変更を破棄して戻る。
        app.reload_settings_buffers();
        let home = home_screen(app);
        app.go_to(home)?;
    } else if matches_shortcut(&k, &sc.save) {
        app.commit_settings()?;
        let home = home_screen(app);
        app.go_to(home)?;
        app.ui.status = "Saved settings".into();
    } else if matches_shortcut(&k, &sc.backend_url) {
        app.input_box = Some(InputBoxState::new(
            "Project URL:",
            &app.backend_url,
            InputCallbackId::SettingsBackendUrl,
        ));
    } else if matches_shortcut(&k, &sc.anon_key) {
        app.input_box = Some(InputBoxState::new(
            "Anon key:",
            &app.anon_key,
            InputCallbackId::SettingsAnonKey,
        ));
    } else if matches_shortcut(&k, &sc.client_secret) {
        app.input_box = Some(InputBoxState::new(
            "Google client secret JSON:",
            &app.client_secret,
            InputCallbackId::SettingsClientSecret,
        ));
    }
    Ok(false)
}

/// 初期設定ウィザード画面のキー処理。
fn handle_wizard_key(app: &mut App, k: KeyEvent) -> Result<bool> {
    let sc = app.shortcuts.wizard.clone();

    if matches_shortcut(&k, &sc.proceed) {
        match &app.wizard_state.current_step {
            WizardStep::Welcome => app.wizard_state.next_step(),
            WizardStep::BackendUrl => {
                app.input_box = Some(InputBoxState::new(
                    "Project URL:",
                    &app.backend_url,
                    InputCallbackId::WizardBackendUrl,
                ));
            }
            WizardStep::AnonKey => {
                app.input_box = Some(InputBoxState::new(
                    "Anon key:",
                    &app.anon_key,
                    InputCallbackId::WizardAnonKey,
                ));
            }
            WizardStep::ClientSecret => {
                app.input_box = Some(InputBoxState::new(
                    "Google client secret JSON:",
                    &app.client_secret,
                    InputCallbackId::WizardClientSecret,
                ));
            }
            WizardStep::Complete => {
                if app.backend_url.trim().is_empty() || app.anon_key.trim().is_empty() {
                    app.ui.error = Some("Project URL and anon key are required.".into());
                    app.wizard_state.current_step = WizardStep::BackendUrl;
                    return Ok(false);
                }
                if !Path::new(app.client_secret.trim()).exists() {
                    app.ui.error = Some(format!("{} not found.", app.client_secret.trim()));
                    app.wizard_state.current_step = WizardStep::ClientSecret;
                    return Ok(false);
                }

                app.commit_settings()?;
                app.go_to(Screen::SignIn)?;
                app.ui.status = "Setup complete! Press Enter to sign in.".into();
            }
        }
    } else if matches_shortcut(&k, &sc.skip) {
        app.wizard_state.next_step();
    }
    Ok(false)
}

/// 入力ボックスのキー処理。
fn handle_input_box_key(app: &mut App, k: KeyEvent) -> Result<bool> {
    let Some(input_state) = &mut app.input_box else {
        return Ok(false);
    };
    let sc = &app.shortcuts.input_box;

    if is_ctrl_c(&k) {
        return Ok(true);
    }

    if matches_shortcut(&k, &sc.confirm) {
        let value = input_state.value.clone();
        let callback_id = input_state.callback_id.clone();
        app.input_box = None;
        apply_input_callback(app, callback_id, value)?;
    } else if matches_shortcut(&k, &sc.cancel) {
        app.input_box = None;
    } else if matches_shortcut(&k, &sc.backspace) {
        input_state.backspace();
    } else if matches_shortcut(&k, &sc.delete) {
        input_state.delete();
    } else if matches_shortcut(&k, &sc.left) {
        input_state.move_left();
    } else if matches_shortcut(&k, &sc.right) {
        input_state.move_right();
    } else if matches_shortcut(&k, &sc.home) {
        input_state.move_home();
    } else if matches_shortcut(&k, &sc.end) {
        input_state.move_end();
    } else if matches_shortcut(&k, &sc.clear_line) {
        input_state.clear_line();
    } else if let KeyCode::Char(c) = k.code
        && !k.modifiers.contains(KeyModifiers::CONTROL)
    {
        input_state.insert_char(c);
    }
    Ok(false)
}

/// 入力ボックスのコールバックを適用する。
fn apply_input_callback(app: &mut App, callback_id: InputCallbackId, value: String) -> Result<()> {
    match callback_id {
        InputCallbackId::TemplateSearch => {
            app.ui.template_selected = 0;
            app.send(WorkerCmd::SearchTemplates(value.trim().to_string()))?;
        }
        InputCallbackId::PhotoPath => {
            app.ui.error = None;
            app.photo_path = value;
        }
        InputCallbackId::SettingsBackendUrl => app.backend_url = value,
        InputCallbackId::SettingsAnonKey => app.anon_key = value,
        InputCallbackId::SettingsClientSecret => app.client_secret = value,
        InputCallbackId::WizardBackendUrl => {
            app.backend_url = value;
            app.wizard_state.next_step();
        }
        InputCallbackId::WizardAnonKey => {
            app.anon_key = value;
            app.wizard_state.next_step();
        }
        InputCallbackId::WizardClientSecret => {
            app.client_secret = value;
            app.wizard_state.next_step();
        }
    }
    Ok(())
}

/// 先頭の`~/`をホームディレクトリに展開する。
fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), std::env::var_os("HOME")) {
        (Some(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => PathBuf::from(path),
    }
}
