//! TUI描画関連の関数。

use chrono::Local;
use ratatui::{
    Frame,
    prelude::*,
    widgets::{Block, Borders, Paragraph, Row, Table, TableState, Wrap},
};

use crate::{
    events::Screen,
    input, layout,
    shortcuts::Shortcuts,
    sync::{
        model::{Job, JobStats, JobStatus},
        store::CollectionState,
    },
};

use super::App;

/// 画面全体のレイアウトを描画する。
pub fn draw(f: &mut Frame, app: &App) {
    match app.ui.screen {
        Screen::InitialSetup => draw_wizard_screen(f, app),
        _ => draw_main(f, app),
    }
    // 入力ボックスが開いていれば重ねて描画する。
    if let Some(input_state) = &app.input_box {
        input::render_input_box(f, input_state);
    }
}

fn draw_main(f: &mut Frame, app: &App) {
    let main_layout = layout::create_main_layout(f.area());

    match app.ui.screen {
        Screen::SignIn => draw_sign_in(f, app, main_layout.body),
        Screen::Templates => draw_templates(f, app, main_layout.body),
        Screen::TemplateDetail => draw_template_detail(f, app, main_layout.body),
        Screen::Creations => draw_creations(f, app, main_layout.body),
        Screen::JobDetail => draw_job_detail(f, app, main_layout.body),
        Screen::Settings => draw_settings(f, app, main_layout.body),
        Screen::InitialSetup => {}
    }

    let help_bar = Paragraph::new(get_help_text(&app.ui.screen, &app.shortcuts))
        .block(Block::default().borders(Borders::ALL).title("HELP"))
        .wrap(Wrap { trim: true });
    f.render_widget(help_bar, main_layout.help_bar);

    f.render_widget(build_status_bar(app), main_layout.status_bar);
}

/// 一覧の強調表示スタイル。
fn highlight() -> Style {
    Style::default()
        .bg(Color::Rgb(255, 140, 0)) // オレンジ色の背景
        .fg(Color::Black)
        .add_modifier(Modifier::BOLD)
}

/// 一覧タイトル（件数・読み込み状態付き）。
fn list_title<T>(name: &str, s: &CollectionState<T>) -> String {
    let mut title = format!("{name} ({})", s.items.len());
    if !s.search_query.is_empty() {
        title.push_str(&format!(" search: \"{}\"", s.search_query));
    }
    if s.is_refreshing {
        title.push_str(" refreshing...");
    } else if s.is_loading {
        title.push_str(" loading...");
    } else if !s.cursor.has_more() && !s.items.is_empty() {
        title.push_str(" end");
    }
    title
}

fn paragraph(text: String, title: &str) -> Paragraph<'static> {
    Paragraph::new(text)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(title.to_string()),
        )
        .wrap(Wrap { trim: true })
}

fn recent_log(app: &App, n: usize) -> String {
    let start = app.ui.log.len().saturating_sub(n);
    app.ui.log[start..].join("\n")
}

fn draw_sign_in(f: &mut Frame, app: &App, area: Rect) {
    let text = format!(
        "=== delulily ===\n\nTurn a selfie into art.\n\nPress {} to sign in with Google.\nA browser window will open for consent.\n\nBackend: {}\n\n{}",
        format_keys(&app.shortcuts.sign_in.sign_in),
        app.cfg.backend.url,
        recent_log(app, 5),
    );
    f.render_widget(paragraph(text, "SIGN IN"), area);
}

fn draw_templates(f: &mut Frame, app: &App, area: Rect) {
    let body = layout::create_body_layout(area);
    let state = app.templates.borrow();

    let rows = state.items.iter().enumerate().map(|(i, t)| {
        Row::new(vec![
            format!("{}", i + 1),
            t.name.clone(),
            if t.preview_url.is_some() { "ready" } else { "..." }.to_string(),
        ])
    });
    let table = Table::new(
        rows,
        [
            Constraint::Length(4),
            Constraint::Min(10),
            Constraint::Length(8),
        ],
    )
    .block(
        Block::default()
            .borders(Borders::ALL)
            .title(list_title("TEMPLATES", &state)),
    )
    .header(Row::new(vec!["#", "name", "preview"]).bold())
    .row_highlight_style(highlight());

    let mut table_state = TableState::default();
    if !state.items.is_empty() {
        table_state.select(Some(app.ui.template_selected.min(state.items.len() - 1)));
    }
    f.render_stateful_widget(table, body.list, &mut table_state);

    let selected = state.items.get(app.ui.template_selected);
    let info = format!(
        "Selected: {}\nPreview: {}\n\nUser: {}\n\nLog:\n{}",
        selected.map(|t| t.name.as_str()).unwrap_or("-"),
        selected
            .and_then(|t| t.preview_url.as_deref())
            .unwrap_or("-"),
        display_name(app),
        recent_log(app, 8),
    );
    f.render_widget(paragraph(info, "INFO"), body.info_panel);
}

fn draw_template_detail(f: &mut Frame, app: &App, area: Rect) {
    let text = match app.selected_template() {
        Some(t) => format!(
            "{}\n\nPreview: {}\n\nYour photo: {}\n\nPress {} to choose a photo, then {} to generate.",
            t.name,
            t.preview_url.as_deref().unwrap_or("(loading)"),
            if app.photo_path.is_empty() {
                "(none)"
            } else {
                app.photo_path.as_str()
            },
            format_keys(&app.shortcuts.template_detail.photo),
            format_keys(&app.shortcuts.template_detail.generate),
        ),
        None => "Template is no longer in the list.".to_string(),
    };
    f.render_widget(paragraph(text, "TEMPLATE"), area);
}

fn draw_creations(f: &mut Frame, app: &App, area: Rect) {
    let (header, rest) = layout::split_header(area, 4);
    let body = layout::create_body_layout(rest);
    let state = app.jobs.borrow();

    let stats = JobStats::tally(&state.items);
    let head = format!(
        "{}\nTotal: {}  Completed: {}  Processing: {}",
        display_name(app),
        stats.total,
        stats.completed,
        stats.processing
    );
    f.render_widget(paragraph(head, "PROFILE"), header);

    let rows = state.items.iter().enumerate().map(|(i, j)| {
        Row::new(vec![
            format!("{}", i + 1),
            status_label(j.status).to_string(),
            template_name(app, &j.template_id),
            j.created_at
                .with_timezone(&Local)
                .format("%Y-%m-%d %H:%M")
                .to_string(),
        ])
        .style(status_style(j.status))
    });
    let table = Table::new(
        rows,
        [
            Constraint::Length(4),
            Constraint::Length(11),
            Constraint::Min(10),
            Constraint::Length(16),
        ],
    )
    .block(
        Block::default()
            .borders(Borders::ALL)
            .title(list_title("CREATIONS", &state)),
    )
    .header(Row::new(vec!["#", "status", "template", "created"]).bold())
    .row_highlight_style(highlight());

    let mut table_state = TableState::default();
    if !state.items.is_empty() {
        table_state.select(Some(app.ui.job_selected.min(state.items.len() - 1)));
    }
    f.render_stateful_widget(table, body.list, &mut table_state);

    let info = match state.items.get(app.ui.job_selected) {
        Some(j) => job_summary(j),
        None if state.is_loading => "Loading...".to_string(),
        None => "No creations yet. Pick a template to start.".to_string(),
    };
    f.render_widget(paragraph(info, "INFO"), body.info_panel);
}

fn draw_job_detail(f: &mut Frame, app: &App, area: Rect) {
    let body = layout::create_body_layout(area);
    let Some(job) = app.selected_job() else {
        f.render_widget(paragraph("Job not found.".into(), "JOB"), area);
        return;
    };

    let mut text = job_summary(&job);
    text.push_str(&format!(
        "\n\nResult: {}\nInput: {}",
        job.generated_image_url.as_deref().unwrap_or("-"),
        job.input_image_url.as_deref().unwrap_or("-"),
    ));
    if job.status.is_pending() {
        text.push_str("\n\nStill working. This view updates automatically.");
    }
    f.render_widget(paragraph(text, "JOB"), body.list);

    let template = match &app.preview {
        Some(t) if t.id == job.template_id => format!(
            "{}\n\nPreview: {}",
            t.name,
            t.preview_url.as_deref().unwrap_or("-")
        ),
        _ => "Loading template...".to_string(),
    };
    f.render_widget(paragraph(template, "TEMPLATE"), body.info_panel);
}

fn draw_settings(f: &mut Frame, app: &App, area: Rect) {
    let sc = &app.shortcuts.settings;
    let text = format!(
        "[{}] Project URL: {}\n[{}] Anon key: {}\n[{}] Google client secret: {}\n\nJobs bucket: {}\nTemplates bucket: {}\nPoll interval: {}s\nDownloads: {}",
        format_keys(&sc.backend_url),
        app.backend_url,
        format_keys(&sc.anon_key),
        mask(&app.anon_key),
        format_keys(&sc.client_secret),
        app.client_secret,
        app.cfg.storage.jobs_bucket,
        app.cfg.storage.templates_bucket,
        app.cfg.sync.poll_interval_secs,
        app.cfg.storage.download_dir,
    );
    f.render_widget(paragraph(text, "SETTINGS"), area);
}

fn job_summary(j: &Job) -> String {
    let mut s = format!(
        "Job: {}\nStatus: {}\nCreated: {}",
        j.job_id,
        status_label(j.status),
        j.created_at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S"),
    );
    if let Some(err) = &j.error_msg {
        s.push_str(&format!("\nError: {err}"));
    }
    s
}

fn display_name(app: &App) -> String {
    app.profile
        .as_ref()
        .and_then(|p| p.full_name.clone())
        .or_else(|| app.user.as_ref().and_then(|u| u.email.clone()))
        .unwrap_or_else(|| "-".into())
}

fn template_name(app: &App, template_id: &str) -> String {
    app.templates
        .borrow()
        .items
        .iter()
        .find(|t| t.id == template_id)
        .map(|t| t.name.clone())
        .unwrap_or_else(|| template_id.to_string())
}

/// キーの先頭4文字だけ見せる。
fn mask(secret: &str) -> String {
    if secret.is_empty() {
        return String::new();
    }
    let head: String = secret.chars().take(4).collect();
    format!("{head}****")
}

/// ステータスバーを構築する。
fn build_status_bar(app: &App) -> Paragraph<'static> {
    let screen_name = match app.ui.screen {
        Screen::SignIn => "SignIn",
        Screen::Templates => "Templates",
        Screen::TemplateDetail => "Template",
        Screen::Creations => "Creations",
        Screen::JobDetail => "Job",
        Screen::Settings => "Settings",
        Screen::InitialSetup => "Setup",
    };

    let status_text = match &app.ui.error {
        Some(err) => format!("[{screen_name}] ERROR: {err}"),
        None => format!("[{screen_name}] {}", app.ui.status),
    };

    let mut status_bar = Paragraph::new(status_text)
        .block(Block::default().borders(Borders::ALL).title("STATUS"))
        .wrap(Wrap { trim: true });
    if app.ui.error.is_some() {
        status_bar = status_bar.style(Style::default().fg(Color::Red));
    }
    status_bar
}

/// ウィザード画面を描画する。
fn draw_wizard_screen(f: &mut Frame, app: &App) {
    let outer_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage(20),
            Constraint::Min(10),
            Constraint::Percentage(20),
        ])
        .split(f.area());

    let content_text = format!(
        "=== Initial Setup Wizard ===\n\nStep {}/{}\n\n{}\n\nPress Enter to proceed, ESC to skip step.",
        app.wizard_state.get_step_number(),
        app.wizard_state.total_steps,
        app.wizard_state.get_prompt()
    );
    let content = Paragraph::new(content_text)
        .block(Block::default().borders(Borders::ALL).title("Setup"))
        .alignment(Alignment::Left)
        .wrap(Wrap { trim: true });
    f.render_widget(content, outer_layout[1]);

    if let Some(err) = &app.ui.error {
        let error_layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(0), Constraint::Length(3)])
            .split(f.area());
        let error_text = Paragraph::new(format!("ERROR: {err}"))
            .block(Block::default().borders(Borders::ALL).title("Error"))
            .style(Style::default().fg(Color::Red))
            .wrap(Wrap { trim: true });
        f.render_widget(error_text, error_layout[1]);
    }
}

/// 現在画面に応じたヘルプ文字列を返す。
fn get_help_text(screen: &Screen, sc: &Shortcuts) -> String {
    match screen {
        Screen::SignIn => format!(
            "{}: sign in with Google | {}: settings | {}: quit",
            format_keys(&sc.sign_in.sign_in),
            format_keys(&sc.sign_in.settings),
            format_keys(&sc.sign_in.quit)
        ),
        Screen::Templates => format!(
            "{}: open | {}: search | {}: reset & refresh | {}: more | {}: creations | {}: settings | {}: sign out | {}: quit",
            format_keys(&sc.templates.enter),
            format_keys(&sc.templates.search),
            format_keys(&sc.templates.refresh),
            format_keys(&sc.templates.load_more),
            format_keys(&sc.templates.creations),
            format_keys(&sc.templates.settings),
            format_keys(&sc.templates.sign_out),
            format_keys(&sc.templates.quit)
        ),
        Screen::TemplateDetail => format!(
            "{}: choose photo | {}: generate | {}: back",
            format_keys(&sc.template_detail.photo),
            format_keys(&sc.template_detail.generate),
            format_keys(&sc.template_detail.back)
        ),
        Screen::Creations => format!(
            "{}: open | {}: refresh | {}: more | {}/{}: navigate | {}: back",
            format_keys(&sc.creations.enter),
            format_keys(&sc.creations.refresh),
            format_keys(&sc.creations.load_more),
            format_keys(&sc.creations.up),
            format_keys(&sc.creations.down),
            format_keys(&sc.creations.back)
        ),
        Screen::JobDetail => format!(
            "{}: download | {}: back",
            format_keys(&sc.job_detail.download),
            format_keys(&sc.job_detail.back)
        ),
        Screen::Settings => format!(
            "{}: project url | {}: anon key | {}: client secret | {}: save | {}: cancel",
            format_keys(&sc.settings.backend_url),
            format_keys(&sc.settings.anon_key),
            format_keys(&sc.settings.client_secret),
            format_keys(&sc.settings.save),
            format_keys(&sc.settings.cancel)
        ),
        Screen::InitialSetup => format!(
            "Follow wizard steps | {}: proceed | {}: skip step",
            format_keys(&sc.wizard.proceed),
            format_keys(&sc.wizard.skip)
        ),
    }
}

fn format_keys(keys: &[String]) -> String {
    keys.join("/")
}

/// ジョブ状態を一覧表示用の短いラベルへ変換する。
fn status_label(s: JobStatus) -> &'static str {
    match s {
        JobStatus::Created => "Queued",
        JobStatus::Uploading => "Uploading",
        JobStatus::Processing => "Processing",
        JobStatus::Completed => "Done",
        JobStatus::Failed => "Failed",
    }
}

fn status_style(s: JobStatus) -> Style {
    match s {
        JobStatus::Failed => Style::default().fg(Color::Red),
        JobStatus::Completed => Style::default().fg(Color::Green),
        _ => Style::default(),
    }
}
