//! レイアウト計算のヘルパー関数

use ratatui::prelude::*;

/// メインレイアウトの3つの領域
pub struct MainLayout {
    /// 一覧 + INFO Panelの領域
    pub body: Rect,
    /// HELPバーの領域
    pub help_bar: Rect,
    /// STATUSバーの領域
    pub status_bar: Rect,
}

/// ボディ部の2つの領域（一覧 + INFO Panel）
pub struct BodyLayout {
    pub list: Rect,
    pub info_panel: Rect,
}

/// 画面を Body + HELP + STATUS に分割
pub fn create_main_layout(area: Rect) -> MainLayout {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(1),
            Constraint::Length(3), // HELPバー
            Constraint::Length(3), // STATUSバー
        ])
        .split(area);

    MainLayout {
        body: chunks[0],
        help_bar: chunks[1],
        status_bar: chunks[2],
    }
}

/// Body領域を一覧 65% + INFO Panel 35% に分割
pub fn create_body_layout(area: Rect) -> BodyLayout {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(65), Constraint::Percentage(35)])
        .split(area);

    BodyLayout {
        list: chunks[0],
        info_panel: chunks[1],
    }
}

/// 上部に固定高さのヘッダー（プロフィール・統計など）を切り出す
pub fn split_header(area: Rect, height: u16) -> (Rect, Rect) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(height), Constraint::Min(1)])
        .split(area);
    (chunks[0], chunks[1])
}
