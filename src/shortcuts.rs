//! ショートカット設定の管理。

use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// ショートカット設定の全体。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Shortcuts {
    pub templates: TemplatesShortcuts,
    pub template_detail: TemplateDetailShortcuts,
    pub creations: CreationsShortcuts,
    pub job_detail: JobDetailShortcuts,
    pub sign_in: SignInShortcuts,
    pub settings: SettingsShortcuts,
    pub wizard: WizardShortcuts,
    pub input_box: InputBoxShortcuts,
}

/// テンプレート一覧（ホーム）のショートカット。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplatesShortcuts {
    pub quit: Vec<String>,
    pub settings: Vec<String>,
    pub creations: Vec<String>,
    pub search: Vec<String>,
    pub refresh: Vec<String>,
    pub load_more: Vec<String>,
    pub enter: Vec<String>,
    pub down: Vec<String>,
    pub up: Vec<String>,
    pub sign_out: Vec<String>,
}

/// テンプレート詳細のショートカット。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateDetailShortcuts {
    pub back: Vec<String>,
    pub photo: Vec<String>,
    pub generate: Vec<String>,
}

/// 生成ジョブ一覧のショートカット。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreationsShortcuts {
    pub back: Vec<String>,
    pub refresh: Vec<String>,
    pub load_more: Vec<String>,
    pub enter: Vec<String>,
    pub down: Vec<String>,
    pub up: Vec<String>,
}

/// ジョブ詳細のショートカット。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobDetailShortcuts {
    pub back: Vec<String>,
    pub download: Vec<String>,
}

/// サインイン画面のショートカット。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignInShortcuts {
    pub sign_in: Vec<String>,
    pub settings: Vec<String>,
    pub quit: Vec<String>,
}

/// 設定画面のショートカット。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingsShortcuts {
    pub cancel: Vec<String>,
    pub save: Vec<String>,
    pub backend_url: Vec<String>,
    pub anon_key: Vec<String>,
    pub client_secret: Vec<String>,
}

/// ウィザード画面のショートカット。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WizardShortcuts {
    pub proceed: Vec<String>,
    pub skip: Vec<String>,
}

/// InputBoxのショートカット。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputBoxShortcuts {
    pub confirm: Vec<String>,
    pub cancel: Vec<String>,
    pub backspace: Vec<String>,
    pub delete: Vec<String>,
    pub left: Vec<String>,
    pub right: Vec<String>,
    pub home: Vec<String>,
    pub end: Vec<String>,
    pub clear_line: Vec<String>,
}

impl Shortcuts {
    /// TOMLから読み込む。無ければ既定値を書き出して返す。
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Ok(toml::from_str(&content)?)
        } else {
            // 編集しやすいよう既定値をファイルに残す。
            let shortcuts = Self::default();
            shortcuts.save(path)?;
            Ok(shortcuts)
        }
    }

    /// TOMLとして保存する。
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

fn keys(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

impl Default for Shortcuts {
    fn default() -> Self {
        Self {
            templates: TemplatesShortcuts {
                quit: keys(&["q"]),
                settings: keys(&["t"]),
                creations: keys(&["c"]),
                search: keys(&["/", "s"]),
                refresh: keys(&["r"]),
                load_more: keys(&["n"]),
                enter: keys(&["Enter"]),
                down: keys(&["Down", "j"]),
                up: keys(&["Up", "k"]),
                sign_out: keys(&["Ctrl+o"]),
            },
            template_detail: TemplateDetailShortcuts {
                back: keys(&["Esc"]),
                photo: keys(&["p"]),
                generate: keys(&["Enter", "g"]),
            },
            creations: CreationsShortcuts {
                back: keys(&["Esc"]),
                refresh: keys(&["r"]),
                load_more: keys(&["n"]),
                enter: keys(&["Enter"]),
                down: keys(&["Down", "j"]),
                up: keys(&["Up", "k"]),
            },
            job_detail: JobDetailShortcuts {
                back: keys(&["Esc"]),
                download: keys(&["d"]),
            },
            sign_in: SignInShortcuts {
                sign_in: keys(&["Enter"]),
                settings: keys(&["t"]),
                quit: keys(&["q"]),
            },
            settings: SettingsShortcuts {
                cancel: keys(&["Esc"]),
                save: keys(&["Enter"]),
                backend_url: keys(&["u"]),
                anon_key: keys(&["a"]),
                client_secret: keys(&["g"]),
            },
            wizard: WizardShortcuts {
                proceed: keys(&["Enter"]),
                skip: keys(&["Esc"]),
            },
            input_box: InputBoxShortcuts {
                confirm: keys(&["Enter"]),
                cancel: keys(&["Esc"]),
                backspace: keys(&["Backspace"]),
                delete: keys(&["Delete"]),
                left: keys(&["Left"]),
                right: keys(&["Right"]),
                home: keys(&["Home"]),
                end: keys(&["End"]),
                clear_line: keys(&["Ctrl+u"]),
            },
        }
    }
}

/// KeyEventがいずれかのショートカット文字列と一致するか判定する。
pub fn matches_shortcut(key: &KeyEvent, shortcuts: &[String]) -> bool {
    shortcuts.iter().any(|s| matches_single_shortcut(key, s))
}

/// KeyEventが単一のショートカット文字列と一致するか判定する。
fn matches_single_shortcut(key: &KeyEvent, shortcut: &str) -> bool {
    // 例: "Ctrl+u", "a", "Enter"。"+" 単体はキーそのものとして扱う。
    let (modifiers_str, key_str) = match shortcut.rsplit_once('+') {
        Some((mods, k)) if !k.is_empty() => (mods.split('+').collect::<Vec<_>>(), k),
        _ => (Vec::new(), shortcut),
    };

    let mut expected_modifiers = KeyModifiers::empty();
    for modifier in modifiers_str {
        match modifier {
            "Ctrl" | "ctrl" => expected_modifiers |= KeyModifiers::CONTROL,
            "Alt" | "alt" => expected_modifiers |= KeyModifiers::ALT,
            "Shift" | "shift" => expected_modifiers |= KeyModifiers::SHIFT,
            _ => return false,
        }
    }

    // 大文字や記号は端末によってSHIFTが付くため、文字キーではSHIFTを無視する。
    let modifiers_match = match key.code {
        KeyCode::Char(_) => {
            key.modifiers.difference(KeyModifiers::SHIFT)
                == expected_modifiers.difference(KeyModifiers::SHIFT)
        }
        _ => key.modifiers == expected_modifiers,
    };
    if !modifiers_match {
        return false;
    }

    match key_str {
        "Enter" | "enter" => key.code == KeyCode::Enter,
        "Esc" | "esc" => key.code == KeyCode::Esc,
        "Tab" | "tab" => key.code == KeyCode::Tab,
        "Backspace" | "backspace" => key.code == KeyCode::Backspace,
        "Delete" | "delete" => key.code == KeyCode::Delete,
        "Up" | "up" => key.code == KeyCode::Up,
        "Down" | "down" => key.code == KeyCode::Down,
        "Left" | "left" => key.code == KeyCode::Left,
        "Right" | "right" => key.code == KeyCode::Right,
        "Home" | "home" => key.code == KeyCode::Home,
        "End" | "end" => key.code == KeyCode::End,
        s => {
            let mut it = s.chars();
            match (it.next(), it.next()) {
                (Some(c), None) => key.code == KeyCode::Char(c),
                _ => false,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_matches_shortcut_simple_char() {
        let key = KeyEvent::new(KeyCode::Char('q'), KeyModifiers::empty());
        assert!(matches_shortcut(&key, &[String::from("q")]));
        assert!(!matches_shortcut(&key, &[String::from("w")]));
    }

    #[test]
    fn test_matches_shortcut_special_key() {
        let key = KeyEvent::new(KeyCode::Enter, KeyModifiers::empty());
        assert!(matches_shortcut(&key, &[String::from("Enter")]));
        assert!(!matches_shortcut(&key, &[String::from("Esc")]));
    }

    #[test]
    fn test_matches_shortcut_with_modifier() {
        let key = KeyEvent::new(KeyCode::Char('u'), KeyModifiers::CONTROL);
        assert!(matches_shortcut(&key, &[String::from("Ctrl+u")]));
        assert!(!matches_shortcut(&key, &[String::from("u")]));
    }

    #[test]
    fn test_matches_shortcut_multiple_keys() {
        let key_up = KeyEvent::new(KeyCode::Up, KeyModifiers::empty());
        let key_k = KeyEvent::new(KeyCode::Char('k'), KeyModifiers::empty());
        let shortcuts = keys(&["Up", "k"]);

        assert!(matches_shortcut(&key_up, &shortcuts));
        assert!(matches_shortcut(&key_k, &shortcuts));

        let key_j = KeyEvent::new(KeyCode::Char('j'), KeyModifiers::empty());
        assert!(!matches_shortcut(&key_j, &shortcuts));
    }

    #[test]
    fn shifted_symbols_match_plain_bindings() {
        // "/" arrives with SHIFT on some layouts
        let key = KeyEvent::new(KeyCode::Char('/'), KeyModifiers::SHIFT);
        assert!(matches_shortcut(&key, &keys(&["/"])));
        let plus = KeyEvent::new(KeyCode::Char('+'), KeyModifiers::empty());
        assert!(matches_shortcut(&plus, &keys(&["+"])));
    }

    fn assert_unique(group: &str, lists: &[&Vec<String>]) {
        let mut seen = HashSet::new();
        for key in lists.iter().flat_map(|l| l.iter()) {
            assert!(seen.insert(key.clone()), "{group}: {key} bound twice");
        }
    }

    #[test]
    fn default_bindings_do_not_collide_within_a_screen() {
        let s = Shortcuts::default();
        let t = &s.templates;
        assert_unique(
            "templates",
            &[
                &t.quit, &t.settings, &t.creations, &t.search, &t.refresh, &t.load_more, &t.enter,
                &t.down, &t.up, &t.sign_out,
            ],
        );
        let c = &s.creations;
        assert_unique(
            "creations",
            &[&c.back, &c.refresh, &c.load_more, &c.enter, &c.down, &c.up],
        );
        let d = &s.template_detail;
        assert_unique("template_detail", &[&d.back, &d.photo, &d.generate]);
        let st = &s.settings;
        assert_unique(
            "settings",
            &[&st.cancel, &st.save, &st.backend_url, &st.anon_key, &st.client_secret],
        );
    }

    #[test]
    fn missing_file_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shortcut.toml");
        let s = Shortcuts::load_or_default(&path).unwrap();
        assert!(path.exists());
        let again = Shortcuts::load_or_default(&path).unwrap();
        assert_eq!(again.templates.search, s.templates.search);
    }
}
