//! 初期設定ウィザードのステート管理。

/// ウィザードの各ステップ
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WizardStep {
    /// ウェルカムメッセージ
    Welcome,
    /// バックエンドのプロジェクトURL
    BackendUrl,
    /// 公開anonキー
    AnonKey,
    /// Google OAuthクライアントシークレットのパス
    ClientSecret,
    /// 完了
    Complete,
}

/// ウィザードの状態管理
#[derive(Clone, Debug)]
pub struct WizardState {
    /// 現在のステップ
    pub current_step: WizardStep,
    /// 全ステップ数
    pub total_steps: usize,
}

impl WizardState {
    pub fn new() -> Self {
        Self {
            current_step: WizardStep::Welcome,
            total_steps: 5,
        }
    }

    /// 次のステップへ進む
    pub fn next_step(&mut self) {
        self.current_step = match self.current_step {
            WizardStep::Welcome => WizardStep::BackendUrl,
            WizardStep::BackendUrl => WizardStep::AnonKey,
            WizardStep::AnonKey => WizardStep::ClientSecret,
            WizardStep::ClientSecret => WizardStep::Complete,
            WizardStep::Complete => WizardStep::Complete,
        };
    }

    /// 現在のステップのプロンプトメッセージを取得
    pub fn get_prompt(&self) -> String {
        match self.current_step {
            WizardStep::Welcome => {
                "delulilyへようこそ！\n\nこのウィザードでは、バックエンドへの接続設定を行います。\nEnterキーを押して開始してください。".to_string()
            }
            WizardStep::BackendUrl => {
                "プロジェクトURLの設定\n\n例: https://abcd.supabase.co\nEnterキーで入力画面を開きます。".to_string()
            }
            WizardStep::AnonKey => {
                "anonキーの設定\n\nプロジェクトの公開anonキーを入力してください。\nEnterキーで入力画面を開きます。".to_string()
            }
            WizardStep::ClientSecret => {
                "Googleサインインの設定\n\nデスクトップアプリ用OAuthクライアントのJSONファイルのパスを入力してください。\nEnterキーで入力画面を開きます。".to_string()
            }
            WizardStep::Complete => {
                "設定完了！\n\nEnterキーを押してサインイン画面に移動します。".to_string()
            }
        }
    }

    /// 現在のステップ番号を取得（1始まり）
    pub fn get_step_number(&self) -> usize {
        match self.current_step {
            WizardStep::Welcome => 1,
            WizardStep::BackendUrl => 2,
            WizardStep::AnonKey => 3,
            WizardStep::ClientSecret => 4,
            WizardStep::Complete => 5,
        }
    }
}

impl Default for WizardState {
    fn default() -> Self {
        Self::new()
    }
}
