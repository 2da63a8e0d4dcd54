//! 画面遷移用のUI状態と画面種別。

/// TUIで現在表示中の画面。
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Screen {
    /// 未サインイン時のサインイン画面。
    SignIn,
    /// テンプレート一覧（ホーム）。
    Templates,
    /// 選択テンプレートの詳細と写真選択。
    TemplateDetail,
    /// 生成ジョブ一覧（プロフィール付き）。
    Creations,
    /// 選択ジョブの詳細。
    JobDetail,
    /// 設定編集画面。
    Settings,
    /// 初期設定ウィザード画面。
    InitialSetup,
}

impl Screen {
    /// ジョブのポーリングが必要な画面か。
    pub fn shows_jobs(&self) -> bool {
        matches!(self, Screen::Creations | Screen::JobDetail)
    }

    /// サインインが必要な画面か。
    pub fn requires_session(&self) -> bool {
        !matches!(
            self,
            Screen::SignIn | Screen::Settings | Screen::InitialSetup
        )
    }
}

/// 描画側と共有するUI状態。
#[derive(Clone, Debug)]
pub struct UiState {
    /// 現在の画面。
    pub screen: Screen,
    /// テンプレート一覧の選択行。
    pub template_selected: usize,
    /// ジョブ一覧の選択行。
    pub job_selected: usize,
    /// 詳細画面で開いているテンプレートID。
    pub open_template: Option<String>,
    /// 詳細画面で開いているジョブID。
    pub open_job: Option<String>,
    /// 右側パネルに表示するログ。
    pub log: Vec<String>,
    /// 画面下部のステータス文言。
    pub status: String,
    /// エラーメッセージ（強調表示用）。
    pub error: Option<String>,
    /// ジョブ作成を投げて結果待ちの間はtrue。
    pub creating_job: bool,
}

impl UiState {
    pub fn new(screen: Screen) -> Self {
        Self {
            screen,
            template_selected: 0,
            job_selected: 0,
            open_template: None,
            open_job: None,
            log: vec![],
            status: "Ready".into(),
            error: None,
            creating_job: false,
        }
    }
}
