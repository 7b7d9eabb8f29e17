use thiserror::Error;

#[derive(Error, Debug)]
pub enum MirrorError {
    #[error("ブラウザ初期化エラー: {0}")]
    BrowserInit(String),

    #[error("ナビゲーションエラー: {0}")]
    Navigation(String),

    #[error("JavaScript実行エラー: {0}")]
    JavaScript(String),

    #[error("認証エラー: {0}")]
    Auth(String),

    #[error("セッショントークン取得エラー: {0}")]
    Credential(String),

    #[error("不完全なセッション: {0}")]
    InvalidSession(String),

    #[error("保存エラー: {0}")]
    Storage(String),

    #[error("オブジェクトストレージエラー: {0}")]
    ObjectStore(String),

    #[error("カタログAPIエラー: {0}")]
    Catalog(String),

    #[error("設定エラー: {0}")]
    Config(String),

    #[error("ファイル操作エラー: {0}")]
    FileIO(#[from] std::io::Error),

    #[error("HTTPエラー: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSONエラー: {0}")]
    Json(#[from] serde_json::Error),

    #[error("データベースエラー: {0}")]
    Database(#[from] sqlx::Error),
}

impl MirrorError {
    /// 再試行で回復しうるエラーか
    pub fn is_retryable(&self) -> bool {
        match self {
            MirrorError::Auth(_) | MirrorError::Navigation(_) | MirrorError::BrowserInit(_) => {
                true
            }
            MirrorError::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }
}
