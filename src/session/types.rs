//! セッション関連の型定義

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MirrorError;

/// Cloudflareのチャレンジ通過Cookie
pub const CLEARANCE_COOKIE: &str = "cf_clearance";
/// サイトのログインセッションCookie
pub const SESSION_COOKIE: &str = "quaver_session";

/// 認証済みセッション
///
/// 3つの値がすべて揃った状態でしか構築できない。更新は丸ごと置き換える。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    challenge_token: String,
    session_token: String,
    user_agent: String,
    persisted: bool,
}

impl Session {
    pub fn new(
        challenge_token: impl Into<String>,
        session_token: impl Into<String>,
        user_agent: impl Into<String>,
        persisted: bool,
    ) -> Result<Self, MirrorError> {
        let session = Self {
            challenge_token: challenge_token.into(),
            session_token: session_token.into(),
            user_agent: user_agent.into(),
            persisted,
        };

        if session.challenge_token.is_empty() {
            return Err(MirrorError::InvalidSession(format!(
                "{} が空です",
                CLEARANCE_COOKIE
            )));
        }
        if session.session_token.is_empty() {
            return Err(MirrorError::InvalidSession(format!(
                "{} が空です",
                SESSION_COOKIE
            )));
        }
        if session.user_agent.is_empty() {
            return Err(MirrorError::InvalidSession("User-Agent が空です".into()));
        }

        Ok(session)
    }

    pub fn challenge_token(&self) -> &str {
        &self.challenge_token
    }

    pub fn session_token(&self) -> &str {
        &self.session_token
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub fn persisted(&self) -> bool {
        self.persisted
    }

    /// ダウンロードリクエスト用のCookieヘッダ
    pub fn cookie_header(&self) -> String {
        format!(
            "{}={}; {}={}",
            CLEARANCE_COOKIE, self.challenge_token, SESSION_COOKIE, self.session_token
        )
    }
}

/// 永続化されるCookie
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    /// UNIX秒。セッションCookieは None
    #[serde(default)]
    pub expires: Option<f64>,
    #[serde(default)]
    pub http_only: bool,
    #[serde(default)]
    pub secure: bool,
}

/// セッションファイルの中身（Cookie jar）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedSessionRecord {
    pub cookies: Vec<StoredCookie>,
    pub saved_at: DateTime<Utc>,
}

impl PersistedSessionRecord {
    pub fn new(cookies: Vec<StoredCookie>) -> Self {
        Self {
            cookies,
            saved_at: Utc::now(),
        }
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        find_cookie(&self.cookies, name)
    }
}

/// 値が空でない最初のCookieを探す
pub fn find_cookie<'a>(cookies: &'a [StoredCookie], name: &str) -> Option<&'a str> {
    cookies
        .iter()
        .find(|c| c.name == name && !c.value.is_empty())
        .map(|c| c.value.as_str())
}
