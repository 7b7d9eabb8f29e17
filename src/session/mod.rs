//! 認証セッションモジュール
//!
//! ブラウザでチャレンジを通過し、ダウンロードに使うCookieを管理する

mod browser;
mod credentials;
mod store;
mod types;

pub use browser::{select_session_token, AuthState, BrowserSession};
pub use credentials::{StaticCredentialProvider, StdinCredentialProvider};
pub use store::SessionStore;
pub use types::{
    find_cookie, PersistedSessionRecord, Session, StoredCookie, CLEARANCE_COOKIE, SESSION_COOKIE,
};
