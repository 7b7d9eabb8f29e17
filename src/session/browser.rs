//! ブラウザ経由のセッション取得
//!
//! Cloudflareのチャレンジを実ブラウザで通過し、`cf_clearance` と
//! `quaver_session` とUser-Agentを取り出す。

use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{Cookie, CookieParam, TimeSinceEpoch};
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::MirrorConfig;
use crate::error::MirrorError;
use crate::traits::{CredentialProvider, SessionProvider};

use super::store::SessionStore;
use super::types::{
    find_cookie, PersistedSessionRecord, Session, StoredCookie, CLEARANCE_COOKIE, SESSION_COOKIE,
};

/// チャレンジ通過後のトップページにだけ現れる要素
const HOMEPAGE_MARKER: &str = "#homepage";
const MARKER_POLL_INTERVAL_MS: u64 = 500;

/// 認証状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Uninitialized,
    Authenticating,
    Ready,
}

/// ブラウザを1つだけ保持し、セッションを取得・更新する
pub struct BrowserSession {
    config: MirrorConfig,
    store: SessionStore,
    credentials: Box<dyn CredentialProvider>,
    browser: Option<Browser>,
    page: Option<Page>,
    handler_task: Option<JoinHandle<()>>,
    state: AuthState,
    session: Option<Session>,
}

impl BrowserSession {
    pub fn new(
        config: MirrorConfig,
        store: SessionStore,
        credentials: Box<dyn CredentialProvider>,
    ) -> Self {
        Self {
            config,
            store,
            credentials,
            browser: None,
            page: None,
            handler_task: None,
            state: AuthState::Uninitialized,
            session: None,
        }
    }

    pub fn state(&self) -> AuthState {
        self.state
    }

    /// ブラウザを起動（初回のみ）。保存済みCookieはナビゲーション前に注入する
    async fn initialize(&mut self) -> Result<Page, MirrorError> {
        if let Some(page) = &self.page {
            return Ok(page.clone());
        }

        info!("Launching browser...");

        let unique_id = format!(
            "{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos()
        );
        let user_data_dir = std::env::temp_dir().join(format!("quaver-mirror-{}", unique_id));

        let mut builder = BrowserConfig::builder().user_data_dir(&user_data_dir);

        if let Some(chrome_path) = &self.config.chrome_path {
            builder = builder.chrome_executable(chrome_path);
        }

        if !self.config.headless {
            builder = builder.with_head();
        }

        builder = builder
            .no_sandbox()
            .window_size(1280, 800)
            .request_timeout(self.config.load_timeout)
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-dev-shm-usage");

        if self.config.debug {
            builder = builder.arg("--enable-logging=stderr").arg("--v=1");
        }

        let browser_config = builder
            .build()
            .map_err(|e| MirrorError::BrowserInit(format!("ブラウザ設定エラー: {}", e)))?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| MirrorError::BrowserInit(e.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                debug!("Browser event: {:?}", event);
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| MirrorError::BrowserInit(e.to_string()))?;

        if let Some(record) = self.store.load() {
            let params: Vec<CookieParam> = record
                .cookies
                .iter()
                .filter_map(|cookie| match cookie_param(cookie) {
                    Ok(param) => Some(param),
                    Err(e) => {
                        debug!("Skipping stored cookie {}: {}", cookie.name, e);
                        None
                    }
                })
                .collect();

            let count = params.len();
            if count > 0 {
                match page.set_cookies(params).await {
                    Ok(_) => info!("Restored {} cookies from stored session", count),
                    Err(e) => warn!("Failed to restore stored cookies: {}", e),
                }
            }
        }

        self.browser = Some(browser);
        self.page = Some(page.clone());
        self.handler_task = Some(handler_task);

        info!("Browser launched");
        Ok(page)
    }

    /// トップページを開き、チャレンジ通過の目印が出るまで待つ
    async fn wait_for_homepage(&self, page: &Page) -> Result<(), MirrorError> {
        info!("Navigating to {}...", self.config.site_url);

        let navigation = poll_homepage(page, &self.config.site_url);
        match tokio::time::timeout(self.config.load_timeout, navigation).await {
            Ok(result) => result,
            Err(_) => {
                self.debug_screenshot(page).await;
                Err(MirrorError::Auth(format!(
                    "{}秒以内にトップページ ({}) が表示されませんでした",
                    self.config.load_timeout.as_secs(),
                    HOMEPAGE_MARKER
                )))
            }
        }
    }

    async fn read_cookies(&self, page: &Page) -> Result<Vec<StoredCookie>, MirrorError> {
        let cookies = page
            .get_cookies()
            .await
            .map_err(|e| MirrorError::Navigation(format!("Cookie取得失敗: {}", e)))?;
        Ok(cookies.iter().map(stored_cookie).collect())
    }

    async fn read_user_agent(&self, page: &Page) -> Result<String, MirrorError> {
        page.evaluate("navigator.userAgent")
            .await
            .map_err(|e| MirrorError::JavaScript(e.to_string()))?
            .into_value::<String>()
            .map_err(|e| MirrorError::JavaScript(format!("User-Agent取得失敗: {}", e)))
    }

    async fn debug_screenshot(&self, page: &Page) {
        if !self.config.debug {
            return;
        }
        if let Ok(screenshot) = page
            .screenshot(ScreenshotParams::builder().full_page(true).build())
            .await
        {
            use base64::Engine;
            let encoded = base64::engine::general_purpose::STANDARD.encode(&screenshot);
            debug!("Page screenshot: data:image/png;base64,{}", encoded);
        }
    }

    async fn authenticate(&mut self, reuse_existing: bool) -> Result<Session, MirrorError> {
        let page = self.initialize().await?;
        self.wait_for_homepage(&page).await?;

        let cookies = self.read_cookies(&page).await?;
        let user_agent = self.read_user_agent(&page).await?;

        let Some(clearance) = find_cookie(&cookies, CLEARANCE_COOKIE).map(str::to_string) else {
            self.debug_screenshot(&page).await;
            return Err(MirrorError::Auth(format!(
                "{} Cookieが見つかりません",
                CLEARANCE_COOKIE
            )));
        };
        debug!("Clearance cookie acquired: {}", mask(&clearance));

        if let Some(token) = select_session_token(&cookies, reuse_existing) {
            info!("Reusing stored session token {}", mask(token));
            return Session::new(clearance, token, user_agent, true);
        }

        if reuse_existing {
            info!("No stored {} cookie, asking for a new one", SESSION_COOKIE);
        }

        let token = self.credentials.obtain_token().await?;

        let param = CookieParam::builder()
            .name(SESSION_COOKIE)
            .value(token.clone())
            .domain(self.config.cookie_domain())
            .path("/")
            .http_only(true)
            .build()
            .map_err(|e| MirrorError::Auth(format!("Cookie生成失敗: {}", e)))?;

        page.set_cookie(param)
            .await
            .map_err(|e| MirrorError::Navigation(format!("Cookie注入失敗: {}", e)))?;
        info!("Injected new session token {}", mask(&token));

        let persisted = match self.read_cookies(&page).await {
            Ok(jar) => persist_cookies(&self.store, jar),
            Err(e) => {
                warn!("Session is usable but cookies could not be read back: {}", e);
                false
            }
        };

        Session::new(clearance, token, user_agent, persisted)
    }
}

#[async_trait]
impl SessionProvider for BrowserSession {
    async fn acquire(&mut self, reuse_existing: bool) -> Result<Session, MirrorError> {
        info!("Acquiring session (reuse_existing={})", reuse_existing);
        self.state = AuthState::Authenticating;
        self.session = None;

        let session = self.authenticate(reuse_existing).await?;

        self.state = AuthState::Ready;
        self.session = Some(session.clone());
        info!("Session ready (persisted={})", session.persisted());
        Ok(session)
    }

    fn current(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    async fn close(&mut self) -> Result<(), MirrorError> {
        info!("Closing browser...");

        self.page = None;
        if let Some(mut browser) = self.browser.take() {
            if let Err(e) = browser.close().await {
                debug!("Failed to close browser: {}", e);
            }
            if let Err(e) = browser.wait().await {
                debug!("Failed to wait for browser exit: {}", e);
            }
        }
        if let Some(task) = self.handler_task.take() {
            task.abort();
        }

        self.session = None;
        self.state = AuthState::Uninitialized;
        Ok(())
    }
}

async fn poll_homepage(page: &Page, site_url: &str) -> Result<(), MirrorError> {
    page.goto(site_url)
        .await
        .map_err(|e| MirrorError::Navigation(e.to_string()))?;

    let script = format!("document.querySelector('{}') !== null", HOMEPAGE_MARKER);
    let mut attempts = 0u32;
    loop {
        let found = page
            .evaluate(script.as_str())
            .await
            .map_err(|e| MirrorError::JavaScript(e.to_string()))?
            .into_value::<bool>()
            .unwrap_or(false);

        if found {
            debug!("Homepage marker found after {} checks", attempts + 1);
            return Ok(());
        }

        attempts += 1;
        if attempts % 10 == 0 {
            info!("Still waiting for challenge to clear... ({} checks)", attempts);
        }
        sleep(Duration::from_millis(MARKER_POLL_INTERVAL_MS)).await;
    }
}

/// Cookie一式を保存する。失敗してもセッションは使えるので false を返すだけ
fn persist_cookies(store: &SessionStore, cookies: Vec<StoredCookie>) -> bool {
    match store.save(&PersistedSessionRecord::new(cookies)) {
        Ok(()) => true,
        Err(e) => {
            warn!("Session is usable but was not persisted: {}", e);
            false
        }
    }
}

/// 再利用可能なセッショントークンを選ぶ（`reuse_existing` でない場合は常に None）
pub fn select_session_token(cookies: &[StoredCookie], reuse_existing: bool) -> Option<&str> {
    if !reuse_existing {
        return None;
    }
    find_cookie(cookies, SESSION_COOKIE)
}

fn stored_cookie(cookie: &Cookie) -> StoredCookie {
    StoredCookie {
        name: cookie.name.clone(),
        value: cookie.value.clone(),
        domain: cookie.domain.clone(),
        path: cookie.path.clone(),
        expires: (!cookie.session && cookie.expires > 0.0).then_some(cookie.expires),
        http_only: cookie.http_only,
        secure: cookie.secure,
    }
}

fn cookie_param(cookie: &StoredCookie) -> Result<CookieParam, String> {
    let mut builder = CookieParam::builder()
        .name(cookie.name.clone())
        .value(cookie.value.clone())
        .domain(cookie.domain.clone())
        .path(cookie.path.clone())
        .http_only(cookie.http_only)
        .secure(cookie.secure);

    if let Some(expires) = cookie.expires {
        builder = builder.expires(TimeSinceEpoch::new(expires));
    }

    builder.build()
}

/// ログ用に先頭だけ残す
fn mask(token: &str) -> String {
    let head: String = token.chars().take(4).collect();
    format!("{}…({} chars)", head, token.chars().count())
}
