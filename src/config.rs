use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_SITE_URL: &str = "https://quavergame.com";
pub const DEFAULT_API_URL: &str = "https://api.quavergame.com";

/// MySQL接続設定
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
}

impl DatabaseConfig {
    pub fn new(
        host: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port: 3306,
            user: user.into(),
            password: password.into(),
            database: "quaver".to_string(),
        }
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }
}

#[derive(Debug, Clone)]
pub struct MirrorConfig {
    pub site_url: String,
    pub api_url: String,
    pub download_path: PathBuf,
    pub session_path: PathBuf,
    pub headless: bool,
    pub debug: bool,
    pub force_sync: bool,
    pub redownload: bool,
    pub upload: bool,
    pub bucket: Option<String>,
    pub region: String,
    pub key_prefix: String,
    pub database: Option<DatabaseConfig>,
    /// ランディングページ読み込み（チャレンジ通過）の上限
    pub load_timeout: Duration,
    pub max_auth_retries: u32,
    pub max_transient_retries: u32,
    pub initial_backoff: Duration,
    pub chrome_path: Option<PathBuf>,
    /// 指定時はプロンプトを出さずにこのトークンを使う
    pub session_token: Option<String>,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            site_url: DEFAULT_SITE_URL.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
            download_path: PathBuf::from("./download"),
            session_path: PathBuf::from("storageState.json"),
            headless: true,
            debug: false,
            force_sync: false,
            redownload: false,
            upload: true,
            bucket: None,
            region: "us-east-1".to_string(),
            key_prefix: "mapsets".to_string(),
            database: None,
            load_timeout: Duration::from_secs(60),
            max_auth_retries: 1,
            max_transient_retries: 3,
            initial_backoff: Duration::from_millis(1000),
            chrome_path: None,
            session_token: None,
        }
    }
}

impl MirrorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_download_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.download_path = path.into();
        self
    }

    pub fn with_session_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.session_path = path.into();
        self
    }

    pub fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_upload(mut self, upload: bool) -> Self {
        self.upload = upload;
        self
    }

    pub fn with_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = Some(bucket.into());
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    pub fn with_database(mut self, database: DatabaseConfig) -> Self {
        self.database = Some(database);
        self
    }

    pub fn with_load_timeout(mut self, timeout: Duration) -> Self {
        self.load_timeout = timeout;
        self
    }

    pub fn with_chrome_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.chrome_path = Some(path.into());
        self
    }

    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }

    /// セッションCookieを付与するドメイン（site_urlのホスト部）
    pub fn cookie_domain(&self) -> String {
        reqwest::Url::parse(&self.site_url)
            .ok()
            .and_then(|url| url.host_str().map(str::to_string))
            .unwrap_or_else(|| "quavergame.com".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MirrorConfig::default();
        assert_eq!(config.site_url, DEFAULT_SITE_URL);
        assert_eq!(config.key_prefix, "mapsets");
        assert_eq!(config.load_timeout, Duration::from_secs(60));
        assert_eq!(config.max_auth_retries, 1);
        assert!(config.upload);
        assert!(config.database.is_none());
    }

    #[test]
    fn test_config_builder() {
        let config = MirrorConfig::new()
            .with_headless(false)
            .with_upload(false)
            .with_download_path("/tmp/qp")
            .with_bucket("maps-bucket")
            .with_database(DatabaseConfig::new("db", "root", "secret").with_port(3307));

        assert!(!config.headless);
        assert!(!config.upload);
        assert_eq!(config.download_path, PathBuf::from("/tmp/qp"));
        assert_eq!(config.bucket.as_deref(), Some("maps-bucket"));
        let db = config.database.unwrap();
        assert_eq!(db.port, 3307);
        assert_eq!(db.database, "quaver");
    }

    #[test]
    fn test_cookie_domain() {
        assert_eq!(MirrorConfig::default().cookie_domain(), "quavergame.com");

        let mut config = MirrorConfig::default();
        config.site_url = "http://127.0.0.1:8080".to_string();
        assert_eq!(config.cookie_domain(), "127.0.0.1");
    }
}
