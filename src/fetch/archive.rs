//! 認証付きアーカイブダウンロード

use std::time::Duration;

use reqwest::header::{CONTENT_TYPE, COOKIE, USER_AGENT};
use reqwest::redirect::Policy;
use tracing::{debug, info, warn};

use crate::error::MirrorError;
use crate::session::Session;
use crate::traits::ArchiveSink;

/// 成功時のContent-Type
pub const BINARY_STREAM: &str = "application/octet-stream";
pub const MAX_REDIRECTS: usize = 5;
pub const ARCHIVE_EXTENSION: &str = "qp";

/// ダウンロード対象
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTarget {
    id: i64,
    destination: String,
}

impl FetchTarget {
    pub fn new(id: i64) -> Self {
        Self {
            id,
            destination: format!("{}.{}", id, ARCHIVE_EXTENSION),
        }
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    /// 保存先のキー（`<id>.qp`）
    pub fn destination(&self) -> &str {
        &self.destination
    }
}

/// 1回のダウンロード結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Success(Vec<u8>),
    AlreadyPresent,
    /// HTMLなどが返った（セッション切れ・拒否）
    AuthFailure,
    TransientFailure(String),
}

/// Content-Typeがバイナリストリームか（パラメータ・大文字小文字は無視）
pub fn is_binary_stream(content_type: Option<&str>) -> bool {
    content_type
        .and_then(|value| value.split(';').next())
        .map(|essence| essence.trim().eq_ignore_ascii_case(BINARY_STREAM))
        .unwrap_or(false)
}

pub struct ArchiveFetcher {
    http: reqwest::Client,
    site_url: String,
    redownload: bool,
}

impl ArchiveFetcher {
    pub fn new(site_url: impl Into<String>) -> Result<Self, MirrorError> {
        let http = reqwest::Client::builder()
            .redirect(Policy::limited(MAX_REDIRECTS))
            .connect_timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            site_url: site_url.into().trim_end_matches('/').to_string(),
            redownload: false,
        })
    }

    /// 既存ファイルがあっても再取得する
    pub fn with_redownload(mut self, redownload: bool) -> Self {
        self.redownload = redownload;
        self
    }

    pub fn download_url(&self, id: i64) -> String {
        format!("{}/download/mapset/{}", self.site_url, id)
    }

    /// 保存先に既にあるためスキップできるか
    pub async fn already_present(&self, target: &FetchTarget, sink: &dyn ArchiveSink) -> bool {
        !self.redownload && sink.contains(target.destination()).await
    }

    /// ダウンロードして保存先に書き込む
    ///
    /// 保存先への書き込み失敗だけが `Err` になる。
    pub async fn fetch(
        &self,
        target: &FetchTarget,
        session: &Session,
        sink: &mut dyn ArchiveSink,
    ) -> Result<FetchOutcome, MirrorError> {
        if self.already_present(target, sink).await {
            debug!("{} already present, skipping", target.destination());
            return Ok(FetchOutcome::AlreadyPresent);
        }

        let url = self.download_url(target.id());
        let resp = match self
            .http
            .get(&url)
            .header(COOKIE, session.cookie_header())
            .header(USER_AGENT, session.user_agent())
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                warn!("Request for mapset {} failed: {}", target.id(), e);
                return Ok(FetchOutcome::TransientFailure(e.to_string()));
            }
        };

        let status = resp.status();
        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        if !is_binary_stream(content_type.as_deref()) {
            warn!(
                "Mapset {} returned {} with content-type {:?}, treating as auth failure",
                target.id(),
                status,
                content_type
            );
            return Ok(FetchOutcome::AuthFailure);
        }

        let bytes = match resp.bytes().await {
            Ok(bytes) => bytes.to_vec(),
            Err(e) => {
                warn!("Reading body of mapset {} failed: {}", target.id(), e);
                return Ok(FetchOutcome::TransientFailure(e.to_string()));
            }
        };

        sink.store(target.destination(), &bytes).await?;
        info!("Stored {} ({} bytes)", target.destination(), bytes.len());

        Ok(FetchOutcome::Success(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_target() {
        let target = FetchTarget::new(42);
        assert_eq!(target.id(), 42);
        assert_eq!(target.destination(), "42.qp");
    }

    #[test]
    fn test_is_binary_stream() {
        assert!(is_binary_stream(Some("application/octet-stream")));
        assert!(is_binary_stream(Some("Application/Octet-Stream")));
        assert!(is_binary_stream(Some("application/octet-stream; charset=binary")));
        assert!(!is_binary_stream(Some("text/html; charset=UTF-8")));
        assert!(!is_binary_stream(Some("application/json")));
        assert!(!is_binary_stream(Some("")));
        assert!(!is_binary_stream(None));
    }

    #[test]
    fn test_download_url() {
        let fetcher = ArchiveFetcher::new("https://quavergame.com/").unwrap();
        assert_eq!(
            fetcher.download_url(123),
            "https://quavergame.com/download/mapset/123"
        );
        assert!(!fetcher.redownload);
        assert!(fetcher.with_redownload(true).redownload);
    }
}
