use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::config::DEFAULT_API_URL;
use crate::error::MirrorError;
use crate::traits::CatalogApi;

use super::types::{Mapset, MapsetResponse, RankedResponse};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Quaver REST API クライアント
#[derive(Debug, Clone)]
pub struct QuaverApi {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl QuaverApi {
    pub fn new(base_url: impl Into<String>) -> Result<Self, MirrorError> {
        Self::with_timeout(base_url, REQUEST_TIMEOUT)
    }

    /// リクエストごとのタイムアウトを指定して作成
    pub fn with_timeout(
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, MirrorError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, MirrorError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("GET {}", url);

        let resp = self.http.get(&url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(MirrorError::Catalog(format!("{} が HTTP {} を返しました", url, status)));
        }

        let text = resp.text().await?;
        serde_json::from_str(&text).map_err(|e| {
            let head: String = text.chars().take(200).collect();
            MirrorError::Catalog(format!(
                "レスポンス解析失敗 ({}): {}. Response: {}",
                url, e, head
            ))
        })
    }
}

impl Default for QuaverApi {
    fn default() -> Self {
        // ビルド失敗はTLSバックエンドの初期化失敗のみ（Client::default も同様に失敗する）
        Self::with_timeout(DEFAULT_API_URL, REQUEST_TIMEOUT).unwrap_or_else(|_| Self {
            http: reqwest::Client::default(),
            base_url: DEFAULT_API_URL.to_string(),
            timeout: REQUEST_TIMEOUT,
        })
    }
}

#[async_trait]
impl CatalogApi for QuaverApi {
    async fn ranked_mapset_ids(&self) -> Result<Vec<i64>, MirrorError> {
        let resp: RankedResponse = self.get_json("/v1/mapsets/ranked").await?;
        Ok(resp.mapsets)
    }

    async fn mapset(&self, id: i64) -> Result<Mapset, MirrorError> {
        let resp: MapsetResponse = self.get_json(&format!("/v1/mapsets/{}", id)).await?;
        Ok(resp.mapset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash() {
        let api = QuaverApi::new("http://localhost:9000/").unwrap();
        assert_eq!(api.base_url, "http://localhost:9000");
        assert_eq!(QuaverApi::default().base_url, DEFAULT_API_URL);
    }

    #[test]
    fn test_default_uses_request_timeout() {
        assert_eq!(QuaverApi::default().timeout(), REQUEST_TIMEOUT);
        assert_eq!(
            QuaverApi::new(DEFAULT_API_URL).unwrap().timeout(),
            QuaverApi::default().timeout()
        );
    }
}
