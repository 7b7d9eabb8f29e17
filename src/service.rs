use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tower::Service;
use tracing::{info, warn};

use crate::catalog::QuaverApi;
use crate::config::MirrorConfig;
use crate::error::MirrorError;
use crate::fetch::{ArchiveFetcher, LocalDirSink, ObjectStoreSink};
use crate::session::{BrowserSession, SessionStore, StaticCredentialProvider, StdinCredentialProvider};
use crate::storage::{MySqlStore, S3ObjectStore};
use crate::sync::{SyncOptions, SyncOrchestrator, SyncReport};
use crate::traits::{ArchiveSink, CredentialProvider};

/// 同期リクエスト（実行ごとのフラグ）
#[derive(Debug, Clone)]
pub struct SyncRequest {
    pub force_sync: bool,
    pub redownload: bool,
    pub upload: bool,
}

impl Default for SyncRequest {
    fn default() -> Self {
        Self {
            force_sync: false,
            redownload: false,
            upload: true,
        }
    }
}

impl SyncRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_force_sync(mut self, force_sync: bool) -> Self {
        self.force_sync = force_sync;
        self
    }

    pub fn with_redownload(mut self, redownload: bool) -> Self {
        self.redownload = redownload;
        self
    }

    pub fn with_upload(mut self, upload: bool) -> Self {
        self.upload = upload;
        self
    }

    fn apply(&self, mut config: MirrorConfig) -> MirrorConfig {
        config.force_sync = self.force_sync;
        config.redownload = self.redownload;
        config.upload = self.upload;
        config
    }
}

/// tower::Serviceを実装した同期サービス
#[derive(Debug, Clone, Default)]
pub struct MirrorService {
    config: MirrorConfig,
}

impl MirrorService {
    pub fn new(config: MirrorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MirrorConfig {
        &self.config
    }
}

/// 設定から各コンポーネントを組み立てる
async fn build_orchestrator(config: &MirrorConfig) -> Result<SyncOrchestrator, MirrorError> {
    let catalog = QuaverApi::new(&config.api_url)?;
    let fetcher = ArchiveFetcher::new(&config.site_url)?.with_redownload(config.redownload);

    let sink: Box<dyn ArchiveSink> = if config.upload {
        let bucket = config.bucket.clone().ok_or_else(|| {
            MirrorError::Config("アップロードにはバケット名 (BUCKET_NAME) が必要です".into())
        })?;
        info!("Archives go to s3://{}/{}", bucket, config.key_prefix);
        let store = S3ObjectStore::connect(bucket, config.region.clone()).await;
        Box::new(ObjectStoreSink::new(store, config.key_prefix.clone()))
    } else {
        info!("Archives go to {:?}", config.download_path);
        Box::new(LocalDirSink::new(config.download_path.clone()))
    };

    let credentials: Box<dyn CredentialProvider> = match &config.session_token {
        Some(token) => Box::new(StaticCredentialProvider::new(token.clone())),
        None => Box::new(StdinCredentialProvider),
    };
    let auth = BrowserSession::new(
        config.clone(),
        SessionStore::new(config.session_path.clone()),
        credentials,
    );

    let mut orchestrator = SyncOrchestrator::new(Box::new(catalog), Box::new(auth), fetcher, sink)
        .with_options(SyncOptions::from(config));

    match &config.database {
        Some(database) => {
            let store = MySqlStore::connect(database).await?;
            orchestrator = orchestrator.with_metadata(Box::new(store));
        }
        None => warn!("No database configured, metadata will not be synced"),
    }

    Ok(orchestrator)
}

impl Service<SyncRequest> for MirrorService {
    type Response = SyncReport;
    type Error = MirrorError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: SyncRequest) -> Self::Future {
        info!(
            "Sync request received: force_sync={}, redownload={}, upload={}",
            req.force_sync, req.redownload, req.upload
        );
        let config = req.apply(self.config.clone());

        Box::pin(async move {
            let mut orchestrator = build_orchestrator(&config).await?;
            let report = orchestrator.run().await?;

            info!(
                "Sync completed: total={}, synced={}, downloaded={}, skipped={}, failed={}",
                report.total,
                report.synced,
                report.downloaded,
                report.skipped,
                report.failed.len()
            );

            Ok(report)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_request_builder() {
        let req = SyncRequest::new()
            .with_force_sync(true)
            .with_redownload(true)
            .with_upload(false);

        assert!(req.force_sync);
        assert!(req.redownload);
        assert!(!req.upload);
    }

    #[test]
    fn test_sync_request_applies_to_config() {
        let req = SyncRequest::new().with_upload(false).with_force_sync(true);
        let config = req.apply(MirrorConfig::default().with_bucket("bucket"));

        assert!(!config.upload);
        assert!(config.force_sync);
        assert!(!config.redownload);
        assert_eq!(config.bucket.as_deref(), Some("bucket"));
    }

    #[tokio::test]
    async fn test_upload_without_bucket_is_config_error() {
        let mut service = MirrorService::new(MirrorConfig::default());
        let result = service.call(SyncRequest::new().with_upload(true)).await;
        assert!(matches!(result, Err(MirrorError::Config(_))));
    }
}
