//! 同期処理（カタログ → DB → アーカイブ）

use std::collections::HashSet;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::config::MirrorConfig;
use crate::error::MirrorError;
use crate::fetch::{ArchiveFetcher, FetchOutcome, FetchTarget};
use crate::traits::{ArchiveSink, CatalogApi, MetadataStore, SessionProvider};

/// 同期の挙動設定
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// DBに存在するMapsetも再取得する
    pub force_sync: bool,
    /// 認証失敗1件あたりのセッション再取得回数
    pub max_auth_retries: u32,
    pub max_transient_retries: u32,
    pub initial_backoff: Duration,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            force_sync: false,
            max_auth_retries: 1,
            max_transient_retries: 3,
            initial_backoff: Duration::from_millis(1000),
        }
    }
}

impl From<&MirrorConfig> for SyncOptions {
    fn from(config: &MirrorConfig) -> Self {
        Self {
            force_sync: config.force_sync,
            max_auth_retries: config.max_auth_retries,
            max_transient_retries: config.max_transient_retries,
            initial_backoff: config.initial_backoff,
        }
    }
}

/// 同期結果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub total: usize,
    /// DBへ書き込んだMapset数
    pub synced: usize,
    pub sync_failed: usize,
    pub downloaded: usize,
    pub skipped: usize,
    /// ダウンロードできなかったMapset ID
    pub failed: Vec<i64>,
}

enum TargetResult {
    Downloaded,
    Skipped,
    Failed,
}

pub struct SyncOrchestrator {
    catalog: Box<dyn CatalogApi>,
    metadata: Option<Box<dyn MetadataStore>>,
    auth: Box<dyn SessionProvider>,
    fetcher: ArchiveFetcher,
    sink: Box<dyn ArchiveSink>,
    options: SyncOptions,
    /// 保存済みの quaver_session が拒否されたら false（次の取得はプロンプトから）
    reuse_stored_token: bool,
}

impl SyncOrchestrator {
    pub fn new(
        catalog: Box<dyn CatalogApi>,
        auth: Box<dyn SessionProvider>,
        fetcher: ArchiveFetcher,
        sink: Box<dyn ArchiveSink>,
    ) -> Self {
        Self {
            catalog,
            metadata: None,
            auth,
            fetcher,
            sink,
            options: SyncOptions::default(),
            reuse_stored_token: true,
        }
    }

    pub fn with_metadata(mut self, metadata: Box<dyn MetadataStore>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_options(mut self, options: SyncOptions) -> Self {
        self.options = options;
        self
    }

    /// 全件を試行してから結果を返す。個別の失敗はレポートに記録される
    pub async fn run(&mut self) -> Result<SyncReport, MirrorError> {
        let ids = self.catalog.ranked_mapset_ids().await?;
        info!("{} ranked mapsets in catalog", ids.len());

        let mut report = SyncReport {
            total: ids.len(),
            ..Default::default()
        };

        self.sink.index().await?;
        self.sync_metadata(&ids, &mut report).await;

        self.download_all(&ids, &mut report).await;

        if let Err(e) = self.auth.close().await {
            warn!("Failed to close session: {}", e);
        }

        info!(
            "Everything is up-to-date: {} downloaded, {} skipped, {} failed",
            report.downloaded,
            report.skipped,
            report.failed.len()
        );
        Ok(report)
    }

    /// DBにないMapsetのメタデータを取得して書き込む
    pub async fn sync_metadata(&self, ids: &[i64], report: &mut SyncReport) {
        let Some(metadata) = &self.metadata else {
            info!("No metadata store configured, skipping database sync");
            return;
        };

        info!("Syncing database...");

        let existing = match metadata.existing_mapset_ids().await {
            Ok(existing) => existing,
            Err(e) => {
                error!("Unable to read existing mapsets, skipping database sync: {}", e);
                return;
            }
        };

        let pending = ids_to_sync(ids, &existing, self.options.force_sync);
        info!(
            "{} of {} mapsets need a database sync",
            pending.len(),
            ids.len()
        );

        let count = pending.len();
        for (i, &id) in pending.iter().enumerate() {
            info!("Syncing mapset {} to database... ({}/{})", id, i + 1, count);
            let result = match self.catalog.mapset(id).await {
                Ok(mapset) => metadata.upsert_mapset(&mapset).await,
                Err(e) => Err(e),
            };

            match result {
                Ok(()) => report.synced += 1,
                Err(e) => {
                    warn!("Unable to sync mapset {}: {}", id, e);
                    report.sync_failed += 1;
                }
            }
        }
    }

    /// セッション取得の失敗もその1件の失敗として扱い、全件を試行する
    async fn download_all(&mut self, ids: &[i64], report: &mut SyncReport) {
        info!("Downloading mapsets...");

        let total = ids.len();
        for (i, &id) in ids.iter().enumerate() {
            let target = FetchTarget::new(id);

            if self
                .fetcher
                .already_present(&target, self.sink.as_ref())
                .await
            {
                report.skipped += 1;
                continue;
            }

            info!("Downloading mapset {}... ({}/{})", id, i + 1, total);
            if let Err(e) = self.ensure_session().await {
                error!("No session for mapset {}: {}", id, e);
                report.failed.push(id);
                continue;
            }

            match self.download_one(&target).await {
                TargetResult::Downloaded => report.downloaded += 1,
                TargetResult::Skipped => report.skipped += 1,
                TargetResult::Failed => report.failed.push(id),
            }
        }
    }

    /// 有効なセッションがなければ取得する
    ///
    /// 保存済みトークンは、更新に失敗するまでは再利用を優先する。
    async fn ensure_session(&mut self) -> Result<(), MirrorError> {
        if self.auth.current().is_some() {
            return Ok(());
        }

        let attempts = self.options.max_auth_retries + 1;
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.auth.acquire(self.reuse_stored_token).await {
                Ok(_) => {
                    self.reuse_stored_token = true;
                    return Ok(());
                }
                Err(e) if e.is_retryable() && attempt < attempts => {
                    warn!(
                        "Session acquisition failed (attempt {}/{}): {}",
                        attempt, attempts, e
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// 1件分のダウンロード。認証失敗・一時的な失敗はそれぞれ上限回数まで再試行する
    async fn download_one(&mut self, target: &FetchTarget) -> TargetResult {
        let mut auth_retries = 0u32;
        let mut transient_retries = 0u32;

        loop {
            let outcome = {
                let Some(session) = self.auth.current() else {
                    warn!("No usable session for mapset {}", target.id());
                    return TargetResult::Failed;
                };
                self.fetcher
                    .fetch(target, session, self.sink.as_mut())
                    .await
            };

            match outcome {
                Ok(FetchOutcome::Success(_)) => return TargetResult::Downloaded,
                Ok(FetchOutcome::AlreadyPresent) => return TargetResult::Skipped,
                Ok(FetchOutcome::AuthFailure) => {
                    if auth_retries >= self.options.max_auth_retries {
                        warn!(
                            "Giving up on mapset {} after {} session refreshes",
                            target.id(),
                            auth_retries
                        );
                        return TargetResult::Failed;
                    }
                    auth_retries += 1;

                    info!("Failed to download. Refetching cookies...");
                    if let Err(e) = self.auth.refresh().await {
                        warn!("Session refresh failed: {}", e);
                        self.reuse_stored_token = false;
                        return TargetResult::Failed;
                    }
                    info!("Trying to download mapset {} again...", target.id());
                }
                Ok(FetchOutcome::TransientFailure(reason)) => {
                    if transient_retries >= self.options.max_transient_retries {
                        warn!(
                            "Giving up on mapset {} after {} retries: {}",
                            target.id(),
                            transient_retries,
                            reason
                        );
                        return TargetResult::Failed;
                    }

                    let backoff = self.options.initial_backoff
                        * 2u32.saturating_pow(transient_retries);
                    transient_retries += 1;
                    warn!(
                        "Download of mapset {} failed, retrying in {:?}: {}",
                        target.id(),
                        backoff,
                        reason
                    );
                    sleep(backoff).await;
                }
                Err(e) => {
                    error!("Unable to store {}: {}", target.destination(), e);
                    return TargetResult::Failed;
                }
            }
        }
    }
}

/// 同期対象のID（カタログ順を保つ）
fn ids_to_sync(ids: &[i64], existing: &HashSet<i64>, force_sync: bool) -> Vec<i64> {
    ids.iter()
        .copied()
        .filter(|id| force_sync || !existing.contains(id))
        .collect()
}
