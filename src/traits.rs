use std::collections::HashSet;

use async_trait::async_trait;

use crate::catalog::Mapset;
use crate::error::MirrorError;
use crate::session::Session;
use crate::storage::ListPage;

/// 認証済みセッションの取得・更新
///
/// `&mut self` を要求するため、ブラウザを操作する更新処理は常に直列化される。
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// セッション取得（`reuse_existing` なら保存済みのセッションCookieを優先）
    async fn acquire(&mut self, reuse_existing: bool) -> Result<Session, MirrorError>;

    /// セッション再取得（保存済みトークンは無効とみなす）
    async fn refresh(&mut self) -> Result<Session, MirrorError> {
        self.acquire(false).await
    }

    /// 現在有効なセッション
    fn current(&self) -> Option<&Session>;

    /// リソース解放
    async fn close(&mut self) -> Result<(), MirrorError> {
        Ok(())
    }
}

/// セッショントークンの入力元
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn obtain_token(&self) -> Result<String, MirrorError>;
}

/// ランク譜面カタログ（読み取り専用API）
#[async_trait]
pub trait CatalogApi: Send + Sync {
    async fn ranked_mapset_ids(&self) -> Result<Vec<i64>, MirrorError>;

    async fn mapset(&self, id: i64) -> Result<Mapset, MirrorError>;
}

/// メタデータ保存先（主キーでの置換アップサート）
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn existing_mapset_ids(&self) -> Result<HashSet<i64>, MirrorError>;

    /// Mapsetと子のMapをまとめて書き込む
    async fn upsert_mapset(&self, mapset: &Mapset) -> Result<(), MirrorError>;
}

/// オブジェクトストレージ
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// 1ページ分の一覧取得。`marker` より後ろのキーを返す
    async fn list_page(
        &self,
        prefix: &str,
        marker: Option<&str>,
    ) -> Result<ListPage, MirrorError>;

    async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), MirrorError>;
}

/// アーカイブの保存先
#[async_trait]
pub trait ArchiveSink: Send + Sync {
    /// 既存ファイルの把握（必要な実装のみ）
    async fn index(&mut self) -> Result<(), MirrorError> {
        Ok(())
    }

    async fn contains(&self, key: &str) -> bool;

    async fn store(&mut self, key: &str, bytes: &[u8]) -> Result<(), MirrorError>;
}
