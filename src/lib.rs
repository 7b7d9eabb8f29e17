//! Quaver ランク譜面ミラー
//!
//! - ランク済みMapsetの一覧をAPIから取得
//! - メタデータをMySQLに同期
//! - `.qp` アーカイブを認証付きでダウンロードし、S3またはローカルに保存
//!
//! ダウンロードにはブラウザで取得した `cf_clearance` / `quaver_session` Cookieが必要。
//! セッションが切れるとHTMLが返るので、その場合はセッションを取り直して再試行する。
//!
//! # 使用例
//!
//! ```rust,ignore
//! use quaver_mirror::{MirrorConfig, MirrorService, SyncRequest};
//! use tower::Service;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = MirrorConfig::new()
//!         .with_bucket("my-bucket")
//!         .with_headless(false);
//!
//!     let mut service = MirrorService::new(config);
//!     let report = service.call(SyncRequest::new()).await.unwrap();
//!     println!("downloaded: {}", report.downloaded);
//! }
//! ```

pub mod catalog;
pub mod config;
pub mod error;
pub mod fetch;
pub mod service;
pub mod session;
pub mod storage;
pub mod sync;
pub mod traits;

// 主要な型をリエクスポート
pub use config::{DatabaseConfig, MirrorConfig};
pub use error::MirrorError;
pub use fetch::{ArchiveFetcher, FetchOutcome, FetchTarget, LocalDirSink, ObjectStoreSink};
pub use service::{MirrorService, SyncRequest};
pub use session::{BrowserSession, Session, SessionStore};
pub use sync::{SyncOptions, SyncOrchestrator, SyncReport};
pub use traits::{
    ArchiveSink, CatalogApi, CredentialProvider, MetadataStore, ObjectStore, SessionProvider,
};
