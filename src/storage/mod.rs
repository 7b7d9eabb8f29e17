//! 外部ストレージ（オブジェクトストレージ・メタデータDB）

mod database;
mod memory;
mod s3;

use std::collections::BTreeSet;

use tracing::{debug, warn};

use crate::error::MirrorError;
use crate::traits::ObjectStore;

pub use database::MySqlStore;
pub use memory::MemoryObjectStore;
pub use s3::S3ObjectStore;

/// 一覧取得の1ページ
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    pub keys: Vec<String>,
    /// 次ページの開始位置（プロバイダが返した場合のみ）
    pub next_marker: Option<String>,
    pub is_truncated: bool,
}

/// プレフィックス配下のキーを全ページ分取得する
///
/// 続きの位置は `next_marker`、なければそのページの最後のキー。
pub async fn list_all_keys<S>(store: &S, prefix: &str) -> Result<BTreeSet<String>, MirrorError>
where
    S: ObjectStore + ?Sized,
{
    let mut keys = BTreeSet::new();
    let mut marker: Option<String> = None;
    let mut pages = 0u32;

    loop {
        let page = store.list_page(prefix, marker.as_deref()).await?;
        pages += 1;

        let next = page
            .next_marker
            .clone()
            .or_else(|| page.keys.last().cloned());
        let truncated = page.is_truncated;
        keys.extend(page.keys);

        if !truncated {
            break;
        }

        match next {
            Some(next) if marker.as_deref() != Some(next.as_str()) => marker = Some(next),
            _ => {
                warn!(
                    "Listing of '{}' reported more pages but did not advance, stopping after {} pages",
                    prefix, pages
                );
                break;
            }
        }
    }

    debug!("Listed {} keys under '{}' in {} pages", keys.len(), prefix, pages);
    Ok(keys)
}
