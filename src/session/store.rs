//! セッションファイルの読み書き

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::MirrorError;

use super::types::PersistedSessionRecord;

/// 単一ファイルに保存されるCookie jar
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 保存済みセッションを読み込む（存在しない・壊れている場合は None）
    pub fn load(&self) -> Option<PersistedSessionRecord> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) => {
                debug!("No stored session at {:?}: {}", self.path, e);
                return None;
            }
        };

        match serde_json::from_str::<PersistedSessionRecord>(&content) {
            Ok(record) => {
                info!(
                    "Loaded stored session from {:?} ({} cookies, saved {})",
                    self.path,
                    record.cookies.len(),
                    record.saved_at
                );
                Some(record)
            }
            Err(e) => {
                warn!("Ignoring unreadable session file {:?}: {}", self.path, e);
                None
            }
        }
    }

    /// 一時ファイルに書いてからリネームする
    pub fn save(&self, record: &PersistedSessionRecord) -> Result<(), MirrorError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    MirrorError::Storage(format!("ディレクトリ作成失敗 {:?}: {}", parent, e))
                })?;
            }
        }

        let json = serde_json::to_string_pretty(record)?;
        let temp_path = self.temp_path();

        std::fs::write(&temp_path, json)
            .map_err(|e| MirrorError::Storage(format!("書き込み失敗 {:?}: {}", temp_path, e)))?;

        if let Err(e) = std::fs::rename(&temp_path, &self.path) {
            let _ = std::fs::remove_file(&temp_path);
            return Err(MirrorError::Storage(format!(
                "リネーム失敗 {:?}: {}",
                self.path, e
            )));
        }

        info!("Saved session to {:?}", self.path);
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::types::{StoredCookie, CLEARANCE_COOKIE, SESSION_COOKIE};
    use tempfile::tempdir;

    fn record(session: &str) -> PersistedSessionRecord {
        PersistedSessionRecord::new(vec![
            StoredCookie {
                name: CLEARANCE_COOKIE.to_string(),
                value: "clear".to_string(),
                domain: ".quavergame.com".to_string(),
                path: "/".to_string(),
                expires: Some(1_900_000_000.0),
                http_only: true,
                secure: true,
            },
            StoredCookie {
                name: SESSION_COOKIE.to_string(),
                value: session.to_string(),
                domain: "quavergame.com".to_string(),
                path: "/".to_string(),
                expires: None,
                http_only: true,
                secure: false,
            },
        ])
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("storageState.json"));
        assert!(store.load().is_none());
    }

    #[test]
    fn test_load_corrupt_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("storageState.json");
        std::fs::write(&path, "{ not json").unwrap();

        let store = SessionStore::new(&path);
        assert!(store.load().is_none());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("state").join("storageState.json"));

        let saved = record("first");
        store.save(&saved).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded, saved);
        assert_eq!(loaded.cookie(SESSION_COOKIE), Some("first"));
    }

    #[test]
    fn test_save_overwrites_and_leaves_no_temp_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("storageState.json");
        let store = SessionStore::new(&path);

        store.save(&record("first")).unwrap();
        store.save(&record("second")).unwrap();

        assert_eq!(store.load().unwrap().cookie(SESSION_COOKIE), Some("second"));
        assert!(!dir.path().join("storageState.json.tmp").exists());
    }

    #[test]
    fn test_save_to_unwritable_location() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "file, not a directory").unwrap();

        let store = SessionStore::new(blocker.join("storageState.json"));
        assert!(matches!(
            store.save(&record("x")),
            Err(MirrorError::Storage(_))
        ));
    }
}
