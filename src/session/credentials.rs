//! セッショントークンの入力元

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::error::MirrorError;
use crate::traits::CredentialProvider;

use super::types::SESSION_COOKIE;

/// 標準入力からオペレーターにトークンを尋ねる
#[derive(Debug, Clone, Default)]
pub struct StdinCredentialProvider;

#[async_trait]
impl CredentialProvider for StdinCredentialProvider {
    async fn obtain_token(&self) -> Result<String, MirrorError> {
        let mut stdout = tokio::io::stdout();
        stdout
            .write_all(format!("Enter {} cookie: ", SESSION_COOKIE).as_bytes())
            .await?;
        stdout.flush().await?;

        let mut line = String::new();
        BufReader::new(tokio::io::stdin())
            .read_line(&mut line)
            .await?;

        normalize_token(&line)
    }
}

/// 固定トークン（環境変数指定・テスト用）
#[derive(Debug, Clone)]
pub struct StaticCredentialProvider {
    token: String,
}

impl StaticCredentialProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentialProvider {
    async fn obtain_token(&self) -> Result<String, MirrorError> {
        normalize_token(&self.token)
    }
}

fn normalize_token(raw: &str) -> Result<String, MirrorError> {
    let token = raw.trim();
    if token.is_empty() {
        return Err(MirrorError::Credential(format!(
            "{} が入力されていません",
            SESSION_COOKIE
        )));
    }
    Ok(token.to_string())
}
