use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use tracing::debug;

use crate::error::MirrorError;
use crate::traits::ObjectStore;

use super::ListPage;

/// S3バケット
#[derive(Debug, Clone)]
pub struct S3ObjectStore {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3ObjectStore {
    /// 認証情報は標準のAWSプロバイダチェーンから読む
    pub async fn connect(bucket: impl Into<String>, region: impl Into<String>) -> Self {
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.into()))
            .load()
            .await;

        Self {
            client: aws_sdk_s3::Client::new(&sdk_config),
            bucket: bucket.into(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn list_page(
        &self,
        prefix: &str,
        marker: Option<&str>,
    ) -> Result<ListPage, MirrorError> {
        let mut request = self
            .client
            .list_objects()
            .bucket(&self.bucket)
            .prefix(prefix);
        if let Some(marker) = marker {
            request = request.marker(marker);
        }

        let output = request.send().await.map_err(|e| {
            MirrorError::ObjectStore(format!(
                "一覧取得失敗 s3://{}/{}: {}",
                self.bucket,
                prefix,
                DisplayErrorContext(&e)
            ))
        })?;

        let keys: Vec<String> = output
            .contents()
            .iter()
            .filter_map(|object| object.key().map(str::to_string))
            .collect();
        debug!("s3://{}/{}: {} keys in page", self.bucket, prefix, keys.len());

        Ok(ListPage {
            keys,
            next_marker: output.next_marker().map(str::to_string),
            is_truncated: output.is_truncated().unwrap_or(false),
        })
    }

    async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), MirrorError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(bytes.to_vec()))
            .send()
            .await
            .map_err(|e| {
                MirrorError::ObjectStore(format!(
                    "アップロード失敗 s3://{}/{}: {}",
                    self.bucket,
                    key,
                    DisplayErrorContext(&e)
                ))
            })?;
        Ok(())
    }
}
