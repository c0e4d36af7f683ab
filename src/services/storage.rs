//! Audio blob storage. Keys are content-addressed so re-uploading the same
//! recording reuses the object.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use sha2::{Digest, Sha256};

use crate::core::config::Settings;

const PLAYBACK_URL_TTL: Duration = Duration::from_secs(15 * 60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct StoredBlob {
    pub(crate) key: String,
    pub(crate) size_bytes: i64,
    pub(crate) sha256: String,
}

#[async_trait]
pub(crate) trait BlobStorage: Send + Sync {
    async fn upload(
        &self,
        key: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> anyhow::Result<StoredBlob>;

    async fn download(&self, key: &str) -> anyhow::Result<Vec<u8>>;

    /// Short-lived URL a reviewer can stream the recording from.
    async fn playback_url(&self, key: &str) -> anyhow::Result<String>;
}

/// File extension for the audio types learners may upload; `None` for
/// anything else. Codec parameters after `;` are ignored.
pub(crate) fn audio_extension(mime_type: &str) -> Option<&'static str> {
    let extension = match mime_type.split(';').next().unwrap_or_default().trim() {
        "audio/mpeg" | "audio/mp3" => "mp3",
        "audio/wav" | "audio/x-wav" | "audio/wave" => "wav",
        "audio/ogg" => "ogg",
        "audio/webm" => "webm",
        "audio/mp4" | "audio/m4a" | "audio/x-m4a" => "m4a",
        "audio/flac" => "flac",
        _ => return None,
    };
    Some(extension)
}

/// `audio/{learner}/{sha256}.{ext}`; the extension follows the MIME subtype.
pub(crate) fn audio_key(learner_id: &str, bytes: &[u8], mime_type: &str) -> (String, String) {
    let digest = hex::encode(Sha256::digest(bytes));
    let extension = audio_extension(mime_type).unwrap_or("bin");
    (format!("audio/{learner_id}/{digest}.{extension}"), digest)
}

#[derive(Debug, Clone)]
pub(crate) struct S3BlobStorage {
    client: Client,
    bucket: String,
}

impl S3BlobStorage {
    pub(crate) async fn from_settings(settings: &Settings) -> anyhow::Result<Option<Self>> {
        if settings.s3().access_key.is_empty() || settings.s3().secret_key.is_empty() {
            return Ok(None);
        }

        let creds = Credentials::new(
            settings.s3().access_key.clone(),
            settings.s3().secret_key.clone(),
            None,
            None,
            "speakwise-static",
        );

        let config = aws_config::defaults(BehaviorVersion::latest())
            .endpoint_url(settings.s3().endpoint.clone())
            .region(aws_config::Region::new(settings.s3().region.clone()))
            .credentials_provider(creds)
            .load()
            .await;

        let s3_config = aws_sdk_s3::config::Builder::from(&config).force_path_style(true).build();

        Ok(Some(Self { client: Client::from_conf(s3_config), bucket: settings.s3().bucket.clone() }))
    }
}

#[async_trait]
impl BlobStorage for S3BlobStorage {
    async fn upload(
        &self,
        key: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> anyhow::Result<StoredBlob> {
        let size_bytes = bytes.len() as i64;
        let sha256 = hex::encode(Sha256::digest(&bytes));

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .with_context(|| format!("failed to upload {key}"))?;

        Ok(StoredBlob { key: key.to_string(), size_bytes, sha256 })
    }

    async fn download(&self, key: &str) -> anyhow::Result<Vec<u8>> {
        let object = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .with_context(|| format!("failed to fetch {key}"))?;
        let body = object.body.collect().await.context("failed to read object body")?;
        Ok(body.into_bytes().to_vec())
    }

    async fn playback_url(&self, key: &str) -> anyhow::Result<String> {
        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(PresigningConfig::expires_in(PLAYBACK_URL_TTL)?)
            .await?;

        Ok(presigned.uri().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::{audio_extension, audio_key, BlobStorage, S3BlobStorage};
    use crate::core::config::Settings;
    use crate::test_support;

    #[test]
    fn audio_key_is_content_addressed() {
        let (first, digest) = audio_key("learner-1", b"same bytes", "audio/webm;codecs=opus");
        let (second, _) = audio_key("learner-1", b"same bytes", "audio/webm");
        let (other, _) = audio_key("learner-1", b"other bytes", "audio/webm");

        assert_eq!(first, second);
        assert_ne!(first, other);
        assert_eq!(first, format!("audio/learner-1/{digest}.webm"));
        assert_eq!(digest.len(), 64);
    }

    #[test]
    fn only_known_audio_types_have_an_extension() {
        assert_eq!(audio_extension("audio/ogg"), Some("ogg"));
        assert_eq!(audio_extension("audio/x-m4a"), Some("m4a"));
        assert_eq!(audio_extension("audio/x-unknown"), None);
        assert_eq!(audio_extension("image/png"), None);
    }

    #[tokio::test]
    async fn storage_is_disabled_without_credentials() {
        let _guard = test_support::env_lock().await;
        test_support::set_test_env();

        let settings = Settings::load().expect("settings");
        let storage = S3BlobStorage::from_settings(&settings).await.expect("storage");
        assert!(storage.is_none());
    }

    #[tokio::test]
    async fn playback_url_is_presigned_for_key() {
        let _guard = test_support::env_lock().await;
        test_support::set_test_env();
        test_support::set_test_storage_env();

        let settings = Settings::load().expect("settings");
        let storage = S3BlobStorage::from_settings(&settings)
            .await
            .expect("storage")
            .expect("storage enabled");

        let url = storage.playback_url("audio/learner-1/abc.webm").await.expect("presign");
        assert!(url.contains("abc.webm"));
        assert!(url.contains("X-Amz-Signature"));
    }
}
