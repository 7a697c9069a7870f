//! Presigned upload/download URLs for message attachments.
//!
//! `BlobBroker` never proxies attachment bytes through this service -- it
//! only issues time-bounded, signed URLs the client uses to talk to the
//! object store directly.

use chrono::{DateTime, Utc};

use crate::config::ObjectStoreConfig;
use crate::error::{Error, Result};

/// Attachment content types the service will sign an upload for.
const ALLOWED_CONTENT_TYPES: &[&str] = &[
    "image/png",
    "image/jpeg",
    "image/gif",
    "image/webp",
    "audio/mpeg",
    "audio/ogg",
    "audio/wav",
    "video/mp4",
    "application/pdf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "text/plain",
];

/// Default maximum object size a signed upload URL is valid for.
const MAX_UPLOAD_BYTES: u64 = 100 * 1024 * 1024;

#[derive(Debug, Clone, serde::Serialize)]
pub struct PresignedUpload {
    pub url: String,
    pub object_key: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct PresignedDownload {
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

pub struct BlobBroker {
    config: ObjectStoreConfig,
}

impl BlobBroker {
    pub fn new(config: ObjectStoreConfig) -> Self {
        Self { config }
    }

    /// Issue a signed upload URL for `filename`/`content_type` on behalf of
    /// `user_id`. The object key is namespaced by user and a random
    /// component so two uploads never collide.
    pub fn issue_upload_url(
        &self,
        user_id: &str,
        filename: &str,
        content_type: &str,
    ) -> Result<PresignedUpload> {
        if !ALLOWED_CONTENT_TYPES.contains(&content_type) {
            return Err(Error::ValidationError(format!(
                "content type {content_type} is not allowed for attachments"
            )));
        }

        let sanitized_name = sanitize_filename(filename);
        let object_key = format!("{user_id}/{}-{sanitized_name}", uuid::Uuid::new_v4());
        let expires_at = Utc::now() + self.config.presign_ttl();

        let url = self.sign_url("PUT", &object_key, expires_at, Some(MAX_UPLOAD_BYTES));

        Ok(PresignedUpload { url, object_key, expires_at })
    }

    /// Issue a signed download URL for `object_key`, after the caller has
    /// confirmed `requesting_user_id` is a member of a conversation that
    /// references this object key (done in the message-read path; this
    /// method only performs the signing, not the authorization check, so it
    /// stays independent of `ConversationStore`/`MessageIngest`).
    pub fn issue_download_url(&self, object_key: &str) -> Result<PresignedDownload> {
        let expires_at = Utc::now() + self.config.presign_ttl();
        let url = self.sign_url("GET", object_key, expires_at, None);
        Ok(PresignedDownload { url, expires_at })
    }

    fn sign_url(&self, method: &str, object_key: &str, expires_at: DateTime<Utc>, max_bytes: Option<u64>) -> String {
        let expires_ts = expires_at.timestamp();
        let canonical = format!(
            "{method}\n{}\n{object_key}\n{expires_ts}",
            self.config.oss_bucket
        );

        // BLAKE3 keyed hash: the secret key is reduced to 32 bytes first
        // since `keyed_hash` requires exactly that width.
        let key = blake3::hash(self.config.oss_secret_key.as_bytes());
        let signature = blake3::keyed_hash(key.as_bytes(), canonical.as_bytes()).to_hex().to_string();

        let mut url = format!(
            "{}/{}/{object_key}?AccessKey={}&Expires={expires_ts}&Signature={signature}",
            self.config.oss_endpoint.trim_end_matches('/'),
            self.config.oss_bucket,
            self.config.oss_access_key,
        );

        if let Some(max_bytes) = max_bytes {
            url.push_str(&format!("&MaxBytes={max_bytes}"));
        }

        url
    }
}

fn sanitize_filename(filename: &str) -> String {
    filename
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> ObjectStoreConfig {
        ObjectStoreConfig {
            oss_endpoint: "https://oss.example.com".to_string(),
            oss_access_key: "ak".to_string(),
            oss_secret_key: "sk".to_string(),
            oss_bucket: "messages".to_string(),
            oss_region: None,
            presign_ttl_secs: 3600,
        }
    }

    #[test]
    fn rejects_disallowed_content_type() {
        let broker = BlobBroker::new(test_config());
        let result = broker.issue_upload_url("user-1", "payload.exe", "application/x-msdownload");
        assert!(result.is_err());
    }

    #[test]
    fn upload_url_namespaces_object_key_by_user() {
        let broker = BlobBroker::new(test_config());
        let upload = broker.issue_upload_url("user-1", "photo.png", "image/png").unwrap();
        assert!(upload.object_key.starts_with("user-1/"));
    }

    #[test]
    fn filename_sanitization_strips_path_separators() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "______etc_passwd");
    }
}
