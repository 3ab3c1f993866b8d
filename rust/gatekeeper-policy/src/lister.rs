use std::time::Duration;

use async_trait::async_trait;
use gatekeeper_message::{GatekeeperMessage, ListedObject};
use gatekeeper_s3::{Credentials, ListResult, ListingError, Presign};
use serde::Deserialize;
use thiserror::Error;

use crate::ClientInformation;

/// Application property a client may set to narrow a listing.
pub const PREFIX_PROPERTY: &str = "prefix";

/// Upper bound on entries returned by [`S3BucketLister`] unless configured.
pub const DEFAULT_MAX_KEYS: u32 = 1000;

const LIST_TIMEOUT: Duration = Duration::from_secs(30);

/// A lister could not produce a listing for an approved request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ListingFailure {
    /// The storage provider failed.
    #[error(transparent)]
    Storage(#[from] ListingError),

    /// The lister is misconfigured.
    #[error("Listing unavailable: {0}")]
    Unavailable(String),
}

/// Produces a possibly filtered bucket listing.
///
/// Only called after the [`Authorizer`](crate::Authorizer) allowed the
/// listing. Implementations decide which objects to reveal.
#[async_trait]
pub trait BucketLister: Send + Sync {
    /// List objects for the caller.
    async fn list_objects(
        &self,
        message: &GatekeeperMessage,
        client: &ClientInformation,
    ) -> Result<Vec<ListedObject>, ListingFailure>;
}

/// Settings for [`S3BucketLister`].
#[derive(Debug, Clone, Deserialize)]
pub struct S3ListerSettings {
    /// Storage credentials; falls back to the configuration's shared ones.
    #[serde(default)]
    pub credentials: Option<Credentials>,
    /// Prefix every listing is confined to.
    #[serde(default)]
    pub prefix: Option<String>,
    /// Maximum number of entries returned.
    #[serde(default = "default_max_keys")]
    pub max_keys: u32,
}

impl Default for S3ListerSettings {
    fn default() -> Self {
        Self {
            credentials: None,
            prefix: None,
            max_keys: DEFAULT_MAX_KEYS,
        }
    }
}

fn default_max_keys() -> u32 {
    DEFAULT_MAX_KEYS
}

/// Lists the credentials' bucket through presigned ListObjectsV2 requests.
/// Registered as `default`.
///
/// The listing is confined to the configured prefix; a client may narrow it
/// further with the [`PREFIX_PROPERTY`] application property, which is
/// appended to the configured prefix.
#[derive(Debug, Clone)]
pub struct S3BucketLister {
    credentials: Credentials,
    prefix: Option<String>,
    max_keys: u32,
    client: reqwest::Client,
}

impl S3BucketLister {
    /// List the bucket of `credentials`.
    pub fn new(credentials: Credentials) -> Result<Self, ListingFailure> {
        let client = reqwest::Client::builder()
            .timeout(LIST_TIMEOUT)
            .build()
            .map_err(|e| ListingFailure::Unavailable(e.to_string()))?;

        Ok(Self {
            credentials,
            prefix: None,
            max_keys: DEFAULT_MAX_KEYS,
            client,
        })
    }

    /// Confine listings to `prefix`.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Return at most `max_keys` entries.
    pub fn with_max_keys(mut self, max_keys: u32) -> Self {
        self.max_keys = max_keys;
        self
    }

    fn effective_prefix(&self, message: &GatekeeperMessage) -> Option<String> {
        let requested = message.application_property(PREFIX_PROPERTY);
        match (self.prefix.as_deref(), requested) {
            (None, None) => None,
            (configured, requested) => Some(format!(
                "{}{}",
                configured.unwrap_or_default(),
                requested.unwrap_or_default()
            )),
        }
    }

    async fn fetch_page(
        &self,
        prefix: Option<&str>,
        continuation_token: Option<&str>,
        max_keys: u32,
    ) -> Result<ListResult, ListingError> {
        let url = self
            .credentials
            .presign(&Presign::list(prefix, continuation_token, Some(max_keys)))?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ListingError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ListingError::Transport(e.to_string()))?;

        match ListResult::parse(&body) {
            Err(ListingError::Serialization(_)) if !status.is_success() => {
                Err(ListingError::Transport(format!("HTTP {status}")))
            }
            result => result,
        }
    }
}

#[async_trait]
impl BucketLister for S3BucketLister {
    async fn list_objects(
        &self,
        message: &GatekeeperMessage,
        _client: &ClientInformation,
    ) -> Result<Vec<ListedObject>, ListingFailure> {
        let prefix = self.effective_prefix(message);
        let mut objects = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let remaining = self.max_keys.saturating_sub(objects.len() as u32);
            if remaining == 0 {
                break;
            }

            let page = self
                .fetch_page(prefix.as_deref(), continuation_token.as_deref(), remaining)
                .await?;
            tracing::debug!(
                bucket = self.credentials.bucket(),
                entries = page.entries.len(),
                truncated = page.is_truncated,
                "Fetched listing page"
            );

            objects.extend(page.entries.into_iter().map(|entry| ListedObject {
                key: entry.key,
                size: entry.size,
                last_modified: entry.last_modified,
                etag: entry.etag,
            }));

            match page.next_continuation_token {
                Some(token) if page.is_truncated => continuation_token = Some(token),
                _ => break,
            }
        }

        objects.truncate(self.max_keys as usize);
        Ok(objects)
    }
}
