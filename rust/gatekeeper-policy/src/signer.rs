use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use gatekeeper_message::{
    DecisionError, GatekeeperMessage, SignatureRequest, SignatureType, keys,
};
use gatekeeper_s3::{Credentials, Presign, SigningError};
use serde::Deserialize;
use thiserror::Error;

use crate::ClientInformation;

/// Default validity of URLs issued by [`S3UrlSigner`]: 5 minutes.
pub const DEFAULT_SIGNED_URL_EXPIRY: u64 = 300;

/// A signer refused or was unable to sign an approved request.
///
/// This is a fault of the service's own trust material or configuration, not
/// a policy decision, and aborts the exchange.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SigningFailure {
    /// The storage provider signing step failed.
    #[error(transparent)]
    Storage(#[from] SigningError),

    /// The signer does not support this kind of request.
    #[error("Unsupported signature request: {0}")]
    Unsupported(String),
}

/// Absolute expiry `seconds` from now.
pub fn expiry_from_now(seconds: u64) -> DateTime<Utc> {
    let now = Utc::now();
    i64::try_from(seconds)
        .ok()
        .and_then(Duration::try_seconds)
        .and_then(|window| now.checked_add_signed(window))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Result of signing one request: the URL plus any rewrites the signer
/// imposes on the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    url: String,
    object_key: Option<String>,
    bucket_name: Option<String>,
    object_metadata: Option<BTreeMap<String, String>>,
}

impl Signature {
    /// A signature that leaves the request as it is.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            object_key: None,
            bucket_name: None,
            object_metadata: None,
        }
    }

    /// Rewrite the object key.
    pub fn with_object_key(mut self, key: impl Into<String>) -> Self {
        self.object_key = Some(key.into());
        self
    }

    /// Rewrite the bucket name.
    pub fn with_bucket_name(mut self, bucket: impl Into<String>) -> Self {
        self.bucket_name = Some(bucket.into());
        self
    }

    /// Replace the object metadata.
    pub fn with_object_metadata(mut self, metadata: BTreeMap<String, String>) -> Self {
        self.object_metadata = Some(metadata);
        self
    }

    /// The signed URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Produce the signed form of `request`, rewrites applied.
    pub fn apply(self, request: &SignatureRequest) -> Result<SignatureRequest, DecisionError> {
        let mut signed = request.clone();
        if let Some(key) = self.object_key {
            signed.set_object_key(key);
        }
        if let Some(bucket) = self.bucket_name {
            signed.set_bucket_name(Some(bucket));
        }
        if let Some(metadata) = self.object_metadata {
            signed.set_object_metadata(metadata);
        }
        signed.sign(self.url)?;
        Ok(signed)
    }
}

/// Produces scoped, time-bounded URLs for approved requests.
///
/// One method per [`SignatureType`]. Only ever called for requests the
/// [`Authorizer`](crate::Authorizer) allowed.
#[async_trait]
pub trait UrlSigner: Send + Sync {
    /// Sign a GET.
    async fn sign_get(
        &self,
        message: &GatekeeperMessage,
        client: &ClientInformation,
        request: &SignatureRequest,
    ) -> Result<Signature, SigningFailure>;

    /// Sign a HEAD.
    async fn sign_head(
        &self,
        message: &GatekeeperMessage,
        client: &ClientInformation,
        request: &SignatureRequest,
    ) -> Result<Signature, SigningFailure>;

    /// Sign a PUT.
    async fn sign_put(
        &self,
        message: &GatekeeperMessage,
        client: &ClientInformation,
        request: &SignatureRequest,
    ) -> Result<Signature, SigningFailure>;

    /// Sign a DELETE.
    async fn sign_delete(
        &self,
        message: &GatekeeperMessage,
        client: &ClientInformation,
        request: &SignatureRequest,
    ) -> Result<Signature, SigningFailure>;

    /// Sign an ACL read.
    async fn sign_get_acl(
        &self,
        message: &GatekeeperMessage,
        client: &ClientInformation,
        request: &SignatureRequest,
    ) -> Result<Signature, SigningFailure>;

    /// Sign an ACL write.
    async fn sign_put_acl(
        &self,
        message: &GatekeeperMessage,
        client: &ClientInformation,
        request: &SignatureRequest,
    ) -> Result<Signature, SigningFailure>;

    /// Dispatch to the method matching the request's type.
    async fn sign(
        &self,
        message: &GatekeeperMessage,
        client: &ClientInformation,
        request: &SignatureRequest,
    ) -> Result<Signature, SigningFailure> {
        match request.signature_type() {
            SignatureType::Get => self.sign_get(message, client, request).await,
            SignatureType::Head => self.sign_head(message, client, request).await,
            SignatureType::Put => self.sign_put(message, client, request).await,
            SignatureType::Delete => self.sign_delete(message, client, request).await,
            SignatureType::AclLookup => self.sign_get_acl(message, client, request).await,
            SignatureType::AclUpdate => self.sign_put_acl(message, client, request).await,
        }
    }
}

/// Settings for [`S3UrlSigner`].
#[derive(Debug, Clone, Deserialize)]
pub struct S3SignerSettings {
    /// Storage credentials; falls back to the configuration's shared ones.
    #[serde(default)]
    pub credentials: Option<Credentials>,
    /// Seconds each URL stays valid.
    #[serde(default = "default_expires_in")]
    pub expires_in: u64,
}

impl Default for S3SignerSettings {
    fn default() -> Self {
        Self {
            credentials: None,
            expires_in: DEFAULT_SIGNED_URL_EXPIRY,
        }
    }
}

fn default_expires_in() -> u64 {
    DEFAULT_SIGNED_URL_EXPIRY
}

/// Signs requests with S3 SigV4 query-string authentication.
/// Registered as `default`.
///
/// Requests without a bucket are signed against the credentials' bucket and
/// the bucket is written back, so the client learns where the object lives.
/// PUT requests carry the exchange's transaction id in their metadata under
/// [`keys::TRANSACTION_ID_METADATA`].
#[derive(Debug, Clone)]
pub struct S3UrlSigner {
    credentials: Credentials,
    expires_in: u64,
}

impl S3UrlSigner {
    /// Sign with `credentials`, URLs valid for [`DEFAULT_SIGNED_URL_EXPIRY`].
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            expires_in: DEFAULT_SIGNED_URL_EXPIRY,
        }
    }

    /// Keep URLs valid for `seconds`.
    pub fn expires_in(mut self, seconds: u64) -> Self {
        self.expires_in = seconds;
        self
    }

    fn presign(
        &self,
        request: &SignatureRequest,
        acl: bool,
        metadata: Option<BTreeMap<String, String>>,
    ) -> Result<Signature, SigningFailure> {
        let bucket = request
            .bucket_name()
            .unwrap_or_else(|| self.credentials.bucket());

        let mut presign = Presign::new(request.signature_type().method(), request.object_key())
            .with_bucket(bucket)
            .expires_at(expiry_from_now(self.expires_in))?;
        if acl {
            presign = presign.with_param("acl", "");
        }
        if let Some(metadata) = &metadata {
            presign = presign.with_metadata(metadata)?;
        }

        let url = self.credentials.presign(&presign)?;
        tracing::debug!(
            method = presign.method(),
            bucket,
            key = request.object_key(),
            "Presigned request"
        );

        let mut signature = Signature::new(url.to_string());
        if request.bucket_name().is_none() {
            signature = signature.with_bucket_name(bucket);
        }
        match metadata {
            Some(metadata) if &metadata != request.object_metadata() => {
                Ok(signature.with_object_metadata(metadata))
            }
            _ => Ok(signature),
        }
    }
}

#[async_trait]
impl UrlSigner for S3UrlSigner {
    async fn sign_get(
        &self,
        _message: &GatekeeperMessage,
        _client: &ClientInformation,
        request: &SignatureRequest,
    ) -> Result<Signature, SigningFailure> {
        self.presign(request, false, None)
    }

    async fn sign_head(
        &self,
        _message: &GatekeeperMessage,
        _client: &ClientInformation,
        request: &SignatureRequest,
    ) -> Result<Signature, SigningFailure> {
        self.presign(request, false, None)
    }

    async fn sign_put(
        &self,
        message: &GatekeeperMessage,
        _client: &ClientInformation,
        request: &SignatureRequest,
    ) -> Result<Signature, SigningFailure> {
        let mut metadata = request.object_metadata().clone();
        if let Some(transaction_id) = message.transaction_id() {
            metadata.insert(
                keys::TRANSACTION_ID_METADATA.to_string(),
                transaction_id.to_string(),
            );
        }
        self.presign(request, false, Some(metadata))
    }

    async fn sign_delete(
        &self,
        _message: &GatekeeperMessage,
        _client: &ClientInformation,
        request: &SignatureRequest,
    ) -> Result<Signature, SigningFailure> {
        self.presign(request, false, None)
    }

    async fn sign_get_acl(
        &self,
        _message: &GatekeeperMessage,
        _client: &ClientInformation,
        request: &SignatureRequest,
    ) -> Result<Signature, SigningFailure> {
        self.presign(request, true, None)
    }

    async fn sign_put_acl(
        &self,
        _message: &GatekeeperMessage,
        _client: &ClientInformation,
        request: &SignatureRequest,
    ) -> Result<Signature, SigningFailure> {
        self.presign(request, true, Some(request.object_metadata().clone()))
    }
}
