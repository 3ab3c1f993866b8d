use async_trait::async_trait;
use gatekeeper_message::{GatekeeperMessage, SignatureRequest};
use serde::Deserialize;

use crate::ClientInformation;

/// Outcome of an authorization check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// The request may proceed to signing.
    Allow,
    /// The request is refused. A reason, when given, is reported back to the
    /// client as the request's decline reason.
    Deny {
        /// Why the request was refused.
        reason: Option<String>,
    },
}

impl Verdict {
    /// Refuse without a reason.
    pub fn deny() -> Self {
        Verdict::Deny { reason: None }
    }

    /// Refuse with `reason`.
    pub fn deny_because(reason: impl Into<String>) -> Self {
        Verdict::Deny {
            reason: Some(reason.into()),
        }
    }

    /// Whether this verdict allows the request.
    pub fn is_allowed(&self) -> bool {
        matches!(self, Verdict::Allow)
    }
}

impl From<bool> for Verdict {
    fn from(allowed: bool) -> Self {
        if allowed { Verdict::Allow } else { Verdict::deny() }
    }
}

/// Decides whether each request in a message may be signed, and whether a
/// listing may be produced.
///
/// Implementations see the whole inbound message with every call so they can
/// apply batch-wide rules (e.g. quotas across all requests). Both calls are
/// made once per item per exchange; a refusal is final for that item.
#[async_trait]
pub trait Authorizer: Send + Sync {
    /// Check one signature request.
    async fn allow_signature_request(
        &self,
        message: &GatekeeperMessage,
        client: &ClientInformation,
        request: &SignatureRequest,
    ) -> Verdict;

    /// Check a bucket listing request.
    async fn allow_bucket_listing_request(
        &self,
        message: &GatekeeperMessage,
        client: &ClientInformation,
    ) -> Verdict;
}

/// Allows everything. Registered as `default`.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

#[async_trait]
impl Authorizer for AllowAll {
    async fn allow_signature_request(
        &self,
        _message: &GatekeeperMessage,
        _client: &ClientInformation,
        _request: &SignatureRequest,
    ) -> Verdict {
        Verdict::Allow
    }

    async fn allow_bucket_listing_request(
        &self,
        _message: &GatekeeperMessage,
        _client: &ClientInformation,
    ) -> Verdict {
        Verdict::Allow
    }
}

/// Settings for [`DenyAll`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DenyAllSettings {
    /// Decline reason given for every request.
    pub reason: Option<String>,
}

/// Refuses everything. Registered as `deny-all`.
#[derive(Debug, Clone, Default)]
pub struct DenyAll {
    reason: Option<String>,
}

impl DenyAll {
    /// Refuse with no reason.
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse every request with `reason`.
    pub fn with_reason(reason: impl Into<String>) -> Self {
        Self {
            reason: Some(reason.into()),
        }
    }
}

impl From<DenyAllSettings> for DenyAll {
    fn from(settings: DenyAllSettings) -> Self {
        Self {
            reason: settings.reason,
        }
    }
}

#[async_trait]
impl Authorizer for DenyAll {
    async fn allow_signature_request(
        &self,
        _message: &GatekeeperMessage,
        _client: &ClientInformation,
        _request: &SignatureRequest,
    ) -> Verdict {
        Verdict::Deny {
            reason: self.reason.clone(),
        }
    }

    async fn allow_bucket_listing_request(
        &self,
        _message: &GatekeeperMessage,
        _client: &ClientInformation,
    ) -> Verdict {
        Verdict::Deny {
            reason: self.reason.clone(),
        }
    }
}

/// Settings for [`PrefixAuthorizer`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PrefixSettings {
    /// Key prefixes requests may target.
    pub prefixes: Vec<String>,
    /// Buckets requests may target. Empty means any bucket.
    pub buckets: Vec<String>,
    /// Whether bucket listings are allowed.
    pub allow_listing: bool,
}

/// Allows requests whose object key starts with one of a set of prefixes.
/// Registered as `prefix`.
#[derive(Debug, Clone, Default)]
pub struct PrefixAuthorizer {
    settings: PrefixSettings,
}

impl PrefixAuthorizer {
    /// Allow keys under any of `prefixes`.
    pub fn new<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            settings: PrefixSettings {
                prefixes: prefixes.into_iter().map(Into::into).collect(),
                ..PrefixSettings::default()
            },
        }
    }

    /// Only allow requests naming one of `buckets` (or no bucket).
    pub fn with_buckets<I, S>(mut self, buckets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.settings.buckets = buckets.into_iter().map(Into::into).collect();
        self
    }

    /// Allow or refuse bucket listings.
    pub fn with_listing(mut self, allow: bool) -> Self {
        self.settings.allow_listing = allow;
        self
    }

    fn check(&self, request: &SignatureRequest) -> Verdict {
        let key = request.object_key();
        if !self
            .settings
            .prefixes
            .iter()
            .any(|prefix| key.starts_with(prefix.as_str()))
        {
            return Verdict::deny_because(format!("Key {key} is outside the permitted prefixes"));
        }

        match request.bucket_name() {
            Some(bucket)
                if !self.settings.buckets.is_empty()
                    && !self.settings.buckets.iter().any(|b| b == bucket) =>
            {
                Verdict::deny_because(format!("Bucket {bucket} is not permitted"))
            }
            _ => Verdict::Allow,
        }
    }
}

impl From<PrefixSettings> for PrefixAuthorizer {
    fn from(settings: PrefixSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl Authorizer for PrefixAuthorizer {
    async fn allow_signature_request(
        &self,
        _message: &GatekeeperMessage,
        _client: &ClientInformation,
        request: &SignatureRequest,
    ) -> Verdict {
        self.check(request)
    }

    async fn allow_bucket_listing_request(
        &self,
        _message: &GatekeeperMessage,
        _client: &ClientInformation,
    ) -> Verdict {
        self.settings.allow_listing.into()
    }
}
