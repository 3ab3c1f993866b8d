#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use gatekeeper_message::{GatekeeperMessage, ListedObject, SignatureRequest};
use gatekeeper_policy::{
    Authorizer, BucketLister, ClientInformation, ListingFailure, Signature, SigningFailure,
    TransactionIdProvider, UrlSigner, Verdict,
};

/// Denies the listed keys (with an optional reason), allows everything else.
/// Clones share what they have seen.
#[derive(Clone, Default)]
pub struct DenyKeys {
    denied: HashMap<String, Option<String>>,
    allow_listing: bool,
    seen: Arc<Mutex<Vec<ClientInformation>>>,
}

impl DenyKeys {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deny(mut self, key: &str, reason: Option<&str>) -> Self {
        self.denied
            .insert(key.to_string(), reason.map(str::to_string));
        self
    }

    pub fn allow_listing(mut self) -> Self {
        self.allow_listing = true;
        self
    }

    pub fn seen(&self) -> Vec<ClientInformation> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Authorizer for DenyKeys {
    async fn allow_signature_request(
        &self,
        _message: &GatekeeperMessage,
        client: &ClientInformation,
        request: &SignatureRequest,
    ) -> Verdict {
        self.seen.lock().unwrap().push(client.clone());
        match self.denied.get(request.object_key()) {
            Some(reason) => Verdict::Deny {
                reason: reason.clone(),
            },
            None => Verdict::Allow,
        }
    }

    async fn allow_bucket_listing_request(
        &self,
        _message: &GatekeeperMessage,
        client: &ClientInformation,
    ) -> Verdict {
        self.seen.lock().unwrap().push(client.clone());
        self.allow_listing.into()
    }
}

/// Signs `https://signed.example/<type>/<key>`, counting calls. Fails on
/// one key if configured to. Clones share the count.
#[derive(Clone, Default)]
pub struct CountingSigner {
    calls: Arc<AtomicUsize>,
    fail_on: Option<String>,
    rewrite_prefix: Option<String>,
}

impl CountingSigner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(key: &str) -> Self {
        Self {
            fail_on: Some(key.to_string()),
            ..Self::default()
        }
    }

    pub fn rewriting_under(prefix: &str) -> Self {
        Self {
            rewrite_prefix: Some(prefix.to_string()),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn signature(&self, request: &SignatureRequest) -> Result<Signature, SigningFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_on.as_deref() == Some(request.object_key()) {
            return Err(SigningFailure::Unsupported(request.object_key().to_string()));
        }
        let signature = Signature::new(format!(
            "https://signed.example/{}/{}",
            request.signature_type(),
            request.object_key()
        ));
        Ok(match &self.rewrite_prefix {
            Some(prefix) => signature
                .with_object_key(format!("{prefix}{}", request.object_key()))
                .with_bucket_name("rewritten"),
            None => signature,
        })
    }
}

#[async_trait]
impl UrlSigner for CountingSigner {
    async fn sign_get(
        &self,
        _message: &GatekeeperMessage,
        _client: &ClientInformation,
        request: &SignatureRequest,
    ) -> Result<Signature, SigningFailure> {
        self.signature(request)
    }

    async fn sign_head(
        &self,
        _message: &GatekeeperMessage,
        _client: &ClientInformation,
        request: &SignatureRequest,
    ) -> Result<Signature, SigningFailure> {
        self.signature(request)
    }

    async fn sign_put(
        &self,
        _message: &GatekeeperMessage,
        _client: &ClientInformation,
        request: &SignatureRequest,
    ) -> Result<Signature, SigningFailure> {
        self.signature(request)
    }

    async fn sign_delete(
        &self,
        _message: &GatekeeperMessage,
        _client: &ClientInformation,
        request: &SignatureRequest,
    ) -> Result<Signature, SigningFailure> {
        self.signature(request)
    }

    async fn sign_get_acl(
        &self,
        _message: &GatekeeperMessage,
        _client: &ClientInformation,
        request: &SignatureRequest,
    ) -> Result<Signature, SigningFailure> {
        self.signature(request)
    }

    async fn sign_put_acl(
        &self,
        _message: &GatekeeperMessage,
        _client: &ClientInformation,
        request: &SignatureRequest,
    ) -> Result<Signature, SigningFailure> {
        self.signature(request)
    }
}

/// Lists a fixed set of keys, or fails. Clones share the count.
#[derive(Clone)]
pub struct FixedLister {
    keys: Option<Vec<&'static str>>,
    calls: Arc<AtomicUsize>,
}

impl FixedLister {
    pub fn new(keys: Vec<&'static str>) -> Self {
        Self {
            keys: Some(keys),
            calls: Arc::default(),
        }
    }

    pub fn broken() -> Self {
        Self {
            keys: None,
            calls: Arc::default(),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BucketLister for FixedLister {
    async fn list_objects(
        &self,
        _message: &GatekeeperMessage,
        _client: &ClientInformation,
    ) -> Result<Vec<ListedObject>, ListingFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.keys {
            Some(keys) => Ok(keys
                .iter()
                .map(|key| ListedObject::new(*key).with_size(key.len() as u64))
                .collect()),
            None => Err(ListingFailure::Unavailable("broken".into())),
        }
    }
}

/// Always returns the same id.
pub struct FixedTransactionId(pub &'static str);

#[async_trait]
impl TransactionIdProvider for FixedTransactionId {
    async fn transaction_id(
        &self,
        _message: &GatekeeperMessage,
        _client: &ClientInformation,
    ) -> String {
        self.0.to_string()
    }
}
