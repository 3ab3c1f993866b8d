use std::fmt;
use std::sync::Arc;

use gatekeeper_message::keys::{CLIENT_VERSION_ID, MANIFEST_METADATA_FLAG, TRANSACTION_ID};
use gatekeeper_message::{Decision, GatekeeperMessage, ListedObject, MessageBody, SignatureType};
use gatekeeper_policy::{
    ClientInformation, S3UrlSigner, TransactionIdProvider, UlidTransactionIds, UrlSigner,
};
use gatekeeper_s3::{Credentials, SigningError, metadata_headers};

use crate::{Batch, CLIENT_VERSION, ClientError, Operation, StorageObject, Transport};

/// Validity of URLs signed locally with the caller's own credentials: 1 day.
pub const SELF_AUTHORIZE_EXPIRY: u64 = 24 * 60 * 60;

/// Reason recorded for a request the gatekeeper left undecided.
pub const UNDECIDED_REASON: &str = "Request was neither signed nor declined";

/// Permission to perform one operation: the signed URL and the object as
/// the gatekeeper finally determined it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grant {
    /// Operation the URL is valid for.
    pub signature_type: SignatureType,
    /// Signed URL.
    pub url: String,
    /// Object after the gatekeeper's rewrites.
    pub object: StorageObject,
}

impl Grant {
    /// Headers the storage request must carry for the signature to hold.
    pub fn headers(&self) -> Result<Vec<(String, String)>, SigningError> {
        match self.signature_type {
            SignatureType::Put | SignatureType::AclUpdate => metadata_headers(&self.object.metadata),
            _ => Ok(Vec::new()),
        }
    }
}

/// An accepted batch, index-aligned with the operations that were sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authorized {
    transaction_id: Option<String>,
    grants: Vec<Grant>,
}

impl Authorized {
    /// Transaction the batch was authorized under, if tracked.
    pub fn transaction_id(&self) -> Option<&str> {
        self.transaction_id.as_deref()
    }

    /// One grant per operation, in order.
    pub fn grants(&self) -> &[Grant] {
        &self.grants
    }

    /// Take the grants.
    pub fn into_grants(self) -> Vec<Grant> {
        self.grants
    }
}

/// How a batch gets its decisions.
#[derive(Clone)]
pub enum Resolver {
    /// Sign locally; every operation is allowed for [`SELF_AUTHORIZE_EXPIRY`].
    SelfAuthorize(Credentials),
    /// Ask a remote gatekeeper.
    Remote(Arc<dyn Transport>),
}

impl Resolver {
    /// Ask the gatekeeper reachable through `transport`.
    pub fn remote(transport: impl Transport + 'static) -> Self {
        Resolver::Remote(Arc::new(transport))
    }
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolver::SelfAuthorize(credentials) => {
                f.debug_tuple("SelfAuthorize").field(credentials).finish()
            }
            Resolver::Remote(_) => f.debug_tuple("Remote").finish_non_exhaustive(),
        }
    }
}

/// Client side of the protocol.
///
/// Turns a [`Batch`] into a request, resolves it through the configured
/// [`Resolver`] and checks the answer: the response must carry one request
/// per operation, no gatekeeper error code, and every request signed. Any
/// declined (or undecided) request rejects the whole batch.
#[derive(Debug, Clone)]
pub struct Reconciler {
    resolver: Resolver,
}

impl Reconciler {
    /// Reconcile through `resolver`.
    pub fn new(resolver: Resolver) -> Self {
        Self { resolver }
    }

    /// Authorize every operation of `batch`, or none.
    pub async fn authorize(&self, batch: &Batch) -> Result<Authorized, ClientError> {
        let response = self.resolve(batch.to_message()).await?;
        reconcile(batch.operations(), &response)
    }

    /// Authorize one derived object (e.g. a manifest) under the transaction
    /// of an already authorized batch.
    ///
    /// The object is marked with the manifest metadata flag.
    pub async fn authorize_derived(
        &self,
        primary: &Authorized,
        mut operation: Operation,
    ) -> Result<Authorized, ClientError> {
        let transaction_id = primary
            .transaction_id()
            .ok_or(ClientError::MissingTransactionId)?;

        operation
            .object_mut()
            .metadata
            .insert(MANIFEST_METADATA_FLAG.to_string(), "true".to_string());
        let operations = [operation];

        let request = Batch::new()
            .with_operations(operations.iter().cloned())
            .to_message()
            .with_message_property(TRANSACTION_ID, transaction_id);

        let response = self.resolve(request).await?;
        reconcile(&operations, &response)
    }

    /// Ask the gatekeeper for the objects the caller may see.
    pub async fn list_objects<I, K, V>(&self, properties: I) -> Result<Vec<ListedObject>, ClientError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let Resolver::Remote(transport) = &self.resolver else {
            return Err(ClientError::ListingUnavailable);
        };

        let request = GatekeeperMessage::listing()
            .with_application_properties(properties)
            .with_application_property(CLIENT_VERSION_ID, CLIENT_VERSION);
        let response = exchange(transport.as_ref(), &request).await?;

        if let Some(code) = response.error_code() {
            return Err(ClientError::Gatekeeper(code.to_string()));
        }
        match response.into_body() {
            MessageBody::Listing(objects) => Ok(objects),
            MessageBody::Signing(requests) => Err(ClientError::IntegrityMismatch {
                sent: 0,
                received: requests.len(),
            }),
        }
    }

    async fn resolve(&self, request: GatekeeperMessage) -> Result<GatekeeperMessage, ClientError> {
        match &self.resolver {
            Resolver::SelfAuthorize(credentials) => self_authorize(credentials, request).await,
            Resolver::Remote(transport) => exchange(transport.as_ref(), &request).await,
        }
    }
}

async fn exchange(
    transport: &dyn Transport,
    request: &GatekeeperMessage,
) -> Result<GatekeeperMessage, ClientError> {
    let body = transport.exchange(request.encode()).await?;
    Ok(GatekeeperMessage::decode(&body)?)
}

/// Sign every request with the caller's own credentials.
async fn self_authorize(
    credentials: &Credentials,
    request: GatekeeperMessage,
) -> Result<GatekeeperMessage, ClientError> {
    let client = ClientInformation::new();
    let transaction_id = UlidTransactionIds.transaction_id(&request, &client).await;
    let request = request.with_message_property(TRANSACTION_ID, transaction_id);

    let signer = S3UrlSigner::new(credentials.clone()).expires_in(SELF_AUTHORIZE_EXPIRY);
    let mut signed = Vec::with_capacity(request.signature_requests().len());
    for pending in request.signature_requests() {
        let signature = signer.sign(&request, &client, pending).await?;
        signed.push(
            signature
                .apply(pending)
                .map_err(|e| ClientError::BatchRejected(e.to_string()))?,
        );
    }

    tracing::debug!(
        transaction_id = request.transaction_id().unwrap_or_default(),
        requests = signed.len(),
        "Self-authorized batch"
    );
    Ok(request.with_body(MessageBody::Signing(signed)))
}

fn reconcile(
    operations: &[Operation],
    response: &GatekeeperMessage,
) -> Result<Authorized, ClientError> {
    if let Some(code) = response.error_code() {
        tracing::error!(code, "Gatekeeper reported an error");
        return Err(ClientError::Gatekeeper(code.to_string()));
    }

    let requests = match response.body() {
        MessageBody::Signing(requests) => requests,
        MessageBody::Listing(objects) => {
            return Err(ClientError::IntegrityMismatch {
                sent: operations.len(),
                received: objects.len(),
            });
        }
    };
    if requests.len() != operations.len() {
        return Err(ClientError::IntegrityMismatch {
            sent: operations.len(),
            received: requests.len(),
        });
    }

    let transaction_id = response.transaction_id();
    let mut grants = Vec::with_capacity(requests.len());
    let mut rejection: Option<String> = None;

    for (index, (operation, request)) in operations.iter().zip(requests).enumerate() {
        let reason = match request.decision() {
            Decision::Signed { url } => {
                let mut object = operation.object().clone();
                object.key = request.object_key().to_string();
                if let Some(bucket) = request.bucket_name() {
                    object.bucket = Some(bucket.to_string());
                }
                object.metadata = request.object_metadata().clone();

                grants.push(Grant {
                    signature_type: operation.signature_type(),
                    url: url.clone(),
                    object,
                });
                continue;
            }
            Decision::Declined { reason } => reason.as_str(),
            Decision::Pending => {
                tracing::warn!(transaction_id, index, "Gatekeeper left request undecided");
                UNDECIDED_REASON
            }
        };

        tracing::warn!(transaction_id, index, key = request.object_key(), reason, "Request declined");
        rejection.get_or_insert_with(|| reason.to_string());
    }

    if let Some(reason) = rejection {
        return Err(ClientError::BatchRejected(reason));
    }

    tracing::info!(transaction_id, grants = grants.len(), "Batch authorized");
    Ok(Authorized {
        transaction_id: transaction_id.map(str::to_string),
        grants,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatekeeper_message::SignatureRequest;
    use pretty_assertions::assert_eq;

    fn signed(request: SignatureRequest, url: &str) -> SignatureRequest {
        let mut request = request;
        request.sign(url).unwrap();
        request
    }

    fn declined(request: SignatureRequest, reason: &str) -> SignatureRequest {
        let mut request = request;
        request.decline(reason).unwrap();
        request
    }

    #[test]
    fn it_rejects_the_whole_batch_on_any_decline() {
        let batch = Batch::new().with_operations([
            Operation::get("1"),
            Operation::get("2"),
            Operation::get("3"),
        ]);
        let requests = batch.to_message().signature_requests().to_vec();
        let response = GatekeeperMessage::signing(vec![
            signed(requests[0].clone(), "https://s/1"),
            declined(requests[1].clone(), "second is private"),
            signed(requests[2].clone(), "https://s/3"),
        ]);

        assert_eq!(
            reconcile(batch.operations(), &response),
            Err(ClientError::BatchRejected("second is private".into()))
        );
    }

    #[test]
    fn it_reports_the_first_decline_reason() {
        let batch = Batch::new().with_operations([Operation::get("1"), Operation::get("2")]);
        let requests = batch.to_message().signature_requests().to_vec();
        let response = GatekeeperMessage::signing(vec![
            declined(requests[0].clone(), "first"),
            declined(requests[1].clone(), "second"),
        ]);

        assert_eq!(
            reconcile(batch.operations(), &response),
            Err(ClientError::BatchRejected("first".into()))
        );
    }

    #[test]
    fn it_treats_undecided_requests_as_denied() {
        let batch = Batch::new().with_operation(Operation::get("1"));
        let response = batch.to_message();

        assert_eq!(
            reconcile(batch.operations(), &response),
            Err(ClientError::BatchRejected(UNDECIDED_REASON.into()))
        );
    }

    #[test]
    fn it_detects_length_mismatch() {
        let batch = Batch::new().with_operations([Operation::get("1"), Operation::get("2")]);
        let requests = batch.to_message().signature_requests().to_vec();
        let response = GatekeeperMessage::signing(vec![signed(requests[0].clone(), "https://s/1")]);

        assert_eq!(
            reconcile(batch.operations(), &response),
            Err(ClientError::IntegrityMismatch {
                sent: 2,
                received: 1
            })
        );
    }

    #[test]
    fn it_checks_the_error_code_before_anything_else() {
        let batch = Batch::new().with_operation(Operation::get("1"));
        let response = GatekeeperMessage::signing(vec![]).with_application_property(
            gatekeeper_message::keys::GATEKEEPER_ERROR_CODE,
            "MalformedMessage",
        );

        assert_eq!(
            reconcile(batch.operations(), &response),
            Err(ClientError::Gatekeeper("MalformedMessage".into()))
        );
    }

    #[test]
    fn it_applies_gatekeeper_rewrites() {
        let batch = Batch::new().with_operation(Operation::put(
            StorageObject::new("a.txt").with_metadata("owner", "alice"),
        ));
        let rewritten = SignatureRequest::new(SignatureType::Put, "users/alice/a.txt")
            .with_bucket_name("uploads")
            .with_metadata("owner", "alice")
            .with_metadata("gatekeeper-transaction-id", "tx-1");
        let response = GatekeeperMessage::signing(vec![signed(rewritten, "https://s/a")])
            .with_message_property(TRANSACTION_ID, "tx-1");

        let authorized = reconcile(batch.operations(), &response).unwrap();
        assert_eq!(authorized.transaction_id(), Some("tx-1"));

        let grant = &authorized.grants()[0];
        assert_eq!(grant.url, "https://s/a");
        assert_eq!(grant.object.key, "users/alice/a.txt");
        assert_eq!(grant.object.bucket.as_deref(), Some("uploads"));
        assert_eq!(
            grant.headers().unwrap(),
            vec![
                ("x-amz-meta-gatekeeper-transaction-id".to_string(), "tx-1".to_string()),
                ("x-amz-meta-owner".to_string(), "alice".to_string()),
            ]
        );
    }
}
