use gatekeeper_message::keys::{GATEKEEPER_ERROR_CODE, TRANSACTION_ID};
use gatekeeper_message::{GatekeeperMessage, MessageBody, SignatureRequest};
use gatekeeper_policy::{
    ClientInformation, GatekeeperConfig, InitializationError, Policy, Registry,
    TransactionIdProvider, UlidTransactionIds, Verdict,
};

use crate::ErrorCode;

/// Decline reason used when an authorizer refuses without giving one.
pub const UNKNOWN_DECLINE_REASON: &str = "Unknown";

/// Encoded response to one exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    status: u16,
    body: String,
}

impl Reply {
    fn from_message(message: &GatekeeperMessage) -> Self {
        let status = message
            .error_code()
            .and_then(|code| code.parse::<ErrorCode>().ok())
            .map(|code| code.status_code())
            .unwrap_or(200);
        Self {
            status,
            body: message.encode(),
        }
    }

    /// A reply carrying only `code`, for failures that leave no message to
    /// answer with.
    pub fn error(code: ErrorCode) -> Self {
        Self::from_message(
            &GatekeeperMessage::signing(Vec::new())
                .with_application_property(GATEKEEPER_ERROR_CODE, code.as_str()),
        )
    }

    /// HTTP status to send the body with.
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Encoded response document.
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Take the encoded response document.
    pub fn into_body(self) -> String {
        self.body
    }
}

enum State {
    Ready(Policy),
    Failed(InitializationError),
}

/// Server side of the protocol.
///
/// Each exchange runs the same pipeline: decode, assign a transaction id,
/// then either authorize and list, or authorize and sign every request in
/// order, and finally encode. The inbound message is never modified once the
/// transaction id is in place; decisions accumulate in a separate outbound
/// list that replaces the request batch when the response is assembled.
///
/// A coordinator holds no per-exchange state and can serve any number of
/// exchanges concurrently.
pub struct Coordinator {
    state: State,
}

impl Coordinator {
    /// Serve with `policy`.
    pub fn new(policy: Policy) -> Self {
        Self {
            state: State::Ready(policy),
        }
    }

    /// Serve in the failed-initialization state: every exchange gets a
    /// transaction id and the `GatekeeperInitializationError` code, and no
    /// request is decided.
    pub fn failed(error: InitializationError) -> Self {
        Self {
            state: State::Failed(error),
        }
    }

    /// Resolve `config` against `registry`, falling back to the
    /// failed-initialization state if that does not succeed.
    pub fn from_config(registry: &Registry, config: &GatekeeperConfig) -> Self {
        match registry.resolve(config) {
            Ok(policy) => Self::new(policy),
            Err(error) => {
                tracing::error!(%error, "Failed to initialize gatekeeper policy");
                Self::failed(error)
            }
        }
    }

    /// The startup failure, if the coordinator is not serving normally.
    pub fn initialization_error(&self) -> Option<&InitializationError> {
        match &self.state {
            State::Ready(_) => None,
            State::Failed(error) => Some(error),
        }
    }

    /// Handle one encoded request document.
    pub async fn handle(&self, body: &str, client: &ClientInformation) -> Reply {
        match GatekeeperMessage::decode(body) {
            Ok(inbound) => Reply::from_message(&self.process(inbound, client).await),
            Err(error) => {
                tracing::warn!(%error, remote = ?client.remote_address(), "Rejecting malformed message");
                Reply::error(ErrorCode::MalformedMessage)
            }
        }
    }

    /// Run the dispatch pipeline on a decoded message and return the
    /// response message.
    ///
    /// Faults do not escape: they are reported through the reserved error
    /// code property of the returned message. Only the coordinator sets that
    /// property; a value sent by the client is dropped.
    pub async fn process(
        &self,
        inbound: GatekeeperMessage,
        client: &ClientInformation,
    ) -> GatekeeperMessage {
        let inbound = inbound.without_application_property(GATEKEEPER_ERROR_CODE);

        let policy = match &self.state {
            State::Ready(policy) => policy,
            State::Failed(_) => {
                let inbound = assign_transaction_id(&UlidTransactionIds, inbound, client).await;
                return fault(inbound, ErrorCode::GatekeeperInitializationError);
            }
        };

        let inbound = assign_transaction_id(policy.transaction_ids(), inbound, client).await;

        let outbound = match inbound.body() {
            MessageBody::Listing(_) => list(policy, &inbound, client).await,
            MessageBody::Signing(requests) => sign(policy, &inbound, client, requests).await,
        };

        match outbound {
            Ok(body) => inbound.with_body(body),
            Err(code) => fault(inbound, code),
        }
    }
}

async fn assign_transaction_id(
    provider: &dyn TransactionIdProvider,
    inbound: GatekeeperMessage,
    client: &ClientInformation,
) -> GatekeeperMessage {
    let transaction_id = provider.transaction_id(&inbound, client).await;
    if transaction_id.is_empty() {
        inbound
    } else {
        inbound.with_message_property(TRANSACTION_ID, transaction_id)
    }
}

async fn list(
    policy: &Policy,
    inbound: &GatekeeperMessage,
    client: &ClientInformation,
) -> Result<MessageBody, ErrorCode> {
    let transaction_id = inbound.transaction_id().unwrap_or_default();

    match policy
        .authorizer()
        .allow_bucket_listing_request(inbound, client)
        .await
    {
        Verdict::Allow => {}
        Verdict::Deny { reason } => {
            tracing::info!(transaction_id, ?reason, "Bucket listing refused");
            return Ok(MessageBody::Listing(Vec::new()));
        }
    }

    match policy.bucket_lister().list_objects(inbound, client).await {
        Ok(objects) => {
            tracing::info!(transaction_id, objects = objects.len(), "Listed bucket");
            Ok(MessageBody::Listing(objects))
        }
        Err(error) => {
            tracing::error!(transaction_id, %error, "Bucket listing failed");
            Err(ErrorCode::ListingFailure)
        }
    }
}

async fn sign(
    policy: &Policy,
    inbound: &GatekeeperMessage,
    client: &ClientInformation,
    requests: &[SignatureRequest],
) -> Result<MessageBody, ErrorCode> {
    let transaction_id = inbound.transaction_id().unwrap_or_default();
    let mut outbound = Vec::with_capacity(requests.len());
    let mut declined = 0;

    for (index, request) in requests.iter().enumerate() {
        let mut request = request.undecided();
        let verdict = policy
            .authorizer()
            .allow_signature_request(inbound, client, &request)
            .await;

        let decided = match verdict {
            Verdict::Allow => {
                let signature = policy
                    .url_signer()
                    .sign(inbound, client, &request)
                    .await
                    .map_err(|error| {
                        tracing::error!(transaction_id, index, %error, "Signing failed");
                        ErrorCode::SigningFailure
                    })?;
                tracing::debug!(transaction_id, index, key = request.object_key(), "Signed");
                signature.apply(&request).map_err(|error| {
                    tracing::error!(transaction_id, index, %error, "Could not record signature");
                    ErrorCode::InternalError
                })?
            }
            Verdict::Deny { reason } => {
                let reason = reason.unwrap_or_else(|| UNKNOWN_DECLINE_REASON.to_string());
                tracing::warn!(transaction_id, index, key = request.object_key(), %reason, "Declined");
                request.decline(reason).map_err(|error| {
                    tracing::error!(transaction_id, index, %error, "Could not record decline");
                    ErrorCode::InternalError
                })?;
                declined += 1;
                request
            }
        };
        outbound.push(decided);
    }

    tracing::info!(
        transaction_id,
        requests = outbound.len(),
        declined,
        "Processed signature requests"
    );
    Ok(MessageBody::Signing(outbound))
}

/// `message` with the error code attached and no decisions.
fn fault(message: GatekeeperMessage, code: ErrorCode) -> GatekeeperMessage {
    let body = match message.body() {
        MessageBody::Signing(requests) => {
            MessageBody::Signing(requests.iter().map(SignatureRequest::undecided).collect())
        }
        MessageBody::Listing(_) => MessageBody::Listing(Vec::new()),
    };
    message
        .with_body(body)
        .with_application_property(GATEKEEPER_ERROR_CODE, code.as_str())
}
