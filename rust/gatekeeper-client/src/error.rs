use gatekeeper_message::MalformedMessage;
use gatekeeper_policy::SigningFailure;
use thiserror::Error;

use crate::TransportError;

/// Why a batch could not be authorized.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// The exchange with the gatekeeper did not complete.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The gatekeeper's answer could not be decoded.
    #[error("Malformed gatekeeper response: {0}")]
    Malformed(#[from] MalformedMessage),

    /// The answer does not line up with the request. Never retried.
    #[error("Gatekeeper answered {received} requests for {sent} sent")]
    IntegrityMismatch {
        /// Requests sent.
        sent: usize,
        /// Requests in the response.
        received: usize,
    },

    /// The gatekeeper could not process the message at all.
    #[error("Gatekeeper reported error code {0}")]
    Gatekeeper(String),

    /// At least one operation was declined; carries the first reason.
    #[error("Batch rejected: {0}")]
    BatchRejected(String),

    /// A derived object was requested after a batch that has no
    /// transaction id.
    #[error("Derived object requires the transaction id of its primary batch")]
    MissingTransactionId,

    /// Local signing with the caller's own credentials failed.
    #[error("Self-authorization failed: {0}")]
    SelfAuthorize(#[from] SigningFailure),

    /// Listings are only produced by a remote gatekeeper.
    #[error("Bucket listing requires a remote gatekeeper")]
    ListingUnavailable,
}
