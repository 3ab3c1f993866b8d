//! Reserved names that are part of the wire contract.
//!
//! Renaming any of these breaks interoperability with deployed clients and
//! services.

/// Message property holding the transaction id assigned by the service.
pub const TRANSACTION_ID: &str = "transactionId";

/// Application property set by the service when it could not process the
/// message at all.
pub const GATEKEEPER_ERROR_CODE: &str = "gatekeeperErrorCode";

/// Top-level key that switches a document into bucket-listing mode.
pub const LIST_OBJECTS_IN_BUCKET: &str = "listObjectsInBucket";

/// Application property identifying the client build that sent the message.
pub const CLIENT_VERSION_ID: &str = "clientVersionId";

/// Application property describing why the previous attempt failed.
pub const PRIOR_FAILURE_MESSAGE: &str = "priorFailureMessage";

/// Object metadata key marking a derived (manifest) object.
pub const MANIFEST_METADATA_FLAG: &str = "gatekeeper-manifest";

/// Object metadata key under which the default signer stamps the transaction id.
pub const TRANSACTION_ID_METADATA: &str = "gatekeeper-transaction-id";

/// Namespace prefix of application properties.
pub(crate) const APPLICATION_PREFIX: &str = "app.";

/// Namespace prefix of message properties.
pub(crate) const MESSAGE_PREFIX: &str = "msg.";

/// Namespace prefix of signature requests.
pub(crate) const REQUEST_PREFIX: &str = "sigreq.";

/// Namespace prefix of listed objects.
pub(crate) const OBJECT_PREFIX: &str = "object.";
