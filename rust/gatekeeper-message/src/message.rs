use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::SignatureRequest;
use crate::keys::{GATEKEEPER_ERROR_CODE, TRANSACTION_ID};

/// One entry of a bucket listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListedObject {
    /// Object key.
    pub key: String,
    /// Size in bytes, when known.
    pub size: Option<u64>,
    /// Last modification time as reported by the storage service.
    pub last_modified: Option<String>,
    /// Entity tag as reported by the storage service.
    pub etag: Option<String>,
}

impl ListedObject {
    /// Create an entry with only a key.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Default::default()
        }
    }

    /// Set the size.
    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }
}

/// What a [`GatekeeperMessage`] is about.
///
/// A message asks either for a batch of signatures or for a bucket listing,
/// never both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageBody {
    /// Signature requests, index-aligned with the client's own objects.
    Signing(Vec<SignatureRequest>),
    /// Bucket listing; empty until the service fills it in.
    Listing(Vec<ListedObject>),
}

/// Unit of exchange between gatekeeper client and service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatekeeperMessage {
    application_properties: BTreeMap<String, String>,
    message_properties: BTreeMap<String, String>,
    body: MessageBody,
}

impl GatekeeperMessage {
    /// A message carrying the given signature requests.
    pub fn signing(requests: Vec<SignatureRequest>) -> Self {
        Self::from_body(MessageBody::Signing(requests))
    }

    /// A bucket-listing request.
    pub fn listing() -> Self {
        Self::from_body(MessageBody::Listing(Vec::new()))
    }

    /// A message with the given body and no properties.
    pub fn from_body(body: MessageBody) -> Self {
        Self {
            application_properties: BTreeMap::new(),
            message_properties: BTreeMap::new(),
            body,
        }
    }

    /// Add an application property.
    pub fn with_application_property(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.application_properties
            .insert(name.into(), value.into());
        self
    }

    /// Add every entry of `properties` as an application property.
    pub fn with_application_properties<I, K, V>(mut self, properties: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.application_properties.extend(
            properties
                .into_iter()
                .map(|(name, value)| (name.into(), value.into())),
        );
        self
    }

    /// Remove an application property, if present.
    pub fn without_application_property(mut self, name: &str) -> Self {
        self.application_properties.remove(name);
        self
    }

    /// Add a message property.
    pub fn with_message_property(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.message_properties.insert(name.into(), value.into());
        self
    }

    /// Replace the body, keeping all properties.
    pub fn with_body(mut self, body: MessageBody) -> Self {
        self.body = body;
        self
    }

    /// Caller-defined properties.
    pub fn application_properties(&self) -> &BTreeMap<String, String> {
        &self.application_properties
    }

    /// Protocol metadata.
    pub fn message_properties(&self) -> &BTreeMap<String, String> {
        &self.message_properties
    }

    /// Look up one application property.
    pub fn application_property(&self, name: &str) -> Option<&str> {
        self.application_properties.get(name).map(String::as_str)
    }

    /// Look up one message property.
    pub fn message_property(&self, name: &str) -> Option<&str> {
        self.message_properties.get(name).map(String::as_str)
    }

    /// The transaction id, if one was assigned and is non-empty.
    pub fn transaction_id(&self) -> Option<&str> {
        self.message_property(TRANSACTION_ID)
            .filter(|id| !id.is_empty())
    }

    /// The error code the service attached, if any.
    pub fn error_code(&self) -> Option<&str> {
        self.application_property(GATEKEEPER_ERROR_CODE)
    }

    /// The message body.
    pub fn body(&self) -> &MessageBody {
        &self.body
    }

    /// Whether this is a bucket-listing message.
    pub fn is_listing(&self) -> bool {
        matches!(self.body, MessageBody::Listing(_))
    }

    /// Signature requests; empty for a listing message.
    pub fn signature_requests(&self) -> &[SignatureRequest] {
        match &self.body {
            MessageBody::Signing(requests) => requests,
            MessageBody::Listing(_) => &[],
        }
    }

    /// Listed objects; empty for a signing message.
    pub fn listed_objects(&self) -> &[ListedObject] {
        match &self.body {
            MessageBody::Listing(objects) => objects,
            MessageBody::Signing(_) => &[],
        }
    }

    /// Consume the message, keeping only its body.
    pub fn into_body(self) -> MessageBody {
        self.body
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SignatureType;

    #[test]
    fn it_keeps_listing_and_signing_apart() {
        let listing = GatekeeperMessage::listing();
        assert!(listing.is_listing());
        assert!(listing.signature_requests().is_empty());

        let signing =
            GatekeeperMessage::signing(vec![SignatureRequest::new(SignatureType::Get, "a")]);
        assert!(!signing.is_listing());
        assert!(signing.listed_objects().is_empty());
        assert_eq!(signing.signature_requests().len(), 1);
    }

    #[test]
    fn it_treats_empty_transaction_id_as_absent() {
        let message = GatekeeperMessage::listing().with_message_property(TRANSACTION_ID, "");
        assert_eq!(message.transaction_id(), None);

        let message = message.with_message_property(TRANSACTION_ID, "tx-1");
        assert_eq!(message.transaction_id(), Some("tx-1"));
    }

    #[test]
    fn it_reads_error_code() {
        let message = GatekeeperMessage::signing(vec![])
            .with_application_property(GATEKEEPER_ERROR_CODE, "SigningFailure")
            .with_application_property("uploader", "desktop");
        assert_eq!(message.error_code(), Some("SigningFailure"));

        let message = message.without_application_property(GATEKEEPER_ERROR_CODE);
        assert_eq!(message.error_code(), None);
        assert_eq!(message.application_property("uploader"), Some("desktop"));
    }
}
