use std::collections::BTreeMap;

use gatekeeper_message::keys::{CLIENT_VERSION_ID, PRIOR_FAILURE_MESSAGE};
use gatekeeper_message::{GatekeeperMessage, SignatureRequest, SignatureType};

/// Value sent under the client-version application property.
pub const CLIENT_VERSION: &str = concat!("gatekeeper-client/", env!("CARGO_PKG_VERSION"));

/// The caller's local view of one storage object.
///
/// The gatekeeper may rewrite the key, bucket and metadata when it signs;
/// the rewritten object is what the storage operation must use.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageObject {
    /// Object key.
    pub key: String,
    /// Bucket, `None` for the gatekeeper's default bucket.
    pub bucket: Option<String>,
    /// Object metadata.
    pub metadata: BTreeMap<String, String>,
}

impl StorageObject {
    /// An object in the default bucket with no metadata.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Default::default()
        }
    }

    /// Target `bucket`.
    pub fn with_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = Some(bucket.into());
        self
    }

    /// Add a metadata entry.
    pub fn with_metadata(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(name.into(), value.into());
        self
    }
}

/// One storage operation the caller wants to perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    signature_type: SignatureType,
    object: StorageObject,
}

impl Operation {
    /// `signature_type` on `object`.
    pub fn new(signature_type: SignatureType, object: StorageObject) -> Self {
        Self {
            signature_type,
            object,
        }
    }

    /// Download `key`.
    pub fn get(key: impl Into<String>) -> Self {
        Self::new(SignatureType::Get, StorageObject::new(key))
    }

    /// Fetch headers of `key`.
    pub fn head(key: impl Into<String>) -> Self {
        Self::new(SignatureType::Head, StorageObject::new(key))
    }

    /// Upload `object`.
    pub fn put(object: StorageObject) -> Self {
        Self::new(SignatureType::Put, object)
    }

    /// Delete `key`.
    pub fn delete(key: impl Into<String>) -> Self {
        Self::new(SignatureType::Delete, StorageObject::new(key))
    }

    /// Read the ACL of `key`.
    pub fn acl_lookup(key: impl Into<String>) -> Self {
        Self::new(SignatureType::AclLookup, StorageObject::new(key))
    }

    /// Replace the ACL of `object`.
    pub fn acl_update(object: StorageObject) -> Self {
        Self::new(SignatureType::AclUpdate, object)
    }

    /// Requested operation.
    pub fn signature_type(&self) -> SignatureType {
        self.signature_type
    }

    /// Target object.
    pub fn object(&self) -> &StorageObject {
        &self.object
    }

    pub(crate) fn object_mut(&mut self) -> &mut StorageObject {
        &mut self.object
    }

    pub(crate) fn to_request(&self) -> SignatureRequest {
        let request = SignatureRequest::new(self.signature_type, self.object.key.clone())
            .with_object_metadata(self.object.metadata.clone());
        match &self.object.bucket {
            Some(bucket) => request.with_bucket_name(bucket.clone()),
            None => request,
        }
    }
}

/// Operations authorized together in one exchange.
///
/// The gatekeeper's answer is all-or-nothing: one declined operation rejects
/// the batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    operations: Vec<Operation>,
    application_properties: BTreeMap<String, String>,
    prior_failure: Option<String>,
}

impl Batch {
    /// An empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an operation.
    pub fn with_operation(mut self, operation: Operation) -> Self {
        self.operations.push(operation);
        self
    }

    /// Add several operations, in order.
    pub fn with_operations(mut self, operations: impl IntoIterator<Item = Operation>) -> Self {
        self.operations.extend(operations);
        self
    }

    /// Pass an application property to the gatekeeper's policy.
    pub fn with_application_property(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.application_properties.insert(name.into(), value.into());
        self
    }

    /// Tell the gatekeeper why the previous attempt at this batch failed.
    pub fn with_prior_failure(mut self, message: impl Into<String>) -> Self {
        self.prior_failure = Some(message.into());
        self
    }

    /// Operations in request order.
    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    /// Number of operations.
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Whether the batch has no operations.
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub(crate) fn to_message(&self) -> GatekeeperMessage {
        let message = GatekeeperMessage::signing(
            self.operations.iter().map(Operation::to_request).collect(),
        )
        .with_application_properties(self.application_properties.clone())
        .with_application_property(CLIENT_VERSION_ID, CLIENT_VERSION);

        match &self.prior_failure {
            Some(failure) => message.with_application_property(PRIOR_FAILURE_MESSAGE, failure.clone()),
            None => message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn it_builds_one_request_per_operation_in_order() {
        let batch = Batch::new()
            .with_operation(Operation::put(
                StorageObject::new("a.txt")
                    .with_bucket("uploads")
                    .with_metadata("owner", "alice"),
            ))
            .with_operation(Operation::delete("b.txt"))
            .with_application_property("uploader", "desktop");

        let message = batch.to_message();
        let requests = message.signature_requests();

        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].signature_type(), SignatureType::Put);
        assert_eq!(requests[0].bucket_name(), Some("uploads"));
        assert_eq!(
            requests[0].object_metadata().get("owner").map(String::as_str),
            Some("alice")
        );
        assert_eq!(requests[1].signature_type(), SignatureType::Delete);
        assert_eq!(requests[1].object_key(), "b.txt");
        assert_eq!(message.application_property("uploader"), Some("desktop"));
        assert_eq!(message.application_property(CLIENT_VERSION_ID), Some(CLIENT_VERSION));
        assert_eq!(message.application_property(PRIOR_FAILURE_MESSAGE), None);
    }

    #[test]
    fn it_reports_prior_failure() {
        let message = Batch::new()
            .with_operation(Operation::get("a.txt"))
            .with_prior_failure("connection reset")
            .to_message();
        assert_eq!(
            message.application_property(PRIOR_FAILURE_MESSAGE),
            Some("connection reset")
        );
    }

    #[test]
    fn it_marks_client_version() {
        assert!(CLIENT_VERSION.starts_with("gatekeeper-client/"));
    }
}
