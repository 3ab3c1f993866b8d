use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{self, Display};
use std::str::FromStr;
use thiserror::Error;

/// Storage operation a [`SignatureRequest`] asks to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignatureType {
    /// Download an object.
    Get,
    /// Read object metadata.
    Head,
    /// Upload an object.
    Put,
    /// Remove an object.
    Delete,
    /// Read the access control list of an object.
    AclLookup,
    /// Replace the access control list of an object.
    AclUpdate,
}

impl SignatureType {
    /// Every signature type, in wire order.
    pub const ALL: [SignatureType; 6] = [
        SignatureType::Get,
        SignatureType::Head,
        SignatureType::Put,
        SignatureType::Delete,
        SignatureType::AclLookup,
        SignatureType::AclUpdate,
    ];

    /// Name used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Head => "HEAD",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::AclLookup => "ACL_LOOKUP",
            Self::AclUpdate => "ACL_UPDATE",
        }
    }

    /// HTTP method used against the storage endpoint.
    pub fn method(&self) -> &'static str {
        match self {
            Self::Get | Self::AclLookup => "GET",
            Self::Head => "HEAD",
            Self::Put | Self::AclUpdate => "PUT",
            Self::Delete => "DELETE",
        }
    }

    /// Whether the operation addresses the object's ACL sub-resource.
    pub fn is_acl(&self) -> bool {
        matches!(self, Self::AclLookup | Self::AclUpdate)
    }
}

impl Display for SignatureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string is not one of the closed set of signature types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown signature type '{0}'")]
pub struct UnknownSignatureType(pub String);

impl FromStr for SignatureType {
    type Err = UnknownSignatureType;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == value)
            .ok_or_else(|| UnknownSignatureType(value.to_string()))
    }
}

/// Outcome attached to a [`SignatureRequest`].
///
/// A request leaves the service either [`Decision::Signed`] or
/// [`Decision::Declined`]. A request that comes back [`Decision::Pending`]
/// was never decided and must be treated as denied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    /// Not decided yet.
    #[default]
    Pending,
    /// Approved; the holder of `url` may perform the operation.
    Signed {
        /// Pre-signed URL scoped to this one operation.
        url: String,
    },
    /// Denied for the given human-readable reason.
    Declined {
        /// Why the request was denied.
        reason: String,
    },
}

impl Decision {
    /// Whether the request is still undecided.
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }
}

/// Returned when a decided request is decided again.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecisionError {
    /// The request already carries a terminal decision.
    #[error("Request for '{key}' was already decided as {decision:?}")]
    AlreadyDecided {
        /// Key of the offending request.
        key: String,
        /// The decision that is already in place.
        decision: Decision,
    },
}

/// One desired storage operation on one object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureRequest {
    signature_type: SignatureType,
    object_key: String,
    bucket_name: Option<String>,
    object_metadata: BTreeMap<String, String>,
    decision: Decision,
}

impl SignatureRequest {
    /// Create an undecided request for `object_key` in the default bucket.
    pub fn new(signature_type: SignatureType, object_key: impl Into<String>) -> Self {
        Self {
            signature_type,
            object_key: object_key.into(),
            bucket_name: None,
            object_metadata: BTreeMap::new(),
            decision: Decision::Pending,
        }
    }

    /// Target an explicit bucket.
    pub fn with_bucket_name(mut self, bucket_name: impl Into<String>) -> Self {
        self.bucket_name = Some(bucket_name.into());
        self
    }

    /// Add an object metadata entry.
    pub fn with_metadata(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.object_metadata.insert(name.into(), value.into());
        self
    }

    /// Replace all object metadata.
    pub fn with_object_metadata(mut self, metadata: BTreeMap<String, String>) -> Self {
        self.object_metadata = metadata;
        self
    }

    /// The requested operation.
    pub fn signature_type(&self) -> SignatureType {
        self.signature_type
    }

    /// Key of the object the operation applies to.
    pub fn object_key(&self) -> &str {
        &self.object_key
    }

    /// Bucket of the object; `None` means the service's default bucket.
    pub fn bucket_name(&self) -> Option<&str> {
        self.bucket_name.as_deref()
    }

    /// Object metadata, meaningful for uploads and ACL updates.
    pub fn object_metadata(&self) -> &BTreeMap<String, String> {
        &self.object_metadata
    }

    /// The decision attached to this request.
    pub fn decision(&self) -> &Decision {
        &self.decision
    }

    /// Whether the request was approved and signed.
    pub fn is_signed(&self) -> bool {
        matches!(self.decision, Decision::Signed { .. })
    }

    /// The pre-signed URL, if the request was approved.
    pub fn signed_url(&self) -> Option<&str> {
        match &self.decision {
            Decision::Signed { url } => Some(url),
            _ => None,
        }
    }

    /// The decline reason, if the request was denied.
    pub fn decline_reason(&self) -> Option<&str> {
        match &self.decision {
            Decision::Declined { reason } => Some(reason),
            _ => None,
        }
    }

    /// Replace the object key, e.g. to enforce a naming policy.
    pub fn set_object_key(&mut self, object_key: impl Into<String>) {
        self.object_key = object_key.into();
    }

    /// Replace the bucket name.
    pub fn set_bucket_name(&mut self, bucket_name: Option<String>) {
        self.bucket_name = bucket_name;
    }

    /// Replace the object metadata.
    pub fn set_object_metadata(&mut self, metadata: BTreeMap<String, String>) {
        self.object_metadata = metadata;
    }

    /// Mark the request approved with the given pre-signed URL.
    pub fn sign(&mut self, url: impl Into<String>) -> Result<(), DecisionError> {
        self.decide(Decision::Signed { url: url.into() })
    }

    /// Mark the request denied with the given reason.
    pub fn decline(&mut self, reason: impl Into<String>) -> Result<(), DecisionError> {
        self.decide(Decision::Declined {
            reason: reason.into(),
        })
    }

    fn decide(&mut self, decision: Decision) -> Result<(), DecisionError> {
        if !self.decision.is_pending() {
            return Err(DecisionError::AlreadyDecided {
                key: self.object_key.clone(),
                decision: self.decision.clone(),
            });
        }
        self.decision = decision;
        Ok(())
    }

    /// A copy of this request with its decision cleared.
    ///
    /// Decisions only ever originate at the service, so the service starts
    /// from this form whatever the client sent.
    pub fn undecided(&self) -> Self {
        Self {
            decision: Decision::Pending,
            ..self.clone()
        }
    }

    /// Attach a decision read off the wire, bypassing the write-once check.
    pub(crate) fn with_decision(mut self, decision: Decision) -> Self {
        self.decision = decision;
        self
    }
}
