//! Flat key-value encoding of [`GatekeeperMessage`].
//!
//! A [`Document`] is an ordered list of string pairs. Its text form is
//! `application/x-www-form-urlencoded`, so any value, including control
//! characters, `=`, `&` and `.`, survives a round trip unchanged.
//!
//! # Key layout
//!
//! ```text
//! listObjectsInBucket=true            listing mode flag
//! app.<name>                          application property
//! msg.<name>                          message property
//! sigreq.<i>.type                     GET | HEAD | PUT | DELETE | ACL_LOOKUP | ACL_UPDATE
//! sigreq.<i>.key                      object key
//! sigreq.<i>.bucket                   bucket name (optional)
//! sigreq.<i>.metadata.<name>          object metadata entry
//! sigreq.<i>.signedUrl                set once signed
//! sigreq.<i>.declineReason            set once declined
//! object.<i>.key                      listed object (listing mode only)
//! object.<i>.size | .lastModified | .etag
//! ```
//!
//! Only the fixed prefix is split on `.`; property and metadata names are
//! taken verbatim after it. Indices are decimal without leading zeros and
//! must be contiguous from zero.

use std::collections::{BTreeMap, HashSet};
use std::fmt::{self, Display};
use thiserror::Error;
use url::form_urlencoded;

use crate::keys::{
    APPLICATION_PREFIX, LIST_OBJECTS_IN_BUCKET, MESSAGE_PREFIX, OBJECT_PREFIX, REQUEST_PREFIX,
};
use crate::{Decision, GatekeeperMessage, ListedObject, MessageBody, SignatureRequest};

/// Structural failure while decoding a [`Document`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedMessage {
    /// A key outside every known namespace.
    #[error("Unrecognized key '{0}'")]
    UnknownKey(String),

    /// The same key appears twice.
    #[error("Duplicate key '{0}'")]
    DuplicateKey(String),

    /// An array index that is not a canonical decimal number.
    #[error("Invalid index in key '{0}'")]
    InvalidIndex(String),

    /// Array indices with a gap.
    #[error("Missing {namespace} entry at index {index}")]
    NonContiguous {
        /// `sigreq` or `object`.
        namespace: &'static str,
        /// First missing index.
        index: usize,
    },

    /// A required per-entry field is absent.
    #[error("Entry {namespace}.{index} is missing required field '{field}'")]
    MissingField {
        /// `sigreq` or `object`.
        namespace: &'static str,
        /// Entry index.
        index: usize,
        /// Name of the missing field.
        field: &'static str,
    },

    /// A request type outside the closed enumeration.
    #[error("Signature request {index} has unknown type '{value}'")]
    UnknownSignatureType {
        /// Request index.
        index: usize,
        /// The offending value.
        value: String,
    },

    /// A request that is both signed and declined.
    #[error("Signature request {0} is both signed and declined")]
    ConflictingDecision(usize),

    /// A value that cannot be interpreted for its key.
    #[error("Invalid value '{value}' for key '{key}'")]
    InvalidValue {
        /// The key.
        key: String,
        /// The offending value.
        value: String,
    },

    /// Listing flag and signature requests in one document, or listing
    /// results without the listing flag.
    #[error("Document mixes bucket listing and signature requests")]
    MixedModes,
}

/// Ordered list of key-value pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document(Vec<(String, String)>);

impl Document {
    /// An empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the form-urlencoded text form.
    pub fn parse(text: &str) -> Self {
        Self(
            form_urlencoded::parse(text.trim().as_bytes())
                .map(|(key, value)| (key.into_owned(), value.into_owned()))
                .collect(),
        )
    }

    /// Append a pair.
    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.push((key.into(), value.into()));
    }

    /// All pairs in order.
    pub fn pairs(&self) -> &[(String, String)] {
        &self.0
    }

    /// Number of pairs.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the document holds no pairs.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        for (key, value) in &self.0 {
            serializer.append_pair(key, value);
        }
        f.write_str(&serializer.finish())
    }
}

impl From<Vec<(String, String)>> for Document {
    fn from(pairs: Vec<(String, String)>) -> Self {
        Self(pairs)
    }
}

impl FromIterator<(String, String)> for Document {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl From<&GatekeeperMessage> for Document {
    fn from(message: &GatekeeperMessage) -> Self {
        let mut document = Document::new();

        if message.is_listing() {
            document.push(LIST_OBJECTS_IN_BUCKET, "true");
        }
        for (name, value) in message.application_properties() {
            document.push(format!("{APPLICATION_PREFIX}{name}"), value);
        }
        for (name, value) in message.message_properties() {
            document.push(format!("{MESSAGE_PREFIX}{name}"), value);
        }

        match message.body() {
            MessageBody::Signing(requests) => {
                for (index, request) in requests.iter().enumerate() {
                    encode_request(&mut document, index, request);
                }
            }
            MessageBody::Listing(objects) => {
                for (index, object) in objects.iter().enumerate() {
                    encode_object(&mut document, index, object);
                }
            }
        }

        document
    }
}

fn encode_request(document: &mut Document, index: usize, request: &SignatureRequest) {
    let prefix = format!("{REQUEST_PREFIX}{index}.");
    document.push(format!("{prefix}type"), request.signature_type().as_str());
    document.push(format!("{prefix}key"), request.object_key());
    if let Some(bucket) = request.bucket_name() {
        document.push(format!("{prefix}bucket"), bucket);
    }
    for (name, value) in request.object_metadata() {
        document.push(format!("{prefix}metadata.{name}"), value);
    }
    match request.decision() {
        Decision::Pending => {}
        Decision::Signed { url } => document.push(format!("{prefix}signedUrl"), url),
        Decision::Declined { reason } => document.push(format!("{prefix}declineReason"), reason),
    }
}

fn encode_object(document: &mut Document, index: usize, object: &ListedObject) {
    let prefix = format!("{OBJECT_PREFIX}{index}.");
    document.push(format!("{prefix}key"), &object.key);
    if let Some(size) = object.size {
        document.push(format!("{prefix}size"), size.to_string());
    }
    if let Some(last_modified) = &object.last_modified {
        document.push(format!("{prefix}lastModified"), last_modified);
    }
    if let Some(etag) = &object.etag {
        document.push(format!("{prefix}etag"), etag);
    }
}

/// Request fields collected before validation.
#[derive(Default)]
struct PartialRequest {
    signature_type: Option<String>,
    key: Option<String>,
    bucket: Option<String>,
    metadata: BTreeMap<String, String>,
    signed_url: Option<String>,
    decline_reason: Option<String>,
}

impl TryFrom<Document> for GatekeeperMessage {
    type Error = MalformedMessage;

    fn try_from(document: Document) -> Result<Self, Self::Error> {
        let mut seen = HashSet::with_capacity(document.len());
        let mut listing = false;
        let mut application = BTreeMap::new();
        let mut properties = BTreeMap::new();
        let mut requests: BTreeMap<usize, PartialRequest> = BTreeMap::new();
        let mut objects: BTreeMap<usize, ListedObject> = BTreeMap::new();

        for (key, value) in document.0 {
            if !seen.insert(key.clone()) {
                return Err(MalformedMessage::DuplicateKey(key));
            }

            if key == LIST_OBJECTS_IN_BUCKET {
                listing = match value.as_str() {
                    "true" => true,
                    "false" => false,
                    _ => return Err(MalformedMessage::InvalidValue { key, value }),
                };
            } else if let Some(name) = key.strip_prefix(APPLICATION_PREFIX) {
                application.insert(name.to_string(), value);
            } else if let Some(name) = key.strip_prefix(MESSAGE_PREFIX) {
                properties.insert(name.to_string(), value);
            } else if let Some(rest) = key.strip_prefix(REQUEST_PREFIX) {
                let (index, field) = split_index(rest, &key)?;
                let entry = requests.entry(index).or_default();
                match field {
                    "type" => entry.signature_type = Some(value),
                    "key" => entry.key = Some(value),
                    "bucket" => entry.bucket = Some(value),
                    "signedUrl" => entry.signed_url = Some(value),
                    "declineReason" => entry.decline_reason = Some(value),
                    _ => match field.strip_prefix("metadata.") {
                        Some(name) => {
                            entry.metadata.insert(name.to_string(), value);
                        }
                        None => return Err(MalformedMessage::UnknownKey(key)),
                    },
                }
            } else if let Some(rest) = key.strip_prefix(OBJECT_PREFIX) {
                let (index, field) = split_index(rest, &key)?;
                let entry = objects.entry(index).or_default();
                match field {
                    "key" => entry.key = value,
                    "size" => match value.parse() {
                        Ok(size) => entry.size = Some(size),
                        Err(_) => return Err(MalformedMessage::InvalidValue { key, value }),
                    },
                    "lastModified" => entry.last_modified = Some(value),
                    "etag" => entry.etag = Some(value),
                    _ => return Err(MalformedMessage::UnknownKey(key)),
                }
            } else {
                return Err(MalformedMessage::UnknownKey(key));
            }
        }

        let body = if listing {
            if !requests.is_empty() {
                return Err(MalformedMessage::MixedModes);
            }
            ensure_contiguous("object", objects.keys())?;
            for index in objects.keys() {
                if !seen.contains(&format!("{OBJECT_PREFIX}{index}.key")) {
                    return Err(MalformedMessage::MissingField {
                        namespace: "object",
                        index: *index,
                        field: "key",
                    });
                }
            }
            MessageBody::Listing(objects.into_values().collect())
        } else {
            if !objects.is_empty() {
                return Err(MalformedMessage::MixedModes);
            }
            ensure_contiguous("sigreq", requests.keys())?;
            MessageBody::Signing(
                requests
                    .into_iter()
                    .map(|(index, partial)| build_request(index, partial))
                    .collect::<Result<_, _>>()?,
            )
        };

        Ok(GatekeeperMessage::from_body(body)
            .with_application_properties(application)
            .with_message_properties(properties))
    }
}

impl GatekeeperMessage {
    /// Encode into the form-urlencoded text form.
    pub fn encode(&self) -> String {
        Document::from(self).to_string()
    }

    /// Decode from the form-urlencoded text form.
    pub fn decode(text: &str) -> Result<Self, MalformedMessage> {
        Self::try_from(Document::parse(text))
    }

    fn with_message_properties(self, properties: BTreeMap<String, String>) -> Self {
        properties
            .into_iter()
            .fold(self, |message, (name, value)| {
                message.with_message_property(name, value)
            })
    }
}

/// Split `<i>.<field>` into a canonical index and the field name.
fn split_index<'a>(rest: &'a str, key: &str) -> Result<(usize, &'a str), MalformedMessage> {
    let invalid = || MalformedMessage::InvalidIndex(key.to_string());
    let (index, field) = rest.split_once('.').ok_or_else(invalid)?;

    let canonical = !index.is_empty()
        && index.bytes().all(|byte| byte.is_ascii_digit())
        && (index == "0" || !index.starts_with('0'));
    if !canonical {
        return Err(invalid());
    }

    Ok((index.parse().map_err(|_| invalid())?, field))
}

fn ensure_contiguous<'a>(
    namespace: &'static str,
    indices: impl Iterator<Item = &'a usize>,
) -> Result<(), MalformedMessage> {
    for (expected, index) in indices.enumerate() {
        if *index != expected {
            return Err(MalformedMessage::NonContiguous {
                namespace,
                index: expected,
            });
        }
    }
    Ok(())
}

fn build_request(index: usize, partial: PartialRequest) -> Result<SignatureRequest, MalformedMessage> {
    let missing = |field| MalformedMessage::MissingField {
        namespace: "sigreq",
        index,
        field,
    };

    let value = partial.signature_type.ok_or_else(|| missing("type"))?;
    let signature_type = value
        .parse()
        .map_err(|_| MalformedMessage::UnknownSignatureType { index, value })?;
    let key = partial.key.ok_or_else(|| missing("key"))?;

    let decision = match (partial.signed_url, partial.decline_reason) {
        (Some(_), Some(_)) => return Err(MalformedMessage::ConflictingDecision(index)),
        (Some(url), None) => Decision::Signed { url },
        (None, Some(reason)) => Decision::Declined { reason },
        (None, None) => Decision::Pending,
    };

    let mut request = SignatureRequest::new(signature_type, key)
        .with_object_metadata(partial.metadata)
        .with_decision(decision);
    request.set_bucket_name(partial.bucket);
    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SignatureType;

    fn pairs(items: &[(&str, &str)]) -> Document {
        items
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }

    #[test]
    fn it_namespaces_keys() {
        let message = GatekeeperMessage::signing(vec![
            SignatureRequest::new(SignatureType::Put, "a.txt")
                .with_bucket_name("photos")
                .with_metadata("content-type", "text/plain"),
        ])
        .with_application_property("foo", "bar")
        .with_message_property("transactionId", "tx");

        let document = Document::from(&message);
        let keys: Vec<&str> = document.pairs().iter().map(|(k, _)| k.as_str()).collect();

        assert_eq!(
            keys,
            vec![
                "app.foo",
                "msg.transactionId",
                "sigreq.0.type",
                "sigreq.0.key",
                "sigreq.0.bucket",
                "sigreq.0.metadata.content-type",
            ]
        );
    }

    #[test]
    fn it_escapes_delimiters_in_values() {
        let message = GatekeeperMessage::signing(vec![SignatureRequest::new(
            SignatureType::Get,
            "odd key=&.%+\n\r\t\u{0}",
        )]);

        let text = message.encode();
        assert!(!text.contains('\n'));
        assert_eq!(GatekeeperMessage::decode(&text).unwrap(), message);
    }

    #[test]
    fn it_accepts_any_key_order() {
        let document = pairs(&[
            ("sigreq.1.key", "b"),
            ("sigreq.0.type", "GET"),
            ("sigreq.1.type", "HEAD"),
            ("sigreq.0.key", "a"),
        ]);

        let message = GatekeeperMessage::try_from(document).unwrap();
        let keys: Vec<&str> = message
            .signature_requests()
            .iter()
            .map(|r| r.object_key())
            .collect();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[test]
    fn it_rejects_gaps_in_indices() {
        let document = pairs(&[
            ("sigreq.0.type", "GET"),
            ("sigreq.0.key", "a"),
            ("sigreq.2.type", "GET"),
            ("sigreq.2.key", "c"),
        ]);

        assert_eq!(
            GatekeeperMessage::try_from(document),
            Err(MalformedMessage::NonContiguous {
                namespace: "sigreq",
                index: 1
            })
        );
    }

    #[test]
    fn it_rejects_non_canonical_indices() {
        let document = pairs(&[("sigreq.00.type", "GET"), ("sigreq.00.key", "a")]);
        assert!(matches!(
            GatekeeperMessage::try_from(document),
            Err(MalformedMessage::InvalidIndex(_))
        ));

        let document = pairs(&[("sigreq.x.type", "GET")]);
        assert!(matches!(
            GatekeeperMessage::try_from(document),
            Err(MalformedMessage::InvalidIndex(_))
        ));
    }

    #[test]
    fn it_requires_type() {
        let document = pairs(&[("sigreq.0.key", "a")]);
        assert_eq!(
            GatekeeperMessage::try_from(document),
            Err(MalformedMessage::MissingField {
                namespace: "sigreq",
                index: 0,
                field: "type"
            })
        );
    }

    #[test]
    fn it_rejects_unknown_type() {
        let document = pairs(&[("sigreq.0.type", "COPY"), ("sigreq.0.key", "a")]);
        assert_eq!(
            GatekeeperMessage::try_from(document),
            Err(MalformedMessage::UnknownSignatureType {
                index: 0,
                value: "COPY".into()
            })
        );
    }

    #[test]
    fn it_rejects_listing_with_requests() {
        let document = pairs(&[
            ("listObjectsInBucket", "true"),
            ("sigreq.0.type", "GET"),
            ("sigreq.0.key", "a"),
        ]);
        assert_eq!(
            GatekeeperMessage::try_from(document),
            Err(MalformedMessage::MixedModes)
        );
    }

    #[test]
    fn it_rejects_listing_results_without_flag() {
        let document = pairs(&[("object.0.key", "a")]);
        assert_eq!(
            GatekeeperMessage::try_from(document),
            Err(MalformedMessage::MixedModes)
        );
    }

    #[test]
    fn it_rejects_conflicting_decisions() {
        let document = pairs(&[
            ("sigreq.0.type", "GET"),
            ("sigreq.0.key", "a"),
            ("sigreq.0.signedUrl", "https://example.com"),
            ("sigreq.0.declineReason", "no"),
        ]);
        assert_eq!(
            GatekeeperMessage::try_from(document),
            Err(MalformedMessage::ConflictingDecision(0))
        );
    }

    #[test]
    fn it_rejects_duplicates_and_strangers() {
        let document = pairs(&[("app.a", "1"), ("app.a", "2")]);
        assert_eq!(
            GatekeeperMessage::try_from(document),
            Err(MalformedMessage::DuplicateKey("app.a".into()))
        );

        let document = pairs(&[("unknown", "1")]);
        assert_eq!(
            GatekeeperMessage::try_from(document),
            Err(MalformedMessage::UnknownKey("unknown".into()))
        );

        let document = pairs(&[("listObjectsInBucket", "yes")]);
        assert!(matches!(
            GatekeeperMessage::try_from(document),
            Err(MalformedMessage::InvalidValue { .. })
        ));
    }

    #[test]
    fn it_requires_listed_object_key() {
        let document = pairs(&[("listObjectsInBucket", "true"), ("object.0.size", "10")]);
        assert_eq!(
            GatekeeperMessage::try_from(document),
            Err(MalformedMessage::MissingField {
                namespace: "object",
                index: 0,
                field: "key"
            })
        );
    }

    #[test]
    fn it_decodes_empty_document_as_empty_batch() {
        let message = GatekeeperMessage::decode("").unwrap();
        assert_eq!(message, GatekeeperMessage::signing(vec![]));
    }
}
