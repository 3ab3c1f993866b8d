//! S3 credentials and SigV4 query-string signing.

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt::Write;
use url::Url;

use crate::{Address, Presign, SigningError, build_url, extract_host, is_path_style_default};

/// Serialization helper for [`Credentials`].
#[derive(Serialize, Deserialize)]
struct CredentialsSerde {
    address: Address,
    access_key_id: String,
    secret_access_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    path_style: Option<bool>,
}

/// S3 credentials with AWS SigV4 signing.
///
/// Holds both the key pair and the [`Address`] it applies to, which makes it
/// a complete configuration for presigning requests against one service.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// AWS Access Key ID
    access_key_id: String,
    /// AWS Secret Access Key
    secret_access_key: String,
    /// S3 address (endpoint, region, default bucket)
    address: Address,
    /// Parsed endpoint URL
    endpoint: Url,
    /// Whether to use path-style URLs
    path_style: bool,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("address", &self.address)
            .field("path_style", &self.path_style)
            .finish_non_exhaustive()
    }
}

impl Serialize for Credentials {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let helper = CredentialsSerde {
            address: self.address.clone(),
            access_key_id: self.access_key_id.clone(),
            secret_access_key: self.secret_access_key.clone(),
            path_style: Some(self.path_style),
        };
        helper.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Credentials {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let helper = CredentialsSerde::deserialize(deserializer)?;
        let credentials = Credentials::new(
            helper.address,
            helper.access_key_id,
            helper.secret_access_key,
        )
        .map_err(serde::de::Error::custom)?;

        Ok(match helper.path_style {
            Some(path_style) => credentials.with_path_style(path_style),
            None => credentials,
        })
    }
}

impl Credentials {
    /// Create new credentials with AWS SigV4 signing.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint URL in the address is invalid.
    pub fn new(
        address: Address,
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
    ) -> Result<Self, SigningError> {
        let endpoint = Url::parse(address.endpoint())
            .map_err(|e| SigningError::Configuration(e.to_string()))?;
        let path_style = is_path_style_default(&endpoint);

        Ok(Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            address,
            endpoint,
            path_style,
        })
    }

    /// Set whether to use path-style URLs.
    ///
    /// - `true`: Use path-style URLs (`https://endpoint/bucket/key`)
    /// - `false`: Use virtual-hosted style URLs (`https://bucket.endpoint/key`)
    ///
    /// By default, path-style is enabled for IP addresses and localhost.
    pub fn with_path_style(mut self, path_style: bool) -> Self {
        self.path_style = path_style;
        self
    }

    /// Get the access key ID.
    pub fn access_key_id(&self) -> &str {
        &self.access_key_id
    }

    /// Get the address.
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Get the region.
    pub fn region(&self) -> &str {
        self.address.region()
    }

    /// Get the default bucket name.
    pub fn bucket(&self) -> &str {
        self.address.bucket()
    }

    /// Produce a presigned URL for `request`.
    ///
    /// Derives the signing key on demand from the request's signing time.
    /// Headers listed in the request are signed, so the holder must send
    /// them with exactly these values.
    pub fn presign(&self, request: &Presign) -> Result<Url, SigningError> {
        let timestamp = request.time().format("%Y%m%dT%H%M%SZ").to_string();
        let date = &timestamp[0..8];
        let region = self.region();
        let service = "s3";

        let key = SigningKey::derive(&self.secret_access_key, date, region, service);
        let scope = format!("{}/{}/{}/aws4_request", date, region, service);

        let bucket = request.bucket().unwrap_or_else(|| self.bucket());
        let url = build_url(&self.endpoint, bucket, request.key(), self.path_style)?;
        let host = extract_host(&url)?;

        // Build signed headers
        let mut headers = vec![("host".to_string(), host)];
        headers.extend(request.headers().iter().cloned());
        headers.sort_by(|a, b| a.0.cmp(&b.0));

        let signed_headers: String = headers
            .iter()
            .map(|(k, _)| k.as_str())
            .collect::<Vec<_>>()
            .join(";");

        let mut query_params: Vec<(String, String)> = vec![
            ("X-Amz-Algorithm".into(), "AWS4-HMAC-SHA256".into()),
            (
                "X-Amz-Credential".into(),
                format!("{}/{}", self.access_key_id, scope),
            ),
            ("X-Amz-Date".into(), timestamp.clone()),
            ("X-Amz-Expires".into(), request.expires().to_string()),
            ("X-Amz-SignedHeaders".into(), signed_headers.clone()),
        ];
        query_params.extend(request.params().iter().cloned());

        // Sort all query parameters alphabetically (required by SigV4)
        query_params.sort();

        let canonical_query: String = query_params
            .iter()
            .map(|(k, v)| format!("{}={}", percent_encode(k), percent_encode(v)))
            .collect::<Vec<_>>()
            .join("&");

        let canonical_headers: String = headers
            .iter()
            .map(|(k, v)| format!("{}:{}", k, v.trim()))
            .collect::<Vec<_>>()
            .join("\n");

        let canonical_request = format!(
            "{}\n{}\n{}\n{}\n\n{}\nUNSIGNED-PAYLOAD",
            request.method(),
            url.path(),
            canonical_query,
            canonical_headers,
            signed_headers
        );

        let digest = Sha256::digest(canonical_request.as_bytes());
        let payload = format!(
            "AWS4-HMAC-SHA256\n{}\n{}\n{}",
            timestamp,
            scope,
            hex_encode(&digest)
        );

        let signature = key.sign(payload.as_bytes());

        let mut url = url;
        url.set_query(Some(&format!(
            "{}&X-Amz-Signature={}",
            canonical_query, signature
        )));
        Ok(url)
    }
}

/// AWS SigV4 signing key.
///
/// Derived through an HMAC chain:
/// `HMAC(HMAC(HMAC(HMAC("AWS4" + secret, date), region), service), "aws4_request")`
struct SigningKey(Vec<u8>);

impl SigningKey {
    fn derive(secret_key: &str, date: &str, region: &str, service: &str) -> Self {
        let date_key = hmac_sha256(format!("AWS4{}", secret_key).as_bytes(), date.as_bytes());
        let region_key = hmac_sha256(&date_key, region.as_bytes());
        let service_key = hmac_sha256(&region_key, service.as_bytes());
        Self(hmac_sha256(&service_key, b"aws4_request"))
    }

    fn sign(&self, message: &[u8]) -> Signature {
        Signature(hmac_sha256(&self.0, message))
    }
}

/// AWS SigV4 signature.
struct Signature(Vec<u8>);

impl std::fmt::Display for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&hex_encode(&self.0))
    }
}

/// Compute HMAC-SHA256.
fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = Hmac::<Sha256>::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// Hex-encode bytes.
fn hex_encode(bytes: &[u8]) -> String {
    bytes
        .iter()
        .fold(String::with_capacity(bytes.len() * 2), |mut result, byte| {
            let _ = write!(result, "{:02x}", byte);
            result
        })
}

/// Percent-encode a string per SigV4 (everything but unreserved characters).
pub(crate) fn percent_encode(s: &str) -> String {
    let mut result = String::new();
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                result.push(byte as char);
            }
            _ => {
                let _ = write!(result, "%{:02X}", byte);
            }
        }
    }
    result
}

/// Percent-encode a URL path (preserving slashes).
pub(crate) fn percent_encode_path(path: &str) -> String {
    path.split('/')
        .map(percent_encode)
        .collect::<Vec<_>>()
        .join("/")
}
