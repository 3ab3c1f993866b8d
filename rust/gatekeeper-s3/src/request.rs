use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;

use crate::{DEFAULT_EXPIRES, SigningError};

/// Prefix S3 expects on user-defined metadata headers.
const METADATA_HEADER_PREFIX: &str = "x-amz-meta-";

/// Description of one S3 operation to presign.
///
/// Carries everything that ends up in the canonical request besides the
/// credentials: method, target, sub-resource parameters, headers the holder
/// must send, signing time and validity window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Presign {
    method: &'static str,
    bucket: Option<String>,
    key: String,
    params: Vec<(String, String)>,
    headers: Vec<(String, String)>,
    time: DateTime<Utc>,
    expires: u64,
}

impl Presign {
    /// Presign `method` on `key`, signed now and valid for [`DEFAULT_EXPIRES`].
    pub fn new(method: &'static str, key: impl Into<String>) -> Self {
        Self {
            method,
            bucket: None,
            key: key.into(),
            params: Vec::new(),
            headers: Vec::new(),
            time: Utc::now(),
            expires: DEFAULT_EXPIRES,
        }
    }

    /// Presign a ListObjectsV2 request on the bucket.
    pub fn list(prefix: Option<&str>, continuation_token: Option<&str>, max_keys: Option<u32>) -> Self {
        let mut request = Self::new("GET", "").with_param("list-type", "2");
        if let Some(prefix) = prefix {
            request = request.with_param("prefix", prefix);
        }
        if let Some(token) = continuation_token {
            request = request.with_param("continuation-token", token);
        }
        if let Some(max_keys) = max_keys {
            request = request.with_param("max-keys", max_keys.to_string());
        }
        request
    }

    /// Target `bucket` instead of the credentials' default bucket.
    pub fn with_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = Some(bucket.into());
        self
    }

    /// Add a query parameter, e.g. `acl` for the ACL sub-resource.
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((name.into(), value.into()));
        self
    }

    /// Add a header the holder of the URL must send verbatim.
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers
            .push((name.as_ref().to_ascii_lowercase(), value.into()));
        self
    }

    /// Add object metadata as signed headers (see [`metadata_headers`]).
    pub fn with_metadata(self, metadata: &BTreeMap<String, String>) -> Result<Self, SigningError> {
        Ok(metadata_headers(metadata)?
            .into_iter()
            .fold(self, |request, (name, value)| request.with_header(name, value)))
    }

    /// Sign as of `time` instead of now.
    pub fn at(mut self, time: DateTime<Utc>) -> Self {
        self.time = time;
        self
    }

    /// Keep the URL valid for `seconds` after the signing time.
    pub fn expires_in(mut self, seconds: u64) -> Self {
        self.expires = seconds;
        self
    }

    /// Keep the URL valid until the absolute instant `expiry`.
    pub fn expires_at(self, expiry: DateTime<Utc>) -> Result<Self, SigningError> {
        let window = expiry.signed_duration_since(self.time);
        if window <= Duration::zero() {
            return Err(SigningError::Expired(expiry.to_rfc3339()));
        }
        let seconds = u64::try_from(window.num_seconds()).unwrap_or(0).max(1);
        Ok(self.expires_in(seconds))
    }

    /// HTTP method.
    pub fn method(&self) -> &'static str {
        self.method
    }

    /// Explicit bucket, if any.
    pub fn bucket(&self) -> Option<&str> {
        self.bucket.as_deref()
    }

    /// Object key, empty for bucket-level operations.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Query parameters in insertion order.
    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    /// Headers (lower-cased names) in insertion order.
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Signing time.
    pub fn time(&self) -> DateTime<Utc> {
        self.time
    }

    /// Validity window in seconds.
    pub fn expires(&self) -> u64 {
        self.expires
    }
}

/// Headers that carry object metadata on an S3 request.
///
/// Names already in the `x-amz-` namespace (e.g. `x-amz-acl`) pass through;
/// every other name becomes `x-amz-meta-<name>`. Names are lower-cased, so
/// two names differing only in case would collide and are rejected.
pub fn metadata_headers(
    metadata: &BTreeMap<String, String>,
) -> Result<Vec<(String, String)>, SigningError> {
    let mut headers: Vec<(String, String)> = Vec::with_capacity(metadata.len());
    for (name, value) in metadata {
        let name = name.to_ascii_lowercase();
        let name = if name.starts_with("x-amz-") {
            name
        } else {
            format!("{METADATA_HEADER_PREFIX}{name}")
        };
        if headers.iter().any(|(existing, _)| *existing == name) {
            return Err(SigningError::Configuration(format!(
                "Metadata header '{name}' is given more than once"
            )));
        }
        headers.push((name, value.clone()));
    }
    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn it_prefixes_user_metadata() {
        let mut metadata = BTreeMap::new();
        metadata.insert("Owner".to_string(), "alice".to_string());
        metadata.insert("x-amz-acl".to_string(), "public-read".to_string());

        let headers = metadata_headers(&metadata).unwrap();
        assert_eq!(
            headers,
            vec![
                ("x-amz-meta-owner".to_string(), "alice".to_string()),
                ("x-amz-acl".to_string(), "public-read".to_string()),
            ]
        );
    }

    #[test]
    fn it_rejects_metadata_names_differing_only_in_case() {
        let mut metadata = BTreeMap::new();
        metadata.insert("Owner".to_string(), "alice".to_string());
        metadata.insert("owner".to_string(), "bob".to_string());

        assert!(matches!(
            metadata_headers(&metadata),
            Err(SigningError::Configuration(_))
        ));
        assert!(Presign::new("PUT", "a").with_metadata(&metadata).is_err());
    }

    #[test]
    fn it_converts_absolute_expiry_to_window() {
        let time = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let request = Presign::new("GET", "a")
            .at(time)
            .expires_at(time + Duration::days(1))
            .unwrap();
        assert_eq!(request.expires(), 86_400);
    }

    #[test]
    fn it_rejects_expiry_in_the_past() {
        let time = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let result = Presign::new("GET", "a")
            .at(time)
            .expires_at(time - Duration::seconds(1));
        assert!(matches!(result, Err(SigningError::Expired(_))));
    }

    #[test]
    fn it_builds_list_parameters() {
        let request = Presign::list(Some("photos/"), Some("token"), Some(100));
        assert_eq!(request.key(), "");
        assert_eq!(
            request.params(),
            &[
                ("list-type".to_string(), "2".to_string()),
                ("prefix".to_string(), "photos/".to_string()),
                ("continuation-token".to_string(), "token".to_string()),
                ("max-keys".to_string(), "100".to_string()),
            ]
        );
    }
}
