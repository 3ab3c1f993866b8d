//! S3 storage address types.

use serde::{Deserialize, Serialize};

/// Address of a bucket on an S3-compatible service.
///
/// Works with any S3-compatible service (AWS S3, Cloudflare R2, MinIO, etc.).
/// The bucket is the default target; individual requests may name another.
///
/// This is a plain data type - URL validation happens when credentials are
/// constructed from it.
///
/// # Examples
///
/// ```
/// use gatekeeper_s3::Address;
///
/// // AWS S3
/// let addr = Address::new(
///     "https://s3.us-east-1.amazonaws.com",
///     "us-east-1",
///     "my-bucket",
/// );
///
/// // MinIO (local development)
/// let addr = Address::new("http://localhost:9000", "us-east-1", "my-bucket");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Address {
    /// The S3-compatible endpoint URL (e.g., "https://s3.us-east-1.amazonaws.com")
    endpoint: String,
    /// AWS region for signing (e.g., "us-east-1", "auto" for R2)
    region: String,
    /// Default bucket name
    bucket: String,
}

impl Address {
    /// Create a new address with the given endpoint, region, and bucket.
    pub fn new(
        endpoint: impl Into<String>,
        region: impl Into<String>,
        bucket: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            region: region.into(),
            bucket: bucket.into(),
        }
    }

    /// Get the endpoint URL string.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Get the region.
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Get the default bucket name.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Same endpoint and region, different default bucket.
    pub fn with_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = bucket.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_creates_r2_address() {
        let addr = Address::new(
            "https://account-id.r2.cloudflarestorage.com",
            "auto",
            "my-bucket",
        );

        assert_eq!(
            addr.endpoint(),
            "https://account-id.r2.cloudflarestorage.com"
        );
        assert_eq!(addr.region(), "auto");
        assert_eq!(addr.bucket(), "my-bucket");
    }

    #[test]
    fn it_roundtrips_through_serde() {
        let addr = Address::new(
            "https://s3.us-east-1.amazonaws.com",
            "us-east-1",
            "my-bucket",
        )
        .with_bucket("other-bucket");

        let json = serde_json::to_string(&addr).unwrap();
        let parsed: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(addr, parsed);
        assert_eq!(parsed.bucket(), "other-bucket");
    }
}
