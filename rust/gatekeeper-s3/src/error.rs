use thiserror::Error;

/// Failure to produce a presigned URL.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SigningError {
    /// Endpoint or bucket cannot form a valid URL.
    #[error("Invalid S3 configuration: {0}")]
    Configuration(String),

    /// The requested expiry is already in the past.
    #[error("URL expiry {0} is not in the future")]
    Expired(String),
}

/// Failure to obtain or interpret a bucket listing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ListingError {
    /// The storage service answered with an `<Error>` document.
    #[error("{code}: {message}")]
    Service {
        /// S3 error code, e.g. `NoSuchBucket`.
        code: String,
        /// Human-readable message from the service.
        message: String,
    },

    /// The response body was not a ListObjectsV2 result.
    #[error("Failed to parse listing: {0}")]
    Serialization(String),

    /// The request did not complete.
    #[error("Listing request failed: {0}")]
    Transport(String),

    /// The listing URL could not be signed.
    #[error(transparent)]
    Signing(#[from] SigningError),
}
