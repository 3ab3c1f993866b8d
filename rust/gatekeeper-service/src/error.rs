//! Error codes reported by the gatekeeper.
//!
//! Faults that prevent a normal exchange are reported inside an encoded
//! response, under the reserved `gatekeeperErrorCode` application property,
//! so clients always receive a diagnosable message. Each code also maps to
//! the HTTP status the response is sent with.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;

/// Error codes placed in the reserved error-code application property.
///
/// Each code maps to an HTTP status code via [`ErrorCode::status_code`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorCode {
    // 400 Bad Request
    /// The request document could not be decoded.
    MalformedMessage,

    // 200 OK, so the client can read the code
    /// Policy components failed to construct at startup.
    GatekeeperInitializationError,

    // 500 Internal Server Error
    /// A signer failed on an approved request.
    SigningFailure,
    /// The lister failed on an approved listing.
    ListingFailure,
    /// Any other fault during dispatch.
    InternalError,
}

impl ErrorCode {
    /// Every code, in declaration order.
    pub const ALL: [ErrorCode; 5] = [
        ErrorCode::MalformedMessage,
        ErrorCode::GatekeeperInitializationError,
        ErrorCode::SigningFailure,
        ErrorCode::ListingFailure,
        ErrorCode::InternalError,
    ];

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorCode::MalformedMessage => 400,
            ErrorCode::GatekeeperInitializationError => 200,
            ErrorCode::SigningFailure | ErrorCode::ListingFailure | ErrorCode::InternalError => 500,
        }
    }

    /// Value written to the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::MalformedMessage => "MalformedMessage",
            ErrorCode::GatekeeperInitializationError => "GatekeeperInitializationError",
            ErrorCode::SigningFailure => "SigningFailure",
            ErrorCode::ListingFailure => "ListingFailure",
            ErrorCode::InternalError => "InternalError",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A string that is not one of the known [`ErrorCode`]s.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown gatekeeper error code '{0}'")]
pub struct UnknownErrorCode(pub String);

impl FromStr for ErrorCode {
    type Err = UnknownErrorCode;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        ErrorCode::ALL
            .into_iter()
            .find(|code| code.as_str() == value)
            .ok_or_else(|| UnknownErrorCode(value.to_string()))
    }
}
