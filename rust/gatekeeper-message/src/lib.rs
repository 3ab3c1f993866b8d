#![warn(missing_docs)]

//! Message model exchanged between a gatekeeper client and the gatekeeper
//! service, together with its flat key-value wire encoding.
//!
//! A [`GatekeeperMessage`] either carries a batch of [`SignatureRequest`]s,
//! each asking for one storage operation on one object, or asks for a bucket
//! listing. The client sends the message, the service attaches a
//! [`Decision`] to every request (or fills in the listing) and sends it back.
//!
//! # Example
//!
//! ```
//! use gatekeeper_message::{GatekeeperMessage, SignatureRequest, SignatureType};
//!
//! let message = GatekeeperMessage::signing(vec![
//!     SignatureRequest::new(SignatureType::Put, "photos/cat.jpg"),
//! ])
//! .with_application_property("uploader", "desktop");
//!
//! let text = message.encode();
//! let decoded = GatekeeperMessage::decode(&text)?;
//!
//! assert_eq!(decoded, message);
//! # Ok::<(), gatekeeper_message::MalformedMessage>(())
//! ```

mod document;
pub use document::*;

mod message;
pub use message::*;

mod request;
pub use request::*;

pub mod keys;
