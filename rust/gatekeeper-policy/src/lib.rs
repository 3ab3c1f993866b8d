#![warn(missing_docs)]

//! Pluggable policy components for the gatekeeper.
//!
//! A gatekeeper delegates every trust decision to four components:
//!
//! - an [`Authorizer`] decides whether each request (or a listing) may proceed,
//! - a [`UrlSigner`] turns an approved request into a scoped, expiring URL,
//! - a [`BucketLister`] produces the listing a caller is allowed to see,
//! - a [`TransactionIdProvider`] correlates the exchange.
//!
//! Each is an `async` trait object so deployments can substitute their own.
//! A [`Registry`] maps configured names to constructors and resolves a
//! [`GatekeeperConfig`] into a ready [`Policy`] once at startup.

mod authorizer;
pub use authorizer::*;

mod client;
pub use client::*;

mod config;
pub use config::*;

mod lister;
pub use lister::*;

mod registry;
pub use registry::*;

mod signer;
pub use signer::*;

mod transaction;
pub use transaction::*;
