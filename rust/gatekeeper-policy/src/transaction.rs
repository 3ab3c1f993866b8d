use async_trait::async_trait;
use gatekeeper_message::GatekeeperMessage;

use crate::ClientInformation;

/// Supplies the id correlating one exchange (and any follow-up exchange for
/// a derived object).
///
/// Called once per exchange, before any authorization. An empty id means the
/// exchange is not tracked.
#[async_trait]
pub trait TransactionIdProvider: Send + Sync {
    /// Id for this exchange.
    ///
    /// `message` may already carry the id of an earlier exchange, in which
    /// case implementations usually return it unchanged.
    async fn transaction_id(&self, message: &GatekeeperMessage, client: &ClientInformation)
    -> String;
}

/// Issues a fresh ULID unless the client continues an existing transaction.
/// Registered as `default`.
#[derive(Debug, Clone, Copy, Default)]
pub struct UlidTransactionIds;

#[async_trait]
impl TransactionIdProvider for UlidTransactionIds {
    async fn transaction_id(
        &self,
        message: &GatekeeperMessage,
        _client: &ClientInformation,
    ) -> String {
        match message.transaction_id() {
            Some(existing) => existing.to_string(),
            None => ulid::Ulid::new().to_string(),
        }
    }
}

/// Disables transaction tracking. Registered as `none`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTransactionIds;

#[async_trait]
impl TransactionIdProvider for NoTransactionIds {
    async fn transaction_id(
        &self,
        _message: &GatekeeperMessage,
        _client: &ClientInformation,
    ) -> String {
        String::new()
    }
}
