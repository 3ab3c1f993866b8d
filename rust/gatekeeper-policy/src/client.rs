use std::net::SocketAddr;

/// Facts about the caller of one exchange, as observed by the transport.
///
/// Handed to every policy component alongside the message. Never travels on
/// the wire and never changes during an exchange.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientInformation {
    remote_address: Option<SocketAddr>,
    principal: Option<String>,
    user_agent: Option<String>,
    session: Option<String>,
}

impl ClientInformation {
    /// Nothing known about the caller.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the network address of the caller.
    pub fn with_remote_address(mut self, address: SocketAddr) -> Self {
        self.remote_address = Some(address);
        self
    }

    /// Set the authenticated principal.
    pub fn with_principal(mut self, principal: impl Into<String>) -> Self {
        self.principal = Some(principal.into());
        self
    }

    /// Set the user agent.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Set the session handle.
    pub fn with_session(mut self, session: impl Into<String>) -> Self {
        self.session = Some(session.into());
        self
    }

    /// Network address of the caller.
    pub fn remote_address(&self) -> Option<SocketAddr> {
        self.remote_address
    }

    /// Authenticated principal, if the transport authenticated the caller.
    pub fn principal(&self) -> Option<&str> {
        self.principal.as_deref()
    }

    /// User agent reported by the caller.
    pub fn user_agent(&self) -> Option<&str> {
        self.user_agent.as_deref()
    }

    /// Session handle, if the transport tracks sessions.
    pub fn session(&self) -> Option<&str> {
        self.session.as_deref()
    }
}
