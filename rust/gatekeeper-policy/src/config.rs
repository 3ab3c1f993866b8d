use std::fmt;
use std::path::Path;

use gatekeeper_s3::Credentials;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Name every role resolves to when the configuration does not say.
pub const DEFAULT_COMPONENT: &str = "default";

/// The four pluggable roles of a gatekeeper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// [`Authorizer`](crate::Authorizer)
    Authorizer,
    /// [`UrlSigner`](crate::UrlSigner)
    UrlSigner,
    /// [`BucketLister`](crate::BucketLister)
    BucketLister,
    /// [`TransactionIdProvider`](crate::TransactionIdProvider)
    TransactionIdProvider,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Role::Authorizer => "authorizer",
            Role::UrlSigner => "url signer",
            Role::BucketLister => "bucket lister",
            Role::TransactionIdProvider => "transaction id provider",
        })
    }
}

/// Policy components could not be constructed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InitializationError {
    /// The configuration file could not be read or parsed.
    #[error("Invalid gatekeeper configuration: {0}")]
    Configuration(String),

    /// No constructor is registered under the configured name.
    #[error("No {role} named '{name}' is registered")]
    UnknownComponent {
        /// Role being resolved.
        role: Role,
        /// Configured name.
        name: String,
    },

    /// The component's settings were rejected.
    #[error("Invalid settings for {role} '{name}': {reason}")]
    InvalidSettings {
        /// Role being resolved.
        role: Role,
        /// Configured name.
        name: String,
        /// What was wrong.
        reason: String,
    },

    /// The component needs storage credentials and none were configured.
    #[error("{role} '{name}' requires storage credentials")]
    MissingCredentials {
        /// Role being resolved.
        role: Role,
        /// Configured name.
        name: String,
    },
}

/// Selection of one component: a registered name and its settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentConfig {
    /// Registered name, `default` when omitted.
    #[serde(default = "default_name")]
    pub name: String,
    /// Free-form settings handed to the constructor.
    #[serde(default)]
    pub settings: serde_json::Value,
}

fn default_name() -> String {
    DEFAULT_COMPONENT.to_string()
}

impl Default for ComponentConfig {
    fn default() -> Self {
        Self::named(DEFAULT_COMPONENT)
    }
}

impl ComponentConfig {
    /// Select the component registered as `name`, with no settings.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            settings: serde_json::Value::Null,
        }
    }

    /// Attach settings.
    pub fn with_settings(mut self, settings: serde_json::Value) -> Self {
        self.settings = settings;
        self
    }
}

/// Which implementation fills each role, as loaded at startup.
///
/// ```json
/// {
///   "credentials": {
///     "address": { "endpoint": "https://s3.us-east-1.amazonaws.com", "region": "us-east-1", "bucket": "uploads" },
///     "access_key_id": "...",
///     "secret_access_key": "..."
///   },
///   "authorizer": { "name": "prefix", "settings": { "prefixes": ["public/"] } },
///   "url_signer": { "settings": { "expires_in": 600 } }
/// }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatekeeperConfig {
    /// Storage credentials shared by every component that needs them.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credentials: Option<Credentials>,
    /// Authorizer selection.
    pub authorizer: ComponentConfig,
    /// URL signer selection.
    pub url_signer: ComponentConfig,
    /// Bucket lister selection.
    pub bucket_lister: ComponentConfig,
    /// Transaction id provider selection.
    pub transaction_id_provider: ComponentConfig,
}

impl GatekeeperConfig {
    /// Parse a JSON configuration.
    pub fn from_json(text: &str) -> Result<Self, InitializationError> {
        serde_json::from_str(text).map_err(|e| InitializationError::Configuration(e.to_string()))
    }

    /// Read and parse a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, InitializationError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            InitializationError::Configuration(format!("{}: {}", path.display(), e))
        })?;
        Self::from_json(&text)
    }

    /// Use `credentials` for every component that needs them.
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Select the authorizer.
    pub fn with_authorizer(mut self, component: ComponentConfig) -> Self {
        self.authorizer = component;
        self
    }

    /// Select the URL signer.
    pub fn with_url_signer(mut self, component: ComponentConfig) -> Self {
        self.url_signer = component;
        self
    }

    /// Select the bucket lister.
    pub fn with_bucket_lister(mut self, component: ComponentConfig) -> Self {
        self.bucket_lister = component;
        self
    }

    /// Select the transaction id provider.
    pub fn with_transaction_id_provider(mut self, component: ComponentConfig) -> Self {
        self.transaction_id_provider = component;
        self
    }
}

/// What a component constructor gets to work with.
#[derive(Debug, Clone, Copy)]
pub struct ComponentSettings<'a> {
    role: Role,
    name: &'a str,
    settings: &'a serde_json::Value,
    credentials: Option<&'a Credentials>,
}

impl<'a> ComponentSettings<'a> {
    pub(crate) fn new(
        role: Role,
        component: &'a ComponentConfig,
        credentials: Option<&'a Credentials>,
    ) -> Self {
        Self {
            role,
            name: &component.name,
            settings: &component.settings,
            credentials,
        }
    }

    /// Role being constructed.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Name the component was selected by.
    pub fn name(&self) -> &str {
        self.name
    }

    /// Raw settings value.
    pub fn raw(&self) -> &serde_json::Value {
        self.settings
    }

    /// Deserialize the settings, using `T::default()` when none were given.
    pub fn parse<T>(&self) -> Result<T, InitializationError>
    where
        T: DeserializeOwned + Default,
    {
        if self.settings.is_null() {
            return Ok(T::default());
        }
        serde_json::from_value(self.settings.clone()).map_err(|e| self.invalid(e))
    }

    /// `explicit` credentials, or the configuration's shared ones.
    pub fn credentials(
        &self,
        explicit: Option<Credentials>,
    ) -> Result<Credentials, InitializationError> {
        explicit
            .or_else(|| self.credentials.cloned())
            .ok_or_else(|| InitializationError::MissingCredentials {
                role: self.role,
                name: self.name.to_string(),
            })
    }

    /// Reject the settings with `reason`.
    pub fn invalid(&self, reason: impl fmt::Display) -> InitializationError {
        InitializationError::InvalidSettings {
            role: self.role,
            name: self.name.to_string(),
            reason: reason.to_string(),
        }
    }
}
