use std::sync::{Arc, OnceLock};

use regex::Regex;

use crate::{
    event_queue::EventQueueConfig,
    hashing::{KeyHasher, Md5KeyHasher},
    identity::{IdentityProvider, RandomIdentityProvider},
    storage::{KeyValueStore, MemoryStore},
    transport::{HttpTransport, Transport},
    Client, Error, Result,
};

/// Configuration for [`Client`].
///
/// # Examples
/// ```
/// # use gatekit::{ClientConfig, FileStore};
/// let client = ClientConfig::from_api_key("client-key")
///     .app_version("1.4.2")
///     .storage(FileStore::new("/tmp/gatekit"))
///     .to_client();
/// ```
pub struct ClientConfig {
    pub(crate) api_key: String,
    pub(crate) base_url: String,
    pub(crate) app_identifier: Option<String>,
    pub(crate) app_version: Option<String>,
    pub(crate) environment: Option<String>,
    pub(crate) event_queue: EventQueueConfig,
    pub(crate) storage: Arc<dyn KeyValueStore>,
    pub(crate) identity_provider: Arc<dyn IdentityProvider>,
    pub(crate) transport: Option<Arc<dyn Transport>>,
    pub(crate) key_hasher: Arc<dyn KeyHasher + Send + Sync>,
}

impl ClientConfig {
    /// Default base URL for API calls.
    pub const DEFAULT_BASE_URL: &'static str = "https://api.gatekit.dev/v1";

    /// Create a default configuration using the specified client API key.
    ///
    /// ```
    /// # use gatekit::ClientConfig;
    /// ClientConfig::from_api_key("client-key");
    /// ```
    pub fn from_api_key(api_key: impl Into<String>) -> Self {
        ClientConfig {
            api_key: api_key.into(),
            base_url: ClientConfig::DEFAULT_BASE_URL.to_owned(),
            app_identifier: None,
            app_version: None,
            environment: None,
            event_queue: EventQueueConfig::default(),
            storage: Arc::new(MemoryStore::new()),
            identity_provider: Arc::new(RandomIdentityProvider),
            transport: None,
            key_hasher: Arc::new(Md5KeyHasher),
        }
    }

    /// Override base URL for API calls. Clients should use the default setting in most cases.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Identifier of the host application (e.g., bundle id), attached to request metadata.
    pub fn app_identifier(mut self, app_identifier: impl Into<String>) -> Self {
        self.app_identifier = Some(app_identifier.into());
        self
    }

    /// Version of the host application, attached to request metadata.
    pub fn app_version(mut self, app_version: impl Into<String>) -> Self {
        self.app_version = Some(app_version.into());
        self
    }

    /// Environment tier (e.g., "staging") to evaluate against.
    pub fn environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = Some(environment.into());
        self
    }

    /// Tune event batching.
    pub fn event_queue(mut self, event_queue: EventQueueConfig) -> Self {
        self.event_queue = event_queue;
        self
    }

    /// Persistent storage for the cached snapshot and the stable id.
    ///
    /// Defaults to [`MemoryStore`], which gives no cold-start caching across restarts.
    pub fn storage(mut self, storage: impl KeyValueStore + 'static) -> Self {
        self.storage = Arc::new(storage);
        self
    }

    /// Override how stable and session ids are generated.
    pub fn identity_provider(mut self, provider: impl IdentityProvider + 'static) -> Self {
        self.identity_provider = Arc::new(provider);
        self
    }

    /// Override the network transport. By default, [`HttpTransport`] is used.
    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Override how gate/config names are hashed into snapshot keys.
    pub fn key_hasher(mut self, key_hasher: impl KeyHasher + Send + Sync + 'static) -> Self {
        self.key_hasher = Arc::new(key_hasher);
        self
    }

    /// Create a new [`Client`] using the specified configuration.
    ///
    /// ```
    /// # use gatekit::{ClientConfig, Client};
    /// let client: Client = ClientConfig::from_api_key("client-key").to_client();
    /// ```
    pub fn to_client(self) -> Client {
        Client::new(self)
    }

    /// Check the configuration and build the transport.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidApiKey`] if the API key is not a client key.
    /// - [`Error::InvalidBaseUrl`] if the base URL cannot be parsed.
    pub(crate) fn build_transport(&self) -> Result<Arc<dyn Transport>> {
        static CLIENT_KEY: OnceLock<Regex> = OnceLock::new();
        let client_key = CLIENT_KEY
            .get_or_init(|| Regex::new(r"^client-[A-Za-z0-9_-]+$").expect("valid regex"));
        if !client_key.is_match(&self.api_key) {
            return Err(Error::InvalidApiKey);
        }

        match &self.transport {
            Some(transport) => Ok(transport.clone()),
            None => Ok(Arc::new(HttpTransport::new(&self.base_url, &self.api_key)?)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::RecordingTransport;

    #[test]
    fn accepts_client_keys() {
        let config =
            ClientConfig::from_api_key("client-AbC_123-x").transport(RecordingTransport::new());

        assert!(config.build_transport().is_ok());
    }

    #[test]
    fn rejects_malformed_keys() {
        for key in ["", "secret-abc", "client-", "client-has space", " client-abc"] {
            let config = ClientConfig::from_api_key(key).transport(RecordingTransport::new());
            assert!(
                matches!(config.build_transport(), Err(Error::InvalidApiKey)),
                "{key:?} must be rejected"
            );
        }
    }

    #[test]
    fn rejects_invalid_base_url() {
        let config = ClientConfig::from_api_key("client-abc").base_url("::not a url::");

        assert!(matches!(
            config.build_transport(),
            Err(Error::InvalidBaseUrl(_))
        ));
    }
}
