//! Provider registry
//!
//! Maps the `provider` names used in the config to record store constructors.
//! An unregistered name is a typed [`DnsError::UnknownProvider`], never a
//! silent fallback.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;

use super::cloudflare::CloudflareProvider;
use super::credentials::CloudflareCredentials;
use super::traits::DnsRecordStore;
use crate::errors::DnsError;

/// Builds a record store on first use
pub type ProviderFactory = Arc<dyn Fn() -> Result<Arc<dyn DnsRecordStore>, DnsError> + Send + Sync>;

/// Registry of named DNS providers.
///
/// Stores are built lazily and then reused for the lifetime of the registry,
/// so per-provider caches (zone ids, clients) survive across passes.
#[derive(Default)]
pub struct DnsProviderRegistry {
    factories: HashMap<String, ProviderFactory>,
    instances: Mutex<HashMap<String, Arc<dyn DnsRecordStore>>>,
}

impl DnsProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in provider. Credentials are read when a
    /// provider is first used, so a missing token only fails the domains that
    /// reference that provider.
    pub fn with_builtin_providers() -> Self {
        let mut registry = Self::new();
        let cloudflare: ProviderFactory = Arc::new(|| {
            let credentials = CloudflareCredentials::from_env()?;
            let provider: Arc<dyn DnsRecordStore> = Arc::new(CloudflareProvider::new(credentials)?);
            Ok(provider)
        });
        registry.register_factory("cloudflare", cloudflare.clone());
        registry.register_factory("cf", cloudflare);
        registry
    }

    pub fn register_factory(&mut self, name: &str, factory: ProviderFactory) {
        self.factories.insert(name.to_ascii_lowercase(), factory);
    }

    /// Register an already constructed store
    pub fn register_store(&mut self, name: &str, store: Arc<dyn DnsRecordStore>) {
        self.register_factory(name, Arc::new(move || Ok(store.clone())));
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.factories.contains_key(&name.to_ascii_lowercase())
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    /// Resolve the record store for `name`
    pub fn create(&self, name: &str) -> Result<Arc<dyn DnsRecordStore>, DnsError> {
        let key = name.to_ascii_lowercase();
        let factory = self
            .factories
            .get(&key)
            .ok_or_else(|| DnsError::UnknownProvider(name.to_string()))?;

        let mut instances = self
            .instances
            .lock()
            .map_err(|_| DnsError::ApiError("provider registry lock poisoned".to_string()))?;
        if let Some(store) = instances.get(&key) {
            return Ok(store.clone());
        }

        debug!("Initializing DNS provider {}", key);
        let store = factory()?;
        instances.insert(key, store.clone());
        Ok(store)
    }
}

impl std::fmt::Debug for DnsProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DnsProviderRegistry")
            .field("providers", &self.names())
            .finish()
    }
}
