//! Deployment capabilities keyed by platform name

use certsync_cdn::CdnTarget;
use certsync_storage::ObjectStorageTarget;
use std::collections::BTreeMap;
use std::sync::Arc;

/// CDN and object-storage targets available to a runner.
///
/// A platform whose credentials were not supplied is simply absent; domains
/// declared against it fail on their own.
#[derive(Default, Clone)]
pub struct Targets {
    cdn: BTreeMap<String, Arc<dyn CdnTarget>>,
    storage: BTreeMap<String, Arc<dyn ObjectStorageTarget>>,
}

impl Targets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cdn(mut self, target: Arc<dyn CdnTarget>) -> Self {
        self.register_cdn(target);
        self
    }

    pub fn with_storage(mut self, target: Arc<dyn ObjectStorageTarget>) -> Self {
        self.register_storage(target);
        self
    }

    pub fn register_cdn(&mut self, target: Arc<dyn CdnTarget>) {
        self.cdn.insert(target.platform().to_string(), target);
    }

    pub fn register_storage(&mut self, target: Arc<dyn ObjectStorageTarget>) {
        self.storage.insert(target.platform().to_string(), target);
    }

    pub fn cdn(&self, platform: &str) -> Option<Arc<dyn CdnTarget>> {
        self.cdn.get(platform).cloned()
    }

    pub fn storage(&self, platform: &str) -> Option<Arc<dyn ObjectStorageTarget>> {
        self.storage.get(platform).cloned()
    }

    pub fn cdn_platforms(&self) -> Vec<&str> {
        self.cdn.keys().map(String::as_str).collect()
    }

    pub fn storage_platforms(&self) -> Vec<&str> {
        self.storage.keys().map(String::as_str).collect()
    }
}

impl std::fmt::Debug for Targets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Targets")
            .field("cdn", &self.cdn_platforms())
            .field("storage", &self.storage_platforms())
            .finish()
    }
}
