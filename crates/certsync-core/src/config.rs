//! Declarative desired-state document
//!
//! The document names an ACME account and an ordered list of domains. Each
//! domain carries the DNS provider used for challenges and record management
//! and an optional target that its certificate is pushed to:
//!
//! ```yaml
//! acme:
//!   email: ops@example.com
//! domains:
//!   - domain: cdn.example.com
//!     provider: cloudflare
//!     target:
//!       type: cdn
//!       platform: baidu
//!       origin:
//!         - peer: https://origin.example.com
//!       cname: { enabled: true }
//!   - domain: static.example.com
//!     provider: cloudflare
//!     target:
//!       type: object_storage
//!       bucket: assets
//!       region: cn-hangzhou
//! ```
//!
//! The target is resolved into [`Target`] once, during [`AppConfig::normalize`],
//! so reconcilers never walk optional nested blocks.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::debug;

use crate::error::ConfigError;
use crate::utils::{to_fqdn, un_fqdn};

/// Default connect/load timeout (seconds) applied to a declared origin timeout block.
pub const DEFAULT_ORIGIN_TIMEOUT_SECS: i64 = 5;

pub const DEFAULT_CDN_PLATFORM: &str = "baidu";
pub const DEFAULT_STORAGE_PLATFORM: &str = "aliyun";

/// Root of the configuration document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    pub acme: AcmeSettings,
    #[serde(default)]
    pub domains: Vec<DomainSpec>,
}

/// ACME account identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcmeSettings {
    pub email: String,
    /// `production`, `staging`, or a full directory URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<String>,
}

/// One declared domain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainSpec {
    pub domain: String,
    /// Name of the DNS provider used for DNS-01 challenges and record convergence
    pub provider: String,
    #[serde(default, skip_serializing_if = "Target::is_none")]
    pub target: Target,
}

/// Where the certificate of a domain is deployed
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Target {
    Cdn(CdnOptions),
    ObjectStorage(ObjectStorageOptions),
    #[default]
    None,
}

impl Target {
    pub fn is_none(&self) -> bool {
        matches!(self, Target::None)
    }

    /// Platform name used to look up the target capability
    pub fn platform(&self) -> Option<&str> {
        match self {
            Target::Cdn(options) => Some(&options.platform),
            Target::ObjectStorage(options) => Some(&options.platform),
            Target::None => None,
        }
    }

    pub fn cname(&self) -> Option<&CnameConfig> {
        match self {
            Target::Cdn(options) => Some(&options.cname),
            Target::ObjectStorage(options) => Some(&options.cname),
            Target::None => None,
        }
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Target::Cdn(options) => write!(f, "cdn ({})", options.platform),
            Target::ObjectStorage(options) => write!(
                f,
                "object storage ({}: {}@{})",
                options.platform, options.bucket, options.region
            ),
            Target::None => write!(f, "none"),
        }
    }
}

/// Desired CNAME for a domain. Disabled means DNS is left alone.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CnameConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub value: String,
}

impl CnameConfig {
    /// The CNAME value to converge to, if management is enabled
    pub fn desired(&self) -> Option<&str> {
        if self.enabled && !self.value.is_empty() {
            Some(&self.value)
        } else {
            None
        }
    }
}

/// CDN domain options. Everything except `platform` and `cname` is pushed to
/// the platform on every pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CdnOptions {
    #[serde(default = "default_cdn_platform")]
    pub platform: String,
    #[serde(default)]
    pub origin: Vec<OriginPeer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_timeout: Option<OriginTimeout>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub form: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dsa: Option<DsaConfig>,
    #[serde(default)]
    pub cname: CnameConfig,
    #[serde(default)]
    pub ipv6: bool,
    #[serde(default)]
    pub quic: bool,
    #[serde(default)]
    pub http2: bool,
    #[serde(default)]
    pub http3: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seo: Option<SeoSwitch>,
}

impl Default for CdnOptions {
    fn default() -> Self {
        Self {
            platform: default_cdn_platform(),
            origin: Vec::new(),
            origin_timeout: None,
            form: None,
            dsa: None,
            cname: CnameConfig::default(),
            ipv6: false,
            quic: false,
            http2: false,
            http3: false,
            seo: None,
        }
    }
}

/// One origin server behind the CDN
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OriginPeer {
    pub peer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default)]
    pub backup: bool,
    #[serde(default)]
    pub follow302: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub isp: Option<String>,
}

/// Origin timeouts in seconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OriginTimeout {
    #[serde(default)]
    pub connect_timeout: i64,
    #[serde(default)]
    pub load_timeout: i64,
}

/// Dynamic site acceleration rules
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DsaConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub rules: Vec<DsaRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DsaRule {
    #[serde(rename = "type")]
    pub rule_type: String,
    pub value: String,
}

/// Search engine crawler handling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeoSwitch {
    #[serde(default = "seo_off")]
    pub directly_origin: String,
    #[serde(default = "seo_off")]
    pub push_record: String,
}

/// Custom-domain binding on an object-storage bucket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectStorageOptions {
    #[serde(default = "default_storage_platform")]
    pub platform: String,
    pub bucket: String,
    pub region: String,
    #[serde(default)]
    pub cname: CnameConfig,
}

impl ObjectStorageOptions {
    /// Public access endpoint of the bucket, used as the default CNAME value
    pub fn bucket_endpoint(&self) -> String {
        format!("{}.oss-{}.aliyuncs.com.", self.bucket, self.region)
    }
}

fn default_cdn_platform() -> String {
    DEFAULT_CDN_PLATFORM.to_string()
}

fn default_storage_platform() -> String {
    DEFAULT_STORAGE_PLATFORM.to_string()
}

fn seo_off() -> String {
    "OFF".to_string()
}

impl AppConfig {
    /// Read, parse and normalize a config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("Loaded config from {}", path.display());
        Self::from_yaml(&raw)
    }

    /// Parse and normalize a YAML document
    pub fn from_yaml(raw: &str) -> Result<Self, ConfigError> {
        let mut config: AppConfig = serde_yaml::from_str(raw)?;
        config.normalize()?;
        Ok(config)
    }

    /// Write the document back, e.g. to persist normalization
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let raw = serde_yaml::to_string(self)?;
        std::fs::write(path, raw).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Canonicalize domains, fill platform defaults and validate.
    ///
    /// Normalizing an already normalized document is a no-op.
    pub fn normalize(&mut self) -> Result<(), ConfigError> {
        if self.acme.email.trim().is_empty() {
            return Err(ConfigError::invalid("acme", "email must not be empty"));
        }

        let mut seen = HashSet::new();
        for spec in &mut self.domains {
            spec.normalize()?;
            if !seen.insert(spec.domain.clone()) {
                return Err(ConfigError::invalid(
                    spec.domain.clone(),
                    "domain is declared more than once",
                ));
            }
        }
        Ok(())
    }

    pub fn domain(&self, name: &str) -> Option<&DomainSpec> {
        self.domains.iter().find(|spec| spec.domain == name)
    }
}

impl DomainSpec {
    fn normalize(&mut self) -> Result<(), ConfigError> {
        self.domain = un_fqdn(self.domain.trim()).to_ascii_lowercase();
        if self.domain.is_empty() {
            return Err(ConfigError::invalid("<empty>", "domain must not be empty"));
        }
        self.provider = self.provider.trim().to_string();
        if self.provider.is_empty() {
            return Err(ConfigError::invalid(
                self.domain.clone(),
                "provider must not be empty",
            ));
        }

        match &mut self.target {
            Target::Cdn(options) => {
                if options.platform.trim().is_empty() {
                    return Err(ConfigError::invalid(
                        self.domain.clone(),
                        "cdn platform must not be empty",
                    ));
                }
                if options.cname.enabled && options.platform == DEFAULT_CDN_PLATFORM {
                    options.cname.value = format!("{}.a.bdydns.com.", self.domain);
                }
                if options.cname.enabled && options.cname.value.is_empty() {
                    return Err(ConfigError::invalid(
                        self.domain.clone(),
                        "cname is enabled but no value is declared",
                    ));
                }
                if let Some(timeout) = options.origin_timeout.as_mut() {
                    if timeout.connect_timeout <= 0 {
                        timeout.connect_timeout = DEFAULT_ORIGIN_TIMEOUT_SECS;
                    }
                    if timeout.load_timeout <= 0 {
                        timeout.load_timeout = DEFAULT_ORIGIN_TIMEOUT_SECS;
                    }
                }
            }
            Target::ObjectStorage(options) => {
                options.bucket = options.bucket.trim().to_string();
                // Accept the endpoint spelling (`oss-cn-hangzhou`) as well
                let region = options.region.trim().to_ascii_lowercase();
                options.region = region.trim_start_matches("oss-").to_string();
                if options.bucket.is_empty() || options.region.is_empty() {
                    return Err(ConfigError::invalid(
                        self.domain.clone(),
                        "object storage target needs both bucket and region",
                    ));
                }
                if options.cname.enabled && options.cname.value.is_empty() {
                    options.cname.value = options.bucket_endpoint();
                }
            }
            Target::None => {}
        }

        if let Some(cname) = self.target.cname() {
            if cname.enabled && to_fqdn(&cname.value) == to_fqdn(&self.domain) {
                return Err(ConfigError::invalid(
                    self.domain.clone(),
                    "cname must not point at the domain itself",
                ));
            }
        }
        Ok(())
    }
}
