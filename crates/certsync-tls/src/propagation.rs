//! DNS propagation probe for DNS-01 challenges
//!
//! Read-only: queries public resolvers until a TXT record carries the
//! expected value.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use hickory_resolver::config::{NameServerConfig, ResolverConfig, ResolverOpts};
use hickory_resolver::name_server::TokioConnectionProvider;
use hickory_resolver::proto::xfer::Protocol;
use hickory_resolver::{Resolver, TokioResolver};
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::errors::AuthorityError;

/// Resolvers queried when none are configured
pub const DEFAULT_NAMESERVERS: [IpAddr; 3] = [
    IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8)),
    IpAddr::V4(Ipv4Addr::new(1, 1, 1, 1)),
    IpAddr::V4(Ipv4Addr::new(9, 9, 9, 9)),
];

pub struct PropagationProbe {
    resolver: TokioResolver,
}

impl PropagationProbe {
    pub fn new() -> Self {
        Self::with_nameservers(&DEFAULT_NAMESERVERS)
    }

    pub fn with_nameservers(nameservers: &[IpAddr]) -> Self {
        let mut config = ResolverConfig::new();
        for ip in nameservers {
            config.add_name_server(NameServerConfig::new(
                SocketAddr::new(*ip, 53),
                Protocol::Udp,
            ));
        }

        let mut opts = ResolverOpts::default();
        opts.timeout = Duration::from_secs(5);
        opts.attempts = 2;
        // Every check must hit the network
        opts.cache_size = 0;

        let resolver = Resolver::builder_with_config(config, TokioConnectionProvider::default())
            .with_options(opts)
            .build();
        Self { resolver }
    }

    /// Poll until `name` serves a TXT record equal to `expected`
    pub async fn wait_for_txt(
        &self,
        name: &str,
        expected: &str,
        timeout: Duration,
        interval: Duration,
    ) -> Result<(), AuthorityError> {
        let start = Instant::now();
        let deadline = start + timeout;
        debug!(
            "Waiting up to {}s for TXT {} to propagate",
            timeout.as_secs(),
            name
        );

        loop {
            match self.has_txt(name, expected).await {
                Ok(true) => {
                    debug!(
                        "TXT {} visible after {}s",
                        name,
                        start.elapsed().as_secs()
                    );
                    return Ok(());
                }
                Ok(false) => trace!("TXT {} not visible yet", name),
                Err(e) => warn!("Lookup of {} failed: {}", name, e),
            }

            if Instant::now() + interval > deadline {
                return Err(AuthorityError::PropagationTimeout {
                    record: name.to_string(),
                    elapsed_secs: start.elapsed().as_secs(),
                });
            }
            tokio::time::sleep(interval).await;
        }
    }

    /// Check once whether `name` serves a TXT record equal to `expected`
    pub async fn has_txt(&self, name: &str, expected: &str) -> Result<bool, AuthorityError> {
        match self.resolver.txt_lookup(name).await {
            Ok(records) => Ok(records.iter().any(|record| {
                let value: String = record
                    .txt_data()
                    .iter()
                    .map(|data| String::from_utf8_lossy(data))
                    .collect();
                value == expected
            })),
            Err(e) => {
                // NXDOMAIN and empty answers are expected while the record propagates
                let message = e.to_string().to_lowercase();
                if message.contains("no records found")
                    || message.contains("nxdomain")
                    || message.contains("record not found")
                {
                    Ok(false)
                } else {
                    Err(AuthorityError::ChallengeFailed(format!(
                        "DNS lookup failed for '{}': {}",
                        name, e
                    )))
                }
            }
        }
    }
}

impl Default for PropagationProbe {
    fn default() -> Self {
        Self::new()
    }
}
