//! `certsync certs`: list the certificate store

use anyhow::Context;
use certsync_tls::{CertificateRecord, CertificateStore};
use chrono::Utc;
use clap::Args;
use colored::Colorize;

use super::Paths;

#[derive(Args)]
pub struct CertsCommand {}

/// Renewal status shown next to a stored certificate
fn status(record: &CertificateRecord, now: chrono::DateTime<Utc>) -> &'static str {
    if record.is_expired(now) {
        "expired"
    } else if record.needs_renewal(now) {
        "renew"
    } else {
        "valid"
    }
}

impl CertsCommand {
    pub fn execute(self, paths: &Paths) -> anyhow::Result<()> {
        let store = CertificateStore::new(&paths.store);
        let certificates = store
            .load()
            .with_context(|| format!("Failed to load {}", paths.store.display()))?;

        println!();
        if certificates.is_empty() {
            println!(
                "  {} No certificates in {}",
                "ℹ".bright_blue(),
                paths.store.display()
            );
            println!();
            return Ok(());
        }

        println!(
            "  {:<40} {:<12} {:<12} {}",
            "DOMAIN".bright_white().bold(),
            "STATUS".bright_white().bold(),
            "DAYS LEFT".bright_white().bold(),
            "EXPIRES".bright_white().bold()
        );
        println!("  {}", "─".repeat(90));

        let now = Utc::now();
        for (domain, record) in &certificates {
            let status = match status(record, now) {
                "valid" => "valid".bright_green(),
                "renew" => "renew".bright_yellow(),
                other => other.bright_red(),
            };
            println!(
                "  {:<40} {:<12} {:<12} {}",
                domain.bright_cyan(),
                status,
                record.days_until_expiry(now),
                record.expires_at.format("%Y-%m-%d %H:%M UTC")
            );
        }
        println!();
        Ok(())
    }
}
