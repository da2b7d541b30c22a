//! `certsync check`: validate the config and show what each domain resolves to

use anyhow::Context;
use certsync_core::{AppConfig, Target};
use clap::Args;
use colored::Colorize;
use tracing::info;

use super::Paths;

#[derive(Args)]
pub struct CheckCommand {
    /// Write the normalized document back to the config file
    #[arg(long, default_value = "false")]
    pub write: bool,
}

impl CheckCommand {
    pub fn execute(self, paths: &Paths) -> anyhow::Result<()> {
        let config = AppConfig::load(&paths.config)
            .with_context(|| format!("Failed to load config {}", paths.config.display()))?;

        println!();
        println!(
            "  {} {} ({} domain(s), account {})",
            "✓".bright_green(),
            paths.config.display(),
            config.domains.len(),
            config.acme.email
        );
        println!();
        println!(
            "  {:<40} {:<12} {:<40} {}",
            "DOMAIN".bright_white().bold(),
            "PROVIDER".bright_white().bold(),
            "TARGET".bright_white().bold(),
            "CNAME".bright_white().bold()
        );
        println!("  {}", "─".repeat(110));

        for spec in &config.domains {
            let cname = spec
                .target
                .cname()
                .and_then(|cname| cname.desired())
                .unwrap_or("-");
            let target = match &spec.target {
                Target::None => "none".dimmed(),
                other => other.to_string().normal(),
            };
            println!(
                "  {:<40} {:<12} {:<40} {}",
                spec.domain.bright_cyan(),
                spec.provider,
                target,
                cname
            );
        }
        println!();

        if self.write {
            config
                .save(&paths.config)
                .with_context(|| format!("Failed to write {}", paths.config.display()))?;
            info!("Wrote normalized config to {}", paths.config.display());
        }
        Ok(())
    }
}
