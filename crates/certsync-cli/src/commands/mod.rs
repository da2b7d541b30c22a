pub mod certs;
pub mod check;
pub mod run;

pub use certs::CertsCommand;
pub use check::CheckCommand;
pub use run::RunCommand;

use clap::Args;
use std::path::{Path, PathBuf};

/// File locations shared by every command
#[derive(Args, Debug, Clone)]
pub struct Paths {
    /// Declarative config file
    #[arg(
        long,
        env = "CONFIG_PATH",
        default_value = "config/config.yaml",
        global = true
    )]
    pub config: PathBuf,

    /// Certificate store file; the ACME account is kept beside it
    #[arg(
        long,
        env = "JSON_PATH",
        default_value = "certs/certificates.json",
        global = true
    )]
    pub store: PathBuf,
}

impl Paths {
    pub fn store_dir(&self) -> &Path {
        match self.store.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }

    pub fn account_path(&self) -> PathBuf {
        self.store_dir().join("account.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_lives_beside_the_store() {
        let paths = Paths {
            config: PathBuf::from("config.yaml"),
            store: PathBuf::from("/data/certs/certificates.json"),
        };
        assert_eq!(paths.account_path(), PathBuf::from("/data/certs/account.json"));

        let bare = Paths {
            config: PathBuf::from("config.yaml"),
            store: PathBuf::from("certificates.json"),
        };
        assert_eq!(bare.account_path(), PathBuf::from("./account.json"));
    }
}
