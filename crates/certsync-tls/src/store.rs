//! JSON-backed certificate store
//!
//! The store is a single human-readable JSON object keyed by domain. Deleting
//! the file is safe and forces re-issuance of every domain on the next pass.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::errors::StoreError;
use crate::models::CertificateRecord;
use certsync_core::UtcDateTime;

/// Domain -> last issued certificate. Ordered so the file diffs cleanly.
pub type CertificateMap = BTreeMap<String, CertificateRecord>;

#[derive(Debug, Clone)]
pub struct CertificateStore {
    path: PathBuf,
}

impl CertificateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load every record.
    ///
    /// A missing file is an empty store. A file that exists but cannot be read
    /// or does not parse is an error, so corruption is never mistaken for "no
    /// certificates yet".
    pub fn load(&self) -> Result<CertificateMap, StoreError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Certificate store {} does not exist yet", self.path.display());
                return Ok(CertificateMap::new());
            }
            Err(source) => {
                return Err(StoreError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let certificates: CertificateMap =
            serde_json::from_str(&raw).map_err(|source| StoreError::Corrupt {
                path: self.path.clone(),
                source,
            })?;

        debug!(
            "Loaded {} certificate(s) from {}",
            certificates.len(),
            self.path.display()
        );
        Ok(certificates)
    }

    /// Persist every record.
    ///
    /// The map is written to a temporary file in the same directory and then
    /// renamed over the previous file, so a crash mid-write leaves the last
    /// good store in place.
    pub fn save(&self, certificates: &CertificateMap) -> Result<(), StoreError> {
        let write_err = |source| StoreError::Write {
            path: self.path.clone(),
            source,
        };

        let json = serde_json::to_string_pretty(certificates).map_err(StoreError::Serialize)?;

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir).map_err(write_err)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(write_err)?;
        tmp.write_all(json.as_bytes()).map_err(write_err)?;
        tmp.as_file().sync_all().map_err(write_err)?;
        tmp.persist(&self.path).map_err(|e| write_err(e.error))?;

        info!(
            "Saved {} certificate(s) to {}",
            certificates.len(),
            self.path.display()
        );
        Ok(())
    }

    /// A domain without a record always needs issuance
    pub fn needs_renewal(record: Option<&CertificateRecord>, now: UtcDateTime) -> bool {
        record.map_or(true, |record| record.needs_renewal(now))
    }
}
