//! Shared type aliases

use chrono::{DateTime, Utc};

/// Standard UTC timestamp used for certificate expiry and remote validity windows.
pub type UtcDateTime = DateTime<Utc>;
