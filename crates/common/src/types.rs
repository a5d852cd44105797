//! Certificate record types and lifecycle defaults.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration as StdDuration;

use crate::domain::DomainName;

/// Default validity window of a certificate record (10 minutes)
pub const DEFAULT_TTL: StdDuration = StdDuration::from_secs(10 * 60);

/// Default artificial delay applied after every issuance (10 seconds)
pub const DEFAULT_ISSUE_DELAY: StdDuration = StdDuration::from_secs(10);

/// Default head start the identity renewal takes over expiry (1 minute)
pub const DEFAULT_RENEWAL_MARGIN: StdDuration = StdDuration::from_secs(60);

/// Reserved domain the service issues for itself
pub const DEFAULT_IDENTITY_DOMAIN: &str = "certserver.fan";

/// Name of the single backend collection holding every record
pub const RECORD_COLLECTION: &str = "Domain";

/// A domain name paired with the instant its certificate stops being trusted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateRecord {
    /// Domain the record was issued for
    pub domain: DomainName,
    /// Expiration timestamp (second precision)
    pub expires_at: DateTime<Utc>,
}

impl CertificateRecord {
    /// Record for a certificate issued at `issued_at` with the given TTL.
    pub fn issue(domain: DomainName, issued_at: DateTime<Utc>, ttl: StdDuration) -> Self {
        let expires_at = Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| issued_at.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self { domain, expires_at }
    }

    /// Lifecycle state of the record as observed at `now`.
    ///
    /// The boundary is inclusive: a record whose expiry equals `now` is
    /// already expired.
    pub fn state_at(&self, now: DateTime<Utc>) -> CertificateState {
        if self.expires_at <= now {
            CertificateState::Expired
        } else {
            CertificateState::Active
        }
    }

    /// Whether the record is trusted at `now`
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.state_at(now) == CertificateState::Active
    }
}

/// Lifecycle state of a domain, derived at read time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CertificateState {
    /// No record exists
    Absent,
    /// Record exists and has not reached its expiry
    Active,
    /// Record exists but its expiry has passed
    Expired,
}

impl fmt::Display for CertificateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CertificateState::Absent => "absent",
            CertificateState::Active => "active",
            CertificateState::Expired => "expired",
        };
        f.write_str(s)
    }
}
