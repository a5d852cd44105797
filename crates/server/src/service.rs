//! Certificate record lifecycle.
//!
//! A record's state is never stored. It is derived on every read by comparing
//! the stored expiration with the injected clock, so expired records need no
//! sweeper and stay in the backend until the next create overwrites them.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, trace, warn};

use certsvc_common::{
    CertificateRecord, CertificateState, Clock, DomainName, InvalidDomain, DEFAULT_ISSUE_DELAY,
    DEFAULT_TTL,
};
use certsvc_store::{RecordStore, StoreError};

/// Errors surfaced by the lifecycle operations
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    InvalidDomain(#[from] InvalidDomain),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// The identity record could not be written at startup
    #[error("Failed to issue identity certificate for {domain}: {source}")]
    FatalStartup {
        domain: String,
        #[source]
        source: StoreError,
    },

    /// A scheduled identity renewal failed after startup
    #[error("Identity certificate renewal for {domain} failed: {source}")]
    RenewalFailed {
        domain: String,
        #[source]
        source: StoreError,
    },

    /// The renewal task panicked or was aborted
    #[error("Identity renewal task ended abnormally: {0}")]
    RenewalTask(String),
}

/// Acknowledgement of a successful create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateAck {
    /// The record as written
    pub record: CertificateRecord,
}

impl CreateAck {
    pub const MESSAGE: &'static str = "OK";

    pub fn message(&self) -> &'static str {
        Self::MESSAGE
    }
}

impl fmt::Display for CreateAck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(Self::MESSAGE)
    }
}

/// Outcome of a retrieve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Retrieval {
    /// No record has ever been created for the domain
    Absent { domain: DomainName },
    /// A record exists but its expiration has passed
    Expired(CertificateRecord),
    /// A record exists and is trusted
    Active(CertificateRecord),
}

impl Retrieval {
    pub fn domain(&self) -> &DomainName {
        match self {
            Retrieval::Absent { domain } => domain,
            Retrieval::Expired(record) | Retrieval::Active(record) => &record.domain,
        }
    }

    pub fn state(&self) -> CertificateState {
        match self {
            Retrieval::Absent { .. } => CertificateState::Absent,
            Retrieval::Expired(_) => CertificateState::Expired,
            Retrieval::Active(_) => CertificateState::Active,
        }
    }

    pub fn trusted(&self) -> bool {
        matches!(self, Retrieval::Active(_))
    }

    /// One-line human readable status
    pub fn status_line(&self) -> String {
        match self {
            Retrieval::Absent { domain } => format!(
                "This domain doesn't exist: {domain}. Submit a cert request to /certcreate/{domain}"
            ),
            Retrieval::Expired(record) => {
                format!("{} expired, not trusted", record.domain)
            }
            Retrieval::Active(record) => format!(
                "{} trusted until {}",
                record.domain,
                record.expires_at.to_rfc3339()
            ),
        }
    }
}

/// Create, retrieve, and list certificate records.
#[derive(Debug, Clone)]
pub struct CertificateService {
    store: RecordStore,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    issue_delay: Duration,
}

impl CertificateService {
    /// Service with the default 10 minute TTL and 10 second issuance delay.
    pub fn new(store: RecordStore, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            ttl: DEFAULT_TTL,
            issue_delay: DEFAULT_ISSUE_DELAY,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Delay applied after every create. Zero disables it.
    pub fn with_issue_delay(mut self, delay: Duration) -> Self {
        self.issue_delay = delay;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn issue_delay(&self) -> Duration {
        self.issue_delay
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Issue (or reissue) a certificate valid for one TTL from now.
    ///
    /// The pooled connection is returned before the issuance delay starts, so
    /// concurrent creators wait in parallel without holding pool slots. A
    /// failed write is still reported only after the delay.
    pub async fn create(&self, input: &str) -> Result<CreateAck, ServiceError> {
        let domain = DomainName::parse(input)?;
        let record = CertificateRecord::issue(domain, self.clock.now(), self.ttl);

        trace!(domain = %record.domain, "Creating certificate record");
        let written = self.store.put(&record.domain, record.expires_at).await;

        if !self.issue_delay.is_zero() {
            tokio::time::sleep(self.issue_delay).await;
        }

        if let Err(e) = written {
            warn!(domain = %record.domain, error = %e, "Certificate creation failed");
            return Err(e.into());
        }

        info!(
            domain = %record.domain,
            expires_at = %record.expires_at,
            "Issued certificate"
        );
        Ok(CreateAck { record })
    }

    /// Rewrite a record with a fresh TTL and no issuance delay.
    pub async fn renew(&self, domain: &DomainName) -> Result<CertificateRecord, StoreError> {
        let record = CertificateRecord::issue(domain.clone(), self.clock.now(), self.ttl);
        self.store.put(&record.domain, record.expires_at).await?;
        debug!(domain = %record.domain, expires_at = %record.expires_at, "Renewed certificate");
        Ok(record)
    }

    /// Report whether a domain holds a trusted certificate right now.
    pub async fn retrieve(&self, input: &str) -> Result<Retrieval, ServiceError> {
        let domain = DomainName::parse(input)?;

        let record = match self.store.get(&domain).await {
            Ok(record) => record,
            Err(e) if e.is_not_found() => return Ok(Retrieval::Absent { domain }),
            Err(e) => return Err(e.into()),
        };

        let retrieval = match record.state_at(self.clock.now()) {
            CertificateState::Active => Retrieval::Active(record),
            _ => Retrieval::Expired(record),
        };

        trace!(domain = %retrieval.domain(), state = %retrieval.state(), "Retrieved certificate");
        Ok(retrieval)
    }

    /// Backend health. Any failure reads as unhealthy.
    pub async fn ping(&self) -> bool {
        match self.store.ping().await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Backend ping failed");
                false
            }
        }
    }

    /// Every stored record, expired or not, sorted by domain.
    pub async fn list_all(&self) -> Result<Vec<CertificateRecord>, ServiceError> {
        Ok(self.store.list().await?)
    }

    /// Names of every stored record.
    pub async fn list_domains(&self) -> Result<Vec<DomainName>, ServiceError> {
        Ok(self
            .list_all()
            .await?
            .into_iter()
            .map(|record| record.domain)
            .collect())
    }
}
