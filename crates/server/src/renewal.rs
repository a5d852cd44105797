//! Background renewal of the service's own identity certificate.
//!
//! The identity record is written once when the renewer starts, then again
//! every `TTL - renewal margin`, so it is always rewritten before it expires.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use certsvc_common::DomainName;

use crate::service::{CertificateService, ServiceError};

/// Minimum renewal interval (1 second)
pub const MIN_RENEWAL_INTERVAL: Duration = Duration::from_secs(1);

/// Keeps the identity record fresh.
#[derive(Debug, Clone)]
pub struct IdentityRenewer {
    service: Arc<CertificateService>,
    identity: DomainName,
    interval: Duration,
}

impl IdentityRenewer {
    /// Create a renewer for `identity`, renewing every `interval`.
    ///
    /// The interval is clamped to [`MIN_RENEWAL_INTERVAL`].
    pub fn new(service: Arc<CertificateService>, identity: DomainName, interval: Duration) -> Self {
        Self {
            service,
            identity,
            interval: interval.max(MIN_RENEWAL_INTERVAL),
        }
    }

    pub fn identity(&self) -> &DomainName {
        &self.identity
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Issue the identity record and spawn the renewal loop.
    ///
    /// Fails with [`ServiceError::FatalStartup`] if the first write fails; no
    /// task is spawned in that case.
    pub async fn start(self) -> Result<RenewalHandle, ServiceError> {
        let record = self.service.renew(&self.identity).await.map_err(|source| {
            ServiceError::FatalStartup {
                domain: self.identity.to_string(),
                source,
            }
        })?;

        info!(
            domain = %self.identity,
            expires_at = %record.expires_at,
            interval_secs = self.interval.as_secs(),
            "Issued identity certificate, starting renewal loop"
        );

        let cancel = CancellationToken::new();
        let task = tokio::spawn(self.run(cancel.clone()));

        Ok(RenewalHandle {
            cancel,
            task: Some(task),
        })
    }

    async fn run(self, cancel: CancellationToken) -> Result<(), ServiceError> {
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut renewals: u64 = 0;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(domain = %self.identity, renewals, "Identity renewal stopped");
                    return Ok(());
                }
                _ = ticker.tick() => {
                    match self.service.renew(&self.identity).await {
                        Ok(record) => {
                            renewals += 1;
                            debug!(
                                domain = %self.identity,
                                expires_at = %record.expires_at,
                                renewals,
                                "Renewed identity certificate"
                            );
                        }
                        Err(source) => {
                            error!(
                                domain = %self.identity,
                                error = %source,
                                "Identity certificate renewal failed"
                            );
                            return Err(ServiceError::RenewalFailed {
                                domain: self.identity.to_string(),
                                source,
                            });
                        }
                    }
                }
            }
        }
    }
}

/// Owner of a running renewal loop.
///
/// Dropping the handle stops the loop.
#[derive(Debug)]
pub struct RenewalHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<Result<(), ServiceError>>>,
}

impl RenewalHandle {
    /// Whether the loop has exited, either by shutdown or failure
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |task| task.is_finished())
    }

    /// Wait for the loop to exit.
    ///
    /// Only returns on its own when a renewal fails. Cancel-safe: dropping
    /// the future leaves the handle usable.
    pub async fn wait(&mut self) -> Result<(), ServiceError> {
        let Some(task) = self.task.as_mut() else {
            return Ok(());
        };
        let outcome = task.await;
        self.task = None;

        match outcome {
            Ok(result) => result,
            Err(e) => Err(ServiceError::RenewalTask(e.to_string())),
        }
    }

    /// Stop the loop and wait for it to exit.
    pub async fn shutdown(mut self) -> Result<(), ServiceError> {
        self.cancel.cancel();
        self.wait().await
    }
}

impl Drop for RenewalHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use certsvc_common::{CertificateState, Clock, ManualClock};
    use certsvc_store::{Backend, ConnectionPool, MemoryBackend, PoolConfig, RecordStore};
    use chrono::Duration as ChronoDuration;

    fn renewer(interval: Duration) -> (MemoryBackend, ManualClock, IdentityRenewer) {
        let memory = MemoryBackend::new();
        let pool = ConnectionPool::new(Backend::Memory(memory.clone()), PoolConfig::default());
        let clock = ManualClock::at_unix(1_700_000_000);
        let service = Arc::new(
            CertificateService::new(RecordStore::new(pool), Arc::new(clock.clone()))
                .with_issue_delay(Duration::from_secs(10)),
        );
        let identity = DomainName::parse("certserver.fan").unwrap();
        (memory, clock, IdentityRenewer::new(service, identity, interval))
    }

    #[test]
    fn test_interval_clamped() {
        let (_, _, renewer) = renewer(Duration::ZERO);
        assert_eq!(renewer.interval(), MIN_RENEWAL_INTERVAL);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_issues_immediately_without_delay() {
        let (_, _, renewer) = renewer(Duration::from_secs(540));
        let service = renewer.service.clone();

        let started = Instant::now();
        let handle = renewer.start().await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(1));

        let retrieval = service.retrieve("certserver.fan").await.unwrap();
        assert_eq!(retrieval.state(), CertificateState::Active);
        assert!(retrieval.trusted());

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_start_fails_when_backend_down() {
        let (memory, _, renewer) = renewer(Duration::from_secs(540));
        memory.set_online(false);

        let err = renewer.start().await.unwrap_err();
        assert!(matches!(err, ServiceError::FatalStartup { .. }));
        assert!(err.to_string().contains("certserver.fan"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_renews_every_interval() {
        let (memory, clock, renewer) = renewer(Duration::from_secs(540));
        let service = renewer.service.clone();
        let handle = renewer.start().await.unwrap();
        let first_write = memory.raw_value("Domain", "certserver.fan");

        // Walk well past one TTL in 60 second steps, keeping both clocks aligned
        for _ in 0..30 {
            tokio::time::advance(Duration::from_secs(60)).await;
            clock.advance(ChronoDuration::seconds(60));
            for _ in 0..4 {
                tokio::task::yield_now().await;
            }

            let retrieval = service.retrieve("certserver.fan").await.unwrap();
            assert!(retrieval.trusted(), "identity expired at {}", clock.now());
        }

        assert_ne!(memory.raw_value("Domain", "certserver.fan"), first_write);
        assert!(!handle.is_finished());
        handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_later_failure_ends_task() {
        let (memory, _, renewer) = renewer(Duration::from_secs(540));
        let mut handle = renewer.start().await.unwrap();

        memory.set_online(false);
        tokio::time::advance(Duration::from_secs(541)).await;

        let err = handle.wait().await.unwrap_err();
        assert!(matches!(err, ServiceError::RenewalFailed { .. }));
        assert!(handle.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_loop() {
        let (memory, _, renewer) = renewer(Duration::from_secs(540));
        let handle = renewer.start().await.unwrap();
        handle.shutdown().await.unwrap();

        let writes = memory.operation_count();
        tokio::time::advance(Duration::from_secs(3600)).await;
        assert_eq!(memory.operation_count(), writes);
    }
}
