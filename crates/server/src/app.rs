//! Wiring from configuration to running components.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tracing::info;

use certsvc_common::{Clock, DomainName};
use certsvc_config::{BackendConfig, Config};
use certsvc_store::{Backend, ConnectionPool, PoolConfig, RecordStore};

use crate::dispatch::Dispatcher;
use crate::http;
use crate::renewal::IdentityRenewer;
use crate::service::{CertificateService, ServiceError};

/// Pool settings for a backend block
pub fn pool_config(backend: &BackendConfig) -> PoolConfig {
    PoolConfig {
        max_idle: backend.max_idle,
        max_active: backend.max_active,
        acquire_timeout: backend.acquire_timeout(),
        connect_timeout: backend.connect_timeout(),
        idle_timeout: backend.idle_timeout(),
    }
}

/// Assembled service components.
///
/// Nothing is dialed or spawned until the renewer is started or a request
/// arrives.
#[derive(Debug, Clone)]
pub struct App {
    pub service: Arc<CertificateService>,
    pub dispatcher: Arc<Dispatcher>,
    pub identity: DomainName,
    pub renewal_interval: Duration,
}

impl App {
    /// Build from configuration, selecting the backend from its URL.
    pub fn from_config(config: &Config, clock: Arc<dyn Clock>) -> Result<Self, ServiceError> {
        let backend = Backend::from_url(&config.backend.url)?;
        Self::with_backend(config, backend, clock)
    }

    /// Build from configuration over an explicit backend.
    pub fn with_backend(
        config: &Config,
        backend: Backend,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ServiceError> {
        let identity = DomainName::parse(&config.issuance.identity_domain)?;
        let pool = ConnectionPool::new(backend, pool_config(&config.backend));

        let service = Arc::new(
            CertificateService::new(RecordStore::new(pool), clock)
                .with_ttl(config.issuance.ttl())
                .with_issue_delay(config.issuance.issue_delay()),
        );
        let dispatcher = Arc::new(Dispatcher::new(service.clone(), identity.clone()));

        info!(
            identity = %identity,
            ttl_secs = config.issuance.ttl_secs,
            issue_delay_secs = config.issuance.issue_delay_secs,
            "Certificate service assembled"
        );

        Ok(Self {
            service,
            dispatcher,
            identity,
            renewal_interval: config.issuance.renewal_interval(),
        })
    }

    /// Renewer for the identity record
    pub fn renewer(&self) -> IdentityRenewer {
        IdentityRenewer::new(
            self.service.clone(),
            self.identity.clone(),
            self.renewal_interval,
        )
    }

    /// HTTP router over the dispatcher
    pub fn router(&self) -> Router {
        http::router(self.dispatcher.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use certsvc_common::ManualClock;

    fn memory_config() -> Config {
        let mut config = Config::default();
        config.backend.url = "memory://".to_string();
        config.backend.max_idle = 2;
        config.backend.max_active = 8;
        config
    }

    #[test]
    fn test_pool_config_mapping() {
        let mut backend = BackendConfig::default();
        backend.acquire_timeout_ms = 250;
        backend.idle_timeout_secs = 30;

        let pool = pool_config(&backend);
        assert_eq!(pool.max_idle, 80);
        assert_eq!(pool.max_active, 12_000);
        assert_eq!(pool.acquire_timeout, Duration::from_millis(250));
        assert_eq!(pool.idle_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_from_config() {
        let app = App::from_config(&memory_config(), Arc::new(ManualClock::at_unix(0))).unwrap();

        assert_eq!(app.identity.as_str(), "certserver.fan");
        assert_eq!(app.renewal_interval, Duration::from_secs(540));
        assert_eq!(app.service.ttl(), Duration::from_secs(600));
        assert_eq!(app.service.issue_delay(), Duration::from_secs(10));
        assert_eq!(app.service.store().pool().config().max_active, 8);
        assert_eq!(app.renewer().interval(), Duration::from_secs(540));
    }

    #[test]
    fn test_bad_identity_rejected() {
        let mut config = memory_config();
        config.issuance.identity_domain = "not a domain".to_string();

        let err = App::from_config(&config, Arc::new(ManualClock::at_unix(0))).unwrap_err();
        assert!(matches!(err, ServiceError::InvalidDomain(_)));
    }

    #[test]
    fn test_bad_backend_url_rejected() {
        let mut config = memory_config();
        config.backend.url = "postgres://db".to_string();

        let err = App::from_config(&config, Arc::new(ManualClock::at_unix(0))).unwrap_err();
        assert!(matches!(err, ServiceError::Store(_)));
    }
}
