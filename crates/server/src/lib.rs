//! Certificate record lifecycle service.
//!
//! - [`service`]: create, retrieve, ping, and list operations
//! - [`renewal`]: background renewal of the service's own identity record
//! - [`dispatch`]: transport-neutral request routing
//! - [`http`]: axum surface over the dispatcher
//! - [`app`]: wiring from configuration to running components

pub mod app;
pub mod dispatch;
pub mod http;
pub mod renewal;
pub mod service;

pub use app::{pool_config, App};
pub use dispatch::{Dispatcher, Request, Response};
pub use renewal::{IdentityRenewer, RenewalHandle, MIN_RENEWAL_INTERVAL};
pub use service::{CertificateService, CreateAck, Retrieval, ServiceError};
