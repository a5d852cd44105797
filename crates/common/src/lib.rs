//! Common types for the certsvc certificate record service.
//!
//! - [`domain`]: domain name validation and the [`DomainName`] newtype
//! - [`types`]: [`CertificateRecord`], lifecycle states and defaults
//! - [`clock`]: injectable wall-clock source

pub mod clock;
pub mod domain;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use domain::{is_valid_domain, DomainName, InvalidDomain};
pub use types::{
    CertificateRecord, CertificateState, DEFAULT_IDENTITY_DOMAIN, DEFAULT_ISSUE_DELAY,
    DEFAULT_RENEWAL_MARGIN, DEFAULT_TTL, RECORD_COLLECTION,
};
