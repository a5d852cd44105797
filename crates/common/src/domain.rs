//! Validated domain names.
//!
//! Every store operation is keyed by a [`DomainName`], so a malformed name is
//! rejected before any backend access. The accepted grammar is deliberately
//! narrow: one label, a dot, and an alphabetic extension.
//!
//! ```text
//! fanatics.com      valid
//! Fanatics.COM      valid, canonicalized to "fanatics.com"
//! fanatics          invalid (no extension)
//! fanatics.co.uk    invalid (multi-label names are not supported)
//! ```

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Label of 1-62 alphanumeric/hyphen characters ending in an alphanumeric,
/// a dot, then a 2-62 letter extension.
static DOMAIN_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9-]{0,61}[A-Za-z0-9]\.[A-Za-z]{2,62}$")
        .expect("domain pattern is a valid regex")
});

/// Check a raw string against the domain grammar.
pub fn is_valid_domain(name: &str) -> bool {
    DOMAIN_PATTERN.is_match(name)
}

/// Rejection returned for a string that is not a valid domain name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid domain name: {input}")]
pub struct InvalidDomain {
    /// The rejected input, as received
    pub input: String,
}

/// A syntactically valid, lowercase domain name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DomainName(String);

impl DomainName {
    /// Validate and canonicalize a domain name.
    pub fn parse(input: &str) -> Result<Self, InvalidDomain> {
        if is_valid_domain(input) {
            Ok(Self(input.to_ascii_lowercase()))
        } else {
            Err(InvalidDomain {
                input: input.to_string(),
            })
        }
    }

    /// Get the canonical string value
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Convert to owned String
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for DomainName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DomainName {
    type Err = InvalidDomain;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for DomainName {
    type Error = InvalidDomain;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<DomainName> for String {
    fn from(name: DomainName) -> Self {
        name.0
    }
}

impl AsRef<str> for DomainName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
