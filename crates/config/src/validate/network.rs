//! Network connectivity validation
//!
//! Checks that the Redis host named by the backend URL accepts TCP
//! connections.

use super::{ErrorCategory, ValidationError, ValidationResult, ValidationWarning};
use crate::Config;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use url::Url;

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_REDIS_PORT: u16 = 6379;

/// Validate backend connectivity
pub async fn validate_backend_reachable(config: &Config) -> ValidationResult {
    let mut result = ValidationResult::new();

    if config.backend.is_memory() {
        return result;
    }

    let address = match probe_address(&config.backend.url) {
        Ok(address) => address,
        Err(reason) => {
            result.add_error(ValidationError::new(
                ErrorCategory::Network,
                format!("Backend url '{}' is not usable: {}", config.backend.url, reason),
            ));
            return result;
        }
    };

    match timeout(PROBE_TIMEOUT, TcpStream::connect(&address)).await {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => {
            result.add_error(ValidationError::new(
                ErrorCategory::Network,
                format!("Backend '{}' unreachable: {}", address, e),
            ));
        }
        Err(_) => {
            result.add_warning(ValidationWarning::new(format!(
                "Backend '{}' connection timeout ({}s)",
                address,
                PROBE_TIMEOUT.as_secs()
            )));
        }
    }

    result
}

/// `host:port` to probe for a backend URL
fn probe_address(raw: &str) -> Result<String, String> {
    let url = Url::parse(raw).map_err(|e| e.to_string())?;
    let host = url.host_str().ok_or_else(|| "missing host".to_string())?;
    let port = url.port().unwrap_or(DEFAULT_REDIS_PORT);
    Ok(format!("{}:{}", host, port))
}
