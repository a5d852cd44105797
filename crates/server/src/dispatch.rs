//! Request routing independent of the HTTP stack.
//!
//! | Path                   | Operation |
//! |------------------------|-----------|
//! | `/certcreate/{domain}` | create    |
//! | `/cert/{domain}`       | retrieve  |
//! | `/ping`                | ping      |
//! | `/certs`               | list all  |
//! | anything else          | index     |
//!
//! Prefixes match case-insensitively.

use std::sync::Arc;

use axum::http::StatusCode;
use serde::Serialize;
use tracing::{debug, warn};

use certsvc_common::{DomainName, InvalidDomain};
use certsvc_store::StoreError;

use crate::service::{CertificateService, ServiceError};

const CREATE_PREFIX: &str = "/certcreate/";
const RETRIEVE_PREFIX: &str = "/cert/";

/// A routed request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Create(String),
    Retrieve(String),
    Ping,
    ListAll,
    Index,
}

impl Request {
    /// Route a request path. The domain segment is passed through untouched
    /// apart from a trailing slash; validation happens in the service.
    pub fn from_path(path: &str) -> Self {
        if let Some(rest) = strip_prefix_ignore_case(path, CREATE_PREFIX) {
            return Request::Create(rest.trim_end_matches('/').to_string());
        }
        if let Some(rest) = strip_prefix_ignore_case(path, RETRIEVE_PREFIX) {
            return Request::Retrieve(rest.trim_end_matches('/').to_string());
        }

        let trimmed = path.trim_end_matches('/');
        if trimmed.eq_ignore_ascii_case("/ping") {
            Request::Ping
        } else if trimmed.eq_ignore_ascii_case("/certs") {
            Request::ListAll
        } else {
            Request::Index
        }
    }

    pub fn operation(&self) -> &'static str {
        match self {
            Request::Create(_) => "create",
            Request::Retrieve(_) => "retrieve",
            Request::Ping => "ping",
            Request::ListAll => "list_all",
            Request::Index => "index",
        }
    }
}

fn strip_prefix_ignore_case<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    let head = path.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        path.get(prefix.len()..)
    } else {
        None
    }
}

/// Transport-neutral response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: StatusCode,
    pub content_type: &'static str,
    pub body: String,
}

impl Response {
    fn html(status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type: "text/html; charset=utf-8",
            body: body.into(),
        }
    }

    fn heading(status: StatusCode, text: &str) -> Self {
        Self::html(status, format!("<h1>{}</h1>", escape_html(text)))
    }

    fn text(status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type: "text/plain; charset=utf-8",
            body: body.into(),
        }
    }

    fn json(body: String) -> Self {
        Self {
            status: StatusCode::OK,
            content_type: "application/json",
            body,
        }
    }
}

/// Entry in the `/certs` listing
#[derive(Debug, Serialize)]
struct ListedRecord<'a> {
    domain: &'a str,
    expires_at: String,
    active: bool,
}

/// Routes requests to the certificate service.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    service: Arc<CertificateService>,
    identity: DomainName,
}

impl Dispatcher {
    pub fn new(service: Arc<CertificateService>, identity: DomainName) -> Self {
        Self { service, identity }
    }

    pub fn service(&self) -> &Arc<CertificateService> {
        &self.service
    }

    /// Route and execute a request path
    pub async fn dispatch_path(&self, path: &str) -> Response {
        self.dispatch(Request::from_path(path)).await
    }

    pub async fn dispatch(&self, request: Request) -> Response {
        debug!(operation = request.operation(), "Dispatching request");

        match request {
            Request::Create(domain) => match self.service.create(&domain).await {
                Ok(ack) => Response::heading(StatusCode::OK, ack.message()),
                Err(e) => error_response(&e),
            },
            Request::Retrieve(domain) => match self.service.retrieve(&domain).await {
                Ok(retrieval) => Response::heading(StatusCode::OK, &retrieval.status_line()),
                Err(e) => error_response(&e),
            },
            Request::Ping => {
                if self.service.ping().await {
                    Response::text(StatusCode::OK, "PONG")
                } else {
                    Response::text(StatusCode::SERVICE_UNAVAILABLE, "backend unavailable")
                }
            }
            Request::ListAll => self.list_all().await,
            Request::Index => Response::html(StatusCode::OK, self.index()),
        }
    }

    async fn list_all(&self) -> Response {
        let records = match self.service.list_all().await {
            Ok(records) => records,
            Err(e) => return error_response(&e),
        };

        let now = self.service.clock().now();
        let listed: Vec<ListedRecord<'_>> = records
            .iter()
            .map(|record| ListedRecord {
                domain: record.domain.as_str(),
                expires_at: record.expires_at.to_rfc3339(),
                active: record.is_active_at(now),
            })
            .collect();

        match serde_json::to_string(&listed) {
            Ok(body) => Response::json(body),
            Err(e) => {
                warn!(error = %e, "Failed to encode certificate listing");
                Response::text(StatusCode::INTERNAL_SERVER_ERROR, "failed to encode listing")
            }
        }
    }

    fn index(&self) -> String {
        format!(
            "<h1>Certificate record service for {identity}</h1>\
             <p>Request a certificate: /certcreate/{{domain}}</p>\
             <p>Check a certificate: /cert/{{domain}}</p>\
             <p>Backend health: /ping</p>\
             <p>All records: /certs</p>",
            identity = self.identity
        )
    }
}

fn error_response(err: &ServiceError) -> Response {
    match err {
        ServiceError::InvalidDomain(InvalidDomain { input }) => {
            debug!(input = %input, "Rejected invalid domain");
            Response::heading(
                StatusCode::BAD_REQUEST,
                &format!("Invalid domain name: {input}"),
            )
        }
        ServiceError::Store(e) => {
            warn!(error = %e, "Backend failure while serving request");
            Response::heading(store_status(e), &format!("Backend failure: {e}"))
        }
        other => {
            warn!(error = %other, "Service failure while serving request");
            Response::heading(StatusCode::INTERNAL_SERVER_ERROR, &other.to_string())
        }
    }
}

fn store_status(err: &StoreError) -> StatusCode {
    match err {
        StoreError::PoolExhausted { .. } | StoreError::PoolClosed => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        _ => StatusCode::BAD_GATEWAY,
    }
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            c => out.push(c),
        }
    }
    out
}
