//! HTTP surface.
//!
//! Every path goes through a single fallback handler so that prefix matching
//! stays case-insensitive, as the dispatcher defines it.

use std::future::Future;
use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, Uri};
use axum::response::IntoResponse;
use axum::Router;
use tokio::net::TcpListener;
use tracing::{info, trace};

use crate::dispatch::{Dispatcher, Response};

/// Build the router for a dispatcher
pub fn router(dispatcher: Arc<Dispatcher>) -> Router {
    Router::new().fallback(handle).with_state(dispatcher)
}

async fn handle(State(dispatcher): State<Arc<Dispatcher>>, uri: Uri) -> Response {
    trace!(path = %uri.path(), "HTTP request");
    dispatcher.dispatch_path(uri.path()).await
}

impl IntoResponse for Response {
    fn into_response(self) -> axum::response::Response {
        (self.status, [(header::CONTENT_TYPE, self.content_type)], self.body).into_response()
    }
}

/// Serve until `shutdown` resolves, then drain in-flight requests.
pub async fn serve<F>(listener: TcpListener, router: Router, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!(address = %addr, "HTTP listening");
    }
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use certsvc_common::{DomainName, ManualClock};
    use certsvc_store::{Backend, ConnectionPool, MemoryBackend, PoolConfig, RecordStore};
    use std::time::Duration;
    use tower::ServiceExt;

    use crate::service::CertificateService;

    fn app() -> Router {
        let pool = ConnectionPool::new(
            Backend::Memory(MemoryBackend::new()),
            PoolConfig::default(),
        );
        let service = CertificateService::new(
            RecordStore::new(pool),
            Arc::new(ManualClock::at_unix(1_700_000_000)),
        )
        .with_issue_delay(Duration::ZERO);
        let identity = DomainName::parse("certserver.fan").unwrap();
        router(Arc::new(Dispatcher::new(Arc::new(service), identity)))
    }

    async fn get(app: &Router, path: &str) -> (StatusCode, String, String) {
        let response = app
            .clone()
            .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, content_type, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_create_and_retrieve_over_http() {
        let app = app();

        let (status, content_type, body) = get(&app, "/CERTCREATE/fanatics.com").await;
        assert_eq!(status, StatusCode::OK);
        assert!(content_type.starts_with("text/html"));
        assert_eq!(body, "<h1>OK</h1>");

        let (status, _, body) = get(&app, "/cert/FANATICS.COM").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("fanatics.com trusted until"));
    }

    #[tokio::test]
    async fn test_absent_over_http() {
        let (status, _, body) = get(&app(), "/cert/nobody.org").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("doesn't exist: nobody.org"));
    }

    #[tokio::test]
    async fn test_rejects_invalid_domain() {
        let (status, _, body) = get(&app(), "/certcreate/Fanatics.co.uk").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains("Invalid domain name"));
    }

    #[tokio::test]
    async fn test_ping_and_listing() {
        let app = app();

        let (status, _, body) = get(&app, "/ping").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "PONG");

        get(&app, "/certcreate/a.com").await;
        let (status, content_type, body) = get(&app, "/certs").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type, "application/json");
        assert!(body.contains("\"domain\":\"a.com\""));
    }

    #[tokio::test]
    async fn test_unknown_path_is_index() {
        let (status, _, body) = get(&app(), "/favicon.ico").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("/cert/{domain}"));
    }
}
