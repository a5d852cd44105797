//! The HTTP surface served on a real socket.

use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

use certsvc_common::SystemClock;
use certsvc_config::Config;
use certsvc_server::{http, App};

async fn get(addr: std::net::SocketAddr, path: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!(
        "GET {} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
        path
    );
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    response
}

#[tokio::test]
async fn test_serve_and_shutdown() {
    let mut config = Config::default();
    config.backend.url = "memory://".to_string();
    config.issuance.issue_delay_secs = 0;

    let app = App::from_config(&config, Arc::new(SystemClock::new())).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let stop = CancellationToken::new();
    let server = tokio::spawn(http::serve(
        listener,
        app.router(),
        stop.clone().cancelled_owned(),
    ));

    let created = get(addr, "/certcreate/fanatics.com").await;
    assert!(created.starts_with("HTTP/1.1 200"));
    assert!(created.ends_with("<h1>OK</h1>"));

    let retrieved = get(addr, "/CERT/fanatics.com").await;
    assert!(retrieved.contains("fanatics.com trusted until"));

    let rejected = get(addr, "/cert/Fanatics").await;
    assert!(rejected.starts_with("HTTP/1.1 400"));

    stop.cancel();
    server.await.unwrap().unwrap();
}
