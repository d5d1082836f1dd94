use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use axum::Router;
use axum::routing::get;
use parkway_gateway::{HttpConnectionHandler, LifecycleSupervisor, ServerState};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Router with a `/slow` route that takes three seconds to answer.
fn slow_router(
    started: mpsc::UnboundedSender<()>,
    dropped: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
) -> Router {
    Router::new().route(
        "/slow",
        get(move || {
            let started = started.clone();
            let dropped = dropped.clone();
            let finished = finished.clone();
            async move {
                let _flag = DropFlag(dropped);
                let _ = started.send(());
                tokio::time::sleep(Duration::from_secs(3)).await;
                finished.store(true, Ordering::SeqCst);
                "done"
            }
        }),
    )
}

async fn read_all(mut stream: TcpStream) -> Vec<u8> {
    let mut buf = Vec::new();
    let _ = stream.read_to_end(&mut buf).await;
    buf
}

#[tokio::test]
async fn slow_request_is_dropped_before_stopped() {
    let (started_tx, mut started) = mpsc::unbounded_channel();
    let dropped = Arc::new(AtomicBool::new(false));
    let finished = Arc::new(AtomicBool::new(false));
    let router = slow_router(started_tx, dropped.clone(), finished.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let supervisor =
        LifecycleSupervisor::new(listener, Duration::from_millis(300)).without_os_signals();
    let addr = supervisor.local_addr().unwrap();
    let trigger = supervisor.shutdown_trigger();
    let state = supervisor.state();
    let server = tokio::spawn(supervisor.run(HttpConnectionHandler::new(router)));

    let mut client = TcpStream::connect(addr).await.unwrap();
    client
        .write_all(b"GET /slow HTTP/1.1\r\nHost: localhost\r\n\r\n")
        .await
        .unwrap();
    let client = tokio::spawn(read_all(client));

    tokio::time::timeout(Duration::from_secs(2), started.recv())
        .await
        .expect("handler never started");

    let begin = Instant::now();
    trigger.fire("test");
    server.await.unwrap().unwrap();
    let elapsed = begin.elapsed();

    assert_eq!(*state.borrow(), ServerState::Stopped);
    assert!(
        dropped.load(Ordering::SeqCst),
        "handler was still alive when the server reported stopped"
    );
    assert!(!finished.load(Ordering::SeqCst));
    assert!(elapsed < Duration::from_secs(2), "stop took {elapsed:?}");

    let response = tokio::time::timeout(Duration::from_secs(2), client)
        .await
        .expect("client connection was not closed")
        .unwrap();
    assert!(!response.starts_with(b"HTTP/1.1 200"));
}

#[tokio::test]
async fn http2_prior_knowledge_is_not_served() {
    let (started_tx, mut started) = mpsc::unbounded_channel();
    let router = slow_router(
        started_tx,
        Arc::new(AtomicBool::new(false)),
        Arc::new(AtomicBool::new(false)),
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let supervisor =
        LifecycleSupervisor::new(listener, Duration::from_millis(300)).without_os_signals();
    let addr = supervisor.local_addr().unwrap();
    let trigger = supervisor.shutdown_trigger();
    let server = tokio::spawn(supervisor.run(HttpConnectionHandler::new(router)));

    let mut client = TcpStream::connect(addr).await.unwrap();
    client
        .write_all(b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n")
        .await
        .unwrap();

    let response = tokio::time::timeout(Duration::from_secs(2), read_all(client))
        .await
        .expect("server kept the HTTP/2 connection open");
    assert!(
        response.is_empty() || response.starts_with(b"HTTP/1.1 "),
        "unexpected reply to HTTP/2 preface: {response:?}"
    );
    assert!(started.try_recv().is_err());

    trigger.fire("test");
    server.await.unwrap().unwrap();
}
