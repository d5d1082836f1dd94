use std::net::SocketAddr;

use async_trait::async_trait;
use axum::Router;
use hyper::Request;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper_util::rt::TokioIo;
use tokio::net::TcpStream;
use tower::ServiceExt;
use tracing::debug;

use crate::lifecycle::{ConnectionHandler, ShutdownSignal};

/// Serves an axum `Router` over a single HTTP/1.1 connection.
///
/// Requests run inside the connection future rather than on tasks of their
/// own, so aborting the connection task also drops any handler in progress.
#[derive(Clone)]
pub struct HttpConnectionHandler {
    router: Router,
}

impl HttpConnectionHandler {
    pub fn new(router: Router) -> Self {
        Self { router }
    }
}

#[async_trait]
impl ConnectionHandler for HttpConnectionHandler {
    async fn handle(&self, stream: TcpStream, peer: SocketAddr, mut shutdown: ShutdownSignal) {
        let router = self.router.clone();
        let service = hyper::service::service_fn(move |request: Request<Incoming>| {
            router.clone().oneshot(request)
        });

        let conn = http1::Builder::new()
            .serve_connection(TokioIo::new(stream), service)
            .with_upgrades();
        tokio::pin!(conn);

        // On shutdown, let the request in progress finish and close idle
        // keep-alive connections instead of waiting out the grace period.
        let mut draining = false;
        loop {
            tokio::select! {
                result = conn.as_mut() => {
                    if let Err(e) = result {
                        debug!(%peer, "connection closed with error: {e}");
                    }
                    break;
                }
                _ = shutdown.wait(), if !draining => {
                    debug!(%peer, "closing connection for shutdown");
                    draining = true;
                    conn.as_mut().graceful_shutdown();
                }
            }
        }
    }
}
