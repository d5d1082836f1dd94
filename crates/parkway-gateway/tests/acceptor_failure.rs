//! Runs in its own binary: it lowers the process file descriptor limit.
#![cfg(unix)]

use std::net::SocketAddr;
use std::os::fd::AsRawFd;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parkway_common::Error;
use parkway_gateway::{ConnectionHandler, LifecycleSupervisor, ServerState, ShutdownSignal};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::mpsc;

struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Ignores shutdown and never completes on its own.
#[derive(Clone)]
struct StuckHandler {
    started: mpsc::UnboundedSender<()>,
    dropped: Arc<AtomicBool>,
}

#[async_trait]
impl ConnectionHandler for StuckHandler {
    async fn handle(&self, _stream: TcpStream, _peer: SocketAddr, _shutdown: ShutdownSignal) {
        let _flag = DropFlag(self.dropped.clone());
        let _ = self.started.send(());
        std::future::pending::<()>().await;
    }
}

fn nofile_limit() -> libc::rlimit {
    let mut limit = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    let rc = unsafe { libc::getrlimit(libc::RLIMIT_NOFILE, &mut limit) };
    assert_eq!(rc, 0, "getrlimit failed");
    limit
}

fn set_nofile_limit(limit: &libc::rlimit) {
    let rc = unsafe { libc::setrlimit(libc::RLIMIT_NOFILE, limit) };
    assert_eq!(rc, 0, "setrlimit failed");
}

/// Lowest descriptor number the kernel would hand out next.
fn lowest_free_fd(any_open: i32) -> i32 {
    let fd = unsafe { libc::fcntl(any_open, libc::F_DUPFD, 0) };
    assert!(fd >= 0, "fcntl(F_DUPFD) failed");
    unsafe { libc::close(fd) };
    fd
}

#[tokio::test]
async fn accept_error_aborts_connections_and_stops() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let supervisor =
        LifecycleSupervisor::new(listener, Duration::from_secs(5)).without_os_signals();
    let addr = supervisor.local_addr().unwrap();
    let trigger = supervisor.shutdown_trigger();
    let state = supervisor.state();

    let (started, mut started_rx) = mpsc::unbounded_channel();
    let dropped = Arc::new(AtomicBool::new(false));
    let handler = StuckHandler {
        started,
        dropped: dropped.clone(),
    };
    let server = tokio::spawn(supervisor.run(handler));

    let first = TcpStream::connect(addr).await.unwrap();
    tokio::time::timeout(Duration::from_secs(2), started_rx.recv())
        .await
        .expect("first connection was not accepted");

    // Allocate the second client's descriptor now; connecting needs no new one.
    let second = TcpSocket::new_v4().unwrap();

    let original = nofile_limit();
    let lowered = libc::rlimit {
        rlim_cur: lowest_free_fd(first.as_raw_fd()) as libc::rlim_t,
        rlim_max: original.rlim_max,
    };
    set_nofile_limit(&lowered);

    // The server cannot allocate a descriptor for this one.
    let _second = second.connect(addr).await;
    let result = tokio::time::timeout(Duration::from_secs(2), server).await;
    set_nofile_limit(&original);

    let result = result
        .expect("supervisor kept running after accept failed")
        .unwrap();
    match result {
        Err(Error::Acceptor(e)) => assert_eq!(e.raw_os_error(), Some(libc::EMFILE)),
        other => panic!("expected an acceptor error, got {other:?}"),
    }
    assert_eq!(*state.borrow(), ServerState::Stopped);
    assert!(dropped.load(Ordering::SeqCst), "stuck connection was not closed");
    assert!(trigger.is_fired());
    assert_eq!(trigger.reason(), Some("acceptor failure"));
}
