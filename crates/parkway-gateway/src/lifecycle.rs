//! Server lifecycle: accept, serve concurrently, shut down within a bound.
//!
//! [`LifecycleSupervisor::run`] drives `Created → Listening → ShuttingDown →
//! Stopped`. The accept loop and the OS signal watcher run as separate tasks
//! and meet only at the [`ShutdownTrigger`]. Once the trigger fires the
//! listener is dropped, in-flight connections get the grace period to finish,
//! and whatever is still running afterwards is aborted.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parkway_common::{Error, Result};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ServerState {
    Created,
    Listening,
    ShuttingDown,
    Stopped,
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ServerState::Created => "created",
            ServerState::Listening => "listening",
            ServerState::ShuttingDown => "shutting_down",
            ServerState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Single-fire shutdown request. Cloning shares the same underlying flag.
#[derive(Clone)]
pub struct ShutdownTrigger {
    tx: Arc<watch::Sender<Option<&'static str>>>,
}

impl ShutdownTrigger {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Request shutdown. Returns `true` only for the call that actually
    /// fired; every later call is a no-op and returns `false`.
    pub fn fire(&self, reason: &'static str) -> bool {
        self.tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(reason);
            true
        })
    }

    pub fn is_fired(&self) -> bool {
        self.tx.borrow().is_some()
    }

    /// The reason given to the call that fired, if any.
    pub fn reason(&self) -> Option<&'static str> {
        *self.tx.borrow()
    }

    /// Read-only view handed to connections.
    pub fn signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for ShutdownTrigger {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolves once shutdown has been requested.
pub struct ShutdownSignal {
    rx: watch::Receiver<Option<&'static str>>,
}

impl ShutdownSignal {
    pub async fn wait(&mut self) {
        // The sender lives inside the trigger, which outlives every signal
        // handed out by the supervisor. A closed channel still means "stop".
        let _ = self.rx.wait_for(Option::is_some).await;
    }
}

/// Serves one accepted connection until it completes.
///
/// Handlers run on their own task and may be aborted once the grace period
/// expires, so they must not rely on running to completion.
#[async_trait]
pub trait ConnectionHandler: Clone + Send + Sync + 'static {
    async fn handle(&self, stream: TcpStream, peer: SocketAddr, shutdown: ShutdownSignal);
}

pub struct LifecycleSupervisor {
    listener: TcpListener,
    grace_period: Duration,
    trigger: ShutdownTrigger,
    state: watch::Sender<ServerState>,
    os_signals: bool,
}

impl LifecycleSupervisor {
    pub fn new(listener: TcpListener, grace_period: Duration) -> Self {
        let (state, _) = watch::channel(ServerState::Created);
        Self {
            listener,
            grace_period,
            trigger: ShutdownTrigger::new(),
            state,
            os_signals: true,
        }
    }

    /// Share an externally created trigger, e.g. one the caller already
    /// handed out before the listener was bound.
    pub fn with_trigger(mut self, trigger: ShutdownTrigger) -> Self {
        self.trigger = trigger;
        self
    }

    /// Do not install SIGINT/SIGTERM handlers; shutdown then only happens
    /// through the trigger.
    pub fn without_os_signals(mut self) -> Self {
        self.os_signals = false;
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn state(&self) -> watch::Receiver<ServerState> {
        self.state.subscribe()
    }

    pub fn shutdown_trigger(&self) -> ShutdownTrigger {
        self.trigger.clone()
    }

    /// Serve until shutdown completes. Returns only once the state is
    /// `Stopped`.
    ///
    /// An accept error other than the deliberate close at shutdown is fatal:
    /// open connections are aborted and `Error::Acceptor` is returned.
    pub async fn run<H: ConnectionHandler>(self, handler: H) -> Result<()> {
        let Self {
            listener,
            grace_period,
            trigger,
            state,
            os_signals,
        } = self;

        let addr = listener.local_addr()?;
        let signals = if os_signals {
            Some(spawn_signal_watcher(trigger.clone())?)
        } else {
            None
        };

        advance(&state, ServerState::Listening);
        info!(%addr, "accepting connections");

        let acceptor = tokio::spawn(accept_loop(listener, handler, trigger.clone()));
        let outcome = acceptor.await;

        advance(&state, ServerState::ShuttingDown);
        let result = match outcome {
            Ok(AcceptOutcome {
                mut connections,
                error: None,
            }) => {
                drain(&mut connections, grace_period).await;
                Ok(())
            }
            Ok(AcceptOutcome {
                mut connections,
                error: Some(e),
            }) => {
                trigger.fire("acceptor failure");
                abort_all(&mut connections).await;
                Err(Error::Acceptor(e))
            }
            Err(e) => {
                trigger.fire("acceptor task failure");
                Err(Error::Gateway(format!("accept loop terminated: {e}")))
            }
        };

        if let Some(signals) = signals {
            signals.abort();
        }
        advance(&state, ServerState::Stopped);
        info!(%addr, "server stopped");
        result
    }
}

fn advance(state: &watch::Sender<ServerState>, next: ServerState) {
    state.send_if_modified(|current| {
        if next <= *current {
            return false;
        }
        debug!(from = %current, to = %next, "server state transition");
        *current = next;
        true
    });
}

struct AcceptOutcome {
    connections: JoinSet<()>,
    error: Option<std::io::Error>,
}

async fn accept_loop<H: ConnectionHandler>(
    listener: TcpListener,
    handler: H,
    trigger: ShutdownTrigger,
) -> AcceptOutcome {
    let mut connections = JoinSet::new();
    let mut shutdown = trigger.signal();

    let error = loop {
        tokio::select! {
            biased;
            _ = shutdown.wait() => break None,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!(%peer, "connection accepted");
                    let handler = handler.clone();
                    let signal = trigger.signal();
                    connections.spawn(async move { handler.handle(stream, peer, signal).await });
                }
                Err(e) => {
                    error!("accept failed: {e}");
                    break Some(e);
                }
            },
            Some(joined) = connections.join_next(), if !connections.is_empty() => {
                log_joined(joined);
            }
        }
    };

    // Stop accepting before anyone waits on in-flight work.
    drop(listener);
    AcceptOutcome { connections, error }
}

async fn drain(connections: &mut JoinSet<()>, grace_period: Duration) {
    if connections.is_empty() {
        return;
    }

    info!(
        in_flight = connections.len(),
        "waiting up to {grace_period:?} for in-flight connections"
    );
    let finished = tokio::time::timeout(grace_period, async {
        while let Some(joined) = connections.join_next().await {
            log_joined(joined);
        }
    })
    .await;

    if finished.is_err() {
        warn!(
            remaining = connections.len(),
            "grace period elapsed, closing remaining connections"
        );
        abort_all(connections).await;
    }
}

async fn abort_all(connections: &mut JoinSet<()>) {
    connections.abort_all();
    while let Some(joined) = connections.join_next().await {
        log_joined(joined);
    }
}

fn log_joined(joined: std::result::Result<(), JoinError>) {
    match joined {
        Ok(()) => {}
        Err(e) if e.is_cancelled() => debug!("connection task aborted"),
        Err(e) => warn!("connection task panicked: {e}"),
    }
}

fn note_signal(trigger: &ShutdownTrigger, name: &'static str) {
    if trigger.fire(name) {
        info!("received {name}, starting graceful shutdown");
    } else {
        info!("received {name} while already shutting down, ignoring");
    }
}

#[cfg(unix)]
fn spawn_signal_watcher(trigger: ShutdownTrigger) -> Result<JoinHandle<()>> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;

    Ok(tokio::spawn(async move {
        loop {
            let name = tokio::select! {
                Some(()) = interrupt.recv() => "SIGINT",
                Some(()) = terminate.recv() => "SIGTERM",
                else => break,
            };
            note_signal(&trigger, name);
        }
    }))
}

#[cfg(not(unix))]
fn spawn_signal_watcher(trigger: ShutdownTrigger) -> Result<JoinHandle<()>> {
    Ok(tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            note_signal(&trigger, "ctrl-c");
        }
    }))
}
