pub mod connection;
pub mod error;
pub mod handlers;
pub mod lifecycle;
pub mod router;
pub mod server;
pub mod state;

pub use connection::HttpConnectionHandler;
pub use lifecycle::{
    ConnectionHandler, DEFAULT_GRACE_PERIOD, LifecycleSupervisor, ServerState, ShutdownSignal,
    ShutdownTrigger,
};
pub use server::GatewayServer;
