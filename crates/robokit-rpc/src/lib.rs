/*!
 * robokit RPC
 *
 * This crate exposes components across a connection. The server side
 * resolves names through a `Registry` and forwards calls to the components
 * it finds; the client side implements each component contract on top of a
 * `Connection`, so remote components can be used exactly like local ones.
 */

#![warn(missing_docs)]

pub mod client;
pub mod server;
pub mod status;
pub mod transport;
pub mod wire;

pub use client::{BaseClient, SensorClient, ServoClient};
pub use server::{Router, RpcServer};
pub use status::{Code, Status};
pub use transport::{Connection, LocalConnection, TcpConnection};

/// robokit RPC crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
