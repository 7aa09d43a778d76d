//! Connection strategies: how a connection's bytes reach the server.

pub mod direct;
pub mod ssh;

pub use direct::DirectStrategy;
pub use ssh::SshTunnelStrategy;
