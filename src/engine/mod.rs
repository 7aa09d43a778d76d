// Connection Engine Module
// Strategy, driver and transaction plumbing shared by every vendor

pub mod config;
pub mod drivers;
pub mod error;
pub mod registry;
pub mod session;
pub mod sql_safety;
pub mod ssh_tunnel;
pub mod state;
pub mod strategies;
pub mod traits;
pub mod types;

pub use config::{
    ConnectionConfig, ConnectionOptions, OptionValue, SshAuth, SshHostKeyPolicy, TunnelConfig,
    TunnelSettings,
};
pub use error::{BoxError, EngineError, EngineResult, ErrorKind};
pub use registry::DriverRegistry;
pub use ssh_tunnel::{OpenSshTunnelProvider, Tunnel, TunnelError, TunnelProvider};
pub use state::ConnectionState;
pub use strategies::{DirectStrategy, SshTunnelStrategy};
pub use traits::{ConnectionStrategy, DatabaseConnection};
pub use types::*;
