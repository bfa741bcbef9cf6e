mod broker_config;
mod brokered_syscalls;
mod client;
mod error;
mod ipc_loop;
mod process;

pub use broker_config::BrokerConfig;
pub use error::BrokerError;
pub use ipc_loop::{BrokerServer, ServeError};
pub use process::BrokerProcess;

// Re-exported types from sub-crates
pub use fsbroker_ipc::{downcast_to_handle, Handle, IpcChannel};
pub use fsbroker_policy::{Policy, PolicyError, PolicyRequest, PolicyVerdict};
