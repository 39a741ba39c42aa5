//! # rmi-rpc
//!
//! The request/response layer shared objects are invoked through.
//!
//! A connection carries calls addressed by `(ServiceId, ProcId)` with a list
//! of `Value` arguments. Handlers registered per service id answer them.
//! `LocalRpc` provides a connected pair of ends inside one process.

pub mod config;
pub mod connection;
pub mod error;
pub mod ids;
pub mod local;
pub mod value;

pub use config::RpcConfig;
pub use connection::RpcConnection;
pub use connection::RpcHandler;
pub use error::Error;
pub use error::FailureReason;
pub use error::Result;
pub use ids::Channel;
pub use ids::ConnectionId;
pub use ids::ProcId;
pub use ids::ServiceId;
pub use local::LocalRpc;
pub use value::FromValue;
pub use value::IntoValue;
pub use value::Value;
pub use value::ValueError;
