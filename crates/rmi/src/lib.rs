//! # rmi
//!
//! Remote object invocation over an [`rmi_rpc::RpcConnection`].
//!
//! A [`RmiRegistry`] sits on each end of a connection. One end shares an
//! object under a name; the other end looks the name up and gets a proxy
//! stub that forwards method calls across the connection.
//!
//! ## Key Concepts
//!
//! - **Shared interface**: an async trait declared with [`shared_interface!`].
//! - **Descriptor**: the wire description of an interface, sent whole to the
//!   peer before the first object that uses it.
//! - **Call type**: whether a call waits for its result, or is sent reliably
//!   or best-effort without waiting.
//!
//! ## Example
//!
//! ```rust,ignore
//! use rmi::RmiRegistry;
//! use rmi_rpc::{ConnectionId, LocalRpc, RpcConfig};
//!
//! rmi::shared_interface! {
//!     pub trait Greeter as GreeterInterface("demo.Greeter") => GreeterProxy {
//!         fn greet(&self, name: String) -> String;
//!     }
//! }
//!
//! let (a, b) = LocalRpc::pair(ConnectionId(1), RpcConfig::default());
//! let owner = RmiRegistry::new(a);
//! let consumer = RmiRegistry::new(b);
//!
//! owner.share::<GreeterInterface>(Arc::new(MyGreeter)).await?;
//! let greeter = consumer.get_remote_object::<GreeterInterface>().await?.unwrap();
//! let reply = greeter.greet("ada".into()).await?;
//! ```

pub mod cache;
pub mod call_type;
pub mod context;
pub mod descriptor;
pub mod error;
pub mod ids;
pub mod interface;
pub mod proxy;
pub mod registry;

mod index;

pub use cache::TypeDescriptorCache;
pub use call_type::AsyncMarker;
pub use call_type::CallType;
pub use call_type::MethodShape;
pub use call_type::call_type_of;
pub use context::InboundContext;
pub use descriptor::MethodDescriptor;
pub use descriptor::TypeDescriptor;
pub use error::Error;
pub use error::Result;
pub use ids::InterfaceId;
pub use ids::MethodId;
pub use ids::ObjectId;
pub use interface::ArgReader;
pub use interface::SharedInterface;
pub use proxy::RemoteObject;
pub use registry::RegistryBuilder;
pub use registry::RmiRegistry;

#[cfg(test)]
mod mock_rpc;
