//! # RPC Connection Contract
//!
//! The request/response service that the rmi registry rides on.
//!
//! ## Philosophy
//!
//! - **Value-Oriented**: A connection moves `(service, proc, args)` triples and
//!   `Value` replies. It knows nothing about shared objects or descriptors.
//! - **Three Deliveries**: reliable fire-and-forget on a channel, best-effort
//!   fire-and-forget, and call-and-wait. Everything else is built on top.

use std::sync::Arc;

use crate::error::FailureReason;
use crate::error::Result;
use crate::ids::Channel;
use crate::ids::ConnectionId;
use crate::ids::ProcId;
use crate::ids::ServiceId;
use crate::value::Value;

/// Receives inbound calls for a service id.
///
/// Handlers may be invoked concurrently from several tasks. The returned
/// value is sent back only when the caller is waiting for it.
#[async_trait::async_trait]
pub trait RpcHandler: Send + Sync + 'static {
    async fn call(
        &self,
        conn: ConnectionId,
        service: ServiceId,
        proc_id: ProcId,
        args: Vec<Value>,
    ) -> std::result::Result<Value, FailureReason>;
}

/// One end of a connection able to make and receive calls.
///
/// This trait is designed to be object-safe (`Arc<dyn RpcConnection>`).
#[async_trait::async_trait]
pub trait RpcConnection: Send + Sync + 'static {
    /// The connection both ends share.
    fn connection(&self) -> ConnectionId;

    /// Routes inbound calls for `service` to `handler`, replacing any
    /// previous registration.
    fn register_handler(&self, service: ServiceId, handler: Arc<dyn RpcHandler>);

    /// Removes the registration for `service` if it is still `handler`.
    fn remove_handler(&self, service: ServiceId, handler: &Arc<dyn RpcHandler>);

    /// Sends a call reliably on `channel` without waiting for its outcome.
    async fn call_async(
        &self,
        channel: Channel,
        service: ServiceId,
        proc_id: ProcId,
        args: Vec<Value>,
    ) -> Result<()>;

    /// Sends a call on the best-effort channel. It may be dropped.
    async fn call_async_unreliable(
        &self,
        service: ServiceId,
        proc_id: ProcId,
        args: Vec<Value>,
    ) -> Result<()>;

    /// Sends a call on `channel` and waits for the reply.
    ///
    /// # Invariants
    /// - Returns `Ok(value)` with the handler's result on success.
    /// - Returns `Err(Error::Remote(_))` if the handler failed the call.
    /// - Returns another `Err` if the connection failed or timed out.
    async fn call_and_wait(
        &self,
        channel: Channel,
        service: ServiceId,
        proc_id: ProcId,
        args: Vec<Value>,
    ) -> Result<Value>;
}
