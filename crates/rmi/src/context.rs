//! # Inbound-Call Context
//!
//! Publishes the connection an inbound call arrived on to the shared method
//! serving it. The slot is task-local and exists only while the invocation
//! future runs, so it is gone when the method returns, fails or is dropped.

use std::future::Future;

use rmi_rpc::ConnectionId;

tokio::task_local! {
    static INBOUND: ConnectionId;
}

pub struct InboundContext;

impl InboundContext {
    /// Runs `fut` with `conn` published as the current connection.
    pub async fn scope<F: Future>(conn: ConnectionId, fut: F) -> F::Output {
        INBOUND.scope(conn, fut).await
    }

    /// The connection of the inbound call being served, if any.
    pub fn current() -> Option<ConnectionId> {
        INBOUND.try_with(|conn| *conn).ok()
    }
}
