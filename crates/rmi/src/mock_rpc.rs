//! A recording connection for testing.
//!
//! Used by the unit tests to assert the exact messages a registry sends and
//! to feed it messages as if they came from a peer.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use dashmap::DashMap;
use rmi_rpc::Channel;
use rmi_rpc::ConnectionId;
use rmi_rpc::FailureReason;
use rmi_rpc::ProcId;
use rmi_rpc::RpcConnection;
use rmi_rpc::RpcHandler;
use rmi_rpc::ServiceId;
use rmi_rpc::Value;

/// How a recorded call was sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Reliable(Channel),
    Unreliable,
    Wait(Channel),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sent {
    pub delivery: Delivery,
    pub service: ServiceId,
    pub proc_id: ProcId,
    pub args: Vec<Value>,
}

pub struct RecordingRpc {
    conn: ConnectionId,
    handlers: DashMap<ServiceId, Arc<dyn RpcHandler>>,
    sent: Mutex<Vec<Sent>>,
    /// Returned by every `call_and_wait`.
    reply: Mutex<Value>,
    /// While set, reliable one-way sends fail as if the peer were gone.
    offline: AtomicBool,
}

impl RecordingRpc {
    pub fn new(conn: ConnectionId) -> Arc<Self> {
        Arc::new(Self {
            conn,
            handlers: DashMap::new(),
            sent: Mutex::new(Vec::new()),
            reply: Mutex::new(Value::Unit),
            offline: AtomicBool::new(false),
        })
    }

    pub fn set_reply(&self, value: Value) {
        *self.reply.lock().unwrap() = value;
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Takes everything sent so far.
    pub fn take_sent(&self) -> Vec<Sent> {
        std::mem::take(&mut *self.sent.lock().unwrap())
    }

    pub fn has_handler(&self, service: ServiceId) -> bool {
        self.handlers.contains_key(&service)
    }

    /// Delivers a call to the registered handler as if the peer sent it.
    pub async fn deliver(
        &self,
        service: ServiceId,
        proc_id: ProcId,
        args: Vec<Value>,
    ) -> Result<Value, FailureReason> {
        let handler = self
            .handlers
            .get(&service)
            .map(|entry| entry.value().clone())
            .ok_or(FailureReason::ServiceNotFound(service))?;
        handler.call(self.conn, service, proc_id, args).await
    }

    fn record(&self, delivery: Delivery, service: ServiceId, proc_id: ProcId, args: Vec<Value>) {
        self.sent.lock().unwrap().push(Sent { delivery, service, proc_id, args });
    }
}

#[async_trait::async_trait]
impl RpcConnection for RecordingRpc {
    fn connection(&self) -> ConnectionId {
        self.conn
    }

    fn register_handler(&self, service: ServiceId, handler: Arc<dyn RpcHandler>) {
        self.handlers.insert(service, handler);
    }

    fn remove_handler(&self, service: ServiceId, handler: &Arc<dyn RpcHandler>) {
        self.handlers.remove_if(&service, |_, registered| {
            std::ptr::eq(Arc::as_ptr(registered) as *const (), Arc::as_ptr(handler) as *const ())
        });
    }

    async fn call_async(
        &self,
        channel: Channel,
        service: ServiceId,
        proc_id: ProcId,
        args: Vec<Value>,
    ) -> rmi_rpc::Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(rmi_rpc::Error::ConnectionLost("Peer closed".into()));
        }
        self.record(Delivery::Reliable(channel), service, proc_id, args);
        Ok(())
    }

    async fn call_async_unreliable(
        &self,
        service: ServiceId,
        proc_id: ProcId,
        args: Vec<Value>,
    ) -> rmi_rpc::Result<()> {
        self.record(Delivery::Unreliable, service, proc_id, args);
        Ok(())
    }

    async fn call_and_wait(
        &self,
        channel: Channel,
        service: ServiceId,
        proc_id: ProcId,
        args: Vec<Value>,
    ) -> rmi_rpc::Result<Value> {
        self.record(Delivery::Wait(channel), service, proc_id, args);
        Ok(self.reply.lock().unwrap().clone())
    }
}
