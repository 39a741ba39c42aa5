//! # In-process RPC connection
//!
//! `LocalRpc::pair` returns two connected ends. Each end spawns an inbound
//! pump task that demultiplexes frames coming from its peer:
//!
//! - **Replies** are routed to the pending caller by sequence number.
//! - **Calls** are handed to a worker per channel. Calls on one channel start
//!   in the order they were sent. Fire-and-forget calls run to completion on
//!   the worker before the next call starts. Call-and-wait calls run on their
//!   own task so a slow or re-entrant handler never stalls its channel.
//! - A handler that panics fails only its own call. The caller of a
//!   call-and-wait gets `FailureReason::Failed`; the worker keeps running.
//!
//! Best-effort calls travel on a bounded queue and are dropped when it is full.
//!
//! Dropping one end stops its pump. The other end then fails all of its
//! pending calls with `ConnectionLost`.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::oneshot;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use crate::config::RpcConfig;
use crate::connection::RpcConnection;
use crate::connection::RpcHandler;
use crate::error::Error;
use crate::error::FailureReason;
use crate::error::Result;
use crate::ids::Channel;
use crate::ids::ConnectionId;
use crate::ids::ProcId;
use crate::ids::ServiceId;
use crate::value::Value;

type Handlers = DashMap<ServiceId, Arc<dyn RpcHandler>>;
type Pending = DashMap<u64, oneshot::Sender<Result<Value>>>;

/// A call as it travels between the two ends.
struct Call {
    /// Present only when the caller waits for a reply.
    seq: Option<u64>,
    channel: Channel,
    service: ServiceId,
    proc_id: ProcId,
    args: Vec<Value>,
}

enum Frame {
    Call(Call),
    Reply {
        seq: u64,
        result: std::result::Result<Value, FailureReason>,
    },
}

/// One end of an in-process connection.
///
/// Must be created inside a tokio runtime; the pump tasks are spawned eagerly.
pub struct LocalRpc {
    conn: ConnectionId,
    config: RpcConfig,
    handlers: Arc<Handlers>,
    pending: Arc<Pending>,
    seq_gen: AtomicU64,
    reliable: mpsc::UnboundedSender<Frame>,
    unreliable: mpsc::Sender<Frame>,
    // Dropping this stops the pump of this end.
    _shutdown: oneshot::Sender<()>,
}

impl LocalRpc {
    /// Creates two connected ends sharing `conn` as their connection id.
    pub fn pair(conn: ConnectionId, config: RpcConfig) -> (Arc<LocalRpc>, Arc<LocalRpc>) {
        let (a_tx, a_rx) = mpsc::unbounded_channel();
        let (b_tx, b_rx) = mpsc::unbounded_channel();
        let (a_utx, a_urx) = mpsc::channel(config.unreliable_capacity);
        let (b_utx, b_urx) = mpsc::channel(config.unreliable_capacity);

        let a = Self::spawn_end(conn, config.clone(), a_tx, a_utx, b_rx, b_urx);
        let b = Self::spawn_end(conn, config, b_tx, b_utx, a_rx, a_urx);
        (Arc::new(a), Arc::new(b))
    }

    /// Builds one end and spawns the pump that reads what its peer sends.
    fn spawn_end(
        conn: ConnectionId,
        config: RpcConfig,
        reliable: mpsc::UnboundedSender<Frame>,
        unreliable: mpsc::Sender<Frame>,
        inbound: mpsc::UnboundedReceiver<Frame>,
        inbound_unreliable: mpsc::Receiver<Frame>,
    ) -> Self {
        let handlers: Arc<Handlers> = Arc::new(DashMap::new());
        let pending: Arc<Pending> = Arc::new(DashMap::new());
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let dispatcher = Arc::new(Dispatcher {
            conn,
            handlers: handlers.clone(),
            replies: reliable.downgrade(),
        });

        tokio::spawn(pump(
            dispatcher,
            pending.clone(),
            inbound,
            inbound_unreliable,
            shutdown_rx,
        ));

        Self {
            conn,
            config,
            handlers,
            pending,
            seq_gen: AtomicU64::new(1),
            reliable,
            unreliable,
            _shutdown: shutdown_tx,
        }
    }

    /// Number of calls still waiting for a reply.
    pub fn pending_calls(&self) -> usize {
        self.pending.len()
    }

    fn send(&self, frame: Frame) -> Result<()> {
        self.reliable
            .send(frame)
            .map_err(|_| Error::ConnectionLost("Peer closed".into()))
    }
}

#[async_trait::async_trait]
impl RpcConnection for LocalRpc {
    fn connection(&self) -> ConnectionId {
        self.conn
    }

    fn register_handler(&self, service: ServiceId, handler: Arc<dyn RpcHandler>) {
        trace!(conn = %self.conn, %service, "register handler");
        self.handlers.insert(service, handler);
    }

    fn remove_handler(&self, service: ServiceId, handler: &Arc<dyn RpcHandler>) {
        trace!(conn = %self.conn, %service, "remove handler");
        self.handlers.remove_if(&service, |_, registered| same_handler(registered, handler));
    }

    async fn call_async(
        &self,
        channel: Channel,
        service: ServiceId,
        proc_id: ProcId,
        args: Vec<Value>,
    ) -> Result<()> {
        self.send(Frame::Call(Call { seq: None, channel, service, proc_id, args }))
    }

    async fn call_async_unreliable(
        &self,
        service: ServiceId,
        proc_id: ProcId,
        args: Vec<Value>,
    ) -> Result<()> {
        let frame = Frame::Call(Call {
            seq: None,
            channel: Channel::DEFAULT_UNRELIABLE,
            service,
            proc_id,
            args,
        });

        match self.unreliable.try_send(frame) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                debug!(conn = %self.conn, %service, %proc_id, "best-effort queue full, dropping call");
                Ok(())
            }
            Err(TrySendError::Closed(_)) => Err(Error::ConnectionLost("Peer closed".into())),
        }
    }

    async fn call_and_wait(
        &self,
        channel: Channel,
        service: ServiceId,
        proc_id: ProcId,
        args: Vec<Value>,
    ) -> Result<Value> {
        let seq = self.seq_gen.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.insert(seq, tx);
        // Clears the entry on every exit, including when this future is dropped.
        let _slot = PendingSlot { pending: &self.pending, seq };

        self.send(Frame::Call(Call { seq: Some(seq), channel, service, proc_id, args }))?;

        match tokio::time::timeout(self.config.call_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::ChannelClosed),
            Err(_) => Err(Error::Timeout),
        }
    }
}

/// Removes a pending entry when the waiting caller goes away.
struct PendingSlot<'a> {
    pending: &'a Pending,
    seq: u64,
}

impl Drop for PendingSlot<'_> {
    fn drop(&mut self) {
        self.pending.remove(&self.seq);
    }
}

/// Compares handler identity without looking at vtables.
fn same_handler(a: &Arc<dyn RpcHandler>, b: &Arc<dyn RpcHandler>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

/// Routes inbound calls to handlers and sends replies back to the peer.
struct Dispatcher {
    conn: ConnectionId,
    handlers: Arc<Handlers>,
    // Weak so a pump never keeps its own end's outbound queue alive.
    replies: mpsc::WeakUnboundedSender<Frame>,
}

impl Dispatcher {
    async fn dispatch(&self, call: Call) -> std::result::Result<Value, FailureReason> {
        let handler = self
            .handlers
            .get(&call.service)
            .map(|entry| entry.value().clone())
            .ok_or(FailureReason::ServiceNotFound(call.service))?;

        handler.call(self.conn, call.service, call.proc_id, call.args).await
    }

    fn reply(&self, seq: u64, result: std::result::Result<Value, FailureReason>) {
        let Some(tx) = self.replies.upgrade() else {
            trace!(conn = %self.conn, seq, "end closed, dropping reply");
            return;
        };
        let _ = tx.send(Frame::Reply { seq, result });
    }

    /// Runs the handler on a task of its own, turning a panic into a failure.
    async fn dispatch_isolated(self: &Arc<Self>, call: Call) -> std::result::Result<Value, FailureReason> {
        let dispatcher = self.clone();
        match tokio::spawn(async move { dispatcher.dispatch(call).await }).await {
            Ok(result) => result,
            Err(e) if e.is_panic() => Err(FailureReason::Failed(format!(
                "handler panicked: {}",
                panic_message(e.into_panic().as_ref())
            ))),
            Err(_) => Err(FailureReason::Failed("handler cancelled".into())),
        }
    }

    async fn run_one_way(self: &Arc<Self>, call: Call) {
        let (channel, service, proc_id) = (call.channel, call.service, call.proc_id);
        if let Err(reason) = self.dispatch_isolated(call).await {
            warn!(conn = %self.conn, %channel, %service, %proc_id, %reason, "one-way call failed");
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        *msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "unknown payload"
    }
}

/// Runs the calls of one channel in arrival order.
async fn channel_worker(dispatcher: Arc<Dispatcher>, mut calls: mpsc::UnboundedReceiver<Call>) {
    while let Some(call) = calls.recv().await {
        match call.seq {
            Some(seq) => {
                let dispatcher = dispatcher.clone();
                tokio::spawn(async move {
                    let result = dispatcher.dispatch_isolated(call).await;
                    dispatcher.reply(seq, result);
                });
            }
            None => dispatcher.run_one_way(call).await,
        }
    }
}

fn spawn_worker(dispatcher: &Arc<Dispatcher>) -> mpsc::UnboundedSender<Call> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(channel_worker(dispatcher.clone(), rx));
    tx
}

/// Reads frames from the peer until either end goes away.
async fn pump(
    dispatcher: Arc<Dispatcher>,
    pending: Arc<Pending>,
    mut inbound: mpsc::UnboundedReceiver<Frame>,
    mut inbound_unreliable: mpsc::Receiver<Frame>,
    mut shutdown: oneshot::Receiver<()>,
) {
    let mut workers: HashMap<Channel, mpsc::UnboundedSender<Call>> = HashMap::new();

    loop {
        let frame = tokio::select! {
            biased;
            _ = &mut shutdown => break,
            frame = inbound.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
            Some(frame) = inbound_unreliable.recv() => frame,
        };

        match frame {
            Frame::Reply { seq, result } => {
                // No pending entry means the caller already gave up.
                if let Some((_, tx)) = pending.remove(&seq) {
                    let _ = tx.send(result.map_err(Error::Remote));
                }
            }
            Frame::Call(call) => {
                let channel = call.channel;
                let worker = workers.entry(channel).or_insert_with(|| spawn_worker(&dispatcher));
                if let Err(mpsc::error::SendError(call)) = worker.send(call) {
                    warn!(conn = %dispatcher.conn, %channel, "channel worker gone, restarting it");
                    let fresh = spawn_worker(&dispatcher);
                    let _ = fresh.send(call);
                    workers.insert(channel, fresh);
                }
            }
        }
    }

    debug!(conn = %dispatcher.conn, "pump stopped");
    notify_all_pending(&pending, Error::ConnectionLost("Stream closed".into()));
}

/// Fails every pending call with the given error.
fn notify_all_pending(pending: &Pending, error: Error) {
    let keys: Vec<u64> = pending.iter().map(|e| *e.key()).collect();
    for key in keys {
        if let Some((_, tx)) = pending.remove(&key) {
            let _ = tx.send(Err(error.clone()));
        }
    }
}
