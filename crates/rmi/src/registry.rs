//! # Shared-Object Registry
//!
//! One registry per connection. It shares local objects with the peer,
//! learns about the objects the peer shares, and dispatches inbound calls.
//!
//! ## Control protocol
//!
//! Control messages are one-way calls to the registry's control service on
//! the default channel:
//!
//! | proc | message         | args                                   |
//! |------|-----------------|----------------------------------------|
//! | 0    | `NEW_CLASS`     | `[TypeDescriptor]`                     |
//! | 1    | `ADD_OBJECT`    | `[U8 channel, U16 object, String name, U16 iface]` |
//! | 2    | `REMOVE_OBJECT` | `[U16 object]`                         |
//!
//! Method calls on a shared object arrive on the object's id as service id,
//! with the method id as proc id.
//!
//! ## Invariants
//!
//! - `share` sends everything it sends under the local writer lock, so the
//!   peer sees `NEW_CLASS` before the first `ADD_OBJECT` using it, and a
//!   `REMOVE_OBJECT` before the `ADD_OBJECT` that replaces it.
//! - Object ids increase strictly and are never reused.
//! - Shared methods run without any registry lock held, so they may call
//!   `share` themselves.
//! - A protocol violation from the peer faults the registry; later control
//!   messages are rejected.

use std::sync::Arc;
use std::sync::OnceLock;
use std::sync::Weak;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;

use rmi_rpc::Channel;
use rmi_rpc::ConnectionId;
use rmi_rpc::FailureReason;
use rmi_rpc::ProcId;
use rmi_rpc::RpcConnection;
use rmi_rpc::RpcHandler;
use rmi_rpc::ServiceId;
use rmi_rpc::Value;
use tokio::sync::RwLock;
use tracing::debug;
use tracing::error;
use tracing::trace;
use tracing::warn;

use crate::cache::TypeDescriptorCache;
use crate::context::InboundContext;
use crate::descriptor::TypeDescriptor;
use crate::error::Error;
use crate::error::Result;
use crate::ids::InterfaceId;
use crate::ids::MethodId;
use crate::ids::ObjectId;
use crate::index::Bound;
use crate::index::ObjectIndex;
use crate::index::SharedObject;
use crate::interface::ArgReader;
use crate::interface::SharedInterface;
use crate::proxy::RemoteObject;

pub const NEW_CLASS: ProcId = ProcId(0);
pub const ADD_OBJECT: ProcId = ProcId(1);
pub const REMOVE_OBJECT: ProcId = ProcId(2);

/// Fluent builder for [`RmiRegistry`].
pub struct RegistryBuilder {
    rpc: Arc<dyn RpcConnection>,
    service: ServiceId,
    default_channel: Channel,
    cache: Option<Arc<TypeDescriptorCache>>,
}

impl RegistryBuilder {
    pub fn new(rpc: Arc<dyn RpcConnection>) -> Self {
        Self {
            rpc,
            service: ServiceId(0),
            default_channel: Channel::DEFAULT_RELIABLE,
            cache: None,
        }
    }

    /// Service id of the control messages. Both ends must agree on it.
    pub fn service_id(mut self, service: ServiceId) -> Self {
        self.service = service;
        self
    }

    /// Channel for control messages and for objects shared without one.
    pub fn default_channel(mut self, channel: Channel) -> Self {
        self.default_channel = channel;
        self
    }

    /// Shares a descriptor cache with other registries.
    pub fn cache(mut self, cache: Arc<TypeDescriptorCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Builds the registry and registers its control handler.
    pub fn build(self) -> Arc<RmiRegistry> {
        let registry = Arc::new_cyclic(|weak: &Weak<RmiRegistry>| {
            let handler: Arc<dyn RpcHandler> = Arc::new(RmiHandler { registry: weak.clone() });
            RmiRegistry {
                rpc: self.rpc,
                service: self.service,
                default_channel: self.default_channel,
                cache: self.cache.unwrap_or_default(),
                local: RwLock::new(ObjectIndex::new()),
                remote: RwLock::new(ObjectIndex::new()),
                next_object_id: AtomicU32::new(1),
                handler,
                faulted: OnceLock::new(),
                closed: AtomicBool::new(false),
            }
        });

        registry.rpc.register_handler(registry.service, registry.handler.clone());
        debug!(conn = %registry.rpc.connection(), service = %registry.service, "registry started");
        registry
    }
}

pub struct RmiRegistry {
    rpc: Arc<dyn RpcConnection>,
    service: ServiceId,
    default_channel: Channel,
    cache: Arc<TypeDescriptorCache>,
    local: RwLock<ObjectIndex<SharedObject>>,
    remote: RwLock<ObjectIndex<RemoteObject>>,
    next_object_id: AtomicU32,
    handler: Arc<dyn RpcHandler>,
    faulted: OnceLock<String>,
    closed: AtomicBool,
}

impl RmiRegistry {
    pub fn builder(rpc: Arc<dyn RpcConnection>) -> RegistryBuilder {
        RegistryBuilder::new(rpc)
    }

    /// A registry with default settings.
    pub fn new(rpc: Arc<dyn RpcConnection>) -> Arc<Self> {
        Self::builder(rpc).build()
    }

    pub fn connection(&self) -> ConnectionId {
        self.rpc.connection()
    }

    pub fn service_id(&self) -> ServiceId {
        self.service
    }

    pub fn default_channel(&self) -> Channel {
        self.default_channel
    }

    pub fn cache(&self) -> &Arc<TypeDescriptorCache> {
        &self.cache
    }

    /// The protocol violation that stopped this registry, if any.
    pub fn fault(&self) -> Option<&str> {
        self.faulted.get().map(String::as_str)
    }

    /// Shares `target` as `I` under the interface name on the default channel.
    pub async fn share<I: SharedInterface>(&self, target: Arc<I::Object>) -> Result<ObjectId> {
        self.share_on::<I>(self.default_channel, I::NAME, target).await
    }

    /// Shares `target` as `I` under `name` on the default channel.
    pub async fn share_named<I: SharedInterface>(&self, name: &str, target: Arc<I::Object>) -> Result<ObjectId> {
        self.share_on::<I>(self.default_channel, name, target).await
    }

    /// Shares `target` as `I` under `name`. The peer calls it on `channel`.
    ///
    /// Replaces whatever was shared under `name` before; the old object's
    /// id is retired.
    ///
    /// If a send fails, nothing the peer was not told about stays bound: a
    /// failed retraction leaves the old object in place, and a failed
    /// announcement unbinds the new one.
    pub async fn share_on<I: SharedInterface>(
        &self,
        channel: Channel,
        name: &str,
        target: Arc<I::Object>,
    ) -> Result<ObjectId> {
        let descriptor = self.cache.descriptor::<I>()?;

        let mut local = self.local.write().await;
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Closed);
        }

        let object_id = self.next_object_id()?;

        if !local.knows_type(descriptor.id) {
            debug!(conn = %self.connection(), iface = %descriptor.id, name = %descriptor.name, "send NEW_CLASS");
            self.send_control(NEW_CLASS, vec![descriptor.to_value()]).await?;
            local.add_type(descriptor.clone())?;
        }

        if let Some(old) = local.get_by_name(name).map(|existing| existing.object_id) {
            debug!(conn = %self.connection(), object = %old, name, "send REMOVE_OBJECT");
            self.send_control(REMOVE_OBJECT, vec![Value::U16(old.0)]).await?;
            self.rpc.remove_handler(old.service(), &self.handler);
            local.remove(old);
        }

        local.insert(SharedObject {
            object_id,
            name: name.to_string(),
            channel,
            descriptor: descriptor.clone(),
            invoker: Arc::new(Bound::<I> { target }),
        });
        self.rpc.register_handler(object_id.service(), self.handler.clone());

        debug!(conn = %self.connection(), object = %object_id, name, %channel, iface = %descriptor.id, "send ADD_OBJECT");
        let announced = self
            .send_control(
                ADD_OBJECT,
                vec![
                    Value::U8(channel.0),
                    Value::U16(object_id.0),
                    Value::String(name.to_string()),
                    Value::U16(descriptor.id.0),
                ],
            )
            .await;

        if let Err(e) = announced {
            warn!(conn = %self.connection(), object = %object_id, name, "announcement failed, unbinding: {}", e);
            self.rpc.remove_handler(object_id.service(), &self.handler);
            local.remove(object_id);
            return Err(e);
        }
        Ok(object_id)
    }

    /// The object shared locally under the interface name, if it was shared as `I`.
    pub async fn get_local_object<I: SharedInterface>(&self) -> Option<Arc<I::Object>> {
        self.get_local_object_named::<I>(I::NAME).await
    }

    pub async fn get_local_object_named<I: SharedInterface>(&self, name: &str) -> Option<Arc<I::Object>> {
        self.local.read().await.get_by_name(name).and_then(SharedObject::target::<I>)
    }

    /// A proxy for the object the peer shares under the interface name.
    pub async fn get_remote_object<I: SharedInterface>(&self) -> Result<Option<I::Proxy>> {
        self.get_remote_object_named::<I>(I::NAME).await
    }

    /// A proxy for the object the peer shares under `name`.
    ///
    /// Fails with `TypeMismatch` when the peer shared it as another interface.
    pub async fn get_remote_object_named<I: SharedInterface>(&self, name: &str) -> Result<Option<I::Proxy>> {
        let remote = self.remote.read().await;
        let Some(object) = remote.get_by_name(name) else {
            return Ok(None);
        };

        if object.descriptor().name != I::NAME {
            return Err(Error::TypeMismatch {
                expected: I::NAME.to_string(),
                found: object.descriptor().name.clone(),
            });
        }
        Ok(Some(I::proxy(object.clone())))
    }

    /// Retires every shared object and stops handling the peer's messages.
    pub async fn close(&self) {
        let mut local = self.local.write().await;
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        for shared in local.drain() {
            self.rpc.remove_handler(shared.object_id.service(), &self.handler);
        }
        self.rpc.remove_handler(self.service, &self.handler);
        drop(local);

        self.remote.write().await.drain();
        debug!(conn = %self.connection(), "registry closed");
    }

    fn next_object_id(&self) -> Result<ObjectId> {
        loop {
            let raw = self.next_object_id.load(Ordering::Relaxed);
            let id = u16::try_from(raw).map_err(|_| Error::IdsExhausted)?;
            self.next_object_id.store(raw + 1, Ordering::Relaxed);
            if id != self.service.0 {
                return Ok(ObjectId(id));
            }
        }
    }

    async fn send_control(&self, proc_id: ProcId, args: Vec<Value>) -> Result<()> {
        Ok(self.rpc.call_async(self.default_channel, self.service, proc_id, args).await?)
    }

    /// Handles one control message from the peer.
    async fn rmi_update(&self, proc_id: ProcId, args: Vec<Value>) -> Result<Value> {
        if let Some(reason) = self.faulted.get() {
            return Err(Error::Faulted(reason.clone()));
        }

        let result = match proc_id {
            NEW_CLASS => self.on_new_class(args).await,
            ADD_OBJECT => self.on_add_object(args).await,
            REMOVE_OBJECT => self.on_remove_object(args),
            other => Err(Error::ProtocolViolation(format!("unknown control message {}", other))),
        };

        if let Err(Error::ProtocolViolation(msg)) = &result {
            error!(conn = %self.connection(), %proc_id, "protocol violation: {}", msg);
            let _ = self.faulted.set(msg.clone());
        }
        result.map(|_| Value::Unit)
    }

    async fn on_new_class(&self, args: Vec<Value>) -> Result<()> {
        let mut reader = ArgReader::new(args);
        let raw = reader.read::<Value>().map_err(malformed("NEW_CLASS"))?;
        reader.finish().map_err(malformed("NEW_CLASS"))?;
        let descriptor = TypeDescriptor::from_value(raw)?;

        debug!(conn = %self.connection(), iface = %descriptor.id, name = %descriptor.name, "recv NEW_CLASS");
        self.remote.write().await.add_type(Arc::new(descriptor))
    }

    async fn on_add_object(&self, args: Vec<Value>) -> Result<()> {
        let mut reader = ArgReader::new(args);
        let channel = Channel(reader.read().map_err(malformed("ADD_OBJECT"))?);
        let object_id = ObjectId(reader.read().map_err(malformed("ADD_OBJECT"))?);
        let name: String = reader.read().map_err(malformed("ADD_OBJECT"))?;
        let iface = InterfaceId(reader.read().map_err(malformed("ADD_OBJECT"))?);
        reader.finish().map_err(malformed("ADD_OBJECT"))?;

        debug!(conn = %self.connection(), object = %object_id, %name, %channel, %iface, "recv ADD_OBJECT");

        let mut remote = self.remote.write().await;
        let descriptor = remote
            .known_type(iface)
            .cloned()
            .ok_or_else(|| Error::ProtocolViolation(format!("{} announced with unknown {}", name, iface)))?;
        if remote.get_by_name(&name).is_some() {
            return Err(Error::ProtocolViolation(format!("{} is already bound", name)));
        }

        remote.insert(RemoteObject::new(name, channel, object_id, descriptor, self.rpc.clone()));
        Ok(())
    }

    fn on_remove_object(&self, args: Vec<Value>) -> Result<()> {
        let mut reader = ArgReader::new(args);
        let object_id = ObjectId(reader.read().map_err(malformed("REMOVE_OBJECT"))?);
        reader.finish().map_err(malformed("REMOVE_OBJECT"))?;

        warn!(conn = %self.connection(), object = %object_id, "peer retracted an object, which is not supported");
        Err(Error::Unsupported(format!("retracting {}", object_id)))
    }

    /// Runs one inbound method call on a local shared object.
    async fn invoke_local(
        &self,
        conn: ConnectionId,
        object_id: ObjectId,
        method_id: MethodId,
        args: Vec<Value>,
    ) -> Result<Value> {
        let shared = self.local.read().await.get(object_id).cloned().ok_or(Error::NoSuchObject(object_id))?;
        let call_type = shared
            .descriptor
            .method(method_id)
            .map(|m| m.call_type)
            .ok_or_else(|| Error::UnknownMethod(format!("{} of {}", method_id, shared.name)))?;

        // Failures of calls nobody waits for are logged by the connection.
        trace!(%conn, object = %object_id, name = %shared.name, channel = %shared.channel, method = %method_id, ?call_type, "inbound call");
        InboundContext::scope(conn, shared.invoker.invoke(method_id, args)).await
    }
}

fn malformed(message: &'static str) -> impl Fn(Error) -> Error {
    move |e| Error::ProtocolViolation(format!("malformed {}: {}", message, e))
}

/// The single handler a registry registers for its control service and for
/// every object it shares.
struct RmiHandler {
    registry: Weak<RmiRegistry>,
}

#[async_trait::async_trait]
impl RpcHandler for RmiHandler {
    async fn call(
        &self,
        conn: ConnectionId,
        service: ServiceId,
        proc_id: ProcId,
        args: Vec<Value>,
    ) -> std::result::Result<Value, FailureReason> {
        let Some(registry) = self.registry.upgrade() else {
            return Err(FailureReason::ServiceNotFound(service));
        };

        let result = if service == registry.service {
            registry.rmi_update(proc_id, args).await
        } else {
            registry.invoke_local(conn, ObjectId(service.0), MethodId(proc_id.0), args).await
        };
        result.map_err(FailureReason::from)
    }
}
