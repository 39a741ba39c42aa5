//! # Remote Call Dispatcher (outbound)
//!
//! A `RemoteObject` is the consumer-side record of an object the peer
//! announced. Generated proxy stubs hold one and forward every interface
//! method through [`RemoteObject::invoke`].
//!
//! ## Invariants
//!
//! - A method is matched to the peer's descriptor by signature, once per
//!   remote object; the answer (hit or miss) is cached.
//! - Synchronous calls wait on the object's channel. Asynchronous calls are
//!   sent reliably on the object's channel. Unreliable calls go on the
//!   best-effort channel whatever the object's channel is.
//! - Identity, `Debug` and hashing are answered locally and never remoted.

use std::sync::Arc;

use dashmap::DashMap;
use rmi_rpc::Channel;
use rmi_rpc::RpcConnection;
use rmi_rpc::Value;
use tracing::trace;

use crate::call_type::CallType;
use crate::descriptor::TypeDescriptor;
use crate::error::Error;
use crate::error::Result;
use crate::ids::MethodId;
use crate::ids::ObjectId;
use crate::interface::SharedInterface;

type Resolution = Option<(MethodId, CallType)>;

/// An object owned by the peer. Clones share the same identity.
#[derive(Clone)]
pub struct RemoteObject {
    inner: Arc<RemoteInner>,
}

struct RemoteInner {
    name: String,
    channel: Channel,
    object_id: ObjectId,
    descriptor: Arc<TypeDescriptor>,
    rpc: Arc<dyn RpcConnection>,
    resolved: DashMap<&'static str, Resolution>,
}

impl RemoteObject {
    pub(crate) fn new(
        name: String,
        channel: Channel,
        object_id: ObjectId,
        descriptor: Arc<TypeDescriptor>,
        rpc: Arc<dyn RpcConnection>,
    ) -> Self {
        Self {
            inner: Arc::new(RemoteInner {
                name,
                channel,
                object_id,
                descriptor,
                rpc,
                resolved: DashMap::new(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn channel(&self) -> Channel {
        self.inner.channel
    }

    pub fn object_id(&self) -> ObjectId {
        self.inner.object_id
    }

    /// The descriptor exactly as the owner sent it.
    pub fn descriptor(&self) -> &TypeDescriptor {
        &self.inner.descriptor
    }

    /// Calls `method` of interface `I` on the remote object.
    ///
    /// Fire-and-forget calls return `Value::Unit` once the call is handed to
    /// the connection.
    pub async fn invoke<I: SharedInterface>(&self, method: &'static str, args: Vec<Value>) -> Result<Value> {
        let (method_id, call_type) = self.resolve::<I>(method)?;
        let inner = &self.inner;
        let service = inner.object_id.service();
        let proc_id = method_id.proc_id();

        trace!(object = %inner.object_id, name = %inner.name, method, ?call_type, "remote call");

        match call_type {
            CallType::Synchronous => Ok(inner.rpc.call_and_wait(inner.channel, service, proc_id, args).await?),
            CallType::Asynchronous => {
                inner.rpc.call_async(inner.channel, service, proc_id, args).await?;
                Ok(Value::Unit)
            }
            CallType::Unreliable => {
                inner.rpc.call_async_unreliable(service, proc_id, args).await?;
                Ok(Value::Unit)
            }
        }
    }

    fn resolve<I: SharedInterface>(&self, method: &'static str) -> Result<(MethodId, CallType)> {
        let cached = self.inner.resolved.get(method).map(|entry| *entry.value());
        let resolution = match cached {
            Some(resolution) => resolution,
            None => {
                let resolution = I::methods()
                    .iter()
                    .find(|shape| shape.name == method)
                    .and_then(|shape| self.inner.descriptor.method_by_signature(&shape.signature()))
                    .map(|m| (m.id, m.call_type));
                self.inner.resolved.insert(method, resolution);
                resolution
            }
        };

        resolution.ok_or_else(|| {
            Error::UnknownMethod(format!("{} on {}", method, self.inner.descriptor.name))
        })
    }
}

impl std::fmt::Debug for RemoteObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteObject")
            .field("name", &self.inner.name)
            .field("object_id", &self.inner.object_id)
            .field("channel", &self.inner.channel)
            .field("interface", &self.inner.descriptor.name)
            .finish()
    }
}

impl PartialEq for RemoteObject {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for RemoteObject {}

impl std::hash::Hash for RemoteObject {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::ptr::hash(Arc::as_ptr(&self.inner), state);
    }
}
