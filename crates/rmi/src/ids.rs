//! Ids handed out by a registry.

use rmi_rpc::ProcId;
use rmi_rpc::ServiceId;

/// Identifies an object shared by the owning registry.
///
/// Doubles as the service id its calls arrive on.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct ObjectId(pub u16);

impl ObjectId {
    pub fn service(self) -> ServiceId {
        ServiceId(self.0)
    }
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "object-{}", self.0)
    }
}

/// Identifies an interface within one descriptor cache.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct InterfaceId(pub u16);

impl std::fmt::Display for InterfaceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "iface-{}", self.0)
    }
}

/// Position of a method in its interface's descriptor.
///
/// Doubles as the proc id of a call.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct MethodId(pub u16);

impl MethodId {
    pub fn proc_id(self) -> ProcId {
        ProcId(self.0)
    }
}

impl std::fmt::Display for MethodId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "method-{}", self.0)
    }
}
