//! # Registry Index
//!
//! Three maps that are always updated together: objects by name, objects by
//! id, and the interfaces seen so far. A registry keeps one index for the
//! objects it shares and one for the objects its peer shares, each behind its
//! own reader/writer lock.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use rmi_rpc::Channel;
use rmi_rpc::Value;

use crate::descriptor::TypeDescriptor;
use crate::error::Error;
use crate::error::Result;
use crate::ids::InterfaceId;
use crate::ids::MethodId;
use crate::ids::ObjectId;
use crate::interface::SharedInterface;
use crate::proxy::RemoteObject;

/// Something an index can hold.
pub(crate) trait Indexed {
    fn object_id(&self) -> ObjectId;
    fn name(&self) -> &str;
}

pub(crate) struct ObjectIndex<T> {
    by_name: HashMap<String, ObjectId>,
    by_id: HashMap<ObjectId, T>,
    known_types: HashMap<InterfaceId, Arc<TypeDescriptor>>,
}

impl<T: Indexed> ObjectIndex<T> {
    pub fn new() -> Self {
        Self {
            by_name: HashMap::new(),
            by_id: HashMap::new(),
            known_types: HashMap::new(),
        }
    }

    pub fn get(&self, id: ObjectId) -> Option<&T> {
        self.by_id.get(&id)
    }

    pub fn get_by_name(&self, name: &str) -> Option<&T> {
        self.by_name.get(name).and_then(|id| self.by_id.get(id))
    }

    /// Binds `entry` under its name and id, returning what was bound to
    /// the name before.
    pub fn insert(&mut self, entry: T) -> Option<T> {
        let id = entry.object_id();
        let previous = self
            .by_name
            .insert(entry.name().to_string(), id)
            .and_then(|old| self.by_id.remove(&old));
        self.by_id.insert(id, entry);
        previous
    }

    /// Unbinds the object with `id`, and its name if the name still points at it.
    pub fn remove(&mut self, id: ObjectId) -> Option<T> {
        let entry = self.by_id.remove(&id)?;
        if self.by_name.get(entry.name()) == Some(&id) {
            self.by_name.remove(entry.name());
        }
        Some(entry)
    }

    pub fn knows_type(&self, id: InterfaceId) -> bool {
        self.known_types.contains_key(&id)
    }

    pub fn known_type(&self, id: InterfaceId) -> Option<&Arc<TypeDescriptor>> {
        self.known_types.get(&id)
    }

    /// Records a descriptor, failing if its id is taken.
    pub fn add_type(&mut self, desc: Arc<TypeDescriptor>) -> Result<()> {
        if let Some(existing) = self.known_types.get(&desc.id) {
            return Err(Error::ProtocolViolation(format!(
                "{} announced as {} but already known as {}",
                desc.id, desc.name, existing.name
            )));
        }
        self.known_types.insert(desc.id, desc);
        Ok(())
    }

    /// Empties all three maps, returning the objects that were bound.
    pub fn drain(&mut self) -> Vec<T> {
        self.by_name.clear();
        self.known_types.clear();
        self.by_id.drain().map(|(_, entry)| entry).collect()
    }
}

/// Calls methods on a shared object whose interface has been erased.
#[async_trait::async_trait]
pub(crate) trait Invoker: Send + Sync + 'static {
    async fn invoke(&self, method: MethodId, args: Vec<Value>) -> Result<Value>;

    fn as_any(&self) -> &dyn Any;
}

/// A target bound to the interface it was shared as.
pub(crate) struct Bound<I: SharedInterface> {
    pub target: Arc<I::Object>,
}

#[async_trait::async_trait]
impl<I: SharedInterface> Invoker for Bound<I> {
    async fn invoke(&self, method: MethodId, args: Vec<Value>) -> Result<Value> {
        let shape = I::methods()
            .get(method.0 as usize)
            .ok_or_else(|| Error::UnknownMethod(format!("{} of {}", method, I::NAME)))?;
        I::invoke(&*self.target, shape.name, args).await
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Owner-side record of a shared object.
#[derive(Clone)]
pub(crate) struct SharedObject {
    pub object_id: ObjectId,
    pub name: String,
    pub channel: Channel,
    pub descriptor: Arc<TypeDescriptor>,
    pub invoker: Arc<dyn Invoker>,
}

impl SharedObject {
    /// The target, if it was shared as `I`.
    pub fn target<I: SharedInterface>(&self) -> Option<Arc<I::Object>> {
        self.invoker
            .as_any()
            .downcast_ref::<Bound<I>>()
            .map(|bound| bound.target.clone())
    }
}

impl Indexed for SharedObject {
    fn object_id(&self) -> ObjectId {
        self.object_id
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl Indexed for RemoteObject {
    fn object_id(&self) -> ObjectId {
        RemoteObject::object_id(self)
    }

    fn name(&self) -> &str {
        RemoteObject::name(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Entry(ObjectId, &'static str);

    impl Indexed for Entry {
        fn object_id(&self) -> ObjectId {
            self.0
        }

        fn name(&self) -> &str {
            self.1
        }
    }

    #[test]
    fn test_rebinding_a_name_returns_previous() {
        let mut index = ObjectIndex::new();
        assert!(index.insert(Entry(ObjectId(1), "svc")).is_none());
        assert!(index.insert(Entry(ObjectId(2), "other")).is_none());

        let previous = index.insert(Entry(ObjectId(3), "svc")).map(|e| e.0);
        assert_eq!(previous, Some(ObjectId(1)));
        assert!(index.get(ObjectId(1)).is_none());
        assert_eq!(index.get_by_name("svc").map(|e| e.0), Some(ObjectId(3)));
        assert!(index.get(ObjectId(2)).is_some());
    }

    #[test]
    fn test_remove_unbinds_name_and_id() {
        let mut index = ObjectIndex::new();
        index.insert(Entry(ObjectId(1), "svc"));
        index.insert(Entry(ObjectId(2), "other"));

        assert_eq!(index.remove(ObjectId(1)).map(|e| e.0), Some(ObjectId(1)));
        assert!(index.get(ObjectId(1)).is_none());
        assert!(index.get_by_name("svc").is_none());
        assert!(index.remove(ObjectId(1)).is_none());
        assert!(index.get_by_name("other").is_some());
    }

    #[test]
    fn test_duplicate_type_is_rejected() {
        let mut index: ObjectIndex<Entry> = ObjectIndex::new();
        let desc = Arc::new(TypeDescriptor { id: InterfaceId(0), name: "a".into(), methods: vec![] });
        index.add_type(desc.clone()).unwrap();

        assert!(index.knows_type(InterfaceId(0)));
        assert!(matches!(index.add_type(desc), Err(Error::ProtocolViolation(_))));
    }
}
