//! # Type Descriptor Cache
//!
//! Builds the descriptor of an interface the first time it is asked for and
//! numbers it from a counter owned by this cache.
//!
//! ## Invariants
//!
//! - One descriptor per interface per cache; later lookups return it unchanged.
//! - Interface ids start at 0 and follow first-seen order.
//! - Two caches number the same interface independently, which is why the
//!   whole descriptor travels to the peer.
//!
//! Building is pure, so two tasks racing on a new interface may both build
//! one. The first insert wins and the loser's id is skipped.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::RwLock;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;

use tracing::debug;

use crate::descriptor::TypeDescriptor;
use crate::error::Error;
use crate::error::Result;
use crate::ids::InterfaceId;
use crate::interface::SharedInterface;

#[derive(Default)]
pub struct TypeDescriptorCache {
    types: RwLock<HashMap<TypeId, Arc<TypeDescriptor>>>,
    next_id: AtomicU32,
}

impl TypeDescriptorCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the descriptor for `I`, building it on first use.
    pub fn descriptor<I: SharedInterface>(&self) -> Result<Arc<TypeDescriptor>> {
        let key = TypeId::of::<I>();

        if let Some(desc) = self.read()?.get(&key) {
            return Ok(desc.clone());
        }

        let built = Arc::new(TypeDescriptor::from_shapes(self.next()?, I::NAME, I::methods())?);

        let mut types = self
            .types
            .write()
            .map_err(|_| Error::failed("descriptor cache poisoned"))?;
        let desc = types.entry(key).or_insert_with(|| {
            debug!(iface = %built.id, name = %built.name, "described interface");
            built
        });
        Ok(desc.clone())
    }

    /// Number of interfaces described so far.
    pub fn len(&self) -> usize {
        self.read().map(|types| types.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, HashMap<TypeId, Arc<TypeDescriptor>>>> {
        self.types.read().map_err(|_| Error::failed("descriptor cache poisoned"))
    }

    fn next(&self) -> Result<InterfaceId> {
        let raw = self.next_id.fetch_add(1, Ordering::Relaxed);
        u16::try_from(raw).map(InterfaceId).map_err(|_| Error::IdsExhausted)
    }
}

impl std::fmt::Debug for TypeDescriptorCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeDescriptorCache").field("types", &self.len()).finish()
    }
}
