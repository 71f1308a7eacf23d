use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use dashmap::DashMap;
use log::{debug, trace};
use uuid::Uuid;

use crate::graph::ObjectRef;
use crate::resolver::IdentityConflict;

/// Process wide identity cache for configuration objects (item definitions, classes, maps).
///
/// Lookups never block. Everything that adds objects goes through one population lock, and objects
/// built by a load only become visible once the row that built them is complete.
pub struct ConfigurationResolver {
    objects: DashMap<Uuid, ObjectRef>,
    population: Mutex<()>,
}

impl ConfigurationResolver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn resolve(&self, id: Uuid) -> Option<ObjectRef> {
        self.objects.get(&id).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.objects.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Registers an object built outside of a load. Registering the same object again is a no-op.
    pub fn register(&self, object: ObjectRef) -> Result<(), IdentityConflict> {
        let _guard = self.lock();
        if let Some(existing) = self.resolve(object.id()) {
            return if Arc::ptr_eq(&existing, &object) {
                Ok(())
            } else {
                Err(IdentityConflict {
                    id: object.id(),
                    entity: existing.entity_type().name,
                })
            };
        }

        debug!(
            "Registering configuration object {} {}",
            object.entity_type().name,
            object.id()
        );
        self.objects.insert(object.id(), object);
        Ok(())
    }

    /// Removes an object, so the next load that inlines its id builds a fresh one. Instance objects
    /// and owners that still point at the evicted object keep it alive, plain references from other
    /// configuration objects read as `None` once it is gone.
    pub fn evict(&self, id: Uuid) -> Option<ObjectRef> {
        let _guard = self.lock();
        self.objects.remove(&id).map(|(_, object)| object)
    }

    pub fn begin_population(&self) -> Population<'_> {
        Population {
            _guard: self.lock(),
            resolver: self,
            staged: HashMap::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        // The guarded data is (), a panic while holding it leaves nothing inconsistent.
        self.population
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for ConfigurationResolver {
    fn default() -> Self {
        Self {
            objects: DashMap::with_capacity(100),
            population: Mutex::new(()),
        }
    }
}

/// Configuration objects created by the row currently being decoded. Dropping it without
/// [`Population::publish`] discards them.
pub struct Population<'r> {
    _guard: MutexGuard<'r, ()>,
    resolver: &'r ConfigurationResolver,
    staged: HashMap<Uuid, ObjectRef>,
}

impl Population<'_> {
    pub fn resolve(&self, id: Uuid) -> Option<ObjectRef> {
        self.staged.get(&id).cloned()
    }

    pub fn stage(&mut self, object: ObjectRef) {
        self.staged.insert(object.id(), object);
    }

    pub fn publish(self) {
        if !self.staged.is_empty() {
            trace!("Publishing {} configuration objects", self.staged.len());
        }

        for (id, object) in self.staged {
            self.resolver.objects.insert(id, object);
        }
    }
}
