use std::collections::HashMap;

use uuid::Uuid;

use crate::graph::ObjectRef;

/// Identity cache of a single load call. It keeps every object of the load alive until the load is
/// dropped, so weak instance references resolved during the load stay valid.
#[derive(Default)]
pub struct InstanceResolver {
    objects: HashMap<Uuid, ObjectRef>,
}

impl InstanceResolver {
    pub fn resolve(&self, id: Uuid) -> Option<ObjectRef> {
        self.objects.get(&id).cloned()
    }

    pub fn register(&mut self, object: ObjectRef) {
        self.objects.insert(object.id(), object);
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}
