use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::sync::{Arc, RwLock, Weak};

use chrono::{DateTime, Utc};
use itertools::Itertools;
use realmstore_schema::metadata::{Cardinality, EntityType, IdentityScope, Navigation};
use realmstore_schema::wire::{ID_KEY, REF_KEY, binary};
use serde_json::{Map, Number, json};
use thiserror::Error;
use uuid::Uuid;

pub mod deserializer;

#[cfg(test)]
mod tests;

pub type ObjectRef = Arc<GraphObject>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Entity type {entity} has no member {member}")]
pub struct UnknownMember {
    pub entity: &'static str,
    pub member: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    Uuid(Uuid),
    Binary(Vec<u8>),
    Timestamp(DateTime<Utc>),
}

impl Value {
    fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Boolean(value) => json!(value),
            Value::Integer(value) => json!(value),
            Value::Float(value) => Number::from_f64(*value)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Text(value) => json!(value),
            Value::Uuid(value) => json!(value.to_string()),
            Value::Binary(value) => json!(binary::encode(value)),
            Value::Timestamp(value) => json!(value.to_rfc3339()),
        }
    }
}

/// An edge to another object. Owned edges and edges from instance objects into the configuration
/// cache keep their target alive. Every other edge is weak: back-references between instance objects,
/// and references between configuration objects, whose targets the cache keeps alive. Neither kind
/// can form an `Arc` cycle.
#[derive(Clone)]
pub enum Link {
    Strong(ObjectRef),
    Weak(Weak<GraphObject>),
}

impl Link {
    pub fn new(source: IdentityScope, navigation: &Navigation, target: ObjectRef) -> Self {
        let into_cache =
            source == IdentityScope::Instance && target.scope == IdentityScope::Configuration;
        if navigation.is_owned() || into_cache {
            Link::Strong(target)
        } else {
            Link::Weak(Arc::downgrade(&target))
        }
    }

    pub fn upgrade(&self) -> Option<ObjectRef> {
        match self {
            Link::Strong(target) => Some(target.clone()),
            Link::Weak(target) => target.upgrade(),
        }
    }

    pub fn is_strong(&self) -> bool {
        matches!(self, Link::Strong(_))
    }
}

#[derive(Clone)]
pub enum Slot {
    One(Option<Link>),
    Many(Vec<Link>),
}

impl Slot {
    fn empty(navigation: &Navigation) -> Self {
        match navigation.cardinality {
            Cardinality::ToOne => Slot::One(None),
            Cardinality::ToMany => Slot::Many(Vec::new()),
        }
    }
}

/// One materialized entity. The columns and navigations are behind locks, so that the object can be
/// registered with its resolver before its members have been read.
pub struct GraphObject {
    entity: &'static EntityType,
    id: Uuid,
    scope: IdentityScope,
    columns: RwLock<HashMap<&'static str, Value>>,
    navigations: RwLock<HashMap<&'static str, Slot>>,
}

impl GraphObject {
    pub fn new(entity: &'static EntityType, id: Uuid, scope: IdentityScope) -> ObjectRef {
        let columns = entity
            .columns
            .iter()
            .map(|column| (column.name, Value::Null))
            .collect();
        let navigations = entity
            .navigations
            .iter()
            .map(|navigation| (navigation.name, Slot::empty(navigation)))
            .collect();

        Arc::new(Self {
            entity,
            id,
            scope,
            columns: RwLock::new(columns),
            navigations: RwLock::new(navigations),
        })
    }

    pub fn entity_type(&self) -> &'static EntityType {
        self.entity
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn scope(&self) -> IdentityScope {
        self.scope
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.columns
            .read()
            .expect("Column read lock")
            .get(name)
            .cloned()
    }

    pub fn text(&self, name: &str) -> Option<String> {
        match self.get(name)? {
            Value::Text(value) => Some(value),
            _ => None,
        }
    }

    pub fn integer(&self, name: &str) -> Option<i64> {
        match self.get(name)? {
            Value::Integer(value) => Some(value),
            _ => None,
        }
    }

    pub fn float(&self, name: &str) -> Option<f64> {
        match self.get(name)? {
            Value::Float(value) => Some(value),
            Value::Integer(value) => Some(value as f64),
            _ => None,
        }
    }

    pub fn boolean(&self, name: &str) -> Option<bool> {
        match self.get(name)? {
            Value::Boolean(value) => Some(value),
            _ => None,
        }
    }

    pub fn uuid(&self, name: &str) -> Option<Uuid> {
        match self.get(name)? {
            Value::Uuid(value) => Some(value),
            _ => None,
        }
    }

    pub fn binary(&self, name: &str) -> Option<Vec<u8>> {
        match self.get(name)? {
            Value::Binary(value) => Some(value),
            _ => None,
        }
    }

    pub fn timestamp(&self, name: &str) -> Option<DateTime<Utc>> {
        match self.get(name)? {
            Value::Timestamp(value) => Some(value),
            _ => None,
        }
    }

    /// The target of a to-one navigation, if it is set and still alive.
    pub fn reference(&self, name: &str) -> Option<ObjectRef> {
        match self
            .navigations
            .read()
            .expect("Navigation read lock")
            .get(name)?
        {
            Slot::One(link) => link.as_ref()?.upgrade(),
            Slot::Many(_) => None,
        }
    }

    /// The live elements of a to-many navigation, in load order.
    pub fn collection(&self, name: &str) -> Vec<ObjectRef> {
        match self
            .navigations
            .read()
            .expect("Navigation read lock")
            .get(name)
        {
            Some(Slot::Many(links)) => links.iter().filter_map(Link::upgrade).collect_vec(),
            _ => Vec::new(),
        }
    }

    pub fn link(&self, name: &str) -> Option<Slot> {
        self.navigations
            .read()
            .expect("Navigation read lock")
            .get(name)
            .cloned()
    }

    pub fn set(&self, name: &str, value: Value) -> Result<(), UnknownMember> {
        let column = self.entity.column(name).ok_or_else(|| self.unknown(name))?;
        self.put_value(column.name, value);
        Ok(())
    }

    pub fn set_reference(&self, name: &str, target: Option<ObjectRef>) -> Result<(), UnknownMember> {
        let navigation = self
            .entity
            .navigation(name)
            .filter(|navigation| navigation.cardinality == Cardinality::ToOne)
            .ok_or_else(|| self.unknown(name))?;
        self.put_reference(navigation, target);
        Ok(())
    }

    pub fn set_collection(&self, name: &str, targets: Vec<ObjectRef>) -> Result<(), UnknownMember> {
        let navigation = self
            .entity
            .navigation(name)
            .filter(|navigation| navigation.cardinality == Cardinality::ToMany)
            .ok_or_else(|| self.unknown(name))?;
        self.put_collection(navigation, targets);
        Ok(())
    }

    pub(crate) fn put_value(&self, name: &'static str, value: Value) {
        self.columns
            .write()
            .expect("Column write lock")
            .insert(name, value);
    }

    pub(crate) fn put_reference(&self, navigation: &'static Navigation, target: Option<ObjectRef>) {
        let link = target.map(|target| Link::new(self.scope, navigation, target));
        self.navigations
            .write()
            .expect("Navigation write lock")
            .insert(navigation.name, Slot::One(link));
    }

    pub(crate) fn put_collection(&self, navigation: &'static Navigation, targets: Vec<ObjectRef>) {
        let links = targets
            .into_iter()
            .map(|target| Link::new(self.scope, navigation, target))
            .collect_vec();
        self.navigations
            .write()
            .expect("Navigation write lock")
            .insert(navigation.name, Slot::Many(links));
    }

    fn unknown(&self, member: &str) -> UnknownMember {
        UnknownMember {
            entity: self.entity.name,
            member: member.into(),
        }
    }

    /// Renders the object back into the document shape the queries produce: owned navigations
    /// inline, every other edge as a reference marker. Owned edges must form a tree.
    pub fn to_json(&self) -> serde_json::Value {
        let mut document = Map::new();
        document.insert(ID_KEY.into(), json!(self.id.to_string()));

        {
            let columns = self.columns.read().expect("Column read lock");
            for column in self.entity.columns {
                let value = columns.get(column.name).unwrap_or(&Value::Null);
                document.insert(column.name.into(), value.to_json());
            }
        }

        let navigations = self.navigations.read().expect("Navigation read lock");
        for navigation in self.entity.navigations {
            let render = |link: &Link| match link.upgrade() {
                Some(target) if navigation.is_owned() => target.to_json(),
                Some(target) => marker(target.id),
                None => serde_json::Value::Null,
            };

            let value = match navigations.get(navigation.name) {
                Some(Slot::One(Some(link))) => render(link),
                Some(Slot::Many(links)) => serde_json::Value::Array(
                    links
                        .iter()
                        .map(render)
                        .filter(|value| !value.is_null())
                        .collect_vec(),
                ),
                _ => match navigation.cardinality {
                    Cardinality::ToOne => serde_json::Value::Null,
                    Cardinality::ToMany => json!([]),
                },
            };
            document.insert(navigation.name.into(), value);
        }

        serde_json::Value::Object(document)
    }
}

fn marker(id: Uuid) -> serde_json::Value {
    let mut marker = Map::new();
    marker.insert(REF_KEY.into(), json!(id.to_string()));
    serde_json::Value::Object(marker)
}

impl Debug for GraphObject {
    // Navigations are printed as ids only, configuration graphs may be cyclic.
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let columns = self.columns.read().expect("Column read lock");
        let navigations = self.navigations.read().expect("Navigation read lock");
        let ids = |links: &[&Link]| {
            links
                .iter()
                .filter_map(|link| link.upgrade())
                .map(|target| target.id)
                .collect_vec()
        };

        let mut debug = f.debug_struct(self.entity.name);
        debug.field("id", &self.id).field("scope", &self.scope);
        for column in self.entity.columns {
            debug.field(column.name, columns.get(column.name).unwrap_or(&Value::Null));
        }
        for navigation in self.entity.navigations {
            match navigations.get(navigation.name) {
                Some(Slot::One(link)) => debug.field(navigation.name, &ids(&link.iter().collect_vec())),
                Some(Slot::Many(links)) => debug.field(navigation.name, &ids(&links.iter().collect_vec())),
                None => debug.field(navigation.name, &Option::<Uuid>::None),
            };
        }
        debug.finish()
    }
}

/// A typed view over a [`GraphObject`] of one specific entity type.
pub trait Entity: Sized {
    fn entity_type() -> &'static EntityType;

    /// Wraps an object that is known to be of [`Entity::entity_type`].
    fn wrap(object: ObjectRef) -> Self;

    fn object(&self) -> &ObjectRef;

    fn from_object(object: ObjectRef) -> Option<Self> {
        (object.entity_type() == Self::entity_type()).then(|| Self::wrap(object))
    }

    fn id(&self) -> Uuid {
        self.object().id()
    }
}

/// Declares typed views: `entity_view!(pub Account => ACCOUNT);`
#[macro_export]
macro_rules! entity_view {
    ($(#[$meta:meta])* $vis:vis $name:ident => $entity:path) => {
        $(#[$meta])*
        #[derive(Debug, Clone)]
        $vis struct $name($crate::graph::ObjectRef);

        impl $crate::graph::Entity for $name {
            fn entity_type() -> &'static $crate::schema::metadata::EntityType {
                &$entity
            }

            fn wrap(object: $crate::graph::ObjectRef) -> Self {
                Self(object)
            }

            fn object(&self) -> &$crate::graph::ObjectRef {
                &self.0
            }
        }
    };
}
