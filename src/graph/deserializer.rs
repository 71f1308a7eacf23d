//! Rebuilds object graphs from the documents the synthesized queries produce, streaming straight out
//! of the row reader.
//!
//! An object is either inline (first member `id`) or a reference marker (only member `$ref`). Inline
//! objects are registered before their members are read, so references further down the document can
//! already resolve them.

use std::fmt::Formatter;
use std::io::{BufReader, Read};

use chrono::{DateTime, NaiveDateTime, Utc};
use itertools::Itertools;
use log::debug;
use realmstore_schema::metadata::{Cardinality, Column, ColumnType, EntityType, IdentityScope, MetadataProvider};
use realmstore_schema::wire::binary::{self, BinaryDecodeError};
use realmstore_schema::wire::{ID_KEY, REF_KEY};
use serde::de::{DeserializeSeed, Error as _, IgnoredAny, MapAccess, SeqAccess, Unexpected, Visitor};
use serde::Deserializer;
use uuid::Uuid;

use crate::graph::{GraphObject, ObjectRef, Value};
use crate::loader::{PayloadError, PayloadErrorKind};
use crate::resolver::LoadScope;

/// Typed causes that serde's error type cannot carry. Recorded next to the serde error and preferred
/// over it when the row error is built.
enum Fault {
    Binary {
        column: &'static str,
        source: BinaryDecodeError,
    },
    RootNotInline,
    RowIdMismatch {
        payload_id: Uuid,
    },
}

pub struct DecodeContext<'d, 'l> {
    metadata: &'d dyn MetadataProvider,
    scope: &'d mut LoadScope<'l>,
    path: Vec<String>,
    fault: Option<Fault>,
}

impl<'d, 'l> DecodeContext<'d, 'l> {
    pub fn new(metadata: &'d dyn MetadataProvider, scope: &'d mut LoadScope<'l>) -> Self {
        Self {
            metadata,
            scope,
            path: Vec::new(),
            fault: None,
        }
    }

    fn describe_path(&self) -> String {
        self.path.iter().join("")
    }

    fn enter(&mut self, navigation: &str) {
        if self.path.is_empty() {
            self.path.push(navigation.into());
        } else {
            self.path.push(format!(".{navigation}"));
        }
    }

    fn leave(&mut self) {
        self.path.pop();
    }
}

/// Decodes one row. `row` is the zero based position inside the result set, used for diagnostics.
pub fn decode_row(
    context: &mut DecodeContext<'_, '_>,
    entity: &'static EntityType,
    row: usize,
    row_id: Uuid,
    json: impl Read,
) -> Result<ObjectRef, PayloadError> {
    context.path.clear();
    context.fault = None;

    let mut deserializer = serde_json::Deserializer::from_reader(BufReader::new(json));
    let seed = ObjectSeed {
        context: &mut *context,
        entity,
        scope: entity.lifetime,
        root: Some(row_id),
    };

    let result = seed
        .deserialize(&mut deserializer)
        .and_then(|object| deserializer.end().map(|_| object));

    match result {
        Ok(Some(object)) => Ok(object),
        Ok(None) => Err(PayloadError {
            entity: entity.name,
            row,
            path: String::new(),
            kind: PayloadErrorKind::RootNotInline,
        }),
        Err(error) => {
            let kind = match context.fault.take() {
                Some(Fault::Binary { column, source }) => PayloadErrorKind::Binary { column, source },
                Some(Fault::RootNotInline) => PayloadErrorKind::RootNotInline,
                Some(Fault::RowIdMismatch { payload_id }) => PayloadErrorKind::RowIdMismatch { row_id, payload_id },
                None => PayloadErrorKind::Json(error),
            };
            Err(PayloadError {
                entity: entity.name,
                row,
                path: context.describe_path(),
                kind,
            })
        }
    }
}

/// One object position: inline object, reference marker or `null`.
struct ObjectSeed<'c, 'd, 'l> {
    context: &'c mut DecodeContext<'d, 'l>,
    entity: &'static EntityType,
    scope: IdentityScope,
    /// Set for the row root, carrying the id the row column announced.
    root: Option<Uuid>,
}

impl<'de> DeserializeSeed<'de> for ObjectSeed<'_, '_, '_> {
    type Value = Option<ObjectRef>;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<Self::Value, D::Error> {
        deserializer.deserialize_any(self)
    }
}

impl<'de> Visitor<'de> for ObjectSeed<'_, '_, '_> {
    type Value = Option<ObjectRef>;

    fn expecting(&self, formatter: &mut Formatter) -> std::fmt::Result {
        write!(formatter, "a {} object, a reference marker or null", self.entity.name)
    }

    fn visit_unit<E: serde::de::Error>(self) -> Result<Self::Value, E> {
        Ok(None)
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let context = self.context;
        let first = map.next_key::<String>()?;

        match first.as_deref() {
            Some(REF_KEY) => {
                if self.root.is_some() {
                    context.fault = Some(Fault::RootNotInline);
                    return Err(A::Error::custom("the row root is a reference marker"));
                }

                let id = map.next_value::<Option<Uuid>>()?;
                if let Some(extra) = map.next_key::<String>()? {
                    return Err(A::Error::custom(format!(
                        "unexpected member {extra} in a reference marker"
                    )));
                }

                let Some(id) = id else {
                    return Ok(None);
                };
                let resolved = context.scope.resolve(self.scope, id);
                if resolved.is_none() {
                    debug!(
                        "Dangling reference to {} {} at {}",
                        self.entity.name,
                        id,
                        context.describe_path()
                    );
                }
                Ok(resolved)
            }
            Some(ID_KEY) => {
                let id = map.next_value::<Uuid>()?;
                if let Some(row_id) = self.root
                    && row_id != id
                {
                    context.fault = Some(Fault::RowIdMismatch { payload_id: id });
                    return Err(A::Error::custom("the payload id differs from the row id"));
                }

                if let Some(existing) = context.scope.resolve_inline(self.scope, id) {
                    while map.next_entry::<IgnoredAny, IgnoredAny>()?.is_some() {}
                    return Ok(Some(existing));
                }

                let object = GraphObject::new(self.entity, id, self.scope);
                context.scope.register(object.clone());
                read_members(context, &object, self.scope, &mut map)?;
                Ok(Some(object))
            }
            Some(other) => Err(A::Error::custom(format!(
                "expected {ID_KEY} or {REF_KEY} as the first member, found {other}"
            ))),
            None => Err(A::Error::custom(format!(
                "expected {ID_KEY} or {REF_KEY}, found an empty object"
            ))),
        }
    }
}

fn read_members<'de, A: MapAccess<'de>>(
    context: &mut DecodeContext<'_, '_>,
    object: &ObjectRef,
    active: IdentityScope,
    map: &mut A,
) -> Result<(), A::Error> {
    let entity = object.entity_type();

    while let Some(key) = map.next_key::<String>()? {
        if let Some(column) = entity.column(&key) {
            let value = map.next_value_seed(ColumnSeed {
                context: &mut *context,
                column,
            })?;
            object.put_value(column.name, value);
            continue;
        }

        let Some(navigation) = entity.navigation(&key) else {
            return Err(A::Error::custom(format!(
                "unknown member {key} of {}",
                entity.name
            )));
        };
        let target = context
            .metadata
            .require(navigation.target)
            .map_err(A::Error::custom)?;
        let scope = navigation.scope_for(active, target);

        context.enter(navigation.name);
        match navigation.cardinality {
            Cardinality::ToOne => {
                let child = map.next_value_seed(ObjectSeed {
                    context: &mut *context,
                    entity: target,
                    scope,
                    root: None,
                })?;
                object.put_reference(navigation, child);
            }
            Cardinality::ToMany => {
                let children = map.next_value_seed(CollectionSeed {
                    context: &mut *context,
                    entity: target,
                    scope,
                })?;
                object.put_collection(navigation, children);
            }
        }
        context.leave();
    }

    Ok(())
}

/// A JSON array of objects. `null` reads as an empty collection, null and dangling elements are
/// skipped.
struct CollectionSeed<'c, 'd, 'l> {
    context: &'c mut DecodeContext<'d, 'l>,
    entity: &'static EntityType,
    scope: IdentityScope,
}

impl<'de> DeserializeSeed<'de> for CollectionSeed<'_, '_, '_> {
    type Value = Vec<ObjectRef>;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<Self::Value, D::Error> {
        deserializer.deserialize_any(self)
    }
}

impl<'de> Visitor<'de> for CollectionSeed<'_, '_, '_> {
    type Value = Vec<ObjectRef>;

    fn expecting(&self, formatter: &mut Formatter) -> std::fmt::Result {
        write!(formatter, "an array of {} objects or null", self.entity.name)
    }

    fn visit_unit<E: serde::de::Error>(self) -> Result<Self::Value, E> {
        Ok(Vec::new())
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let context = self.context;
        let mut objects = Vec::with_capacity(seq.size_hint().unwrap_or(0));

        for index in 0.. {
            context.path.push(format!("[{index}]"));
            let element = seq.next_element_seed(ObjectSeed {
                context: &mut *context,
                entity: self.entity,
                scope: self.scope,
                root: None,
            })?;
            context.path.pop();

            match element {
                Some(Some(object)) => objects.push(object),
                Some(None) => {}
                None => break,
            }
        }

        Ok(objects)
    }
}

/// A scalar column, decoded according to its declared [`ColumnType`].
struct ColumnSeed<'c, 'd, 'l> {
    context: &'c mut DecodeContext<'d, 'l>,
    column: &'static Column,
}

impl<'de> DeserializeSeed<'de> for ColumnSeed<'_, '_, '_> {
    type Value = Value;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<Self::Value, D::Error> {
        deserializer.deserialize_any(self)
    }
}

impl ColumnSeed<'_, '_, '_> {
    fn mismatch<E: serde::de::Error>(&self, unexpected: Unexpected) -> E {
        E::invalid_type(unexpected, self)
    }
}

impl<'de> Visitor<'de> for ColumnSeed<'_, '_, '_> {
    type Value = Value;

    fn expecting(&self, formatter: &mut Formatter) -> std::fmt::Result {
        write!(
            formatter,
            "a {:?} value for column {}",
            self.column.ty, self.column.name
        )
    }

    fn visit_unit<E: serde::de::Error>(self) -> Result<Self::Value, E> {
        Ok(Value::Null)
    }

    fn visit_bool<E: serde::de::Error>(self, value: bool) -> Result<Self::Value, E> {
        match self.column.ty {
            ColumnType::Boolean => Ok(Value::Boolean(value)),
            _ => Err(self.mismatch(Unexpected::Bool(value))),
        }
    }

    fn visit_i64<E: serde::de::Error>(self, value: i64) -> Result<Self::Value, E> {
        match self.column.ty {
            ColumnType::Integer => Ok(Value::Integer(value)),
            ColumnType::Float => Ok(Value::Float(value as f64)),
            _ => Err(self.mismatch(Unexpected::Signed(value))),
        }
    }

    fn visit_u64<E: serde::de::Error>(self, value: u64) -> Result<Self::Value, E> {
        match (self.column.ty, i64::try_from(value)) {
            (ColumnType::Integer, Ok(value)) => Ok(Value::Integer(value)),
            (ColumnType::Float, _) => Ok(Value::Float(value as f64)),
            _ => Err(self.mismatch(Unexpected::Unsigned(value))),
        }
    }

    fn visit_f64<E: serde::de::Error>(self, value: f64) -> Result<Self::Value, E> {
        match self.column.ty {
            ColumnType::Float => Ok(Value::Float(value)),
            _ => Err(self.mismatch(Unexpected::Float(value))),
        }
    }

    fn visit_str<E: serde::de::Error>(self, value: &str) -> Result<Self::Value, E> {
        match self.column.ty {
            ColumnType::Text => Ok(Value::Text(value.to_owned())),
            ColumnType::Uuid => Uuid::parse_str(value)
                .map(Value::Uuid)
                .map_err(|_| E::invalid_value(Unexpected::Str(value), &self)),
            ColumnType::Timestamp => parse_timestamp(value)
                .map(Value::Timestamp)
                .ok_or_else(|| E::invalid_value(Unexpected::Str(value), &self)),
            ColumnType::Binary => match binary::decode(value) {
                Ok(bytes) => Ok(Value::Binary(bytes)),
                Err(source) => {
                    let message = format!("column {}: {source}", self.column.name);
                    self.context.fault = Some(Fault::Binary {
                        column: self.column.name,
                        source,
                    });
                    Err(E::custom(message))
                }
            },
            _ => Err(self.mismatch(Unexpected::Str(value))),
        }
    }
}

/// `timestamptz` renders with an offset, `timestamp` without one and is taken as UTC.
fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|timestamp| timestamp.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|timestamp| timestamp.and_utc())
        })
}
