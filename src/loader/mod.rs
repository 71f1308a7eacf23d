use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use log::{debug, info, trace};
use realmstore_schema::MetadataError;
use realmstore_schema::metadata::{EntityType, MetadataProvider};
use realmstore_schema::query::{DEFAULT_MAX_DEPTH, EntityQuery, QuerySynthesizer};
use uuid::Uuid;

use crate::graph::deserializer::{DecodeContext, decode_row};
use crate::graph::{Entity, ObjectRef};
use crate::resolver::{ConfigurationResolver, IdentityConflict, LoadScope};
use crate::rows::{Connection, RowCursor};

mod error;

pub use error::{LoadError, PayloadError, PayloadErrorKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoaderSettings {
    /// Maximum nesting of owned navigations below a root.
    pub max_depth: usize,
}

impl Default for LoaderSettings {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

/// Loads aggregates by entity type. Cheap to share between threads, every load call brings its own
/// connection and instance cache, while configuration objects are shared through the
/// [`ConfigurationResolver`].
pub struct GraphLoader {
    metadata: Arc<dyn MetadataProvider>,
    configuration: Arc<ConfigurationResolver>,
    queries: DashMap<&'static str, Arc<EntityQuery>>,
    settings: LoaderSettings,
}

impl GraphLoader {
    pub fn new(metadata: Arc<dyn MetadataProvider>, configuration: Arc<ConfigurationResolver>) -> Self {
        Self {
            metadata,
            configuration,
            queries: DashMap::new(),
            settings: LoaderSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: LoaderSettings) -> Self {
        self.settings = settings;
        self.queries.clear();
        self
    }

    pub fn settings(&self) -> LoaderSettings {
        self.settings
    }

    pub fn configuration(&self) -> &Arc<ConfigurationResolver> {
        &self.configuration
    }

    pub fn metadata(&self) -> &dyn MetadataProvider {
        self.metadata.as_ref()
    }

    /// The synthesized query for an entity type, built on first use.
    pub fn query_for(&self, entity: &str) -> Result<Arc<EntityQuery>, MetadataError> {
        let entity = self.metadata.require(entity)?;
        if let Some(query) = self.queries.get(entity.name) {
            return Ok(query.clone());
        }

        let query = Arc::new(
            QuerySynthesizer::new(self.metadata.as_ref())
                .with_max_depth(self.settings.max_depth)
                .synthesize(entity.name)?,
        );
        // a concurrent caller may have won, both queries are identical
        Ok(self
            .queries
            .entry(entity.name)
            .or_insert(query)
            .value()
            .clone())
    }

    /// Streams every aggregate of `entity`. Rows are decoded as the iterator is advanced.
    pub fn load_all<'c>(
        &'c self,
        connection: &'c mut dyn Connection,
        entity: &str,
    ) -> Result<LoadAll<'c>, LoadError> {
        let query = self.query_for(entity)?;
        let entity = self.metadata.require(entity)?;
        debug!("Loading all {} aggregates", entity.name);

        self.start(connection, entity, query.sql(), None)
    }

    /// Loads the aggregate with the given id, `None` if there is no such row.
    pub fn load_by_id(
        &self,
        connection: &mut dyn Connection,
        entity: &str,
        id: Uuid,
    ) -> Result<Option<ObjectRef>, LoadError> {
        let query = self.query_for(entity)?;
        let entity = self.metadata.require(entity)?;
        debug!("Loading {} {}", entity.name, id);

        self.start(connection, entity, query.by_id_sql(), Some(id))?
            .next()
            .transpose()
    }

    pub fn load_all_as<'c, T: Entity + 'c>(
        &'c self,
        connection: &'c mut dyn Connection,
    ) -> Result<impl Iterator<Item = Result<T, LoadError>> + 'c, LoadError> {
        Ok(self
            .load_all(connection, T::entity_type().name)?
            .map(|object| object.map(T::wrap)))
    }

    pub fn load_as<T: Entity>(&self, connection: &mut dyn Connection, id: Uuid) -> Result<Option<T>, LoadError> {
        Ok(self
            .load_by_id(connection, T::entity_type().name, id)?
            .map(T::wrap))
    }

    /// Makes an object built outside of a load known to every later load.
    pub fn register_configuration_object(&self, object: ObjectRef) -> Result<(), IdentityConflict> {
        self.configuration.register(object)
    }

    pub fn evict_configuration_object(&self, id: Uuid) -> Option<ObjectRef> {
        self.configuration.evict(id)
    }

    fn start<'c>(
        &'c self,
        connection: &'c mut dyn Connection,
        entity: &'static EntityType,
        sql: &str,
        id: Option<Uuid>,
    ) -> Result<LoadAll<'c>, LoadError> {
        let cursor = connection.query(sql, id).map_err(|source| LoadError::Query {
            entity: entity.name,
            source,
        })?;

        Ok(LoadAll {
            entity,
            metadata: self.metadata.as_ref(),
            cursor,
            scope: LoadScope::new(&self.configuration),
            rows: 0,
            started: Instant::now(),
            cancel: None,
            done: false,
        })
    }
}

/// Lazy stream of the aggregates of one load call. Stops for good after the first error.
pub struct LoadAll<'c> {
    entity: &'static EntityType,
    metadata: &'c dyn MetadataProvider,
    cursor: Box<dyn RowCursor + 'c>,
    scope: LoadScope<'c>,
    rows: usize,
    started: Instant,
    cancel: Option<Arc<AtomicBool>>,
    done: bool,
}

impl LoadAll<'_> {
    /// Stops the stream before the next row once `flag` is set. A row that is being decoded is
    /// always finished.
    pub fn cancel_on(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    fn fail(&mut self, error: LoadError) -> Option<Result<ObjectRef, LoadError>> {
        self.done = true;
        self.scope.abandon_row();
        Some(Err(error))
    }
}

impl Iterator for LoadAll<'_> {
    type Item = Result<ObjectRef, LoadError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        if self
            .cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
        {
            debug!("Cancelled loading {} after {} rows", self.entity.name, self.rows);
            let error = LoadError::Cancelled {
                entity: self.entity.name,
                rows: self.rows,
            };
            return self.fail(error);
        }

        // the row borrows the cursor, it has to be gone before the scope is finished or abandoned
        let outcome = match self.cursor.next_row() {
            Ok(Some(raw)) => {
                trace!("Decoding {} row {} ({})", self.entity.name, self.rows, raw.id);
                let mut context = DecodeContext::new(self.metadata, &mut self.scope);
                Some(decode_row(&mut context, self.entity, self.rows, raw.id, raw.json).map_err(LoadError::from))
            }
            Ok(None) => None,
            Err(source) => Some(Err(LoadError::Query {
                entity: self.entity.name,
                source,
            })),
        };

        match outcome {
            Some(Ok(object)) => {
                self.scope.finish_row();
                self.rows += 1;
                Some(Ok(object))
            }
            Some(Err(error)) => self.fail(error),
            None => {
                self.done = true;
                info!(
                    "Loaded {} {} aggregates in {}ms",
                    self.rows,
                    self.entity.name,
                    self.started.elapsed().as_millis()
                );
                None
            }
        }
    }
}

impl std::iter::FusedIterator for LoadAll<'_> {}
