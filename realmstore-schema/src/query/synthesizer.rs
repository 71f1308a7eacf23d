use itertools::Itertools;
use log::debug;

use crate::MetadataError;
use crate::metadata::registry::validate_navigation;
use crate::metadata::types::quote_ident;
use crate::metadata::{Cardinality, EntityType, MetadataProvider, Navigation, Relation};
use crate::query::EntityQuery;
use crate::wire::{ID_KEY, REF_KEY};

/// How many owned navigations may be nested below a root before synthesis gives up.
pub const DEFAULT_MAX_DEPTH: usize = 8;

pub struct QuerySynthesizer<'m> {
    metadata: &'m dyn MetadataProvider,
    max_depth: usize,
}

/// The owned navigations walked from the root down to the object currently being projected.
#[derive(Default)]
struct OwnedChain {
    entities: Vec<&'static str>,
    steps: Vec<String>,
}

impl OwnedChain {
    fn describe(&self) -> String {
        self.steps.iter().join(" -> ")
    }
}

pub(super) fn alias(depth: usize) -> String {
    if depth < 26 {
        char::from(b'a' + depth as u8).to_string()
    } else {
        format!("t{depth}")
    }
}

impl<'m> QuerySynthesizer<'m> {
    pub fn new(metadata: &'m dyn MetadataProvider) -> Self {
        Self {
            metadata,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn synthesize(&self, entity_name: &str) -> Result<EntityQuery, MetadataError> {
        let entity = self.metadata.require(entity_name)?;
        let root = alias(0);

        let mut chain = OwnedChain::default();
        chain.entities.push(entity.name);
        let projection = self.projection(entity, 0, &mut chain)?;

        let sql = format!(
            "SELECT {root}.{pk} AS {id}, (SELECT row_to_json({root}_json) FROM (SELECT {projection}) {root}_json) AS \"json\" FROM {table} {root}",
            pk = quote_ident(entity.primary_key),
            id = quote_ident(ID_KEY),
            table = entity.table,
        );
        debug!("Synthesized query for {} ({} bytes)", entity.name, sql.len());

        Ok(EntityQuery::new(entity.name, root, entity.primary_key, sql))
    }

    fn projection(&self, entity: &'static EntityType, depth: usize, chain: &mut OwnedChain) -> Result<String, MetadataError> {
        let alias = alias(depth);
        let mut parts = Vec::with_capacity(1 + entity.columns.len() + entity.navigations.len());
        parts.push(format!(
            "{alias}.{} AS {}",
            quote_ident(entity.primary_key),
            quote_ident(ID_KEY)
        ));

        for column in entity.columns {
            parts.push(format!(
                "{alias}.{} AS {}",
                quote_ident(column.column),
                quote_ident(column.name)
            ));
        }

        for navigation in entity.ordered_navigations()? {
            let expression = self.navigation(entity, navigation, depth, chain)?;
            parts.push(format!("{expression} AS {}", quote_ident(navigation.name)));
        }

        Ok(parts.join(", "))
    }

    fn navigation(
        &self,
        entity: &'static EntityType,
        navigation: &'static Navigation,
        depth: usize,
        chain: &mut OwnedChain,
    ) -> Result<String, MetadataError> {
        validate_navigation(entity, navigation)?;
        let target = self.metadata.require(navigation.target)?;
        let parent = alias(depth);
        let child = alias(depth + 1);
        let marker = |expression: &str| format!("json_build_object('{REF_KEY}', {expression})");

        let expression = match (navigation.relation, navigation.cardinality) {
            (Relation::Owned, cardinality) => {
                let inner = self.descend(entity, navigation, target, depth, chain)?;
                let foreign_key = quote_ident(navigation.foreign_key.unwrap_or_default());
                let primary_key = quote_ident(target.primary_key);
                match cardinality {
                    Cardinality::ToOne => format!(
                        "(SELECT row_to_json({child}_json) FROM (SELECT {inner} FROM {table} {child} WHERE {child}.{primary_key} = {parent}.{foreign_key}) {child}_json)",
                        table = target.table,
                    ),
                    Cardinality::ToMany => format!(
                        "(SELECT COALESCE(json_agg({child}_json), '[]'::json) FROM (SELECT {inner} FROM {table} {child} WHERE {child}.{foreign_key} = {parent}.{parent_key}{order}) {child}_json)",
                        table = target.table,
                        parent_key = quote_ident(entity.primary_key),
                        order = target
                            .order_by
                            .map(|column| format!(" ORDER BY {child}.{}", quote_ident(column)))
                            .unwrap_or_default(),
                    ),
                }
            }
            (Relation::Referenced, Cardinality::ToOne) => {
                let foreign_key = format!(
                    "{parent}.{}",
                    quote_ident(navigation.foreign_key.unwrap_or_default())
                );
                format!(
                    "CASE WHEN {foreign_key} IS NULL THEN NULL ELSE {} END",
                    marker(&foreign_key)
                )
            }
            (Relation::Referenced, Cardinality::ToMany) => {
                let target_key = format!("{child}.{}", quote_ident(target.primary_key));
                let order = format!(
                    "{child}.{}",
                    quote_ident(target.order_by.unwrap_or(target.primary_key))
                );
                format!(
                    "(SELECT COALESCE(json_agg({} ORDER BY {order}), '[]'::json) FROM {table} {child} WHERE {child}.{foreign_key} = {parent}.{parent_key})",
                    marker(&target_key),
                    table = target.table,
                    foreign_key = quote_ident(navigation.foreign_key.unwrap_or_default()),
                    parent_key = quote_ident(entity.primary_key),
                )
            }
            (Relation::ManyToMany(join), _) => {
                let target_key = format!("{child}.{}", quote_ident(join.target_key));
                format!(
                    "(SELECT COALESCE(json_agg({} ORDER BY {target_key}), '[]'::json) FROM {table} {child} WHERE {child}.{owner_key} = {parent}.{parent_key})",
                    marker(&target_key),
                    table = join.table,
                    owner_key = quote_ident(join.owner_key),
                    parent_key = quote_ident(entity.primary_key),
                )
            }
        };

        Ok(expression)
    }

    /// Projects the target of an owned navigation one level deeper, guarding against loops and
    /// runaway nesting.
    fn descend(
        &self,
        entity: &'static EntityType,
        navigation: &'static Navigation,
        target: &'static EntityType,
        depth: usize,
        chain: &mut OwnedChain,
    ) -> Result<String, MetadataError> {
        chain
            .steps
            .push(format!("{}.{}", entity.name, navigation.name));

        if chain.entities.contains(&target.name) {
            return Err(MetadataError::OwnedCycle {
                chain: chain.describe(),
                entity: target.name,
            });
        }

        if depth + 1 > self.max_depth {
            return Err(MetadataError::RecursionLimit {
                chain: chain.describe(),
                max_depth: self.max_depth,
            });
        }

        chain.entities.push(target.name);
        let projection = self.projection(target, depth + 1, chain)?;
        chain.entities.pop();
        chain.steps.pop();

        Ok(projection)
    }
}
