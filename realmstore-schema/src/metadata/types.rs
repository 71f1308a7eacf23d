use std::fmt::{Display, Formatter};

/// Which identity cache an object lives in. Doubles as the lifetime class of an entity type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdentityScope {
    /// Identity only holds within one load call (accounts, characters, items).
    Instance,
    /// Identity holds for the whole process (item definitions, classes, maps).
    Configuration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Uuid,
    Integer,
    Float,
    Boolean,
    Text,
    /// `bytea`, rendered as [`crate::wire::BINARY_PREFIX`] followed by lowercase hex.
    Binary,
    Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    /// Member name inside the JSON payload.
    pub name: &'static str,
    /// Column name inside the table.
    pub column: &'static str,
    pub ty: ColumnType,
}

impl Column {
    pub const fn new(name: &'static str, column: &'static str, ty: ColumnType) -> Self {
        Self { name, column, ty }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableName {
    pub schema: &'static str,
    pub table: &'static str,
}

impl TableName {
    pub const fn new(schema: &'static str, table: &'static str) -> Self {
        Self { schema, table }
    }
}

impl Display for TableName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", quote_ident(self.schema), quote_ident(self.table))
    }
}

pub(crate) fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    ToOne,
    ToMany,
}

/// The join table of a many-to-many navigation. It has a composite key and is never materialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinTable {
    pub table: TableName,
    /// Column pointing at the entity that declares the navigation.
    pub owner_key: &'static str,
    /// Column pointing at the other side.
    pub target_key: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    /// Part of the parent's aggregate: serialized inline, lives and dies with the parent.
    Owned,
    /// Owned elsewhere: serialized as a `{"$ref": id}` marker only.
    Referenced,
    /// A collection of markers read from a join table.
    ManyToMany(JoinTable),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Navigation {
    pub name: &'static str,
    /// Name of the target entity type, resolved through the metadata provider.
    pub target: &'static str,
    pub cardinality: Cardinality,
    pub relation: Relation,
    /// To-one: column of the declaring table holding the target id.
    /// To-many (owned or referenced): column of the target table holding the declaring id.
    pub foreign_key: Option<&'static str>,
    /// Pinned identity cache. `None` inherits the active scope on owned navigations and uses the
    /// target's lifetime otherwise.
    pub scope: Option<IdentityScope>,
}

impl Navigation {
    pub const fn owned_one(name: &'static str, target: &'static str, foreign_key: &'static str) -> Self {
        Self::new(
            name,
            target,
            Cardinality::ToOne,
            Relation::Owned,
            Some(foreign_key),
        )
    }

    pub const fn owned_many(name: &'static str, target: &'static str, foreign_key: &'static str) -> Self {
        Self::new(
            name,
            target,
            Cardinality::ToMany,
            Relation::Owned,
            Some(foreign_key),
        )
    }

    /// A to-one pointer, including the inverse side of a collection (back-reference).
    pub const fn reference(name: &'static str, target: &'static str, foreign_key: &'static str) -> Self {
        Self::new(
            name,
            target,
            Cardinality::ToOne,
            Relation::Referenced,
            Some(foreign_key),
        )
    }

    pub const fn references(name: &'static str, target: &'static str, foreign_key: &'static str) -> Self {
        Self::new(
            name,
            target,
            Cardinality::ToMany,
            Relation::Referenced,
            Some(foreign_key),
        )
    }

    pub const fn many_to_many(name: &'static str, target: &'static str, join_table: JoinTable) -> Self {
        Self::new(
            name,
            target,
            Cardinality::ToMany,
            Relation::ManyToMany(join_table),
            None,
        )
    }

    pub const fn new(
        name: &'static str,
        target: &'static str,
        cardinality: Cardinality,
        relation: Relation,
        foreign_key: Option<&'static str>,
    ) -> Self {
        Self {
            name,
            target,
            cardinality,
            relation,
            foreign_key,
            scope: None,
        }
    }

    pub const fn in_scope(self, scope: IdentityScope) -> Self {
        Self {
            scope: Some(scope),
            ..self
        }
    }

    pub fn is_owned(&self) -> bool {
        self.relation == Relation::Owned
    }

    /// The identity cache that inline objects and markers met on this navigation belong to.
    pub fn scope_for(&self, active: IdentityScope, target: &EntityType) -> IdentityScope {
        match (self.scope, self.relation) {
            (Some(scope), _) => scope,
            (None, Relation::Owned) => active,
            (None, _) => target.lifetime,
        }
    }
}

#[derive(Debug)]
pub struct EntityType {
    pub name: &'static str,
    pub table: TableName,
    pub primary_key: &'static str,
    pub lifetime: IdentityScope,
    pub columns: &'static [Column],
    pub navigations: &'static [Navigation],
    /// Declared ordering of collections of this type.
    pub order_by: Option<&'static str>,
    /// Navigations that have to be rebuilt before the remaining ones, in this order.
    pub navigation_order: &'static [&'static str],
}

impl EntityType {
    pub fn column(&self, name: &str) -> Option<&'static Column> {
        self.columns.iter().find(|column| column.name == name)
    }

    pub fn navigation(&self, name: &str) -> Option<&'static Navigation> {
        self.navigations
            .iter()
            .find(|navigation| navigation.name == name)
    }

    /// Navigations in reconstruction order: the ones named by `navigation_order` first, then the
    /// rest in declaration order.
    pub fn ordered_navigations(&self) -> Result<Vec<&'static Navigation>, crate::MetadataError> {
        let mut ordered = Vec::with_capacity(self.navigations.len());
        for name in self.navigation_order {
            let navigation = self
                .navigation(name)
                .ok_or(crate::MetadataError::UnknownOrderedNavigation {
                    entity: self.name,
                    navigation: *name,
                })?;
            ordered.push(navigation);
        }

        ordered.extend(
            self.navigations
                .iter()
                .filter(|navigation| !self.navigation_order.contains(&navigation.name)),
        );
        Ok(ordered)
    }
}

impl PartialEq for EntityType {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other) || self.name == other.name
    }
}

impl Eq for EntityType {}
