use crate::metadata::types::quote_ident;

/// A synthesized, immutable query. Every row it yields has two columns: `id` and `json`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityQuery {
    pub entity: &'static str,
    pub root_alias: String,
    pub primary_key: &'static str,
    sql: String,
    by_id_sql: String,
}

impl EntityQuery {
    pub(crate) fn new(entity: &'static str, root_alias: String, primary_key: &'static str, sql: String) -> Self {
        let by_id_sql = format!("{sql} WHERE {root_alias}.{} = $1", quote_ident(primary_key));
        Self {
            entity,
            root_alias,
            primary_key,
            sql,
            by_id_sql,
        }
    }

    /// Loads every row of the root table.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Loads the row whose primary key equals the first bind parameter.
    pub fn by_id_sql(&self) -> &str {
        &self.by_id_sql
    }
}
