//! Row sources. A row is the root id plus a reader over its JSON document, rows are pulled one at a
//! time.

use std::io::Read;

use uuid::Uuid;

mod memory;
#[cfg(feature = "postgres")]
mod postgres;

pub use memory::MemoryConnection;
#[cfg(feature = "postgres")]
pub use postgres::PgConnection;

pub type StoreError = Box<dyn std::error::Error + Send + Sync>;

pub struct RawRow<'r> {
    pub id: Uuid,
    pub json: Box<dyn Read + 'r>,
}

pub trait RowCursor {
    /// The next row, or `None` once the result set is exhausted.
    fn next_row(&mut self) -> Result<Option<RawRow<'_>>, StoreError>;
}

pub trait Connection {
    /// Runs a synthesized query. `id` is bound to the single `$1` parameter of a by-id query.
    fn query(&mut self, sql: &str, id: Option<Uuid>) -> Result<Box<dyn RowCursor + '_>, StoreError>;
}
