use std::io::{self, Read};

use log::{debug, warn};
use sqlx::postgres::PgRow;
use sqlx::{Connection as _, Row};
use tokio::runtime::{Builder, Runtime};
use uuid::Uuid;

use crate::rows::{Connection, RawRow, RowCursor, StoreError};

const CURSOR: &str = "realmstore_rows";
const FETCH: &str = "FETCH FORWARD 1 FROM realmstore_rows";
/// Characters per fetched slice of a document.
const CHUNK: usize = 8192;

/// Streams rows out of PostgreSQL through a server side cursor inside a read only transaction per
/// query. Documents arrive in slices of [`CHUNK`] characters, one `FETCH` per slice, so neither the
/// result set nor a whole document is held in memory.
pub struct PgConnection {
    runtime: Runtime,
    connection: sqlx::PgConnection,
}

impl PgConnection {
    pub fn connect(url: &str) -> Result<Self, StoreError> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        let connection = runtime.block_on(sqlx::PgConnection::connect(url))?;
        debug!("Connected to {}", url.rsplit('@').next().unwrap_or_default());
        Ok(Self { runtime, connection })
    }
}

fn run(runtime: &Runtime, connection: &mut sqlx::PgConnection, statement: &str) -> Result<(), sqlx::Error> {
    runtime.block_on(sqlx::raw_sql(statement).execute(connection))?;
    Ok(())
}

impl Connection for PgConnection {
    fn query(&mut self, sql: &str, id: Option<Uuid>) -> Result<Box<dyn RowCursor + '_>, StoreError> {
        // DECLARE does not take bind parameters. The id is a typed uuid, so inlining it is safe.
        let statement = match (id, sql.strip_suffix("$1")) {
            (Some(id), Some(prefix)) => format!("{prefix}'{id}'::uuid"),
            (None, _) => sql.to_owned(),
            (Some(_), None) => return Err("a by-id query has to end with its $1 parameter".into()),
        };
        // OFFSET 0 keeps the document from being rendered once per slice. The lateral join emits the
        // slices of one document together and in order, `ord` 0 starts the next document.
        let declare = format!(
            "DECLARE {CURSOR} NO SCROLL CURSOR FOR \
             SELECT document.\"id\", chunk.ord, substr(document.\"text\", chunk.ord * {CHUNK} + 1, {CHUNK}) AS piece \
             FROM (SELECT page.\"id\", page.\"json\"::text AS \"text\" FROM ({statement}) page OFFSET 0) document \
             CROSS JOIN LATERAL generate_series(0, (length(document.\"text\") - 1) / {CHUNK}) AS chunk(ord)"
        );

        let Self { runtime, connection } = self;
        run(runtime, connection, "BEGIN READ ONLY")?;
        if let Err(error) = run(runtime, connection, &declare) {
            if let Err(rollback) = run(runtime, connection, "ROLLBACK") {
                warn!("Failed to roll back after a failed query: {rollback}");
            }
            return Err(error.into());
        }

        Ok(Box::new(PgCursor {
            runtime,
            connection,
            open: true,
            lookahead: None,
        }))
    }
}

struct Chunk {
    id: Uuid,
    ord: i32,
    piece: String,
}

impl Chunk {
    fn from_row(row: PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            ord: row.try_get("ord")?,
            piece: row.try_get("piece")?,
        })
    }
}

struct PgCursor<'c> {
    runtime: &'c Runtime,
    connection: &'c mut sqlx::PgConnection,
    open: bool,
    /// First slice of the next document, read by the reader of the previous one.
    lookahead: Option<Chunk>,
}

impl PgCursor<'_> {
    fn fetch(&mut self) -> Result<Option<Chunk>, sqlx::Error> {
        if !self.open {
            return Ok(None);
        }

        let fetched = self
            .runtime
            .block_on(sqlx::query(FETCH).fetch_optional(&mut *self.connection))
            .and_then(|row| row.map(Chunk::from_row).transpose());

        match fetched {
            Ok(Some(chunk)) => Ok(Some(chunk)),
            Ok(None) => {
                self.finish()?;
                Ok(None)
            }
            Err(error) => {
                self.rollback();
                Err(error)
            }
        }
    }

    /// Commits the transaction of an exhausted cursor, which also closes the cursor.
    fn finish(&mut self) -> Result<(), sqlx::Error> {
        self.open = false;
        match run(self.runtime, self.connection, "COMMIT") {
            Ok(()) => Ok(()),
            Err(error) => {
                self.rollback();
                Err(error)
            }
        }
    }

    fn rollback(&mut self) {
        self.open = false;
        self.lookahead = None;
        if let Err(error) = run(self.runtime, self.connection, "ROLLBACK") {
            warn!("Failed to roll back the row cursor: {error}");
        }
    }
}

impl RowCursor for PgCursor<'_> {
    fn next_row(&mut self) -> Result<Option<RawRow<'_>>, StoreError> {
        let first = match self.lookahead.take() {
            Some(chunk) => chunk,
            None => loop {
                match self.fetch()? {
                    Some(chunk) if chunk.ord == 0 => break chunk,
                    // tail of a document whose reader stopped early
                    Some(_) => continue,
                    None => return Ok(None),
                }
            },
        };

        Ok(Some(RawRow {
            id: first.id,
            json: Box::new(DocumentReader {
                cursor: self,
                buffer: first.piece.into_bytes(),
                position: 0,
                done: false,
            }),
        }))
    }
}

impl Drop for PgCursor<'_> {
    fn drop(&mut self) {
        if self.open {
            debug!("Abandoning an unfinished row cursor");
            self.rollback();
        }
    }
}

/// Reads one document slice by slice, fetching the next slice once the current one is consumed.
struct DocumentReader<'r, 'c> {
    cursor: &'r mut PgCursor<'c>,
    buffer: Vec<u8>,
    position: usize,
    done: bool,
}

impl Read for DocumentReader<'_, '_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while self.position == self.buffer.len() {
            if self.done {
                return Ok(0);
            }

            match self.cursor.fetch().map_err(io::Error::other)? {
                Some(chunk) if chunk.ord == 0 => {
                    self.cursor.lookahead = Some(chunk);
                    self.done = true;
                }
                Some(chunk) => {
                    self.buffer = chunk.piece.into_bytes();
                    self.position = 0;
                }
                None => self.done = true,
            }
        }

        let count = buf.len().min(self.buffer.len() - self.position);
        buf[..count].copy_from_slice(&self.buffer[self.position..self.position + count]);
        self.position += count;
        Ok(count)
    }
}
