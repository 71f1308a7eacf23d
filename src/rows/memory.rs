use std::io::BufRead;

use log::trace;
use serde::Deserialize;
use uuid::Uuid;

use crate::rows::{Connection, RawRow, RowCursor, StoreError};

/// Serves prepared rows instead of running the query. Used to replay dumped result sets and in tests.
#[derive(Debug, Default)]
pub struct MemoryConnection {
    rows: Vec<(Uuid, String)>,
    executed: Vec<String>,
}

#[derive(Deserialize)]
struct RowHead {
    id: Uuid,
}

impl MemoryConnection {
    pub fn new() -> Self {
        Self::default()
    }

    /// One JSON document per line, as the `json` column renders it. The row id is taken from the
    /// document itself. Blank lines are skipped.
    pub fn from_json_lines(reader: impl BufRead) -> Result<Self, StoreError> {
        let mut connection = Self::new();
        for (number, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }

            let head: RowHead =
                serde_json::from_str(&line).map_err(|error| format!("line {}: {error}", number + 1))?;
            connection.push_row(head.id, line);
        }
        Ok(connection)
    }

    pub fn push_row(&mut self, id: Uuid, json: impl Into<String>) {
        self.rows.push((id, json.into()));
    }

    pub fn with_row(mut self, id: Uuid, json: impl Into<String>) -> Self {
        self.push_row(id, json);
        self
    }

    /// Every statement passed to [`Connection::query`], oldest first.
    pub fn executed(&self) -> &[String] {
        &self.executed
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl Connection for MemoryConnection {
    fn query(&mut self, sql: &str, id: Option<Uuid>) -> Result<Box<dyn RowCursor + '_>, StoreError> {
        trace!("Executing {sql}");
        self.executed.push(sql.to_owned());
        Ok(Box::new(MemoryCursor {
            rows: self.rows.iter(),
            id,
        }))
    }
}

struct MemoryCursor<'c> {
    rows: std::slice::Iter<'c, (Uuid, String)>,
    id: Option<Uuid>,
}

impl RowCursor for MemoryCursor<'_> {
    fn next_row(&mut self) -> Result<Option<RawRow<'_>>, StoreError> {
        let id = self.id;
        Ok(self
            .rows
            .find(|(row_id, _)| id.is_none_or(|id| id == *row_id))
            .map(|(row_id, json)| RawRow {
                id: *row_id,
                json: Box::new(json.as_bytes()),
            }))
    }
}
