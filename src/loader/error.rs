use realmstore_schema::MetadataError;
use realmstore_schema::wire::binary::BinaryDecodeError;
use thiserror::Error;
use uuid::Uuid;

use crate::resolver::IdentityConflict;
use crate::rows::StoreError;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error("Querying {entity} failed: {source}")]
    Query {
        entity: &'static str,
        #[source]
        source: StoreError,
    },

    #[error(transparent)]
    Payload(#[from] PayloadError),

    #[error(transparent)]
    IdentityConflict(#[from] IdentityConflict),

    #[error("Loading {entity} was cancelled after {rows} rows")]
    Cancelled { entity: &'static str, rows: usize },
}

/// A row whose document could not be turned into a graph.
#[derive(Error, Debug)]
#[error("Malformed {entity} payload in row {row} at '{path}': {kind}")]
pub struct PayloadError {
    pub entity: &'static str,
    pub row: usize,
    /// Navigation path inside the document, for example `characters[1].inventory.items[0]`.
    pub path: String,
    #[source]
    pub kind: PayloadErrorKind,
}

#[derive(Error, Debug)]
pub enum PayloadErrorKind {
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("Invalid binary value in column {column}")]
    Binary {
        column: &'static str,
        #[source]
        source: BinaryDecodeError,
    },

    #[error("The row root is not an inline object")]
    RootNotInline,

    #[error("Row {row_id} carries the payload of {payload_id}")]
    RowIdMismatch { row_id: Uuid, payload_id: Uuid },
}
