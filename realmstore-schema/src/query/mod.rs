//! Derives one PostgreSQL statement per entity type that renders a whole aggregate as a JSON document
//! per row, using `row_to_json`, `json_agg` and `json_build_object`.

pub(crate) mod synthesizer;
mod types;


pub use synthesizer::{DEFAULT_MAX_DEPTH, QuerySynthesizer};
pub use types::EntityQuery;
