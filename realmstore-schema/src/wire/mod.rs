//! Shape of the JSON documents produced by the synthesized queries.
//!
//! Inline objects start with [`ID_KEY`], reference markers consist of [`REF_KEY`] only, and binary
//! column values are strings made of [`BINARY_PREFIX`] and lowercase hex.

pub mod binary;


pub const ID_KEY: &str = "id";
pub const REF_KEY: &str = "$ref";
/// The textual `bytea` form, as `row_to_json` renders it.
pub const BINARY_PREFIX: &str = "\\x";
