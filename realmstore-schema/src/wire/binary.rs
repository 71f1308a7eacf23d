use thiserror::Error;

use crate::wire::BINARY_PREFIX;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BinaryDecodeError {
    #[error("Binary value does not start with the \\x prefix")]
    MissingPrefix,

    #[error("Binary value has an odd number of hex digits ({length})")]
    OddLength { length: usize },

    #[error("Binary value contains the non-hex character {character:?} at position {position}")]
    InvalidCharacter { character: char, position: usize },
}

/// Encodes `bytes` the way the store renders `bytea` inside JSON. Always lowercase.
pub fn encode(bytes: &[u8]) -> String {
    let mut encoded = String::with_capacity(BINARY_PREFIX.len() + bytes.len() * 2);
    encoded.push_str(BINARY_PREFIX);
    encoded.push_str(&hex::encode(bytes));
    encoded
}

pub fn decode(value: &str) -> Result<Vec<u8>, BinaryDecodeError> {
    let body = value
        .strip_prefix(BINARY_PREFIX)
        .ok_or(BinaryDecodeError::MissingPrefix)?;

    hex::decode(body).map_err(|error| match error {
        // hex looks at single bytes, report the whole character when it is not ASCII
        hex::FromHexError::InvalidHexCharacter { c, index } => BinaryDecodeError::InvalidCharacter {
            character: body
                .get(index..)
                .and_then(|rest| rest.chars().next())
                .unwrap_or(c),
            position: index + BINARY_PREFIX.len(),
        },
        hex::FromHexError::OddLength | hex::FromHexError::InvalidStringLength => {
            BinaryDecodeError::OddLength { length: body.len() }
        }
    })
}
