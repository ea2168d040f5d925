//! Utility functions for the engine module.

use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;

use super::error::EngineError;

/// Compute SHA256 hash of bytes and return as hex string.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Encode a value as canonical CBOR: map keys sorted, self-describe tag up
/// front. Equal values encode to equal bytes regardless of field insertion
/// order, which makes the encoding safe to hash.
pub fn to_canonical_cbor<T: Serialize>(value: &T) -> Result<Vec<u8>, EngineError> {
    let mut buf = Vec::with_capacity(256);
    let canonical_value = serde_cbor::value::to_value(value)?;
    let mut serializer = serde_cbor::ser::Serializer::new(&mut buf);
    serializer.self_describe()?;
    canonical_value.serialize(&mut serializer)?;
    Ok(buf)
}

/// Deterministic digest of a settlement outcome. Two distributions over the
/// same inputs produce the same hash.
pub fn settlement_hash<T: Serialize>(value: &T) -> Result<String, EngineError> {
    Ok(sha256_hex(&to_canonical_cbor(value)?))
}

/// Write a serializable value to a JSON file.
pub fn write_json_to_path<T: Serialize>(value: &T, path: &Path) -> Result<(), EngineError> {
    let data = serde_json::to_vec_pretty(value)?;
    fs::write(path, data)?;
    Ok(())
}

/// Read a JSON file and deserialize it.
pub fn read_json_from_path<T: DeserializeOwned>(path: &Path) -> Result<T, EngineError> {
    let data = fs::read(path)?;
    Ok(serde_json::from_slice(&data)?)
}
