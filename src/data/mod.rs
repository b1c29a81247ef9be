//! JSON persistence of instances and schedules.

mod run;

pub use run::*;

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::BufRead;

/// Reads a value from JSON.
///
/// # Errors
/// - If the reader fails or the JSON does not describe a valid value.
pub fn deserialize<T: DeserializeOwned>(reader: &mut impl BufRead) -> anyhow::Result<T> {
    Ok(serde_json::from_reader(reader)?)
}

/// Writes a value as pretty-printed JSON.
///
/// # Errors
/// - If the value cannot be represented in JSON.
pub fn to_string<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}
