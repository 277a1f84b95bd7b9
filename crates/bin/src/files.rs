//! Loading records and schemas from JSON files.

use std::{fs, path::Path};

use sysdata::record::{Record, SystemId, SystemSchema};
use tracing::debug;

use crate::cli::SchemaArgs;

pub type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Reads a record from a flat or nested JSON object.
pub fn load_record(path: &Path) -> CliResult<Record> {
    let text = fs::read_to_string(path)?;
    let json: serde_json::Value = serde_json::from_str(&text)?;
    let rec = Record::from_json(&json)?;
    debug!(path = %path.display(), fields = rec.len(), "loaded record");
    Ok(rec)
}

pub fn load_schema(path: &Path) -> CliResult<SystemSchema> {
    let text = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

/// Reads a JSON object of backend values.
pub fn load_values(path: &Path) -> CliResult<serde_json::Map<String, serde_json::Value>> {
    let text = fs::read_to_string(path)?;
    match serde_json::from_str(&text)? {
        serde_json::Value::Object(map) => Ok(map),
        _ => Err(format!("{}: backend values must be a JSON object", path.display()).into()),
    }
}

pub fn write_json(path: &Path, json: &serde_json::Value) -> CliResult<()> {
    fs::write(path, serde_json::to_string_pretty(json)?)?;
    Ok(())
}

/// Loads the record at `path` and declares the backend of `args` on it.
///
/// Returns the backend system, taken from `--system` before the schema's
/// own.
pub fn load_declared(path: &Path, args: &SchemaArgs) -> CliResult<(Record, Option<SystemId>)> {
    let mut rec = load_record(path)?;
    let schema = args.schema.as_deref().map(load_schema).transpose()?;
    if let Some(schema) = &schema {
        schema.apply(&mut rec)?;
    }
    let system = match (&args.system, &schema) {
        (Some(system), _) => Some(SystemId::new(system.as_str())?),
        (None, Some(schema)) => Some(schema.system_id()?),
        (None, None) => None,
    };
    Ok((rec, system))
}

/// Like [`load_declared`] but a backend system is required.
pub fn load_with_system(path: &Path, args: &SchemaArgs) -> CliResult<(Record, SystemId)> {
    match load_declared(path, args)? {
        (rec, Some(system)) => Ok((rec, system)),
        (_, None) => Err("no backend system: pass --system or --schema".into()),
    }
}
