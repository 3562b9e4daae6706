//! Backend list loading
//!
//! The list is a headerless CSV file with one `IP,MAC` record per line.
//! Fields may be quoted, blank lines and lines starting with `#` are
//! ignored. Addresses are validated later, when the list is published.

use csv::{ReaderBuilder, StringRecord, Trim};
use log::debug;
use std::path::Path;

use crate::{
    error::{ControlError, Result},
    publisher::BackendDefinition,
};

fn reader(contents: &str) -> csv::Reader<&[u8]> {
    ReaderBuilder::new()
        .has_headers(false)
        .trim(Trim::All)
        .comment(Some(b'#'))
        .flexible(true)
        .from_reader(contents.as_bytes())
}

fn to_definition(row: &StringRecord) -> std::result::Result<BackendDefinition, String> {
    if row.len() != 2 || row.iter().any(str::is_empty) {
        return Err(format!(
            "expected 'IP,MAC', got '{}'",
            row.iter().collect::<Vec<_>>().join(",")
        ));
    }
    row.deserialize(None).map_err(|e| e.to_string())
}

/// Parse a single `IP,MAC` entry
pub fn parse_entry(entry: &str) -> Result<BackendDefinition> {
    let mut backends = parse_backends(entry)?;
    match backends.pop() {
        Some(backend) if backends.is_empty() => Ok(backend),
        _ => Err(ControlError::Configuration(format!(
            "expected 'IP,MAC', got '{}'",
            entry.trim()
        ))),
    }
}

/// Parse the contents of a backend list
pub fn parse_backends(contents: &str) -> Result<Vec<BackendDefinition>> {
    let mut backends = Vec::new();

    for row in reader(contents).into_records() {
        let row = row.map_err(|e| ControlError::Configuration(format!("malformed backend list: {}", e)))?;

        // Whitespace-only line
        if row.len() == 1 && row[0].is_empty() {
            continue;
        }

        let line = row.position().map_or(0, |pos| pos.line());
        let backend = to_definition(&row)
            .map_err(|reason| ControlError::Configuration(format!("line {}: {}", line, reason)))?;
        backends.push(backend);
    }

    Ok(backends)
}

/// Read and parse a backend list file
pub fn load_backends(path: &Path) -> Result<Vec<BackendDefinition>> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        ControlError::Configuration(format!("failed to read backend list {:?}: {}", path, e))
    })?;

    let backends = parse_backends(&contents)?;
    debug!("Read {} backends from {:?}", backends.len(), path);
    Ok(backends)
}
