//! Run jx commands against JSON input

use super::CliError;
use crate::{Container, ListContainer, UpdateCommand, Value};

/// Options shared by every command
#[derive(Debug, Clone, Default)]
pub struct CommandOptions {
    /// JSON input string: an array of rows, or a single row
    pub input: Option<String>,
    /// Pretty-print the output
    pub pretty: bool,
}

/// Parse the command input into rows. A top-level array is the rows; any
/// other document is a single row.
pub fn read_rows(options: &CommandOptions) -> Result<Vec<Value>, CliError> {
    let json_str = options.input.as_ref().ok_or(CliError::NoInput)?;
    let json_value: serde_json::Value = serde_json::from_str(json_str).map_err(CliError::Json)?;

    Ok(match Value::from(json_value) {
        Value::Array(rows) => rows,
        row => vec![row],
    })
}

fn parse_document(text: &str) -> Result<Value, CliError> {
    let json_value: serde_json::Value = serde_json::from_str(text).map_err(CliError::Json)?;
    Ok(Value::from(json_value))
}

/// Run a JSON query over the input rows.
pub fn execute_query(query: &str, options: &CommandOptions) -> Result<Value, CliError> {
    let raw = parse_document(query)?;
    let rows = ListContainer::new("input", read_rows(options)?)?;
    Ok(rows.query(&raw)?.into_value())
}

/// Describe the inferred schema of the input rows.
pub fn execute_schema(options: &CommandOptions) -> Result<Value, CliError> {
    let rows = ListContainer::new("input", read_rows(options)?)?;
    Ok(rows.schema().to_value())
}

/// Apply an update command and return the resulting rows.
pub fn execute_update(command: &str, options: &CommandOptions) -> Result<Value, CliError> {
    let command = UpdateCommand::from_value(&parse_document(command)?)?;
    let mut rows = ListContainer::new("input", read_rows(options)?)?;
    rows.update(&command)?;
    Ok(Value::Array(rows.rows().to_vec()))
}
