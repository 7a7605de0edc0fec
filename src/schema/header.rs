// Header: ordered column names with name -> ordinal lookup

use std::collections::HashMap;

use crate::error::{CsvError, Result};
use crate::line::Record;

/// Prefix of synthesized placeholder names (`Column0`, `Column1`, ...).
pub const PLACEHOLDER_PREFIX: &str = "Column";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    names: Vec<String>,
    index: HashMap<String, usize>,
}

impl Header {
    pub fn new(names: Vec<String>) -> Self {
        let mut index = HashMap::with_capacity(names.len());
        for (ordinal, name) in names.iter().enumerate() {
            // First occurrence wins for duplicated names
            index.entry(name.clone()).or_insert(ordinal);
        }
        Header { names, index }
    }

    /// Header from the first record of a result set. Null fields become
    /// empty names.
    pub fn from_record(record: &Record) -> Self {
        Self::new(
            record
                .iter()
                .map(|f| f.unwrap_or_default().to_string())
                .collect(),
        )
    }

    /// Placeholder names for a stream without a header record.
    pub fn synthesized(count: usize) -> Self {
        Self::new(
            (0..count)
                .map(|i| format!("{PLACEHOLDER_PREFIX}{i}"))
                .collect(),
        )
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn name(&self, ordinal: usize) -> Option<&str> {
        self.names.get(ordinal).map(String::as_str)
    }

    pub fn ordinal(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Like `ordinal`, but an unknown name is an argument error.
    pub fn try_ordinal(&self, name: &str) -> Result<usize> {
        self.ordinal(name)
            .ok_or_else(|| CsvError::argument(format!("unknown header name {name:?}")))
    }
}
