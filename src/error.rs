// Error types shared by the tokenizer, the schema layer and the activator
//
// Parsing is format-agnostic text splitting, so only structural problems
// (unexpected quotes, short records) surface while reading. Conversion
// failures surface later, when a value is materialized.

use std::fmt;

/// Position in the input, used only for diagnostics.
///
/// `line` is 1-based. `column` is 1-based and counts bytes since the start
/// of the physical line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Location {
    pub line: u64,
    pub column: u64,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

/// A value's text could not be converted to its declared type.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("cannot convert {value:?} to {target}: {reason}")]
pub struct ConversionError {
    pub value: String,
    pub target: String,
    pub reason: String,
}

impl ConversionError {
    pub fn new(value: &str, target: impl Into<String>, reason: impl fmt::Display) -> Self {
        ConversionError {
            value: value.to_string(),
            target: target.into(),
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CsvError {
    /// A quote where none was expected, an overlong record, or an
    /// unterminated quoted field.
    #[error("malformed input at {location}, field {field_index}: {message} (near {context:?})")]
    MalformedInput {
        message: String,
        context: String,
        location: Location,
        field_index: usize,
    },

    /// A non-empty record is shorter than the canonical field count.
    #[error(
        "missing field {field_index} at {location}: expected {expected} fields, found {found} (near {context:?})"
    )]
    MissingField {
        context: String,
        location: Location,
        field_index: usize,
        expected: usize,
        found: usize,
    },

    #[error("column {column:?}: {source}")]
    Conversion {
        column: String,
        #[source]
        source: ConversionError,
    },

    /// Misuse: invalid configuration, unknown name, out-of-range ordinal.
    #[error("invalid argument: {0}")]
    Argument(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CsvError {
    pub fn argument(message: impl Into<String>) -> Self {
        CsvError::Argument(message.into())
    }

    pub fn conversion(column: impl Into<String>, source: ConversionError) -> Self {
        CsvError::Conversion {
            column: column.into(),
            source,
        }
    }

    /// Location carried by structural errors, if any.
    pub fn location(&self) -> Option<Location> {
        match self {
            CsvError::MalformedInput { location, .. } | CsvError::MissingField { location, .. } => {
                Some(*location)
            }
            _ => None,
        }
    }
}

pub type Result<T, E = CsvError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_field_message_carries_context() {
        let err = CsvError::MissingField {
            context: "a,b".to_string(),
            location: Location { line: 3, column: 4 },
            field_index: 2,
            expected: 5,
            found: 2,
        };
        let msg = err.to_string();
        assert!(msg.contains("line 3, column 4"));
        assert!(msg.contains("expected 5"));
        assert!(msg.contains("\"a,b\""));
        assert_eq!(err.location(), Some(Location { line: 3, column: 4 }));
    }

    #[test]
    fn test_conversion_error_keeps_source() {
        let err = CsvError::conversion("flag", ConversionError::new("maybe", "Bool", "unrecognized literal"));
        assert!(err.to_string().contains("\"maybe\""));
        assert!(std::error::Error::source(&err).is_some());
        assert_eq!(err.location(), None);
    }
}
