// Read-session configuration: punctuation (Layout) and policies (Behavior)
//
// Both are constructed once per session and never mutated while reading.
// They deserialize with serde so a session can be configured from a file;
// schemas hold conversion closures and are attached in code.

use serde::{Deserialize, Serialize};

use crate::error::{CsvError, Result};
use crate::schema::Schema;

/// Default chunk size for the character source, in bytes of decoded text.
pub const DEFAULT_BUFFER_SIZE: usize = 4096;

/// Which fields get leading/trailing whitespace removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TrimmingOptions {
    None,
    #[default]
    UnquotedOnly,
    QuotedOnly,
    All,
}

impl TrimmingOptions {
    #[inline]
    pub fn applies(self, quoted: bool) -> bool {
        match self {
            TrimmingOptions::None => false,
            TrimmingOptions::UnquotedOnly => !quoted,
            TrimmingOptions::QuotedOnly => quoted,
            TrimmingOptions::All => true,
        }
    }
}

/// What to do with a non-empty record shorter than the canonical field count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MissingFieldAction {
    #[default]
    ParseError,
    ReplaceByEmpty,
    ReplaceByNull,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EmptyLineAction {
    /// Yield empty records like any other.
    None,
    #[default]
    Skip,
    /// An empty record ends the current logical result set.
    NextResult,
}

/// What to do when a quoted field is followed by something other than a
/// delimiter, a newline or another quote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum QuotesInsideQuotedFieldAction {
    /// Keep the stray quote as content and continue the quoted field.
    #[default]
    Ignore,
    /// Discard the record and resume at the next line.
    AdvanceToNextLine,
    ThrowException,
}

/// Structural punctuation of the stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Layout {
    /// `None` disables quoting entirely.
    pub quote: Option<char>,
    pub delimiter: char,
    /// Escape for a quote inside a quoted field. Equal to `quote` means
    /// the RFC 4180 doubled-quote convention.
    pub escape: char,
    pub comment: Option<char>,
    pub has_header: bool,
    /// One schema per logical result set.
    #[serde(skip)]
    pub schemas: Vec<Schema>,
}

impl Default for Layout {
    fn default() -> Self {
        Layout {
            quote: Some('"'),
            delimiter: ',',
            escape: '"',
            comment: Some('#'),
            has_header: true,
            schemas: Vec::new(),
        }
    }
}

impl Layout {
    pub fn with_delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn with_quote(mut self, quote: Option<char>) -> Self {
        self.quote = quote;
        self
    }

    pub fn with_escape(mut self, escape: char) -> Self {
        self.escape = escape;
        self
    }

    pub fn with_comment(mut self, comment: Option<char>) -> Self {
        self.comment = comment;
        self
    }

    pub fn with_header(mut self, has_header: bool) -> Self {
        self.has_header = has_header;
        self
    }

    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.schemas.push(schema);
        self
    }

    /// Schema for the given result set. When fewer schemas than result sets
    /// are configured, the last one keeps applying.
    pub fn schema(&self, result_index: usize) -> Option<&Schema> {
        self.schemas
            .get(result_index)
            .or_else(|| self.schemas.last())
    }

    /// Reject punctuation combinations the tokenizer cannot disambiguate.
    pub fn validate(&self) -> Result<()> {
        let is_newline = |c: char| c == '\r' || c == '\n';
        if is_newline(self.delimiter) {
            return Err(CsvError::argument("delimiter cannot be a newline character"));
        }
        if let Some(quote) = self.quote {
            if quote == self.delimiter {
                return Err(CsvError::argument("quote and delimiter must differ"));
            }
            if is_newline(quote) {
                return Err(CsvError::argument("quote cannot be a newline character"));
            }
            if is_newline(self.escape) || self.escape == self.delimiter {
                return Err(CsvError::argument(
                    "escape cannot be a newline character or the delimiter",
                ));
            }
        }
        if let Some(comment) = self.comment {
            if comment == self.delimiter || is_newline(comment) || Some(comment) == self.quote {
                return Err(CsvError::argument(
                    "comment marker must differ from delimiter, quote and newline",
                ));
            }
        }
        Ok(())
    }
}

/// Policies governing trimming, missing fields, empty lines and stray quotes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Behavior {
    pub trimming: TrimmingOptions,
    pub missing_field: MissingFieldAction,
    pub empty_line: EmptyLineAction,
    pub quotes_inside_quoted_field: QuotesInsideQuotedFieldAction,
}

impl Behavior {
    pub fn with_trimming(mut self, trimming: TrimmingOptions) -> Self {
        self.trimming = trimming;
        self
    }

    pub fn with_missing_field(mut self, action: MissingFieldAction) -> Self {
        self.missing_field = action;
        self
    }

    pub fn with_empty_line(mut self, action: EmptyLineAction) -> Self {
        self.empty_line = action;
        self
    }

    pub fn with_quotes_inside_quoted_field(mut self, action: QuotesInsideQuotedFieldAction) -> Self {
        self.quotes_inside_quoted_field = action;
        self
    }
}

/// Everything a read session needs besides the input itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    pub layout: Layout,
    pub behavior: Behavior,
    pub buffer_size: usize,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        ReaderConfig {
            layout: Layout::default(),
            behavior: Behavior::default(),
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

impl ReaderConfig {
    pub fn new(layout: Layout, behavior: Behavior) -> Self {
        ReaderConfig {
            layout,
            behavior,
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }

    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }
}
