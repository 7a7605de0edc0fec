// typedcsv - Streaming delimited-text reader with typed record materialization
//
// Components:
// - CharSource: chunked UTF-8 character source with one-character lookahead
// - Tokenizer: state machine producing one LineSlice per logical record,
//   zero-copy for fields scanned in a single run
// - LineSlice / Record: the current record (borrowed) and its owned form
// - Schema / Column / Header: column model, conversions, name -> ordinal
// - TypedActivator: compiled, cached LineSlice -> T functions
// - CsvReader: read session over one or more result sets
// - CsvWriter: the same Layout vocabulary, in reverse

pub mod activator;
pub mod config;
pub mod core;
pub mod error;
pub mod line;
pub mod reader;
pub mod row;
pub mod schema;
pub mod tokenizer;
pub mod writer;

pub use activator::{
    ActivatorKey, Args, CompiledActivator, Construction, ConstructionKind, Member, Setters,
    TypedActivator, TypedRecord,
};
pub use config::{
    Behavior, EmptyLineAction, Layout, MissingFieldAction, QuotesInsideQuotedFieldAction,
    ReaderConfig, TrimmingOptions,
};
pub use crate::core::CharSource;
pub use error::{ConversionError, CsvError, Location, Result};
pub use line::{Field, LineSlice, Record};
pub use reader::{CsvReader, Records, TypedRecords};
pub use row::{LiveRow, MaterializedRow, RowAccess};
pub use schema::{Column, ColumnType, Converter, FromValue, Header, Schema, Value};
pub use tokenizer::{State, Tokenizer};
pub use writer::{CsvWriter, WriteRecord};
