// Read session: tokenizer + header + schemas, consumed as lines, raw values
// or typed records
//
// Key design:
// - The header is read lazily, right before the first data line of each
//   result set; without a header record, placeholder names are synthesized
//   from the first admitted record
// - Typed iteration compiles its activator on the first record, once the
//   header is known, and reuses it for the rest of the result set
// - `next_result` skips what is left of the current result set and starts
//   the next one with a fresh header and the next schema

use std::fs::File;
use std::io::{BufReader, Read};
use std::marker::PhantomData;
use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::activator::{CompiledActivator, TypedActivator, TypedRecord};
use crate::config::{Behavior, Layout, ReaderConfig};
use crate::error::{CsvError, Location, Result};
use crate::line::{LineSlice, Record};
use crate::schema::{Header, Schema, Value};
use crate::tokenizer::Tokenizer;

pub struct CsvReader<R> {
    tokenizer: Tokenizer<R>,
    layout: Layout,
    header: Option<Header>,
    /// A header record is expected before the next data line
    header_pending: bool,
    result_index: usize,
}

impl<R: Read> CsvReader<R> {
    pub fn new(reader: R, layout: Layout, behavior: Behavior) -> Result<Self> {
        Self::with_config(reader, ReaderConfig::new(layout, behavior))
    }

    pub fn with_config(reader: R, config: ReaderConfig) -> Result<Self> {
        let tokenizer = Tokenizer::new(reader, &config.layout, config.behavior, config.buffer_size)?;
        Ok(CsvReader {
            tokenizer,
            header_pending: config.layout.has_header,
            layout: config.layout,
            header: None,
            result_index: 0,
        })
    }

    /// Next data line of the current result set, or `None` at its end.
    pub fn read_line(&mut self) -> Result<Option<LineSlice<'_>>> {
        self.ensure_header()?;
        let line = self.tokenizer.next_line()?;
        if let Some(line) = &line {
            synthesize_header(&mut self.header, line);
        }
        Ok(line)
    }

    /// Header of the current result set. Known once the first data line
    /// (or the header record) has been read.
    pub fn header(&mut self) -> Result<Option<&Header>> {
        self.ensure_header()?;
        Ok(self.header.as_ref())
    }

    pub fn field_count(&self) -> Option<usize> {
        self.tokenizer.field_count()
    }

    pub fn location(&self) -> Location {
        self.tokenizer.location()
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Schema configured for the current result set.
    pub fn schema(&self) -> Option<&Schema> {
        self.layout.schema(self.result_index)
    }

    /// Zero-based index of the current result set.
    pub fn result_index(&self) -> usize {
        self.result_index
    }

    /// Next data line converted through the current schema, one value per
    /// column in schema order.
    pub fn read_values(&mut self) -> Result<Option<Vec<Value>>> {
        self.ensure_header()?;
        let CsvReader {
            tokenizer,
            layout,
            header,
            result_index,
            ..
        } = self;
        let schema = layout.schema(*result_index).ok_or_else(|| {
            CsvError::argument(format!("no schema configured for result set {result_index}"))
        })?;
        let Some(line) = tokenizer.next_line()? else {
            return Ok(None);
        };
        synthesize_header(header, &line);
        schema.convert_line(&line, header.as_ref()).map(Some)
    }

    /// Iterate the current result set as owned records.
    pub fn records(&mut self) -> Records<'_, R> {
        Records { reader: self }
    }

    /// Iterate the current result set as `T`, converting primitives on the
    /// dedicated per-type path.
    pub fn deserialize<T: TypedRecord>(&mut self) -> TypedRecords<'_, R, T> {
        self.deserialize_with(false)
    }

    /// Like `deserialize`; `use_schema_conversion` routes every member
    /// through its column's converter.
    pub fn deserialize_with<T: TypedRecord>(&mut self, use_schema_conversion: bool) -> TypedRecords<'_, R, T> {
        TypedRecords {
            reader: self,
            activator: None,
            use_schema_conversion,
            _target: PhantomData,
        }
    }

    /// Move to the next result set. Returns `false` when no input remains.
    pub fn next_result(&mut self) -> Result<bool> {
        self.tokenizer.skip_section()?;
        let more = self.tokenizer.reset_section()?;
        self.header = None;
        self.header_pending = self.layout.has_header;
        if more {
            self.result_index += 1;
        }
        debug!(result_index = self.result_index, more, "advanced to next result set");
        Ok(more)
    }

    fn ensure_header(&mut self) -> Result<()> {
        while self.header_pending {
            let header = match self.tokenizer.next_line()? {
                Some(line) if line.is_empty() => continue,
                Some(line) => Some(Header::from_record(&line.to_record())),
                None => None,
            };
            self.header_pending = false;
            if let Some(header) = header {
                debug!(columns = header.len(), result_index = self.result_index, "read header");
                self.header = Some(header);
            }
        }
        Ok(())
    }
}

impl CsvReader<BufReader<File>> {
    /// Open a file-backed session. The file is closed when the reader is
    /// dropped.
    pub fn from_path(path: impl AsRef<Path>, config: ReaderConfig) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        debug!(path = %path.as_ref().display(), "opened input file");
        Self::with_config(BufReader::new(file), config)
    }
}

/// Placeholder names for a headerless result set, fixed by the first
/// non-empty record.
fn synthesize_header(header: &mut Option<Header>, line: &LineSlice<'_>) {
    if header.is_none() && !line.is_empty() {
        debug!(columns = line.len(), "synthesized header");
        *header = Some(Header::synthesized(line.len()));
    }
}

/// Owned records of the current result set.
pub struct Records<'r, R> {
    reader: &'r mut CsvReader<R>,
}

impl<R: Read> Iterator for Records<'_, R> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.reader.read_line() {
            Ok(Some(line)) => Some(Ok(line.to_record())),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

/// Typed records of the current result set.
pub struct TypedRecords<'r, R, T: TypedRecord> {
    reader: &'r mut CsvReader<R>,
    activator: Option<Arc<CompiledActivator<T>>>,
    use_schema_conversion: bool,
    _target: PhantomData<fn() -> T>,
}

impl<R: Read, T: TypedRecord> TypedRecords<'_, R, T> {
    fn read_next(&mut self) -> Result<Option<T>> {
        self.reader.ensure_header()?;
        let CsvReader {
            tokenizer,
            layout,
            header,
            result_index,
            ..
        } = &mut *self.reader;
        let Some(line) = tokenizer.next_line()? else {
            return Ok(None);
        };
        synthesize_header(header, &line);

        let activator = match &self.activator {
            Some(activator) => Arc::clone(activator),
            None => {
                let header = header.clone().unwrap_or_else(|| Header::synthesized(line.len()));
                let compiled = match layout.schema(*result_index) {
                    Some(schema) => {
                        TypedActivator::compile::<T>(schema, &header, self.use_schema_conversion)?
                    }
                    None => TypedActivator::compile::<T>(
                        &Schema::for_type::<T>(),
                        &header,
                        self.use_schema_conversion,
                    )?,
                };
                self.activator = Some(Arc::clone(&compiled));
                compiled
            }
        };
        activator.activate(&line).map(Some)
    }
}

impl<R: Read, T: TypedRecord> Iterator for TypedRecords<'_, R, T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_next().transpose()
    }
}
