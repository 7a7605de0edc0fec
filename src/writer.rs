// Delimited-text writer using the same Layout vocabulary as the reader
//
// Each record is assembled in one reusable String and written with a single
// `write_all`. A field is quoted only when reading it back unquoted would
// change it.

use std::io::Write;

use crate::config::Layout;
use crate::error::{CsvError, Result};
use crate::schema::{Schema, Value};

const LINE_ENDING: &str = "\n";

/// A value that can be written as one record.
pub trait WriteRecord {
    /// Values in column order.
    fn to_values(&self) -> Vec<Value>;
}

pub struct CsvWriter<W: Write> {
    out: W,
    layout: Layout,
    line: String,
    /// Result set being written, selects the schema used for formats
    result_index: usize,
}

impl<W: Write> CsvWriter<W> {
    pub fn new(out: W, layout: Layout) -> Result<Self> {
        layout.validate()?;
        Ok(CsvWriter {
            out,
            layout,
            line: String::with_capacity(256),
            result_index: 0,
        })
    }

    /// Column names of `schema` as a header record.
    pub fn write_header(&mut self, schema: &Schema) -> Result<()> {
        self.write_record(schema.columns().iter().map(|c| c.name()))
    }

    pub fn write_record<I, S>(&mut self, fields: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.write_nullable_record(fields.into_iter().map(Some))
    }

    /// Null fields are written as empty fields.
    pub fn write_nullable_record<I, S>(&mut self, fields: I) -> Result<()>
    where
        I: IntoIterator<Item = Option<S>>,
        S: AsRef<str>,
    {
        let mut line = std::mem::take(&mut self.line);
        line.clear();
        let mut result = Ok(());
        for (i, field) in fields.into_iter().enumerate() {
            if i > 0 {
                line.push(self.layout.delimiter);
            }
            if let Some(field) = field {
                result = self.push_field(&mut line, field.as_ref());
                if result.is_err() {
                    break;
                }
            }
        }
        if result.is_ok() {
            line.push_str(LINE_ENDING);
            result = self.out.write_all(line.as_bytes()).map_err(CsvError::from);
        }
        self.line = line;
        result
    }

    /// Values rendered with the formats of the current result set's schema.
    pub fn write_values(&mut self, values: &[Value]) -> Result<()> {
        let formats: Vec<Option<String>> = match self.layout.schema(self.result_index) {
            Some(schema) => schema
                .columns()
                .iter()
                .map(|c| c.format().map(str::to_string))
                .collect(),
            None => Vec::new(),
        };
        let rendered: Vec<Option<String>> = values
            .iter()
            .enumerate()
            .map(|(i, v)| v.to_text(formats.get(i).and_then(|f| f.as_deref())))
            .collect();
        self.write_nullable_record(rendered)
    }

    pub fn write_typed<T: WriteRecord>(&mut self, record: &T) -> Result<()> {
        self.write_values(&record.to_values())
    }

    /// An empty line, which ends a result set for readers using
    /// `EmptyLineAction::NextResult`. Later values use the next schema.
    pub fn write_blank_line(&mut self) -> Result<()> {
        self.out.write_all(LINE_ENDING.as_bytes())?;
        self.result_index += 1;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }

    pub fn into_inner(mut self) -> Result<W> {
        self.out.flush()?;
        Ok(self.out)
    }

    fn push_field(&self, line: &mut String, field: &str) -> Result<()> {
        if !self.needs_quoting(field) {
            line.push_str(field);
            return Ok(());
        }
        let Some(quote) = self.layout.quote else {
            return Err(CsvError::argument(format!(
                "field {field:?} needs quoting but quoting is disabled"
            )));
        };
        let escape = self.layout.escape;
        line.push(quote);
        for c in field.chars() {
            if c == quote || c == escape {
                line.push(escape);
            }
            line.push(c);
        }
        line.push(quote);
        Ok(())
    }

    fn needs_quoting(&self, field: &str) -> bool {
        let layout = &self.layout;
        let starts_with_space = field.starts_with(|c: char| c == ' ' || c == '\t');
        let ends_with_space = field.ends_with(|c: char| c == ' ' || c == '\t');
        starts_with_space
            || ends_with_space
            || field.chars().next().is_some_and(|c| Some(c) == layout.comment)
            || field.chars().any(|c| {
                c == layout.delimiter
                    || c == '\r'
                    || c == '\n'
                    || Some(c) == layout.quote
                    || (layout.quote.is_some() && c == layout.escape)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Column, ColumnType};

    fn written(layout: Layout, records: &[&[&str]]) -> String {
        let mut writer = CsvWriter::new(Vec::new(), layout).unwrap();
        for record in records {
            writer.write_record(record.iter()).unwrap();
        }
        String::from_utf8(writer.into_inner().unwrap()).unwrap()
    }

    #[test]
    fn test_plain_fields_unquoted() {
        assert_eq!(written(Layout::default(), &[&["a", "b"], &["1", "2"]]), "a,b\n1,2\n");
    }

    #[test]
    fn test_quoting_rules() {
        let out = written(
            Layout::default(),
            &[&["x,y", "say \"hi\"", " pad", "#note", "line\nbreak", "in#side"]],
        );
        assert_eq!(
            out,
            "\"x,y\",\"say \"\"hi\"\"\",\" pad\",\"#note\",\"line\nbreak\",in#side\n"
        );
    }

    #[test]
    fn test_backslash_escape() {
        let layout = Layout::default().with_escape('\\');
        assert_eq!(written(layout, &[&["a\"b", "c\\d"]]), "\"a\\\"b\",\"c\\\\d\"\n");
    }

    #[test]
    fn test_quoting_disabled_rejects_special_fields() {
        let layout = Layout::default().with_quote(None);
        let mut writer = CsvWriter::new(Vec::new(), layout).unwrap();
        assert!(writer.write_record(["plain", "\"q\""]).is_ok());
        assert!(matches!(writer.write_record(["a,b"]), Err(CsvError::Argument(_))));
    }

    #[test]
    fn test_values_use_schema_formats_per_section() {
        let dates = Schema::new(vec![Column::new("d", ColumnType::Date).with_format("%d/%m/%Y")]);
        let plain = Schema::new(vec![Column::new("d", ColumnType::Date)]);
        let layout = Layout::default().with_schema(dates).with_schema(plain);
        let day = chrono::NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        let mut writer = CsvWriter::new(Vec::new(), layout).unwrap();
        writer.write_values(&[Value::Date(day)]).unwrap();
        writer.write_blank_line().unwrap();
        writer.write_values(&[Value::Date(day), Value::Null]).unwrap();
        let out = String::from_utf8(writer.into_inner().unwrap()).unwrap();
        assert_eq!(out, "09/03/2024\n\n2024-03-09,\n");
    }
}
