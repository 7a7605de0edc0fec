// Name-based row access for dynamic construction
//
// LiveRow reads straight out of the current record; MaterializedRow owns
// its values and survives the next read.

use std::collections::HashMap;

use crate::error::{CsvError, Result};
use crate::line::{Field, LineSlice, Record};
use crate::schema::{Column, ColumnType, FromValue, Header, Schema, Value};

/// Field lookup by column name.
pub trait RowAccess {
    fn get(&self, name: &str) -> Option<Field<'_>>;

    /// Column names in record order.
    fn names(&self) -> Vec<&str>;

    /// Schema column describing the named field, when one is attached.
    fn column(&self, _name: &str) -> Option<&Column> {
        None
    }
}

impl dyn RowAccess + '_ {
    /// Text of the named field. Null and unknown names read as `None`.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(|f| f.as_str())
    }

    /// Like `get`, but an unknown name is an argument error.
    pub fn require(&self, name: &str) -> Result<Field<'_>> {
        self.get(name)
            .ok_or_else(|| CsvError::argument(format!("unknown column name {name:?}")))
    }

    /// The named field converted through its schema column, or through
    /// `data_type` when no column describes it. Without a column a null
    /// field becomes `Value::Null`, so `Option<_>` targets accept it.
    pub fn typed<V: FromValue>(&self, name: &str, data_type: &ColumnType) -> Result<V> {
        let field = self.require(name)?;
        let value = match (self.column(name), field) {
            (Some(column), field) => column.convert(field),
            (None, Field::Null) => Ok(Value::Null),
            (None, Field::Text(text)) => data_type.parse(text, None),
        }
        .map_err(|e| CsvError::conversion(name, e))?;
        V::from_value(value).map_err(|e| CsvError::conversion(name, e))
    }
}

/// The current record seen through its header.
pub struct LiveRow<'r, 'a> {
    line: &'r LineSlice<'a>,
    header: &'r Header,
    schema: Option<&'r Schema>,
}

impl<'r, 'a> LiveRow<'r, 'a> {
    pub fn new(line: &'r LineSlice<'a>, header: &'r Header) -> Self {
        LiveRow {
            line,
            header,
            schema: None,
        }
    }

    /// Names missing from the header fall back to the schema's declared
    /// ordinals.
    pub fn with_schema(mut self, schema: &'r Schema) -> Self {
        self.schema = Some(schema);
        self
    }

    fn ordinal(&self, name: &str) -> Option<usize> {
        self.header
            .ordinal(name)
            .or_else(|| self.schema.and_then(|s| s.column(name)).map(|(i, _)| i))
    }

    /// Detach from the record.
    pub fn materialize(&self) -> MaterializedRow {
        MaterializedRow::new(self.header, self.line.to_record())
    }
}

impl RowAccess for LiveRow<'_, '_> {
    fn get(&self, name: &str) -> Option<Field<'_>> {
        self.ordinal(name).and_then(|i| self.line.field(i))
    }

    fn names(&self) -> Vec<&str> {
        self.header.names().iter().map(String::as_str).collect()
    }

    fn column(&self, name: &str) -> Option<&Column> {
        self.schema?.column(name).map(|(_, column)| column)
    }
}

/// A row that owns its names and values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MaterializedRow {
    names: Vec<String>,
    index: HashMap<String, usize>,
    values: Vec<Option<String>>,
}

impl MaterializedRow {
    /// Pair header names with record fields. Fields beyond the header are
    /// dropped; missing fields read as null.
    pub fn new(header: &Header, record: Record) -> Self {
        let mut values = record.into_fields();
        values.resize(header.len(), None);
        Self::from_pairs(header.names().iter().cloned().zip(values))
    }

    pub fn from_pairs<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, Option<String>)>,
        K: Into<String>,
    {
        let mut row = MaterializedRow::default();
        for (name, value) in pairs {
            let name = name.into();
            row.index.entry(name.clone()).or_insert(row.names.len());
            row.names.push(name);
            row.values.push(value);
        }
        row
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl RowAccess for MaterializedRow {
    fn get(&self, name: &str) -> Option<Field<'_>> {
        let value = self.values.get(*self.index.get(name)?)?;
        Some(match value {
            Some(text) => Field::Text(text),
            None => Field::Null,
        })
    }

    fn names(&self) -> Vec<&str> {
        self.names.iter().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Behavior, Layout, MissingFieldAction};
    use crate::schema::Column;
    use crate::tokenizer::Tokenizer;

    #[test]
    fn test_live_and_materialized_rows_agree() {
        let layout = Layout::default().with_header(false);
        let behavior = Behavior::default().with_missing_field(MissingFieldAction::ReplaceByNull);
        let mut tokenizer = Tokenizer::new("1,x,yes\n2\n".as_bytes(), &layout, behavior, 16).unwrap();
        let header = Header::new(vec!["id".into(), "name".into(), "flag".into()]);

        let line = tokenizer.next_line().unwrap().unwrap();
        let live = LiveRow::new(&line, &header);
        let owned = live.materialize();
        for row in [&live as &dyn RowAccess, &owned as &dyn RowAccess] {
            assert_eq!(row.names(), vec!["id", "name", "flag"]);
            assert_eq!(row.text("name"), Some("x"));
            assert_eq!(row.typed::<i64>("id", &ColumnType::I64).unwrap(), 1);
            assert!(row.typed::<bool>("flag", &ColumnType::Bool).unwrap());
            assert!(matches!(row.require("nope"), Err(CsvError::Argument(_))));
        }
        drop(line);

        let line = tokenizer.next_line().unwrap().unwrap();
        let row = LiveRow::new(&line, &header);
        let row: &dyn RowAccess = &row;
        assert_eq!(row.get("flag"), Some(Field::Null));
        assert_eq!(row.typed::<Option<bool>>("flag", &ColumnType::Bool).unwrap(), None);
    }

    #[test]
    fn test_schema_fallback_for_unlisted_names() {
        let layout = Layout::default().with_header(false);
        let mut tokenizer =
            Tokenizer::new("a,b\n".as_bytes(), &layout, Behavior::default(), 16).unwrap();
        let line = tokenizer.next_line().unwrap().unwrap();
        let header = Header::synthesized(2);
        let schema = Schema::new(vec![
            Column::new("first", ColumnType::String),
            Column::new("second", ColumnType::String),
        ]);
        let row = LiveRow::new(&line, &header).with_schema(&schema);
        assert_eq!(row.get("second"), Some(Field::Text("b")));
        assert_eq!(row.get("Column0"), Some(Field::Text("a")));
    }

    #[test]
    fn test_typed_uses_schema_column_conversion() {
        let mut tokenizer = Tokenizer::new(
            "day,code\n09/03/2024, AB \n".as_bytes(),
            &Layout::default(),
            Behavior::default(),
            16,
        )
        .unwrap();
        let header = Header::from_record(&tokenizer.next_line().unwrap().unwrap().to_record());
        let schema = Schema::new(vec![
            Column::new("day", ColumnType::Date).with_format("%d/%m/%Y"),
            Column::new("code", ColumnType::String)
                .with_converter(|t| Ok(Value::String(t.trim().to_lowercase()))),
        ]);
        let line = tokenizer.next_line().unwrap().unwrap();

        let with_schema = LiveRow::new(&line, &header).with_schema(&schema);
        let row: &dyn RowAccess = &with_schema;
        let day = chrono::NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        assert_eq!(row.typed::<chrono::NaiveDate>("day", &ColumnType::Date).unwrap(), day);
        assert_eq!(row.typed::<String>("code", &ColumnType::String).unwrap(), "ab");

        // No schema: the default format applies and rejects the value
        let bare = LiveRow::new(&line, &header);
        let row: &dyn RowAccess = &bare;
        assert!(matches!(
            row.typed::<chrono::NaiveDate>("day", &ColumnType::Date),
            Err(CsvError::Conversion { .. })
        ));
    }

    #[test]
    fn test_materialized_row_pads_and_truncates() {
        let header = Header::new(vec!["a".into(), "b".into()]);
        let short = MaterializedRow::new(&header, Record::new(vec![Some("1".into())]));
        assert_eq!(short.get("b"), Some(Field::Null));
        let long = MaterializedRow::new(
            &header,
            Record::new(vec![Some("1".into()), Some("2".into()), Some("3".into())]),
        );
        assert_eq!(long.len(), 2);
        assert_eq!(long.get("c"), None);
    }
}
