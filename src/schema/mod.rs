// Schema model: ordered, immutable column descriptors
//
// A column maps a logical name (matched against the header) to a bound
// member, a declared type, an optional format and a conversion from text.
// Every schema carries a reproducible signature used as part of the
// activator cache key.

mod header;
mod value;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::activator::TypedRecord;
use crate::error::{ConversionError, CsvError, Result};
use crate::line::{Field, LineSlice};

pub use header::{Header, PLACEHOLDER_PREFIX};
pub use value::{
    is_null_text, parse_bool, parse_char, parse_date, parse_datetime, parse_number, ColumnType,
    FromValue, Value, DEFAULT_DATETIME_FORMAT, DEFAULT_DATE_FORMAT,
};

/// Text -> value conversion attached to a column.
pub type Converter = Arc<dyn Fn(&str) -> Result<Value, ConversionError> + Send + Sync>;

#[derive(Clone)]
pub struct Column {
    name: String,
    member: String,
    data_type: ColumnType,
    format: Option<String>,
    nullable: bool,
    converter: Option<Converter>,
}

impl fmt::Debug for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Column")
            .field("name", &self.name)
            .field("member", &self.member)
            .field("data_type", &self.data_type)
            .field("format", &self.format)
            .field("nullable", &self.nullable)
            .field("custom_converter", &self.converter.is_some())
            .finish()
    }
}

impl Column {
    /// A column bound to the member of the same name.
    pub fn new(name: impl Into<String>, data_type: ColumnType) -> Self {
        let name = name.into();
        Column {
            member: name.clone(),
            name,
            data_type,
            format: None,
            nullable: false,
            converter: None,
        }
    }

    pub fn with_member(mut self, member: impl Into<String>) -> Self {
        self.member = member.into();
        self
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    pub fn with_converter<F>(mut self, converter: F) -> Self
    where
        F: Fn(&str) -> Result<Value, ConversionError> + Send + Sync + 'static,
    {
        self.converter = Some(Arc::new(converter));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn member(&self) -> &str {
        &self.member
    }

    pub fn data_type(&self) -> &ColumnType {
        &self.data_type
    }

    pub fn format(&self) -> Option<&str> {
        self.format.as_deref()
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn has_custom_converter(&self) -> bool {
        self.converter.is_some()
    }

    /// Convert a field through this column.
    ///
    /// Nullable columns map null fields and blank text to `Value::Null`.
    /// A null field in a non-nullable column reads as `""` for strings and
    /// is an error for every other type.
    pub fn convert(&self, field: Field<'_>) -> Result<Value, ConversionError> {
        let text = match field {
            Field::Null => return self.null_value(),
            Field::Text(text) => text,
        };
        if self.nullable && is_null_text(text, &self.data_type) {
            return Ok(Value::Null);
        }
        match &self.converter {
            Some(convert) => convert(text),
            None => self.data_type.parse(text, self.format()),
        }
    }

    fn null_value(&self) -> Result<Value, ConversionError> {
        if self.nullable {
            Ok(Value::Null)
        } else if self.data_type == ColumnType::String {
            Ok(Value::String(String::new()))
        } else {
            Err(ConversionError::new(
                "",
                self.data_type.name(),
                "null value in a non-nullable column",
            ))
        }
    }

    fn signature_part(&self) -> String {
        // Converter identity keeps two differently configured schemas apart
        let converter = self
            .converter
            .as_ref()
            .map(|c| format!("{:p}", Arc::as_ptr(c) as *const ()))
            .unwrap_or_default();
        format!(
            "{:?}:{:?}:{}:{:?}:{}:{}",
            self.name,
            self.member,
            self.data_type,
            self.format,
            self.nullable,
            converter
        )
    }
}

/// Ordered, immutable list of columns.
#[derive(Debug, Clone)]
pub struct Schema {
    columns: Vec<Column>,
    index: HashMap<String, usize>,
    /// Bound member -> declared ordinal
    members: HashMap<String, usize>,
    signature: String,
}

impl Schema {
    pub fn new(columns: Vec<Column>) -> Self {
        let mut index = HashMap::with_capacity(columns.len());
        let mut members = HashMap::with_capacity(columns.len());
        for (ordinal, column) in columns.iter().enumerate() {
            index.entry(column.name.clone()).or_insert(ordinal);
            members.entry(column.member.clone()).or_insert(ordinal);
        }
        let signature = columns
            .iter()
            .map(Column::signature_part)
            .collect::<Vec<_>>()
            .join("|");
        Schema {
            columns,
            index,
            members,
            signature,
        }
    }

    /// Schema derived from the members of `T`, one column per member in
    /// declaration order.
    pub fn for_type<T: TypedRecord>() -> Self {
        Self::new(
            T::members()
                .into_iter()
                .map(|m| {
                    let column = Column::new(m.name, m.data_type).nullable(m.nullable);
                    match m.format {
                        Some(format) => column.with_format(format),
                        None => column,
                    }
                })
                .collect(),
        )
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Declared ordinal and descriptor of the named column.
    pub fn column(&self, name: &str) -> Option<(usize, &Column)> {
        self.index.get(name).map(|&i| (i, &self.columns[i]))
    }

    /// Declared ordinal and descriptor of the column bound to `member`.
    pub fn column_for_member(&self, member: &str) -> Option<(usize, &Column)> {
        self.members.get(member).map(|&i| (i, &self.columns[i]))
    }

    /// Reproducible identity of this schema's configuration.
    pub fn signature(&self) -> &str {
        &self.signature
    }

    /// Where the column declared at `declared` is found in the record: the
    /// header position of its name, or its declared position when the
    /// header does not list it.
    pub fn resolve_ordinal(&self, declared: usize, header: Option<&Header>) -> usize {
        header
            .and_then(|h| h.ordinal(&self.columns[declared].name))
            .unwrap_or(declared)
    }

    /// Convert a whole record, one value per column in schema order.
    pub fn convert_line(&self, line: &LineSlice<'_>, header: Option<&Header>) -> Result<Vec<Value>> {
        self.columns
            .iter()
            .enumerate()
            .map(|(declared, column)| {
                let field = line.try_field(self.resolve_ordinal(declared, header))?;
                column
                    .convert(field)
                    .map_err(|e| CsvError::conversion(column.name(), e))
            })
            .collect()
    }
}
