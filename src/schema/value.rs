// Typed values and the string -> value conversions behind every column
//
// Conversions ignore surrounding whitespace, so they behave the same under
// every trimming policy.

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};

use crate::error::ConversionError;

pub const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d";
pub const DEFAULT_DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// Accepted when no explicit format is given, tried in order.
const DATETIME_FALLBACK_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Declared type of a column.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ColumnType {
    String,
    Bool,
    Char,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    Date,
    DateTime,
    /// A type only a custom converter understands
    Custom(String),
}

impl ColumnType {
    pub fn name(&self) -> &str {
        match self {
            ColumnType::String => "String",
            ColumnType::Bool => "Bool",
            ColumnType::Char => "Char",
            ColumnType::I8 => "I8",
            ColumnType::I16 => "I16",
            ColumnType::I32 => "I32",
            ColumnType::I64 => "I64",
            ColumnType::U8 => "U8",
            ColumnType::U16 => "U16",
            ColumnType::U32 => "U32",
            ColumnType::U64 => "U64",
            ColumnType::F32 => "F32",
            ColumnType::F64 => "F64",
            ColumnType::Date => "Date",
            ColumnType::DateTime => "DateTime",
            ColumnType::Custom(name) => name,
        }
    }

    /// Types with a dedicated, format-free parse path.
    pub fn is_primitive(&self) -> bool {
        !matches!(
            self,
            ColumnType::Date | ColumnType::DateTime | ColumnType::Custom(_)
        )
    }

    /// Convert text to a value of this type.
    pub fn parse(&self, text: &str, format: Option<&str>) -> Result<Value, ConversionError> {
        let t = text.trim();
        let value = match self {
            ColumnType::String => Value::String(text.to_string()),
            ColumnType::Bool => Value::Bool(parse_bool(t)?),
            ColumnType::Char => Value::Char(parse_char(text)?),
            ColumnType::I8 => Value::I8(parse_number(t, self)?),
            ColumnType::I16 => Value::I16(parse_number(t, self)?),
            ColumnType::I32 => Value::I32(parse_number(t, self)?),
            ColumnType::I64 => Value::I64(parse_number(t, self)?),
            ColumnType::U8 => Value::U8(parse_number(t, self)?),
            ColumnType::U16 => Value::U16(parse_number(t, self)?),
            ColumnType::U32 => Value::U32(parse_number(t, self)?),
            ColumnType::U64 => Value::U64(parse_number(t, self)?),
            ColumnType::F32 => Value::F32(parse_number(t, self)?),
            ColumnType::F64 => Value::F64(parse_number(t, self)?),
            ColumnType::Date => Value::Date(parse_date(t, format)?),
            ColumnType::DateTime => Value::DateTime(parse_datetime(t, format)?),
            ColumnType::Custom(name) => {
                return Err(ConversionError::new(
                    text,
                    name.as_str(),
                    "no converter registered for custom type",
                ))
            }
        };
        Ok(value)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub fn parse_bool(text: &str) -> Result<bool, ConversionError> {
    let t = text.trim();
    if t.eq_ignore_ascii_case("true") || t == "1" || t.eq_ignore_ascii_case("yes") {
        Ok(true)
    } else if t.eq_ignore_ascii_case("false") || t == "0" || t.eq_ignore_ascii_case("no") {
        Ok(false)
    } else {
        Err(ConversionError::new(text, "Bool", "unrecognized boolean literal"))
    }
}

/// Exactly one character. Surrounding whitespace is ignored unless the text
/// is a single whitespace character, which is the value itself.
pub fn parse_char(text: &str) -> Result<char, ConversionError> {
    let single = |t: &str| {
        let mut chars = t.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Some(c),
            _ => None,
        }
    };
    single(text)
        .or_else(|| single(text.trim()))
        .ok_or_else(|| ConversionError::new(text, "Char", "expected exactly one character"))
}

/// Text a nullable column of type `ty` reads as null. A blank `Char` is a
/// value, so only empty text counts there.
pub fn is_null_text(text: &str, ty: &ColumnType) -> bool {
    match ty {
        ColumnType::Char => text.is_empty(),
        _ => text.trim().is_empty(),
    }
}

pub fn parse_number<N>(text: &str, ty: &ColumnType) -> Result<N, ConversionError>
where
    N: std::str::FromStr,
    N::Err: fmt::Display,
{
    text.trim()
        .parse::<N>()
        .map_err(|e| ConversionError::new(text, ty.name(), e))
}

pub fn parse_date(text: &str, format: Option<&str>) -> Result<NaiveDate, ConversionError> {
    let format = format.unwrap_or(DEFAULT_DATE_FORMAT);
    NaiveDate::parse_from_str(text.trim(), format).map_err(|e| ConversionError::new(text, "Date", e))
}

pub fn parse_datetime(text: &str, format: Option<&str>) -> Result<NaiveDateTime, ConversionError> {
    let t = text.trim();
    if let Some(format) = format {
        return NaiveDateTime::parse_from_str(t, format)
            .map_err(|e| ConversionError::new(text, "DateTime", e));
    }
    let mut last_error = None;
    for format in DATETIME_FALLBACK_FORMATS {
        match NaiveDateTime::parse_from_str(t, format) {
            Ok(dt) => return Ok(dt),
            Err(e) => last_error = Some(e),
        }
    }
    Err(ConversionError::new(
        text,
        "DateTime",
        last_error.map(|e| e.to_string()).unwrap_or_default(),
    ))
}

/// A materialized field value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    String(String),
    Bool(bool),
    Char(char),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "Null",
            Value::String(_) => "String",
            Value::Bool(_) => "Bool",
            Value::Char(_) => "Char",
            Value::I8(_) => "I8",
            Value::I16(_) => "I16",
            Value::I32(_) => "I32",
            Value::I64(_) => "I64",
            Value::U8(_) => "U8",
            Value::U16(_) => "U16",
            Value::U32(_) => "U32",
            Value::U64(_) => "U64",
            Value::F32(_) => "F32",
            Value::F64(_) => "F64",
            Value::Date(_) => "Date",
            Value::DateTime(_) => "DateTime",
        }
    }

    /// Render as field text. Null renders as `None`.
    pub fn to_text(&self, format: Option<&str>) -> Option<String> {
        let text = match self {
            Value::Null => return None,
            Value::String(s) => s.clone(),
            Value::Bool(b) => b.to_string(),
            Value::Char(c) => c.to_string(),
            Value::I8(n) => n.to_string(),
            Value::I16(n) => n.to_string(),
            Value::I32(n) => n.to_string(),
            Value::I64(n) => n.to_string(),
            Value::U8(n) => n.to_string(),
            Value::U16(n) => n.to_string(),
            Value::U32(n) => n.to_string(),
            Value::U64(n) => n.to_string(),
            Value::F32(n) => n.to_string(),
            Value::F64(n) => n.to_string(),
            Value::Date(d) => d.format(format.unwrap_or(DEFAULT_DATE_FORMAT)).to_string(),
            Value::DateTime(dt) => dt
                .format(format.unwrap_or(DEFAULT_DATETIME_FORMAT))
                .to_string(),
        };
        Some(text)
    }
}

/// Extraction of a concrete Rust type from a `Value`.
pub trait FromValue: Sized {
    fn from_value(value: Value) -> Result<Self, ConversionError>;
}

fn mismatch(value: &Value, target: &str) -> ConversionError {
    ConversionError::new(
        &value.to_text(None).unwrap_or_default(),
        target,
        format!("value of type {} cannot be assigned", value.type_name()),
    )
}

macro_rules! impl_from_value {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl FromValue for $ty {
                fn from_value(value: Value) -> Result<Self, ConversionError> {
                    match value {
                        Value::$variant(v) => Ok(v),
                        other => Err(mismatch(&other, stringify!($ty))),
                    }
                }
            }
        )*
    };
}

impl_from_value!(
    String => String,
    bool => Bool,
    char => Char,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    f32 => F32,
    f64 => F64,
    NaiveDate => Date,
    NaiveDateTime => DateTime,
);

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> Result<Self, ConversionError> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

impl FromValue for Value {
    fn from_value(value: Value) -> Result<Self, ConversionError> {
        Ok(value)
    }
}
