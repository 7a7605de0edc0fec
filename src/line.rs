// Parsed records: the borrowed LineSlice and its owned counterpart Record
//
// A LineSlice borrows the tokenizer that produced it, so it cannot outlive
// the buffers its zero-copy fields point into. Anything that has to survive
// the next read (a header, a cached row) goes through `to_record()`.

use crate::core::{FieldKind, FieldRef, PooledFields};
use crate::error::{CsvError, Result};

/// One field of the current record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field<'a> {
    Text(&'a str),
    Null,
}

impl<'a> Field<'a> {
    #[inline]
    pub fn as_str(&self) -> Option<&'a str> {
        match self {
            Field::Text(s) => Some(s),
            Field::Null => None,
        }
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Field::Null)
    }

    pub fn to_owned_value(&self) -> Option<String> {
        self.as_str().map(str::to_string)
    }
}

/// The record the tokenizer just completed.
#[derive(Debug)]
pub struct LineSlice<'a> {
    /// Character source chunk that `Direct` fields point into
    buffer: &'a str,
    /// Line builder storage that `Owned` fields point into
    owned: &'a str,
    fields: PooledFields,
    is_empty: bool,
}

impl<'a> LineSlice<'a> {
    pub(crate) fn new(buffer: &'a str, owned: &'a str, fields: PooledFields) -> Self {
        let is_empty = match fields.as_slice() {
            [] => true,
            [only] => only.is_empty_text(),
            _ => false,
        };
        LineSlice {
            buffer,
            owned,
            fields,
            is_empty,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// True for zero fields or exactly one empty field.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.is_empty
    }

    #[inline]
    pub fn field(&self, index: usize) -> Option<Field<'a>> {
        self.fields.get(index).map(|r| self.resolve(r))
    }

    /// Like `field`, but an out-of-range index is an argument error.
    pub fn try_field(&self, index: usize) -> Result<Field<'a>> {
        self.field(index).ok_or_else(|| {
            CsvError::argument(format!(
                "field index {} out of range for a record of {} fields",
                index,
                self.len()
            ))
        })
    }

    /// Text of a field. Null fields and out-of-range indexes read as `None`.
    #[inline]
    pub fn get(&self, index: usize) -> Option<&'a str> {
        self.field(index).and_then(|f| f.as_str())
    }

    /// Whether the field still points into the source chunk (zero-copy).
    pub fn is_borrowed(&self, index: usize) -> bool {
        self.fields
            .get(index)
            .is_some_and(|r| r.kind == FieldKind::Direct)
    }

    /// Whether the field was enclosed in quotes in the input.
    pub fn is_quoted(&self, index: usize) -> bool {
        self.fields.get(index).is_some_and(|r| r.quoted)
    }

    pub fn iter(&self) -> impl Iterator<Item = Field<'a>> + '_ {
        self.fields.iter().map(move |r| self.resolve(r))
    }

    /// Copy every field out so it outlives the current record.
    pub fn to_record(&self) -> Record {
        Record {
            fields: self.iter().map(|f| f.to_owned_value()).collect(),
        }
    }

    #[inline]
    fn resolve(&self, r: &FieldRef) -> Field<'a> {
        match r.kind {
            FieldKind::Direct => Field::Text(&self.buffer[r.start..r.end]),
            FieldKind::Owned => Field::Text(&self.owned[r.start..r.end]),
            FieldKind::Null => Field::Null,
        }
    }
}

/// An owned record, detached from any read session.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Record {
    fields: Vec<Option<String>>,
}

impl Record {
    pub fn new(fields: Vec<Option<String>>) -> Self {
        Record { fields }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        match self.fields.as_slice() {
            [] => true,
            [Some(only)] => only.is_empty(),
            _ => false,
        }
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.fields.get(index).and_then(|f| f.as_deref())
    }

    pub fn field(&self, index: usize) -> Option<Field<'_>> {
        self.fields.get(index).map(|f| match f {
            Some(s) => Field::Text(s),
            None => Field::Null,
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = Option<&str>> + '_ {
        self.fields.iter().map(|f| f.as_deref())
    }

    pub fn into_fields(self) -> Vec<Option<String>> {
        self.fields
    }
}

impl<S: Into<String>> FromIterator<Option<S>> for Record {
    fn from_iter<I: IntoIterator<Item = Option<S>>>(iter: I) -> Self {
        Record {
            fields: iter.into_iter().map(|f| f.map(Into::into)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slice_of<'a>(buffer: &'a str, owned: &'a str, refs: &[FieldRef]) -> LineSlice<'a> {
        let mut fields = PooledFields::rent(refs.len());
        fields.extend_from_slice(refs);
        LineSlice::new(buffer, owned, fields)
    }

    fn direct(start: usize, end: usize) -> FieldRef {
        FieldRef {
            kind: FieldKind::Direct,
            start,
            end,
            quoted: false,
        }
    }

    #[test]
    fn test_resolves_direct_owned_and_null() {
        let owned_ref = FieldRef {
            kind: FieldKind::Owned,
            start: 0,
            end: 3,
            quoted: true,
        };
        let line = slice_of("ab,cd", "xyz", &[direct(0, 2), owned_ref, FieldRef::NULL]);
        assert_eq!(line.len(), 3);
        assert_eq!(line.get(0), Some("ab"));
        assert_eq!(line.get(1), Some("xyz"));
        assert_eq!(line.field(2), Some(Field::Null));
        assert_eq!(line.get(2), None);
        assert!(line.is_borrowed(0));
        assert!(!line.is_borrowed(1));
        assert!(line.is_quoted(1));
        assert!(!line.is_empty());
    }

    #[test]
    fn test_emptiness() {
        assert!(slice_of("", "", &[]).is_empty());
        assert!(slice_of("", "", &[FieldRef::EMPTY]).is_empty());
        assert!(!slice_of("", "", &[FieldRef::NULL]).is_empty());
        assert!(!slice_of("", "", &[FieldRef::EMPTY, FieldRef::EMPTY]).is_empty());
    }

    #[test]
    fn test_out_of_range_is_argument_error() {
        let line = slice_of("a", "", &[direct(0, 1)]);
        assert!(matches!(line.try_field(1), Err(CsvError::Argument(_))));
        assert_eq!(line.get(7), None);
    }

    #[test]
    fn test_to_record_detaches() {
        let record = {
            let buffer = String::from("a,b");
            let line = slice_of(&buffer, "", &[direct(0, 1), FieldRef::NULL]);
            line.to_record()
        };
        assert_eq!(record.iter().collect::<Vec<_>>(), vec![Some("a"), None]);
        assert_eq!(record.get(0), Some("a"));
        assert!(!record.is_empty());
    }
}
