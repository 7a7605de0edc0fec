// Per-record field accumulator used by the tokenizer
//
// Field storage comes in three forms:
// - Direct: a range into the character source's current chunk, used when a
//   field's characters were scanned as one run with nothing to unescape
// - Owned: text copied into `text`, used once a field needed editing or its
//   chunk was about to be replaced
// - Null: padding produced by the missing-field policy
//
// The tokenizer calls `materialize` before every refill. After that call no
// field refers to the old chunk, which is what keeps Direct ranges sound.

use crate::config::TrimmingOptions;
use crate::core::{trim_range, FieldKind, FieldRef, PooledFields};

/// The field currently being assembled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Current {
    Empty,
    Direct { start: usize, end: usize },
    /// Content lives in `scratch`
    Owned,
}

#[derive(Debug)]
pub(crate) struct LineBuilder {
    /// Finished fields of the current record
    fields: Vec<FieldRef>,
    /// Storage for finished Owned fields
    text: String,
    /// Storage for the field in progress once it stops being Direct
    scratch: String,
    current: Current,
    quoted: bool,
    /// Whitespace seen after a closing quote, kept until we know whether
    /// the quote really closed the field
    trailing: String,
}

impl LineBuilder {
    pub fn new() -> Self {
        LineBuilder {
            fields: Vec::with_capacity(16),
            text: String::new(),
            scratch: String::new(),
            current: Current::Empty,
            quoted: false,
            trailing: String::new(),
        }
    }

    /// Forget everything about the current record.
    pub fn clear(&mut self) {
        self.fields.clear();
        self.text.clear();
        self.discard_current();
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[inline]
    pub fn fields(&self) -> &[FieldRef] {
        &self.fields
    }

    /// Storage that Owned ranges index into.
    #[inline]
    pub fn owned_text(&self) -> &str {
        &self.text
    }

    /// Append `buffer[start..end]` to the field in progress. Contiguous runs
    /// stay zero-copy.
    pub fn append_run(&mut self, buffer: &str, start: usize, end: usize) {
        if start == end {
            return;
        }
        match self.current {
            Current::Empty => self.current = Current::Direct { start, end },
            Current::Direct { start: s, end: e } if e == start => {
                self.current = Current::Direct { start: s, end };
            }
            Current::Direct { .. } => {
                self.to_scratch(buffer);
                self.scratch.push_str(&buffer[start..end]);
            }
            Current::Owned => self.scratch.push_str(&buffer[start..end]),
        }
    }

    /// Append a single character that is not a verbatim run of the input
    /// (an escaped character or a collapsed doubled quote).
    pub fn push_char(&mut self, buffer: &str, c: char) {
        self.to_scratch(buffer);
        self.scratch.push(c);
    }

    pub fn begin_quoted(&mut self) {
        self.quoted = true;
    }

    /// Drop the field in progress, e.g. whitespace that turned out to precede
    /// an opening quote.
    pub fn discard_current(&mut self) {
        self.current = Current::Empty;
        self.scratch.clear();
        self.quoted = false;
        self.trailing.clear();
    }

    pub fn push_trailing(&mut self, whitespace: &str) {
        self.trailing.push_str(whitespace);
    }

    #[inline]
    pub fn has_trailing(&self) -> bool {
        !self.trailing.is_empty()
    }

    /// The closing quote was not a terminator after all: put it and the
    /// whitespace behind it back into the field.
    pub fn restore_stray_quote(&mut self, buffer: &str, quote: char) {
        self.to_scratch(buffer);
        self.scratch.push(quote);
        self.scratch.push_str(&self.trailing);
        self.trailing.clear();
    }

    /// Finish the field in progress, applying the trimming policy once.
    pub fn end_field(&mut self, buffer: &str, trimming: TrimmingOptions) {
        let trim = trimming.applies(self.quoted);
        let field = match self.current {
            Current::Empty => FieldRef {
                kind: FieldKind::Owned,
                start: self.text.len(),
                end: self.text.len(),
                quoted: self.quoted,
            },
            Current::Direct { start, end } => {
                let (start, end) = if trim {
                    trim_range(buffer, start, end)
                } else {
                    (start, end)
                };
                FieldRef {
                    kind: FieldKind::Direct,
                    start,
                    end,
                    quoted: self.quoted,
                }
            }
            Current::Owned => {
                let content = if trim {
                    self.scratch.trim()
                } else {
                    self.scratch.as_str()
                };
                let start = self.text.len();
                self.text.push_str(content);
                FieldRef {
                    kind: FieldKind::Owned,
                    start,
                    end: self.text.len(),
                    quoted: self.quoted,
                }
            }
        };
        self.fields.push(field);
        self.discard_current();
    }

    /// Copy every Direct range into owned storage. Must run before the
    /// chunk those ranges point into is replaced.
    pub fn materialize(&mut self, buffer: &str) {
        for field in self.fields.iter_mut() {
            if field.kind == FieldKind::Direct {
                let start = self.text.len();
                self.text.push_str(&buffer[field.start..field.end]);
                *field = FieldRef {
                    kind: FieldKind::Owned,
                    start,
                    end: self.text.len(),
                    quoted: field.quoted,
                };
            }
        }
        if let Current::Direct { .. } = self.current {
            self.to_scratch(buffer);
        }
    }

    /// Pad a short record up to `count` fields.
    pub fn pad(&mut self, count: usize, filler: FieldRef) {
        let filler = FieldRef {
            start: self.text.len(),
            end: self.text.len(),
            ..filler
        };
        while self.fields.len() < count {
            self.fields.push(filler);
        }
    }

    /// Rent a field array sized to the finished record.
    pub fn to_pooled(&self) -> PooledFields {
        let mut pooled = PooledFields::rent(self.fields.len());
        pooled.extend_from_slice(&self.fields);
        pooled
    }

    /// Text of the field in progress, for diagnostics.
    pub fn current_text<'a>(&'a self, buffer: &'a str) -> &'a str {
        match self.current {
            Current::Empty => "",
            Current::Direct { start, end } => &buffer[start..end],
            Current::Owned => &self.scratch,
        }
    }

    /// The finished fields joined by `delimiter`, for diagnostics.
    pub fn joined(&self, buffer: &str, delimiter: char) -> String {
        let mut out = String::new();
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                out.push(delimiter);
            }
            match field.kind {
                FieldKind::Direct => out.push_str(&buffer[field.start..field.end]),
                FieldKind::Owned => out.push_str(&self.text[field.start..field.end]),
                FieldKind::Null => {}
            }
        }
        out
    }

    fn to_scratch(&mut self, buffer: &str) {
        if let Current::Direct { start, end } = self.current {
            self.scratch.clear();
            self.scratch.push_str(&buffer[start..end]);
        }
        self.current = Current::Owned;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(builder: &LineBuilder, buffer: &str) -> Vec<String> {
        builder
            .fields()
            .iter()
            .map(|f| match f.kind {
                FieldKind::Direct => buffer[f.start..f.end].to_string(),
                FieldKind::Owned => builder.owned_text()[f.start..f.end].to_string(),
                FieldKind::Null => "<null>".to_string(),
            })
            .collect()
    }

    #[test]
    fn test_contiguous_runs_stay_direct() {
        let buffer = "hello world,";
        let mut b = LineBuilder::new();
        b.append_run(buffer, 0, 5);
        b.append_run(buffer, 5, 11);
        b.end_field(buffer, TrimmingOptions::None);
        assert_eq!(b.fields()[0].kind, FieldKind::Direct);
        assert_eq!(texts(&b, buffer), vec!["hello world"]);
    }

    #[test]
    fn test_gap_between_runs_copies() {
        // "a""b" inside quotes: runs 1..2 and 4..5 with a pushed quote
        let buffer = "\"a\"\"b\"";
        let mut b = LineBuilder::new();
        b.begin_quoted();
        b.append_run(buffer, 1, 2);
        b.push_char(buffer, '"');
        b.append_run(buffer, 4, 5);
        b.end_field(buffer, TrimmingOptions::None);
        assert_eq!(b.fields()[0].kind, FieldKind::Owned);
        assert!(b.fields()[0].quoted);
        assert_eq!(texts(&b, buffer), vec!["a\"b"]);
    }

    #[test]
    fn test_materialize_detaches_from_buffer() {
        let mut b = LineBuilder::new();
        {
            let buffer = String::from("abc,de");
            b.append_run(&buffer, 0, 3);
            b.end_field(&buffer, TrimmingOptions::None);
            b.append_run(&buffer, 4, 6);
            b.materialize(&buffer);
        }
        let next_chunk = "fg\n";
        b.append_run(next_chunk, 0, 2);
        b.end_field(next_chunk, TrimmingOptions::None);
        assert!(b.fields().iter().all(|f| f.kind == FieldKind::Owned));
        assert_eq!(texts(&b, next_chunk), vec!["abc", "defg"]);
    }

    #[test]
    fn test_trimming_per_quoting() {
        let buffer = "  x  ";
        let mut b = LineBuilder::new();
        b.append_run(buffer, 0, 5);
        b.end_field(buffer, TrimmingOptions::UnquotedOnly);
        b.begin_quoted();
        b.append_run(buffer, 0, 5);
        b.end_field(buffer, TrimmingOptions::UnquotedOnly);
        b.begin_quoted();
        b.push_char(buffer, ' ');
        b.push_char(buffer, 'y');
        b.push_char(buffer, ' ');
        b.end_field(buffer, TrimmingOptions::All);
        assert_eq!(texts(&b, buffer), vec!["x", "  x  ", "y"]);
    }

    #[test]
    fn test_stray_quote_restores_whitespace() {
        let buffer = "ab";
        let mut b = LineBuilder::new();
        b.begin_quoted();
        b.append_run(buffer, 0, 2);
        b.push_trailing("  ");
        assert!(b.has_trailing());
        b.restore_stray_quote(buffer, '"');
        b.end_field(buffer, TrimmingOptions::None);
        assert_eq!(texts(&b, buffer), vec!["ab\"  "]);
    }

    #[test]
    fn test_pad_and_pool() {
        let buffer = "a";
        let mut b = LineBuilder::new();
        b.append_run(buffer, 0, 1);
        b.end_field(buffer, TrimmingOptions::None);
        b.pad(3, FieldRef::NULL);
        assert_eq!(texts(&b, buffer), vec!["a", "<null>", "<null>"]);
        let pooled = b.to_pooled();
        assert_eq!(pooled.len(), 3);
        assert_eq!(b.joined(buffer, ';'), "a;;");
    }

    #[test]
    fn test_empty_field_is_owned_empty() {
        let mut b = LineBuilder::new();
        b.end_field("", TrimmingOptions::None);
        assert!(b.fields()[0].is_empty_text());
    }
}
