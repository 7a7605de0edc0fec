// Streaming tokenizer: characters in, one LineSlice per logical record out
//
// Key design:
// - An explicit state machine driven one step at a time over the
//   character source's current span; each step reports how much it consumed
// - Unquoted runs and quoted runs without escapes are found with a single
//   longest-match scan and recorded as zero-copy ranges
// - Before the source replaces its chunk, the line builder materializes
//   every range that still points into it
// - End of input is structural (the source is exhausted), not a state

mod builder;

use std::io::Read;

use tracing::{debug, warn};

use crate::config::{
    Behavior, EmptyLineAction, Layout, MissingFieldAction, QuotesInsideQuotedFieldAction,
};
use crate::core::{
    count_line_breaks, find_field_end, find_newline, find_quote_or_escape, is_newline,
    is_whitespace, whitespace_run, CharSource, FieldRef,
};
use crate::error::{CsvError, Location, Result};
use crate::line::LineSlice;

use builder::LineBuilder;

/// Longest stretch of raw input quoted in error messages.
const CONTEXT_LEN: usize = 48;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    BeginningOfLine,
    InComment,
    InsideField,
    OutsideField,
    Escaped,
    InsideQuotedField,
    AfterSecondQuote,
    ParseError,
}

/// What a single step of the machine produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Signal {
    Continue,
    /// A newline completed the record. `cr` means a following `\n` belongs
    /// to the same line ending.
    Record { cr: bool },
    /// A newline ended a comment or a discarded line.
    LineSkipped { cr: bool },
}

enum Scanned {
    Record,
    EndOfInput,
}

#[derive(Debug, Clone, Copy)]
struct Punctuation {
    delimiter: char,
    quote: Option<char>,
    escape: char,
    comment: Option<char>,
}

/// Everything except the character source, so a step can borrow the
/// source's buffer while mutating the machine.
struct Machine {
    punct: Punctuation,
    behavior: Behavior,
    state: State,
    builder: LineBuilder,
    field_count: Option<usize>,
    /// Physical line of the character being processed (1-based)
    line: u64,
    /// Absolute offset where that line starts
    line_start: u64,
    /// Physical line where the current record started
    record_line: u64,
    /// Where the last completed record ended
    record_end: Location,
    /// Quoted content seen so far ends with `\r`
    after_cr: bool,
    /// An empty line ended the current result set under `NextResult`
    at_boundary: bool,
    /// No non-empty record has been admitted in this result set yet
    fresh_section: bool,
    eof: bool,
}

pub struct Tokenizer<R> {
    source: CharSource<R>,
    machine: Machine,
}

impl<R: Read> Tokenizer<R> {
    pub fn new(reader: R, layout: &Layout, behavior: Behavior, buffer_size: usize) -> Result<Self> {
        layout.validate()?;
        if buffer_size == 0 {
            return Err(CsvError::argument("buffer size must be at least 1"));
        }
        Ok(Tokenizer {
            source: CharSource::with_capacity(reader, buffer_size),
            machine: Machine {
                punct: Punctuation {
                    delimiter: layout.delimiter,
                    quote: layout.quote,
                    escape: layout.escape,
                    comment: layout.comment,
                },
                behavior,
                state: State::BeginningOfLine,
                builder: LineBuilder::new(),
                field_count: None,
                line: 1,
                line_start: 0,
                record_line: 1,
                record_end: Location { line: 1, column: 1 },
                after_cr: false,
                at_boundary: false,
                fresh_section: true,
                eof: false,
            },
        })
    }

    /// Next record, or `None` at end of input or at the end of the current
    /// result set (see `at_section_boundary`).
    pub fn next_line(&mut self) -> Result<Option<LineSlice<'_>>> {
        if !self.scan_record()? {
            return Ok(None);
        }
        let fields = self.machine.builder.to_pooled();
        Ok(Some(LineSlice::new(
            self.source.buffer(),
            self.machine.builder.owned_text(),
            fields,
        )))
    }

    /// Canonical field count, once the first admitted record fixed it.
    pub fn field_count(&self) -> Option<usize> {
        self.machine.field_count
    }

    pub fn location(&self) -> Location {
        self.machine.location(self.source.position())
    }

    pub fn state(&self) -> State {
        self.machine.state
    }

    pub fn at_section_boundary(&self) -> bool {
        self.machine.at_boundary
    }

    pub fn is_eof(&self) -> bool {
        self.machine.eof
    }

    /// Skip whatever is left of the current result set. Malformed records
    /// in the skipped part are ignored; I/O errors are not.
    pub fn skip_section(&mut self) -> Result<()> {
        loop {
            match self.scan_record() {
                Ok(true) => continue,
                Ok(false) => return Ok(()),
                Err(CsvError::MalformedInput { .. }) | Err(CsvError::MissingField { .. }) => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Start a fresh result set: new field-count establishment, state back
    /// to `BeginningOfLine`. Returns whether any record input remains; blank
    /// lines are passed over unless empty lines are yielded as records.
    pub fn reset_section(&mut self) -> Result<bool> {
        let m = &mut self.machine;
        m.field_count = None;
        m.at_boundary = false;
        m.fresh_section = true;
        m.state = State::BeginningOfLine;
        m.builder.clear();
        if m.eof {
            return Ok(false);
        }
        let skip_blank = m.behavior.empty_line != EmptyLineAction::None;
        loop {
            match self.source.peek()? {
                Some(c) if skip_blank && is_newline(c) => {
                    self.source.advance(1);
                    if c == '\r' && self.source.peek()? == Some('\n') {
                        self.source.advance(1);
                    }
                    self.machine.line += 1;
                    self.machine.line_start = self.source.position();
                    self.machine.record_line = self.machine.line;
                }
                Some(_) => return Ok(true),
                None => {
                    self.machine.eof = true;
                    return Ok(false);
                }
            }
        }
    }

    /// Advance to the next admitted record, leaving it in the builder.
    fn scan_record(&mut self) -> Result<bool> {
        loop {
            if self.machine.at_boundary || self.machine.eof {
                return Ok(false);
            }
            self.machine.builder.clear();
            self.machine.record_line = self.machine.line;
            if let Scanned::EndOfInput = self.scan_physical()? {
                self.machine.eof = true;
                return Ok(false);
            }

            let m = &mut self.machine;
            let is_empty = match m.builder.fields() {
                [] => true,
                [only] => only.is_empty_text(),
                _ => false,
            };
            if is_empty {
                match m.behavior.empty_line {
                    EmptyLineAction::Skip => continue,
                    EmptyLineAction::None => return Ok(true),
                    EmptyLineAction::NextResult => {
                        if m.fresh_section {
                            continue;
                        }
                        debug!(line = m.record_line, "empty line ends result set");
                        m.at_boundary = true;
                        return Ok(false);
                    }
                }
            }
            m.fresh_section = false;
            self.reconcile()?;
            return Ok(true);
        }
    }

    /// Drive the machine until a record completes or input runs out.
    fn scan_physical(&mut self) -> Result<Scanned> {
        loop {
            if self.source.is_exhausted() {
                self.machine.builder.materialize(self.source.buffer());
                if !self.source.refill()? {
                    let position = self.source.position();
                    self.machine.record_end = self.machine.location(position);
                    return self.machine.finish_input(position);
                }
            }
            let (consumed, signal) = self.machine.step(
                self.source.buffer(),
                self.source.offset(),
                self.source.position(),
            )?;
            self.source.advance(consumed);
            match signal {
                Signal::Continue => {}
                Signal::Record { cr } | Signal::LineSkipped { cr } => {
                    // The newline just consumed is one byte wide
                    let newline_at = self.source.position().saturating_sub(1);
                    self.machine.record_end = self.machine.location(newline_at);
                    if cr && self.source.peek()? == Some('\n') {
                        self.source.advance(1);
                    }
                    self.machine.line += 1;
                    self.machine.line_start = self.source.position();
                    if let Signal::Record { .. } = signal {
                        return Ok(Scanned::Record);
                    }
                    self.machine.record_line = self.machine.line;
                }
            }
        }
    }

    /// Apply the canonical field count to the record in the builder.
    fn reconcile(&mut self) -> Result<()> {
        let m = &mut self.machine;
        let found = m.builder.len();
        let Some(expected) = m.field_count else {
            debug!(field_count = found, line = m.record_line, "canonical field count established");
            m.field_count = Some(found);
            return Ok(());
        };
        if found < expected {
            match m.behavior.missing_field {
                MissingFieldAction::ParseError => {
                    return Err(CsvError::MissingField {
                        context: m.record_context(self.source.buffer()),
                        location: m.record_end,
                        field_index: found,
                        expected,
                        found,
                    });
                }
                MissingFieldAction::ReplaceByEmpty => m.builder.pad(expected, FieldRef::EMPTY),
                MissingFieldAction::ReplaceByNull => m.builder.pad(expected, FieldRef::NULL),
            }
        } else if found > expected {
            return Err(CsvError::MalformedInput {
                message: format!("record has {found} fields, expected {expected}"),
                context: m.record_context(self.source.buffer()),
                location: m.record_end,
                field_index: expected,
            });
        }
        Ok(())
    }
}

impl Machine {
    /// Process the start of `buffer[offset..]` according to the current state.
    /// Returns the number of bytes consumed and what happened.
    fn step(&mut self, buffer: &str, offset: usize, position: u64) -> Result<(usize, Signal)> {
        let span = &buffer[offset..];
        let Some(c) = span.chars().next() else {
            return Ok((0, Signal::Continue));
        };
        let p = self.punct;
        let trimming = self.behavior.trimming;

        match self.state {
            State::BeginningOfLine => {
                if is_newline(c) {
                    return Ok((1, Signal::Record { cr: c == '\r' }));
                }
                if Some(c) == p.comment {
                    self.state = State::InComment;
                    return Ok((c.len_utf8(), Signal::Continue));
                }
                // Quote, delimiter, whitespace and plain text are handled
                // exactly as right after a delimiter
                self.state = State::OutsideField;
                Ok((0, Signal::Continue))
            }

            State::InComment | State::ParseError => match find_newline(span) {
                Some(i) => {
                    if self.state == State::ParseError {
                        self.builder.clear();
                    }
                    self.state = State::BeginningOfLine;
                    let cr = span.as_bytes()[i] == b'\r';
                    Ok((i + 1, Signal::LineSkipped { cr }))
                }
                None => Ok((span.len(), Signal::Continue)),
            },

            State::InsideField => match find_field_end(span, p.delimiter) {
                Some(i) => {
                    self.builder.append_run(buffer, offset, offset + i);
                    self.builder.end_field(buffer, trimming);
                    let end = span[i..].chars().next().unwrap_or(p.delimiter);
                    if end == p.delimiter {
                        self.state = State::OutsideField;
                        Ok((i + end.len_utf8(), Signal::Continue))
                    } else {
                        self.state = State::BeginningOfLine;
                        Ok((i + 1, Signal::Record { cr: end == '\r' }))
                    }
                }
                None => {
                    self.builder.append_run(buffer, offset, buffer.len());
                    Ok((span.len(), Signal::Continue))
                }
            },

            State::OutsideField => {
                if is_whitespace(c, p.delimiter) {
                    // Belongs to the next field only if it turns out unquoted
                    let n = whitespace_run(span, p.delimiter);
                    self.builder.append_run(buffer, offset, offset + n);
                    return Ok((n, Signal::Continue));
                }
                if Some(c) == p.quote {
                    self.builder.discard_current();
                    self.builder.begin_quoted();
                    self.after_cr = false;
                    self.state = State::InsideQuotedField;
                    return Ok((c.len_utf8(), Signal::Continue));
                }
                if c == p.delimiter {
                    self.builder.end_field(buffer, trimming);
                    return Ok((c.len_utf8(), Signal::Continue));
                }
                if is_newline(c) {
                    self.builder.end_field(buffer, trimming);
                    self.state = State::BeginningOfLine;
                    return Ok((1, Signal::Record { cr: c == '\r' }));
                }
                self.state = State::InsideField;
                Ok((0, Signal::Continue))
            }

            State::InsideQuotedField => {
                let Some(quote) = p.quote else {
                    self.state = State::InsideField;
                    return Ok((0, Signal::Continue));
                };
                match find_quote_or_escape(span, quote, p.escape) {
                    Some(i) => {
                        self.builder.append_run(buffer, offset, offset + i);
                        self.note_line_breaks(&span[..i], position);
                        self.after_cr = false;
                        let found = span[i..].chars().next().unwrap_or(quote);
                        self.state = if found == quote {
                            State::AfterSecondQuote
                        } else {
                            State::Escaped
                        };
                        Ok((i + found.len_utf8(), Signal::Continue))
                    }
                    None => {
                        self.builder.append_run(buffer, offset, buffer.len());
                        self.note_line_breaks(span, position);
                        Ok((span.len(), Signal::Continue))
                    }
                }
            }

            State::Escaped => {
                self.builder.push_char(buffer, c);
                self.note_line_breaks(&span[..c.len_utf8()], position);
                self.state = State::InsideQuotedField;
                Ok((c.len_utf8(), Signal::Continue))
            }

            State::AfterSecondQuote => {
                if c == p.delimiter {
                    self.builder.end_field(buffer, trimming);
                    self.state = State::OutsideField;
                    return Ok((c.len_utf8(), Signal::Continue));
                }
                if is_newline(c) {
                    self.builder.end_field(buffer, trimming);
                    self.state = State::BeginningOfLine;
                    return Ok((1, Signal::Record { cr: c == '\r' }));
                }
                if Some(c) == p.quote && !self.builder.has_trailing() {
                    // Doubled quote: an embedded quote character
                    self.builder.push_char(buffer, c);
                    self.state = State::InsideQuotedField;
                    return Ok((c.len_utf8(), Signal::Continue));
                }
                if is_whitespace(c, p.delimiter) {
                    let n = whitespace_run(span, p.delimiter);
                    self.builder.push_trailing(&span[..n]);
                    return Ok((n, Signal::Continue));
                }
                self.stray_quote(buffer, span, position)
            }
        }
    }

    /// A quote inside quoted content was not escaped.
    fn stray_quote(&mut self, buffer: &str, span: &str, position: u64) -> Result<(usize, Signal)> {
        let quote = self.punct.quote.unwrap_or('"');
        match self.behavior.quotes_inside_quoted_field {
            QuotesInsideQuotedFieldAction::Ignore => {
                self.builder.restore_stray_quote(buffer, quote);
                self.state = State::InsideQuotedField;
                Ok((0, Signal::Continue))
            }
            QuotesInsideQuotedFieldAction::AdvanceToNextLine => {
                warn!(
                    line = self.line,
                    field = self.builder.len(),
                    "quote inside quoted field, discarding record"
                );
                self.state = State::ParseError;
                Ok((0, Signal::Continue))
            }
            QuotesInsideQuotedFieldAction::ThrowException => {
                let mut context = String::from(self.builder.current_text(buffer));
                context.push(quote);
                context.extend(span.chars().take(CONTEXT_LEN));
                let err = CsvError::MalformedInput {
                    message: "unescaped quote inside quoted field".to_string(),
                    context,
                    location: self.location(position),
                    field_index: self.builder.len(),
                };
                // A caller that recovers from the error resumes at the next line
                self.state = State::ParseError;
                Err(err)
            }
        }
    }

    /// Input ended; close out whatever the current state holds.
    fn finish_input(&mut self, position: u64) -> Result<Scanned> {
        let trimming = self.behavior.trimming;
        let state = std::mem::replace(&mut self.state, State::BeginningOfLine);
        match state {
            State::BeginningOfLine | State::InComment | State::ParseError => {
                self.builder.clear();
                Ok(Scanned::EndOfInput)
            }
            State::InsideField | State::OutsideField | State::AfterSecondQuote => {
                self.builder.end_field("", trimming);
                Ok(Scanned::Record)
            }
            State::InsideQuotedField | State::Escaped => {
                match self.behavior.quotes_inside_quoted_field {
                    QuotesInsideQuotedFieldAction::Ignore => {
                        self.builder.end_field("", trimming);
                        Ok(Scanned::Record)
                    }
                    QuotesInsideQuotedFieldAction::AdvanceToNextLine => {
                        warn!(line = self.line, "unterminated quoted field at end of input, discarding record");
                        self.builder.clear();
                        Ok(Scanned::EndOfInput)
                    }
                    QuotesInsideQuotedFieldAction::ThrowException => Err(CsvError::MalformedInput {
                        message: "unterminated quoted field at end of input".to_string(),
                        context: self.builder.current_text("").chars().take(CONTEXT_LEN).collect(),
                        location: self.location(position),
                        field_index: self.builder.len(),
                    }),
                }
            }
        }
    }

    /// Track physical lines crossed inside quoted content.
    fn note_line_breaks(&mut self, consumed: &str, position: u64) {
        if consumed.is_empty() {
            return;
        }
        let (breaks, last_end) = count_line_breaks(consumed, self.after_cr);
        self.line += breaks;
        if let Some(end) = last_end {
            self.line_start = position + end as u64;
        }
        self.after_cr = consumed.ends_with('\r');
    }

    fn location(&self, position: u64) -> Location {
        Location {
            line: self.line,
            column: position.saturating_sub(self.line_start) + 1,
        }
    }

    fn record_context(&self, buffer: &str) -> String {
        self.builder
            .joined(buffer, self.punct.delimiter)
            .chars()
            .take(CONTEXT_LEN)
            .collect()
    }
}
