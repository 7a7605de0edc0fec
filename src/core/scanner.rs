// Character classification and longest-match scans for the tokenizer.
//
// Scans use memchr when the punctuation is ASCII (the common case) and
// fall back to a char walk otherwise. All returned indexes are byte
// offsets into the scanned span and always land on char boundaries.

use memchr::{memchr, memchr2, memchr2_iter, memchr3};

#[inline]
pub fn is_newline(c: char) -> bool {
    c == '\n' || c == '\r'
}

/// Space or tab, unless it is the delimiter itself.
#[inline]
pub fn is_whitespace(c: char, delimiter: char) -> bool {
    (c == ' ' || c == '\t') && c != delimiter
}

/// Position of the next delimiter or newline.
#[inline]
pub fn find_field_end(span: &str, delimiter: char) -> Option<usize> {
    if delimiter.is_ascii() {
        memchr3(delimiter as u8, b'\n', b'\r', span.as_bytes())
    } else {
        span.find(|c: char| c == delimiter || is_newline(c))
    }
}

/// Position of the next quote or escape character.
#[inline]
pub fn find_quote_or_escape(span: &str, quote: char, escape: char) -> Option<usize> {
    match (quote.is_ascii(), escape.is_ascii()) {
        (true, true) if quote == escape => memchr(quote as u8, span.as_bytes()),
        (true, true) => memchr2(quote as u8, escape as u8, span.as_bytes()),
        _ => span.find(|c: char| c == quote || c == escape),
    }
}

#[inline]
pub fn find_newline(span: &str) -> Option<usize> {
    memchr2(b'\n', b'\r', span.as_bytes())
}

/// Byte length of the whitespace run at the start of `span`.
#[inline]
pub fn whitespace_run(span: &str, delimiter: char) -> usize {
    span.find(|c: char| !is_whitespace(c, delimiter))
        .unwrap_or(span.len())
}

/// Narrow `start..end` of `text` to exclude leading and trailing whitespace.
#[inline]
pub fn trim_range(text: &str, start: usize, end: usize) -> (usize, usize) {
    let field = &text[start..end];
    let leading = field.len() - field.trim_start().len();
    let trailing = field.len() - field.trim_end().len();
    if leading == field.len() {
        return (start, start);
    }
    (start + leading, end - trailing)
}

/// Line breaks in `text` (`\n`, `\r` or `\r\n`, each counted once) and the
/// offset just past the last one. `after_cr` means `text` directly follows a
/// `\r`, so a leading `\n` completes that break.
pub fn count_line_breaks(text: &str, after_cr: bool) -> (u64, Option<usize>) {
    let bytes = text.as_bytes();
    let mut count = 0;
    let mut last_end = None;
    for i in memchr2_iter(b'\n', b'\r', bytes) {
        let follows_cr = if i == 0 { after_cr } else { bytes[i - 1] == b'\r' };
        if !(bytes[i] == b'\n' && follows_cr) {
            count += 1;
        }
        last_end = Some(i + 1);
    }
    (count, last_end)
}
