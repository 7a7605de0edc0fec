// Buffered, chunked character source with single-character lookahead
//
// Key design:
// - Decodes UTF-8 from any `Read` into one reusable `String` chunk
// - Multi-byte sequences split across reads are carried to the next read
// - `refill` discards the chunk, so every range into `buffer()` dies there;
//   `peek` only ever appends, so ranges survive a lookahead

use std::io::{self, ErrorKind, Read};

use tracing::trace;

use crate::config::DEFAULT_BUFFER_SIZE;

pub struct CharSource<R> {
    reader: R,
    /// Decoded characters of the current chunk
    buf: String,
    /// Byte index of the first unconsumed character in `buf`
    pos: usize,
    /// Absolute stream offset of `buf[0]`
    base: u64,
    /// Bytes of an incomplete UTF-8 sequence left over from the last read
    pending: Vec<u8>,
    /// Scratch for raw reads
    raw: Vec<u8>,
    eof: bool,
}

impl<R: Read> CharSource<R> {
    pub fn new(reader: R) -> Self {
        Self::with_capacity(reader, DEFAULT_BUFFER_SIZE)
    }

    pub fn with_capacity(reader: R, chunk_size: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        CharSource {
            reader,
            buf: String::with_capacity(chunk_size + 4),
            pos: 0,
            base: 0,
            pending: Vec::with_capacity(4),
            raw: vec![0; chunk_size],
            eof: false,
        }
    }

    /// Buffered characters not consumed yet. Empty means a refill is due.
    #[inline]
    pub fn span(&self) -> &str {
        &self.buf[self.pos..]
    }

    /// Byte index of `span()` inside `buffer()`.
    #[inline]
    pub fn offset(&self) -> usize {
        self.pos
    }

    /// The whole current chunk, consumed part included.
    #[inline]
    pub fn buffer(&self) -> &str {
        &self.buf
    }

    #[inline]
    pub fn is_exhausted(&self) -> bool {
        self.pos >= self.buf.len()
    }

    /// Consume `n` bytes of the span. `n` must land on a char boundary.
    #[inline]
    pub fn advance(&mut self, n: usize) {
        debug_assert!(self.pos + n <= self.buf.len());
        self.pos += n;
        debug_assert!(self.buf.is_char_boundary(self.pos));
    }

    /// Absolute number of bytes consumed so far.
    #[inline]
    pub fn position(&self) -> u64 {
        self.base + self.pos as u64
    }

    /// Replace the chunk with the next one from the underlying reader.
    /// Returns `false` at end of input.
    pub fn refill(&mut self) -> io::Result<bool> {
        self.base += self.buf.len() as u64;
        self.buf.clear();
        self.pos = 0;
        let read = self.read_chunk()?;
        trace!(bytes = read, offset = self.base, "refilled character source");
        Ok(read > 0)
    }

    /// First unconsumed character, reading ahead when nothing is buffered.
    pub fn peek(&mut self) -> io::Result<Option<char>> {
        if self.is_exhausted() {
            self.read_chunk()?;
        }
        Ok(self.span().chars().next())
    }

    /// Decode the next run of input and append it to `buf`.
    fn read_chunk(&mut self) -> io::Result<usize> {
        let start = self.buf.len();
        while !self.eof && self.buf.len() == start {
            let n = match self.reader.read(&mut self.raw) {
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            if n == 0 {
                self.eof = true;
                if !self.pending.is_empty() {
                    return Err(io::Error::new(
                        ErrorKind::InvalidData,
                        "stream ended inside a UTF-8 sequence",
                    ));
                }
                break;
            }
            self.pending.extend_from_slice(&self.raw[..n]);
            self.decode_pending()?;
        }
        Ok(self.buf.len() - start)
    }

    fn decode_pending(&mut self) -> io::Result<()> {
        match std::str::from_utf8(&self.pending) {
            Ok(text) => {
                self.buf.push_str(text);
                self.pending.clear();
            }
            Err(e) => {
                if e.error_len().is_some() {
                    return Err(io::Error::new(ErrorKind::InvalidData, e));
                }
                // Incomplete trailing sequence: keep it for the next read
                let valid = e.valid_up_to();
                if let Ok(text) = std::str::from_utf8(&self.pending[..valid]) {
                    self.buf.push_str(text);
                }
                self.pending.drain(..valid);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn drain<R: Read>(source: &mut CharSource<R>) -> String {
        let mut out = String::new();
        loop {
            if source.is_exhausted() && !source.refill().unwrap() {
                break;
            }
            let span = source.span().to_string();
            source.advance(span.len());
            out.push_str(&span);
        }
        out
    }

    #[test]
    fn test_small_chunks_reassemble_input() {
        let mut source = CharSource::with_capacity(Cursor::new("a,b,c\n1,2,3\n"), 3);
        assert_eq!(drain(&mut source), "a,b,c\n1,2,3\n");
        assert_eq!(source.position(), 12);
    }

    #[test]
    fn test_multibyte_split_across_reads() {
        // "é" is two bytes; a 1-byte chunk forces a split
        let mut source = CharSource::with_capacity(Cursor::new("é;ü€"), 1);
        assert_eq!(drain(&mut source), "é;ü€");
    }

    #[test]
    fn test_peek_across_chunk_boundary_appends() {
        let mut source = CharSource::with_capacity(Cursor::new("ab\r\ncd"), 3);
        assert!(source.refill().unwrap());
        assert_eq!(source.span(), "ab\r");
        source.advance(3);
        let before = source.buffer().to_string();
        assert_eq!(source.peek().unwrap(), Some('\n'));
        // The consumed prefix is still addressable after a lookahead
        assert!(source.buffer().starts_with(&before));
        assert_eq!(source.span(), "\ncd");
    }

    #[test]
    fn test_peek_at_end_of_input() {
        let mut source = CharSource::new(Cursor::new("x"));
        assert!(source.refill().unwrap());
        source.advance(1);
        assert_eq!(source.peek().unwrap(), None);
        assert!(!source.refill().unwrap());
    }

    #[test]
    fn test_invalid_utf8_is_an_error() {
        let mut source = CharSource::new(Cursor::new(vec![b'a', 0xff, b'b']));
        let err = source.refill().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidData);
    }

    #[test]
    fn test_truncated_utf8_at_end_is_an_error() {
        let mut source = CharSource::new(Cursor::new(vec![b'a', 0xc3]));
        // "a" decodes, the dangling lead byte waits for more input
        assert!(source.refill().unwrap());
        source.advance(1);
        assert!(source.refill().is_err());
    }
}
