//! Character input with one character of pushback and position tracking.

use std::io::{self, BufRead, ErrorKind};

pub const DEFAULT_NAME: &str = "{input}";

/// Decodes UTF-8 from a buffered reader one `char` at a time.
///
/// `line` and `column` describe the most recently consumed character. Lines
/// start at 1; the column is 0 before the first character of a line.
pub struct ParserInput<R> {
    reader: R,
    name: String,
    line: usize,
    column: usize,
    prev_line: usize,
    prev_column: usize,
    pushback: Option<char>,
    eof: bool,
}

impl<R: BufRead> ParserInput<R> {
    pub fn new(reader: R) -> Self {
        Self::with_name(reader, DEFAULT_NAME)
    }

    pub fn with_name(reader: R, name: impl Into<String>) -> Self {
        Self {
            reader,
            name: name.into(),
            line: 1,
            column: 0,
            prev_line: 1,
            prev_column: 0,
            pushback: None,
            eof: false,
        }
    }

    /// Next character, or `None` at end of input. Once `None` has been
    /// returned every later call returns `None` too.
    pub fn get_char(&mut self) -> io::Result<Option<char>> {
        let next = match self.pushback.take() {
            Some(c) => Some(c),
            None if self.eof => None,
            None => {
                let decoded = self.decode()?;
                self.eof = decoded.is_none();
                decoded
            }
        };
        if let Some(c) = next {
            self.prev_line = self.line;
            self.prev_column = self.column;
            if c == '\n' {
                self.line += 1;
                self.column = 0;
            } else {
                self.column += 1;
            }
        }
        Ok(next)
    }

    /// Pushes `c` back and restores the position from before it was read.
    /// Ungetting end of input does nothing.
    pub fn unget_char(&mut self, c: Option<char>) {
        if let Some(c) = c {
            self.pushback = Some(c);
            self.line = self.prev_line;
            self.column = self.prev_column;
        }
    }

    fn decode(&mut self) -> io::Result<Option<char>> {
        let mut bytes = [0u8; 4];
        let Some(lead) = self.read_byte()? else {
            return Ok(None);
        };
        bytes[0] = lead;
        let width = match lead {
            0x00..=0x7f => 1,
            0xc2..=0xdf => 2,
            0xe0..=0xef => 3,
            0xf0..=0xf4 => 4,
            _ => return Err(invalid_utf8()),
        };
        for slot in &mut bytes[1..width] {
            *slot = self.read_byte()?.ok_or_else(invalid_utf8)?;
        }
        std::str::from_utf8(&bytes[..width])
            .ok()
            .and_then(|s| s.chars().next())
            .map(Some)
            .ok_or_else(invalid_utf8)
    }

    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        loop {
            let byte = match self.reader.fill_buf() {
                Ok(buf) => buf.first().copied(),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            };
            if byte.is_some() {
                self.reader.consume(1);
            }
            return Ok(byte);
        }
    }
}

impl<R> ParserInput<R> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn line(&self) -> usize {
        self.line
    }

    pub fn column(&self) -> usize {
        self.column
    }

    /// `name:line:column`
    pub fn position(&self) -> String {
        format!("{}:{}:{}", self.name, self.line, self.column)
    }
}

fn invalid_utf8() -> io::Error {
    io::Error::new(ErrorKind::InvalidData, "stream did not contain valid UTF-8")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chars(input: &mut ParserInput<&[u8]>) -> Vec<(char, usize, usize)> {
        let mut out = Vec::new();
        while let Some(c) = input.get_char().unwrap() {
            out.push((c, input.line(), input.column()));
        }
        out
    }

    #[test]
    fn tracks_lines_and_columns() {
        let mut input = ParserInput::new("ab\nc".as_bytes());
        assert_eq!(input.position(), "{input}:1:0");
        assert_eq!(
            chars(&mut input),
            vec![('a', 1, 1), ('b', 1, 2), ('\n', 2, 0), ('c', 2, 1)]
        );
    }

    #[test]
    fn unget_restores_position() {
        let mut input = ParserInput::with_name("x\ny".as_bytes(), "doc.json");
        input.get_char().unwrap();
        let newline = input.get_char().unwrap();
        assert_eq!((input.line(), input.column()), (2, 0));
        input.unget_char(newline);
        assert_eq!(input.position(), "doc.json:1:1");
        assert_eq!(input.get_char().unwrap(), Some('\n'));
        assert_eq!(input.get_char().unwrap(), Some('y'));
    }

    #[test]
    fn end_of_input_is_sticky() {
        let mut input = ParserInput::new("z".as_bytes());
        assert_eq!(input.get_char().unwrap(), Some('z'));
        assert_eq!(input.get_char().unwrap(), None);
        input.unget_char(None);
        assert_eq!(input.get_char().unwrap(), None);
        assert_eq!(input.column(), 1);
    }

    #[test]
    fn decodes_multibyte() {
        let mut input = ParserInput::new("é€😀".as_bytes());
        let decoded: String = chars(&mut input).into_iter().map(|(c, _, _)| c).collect();
        assert_eq!(decoded, "é€😀");
        assert_eq!(input.column(), 3);
    }

    #[test]
    fn rejects_invalid_utf8() {
        let bytes: &[u8] = &[b'a', 0xff];
        let mut input = ParserInput::new(bytes);
        assert_eq!(input.get_char().unwrap(), Some('a'));
        let err = input.get_char().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidData);

        let truncated: &[u8] = &[0xe2, 0x82];
        let err = ParserInput::new(truncated).get_char().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidData);
    }
}
