//! Tokenizer over [`ParserInput`].

use std::fmt;
use std::io::BufRead;

use crate::error::ParseError;
use crate::input::ParserInput;

#[derive(Clone, Debug, PartialEq)]
pub enum Token {
    Eof,
    ObjStart,
    ObjEnd,
    ArrStart,
    ArrEnd,
    Colon,
    Comma,
    String(String),
    Number(Number),
    True,
    False,
    Null,
    /// A bare identifier that is not a keyword.
    Symbol(String),
}

impl Token {
    pub fn kind(&self) -> &'static str {
        match self {
            Token::Eof => "EOF",
            Token::ObjStart => "OBJ_START",
            Token::ObjEnd => "OBJ_END",
            Token::ArrStart => "ARR_START",
            Token::ArrEnd => "ARR_END",
            Token::Colon => "COLON",
            Token::Comma => "COMMA",
            Token::String(_) => "STRING",
            Token::Number(_) => "NUMBER",
            Token::True => "TRUE",
            Token::False => "FALSE",
            Token::Null => "NULL",
            Token::Symbol(_) => "SYMBOL",
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind())
    }
}

/// A numeric literal, kept as written.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Number {
    text: String,
}

impl Number {
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// The value as an integer, if it is one and fits.
    pub fn as_i64(&self) -> Option<i64> {
        self.text.parse().ok()
    }

    pub fn as_f64(&self) -> f64 {
        self.text.parse().unwrap_or(f64::NAN)
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

pub struct Lexer<R> {
    input: ParserInput<R>,
    started: bool,
}

impl<R: BufRead> Lexer<R> {
    pub fn new(input: ParserInput<R>) -> Self {
        Self {
            input,
            started: false,
        }
    }

    pub fn position(&self) -> String {
        self.input.position()
    }

    pub fn into_input(self) -> ParserInput<R> {
        self.input
    }

    pub fn next_token(&mut self) -> Result<Token, ParseError> {
        let c = loop {
            match self.read()? {
                Some(c) if is_json_whitespace(c) => {
                    if !self.started {
                        return Err(self.error("invalid JSON start: expected { or ["));
                    }
                }
                other => break other,
            }
        };
        self.started = true;

        let token = match c {
            None => Token::Eof,
            Some('{') => Token::ObjStart,
            Some('}') => Token::ObjEnd,
            Some('[') => Token::ArrStart,
            Some(']') => Token::ArrEnd,
            Some(':') => Token::Colon,
            Some(',') => Token::Comma,
            Some('"') => Token::String(self.read_string()?),
            Some(c @ ('-' | '0'..='9')) => Token::Number(self.read_number(c)?),
            Some(c) if is_identifier_start(c) => self.read_identifier(c)?,
            Some(c) => return Err(self.error(format!("unexpected character '{c}'"))),
        };
        Ok(token)
    }

    fn read(&mut self) -> Result<Option<char>, ParseError> {
        self.input
            .get_char()
            .map_err(|err| ParseError::with_source(self.input.position(), "read failed", err))
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(self.input.position(), message)
    }

    fn read_string(&mut self) -> Result<String, ParseError> {
        let mut text = String::new();
        loop {
            match self.read()? {
                None => return Err(self.error("unterminated string")),
                Some('"') => return Ok(text),
                Some('\\') => {
                    let escaped = self.read_escape()?;
                    text.push(escaped);
                }
                Some(c) => text.push(c),
            }
        }
    }

    fn read_escape(&mut self) -> Result<char, ParseError> {
        match self.read()? {
            Some('"') => Ok('"'),
            Some('\\') => Ok('\\'),
            Some('/') => Ok('/'),
            Some('b') => Ok('\u{8}'),
            Some('f') => Ok('\u{c}'),
            Some('n') => Ok('\n'),
            Some('r') => Ok('\r'),
            Some('t') => Ok('\t'),
            Some('u') => self.read_unicode_escape(),
            Some(c) => Err(self.error(format!("invalid escape '\\{c}'"))),
            None => Err(self.error("unterminated string")),
        }
    }

    fn read_unicode_escape(&mut self) -> Result<char, ParseError> {
        let high = self.read_hex4()?;
        let code = match high {
            0xd800..=0xdbff => {
                if self.read()? != Some('\\') || self.read()? != Some('u') {
                    return Err(self.error("unpaired surrogate in \\u escape"));
                }
                let low = self.read_hex4()?;
                if !(0xdc00..=0xdfff).contains(&low) {
                    return Err(self.error("invalid low surrogate in \\u escape"));
                }
                0x10000 + ((high - 0xd800) << 10) + (low - 0xdc00)
            }
            0xdc00..=0xdfff => return Err(self.error("unpaired surrogate in \\u escape")),
            _ => high,
        };
        char::from_u32(code).ok_or_else(|| self.error("invalid \\u escape"))
    }

    fn read_hex4(&mut self) -> Result<u32, ParseError> {
        let mut value = 0;
        for _ in 0..4 {
            let digit = self
                .read()?
                .and_then(|c| c.to_digit(16))
                .ok_or_else(|| self.error("invalid \\u escape"))?;
            value = value * 16 + digit;
        }
        Ok(value)
    }

    /// `-?(0|[1-9][0-9]*)(\.[0-9]+)?([eE][+-]?[0-9]+)?`
    fn read_number(&mut self, first: char) -> Result<Number, ParseError> {
        let mut text = String::new();
        let mut c = Some(first);
        if c == Some('-') {
            text.push('-');
            c = self.read()?;
        }
        c = match c {
            Some('0') => {
                text.push('0');
                self.read()?
            }
            Some(d @ '1'..='9') => {
                text.push(d);
                self.digits(&mut text)?
            }
            _ => return Err(self.error("malformed number")),
        };
        if c == Some('.') {
            text.push('.');
            c = self.required_digits(&mut text)?;
        }
        if let Some(e @ ('e' | 'E')) = c {
            text.push(e);
            c = self.read()?;
            if let Some(sign @ ('+' | '-')) = c {
                text.push(sign);
            } else {
                self.input.unget_char(c);
            }
            c = self.required_digits(&mut text)?;
        }
        self.input.unget_char(c);
        Ok(Number { text })
    }

    /// Appends a run of digits; returns the character that ended it.
    fn digits(&mut self, text: &mut String) -> Result<Option<char>, ParseError> {
        loop {
            match self.read()? {
                Some(d) if d.is_ascii_digit() => text.push(d),
                other => return Ok(other),
            }
        }
    }

    fn required_digits(&mut self, text: &mut String) -> Result<Option<char>, ParseError> {
        match self.read()? {
            Some(d) if d.is_ascii_digit() => {
                text.push(d);
                self.digits(text)
            }
            _ => Err(self.error("malformed number")),
        }
    }

    fn read_identifier(&mut self, first: char) -> Result<Token, ParseError> {
        let mut text = String::from(first);
        loop {
            match self.read()? {
                Some(c) if is_identifier_part(c) => text.push(c),
                other => {
                    self.input.unget_char(other);
                    break;
                }
            }
        }
        Ok(match text.as_str() {
            "true" => Token::True,
            "false" => Token::False,
            "null" => Token::Null,
            _ => Token::Symbol(text),
        })
    }
}

fn is_json_whitespace(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '\r')
}

fn is_identifier_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_identifier_part(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lexer(text: &str) -> Lexer<&[u8]> {
        Lexer::new(ParserInput::new(text.as_bytes()))
    }

    fn tokens(text: &str) -> Vec<Token> {
        let mut lexer = lexer(text);
        let mut out = Vec::new();
        loop {
            let token = lexer.next_token().unwrap();
            if token == Token::Eof {
                return out;
            }
            out.push(token);
        }
    }

    fn number(text: &str) -> Token {
        Token::Number(Number {
            text: text.to_string(),
        })
    }

    fn lex_error(text: &str) -> ParseError {
        let mut lexer = lexer(text);
        loop {
            match lexer.next_token() {
                Ok(Token::Eof) => panic!("{text:?} lexed without error"),
                Ok(_) => {}
                Err(err) => return err,
            }
        }
    }

    #[test]
    fn structural_and_keywords() {
        assert_eq!(
            tokens("{ a_1 : [true,false , null] }"),
            vec![
                Token::ObjStart,
                Token::Symbol("a_1".to_string()),
                Token::Colon,
                Token::ArrStart,
                Token::True,
                Token::Comma,
                Token::False,
                Token::Comma,
                Token::Null,
                Token::ArrEnd,
                Token::ObjEnd,
            ]
        );
    }

    #[test]
    fn leading_whitespace_is_rejected() {
        let err = lex_error("  {}");
        assert_eq!(err.position(), "{input}:1:1");
        assert_eq!(err.message(), "invalid JSON start: expected { or [");
    }

    #[test]
    fn string_escapes() {
        assert_eq!(
            tokens(r#"["a\"b\\c\/d\b\f\n\r\t"]"#)[1],
            Token::String("a\"b\\c/d\u{8}\u{c}\n\r\t".to_string())
        );
        assert_eq!(
            tokens(r#"["é€😀"]"#)[1],
            Token::String("é€😀".to_string())
        );
    }

    #[test]
    fn bad_strings() {
        assert_eq!(lex_error(r#"["abc"#).message(), "unterminated string");
        assert_eq!(lex_error(r#"["\q"]"#).message(), "invalid escape '\\q'");
        assert_eq!(lex_error(r#"["\u12"]"#).message(), "invalid \\u escape");
        assert!(lex_error(r#"["\ud83d"]"#).message().contains("surrogate"));
        assert!(lex_error(r#"["\ude00"]"#).message().contains("surrogate"));
    }

    #[test]
    fn numbers() {
        assert_eq!(
            tokens("[0,-12,3.25,1e9,-4.5E-3,6e+2]"),
            vec![
                Token::ArrStart,
                number("0"),
                Token::Comma,
                number("-12"),
                Token::Comma,
                number("3.25"),
                Token::Comma,
                number("1e9"),
                Token::Comma,
                number("-4.5E-3"),
                Token::Comma,
                number("6e+2"),
                Token::ArrEnd,
            ]
        );
        let Token::Number(n) = number("-12") else {
            unreachable!()
        };
        assert_eq!(n.as_i64(), Some(-12));
        assert_eq!(n.as_f64(), -12.0);
        let Token::Number(n) = number("3.25") else {
            unreachable!()
        };
        assert_eq!(n.as_i64(), None);
        assert_eq!(n.as_f64(), 3.25);
    }

    #[test]
    fn malformed_numbers() {
        for text in ["[-]", "[1.]", "[1.x]", "[2e]", "[3e+]"] {
            assert_eq!(lex_error(text).message(), "malformed number", "{text}");
        }
    }

    #[test]
    fn number_position_is_its_last_digit() {
        let mut lexer = lexer("[123]");
        lexer.next_token().unwrap();
        lexer.next_token().unwrap();
        assert_eq!(lexer.position(), "{input}:1:4");
    }

    #[test]
    fn stray_character() {
        assert_eq!(lex_error("[#]").message(), "unexpected character '#'");
    }

    #[test]
    fn only_json_whitespace_separates_tokens() {
        assert_eq!(tokens("[ \t\r\n1]"), vec![Token::ArrStart, number("1"), Token::ArrEnd]);
        assert_eq!(lex_error("[\u{a0}1]").message(), "unexpected character '\u{a0}'");
        assert_eq!(lex_error("[1\u{2028}]").message(), "unexpected character '\u{2028}'");
    }

    #[test]
    fn kind_names() {
        assert_eq!(Token::String(String::new()).to_string(), "STRING");
        assert_eq!(Token::Colon.to_string(), "COLON");
        assert_eq!(Token::Eof.to_string(), "EOF");
    }
}
