//! Push parser: a stack of contexts, each with a cycle of expected tokens,
//! dispatching to a [`Listener`].

use std::error::Error as StdError;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use tracing::trace;

use crate::error::ParseError;
use crate::input::ParserInput;
use crate::lexer::{Lexer, Number, Token};

pub type ListenerError = Box<dyn StdError + Send + Sync + 'static>;

/// Receives parse events in document order. An error from any callback
/// aborts the parse.
pub trait Listener {
    fn object_start(&mut self) -> Result<(), ListenerError> {
        Ok(())
    }

    fn object_end(&mut self) -> Result<(), ListenerError> {
        Ok(())
    }

    fn array_start(&mut self) -> Result<(), ListenerError> {
        Ok(())
    }

    fn array_end(&mut self) -> Result<(), ListenerError> {
        Ok(())
    }

    fn property(&mut self, _name: &str) -> Result<(), ListenerError> {
        Ok(())
    }

    fn string_value(&mut self, _value: &str) -> Result<(), ListenerError> {
        Ok(())
    }

    fn number_value(&mut self, _value: &Number) -> Result<(), ListenerError> {
        Ok(())
    }

    fn boolean_value(&mut self, _value: bool) -> Result<(), ListenerError> {
        Ok(())
    }

    fn null_value(&mut self) -> Result<(), ListenerError> {
        Ok(())
    }
}

impl<L: Listener + ?Sized> Listener for &mut L {
    fn object_start(&mut self) -> Result<(), ListenerError> {
        (**self).object_start()
    }

    fn object_end(&mut self) -> Result<(), ListenerError> {
        (**self).object_end()
    }

    fn array_start(&mut self) -> Result<(), ListenerError> {
        (**self).array_start()
    }

    fn array_end(&mut self) -> Result<(), ListenerError> {
        (**self).array_end()
    }

    fn property(&mut self, name: &str) -> Result<(), ListenerError> {
        (**self).property(name)
    }

    fn string_value(&mut self, value: &str) -> Result<(), ListenerError> {
        (**self).string_value(value)
    }

    fn number_value(&mut self, value: &Number) -> Result<(), ListenerError> {
        (**self).number_value(value)
    }

    fn boolean_value(&mut self, value: bool) -> Result<(), ListenerError> {
        (**self).boolean_value(value)
    }

    fn null_value(&mut self) -> Result<(), ListenerError> {
        (**self).null_value()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Context {
    Object,
    Array,
    Terminal,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Slot {
    KeyOrObjectEnd,
    Colon,
    ObjectValue,
    CommaOrObjectEnd,
    ArrayValueOrEnd,
    CommaOrArrayEnd,
    End,
}

const OBJECT_CYCLE: &[Slot] = &[
    Slot::KeyOrObjectEnd,
    Slot::Colon,
    Slot::ObjectValue,
    Slot::CommaOrObjectEnd,
];
const ARRAY_CYCLE: &[Slot] = &[Slot::ArrayValueOrEnd, Slot::CommaOrArrayEnd];
const TERMINAL_CYCLE: &[Slot] = &[Slot::End];

impl Context {
    fn cycle(self) -> &'static [Slot] {
        match self {
            Context::Object => OBJECT_CYCLE,
            Context::Array => ARRAY_CYCLE,
            Context::Terminal => TERMINAL_CYCLE,
        }
    }
}

#[derive(Debug)]
struct Frame {
    context: Context,
    slot: usize,
}

impl Frame {
    fn new(context: Context) -> Self {
        Self { context, slot: 0 }
    }

    fn expected(&self) -> Slot {
        self.context.cycle()[self.slot]
    }

    /// Checks `token` against the current slot and emits scalar callbacks.
    /// Structural pushes and pops are left to the caller.
    fn accept<L: Listener>(&mut self, token: &Token, listener: &mut L) -> Result<bool, ListenerError> {
        let accepted = match (self.expected(), token) {
            (Slot::KeyOrObjectEnd, Token::String(name) | Token::Symbol(name)) => {
                listener.property(name)?;
                true
            }
            (Slot::KeyOrObjectEnd, Token::ObjEnd)
            | (Slot::Colon, Token::Colon)
            | (Slot::ArrayValueOrEnd, Token::ArrEnd)
            | (Slot::CommaOrObjectEnd, Token::Comma | Token::ObjEnd)
            | (Slot::CommaOrArrayEnd, Token::Comma | Token::ArrEnd)
            | (Slot::End, Token::Eof) => true,
            (Slot::ObjectValue | Slot::ArrayValueOrEnd, value) => dispatch_value(value, listener)?,
            _ => false,
        };
        if accepted {
            self.slot = (self.slot + 1) % self.context.cycle().len();
        }
        Ok(accepted)
    }
}

fn dispatch_value<L: Listener>(token: &Token, listener: &mut L) -> Result<bool, ListenerError> {
    match token {
        Token::ObjStart | Token::ArrStart => {}
        Token::String(value) => listener.string_value(value)?,
        Token::Number(value) => listener.number_value(value)?,
        Token::True => listener.boolean_value(true)?,
        Token::False => listener.boolean_value(false)?,
        Token::Null => listener.null_value()?,
        _ => return Ok(false),
    }
    Ok(true)
}

pub struct JsonParser<R, L> {
    lexer: Lexer<R>,
    listener: L,
    stack: Vec<Frame>,
}

impl<R: BufRead, L: Listener> JsonParser<R, L> {
    pub fn new(reader: R, listener: L) -> Self {
        Self::from_input(ParserInput::new(reader), listener)
    }

    /// Like [`Self::new`], with `name` as the source in error positions.
    pub fn with_name(reader: R, name: impl Into<String>, listener: L) -> Self {
        Self::from_input(ParserInput::with_name(reader, name), listener)
    }

    pub fn from_input(input: ParserInput<R>, listener: L) -> Self {
        Self {
            lexer: Lexer::new(input),
            listener,
            stack: Vec::new(),
        }
    }

    /// Reads the whole document, dispatching callbacks as tokens arrive.
    pub fn parse(&mut self) -> Result<(), ParseError> {
        loop {
            let token = self.lexer.next_token()?;
            trace!(token = %token, position = %self.lexer.position(), "token");
            self.step(&token)?;
            if token == Token::Eof {
                return Ok(());
            }
        }
    }

    fn step(&mut self, token: &Token) -> Result<(), ParseError> {
        let accepted = match self.stack.last_mut() {
            None => matches!(token, Token::ObjStart | Token::ArrStart),
            Some(top) => top
                .accept(token, &mut self.listener)
                .map_err(|err| callback_failed(&self.lexer, err))?,
        };
        if !accepted {
            return Err(ParseError::new(
                self.lexer.position(),
                format!("unexpected token {token}"),
            ));
        }

        let dispatched = match token {
            Token::ObjStart => {
                self.stack.push(Frame::new(Context::Object));
                self.listener.object_start()
            }
            Token::ArrStart => {
                self.stack.push(Frame::new(Context::Array));
                self.listener.array_start()
            }
            Token::ObjEnd => {
                self.pop();
                self.listener.object_end()
            }
            Token::ArrEnd => {
                self.pop();
                self.listener.array_end()
            }
            _ => Ok(()),
        };
        dispatched.map_err(|err| callback_failed(&self.lexer, err))
    }

    fn pop(&mut self) {
        self.stack.pop();
        if self.stack.is_empty() {
            self.stack.push(Frame::new(Context::Terminal));
        }
    }

    pub fn listener(&self) -> &L {
        &self.listener
    }

    pub fn into_listener(self) -> L {
        self.listener
    }
}

fn callback_failed<R: BufRead>(lexer: &Lexer<R>, err: ListenerError) -> ParseError {
    ParseError::with_source(lexer.position(), "listener failed", err)
}

/// Parses `text`, reporting positions against `{input}`.
pub fn parse_str<L: Listener + ?Sized>(text: &str, listener: &mut L) -> Result<(), ParseError> {
    JsonParser::new(text.as_bytes(), listener).parse()
}

/// Parses the file at `path`, reporting positions against the path.
pub fn parse_file<L: Listener + ?Sized>(
    path: impl AsRef<Path>,
    listener: &mut L,
) -> Result<(), ParseError> {
    let path = path.as_ref();
    let name = path.display().to_string();
    let file = File::open(path)
        .map_err(|err| ParseError::with_source(format!("{name}:1:0"), "cannot open file", err))?;
    JsonParser::with_name(BufReader::new(file), name, listener).parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        events: Vec<String>,
    }

    impl Listener for Recorder {
        fn object_start(&mut self) -> Result<(), ListenerError> {
            self.events.push("{".into());
            Ok(())
        }

        fn object_end(&mut self) -> Result<(), ListenerError> {
            self.events.push("}".into());
            Ok(())
        }

        fn array_start(&mut self) -> Result<(), ListenerError> {
            self.events.push("[".into());
            Ok(())
        }

        fn array_end(&mut self) -> Result<(), ListenerError> {
            self.events.push("]".into());
            Ok(())
        }

        fn property(&mut self, name: &str) -> Result<(), ListenerError> {
            self.events.push(format!("key:{name}"));
            Ok(())
        }

        fn string_value(&mut self, value: &str) -> Result<(), ListenerError> {
            self.events.push(format!("str:{value}"));
            Ok(())
        }

        fn number_value(&mut self, value: &Number) -> Result<(), ListenerError> {
            self.events.push(format!("num:{value}"));
            Ok(())
        }

        fn boolean_value(&mut self, value: bool) -> Result<(), ListenerError> {
            self.events.push(format!("bool:{value}"));
            Ok(())
        }

        fn null_value(&mut self) -> Result<(), ListenerError> {
            self.events.push("null".into());
            Ok(())
        }
    }

    fn events(text: &str) -> Vec<String> {
        let mut recorder = Recorder::default();
        parse_str(text, &mut recorder).unwrap();
        recorder.events
    }

    fn failure(text: &str) -> ParseError {
        parse_str(text, &mut Recorder::default()).unwrap_err()
    }

    #[test]
    fn empty_containers() {
        assert_eq!(events("{}"), ["{", "}"]);
        assert_eq!(events("[]"), ["[", "]"]);
    }

    #[test]
    fn nested_document() {
        assert_eq!(
            events(r#"{"a":[1,2],b:{"c":null}}"#),
            ["{", "key:a", "[", "num:1", "num:2", "]", "key:b", "{", "key:c", "null", "}", "}"]
        );
    }

    #[test]
    fn mismatched_end() {
        let err = failure(r#"{"a":[1}"#);
        assert_eq!(err.message(), "unexpected token OBJ_END");
        assert_eq!(err.position(), "{input}:1:8");
    }

    #[test]
    fn content_after_document() {
        assert_eq!(failure("{} []").message(), "unexpected token ARR_START");
    }

    #[test]
    fn truncated_document() {
        assert_eq!(failure(r#"{"a":"#).message(), "unexpected token EOF");
    }

    #[test]
    fn document_must_start_with_container() {
        let err = failure("true");
        assert_eq!(err.message(), "unexpected token TRUE");
        assert_eq!(err.position(), "{input}:1:4");
    }

    #[test]
    fn listener_errors_abort() {
        struct Refuse;

        impl Listener for Refuse {
            fn null_value(&mut self) -> Result<(), ListenerError> {
                Err("no nulls".into())
            }
        }

        let err = parse_str("[1,null,2]", &mut Refuse).unwrap_err();
        assert_eq!(err.message(), "listener failed");
        assert_eq!(err.position(), "{input}:1:6");
        assert_eq!(
            StdError::source(&err).map(|s| s.to_string()),
            Some("no nulls".to_string())
        );
    }

    #[test]
    fn parser_owns_its_listener() {
        let mut parser = JsonParser::new(r#"["x"]"#.as_bytes(), Recorder::default());
        parser.parse().unwrap();
        assert_eq!(parser.listener().events.len(), 3);
        assert_eq!(parser.into_listener().events[1], "str:x");
    }
}
