use std::io::Write;

use jot_json::{JsonParser, Listener, ListenerError, Number, parse_file, parse_str};

#[derive(Debug, PartialEq)]
enum Event {
    ObjectStart,
    ObjectEnd,
    ArrayStart,
    ArrayEnd,
    Property(String),
    Str(String),
    Num(String),
    Bool(bool),
    Null,
}

#[derive(Default)]
struct Events(Vec<Event>);

impl Listener for Events {
    fn object_start(&mut self) -> Result<(), ListenerError> {
        self.0.push(Event::ObjectStart);
        Ok(())
    }

    fn object_end(&mut self) -> Result<(), ListenerError> {
        self.0.push(Event::ObjectEnd);
        Ok(())
    }

    fn array_start(&mut self) -> Result<(), ListenerError> {
        self.0.push(Event::ArrayStart);
        Ok(())
    }

    fn array_end(&mut self) -> Result<(), ListenerError> {
        self.0.push(Event::ArrayEnd);
        Ok(())
    }

    fn property(&mut self, name: &str) -> Result<(), ListenerError> {
        self.0.push(Event::Property(name.to_string()));
        Ok(())
    }

    fn string_value(&mut self, value: &str) -> Result<(), ListenerError> {
        self.0.push(Event::Str(value.to_string()));
        Ok(())
    }

    fn number_value(&mut self, value: &Number) -> Result<(), ListenerError> {
        self.0.push(Event::Num(value.as_str().to_string()));
        Ok(())
    }

    fn boolean_value(&mut self, value: bool) -> Result<(), ListenerError> {
        self.0.push(Event::Bool(value));
        Ok(())
    }

    fn null_value(&mut self) -> Result<(), ListenerError> {
        self.0.push(Event::Null);
        Ok(())
    }
}

fn parse(text: &str) -> Vec<Event> {
    let mut events = Events::default();
    parse_str(text, &mut events).unwrap();
    events.0
}

#[test]
fn single_property_object() {
    assert_eq!(
        parse(r#"{"k":"v"}"#),
        vec![
            Event::ObjectStart,
            Event::Property("k".to_string()),
            Event::Str("v".to_string()),
            Event::ObjectEnd,
        ]
    );
}

#[test]
fn keyword_array() {
    assert_eq!(
        parse("[true,false,null]"),
        vec![
            Event::ArrayStart,
            Event::Bool(true),
            Event::Bool(false),
            Event::Null,
            Event::ArrayEnd,
        ]
    );
}

#[test]
fn nested_with_numbers_and_whitespace() {
    let text = "{\n  \"a\": [1, 2.5],\n  \"b\": {\"c\": \"\\u00e9\\ud83d\\ude00\"}\n}\n";
    assert_eq!(
        parse(text),
        vec![
            Event::ObjectStart,
            Event::Property("a".to_string()),
            Event::ArrayStart,
            Event::Num("1".to_string()),
            Event::Num("2.5".to_string()),
            Event::ArrayEnd,
            Event::Property("b".to_string()),
            Event::ObjectStart,
            Event::Property("c".to_string()),
            Event::Str("é😀".to_string()),
            Event::ObjectEnd,
            Event::ObjectEnd,
        ]
    );
}

#[test]
fn leading_whitespace_reports_first_position() {
    let err = parse_str("  {}", &mut Events::default()).unwrap_err();
    assert_eq!(err.position(), "{input}:1:1");
    assert_eq!(err.to_string(), "{input}:1:1: invalid JSON start: expected { or [");
}

#[test]
fn missing_colon_names_the_token() {
    let err = parse_str(r#"{"k" "v"}"#, &mut Events::default()).unwrap_err();
    assert_eq!(err.message(), "unexpected token STRING");
    assert_eq!(err.position(), "{input}:1:8");
}

#[test]
fn error_positions_span_lines() {
    let err = parse_str("[1,\n 2,\n :]", &mut Events::default()).unwrap_err();
    assert_eq!(err.to_string(), "{input}:3:2: unexpected token COLON");
}

#[test]
fn named_source_appears_in_errors() {
    let mut parser = JsonParser::with_name("[1 2]".as_bytes(), "numbers.json", Events::default());
    let err = parser.parse().unwrap_err();
    assert_eq!(err.position(), "numbers.json:1:4");
    assert_eq!(parser.listener().0, vec![Event::ArrayStart, Event::Num("1".to_string())]);
}

#[test]
fn parses_files() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, r#"{{"name":"jot","tags":["db","json"]}}"#).unwrap();

    let mut events = Events::default();
    parse_file(file.path(), &mut events).unwrap();
    assert_eq!(events.0.len(), 9);

    let missing = file.path().with_extension("missing");
    let err = parse_file(&missing, &mut events).unwrap_err();
    assert_eq!(err.message(), "cannot open file");
}
