//! Moves field values between entities and rows, element trees, JSON
//! objects and CSV sinks.

use rusqlite::Row;
use rusqlite::types::ValueRef;
use serde_json::{Map, Value as JsonValue};

use crate::descriptor::{FieldInfo, ScalarKind, describe};
use crate::entity::Entity;
use crate::error::MapperError;
use crate::value::{Value, instant_from_millis};

/// Tree-structured input with attributes and child elements.
pub trait ElementSource {
    /// Attribute value, or the empty string when the attribute is absent.
    fn attribute(&self, name: &str) -> String;

    /// Concatenated text of every child element called `name`.
    fn child_text(&self, name: &str) -> String;
}

/// Output side of a tabular text builder.
pub trait CsvSink {
    fn append_text(&mut self, value: &str);

    fn append_number(&mut self, value: f64);

    fn append_bool(&mut self, value: bool);

    fn append_empty(&mut self);
}

/// Reads the current row into `entity`. Columns without a matching field
/// are ignored.
pub fn read_row<T: Entity>(entity: &mut T, row: &Row<'_>) -> Result<(), MapperError> {
    let descriptor = describe::<T>()?;
    let statement: &rusqlite::Statement<'_> = row.as_ref();
    for (index, column) in statement.column_names().into_iter().enumerate() {
        let Some(field) = descriptor.field_by_column(column) else {
            continue;
        };
        let raw = row.get_ref(index).map_err(|source| MapperError::Column {
            field: field.name.clone(),
            source,
        })?;
        let value = column_value(field, raw)?;
        entity.set(&field.name, value)?;
    }
    Ok(())
}

fn column_value(field: &FieldInfo, raw: ValueRef<'_>) -> Result<Value, MapperError> {
    let name = field.name.as_str();
    match (field.kind, raw) {
        (_, ValueRef::Null) => Ok(Value::Null),
        (ScalarKind::Int | ScalarKind::Integer, ValueRef::Integer(v)) => Ok(Value::Long(v)),
        (ScalarKind::Int | ScalarKind::Integer, ValueRef::Text(text)) => {
            parse_int(name, utf8(name, text)?).map(Value::Int)
        }
        (ScalarKind::Char | ScalarKind::Character, ValueRef::Text(text)) => utf8(name, text)?
            .chars()
            .next()
            .map(Value::Char)
            .ok_or_else(|| MapperError::conversion(name, "empty text for character")),
        (ScalarKind::Char | ScalarKind::Character, ValueRef::Integer(v)) => i32::try_from(v)
            .map(Value::Int)
            .map_err(|_| MapperError::conversion(name, format!("invalid code point {v}"))),
        (ScalarKind::Text, ValueRef::Text(text)) => Ok(Value::Text(utf8(name, text)?.to_string())),
        (ScalarKind::Text, ValueRef::Integer(v)) => Ok(Value::Text(v.to_string())),
        (ScalarKind::Text, ValueRef::Real(v)) => Ok(Value::Text(v.to_string())),
        (ScalarKind::Boolean, ValueRef::Integer(v)) => Ok(Value::Bool(v != 0)),
        (ScalarKind::Boolean, ValueRef::Text(text)) => match utf8(name, text)? {
            "1" => Ok(Value::Bool(true)),
            "0" => Ok(Value::Bool(false)),
            other => Ok(Value::Bool(other.eq_ignore_ascii_case("true"))),
        },
        (ScalarKind::Instant, ValueRef::Integer(ms)) => instant_from_millis(name, ms).map(Value::Instant),
        (kind, raw) => Err(MapperError::conversion(
            name,
            format!("cannot read {:?} column as {kind:?}", raw.data_type()),
        )),
    }
}

fn utf8<'a>(field: &str, bytes: &'a [u8]) -> Result<&'a str, MapperError> {
    std::str::from_utf8(bytes).map_err(|_| MapperError::conversion(field, "invalid UTF-8 text"))
}

fn parse_int(field: &str, text: &str) -> Result<i32, MapperError> {
    text.trim()
        .parse::<i32>()
        .map_err(|_| MapperError::conversion(field, format!("invalid integer value '{text}'")))
}

/// Reads every field of `entity` from an element: attributes for fields
/// declared as XML attributes, child element text otherwise.
///
/// An empty value for a nullable field reads as null. Instants with a date
/// format are left untouched when the value is empty.
pub fn read_element<T: Entity, E: ElementSource + ?Sized>(
    entity: &mut T,
    element: &E,
) -> Result<(), MapperError> {
    let descriptor = describe::<T>()?;
    for field in descriptor.fields() {
        let text = if field.xml_attribute {
            element.attribute(&field.xml_name)
        } else {
            element.child_text(&field.xml_name)
        };
        let name = field.name.as_str();
        if text.is_empty() && field.nullable {
            entity.set(name, Value::Null)?;
            continue;
        }
        let value = match field.kind {
            ScalarKind::Int | ScalarKind::Integer => Value::Int(parse_int(name, &text)?),
            ScalarKind::Char | ScalarKind::Character => Value::Int(parse_int(name, &text)?),
            ScalarKind::Text => Value::Text(text),
            ScalarKind::Boolean => Value::Bool(text.trim().eq_ignore_ascii_case("true")),
            ScalarKind::Instant => match &field.date_format {
                Some(_) if text.is_empty() => continue,
                Some(format) => {
                    Value::Instant(format.parse(text.trim()).map_err(|source| MapperError::Date {
                        field: name.to_string(),
                        source,
                    })?)
                }
                None => {
                    let millis = text.trim().parse::<i64>().map_err(|_| {
                        MapperError::conversion(name, format!("invalid timestamp '{text}'"))
                    })?;
                    Value::Long(millis)
                }
            },
        };
        entity.set(name, value)?;
    }
    Ok(())
}

/// Reads the members of a JSON object into the fields with matching JSON
/// names. Unknown members are ignored.
pub fn read_json<T: Entity>(entity: &mut T, json: &Map<String, JsonValue>) -> Result<(), MapperError> {
    let descriptor = describe::<T>()?;
    for (member, raw) in json {
        let Some(field) = descriptor.field_by_json_name(member) else {
            continue;
        };
        let value = json_value(field, raw)?;
        entity.set(&field.name, value)?;
    }
    Ok(())
}

fn json_value(field: &FieldInfo, raw: &JsonValue) -> Result<Value, MapperError> {
    let name = field.name.as_str();
    if raw.is_null() {
        return Ok(Value::Null);
    }
    let value = match field.kind {
        ScalarKind::Int
        | ScalarKind::Integer
        | ScalarKind::Char
        | ScalarKind::Character
        | ScalarKind::Instant => raw.as_i64().map(Value::Long),
        ScalarKind::Text => raw.as_str().map(Value::from),
        ScalarKind::Boolean => raw.as_bool().map(Value::Bool),
    };
    let value = value.ok_or_else(|| {
        MapperError::conversion(name, format!("unexpected JSON value {raw} for {:?}", field.kind))
    })?;
    match (field.kind, value) {
        (ScalarKind::Char | ScalarKind::Character, Value::Long(v)) => i32::try_from(v)
            .map(Value::Int)
            .map_err(|_| MapperError::conversion(name, format!("invalid code point {v}"))),
        (_, value) => Ok(value),
    }
}

/// Converts `entity` to a JSON object keyed by JSON name. Characters are
/// written as integer code points and null instants are omitted.
pub fn to_json<T: Entity>(entity: &T) -> Result<JsonValue, MapperError> {
    let descriptor = describe::<T>()?;
    let mut json = Map::new();
    for field in descriptor.fields() {
        let value = match descriptor.read_field(entity, field)? {
            Value::Null if field.kind == ScalarKind::Instant => continue,
            Value::Null => JsonValue::Null,
            Value::Int(v) => JsonValue::from(v),
            Value::Long(v) => JsonValue::from(v),
            Value::Char(c) => JsonValue::from(u32::from(c)),
            Value::Text(s) => JsonValue::from(s),
            Value::Bool(b) => JsonValue::from(b),
            Value::Instant(t) => JsonValue::from(t.timestamp_millis()),
        };
        json.insert(field.json_name.clone(), value);
    }
    Ok(JsonValue::Object(json))
}

/// Appends one header column per field, named by the field's XML name.
pub fn to_csv_header<T: Entity, S: CsvSink + ?Sized>(sink: &mut S) -> Result<(), MapperError> {
    let descriptor = describe::<T>()?;
    for field in descriptor.fields() {
        sink.append_text(&field.xml_name);
    }
    Ok(())
}

/// Appends the fields of `entity` as one CSV row.
pub fn to_csv<T: Entity, S: CsvSink + ?Sized>(entity: &T, sink: &mut S) -> Result<(), MapperError> {
    let descriptor = describe::<T>()?;
    for field in descriptor.fields() {
        let value = descriptor.read_field(entity, field)?;
        match (field.kind, value) {
            (_, Value::Null) => sink.append_empty(),
            (ScalarKind::Int, Value::Int(v)) => sink.append_number(f64::from(v)),
            (ScalarKind::Char, Value::Char(c)) => sink.append_number(f64::from(u32::from(c))),
            (ScalarKind::Boolean, Value::Bool(b)) => sink.append_bool(b),
            (ScalarKind::Instant, Value::Instant(t)) => match &field.date_format {
                Some(format) => sink.append_text(&format.format(&t)),
                None => sink.append_number(t.timestamp_millis() as f64),
            },
            (_, value) => sink.append_text(&value.to_string()),
        }
    }
    Ok(())
}
