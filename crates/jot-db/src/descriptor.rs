//! Per-type entity descriptors, built once and cached by type identity.

use std::any::TypeId;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use chrono::format::{Item, Parsed, StrftimeItems};
use chrono::{DateTime, NaiveTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tracing::debug;

use crate::entity::{Entity, Field, Record};
use crate::error::MapperError;

static DESCRIPTORS: Lazy<Mutex<HashMap<TypeId, Arc<Descriptor>>>> = Lazy::new(Default::default);

static DATE_FORMATS: Lazy<Mutex<HashMap<String, DateFormat>>> = Lazy::new(Default::default);

/// Returns the descriptor of `T`, building it on first use.
///
/// Every call for the same type returns the same `Arc`.
pub fn describe<T: Entity>() -> Result<Arc<Descriptor>, MapperError> {
    let mut cache = DESCRIPTORS.lock();
    match cache.entry(TypeId::of::<T>()) {
        Entry::Occupied(entry) => Ok(Arc::clone(entry.get())),
        Entry::Vacant(entry) => {
            let descriptor = Arc::new(Descriptor::build::<T>()?);
            debug!(
                entity = %descriptor.entity,
                table = %descriptor.table,
                fields = descriptor.fields.len(),
                "described entity"
            );
            Ok(Arc::clone(entry.insert(descriptor)))
        }
    }
}

/// The scalar kinds an entity field may have.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScalarKind {
    /// `i32`
    Int,
    /// `Option<i32>`
    Integer,
    /// `char`
    Char,
    /// `Option<char>`
    Character,
    /// `String` or `Option<String>`
    Text,
    /// `bool`
    Boolean,
    /// `DateTime<Utc>` or `Option<DateTime<Utc>>`
    Instant,
}

impl ScalarKind {
    /// Resolves a Rust field type to its kind and nullability.
    fn resolve(type_id: TypeId) -> Option<(Self, bool)> {
        let table: [(TypeId, Self, bool); 9] = [
            (TypeId::of::<i32>(), Self::Int, false),
            (TypeId::of::<Option<i32>>(), Self::Integer, true),
            (TypeId::of::<char>(), Self::Char, false),
            (TypeId::of::<Option<char>>(), Self::Character, true),
            (TypeId::of::<String>(), Self::Text, false),
            (TypeId::of::<Option<String>>(), Self::Text, true),
            (TypeId::of::<bool>(), Self::Boolean, false),
            (TypeId::of::<DateTime<Utc>>(), Self::Instant, false),
            (TypeId::of::<Option<DateTime<Utc>>>(), Self::Instant, true),
        ];
        table
            .iter()
            .find(|(id, _, _)| *id == type_id)
            .map(|(_, kind, nullable)| (*kind, *nullable))
    }
}

/// A compiled strftime pattern shared through the process-wide cache.
#[derive(Clone, Debug)]
pub struct DateFormat {
    pattern: String,
    items: Arc<[Item<'static>]>,
}

impl DateFormat {
    /// Compiles `pattern`, reusing a previously compiled copy when present.
    pub fn compile(pattern: &str) -> Result<Self, MapperError> {
        let mut formats = DATE_FORMATS.lock();
        if let Some(format) = formats.get(pattern) {
            return Ok(format.clone());
        }
        let items = StrftimeItems::new(pattern)
            .parse_to_owned()
            .map_err(|_| MapperError::DateFormat {
                pattern: pattern.to_string(),
            })?;
        let format = Self {
            pattern: pattern.to_string(),
            items: items.into(),
        };
        formats.insert(pattern.to_string(), format.clone());
        Ok(format)
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn format(&self, instant: &DateTime<Utc>) -> String {
        instant.format_with_items(self.items.iter()).to_string()
    }

    /// Parses `text`. Patterns without a time of day yield midnight UTC;
    /// patterns without an offset are read as UTC.
    pub fn parse(&self, text: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
        let mut parsed = Parsed::new();
        chrono::format::parse(&mut parsed, text, self.items.iter())?;
        if let Ok(instant) = parsed.to_datetime() {
            return Ok(instant.with_timezone(&Utc));
        }
        if let Ok(naive) = parsed.to_naive_datetime_with_offset(0) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
        let date = parsed.to_naive_date()?;
        Ok(Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN)))
    }
}

/// Resolved metadata of one entity field.
#[derive(Clone, Debug)]
pub struct FieldInfo {
    pub(crate) name: String,
    pub(crate) kind: ScalarKind,
    pub(crate) nullable: bool,
    pub(crate) id: bool,
    pub(crate) id_auto_assign: bool,
    pub(crate) read_only: bool,
    pub(crate) json_name: String,
    pub(crate) column: String,
    pub(crate) xml_attribute: bool,
    pub(crate) xml_name: String,
    pub(crate) date_format: Option<DateFormat>,
}

fn or_default(value: &str, default: &str) -> String {
    if value.is_empty() {
        default.to_string()
    } else {
        value.to_string()
    }
}

impl FieldInfo {
    fn resolve(field: &Field) -> Result<Self, MapperError> {
        let (kind, nullable) =
            ScalarKind::resolve(field.type_id).ok_or_else(|| MapperError::UnsupportedType {
                field: field.name.clone(),
                type_name: field.type_name,
            })?;
        let date_format = if field.date_format.is_empty() {
            None
        } else {
            Some(DateFormat::compile(&field.date_format)?)
        };
        Ok(Self {
            name: field.name.clone(),
            kind,
            nullable,
            id: field.id,
            id_auto_assign: field.id_auto_assign,
            read_only: field.read_only,
            json_name: or_default(&field.json_name, &field.name),
            column: or_default(&field.db_name, &field.name),
            xml_attribute: field.xml_attribute,
            xml_name: or_default(&field.xml_name, &field.name),
            date_format,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ScalarKind {
        self.kind
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn is_id(&self) -> bool {
        self.id
    }

    pub fn is_id_auto_assign(&self) -> bool {
        self.id && self.id_auto_assign
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// True when the field takes part in INSERT and UPDATE parameter lists.
    pub fn is_writable(&self) -> bool {
        !self.is_id_auto_assign() && !self.read_only
    }

    pub fn json_name(&self) -> &str {
        &self.json_name
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn is_xml_attribute(&self) -> bool {
        self.xml_attribute
    }

    pub fn xml_name(&self) -> &str {
        &self.xml_name
    }

    pub fn date_format(&self) -> Option<&DateFormat> {
        self.date_format.as_ref()
    }
}

/// Immutable metadata of an entity type.
#[derive(Debug)]
pub struct Descriptor {
    pub(crate) entity: String,
    pub(crate) table: String,
    pub(crate) fields: Vec<FieldInfo>,
    by_json_name: HashMap<String, usize>,
    by_column: HashMap<String, usize>,
    id: Option<usize>,
}

impl Descriptor {
    fn build<T: Entity>() -> Result<Self, MapperError> {
        let Record {
            name,
            db_name,
            fields: declared,
        } = T::record();
        let table = if db_name.is_empty() {
            format!("{}s", name.to_lowercase())
        } else {
            db_name
        };

        let probe = T::default();
        let mut fields = Vec::with_capacity(declared.len());
        let mut id: Option<usize> = None;
        for field in &declared {
            if fields.iter().any(|f: &FieldInfo| f.name == field.name) {
                return Err(MapperError::DuplicateField {
                    entity: name,
                    field: field.name.clone(),
                });
            }
            if probe.get(&field.name).is_none() {
                return Err(MapperError::FieldAccess {
                    entity: name,
                    field: field.name.clone(),
                });
            }
            let info = FieldInfo::resolve(field)?;
            if info.id {
                if let Some(first) = id {
                    let first: &FieldInfo = &fields[first];
                    return Err(MapperError::MultipleIds {
                        entity: name,
                        first: first.name.clone(),
                        second: info.name,
                    });
                }
                id = Some(fields.len());
            }
            fields.push(info);
        }

        let by_json_name = fields
            .iter()
            .enumerate()
            .map(|(i, f)| (f.json_name.clone(), i))
            .collect();
        let by_column = fields
            .iter()
            .enumerate()
            .map(|(i, f)| (f.column.clone(), i))
            .collect();

        Ok(Self {
            entity: name,
            table,
            fields,
            by_json_name,
            by_column,
            id,
        })
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Fields in declaration order.
    pub fn fields(&self) -> &[FieldInfo] {
        &self.fields
    }

    pub fn field_by_json_name(&self, name: &str) -> Option<&FieldInfo> {
        self.by_json_name.get(name).map(|&i| &self.fields[i])
    }

    pub fn field_by_column(&self, column: &str) -> Option<&FieldInfo> {
        self.by_column.get(column).map(|&i| &self.fields[i])
    }

    pub fn id_field(&self) -> Option<&FieldInfo> {
        self.id.map(|i| &self.fields[i])
    }

    pub(crate) fn require_id(&self) -> Result<&FieldInfo, MapperError> {
        self.id_field().ok_or_else(|| MapperError::MissingId {
            entity: self.entity.clone(),
        })
    }

    /// Fields written by INSERT and UPDATE, in column order.
    pub fn writable_fields(&self) -> impl Iterator<Item = &FieldInfo> {
        self.fields.iter().filter(|f| f.is_writable())
    }
}
