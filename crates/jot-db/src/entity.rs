//! Entity declarations: the type-level record and per-field annotations.

use std::any::{TypeId, type_name};

use crate::error::MapperError;
use crate::value::Value;

/// A type that maps to one database table.
///
/// `record` is consulted once per type by [`crate::describe`]; `get` and
/// `set` address fields by their declared name.
pub trait Entity: Default + 'static {
    fn record() -> Record;

    fn get(&self, field: &str) -> Option<Value>;

    fn set(&mut self, field: &str, value: Value) -> Result<(), MapperError>;
}

/// Type-level annotation plus the ordered field declarations.
#[derive(Clone, Debug)]
pub struct Record {
    pub(crate) name: String,
    pub(crate) db_name: String,
    pub(crate) fields: Vec<Field>,
}

impl Record {
    /// Starts a record for the type with simple name `name`.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            db_name: String::new(),
            fields: Vec::new(),
        }
    }

    pub fn db_name(mut self, db_name: &str) -> Self {
        self.db_name = db_name.to_string();
        self
    }

    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }
}

/// Field declaration with its annotation attributes. Empty strings mean
/// "unset, use the field name".
#[derive(Clone, Debug)]
pub struct Field {
    pub(crate) name: String,
    pub(crate) type_id: TypeId,
    pub(crate) type_name: &'static str,
    pub(crate) id: bool,
    pub(crate) id_auto_assign: bool,
    pub(crate) read_only: bool,
    pub(crate) json_name: String,
    pub(crate) db_name: String,
    pub(crate) xml_attribute: bool,
    pub(crate) xml_name: String,
    pub(crate) date_format: String,
}

impl Field {
    /// Declares field `name` of Rust type `F`.
    pub fn of<F: 'static>(name: &str) -> Self {
        Self {
            name: name.to_string(),
            type_id: TypeId::of::<F>(),
            type_name: type_name::<F>(),
            id: false,
            id_auto_assign: false,
            read_only: false,
            json_name: String::new(),
            db_name: String::new(),
            xml_attribute: false,
            xml_name: String::new(),
            date_format: String::new(),
        }
    }

    pub fn id(mut self) -> Self {
        self.id = true;
        self
    }

    /// Marks the field as assigned by the database on insert.
    pub fn id_auto_assign(mut self) -> Self {
        self.id_auto_assign = true;
        self
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    pub fn json_name(mut self, name: &str) -> Self {
        self.json_name = name.to_string();
        self
    }

    pub fn db_name(mut self, name: &str) -> Self {
        self.db_name = name.to_string();
        self
    }

    pub fn xml_attribute(mut self) -> Self {
        self.xml_attribute = true;
        self
    }

    pub fn xml_name(mut self, name: &str) -> Self {
        self.xml_name = name.to_string();
        self
    }

    /// chrono strftime pattern used by the XML and CSV paths.
    pub fn date_format(mut self, pattern: &str) -> Self {
        self.date_format = pattern.to_string();
        self
    }
}

/// Generates [`Entity::get`] and [`Entity::set`] for the listed fields.
///
/// ```ignore
/// impl Entity for User {
///     fn record() -> Record { ... }
///     jot_db::entity_accessors!(id, name, email);
/// }
/// ```
#[macro_export]
macro_rules! entity_accessors {
    ($($field:ident),+ $(,)?) => {
        fn get(&self, field: &str) -> ::std::option::Option<$crate::Value> {
            match field {
                $(stringify!($field) => ::std::option::Option::Some(
                    $crate::Value::from(::std::clone::Clone::clone(&self.$field)),
                ),)+
                _ => ::std::option::Option::None,
            }
        }

        fn set(
            &mut self,
            field: &str,
            value: $crate::Value,
        ) -> ::std::result::Result<(), $crate::MapperError> {
            match field {
                $(stringify!($field) => {
                    self.$field = value.cast(field)?;
                    ::std::result::Result::Ok(())
                })+
                _ => ::std::result::Result::Err($crate::MapperError::FieldAccess {
                    entity: ::std::any::type_name::<Self>().to_string(),
                    field: field.to_string(),
                }),
            }
        }
    };
}
