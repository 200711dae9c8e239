//! SQL text and parameter synthesis from entity descriptors.
//!
//! Identifiers are emitted verbatim; table and column names must already be
//! safe SQL identifiers.

use crate::descriptor::{Descriptor, FieldInfo};
use crate::entity::Entity;
use crate::error::MapperError;
use crate::value::Value;

impl Descriptor {
    /// `INSERT INTO t (c1,c2) VALUES (?,?)` over the writable fields, or
    /// `INSERT INTO t DEFAULT VALUES` when there are none.
    pub fn insert_sql(&self) -> String {
        let columns: Vec<&str> = self.writable_fields().map(FieldInfo::column).collect();
        if columns.is_empty() {
            return format!("INSERT INTO {} DEFAULT VALUES", self.table);
        }
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.table,
            columns.join(","),
            placeholders(columns.len())
        )
    }

    /// `UPDATE t SET c1=?,c2=? WHERE id=?`, with `constraint` AND-appended.
    pub fn update_sql(&self, constraint: Option<&str>) -> Result<String, MapperError> {
        let id = self.require_id()?;
        let assignments: Vec<String> = self
            .writable_fields()
            .map(|f| format!("{}=?", f.column))
            .collect();
        if assignments.is_empty() {
            return Err(MapperError::NoWritableFields {
                entity: self.entity.clone(),
            });
        }
        let mut sql = format!(
            "UPDATE {} SET {} WHERE {}=?",
            self.table,
            assignments.join(","),
            id.column
        );
        append_constraint(&mut sql, constraint);
        Ok(sql)
    }

    /// `DELETE FROM t WHERE id=?`
    pub fn delete_sql(&self) -> Result<String, MapperError> {
        let id = self.require_id()?;
        Ok(format!("DELETE FROM {} WHERE {}=?", self.table, id.column))
    }

    /// `SELECT c1,c2 FROM t`, optionally filtered by `constraint`.
    pub fn select_sql(&self, constraint: Option<&str>) -> String {
        let columns: Vec<&str> = self.fields.iter().map(FieldInfo::column).collect();
        let mut sql = format!("SELECT {} FROM {}", columns.join(","), self.table);
        if let Some(constraint) = constraint.filter(|c| !c.is_empty()) {
            sql.push_str(" WHERE ");
            sql.push_str(constraint);
        }
        sql
    }

    pub fn select_by_id_sql(&self) -> Result<String, MapperError> {
        let id = self.require_id()?;
        Ok(self.select_sql(Some(&format!("{}=?", id.column))))
    }

    /// Positional parameters for [`Self::insert_sql`] and [`Self::update_sql`].
    ///
    /// With `append_id` the identity value follows the field values; `tail`
    /// is appended last.
    pub fn sql_params<T: Entity>(
        &self,
        entity: &T,
        append_id: bool,
        tail: &[Value],
    ) -> Result<Vec<Value>, MapperError> {
        let mut params = Vec::with_capacity(self.fields.len() + 1 + tail.len());
        for field in self.writable_fields() {
            params.push(self.read_field(entity, field)?);
        }
        if append_id {
            let id = self.require_id()?;
            params.push(self.read_field(entity, id)?);
        }
        params.extend_from_slice(tail);
        Ok(params)
    }

    /// The identity value alone, for DELETE and lookups by key.
    pub fn id_params<T: Entity>(&self, entity: &T) -> Result<Vec<Value>, MapperError> {
        let id = self.require_id()?;
        Ok(vec![self.read_field(entity, id)?])
    }

    pub(crate) fn read_field<T: Entity>(
        &self,
        entity: &T,
        field: &FieldInfo,
    ) -> Result<Value, MapperError> {
        entity
            .get(&field.name)
            .ok_or_else(|| MapperError::FieldAccess {
                entity: self.entity.clone(),
                field: field.name.clone(),
            })
    }
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(",")
}

fn append_constraint(sql: &mut String, constraint: Option<&str>) {
    if let Some(constraint) = constraint.filter(|c| !c.is_empty()) {
        sql.push_str(" AND ");
        sql.push_str(constraint);
    }
}
