//! Work item type registry.

use std::collections::BTreeMap;

use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info};

use super::{now_us, transactional};
use crate::error::{Error, Result};
use crate::model::field_definition::{FieldDefinition, decode_fields};
use crate::model::work_item_type::{WorkItemType, validate_type_name};
use crate::timing::timed;

const ENTITY: &str = "work item type";

pub struct WorkItemTypeRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> WorkItemTypeRepository<'conn> {
    #[must_use]
    pub const fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    /// # Errors
    ///
    /// [`Error::NotFound`] when no type is registered under `name`.
    pub fn load(&self, name: &str) -> Result<WorkItemType> {
        timed("db.work_item_type.load", || {
            debug!(type_name = name, "loading work item type");
            find(self.conn, name)?.ok_or_else(|| Error::not_found(ENTITY, name))
        })
    }

    /// Register a type, optionally extending `extended_type_name`.
    ///
    /// The stored field set is the parent's fields plus `fields`, with
    /// `fields` winning. Registering a name again with the identical merged
    /// field set returns the existing type.
    ///
    /// # Errors
    ///
    /// - [`Error::BadParameter`] for an invalid name, or a name already
    ///   registered with a different field set
    /// - [`Error::NotFound`] when the parent type does not exist
    pub fn create(
        &self,
        extended_type_name: Option<&str>,
        name: &str,
        fields: BTreeMap<String, FieldDefinition>,
    ) -> Result<WorkItemType> {
        validate_type_name(name)?;
        timed("db.work_item_type.create", || {
            transactional(self.conn, |tx| {
                let merged = match extended_type_name {
                    Some(parent_name) => find(tx, parent_name)?
                        .ok_or_else(|| Error::not_found(ENTITY, parent_name))?
                        .extended_fields(fields),
                    None => fields,
                };

                if let Some(existing) = find(tx, name)? {
                    if existing.fields == merged {
                        debug!(type_name = name, "work item type already registered");
                        return Ok(existing);
                    }
                    return Err(Error::bad_parameter(
                        "name",
                        format!("work item type '{name}' already exists with a different field set"),
                    ));
                }

                let fields_json = serde_json::to_string(&merged)?;
                let now = now_us();
                tx.execute(
                    "INSERT INTO work_item_types \
                     (name, version, extended_type_name, fields_json, created_at_us, updated_at_us) \
                     VALUES (?1, 1, ?2, ?3, ?4, ?4)",
                    params![name, extended_type_name, fields_json, now],
                )?;
                info!(
                    type_name = name,
                    extends = extended_type_name,
                    field_count = merged.len(),
                    "created work item type"
                );
                Ok(WorkItemType::new(name.to_string(), 1, merged))
            })
        })
    }

    /// Types in creation order, optionally windowed.
    ///
    /// # Errors
    ///
    /// [`Error::Internal`] on storage failure.
    pub fn list(&self, offset: Option<usize>, limit: Option<usize>) -> Result<Vec<WorkItemType>> {
        timed("db.work_item_type.list", || {
            let sql = format!(
                "SELECT name, version, fields_json FROM work_item_types ORDER BY rowid{}",
                limit_clause(offset, limit)
            );
            let mut stmt = self.conn.prepare(&sql)?;
            let rows = stmt.query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?;

            let mut types = Vec::new();
            for row in rows {
                let (name, version, fields_json) = row?;
                types.push(WorkItemType::new(name, version, decode_fields(&fields_json)?));
            }
            Ok(types)
        })
    }
}

/// Look a type up inside an open connection or transaction.
pub(crate) fn find(conn: &Connection, name: &str) -> Result<Option<WorkItemType>> {
    let row = conn
        .query_row(
            "SELECT name, version, fields_json FROM work_item_types WHERE name = ?1",
            [name],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                ))
            },
        )
        .optional()?;

    row.map(|(name, version, fields_json)| {
        Ok(WorkItemType::new(name, version, decode_fields(&fields_json)?))
    })
    .transpose()
}

pub(crate) fn limit_clause(offset: Option<usize>, limit: Option<usize>) -> String {
    match (limit, offset) {
        (Some(limit), Some(offset)) => format!(" LIMIT {limit} OFFSET {offset}"),
        (Some(limit), None) => format!(" LIMIT {limit}"),
        (None, Some(offset)) => format!(" LIMIT -1 OFFSET {offset}"),
        (None, None) => String::new(),
    }
}
