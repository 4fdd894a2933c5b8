//! Work item repository with optimistic versioning.
//!
//! Rows carry field values in storage shape; callers always see wire shape.
//! `version` starts at 0 and every successful write bumps it by exactly one
//! inside a `BEGIN IMMEDIATE` transaction, so concurrent writers serialize
//! on the database and no increment is lost.

use std::collections::{BTreeMap, HashMap};

use rusqlite::{Connection, OptionalExtension, params, params_from_iter, types::ToSql};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::work_item_type::{self as types, limit_clause};
use super::{identity, now_us, transactional};
use crate::error::{Error, Result};
use crate::model::iteration::WorkItemCounts;
use crate::model::work_item::{STATE_CLOSED, SYSTEM_ASSIGNEE, SYSTEM_CREATOR, WorkItem};
use crate::model::work_item_type::WorkItemType;
use crate::query::Expression;
use crate::timing::timed;

const ENTITY: &str = "work item";

/// A `work_items` row as stored.
struct StoredRow {
    key: i64,
    type_name: String,
    version: i64,
    fields_json: String,
    created_at_us: i64,
    updated_at_us: i64,
}

impl StoredRow {
    fn fields(&self) -> Result<Map<String, Value>> {
        Ok(serde_json::from_str(&self.fields_json)?)
    }
}

const ROW_COLUMNS: &str =
    "w.item_id, w.type_name, w.version, w.fields_json, w.created_at_us, w.updated_at_us";

fn row_to_stored(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredRow> {
    Ok(StoredRow {
        key: row.get(0)?,
        type_name: row.get(1)?,
        version: row.get(2)?,
        fields_json: row.get(3)?,
        created_at_us: row.get(4)?,
        updated_at_us: row.get(5)?,
    })
}

pub struct WorkItemRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> WorkItemRepository<'conn> {
    #[must_use]
    pub const fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    /// Create a work item of `type_name` with version 0.
    ///
    /// `system.creator` is set to `creator`, overriding any supplied value.
    ///
    /// # Errors
    ///
    /// - [`Error::BadParameter`] for an empty type name or creator
    /// - [`Error::NotFound`] for an unknown type
    /// - [`Error::RequiredField`] / [`Error::Conversion`] from the type
    pub fn create(
        &self,
        type_name: &str,
        fields: &Map<String, Value>,
        creator: &str,
    ) -> Result<WorkItem> {
        if type_name.trim().is_empty() {
            return Err(Error::bad_parameter("type", "type name must not be empty"));
        }
        if creator.trim().is_empty() {
            return Err(Error::bad_parameter("creator", "creator must not be empty"));
        }

        timed("db.work_item.create", || {
            transactional(self.conn, |tx| {
                let ty = types::find(tx, type_name)?
                    .ok_or_else(|| Error::not_found("work item type", type_name))?;

                let mut input = fields.clone();
                input.insert(SYSTEM_CREATOR.to_string(), Value::String(creator.to_string()));
                let stored = ty.convert_to_model(&input)?;

                let now = now_us();
                tx.execute(
                    "INSERT INTO work_items (type_name, version, fields_json, created_at_us, updated_at_us) \
                     VALUES (?1, 0, ?2, ?3, ?3)",
                    params![ty.name, serde_json::to_string(&stored)?, now],
                )?;
                let key = tx.last_insert_rowid();
                info!(item_id = key, type_name = %ty.name, "created work item");

                Ok(WorkItem {
                    id: key.to_string(),
                    type_name: ty.name.clone(),
                    version: 0,
                    fields: ty.convert_from_model(&stored)?,
                    created_at_us: Some(now),
                    updated_at_us: Some(now),
                })
            })
        })
    }

    /// # Errors
    ///
    /// [`Error::NotFound`] when `id` is malformed, absent or deleted.
    pub fn load(&self, id: &str) -> Result<WorkItem> {
        timed("db.work_item.load", || {
            let key = parse_id(id)?;
            debug!(item_id = key, "loading work item");
            let row = fetch_live(self.conn, key)?.ok_or_else(|| Error::not_found(ENTITY, id))?;
            let ty = stored_type(self.conn, &row.type_name)?;
            to_wire(&ty, &row)
        })
    }

    /// Write `item` regardless of its `version`; the stored version is
    /// bumped by one. The type may change as long as the new type exists.
    ///
    /// Prefer [`Self::save_checked`] when the caller read the item first.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] when the item is absent or deleted
    /// - [`Error::BadParameter`] (`type`) for an unknown type
    /// - [`Error::RequiredField`] / [`Error::Conversion`] from the type
    pub fn save(&self, item: &WorkItem) -> Result<WorkItem> {
        timed("db.work_item.save", || self.write(item, false))
    }

    /// Like [`Self::save`], but fails when `item.version` is not the stored
    /// version.
    ///
    /// # Errors
    ///
    /// As [`Self::save`], plus [`Error::VersionConflict`].
    pub fn save_checked(&self, item: &WorkItem) -> Result<WorkItem> {
        timed("db.work_item.save_checked", || self.write(item, true))
    }

    fn write(&self, item: &WorkItem, check_version: bool) -> Result<WorkItem> {
        let key = parse_id(&item.id)?;
        transactional(self.conn, |tx| {
            let row = fetch_live(tx, key)?.ok_or_else(|| Error::not_found(ENTITY, &item.id))?;
            if check_version && row.version != item.version {
                warn!(
                    item_id = key,
                    expected = item.version,
                    actual = row.version,
                    "rejected stale work item write"
                );
                return Err(Error::VersionConflict {
                    entity: ENTITY,
                    id: item.id.clone(),
                    expected: item.version.to_string(),
                    actual: row.version,
                });
            }

            let ty = types::find(tx, &item.type_name)?.ok_or_else(|| {
                Error::bad_parameter(
                    "type",
                    format!("unknown work item type '{}'", item.type_name),
                )
            })?;
            let stored = ty.convert_to_model(&item.fields)?;
            let saved = update_row(tx, &ty, &row, &stored)?;
            info!(item_id = key, version = saved.version, type_name = %ty.name, "saved work item");
            Ok(saved)
        })
    }

    /// Set or clear `system.assignee`.
    ///
    /// `version` is the caller's version as a decimal string and must equal
    /// the stored version; it is checked before anything else is validated.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] when the item or the assignee identity is absent
    /// - [`Error::VersionConflict`] on a stale `version`
    /// - [`Error::BadParameter`] (`assignee`) when it is not a UUID
    pub fn update_assignee(
        &self,
        id: &str,
        version: &str,
        assignee: Option<&str>,
    ) -> Result<WorkItem> {
        timed("db.work_item.update_assignee", || {
            let key = parse_id(id)?;
            transactional(self.conn, |tx| {
                let row = fetch_live(tx, key)?.ok_or_else(|| Error::not_found(ENTITY, id))?;
                if version != row.version.to_string() {
                    warn!(item_id = key, expected = version, actual = row.version, "rejected stale assignee update");
                    return Err(Error::VersionConflict {
                        entity: ENTITY,
                        id: id.to_string(),
                        expected: version.to_string(),
                        actual: row.version,
                    });
                }

                let mut stored = row.fields()?;
                match assignee {
                    Some(raw) => {
                        let identity_id = Uuid::parse_str(raw.trim()).map_err(|err| {
                            Error::bad_parameter("assignee", format!("'{raw}' is not a UUID: {err}"))
                        })?;
                        if !identity::exists(tx, &identity_id)? {
                            return Err(Error::not_found("identity", identity_id.to_string()));
                        }
                        stored.insert(SYSTEM_ASSIGNEE.to_string(), Value::String(identity_id.to_string()));
                    }
                    None => {
                        stored.remove(SYSTEM_ASSIGNEE);
                    }
                }

                let ty = stored_type(tx, &row.type_name)?;
                let stored = ty.convert_to_model(&ty.convert_from_model(&stored)?)?;
                let saved = update_row(tx, &ty, &row, &stored)?;
                info!(item_id = key, version = saved.version, assignee, "updated work item assignee");
                Ok(saved)
            })
        })
    }

    /// Soft-delete a live work item.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] when `id` is malformed, absent or already deleted.
    pub fn delete(&self, id: &str) -> Result<()> {
        timed("db.work_item.delete", || {
            let key = parse_id(id)?;
            let now = now_us();
            let changed = self.conn.execute(
                "UPDATE work_items SET deleted_at_us = ?1, updated_at_us = ?1 \
                 WHERE item_id = ?2 AND deleted_at_us IS NULL",
                params![now, key],
            )?;
            if changed == 0 {
                return Err(Error::not_found(ENTITY, id));
            }
            info!(item_id = key, "deleted work item");
            Ok(())
        })
    }

    /// Live items matching `filter` in ascending id order, plus the number of
    /// matches before the `offset`/`limit` window is applied.
    ///
    /// # Errors
    ///
    /// [`Error::BadParameter`] for an uncompilable filter, otherwise
    /// [`Error::Internal`] on storage failure.
    pub fn list(
        &self,
        filter: &Expression,
        offset: Option<usize>,
        limit: Option<usize>,
    ) -> Result<(Vec<WorkItem>, u64)> {
        timed("db.work_item.list", || {
            let mut param_values: Vec<Box<dyn ToSql>> = Vec::new();
            let predicate = filter.to_sql("w.fields_json", &mut param_values)?;
            let where_clause = format!(" WHERE w.deleted_at_us IS NULL AND ({predicate})");
            let params_ref: Vec<&dyn ToSql> = param_values.iter().map(AsRef::as_ref).collect();

            let total: i64 = self.conn.query_row(
                &format!("SELECT COUNT(*) FROM work_items w{where_clause}"),
                params_from_iter(params_ref.iter()),
                |row| row.get(0),
            )?;

            let sql = format!(
                "SELECT {ROW_COLUMNS} FROM work_items w{where_clause} ORDER BY w.item_id ASC{}",
                limit_clause(offset, limit)
            );
            let mut stmt = self.conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(params_ref.iter()), row_to_stored)?;

            let mut type_cache: HashMap<String, WorkItemType> = HashMap::new();
            let mut items = Vec::new();
            for row in rows {
                let row = row?;
                if !type_cache.contains_key(&row.type_name) {
                    let ty = stored_type(self.conn, &row.type_name)?;
                    type_cache.insert(row.type_name.clone(), ty);
                }
                if let Some(ty) = type_cache.get(&row.type_name) {
                    items.push(to_wire(ty, &row)?);
                }
            }

            debug!(matched = total, returned = items.len(), "listed work items");
            Ok((items, u64::try_from(total).unwrap_or(0)))
        })
    }

    /// Totals per iteration of `space_id`: live items referencing the
    /// iteration through `system.iteration`, and how many of those are
    /// closed. Iterations without items are absent.
    ///
    /// # Errors
    ///
    /// [`Error::Internal`] on storage failure.
    pub fn counts_per_iteration(&self, space_id: &Uuid) -> Result<BTreeMap<Uuid, WorkItemCounts>> {
        timed("db.work_item.counts_per_iteration", || {
            let mut stmt = self.conn.prepare(
                r#"SELECT i.iteration_id,
                          COUNT(*),
                          SUM(CASE WHEN json_extract(w.fields_json, '$."system.state"') = ?2
                                   THEN 1 ELSE 0 END)
                   FROM work_items w
                   JOIN iterations i
                     ON lower(json_extract(w.fields_json, '$."system.iteration"')) = i.iteration_id
                   WHERE w.deleted_at_us IS NULL AND i.space_id = ?1
                   GROUP BY i.iteration_id"#,
            )?;
            let rows = stmt.query_map(params![space_id.to_string(), STATE_CLOSED], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            })?;

            let mut counts = BTreeMap::new();
            for row in rows {
                let (iteration_id, total, closed) = row?;
                let iteration_id = Uuid::parse_str(&iteration_id).map_err(|err| {
                    Error::Internal(format!("stored iteration id '{iteration_id}': {err}"))
                })?;
                counts.insert(
                    iteration_id,
                    WorkItemCounts {
                        total: u64::try_from(total).unwrap_or(0),
                        closed: u64::try_from(closed).unwrap_or(0),
                    },
                );
            }
            Ok(counts)
        })
    }
}

/// Work item ids are positive decimal integers; anything else can't exist.
fn parse_id(id: &str) -> Result<i64> {
    id.trim()
        .parse::<i64>()
        .ok()
        .filter(|key| *key > 0)
        .ok_or_else(|| Error::not_found(ENTITY, id))
}

fn fetch_live(conn: &Connection, key: i64) -> Result<Option<StoredRow>> {
    Ok(conn
        .query_row(
            &format!(
                "SELECT {ROW_COLUMNS} FROM work_items w \
                 WHERE w.item_id = ?1 AND w.deleted_at_us IS NULL"
            ),
            [key],
            row_to_stored,
        )
        .optional()?)
}

/// The type a stored row points at. The foreign key makes absence an
/// internal fault rather than caller error.
fn stored_type(conn: &Connection, name: &str) -> Result<WorkItemType> {
    types::find(conn, name)?
        .ok_or_else(|| Error::Internal(format!("stored work item references missing type '{name}'")))
}

fn update_row(
    tx: &Connection,
    ty: &WorkItemType,
    row: &StoredRow,
    stored: &Map<String, Value>,
) -> Result<WorkItem> {
    let version = row.version + 1;
    let now = now_us();
    tx.execute(
        "UPDATE work_items SET type_name = ?1, version = ?2, fields_json = ?3, updated_at_us = ?4 \
         WHERE item_id = ?5",
        params![ty.name, version, serde_json::to_string(stored)?, now, row.key],
    )?;
    Ok(WorkItem {
        id: row.key.to_string(),
        type_name: ty.name.clone(),
        version,
        fields: ty.convert_from_model(stored)?,
        created_at_us: Some(row.created_at_us),
        updated_at_us: Some(now),
    })
}

fn to_wire(ty: &WorkItemType, row: &StoredRow) -> Result<WorkItem> {
    Ok(WorkItem {
        id: row.key.to_string(),
        type_name: row.type_name.clone(),
        version: row.version,
        fields: ty.convert_from_model(&row.fields()?)?,
        created_at_us: Some(row.created_at_us),
        updated_at_us: Some(row.updated_at_us),
    })
}

#[cfg(test)]
mod tests {
    use super::parse_id;
    use crate::error::Error;

    #[test]
    fn ids_must_be_positive_integers() {
        assert_eq!(parse_id("42").unwrap(), 42);
        assert_eq!(parse_id(" 7 ").unwrap(), 7);
        for bad in ["0", "-1", "abc", "", "1.5"] {
            assert!(matches!(parse_id(bad), Err(Error::NotFound { .. })), "{bad}");
        }
    }
}
