//! Iteration repository.
//!
//! A space may have at most one iteration in `start`. The partial unique
//! index `idx_iterations_one_started` enforces this in storage;
//! [`IterationRepository::can_start_iteration`] reports it up front, and
//! [`IterationRepository::transition`] combines both under one IMMEDIATE
//! transaction.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{now_us, transactional};
use crate::error::{Error, Result};
use crate::model::iteration::{Iteration, IterationState, NewIteration};
use crate::timing::timed;

const ENTITY: &str = "iteration";

const COLUMNS: &str = "iteration_id, space_id, parent_id, name, description, \
                       start_at_us, end_at_us, state";

struct IterationRow {
    id: String,
    space_id: String,
    parent_id: Option<String>,
    name: String,
    description: Option<String>,
    start_at_us: Option<i64>,
    end_at_us: Option<i64>,
    state: String,
}

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<IterationRow> {
    Ok(IterationRow {
        id: row.get(0)?,
        space_id: row.get(1)?,
        parent_id: row.get(2)?,
        name: row.get(3)?,
        description: row.get(4)?,
        start_at_us: row.get(5)?,
        end_at_us: row.get(6)?,
        state: row.get(7)?,
    })
}

impl IterationRow {
    fn into_iteration(self) -> Result<Iteration> {
        Ok(Iteration {
            id: stored_uuid(&self.id)?,
            space_id: stored_uuid(&self.space_id)?,
            parent_id: self.parent_id.as_deref().map(stored_uuid).transpose()?,
            name: self.name,
            description: self.description,
            start_at: self.start_at_us.map(stored_instant).transpose()?,
            end_at: self.end_at_us.map(stored_instant).transpose()?,
            state: self
                .state
                .parse()
                .map_err(|err| Error::Internal(format!("stored iteration state: {err}")))?,
        })
    }
}

fn stored_uuid(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|err| Error::Internal(format!("stored uuid '{raw}': {err}")))
}

fn stored_instant(micros: i64) -> Result<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_micros(micros)
        .ok_or_else(|| Error::Internal(format!("stored timestamp {micros} out of range")))
}

pub struct IterationRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> IterationRepository<'conn> {
    #[must_use]
    pub const fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    /// Create a top-level iteration in state `new` with a fresh id.
    ///
    /// # Errors
    ///
    /// [`Error::BadParameter`] when the name is blank.
    pub fn create(&self, new: &NewIteration) -> Result<Iteration> {
        timed("db.iteration.create", || {
            let iteration = draft(new.space_id, None, new)?;
            insert(self.conn, &iteration)?;
            info!(iteration_id = %iteration.id, space_id = %iteration.space_id, "created iteration");
            Ok(iteration)
        })
    }

    /// Create an iteration under `parent_id`, in the parent's space.
    ///
    /// `new.space_id` is ignored.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] for an unknown parent, [`Error::BadParameter`]
    /// for a blank name.
    pub fn create_child(&self, parent_id: &Uuid, new: &NewIteration) -> Result<Iteration> {
        timed("db.iteration.create_child", || {
            transactional(self.conn, |tx| {
                let parent =
                    find(tx, parent_id)?.ok_or_else(|| Error::not_found(ENTITY, parent_id.to_string()))?;
                let iteration = draft(parent.space_id, Some(parent.id), new)?;
                insert(tx, &iteration)?;
                info!(
                    iteration_id = %iteration.id,
                    parent_id = %parent.id,
                    space_id = %iteration.space_id,
                    "created child iteration"
                );
                Ok(iteration)
            })
        })
    }

    /// # Errors
    ///
    /// [`Error::NotFound`] when absent.
    pub fn load(&self, id: &Uuid) -> Result<Iteration> {
        timed("db.iteration.load", || {
            debug!(iteration_id = %id, "loading iteration");
            find(self.conn, id)?.ok_or_else(|| Error::not_found(ENTITY, id.to_string()))
        })
    }

    /// Iterations of a space in creation order.
    ///
    /// # Errors
    ///
    /// [`Error::Internal`] on storage failure.
    pub fn list(&self, space_id: &Uuid) -> Result<Vec<Iteration>> {
        timed("db.iteration.list", || {
            let mut stmt = self.conn.prepare(&format!(
                "SELECT {COLUMNS} FROM iterations WHERE space_id = ?1 ORDER BY created_at_us, rowid"
            ))?;
            let rows = stmt.query_map([space_id.to_string()], read_row)?;
            let mut iterations = Vec::new();
            for row in rows {
                iterations.push(row?.into_iteration()?);
            }
            Ok(iterations)
        })
    }

    /// `Ok(true)` when no other iteration in `iteration`'s space is started.
    ///
    /// # Errors
    ///
    /// [`Error::BadParameter`] (`state`) when another iteration of the space
    /// is already in `start`.
    pub fn can_start_iteration(&self, iteration: &Iteration) -> Result<bool> {
        timed("db.iteration.can_start", || can_start(self.conn, iteration))
    }

    /// Persist every column of `iteration`. The single-started rule is left
    /// to storage; use [`Self::transition`] to change state safely.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] when absent, [`Error::BadParameter`] when the
    /// write would start a second iteration in the space.
    pub fn save(&self, iteration: &Iteration) -> Result<Iteration> {
        timed("db.iteration.save", || {
            transactional(self.conn, |tx| {
                if find(tx, &iteration.id)?.is_none() {
                    return Err(Error::not_found(ENTITY, iteration.id.to_string()));
                }
                update(tx, iteration)?;
                info!(iteration_id = %iteration.id, state = %iteration.state, "saved iteration");
                Ok(iteration.clone())
            })
        })
    }

    /// Move an iteration to `state`, checking the single-started rule when
    /// entering `start`.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] when absent, [`Error::BadParameter`] when another
    /// iteration of the space is started.
    pub fn transition(&self, id: &Uuid, state: IterationState) -> Result<Iteration> {
        timed("db.iteration.transition", || {
            transactional(self.conn, |tx| {
                let mut iteration =
                    find(tx, id)?.ok_or_else(|| Error::not_found(ENTITY, id.to_string()))?;
                if state == IterationState::Start {
                    can_start(tx, &iteration)?;
                }
                let from = iteration.state;
                iteration.state = state;
                update(tx, &iteration)?;
                info!(iteration_id = %id, %from, to = %state, "iteration transitioned");
                Ok(iteration)
            })
        })
    }
}

fn draft(space_id: Uuid, parent_id: Option<Uuid>, new: &NewIteration) -> Result<Iteration> {
    let name = new.name.trim();
    if name.is_empty() {
        return Err(Error::bad_parameter("name", "iteration name must not be empty"));
    }
    Ok(Iteration {
        id: Uuid::new_v4(),
        space_id,
        parent_id,
        name: name.to_string(),
        description: new.description.clone(),
        start_at: new.start_at,
        end_at: new.end_at,
        state: IterationState::New,
    })
}

fn find(conn: &Connection, id: &Uuid) -> Result<Option<Iteration>> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM iterations WHERE iteration_id = ?1"),
        [id.to_string()],
        read_row,
    )
    .optional()?
    .map(IterationRow::into_iteration)
    .transpose()
}

fn can_start(conn: &Connection, iteration: &Iteration) -> Result<bool> {
    let started: i64 = conn.query_row(
        "SELECT COUNT(*) FROM iterations \
         WHERE space_id = ?1 AND state = 'start' AND iteration_id <> ?2",
        params![iteration.space_id.to_string(), iteration.id.to_string()],
        |row| row.get(0),
    )?;
    if started > 0 {
        warn!(
            iteration_id = %iteration.id,
            space_id = %iteration.space_id,
            "another iteration in the space is already started"
        );
        return Err(already_started(&iteration.space_id));
    }
    Ok(true)
}

fn already_started(space_id: &Uuid) -> Error {
    Error::bad_parameter(
        "state",
        format!("space {space_id} already has a started iteration"),
    )
}

/// Translate a violation of `idx_iterations_one_started`.
fn map_write_error(err: rusqlite::Error, iteration: &Iteration) -> Error {
    match err {
        rusqlite::Error::SqliteFailure(ref failure, _)
            if failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
        {
            already_started(&iteration.space_id)
        }
        other => other.into(),
    }
}

fn insert(conn: &Connection, iteration: &Iteration) -> Result<()> {
    let now = now_us();
    conn.execute(
        &format!(
            "INSERT INTO iterations ({COLUMNS}, created_at_us, updated_at_us) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)"
        ),
        params![
            iteration.id.to_string(),
            iteration.space_id.to_string(),
            iteration.parent_id.map(|id| id.to_string()),
            iteration.name,
            iteration.description,
            iteration.start_at.map(|at| at.timestamp_micros()),
            iteration.end_at.map(|at| at.timestamp_micros()),
            iteration.state.as_str(),
            now,
        ],
    )
    .map_err(|err| map_write_error(err, iteration))?;
    Ok(())
}

fn update(conn: &Connection, iteration: &Iteration) -> Result<()> {
    conn.execute(
        "UPDATE iterations SET space_id = ?2, parent_id = ?3, name = ?4, description = ?5, \
         start_at_us = ?6, end_at_us = ?7, state = ?8, updated_at_us = ?9 \
         WHERE iteration_id = ?1",
        params![
            iteration.id.to_string(),
            iteration.space_id.to_string(),
            iteration.parent_id.map(|id| id.to_string()),
            iteration.name,
            iteration.description,
            iteration.start_at.map(|at| at.timestamp_micros()),
            iteration.end_at.map(|at| at.timestamp_micros()),
            iteration.state.as_str(),
            now_us(),
        ],
    )
    .map_err(|err| map_write_error(err, iteration))?;
    Ok(())
}
