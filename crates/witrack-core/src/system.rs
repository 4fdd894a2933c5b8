//! Built-in work item types.
//!
//! `system.workitem` carries the common `system.*` fields; every other
//! built-in type extends it without adding fields of its own.

use std::collections::BTreeMap;

use rusqlite::Connection;
use serde_json::Value;

use crate::db::{WorkItemTypeRepository, transactional};
use crate::error::{Error, Result};
use crate::model::field_definition::FieldDefinition;
use crate::model::field_type::FieldType;
use crate::model::kind::Kind;
use crate::model::work_item::{
    SYSTEM_ASSIGNEE, SYSTEM_CREATOR, SYSTEM_DESCRIPTION, SYSTEM_ITERATION, SYSTEM_LABELS,
    SYSTEM_STATE, SYSTEM_STATES, SYSTEM_TITLE,
};
use crate::model::work_item_type::WorkItemType;

pub const SYSTEM_WORK_ITEM: &str = "system.workitem";
pub const SYSTEM_BUG: &str = "system.bug";
pub const SYSTEM_FEATURE: &str = "system.feature";
pub const SYSTEM_USER_STORY: &str = "system.userstory";
pub const SYSTEM_EXPERIENCE: &str = "system.experience";
pub const SYSTEM_FUNDAMENTAL: &str = "system.fundamental";
pub const SYSTEM_VALUE_PROPOSITION: &str = "system.valueproposition";

/// Built-in types that extend [`SYSTEM_WORK_ITEM`].
pub const EXTENDING_TYPES: [&str; 6] = [
    SYSTEM_BUG,
    SYSTEM_FEATURE,
    SYSTEM_USER_STORY,
    SYSTEM_EXPERIENCE,
    SYSTEM_FUNDAMENTAL,
    SYSTEM_VALUE_PROPOSITION,
];

/// Field set shared by every built-in type.
///
/// # Errors
///
/// Only fails if a built-in definition is itself invalid.
pub fn base_fields() -> Result<BTreeMap<String, FieldDefinition>> {
    let simple = |kind| {
        FieldType::simple(kind).map_err(|err| Error::Internal(format!("built-in field: {err}")))
    };
    let states = FieldType::enumeration(
        Kind::String,
        SYSTEM_STATES.iter().map(|state| Value::from(*state)),
    )
    .map_err(|err| Error::Internal(format!("built-in state enum: {err}")))?;
    let labels = FieldType::list(Kind::String)
        .map_err(|err| Error::Internal(format!("built-in labels: {err}")))?;

    Ok(BTreeMap::from([
        (SYSTEM_TITLE.to_string(), FieldDefinition::required(simple(Kind::String)?)),
        (SYSTEM_DESCRIPTION.to_string(), FieldDefinition::optional(simple(Kind::String)?)),
        (SYSTEM_STATE.to_string(), FieldDefinition::required(states)),
        (SYSTEM_CREATOR.to_string(), FieldDefinition::required(simple(Kind::User)?)),
        (SYSTEM_ASSIGNEE.to_string(), FieldDefinition::optional(simple(Kind::User)?)),
        (SYSTEM_ITERATION.to_string(), FieldDefinition::optional(simple(Kind::String)?)),
        (SYSTEM_LABELS.to_string(), FieldDefinition::optional(labels)),
    ]))
}

/// Register the built-in types. Safe to call on every start.
///
/// # Errors
///
/// [`Error::BadParameter`] if a built-in name was registered earlier with a
/// different field set.
pub fn seed_system_types(conn: &Connection) -> Result<Vec<WorkItemType>> {
    transactional(conn, |tx| {
        let repo = WorkItemTypeRepository::new(tx);
        let mut seeded = vec![repo.create(None, SYSTEM_WORK_ITEM, base_fields()?)?];
        for name in EXTENDING_TYPES {
            seeded.push(repo.create(Some(SYSTEM_WORK_ITEM), name, BTreeMap::new())?);
        }
        tracing::debug!(count = seeded.len(), "seeded system work item types");
        Ok(seeded)
    })
}
