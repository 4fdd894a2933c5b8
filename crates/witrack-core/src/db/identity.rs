use rusqlite::{Connection, OptionalExtension, params};
use tracing::info;
use uuid::Uuid;

use super::now_us;
use crate::error::{Error, Result};
use crate::model::identity::Identity;
use crate::timing::timed;

pub struct IdentityRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> IdentityRepository<'conn> {
    #[must_use]
    pub const fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    /// # Errors
    ///
    /// [`Error::BadParameter`] when `full_name` is blank.
    pub fn create(&self, full_name: &str, image_url: Option<&str>) -> Result<Identity> {
        let full_name = full_name.trim();
        if full_name.is_empty() {
            return Err(Error::bad_parameter("full_name", "name must not be empty"));
        }
        timed("db.identity.create", || {
            let identity = Identity {
                id: Uuid::new_v4(),
                full_name: full_name.to_string(),
                image_url: image_url.map(str::to_string),
            };
            self.conn.execute(
                "INSERT INTO identities (identity_id, full_name, image_url, created_at_us) \
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    identity.id.to_string(),
                    identity.full_name,
                    identity.image_url,
                    now_us()
                ],
            )?;
            info!(identity_id = %identity.id, "created identity");
            Ok(identity)
        })
    }

    /// # Errors
    ///
    /// [`Error::NotFound`] when no identity has `id`.
    pub fn load(&self, id: &Uuid) -> Result<Identity> {
        timed("db.identity.load", || {
            self.conn
                .query_row(
                    "SELECT identity_id, full_name, image_url FROM identities WHERE identity_id = ?1",
                    [id.to_string()],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, Option<String>>(2)?,
                        ))
                    },
                )
                .optional()?
                .map(to_identity)
                .transpose()?
                .ok_or_else(|| Error::not_found("identity", id.to_string()))
        })
    }

    /// # Errors
    ///
    /// [`Error::Internal`] on storage failure.
    pub fn exists(&self, id: &Uuid) -> Result<bool> {
        exists(self.conn, id)
    }

    /// All identities ordered by name.
    ///
    /// # Errors
    ///
    /// [`Error::Internal`] on storage failure.
    pub fn list(&self) -> Result<Vec<Identity>> {
        timed("db.identity.list", || {
            let mut stmt = self.conn.prepare(
                "SELECT identity_id, full_name, image_url FROM identities ORDER BY full_name, identity_id",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                ))
            })?;
            let mut identities = Vec::new();
            for row in rows {
                identities.push(to_identity(row?)?);
            }
            Ok(identities)
        })
    }
}

pub(crate) fn exists(conn: &Connection, id: &Uuid) -> Result<bool> {
    Ok(conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM identities WHERE identity_id = ?1)",
        [id.to_string()],
        |row| row.get(0),
    )?)
}

fn to_identity((id, full_name, image_url): (String, String, Option<String>)) -> Result<Identity> {
    let id = Uuid::parse_str(&id)
        .map_err(|err| Error::Internal(format!("stored identity id '{id}': {err}")))?;
    Ok(Identity {
        id,
        full_name,
        image_url,
    })
}
