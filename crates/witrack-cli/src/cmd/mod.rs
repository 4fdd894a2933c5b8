pub mod completions;
pub mod identity;
pub mod init;
pub mod item;
pub mod iteration;
pub mod types;

use crate::output::CliError;
use anyhow::{Context as _, Result};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::time::Duration;
use witrack_core::config::{self, ProjectConfig};
use witrack_core::db;

/// An opened project: its root, config and store connection.
pub struct Project {
    pub root: PathBuf,
    pub config: ProjectConfig,
    pub conn: Connection,
}

impl Project {
    /// Locate the project containing `cwd` and open its store.
    ///
    /// # Errors
    ///
    /// [`CliError::NotInitialized`] when no `.witrack/` is found above
    /// `cwd`; [`CliError::ConfigParse`] for a malformed config; store
    /// failures otherwise.
    pub fn open(cwd: &Path) -> Result<Self> {
        let root = config::find_project_root(cwd).ok_or(CliError::NotInitialized)?;
        let config = config::load_project_config(&root)
            .map_err(|err| CliError::ConfigParse(format!("{err:#}")))?;
        let path = config.database_path(&root);
        let conn = db::open_store_with_timeout(
            &path,
            Duration::from_millis(config.database.busy_timeout_ms),
        )
        .with_context(|| format!("Failed to open store at {}", path.display()))?;

        Ok(Self { root, config, conn })
    }
}

/// Parse a JSON object argument such as `--fields '{"system.title":"x"}'`.
///
/// # Errors
///
/// Returns an error if `raw` is not a JSON object.
pub fn parse_object(flag: &str, raw: &str) -> Result<serde_json::Map<String, serde_json::Value>> {
    match serde_json::from_str(raw).with_context(|| format!("{flag} is not valid JSON"))? {
        serde_json::Value::Object(map) => Ok(map),
        _ => anyhow::bail!("{flag} must be a JSON object"),
    }
}

/// Parse `key=value` pairs; the value is JSON when it parses, else a string.
///
/// # Errors
///
/// Returns an error for a pair without `=` or with an empty key.
pub fn parse_assignments(
    pairs: &[String],
) -> Result<serde_json::Map<String, serde_json::Value>> {
    let mut map = serde_json::Map::new();
    for pair in pairs {
        let (key, raw) = pair
            .split_once('=')
            .with_context(|| format!("expected key=value, got '{pair}'"))?;
        let key = key.trim();
        if key.is_empty() {
            anyhow::bail!("empty field name in '{pair}'");
        }
        let value = serde_json::from_str(raw)
            .unwrap_or_else(|_| serde_json::Value::String(raw.to_string()));
        map.insert(key.to_string(), value);
    }
    Ok(map)
}
