use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};

/// Directory holding a project's config and database.
pub const PROJECT_DIR: &str = ".witrack";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub paging: PagingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Relative paths resolve against the project root.
    #[serde(default = "default_database_path")]
    pub path: PathBuf,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PagingConfig {
    #[serde(default = "default_limit")]
    pub default_limit: usize,
    #[serde(default = "default_max_limit")]
    pub max_limit: usize,
}

impl Default for PagingConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            max_limit: default_max_limit(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserConfig {
    #[serde(default)]
    pub output: Option<String>,
}

impl ProjectConfig {
    /// Absolute database path for a project rooted at `project_root`.
    #[must_use]
    pub fn database_path(&self, project_root: &Path) -> PathBuf {
        if self.database.path.is_absolute() {
            self.database.path.clone()
        } else {
            project_root.join(&self.database.path)
        }
    }
}

/// Load `.witrack/config.toml`, falling back to defaults when absent.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_project_config(project_root: &Path) -> Result<ProjectConfig> {
    let path = project_root.join(PROJECT_DIR).join("config.toml");
    if !path.exists() {
        return Ok(ProjectConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<ProjectConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// Load `<config_dir>/witrack/config.toml`.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_user_config() -> Result<UserConfig> {
    let Some(config_dir) = dirs::config_dir() else {
        return Ok(UserConfig::default());
    };

    let path = config_dir.join("witrack/config.toml");
    if !path.exists() {
        return Ok(UserConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<UserConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// Walk upward from `start` to the nearest directory containing `.witrack/`.
#[must_use]
pub fn find_project_root(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(PROJECT_DIR).is_dir())
        .map(Path::to_path_buf)
}

/// `--json` beats `FORMAT`, which beats the user config; otherwise pretty
/// on a terminal and plain text when piped.
#[must_use]
pub fn resolve_output(
    cli_json: bool,
    user_output: Option<&str>,
    env_format: Option<&str>,
) -> String {
    fn normalize(raw: &str) -> Option<&'static str> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pretty" | "human" => Some("pretty"),
            "text" | "plain" => Some("text"),
            "json" => Some("json"),
            _ => None,
        }
    }

    if cli_json {
        return "json".to_string();
    }

    env_format
        .and_then(normalize)
        .or_else(|| user_output.and_then(normalize))
        .unwrap_or_else(|| {
            if std::io::stdout().is_terminal() {
                "pretty"
            } else {
                "text"
            }
        })
        .to_string()
}

fn default_database_path() -> PathBuf {
    Path::new(PROJECT_DIR).join("witrack.sqlite3")
}

const fn default_busy_timeout_ms() -> u64 {
    5_000
}

const fn default_limit() -> usize {
    20
}

const fn default_max_limit() -> usize {
    100
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_project_config_uses_defaults() {
        let dir = tempfile::tempdir().expect("temp dir");
        let cfg = load_project_config(dir.path()).expect("load should succeed");
        assert_eq!(cfg.database.path, PathBuf::from(".witrack/witrack.sqlite3"));
        assert_eq!(cfg.database.busy_timeout_ms, 5_000);
        assert_eq!(cfg.paging.default_limit, 20);
        assert_eq!(cfg.paging.max_limit, 100);
        assert_eq!(
            cfg.database_path(dir.path()),
            dir.path().join(".witrack/witrack.sqlite3")
        );
    }

    #[test]
    fn partial_project_config_fills_defaults() {
        let dir = tempfile::tempdir().expect("temp dir");
        std::fs::create_dir_all(dir.path().join(PROJECT_DIR)).expect("mkdir");
        std::fs::write(
            dir.path().join(".witrack/config.toml"),
            "[paging]\nmax_limit = 50\n",
        )
        .expect("write config");

        let cfg = load_project_config(dir.path()).expect("load");
        assert_eq!(cfg.paging.max_limit, 50);
        assert_eq!(cfg.paging.default_limit, 20);
        assert_eq!(cfg.database.busy_timeout_ms, 5_000);
    }

    #[test]
    fn malformed_project_config_is_an_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        std::fs::create_dir_all(dir.path().join(PROJECT_DIR)).expect("mkdir");
        std::fs::write(dir.path().join(".witrack/config.toml"), "[paging\n").expect("write");

        let err = load_project_config(dir.path()).expect_err("parse should fail");
        assert!(err.to_string().contains("Failed to parse"));
    }

    #[test]
    fn cli_json_overrides_env_and_config() {
        assert_eq!(resolve_output(true, Some("pretty"), Some("text")), "json");
    }

    #[test]
    fn env_beats_user_config() {
        assert_eq!(resolve_output(false, Some("json"), Some("human")), "pretty");
        assert_eq!(resolve_output(false, Some("json"), Some("bogus")), "json");
    }

    #[test]
    fn user_config_applies_without_env_or_flag() {
        assert_eq!(resolve_output(false, Some("json"), None), "json");
    }

    #[test]
    fn project_root_is_found_from_subdirectories() {
        let dir = tempfile::tempdir().expect("temp dir");
        std::fs::create_dir_all(dir.path().join(PROJECT_DIR)).expect("mkdir");
        let nested = dir.path().join("a/b");
        std::fs::create_dir_all(&nested).expect("mkdir nested");

        assert_eq!(find_project_root(&nested), Some(dir.path().to_path_buf()));
    }
}
