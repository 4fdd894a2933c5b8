use crate::output::{OutputMode, pretty_kv, render};
use anyhow::{Context as _, Result};
use clap::Args;
use serde::Serialize;
use std::path::Path;
use witrack_core::config::{PROJECT_DIR, load_project_config};
use witrack_core::{db, system};

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Re-initialize even if `.witrack/` already exists.
    #[arg(long)]
    pub force: bool,
}

const CONFIG_TOML: &str = "[database]\n\
    path = \".witrack/witrack.sqlite3\"\n\
    busy_timeout_ms = 5000\n\
    \n\
    [paging]\n\
    default_limit = 20\n\
    max_limit = 100\n";

const GITIGNORE: &str = "*.sqlite3\n*.sqlite3-wal\n*.sqlite3-shm\n";

#[derive(Debug, Serialize)]
struct InitReport {
    project_dir: String,
    database: String,
    system_types: Vec<String>,
}

/// Execute `wt init`:
///
/// ```text
/// .witrack/
///   config.toml       (default project config)
///   .gitignore        (store files)
///   witrack.sqlite3   (migrated store with the system types)
/// ```
///
/// # Errors
///
/// Returns an error if `.witrack/` exists and `--force` is not set, or if
/// any filesystem or store operation fails.
pub fn run_init(args: &InitArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let project_dir = project_root.join(PROJECT_DIR);
    if project_dir.exists() && !args.force {
        anyhow::bail!("{PROJECT_DIR}/ already exists. Use `wt init --force` to reinitialize.");
    }

    std::fs::create_dir_all(&project_dir)
        .with_context(|| format!("Failed to create {}", project_dir.display()))?;

    let config_path = project_dir.join("config.toml");
    if !config_path.exists() {
        std::fs::write(&config_path, CONFIG_TOML)
            .with_context(|| format!("Failed to write config: {}", config_path.display()))?;
    }
    let gitignore_path = project_dir.join(".gitignore");
    std::fs::write(&gitignore_path, GITIGNORE)
        .with_context(|| format!("Failed to write {}", gitignore_path.display()))?;

    let config = load_project_config(project_root)?;
    let db_path = config.database_path(project_root);
    let conn = db::open_store(&db_path)?;
    let seeded = system::seed_system_types(&conn)?;

    let report = InitReport {
        project_dir: project_dir.display().to_string(),
        database: db_path.display().to_string(),
        system_types: seeded.into_iter().map(|ty| ty.name).collect(),
    };

    render(output, &report, |report, mode, w| {
        if mode == OutputMode::Text {
            return writeln!(w, "{}", report.project_dir);
        }
        writeln!(w, "Initialized {PROJECT_DIR}/ project structure.")?;
        writeln!(w)?;
        pretty_kv(w, "Database", &report.database)?;
        pretty_kv(w, "Config", config_path.display().to_string())?;
        pretty_kv(w, "System types", report.system_types.join(", "))?;
        writeln!(w)?;
        writeln!(w, "Next steps:")?;
        writeln!(w, "  wt identity create \"Your Name\"")?;
        writeln!(
            w,
            "  wt item create --type system.bug --creator <identity-id> --set 'system.title=First bug'"
        )
    })
}
