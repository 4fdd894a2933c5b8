#![forbid(unsafe_code)]

mod cmd;
mod output;

use clap::{CommandFactory, Parser, Subcommand};
use output::OutputMode;
use std::env;
use std::process::ExitCode;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use witrack_core::{config, timing};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "wt: schema-driven work item tracker",
    long_about = None
)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Emit an operation timing report to stderr.
    #[arg(long, global = true)]
    timing: bool,

    /// Emit JSON output instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Lifecycle",
        about = "Initialize a witrack project",
        after_help = "EXAMPLES:\n    # Initialize a project in the current directory\n    wt init"
    )]
    Init(cmd::init::InitArgs),

    #[command(
        next_help_heading = "Schema",
        about = "Manage work item types",
        after_help = "EXAMPLES:\n    # Extend the bug type with a severity enum\n    wt type create custom.bug --extends system.bug \\\n        --fields '{\"x.severity\":{\"required\":true,\"type\":{\"kind\":\"enum\",\"base_kind\":\"string\",\"values\":[\"low\",\"high\"]}}}'"
    )]
    Type {
        #[command(subcommand)]
        command: cmd::types::TypeCommand,
    },

    #[command(
        next_help_heading = "Work items",
        about = "Create, read, update and delete work items",
        after_help = "EXAMPLES:\n    # Create a bug\n    wt item create --type system.bug --creator <id> --set 'system.title=Crash on save'\n\n    # List new items, five at a time\n    wt item list --filter '{\"system.state\":\"new\"}' --limit 5"
    )]
    Item {
        #[command(subcommand)]
        command: cmd::item::ItemCommand,
    },

    #[command(next_help_heading = "Planning", about = "Manage iterations")]
    Iteration {
        #[command(subcommand)]
        command: cmd::iteration::IterationCommand,
    },

    #[command(next_help_heading = "Planning", about = "Manage identities")]
    Identity {
        #[command(subcommand)]
        command: cmd::identity::IdentityCommand,
    },

    #[command(
        next_help_heading = "Project Maintenance",
        about = "Generate shell completion scripts"
    )]
    Completions(cmd::completions::CompletionsArgs),
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("WITRACK_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if env::var("DEBUG").is_ok() {
            "witrack=debug,info"
        } else {
            "witrack=info,warn"
        })
    });

    let format = env::var("WITRACK_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn output_mode(cli_json: bool) -> OutputMode {
    let user = config::load_user_config().unwrap_or_else(|err| {
        warn!("ignoring user config: {err:#}");
        config::UserConfig::default()
    });
    let env_format = env::var("FORMAT").ok();
    OutputMode::from_resolved(&config::resolve_output(
        cli_json,
        user.output.as_deref(),
        env_format.as_deref(),
    ))
}

fn main() -> ExitCode {
    init_tracing();

    let cli = Cli::parse();
    let timing_enabled = cli.timing || timing::enabled_from_env();
    timing::set_enabled(timing_enabled);
    timing::clear();

    if cli.verbose {
        info!("Verbose mode enabled");
    }

    let output = output_mode(cli.json);
    let command_result = env::current_dir()
        .map_err(anyhow::Error::from)
        .and_then(|cwd| match &cli.command {
            Commands::Init(args) => {
                timing::timed("cmd.init", || cmd::init::run_init(args, output, &cwd))
            }
            Commands::Type { command } => {
                timing::timed("cmd.type", || cmd::types::run_type(command, output, &cwd))
            }
            Commands::Item { command } => {
                timing::timed("cmd.item", || cmd::item::run_item(command, output, &cwd))
            }
            Commands::Iteration { command } => timing::timed("cmd.iteration", || {
                cmd::iteration::run_iteration(command, output, &cwd)
            }),
            Commands::Identity { command } => timing::timed("cmd.identity", || {
                cmd::identity::run_identity(command, output, &cwd)
            }),
            Commands::Completions(args) => timing::timed("cmd.completions", || {
                let mut command = Cli::command();
                cmd::completions::run_completions(args.shell, &mut command)
            }),
        });

    if timing_enabled {
        let report = timing::take_report();
        if report.is_empty() {
            eprintln!("timing report: no samples recorded");
        } else {
            eprintln!("timing report:");
            eprintln!("{}", report.render_table());
            if let Ok(json) = serde_json::to_string_pretty(&report) {
                eprintln!("timing report (json):");
                eprintln!("{json}");
            }
        }
    }

    match command_result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            output::render_error(output, &err);
            ExitCode::FAILURE
        }
    }
}
