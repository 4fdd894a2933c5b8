use super::Project;
use crate::output::{OutputMode, pretty_kv, pretty_section, render};
use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::{Args, Subcommand};
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use uuid::Uuid;
use witrack_core::db::{IterationRepository, WorkItemRepository};
use witrack_core::model::{Iteration, IterationState, NewIteration, WorkItemCounts};

#[derive(Subcommand, Debug)]
pub enum IterationCommand {
    /// Create an iteration in a space, or under a parent iteration.
    Create(CreateIterationArgs),
    /// Show one iteration.
    Show { id: Uuid },
    /// List the iterations of a space.
    List {
        #[arg(long)]
        space: Uuid,
    },
    /// Start an iteration; a space has at most one started iteration.
    Start { id: Uuid },
    /// Close an iteration.
    Close { id: Uuid },
    /// Work item totals per iteration of a space.
    Counts {
        #[arg(long)]
        space: Uuid,
    },
}

#[derive(Args, Debug)]
pub struct CreateIterationArgs {
    pub name: String,

    /// Owning space; a fresh one is generated when neither this nor
    /// `--parent` is given.
    #[arg(long, conflicts_with = "parent")]
    pub space: Option<Uuid>,

    /// Parent iteration; the child joins the parent's space.
    #[arg(long)]
    pub parent: Option<Uuid>,

    #[arg(long)]
    pub description: Option<String>,

    /// RFC 3339 timestamp.
    #[arg(long)]
    pub start_at: Option<DateTime<Utc>>,

    /// RFC 3339 timestamp.
    #[arg(long)]
    pub end_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
struct IterationCounts {
    iteration_id: Uuid,
    #[serde(flatten)]
    counts: WorkItemCounts,
}

/// # Errors
///
/// Returns an error if the project cannot be opened or the repository
/// rejects the operation.
pub fn run_iteration(command: &IterationCommand, output: OutputMode, cwd: &Path) -> Result<()> {
    let project = Project::open(cwd)?;
    let repo = IterationRepository::new(&project.conn);

    match command {
        IterationCommand::Create(args) => {
            let new = NewIteration {
                space_id: args.space.unwrap_or_else(Uuid::new_v4),
                name: args.name.clone(),
                description: args.description.clone(),
                start_at: args.start_at,
                end_at: args.end_at,
            };
            let iteration = match &args.parent {
                Some(parent) => repo.create_child(parent, &new)?,
                None => repo.create(&new)?,
            };
            render(output, &iteration, render_iteration)
        }
        IterationCommand::Show { id } => render(output, &repo.load(id)?, render_iteration),
        IterationCommand::List { space } => {
            let iterations = repo.list(space)?;
            render(output, &iterations, |iterations, mode, w| {
                if mode == OutputMode::Pretty {
                    pretty_section(w, &format!("Iterations in {space}"))?;
                }
                for iteration in iterations {
                    writeln!(w, "{}\t{}\t{}", iteration.id, iteration.state, iteration.name)?;
                }
                Ok(())
            })
        }
        IterationCommand::Start { id } => render(
            output,
            &repo.transition(id, IterationState::Start)?,
            render_iteration,
        ),
        IterationCommand::Close { id } => render(
            output,
            &repo.transition(id, IterationState::Close)?,
            render_iteration,
        ),
        IterationCommand::Counts { space } => {
            let counts: Vec<IterationCounts> = WorkItemRepository::new(&project.conn)
                .counts_per_iteration(space)?
                .into_iter()
                .map(|(iteration_id, counts)| IterationCounts {
                    iteration_id,
                    counts,
                })
                .collect();
            render(output, &counts, |counts, mode, w| {
                if mode == OutputMode::Pretty {
                    pretty_section(w, "Iteration\ttotal\tclosed")?;
                }
                for row in counts {
                    writeln!(
                        w,
                        "{}\t{}\t{}",
                        row.iteration_id, row.counts.total, row.counts.closed
                    )?;
                }
                Ok(())
            })
        }
    }
}

fn render_iteration(
    iteration: &Iteration,
    mode: OutputMode,
    w: &mut dyn Write,
) -> std::io::Result<()> {
    if mode == OutputMode::Text {
        return writeln!(w, "{}\t{}\t{}", iteration.id, iteration.state, iteration.name);
    }

    pretty_section(w, &iteration.name)?;
    pretty_kv(w, "Id", iteration.id.to_string())?;
    pretty_kv(w, "Space", iteration.space_id.to_string())?;
    if let Some(parent) = iteration.parent_id {
        pretty_kv(w, "Parent", parent.to_string())?;
    }
    pretty_kv(w, "State", iteration.state.as_str())?;
    if let Some(description) = &iteration.description {
        pretty_kv(w, "Description", description)?;
    }
    if let Some(start_at) = iteration.start_at {
        pretty_kv(w, "Starts", start_at.to_rfc3339())?;
    }
    if let Some(end_at) = iteration.end_at {
        pretty_kv(w, "Ends", end_at.to_rfc3339())?;
    }
    Ok(())
}
