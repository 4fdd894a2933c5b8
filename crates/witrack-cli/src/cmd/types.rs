use super::Project;
use crate::output::{OutputMode, pretty_kv, pretty_section, render};
use anyhow::{Context as _, Result};
use clap::{Args, Subcommand};
use std::io::Write;
use std::path::Path;
use witrack_core::db::WorkItemTypeRepository;
use witrack_core::model::WorkItemType;
use witrack_core::model::field_definition::decode_fields;

#[derive(Subcommand, Debug)]
pub enum TypeCommand {
    /// Register a work item type.
    Create(CreateTypeArgs),
    /// Show one type and its fields.
    Show {
        /// Type name, e.g. `system.bug`.
        name: String,
    },
    /// List registered types.
    List {
        #[arg(long)]
        offset: Option<usize>,
        #[arg(long)]
        limit: Option<usize>,
    },
}

#[derive(Args, Debug)]
pub struct CreateTypeArgs {
    /// Type name: letters and dots only.
    pub name: String,

    /// Parent type whose fields are inherited.
    #[arg(long)]
    pub extends: Option<String>,

    /// Field definitions as a JSON object of name -> {"required", "type"}.
    #[arg(long, default_value = "{}")]
    pub fields: String,
}

/// # Errors
///
/// Returns an error if the project cannot be opened or the type operation
/// fails.
pub fn run_type(command: &TypeCommand, output: OutputMode, cwd: &Path) -> Result<()> {
    let project = Project::open(cwd)?;
    let repo = WorkItemTypeRepository::new(&project.conn);

    match command {
        TypeCommand::Create(args) => {
            let fields = decode_fields(&args.fields).context("--fields")?;
            let ty = repo.create(args.extends.as_deref(), &args.name, fields)?;
            render(output, &ty, render_type)
        }
        TypeCommand::Show { name } => {
            let ty = repo.load(name)?;
            render(output, &ty, render_type)
        }
        TypeCommand::List { offset, limit } => {
            let types = repo.list(*offset, *limit)?;
            render(output, &types, |types, mode, w| {
                if mode == OutputMode::Pretty {
                    pretty_section(w, "Work item types")?;
                }
                for ty in types {
                    writeln!(w, "{}\tv{}\t{} fields", ty.name, ty.version, ty.fields.len())?;
                }
                Ok(())
            })
        }
    }
}

fn render_type(ty: &WorkItemType, mode: OutputMode, w: &mut dyn Write) -> std::io::Result<()> {
    if mode == OutputMode::Text {
        return writeln!(w, "{}\tv{}\t{} fields", ty.name, ty.version, ty.fields.len());
    }

    pretty_section(w, &ty.name)?;
    pretty_kv(w, "Version", ty.version.to_string())?;
    writeln!(w)?;
    for (name, def) in &ty.fields {
        let shape = serde_json::to_string(&def.field_type).unwrap_or_default();
        let marker = if def.required { "*" } else { " " };
        writeln!(w, "{marker} {name:<24} {shape}")?;
    }
    Ok(())
}
