use super::Project;
use crate::output::{OutputMode, pretty_section, render};
use anyhow::Result;
use clap::Subcommand;
use std::io::Write;
use std::path::Path;
use witrack_core::db::IdentityRepository;

#[derive(Subcommand, Debug)]
pub enum IdentityCommand {
    /// Register an identity that can create or be assigned work items.
    Create {
        full_name: String,
        #[arg(long)]
        image_url: Option<String>,
    },
    /// List identities by name.
    List,
}

/// # Errors
///
/// Returns an error if the project cannot be opened or the repository
/// rejects the operation.
pub fn run_identity(command: &IdentityCommand, output: OutputMode, cwd: &Path) -> Result<()> {
    let project = Project::open(cwd)?;
    let repo = IdentityRepository::new(&project.conn);

    match command {
        IdentityCommand::Create {
            full_name,
            image_url,
        } => {
            let identity = repo.create(full_name, image_url.as_deref())?;
            render(output, &identity, |identity, _, w| {
                writeln!(w, "{}\t{}", identity.id, identity.full_name)
            })
        }
        IdentityCommand::List => {
            let identities = repo.list()?;
            render(output, &identities, |identities, mode, w| {
                if mode == OutputMode::Pretty {
                    pretty_section(w, "Identities")?;
                }
                for identity in identities {
                    writeln!(w, "{}\t{}", identity.id, identity.full_name)?;
                }
                Ok(())
            })
        }
    }
}
