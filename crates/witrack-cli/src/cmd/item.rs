use super::{Project, parse_assignments, parse_object};
use crate::output::{OutputMode, pretty_kv, pretty_section, render};
use anyhow::Result;
use clap::{Args, Subcommand};
use serde::Serialize;
use serde_json::{Map, Value};
use std::io::Write;
use std::path::Path;
use witrack_core::db::WorkItemRepository;
use witrack_core::model::WorkItem;
use witrack_core::model::work_item::{STATE_NEW, SYSTEM_STATE};
use witrack_core::paging::{Page, PagingLinks};
use witrack_core::query::Expression;

#[derive(Subcommand, Debug)]
pub enum ItemCommand {
    /// Create a work item.
    Create(CreateItemArgs),
    /// Show one work item.
    Show {
        id: String,
    },
    /// List work items, optionally filtered.
    List(ListItemArgs),
    /// Change fields of a work item at a known version.
    Update(UpdateItemArgs),
    /// Set or clear the assignee of a work item.
    Assign(AssignArgs),
    /// Delete a work item.
    Delete {
        id: String,
    },
}

#[derive(Args, Debug)]
pub struct CreateItemArgs {
    /// Work item type, e.g. `system.bug`.
    #[arg(long = "type", short = 't')]
    pub type_name: String,

    /// Identity id recorded as `system.creator`.
    #[arg(long)]
    pub creator: String,

    /// Field values as `name=value`; values that parse as JSON are used as JSON.
    #[arg(long = "set", short = 's', value_name = "NAME=VALUE")]
    pub set: Vec<String>,

    /// Field values as one JSON object, applied before `--set`.
    #[arg(long)]
    pub fields: Option<String>,
}

#[derive(Args, Debug)]
pub struct ListItemArgs {
    /// Equality filter as a JSON object, e.g. `{"system.state":"new"}`.
    #[arg(long)]
    pub filter: Option<String>,

    /// Rows to skip; malformed or negative values mean 0.
    #[arg(long, allow_hyphen_values = true)]
    pub offset: Option<String>,

    /// Page size; malformed or non-positive values mean the configured default.
    #[arg(long, allow_hyphen_values = true)]
    pub limit: Option<String>,
}

#[derive(Args, Debug)]
pub struct UpdateItemArgs {
    pub id: String,

    /// Version the change is based on; a stale version is rejected.
    #[arg(long)]
    pub version: i64,

    /// Move the item to another type.
    #[arg(long = "type")]
    pub type_name: Option<String>,

    #[arg(long = "set", short = 's', value_name = "NAME=VALUE")]
    pub set: Vec<String>,

    #[arg(long)]
    pub fields: Option<String>,
}

#[derive(Args, Debug)]
pub struct AssignArgs {
    pub id: String,

    #[arg(long)]
    pub version: String,

    /// Identity id of the new assignee.
    #[arg(long, conflicts_with = "clear", required_unless_present = "clear")]
    pub assignee: Option<String>,

    /// Remove the current assignee.
    #[arg(long)]
    pub clear: bool,
}

#[derive(Debug, Serialize)]
struct ItemPage {
    data: Vec<WorkItem>,
    meta: PageMeta,
    links: PageLinks,
}

#[derive(Debug, Serialize)]
struct PageMeta {
    total: u64,
    offset: usize,
    limit: usize,
}

#[derive(Debug, Serialize)]
struct PageLinks {
    first: String,
    last: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    prev: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    next: Option<String>,
}

impl From<PagingLinks> for PageLinks {
    fn from(links: PagingLinks) -> Self {
        Self {
            first: links.first.to_query(),
            last: links.last.to_query(),
            prev: links.prev.map(|page| page.to_query()),
            next: links.next.map(|page| page.to_query()),
        }
    }
}

/// # Errors
///
/// Returns an error if the project cannot be opened, an argument is
/// malformed, or the repository rejects the operation.
pub fn run_item(command: &ItemCommand, output: OutputMode, cwd: &Path) -> Result<()> {
    let project = Project::open(cwd)?;
    let repo = WorkItemRepository::new(&project.conn);

    match command {
        ItemCommand::Create(args) => {
            let mut fields = collect_fields(args.fields.as_deref(), &args.set)?;
            fields
                .entry(SYSTEM_STATE.to_string())
                .or_insert_with(|| Value::from(STATE_NEW));
            let item = repo.create(&args.type_name, &fields, &args.creator)?;
            render(output, &item, render_item)
        }
        ItemCommand::Show { id } => {
            let item = repo.load(id)?;
            render(output, &item, render_item)
        }
        ItemCommand::List(args) => {
            let filter = match &args.filter {
                Some(raw) => Expression::parse_simple(raw)?,
                None => Expression::True,
            };
            let page = Page::parse(
                args.offset.as_deref(),
                args.limit.as_deref(),
                &project.config.paging,
            );
            let (data, total) = repo.list(&filter, Some(page.offset), Some(page.limit))?;
            let links = PagingLinks::compute(
                page,
                data.len(),
                usize::try_from(total).unwrap_or(usize::MAX),
            );
            let result = ItemPage {
                data,
                meta: PageMeta {
                    total,
                    offset: page.offset,
                    limit: page.limit,
                },
                links: links.into(),
            };
            render(output, &result, render_page)
        }
        ItemCommand::Update(args) => {
            let mut item = repo.load(&args.id)?;
            for (name, value) in collect_fields(args.fields.as_deref(), &args.set)? {
                if value.is_null() {
                    item.fields.remove(&name);
                } else {
                    item.fields.insert(name, value);
                }
            }
            if let Some(type_name) = &args.type_name {
                item.type_name.clone_from(type_name);
            }
            item.version = args.version;
            let saved = repo.save_checked(&item)?;
            render(output, &saved, render_item)
        }
        ItemCommand::Assign(args) => {
            let assignee = if args.clear {
                None
            } else {
                args.assignee.as_deref()
            };
            let item = repo.update_assignee(&args.id, &args.version, assignee)?;
            render(output, &item, render_item)
        }
        ItemCommand::Delete { id } => {
            repo.delete(id)?;
            render(output, &serde_json::json!({ "deleted": id }), |_, mode, w| {
                if mode == OutputMode::Text {
                    writeln!(w, "{id}")
                } else {
                    writeln!(w, "Deleted work item {id}.")
                }
            })
        }
    }
}

fn collect_fields(json: Option<&str>, pairs: &[String]) -> Result<Map<String, Value>> {
    let mut fields = match json {
        Some(raw) => parse_object("--fields", raw)?,
        None => Map::new(),
    };
    fields.extend(parse_assignments(pairs)?);
    Ok(fields)
}

fn summary_line(item: &WorkItem) -> String {
    format!(
        "{}\t{}\t{}\t{}",
        item.id,
        item.type_name,
        item.state().unwrap_or("-"),
        item.title().unwrap_or("")
    )
}

fn render_item(item: &WorkItem, mode: OutputMode, w: &mut dyn Write) -> std::io::Result<()> {
    if mode == OutputMode::Text {
        return writeln!(w, "{}", summary_line(item));
    }

    pretty_section(w, &format!("#{} {}", item.id, item.title().unwrap_or("(untitled)")))?;
    pretty_kv(w, "Type", &item.type_name)?;
    pretty_kv(w, "Version", item.version.to_string())?;
    for (name, value) in &item.fields {
        let shown = value
            .as_str()
            .map_or_else(|| value.to_string(), str::to_string);
        pretty_kv(w, name, shown)?;
    }
    Ok(())
}

fn render_page(page: &ItemPage, mode: OutputMode, w: &mut dyn Write) -> std::io::Result<()> {
    if mode == OutputMode::Pretty {
        pretty_section(
            w,
            &format!(
                "Work items {}-{} of {}",
                page.meta.offset,
                page.meta.offset + page.data.len(),
                page.meta.total
            ),
        )?;
    }
    for item in &page.data {
        writeln!(w, "{}", summary_line(item))?;
    }
    if mode == OutputMode::Pretty {
        writeln!(w)?;
        pretty_kv(w, "first", &page.links.first)?;
        pretty_kv(w, "last", &page.links.last)?;
        if let Some(prev) = &page.links.prev {
            pretty_kv(w, "prev", prev)?;
        }
        if let Some(next) = &page.links.next {
            pretty_kv(w, "next", next)?;
        }
    }
    Ok(())
}
