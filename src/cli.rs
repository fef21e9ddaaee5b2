use clap::{Parser, Subcommand};
use std::rc::Rc;
use thiserror::Error;

use crate::collection::{TodoCollection, ValidationError};
use crate::config::Config;
use crate::models::{Priority, Status, TodoPatch};
use crate::record::TodoItem;
use crate::utils::{format_for_display, normalize_due};

#[derive(Parser)]
#[command(name = "todo")]
#[command(about = "A small persistent to-do list")]
#[command(version)]
pub struct Cli {
    /// Custom config file path
    #[arg(short, long)]
    pub config: Option<String>,

    /// Use development mode (uses separate dev config/database)
    #[arg(long)]
    pub dev: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Add a new item
    Add {
        /// What needs doing
        detail: String,
        /// Who owns the item (defaults to the configured owner)
        #[arg(long)]
        owner: Option<String>,
        /// Status code, e.g. NYS, INP
        #[arg(long)]
        status: Option<String>,
        /// Priority code: LOW, MED, HIGH, CRIT
        #[arg(long)]
        priority: Option<String>,
        /// Due date (YYYY-MM-DD or YYYY-MM-DDTHH:MM)
        #[arg(long)]
        due: Option<String>,
        /// Comma-separated tags
        #[arg(long)]
        tags: Option<String>,
    },
    /// List items, open ones first (default if no subcommand)
    List {
        /// Only items with this status code
        #[arg(long)]
        status: Option<String>,
        /// Only items owned by this person
        #[arg(long)]
        owner: Option<String>,
        /// Include archived items
        #[arg(long)]
        all: bool,
        /// Print items as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show every field of one item
    Show {
        /// Item id or unique id prefix
        id: String,
    },
    /// Move an item to another status
    Status {
        /// Item id or unique id prefix
        id: String,
        /// New status code
        status: String,
    },
    /// Archive an item
    Archive {
        /// Item id or unique id prefix
        id: String,
        /// Restore the item instead
        #[arg(long)]
        undo: bool,
    },
    /// Change fields of an item
    Edit {
        /// Item id or unique id prefix
        id: String,
        #[arg(long)]
        detail: Option<String>,
        #[arg(long)]
        owner: Option<String>,
        #[arg(long)]
        priority: Option<String>,
        /// New due date
        #[arg(long, conflicts_with = "clear_due")]
        due: Option<String>,
        /// Remove the due date
        #[arg(long)]
        clear_due: bool,
        /// Comma-separated tags, replacing the current ones
        #[arg(long)]
        tags: Option<String>,
    },
    /// Delete an item
    Remove {
        /// Item id or unique id prefix
        id: String,
        /// Skip the confirmation requirement
        #[arg(short, long)]
        yes: bool,
    },
    /// Delete every closed or archived item
    ClearArchive,
    /// Delete every item
    Clear {
        /// Skip the confirmation requirement
        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error("{0}")]
    Validation(#[from] ValidationError),
    #[error("Failed to parse date: {0}")]
    DateParseError(String),
    #[error("Unknown status `{0}`")]
    UnknownStatus(String),
    #[error("Status `{0}` is not enabled in the configuration")]
    StatusDisabled(String),
    #[error("Unknown priority `{0}`")]
    UnknownPriority(String),
    #[error("No item matches `{0}`")]
    NotFound(String),
    #[error("`{0}` matches more than one item; use more of the id")]
    AmbiguousId(String),
    #[error("Nothing to change")]
    NothingToChange,
    #[error("Refusing to {0} without --yes")]
    ConfirmationRequired(&'static str),
}

/// Handle the add command
#[allow(clippy::too_many_arguments)]
pub fn handle_add(
    detail: String,
    owner: Option<String>,
    status: Option<String>,
    priority: Option<String>,
    due: Option<String>,
    tags: Option<String>,
    todos: &TodoCollection,
    config: &Config,
) -> Result<Rc<TodoItem>, CliError> {
    let mut patch = TodoPatch::new().detail(detail);
    if let Some(owner) = owner {
        patch = patch.owner(owner);
    }
    if let Some(status) = status {
        patch = patch.status(check_status(&status, config)?.code());
    }
    if let Some(priority) = priority {
        patch = patch.priority(check_priority(&priority)?.code());
    }
    if let Some(due) = due {
        patch = patch.due_at(Some(parse_due_arg(&due)?));
    }
    if let Some(tags) = tags {
        patch = patch.tags(split_tags(&tags));
    }

    // Assign order value (max + 1)
    let patch = config.defaults.fill(patch).sort_order(todos.next_sort_order());

    let item = todos.add(patch)?;
    println!("Item created successfully (ID: {})", item.id());
    Ok(item)
}

/// Handle the list command
pub fn handle_list(
    status: Option<String>,
    owner: Option<String>,
    all: bool,
    json: bool,
    todos: &TodoCollection,
    config: &Config,
) -> Result<(), CliError> {
    let status = status.map(|code| parse_status(&code)).transpose()?;

    let items: Vec<Rc<TodoItem>> = todos
        .sorted_for_display()
        .into_iter()
        .filter(|item| all || !item.is_archived())
        .filter(|item| status.is_none_or(|status| item.status() == Some(status)))
        .filter(|item| owner.as_deref().is_none_or(|owner| item.owner() == owner))
        .collect();

    if json {
        let values: Vec<serde_json::Value> = items.iter().map(|item| item.to_json()).collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&values).unwrap_or_else(|_| "[]".to_string())
        );
        return Ok(());
    }

    if items.is_empty() {
        println!("No items");
        return Ok(());
    }

    let now = chrono::Utc::now();
    for item in &items {
        println!("{}", summary_line(item, config, now));
    }
    println!("{} open", todos.open_count());
    Ok(())
}

/// Handle the show command
pub fn handle_show(id: String, todos: &TodoCollection, config: &Config) -> Result<(), CliError> {
    let item = find_item(todos, &id)?;
    let data = item.snapshot();
    let date_format = &config.ui.date_format;

    println!("ID:        {}", data.id);
    println!("Detail:    {}", data.detail.as_deref().unwrap_or(""));
    println!("Owner:     {}", data.owner);
    println!("Status:    {}", code_with_label(&data.status, data.status().map(Status::label)));
    println!(
        "Priority:  {}",
        code_with_label(&data.priority, data.priority().map(Priority::label))
    );
    if let Some(due) = &data.due_at {
        println!("Due:       {}", format_for_display(due, date_format));
    }
    if !data.tags.is_empty() {
        println!("Tags:      {}", data.tags.join(", "));
    }
    println!("Added:     {}", format_for_display(&data.added_at, date_format));
    println!("Amended:   {}", format_for_display(&data.amended_at, date_format));
    if let Some(completed) = &data.completed_at {
        println!("Completed: {}", format_for_display(completed, date_format));
    }
    if data.is_archived {
        println!("Archived");
    }
    Ok(())
}

/// Handle the status command
pub fn handle_status(
    id: String,
    status: String,
    todos: &TodoCollection,
    config: &Config,
) -> Result<(), CliError> {
    let status = check_status(&status, config)?;
    let item = find_item(todos, &id)?;
    item.set(TodoPatch::new().status(status.code()));
    println!("Item {} is now {}", item.id(), status.label());
    Ok(())
}

/// Handle the archive command
pub fn handle_archive(id: String, undo: bool, todos: &TodoCollection) -> Result<(), CliError> {
    let item = find_item(todos, &id)?;
    item.set(TodoPatch::new().archived(!undo));
    if undo {
        println!("Item {} restored", item.id());
    } else {
        println!("Item {} archived", item.id());
    }
    Ok(())
}

/// Handle the edit command
#[allow(clippy::too_many_arguments)]
pub fn handle_edit(
    id: String,
    detail: Option<String>,
    owner: Option<String>,
    priority: Option<String>,
    due: Option<String>,
    clear_due: bool,
    tags: Option<String>,
    todos: &TodoCollection,
) -> Result<(), CliError> {
    let item = find_item(todos, &id)?;

    let mut patch = TodoPatch::new();
    if let Some(detail) = detail {
        patch = patch.detail(detail);
    }
    if let Some(owner) = owner {
        patch = patch.owner(owner);
    }
    if let Some(priority) = priority {
        patch = patch.priority(check_priority(&priority)?.code());
    }
    if clear_due {
        patch = patch.due_at(None);
    } else if let Some(due) = due {
        patch = patch.due_at(Some(parse_due_arg(&due)?));
    }
    if let Some(tags) = tags {
        patch = patch.tags(split_tags(&tags));
    }
    if patch.is_empty() {
        return Err(CliError::NothingToChange);
    }

    // Check the edited record before touching the stored one
    let candidate = TodoItem::new(item.snapshot().into());
    candidate.set(patch.clone());
    let validation = candidate.validate();
    if !validation.is_valid() {
        return Err(ValidationError {
            errors: validation.errors,
        }
        .into());
    }

    item.set(patch);
    println!("Item {} updated", item.id());
    Ok(())
}

/// Handle the remove command
pub fn handle_remove(
    id: String,
    yes: bool,
    todos: &TodoCollection,
    config: &Config,
) -> Result<(), CliError> {
    if config.ui.confirm_on_delete && !yes {
        return Err(CliError::ConfirmationRequired("remove an item"));
    }
    let item = find_item(todos, &id)?;
    todos.remove(&item.id());
    println!("Item {} removed", item.id());
    Ok(())
}

/// Handle the clear-archive command
pub fn handle_clear_archive(todos: &TodoCollection) -> Result<(), CliError> {
    let removed = todos.clear_archive();
    println!("Removed {} closed or archived item(s)", removed);
    Ok(())
}

/// Handle the clear command
pub fn handle_clear(yes: bool, todos: &TodoCollection, config: &Config) -> Result<(), CliError> {
    if config.ui.confirm_on_delete && !yes {
        return Err(CliError::ConfirmationRequired("clear every item"));
    }
    let count = todos.len();
    todos.clear();
    println!("Removed {} item(s)", count);
    Ok(())
}

/// Resolve a full id or a unique id prefix.
pub fn find_item(todos: &TodoCollection, id: &str) -> Result<Rc<TodoItem>, CliError> {
    if let Some(item) = todos.get(id) {
        return Ok(item);
    }
    let mut matches = todos.filter(|item| item.id().starts_with(id));
    match matches.len() {
        0 => Err(CliError::NotFound(id.to_string())),
        1 => Ok(matches.remove(0)),
        _ => Err(CliError::AmbiguousId(id.to_string())),
    }
}

fn parse_status(code: &str) -> Result<Status, CliError> {
    code.trim()
        .to_ascii_uppercase()
        .parse()
        .map_err(|_| CliError::UnknownStatus(code.to_string()))
}

fn check_status(code: &str, config: &Config) -> Result<Status, CliError> {
    let status = parse_status(code)?;
    if !config.statuses.is_enabled(status) {
        return Err(CliError::StatusDisabled(status.code().to_string()));
    }
    Ok(status)
}

fn check_priority(code: &str) -> Result<Priority, CliError> {
    code.trim()
        .to_ascii_uppercase()
        .parse()
        .map_err(|_| CliError::UnknownPriority(code.to_string()))
}

fn parse_due_arg(due: &str) -> Result<String, CliError> {
    normalize_due(due)
        .ok_or_else(|| CliError::DateParseError(format!("Invalid date format '{}'", due)))
}

fn split_tags(tags: &str) -> Vec<String> {
    tags.split(',')
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(str::to_string)
        .collect()
}

fn code_with_label(code: &str, label: Option<&str>) -> String {
    match label {
        Some(label) => format!("{} ({})", code, label),
        None => code.to_string(),
    }
}

fn summary_line(item: &TodoItem, config: &Config, now: chrono::DateTime<chrono::Utc>) -> String {
    let data = item.snapshot();
    let short_id: String = data.id.chars().take(8).collect();
    let mut line = format!(
        "{}  [{}] {:<4} {}",
        short_id,
        data.status,
        data.priority,
        data.detail.as_deref().unwrap_or("")
    );
    if config.ui.show_owner && !data.owner.is_empty() {
        line.push_str(&format!("  @{}", data.owner));
    }
    if let Some(due) = &data.due_at {
        line.push_str(&format!("  due {}", format_for_display(due, &config.ui.date_format)));
        if item.is_overdue(now) {
            line.push_str(" (overdue)");
        }
    }
    if !data.tags.is_empty() {
        line.push_str(&format!("  #{}", data.tags.join(" #")));
    }
    if data.is_archived {
        line.push_str("  (archived)");
    }
    line
}
