use std::path::Path;
use std::rc::Rc;

use clap::Parser;
use color_eyre::Result;
use todo_core::{
    Config, Profile, SqliteSubstrate, StoreAdapter, TodoCollection,
    cli::{self, Cli, Commands},
    logging,
};

fn main() -> Result<()> {
    // Set up error reporting with color-eyre
    color_eyre::install()?;

    // Parse CLI arguments
    let cli = Cli::parse();

    // Determine profile: --dev flag enables dev mode, otherwise use prod
    let profile = if cli.dev {
        Profile::Dev
    } else {
        Profile::Prod
    };

    // An explicit --config file wins over the profile's config
    let config = match &cli.config {
        Some(path) => Config::load_from_path(Path::new(path))?,
        None => Config::load_with_profile(profile)?,
    };

    logging::init_logging(&config.log_level, &config.get_log_dir())?;

    // Open the database and the namespaced view the collection persists through
    let db_path = config.get_database_path();
    let db = SqliteSubstrate::open(
        db_path
            .to_str()
            .ok_or_else(|| color_eyre::eyre::eyre!("Database path contains invalid UTF-8"))?,
    )?;
    let store = StoreAdapter::new(
        Rc::new(db),
        &config.storage.namespace,
        config.storage.version,
    );
    let todos = TodoCollection::new(store);
    let _storage_warning = todos.on_storage_error(|err| {
        eprintln!("Warning: changes were not saved: {}", err);
    });

    // Dispatch to appropriate command handler
    match cli.command.unwrap_or(Commands::List {
        status: None,
        owner: None,
        all: false,
        json: false,
    }) {
        Commands::Add {
            detail,
            owner,
            status,
            priority,
            due,
            tags,
        } => {
            cli::handle_add(detail, owner, status, priority, due, tags, &todos, &config)?;
        }
        Commands::List {
            status,
            owner,
            all,
            json,
        } => {
            cli::handle_list(status, owner, all, json, &todos, &config)?;
        }
        Commands::Show { id } => {
            cli::handle_show(id, &todos, &config)?;
        }
        Commands::Status { id, status } => {
            cli::handle_status(id, status, &todos, &config)?;
        }
        Commands::Archive { id, undo } => {
            cli::handle_archive(id, undo, &todos)?;
        }
        Commands::Edit {
            id,
            detail,
            owner,
            priority,
            due,
            clear_due,
            tags,
        } => {
            cli::handle_edit(id, detail, owner, priority, due, clear_due, tags, &todos)?;
        }
        Commands::Remove { id, yes } => {
            cli::handle_remove(id, yes, &todos, &config)?;
        }
        Commands::ClearArchive => {
            cli::handle_clear_archive(&todos)?;
        }
        Commands::Clear { yes } => {
            cli::handle_clear(yes, &todos, &config)?;
        }
    }

    Ok(())
}
