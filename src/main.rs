use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{error, info};
use simplelog::{Config, LevelFilter, WriteLogger};

use papermaster::event_source::KeyboardEventSource;
use papermaster::library::{FileLibrary, Library, default_library_dir, resolve_log_path};
use papermaster::panic_handler::{initialize_panic_handler, restore_terminal, setup_terminal};
use papermaster::pdf::MupdfEngine;
use papermaster::settings;
use papermaster::{App, run_app_with_event_source};

/// Read PDF papers in the terminal and capture excerpts from them
#[derive(Parser, Debug)]
#[command(name = "papermaster", version, about)]
struct Cli {
    /// Library directory (defaults to the platform data directory)
    #[arg(long, global = true, value_name = "DIR")]
    library: Option<PathBuf>,

    /// Log level written to the log file
    #[arg(long, global = true, default_value = "info", value_name = "LEVEL")]
    log_level: LevelFilter,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Copy a PDF into the library
    Add {
        /// PDF file to import
        file: PathBuf,
    },
    /// List the papers in the library, newest first
    List,
    /// Check that the library is readable
    Status,
    /// Remove a paper and everything attached to it
    Remove {
        /// Paper id as shown by `list`
        id: i64,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_path = resolve_log_path()?;
    WriteLogger::init(
        cli.log_level,
        Config::default(),
        File::create(&log_path)
            .with_context(|| format!("Failed to create log file: {log_path:?}"))?,
    )?;

    info!("Starting papermaster");
    settings::load_settings();

    let library_dir = match cli.library.or_else(settings::get_library_dir) {
        Some(dir) => dir,
        None => default_library_dir()?,
    };
    let mut library = FileLibrary::open(&library_dir)
        .with_context(|| format!("Failed to open library at {library_dir:?}"))?;

    match cli.command {
        Some(Command::Add { file }) => {
            println!("{}", library.add_paper(&file)?);
            Ok(())
        }
        Some(Command::List) => {
            for paper in library.list_papers()? {
                println!(
                    "{:>4}  {}  {}",
                    paper.id,
                    paper.added_at.format("%Y-%m-%d %H:%M"),
                    paper.title
                );
            }
            Ok(())
        }
        Some(Command::Status) => {
            println!("{}", library.status());
            Ok(())
        }
        Some(Command::Remove { id }) => {
            let paper = library.remove_paper(id)?;
            println!("Removed: {}", paper.title);
            Ok(())
        }
        None => run_tui(library),
    }
}

fn run_tui(library: FileLibrary) -> Result<()> {
    initialize_panic_handler();
    let mut terminal = setup_terminal().context("Failed to set up terminal")?;

    let mut app = App::new(Box::new(library), Arc::new(MupdfEngine));
    let mut event_source = KeyboardEventSource;
    let res = run_app_with_event_source(&mut terminal, &mut app, &mut event_source);
    // tear down any open session before the terminal goes back
    drop(app);

    restore_terminal();
    terminal.show_cursor()?;

    if let Err(err) = res {
        error!("Application error: {err:?}");
        eprintln!("{err:?}");
    }

    info!("Shutting down papermaster");
    Ok(())
}
