//! rollcall CLI - reconcile OCR-extracted roll records.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let data_dir = cli.data_dir;
    let result = match cli.command {
        Commands::Ingest {
            file,
            section,
            all_or_nothing,
            placeholders,
            range,
            actor,
            json,
        } => commands::ingest::run(
            &data_dir,
            file,
            section,
            all_or_nothing,
            placeholders,
            range,
            actor,
            json,
        ),

        Commands::Correct {
            file,
            create_missing,
            defer,
            actor,
            json,
        } => commands::correct::run(&data_dir, file, create_missing, defer, actor, json),

        Commands::Renumber { json } => commands::renumber::run(&data_dir, json),

        Commands::Report { section, json } => commands::report::run(&data_dir, section, json),

        Commands::Remove {
            target,
            reason,
            actor,
            json,
        } => commands::remove::run(&data_dir, target, reason, actor, json),

        Commands::History { limit, json } => commands::history::run(&data_dir, limit, json),

        Commands::Rollback { snapshot, json } => commands::rollback::run(&data_dir, snapshot, json),

        Commands::Export { output } => commands::export::run(&data_dir, output),

        Commands::Status { json } => commands::status::run(&data_dir, json),

        Commands::Range { section, range } => commands::settings::range(&data_dir, section, range),

        Commands::Order { sections } => commands::settings::order(&data_dir, sections),

        Commands::Prune { keep } => commands::settings::prune(&data_dir, keep),

        Commands::Find { field, needle, json } => commands::find::run(&data_dir, field, needle, json),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// `RUST_LOG` wins; otherwise warnings only, or debug with `--verbose`.
fn init_tracing(verbose: bool) {
    let default = if verbose { "rollcall=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
