// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use lineage_cli::commands::{counter, events};

#[derive(Parser)]
#[command(name = "lineage")]
#[command(about = "Operator tool for the lineage event store", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect or repair the sequence counter
    Counter {
        #[command(subcommand)]
        action: CounterAction,
    },
    /// Browse events stored on the filesystem backend
    Events {
        #[command(subcommand)]
        action: EventsAction,
    },
}

#[derive(Subcommand)]
enum CounterAction {
    /// Show the counter value and who holds its lock
    Show {
        #[arg(long, default_value = "lineage-data/counter.txt")]
        counter: PathBuf,
    },
    /// Overwrite the counter (recovery for a corrupted file)
    Set {
        #[arg(long, default_value = "lineage-data/counter.txt")]
        counter: PathBuf,

        value: u64,

        /// How long to wait for the counter lock
        #[arg(long, default_value_t = 3000)]
        timeout_ms: u64,
    },
}

#[derive(Subcommand)]
enum EventsAction {
    /// List stored events in identifier order
    List {
        #[arg(long, short, default_value = "lineage-data")]
        dir: PathBuf,
    },
    /// Print one stored event
    Show {
        #[arg(long, short, default_value = "lineage-data")]
        dir: PathBuf,

        /// Event identifier or file name
        id: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Counter { action } => match action {
            CounterAction::Show { counter } => counter::show(&counter),
            CounterAction::Set {
                counter,
                value,
                timeout_ms,
            } => counter::set(&counter, value, Duration::from_millis(timeout_ms)),
        },
        Commands::Events { action } => match action {
            EventsAction::List { dir } => events::list(&dir),
            EventsAction::Show { dir, id } => events::show(&dir, &id),
        },
    }
}
