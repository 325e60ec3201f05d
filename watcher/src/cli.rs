use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "tilehawk", version, about = "Canvas monitor for WPlace pixel-art projects")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the long-lived tile-polling monitor.
    Monitor,
    /// Rebuild the database from tiles, projects, and snapshots on disk.
    Rebuild,
}
