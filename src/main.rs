// src/main.rs
//! Squall update engine - CLI entry point

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use std::io;

mod cli;
mod commands;

use cli::{Cli, Commands};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Check {
            root,
            source,
            ignore_deltas,
        } => commands::check(&root, &source, ignore_deltas),

        Commands::Download {
            root,
            source,
            ignore_deltas,
        } => commands::download(&root, &source, ignore_deltas),

        Commands::Update {
            root,
            source,
            ignore_deltas,
            framework,
        } => commands::update(&root, &source, ignore_deltas, &framework),

        Commands::Uninstall { root } => commands::uninstall(&root),

        Commands::FixManifest { root } => commands::fix_manifest(&root),

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            generate(shell, &mut cmd, name, &mut io::stdout());
            Ok(())
        }
    }
}
