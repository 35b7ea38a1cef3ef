// src/cli.rs
//! CLI definitions for the squall update engine
//!
//! This module contains all command-line interface definitions using clap.
//! The actual command implementations are in the `commands` module.

use clap::{Parser, Subcommand};
use clap_complete::Shell;

#[derive(Parser)]
#[command(name = "squall")]
#[command(version)]
#[command(about = "Client-side application update engine", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Check the feed and print the update plan
    Check {
        /// Installation root directory
        #[arg(short, long)]
        root: String,

        /// Release feed: an http(s) URL or a local directory
        #[arg(short, long)]
        source: String,

        /// Plan with full packages only, skipping deltas
        #[arg(long)]
        ignore_deltas: bool,
    },

    /// Download and verify the releases an update needs
    Download {
        /// Installation root directory
        #[arg(short, long)]
        root: String,

        /// Release feed: an http(s) URL or a local directory
        #[arg(short, long)]
        source: String,

        /// Plan with full packages only, skipping deltas
        #[arg(long)]
        ignore_deltas: bool,
    },

    /// Check, download, and apply in one pass
    Update {
        /// Installation root directory
        #[arg(short, long)]
        root: String,

        /// Release feed: an http(s) URL or a local directory
        #[arg(short, long)]
        source: String,

        /// Plan with full packages only, skipping deltas
        #[arg(long)]
        ignore_deltas: bool,

        /// Framework profile ceiling, e.g. net45
        #[arg(long, default_value = "net45")]
        framework: String,
    },

    /// Remove the installation entirely
    Uninstall {
        /// Installation root directory
        #[arg(short, long)]
        root: String,
    },

    /// Rewrite packages/RELEASES from the artifacts on disk
    FixManifest {
        /// Installation root directory
        #[arg(short, long)]
        root: String,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}
