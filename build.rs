// build.rs

use clap::{Arg, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

/// Common argument: installation root directory
fn root_arg() -> Arg {
    Arg::new("root")
        .short('r')
        .long("root")
        .value_name("DIR")
        .required(true)
        .help("Installation root directory")
}

/// Common argument: release feed source
fn source_arg() -> Arg {
    Arg::new("source")
        .short('s')
        .long("source")
        .value_name("URL|DIR")
        .required(true)
        .help("Release feed: an http(s) URL or a local directory")
}

fn ignore_deltas_arg() -> Arg {
    Arg::new("ignore_deltas")
        .long("ignore-deltas")
        .action(clap::ArgAction::SetTrue)
        .help("Plan with full packages only, skipping deltas")
}

fn build_cli() -> Command {
    Command::new("squall")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Client-side application update engine")
        .subcommand_required(true)
        .subcommand(
            Command::new("check")
                .about("Check the feed and print the update plan")
                .arg(root_arg())
                .arg(source_arg())
                .arg(ignore_deltas_arg()),
        )
        .subcommand(
            Command::new("download")
                .about("Download and verify the releases an update needs")
                .arg(root_arg())
                .arg(source_arg())
                .arg(ignore_deltas_arg()),
        )
        .subcommand(
            Command::new("update")
                .about("Check, download, and apply in one pass")
                .arg(root_arg())
                .arg(source_arg())
                .arg(ignore_deltas_arg())
                .arg(
                    Arg::new("framework")
                        .long("framework")
                        .default_value("net45")
                        .help("Framework profile ceiling, e.g. net45"),
                ),
        )
        .subcommand(
            Command::new("uninstall")
                .about("Remove the installation entirely")
                .arg(root_arg()),
        )
        .subcommand(
            Command::new("fix-manifest")
                .about("Rewrite packages/RELEASES from the artifacts on disk")
                .arg(root_arg()),
        )
        .subcommand(
            Command::new("completions")
                .about("Generate shell completion scripts")
                .arg(
                    Arg::new("shell")
                        .required(true)
                        .value_parser(["bash", "zsh", "fish", "powershell"])
                        .help("Shell type"),
                ),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    let manifest_dir = match env::var("CARGO_MANIFEST_DIR") {
        Ok(dir) => PathBuf::from(dir),
        Err(e) => {
            println!("cargo:warning=CARGO_MANIFEST_DIR not set: {}", e);
            return;
        }
    };
    let man_dir = manifest_dir.join("man");

    if let Err(e) = fs::create_dir_all(&man_dir) {
        println!("cargo:warning=Failed to create man directory: {}", e);
        return;
    }

    let cmd = build_cli();
    let man = Man::new(cmd);
    let mut buffer = Vec::new();

    if let Err(e) = man.render(&mut buffer) {
        println!("cargo:warning=Failed to render man page: {}", e);
        return;
    }

    let man_path = man_dir.join("squall.1");
    if let Err(e) = fs::write(&man_path, buffer) {
        println!("cargo:warning=Failed to write man page: {}", e);
    }
}
