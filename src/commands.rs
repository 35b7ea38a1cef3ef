// src/commands.rs
//! Command handlers for the squall CLI

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use squall::{
    CallbackProgress, FrameworkTarget, ProgressEvent, UpdateConfig, UpdateInfo, UpdateManager,
};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Build a manager for the given root and feed
fn manager(root: &str, source: &str, framework: Option<&str>) -> Result<UpdateManager> {
    let mut config = UpdateConfig::new(root, source);
    if let Some(profile) = framework {
        config.framework_target = FrameworkTarget::parse(profile)
            .with_context(|| format!("'{}' is not a framework profile (expected netXX)", profile))?;
    }
    Ok(UpdateManager::new(config)?)
}

/// A progress sink rendering an indicatif bar
fn progress_bar(label: &str) -> (Arc<ProgressBar>, CallbackProgress<impl Fn(ProgressEvent) + Send + Sync>) {
    let bar = Arc::new(ProgressBar::new(100));
    bar.set_style(
        ProgressStyle::with_template("{msg:20} [{bar:40}] {pos:>3}%")
            .expect("valid progress template")
            .progress_chars("=> "),
    );
    bar.set_message(label.to_string());

    let sink_bar = bar.clone();
    let sink = CallbackProgress::new(move |event| match event {
        ProgressEvent::Message(m) => sink_bar.set_message(m),
        ProgressEvent::Position { current, .. } => sink_bar.set_position(current),
        ProgressEvent::Finished(m) => sink_bar.finish_with_message(m),
        ProgressEvent::Error(m) => sink_bar.abandon_with_message(m),
    });
    (bar, sink)
}

fn describe_plan(info: &UpdateInfo) {
    match &info.currently_installed {
        Some(current) => println!("installed: {}", current.version),
        None => println!("installed: none (bootstrap)"),
    }
    println!("target:    {}", info.future_version());
    println!("releases to apply:");
    for entry in &info.releases_to_apply {
        let kind = if entry.is_delta { "delta" } else { "full" };
        println!("  {:5} {} ({} bytes)", kind, entry.filename, entry.filesize);
    }
}

pub fn check(root: &str, source: &str, ignore_deltas: bool) -> Result<()> {
    let manager = manager(root, source, None)?;
    let (_bar, sink) = progress_bar("checking");

    match manager.check_for_update(ignore_deltas, &sink)? {
        Some(info) => describe_plan(&info),
        None => println!("up to date"),
    }
    Ok(())
}

pub fn download(root: &str, source: &str, ignore_deltas: bool) -> Result<()> {
    let manager = manager(root, source, None)?;

    let (_bar, sink) = progress_bar("checking");
    let Some(info) = manager.check_for_update(ignore_deltas, &sink)? else {
        println!("up to date");
        return Ok(());
    };

    let (_bar, sink) = progress_bar("downloading");
    manager.download_releases(&info.releases_to_apply, &sink)?;
    println!(
        "downloaded {} release(s) for {}",
        info.releases_to_apply.len(),
        info.future_version()
    );
    Ok(())
}

pub fn update(root: &str, source: &str, ignore_deltas: bool, framework: &str) -> Result<()> {
    let manager = manager(root, source, Some(framework))?;

    let (_bar, sink) = progress_bar("checking");
    let Some(info) = manager.check_for_update(ignore_deltas, &sink)? else {
        println!("up to date");
        return Ok(());
    };
    describe_plan(&info);

    let (_bar, sink) = progress_bar("downloading");
    manager.download_releases(&info.releases_to_apply, &sink)?;

    let (_bar, sink) = progress_bar("installing");
    let launch_targets = manager.apply_releases(&info, &sink)?;

    info!("now at version {}", info.future_version());
    println!("updated to {}", info.future_version());
    for target in launch_targets {
        println!("launch: {}", target.display());
    }
    Ok(())
}

pub fn uninstall(root: &str) -> Result<()> {
    // The feed is irrelevant for an uninstall; the root itself serves.
    let manager = manager(root, root, None)?;
    let (_bar, sink) = progress_bar("uninstalling");
    manager.full_uninstall(&sink)?;
    println!("uninstalled {}", Path::new(root).display());
    Ok(())
}

pub fn fix_manifest(root: &str) -> Result<()> {
    let manager = manager(root, root, None)?;
    let (_bar, sink) = progress_bar("rewriting");
    manager.update_local_manifest(&sink)?;
    println!("manifest rewritten from disk");
    Ok(())
}
