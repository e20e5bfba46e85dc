//! Scan command

use anyhow::{Context, Result};
use camino::Utf8Path;
use serde::Serialize;

use super::common::Host;
use crate::cli::ScanArgs;
use crate::output;

#[derive(Serialize)]
struct ScanSummary {
    extensions: usize,
    outdated: Vec<String>,
    roots: Vec<String>,
}

/// Rescan the extension directories and summarize
///
/// Also purges extensions whose removal was deferred.
pub async fn run(args: ScanArgs, home: Option<&Utf8Path>) -> Result<()> {
    let host = Host::open(home)?;
    let registry = &host.registry;

    let extensions = registry
        .force_refresh()
        .await
        .context("Failed to scan extensions")?;
    let outdated = registry.outdated_extensions().await?;

    let summary = ScanSummary {
        extensions: extensions.len(),
        outdated: outdated
            .iter()
            .map(|r| format!("{} {} ({})", r.id, r.version, r.path.display()))
            .collect(),
        roots: registry
            .roots()
            .iter()
            .map(|r| r.path.display().to_string())
            .collect(),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    output::header("Extension scan");
    for root in &summary.roots {
        output::kv("directory", root);
    }
    output::kv("loaded", &summary.extensions.to_string());
    if summary.outdated.is_empty() {
        output::success("All extensions are current");
    } else {
        output::warning(&format!("{} outdated copies:", summary.outdated.len()));
        for entry in &summary.outdated {
            println!("    {}", entry);
        }
    }
    Ok(())
}
