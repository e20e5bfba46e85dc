//! Install command

use anyhow::{Context, Result};
use camino::Utf8Path;
use hearth_extensions::events::InstallEvent;
use hearth_extensions::{ExtensionInfo, LocalCatalog};
use std::sync::Arc;

use super::common::Host;
use crate::cli::InstallArgs;
use crate::output;

fn caller_info(args: &InstallArgs) -> Option<ExtensionInfo> {
    let info = ExtensionInfo {
        id: args.id.clone(),
        name: args.name.clone(),
        version: args.version.clone(),
        mod_id: args.mod_id,
        ..Default::default()
    };
    (!info.is_empty()).then_some(info)
}

/// Install an extension archive
///
/// Supports:
/// - Plain install: `hearth install foo.zip`
/// - Metadata overrides: `hearth install foo.zip --name "Foo" --mod-id 123`
/// - Dependencies from a local catalog: `hearth install app.zip --catalog ./catalog`
pub async fn run(args: InstallArgs, home: Option<&Utf8Path>) -> Result<()> {
    let host = Host::open(home)?;
    let mut pipeline = host.pipeline();

    if let Some(dir) = &args.catalog {
        let catalog = Arc::new(
            LocalCatalog::open(dir.as_std_path())
                .await
                .with_context(|| format!("Failed to open catalog at {}", dir))?,
        );
        pipeline = pipeline.with_catalog(catalog.clone(), catalog);
    }

    let spinner = output::spinner(&format!("Installing {}", args.archive));
    let mut events = pipeline.subscribe();
    let progress = spinner.clone();
    let watcher = tokio::spawn(async move {
        while let Ok(envelope) = events.recv().await {
            match envelope.event {
                InstallEvent::StateChanged { state, .. } => progress.set_message(state),
                InstallEvent::DependencyInstalling { dependency, .. } => {
                    progress.set_message(format!("installing dependency {}", dependency))
                }
                _ => {}
            }
        }
    });

    let caller = caller_info(&args);
    let result = pipeline
        .install_extension(args.archive.as_std_path(), caller.as_ref())
        .await;
    spinner.finish_and_clear();
    drop(pipeline);
    let _ = watcher.await;

    let report = match result {
        Err(e) if e.is_silent() => {
            output::info(&e.to_string());
            return Ok(());
        }
        other => other.with_context(|| format!("Failed to install {}", args.archive))?,
    };

    let record = &report.record;
    if report.manifest_only {
        output::success(&format!("Updated manifest of {} to {}", record.id, record.version));
    } else {
        output::success(&format!("Installed {} {} ({})", record.id, record.version, record.kind));
    }
    output::kv("path", &record.path.display().to_string());
    if !report.installed_dependencies.is_empty() {
        output::kv("dependencies", &report.installed_dependencies.join(", "));
    }
    if !report.missing_dependencies.is_empty() {
        output::warning(&format!(
            "Missing dependencies: {}",
            report.missing_dependencies.join(", ")
        ));
    }
    if report.registry_stale {
        output::warning("The extension will be loaded on next start");
    }
    Ok(())
}
