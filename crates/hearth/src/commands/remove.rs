//! Remove command

use anyhow::{anyhow, Context, Result};
use camino::Utf8Path;
use dialoguer::Confirm;

use super::common::Host;
use crate::cli::RemoveArgs;
use crate::output;

/// Remove an installed extension
///
/// Supports:
/// - Remove with confirmation: `hearth remove foo`
/// - Skip confirmation: `hearth remove foo -y`
pub async fn run(args: RemoveArgs, home: Option<&Utf8Path>) -> Result<()> {
    let host = Host::open(home)?;

    let record = host
        .registry
        .get(&args.id)
        .await
        .context("Failed to scan extensions")?
        .ok_or_else(|| anyhow!("Extension '{}' is not installed", args.id))?;

    if record.origin.is_bundled() {
        output::info(&format!("{} is bundled and cannot be removed; disable it instead", args.id));
        return Ok(());
    }

    if !args.yes {
        let confirmed = Confirm::new()
            .with_prompt(format!("Are you sure you want to remove '{}'?", args.id))
            .default(false)
            .interact()?;

        if !confirmed {
            output::info("Cancelled");
            return Ok(());
        }
    }

    host.pipeline()
        .remove_extension(&args.id)
        .await
        .with_context(|| format!("Failed to remove {}", args.id))?;

    if record.path.exists() {
        output::warning(&format!(
            "{} could not be deleted and will be removed on next start",
            record.path.display()
        ));
    } else {
        output::success(&format!("Removed {}", args.id));
    }
    Ok(())
}
