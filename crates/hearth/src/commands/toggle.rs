//! Enable and disable commands

use anyhow::{Context, Result};
use camino::Utf8Path;

use super::common::Host;
use crate::cli::ToggleArgs;
use crate::output;

/// Persist the enabled flag of an extension
///
/// Takes effect on the next scan; the files are left in place.
pub async fn run(args: ToggleArgs, enabled: bool, home: Option<&Utf8Path>) -> Result<()> {
    let host = Host::open(home)?;

    host.registry
        .state()
        .set_enabled(&args.id, enabled)
        .with_context(|| format!("Failed to update state of {}", args.id))?;
    host.registry.invalidate().await;

    let verb = if enabled { "Enabled" } else { "Disabled" };
    output::success(&format!("{} {}", verb, args.id));
    Ok(())
}
