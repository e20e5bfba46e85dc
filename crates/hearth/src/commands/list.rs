//! List command

use anyhow::{Context, Result};
use camino::Utf8Path;
use hearth_extensions::ExtensionRecord;
use tabled::{
    settings::{object::Columns, Modify, Style, Width},
    Table, Tabled,
};

use super::common::Host;
use crate::cli::ListArgs;
use crate::output;

#[derive(Tabled)]
struct ExtensionRow {
    id: String,
    name: String,
    version: String,
    kind: String,
    origin: String,
    status: String,
    description: String,
}

impl From<&ExtensionRecord> for ExtensionRow {
    fn from(record: &ExtensionRecord) -> Self {
        Self {
            id: record.id.clone(),
            name: record.name.clone(),
            version: record.version.clone(),
            kind: record.kind.to_string(),
            origin: record.origin.to_string(),
            status: if record.outdated { "outdated" } else { "active" }.to_string(),
            description: record.description.clone(),
        }
    }
}

/// List installed extensions
///
/// Supports:
/// - Table output: `hearth list`
/// - Outdated only: `hearth list --outdated`
/// - JSON output: `hearth list --json`
pub async fn run(args: ListArgs, home: Option<&Utf8Path>) -> Result<()> {
    let host = Host::open(home)?;
    let registry = &host.registry;

    let records: Vec<ExtensionRecord> = if args.outdated {
        registry
            .outdated_extensions()
            .await
            .context("Failed to scan extensions")?
    } else {
        registry
            .installed_extensions()
            .await
            .context("Failed to scan extensions")?
            .into_values()
            .collect()
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    if records.is_empty() {
        output::info("No extensions found");
        return Ok(());
    }

    let rows: Vec<ExtensionRow> = records.iter().map(ExtensionRow::from).collect();
    let mut table = Table::new(rows);
    table.with(Style::sharp());
    table.with(Modify::new(Columns::new(6..7)).with(Width::wrap(50).keep_words(true)));
    println!("{}", table);

    let disabled: Vec<String> = registry
        .state()
        .load()
        .context("Failed to read extension state")?
        .into_iter()
        .filter(|(_, state)| !state.enabled)
        .map(|(id, _)| id)
        .collect();
    if !disabled.is_empty() && !args.outdated {
        output::kv("disabled", &disabled.join(", "));
    }
    Ok(())
}
