//! CLI argument parsing with clap

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};

/// Hearth - install and manage extensions
#[derive(Parser, Debug)]
#[command(name = "hearth")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config home (defaults to $HEARTH_HOME or ~/.hearth)
    #[arg(long, global = true, env = "HEARTH_HOME")]
    pub home: Option<Utf8PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Install an extension from an archive
    #[command(disable_version_flag = true)]
    Install(InstallArgs),

    /// List installed extensions
    List(ListArgs),

    /// Remove an installed extension
    Remove(RemoveArgs),

    /// Enable an extension on next start
    Enable(ToggleArgs),

    /// Disable an extension on next start
    Disable(ToggleArgs),

    /// Rescan the extension directories
    Scan(ScanArgs),
}

#[derive(Args, Debug)]
pub struct InstallArgs {
    /// Archive to install (.zip, .7z, .rar, .tar, .tar.gz)
    pub archive: Utf8PathBuf,

    /// Override the extension id
    #[arg(long)]
    pub id: Option<String>,

    /// Override the display name
    #[arg(long)]
    pub name: Option<String>,

    /// Override the version
    #[arg(long)]
    pub version: Option<String>,

    /// Remote catalog identifier
    #[arg(long)]
    pub mod_id: Option<u64>,

    /// Directory with a catalog.json index used to resolve dependencies
    #[arg(long)]
    pub catalog: Option<Utf8PathBuf>,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Only show extensions that have a newer copy elsewhere
    #[arg(long)]
    pub outdated: bool,
}

#[derive(Args, Debug)]
pub struct RemoveArgs {
    /// Extension id
    pub id: String,

    /// Skip confirmation
    #[arg(short, long)]
    pub yes: bool,
}

#[derive(Args, Debug)]
pub struct ToggleArgs {
    /// Extension id
    pub id: String,
}

#[derive(Args, Debug)]
pub struct ScanArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}
