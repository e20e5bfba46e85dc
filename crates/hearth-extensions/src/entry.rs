//! Entry script discovery
//!
//! A freshly extracted tree can list a file before it is visible to a stat,
//! so the full search is repeated under the entry-lookup retry policy
//! before concluding that a package has no entry script.

use crate::error::Error;
use hearth_core::retry::retry;
use hearth_core::types::RetryPolicy;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

const ENTRY_NAMES: &[&str] = &["main.js", "extension.js", "plugin.js"];
const BUILD_DIRS: &[&str] = &["dist", "src", "lib", "build"];
const SCRIPT_EXTENSIONS: &[&str] = &["js", "mjs", "cjs"];
const PREFERRED_STEMS: &[&str] = &["index", "main", "extension", "plugin"];
const SCAN_DEPTH: usize = 3;

fn is_file(path: &Path) -> bool {
    path.metadata().map(|m| m.is_file()).unwrap_or(false)
}

/// `main` from a `package.json` in `dir`, if it names an existing file
fn package_main(dir: &Path) -> Option<PathBuf> {
    let raw = std::fs::read_to_string(dir.join("package.json")).ok()?;
    let value: serde_json::Value = serde_json::from_str(&raw).ok()?;
    let main = value.get("main")?.as_str()?;
    let candidate = dir.join(main.trim_start_matches("./"));
    if is_file(&candidate) {
        return Some(candidate);
    }
    // "main": "dist/index" without an extension
    let with_ext = candidate.with_extension("js");
    is_file(&with_ext).then_some(with_ext)
}

fn is_skipped_dir(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .map(|n| n.starts_with('.') || n == "node_modules")
            .unwrap_or(false)
}

fn scan_for_script(root: &Path) -> Option<PathBuf> {
    let mut scripts: Vec<(usize, usize, PathBuf)> = WalkDir::new(root)
        .max_depth(SCAN_DEPTH)
        .into_iter()
        .filter_entry(|e| !is_skipped_dir(e))
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            e.path()
                .extension()
                .and_then(|x| x.to_str())
                .map(|x| SCRIPT_EXTENSIONS.contains(&x))
                .unwrap_or(false)
        })
        .map(|e| {
            let stem = e.path().file_stem().and_then(|s| s.to_str()).unwrap_or("");
            let rank = PREFERRED_STEMS
                .iter()
                .position(|p| *p == stem)
                .unwrap_or(PREFERRED_STEMS.len());
            (rank, e.depth(), e.into_path())
        })
        .collect();

    scripts.sort();
    scripts.into_iter().next().map(|(_, _, path)| path)
}

/// One pass over every known location, in priority order
fn search(root: &Path) -> Option<PathBuf> {
    let index = root.join("index.js");
    if is_file(&index) {
        return Some(index);
    }

    for dir in BUILD_DIRS {
        let candidate = root.join(dir).join("index.js");
        if is_file(&candidate) {
            return Some(candidate);
        }
    }

    let dirs: Vec<PathBuf> = std::iter::once(root.to_path_buf())
        .chain(BUILD_DIRS.iter().map(|d| root.join(d)))
        .collect();

    for dir in &dirs {
        for name in ENTRY_NAMES {
            let candidate = dir.join(name);
            if is_file(&candidate) {
                return Some(candidate);
            }
        }
    }

    if let Some(main) = dirs.iter().find_map(|d| package_main(d)) {
        return Some(main);
    }

    scan_for_script(root)
}

/// Locates the script a host loads to activate an extension
#[derive(Debug, Clone)]
pub struct EntryScriptResolver {
    policy: RetryPolicy,
}

impl EntryScriptResolver {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Search `root`, retrying the whole search while nothing is found
    ///
    /// `None` means the search came up empty on every attempt.
    pub async fn resolve(&self, root: &Path) -> Option<PathBuf> {
        let found = retry("entry script lookup", &self.policy, move || async move {
            let dir = root.to_path_buf();
            tokio::task::spawn_blocking(move || search(&dir))
                .await
                .map_err(|e| Error::Temporary(format!("entry search task failed: {}", e)))?
                .ok_or_else(|| {
                    Error::io(root, io::Error::new(io::ErrorKind::NotFound, "no entry script"))
                })
        })
        .await;

        match found {
            Ok(path) => {
                debug!("Entry script for {}: {}", root.display(), path.display());
                Some(path)
            }
            Err(_) => None,
        }
    }

    /// Single search without retries, for the synchronous startup scan
    pub fn resolve_immediate(root: &Path) -> Option<PathBuf> {
        search(root)
    }

}
