//! Filesystem helpers for freshly extracted trees
//!
//! Extraction tools exit before every platform reports the written tree
//! consistently. These helpers wait for a directory to settle, strip
//! wrapper folders, and publish a finished tree with a single rename.

use crate::error::{Error, IoResultExt, Result};
use hearth_core::retry::{retry, retry_blocking};
use hearth_core::types::{RetryPolicy, SettleConfig};
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// OS metadata that never counts as package content
const METADATA_ENTRIES: &[&str] = &["__MACOSX", "Thumbs.db", "desktop.ini"];

/// Whether a top-level entry is hidden or OS metadata
pub fn is_ignorable_entry(name: &str) -> bool {
    name.starts_with('.') || METADATA_ENTRIES.iter().any(|m| m.eq_ignore_ascii_case(name))
}

/// Names of content entries directly inside `dir`
fn content_entries(dir: &Path) -> io::Result<Vec<(String, bool)>> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if is_ignorable_entry(&name) {
            continue;
        }
        entries.push((name, entry.file_type()?.is_dir()));
    }
    Ok(entries)
}

/// Hoist a sole wrapper directory into `dir`, repeatedly
///
/// Returns the number of levels removed. Applying it twice is the same as
/// applying it once.
pub fn flatten_blocking(dir: &Path, policy: &RetryPolicy) -> Result<usize> {
    let mut levels = 0;

    loop {
        let entries = content_entries(dir).at(dir)?;
        let wrapper = match entries.as_slice() {
            [(name, true)] => dir.join(name),
            _ => return Ok(levels),
        };

        // Rename first so a child named like the wrapper cannot collide
        let staging = dir.join(format!(".hearth-flatten-{}", uuid::Uuid::new_v4()));
        retry_blocking("flatten wrapper", policy, || {
            fs::rename(&wrapper, &staging).at(&wrapper)
        })?;

        for entry in fs::read_dir(&staging).at(&staging)? {
            let entry = entry.at(&staging)?;
            let target = dir.join(entry.file_name());
            if target.exists() {
                // only ignorable metadata can be in the way
                remove_path(&target).at(&target)?;
            }
            let from = entry.path();
            retry_blocking("hoist entry", policy, || fs::rename(&from, &target).at(&from))?;
        }

        retry_blocking("remove wrapper", policy, || {
            fs::remove_dir(&staging).at(&staging)
        })?;

        levels += 1;
        debug!("Flattened wrapper directory {}", wrapper.display());
    }
}

/// Async wrapper around [`flatten_blocking`]
pub async fn flatten(dir: &Path, policy: &RetryPolicy) -> Result<usize> {
    let dir = dir.to_path_buf();
    let policy = policy.clone();
    tokio::task::spawn_blocking(move || flatten_blocking(&dir, &policy))
        .await
        .map_err(|e| Error::Temporary(format!("flatten task failed: {}", e)))?
}

fn remove_path(path: &Path) -> io::Result<()> {
    if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

/// How a settle wait ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleOutcome {
    /// The listing was identical for the required number of polls
    Stable,
    /// A recognizable extension file appeared
    MarkerFound,
    /// The deadline passed first
    TimedOut,
}

fn snapshot(dir: &Path) -> BTreeSet<PathBuf> {
    WalkDir::new(dir)
        .min_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter_map(|e| e.path().strip_prefix(dir).ok().map(Path::to_path_buf))
        .collect()
}

/// Poll `dir` until its listing stops changing
///
/// Returns early once a file named in `markers` appears at most two levels
/// deep. Never fails: on timeout a warning is logged and the caller
/// proceeds with whatever is on disk.
pub async fn settle(dir: &Path, config: &SettleConfig, markers: &[&str]) -> SettleOutcome {
    let deadline = Instant::now() + config.timeout();
    let mut previous: Option<BTreeSet<PathBuf>> = None;
    let mut stable = 0u32;

    loop {
        let root = dir.to_path_buf();
        let current = tokio::task::spawn_blocking(move || snapshot(&root))
            .await
            .unwrap_or_default();

        let marker_found = current.iter().any(|p| {
            p.components().count() <= 2
                && p.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| markers.contains(&n))
                    .unwrap_or(false)
        });
        if marker_found {
            debug!("{} settled early on marker file", dir.display());
            return SettleOutcome::MarkerFound;
        }

        if previous.as_ref() == Some(&current) && !current.is_empty() {
            stable += 1;
            if stable >= config.stable_checks {
                debug!("{} settled with {} entries", dir.display(), current.len());
                return SettleOutcome::Stable;
            }
        } else {
            stable = 0;
        }
        previous = Some(current);

        if Instant::now() >= deadline {
            warn!(
                "{} did not settle within {}ms, continuing",
                dir.display(),
                config.timeout_ms
            );
            return SettleOutcome::TimedOut;
        }
        tokio::time::sleep(config.poll_interval()).await;
    }
}

/// Turn an extension id into a safe directory name
pub fn sanitize_dir_name(id: &str) -> String {
    const RESERVED: &[&str] = &[
        "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "LPT1", "LPT2", "LPT3",
    ];

    let cleaned: String = id
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let cleaned = cleaned.trim().trim_end_matches(['.', ' ']).to_string();

    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        return "extension".to_string();
    }
    if RESERVED.iter().any(|r| r.eq_ignore_ascii_case(&cleaned)) {
        return format!("{}_", cleaned);
    }
    cleaned
}

/// Unique hidden sibling of `dest` to extract into
pub fn unique_temp_sibling(dest: &Path, hint: &str) -> PathBuf {
    let parent = dest.parent().unwrap_or_else(|| Path::new("."));
    parent.join(format!(
        ".{}.installing-{}",
        sanitize_dir_name(hint),
        uuid::Uuid::new_v4().simple()
    ))
}

#[cfg(windows)]
const NOT_SAME_DEVICE: i32 = 17;
#[cfg(not(windows))]
const NOT_SAME_DEVICE: i32 = 18; // EXDEV

fn crosses_devices(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::CrossesDevices || err.raw_os_error() == Some(NOT_SAME_DEVICE)
}

/// Copy a directory tree
pub fn copy_dir_recursive(src: &Path, dest: &Path) -> Result<()> {
    fs::create_dir_all(dest).at(dest)?;
    for entry in WalkDir::new(src).min_depth(1) {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(src).to_path_buf();
            Error::io(path, io::Error::other(e.to_string()))
        })?;
        let Ok(relative) = entry.path().strip_prefix(src) else {
            continue;
        };
        let target = dest.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).at(&target)?;
        } else {
            fs::copy(entry.path(), &target).at(entry.path())?;
        }
    }
    Ok(())
}

/// Remove a directory, logging instead of failing
///
/// Returns whether the directory is gone afterwards.
pub async fn remove_dir_best_effort(path: &Path, policy: &RetryPolicy) -> bool {
    let result = retry("remove directory", policy, move || async move {
        match tokio::fs::remove_dir_all(path).await {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other.at(path),
        }
    })
    .await;

    match result {
        Ok(()) => true,
        Err(e) => {
            warn!("Failed to remove {}: {}", path.display(), Error::from(e));
            false
        }
    }
}

/// Publish `src` at `dest` with a single rename
///
/// An existing `dest` is removed first. When the rename crosses
/// filesystems the tree is copied and the source removed instead.
pub async fn relocate(src: &Path, dest: &Path, policy: &RetryPolicy) -> Result<()> {
    if tokio::fs::try_exists(dest).await.unwrap_or(false) {
        retry("remove destination", policy, move || async move {
            match tokio::fs::remove_dir_all(dest).await {
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
                other => other.at(dest),
            }
        })
        .await?;
    }

    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await.at(parent)?;
    }

    let renamed = retry("relocate", policy, move || async move {
        match tokio::fs::rename(src, dest).await {
            Err(e) if crosses_devices(&e) => Ok(false),
            other => other.map(|_| true).at(src),
        }
    })
    .await?;

    if !renamed {
        debug!(
            "Rename across devices, copying {} to {}",
            src.display(),
            dest.display()
        );
        let (from, to) = (src.to_path_buf(), dest.to_path_buf());
        tokio::task::spawn_blocking(move || copy_dir_recursive(&from, &to))
            .await
            .map_err(|e| Error::Temporary(format!("copy task failed: {}", e)))??;
        remove_dir_best_effort(src, policy).await;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hearth_core::types::RetryStrategy;
    use std::time::Duration;
    use tempfile::TempDir;
    use test_case::test_case;

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 2,
            strategy: RetryStrategy::FixedDelay,
            backoff_multiplier: 1.0,
            initial_delay_ms: 1,
            max_delay_ms: 1,
        }
    }

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"x").unwrap();
    }

    #[test_case("__MACOSX", true)]
    #[test_case(".DS_Store", true)]
    #[test_case("thumbs.db", true)]
    #[test_case("index.js", false)]
    #[test_case("dist", false)]
    fn test_ignorable_entries(name: &str, expected: bool) {
        assert_eq!(is_ignorable_entry(name), expected);
    }

    #[test_case("foo", "foo")]
    #[test_case("My Extension: Deluxe", "My Extension_ Deluxe")]
    #[test_case("a/b\\c", "a_b_c")]
    #[test_case("trailing...", "trailing")]
    #[test_case("", "extension")]
    #[test_case("con", "con_")]
    fn test_sanitize_dir_name(input: &str, expected: &str) {
        assert_eq!(sanitize_dir_name(input), expected);
    }

    #[test]
    fn test_flatten_hoists_nested_wrappers() {
        let temp = TempDir::new().unwrap();
        touch(&temp.path().join("outer/inner/index.js"));
        touch(&temp.path().join("outer/inner/info.json"));
        touch(&temp.path().join("__MACOSX/outer/._index.js"));

        let levels = flatten_blocking(temp.path(), &fast_policy()).unwrap();

        assert_eq!(levels, 2);
        assert!(temp.path().join("index.js").is_file());
        assert!(temp.path().join("info.json").is_file());
        assert!(!temp.path().join("outer").exists());
    }

    #[test]
    fn test_flatten_keeps_dir_with_sibling_file() {
        let temp = TempDir::new().unwrap();
        touch(&temp.path().join("dist/index.js"));
        touch(&temp.path().join("info.json"));

        assert_eq!(flatten_blocking(temp.path(), &fast_policy()).unwrap(), 0);
        assert!(temp.path().join("dist/index.js").is_file());
    }

    #[test]
    fn test_flatten_handles_child_named_like_wrapper() {
        let temp = TempDir::new().unwrap();
        touch(&temp.path().join("pkg/pkg/index.js"));
        touch(&temp.path().join("pkg/info.json"));

        flatten_blocking(temp.path(), &fast_policy()).unwrap();

        assert!(temp.path().join("pkg/index.js").is_file());
        assert!(temp.path().join("info.json").is_file());
    }

    #[tokio::test]
    async fn test_settle_returns_on_marker() {
        let temp = TempDir::new().unwrap();
        touch(&temp.path().join("wrapper/info.json"));

        let config = SettleConfig {
            poll_interval_ms: 10,
            stable_checks: 50,
            timeout_ms: 5000,
        };
        let outcome = settle(temp.path(), &config, &["info.json", "index.js"]).await;
        assert_eq!(outcome, SettleOutcome::MarkerFound);
    }

    #[tokio::test]
    async fn test_settle_detects_stable_listing() {
        let temp = TempDir::new().unwrap();
        touch(&temp.path().join("style.scss"));

        let config = SettleConfig {
            poll_interval_ms: 5,
            stable_checks: 2,
            timeout_ms: 5000,
        };
        let outcome = settle(temp.path(), &config, &["info.json"]).await;
        assert_eq!(outcome, SettleOutcome::Stable);
    }

    #[tokio::test]
    async fn test_settle_times_out_on_empty_dir() {
        let temp = TempDir::new().unwrap();
        let config = SettleConfig {
            poll_interval_ms: 5,
            stable_checks: 2,
            timeout_ms: 30,
        };

        let start = Instant::now();
        let outcome = settle(temp.path(), &config, &["info.json"]).await;
        assert_eq!(outcome, SettleOutcome::TimedOut);
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_relocate_replaces_existing_destination() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join(".foo.installing-1");
        let dest = temp.path().join("foo");
        touch(&src.join("index.js"));
        touch(&dest.join("stale.js"));

        relocate(&src, &dest, &fast_policy()).await.unwrap();

        assert!(dest.join("index.js").is_file());
        assert!(!dest.join("stale.js").exists());
        assert!(!src.exists());
    }

    #[tokio::test]
    async fn test_remove_missing_dir_is_ok() {
        let temp = TempDir::new().unwrap();
        assert!(remove_dir_best_effort(&temp.path().join("absent"), &fast_policy()).await);
    }

    #[test]
    fn test_unique_temp_sibling_is_hidden_and_unique() {
        let dest = Path::new("/plugins/foo");
        let a = unique_temp_sibling(dest, "foo");
        let b = unique_temp_sibling(dest, "foo");

        assert_ne!(a, b);
        assert_eq!(a.parent(), Some(Path::new("/plugins")));
        assert!(a
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with(".foo.installing-"));
    }

    #[test]
    fn test_copy_dir_recursive() {
        let temp = TempDir::new().unwrap();
        touch(&temp.path().join("src/a/b.txt"));
        touch(&temp.path().join("src/c.txt"));

        copy_dir_recursive(&temp.path().join("src"), &temp.path().join("dst")).unwrap();
        assert!(temp.path().join("dst/a/b.txt").is_file());
        assert!(temp.path().join("dst/c.txt").is_file());
    }
}
