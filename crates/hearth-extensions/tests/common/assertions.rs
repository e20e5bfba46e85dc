//! Assertions over the on-disk extension layout

#![allow(dead_code)]

use std::fs;
use std::path::Path;

/// No hidden extraction directories remain in `root`
pub fn assert_no_temp_dirs(root: &Path) {
    let leftovers: Vec<String> = fs::read_dir(root)
        .expect("Failed to read extension directory")
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|name| name.contains(".installing-"))
        .collect();
    assert!(leftovers.is_empty(), "leftover temp directories: {:?}", leftovers);
}

/// Names of the directories directly under `root`, sorted
pub fn installed_dirs(root: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(root)
        .expect("Failed to read extension directory")
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_dir())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

/// Parsed `info.json` of an installed extension
pub fn read_manifest(dir: &Path) -> serde_json::Value {
    let raw = fs::read_to_string(dir.join("info.json")).expect("Failed to read info.json");
    serde_json::from_str(&raw).expect("info.json is not valid JSON")
}

pub fn assert_installed_at(dir: &Path, files: &[&str]) {
    assert!(dir.is_dir(), "{} was not installed", dir.display());
    for file in files {
        assert!(
            dir.join(file).exists(),
            "{} is missing from {}",
            file,
            dir.display()
        );
    }
}
