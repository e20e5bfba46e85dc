//! Archive builders for creating test packages
//!
//! Packages are described as a list of relative paths with contents and
//! written out as real zip or tar.gz archives.

#![allow(dead_code)]

use anyhow::{Context, Result};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

/// Builder for extension archives
#[derive(Debug, Clone, Default)]
pub struct PackageBuilder {
    files: Vec<(String, Vec<u8>)>,
    wrapper: Option<String>,
}

impl PackageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// A full extension with a manifest and `index.js`
    pub fn full(id: &str, version: &str) -> Self {
        Self::new()
            .with_manifest(&format!(
                r#"{{"id":"{}","name":"{}","version":"{}"}}"#,
                id, id, version
            ))
            .with_file("index.js", "module.exports.default = function init(context) {};\n")
    }

    /// A theme with one stylesheet directory
    pub fn theme(name: &str) -> Self {
        Self::new()
            .with_manifest(&format!(r#"{{"name":"{}","type":"theme"}}"#, name))
            .with_file("dark/style.scss", "$brand: #c0ffee;\n")
    }

    pub fn with_manifest(self, json: &str) -> Self {
        self.with_file("info.json", json)
    }

    pub fn with_file(mut self, path: &str, contents: &str) -> Self {
        self.files.push((path.to_string(), contents.as_bytes().to_vec()));
        self
    }

    /// Nest everything under `dir` inside the archive
    pub fn wrapped_in(mut self, dir: &str) -> Self {
        self.wrapper = Some(dir.to_string());
        self
    }

    fn entries(&self) -> Vec<(String, &[u8])> {
        self.files
            .iter()
            .map(|(path, data)| {
                let path = match &self.wrapper {
                    Some(wrapper) => format!("{}/{}", wrapper, path),
                    None => path.clone(),
                };
                (path, data.as_slice())
            })
            .collect()
    }

    /// Write a zip archive to `path`
    pub fn write_zip(&self, path: &Path) -> Result<PathBuf> {
        let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
        let mut zip = ZipWriter::new(file);
        let options = SimpleFileOptions::default();

        for (name, data) in self.entries() {
            zip.start_file(name.as_str(), options)
                .with_context(|| format!("adding {}", name))?;
            zip.write_all(data)?;
        }
        zip.finish().context("finishing zip archive")?;
        Ok(path.to_path_buf())
    }

    /// Write a gzip-compressed tar archive to `path`
    pub fn write_tar_gz(&self, path: &Path) -> Result<PathBuf> {
        let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
        let mut tar = tar::Builder::new(GzEncoder::new(file, Compression::default()));

        for (name, data) in self.entries() {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            tar.append_data(&mut header, &name, data)
                .with_context(|| format!("adding {}", name))?;
        }
        tar.into_inner()
            .context("finishing tar archive")?
            .finish()
            .context("finishing gzip stream")?;
        Ok(path.to_path_buf())
    }
}

/// A zip whose single entry climbs out of the extraction directory
pub fn write_escaping_zip(path: &Path) -> Result<PathBuf> {
    let file = File::create(path)?;
    let mut zip = ZipWriter::new(file);
    zip.start_file("../escaped.txt", SimpleFileOptions::default())?;
    zip.write_all(b"nope")?;
    zip.finish()?;
    Ok(path.to_path_buf())
}
