//! Manifest types
//!
//! `info.json` is written by extension authors, so every field is optional
//! and unknown fields are preserved when the manifest is rewritten.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Contents of an extension's `info.json`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Declared package kind (`theme`, `translation`, `game`, or a code kind)
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    /// Remote catalog identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mod_id: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// Fields this crate does not interpret
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ExtensionInfo {
    /// Overlay `caller` on top of `self`; caller fields win where present
    pub fn merged_with(self, caller: &ExtensionInfo) -> ExtensionInfo {
        let mut extra = self.extra;
        extra.extend(caller.extra.clone());

        ExtensionInfo {
            id: caller.id.clone().or(self.id),
            name: caller.name.clone().or(self.name),
            author: caller.author.clone().or(self.author),
            version: caller.version.clone().or(self.version),
            description: caller.description.clone().or(self.description),
            kind: caller.kind.clone().or(self.kind),
            mod_id: caller.mod_id.or(self.mod_id),
            namespace: caller.namespace.clone().or(self.namespace),
            extra,
        }
    }

    /// True when no field is set
    pub fn is_empty(&self) -> bool {
        *self == ExtensionInfo::default()
    }
}

/// Where a manifest came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestSource {
    /// Parsed from `info.json`
    File,
    /// Derived from the folder name because `info.json` is absent
    Synthesized,
}

/// A manifest with its resolved identity
#[derive(Debug, Clone, PartialEq)]
pub struct Manifest {
    /// Declared id, or the folder name
    pub id: String,
    pub info: ExtensionInfo,
    pub source: ManifestSource,
}

impl Manifest {
    pub fn name(&self) -> &str {
        self.info.name.as_deref().unwrap_or(&self.id)
    }

    pub fn version(&self) -> &str {
        self.info.version.as_deref().unwrap_or("0.0.0")
    }

    pub fn author(&self) -> &str {
        self.info.author.as_deref().unwrap_or("Unknown")
    }

    pub fn description(&self) -> &str {
        self.info.description.as_deref().unwrap_or("")
    }

    pub fn is_synthesized(&self) -> bool {
        self.source == ManifestSource::Synthesized
    }
}
