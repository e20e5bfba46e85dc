//! Extension identity shared by the loader, the registry and the install pipeline

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Package kind, determined by structural validation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtensionKind {
    /// Code extension with a manifest and an entry script
    Full,
    /// Stylesheet bundle
    Theme,
    /// Locale data bundle
    Translation,
    /// Full extension that adds support for a game
    Game,
}

impl ExtensionKind {
    /// Map the `type` field of a manifest onto a kind
    ///
    /// Any other non-empty value names a flavour of code extension.
    pub fn from_declared(declared: &str) -> Option<Self> {
        match declared.trim().to_ascii_lowercase().as_str() {
            "" => None,
            "theme" => Some(Self::Theme),
            "translation" => Some(Self::Translation),
            "game" => Some(Self::Game),
            _ => Some(Self::Full),
        }
    }

    /// Kinds that ship code and therefore need an entry script
    pub fn requires_entry_script(self) -> bool {
        matches!(self, Self::Full | Self::Game)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Theme => "theme",
            Self::Translation => "translation",
            Self::Game => "game",
        }
    }
}

impl fmt::Display for ExtensionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an extension was found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    /// Shipped with the host, read-only
    Bundled,
    /// Installed into the writable plugins directory
    User,
}

impl Origin {
    pub fn is_bundled(self) -> bool {
        matches!(self, Origin::Bundled)
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Bundled => f.write_str("bundled"),
            Origin::User => f.write_str("user"),
        }
    }
}

/// Identity and metadata of one installed extension
///
/// Records are immutable snapshots. A reinstall produces a new record
/// rather than updating an existing one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionRecord {
    /// Primary key, unique within the active registry
    pub id: String,
    pub name: String,
    pub author: String,
    /// Semantic version string as declared (possibly loose)
    pub version: String,
    pub description: String,
    pub kind: ExtensionKind,
    pub origin: Origin,
    /// Absolute package root
    pub path: PathBuf,
    /// Set when an equal-or-newer copy exists elsewhere
    #[serde(default)]
    pub outdated: bool,
    /// Remote catalog identifier supplied at download time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mod_id: Option<u64>,
    /// Namespace the extension registers its resources under
    pub namespace: String,
}

impl ExtensionRecord {
    /// Parsed version, loose strings coerced (`v1.2` reads as `1.2.0`)
    pub fn semver(&self) -> semver::Version {
        coerce_version(&self.version)
    }

    /// Copy of this record with the outdated flag set
    pub fn into_outdated(self) -> Self {
        Self {
            outdated: true,
            ..self
        }
    }
}

/// Parse a possibly incomplete version string
///
/// Leading `v`/`=` is stripped, missing minor/patch components are filled
/// with zero, and anything unparsable reads as `0.0.0`.
pub fn coerce_version(raw: &str) -> semver::Version {
    let trimmed = raw.trim().trim_start_matches(['v', 'V', '=']);
    if let Ok(version) = semver::Version::parse(trimmed) {
        return version;
    }

    let core: String = trimmed
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    let mut parts = core
        .split('.')
        .filter(|p| !p.is_empty())
        .map(|p| p.parse::<u64>().unwrap_or(0));

    match parts.next() {
        Some(major) => semver::Version::new(
            major,
            parts.next().unwrap_or(0),
            parts.next().unwrap_or(0),
        ),
        None => semver::Version::new(0, 0, 0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_declared() {
        assert_eq!(ExtensionKind::from_declared("theme"), Some(ExtensionKind::Theme));
        assert_eq!(
            ExtensionKind::from_declared("Translation"),
            Some(ExtensionKind::Translation)
        );
        assert_eq!(ExtensionKind::from_declared("game"), Some(ExtensionKind::Game));
        assert_eq!(
            ExtensionKind::from_declared("mod-installer"),
            Some(ExtensionKind::Full)
        );
        assert_eq!(ExtensionKind::from_declared("  "), None);
    }

    #[test]
    fn test_coerce_version() {
        assert_eq!(coerce_version("1.2.3"), semver::Version::new(1, 2, 3));
        assert_eq!(coerce_version("v2.1"), semver::Version::new(2, 1, 0));
        assert_eq!(coerce_version("3"), semver::Version::new(3, 0, 0));
        assert_eq!(coerce_version("1.4.0-beta.2").pre.as_str(), "beta.2");
        assert_eq!(coerce_version("1.0.0.7"), semver::Version::new(1, 0, 0));
        assert_eq!(coerce_version("unknown"), semver::Version::new(0, 0, 0));
        assert_eq!(coerce_version(""), semver::Version::new(0, 0, 0));
    }

    #[test]
    fn test_record_serializes_camel_case() {
        let record = ExtensionRecord {
            id: "foo".into(),
            name: "Foo".into(),
            author: "Unknown".into(),
            version: "1.0.0".into(),
            description: String::new(),
            kind: ExtensionKind::Full,
            origin: Origin::User,
            path: PathBuf::from("/plugins/foo"),
            outdated: false,
            mod_id: Some(42),
            namespace: "foo".into(),
        };

        let yaml = serde_yaml_ng::to_string(&record).unwrap();
        assert!(yaml.contains("modId: 42"));
        assert!(yaml.contains("kind: full"));
        assert!(yaml.contains("origin: user"));
    }
}
