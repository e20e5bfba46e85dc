//! Structural classification of extension packages
//!
//! A package is a full extension (manifest plus entry script), a
//! translation (exactly one locale directory with data files) or a theme
//! (a directory holding one of the known stylesheets). Full wins over
//! translation, which wins over theme.

use crate::entry::EntryScriptResolver;
use crate::error::{Error, Result};
use crate::manifest::MANIFEST_FILE;
use hearth_core::types::{ExtensionKind, ValidationConfig};
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, warn};
use walkdir::WalkDir;

static LOCALE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<lang>[A-Za-z]{2})(?:[-_][A-Za-z]{2})?$").expect("locale regex is valid")
});

const THEME_FILES: &[&str] = &["variables.scss", "style.scss", "fonts.scss"];
const TRANSLATION_EXTENSIONS: &[&str] = &["json", "po", "mo", "ftl", "properties"];
const GAME_MARKERS: &[&str] = &["game:", "game support", "support for"];

/// ISO 639-1 language codes
const LANGUAGE_CODES: &[&str] = &[
    "aa", "ab", "ae", "af", "ak", "am", "an", "ar", "as", "av", "ay", "az", "ba", "be", "bg",
    "bh", "bi", "bm", "bn", "bo", "br", "bs", "ca", "ce", "ch", "co", "cr", "cs", "cu", "cv",
    "cy", "da", "de", "dv", "dz", "ee", "el", "en", "eo", "es", "et", "eu", "fa", "ff", "fi",
    "fj", "fo", "fr", "fy", "ga", "gd", "gl", "gn", "gu", "gv", "ha", "he", "hi", "ho", "hr",
    "ht", "hu", "hy", "hz", "ia", "id", "ie", "ig", "ii", "ik", "io", "is", "it", "iu", "ja",
    "jv", "ka", "kg", "ki", "kj", "kk", "kl", "km", "kn", "ko", "kr", "ks", "ku", "kv", "kw",
    "ky", "la", "lb", "lg", "li", "ln", "lo", "lt", "lu", "lv", "mg", "mh", "mi", "mk", "ml",
    "mn", "mr", "ms", "mt", "my", "na", "nb", "nd", "ne", "ng", "nl", "nn", "no", "nr", "nv",
    "ny", "oc", "oj", "om", "or", "os", "pa", "pi", "pl", "ps", "pt", "qu", "rm", "rn", "ro",
    "ru", "rw", "sa", "sc", "sd", "se", "sg", "si", "sk", "sl", "sm", "sn", "so", "sq", "sr",
    "ss", "st", "su", "sv", "sw", "ta", "te", "tg", "th", "ti", "tk", "tl", "tn", "to", "tr",
    "ts", "tt", "tw", "ty", "ug", "uk", "ur", "uz", "ve", "vi", "vo", "wa", "wo", "xh", "yi",
    "yo", "za", "zh", "zu",
];

/// Whether `name` is `ll` or `ll-CC` with a known language
pub fn is_locale_name(name: &str) -> bool {
    LOCALE_RE
        .captures(name)
        .and_then(|caps| caps.name("lang"))
        .map(|lang| LANGUAGE_CODES.contains(&lang.as_str().to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn subdirs(root: &Path) -> Vec<PathBuf> {
    fs::read_dir(root)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
                .map(|e| e.path())
                .collect()
        })
        .unwrap_or_default()
}

fn has_translation_data(dir: &Path) -> bool {
    WalkDir::new(dir)
        .max_depth(2)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .any(|e| {
            e.path()
                .extension()
                .and_then(|x| x.to_str())
                .map(|x| TRANSLATION_EXTENSIONS.contains(&x.to_ascii_lowercase().as_str()))
                .unwrap_or(false)
        })
}

/// Exactly one locale directory, and it holds data
pub fn is_translation_layout(root: &Path) -> bool {
    let locales: Vec<PathBuf> = subdirs(root)
        .into_iter()
        .filter(|d| {
            d.file_name()
                .and_then(|n| n.to_str())
                .map(is_locale_name)
                .unwrap_or(false)
        })
        .collect();

    match locales.as_slice() {
        [only] => has_translation_data(only),
        _ => false,
    }
}

/// Some directory holds a recognized stylesheet
pub fn is_theme_layout(root: &Path) -> bool {
    subdirs(root)
        .iter()
        .any(|d| THEME_FILES.iter().any(|f| d.join(f).is_file()))
}

fn has_readable_manifest(root: &Path) -> bool {
    fs::File::open(root.join(MANIFEST_FILE)).is_ok()
}

/// Whether a display name suggests game support
pub fn looks_like_game(name: &str, titles: &[String]) -> bool {
    let lower = name.to_lowercase();
    GAME_MARKERS.iter().any(|m| lower.contains(m))
        || titles
            .iter()
            .any(|t| !t.is_empty() && lower.contains(&t.to_lowercase()))
}

fn verdict(root: &Path, declared: Option<ExtensionKind>, has_entry: bool) -> Result<ExtensionKind> {
    let full = || has_readable_manifest(root) && has_entry;

    match declared {
        Some(ExtensionKind::Theme) if is_theme_layout(root) => Ok(ExtensionKind::Theme),
        Some(ExtensionKind::Translation) if is_translation_layout(root) => {
            Ok(ExtensionKind::Translation)
        }
        Some(kind @ (ExtensionKind::Full | ExtensionKind::Game)) if full() => Ok(kind),
        Some(kind) => Err(Error::data_invalid(format!(
            "{} does not match the {} package layout",
            root.display(),
            kind
        ))),
        None if full() => Ok(ExtensionKind::Full),
        None if is_translation_layout(root) => Ok(ExtensionKind::Translation),
        None if is_theme_layout(root) => Ok(ExtensionKind::Theme),
        None => Err(Error::data_invalid(format!(
            "{} is not a valid package: no {} with an entry script (full extension), \
             no single locale directory with data files (translation), \
             no directory with {} (theme)",
            root.display(),
            MANIFEST_FILE,
            THEME_FILES.join("/")
        ))),
    }
}

/// Classifies packages by layout
#[derive(Debug, Clone)]
pub struct ExtensionValidator {
    config: ValidationConfig,
    game_titles: Vec<String>,
    entry: EntryScriptResolver,
}

impl ExtensionValidator {
    pub fn new(config: ValidationConfig, game_titles: Vec<String>, entry: EntryScriptResolver) -> Self {
        Self {
            config,
            game_titles,
            entry,
        }
    }

    /// Determine the kind of the package at `root`
    ///
    /// With a declared kind only that kind's layout is checked. `name` feeds
    /// the game-support heuristic, which can only relabel a full extension.
    pub async fn classify(
        &self,
        root: &Path,
        declared: Option<ExtensionKind>,
        name: &str,
    ) -> Result<ExtensionKind> {
        let checks = async {
            let has_entry = match declared {
                Some(kind) if !kind.requires_entry_script() => false,
                _ => self.entry.resolve(root).await.is_some(),
            };
            let dir = root.to_path_buf();
            tokio::task::spawn_blocking(move || verdict(&dir, declared, has_entry))
                .await
                .map_err(|e| Error::Temporary(format!("validation task failed: {}", e)))?
        };

        let kind = match tokio::time::timeout(self.config.timeout(), checks).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(
                    "Validation of {} exceeded {}ms, using a single pass",
                    root.display(),
                    self.config.timeout_ms
                );
                Self::verdict_immediate(root, declared)?
            }
        };

        let kind = self.refine(kind, name);
        debug!("Classified {} as {}", root.display(), kind);
        Ok(kind)
    }

    /// Single-pass classification without retries or deadline
    pub fn classify_immediate(&self, root: &Path, declared: Option<ExtensionKind>, name: &str) -> Result<ExtensionKind> {
        Self::verdict_immediate(root, declared).map(|kind| self.refine(kind, name))
    }

    fn verdict_immediate(root: &Path, declared: Option<ExtensionKind>) -> Result<ExtensionKind> {
        let has_entry = EntryScriptResolver::resolve_immediate(root).is_some();
        verdict(root, declared, has_entry)
    }

    fn refine(&self, kind: ExtensionKind, name: &str) -> ExtensionKind {
        if kind == ExtensionKind::Full && looks_like_game(name, &self.game_titles) {
            ExtensionKind::Game
        } else {
            kind
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hearth_core::types::{RetryPolicy, RetryStrategy, RuntimeConfig};
    use tempfile::TempDir;
    use test_case::test_case;

    fn validator() -> ExtensionValidator {
        let policy = RetryPolicy {
            max_attempts: 1,
            strategy: RetryStrategy::None,
            backoff_multiplier: 1.0,
            initial_delay_ms: 0,
            max_delay_ms: 0,
        };
        ExtensionValidator::new(
            ValidationConfig::default(),
            RuntimeConfig::default().game_titles,
            EntryScriptResolver::new(policy),
        )
    }

    fn write(root: &Path, rel: &str, body: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, body).unwrap();
    }

    #[test_case("en", true)]
    #[test_case("pt-BR", true)]
    #[test_case("zh_CN", true)]
    #[test_case("xx", false)]
    #[test_case("english", false)]
    #[test_case("css", false)]
    fn test_locale_names(name: &str, expected: bool) {
        assert_eq!(is_locale_name(name), expected);
    }

    #[tokio::test]
    async fn test_full_extension() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "info.json", "{}");
        write(temp.path(), "index.js", "");

        let kind = validator().classify(temp.path(), None, "Useful Tool").await.unwrap();
        assert_eq!(kind, ExtensionKind::Full);
    }

    #[tokio::test]
    async fn test_translation_package() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "de/common.json", "{}");
        write(temp.path(), "info.json", "{}");

        let kind = validator().classify(temp.path(), None, "German").await.unwrap();
        assert_eq!(kind, ExtensionKind::Translation);
    }

    #[tokio::test]
    async fn test_two_locales_is_not_a_translation() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "de/common.json", "{}");
        write(temp.path(), "fr/common.json", "{}");

        let err = validator().classify(temp.path(), None, "Mixed").await.unwrap_err();
        assert!(matches!(err, Error::DataInvalid(_)));
    }

    #[tokio::test]
    async fn test_theme_package() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "dark/style.scss", "body {}");

        let kind = validator().classify(temp.path(), None, "Dark").await.unwrap();
        assert_eq!(kind, ExtensionKind::Theme);
    }

    #[tokio::test]
    async fn test_full_wins_over_theme() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "info.json", "{}");
        write(temp.path(), "index.js", "");
        write(temp.path(), "assets/style.scss", "");

        let kind = validator().classify(temp.path(), None, "Tool").await.unwrap();
        assert_eq!(kind, ExtensionKind::Full);
    }

    #[tokio::test]
    async fn test_declared_kind_checks_only_that_layout() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "info.json", "{}");
        write(temp.path(), "index.js", "");

        let err = validator()
            .classify(temp.path(), Some(ExtensionKind::Theme), "Tool")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("theme"));
    }

    #[tokio::test]
    async fn test_no_layout_names_every_rule_set() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "readme.txt", "hi");

        let err = validator().classify(temp.path(), None, "Nothing").await.unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("full extension"));
        assert!(msg.contains("translation"));
        assert!(msg.contains("theme"));
    }

    #[tokio::test]
    async fn test_game_heuristic_only_relabels_full() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "info.json", "{}");
        write(temp.path(), "index.js", "");

        let kind = validator()
            .classify(temp.path(), None, "Game: Stardew Valley")
            .await
            .unwrap();
        assert_eq!(kind, ExtensionKind::Game);

        let theme = TempDir::new().unwrap();
        write(theme.path(), "skin/style.scss", "");
        let kind = validator()
            .classify(theme.path(), None, "Skyrim Theme")
            .await
            .unwrap();
        assert_eq!(kind, ExtensionKind::Theme);
    }
}
