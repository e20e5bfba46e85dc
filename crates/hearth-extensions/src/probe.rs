//! Dependency discovery
//!
//! An extension's initializer is run against [`ProbeContext`], an
//! [`ExtensionContext`] whose registration calls are recorded and dropped.
//! The only call with an effect is [`ExtensionContext::require_extension`],
//! which collects the ids the extension depends on.

use crate::entry::EntryScriptResolver;
use crate::error::{Error, Result};
use regex::Regex;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Arc, LazyLock};
use thiserror::Error as ThisError;
use tracing::{debug, warn};

static REQUIRE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"requireExtension\s*\(\s*['"`]([^'"`]+)['"`]"#).expect("require regex is valid")
});
static REGISTER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\b(register[A-Z]\w*)\s*\(\s*(?:['"`]([^'"`]*)['"`])?"#)
        .expect("register regex is valid")
});

/// Failures raised by an initializer or by the context it calls into
#[derive(ThisError, Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    /// A host context already holds this registration, typically because
    /// the extension is loaded for real in that process
    #[error("{kind} '{name}' is already registered")]
    DuplicateRegistration { kind: String, name: String },

    #[error("extension initialization failed: {0}")]
    InitFailed(String),
}

/// Registration surface offered to extension initializers
pub trait ExtensionContext: Send {
    fn register_game(&mut self, id: &str) -> std::result::Result<(), ProbeError>;
    fn register_settings(&mut self, title: &str) -> std::result::Result<(), ProbeError>;
    fn register_action(&mut self, group: &str) -> std::result::Result<(), ProbeError>;
    fn register_reducer(&mut self, path: &str) -> std::result::Result<(), ProbeError>;
    fn register_main_page(&mut self, title: &str) -> std::result::Result<(), ProbeError>;
    fn register_dashlet(&mut self, title: &str) -> std::result::Result<(), ProbeError>;
    fn register_installer(&mut self, id: &str) -> std::result::Result<(), ProbeError>;
    fn register_mod_type(&mut self, id: &str) -> std::result::Result<(), ProbeError>;

    /// Declare that this extension needs extension `id`
    fn require_extension(&mut self, id: &str);
}

/// Context that records registrations and collects dependencies
#[derive(Debug, Default)]
pub struct ProbeContext {
    registrations: Vec<(String, String)>,
    dependencies: BTreeSet<String>,
}

impl ProbeContext {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&mut self, kind: &str, name: &str) -> std::result::Result<(), ProbeError> {
        self.registrations.push((kind.to_string(), name.to_string()));
        Ok(())
    }

    pub fn registrations(&self) -> &[(String, String)] {
        &self.registrations
    }

    pub fn dependencies(&self) -> &BTreeSet<String> {
        &self.dependencies
    }

    pub fn into_dependencies(self) -> BTreeSet<String> {
        self.dependencies
    }
}

impl ExtensionContext for ProbeContext {
    fn register_game(&mut self, id: &str) -> std::result::Result<(), ProbeError> {
        self.record("game", id)
    }

    fn register_settings(&mut self, title: &str) -> std::result::Result<(), ProbeError> {
        self.record("settings", title)
    }

    fn register_action(&mut self, group: &str) -> std::result::Result<(), ProbeError> {
        self.record("action", group)
    }

    fn register_reducer(&mut self, path: &str) -> std::result::Result<(), ProbeError> {
        self.record("reducer", path)
    }

    fn register_main_page(&mut self, title: &str) -> std::result::Result<(), ProbeError> {
        self.record("main-page", title)
    }

    fn register_dashlet(&mut self, title: &str) -> std::result::Result<(), ProbeError> {
        self.record("dashlet", title)
    }

    fn register_installer(&mut self, id: &str) -> std::result::Result<(), ProbeError> {
        self.record("installer", id)
    }

    fn register_mod_type(&mut self, id: &str) -> std::result::Result<(), ProbeError> {
        self.record("mod-type", id)
    }

    fn require_extension(&mut self, id: &str) {
        if !id.is_empty() {
            self.dependencies.insert(id.to_string());
        }
    }
}

/// A loaded extension initializer
pub trait ExtensionInit: Send {
    fn init(&self, ctx: &mut dyn ExtensionContext) -> std::result::Result<(), ProbeError>;
}

/// Turns an entry script into an initializer
pub trait EntryLoader: Send + Sync {
    fn load(&self, entry: &Path) -> Result<Box<dyn ExtensionInit>>;
}

/// One call found in an entry script
#[derive(Debug, Clone, PartialEq, Eq)]
enum Call {
    Register { method: String, arg: String },
    Require(String),
}

/// Loader that reads the entry script as text and replays the calls it
/// finds, without executing any extension code
#[derive(Debug, Clone, Copy, Default)]
pub struct DeclarationScanner;

impl DeclarationScanner {
    fn scan(source: &str) -> Vec<Call> {
        let mut calls: Vec<(usize, Call)> = REQUIRE_RE
            .captures_iter(source)
            .filter_map(|caps| {
                let m = caps.get(0)?;
                Some((m.start(), Call::Require(caps[1].to_string())))
            })
            .collect();

        calls.extend(REGISTER_RE.captures_iter(source).filter_map(|caps| {
            let m = caps.get(0)?;
            Some((
                m.start(),
                Call::Register {
                    method: caps[1].to_string(),
                    arg: caps.get(2).map(|a| a.as_str().to_string()).unwrap_or_default(),
                },
            ))
        }));

        calls.sort_by_key(|(offset, _)| *offset);
        calls.into_iter().map(|(_, call)| call).collect()
    }
}

struct ScannedInit {
    calls: Vec<Call>,
}

impl ExtensionInit for ScannedInit {
    fn init(&self, ctx: &mut dyn ExtensionContext) -> std::result::Result<(), ProbeError> {
        for call in &self.calls {
            let result = match call {
                Call::Require(id) => {
                    ctx.require_extension(id);
                    Ok(())
                }
                Call::Register { method, arg } => match method.as_str() {
                    "registerGame" => ctx.register_game(arg),
                    "registerSettings" => ctx.register_settings(arg),
                    "registerAction" => ctx.register_action(arg),
                    "registerReducer" => ctx.register_reducer(arg),
                    "registerMainPage" => ctx.register_main_page(arg),
                    "registerDashlet" => ctx.register_dashlet(arg),
                    "registerInstaller" => ctx.register_installer(arg),
                    "registerModType" => ctx.register_mod_type(arg),
                    _ => Ok(()),
                },
            };

            match result {
                Err(ProbeError::DuplicateRegistration { kind, name }) => {
                    debug!("Skipping duplicate {} registration '{}'", kind, name);
                }
                other => other?,
            }
        }
        Ok(())
    }
}

impl EntryLoader for DeclarationScanner {
    fn load(&self, entry: &Path) -> Result<Box<dyn ExtensionInit>> {
        let source = std::fs::read_to_string(entry)
            .map_err(|e| Error::Probe(format!("cannot read {}: {}", entry.display(), e)))?;
        Ok(Box::new(ScannedInit {
            calls: Self::scan(&source),
        }))
    }
}

/// Finds the extensions a package declares as required
#[derive(Clone)]
pub struct DependencyProbe {
    loader: Arc<dyn EntryLoader>,
}

impl Default for DependencyProbe {
    fn default() -> Self {
        Self::new(Arc::new(DeclarationScanner))
    }
}

impl std::fmt::Debug for DependencyProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DependencyProbe").finish_non_exhaustive()
    }
}

impl DependencyProbe {
    pub fn new(loader: Arc<dyn EntryLoader>) -> Self {
        Self { loader }
    }

    /// Declared dependency ids of the package at `root`
    ///
    /// Initializer failures are logged and whatever was collected before
    /// the failure is returned. Only a missing or unloadable entry script
    /// is an error.
    pub async fn probe(&self, root: &Path, resolver: &EntryScriptResolver) -> Result<BTreeSet<String>> {
        let entry = resolver
            .resolve(root)
            .await
            .ok_or_else(|| Error::Probe(format!("no entry script in {}", root.display())))?;

        let loader = Arc::clone(&self.loader);
        tokio::task::spawn_blocking(move || -> Result<BTreeSet<String>> {
            let init = loader.load(&entry)?;
            let mut ctx = ProbeContext::new();
            match init.init(&mut ctx) {
                Ok(()) => {}
                Err(ProbeError::DuplicateRegistration { kind, name }) => {
                    debug!(
                        "{} '{}' already registered while probing {}",
                        kind,
                        name,
                        entry.display()
                    );
                }
                Err(e) => warn!("Probing {} failed: {}", entry.display(), e),
            }
            Ok(ctx.into_dependencies())
        })
        .await
        .map_err(|e| Error::Probe(format!("probe task failed: {}", e)))?
    }
}
