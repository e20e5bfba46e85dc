//! Archive extraction
//!
//! Extraction picks an ordered list of strategies for the archive format
//! and host platform. Zip and tar archives are first decoded in-process;
//! everything else falls back through the system tools that happen to be
//! installed. Tools that are not installed are skipped without counting as
//! a failure. When every candidate fails, one [`ExtractionFailure`] lists
//! what was tried and how to fix it.

use crate::error::{Error, IoResultExt, Result};
use hearth_core::retry::{RetryExecutorBuilder, TracingObserver};
use hearth_core::types::{operations, RetryPoliciesConfig, RetryPolicy};
use regex::Regex;
use std::ffi::OsString;
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};
use std::process::Stdio;
use std::sync::LazyLock;
use tracing::{debug, info, warn};

static RAR_PART_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(.*)\.part(\d+)\.rar$").expect("rar part regex is valid"));
static RAR_VOLUME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(.*)\.r(\d{2})$").expect("rar volume regex is valid"));
static SEVEN_ZIP_PART_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(.*)\.7z\.(\d{3})$").expect("7z part regex is valid"));

const SEVEN_ZIP_MAGIC: &[u8] = &[0x37, 0x7A, 0xBC, 0xAF, 0x27, 0x1C];
const GZIP_MAGIC: &[u8] = &[0x1F, 0x8B];

/// Supported archive formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    SevenZip,
    Rar,
    Tar,
    TarGz,
}

impl ArchiveFormat {
    /// Guess the format from the file name
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_string_lossy().to_ascii_lowercase();

        if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(Self::TarGz)
        } else if name.ends_with(".tar") {
            Some(Self::Tar)
        } else if name.ends_with(".zip") {
            Some(Self::Zip)
        } else if name.ends_with(".7z") || SEVEN_ZIP_PART_RE.is_match(&name) {
            Some(Self::SevenZip)
        } else if name.ends_with(".rar") || RAR_VOLUME_RE.is_match(&name) {
            Some(Self::Rar)
        } else {
            None
        }
    }

    /// Recognize the format from the first bytes of the file
    pub fn from_magic(header: &[u8]) -> Option<Self> {
        if header.starts_with(b"PK") {
            Some(Self::Zip)
        } else if header.starts_with(SEVEN_ZIP_MAGIC) {
            Some(Self::SevenZip)
        } else if header.starts_with(b"Rar!") {
            Some(Self::Rar)
        } else if header.starts_with(GZIP_MAGIC) {
            Some(Self::TarGz)
        } else if header.len() >= 262 && &header[257..262] == b"ustar" {
            Some(Self::Tar)
        } else {
            None
        }
    }

    /// Detect by content, falling back to the file name
    pub fn detect(path: &Path) -> Result<Self> {
        let mut header = Vec::with_capacity(512);
        File::open(path)
            .and_then(|f| f.take(512).read_to_end(&mut header))
            .at(path)?;

        Self::from_magic(&header)
            .or_else(|| Self::from_path(path))
            .ok_or_else(|| {
                Error::data_invalid(format!(
                    "{} is not a supported archive (zip, 7z, rar, tar, tar.gz)",
                    path.display()
                ))
            })
    }
}

impl fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Zip => "zip",
            Self::SevenZip => "7z",
            Self::Rar => "rar",
            Self::Tar => "tar",
            Self::TarGz => "tar.gz",
        };
        f.write_str(name)
    }
}

/// Host platform families with different extraction tooling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    MacOs,
    Windows,
    Unix,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(target_os = "macos") {
            Platform::MacOs
        } else if cfg!(windows) {
            Platform::Windows
        } else {
            Platform::Unix
        }
    }

    /// Remediation shown when no extractor worked
    pub fn install_hint(self) -> &'static str {
        match self {
            Platform::MacOs => {
                "Install native extractors via Homebrew: \"brew install unar\" for RAR/7z support, or \"brew install p7zip\"."
            }
            Platform::Windows => {
                "Install 7-Zip from https://www.7-zip.org and make sure 7z.exe is on PATH."
            }
            Platform::Unix => {
                "Install p7zip (\"apt install p7zip-full\" or \"dnf install p7zip p7zip-plugins\") or unar, and unzip for zip archives."
            }
        }
    }

    /// Extra locations checked when a tool is not on PATH
    fn fallback_dirs(self) -> &'static [&'static str] {
        match self {
            Platform::MacOs => &["/opt/homebrew/bin", "/usr/local/bin", "/usr/bin"],
            Platform::Windows => &["C:\\Program Files\\7-Zip", "C:\\Program Files (x86)\\7-Zip"],
            Platform::Unix => &["/usr/local/bin", "/usr/bin"],
        }
    }
}

/// In-process decoders
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Zip,
    Tar { gzip: bool },
}

/// One way of extracting an archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Strategy {
    Builtin(Builtin),
    Tool {
        program: &'static str,
        args: Vec<OsString>,
    },
}

impl Strategy {
    fn tool(program: &'static str, args: Vec<OsString>) -> Self {
        Strategy::Tool { program, args }
    }

    /// Human-readable form used in diagnostics
    pub fn describe(&self) -> String {
        match self {
            Strategy::Builtin(Builtin::Zip) => "builtin zip reader".to_string(),
            Strategy::Builtin(Builtin::Tar { gzip: true }) => "builtin tar.gz reader".to_string(),
            Strategy::Builtin(Builtin::Tar { gzip: false }) => "builtin tar reader".to_string(),
            Strategy::Tool { program, args } => {
                let args: Vec<_> = args.iter().map(|a| a.to_string_lossy()).collect();
                format!("{} {}", program, args.join(" "))
            }
        }
    }
}

/// Outcome of one candidate
#[derive(Debug, Clone)]
pub struct ExtractionAttempt {
    pub candidate: String,
    pub available: bool,
    pub error: Option<String>,
}

impl fmt::Display for ExtractionAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.error, self.available) {
            (_, false) => write!(f, "{}: not installed", self.candidate),
            (Some(err), true) => write!(f, "{}: {}", self.candidate, err),
            (None, true) => write!(f, "{}: ok", self.candidate),
        }
    }
}

/// Every extraction strategy failed
#[derive(Debug, Clone)]
pub struct ExtractionFailure {
    pub archive: PathBuf,
    pub format: ArchiveFormat,
    pub attempts: Vec<ExtractionAttempt>,
    pub hint: String,
}

impl ExtractionFailure {
    /// Whether any candidate actually ran
    pub fn any_available(&self) -> bool {
        self.attempts.iter().any(|a| a.available)
    }
}

impl fmt::Display for ExtractionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "failed to extract {} archive {}; tried:",
            self.format,
            self.archive.display()
        )?;
        for attempt in &self.attempts {
            writeln!(f, "  - {}", attempt)?;
        }
        write!(f, "{}", self.hint)
    }
}

impl std::error::Error for ExtractionFailure {}

/// Extraction settings
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    pub platform: Platform,
    pub policy: RetryPolicy,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            platform: Platform::current(),
            policy: RetryPoliciesConfig::default()
                .policy_for(operations::EXTRACTION)
                .clone(),
        }
    }
}

/// Ordered strategies for a format on a platform
pub fn plan(format: ArchiveFormat, platform: Platform, archive: &Path, dest: &Path) -> Vec<Strategy> {
    let a = || archive.as_os_str().to_os_string();
    let d = || dest.as_os_str().to_os_string();
    let seven_zip = |program| {
        let mut out = OsString::from("-o");
        out.push(dest.as_os_str());
        Strategy::tool(program, vec!["x".into(), "-y".into(), a(), out])
    };
    let bsdtar = |program| Strategy::tool(program, vec!["-x".into(), "-f".into(), a(), "-C".into(), d()]);
    let unar = || {
        Strategy::tool(
            "unar",
            vec![
                "-quiet".into(),
                "-force-overwrite".into(),
                "-no-directory".into(),
                "-output-directory".into(),
                d(),
                a(),
            ],
        )
    };

    match format {
        ArchiveFormat::Tar | ArchiveFormat::TarGz => vec![
            Strategy::Builtin(Builtin::Tar {
                gzip: format == ArchiveFormat::TarGz,
            }),
            Strategy::tool(
                "tar",
                vec![
                    "-xf".into(),
                    a(),
                    "-C".into(),
                    d(),
                    "--exclude=__MACOSX".into(),
                ],
            ),
        ],
        ArchiveFormat::Zip => {
            let mut strategies = vec![Strategy::Builtin(Builtin::Zip)];
            if platform == Platform::MacOs {
                strategies.push(Strategy::tool("ditto", vec!["-x".into(), "-k".into(), a(), d()]));
            }
            if platform != Platform::Windows {
                strategies.push(Strategy::tool(
                    "unzip",
                    vec!["-o".into(), "-qq".into(), a(), "-d".into(), d()],
                ));
            }
            strategies.push(seven_zip("7z"));
            strategies.push(bsdtar(if platform == Platform::Windows { "tar" } else { "bsdtar" }));
            strategies
        }
        ArchiveFormat::SevenZip | ArchiveFormat::Rar => match platform {
            Platform::MacOs => vec![bsdtar("bsdtar"), unar(), seven_zip("7z"), seven_zip("7zz")],
            Platform::Windows => vec![seven_zip("7z"), seven_zip("7za"), bsdtar("tar")],
            Platform::Unix => vec![
                seven_zip("7z"),
                seven_zip("7za"),
                seven_zip("7zz"),
                unar(),
                bsdtar("bsdtar"),
            ],
        },
    }
}

/// Locate an external tool on PATH or in the platform's usual places
fn locate_tool(program: &str, platform: Platform) -> Option<PathBuf> {
    if let Ok(path) = which::which(program) {
        return Some(path);
    }
    platform.fallback_dirs().iter().find_map(|dir| {
        let candidate = Path::new(dir).join(if platform == Platform::Windows {
            format!("{}.exe", program)
        } else {
            program.to_string()
        });
        candidate.is_file().then_some(candidate)
    })
}

/// Reject archives opened at a later segment of a multi-part set
///
/// A missing next segment only produces a warning; the extractor reports
/// the actual failure if it matters.
pub fn check_multipart(archive: &Path) -> Result<()> {
    let Some(name) = archive.file_name().map(|n| n.to_string_lossy().into_owned()) else {
        return Ok(());
    };
    let dir = archive.parent().unwrap_or_else(|| Path::new("."));

    let (first, next) = if let Some(caps) = RAR_PART_RE.captures(&name) {
        let (stem, digits) = (&caps[1], &caps[2]);
        let width = digits.len();
        let index: u32 = digits.parse().unwrap_or(0);
        (
            (index == 1).then_some(()).ok_or_else(|| format!("{}.part{:0width$}.rar", stem, 1)),
            format!("{}.part{:0width$}.rar", stem, 2),
        )
    } else if let Some(caps) = SEVEN_ZIP_PART_RE.captures(&name) {
        let (stem, digits) = (&caps[1], &caps[2]);
        (
            (digits == "001").then_some(()).ok_or_else(|| format!("{}.7z.001", stem)),
            format!("{}.7z.002", stem),
        )
    } else if let Some(caps) = RAR_VOLUME_RE.captures(&name) {
        // old-style volumes: name.rar, name.r00, name.r01, ...
        (Err(format!("{}.rar", &caps[1])), String::new())
    } else {
        return Ok(());
    };

    if let Err(expected) = first {
        return Err(Error::data_invalid(format!(
            "{} is not the first part of a multi-part archive; select {} instead",
            name, expected
        )));
    }

    if !next.is_empty() && !dir.join(&next).exists() {
        warn!(
            "Next part of multi-part archive not found: {}",
            dir.join(&next).display()
        );
    }
    Ok(())
}

fn is_macos_metadata(path: &Path) -> bool {
    path.components()
        .next()
        .map(|c| c.as_os_str() == "__MACOSX")
        .unwrap_or(false)
}

fn escapes_root(path: &Path) -> bool {
    path.components()
        .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)))
}

fn extract_zip(archive: &Path, dest: &Path) -> Result<()> {
    let file = File::open(archive).at(archive)?;
    let mut zip = zip::ZipArchive::new(file)
        .map_err(|e| Error::io(archive, io::Error::new(io::ErrorKind::InvalidData, e)))?;

    for i in 0..zip.len() {
        let mut entry = zip
            .by_index(i)
            .map_err(|e| Error::io(archive, io::Error::new(io::ErrorKind::InvalidData, e)))?;
        let Some(relative) = entry.enclosed_name() else {
            return Err(Error::data_invalid(format!(
                "archive entry {} escapes the extraction directory",
                entry.name()
            )));
        };
        if is_macos_metadata(&relative) {
            continue;
        }

        let out_path = dest.join(&relative);
        if entry.is_dir() {
            std::fs::create_dir_all(&out_path).at(&out_path)?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent).at(parent)?;
        }
        let mut outfile = File::create(&out_path).at(&out_path)?;
        io::copy(&mut entry, &mut outfile).at(&out_path)?;

        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&out_path, std::fs::Permissions::from_mode(mode & 0o777))
                .at(&out_path)?;
        }
    }
    Ok(())
}

fn extract_tar(archive: &Path, dest: &Path, gzip: bool) -> Result<()> {
    let file = File::open(archive).at(archive)?;
    let reader: Box<dyn Read> = if gzip {
        Box::new(flate2::read::GzDecoder::new(file))
    } else {
        Box::new(file)
    };
    let mut tar = tar::Archive::new(reader);

    for entry in tar.entries().at(archive)? {
        let mut entry = entry.at(archive)?;
        let relative = entry.path().at(archive)?.into_owned();
        if escapes_root(&relative) {
            return Err(Error::data_invalid(format!(
                "archive entry {} escapes the extraction directory",
                relative.display()
            )));
        }
        if is_macos_metadata(&relative) {
            continue;
        }
        if !entry.unpack_in(dest).at(dest)? {
            return Err(Error::data_invalid(format!(
                "archive entry {} escapes the extraction directory",
                relative.display()
            )));
        }
    }
    Ok(())
}

/// Extracts archives into a directory
#[derive(Debug, Clone, Default)]
pub struct ArchiveExtractor {
    options: ExtractOptions,
}

impl ArchiveExtractor {
    pub fn new(options: ExtractOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ExtractOptions {
        &self.options
    }

    /// Extract `archive` into `dest`, creating `dest` if needed
    ///
    /// The whole candidate list is retried with backoff while at least one
    /// installed tool ran and failed; an archive no installed tool can read
    /// fails on the first pass.
    pub async fn extract(&self, archive: &Path, dest: &Path) -> Result<()> {
        check_multipart(archive)?;
        let format = ArchiveFormat::detect(archive)?;
        tokio::fs::create_dir_all(dest).await.at(dest)?;

        info!("Extracting {} ({}) into {}", archive.display(), format, dest.display());

        RetryExecutorBuilder::new()
            .with_policy(self.options.policy.clone())
            .with_predicate(hearth_core::retry::ClosurePredicate::new(|err: &Error| {
                matches!(err, Error::Extraction(failure) if failure.any_available())
            }))
            .with_observer(TracingObserver::new("extract archive"))
            .build()
            .execute(|| self.extract_once(archive, dest, format))
            .await
            .map_err(Error::from)
    }

    async fn extract_once(&self, archive: &Path, dest: &Path, format: ArchiveFormat) -> Result<()> {
        let platform = self.options.platform;
        let mut attempts = Vec::new();

        for strategy in plan(format, platform, archive, dest) {
            let candidate = strategy.describe();
            let outcome = match &strategy {
                Strategy::Builtin(builtin) => {
                    let (builtin, archive, dest) = (*builtin, archive.to_path_buf(), dest.to_path_buf());
                    let joined = tokio::task::spawn_blocking(move || match builtin {
                        Builtin::Zip => extract_zip(&archive, &dest),
                        Builtin::Tar { gzip } => extract_tar(&archive, &dest, gzip),
                    })
                    .await;
                    match joined {
                        Ok(Err(err @ Error::DataInvalid(_))) => return Err(err),
                        Ok(result) => result.map_err(|e| e.to_string()),
                        Err(e) => Err(format!("extraction task failed: {}", e)),
                    }
                }
                Strategy::Tool { program, args } => {
                    let Some(path) = locate_tool(program, platform) else {
                        debug!("Extractor {} is not installed, skipping", program);
                        attempts.push(ExtractionAttempt {
                            candidate,
                            available: false,
                            error: None,
                        });
                        continue;
                    };
                    run_tool(&path, args).await
                }
            };

            match outcome {
                Ok(()) => {
                    debug!("Extracted {} with {}", archive.display(), candidate);
                    return Ok(());
                }
                Err(error) => {
                    warn!("Extractor failed ({}): {}", candidate, error);
                    attempts.push(ExtractionAttempt {
                        candidate,
                        available: true,
                        error: Some(error),
                    });
                }
            }
        }

        Err(Error::Extraction(ExtractionFailure {
            archive: archive.to_path_buf(),
            format,
            attempts,
            hint: platform.install_hint().to_string(),
        }))
    }
}

async fn run_tool(program: &Path, args: &[OsString]) -> std::result::Result<(), String> {
    let output = tokio::process::Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| format!("failed to start: {}", e))?;

    if output.status.success() {
        Ok(())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(format!("exited with {}: {}", output.status, stderr.trim()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use test_case::test_case;

    #[test_case("mod.zip", Some(ArchiveFormat::Zip))]
    #[test_case("mod.TAR.GZ", Some(ArchiveFormat::TarGz))]
    #[test_case("mod.tgz", Some(ArchiveFormat::TarGz))]
    #[test_case("mod.tar", Some(ArchiveFormat::Tar))]
    #[test_case("mod.7z", Some(ArchiveFormat::SevenZip))]
    #[test_case("mod.7z.001", Some(ArchiveFormat::SevenZip))]
    #[test_case("mod.part1.rar", Some(ArchiveFormat::Rar))]
    #[test_case("mod.r00", Some(ArchiveFormat::Rar))]
    #[test_case("mod.txt", None)]
    fn test_format_from_path(name: &str, expected: Option<ArchiveFormat>) {
        assert_eq!(ArchiveFormat::from_path(Path::new(name)), expected);
    }

    #[test]
    fn test_format_from_magic() {
        assert_eq!(ArchiveFormat::from_magic(b"PK\x03\x04rest"), Some(ArchiveFormat::Zip));
        assert_eq!(
            ArchiveFormat::from_magic(&[0x37, 0x7A, 0xBC, 0xAF, 0x27, 0x1C, 0x00]),
            Some(ArchiveFormat::SevenZip)
        );
        assert_eq!(ArchiveFormat::from_magic(b"Rar!\x1a\x07"), Some(ArchiveFormat::Rar));
        assert_eq!(ArchiveFormat::from_magic(&[0x1F, 0x8B, 0x08]), Some(ArchiveFormat::TarGz));
        assert_eq!(ArchiveFormat::from_magic(b"hello"), None);
    }

    #[test]
    fn test_magic_wins_over_extension() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("mislabelled.rar");
        std::fs::write(&path, b"PK\x03\x04").unwrap();
        assert_eq!(ArchiveFormat::detect(&path).unwrap(), ArchiveFormat::Zip);
    }

    #[test]
    fn test_unknown_file_is_data_invalid() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("notes.txt");
        std::fs::write(&path, b"just text").unwrap();
        assert!(matches!(ArchiveFormat::detect(&path), Err(Error::DataInvalid(_))));
    }

    #[test]
    fn test_plan_zip_on_macos_prefers_builtin_then_ditto() {
        let steps = plan(
            ArchiveFormat::Zip,
            Platform::MacOs,
            Path::new("/a.zip"),
            Path::new("/out"),
        );
        assert_eq!(steps[0], Strategy::Builtin(Builtin::Zip));
        assert_eq!(steps[1].describe(), "ditto -x -k /a.zip /out");
        assert_eq!(steps[2].describe(), "unzip -o -qq /a.zip -d /out");
    }

    #[test]
    fn test_plan_rar_on_macos_starts_with_bsdtar() {
        let steps = plan(
            ArchiveFormat::Rar,
            Platform::MacOs,
            Path::new("/a.rar"),
            Path::new("/out"),
        );
        let programs: Vec<_> = steps
            .iter()
            .filter_map(|s| match s {
                Strategy::Tool { program, .. } => Some(*program),
                _ => None,
            })
            .collect();
        assert_eq!(programs, vec!["bsdtar", "unar", "7z", "7zz"]);
    }

    #[test]
    fn test_plan_7z_elsewhere_uses_output_switch() {
        let steps = plan(
            ArchiveFormat::SevenZip,
            Platform::Unix,
            Path::new("/a.7z"),
            Path::new("/out"),
        );
        assert_eq!(steps[0].describe(), "7z x -y /a.7z -o/out");
        assert!(steps.iter().all(|s| !matches!(s, Strategy::Builtin(_))));
    }

    #[test]
    fn test_multipart_first_segment_accepted() {
        let temp = TempDir::new().unwrap();
        let first = temp.path().join("big.part1.rar");
        std::fs::write(&first, b"Rar!").unwrap();
        std::fs::write(temp.path().join("big.part2.rar"), b"Rar!").unwrap();
        assert!(check_multipart(&first).is_ok());

        let seven = temp.path().join("big.7z.001");
        assert!(check_multipart(&seven).is_ok());
    }

    #[test_case("big.part2.rar", "big.part1.rar")]
    #[test_case("big.part03.rar", "big.part01.rar")]
    #[test_case("big.7z.002", "big.7z.001")]
    #[test_case("big.r00", "big.rar")]
    fn test_multipart_later_segment_rejected(name: &str, expected: &str) {
        let err = check_multipart(Path::new(name)).unwrap_err();
        assert!(matches!(err, Error::DataInvalid(_)));
        assert!(err.to_string().contains(expected));
    }

    #[test]
    fn test_failure_lists_every_candidate() {
        let failure = ExtractionFailure {
            archive: PathBuf::from("/dl/foo.7z"),
            format: ArchiveFormat::SevenZip,
            attempts: vec![
                ExtractionAttempt {
                    candidate: "7z x -y /dl/foo.7z -o/out".into(),
                    available: true,
                    error: Some("exited with exit status: 2: Data Error".into()),
                },
                ExtractionAttempt {
                    candidate: "unar".into(),
                    available: false,
                    error: None,
                },
            ],
            hint: Platform::Unix.install_hint().to_string(),
        };

        let text = failure.to_string();
        assert!(text.contains("7z x -y"));
        assert!(text.contains("Data Error"));
        assert!(text.contains("unar: not installed"));
        assert!(text.contains("p7zip"));
        assert!(failure.any_available());
    }
}
