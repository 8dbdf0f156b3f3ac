//! Download strategies.
//!
//! A [`Strategy`] is picked from the explicit download type or, failing
//! that, from the shape of the source. Every strategy stages its result in
//! a scratch directory next to the destination and only moves it into
//! place once complete, so an interrupted download never leaves a
//! truncated tree in the cache.
//!
//! # Supported sources
//!
//! | Strategy   | Detected from                                            |
//! |------------|----------------------------------------------------------|
//! | File       | `file://`, any other URL or path containing `/`          |
//! | Git        | `git://`, URLs and paths ending in `.git`                |
//! | Subversion | `svn://`, `svn+http://`, well-known svn hosts            |
//! | Cvs        | `cvs://:pserver:user@host:/root:module`                  |
//! | Mercurial  | `hg://`, googlecode hg                                   |
//! | Bazaar     | `bzr://`                                                 |
//! | Fossil     | `fossil://`                                              |
//! | Drush      | anything else, e.g. `views-7.x-3.1`                      |

use super::{FetchRequest, Fetcher, find_tool, run_command};
use crate::backend::Drush;
use crate::error::{Error, Result};
use flate2::read::GzDecoder;
use regex::Regex;
use std::fmt;
use std::fs;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use walkdir::WalkDir;

/// Maximum size of a single download.
const MAX_DOWNLOAD_SIZE: u64 = 512 * 1024 * 1024;

const USER_AGENT: &str = concat!("drupid/", env!("CARGO_PKG_VERSION"));

/// How a source is retrieved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Single file or archive over HTTP(S) or from the local filesystem
    File,
    /// Single file or archive requested with an HTTP POST
    Post,
    /// Git clone
    Git,
    /// Subversion checkout
    Subversion,
    /// CVS checkout
    Cvs,
    /// Mercurial clone
    Mercurial,
    /// Bazaar lightweight checkout
    Bazaar,
    /// Fossil clone
    Fossil,
    /// `drush pm-download`
    Drush,
}

static DETECTION: LazyLock<Vec<(Regex, Strategy)>> = LazyLock::new(|| {
    [
        (r"^file://", Strategy::File),
        (r"^cvs://", Strategy::Cvs),
        (r"^bzr://", Strategy::Bazaar),
        (r"^git://", Strategy::Git),
        (r"^https?://.+\.git$", Strategy::Git),
        (r"^hg://", Strategy::Mercurial),
        (r"^svn://", Strategy::Subversion),
        (r"^svn\+http://", Strategy::Subversion),
        (r"^fossil://", Strategy::Fossil),
        (r"^https?://(.+?\.)?googlecode\.com/hg", Strategy::Mercurial),
        (r"^https?://(.+?\.)?googlecode\.com/svn", Strategy::Subversion),
        (r"^https?://(.+?\.)?sourceforge\.net/svnroot/", Strategy::Subversion),
        (r"^https?://svn\.apache\.org/repos/", Strategy::Subversion),
        (r"^https?://svn\.", Strategy::Subversion),
        (r"\.git$", Strategy::Git),
        (r"/", Strategy::File),
    ]
    .into_iter()
    .map(|(pattern, strategy)| {
        (
            Regex::new(pattern).expect("valid strategy regex"),
            strategy,
        )
    })
    .collect()
});

impl Strategy {
    /// Guess the strategy from the source alone.
    pub fn detect(source: &str) -> Self {
        DETECTION
            .iter()
            .find(|(re, _)| re.is_match(source))
            .map_or(Self::Drush, |(_, strategy)| *strategy)
    }

    /// The strategy for an explicit download type, falling back to
    /// detection for unknown or missing types.
    pub fn resolve(kind: Option<&str>, source: &str) -> Self {
        match kind {
            Some("file" | "get") => Self::File,
            Some("post") => Self::Post,
            Some("git") => Self::Git,
            Some("svn") => Self::Subversion,
            Some("cvs") => Self::Cvs,
            Some("hg") => Self::Mercurial,
            Some("bzr") => Self::Bazaar,
            Some("fossil") => Self::Fossil,
            _ => Self::detect(source),
        }
    }

    /// Short name used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Post => "post",
            Self::Git => "git",
            Self::Subversion => "svn",
            Self::Cvs => "cvs",
            Self::Mercurial => "hg",
            Self::Bazaar => "bzr",
            Self::Fossil => "fossil",
            Self::Drush => "drush",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArchiveType {
    Zip,
    Gzip,
    Tar,
    Bzip2,
    Xz,
    Rar,
}

impl ArchiveType {
    /// Recognize an archive from its magic bytes.
    fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(b"PK\x03\x04") {
            Some(Self::Zip)
        } else if bytes.starts_with(&[0x1f, 0x8b]) {
            Some(Self::Gzip)
        } else if bytes.starts_with(b"BZh") {
            Some(Self::Bzip2)
        } else if bytes.starts_with(&[0xfd, b'7', b'z', b'X', b'Z', 0x00]) {
            Some(Self::Xz)
        } else if bytes.starts_with(b"Rar!") {
            Some(Self::Rar)
        } else if is_tar(bytes) {
            Some(Self::Tar)
        } else {
            None
        }
    }
}

fn is_tar(bytes: &[u8]) -> bool {
    bytes.get(257..262).is_some_and(|magic| magic == b"ustar")
}

/// Fetcher backed by an HTTP client, the usual version control tools and
/// drush.
#[derive(Clone)]
pub struct SystemFetcher {
    drush: Drush,
    agent: ureq::Agent,
}

impl SystemFetcher {
    /// Create a fetcher using `drush` for bare project names.
    pub fn new(drush: Drush) -> Self {
        Self {
            drush,
            agent: ureq::Agent::new_with_defaults(),
        }
    }

    fn read_url(&self, url: &str, post_data: Option<&str>) -> Result<Vec<u8>> {
        if let Some(path) = url.strip_prefix("file://") {
            return Ok(fs::read(path)?);
        }
        if !url.contains("://") {
            return Ok(fs::read(url)?);
        }

        let response = match post_data {
            Some(data) => self
                .agent
                .post(url)
                .header("User-Agent", USER_AGENT)
                .header("Content-Type", "application/x-www-form-urlencoded")
                .send(data),
            None => self.agent.get(url).header("User-Agent", USER_AGENT).call(),
        };
        let mut response = response.map_err(|e| Error::Network(format!("{url}: {e}")))?;
        response
            .body_mut()
            .with_config()
            .limit(MAX_DOWNLOAD_SIZE)
            .read_to_vec()
            .map_err(|e| Error::Network(format!("{url}: {e}")))
    }

    /// Download a file or archive and unpack it below `staging`.
    fn stage_file(&self, request: &FetchRequest, staging: &Path, post: bool) -> Result<PathBuf> {
        let post_data = post.then(|| request.param("post_data").unwrap_or_default());
        let bytes = self.read_url(&request.source, post_data)?;
        let file_name = download_file_name(request);
        let extracted = staging.join("extracted");
        fs::create_dir_all(&extracted)?;

        match ArchiveType::sniff(&bytes) {
            Some(kind) => {
                log::debug!("Extracting {kind:?} archive {file_name}");
                extract(kind, &bytes, &file_name, &extracted)?;
                single_root(&extracted)
            }
            None => {
                fs::write(extracted.join(&file_name), &bytes)?;
                Ok(extracted)
            }
        }
    }
}

impl Fetcher for SystemFetcher {
    fn fetch(&self, request: &FetchRequest) -> Result<PathBuf> {
        let strategy = Strategy::resolve(request.kind.as_deref(), &request.source);
        log::debug!(
            "{strategy} downloader for {} (dest={}, name={})",
            request.source,
            request.dest_dir.display(),
            request.name
        );

        fs::create_dir_all(&request.dest_dir)?;
        let staging = tempfile::Builder::new()
            .prefix(".staging-")
            .tempdir_in(&request.dest_dir)?;

        let tree = match strategy {
            Strategy::File => self.stage_file(request, staging.path(), false)?,
            Strategy::Post => self.stage_file(request, staging.path(), true)?,
            Strategy::Git => stage_git(request, staging.path())?,
            Strategy::Subversion => stage_svn(request, staging.path())?,
            Strategy::Cvs => stage_cvs(request, staging.path())?,
            Strategy::Mercurial => stage_hg(request, staging.path())?,
            Strategy::Bazaar => stage_bzr(request, staging.path())?,
            Strategy::Fossil => stage_fossil(request, staging.path())?,
            Strategy::Drush => self.drush.pm_download(&request.source, staging.path())?,
        };

        let staged = request.staged_path();
        if staged.exists() {
            fs::remove_dir_all(&staged)?;
        }
        fs::rename(&tree, &staged)?;
        log::debug!("Staged {} at {}", request.source, staged.display());
        Ok(staged)
    }

    fn download(&self, url: &str, dest_file: &Path) -> Result<()> {
        let bytes = self.read_url(url, None)?;
        let dir = dest_file.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        std::io::Write::write_all(&mut tmp, &bytes)?;
        tmp.persist(dest_file).map_err(|e| e.error)?;
        Ok(())
    }
}

/// Name of the downloaded file: the last URL segment, with the extension
/// replaced by `file_type` when given.
fn download_file_name(request: &FetchRequest) -> String {
    let trimmed = request.source.split(['?', '#']).next().unwrap_or_default();
    let base = trimmed
        .rsplit('/')
        .find(|s| !s.is_empty())
        .unwrap_or(request.name.as_str());
    match request.param("file_type") {
        Some(ext) => Path::new(base)
            .with_extension(ext)
            .to_string_lossy()
            .into_owned(),
        None => base.to_string(),
    }
}

fn extract(kind: ArchiveType, bytes: &[u8], file_name: &str, dest: &Path) -> Result<()> {
    match kind {
        ArchiveType::Zip => {
            let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
                .map_err(|e| Error::Archive(format!("{file_name}: {e}")))?;
            archive
                .extract(dest)
                .map_err(|e| Error::Archive(format!("{file_name}: {e}")))?;
        }
        ArchiveType::Tar => unpack_tar(bytes, file_name, dest)?,
        ArchiveType::Gzip => {
            let mut decoded = Vec::new();
            GzDecoder::new(bytes)
                .read_to_end(&mut decoded)
                .map_err(|e| Error::Archive(format!("{file_name}: {e}")))?;
            if is_tar(&decoded) {
                unpack_tar(&decoded, file_name, dest)?;
            } else {
                let stem = file_name.strip_suffix(".gz").unwrap_or(file_name);
                fs::write(dest.join(stem), decoded)?;
            }
        }
        ArchiveType::Bzip2 | ArchiveType::Xz | ArchiveType::Rar => {
            return Err(Error::Archive(format!(
                "{file_name}: {kind:?} archives are not supported"
            )));
        }
    }
    Ok(())
}

fn unpack_tar(bytes: &[u8], file_name: &str, dest: &Path) -> Result<()> {
    tar::Archive::new(bytes)
        .unpack(dest)
        .map_err(|e| Error::Archive(format!("{file_name}: {e}")))
}

/// The only directory inside `dir`, or `dir` itself.
fn single_root(dir: &Path) -> Result<PathBuf> {
    let entries: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .collect();
    match entries.as_slice() {
        [only] if only.is_dir() => Ok(only.clone()),
        _ => Ok(dir.to_path_buf()),
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Remove version control metadata directories named `name` below `dir`.
fn strip_metadata(dir: &Path, name: &str) -> Result<()> {
    let found: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(std::result::Result::ok)
        .filter(|e| e.file_type().is_dir() && e.file_name() == name)
        .map(walkdir::DirEntry::into_path)
        .collect();
    for path in found {
        if path.exists() {
            fs::remove_dir_all(path)?;
        }
    }
    Ok(())
}

fn stage_git(request: &FetchRequest, staging: &Path) -> Result<PathBuf> {
    let git = find_tool("git")?;
    let source = request.source.as_str();
    let clone = staging.join("clone");
    let clone_arg = path_arg(&clone);
    let export = staging.join(&request.name);

    let shallow = request.param("revision").is_none()
        && (source.starts_with("git://") || source.starts_with("https://github.com/"));
    let mut args = vec!["clone"];
    if shallow {
        args.extend(["--depth", "1"]);
    }
    if let Some(reference) = request.param("branch").or_else(|| request.param("tag")) {
        args.extend(["--branch", reference]);
    }
    args.extend([source, clone_arg.as_str()]);
    log::info!("Cloning {source}");
    run_command(&git, &args, None)?;

    if let Some(revision) = request.param("revision") {
        run_command(&git, &["checkout", revision, "--"], Some(&clone))?;
    }
    let prefix = format!("--prefix={}/", export.display());
    run_command(&git, &["checkout-index", "-a", "-f", &prefix], Some(&clone))?;

    if clone.join(".gitmodules").exists() {
        run_command(&git, &["submodule", "update", "--init", "--recursive"], Some(&clone))?;
        let export_submodule = format!(
            "git checkout-index -a -f \"--prefix={}/$displaypath/\"",
            export.display()
        );
        run_command(
            &git,
            &["submodule", "--quiet", "foreach", "--recursive", &export_submodule],
            Some(&clone),
        )?;
    }
    Ok(export)
}

fn stage_svn(request: &FetchRequest, staging: &Path) -> Result<PathBuf> {
    let svn = find_tool("svn")?;
    let source = request.source.as_str();
    let url = source
        .strip_prefix("svn+")
        .filter(|u| u.starts_with("http"))
        .unwrap_or(source);
    let checkout = path_arg(&staging.join("checkout"));
    let export = path_arg(&staging.join(&request.name));

    let mut args = vec![
        "checkout",
        "--non-interactive",
        "--trust-server-cert",
        url,
        checkout.as_str(),
    ];
    if let Some(revision) = request.param("revision") {
        args.extend(["-r", revision]);
    }
    log::info!("Checking out {url}");
    run_command(&svn, &args, None)?;
    run_command(&svn, &["export", "--force", &checkout, &export], None)?;
    Ok(PathBuf::from(export))
}

fn stage_cvs(request: &FetchRequest, staging: &Path) -> Result<PathBuf> {
    let cvs = find_tool("cvs")?;
    let spec = request
        .source
        .strip_prefix("cvs://")
        .unwrap_or(&request.source);
    let (root, module) = spec.rsplit_once(':').ok_or_else(|| Error::FetchFailed {
        name: request.name.clone(),
        message: format!("malformed CVS URL: {}", request.source),
    })?;

    log::info!("Checking out {module} from {root}");
    run_command(&cvs, &["-d", root, "login"], Some(staging))?;
    run_command(
        &cvs,
        &["-d", root, "checkout", "-d", &request.name, module],
        Some(staging),
    )?;
    let checkout = staging.join(&request.name);
    strip_metadata(&checkout, "CVS")?;
    Ok(checkout)
}

fn stage_hg(request: &FetchRequest, staging: &Path) -> Result<PathBuf> {
    let hg = find_tool("hg")?;
    let url = request
        .source
        .strip_prefix("hg://")
        .unwrap_or(&request.source);
    let clone = staging.join("clone");
    let export = path_arg(&staging.join(&request.name));

    log::info!("Cloning {url}");
    run_command(&hg, &["clone", url, &path_arg(&clone)], None)?;
    let mut args = vec!["archive", "-y", "-t", "files"];
    if let Some(revision) = request.param("revision") {
        args.extend(["-r", revision]);
    }
    args.push(export.as_str());
    run_command(&hg, &args, Some(&clone))?;
    Ok(PathBuf::from(export))
}

fn stage_bzr(request: &FetchRequest, staging: &Path) -> Result<PathBuf> {
    let bzr = find_tool("bzr")?;
    let url = request
        .source
        .strip_prefix("bzr://")
        .unwrap_or(&request.source);
    let checkout = staging.join(&request.name);

    log::info!("Checking out {url}");
    run_command(
        &bzr,
        &["checkout", "--lightweight", url, &path_arg(&checkout)],
        None,
    )?;
    strip_metadata(&checkout, ".bzr")?;
    Ok(checkout)
}

fn stage_fossil(request: &FetchRequest, staging: &Path) -> Result<PathBuf> {
    let fossil = find_tool("fossil")?;
    let url = request
        .source
        .strip_prefix("fossil://")
        .unwrap_or(&request.source);
    let repository = path_arg(&staging.join("repository.fossil"));
    let checkout = staging.join(&request.name);
    fs::create_dir_all(&checkout)?;

    log::info!("Cloning {url}");
    run_command(&fossil, &["clone", url, &repository], None)?;
    run_command(&fossil, &["open", &repository], Some(&checkout))?;
    for marker in [".fslckout", "_FOSSIL_"] {
        let path = checkout.join(marker);
        if path.exists() {
            fs::remove_file(path)?;
        }
    }
    Ok(checkout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::io::Write;
    use tempfile::TempDir;

    fn request(source: &str, dest: &Path) -> FetchRequest {
        FetchRequest {
            source: source.to_string(),
            kind: None,
            dest_dir: dest.to_path_buf(),
            name: "foolib".to_string(),
            params: BTreeMap::new(),
        }
    }

    fn tarball(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut encoder =
            flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        {
            let mut builder = tar::Builder::new(&mut encoder);
            for (path, content) in entries {
                let mut header = tar::Header::new_gnu();
                header.set_size(content.len() as u64);
                header.set_mode(0o644);
                header.set_cksum();
                builder
                    .append_data(&mut header, path, content.as_bytes())
                    .unwrap();
            }
            builder.finish().unwrap();
        }
        encoder.finish().unwrap()
    }

    #[test]
    fn test_detect() {
        assert_eq!(Strategy::detect("file:///tmp/foo.tgz"), Strategy::File);
        assert_eq!(Strategy::detect("git://github.com/x/y"), Strategy::Git);
        assert_eq!(Strategy::detect("https://example.org/x/y.git"), Strategy::Git);
        assert_eq!(Strategy::detect("/srv/repos/y.git"), Strategy::Git);
        assert_eq!(Strategy::detect("svn+http://example.org/repo"), Strategy::Subversion);
        assert_eq!(Strategy::detect("https://svn.example.org/repo"), Strategy::Subversion);
        assert_eq!(
            Strategy::detect("http://foo.googlecode.com/hg/"),
            Strategy::Mercurial
        );
        assert_eq!(
            Strategy::detect("cvs://:pserver:anon@cvs.example.org:/cvs:mod"),
            Strategy::Cvs
        );
        assert_eq!(Strategy::detect("hg://example.org/repo"), Strategy::Mercurial);
        assert_eq!(Strategy::detect("bzr://example.org/repo"), Strategy::Bazaar);
        assert_eq!(Strategy::detect("fossil://example.org/repo"), Strategy::Fossil);
        assert_eq!(Strategy::detect("http://example.org/foo.zip"), Strategy::File);
        assert_eq!(Strategy::detect("views-7.x-3.1"), Strategy::Drush);
    }

    #[test]
    fn test_explicit_kind_wins() {
        assert_eq!(Strategy::resolve(Some("git"), "http://example.org/x"), Strategy::Git);
        assert_eq!(Strategy::resolve(Some("get"), "http://example.org/x.git"), Strategy::File);
        assert_eq!(Strategy::resolve(Some("post"), "http://example.org/x"), Strategy::Post);
        assert_eq!(Strategy::resolve(Some("weird"), "views"), Strategy::Drush);
    }

    #[test]
    fn test_file_type_overrides_extension() {
        let tmp = TempDir::new().unwrap();
        let mut req = request("http://example.org/download.php?id=3", tmp.path());
        assert_eq!(download_file_name(&req), "download.php");
        req.params.insert("file_type".to_string(), "zip".to_string());
        assert_eq!(download_file_name(&req), "download.zip");
    }

    #[test]
    fn test_local_tarball_with_root_directory() {
        let tmp = TempDir::new().unwrap();
        let archive = tmp.path().join("foolib-1.0.tar.gz");
        fs::write(
            &archive,
            tarball(&[("foolib-1.0/foo.js", "var foo;"), ("foolib-1.0/README", "hi")]),
        )
        .unwrap();

        let fetcher = SystemFetcher::new(Drush::at("drush"));
        let req = request(&format!("file://{}", archive.display()), &tmp.path().join("cache"));
        let staged = fetcher.fetch(&req).unwrap();
        assert_eq!(staged, tmp.path().join("cache/foolib"));
        assert!(staged.join("foo.js").exists());
        assert!(staged.join("README").exists());

        // Nothing but the staged tree is left behind.
        let leftovers: Vec<_> = fs::read_dir(tmp.path().join("cache")).unwrap().collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[test]
    fn test_local_zip_without_root_directory() {
        let tmp = TempDir::new().unwrap();
        let mut buffer = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(Cursor::new(&mut buffer));
            let options = zip::write::SimpleFileOptions::default();
            zip.start_file("a.js", options).unwrap();
            zip.write_all(b"a").unwrap();
            zip.start_file("b.js", options).unwrap();
            zip.write_all(b"b").unwrap();
            zip.finish().unwrap();
        }
        let archive = tmp.path().join("lib.zip");
        fs::write(&archive, buffer).unwrap();

        let fetcher = SystemFetcher::new(Drush::at("drush"));
        let staged = fetcher
            .fetch(&request(&format!("file://{}", archive.display()), &tmp.path().join("cache")))
            .unwrap();
        assert!(staged.join("a.js").exists());
        assert!(staged.join("b.js").exists());
    }

    #[test]
    fn test_plain_file_is_staged_inside_directory() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("jquery.min.js");
        fs::write(&file, "jQuery").unwrap();

        let fetcher = SystemFetcher::new(Drush::at("drush"));
        let staged = fetcher
            .fetch(&request(&format!("file://{}", file.display()), &tmp.path().join("cache")))
            .unwrap();
        assert_eq!(fs::read_to_string(staged.join("jquery.min.js")).unwrap(), "jQuery");
    }

    #[test]
    fn test_failed_fetch_leaves_nothing() {
        let tmp = TempDir::new().unwrap();
        let fetcher = SystemFetcher::new(Drush::at("drush"));
        let req = request("file:///nonexistent/foo.tgz", &tmp.path().join("cache"));
        assert!(fetcher.fetch(&req).is_err());
        assert!(!req.staged_path().exists());
        let leftovers: Vec<_> = fs::read_dir(tmp.path().join("cache")).unwrap().collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_unsupported_archive() {
        let tmp = TempDir::new().unwrap();
        let archive = tmp.path().join("foo.tar.bz2");
        fs::write(&archive, b"BZh91AY&SY").unwrap();
        let fetcher = SystemFetcher::new(Drush::at("drush"));
        let err = fetcher
            .fetch(&request(&format!("file://{}", archive.display()), &tmp.path().join("cache")))
            .unwrap_err();
        assert!(matches!(err, Error::Archive(_)), "{err}");
    }

    #[test]
    fn test_download_single_file() {
        let tmp = TempDir::new().unwrap();
        let patch = tmp.path().join("fix.diff");
        fs::write(&patch, "--- a\n+++ b\n").unwrap();
        let fetcher = SystemFetcher::new(Drush::at("drush"));
        let dest = tmp.path().join("patches/fix.diff");
        fetcher
            .download(&format!("file://{}", patch.display()), &dest)
            .unwrap();
        assert_eq!(fs::read_to_string(dest).unwrap(), "--- a\n+++ b\n");
    }
}
