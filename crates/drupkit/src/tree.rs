//! Directory tree comparison and mirroring.
//!
//! Both primitives take a [`Filter`]: an ordered list of rules where the
//! first rule matching a relative path decides its fate.
//!
//! - [`diff`] reports entries that differ in content or presence. Timestamps
//!   and permissions are never compared.
//! - [`mirror`] makes a destination tree match a source tree, deleting extra
//!   destination entries unless a rule protects them.

use crate::error::Result;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Component as PathComponent, Path, PathBuf};
use walkdir::WalkDir;

/// Entries that never take part in a comparison.
pub const DEFAULT_EXCLUSIONS: [&str; 5] = [".DS_Store", ".git", ".bzr", ".hg", ".svn"];

/// What a matching rule does to a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    /// Compare/copy the path even if a later rule would exclude it
    Include,
    /// Skip the path entirely: never compared, copied or deleted
    Exclude,
    /// Never delete the path from a mirror destination
    Protect,
    /// Allow deleting the path even if a later rule protects it
    Risk,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Pattern {
    /// Path prefix relative to the tree root; matches the path and below
    Anchored(Vec<String>),
    /// Any path component with this name
    Name(String),
}

impl Pattern {
    fn parse(pattern: &str) -> Self {
        let trimmed = pattern.trim().trim_end_matches('/');
        if trimmed.contains('/') {
            Self::Anchored(
                trimmed
                    .split('/')
                    .filter(|c| !c.is_empty() && *c != ".")
                    .map(str::to_string)
                    .collect(),
            )
        } else {
            Self::Name(trimmed.to_string())
        }
    }

    fn matches(&self, rel: &Path) -> bool {
        match self {
            Self::Anchored(parts) => {
                let mut components = normal_components(rel);
                parts
                    .iter()
                    .all(|p| components.next().is_some_and(|c| c == p.as_str()))
            }
            Self::Name(name) => normal_components(rel).any(|c| c == name.as_str()),
        }
    }
}

fn normal_components(rel: &Path) -> impl Iterator<Item = std::borrow::Cow<'_, str>> {
    rel.components().filter_map(|c| match c {
        PathComponent::Normal(s) => Some(s.to_string_lossy()),
        _ => None,
    })
}

/// A single filter rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    kind: RuleKind,
    pattern: Pattern,
}

impl Rule {
    /// Build a rule. Patterns containing `/` are anchored at the tree root
    /// (`/profiles/default`, `libraries/foo`); others match any component
    /// with that name (`.git`).
    pub fn new(kind: RuleKind, pattern: &str) -> Self {
        Self {
            kind,
            pattern: Pattern::parse(pattern),
        }
    }

    /// The rule's effect.
    pub fn kind(&self) -> RuleKind {
        self.kind
    }

    /// Whether the rule applies to the given relative path.
    pub fn matches(&self, rel: &Path) -> bool {
        self.pattern.matches(rel)
    }
}

/// Ordered, first-match set of rules.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    rules: Vec<Rule>,
}

impl Filter {
    /// An empty filter: everything is compared, copied and deletable.
    pub fn new() -> Self {
        Self::default()
    }

    /// A filter excluding [`DEFAULT_EXCLUSIONS`].
    pub fn with_default_exclusions() -> Self {
        DEFAULT_EXCLUSIONS
            .iter()
            .fold(Self::new(), |f, name| f.exclude(name))
    }

    /// Append a rule.
    pub fn rule(mut self, kind: RuleKind, pattern: &str) -> Self {
        self.rules.push(Rule::new(kind, pattern));
        self
    }

    /// Append an include rule.
    pub fn include(self, pattern: &str) -> Self {
        self.rule(RuleKind::Include, pattern)
    }

    /// Append an exclude rule.
    pub fn exclude(self, pattern: &str) -> Self {
        self.rule(RuleKind::Exclude, pattern)
    }

    /// Append a protect rule.
    pub fn protect(self, pattern: &str) -> Self {
        self.rule(RuleKind::Protect, pattern)
    }

    /// Append a risk rule.
    pub fn risk(self, pattern: &str) -> Self {
        self.rule(RuleKind::Risk, pattern)
    }

    /// Append every rule of `other`, after the rules of `self`.
    pub fn extend(mut self, other: &Filter) -> Self {
        self.rules.extend(other.rules.iter().cloned());
        self
    }

    /// The rules, in evaluation order.
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// The kind of the first rule matching `rel`, if any.
    pub fn first_match(&self, rel: &Path) -> Option<RuleKind> {
        self.rules.iter().find(|r| r.matches(rel)).map(Rule::kind)
    }

    fn is_excluded(&self, rel: &Path) -> bool {
        self.first_match(rel) == Some(RuleKind::Exclude)
    }

    fn keeps(&self, rel: &Path) -> bool {
        matches!(
            self.first_match(rel),
            Some(RuleKind::Protect | RuleKind::Exclude)
        )
    }
}

#[derive(Debug)]
enum Entry {
    Dir,
    File { len: u64 },
    Symlink(PathBuf),
}

impl Entry {
    fn code(&self) -> char {
        match self {
            Self::Dir => 'd',
            Self::File { .. } => 'f',
            Self::Symlink(_) => 'L',
        }
    }
}

fn snapshot(root: &Path, filter: &Filter) -> Result<BTreeMap<PathBuf, Entry>> {
    let mut entries = BTreeMap::new();
    if !root.exists() {
        return Ok(entries);
    }

    for entry in WalkDir::new(root).follow_links(false).min_depth(1) {
        let entry = entry?;
        let rel = entry.path().strip_prefix(root).unwrap_or(entry.path());
        if filter.is_excluded(rel) {
            continue;
        }
        let file_type = entry.file_type();
        let item = if file_type.is_symlink() {
            Entry::Symlink(fs::read_link(entry.path())?)
        } else if file_type.is_dir() {
            Entry::Dir
        } else {
            Entry::File {
                len: entry.metadata()?.len(),
            }
        };
        entries.insert(rel.to_path_buf(), item);
    }

    Ok(entries)
}

fn same_content(a: &Path, b: &Path) -> Result<bool> {
    let left = fs::read(a)?;
    let right = fs::read(b)?;
    Ok(blake3::hash(&left) == blake3::hash(&right))
}

/// Compare two directory trees.
///
/// Returns one itemized line per difference, sorted by path:
/// `>f+++++++++ path` for entries only in `src`, `*deleting   path` for
/// entries only in `dst`, and `>f.c....... path` for entries whose content
/// or type differs. An empty list means the trees are identical.
pub fn diff(src: &Path, dst: &Path, filter: &Filter) -> Result<Vec<String>> {
    let left = snapshot(src, filter)?;
    let right = snapshot(dst, filter)?;
    let mut changes: BTreeMap<&Path, String> = BTreeMap::new();

    for (rel, entry) in &left {
        let line = match (entry, right.get(rel)) {
            (_, None) => Some(format!(">{}+++++++++ {}", entry.code(), rel.display())),
            (Entry::Dir, Some(Entry::Dir)) => None,
            (Entry::File { len: a }, Some(Entry::File { len: b })) => {
                if a != b || !same_content(&src.join(rel), &dst.join(rel))? {
                    Some(format!(">f.c....... {}", rel.display()))
                } else {
                    None
                }
            }
            (Entry::Symlink(a), Some(Entry::Symlink(b))) => {
                (a != b).then(|| format!("cL.c....... {}", rel.display()))
            }
            (_, Some(_)) => Some(format!(">{}......... {}", entry.code(), rel.display())),
        };
        if let Some(line) = line {
            changes.insert(rel, line);
        }
    }

    for rel in right.keys().filter(|rel| !left.contains_key(*rel)) {
        changes.insert(rel, format!("*deleting   {}", rel.display()));
    }

    Ok(changes.into_values().collect())
}

/// Make `dst` a copy of `src`.
///
/// Excluded paths are neither copied nor deleted. Destination entries missing
/// from `src` are deleted unless their first matching rule is
/// [`RuleKind::Protect`]; a directory is only removed once nothing it
/// contains is protected.
pub fn mirror(src: &Path, dst: &Path, filter: &Filter) -> Result<()> {
    fs::create_dir_all(dst)?;
    let source = snapshot(src, filter)?;

    for (rel, entry) in &source {
        let from = src.join(rel);
        let to = dst.join(rel);
        match entry {
            Entry::Dir => {
                if to.is_symlink() || to.is_file() {
                    fs::remove_file(&to)?;
                }
                fs::create_dir_all(&to)?;
            }
            Entry::File { .. } => {
                if to.is_dir() && !to.is_symlink() {
                    fs::remove_dir_all(&to)?;
                } else if to.is_symlink() {
                    fs::remove_file(&to)?;
                }
                fs::copy(&from, &to)?;
            }
            Entry::Symlink(target) => {
                if to.is_dir() && !to.is_symlink() {
                    fs::remove_dir_all(&to)?;
                } else if to.symlink_metadata().is_ok() {
                    fs::remove_file(&to)?;
                }
                make_symlink(target, &to)?;
            }
        }
    }

    let mut stale: Vec<PathBuf> = Vec::new();
    for entry in WalkDir::new(dst)
        .follow_links(false)
        .min_depth(1)
        .contents_first(true)
    {
        let entry = entry?;
        let rel = entry.path().strip_prefix(dst).unwrap_or(entry.path());
        if source.contains_key(rel) || filter.keeps(rel) {
            continue;
        }
        stale.push(entry.path().to_path_buf());
    }

    for path in stale {
        let meta = path.symlink_metadata()?;
        if meta.is_dir() {
            if fs::read_dir(&path)?.next().is_none() {
                fs::remove_dir(&path)?;
            }
        } else {
            fs::remove_file(&path)?;
        }
    }

    Ok(())
}

/// Express `path` relative to `base`, walking up with `..` where needed.
///
/// Both paths are compared lexically; neither needs to exist.
pub fn relative_path(path: &Path, base: &Path) -> PathBuf {
    let path: Vec<_> = path.components().collect();
    let base: Vec<_> = base.components().collect();
    let common = path
        .iter()
        .zip(base.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut rel = PathBuf::new();
    for _ in common..base.len() {
        rel.push("..");
    }
    for component in &path[common..] {
        rel.push(component.as_os_str());
    }
    if rel.as_os_str().is_empty() {
        rel.push(".");
    }
    rel
}

/// Copy a directory tree, preserving symlinks.
pub fn copy_tree(src: &Path, dst: &Path) -> Result<()> {
    mirror(src, dst, &Filter::new())
}

#[cfg(unix)]
fn make_symlink(target: &Path, link: &Path) -> Result<()> {
    std::os::unix::fs::symlink(target, link)?;
    Ok(())
}

#[cfg(not(unix))]
fn make_symlink(target: &Path, link: &Path) -> Result<()> {
    let resolved = link.parent().map(|p| p.join(target)).unwrap_or_default();
    if resolved.is_dir() {
        copy_tree(&resolved, link)
    } else {
        fs::copy(&resolved, link)?;
        Ok(())
    }
}
