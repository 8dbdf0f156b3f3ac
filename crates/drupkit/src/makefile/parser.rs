//! Parser for the drush makefile format.
//!
//! Every statement has the shape `base[arg1][arg2]... = value`. Statements
//! on `projects` and `libraries` are dispatched through a table keyed on
//! the base key and the number of bracketed arguments; anything the table
//! does not cover is a parse error naming the line.
//!
//! Parsing is all or nothing: the first malformed line aborts it.

use super::{Makefile, normalize_path};
use crate::component::{Component, Library};
use crate::error::{Error, Result};
use crate::project::{Project, ProjectType};
use crate::version::{Version, VersionCore};
use regex::Regex;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

static STATEMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*([^\s\[=]+)\s*(\[\s*(.*?)\s*\])?\s*=\s*["']?([^\s"'(]+)"#)
        .expect("valid statement regex")
});

static ARG_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\]\s*\[").expect("valid separator regex"));

static CORE_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^\s*core *= *["']? *(\d+)\.?(\d+)?"#).expect("valid core field regex")
});

static INCLUDE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^[ \t]*includes\[.*\]\s*=\s*"?([^\s"]+)"?[ \t]*$"#)
        .expect("valid includes regex")
});

static SKIPPED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(;|core|$)").expect("valid skip regex"));

static OVERWRITE_TRUE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)TRUE").expect("valid overwrite regex"));

/// Parse the makefile at `path`.
pub fn parse_file(path: &Path) -> Result<Makefile> {
    let path = std::path::absolute(path)?;
    log::debug!("Parsing {}", path.display());
    let content = fs::read_to_string(&path)?;
    parse_string(&content, &path)
}

/// Parse makefile text. Relative paths are resolved against the directory
/// of `path`, which need not exist.
pub fn parse_string(content: &str, path: &Path) -> Result<Makefile> {
    let mut makefile = Makefile::new(path)?;
    let dir = makefile.dir().to_path_buf();
    let content = expand_includes(content, &dir, &mut vec![makefile.path.clone()])?;

    let caps = CORE_FIELD
        .captures(&content)
        .ok_or_else(|| Error::MissingCore(makefile.path.clone()))?;
    let core_num: u32 = caps[1]
        .parse()
        .map_err(|_| Error::MissingCore(makefile.path.clone()))?;
    let core = VersionCore::new(core_num);
    let drupal = match caps.get(2) {
        Some(minor) => {
            Project::with_version("drupal", core, &format!("{core_num}.{}", minor.as_str()))?
        }
        None => Project::new("drupal", core),
    };

    let mut state = ParseState {
        core,
        dir,
        api: None,
        projects: BTreeMap::from([("drupal".to_string(), drupal)]),
        libraries: BTreeMap::new(),
        patches: Vec::new(),
        warnings: Vec::new(),
    };

    for (index, line) in content.lines().enumerate() {
        let lineno = index + 1;
        if SKIPPED.is_match(line) {
            continue;
        }
        let statement = Statement::parse(line)
            .ok_or_else(|| Error::parse(path, lineno, format!("Could not parse line: {}", line.trim())))?;
        state
            .apply(&statement, lineno)
            .map_err(|message| Error::parse(path, lineno, message))?;
    }

    state.attach_patches();
    makefile.core = Some(core);
    makefile.api = state.api;
    makefile.projects = state.projects;
    makefile.libraries = state.libraries;
    makefile.warnings = state.warnings;
    Ok(makefile)
}

/// Replace every `includes[] = file` line by the content of `file`,
/// resolved against `dir`. Included makefiles may include others.
fn expand_includes(content: &str, dir: &Path, stack: &mut Vec<PathBuf>) -> Result<String> {
    let current = stack.last().cloned().unwrap_or_else(|| dir.to_path_buf());
    let mut expanded = String::with_capacity(content.len());
    for (index, line) in content.lines().enumerate() {
        let Some(caps) = INCLUDE.captures(line) else {
            expanded.push_str(line);
            expanded.push('\n');
            continue;
        };
        let target = &caps[1];
        if target.contains("://") {
            return Err(Error::parse(
                &current,
                index + 1,
                format!("Remote includes are not supported: {target}"),
            ));
        }
        let included = std::path::absolute(dir.join(target))?;
        if stack.contains(&included) {
            return Err(Error::parse(
                &current,
                index + 1,
                format!("Recursive include of {}", included.display()),
            ));
        }
        log::debug!("Including makefile {}", included.display());
        let text = fs::read_to_string(&included)?;
        let inner_dir = included.parent().unwrap_or(dir).to_path_buf();
        stack.push(included);
        expanded.push_str(&expand_includes(&text, &inner_dir, stack)?);
        stack.pop();
    }
    Ok(expanded)
}

/// One `base[args] = value` line.
#[derive(Debug, PartialEq, Eq)]
struct Statement {
    key: String,
    args: Vec<String>,
    value: String,
}

impl Statement {
    fn parse(line: &str) -> Option<Self> {
        let caps = STATEMENT.captures(line)?;
        let mut args: Vec<String> = match caps.get(3) {
            Some(inner) if !inner.as_str().is_empty() => ARG_SEPARATOR
                .split(inner.as_str())
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        };
        // `projects[foo][patch][] = url` has two arguments, not three.
        while args.last().is_some_and(String::is_empty) {
            args.pop();
        }
        Some(Self {
            key: caps[1].to_string(),
            args,
            value: caps[4].trim().to_string(),
        })
    }

    fn arg(&self, index: usize) -> &str {
        self.args.get(index).map_or("", String::as_str)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Base {
    Projects,
    Libraries,
}

type Handler = fn(&mut ParseState, &Statement) -> std::result::Result<(), String>;

/// Handlers by base key and argument count.
const DISPATCH: &[(Base, usize, Handler)] = &[
    (Base::Projects, 0, project_bare),
    (Base::Projects, 1, project_version),
    (Base::Projects, 2, project_attribute),
    (Base::Projects, 3, download_field),
    (Base::Projects, 4, patch_field),
    (Base::Libraries, 0, too_few_arguments),
    (Base::Libraries, 1, too_few_arguments),
    (Base::Libraries, 2, library_attribute),
    (Base::Libraries, 3, download_field),
    (Base::Libraries, 4, patch_field),
];

#[derive(Debug)]
struct PendingPatch {
    base: Base,
    owner: String,
    descr: String,
    url: Option<String>,
    md5: Option<String>,
}

struct ParseState {
    core: VersionCore,
    dir: PathBuf,
    api: Option<String>,
    projects: BTreeMap<String, Project>,
    libraries: BTreeMap<String, Library>,
    patches: Vec<PendingPatch>,
    warnings: Vec<String>,
}

impl ParseState {
    fn apply(&mut self, statement: &Statement, lineno: usize) -> std::result::Result<(), String> {
        let base = match statement.key.as_str() {
            "api" => {
                self.api = Some(statement.value.clone());
                return Ok(());
            }
            "projects" => Base::Projects,
            "libraries" => Base::Libraries,
            "includes" => {
                self.warn(format!("Unexpected 'includes' directive (line {lineno})"));
                return Ok(());
            }
            other => {
                self.warn(format!("Could not parse key: {other} (line {lineno})"));
                return Ok(());
            }
        };

        let depth = statement.args.len();
        let handler = DISPATCH
            .iter()
            .find(|(b, d, _)| *b == base && *d == depth)
            .map(|(_, _, handler)| *handler)
            .ok_or_else(|| "Too many arguments".to_string())?;

        if depth > 0 {
            self.ensure(base, statement.arg(0));
        }
        handler(self, statement)
    }

    fn warn(&mut self, message: String) {
        log::warn!("{message}");
        self.warnings.push(message);
    }

    fn ensure(&mut self, base: Base, name: &str) {
        match base {
            Base::Projects => {
                if !self.projects.contains_key(name) {
                    self.projects
                        .insert(name.to_string(), Project::new(name, self.core));
                }
            }
            Base::Libraries => {
                if !self.libraries.contains_key(name) {
                    self.libraries.insert(name.to_string(), Library::new(name));
                }
            }
        }
    }

    fn project(&mut self, name: &str) -> std::result::Result<&mut Project, String> {
        self.projects
            .get_mut(name)
            .ok_or_else(|| format!("Unknown project: {name}"))
    }

    fn component(&mut self, base: Base, name: &str) -> std::result::Result<&mut Component, String> {
        match base {
            Base::Projects => self.project(name).map(Project::component_mut),
            Base::Libraries => self
                .libraries
                .get_mut(name)
                .map(Library::component_mut)
                .ok_or_else(|| format!("Unknown library: {name}")),
        }
    }

    fn base_of(&self, statement: &Statement) -> Base {
        if statement.key == "libraries" {
            Base::Libraries
        } else {
            Base::Projects
        }
    }

    fn set_version(&mut self, name: &str, value: &str) -> std::result::Result<(), String> {
        let core = self.core;
        let version = Version::new(core, value).map_err(|e| e.to_string())?;
        self.project(name)?
            .set_version(version)
            .map_err(|e| e.to_string())
    }

    fn attach_patches(&mut self) {
        for pending in std::mem::take(&mut self.patches) {
            let Some(url) = pending.url else {
                self.warn(format!(
                    "Patch {} of {} has no URL and was ignored",
                    pending.descr, pending.owner
                ));
                continue;
            };
            if let Ok(component) = self.component(pending.base, &pending.owner) {
                component.add_patch(url, pending.descr, pending.md5);
            }
        }
    }
}

/// `projects[] = views`
fn project_bare(state: &mut ParseState, statement: &Statement) -> std::result::Result<(), String> {
    let name = statement.value.clone();
    state
        .projects
        .insert(name.clone(), Project::new(name, state.core));
    Ok(())
}

/// `projects[views] = 3.1`
fn project_version(state: &mut ParseState, statement: &Statement) -> std::result::Result<(), String> {
    state.set_version(statement.arg(0), &statement.value)
}

/// `projects[views][<attribute>] = value`
fn project_attribute(state: &mut ParseState, statement: &Statement) -> std::result::Result<(), String> {
    let name = statement.arg(0);
    let value = statement.value.as_str();
    if statement.arg(1) == "version" {
        return state.set_version(name, value);
    }
    let normalized = normalize_path(value, &state.dir);
    let project = state.project(name)?;
    match statement.arg(1) {
        "patch" => project
            .component_mut()
            .add_patch(normalized, basename(value), None),
        "subdir" => project.component_mut().set_subdir(value),
        "location" => project.set_location(normalized),
        "directory_name" => project.component_mut().set_directory_name(value),
        "type" => {
            if value == "core" {
                project.set_core_project(true);
            } else {
                let kind = match value {
                    "module" | "profile" | "theme" => value.parse::<ProjectType>(),
                    _ => return Err(format!("Illegal value: {value}")),
                };
                project.set_project_type(kind.map_err(|e| e.to_string())?);
            }
        }
        "l10n_path" => project.set_l10n_path(normalized),
        "l10n_url" => project.set_l10n_url(normalized),
        "overwrite" => {
            if OVERWRITE_TRUE.is_match(value) {
                project.component_mut().overwrite = true;
            }
        }
        other => return Err(format!("Unknown key: {other}")),
    }
    Ok(())
}

/// `libraries[foo][<attribute>] = value`
fn library_attribute(state: &mut ParseState, statement: &Statement) -> std::result::Result<(), String> {
    let value = statement.value.as_str();
    let normalized = normalize_path(value, &state.dir);
    let library = state
        .libraries
        .get_mut(statement.arg(0))
        .ok_or_else(|| format!("Unknown library: {}", statement.arg(0)))?;
    match statement.arg(1) {
        "patch" => library
            .component_mut()
            .add_patch(normalized, basename(value), None),
        "subdir" => library.component_mut().set_subdir(value),
        "destination" => library.set_destination(value),
        "directory_name" => library.component_mut().set_directory_name(value),
        other => return Err(format!("Unknown key: {other}")),
    }
    Ok(())
}

/// `<base>[name][download][type|url|<param>] = value`
fn download_field(state: &mut ParseState, statement: &Statement) -> std::result::Result<(), String> {
    if statement.arg(1) != "download" {
        return Err(format!("Unknown key: {}", statement.arg(1)));
    }
    let base = state.base_of(statement);
    let normalized = normalize_path(&statement.value, &state.dir);
    let download = &mut state.component(base, statement.arg(0))?.download;
    match statement.arg(2) {
        "type" => download.kind = Some(statement.value.clone()),
        "url" => download.url = Some(normalized),
        param => {
            download
                .params
                .insert(param.to_string(), statement.value.clone());
        }
    }
    Ok(())
}

/// `<base>[name][patch][descr][url|md5] = value`
///
/// Collected while parsing and attached once the whole file is read.
fn patch_field(state: &mut ParseState, statement: &Statement) -> std::result::Result<(), String> {
    if statement.arg(1) != "patch" {
        return Err(format!("Unknown key: {}", statement.arg(1)));
    }
    let base = state.base_of(statement);
    let (owner, descr) = (statement.arg(0), statement.arg(2));
    let normalized = normalize_path(&statement.value, &state.dir);

    let index = match state
        .patches
        .iter()
        .position(|p| p.base == base && p.owner == owner && p.descr == descr)
    {
        Some(index) => index,
        None => {
            state.patches.push(PendingPatch {
                base,
                owner: owner.to_string(),
                descr: descr.to_string(),
                url: None,
                md5: None,
            });
            state.patches.len() - 1
        }
    };
    let pending = &mut state.patches[index];
    match statement.arg(3) {
        "url" => pending.url = Some(normalized),
        "md5" => pending.md5 = Some(statement.value.clone()),
        other => return Err(format!("Unknown key: {other}")),
    }
    Ok(())
}

fn too_few_arguments(_: &mut ParseState, _: &Statement) -> std::result::Result<(), String> {
    Err("Too few arguments".to_string())
}

fn basename(value: &str) -> String {
    value.rsplit('/').next().unwrap_or(value).to_string()
}
