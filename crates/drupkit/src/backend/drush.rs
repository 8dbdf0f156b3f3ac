//! Thin wrapper around the `drush` command line tool.

use super::{ReleaseHistory, SiteOracle, run_command};
use crate::error::{Error, Result};
use crate::version::VersionCore;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

static DOWNLOAD_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*Project.+downloaded to *(.\[.+[\n\r])?\s*(.+)\.")
        .expect("valid download path regex")
});

/// Output of `drush core-status --format=json`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SiteStatus {
    /// Drupal version of the site, if any
    #[serde(rename = "drupal-version")]
    pub drupal_version: Option<String>,
    /// Bootstrap status message
    pub bootstrap: Option<String>,
}

impl SiteStatus {
    /// Whether drush managed a full bootstrap.
    pub fn is_bootstrapped(&self) -> bool {
        self.bootstrap
            .as_deref()
            .is_some_and(|s| s.contains("Successful"))
    }
}

#[derive(Debug, Deserialize)]
struct ExtensionInfo {
    #[serde(rename = "type")]
    kind: Option<String>,
    status: Option<String>,
}

/// A `drush` executable.
#[derive(Debug, Clone)]
pub struct Drush {
    program: PathBuf,
}

impl Drush {
    /// Find drush in PATH, falling back to the bare command name.
    pub fn detect() -> Self {
        let program = which::which("drush").unwrap_or_else(|_| PathBuf::from("drush"));
        Self { program }
    }

    /// Use a specific executable.
    pub fn at(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Path of the executable.
    pub fn program(&self) -> &Path {
        &self.program
    }

    fn run(&self, args: &[&str], cwd: Option<&Path>) -> Result<String> {
        run_command(&self.program, args, cwd)
    }

    /// Download `project` into `dest` with `pm-download`.
    ///
    /// Returns the path drush reports the project was downloaded to.
    pub fn pm_download(&self, project: &str, dest: &Path) -> Result<PathBuf> {
        let destination = format!("--destination={}", dest.display());
        log::info!("Downloading {project} with drush");
        let output = self.run(
            &["pm-download", "-y", &destination, "--variant=profile-only", project],
            Some(dest),
        )?;
        let path = download_path(&output).ok_or_else(|| Error::FetchFailed {
            name: project.to_string(),
            message: format!("could not determine the download location:\n{output}"),
        })?;
        Ok(if path.is_absolute() { path } else { dest.join(path) })
    }

    /// Run `core-status` inside a site directory.
    pub fn status(&self, site_path: &Path) -> Result<SiteStatus> {
        let output = self.run(&["core-status", "--format=json"], Some(site_path))?;
        parse_status(&output)
    }
}

/// Location reported by `drush pm-download`.
fn download_path(output: &str) -> Option<PathBuf> {
    DOWNLOAD_PATH
        .captures(output)
        .and_then(|caps| caps.get(2))
        .map(|m| PathBuf::from(m.as_str().trim()))
}

fn parse_status(output: &str) -> Result<SiteStatus> {
    // drush may print warnings before the JSON document.
    let json = output.find('{').map_or(output, |start| &output[start..]);
    Ok(serde_json::from_str(json)?)
}

/// Whether `pm-info` output says `name` is an installed module or an
/// enabled theme.
fn parse_installed(output: &str, name: &str) -> bool {
    let json = output.find('{').map_or(output, |start| &output[start..]);
    let Ok(info) = serde_json::from_str::<HashMap<String, ExtensionInfo>>(json) else {
        return false;
    };
    let Some(extension) = info.get(name) else {
        return false;
    };
    let status = extension.status.as_deref().unwrap_or_default().to_lowercase();
    match extension.kind.as_deref() {
        Some("module") => !status.contains("not installed"),
        Some("theme") => status.starts_with("enabled"),
        _ => false,
    }
}

impl SiteOracle for Drush {
    fn is_bootstrapped(&self, site_path: &Path) -> bool {
        match self.status(site_path) {
            Ok(status) => status.is_bootstrapped(),
            Err(e) => {
                log::debug!("drush core-status failed in {}: {e}", site_path.display());
                false
            }
        }
    }

    fn is_installed(&self, site_path: &Path, name: &str) -> bool {
        match self.run(&["pm-info", "--format=json", name], Some(site_path)) {
            Ok(output) => parse_installed(&output, name),
            Err(e) => {
                log::debug!("drush pm-info {name} failed: {e}");
                false
            }
        }
    }
}

impl ReleaseHistory for Drush {
    fn releases(&self, name: &str, core: VersionCore) -> Result<Vec<String>> {
        let project = format!("{name}-{core}");
        let output = self.run(&["pm-releases", "--all", "--format=list", &project], None)?;
        Ok(output
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(String::from)
            .collect())
    }
}
