use anyhow::{Context, Result};
use colored::Colorize;
use drupkit::Makefile;
use std::path::Path;

use crate::Context as AppContext;
use crate::ui;

/// Parse a makefile and list its projects and libraries
pub fn check(ctx: &AppContext, file: &Path) -> Result<()> {
    let makefile =
        Makefile::load(file).with_context(|| format!("Could not load {}", file.display()))?;

    ui::header("Makefile");
    ui::kv("Path", &makefile.path().display().to_string());
    ui::kv(
        "Core",
        &makefile.core().map_or_else(|| "?".to_string(), |c| c.to_string()),
    );
    ui::kv("API", makefile.api().unwrap_or("-"));
    if let Some(drupal) = makefile.drupal_project() {
        let version = drupal
            .version()
            .map_or_else(|| "latest".to_string(), |v| v.short());
        ui::kv("Drupal", &version);
    }

    ui::section(&format!("Projects ({})", makefile.project_names().len()));
    for project in makefile.projects().filter(|p| !p.is_drupal()) {
        let version = project
            .version()
            .map_or_else(|| "latest".dimmed().to_string(), |v| v.long());
        let patches = project.component().patches().len();
        let suffix = if patches > 0 {
            format!(" ({patches} patch(es))").dimmed().to_string()
        } else {
            String::new()
        };
        println!("    {} {version}{suffix}", project.name().bold());
    }

    ui::section(&format!("Libraries ({})", makefile.library_names().len()));
    for library in makefile.libraries() {
        println!(
            "    {} {}",
            library.name().bold(),
            library.target_path().display().to_string().dimmed()
        );
    }

    if makefile.warnings().is_empty() {
        println!();
        ui::success("Makefile is valid");
    } else {
        ui::section("Warnings");
        for warning in makefile.warnings() {
            ui::warn(warning);
        }
    }
    if ctx.verbose > 0 {
        ui::dim(&format!("Parsed {}", file.display()));
    }
    Ok(())
}

/// Print a makefile in canonical form, or rewrite it in place
pub fn fmt(ctx: &AppContext, file: &Path, write: bool) -> Result<()> {
    let makefile =
        Makefile::load(file).with_context(|| format!("Could not load {}", file.display()))?;

    if write {
        makefile
            .save(None)
            .with_context(|| format!("Could not write {}", file.display()))?;
        if !ctx.quiet {
            ui::success(&format!("Rewrote {}", file.display()));
        }
    } else {
        print!("{makefile}");
    }
    Ok(())
}
