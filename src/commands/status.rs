use anyhow::{Context, Result};
use colored::Colorize;
use drupkit::{Platform, PlatformProject};

use crate::Context as AppContext;
use crate::cli::StatusArgs;
use crate::{progress, ui};

pub fn run(ctx: &AppContext, args: StatusArgs) -> Result<()> {
    let engine = ctx.engine()?;
    let mut platform = Platform::new(&args.platform)
        .with_context(|| format!("Invalid platform {}", args.platform.display()))?;

    let pb = progress::spinner("Analyzing platform...", ctx.quiet);
    let analyzed = platform.analyze();
    pb.finish_and_clear();
    analyzed.with_context(|| format!("Could not analyze {}", args.platform.display()))?;

    ui::header("Platform Status");
    ui::kv("Root", &platform.root().display().to_string());
    let version = platform
        .version()
        .map_or_else(|| "not detected".yellow().to_string(), |v| v.short());
    ui::kv("Drupal", &version);
    ui::kv("Contrib path", &platform.contrib_path().display().to_string());
    ui::kv("Profiles", &ui::list(&platform.profiles()));

    ui::section("Sites");
    let sites = match &args.site {
        Some(site) => vec![site.clone()],
        None => platform.site_names(),
    };
    if sites.is_empty() {
        ui::dim("No sites");
    }
    for site in &sites {
        let state = if platform.is_bootstrapped(&engine, Some(site)) {
            format!("{} bootstrapped", "✓".green())
        } else {
            format!("{} not bootstrapped", "✗".yellow())
        };
        println!("    {site}: {state}");
    }

    let contrib: Vec<&PlatformProject> = platform.projects().collect();
    ui::section(&format!("Contrib projects ({})", contrib.len()));
    if contrib.is_empty() {
        ui::dim("None");
    }
    for project in contrib {
        let installed = project.is_installed(&engine, args.site.as_deref());
        print_project(project, installed);
    }

    let core = platform.core_project_names();
    ui::section(&format!("Core projects ({})", core.len()));
    if ctx.verbose > 0 {
        ui::dim(&core.join(", "));
    } else {
        ui::dim("Use -v to list them");
    }

    println!();
    Ok(())
}

fn print_project(project: &PlatformProject, installed: bool) {
    let version = project
        .version()
        .map_or_else(|| "unknown".dimmed().to_string(), |v| v.long());
    let marker = if installed {
        "●".green().to_string()
    } else {
        "○".dimmed().to_string()
    };
    let kind = project
        .project_type()
        .map_or("?", |t| t.as_str());
    println!(
        "    {marker} {} {} {} {}",
        project.name().bold(),
        version,
        format!("[{kind}]").dimmed(),
        project.relative_path().display().to_string().dimmed()
    );
}
