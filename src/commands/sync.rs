use anyhow::{Context, Result, bail};
use colored::Colorize;
use dialoguer::Confirm;
use drupkit::updater::{ApplyOptions, SyncOptions};
use drupkit::{Log, Makefile, Platform, Updater};

use crate::Context as AppContext;
use crate::cli::SyncArgs;
use crate::{progress, ui};

pub fn run(ctx: &AppContext, args: SyncArgs) -> Result<()> {
    let engine = ctx.engine()?;
    let settings = &ctx.settings;

    ui::header("Drupid Sync");
    ui::kv("Makefile", &args.makefile.display().to_string());
    ui::kv("Platform", &args.platform.display().to_string());
    ui::kv("Cache", &engine.cache_dir().display().to_string());

    ui::step(1, 3, "Loading makefile");
    let makefile = Makefile::load(&args.makefile)
        .with_context(|| format!("Could not load {}", args.makefile.display()))?;
    for warning in makefile.warnings() {
        ui::warn(warning);
    }
    let platform = Platform::new(&args.platform)
        .with_context(|| format!("Invalid platform {}", args.platform.display()))?;

    let site = args.site.clone().or_else(|| settings.default_site.clone());
    if let Some(site) = &site {
        ui::kv("Site", site);
    }
    let options = SyncOptions {
        no_follow: args.no_follow || !settings.follow_dependencies,
        no_core: args.no_core || !settings.sync_core,
        no_libs: args.no_libs || !settings.sync_libraries,
    };

    ui::step(2, 3, "Comparing platform with makefile");
    let mut updater = Updater::new(makefile, platform, site, engine);
    let pb = progress::spinner("Fetching and analyzing projects...", ctx.quiet);
    if let Err(e) = updater.sync(options) {
        progress::finish_error(&pb, "Sync failed");
        return Err(e).context("Sync aborted");
    }
    pb.finish_and_clear();

    report(updater.log(), ctx.verbose > 0);

    if !updater.pending_actions() {
        if updater.log().has_errors() {
            bail!("Sync reported errors");
        }
        ui::success("Platform is in sync");
        return Ok(());
    }

    if !args.apply {
        println!();
        ui::dim("Nothing changed. Run again with --apply to make these changes.");
        return Ok(());
    }

    if updater.log().has_errors() && !args.force {
        bail!("Sync reported errors; fix them or use --force to apply anyway");
    }

    if !args.yes {
        let confirmed = Confirm::new()
            .with_prompt("Apply these changes?")
            .default(false)
            .interact()
            .context("Failed to read confirmation")?;
        if !confirmed {
            ui::info("Aborted");
            return Ok(());
        }
    }

    ui::step(3, 3, "Applying changes");
    let pb = progress::spinner("Updating platform...", ctx.quiet);
    match updater.apply_changes(ApplyOptions { force: args.force }) {
        Ok(fired) => {
            progress::finish_success(&pb, &format!("{fired} change(s) applied"));
            Ok(())
        }
        Err(e) => {
            progress::finish_error(&pb, "Apply failed");
            Err(e).context("Platform may be partially updated")
        }
    }
}

fn report(log: &Log, show_notices: bool) {
    let pending: Vec<_> = log.actions().iter().filter(|a| a.is_pending()).collect();
    if !pending.is_empty() {
        ui::section("Planned changes");
        for action in pending {
            println!("  {action}");
        }
    }

    if show_notices && log.has_notices() {
        ui::section("Notices");
        for notice in log.notices() {
            ui::dim(notice);
        }
    }

    if log.has_warnings() {
        ui::section("Warnings");
        for warning in log.warnings() {
            ui::warn(warning);
        }
    }

    if log.has_errors() {
        ui::section("Errors");
        for error in log.errors() {
            ui::error(error);
        }
        println!();
        println!(
            "  {}",
            format!("{} error(s) reported", log.errors().len()).red().bold()
        );
    }
}
