use anyhow::{Context, Result};
use drupkit::Platform;
use std::fs;
use std::path::Path;

use crate::Context as AppContext;
use crate::{progress, ui};

pub fn run(ctx: &AppContext, platform: &Path, output: Option<&Path>) -> Result<()> {
    let mut analyzed = Platform::new(platform)
        .with_context(|| format!("Invalid platform {}", platform.display()))?;

    let pb = progress::spinner("Analyzing platform...", ctx.quiet || output.is_none());
    let result = analyzed.analyze().and_then(|()| analyzed.to_dot());
    pb.finish_and_clear();
    let dot = result.with_context(|| format!("Could not analyze {}", platform.display()))?;

    match output {
        Some(path) => {
            fs::write(path, dot).with_context(|| format!("Could not write {}", path.display()))?;
            if !ctx.quiet {
                ui::success(&format!("Graph written to {}", path.display()));
            }
        }
        None => print!("{dot}"),
    }
    Ok(())
}
