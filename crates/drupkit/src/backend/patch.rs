//! Patch application with `git apply`, falling back to `patch`.

use super::{Patcher, find_tool, run_command};
use crate::error::{Error, Result};
use std::path::Path;

const PATCH_LEVELS: [&str; 2] = ["-p1", "-p0"];

/// Applies patches with the tools found in PATH.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemPatcher;

impl SystemPatcher {
    /// Create a patcher.
    pub const fn new() -> Self {
        Self
    }
}

impl Patcher for SystemPatcher {
    fn apply(&self, patch_file: &Path, working_dir: &Path) -> Result<()> {
        let label = patch_file
            .file_name()
            .map_or_else(|| patch_file.display().to_string(), |n| n.to_string_lossy().into_owned());
        let file = patch_file.to_string_lossy();
        let mut output = String::new();

        if let Ok(git) = find_tool("git") {
            for level in PATCH_LEVELS {
                let attempt = run_command(&git, &["apply", "--check", level, &file], Some(working_dir))
                    .and_then(|_| run_command(&git, &["apply", level, &file], Some(working_dir)));
                match attempt {
                    Ok(_) => {
                        log::debug!("Applied {label} with git apply {level}");
                        return Ok(());
                    }
                    Err(e) => output.push_str(&failure_text(&e)),
                }
            }
        }

        let patch = find_tool("patch")?;
        let dir = working_dir.to_string_lossy();
        for level in PATCH_LEVELS {
            match run_command(
                &patch,
                &["--no-backup-if-mismatch", "-f", level, "-d", &dir, "-i", &file],
                None,
            ) {
                Ok(_) => {
                    log::debug!("Applied {label} with patch {level}");
                    return Ok(());
                }
                Err(e) => output.push_str(&failure_text(&e)),
            }
        }

        Err(Error::PatchFailed {
            patch: label,
            message: output,
        })
    }
}

fn failure_text(error: &Error) -> String {
    match error {
        Error::CommandFailed { message, stderr } => format!("{message}\n{stderr}"),
        other => format!("{other}\n"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const PATCH: &str = "--- a/hello.txt\n+++ b/hello.txt\n@@ -1 +1 @@\n-hello\n+hello, world\n";

    #[test]
    fn test_apply_with_strip_level_one() {
        if find_tool("git").is_err() && find_tool("patch").is_err() {
            return;
        }
        let tmp = TempDir::new().unwrap();
        let tree = tmp.path().join("tree");
        fs::create_dir_all(&tree).unwrap();
        fs::write(tree.join("hello.txt"), "hello\n").unwrap();
        let patch = tmp.path().join("greeting.patch");
        fs::write(&patch, PATCH).unwrap();

        SystemPatcher::new().apply(&patch, &tree).unwrap();
        assert_eq!(fs::read_to_string(tree.join("hello.txt")).unwrap(), "hello, world\n");
    }

    #[test]
    fn test_failure_names_the_patch() {
        if find_tool("git").is_err() || find_tool("patch").is_err() {
            return;
        }
        let tmp = TempDir::new().unwrap();
        let tree = tmp.path().join("tree");
        fs::create_dir_all(&tree).unwrap();
        fs::write(tree.join("hello.txt"), "something else\n").unwrap();
        let patch = tmp.path().join("greeting.patch");
        fs::write(&patch, PATCH).unwrap();

        let err = SystemPatcher::new().apply(&patch, &tree).unwrap_err();
        match err {
            Error::PatchFailed { patch, .. } => assert_eq!(patch, "greeting.patch"),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(fs::read_to_string(tree.join("hello.txt")).unwrap(), "something else\n");
    }
}
