//! Staged output directory.
//!
//! A regeneration never writes into the live output directory. Files go into
//! a staging directory created beside it, and [`StagedOutput::commit`] swaps
//! the staging directory into place with renames. An interrupted run leaves
//! the previous output untouched.

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OutputError {
    #[error("output directory has no parent: {0}")]
    NoParent(PathBuf),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl OutputError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        OutputError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// The underlying I/O error, for reporting against a single file.
    pub fn into_io(self) -> std::io::Error {
        match self {
            OutputError::Io { source, .. } => source,
            other => std::io::Error::new(std::io::ErrorKind::Other, other.to_string()),
        }
    }
}

/// Render output lines: `\n`-separated with a trailing newline.
pub fn render_lines(lines: &[String]) -> String {
    let mut text = String::with_capacity(lines.iter().map(|l| l.len() + 1).sum());
    for line in lines {
        text.push_str(line);
        text.push('\n');
    }
    text
}

#[derive(Debug)]
pub struct StagedOutput {
    staging: TempDir,
    target: PathBuf,
}

impl StagedOutput {
    /// Create an empty staging directory next to `target`.
    pub fn create(target: &Path) -> Result<Self, OutputError> {
        let parent = target
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .ok_or_else(|| OutputError::NoParent(target.to_path_buf()))?;
        fs::create_dir_all(parent).map_err(|e| OutputError::io(parent, e))?;

        let staging = tempfile::Builder::new()
            .prefix(".narrative-patcher-staging-")
            .tempdir_in(parent)
            .map_err(|e| OutputError::io(parent, e))?;

        Ok(Self {
            staging,
            target: target.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        self.staging.path()
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Write one file into the staging directory.
    pub fn write(&self, name: &str, contents: &[u8]) -> Result<PathBuf, OutputError> {
        let path = self.staging.path().join(name);
        fs::write(&path, contents).map_err(|e| OutputError::io(&path, e))?;
        Ok(path)
    }

    /// Replace the target directory with the staged one.
    ///
    /// The previous output is moved aside first and only removed once the
    /// staged directory is in place; if the final rename fails it is moved
    /// back.
    pub fn commit(self) -> Result<PathBuf, OutputError> {
        let parent = self
            .target
            .parent()
            .ok_or_else(|| OutputError::NoParent(self.target.clone()))?;

        if self.target.exists() {
            let trash = tempfile::Builder::new()
                .prefix(".narrative-patcher-previous-")
                .tempdir_in(parent)
                .map_err(|e| OutputError::io(parent, e))?;
            let previous = trash.path().join("output");
            fs::rename(&self.target, &previous).map_err(|e| OutputError::io(&self.target, e))?;

            if let Err(source) = fs::rename(self.staging.path(), &self.target) {
                // Put the old output back; if that fails too there is nothing
                // better to report than the original error.
                let _ = fs::rename(&previous, &self.target);
                return Err(OutputError::io(&self.target, source));
            }
            drop(trash);
        } else {
            fs::rename(self.staging.path(), &self.target)
                .map_err(|e| OutputError::io(&self.target, e))?;
        }

        Ok(self.target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_lines() {
        assert_eq!(render_lines(&[]), "");
        assert_eq!(
            render_lines(&["a".to_string(), String::new(), "b".to_string()]),
            "a\n\nb\n"
        );
    }

    #[test]
    fn test_commit_into_fresh_target() {
        let temp_dir = tempfile::tempdir().unwrap();
        let target = temp_dir.path().join("generated");

        let staged = StagedOutput::create(&target).unwrap();
        staged.write("patched_a.txt", b"hello\n").unwrap();
        assert!(!target.exists());

        staged.commit().unwrap();
        assert_eq!(fs::read_to_string(target.join("patched_a.txt")).unwrap(), "hello\n");
    }

    #[test]
    fn test_commit_replaces_previous_output_entirely() {
        let temp_dir = tempfile::tempdir().unwrap();
        let target = temp_dir.path().join("generated");
        fs::create_dir_all(&target).unwrap();
        fs::write(target.join("stale.txt"), "old").unwrap();

        let staged = StagedOutput::create(&target).unwrap();
        staged.write("fresh.txt", b"new\n").unwrap();
        staged.commit().unwrap();

        assert!(!target.join("stale.txt").exists());
        assert!(target.join("fresh.txt").exists());

        // No staging or backup directories are left behind.
        let leftovers: Vec<_> = fs::read_dir(temp_dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(leftovers, vec![std::ffi::OsString::from("generated")]);
    }

    #[test]
    fn test_dropped_stage_leaves_target_alone() {
        let temp_dir = tempfile::tempdir().unwrap();
        let target = temp_dir.path().join("generated");
        fs::create_dir_all(&target).unwrap();
        fs::write(target.join("kept.txt"), "old").unwrap();

        {
            let staged = StagedOutput::create(&target).unwrap();
            staged.write("partial.txt", b"half").unwrap();
        }

        assert!(target.join("kept.txt").exists());
        assert!(!target.join("partial.txt").exists());
    }
}
