use std::ffi::OsString;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Guards the output directory, which regeneration deletes wholesale, from
/// overlapping anything that must survive a rebuild.
#[derive(Debug, Clone)]
pub struct OutputGuard {
    /// Canonical paths of directories the output must stay clear of
    protected_paths: Vec<PathBuf>,
    /// Canonical home directory, if known
    home: Option<PathBuf>,
}

#[derive(Error, Debug)]
pub enum SafetyError {
    #[error("output directory {output} overlaps source directory {protected}")]
    OverlapsSource { output: PathBuf, protected: PathBuf },

    #[error("refusing to regenerate into {0}: it is or contains the home directory")]
    HomeDirectory(PathBuf),

    #[error("failed to resolve path: {0}")]
    Canonicalize(#[from] std::io::Error),
}

impl OutputGuard {
    /// Create a guard protecting the given source directories.
    pub fn new<I, P>(protected: I) -> Result<Self, SafetyError>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let protected_paths = protected
            .into_iter()
            .map(|p| normalize(p.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;

        let home = home::home_dir().and_then(|h| h.canonicalize().ok());

        Ok(Self {
            protected_paths,
            home,
        })
    }

    /// Check that `output` may be deleted and recreated.
    ///
    /// Returns the normalized absolute output path if safe. The directory
    /// does not need to exist yet.
    pub fn validate_output(&self, output: impl AsRef<Path>) -> Result<PathBuf, SafetyError> {
        let output = normalize(output.as_ref())?;

        for protected in &self.protected_paths {
            if output.starts_with(protected) || protected.starts_with(&output) {
                return Err(SafetyError::OverlapsSource {
                    output,
                    protected: protected.clone(),
                });
            }
        }

        if let Some(home) = &self.home {
            if home.starts_with(&output) {
                return Err(SafetyError::HomeDirectory(output));
            }
        }

        Ok(output)
    }

    /// Create a guard with an explicit home directory (for testing).
    #[cfg(test)]
    pub fn with_home(protected: Vec<PathBuf>, home: PathBuf) -> Result<Self, SafetyError> {
        let protected_paths = protected
            .iter()
            .map(|p| normalize(p))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            protected_paths,
            home: Some(normalize(&home)?),
        })
    }
}

/// Absolute path with symlinks resolved for the longest existing prefix.
fn normalize(path: &Path) -> Result<PathBuf, SafetyError> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };

    let mut existing = absolute.as_path();
    let mut missing: Vec<OsString> = Vec::new();
    loop {
        if let Ok(canonical) = existing.canonicalize() {
            let mut resolved = canonical;
            for component in missing.iter().rev() {
                resolved.push(component);
            }
            return Ok(resolved);
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name.to_os_string());
                existing = parent;
            }
            _ => return Ok(absolute),
        }
    }
}
