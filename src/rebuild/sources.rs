//! Enumeration of everything a regeneration reads.

use crate::config::PatcherConfig;
use crate::diagnostics::PatchError;
use crate::package::{PackageRegistry, PACKAGE_MANIFEST};
use crate::rebuild::manifest::Timestamp;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// A script to regenerate: a base script, or an override from a package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptSource {
    pub path: PathBuf,
    /// Package that supplied the script; `None` for base scripts.
    pub origin: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchSource {
    pub path: PathBuf,
    pub origin: String,
}

#[derive(Debug, Default)]
pub struct SourceSet {
    /// Merge inputs, base scripts first, in output order.
    pub scripts: Vec<ScriptSource>,
    /// Patch sources from enabled packages, in registry then path order.
    pub patches: Vec<PatchSource>,
    /// Every file whose modification invalidates the output, sorted.
    pub tracked: Vec<PathBuf>,
    /// Directory entries that could not be read.
    pub problems: Vec<PatchError>,
}

impl SourceSet {
    /// Collect inputs for `config`. Disabled packages contribute nothing.
    pub fn collect(config: &PatcherConfig, registry: &dyn PackageRegistry) -> Self {
        let mut set = SourceSet::default();
        let script_ext = config.format.script_extension.as_str();
        let patch_ext = config.format.patch_extension.as_str();

        for path in list_files(&config.paths.base_dir, script_ext, Some(1), &mut set.problems) {
            set.tracked.push(path.clone());
            set.scripts.push(ScriptSource { path, origin: None });
        }

        for package in registry.enabled_packages() {
            let manifest = package.root.join(PACKAGE_MANIFEST);
            if manifest.is_file() {
                set.tracked.push(manifest);
            }

            for path in list_files(&package.scripts_dir(), script_ext, Some(1), &mut set.problems) {
                set.tracked.push(path.clone());
                let source = ScriptSource {
                    path,
                    origin: Some(package.id.clone()),
                };
                let existing = set
                    .scripts
                    .iter_mut()
                    .find(|s| s.path.file_name() == source.path.file_name());
                match existing {
                    Some(slot) => {
                        tracing::debug!(
                            package = %package.id,
                            script = %source.path.display(),
                            "override replaces {}",
                            slot.path.display()
                        );
                        *slot = source;
                    }
                    None => set.scripts.push(source),
                }
            }

            for path in list_files(&package.patches_dir(), patch_ext, None, &mut set.problems) {
                set.tracked.push(path.clone());
                set.patches.push(PatchSource {
                    path,
                    origin: package.id.clone(),
                });
            }
        }

        set.tracked.sort();
        set
    }

    /// Newest modification time over every tracked file.
    pub fn newest_modification(&self) -> Result<Option<(Timestamp, &Path)>, PatchError> {
        let mut newest: Option<(Timestamp, &Path)> = None;
        for path in &self.tracked {
            let modified = Timestamp::modified(path).map_err(|source| PatchError::FileIo {
                path: path.clone(),
                source,
            })?;
            if newest.map_or(true, |(time, _)| modified > time) {
                newest = Some((modified, path.as_path()));
            }
        }
        Ok(newest)
    }

    /// Tracked paths as recorded in the manifest.
    pub fn tracked_names(&self) -> Vec<String> {
        self.tracked
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect()
    }
}

/// Files under `dir` with extension `ext`, sorted. A missing `dir` is empty.
fn list_files(
    dir: &Path,
    ext: &str,
    max_depth: Option<usize>,
    problems: &mut Vec<PatchError>,
) -> Vec<PathBuf> {
    if !dir.is_dir() {
        return Vec::new();
    }

    let mut walker = WalkDir::new(dir).min_depth(1);
    if let Some(depth) = max_depth {
        walker = walker.max_depth(depth);
    }

    let mut files = Vec::new();
    for entry in walker {
        match entry {
            Ok(entry) => {
                if entry.file_type().is_file()
                    && entry.path().extension().and_then(|s| s.to_str()) == Some(ext)
                {
                    files.push(entry.into_path());
                }
            }
            Err(error) => {
                let path = error.path().unwrap_or(dir).to_path_buf();
                problems.push(PatchError::FileIo {
                    path,
                    source: io::Error::from(error),
                });
            }
        }
    }

    files.sort();
    files
}
