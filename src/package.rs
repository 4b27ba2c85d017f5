//! Content packages: who contributes override scripts and patch sources, and
//! whether each contribution is currently enabled.
//!
//! The engine only reads packages through [`PackageRegistry`]. Two
//! implementations ship with the crate: [`DirectoryRegistry`] scans a
//! packages directory on disk, [`StaticRegistry`] is built in memory by an
//! embedding application (or a test).

use crate::config::PackageSettings;
use semver::Version;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File inside a package directory describing the package.
pub const PACKAGE_MANIFEST: &str = "package.toml";
/// Sub-directory holding a package's override scripts.
pub const SCRIPTS_DIR: &str = "scripts";
/// Sub-directory holding a package's patch sources.
pub const PATCHES_DIR: &str = "patches";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageInfo {
    pub id: String,
    pub name: String,
    pub version: Version,
    pub intro_credits: Vec<String>,
    /// Directory the package's content lives in.
    pub root: PathBuf,
}

impl PackageInfo {
    /// A package with no manifest: named after its id, version 0.0.0.
    pub fn new(id: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            version: Version::new(0, 0, 0),
            intro_credits: Vec::new(),
            root: root.into(),
        }
    }

    pub fn scripts_dir(&self) -> PathBuf {
        self.root.join(SCRIPTS_DIR)
    }

    pub fn patches_dir(&self) -> PathBuf {
        self.root.join(PATCHES_DIR)
    }
}

/// `{ id, enabled }` as seen by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentPackageRef {
    pub id: String,
    pub enabled: bool,
}

pub trait PackageRegistry {
    /// Packages in priority order. Later packages win override-script clashes.
    fn list_packages(&self) -> &[PackageInfo];

    fn is_enabled(&self, package_id: &str) -> bool;

    fn package_refs(&self) -> Vec<ContentPackageRef> {
        self.list_packages()
            .iter()
            .map(|p| ContentPackageRef {
                id: p.id.clone(),
                enabled: self.is_enabled(&p.id),
            })
            .collect()
    }

    fn enablement_snapshot(&self) -> BTreeMap<String, bool> {
        self.package_refs()
            .into_iter()
            .map(|r| (r.id, r.enabled))
            .collect()
    }

    fn enabled_packages(&self) -> Vec<&PackageInfo> {
        self.list_packages()
            .iter()
            .filter(|p| self.is_enabled(&p.id))
            .collect()
    }
}

#[derive(Error, Debug)]
pub enum PackageError {
    #[error("failed to read packages from {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid package manifest {}: {source}", path.display())]
    Manifest {
        path: PathBuf,
        #[source]
        source: toml_edit::de::Error,
    },
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct PackageManifest {
    name: Option<String>,
    version: Option<Version>,
    intro_credits: Vec<String>,
}

/// Packages discovered as sub-directories of a packages directory, ordered
/// by id.
#[derive(Debug, Clone)]
pub struct DirectoryRegistry {
    packages: Vec<PackageInfo>,
    settings: PackageSettings,
    problems: Vec<String>,
}

impl DirectoryRegistry {
    /// Scan `packages_dir`. A missing directory simply means no packages.
    /// Packages with an unreadable manifest are left out and recorded in
    /// [`DirectoryRegistry::problems`].
    pub fn scan(packages_dir: &Path, settings: &PackageSettings) -> Result<Self, PackageError> {
        let mut registry = Self {
            packages: Vec::new(),
            settings: settings.clone(),
            problems: Vec::new(),
        };
        if !packages_dir.is_dir() {
            return Ok(registry);
        }

        let io_err = |source| PackageError::Io {
            path: packages_dir.to_path_buf(),
            source,
        };
        let mut dirs = Vec::new();
        for entry in fs::read_dir(packages_dir).map_err(io_err)? {
            let entry = entry.map_err(io_err)?;
            if entry.file_type().map_err(io_err)?.is_dir() {
                dirs.push(entry.path());
            }
        }
        dirs.sort();

        for root in dirs {
            let Some(id) = root.file_name().map(|n| n.to_string_lossy().into_owned()) else {
                continue;
            };
            match read_package(&id, &root) {
                Ok(package) => registry.packages.push(package),
                Err(error) => {
                    tracing::warn!(package = %id, "skipping package: {error}");
                    registry.problems.push(error.to_string());
                }
            }
        }

        Ok(registry)
    }

    pub fn problems(&self) -> &[String] {
        &self.problems
    }
}

fn read_package(id: &str, root: &Path) -> Result<PackageInfo, PackageError> {
    let mut package = PackageInfo::new(id, root);
    let manifest_path = root.join(PACKAGE_MANIFEST);
    if !manifest_path.is_file() {
        return Ok(package);
    }

    let text = fs::read_to_string(&manifest_path).map_err(|source| PackageError::Io {
        path: manifest_path.clone(),
        source,
    })?;
    let manifest: PackageManifest =
        toml_edit::de::from_str(&text).map_err(|source| PackageError::Manifest {
            path: manifest_path.clone(),
            source,
        })?;

    if let Some(name) = manifest.name {
        package.name = name;
    }
    if let Some(version) = manifest.version {
        package.version = version;
    }
    package.intro_credits = manifest.intro_credits;
    Ok(package)
}

impl PackageRegistry for DirectoryRegistry {
    fn list_packages(&self) -> &[PackageInfo] {
        &self.packages
    }

    fn is_enabled(&self, package_id: &str) -> bool {
        self.packages.iter().any(|p| p.id == package_id)
            && self
                .settings
                .enabled
                .get(package_id)
                .copied()
                .unwrap_or(self.settings.default_enabled)
    }
}

/// In-memory registry with explicit enablement.
#[derive(Debug, Clone, Default)]
pub struct StaticRegistry {
    packages: Vec<PackageInfo>,
    enabled: BTreeMap<String, bool>,
}

impl StaticRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_package(mut self, package: PackageInfo, enabled: bool) -> Self {
        self.set_enabled(&package.id, enabled);
        self.packages.push(package);
        self
    }

    pub fn set_enabled(&mut self, package_id: &str, enabled: bool) {
        self.enabled.insert(package_id.to_string(), enabled);
    }
}

impl PackageRegistry for StaticRegistry {
    fn list_packages(&self) -> &[PackageInfo] {
        &self.packages
    }

    fn is_enabled(&self, package_id: &str) -> bool {
        self.enabled.get(package_id).copied().unwrap_or(false)
    }
}
