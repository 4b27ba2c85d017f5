use crate::segment::DEFAULT_EVENT_MARKER;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use xxhash_rust::xxh3::xxh3_64;

#[derive(Debug, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct PatcherConfig {
    #[serde(default)]
    pub paths: Paths,
    #[serde(default)]
    pub format: Format,
    #[serde(default)]
    pub packages: PackageSettings,
    #[serde(default)]
    pub credits: Option<Credits>,
}

impl PatcherConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();

        let required = [
            ("format.event_marker", &self.format.event_marker),
            ("format.script_extension", &self.format.script_extension),
            ("format.patch_extension", &self.format.patch_extension),
            ("format.output_extension", &self.format.output_extension),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                issues.push(ValidationIssue::MissingField { field });
            }
        }

        if self.format.event_marker != self.format.event_marker.trim() {
            issues.push(ValidationIssue::InvalidCombo {
                message: "format.event_marker must not start or end with whitespace".to_string(),
            });
        }

        if self.format.script_extension == self.format.patch_extension {
            issues.push(ValidationIssue::InvalidCombo {
                message: "script and patch extensions must differ".to_string(),
            });
        }

        for (field, dir) in [
            ("paths.base_dir", &self.paths.base_dir),
            ("paths.packages_dir", &self.paths.packages_dir),
        ] {
            if dir == &self.paths.output_dir {
                issues.push(ValidationIssue::InvalidCombo {
                    message: format!("paths.output_dir must differ from {field}"),
                });
            }
        }

        if let Some(credits) = &self.credits {
            if credits.event.trim().is_empty() {
                issues.push(ValidationIssue::MissingField {
                    field: "credits.event",
                });
            }
            if credits.key.is_empty() {
                issues.push(ValidationIssue::MissingField {
                    field: "credits.key",
                });
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }

    /// Make every relative path absolute against `root`.
    pub fn resolve_paths(&mut self, root: &Path) {
        for path in [
            &mut self.paths.base_dir,
            &mut self.paths.packages_dir,
            &mut self.paths.output_dir,
        ] {
            if path.is_relative() {
                *path = root.join(&*path);
            }
        }
    }

    /// Fingerprint of every setting that changes generated output, other than
    /// the inputs themselves.
    pub fn fingerprint(&self) -> String {
        let canonical = format!("{:?}|{:?}", self.format, self.credits);
        format!("{:016x}", xxh3_64(canonical.as_bytes()))
    }

    /// Enablement for a package id, falling back to `default_enabled`.
    pub fn is_enabled(&self, package_id: &str) -> bool {
        self.packages
            .enabled
            .get(package_id)
            .copied()
            .unwrap_or(self.packages.default_enabled)
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Paths {
    pub base_dir: PathBuf,
    pub packages_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl Default for Paths {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("scripts"),
            packages_dir: PathBuf::from("packages"),
            output_dir: PathBuf::from("generated"),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Format {
    pub event_marker: String,
    pub script_extension: String,
    pub patch_extension: String,
    pub output_prefix: String,
    pub output_extension: String,
}

impl Default for Format {
    fn default() -> Self {
        Self {
            event_marker: DEFAULT_EVENT_MARKER.to_string(),
            script_extension: "txt".to_string(),
            patch_extension: "patch".to_string(),
            output_prefix: "patched_".to_string(),
            output_extension: "txt".to_string(),
        }
    }
}

impl Format {
    /// Output file name for a source script.
    pub fn output_name(&self, source: &Path) -> String {
        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy())
            .unwrap_or_default();
        format!("{}{}.{}", self.output_prefix, stem, self.output_extension)
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct PackageSettings {
    pub default_enabled: bool,
    pub enabled: BTreeMap<String, bool>,
}

impl Default for PackageSettings {
    fn default() -> Self {
        Self {
            default_enabled: true,
            enabled: BTreeMap::new(),
        }
    }
}

/// Where the synthetic credits insert lands.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct Credits {
    pub event: String,
    pub key: String,
    #[serde(default)]
    pub key_index: usize,
}

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, issue) in self.issues.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone)]
pub enum ValidationIssue {
    MissingField { field: &'static str },
    InvalidCombo { message: String },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::MissingField { field } => {
                write!(f, "missing required field '{field}'")
            }
            ValidationIssue::InvalidCombo { message } => {
                write!(f, "invalid configuration: {message}")
            }
        }
    }
}
