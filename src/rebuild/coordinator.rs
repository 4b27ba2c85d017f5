//! Staleness check and full regeneration.
//!
//! A rebuild is all or nothing at the directory level: every output file is
//! regenerated into a staging directory and swapped into place together with
//! a new manifest. Problems with individual files or directives are reported
//! to the caller's [`ErrorSink`] and never stop the run.

use crate::catalog::{PatchCatalog, Registration};
use crate::config::{Credits, PatcherConfig};
use crate::diagnostics::{ErrorSink, PatchError};
use crate::directive::{parse_patch_source, InsertDirective, PatchDirective, SYNTHETIC_ORIGIN};
use crate::merge::{merge_document, MergeStats};
use crate::output::{render_lines, OutputError, StagedOutput};
use crate::package::PackageRegistry;
use crate::rebuild::manifest::{RebuildManifest, Timestamp, MANIFEST_FILE};
use crate::rebuild::sources::{ScriptSource, SourceSet};
use crate::safety::{OutputGuard, SafetyError};
use crate::segment::EventSegmenter;
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use xxhash_rust::xxh3::xxh3_64;

/// Why the output can no longer be served as is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StaleReason {
    NoOutput,
    NoManifest,
    ManifestUnreadable(String),
    EnablementChanged,
    ConfigChanged,
    /// A tracked input was added or removed.
    InputsChanged,
    OutputMissing(String),
    SourcesModified(PathBuf),
    SourceUnreadable(String),
    Forced,
}

impl fmt::Display for StaleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StaleReason::NoOutput => write!(f, "no previous output"),
            StaleReason::NoManifest => write!(f, "no rebuild manifest"),
            StaleReason::ManifestUnreadable(reason) => write!(f, "{reason}"),
            StaleReason::EnablementChanged => write!(f, "package enablement changed"),
            StaleReason::ConfigChanged => write!(f, "configuration changed"),
            StaleReason::InputsChanged => write!(f, "source files were added or removed"),
            StaleReason::OutputMissing(name) => write!(f, "output file {name} is missing"),
            StaleReason::SourcesModified(path) => {
                write!(f, "{} was modified", path.display())
            }
            StaleReason::SourceUnreadable(reason) => {
                write!(f, "cannot read modification time: {reason}")
            }
            StaleReason::Forced => write!(f, "regeneration forced"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    Stale(StaleReason),
}

#[derive(Error, Debug)]
pub enum RebuildError {
    #[error(transparent)]
    Safety(#[from] SafetyError),

    #[error(transparent)]
    Output(#[from] OutputError),

    #[error("failed to serialize rebuild manifest: {0}")]
    Manifest(#[from] serde_json::Error),
}

/// One regenerated script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedFile {
    pub source: PathBuf,
    /// Package that supplied the script; `None` for base scripts.
    pub origin: Option<String>,
    /// File name inside the output directory.
    pub name: String,
    pub lines: Vec<String>,
    pub stats: MergeStats,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RebuildReport {
    pub files: Vec<GeneratedFile>,
    pub stats: MergeStats,
    /// Directives registered, synthetic ones included.
    pub registered: usize,
    pub cancelled: usize,
    pub orphaned: usize,
}

#[derive(Debug)]
pub enum RebuildOutcome {
    Fresh,
    Rebuilt {
        reason: StaleReason,
        report: RebuildReport,
    },
}

pub struct RebuildCoordinator<'a> {
    config: &'a PatcherConfig,
    registry: &'a dyn PackageRegistry,
    synthetic: Vec<PatchDirective>,
    catalog: PatchCatalog,
}

impl<'a> RebuildCoordinator<'a> {
    /// A coordinator for `config`. A credits directive is injected when the
    /// config asks for one and some enabled package has something to credit.
    pub fn new(config: &'a PatcherConfig, registry: &'a dyn PackageRegistry) -> Self {
        let synthetic = config
            .credits
            .as_ref()
            .and_then(|credits| credits_directive(credits, registry))
            .into_iter()
            .collect();
        Self {
            config,
            registry,
            synthetic,
            catalog: PatchCatalog::new(),
        }
    }

    /// Add a directive that is not read from any patch source. Synthetic
    /// directives are registered after every parsed one.
    pub fn inject(&mut self, directive: PatchDirective) {
        self.synthetic.push(directive);
    }

    pub fn output_dir(&self) -> &Path {
        &self.config.paths.output_dir
    }

    /// Fingerprint of everything besides the inputs that shapes the output.
    pub fn fingerprint(&self) -> String {
        let canonical = format!("{}|{:?}", self.config.fingerprint(), self.synthetic);
        format!("{:016x}", xxh3_64(canonical.as_bytes()))
    }

    /// Decide whether the current output can be served. Reads metadata only.
    pub fn check(&self) -> Freshness {
        let output_dir = self.output_dir();
        if !output_dir.is_dir() {
            return Freshness::Stale(StaleReason::NoOutput);
        }

        let manifest = match RebuildManifest::read(output_dir) {
            Ok(Some(manifest)) => manifest,
            Ok(None) => return Freshness::Stale(StaleReason::NoManifest),
            Err(error) => {
                return Freshness::Stale(StaleReason::ManifestUnreadable(error.to_string()))
            }
        };

        if manifest.package_enablement_snapshot != self.registry.enablement_snapshot() {
            return Freshness::Stale(StaleReason::EnablementChanged);
        }
        if manifest.config_fingerprint != self.fingerprint() {
            return Freshness::Stale(StaleReason::ConfigChanged);
        }

        let sources = SourceSet::collect(self.config, self.registry);
        if sources.tracked_names() != manifest.inputs {
            return Freshness::Stale(StaleReason::InputsChanged);
        }
        if let Some(name) = manifest
            .outputs
            .iter()
            .find(|name| !output_dir.join(name).is_file())
        {
            return Freshness::Stale(StaleReason::OutputMissing(name.clone()));
        }

        match sources.newest_modification() {
            Ok(Some((modified, path))) if modified > manifest.last_regeneration_time => {
                Freshness::Stale(StaleReason::SourcesModified(path.to_path_buf()))
            }
            Ok(_) => Freshness::Fresh,
            Err(error) => Freshness::Stale(StaleReason::SourceUnreadable(error.to_string())),
        }
    }

    /// Regenerate if the output is stale; a fresh output is left untouched.
    pub fn rebuild(&mut self, sink: &mut dyn ErrorSink) -> Result<RebuildOutcome, RebuildError> {
        match self.check() {
            Freshness::Fresh => {
                tracing::info!(output = %self.output_dir().display(), "output is fresh");
                Ok(RebuildOutcome::Fresh)
            }
            Freshness::Stale(reason) => {
                tracing::info!(%reason, "output is stale");
                let report = self.regenerate(sink)?;
                Ok(RebuildOutcome::Rebuilt { reason, report })
            }
        }
    }

    /// Regenerate the whole output directory unconditionally.
    pub fn regenerate(&mut self, sink: &mut dyn ErrorSink) -> Result<RebuildReport, RebuildError> {
        // Taken before any source is read, so an edit made while the run is
        // in flight still marks the result stale.
        let started = Timestamp::now();
        let output_dir = self.guard()?.validate_output(self.output_dir())?;

        let mut sources = SourceSet::collect(self.config, self.registry);
        let report = self.run(&mut sources, sink);

        let staged = StagedOutput::create(&output_dir)?;
        let mut outputs = Vec::with_capacity(report.files.len());
        for file in &report.files {
            match staged.write(&file.name, render_lines(&file.lines).as_bytes()) {
                Ok(_) => outputs.push(file.name.clone()),
                Err(error) => sink.report_error(PatchError::FileIo {
                    path: output_dir.join(&file.name),
                    source: error.into_io(),
                }),
            }
        }

        let manifest = RebuildManifest {
            package_enablement_snapshot: self.registry.enablement_snapshot(),
            last_regeneration_time: started,
            config_fingerprint: self.fingerprint(),
            inputs: sources.tracked_names(),
            outputs,
        };
        staged.write(MANIFEST_FILE, manifest.to_json()?.as_bytes())?;
        staged.commit()?;

        tracing::info!(
            output = %output_dir.display(),
            files = report.files.len(),
            applied = report.stats.applied,
            failed = report.stats.failed,
            unapplied = report.stats.unapplied,
            orphaned = report.orphaned,
            "regenerated output"
        );
        Ok(report)
    }

    /// Run the whole pipeline in memory without writing anything.
    pub fn dry_run(&mut self, sink: &mut dyn ErrorSink) -> Result<RebuildReport, RebuildError> {
        self.guard()?.validate_output(self.output_dir())?;
        let mut sources = SourceSet::collect(self.config, self.registry);
        Ok(self.run(&mut sources, sink))
    }

    fn guard(&self) -> Result<OutputGuard, SafetyError> {
        OutputGuard::new([&self.config.paths.base_dir, &self.config.paths.packages_dir])
    }

    fn run(&mut self, sources: &mut SourceSet, sink: &mut dyn ErrorSink) -> RebuildReport {
        self.catalog.clear();
        let mut report = RebuildReport::default();

        for problem in std::mem::take(&mut sources.problems) {
            sink.report_error(problem);
        }

        for patch in &sources.patches {
            let lines = match read_lines(&patch.path) {
                Ok(lines) => lines,
                Err(error) => {
                    sink.report_error(error);
                    continue;
                }
            };
            let parsed = parse_patch_source(&patch.origin, &lines);
            tracing::debug!(
                patch = %patch.path.display(),
                directives = parsed.directives.len(),
                errors = parsed.errors.len(),
                "parsed patch source"
            );
            for error in parsed.errors {
                sink.report_error(PatchError::DirectiveParse {
                    file: patch.path.clone(),
                    error,
                });
            }
            for parsed in parsed.directives {
                self.register(parsed.directive, sink);
                report.registered += 1;
            }
        }

        for directive in self.synthetic.clone() {
            self.register(directive, sink);
            report.registered += 1;
        }

        report.cancelled = self.catalog.apply_cancellations();

        let segmenter = EventSegmenter::new(self.config.format.event_marker.as_str());
        let mut seen_events = HashSet::new();
        for script in &sources.scripts {
            match self.merge_script(script, &segmenter, &mut seen_events, sink) {
                Ok(file) => {
                    report.stats += file.stats;
                    report.files.push(file);
                }
                Err(error) => sink.report_error(error),
            }
        }

        for edit in self.catalog.drain_remaining() {
            report.orphaned += 1;
            sink.report_error(PatchError::OrphanedDirective { edit });
        }

        report
    }

    fn register(&mut self, directive: PatchDirective, sink: &mut dyn ErrorSink) {
        let event_id = directive.event_id().to_string();
        if let Registration::Shadowed { first_origin } = self.catalog.add(directive) {
            if let Some(edit) = self.catalog.directives_for(&event_id).last() {
                sink.report_error(PatchError::ShadowedDirective {
                    edit: edit.clone(),
                    first_origin,
                });
            }
        }
    }

    fn merge_script(
        &mut self,
        script: &ScriptSource,
        segmenter: &EventSegmenter,
        seen_events: &mut HashSet<String>,
        sink: &mut dyn ErrorSink,
    ) -> Result<GeneratedFile, PatchError> {
        let lines = read_lines(&script.path)?;
        let document = segmenter.segment(&lines);

        for event in &document.events {
            if !seen_events.insert(event.id.clone()) {
                sink.report_error(PatchError::DuplicateEvent {
                    event_id: event.id.clone(),
                    file: script.path.clone(),
                });
            }
        }

        let merged = merge_document(&document, &mut self.catalog, sink);
        tracing::debug!(
            script = %script.path.display(),
            events = document.events.len(),
            applied = merged.stats.applied,
            "merged script"
        );

        Ok(GeneratedFile {
            source: script.path.clone(),
            origin: script.origin.clone(),
            name: self.config.format.output_name(&script.path),
            lines: merged.lines,
            stats: merged.stats,
        })
    }
}

/// The credits insert: each enabled package's name and version followed by
/// its credit lines, in registry order.
pub fn credits_directive(
    credits: &Credits,
    registry: &dyn PackageRegistry,
) -> Option<PatchDirective> {
    let mut content = Vec::new();
    for package in registry.enabled_packages() {
        content.push(format!("{} v{}", package.name, package.version));
        content.extend(package.intro_credits.iter().cloned());
    }
    if content.is_empty() {
        return None;
    }

    Some(PatchDirective::Insert(InsertDirective {
        origin: SYNTHETIC_ORIGIN.to_string(),
        event_id: credits.event.trim().to_string(),
        key: credits.key.clone(),
        key_index: credits.key_index,
        content,
    }))
}

fn read_lines(path: &Path) -> Result<Vec<String>, PatchError> {
    let text = fs::read_to_string(path).map_err(|source| PatchError::FileIo {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(text.lines().map(str::to_string).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::{PackageInfo, StaticRegistry};
    use semver::Version;

    fn write(path: &Path, text: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, text).unwrap();
    }

    fn config_in(root: &Path) -> PatcherConfig {
        let mut config = PatcherConfig::default();
        config.resolve_paths(root);
        config
    }

    #[test]
    fn test_missing_output_is_stale() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let registry = StaticRegistry::new();
        let coordinator = RebuildCoordinator::new(&config, &registry);

        assert_eq!(coordinator.check(), Freshness::Stale(StaleReason::NoOutput));

        fs::create_dir_all(&config.paths.output_dir).unwrap();
        assert_eq!(coordinator.check(), Freshness::Stale(StaleReason::NoManifest));
    }

    #[test]
    fn test_regenerate_then_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(&root.join("scripts/chapter1.txt"), "#event intro\nHello.\nBye.\n");
        write(
            &root.join("packages/A/patches/wave.patch"),
            "@|insert|intro|Bye.|0\n----\nWave.\n}\n",
        );

        let config = config_in(root);
        let registry =
            StaticRegistry::new().with_package(PackageInfo::new("A", root.join("packages/A")), true);
        let mut coordinator = RebuildCoordinator::new(&config, &registry);
        let mut problems: Vec<PatchError> = Vec::new();

        let report = coordinator.regenerate(&mut problems).unwrap();
        assert!(problems.is_empty(), "{problems:?}");
        assert_eq!(report.registered, 1);
        assert_eq!(report.stats.applied, 1);
        assert_eq!(
            fs::read_to_string(root.join("generated/patched_chapter1.txt")).unwrap(),
            "#event intro\nHello.\nWave.\nBye.\n"
        );

        assert_eq!(coordinator.check(), Freshness::Fresh);
        assert!(matches!(
            coordinator.rebuild(&mut problems).unwrap(),
            RebuildOutcome::Fresh
        ));
    }

    #[test]
    fn test_enablement_change_is_stale() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(&root.join("scripts/a.txt"), "#event intro\nHello.\n");

        let config = config_in(root);
        let on = StaticRegistry::new().with_package(PackageInfo::new("A", root.join("A")), true);
        RebuildCoordinator::new(&config, &on)
            .regenerate(&mut Vec::<PatchError>::new())
            .unwrap();

        let off = StaticRegistry::new().with_package(PackageInfo::new("A", root.join("A")), false);
        assert_eq!(
            RebuildCoordinator::new(&config, &off).check(),
            Freshness::Stale(StaleReason::EnablementChanged)
        );
    }

    #[test]
    fn test_orphans_and_duplicates_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(&root.join("scripts/a.txt"), "#event intro\nHello.\n");
        write(&root.join("scripts/b.txt"), "#event intro\nAgain.\n");
        write(
            &root.join("packages/A/patches/p.patch"),
            "@|insert|nowhere|Hello.|0\n----\nX\n}\n",
        );

        let config = config_in(root);
        let registry =
            StaticRegistry::new().with_package(PackageInfo::new("A", root.join("packages/A")), true);
        let mut problems: Vec<PatchError> = Vec::new();
        let report = RebuildCoordinator::new(&config, &registry)
            .dry_run(&mut problems)
            .unwrap();

        assert_eq!(report.orphaned, 1);
        assert_eq!(report.files.len(), 2);
        assert!(problems
            .iter()
            .any(|p| matches!(p, PatchError::DuplicateEvent { event_id, .. } if event_id == "intro")));
        assert!(problems
            .iter()
            .any(|p| matches!(p, PatchError::OrphanedDirective { .. })));
        assert!(!config.paths.output_dir.exists());
    }

    #[test]
    fn test_credits_directive_lists_enabled_packages() {
        let mut alpha = PackageInfo::new("alpha", "/p/alpha");
        alpha.name = "Alpha".to_string();
        alpha.version = Version::new(1, 2, 0);
        alpha.intro_credits = vec!["by Ada".to_string()];
        let registry = StaticRegistry::new()
            .with_package(alpha, true)
            .with_package(PackageInfo::new("beta", "/p/beta"), false);
        let credits = Credits {
            event: " intro ".to_string(),
            key: "Welcome".to_string(),
            key_index: 0,
        };

        let Some(PatchDirective::Insert(insert)) = credits_directive(&credits, &registry) else {
            panic!("expected an insert");
        };
        assert_eq!(insert.origin, SYNTHETIC_ORIGIN);
        assert_eq!(insert.event_id, "intro");
        assert_eq!(insert.content, vec!["Alpha v1.2.0".to_string(), "by Ada".to_string()]);

        assert!(credits_directive(&credits, &StaticRegistry::new()).is_none());
    }

    #[test]
    fn test_output_inside_sources_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path());
        fs::create_dir_all(&config.paths.base_dir).unwrap();
        config.paths.output_dir = config.paths.base_dir.join("out");
        let registry = StaticRegistry::new();

        let result = RebuildCoordinator::new(&config, &registry).regenerate(&mut Vec::<PatchError>::new());
        assert!(matches!(result, Err(RebuildError::Safety(_))));
    }
}
