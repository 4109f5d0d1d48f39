use std::collections::BTreeMap;

use tracing::debug;

use crate::error::{Result, UpgradeError};
use crate::kind::DocumentKind;
use crate::rules::{Upgrade, UpgradedFile, VersionUpgrade43to44};
use crate::version::{detect_version, VersionPair};

/// A single upgrade step that moves one document kind forward one version.
///
/// Steps form a chain per kind: v1→v2, v2→v3, etc.
/// Each step must be **deterministic and pure**: text in, text out, no I/O.
pub trait UpgradeStep: Send + Sync {
    /// Kind of document this step consumes.
    fn kind(&self) -> DocumentKind;
    /// Source version.
    fn source_version(&self) -> VersionPair;
    /// Target version.
    fn target_version(&self) -> VersionPair;
    /// Transform one serialized document. May fan out into several files,
    /// or report [`Upgrade::NotApplicable`].
    fn upgrade(&self, serialized: &str, name: &str) -> Result<Upgrade<Vec<UpgradedFile>>>;
}

/// Runs chains of [`UpgradeStep`]s, keyed by document kind.
///
/// The current version of a kind is the highest target version among its
/// registered steps. A document at version N of that kind runs N→N+1,
/// N+1→N+2, ... until it reaches current.
///
/// # Example
///
/// ```
/// use slicecfg_upgrade::{DocumentKind, UpgradeEngine};
///
/// let engine = UpgradeEngine::with_default_steps();
///
/// let text = "[general]\nversion = 4\n\n[metadata]\ntype = quality_changes\nsetting_version = 9\n";
/// assert!(engine.needs_upgrade(DocumentKind::QualityChanges, text).unwrap());
///
/// let files = engine
///     .upgrade_to_current(DocumentKind::QualityChanges, text, "my_profile.inst.cfg")
///     .unwrap()
///     .upgraded()
///     .unwrap();
/// assert_eq!(files.len(), 1);
/// assert!(files[0].text.contains("intent_category = default"));
/// ```
#[derive(Default)]
pub struct UpgradeEngine {
    current: BTreeMap<DocumentKind, VersionPair>,
    steps: Vec<Box<dyn UpgradeStep>>,
}

impl UpgradeEngine {
    /// Create an engine with no steps.
    pub fn new() -> Self {
        Self::default()
    }

    /// Engine with the 4.3 to 4.4 step registered for every kind.
    pub fn with_default_steps() -> Self {
        let mut engine = Self::new();
        for step in VersionUpgrade43to44::all() {
            engine.insert(Box::new(step));
        }
        engine
    }

    /// Register an upgrade step.
    ///
    /// Fails with [`UpgradeError::DuplicateStep`] if a step for the same kind
    /// and source version is already registered.
    pub fn register(&mut self, step: Box<dyn UpgradeStep>) -> Result<()> {
        let (kind, from) = (step.kind(), step.source_version());
        if self
            .steps
            .iter()
            .any(|s| s.kind() == kind && s.source_version() == from)
        {
            return Err(UpgradeError::DuplicateStep {
                kind,
                from: from.combined(),
            });
        }
        self.insert(step);
        Ok(())
    }

    fn insert(&mut self, step: Box<dyn UpgradeStep>) {
        let kind = step.kind();
        let target = step.target_version();
        let current = self.current.entry(kind).or_insert(target);
        if target > *current {
            *current = target;
        }
        self.steps.push(step);
        // Keep sorted for stable listing
        self.steps
            .sort_by_key(|s| (s.kind(), s.source_version()));
    }

    /// Newest version known for `kind`, if any step produces it.
    pub fn current_version(&self, kind: DocumentKind) -> Option<VersionPair> {
        self.current.get(&kind).copied()
    }

    /// Check whether a document of `kind` is behind the current version.
    pub fn needs_upgrade(&self, kind: DocumentKind, serialized: &str) -> Result<bool> {
        let version = detect_version(serialized)?;
        Ok(self
            .current_version(kind)
            .is_some_and(|current| version < current))
    }

    /// Upgrade a document of `kind` to the current version.
    ///
    /// Runs the chain of steps sequentially; every output file of one step is
    /// fed to the next. A document already at the current version, or a step
    /// reporting [`Upgrade::NotApplicable`], yields `NotApplicable`.
    pub fn upgrade_to_current(
        &self,
        kind: DocumentKind,
        serialized: &str,
        name: &str,
    ) -> Result<Upgrade<Vec<UpgradedFile>>> {
        let found = detect_version(serialized)?;
        let current = self.current_version(kind).ok_or(UpgradeError::NoPath {
            kind,
            from: found.combined(),
        })?;

        if found == current {
            return Ok(Upgrade::NotApplicable);
        }
        if found > current {
            return Err(UpgradeError::FutureVersion {
                kind,
                found: found.combined(),
                current: current.combined(),
            });
        }

        let mut files = vec![UpgradedFile {
            name: name.to_string(),
            text: serialized.to_string(),
        }];
        let mut version = found;

        while version < current {
            let step = self.find_step(kind, version)?;
            let to = step.target_version();
            debug!(%kind, from = version.combined(), to = to.combined(), "running upgrade step");

            let mut next = Vec::with_capacity(files.len());
            for file in &files {
                let outcome = step.upgrade(&file.text, &file.name).map_err(|e| {
                    UpgradeError::StepFailed {
                        kind,
                        from: version.combined(),
                        to: to.combined(),
                        reason: e.to_string(),
                    }
                })?;
                match outcome {
                    Upgrade::Upgraded(out) => next.extend(out),
                    Upgrade::NotApplicable => {
                        debug!(file = %file.name, "step reported nothing to do");
                        return Ok(Upgrade::NotApplicable);
                    }
                }
            }

            files = next;
            version = to;
        }

        Ok(Upgrade::Upgraded(files))
    }

    /// Validate that the chain for `kind` is complete from `min_version` to current.
    pub fn validate_chain(&self, kind: DocumentKind, min_version: VersionPair) -> Result<()> {
        let current = self.current_version(kind).ok_or(UpgradeError::NoPath {
            kind,
            from: min_version.combined(),
        })?;
        let mut version = min_version;
        while version < current {
            version = self.find_step(kind, version)?.target_version();
        }
        Ok(())
    }

    /// List all registered steps as `(kind, from, to)`.
    pub fn registered_steps(&self) -> Vec<(DocumentKind, VersionPair, VersionPair)> {
        self.steps
            .iter()
            .map(|s| (s.kind(), s.source_version(), s.target_version()))
            .collect()
    }

    fn find_step(&self, kind: DocumentKind, version: VersionPair) -> Result<&dyn UpgradeStep> {
        self.steps
            .iter()
            .find(|s| s.kind() == kind && s.source_version() == version)
            .map(|s| s.as_ref())
            .ok_or(UpgradeError::GapInChain {
                kind,
                missing: version.combined(),
            })
    }
}
