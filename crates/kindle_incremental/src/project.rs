//! The project model: targets, their sources, and chunks.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use kindle_common::{InternalError, KindleResult, TargetId};
use kindle_config::ProjectConfig;
use tracing::warn;

use crate::error::ProjectError;

/// A compilable module.
#[derive(Debug, Clone)]
pub struct Target {
    /// Stable identity.
    pub id: TargetId,
    /// Source roots. A directory is walked recursively; a file is taken as is.
    pub sources: Vec<PathBuf>,
    /// Where the compiler writes this target's output.
    pub output_dir: PathBuf,
    /// Targets this one depends on directly.
    pub dependencies: Vec<TargetId>,
}

impl Target {
    /// Creates a target with no sources and no dependencies.
    pub fn new(id: impl Into<String>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            id: TargetId::new(id),
            sources: Vec::new(),
            output_dir: output_dir.into(),
            dependencies: Vec::new(),
        }
    }

    /// Adds a source root.
    pub fn with_source(mut self, source: impl Into<PathBuf>) -> Self {
        self.sources.push(source.into());
        self
    }

    /// Adds a direct dependency.
    pub fn depends_on(mut self, dependency: &str) -> Self {
        self.dependencies.push(TargetId::new(dependency));
        self
    }

    /// Every file under the target's source roots, sorted.
    pub fn files(&self) -> Vec<PathBuf> {
        let mut files = Vec::new();
        for source in &self.sources {
            if source.is_dir() {
                walk_dir(source, &mut files);
            } else {
                files.push(source.clone());
            }
        }
        files.sort();
        files.dedup();
        files
    }
}

fn walk_dir(dir: &Path, files: &mut Vec<PathBuf>) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "cannot read source directory, skipping it");
            return;
        }
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            walk_dir(&path, files);
        } else {
            files.push(path);
        }
    }
}

/// A group of mutually dependent targets compiled together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    targets: Vec<TargetId>,
}

impl Chunk {
    /// Creates a chunk. The first target is the representative.
    pub fn new(targets: Vec<TargetId>) -> KindleResult<Self> {
        if targets.is_empty() {
            return Err(InternalError::new("a chunk must contain at least one target"));
        }
        Ok(Self { targets })
    }

    /// A chunk holding a single target.
    pub fn single(target: TargetId) -> Self {
        Self {
            targets: vec![target],
        }
    }

    pub(crate) fn from_sorted(targets: Vec<TargetId>) -> Self {
        Self { targets }
    }

    /// The chunk's targets in order.
    pub fn targets(&self) -> &[TargetId] {
        &self.targets
    }

    /// The first target; stands for the chunk where one target is needed.
    pub fn representative(&self) -> &TargetId {
        &self.targets[0]
    }

    /// Returns `true` if `target` belongs to the chunk.
    pub fn contains(&self, target: &TargetId) -> bool {
        self.targets.contains(target)
    }

    /// Number of targets.
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// Returns `true` if the chunk has no targets. [`Chunk::new`] rejects
    /// empty chunks, so this is `false` for every chunk it builds.
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Target names joined for messages.
    pub fn display_names(&self) -> String {
        self.targets
            .iter()
            .map(TargetId::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// All targets of a project plus the set of compilable extensions.
#[derive(Debug, Clone)]
pub struct Project {
    targets: BTreeMap<TargetId, Target>,
    extensions: Vec<String>,
}

impl Project {
    /// Creates a project from explicit targets.
    ///
    /// Fails if a source file is reachable from the roots of two targets.
    pub fn new(
        targets: impl IntoIterator<Item = Target>,
        extensions: Vec<String>,
    ) -> Result<Self, ProjectError> {
        let targets: BTreeMap<TargetId, Target> =
            targets.into_iter().map(|t| (t.id.clone(), t)).collect();
        let mut owners: BTreeMap<PathBuf, &TargetId> = BTreeMap::new();
        for target in targets.values() {
            for file in target.files() {
                if let Some(first) = owners.insert(file.clone(), &target.id) {
                    return Err(ProjectError::SharedSource {
                        file,
                        first: first.clone(),
                        second: target.id.clone(),
                    });
                }
            }
        }
        Ok(Self {
            targets,
            extensions,
        })
    }

    /// Builds the project described by a loaded configuration.
    ///
    /// Relative paths are resolved against `root`.
    pub fn from_config(root: &Path, config: &ProjectConfig) -> Result<Self, ProjectError> {
        let targets = config.targets.iter().map(|(name, tc)| Target {
            id: TargetId::new(name.as_str()),
            sources: tc.sources.iter().map(|s| root.join(s)).collect(),
            output_dir: root.join(&tc.output),
            dependencies: tc.dependencies.iter().map(|d| TargetId::new(d.as_str())).collect(),
        });
        Self::new(targets, config.sources.extensions.clone())
    }

    /// The target named `id`.
    pub fn target(&self, id: &TargetId) -> Option<&Target> {
        self.targets.get(id)
    }

    /// Every target, in name order.
    pub fn targets(&self) -> impl Iterator<Item = &Target> {
        self.targets.values()
    }

    /// Every target id, in name order.
    pub fn target_ids(&self) -> impl Iterator<Item = &TargetId> {
        self.targets.keys()
    }

    /// Returns `true` if `path` has a compilable extension.
    pub fn is_compilable(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|e| e == ext))
    }

    /// Every file of `target`, compilable or not.
    pub fn files(&self, target: &TargetId) -> Vec<PathBuf> {
        self.targets.get(target).map(Target::files).unwrap_or_default()
    }

    /// The compilable files of `target`.
    pub fn compilable_files(&self, target: &TargetId) -> Vec<PathBuf> {
        self.files(target)
            .into_iter()
            .filter(|f| self.is_compilable(f))
            .collect()
    }

    /// The compilable files of every target.
    pub fn all_compilable_files(&self) -> Vec<PathBuf> {
        self.targets
            .keys()
            .flat_map(|id| self.compilable_files(id))
            .collect()
    }

    /// Maps every compilable file of `targets` to its owning target.
    pub fn source_owners<'a>(
        &self,
        targets: impl IntoIterator<Item = &'a TargetId>,
    ) -> BTreeMap<PathBuf, TargetId> {
        let mut owners = BTreeMap::new();
        for target in targets {
            for file in self.compilable_files(target) {
                owners.insert(file, target.clone());
            }
        }
        owners
    }
}
