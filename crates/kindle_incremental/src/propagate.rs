//! Turning a round's changes into the next round's dirty files.
//!
//! Two strategies exist. The coarse one over-approximates from the four
//! change flags alone. The precise one follows each changed member through
//! the lookup index to the files that referenced it.

use std::collections::BTreeSet;
use std::path::PathBuf;

use kindle_cache::{CacheSet, ChangeInfo, CompilationResult, LookupStorage, LookupSymbol};
use kindle_common::TargetId;
use kindle_config::PropagationMode;
use tracing::debug;

use crate::dirty::DirtyFileProvider;
use crate::project::{Chunk, Project};
use crate::state::BuildInvocationState;

/// Inputs that stay fixed while one round's changes are propagated.
pub struct ChangePropagator<'a> {
    mode: PropagationMode,
    project: &'a Project,
    chunk: &'a Chunk,
    state: &'a BuildInvocationState,
}

/// What a round compiled, as seen by propagation.
pub struct RoundFiles<'a> {
    /// Files compiled this round.
    pub compiled: &'a BTreeSet<PathBuf>,
    /// Targets that had files compiled this round.
    pub targets: &'a [TargetId],
}

impl<'a> ChangePropagator<'a> {
    /// Creates a propagator for `chunk`.
    pub fn new(
        mode: PropagationMode,
        project: &'a Project,
        chunk: &'a Chunk,
        state: &'a BuildInvocationState,
    ) -> Self {
        Self {
            mode,
            project,
            chunk,
            state,
        }
    }

    /// Marks the files affected by `result` dirty for the next round and
    /// returns them.
    ///
    /// `lookups` is only consulted in precise mode.
    pub fn propagate(
        &self,
        result: &CompilationResult,
        round: &RoundFiles<'_>,
        caches: &mut CacheSet,
        lookups: Option<&LookupStorage>,
        dirty: &mut dyn DirtyFileProvider,
    ) -> BTreeSet<PathBuf> {
        let marked = match (self.mode, lookups) {
            (PropagationMode::Precise, Some(lookups)) => {
                self.propagate_precise(result, round, caches, lookups)
            }
            _ => self.propagate_coarse(result, round, caches),
        };
        for file in &marked {
            dirty.mark_dirty(file);
        }
        debug!(
            chunk = %self.chunk.display_names(),
            files = marked.len(),
            "marked files dirty for next round"
        );
        marked
    }

    fn chunk_files(&self, compilable_only: bool) -> Vec<PathBuf> {
        self.chunk
            .targets()
            .iter()
            .flat_map(|t| {
                if compilable_only {
                    self.project.compilable_files(t)
                } else {
                    self.project.files(t)
                }
            })
            .collect()
    }

    fn propagate_coarse(
        &self,
        result: &CompilationResult,
        round: &RoundFiles<'_>,
        caches: &mut CacheSet,
    ) -> BTreeSet<PathBuf> {
        debug!(?result, "coarse propagation");
        if result.inline_added {
            self.state.clear_compiled();
            return self.chunk_files(true).into_iter().collect();
        }
        if result.constants_changed {
            return self
                .chunk_files(false)
                .into_iter()
                .filter(|f| !self.state.is_compiled(f))
                .collect();
        }

        let mut marked = BTreeSet::new();
        if result.signature_changed {
            marked.extend(
                self.chunk_files(true)
                    .into_iter()
                    .filter(|f| !self.state.is_compiled(f)),
            );
        }
        if result.inline_changed {
            for target in round.targets {
                marked.extend(caches.files_to_reinline(target));
                if let Some(cache) = caches.get_mut(target) {
                    cache.clean_dirty_inline_functions();
                }
            }
        }
        marked
    }

    fn propagate_precise(
        &self,
        result: &CompilationResult,
        round: &RoundFiles<'_>,
        caches: &mut CacheSet,
        lookups: &LookupStorage,
    ) -> BTreeSet<PathBuf> {
        let mut marked = BTreeSet::new();
        for change in &result.changes {
            let ChangeInfo::SignatureChanged { members, scope } = change else {
                continue;
            };
            debug!(scope = %scope, ?members, "processing signature change");
            for member in members {
                let referrers = lookups.get(&LookupSymbol::new(member.as_str(), scope.as_str()));
                marked.extend(referrers.into_iter().filter(|f| !round.compiled.contains(f)));
            }
        }
        caches.clean_all_dirty_inline_functions();
        marked
    }
}
