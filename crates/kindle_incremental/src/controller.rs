//! The per-chunk round state machine.
//!
//! One round checks cache versions, compiles the round's dirty files,
//! records the output in the incremental caches, and propagates the
//! resulting changes into the next round's dirty set. The orchestrator
//! keeps calling [`RoundController::build_round`] while it returns
//! [`ExitCode::AdditionalPassRequired`]; [`RoundController::build_chunk`]
//! does exactly that.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;
use std::time::Instant;

use kindle_cache::{
    Action, CacheSet, CacheVersionRegistry, CompilationResult, DataPaths, IncrementalCache,
    LookupStorage,
};
use kindle_common::{InternalError, TargetId};
use kindle_diagnostics::{Category, Diagnostic, DiagnosticCode, DiagnosticSink};
use tracing::{debug, info, instrument, warn};

use crate::compiler::{classify_outputs, CompileRequest, Compiler, GeneratedFile, GeneratedKind};
use crate::config::EngineConfig;
use crate::dirty::DirtyFileProvider;
use crate::error::EngineError;
use crate::graph::DependencyGraph;
use crate::project::{Chunk, Project};
use crate::propagate::{ChangePropagator, RoundFiles};
use crate::state::BuildInvocationState;

const ENGINE_VERSION: DiagnosticCode = DiagnosticCode::new(Category::Info, 1);
const PROVIDER_LOADED: DiagnosticCode = DiagnosticCode::new(Category::Info, 2);
const CIRCULAR_CHUNK: DiagnosticCode = DiagnosticCode::new(Category::Warning, 1);
const ENGINE_FAILURE: u16 = 1;

/// How a round ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExitCode {
    /// Nothing was dirty.
    NothingDone,
    /// The round compiled and nothing else needs compiling.
    Ok,
    /// Files were marked dirty; run another round for the same chunk.
    AdditionalPassRequired,
    /// Caches were dropped; the chunk must be rebuilt from scratch.
    ChunkRebuildRequired,
    /// Compilation failed or the engine hit an error.
    Abort,
}

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExitCode::NothingDone => "nothing done",
            ExitCode::Ok => "ok",
            ExitCode::AdditionalPassRequired => "additional pass required",
            ExitCode::ChunkRebuildRequired => "chunk rebuild required",
            ExitCode::Abort => "abort",
        };
        f.write_str(name)
    }
}

/// Result of one round.
#[derive(Debug)]
pub struct RoundOutcome {
    /// How the round ended.
    pub exit: ExitCode,
    /// The most severe version action found, or `DoNothing` if the check
    /// was skipped.
    pub version_action: Action,
    /// Files the compiler generated this round.
    pub generated: Vec<GeneratedFile>,
    /// Files marked dirty for the next round.
    pub marked_dirty: BTreeSet<PathBuf>,
}

impl RoundOutcome {
    fn new(exit: ExitCode, version_action: Action) -> Self {
        Self {
            exit,
            version_action,
            generated: Vec::new(),
            marked_dirty: BTreeSet::new(),
        }
    }
}

/// Result of building a chunk to its fixed point.
#[derive(Debug)]
pub struct ChunkOutcome {
    /// Exit code of the last round.
    pub exit: ExitCode,
    /// Rounds run.
    pub rounds: usize,
    /// Files generated over all rounds.
    pub generated: Vec<GeneratedFile>,
}

/// Drives the rounds of chunks within one build invocation.
pub struct RoundController<'a> {
    config: &'a EngineConfig,
    project: &'a Project,
    graph: &'a DependencyGraph,
    state: &'a BuildInvocationState,
    sink: &'a DiagnosticSink,
    paths: DataPaths,
    registry: CacheVersionRegistry,
}

impl<'a> RoundController<'a> {
    /// Creates a controller.
    pub fn new(
        config: &'a EngineConfig,
        project: &'a Project,
        graph: &'a DependencyGraph,
        state: &'a BuildInvocationState,
        sink: &'a DiagnosticSink,
    ) -> Self {
        let paths = DataPaths::new(&config.data_dir);
        let registry = CacheVersionRegistry::new(
            paths.clone(),
            config.incremental_enabled,
            config.is_precise(),
        );
        Self {
            config,
            project,
            graph,
            state,
            sink,
            paths,
            registry,
        }
    }

    /// Runs rounds for `chunk` until it reaches a fixed point.
    ///
    /// A rebuild request marks every chunk source dirty and continues;
    /// the version check is skipped for the cleared targets afterwards.
    pub fn build_chunk(
        &self,
        chunk: &Chunk,
        dirty: &mut dyn DirtyFileProvider,
        compiler: &mut dyn Compiler,
    ) -> Result<ChunkOutcome, EngineError> {
        let mut generated = Vec::new();
        for round in 1..=self.config.max_rounds {
            let outcome = self.build_round(chunk, dirty, compiler)?;
            generated.extend(outcome.generated);
            match outcome.exit {
                ExitCode::AdditionalPassRequired => dirty.start_next_round(chunk),
                ExitCode::ChunkRebuildRequired => {
                    for target in chunk.targets() {
                        for file in self.project.compilable_files(target) {
                            dirty.mark_dirty(&file);
                        }
                    }
                    dirty.start_next_round(chunk);
                }
                exit => {
                    return Ok(ChunkOutcome {
                        exit,
                        rounds: round,
                        generated,
                    })
                }
            }
        }
        Err(InternalError::new(format!(
            "chunk [{}] did not converge within {} rounds",
            chunk.display_names(),
            self.config.max_rounds
        ))
        .into())
    }

    /// Runs one round for `chunk`.
    ///
    /// Only cancellation is returned as an error. Every other failure is
    /// reported as an internal-error diagnostic and ends the round with
    /// [`ExitCode::Abort`].
    #[instrument(skip_all, fields(chunk = %chunk.representative()))]
    pub fn build_round(
        &self,
        chunk: &Chunk,
        dirty: &mut dyn DirtyFileProvider,
        compiler: &mut dyn Compiler,
    ) -> Result<RoundOutcome, EngineError> {
        debug!(targets = %chunk.display_names(), "round started");
        let mut outcome = match self.run_round(chunk, dirty, compiler) {
            Ok(outcome) => outcome,
            Err(EngineError::Cancelled) => {
                info!("round cancelled");
                return Err(EngineError::Cancelled);
            }
            Err(e) if e.is_corruption() => {
                warn!(error = %e, "persistent state is unreadable, rebuilding all modules");
                match self.rebuild_all_modules(dirty) {
                    Ok(()) => RoundOutcome::new(
                        ExitCode::ChunkRebuildRequired,
                        Action::RebuildAllModules,
                    ),
                    Err(e) => self.abort_with(e),
                }
            }
            Err(e) => self.abort_with(e),
        };

        if !matches!(outcome.exit, ExitCode::ChunkRebuildRequired | ExitCode::Abort) {
            if let Err(e) = self.save_versions(chunk) {
                outcome = self.abort_with(e);
            }
        }
        self.state
            .statistics()
            .record_round(outcome.exit == ExitCode::Abort);
        debug!(exit = %outcome.exit, "round finished");
        Ok(outcome)
    }

    fn abort_with(&self, error: EngineError) -> RoundOutcome {
        warn!(error = %error, "round failed");
        self.sink
            .emit(Diagnostic::internal(ENGINE_FAILURE, error.to_string()));
        RoundOutcome::new(ExitCode::Abort, Action::DoNothing)
    }

    fn run_round(
        &self,
        chunk: &Chunk,
        dirty: &mut dyn DirtyFileProvider,
        compiler: &mut dyn Compiler,
    ) -> Result<RoundOutcome, EngineError> {
        let cancel = self.state.cancellation();
        cancel.check()?;

        let mut version_action = Action::DoNothing;
        if !self.state.is_full_rebuild() && !self.state.all_cleared(chunk.targets()) {
            let (action, exit) = self.check_versions(chunk, dirty)?;
            version_action = action;
            if let Some(exit) = exit {
                return Ok(RoundOutcome::new(exit, version_action));
            }
        }

        let (files, removed) = self.collect_files(chunk, dirty);
        if files.values().all(Vec::is_empty) && removed.values().all(Vec::is_empty) {
            return Ok(RoundOutcome::new(ExitCode::NothingDone, version_action));
        }

        self.sink.emit(Diagnostic::info(
            ENGINE_VERSION,
            format!("kindle incremental engine {}", env!("CARGO_PKG_VERSION")),
        ));

        let incremental = self.config.incremental_enabled;
        let precise = self.config.is_precise();
        let lookups_dir = self.paths.lookups_dir();
        if precise {
            self.state.with_lookups(&lookups_dir, |_| Ok(()))?;
        }
        let mut caches = if incremental {
            self.graph.build_dependent_caches(chunk, &self.paths, precise)?
        } else {
            CacheSet::new()
        };

        if chunk.len() > 1 {
            self.sink.emit(Diagnostic::warning(
                CIRCULAR_CHUNK,
                format!(
                    "circular dependencies are only partially supported; these targets depend on each other: {}",
                    chunk.display_names()
                ),
            ));
        }

        if incremental {
            for target in chunk.targets() {
                if let Some(cache) = caches.get_mut(target) {
                    let touched = files.get(target).into_iter().flatten();
                    let gone = removed.get(target).into_iter().flatten();
                    cache.mark_output_classes_dirty(touched.chain(gone).map(PathBuf::as_path));
                }
            }
        }

        let mut request = CompileRequest {
            chunk,
            files: &files,
            removed_count: 0,
            classpath: self.config.classpath.clone(),
            plugin_options: self.config.plugin_options.clone(),
            plugin_classpath: self.config.plugin_classpath.clone(),
        };
        if let Some(representative) = self.project.target(chunk.representative()) {
            for provider in &self.config.providers {
                request
                    .plugin_options
                    .extend(provider.extra_arguments(representative));
                request
                    .plugin_classpath
                    .extend(provider.classpath(representative));
                self.sink.emit(Diagnostic::info(
                    PROVIDER_LOADED,
                    format!("argument provider loaded: {}", provider.name()),
                ));
            }
        }

        self.state.add_compiled(request.all_files());
        for (target, gone) in &removed {
            if !gone.is_empty() && self.state.mark_removed_processed(target) {
                request.removed_count += gone.len();
            }
        }

        cancel.check()?;
        debug!(
            files = request.all_files().count(),
            removed = request.removed_count,
            "compiling"
        );
        let started = Instant::now();
        let output = compiler.compile(&request, cancel)?;
        self.state
            .statistics()
            .register_compile(&chunk.display_names(), started.elapsed());

        let has_errors = output.has_errors();
        self.sink.emit_all(output.diagnostics);
        if has_errors {
            info!("compiled with errors");
            self.flush(&mut caches, precise)?;
            return Ok(RoundOutcome::new(ExitCode::Abort, version_action));
        }
        info!("compiled successfully");

        let generated = classify_outputs(chunk, self.project, output.items)?;
        let mut outcome = RoundOutcome::new(ExitCode::Ok, version_action);
        if !incremental {
            outcome.generated = generated;
            return Ok(outcome);
        }

        cancel.check()?;
        let result = update_caches(&mut caches, &generated)?;
        let owners = self.project.source_owners(chunk.targets());
        for usage in output.inline_usages {
            let owner = owners
                .get(&usage.caller)
                .unwrap_or_else(|| chunk.representative());
            if let Some(cache) = caches.get_mut(owner) {
                cache.record_inline_usage(&usage.owner, &usage.function, usage.caller);
            }
        }
        if precise {
            self.state.with_lookups(&lookups_dir, |lookups| {
                for file in files.values().chain(removed.values()).flatten() {
                    lookups.remove_lookups_from(file);
                }
                for (symbol, referrers) in output.lookups {
                    lookups.add(symbol, referrers);
                }
                Ok(())
            })?;
        }
        outcome.generated = generated;

        if self.state.is_full_rebuild() {
            self.flush(&mut caches, precise)?;
            return Ok(outcome);
        }

        let compiled: BTreeSet<PathBuf> = files.values().flatten().cloned().collect();
        let compiled_targets: Vec<TargetId> = files
            .iter()
            .filter(|(_, f)| !f.is_empty())
            .map(|(t, _)| t.clone())
            .collect();
        let propagator = ChangePropagator::new(self.config.mode, self.project, chunk, self.state);
        let round = RoundFiles {
            compiled: &compiled,
            targets: &compiled_targets,
        };
        outcome.marked_dirty = if precise {
            self.state.with_lookups(&lookups_dir, |lookups| {
                Ok(propagator.propagate(&result, &round, &mut caches, Some(&*lookups), dirty))
            })?
        } else {
            propagator.propagate(&result, &round, &mut caches, None, dirty)
        };
        self.flush(&mut caches, precise)?;

        if !outcome.marked_dirty.is_empty() {
            outcome.exit = ExitCode::AdditionalPassRequired;
        }
        Ok(outcome)
    }

    /// Dirty and removed compilable files per chunk target.
    fn collect_files(
        &self,
        chunk: &Chunk,
        dirty: &dyn DirtyFileProvider,
    ) -> (BTreeMap<TargetId, Vec<PathBuf>>, BTreeMap<TargetId, Vec<PathBuf>>) {
        let mut files = BTreeMap::new();
        let mut removed = BTreeMap::new();
        for target in chunk.targets() {
            let compilable = |list: Vec<PathBuf>| -> Vec<PathBuf> {
                list.into_iter()
                    .filter(|f| self.project.is_compilable(f))
                    .collect()
            };
            files.insert(target.clone(), compilable(dirty.dirty_files(target)));
            removed.insert(target.clone(), compilable(dirty.removed_files(target)));
        }
        (files, removed)
    }

    /// Applies the version actions for `chunk`, most severe first.
    ///
    /// Returns the most severe action found and, for rebuild actions, the
    /// exit code that ends the round.
    fn check_versions(
        &self,
        chunk: &Chunk,
        dirty: &mut dyn DirtyFileProvider,
    ) -> Result<(Action, Option<ExitCode>), EngineError> {
        let actions = self.registry.check_all(chunk.targets());
        let most_severe = actions.last().copied().unwrap_or(Action::DoNothing);
        for action in actions.into_iter().rev() {
            match action {
                Action::RebuildAllModules => {
                    info!("lookup format changed, rebuilding all modules");
                    self.rebuild_all_modules(dirty)?;
                    return Ok((action, Some(ExitCode::ChunkRebuildRequired)));
                }
                Action::RebuildChunk => {
                    self.clean_chunk_caches(chunk)?;
                    self.state.register_cleared(chunk.targets());
                    return Ok((action, Some(ExitCode::ChunkRebuildRequired)));
                }
                Action::CleanNormalCaches => {
                    self.clean_chunk_caches(chunk)?;
                    for target in chunk.targets() {
                        self.registry.normal_version(target).clean()?;
                        self.registry.experimental_version(target).clean()?;
                    }
                }
                Action::CleanExperimentalCaches => {
                    info!(targets = %chunk.display_names(), "clearing experimental caches");
                    for target in chunk.targets() {
                        IncrementalCache::clean_persisted_experimental(&self.paths, target)?;
                        self.registry.experimental_version(target).clean()?;
                    }
                }
                Action::CleanDataContainer => {
                    info!("clearing lookup storage");
                    self.state.clean_lookups(&self.paths.lookups_dir())?;
                    self.registry.data_container_version().clean()?;
                }
                Action::DoNothing => {}
            }
        }
        Ok((most_severe, None))
    }

    fn clean_chunk_caches(&self, chunk: &Chunk) -> Result<(), EngineError> {
        info!(targets = %chunk.display_names(), "clearing caches");
        for target in chunk.targets() {
            IncrementalCache::clean_persisted(&self.paths, target)?;
        }
        Ok(())
    }

    /// Marks every project file dirty and drops all persisted state.
    ///
    /// Every target is registered as cleared, so every target's cache is
    /// cleaned too; a corrupt cache of a dependent would otherwise be read
    /// again in the next round.
    fn rebuild_all_modules(&self, dirty: &mut dyn DirtyFileProvider) -> Result<(), EngineError> {
        for file in self.project.all_compilable_files() {
            dirty.mark_dirty(&file);
        }
        info!("clearing all caches");
        for target in self.project.target_ids() {
            IncrementalCache::clean_persisted(&self.paths, target)?;
        }
        self.state.clean_lookups(&self.paths.lookups_dir())?;
        self.state.register_cleared(self.project.target_ids());
        Ok(())
    }

    /// Persists the chunk's own caches and, in precise mode, the lookups.
    fn flush(&self, caches: &mut CacheSet, precise: bool) -> Result<(), EngineError> {
        caches.flush_all()?;
        if precise {
            self.state
                .with_lookups(&self.paths.lookups_dir(), LookupStorage::flush)?;
        }
        Ok(())
    }

    fn save_versions(&self, chunk: &Chunk) -> Result<(), EngineError> {
        let written = self.registry.save_all(chunk.targets())?;
        if written > 0 {
            debug!(stamps = written, "saved cache versions");
        }
        self.state.unregister_cleared(chunk.targets());
        Ok(())
    }
}

fn update_caches(
    caches: &mut CacheSet,
    generated: &[GeneratedFile],
) -> Result<CompilationResult, EngineError> {
    let mut result = CompilationResult::NO_CHANGES;
    for file in generated {
        let cache = caches.get_mut(&file.target).ok_or_else(|| {
            InternalError::new(format!("no incremental cache for target {}", file.target))
        })?;
        match &file.kind {
            GeneratedKind::Class(summary) => {
                result += cache.record_output(summary, file.sources.iter().cloned());
            }
            GeneratedKind::ModuleMapping(bytes) => result += cache.record_module_mapping(bytes),
            GeneratedKind::Other => {}
        }
    }
    for cache in caches.iter_mut() {
        result += cache.clear_cache_for_removed_classes();
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_code_display() {
        assert_eq!(ExitCode::AdditionalPassRequired.to_string(), "additional pass required");
        assert_eq!(ExitCode::NothingDone.to_string(), "nothing done");
    }
}
