//! The external compiler seam and classification of its output.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use kindle_cache::{ClassSummary, LookupSymbol};
use kindle_common::TargetId;
use kindle_diagnostics::Diagnostic;

use crate::error::EngineError;
use crate::project::{Chunk, Project};
use crate::state::CancellationToken;

/// Extension of compiled class files.
pub const CLASS_EXTENSION: &str = "class";
/// Extension of module mapping files.
pub const MODULE_MAPPING_EXTENSION: &str = "kotlin_module";
const MODULE_MAPPING_DIR: &str = "META-INF";

/// Everything the compiler needs for one round.
#[derive(Debug)]
pub struct CompileRequest<'a> {
    /// The chunk being compiled.
    pub chunk: &'a Chunk,
    /// Files to compile, by owning target.
    pub files: &'a BTreeMap<TargetId, Vec<PathBuf>>,
    /// Removed files not yet reported to the compiler in this build.
    pub removed_count: usize,
    /// Compilation classpath.
    pub classpath: Vec<String>,
    /// Plugin options, configured ones first.
    pub plugin_options: Vec<String>,
    /// Plugin classpath entries, configured ones first.
    pub plugin_classpath: Vec<String>,
}

impl CompileRequest<'_> {
    /// Every file to compile.
    pub fn all_files(&self) -> impl Iterator<Item = &PathBuf> {
        self.files.values().flatten()
    }
}

/// One artifact emitted by the compiler.
#[derive(Debug, Clone, Default)]
pub struct OutputItem {
    /// Where the artifact was written.
    pub output_file: PathBuf,
    /// Source files that contributed to it.
    pub sources: Vec<PathBuf>,
    /// Class metadata read from a class file, if the compiler found any.
    pub metadata: Option<ClassSummary>,
    /// Raw contents, used for module mappings.
    pub contents: Vec<u8>,
}

/// A recorded inline call site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineUsage {
    /// Class declaring the inline function.
    pub owner: String,
    /// The inline function.
    pub function: String,
    /// File whose compiled code contains the inlined body.
    pub caller: PathBuf,
}

/// The result of one compiler invocation.
#[derive(Debug, Default)]
pub struct CompilerOutput {
    /// Emitted artifacts.
    pub items: Vec<OutputItem>,
    /// Messages about the compiled sources.
    pub diagnostics: Vec<Diagnostic>,
    /// Every symbol resolved while compiling, with the files that resolved it.
    pub lookups: BTreeMap<LookupSymbol, BTreeSet<PathBuf>>,
    /// Inline functions whose bodies were copied into compiled files.
    pub inline_usages: Vec<InlineUsage>,
}

impl CompilerOutput {
    /// Returns `true` if any diagnostic is an error.
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(|d| d.severity.is_error())
    }
}

/// An external compiler.
pub trait Compiler {
    /// Compiles the requested files.
    ///
    /// Implementations that block for long should poll `cancel` and return
    /// [`EngineError::Cancelled`] when it fires.
    fn compile(
        &mut self,
        request: &CompileRequest<'_>,
        cancel: &CancellationToken,
    ) -> Result<CompilerOutput, EngineError>;
}

/// What an output item turned out to be.
#[derive(Debug, Clone)]
pub enum GeneratedKind {
    /// A compiled class with its metadata.
    Class(ClassSummary),
    /// The module mapping and its contents.
    ModuleMapping(Vec<u8>),
    /// Any other file.
    Other,
}

/// An output item attributed to its owning target.
#[derive(Debug, Clone)]
pub struct GeneratedFile {
    /// Target the output belongs to.
    pub target: TargetId,
    /// Contributing source files.
    pub sources: Vec<PathBuf>,
    /// The output file.
    pub output_file: PathBuf,
    /// Classification.
    pub kind: GeneratedKind,
}

fn is_module_mapping(path: &Path) -> bool {
    path.extension().is_some_and(|e| e == MODULE_MAPPING_EXTENSION)
        && path
            .parent()
            .and_then(Path::file_name)
            .is_some_and(|dir| dir == MODULE_MAPPING_DIR)
}

/// Classifies `items` and resolves the target owning each.
///
/// The owner is the target of the first contributing source when the chunk
/// has several targets, else the only chunk target whose output directory
/// contains the file, else the chunk's representative.
pub fn classify_outputs(
    chunk: &Chunk,
    project: &Project,
    items: Vec<OutputItem>,
) -> Result<Vec<GeneratedFile>, EngineError> {
    let source_owners = if chunk.len() > 1 {
        project.source_owners(chunk.targets())
    } else {
        BTreeMap::new()
    };

    let mut generated = Vec::with_capacity(items.len());
    for item in items {
        let target = resolve_owner(chunk, project, &source_owners, &item);
        let kind = if item.output_file.extension().is_some_and(|e| e == CLASS_EXTENSION) {
            match item.metadata {
                Some(summary) => GeneratedKind::Class(summary),
                None => {
                    return Err(EngineError::MalformedArtifact {
                        path: item.output_file,
                        reason: "class file carries no readable class metadata".to_string(),
                    })
                }
            }
        } else if is_module_mapping(&item.output_file) {
            GeneratedKind::ModuleMapping(item.contents)
        } else {
            GeneratedKind::Other
        };
        generated.push(GeneratedFile {
            target,
            sources: item.sources,
            output_file: item.output_file,
            kind,
        });
    }
    Ok(generated)
}

fn resolve_owner(
    chunk: &Chunk,
    project: &Project,
    source_owners: &BTreeMap<PathBuf, TargetId>,
    item: &OutputItem,
) -> TargetId {
    if let Some(owner) = item.sources.first().and_then(|s| source_owners.get(s)) {
        return owner.clone();
    }
    let mut containing = chunk.targets().iter().filter(|t| {
        project
            .target(t)
            .is_some_and(|target| item.output_file.starts_with(&target.output_dir))
    });
    match (containing.next(), containing.next()) {
        (Some(only), None) => only.clone(),
        _ => chunk.representative().clone(),
    }
}
