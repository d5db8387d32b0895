//! `kindle status`: dry run of the checks a build would start with.
//!
//! For every target this reports the cache version actions that the next
//! build would apply and how many sources are new, modified or removed
//! since the last recorded manifest. Circular dependencies are reported
//! as warnings since those targets are compiled together as one chunk.

use kindle_cache::{Action, CacheVersionRegistry};
use kindle_common::TargetId;
use kindle_diagnostics::{
    Category, Diagnostic, DiagnosticCode, DiagnosticRenderer, DiagnosticSink, TerminalRenderer,
};
use kindle_incremental::{DependencyGraph, ManifestDirtyFiles};

use crate::workspace::Workspace;
use crate::{GlobalArgs, ReportFormat, StatusArgs};

const CIRCULAR_TARGETS: DiagnosticCode = DiagnosticCode::new(Category::Warning, 2);

/// What the next build would find for one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetStatus {
    /// The target.
    pub target: TargetId,
    /// Version actions, most severe last. Empty when nothing is pending.
    pub actions: Vec<Action>,
    /// New source files.
    pub new_files: usize,
    /// Modified source files.
    pub modified_files: usize,
    /// Removed source files.
    pub removed_files: usize,
}

impl TargetStatus {
    fn is_clean(&self) -> bool {
        self.actions.is_empty() && self.new_files + self.modified_files + self.removed_files == 0
    }
}

/// Runs the `kindle status` command.
pub fn run(args: &StatusArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let ws = Workspace::load(global)?;
    let sink = DiagnosticSink::new();
    let statuses = collect(&ws, &sink)?;

    match args.format {
        ReportFormat::Json => {
            let targets: Vec<_> = statuses
                .iter()
                .map(|s| {
                    serde_json::json!({
                        "target": s.target.as_str(),
                        "actions": s.actions.iter().map(Action::to_string).collect::<Vec<_>>(),
                        "new": s.new_files,
                        "modified": s.modified_files,
                        "removed": s.removed_files,
                    })
                })
                .collect();
            let report = serde_json::json!({
                "project": ws.config.project.name,
                "mode": if ws.engine.is_precise() { "precise" } else { "coarse" },
                "targets": targets,
                "diagnostics": sink.take_all(),
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        ReportFormat::Text => {
            let renderer = TerminalRenderer::new(global.color);
            for diag in sink.take_all() {
                eprintln!("{}", renderer.render(&diag));
            }
            if !global.quiet {
                println!(
                    "   Status {} ({} propagation)",
                    ws.config.project.name,
                    if ws.engine.is_precise() { "precise" } else { "coarse" }
                );
                for status in &statuses {
                    println!("{}", format_status(status));
                }
            }
        }
    }
    Ok(0)
}

/// Checks versions and scans sources for every target of `ws`.
///
/// Nothing on disk is modified.
pub fn collect(
    ws: &Workspace,
    sink: &DiagnosticSink,
) -> Result<Vec<TargetStatus>, Box<dyn std::error::Error>> {
    let paths = ws.data_paths();
    let registry = CacheVersionRegistry::new(
        paths.clone(),
        ws.engine.incremental_enabled,
        ws.engine.is_precise(),
    );
    let scan = ManifestDirtyFiles::scan(&ws.project, &paths)?;

    let graph = DependencyGraph::from_project(&ws.project);
    for chunk in graph.chunks().iter().filter(|c| c.len() > 1) {
        sink.emit(Diagnostic::warning(
            CIRCULAR_TARGETS,
            format!(
                "targets {} depend on each other and are compiled as one chunk",
                chunk.display_names()
            ),
        ));
    }

    let mut statuses = Vec::new();
    for target in ws.project.target_ids() {
        let actions = registry
            .check_all([target])
            .into_iter()
            .filter(|a| *a != Action::DoNothing)
            .collect();
        let (new_files, modified_files, removed_files) = scan
            .changes(target)
            .map(|c| (c.new_files.len(), c.modified_files.len(), c.deleted_files.len()))
            .unwrap_or_default();
        statuses.push(TargetStatus {
            target: target.clone(),
            actions,
            new_files,
            modified_files,
            removed_files,
        });
    }
    Ok(statuses)
}

fn format_status(status: &TargetStatus) -> String {
    if status.is_clean() {
        return format!("  {}: up to date", status.target);
    }
    let mut line = format!(
        "  {}: {} new, {} modified, {} removed",
        status.target, status.new_files, status.modified_files, status.removed_files
    );
    if let Some(action) = status.actions.last() {
        line.push_str(&format!("; caches: {action}"));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workspace::tests::{global_for, write_project};
    use kindle_cache::DataPaths;

    #[test]
    fn fresh_project_needs_a_chunk_rebuild_everywhere() {
        let dir = tempfile::tempdir().unwrap();
        write_project(dir.path());
        let ws = Workspace::load(&global_for(dir.path())).unwrap();
        let statuses = collect(&ws, &DiagnosticSink::new()).unwrap();

        assert_eq!(statuses.len(), 2);
        for status in &statuses {
            assert_eq!(status.new_files, 1);
            assert_eq!(status.actions, vec![Action::RebuildChunk]);
        }
    }

    #[test]
    fn stamped_project_reports_only_source_changes() {
        let dir = tempfile::tempdir().unwrap();
        write_project(dir.path());
        let ws = Workspace::load(&global_for(dir.path())).unwrap();
        let paths = DataPaths::new(&ws.engine.data_dir);
        CacheVersionRegistry::new(paths.clone(), true, false)
            .save_all(ws.project.target_ids())
            .unwrap();
        ManifestDirtyFiles::scan(&ws.project, &paths)
            .unwrap()
            .commit(&paths, ws.project.target_ids())
            .unwrap();
        std::fs::write(dir.path().join("core/src/Widget.kt"), "class Widget(val id: Int)").unwrap();

        let statuses = collect(&ws, &DiagnosticSink::new()).unwrap();
        let core = statuses.iter().find(|s| s.target.as_str() == "core").unwrap();
        assert!(core.actions.is_empty());
        assert_eq!(core.modified_files, 1);
        let app = statuses.iter().find(|s| s.target.as_str() == "app").unwrap();
        assert!(app.is_clean());
        assert_eq!(format_status(app), "  app: up to date");
    }

    #[test]
    fn circular_targets_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        write_project(dir.path());
        let toml = std::fs::read_to_string(dir.path().join("kindle.toml")).unwrap();
        let toml = toml.replace(
            "output = \"out/core\"",
            "output = \"out/core\"\ndependencies = [\"app\"]",
        );
        std::fs::write(dir.path().join("kindle.toml"), toml).unwrap();

        let ws = Workspace::load(&global_for(dir.path())).unwrap();
        let sink = DiagnosticSink::new();
        collect(&ws, &sink).unwrap();
        let diags = sink.diagnostics();
        assert_eq!(diags.len(), 1);
        assert!(diags[0].message.contains("app, core"));
    }
}
