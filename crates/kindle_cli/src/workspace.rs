//! Project root resolution and loading shared by every command.

use std::path::{Path, PathBuf};

use kindle_cache::DataPaths;
use kindle_config::{ProjectConfig, CONFIG_FILE};
use kindle_incremental::{EngineConfig, Project};

use crate::GlobalArgs;

/// A loaded project: its root, configuration and derived engine settings.
pub struct Workspace {
    /// Directory containing `kindle.toml`.
    pub root: PathBuf,
    /// The parsed configuration.
    pub config: ProjectConfig,
    /// The project model.
    pub project: Project,
    /// Engine settings derived from the configuration.
    pub engine: EngineConfig,
}

impl Workspace {
    /// Finds and loads the project selected by the global flags.
    pub fn load(global: &GlobalArgs) -> Result<Self, Box<dyn std::error::Error>> {
        let root = resolve_project_root(global)?;
        let config = kindle_config::load_config(&root)?;
        let project = Project::from_config(&root, &config)?;
        let engine = EngineConfig::from_project_config(&root, &config);
        tracing::debug!(root = %root.display(), targets = config.targets.len(), "loaded project");
        Ok(Self {
            root,
            config,
            project,
            engine,
        })
    }

    /// Layout of the persistent store.
    pub fn data_paths(&self) -> DataPaths {
        DataPaths::new(&self.engine.data_dir)
    }
}

/// Walks up from `start` looking for the nearest directory containing `kindle.toml`.
pub fn find_project_root(start: &Path) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let mut current = start.to_path_buf();
    loop {
        if current.join(CONFIG_FILE).exists() {
            return Ok(current);
        }
        if !current.pop() {
            return Err(format!(
                "could not find {CONFIG_FILE} in {} or any parent directory",
                start.display()
            )
            .into());
        }
    }
}

/// Resolves the project root directory from global CLI args.
///
/// If `--config` is specified, uses that path (a file selects its parent directory, a directory itself).
/// Otherwise walks up from the current directory looking for `kindle.toml`.
pub fn resolve_project_root(global: &GlobalArgs) -> Result<PathBuf, Box<dyn std::error::Error>> {
    if let Some(ref config_path) = global.config {
        let p = PathBuf::from(config_path);
        if p.is_file() {
            Ok(p.parent()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| PathBuf::from(".")))
        } else {
            Ok(p)
        }
    } else {
        find_project_root(&std::env::current_dir()?)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::fs;

    pub(crate) fn global_for(dir: &Path) -> GlobalArgs {
        GlobalArgs {
            quiet: true,
            color: false,
            config: Some(dir.join(CONFIG_FILE).display().to_string()),
        }
    }

    pub(crate) fn write_project(dir: &Path) {
        fs::write(
            dir.join(CONFIG_FILE),
            r#"
[project]
name = "demo"

[targets.core]
sources = ["core/src"]
output = "out/core"

[targets.app]
sources = ["app/src"]
output = "out/app"
dependencies = ["core"]
"#,
        )
        .unwrap();
        fs::create_dir_all(dir.join("core/src")).unwrap();
        fs::create_dir_all(dir.join("app/src")).unwrap();
        fs::write(dir.join("core/src/Widget.kt"), "class Widget").unwrap();
        fs::write(dir.join("app/src/Main.kt"), "fun main() = Widget()").unwrap();
    }

    #[test]
    fn finds_root_from_nested_directory() {
        let dir = tempfile::tempdir().unwrap();
        write_project(dir.path());
        let nested = dir.path().join("app/src");
        assert_eq!(find_project_root(&nested).unwrap(), dir.path());
    }

    #[test]
    fn missing_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = find_project_root(dir.path()).unwrap_err();
        assert!(err.to_string().contains("kindle.toml"));
    }

    #[test]
    fn config_flag_selects_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        write_project(dir.path());
        let ws = Workspace::load(&global_for(dir.path())).unwrap();
        assert_eq!(ws.root, dir.path());
        assert_eq!(ws.project.target_ids().count(), 2);
        assert_eq!(ws.engine.data_dir, dir.path().join(".kindle"));
    }
}
