//! `kindle clean` removes the persistent store.

use std::path::Path;

use crate::workspace::Workspace;
use crate::GlobalArgs;

/// Runs the `kindle clean` command.
pub fn run(global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let ws = Workspace::load(global)?;
    let removed = remove_data_dir(&ws.root, &ws.engine.data_dir)?;
    if !global.quiet {
        if removed {
            eprintln!("    Removed {}", ws.engine.data_dir.display());
        } else {
            eprintln!("    Nothing to clean");
        }
    }
    Ok(0)
}

/// Deletes `data_dir` if it exists. Returns whether anything was removed.
///
/// Refuses to delete the project root itself.
pub fn remove_data_dir(root: &Path, data_dir: &Path) -> Result<bool, Box<dyn std::error::Error>> {
    if root.starts_with(data_dir) {
        return Err(format!(
            "data directory {} contains the project; refusing to remove it",
            data_dir.display()
        )
        .into());
    }
    if !data_dir.exists() {
        return Ok(false);
    }
    tracing::debug!(dir = %data_dir.display(), "removing data directory");
    std::fs::remove_dir_all(data_dir)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removes_existing_data_dir_once() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join(".kindle");
        std::fs::create_dir_all(data.join("targets/core")).unwrap();
        std::fs::write(data.join("targets/core/cache.bin"), b"x").unwrap();

        assert!(remove_data_dir(dir.path(), &data).unwrap());
        assert!(!data.exists());
        assert!(!remove_data_dir(dir.path(), &data).unwrap());
    }

    #[test]
    fn refuses_to_remove_project_root() {
        let dir = tempfile::tempdir().unwrap();
        assert!(remove_data_dir(dir.path(), dir.path()).is_err());
        assert!(dir.path().exists());
    }
}
