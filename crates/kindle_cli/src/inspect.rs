//! `kindle lookup` and `kindle inspect`: read-only views of the store.

use std::collections::BTreeSet;
use std::path::PathBuf;

use kindle_cache::{IncrementalCache, LookupStorage, LookupSymbol};
use kindle_common::TargetId;

use crate::workspace::Workspace;
use crate::GlobalArgs;

/// Runs the `kindle lookup` command.
pub fn run_lookup(
    name: &str,
    scope: &str,
    global: &GlobalArgs,
) -> Result<i32, Box<dyn std::error::Error>> {
    let ws = Workspace::load(global)?;
    if !ws.engine.is_precise() && !global.quiet {
        eprintln!("warning: lookup tracking is off; set `incremental.experimental = true` to record lookups");
    }
    let files = lookup_files(&ws, name, scope)?;
    if files.is_empty() {
        if !global.quiet {
            eprintln!("no recorded references to {scope}.{name}");
        }
        return Ok(0);
    }
    for file in files {
        println!("{}", file.display());
    }
    Ok(0)
}

/// Files recorded as referencing `name` in `scope`.
pub fn lookup_files(
    ws: &Workspace,
    name: &str,
    scope: &str,
) -> Result<BTreeSet<PathBuf>, Box<dyn std::error::Error>> {
    let storage = LookupStorage::open(&ws.data_paths().lookups_dir())?;
    Ok(storage.get(&LookupSymbol::new(name, scope)))
}

/// Runs the `kindle inspect` command.
pub fn run_inspect(target: &str, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let ws = Workspace::load(global)?;
    for line in describe_target(&ws, target)? {
        println!("{line}");
    }
    Ok(0)
}

/// One line per cached class, followed by indented inline functions and
/// constants.
pub fn describe_target(
    ws: &Workspace,
    target: &str,
) -> Result<Vec<String>, Box<dyn std::error::Error>> {
    let id = TargetId::new(target);
    if ws.project.target(&id).is_none() {
        return Err(format!("unknown target `{target}`").into());
    }
    let cache = IncrementalCache::open(&ws.data_paths(), id, false)?;
    if cache.is_empty() {
        return Ok(vec![format!("{target}: no cached classes")]);
    }

    let mut lines = Vec::new();
    for (name, entry) in cache.classes() {
        lines.push(format!(
            "{name} ({} members, from {})",
            entry.members.len(),
            entry
                .sources
                .iter()
                .map(|s| s.display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ));
        for function in entry.inline_functions.keys() {
            lines.push(format!("    inline {function}"));
        }
        for constant in entry.constants.keys() {
            lines.push(format!("    const {constant}"));
        }
    }
    Ok(lines)
}
