//! Configuration file loading and validation.

use crate::error::ConfigError;
use crate::types::ProjectConfig;
use std::path::Path;

/// Name of the configuration file at the project root.
pub const CONFIG_FILE: &str = "kindle.toml";

/// Loads and validates a `kindle.toml` configuration from a project directory.
pub fn load_config(project_dir: &Path) -> Result<ProjectConfig, ConfigError> {
    let config_path = project_dir.join(CONFIG_FILE);
    let content = std::fs::read_to_string(&config_path)?;
    load_config_from_str(&content)
}

/// Parses and validates a `kindle.toml` configuration from a string.
///
/// Useful for testing without filesystem dependencies.
pub fn load_config_from_str(content: &str) -> Result<ProjectConfig, ConfigError> {
    let config: ProjectConfig =
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    validate_config(&config)?;
    Ok(config)
}

/// Validates that required fields are present, target references resolve,
/// and no source root is shared between targets.
fn validate_config(config: &ProjectConfig) -> Result<(), ConfigError> {
    if config.project.name.is_empty() {
        return Err(ConfigError::MissingField("project.name".to_string()));
    }
    if config.sources.extensions.is_empty() {
        return Err(ConfigError::ValidationError(
            "sources.extensions must name at least one extension".to_string(),
        ));
    }
    for (name, target) in &config.targets {
        if target.sources.is_empty() {
            return Err(ConfigError::MissingField(format!("targets.{name}.sources")));
        }
        for dep in &target.dependencies {
            if !config.targets.contains_key(dep) {
                return Err(ConfigError::UnknownDependency {
                    target: name.clone(),
                    dependency: dep.clone(),
                });
            }
        }
    }
    check_source_overlap(config)
}

/// Rejects a source root that equals or contains a root of another target.
fn check_source_overlap(config: &ProjectConfig) -> Result<(), ConfigError> {
    let roots: Vec<(&str, &Path)> = config
        .targets
        .iter()
        .flat_map(|(name, target)| {
            target
                .sources
                .iter()
                .map(move |s| (name.as_str(), Path::new(s.as_str())))
        })
        .collect();
    for (i, &(first, a)) in roots.iter().enumerate() {
        for &(second, b) in &roots[i + 1..] {
            if first == second {
                continue;
            }
            let inner = if a.starts_with(b) {
                a
            } else if b.starts_with(a) {
                b
            } else {
                continue;
            };
            return Err(ConfigError::OverlappingSources {
                first: first.to_string(),
                second: second.to_string(),
                path: inner.display().to_string(),
            });
        }
    }
    Ok(())
}
