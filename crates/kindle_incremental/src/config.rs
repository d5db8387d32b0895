//! Engine settings.

use std::fmt;
use std::path::{Path, PathBuf};

use kindle_config::{ProjectConfig, PropagationMode};

use crate::providers::ArgumentProvider;

/// Upper bound on rounds per chunk before the engine reports a defect.
pub const DEFAULT_MAX_ROUNDS: usize = 100;

/// Everything the engine reads from configuration.
pub struct EngineConfig {
    /// Whether caches are maintained and changes propagated.
    pub incremental_enabled: bool,
    /// Propagation strategy.
    pub mode: PropagationMode,
    /// Root of the persistent store.
    pub data_dir: PathBuf,
    /// Compilation classpath.
    pub classpath: Vec<String>,
    /// Configured plugin options.
    pub plugin_options: Vec<String>,
    /// Configured plugin classpath.
    pub plugin_classpath: Vec<String>,
    /// Argument providers, consulted in order.
    pub providers: Vec<Box<dyn ArgumentProvider>>,
    /// Rounds allowed per chunk by [`RoundController::build_chunk`](crate::RoundController::build_chunk).
    pub max_rounds: usize,
}

impl EngineConfig {
    /// Default settings storing data under `data_dir`.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            incremental_enabled: true,
            mode: PropagationMode::Coarse,
            data_dir: data_dir.into(),
            classpath: Vec::new(),
            plugin_options: Vec::new(),
            plugin_classpath: Vec::new(),
            providers: Vec::new(),
            max_rounds: DEFAULT_MAX_ROUNDS,
        }
    }

    /// Settings from a loaded `kindle.toml` at `root`.
    pub fn from_project_config(root: &Path, config: &ProjectConfig) -> Self {
        Self {
            incremental_enabled: config.incremental.enabled,
            mode: config.incremental.propagation_mode(),
            data_dir: root.join(&config.incremental.data_dir),
            classpath: config.compiler.classpath.clone(),
            plugin_options: config.compiler.plugin_options.clone(),
            plugin_classpath: config.compiler.plugin_classpath.clone(),
            providers: Vec::new(),
            max_rounds: DEFAULT_MAX_ROUNDS,
        }
    }

    /// Sets the propagation strategy.
    pub fn with_mode(mut self, mode: PropagationMode) -> Self {
        self.mode = mode;
        self
    }

    /// Turns incremental tracking on or off.
    pub fn with_incremental(mut self, enabled: bool) -> Self {
        self.incremental_enabled = enabled;
        self
    }

    /// Registers an argument provider.
    pub fn with_provider(mut self, provider: impl ArgumentProvider + 'static) -> Self {
        self.providers.push(Box::new(provider));
        self
    }

    /// Returns `true` when precise propagation is active.
    pub fn is_precise(&self) -> bool {
        self.incremental_enabled && self.mode == PropagationMode::Precise
    }
}

impl fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineConfig")
            .field("incremental_enabled", &self.incremental_enabled)
            .field("mode", &self.mode)
            .field("data_dir", &self.data_dir)
            .field("providers", &self.providers.iter().map(|p| p.name()).collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::StaticArguments;

    #[test]
    fn from_project_config_reads_settings() {
        let config = kindle_config::load_config_from_str(
            r#"
[project]
name = "demo"

[incremental]
experimental = true
data_dir = "build/state"

[compiler]
classpath = ["lib/a.jar"]

[targets.core]
sources = "src"
output = "out"
"#,
        )
        .unwrap();
        let engine = EngineConfig::from_project_config(Path::new("/p"), &config);
        assert!(engine.is_precise());
        assert_eq!(engine.data_dir, PathBuf::from("/p/build/state"));
        assert_eq!(engine.classpath, vec!["lib/a.jar".to_string()]);
    }

    #[test]
    fn precise_requires_incremental() {
        let engine = EngineConfig::new("/tmp/k")
            .with_mode(PropagationMode::Precise)
            .with_incremental(false);
        assert!(!engine.is_precise());
    }

    #[test]
    fn providers_keep_registration_order() {
        let engine = EngineConfig::new("/tmp/k")
            .with_provider(StaticArguments::new("first", vec![], vec![]))
            .with_provider(StaticArguments::new("second", vec![], vec![]));
        let names: Vec<&str> = engine.providers.iter().map(|p| p.name()).collect();
        assert_eq!(names, ["first", "second"]);
    }
}
