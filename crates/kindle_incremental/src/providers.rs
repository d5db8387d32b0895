//! Compiler argument providers.
//!
//! Providers are registered explicitly in [`EngineConfig`](crate::EngineConfig)
//! and consulted in registration order before every compile.

use crate::project::Target;

/// Contributes extra plugin options and plugin classpath entries.
pub trait ArgumentProvider: Send + Sync {
    /// Name shown in the info message announcing the provider.
    fn name(&self) -> &str;

    /// Plugin options to append for `target`.
    fn extra_arguments(&self, target: &Target) -> Vec<String>;

    /// Plugin classpath entries to append for `target`.
    fn classpath(&self, target: &Target) -> Vec<String>;
}

/// A provider returning the same arguments for every target.
#[derive(Debug, Clone)]
pub struct StaticArguments {
    name: String,
    arguments: Vec<String>,
    classpath: Vec<String>,
}

impl StaticArguments {
    /// Creates a provider named `name`.
    pub fn new(name: impl Into<String>, arguments: Vec<String>, classpath: Vec<String>) -> Self {
        Self {
            name: name.into(),
            arguments,
            classpath,
        }
    }
}

impl ArgumentProvider for StaticArguments {
    fn name(&self) -> &str {
        &self.name
    }

    fn extra_arguments(&self, _target: &Target) -> Vec<String> {
        self.arguments.clone()
    }

    fn classpath(&self, _target: &Target) -> Vec<String> {
        self.classpath.clone()
    }
}
