//! Configuration types deserialized from `kindle.toml`.

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;

/// The top-level project configuration parsed from `kindle.toml`.
#[derive(Debug, Deserialize)]
pub struct ProjectConfig {
    /// Core project metadata.
    pub project: ProjectMeta,
    /// Incremental compilation settings.
    #[serde(default)]
    pub incremental: IncrementalConfig,
    /// Which files count as compilable sources.
    #[serde(default)]
    pub sources: SourcesConfig,
    /// Arguments forwarded to the external compiler.
    #[serde(default)]
    pub compiler: CompilerConfig,
    /// Named build targets (modules).
    #[serde(default)]
    pub targets: BTreeMap<String, TargetConfig>,
}

/// Core project metadata.
#[derive(Debug, Deserialize)]
pub struct ProjectMeta {
    /// The project name.
    pub name: String,
}

/// Incremental compilation switches.
#[derive(Debug, Deserialize)]
pub struct IncrementalConfig {
    /// Whether caches are maintained and changes propagated at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Whether precise, lookup-based propagation replaces the coarse strategy.
    #[serde(default)]
    pub experimental: bool,
    /// Root of the persistent store, relative to the project directory.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

impl Default for IncrementalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            experimental: false,
            data_dir: default_data_dir(),
        }
    }
}

impl IncrementalConfig {
    /// Returns the propagation strategy selected by these settings.
    pub fn propagation_mode(&self) -> PropagationMode {
        if self.experimental {
            PropagationMode::Precise
        } else {
            PropagationMode::Coarse
        }
    }
}

/// Strategy used to turn a round's changes into next-round dirty files.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PropagationMode {
    /// Whole-chunk over-approximation (the default).
    #[default]
    Coarse,
    /// Lookup-indexed propagation.
    Precise,
}

/// Source file selection.
#[derive(Debug, Deserialize)]
pub struct SourcesConfig {
    /// File extensions (without the dot) handled by the compiler.
    #[serde(default = "default_extensions", deserialize_with = "deserialize_string_or_vec")]
    pub extensions: Vec<String>,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            extensions: default_extensions(),
        }
    }
}

/// Arguments passed through to the external compiler.
#[derive(Debug, Default, Deserialize)]
pub struct CompilerConfig {
    /// Classpath entries.
    #[serde(default)]
    pub classpath: Vec<String>,
    /// Compiler plugin options.
    #[serde(default)]
    pub plugin_options: Vec<String>,
    /// Compiler plugin classpath entries.
    #[serde(default)]
    pub plugin_classpath: Vec<String>,
}

/// Configuration for a single build target.
#[derive(Debug, Deserialize)]
pub struct TargetConfig {
    /// Source roots, relative to the project directory.
    ///
    /// Accepts either a single string or a list of strings.
    #[serde(deserialize_with = "deserialize_string_or_vec")]
    pub sources: Vec<String>,
    /// Output directory, relative to the project directory.
    pub output: String,
    /// Names of the targets this target depends on.
    #[serde(default)]
    pub dependencies: Vec<String>,
}

fn default_true() -> bool {
    true
}

fn default_data_dir() -> String {
    ".kindle".to_string()
}

fn default_extensions() -> Vec<String> {
    vec!["kt".to_string()]
}

/// Deserializes a field that can be either a single string or a list of strings.
fn deserialize_string_or_vec<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    struct StringOrVec;

    impl<'de> Visitor<'de> for StringOrVec {
        type Value = Vec<String>;

        fn expecting(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            formatter.write_str("a string or a list of strings")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
            Ok(vec![v.to_string()])
        }

        fn visit_seq<A: de::SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
            let mut vec = Vec::new();
            while let Some(val) = seq.next_element::<String>()? {
                vec.push(val);
            }
            Ok(vec)
        }
    }

    deserializer.deserialize_any(StringOrVec)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incremental_defaults() {
        let inc = IncrementalConfig::default();
        assert!(inc.enabled);
        assert!(!inc.experimental);
        assert_eq!(inc.data_dir, ".kindle");
        assert_eq!(inc.propagation_mode(), PropagationMode::Coarse);
    }

    #[test]
    fn experimental_selects_precise() {
        let inc: IncrementalConfig = toml::from_str("experimental = true").unwrap();
        assert!(inc.enabled);
        assert_eq!(inc.propagation_mode(), PropagationMode::Precise);
    }

    #[test]
    fn target_sources_single_string() {
        let t: TargetConfig = toml::from_str(
            r#"
sources = "core/src"
output = "out/core"
"#,
        )
        .unwrap();
        assert_eq!(t.sources, vec!["core/src"]);
        assert!(t.dependencies.is_empty());
    }

    #[test]
    fn target_sources_list() {
        let t: TargetConfig = toml::from_str(
            r#"
sources = ["app/src", "app/gen"]
output = "out/app"
dependencies = ["core"]
"#,
        )
        .unwrap();
        assert_eq!(t.sources.len(), 2);
        assert_eq!(t.dependencies, vec!["core"]);
    }

    #[test]
    fn sources_default_extension() {
        assert_eq!(SourcesConfig::default().extensions, vec!["kt"]);
    }
}
