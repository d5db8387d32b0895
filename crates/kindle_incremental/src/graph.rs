//! Project-wide target dependency graph.
//!
//! Edges point from a target to each of its dependencies. The graph
//! answers two questions: which targets transitively depend on a chunk
//! (so their caches can be wired as dependents), and how the project
//! splits into chunks of mutually dependent targets.

use std::collections::{BTreeMap, BTreeSet};

use kindle_cache::{CacheError, CacheSet, DataPaths, IncrementalCache};
use kindle_common::TargetId;
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Dfs, Reversed};
use tracing::debug;

use crate::project::{Chunk, Project};

/// Target dependency graph of a project.
pub struct DependencyGraph {
    graph: DiGraph<TargetId, ()>,
    nodes: BTreeMap<TargetId, NodeIndex>,
}

impl DependencyGraph {
    /// Builds the graph of `project`. Dependencies on unknown targets are
    /// ignored.
    pub fn from_project(project: &Project) -> Self {
        let mut graph = DiGraph::new();
        let mut nodes = BTreeMap::new();
        for id in project.target_ids() {
            nodes.insert(id.clone(), graph.add_node(id.clone()));
        }
        for target in project.targets() {
            let from = nodes[&target.id];
            for dependency in &target.dependencies {
                if let Some(&to) = nodes.get(dependency) {
                    graph.update_edge(from, to, ());
                }
            }
        }
        Self { graph, nodes }
    }

    /// Targets that transitively depend on `target`, excluding itself.
    pub fn dependents_of(&self, target: &TargetId) -> BTreeSet<TargetId> {
        let Some(&start) = self.nodes.get(target) else {
            return BTreeSet::new();
        };
        let reversed = Reversed(&self.graph);
        let mut dfs = Dfs::new(reversed, start);
        let mut dependents = BTreeSet::new();
        while let Some(node) = dfs.next(reversed) {
            if node != start {
                dependents.insert(self.graph[node].clone());
            }
        }
        dependents
    }

    /// Splits the project into chunks of mutually dependent targets,
    /// dependencies first.
    pub fn chunks(&self) -> Vec<Chunk> {
        tarjan_scc(&self.graph)
            .into_iter()
            .map(|component| {
                let mut ids: Vec<TargetId> =
                    component.into_iter().map(|n| self.graph[n].clone()).collect();
                ids.sort();
                Chunk::from_sorted(ids)
            })
            .collect()
    }

    /// Opens the caches relevant to `chunk` and wires dependents.
    ///
    /// The returned set holds a cache for every chunk target and a read-only
    /// snapshot for every other target transitively depending on one. Each
    /// chunk target's cache lists those dependents; dependencies outside
    /// that closure play no part in propagation and are not opened.
    pub fn build_dependent_caches(
        &self,
        chunk: &Chunk,
        paths: &DataPaths,
        track_members: bool,
    ) -> Result<CacheSet, CacheError> {
        let mut wiring: BTreeMap<TargetId, BTreeSet<TargetId>> = BTreeMap::new();
        let mut closure: BTreeSet<TargetId> = chunk.targets().iter().cloned().collect();
        for target in chunk.targets() {
            let dependents = self.dependents_of(target);
            closure.extend(dependents.iter().cloned());
            wiring.insert(target.clone(), dependents);
        }

        let mut caches = CacheSet::new();
        for target in &closure {
            let cache = IncrementalCache::open(paths, target.clone(), track_members)?;
            if chunk.targets().contains(target) {
                caches.insert(cache);
            } else {
                caches.insert_snapshot(cache);
            }
        }
        for (target, dependents) in &wiring {
            for dependent in dependents {
                caches.wire_dependent(target, dependent);
            }
        }
        debug!(
            chunk = %chunk.display_names(),
            caches = caches.len(),
            "opened incremental caches"
        );
        Ok(caches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::Target;

    fn project() -> Project {
        // app -> lib -> core, tool -> core, a <-> b
        Project::new(
            [
                Target::new("core", "out/core"),
                Target::new("lib", "out/lib").depends_on("core"),
                Target::new("app", "out/app").depends_on("lib"),
                Target::new("tool", "out/tool").depends_on("core"),
                Target::new("a", "out/a").depends_on("b"),
                Target::new("b", "out/b").depends_on("a"),
            ],
            vec!["kt".to_string()],
        )
        .unwrap()
    }

    fn ids(names: &[&str]) -> BTreeSet<TargetId> {
        names.iter().map(|n| TargetId::new(*n)).collect()
    }

    #[test]
    fn dependents_are_transitive() {
        let graph = DependencyGraph::from_project(&project());
        assert_eq!(
            graph.dependents_of(&TargetId::new("core")),
            ids(&["app", "lib", "tool"])
        );
        assert_eq!(graph.dependents_of(&TargetId::new("app")), ids(&[]));
    }

    #[test]
    fn cycles_form_one_chunk() {
        let graph = DependencyGraph::from_project(&project());
        let chunks = graph.chunks();
        let cyclic = chunks.iter().find(|c| c.len() == 2).unwrap();
        assert_eq!(cyclic.targets(), &[TargetId::new("a"), TargetId::new("b")]);

        let position = |name: &str| {
            chunks
                .iter()
                .position(|c| c.contains(&TargetId::new(name)))
                .unwrap()
        };
        assert!(position("core") < position("lib"));
        assert!(position("lib") < position("app"));
    }

    #[test]
    fn caches_cover_chunk_and_dependents() {
        let dir = tempfile::tempdir().unwrap();
        let graph = DependencyGraph::from_project(&project());
        let caches = graph
            .build_dependent_caches(
                &Chunk::single(TargetId::new("lib")),
                &DataPaths::new(dir.path()),
                false,
            )
            .unwrap();

        let opened: BTreeSet<TargetId> = caches.targets().cloned().collect();
        assert_eq!(opened, ids(&["app", "lib"]));
        assert_eq!(
            caches.get(&TargetId::new("lib")).unwrap().dependents(),
            &[TargetId::new("app")]
        );
        assert!(caches.get(&TargetId::new("app")).unwrap().dependents().is_empty());
        assert!(caches.is_snapshot(&TargetId::new("app")));
        assert!(!caches.is_snapshot(&TargetId::new("lib")));
    }
}
