//! Stage registry
//!
//! Static, validated set of stages. Declaration order doubles as execution
//! order, so [`StageRegistry::new`] rejects any registry where that order is
//! not a topological order of the dependency graph.

use crate::criteria::SuccessCriteria;
use crate::error::ConfigError;
use crate::types::{Stage, StageId, StageKind};
use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use petgraph::Direction;
use std::collections::HashMap;
use std::time::Duration;

/// Validated stage registry
#[derive(Debug, Clone)]
pub struct StageRegistry {
    stages: Vec<Stage>,
    index: HashMap<StageId, usize>,
    /// Edges run dependency -> dependent, nodes are indices into `stages`
    graph: DiGraphMap<usize, ()>,
}

impl StageRegistry {
    /// Build and validate a registry
    ///
    /// # Errors
    /// - `ConfigError::EmptyRegistry` with no stages
    /// - `ConfigError::DuplicateStage` for repeated ids
    /// - `ConfigError::UnknownDependency` for dangling dependency ids
    /// - `ConfigError::CycleDetected` for cyclic dependencies
    /// - `ConfigError::OutOfOrder` when a dependency is declared after its dependent
    /// - `ConfigError::InvalidCriteria` for unsatisfiable criteria
    pub fn new(stages: Vec<Stage>) -> Result<Self, ConfigError> {
        if stages.is_empty() {
            return Err(ConfigError::EmptyRegistry);
        }

        let mut index = HashMap::with_capacity(stages.len());
        for (i, stage) in stages.iter().enumerate() {
            if index.insert(stage.id.clone(), i).is_some() {
                return Err(ConfigError::DuplicateStage(stage.id.to_string()));
            }
            stage.success_criteria.validate(stage.id.as_str())?;
        }

        let mut graph = DiGraphMap::new();
        for (i, stage) in stages.iter().enumerate() {
            graph.add_node(i);
            for dep in &stage.dependencies {
                let &d = index.get(dep).ok_or_else(|| ConfigError::UnknownDependency {
                    stage: stage.id.to_string(),
                    dependency: dep.to_string(),
                })?;
                if d == i {
                    return Err(ConfigError::CycleDetected(stage.id.to_string()));
                }
                graph.add_edge(d, i, ());
            }
        }

        if let Err(cycle) = toposort(&graph, None) {
            return Err(ConfigError::CycleDetected(
                stages[cycle.node_id()].id.to_string(),
            ));
        }

        for (i, stage) in stages.iter().enumerate() {
            for dep in &stage.dependencies {
                if index[dep] > i {
                    return Err(ConfigError::OutOfOrder {
                        stage: stage.id.to_string(),
                        dependency: dep.to_string(),
                    });
                }
            }
        }

        Ok(Self {
            stages,
            index,
            graph,
        })
    }

    /// Look up a stage
    #[must_use]
    pub fn get_stage(&self, id: &str) -> Option<&Stage> {
        self.index.get(id).map(|&i| &self.stages[i])
    }

    /// Stages in declaration (execution) order
    #[inline]
    #[must_use]
    pub fn list_stages(&self) -> &[Stage] {
        &self.stages
    }

    /// First stage covering a kind
    #[must_use]
    pub fn stage_for_kind(&self, kind: StageKind) -> Option<&Stage> {
        self.stages.iter().find(|s| s.kind == kind)
    }

    /// Stages that directly depend on `id`
    #[must_use]
    pub fn dependents(&self, id: &str) -> Vec<&Stage> {
        let Some(&i) = self.index.get(id) else {
            return Vec::new();
        };
        let mut out: Vec<usize> = self
            .graph
            .neighbors_directed(i, Direction::Outgoing)
            .collect();
        out.sort_unstable();
        out.into_iter().map(|j| &self.stages[j]).collect()
    }

    /// Number of stages
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Always false for a constructed registry
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl Default for StageRegistry {
    /// tables -> functions -> endpoints, and tables -> references
    fn default() -> Self {
        let stages = vec![
            Stage::new("tables", "Table validation", StageKind::Tables)
                .with_criteria(SuccessCriteria::min_pass_rate(95.0))
                .with_estimated_duration(Duration::from_secs(30)),
            Stage::new("functions", "Function validation", StageKind::Functions)
                .depends_on("tables")
                .with_criteria(SuccessCriteria::min_pass_rate(90.0))
                .with_estimated_duration(Duration::from_secs(120)),
            Stage::new("endpoints", "Endpoint validation", StageKind::Endpoints)
                .depends_on("functions")
                .with_criteria(SuccessCriteria::min_pass_rate(90.0))
                .with_estimated_duration(Duration::from_secs(180)),
            Stage::new("references", "Reference validation", StageKind::References)
                .depends_on("tables")
                .with_criteria(SuccessCriteria::min_pass_rate(95.0))
                .with_estimated_duration(Duration::from_secs(60)),
        ];
        match Self::new(stages) {
            Ok(registry) => registry,
            Err(e) => unreachable!("built-in registry is valid: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stage(id: &str) -> Stage {
        Stage::new(id, id, StageKind::Tables)
    }

    #[test]
    fn default_registry_is_ordered() {
        let registry = StageRegistry::default();
        let ids: Vec<&str> = registry.list_stages().iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, ["tables", "functions", "endpoints", "references"]);
        assert!(registry.get_stage("functions").unwrap().dependencies.contains("tables"));
        assert_eq!(
            registry.stage_for_kind(StageKind::References).unwrap().id.as_str(),
            "references"
        );
    }

    #[test]
    fn dependents_of_tables() {
        let registry = StageRegistry::default();
        let ids: Vec<&str> = registry
            .dependents("tables")
            .iter()
            .map(|s| s.id.as_str())
            .collect();
        assert_eq!(ids, ["functions", "references"]);
        assert!(registry.dependents("missing").is_empty());
    }

    #[test]
    fn rejects_duplicates() {
        let err = StageRegistry::new(vec![stage("a"), stage("a")]).unwrap_err();
        assert_eq!(err, ConfigError::DuplicateStage("a".to_string()));
    }

    #[test]
    fn rejects_unknown_dependency() {
        let err = StageRegistry::new(vec![stage("a").depends_on("ghost")]).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownDependency { .. }));
    }

    #[test]
    fn rejects_self_dependency() {
        let err = StageRegistry::new(vec![stage("a").depends_on("a")]).unwrap_err();
        assert_eq!(err, ConfigError::CycleDetected("a".to_string()));
    }

    #[test]
    fn rejects_cycle() {
        let err = StageRegistry::new(vec![
            stage("a").depends_on("b"),
            stage("b").depends_on("a"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::CycleDetected(_)));
    }

    #[test]
    fn rejects_out_of_order_declaration() {
        let err = StageRegistry::new(vec![stage("b").depends_on("a"), stage("a")]).unwrap_err();
        assert_eq!(
            err,
            ConfigError::OutOfOrder {
                stage: "b".to_string(),
                dependency: "a".to_string(),
            }
        );
    }

    #[test]
    fn rejects_empty() {
        assert_eq!(
            StageRegistry::new(Vec::new()).unwrap_err(),
            ConfigError::EmptyRegistry
        );
    }
}
