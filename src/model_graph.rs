use std::collections::HashMap;

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Dfs, Reversed};
use petgraph::Direction;

use crate::error::{LedgerError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// External input, e.g. the selected snapshot.
    Source,
    Model,
    /// Referenced as a dependency but never added.
    Undeclared,
}

/// Directed acyclic graph of named models.
///
/// Edges point from a dependency to the model that reads it, so `Outgoing`
/// walks downstream and `Incoming` walks upstream.
#[derive(Debug, Default)]
pub struct ModelGraph {
    graph: DiGraph<(String, NodeKind), ()>,
    /// Map from model name → NodeIndex for fast lookup.
    node_map: HashMap<String, NodeIndex>,
}

impl ModelGraph {
    pub fn new() -> Self {
        Self::default()
    }

    fn node(&mut self, name: &str, kind: NodeKind) -> NodeIndex {
        match self.node_map.get(name) {
            Some(&idx) => idx,
            None => {
                let idx = self.graph.add_node((name.to_string(), kind));
                self.node_map.insert(name.to_string(), idx);
                idx
            }
        }
    }

    fn declare(&mut self, name: &str, kind: NodeKind) -> Result<NodeIndex> {
        let idx = self.node(name, kind);
        let current = self.graph[idx].1;
        if current == NodeKind::Undeclared {
            self.graph[idx].1 = kind;
        } else if current != kind {
            return Err(LedgerError::InvalidData(format!(
                "'{name}' declared as both source and model"
            )));
        }
        Ok(idx)
    }

    pub fn add_source(&mut self, name: &str) -> Result<()> {
        self.declare(name, NodeKind::Source).map(|_| ())
    }

    /// Add a model reading from `depends_on`. Dependencies may be added later.
    pub fn add_model(&mut self, name: &str, depends_on: &[&str]) -> Result<()> {
        if let Some(&idx) = self.node_map.get(name) {
            if self.graph[idx].1 != NodeKind::Undeclared {
                return Err(LedgerError::InvalidData(format!("'{name}' defined twice")));
            }
        }
        let idx = self.declare(name, NodeKind::Model)?;
        for dep in depends_on {
            let dep_idx = self.node(dep, NodeKind::Undeclared);
            self.graph.update_edge(dep_idx, idx, ());
        }
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.node_map.contains_key(name)
    }

    fn index(&self, name: &str) -> Result<NodeIndex> {
        self.node_map
            .get(name)
            .copied()
            .ok_or_else(|| LedgerError::NotFound(format!("model '{name}'")))
    }

    fn name(&self, idx: NodeIndex) -> &str {
        &self.graph[idx].0
    }

    /// Models in dependency order. Cycles and undeclared dependencies are
    /// `InvalidData`.
    pub fn execution_order(&self) -> Result<Vec<String>> {
        if let Some(idx) = self
            .graph
            .node_indices()
            .find(|&i| self.graph[i].1 == NodeKind::Undeclared)
        {
            return Err(LedgerError::InvalidData(format!(
                "'{}' is referenced but never defined",
                self.name(idx)
            )));
        }
        let order = toposort(&self.graph, None).map_err(|cycle| {
            LedgerError::InvalidData(format!(
                "dependency cycle through '{}'",
                self.name(cycle.node_id())
            ))
        })?;
        Ok(order
            .into_iter()
            .filter(|&i| self.graph[i].1 == NodeKind::Model)
            .map(|i| self.name(i).to_string())
            .collect())
    }

    /// Direct dependencies of a model, sorted.
    pub fn dependencies(&self, name: &str) -> Result<Vec<String>> {
        let idx = self.index(name)?;
        let mut deps: Vec<String> = self
            .graph
            .neighbors_directed(idx, Direction::Incoming)
            .map(|i| self.name(i).to_string())
            .collect();
        deps.sort();
        Ok(deps)
    }

    /// Everything `name` reads from, directly or transitively.
    pub fn upstream(&self, name: &str) -> Result<Vec<String>> {
        self.lineage(name, Direction::Incoming)
    }

    /// Everything that reads from `name`, directly or transitively.
    pub fn downstream(&self, name: &str) -> Result<Vec<String>> {
        self.lineage(name, Direction::Outgoing)
    }

    fn lineage(&self, name: &str, direction: Direction) -> Result<Vec<String>> {
        let start = self.index(name)?;
        let mut reached = Vec::new();
        match direction {
            Direction::Outgoing => {
                let mut dfs = Dfs::new(&self.graph, start);
                while let Some(node) = dfs.next(&self.graph) {
                    reached.push(node);
                }
            }
            Direction::Incoming => {
                let reversed = Reversed(&self.graph);
                let mut dfs = Dfs::new(reversed, start);
                while let Some(node) = dfs.next(reversed) {
                    reached.push(node);
                }
            }
        }
        let mut names: Vec<String> = reached
            .into_iter()
            .filter(|&i| i != start)
            .map(|i| self.name(i).to_string())
            .collect();
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layered() -> ModelGraph {
        let mut g = ModelGraph::new();
        g.add_source("snapshot").unwrap();
        g.add_model("stg", &["snapshot"]).unwrap();
        g.add_model("int", &["stg"]).unwrap();
        g.add_model("mart_a", &["int"]).unwrap();
        g.add_model("mart_b", &["int", "stg"]).unwrap();
        g
    }

    #[test]
    fn execution_order_respects_dependencies() {
        let order = layered().execution_order().unwrap();
        let pos = |n: &str| order.iter().position(|x| x == n).unwrap();
        assert_eq!(order.len(), 4);
        assert!(pos("stg") < pos("int"));
        assert!(pos("int") < pos("mart_a"));
        assert!(pos("int") < pos("mart_b"));
    }

    #[test]
    fn lineage_walks_both_directions() {
        let g = layered();
        assert_eq!(g.upstream("mart_b").unwrap(), ["int", "snapshot", "stg"]);
        assert_eq!(g.downstream("stg").unwrap(), ["int", "mart_a", "mart_b"]);
        assert_eq!(g.dependencies("mart_b").unwrap(), ["int", "stg"]);
        assert!(matches!(g.upstream("nope"), Err(LedgerError::NotFound(_))));
    }

    #[test]
    fn forward_references_resolve() {
        let mut g = ModelGraph::new();
        g.add_model("b", &["a"]).unwrap();
        g.add_model("a", &[]).unwrap();
        assert_eq!(g.execution_order().unwrap(), ["a", "b"]);
    }

    #[test]
    fn cycles_are_rejected() {
        let mut g = ModelGraph::new();
        g.add_model("a", &["b"]).unwrap();
        g.add_model("b", &["a"]).unwrap();
        assert!(matches!(g.execution_order(), Err(LedgerError::InvalidData(_))));
    }

    #[test]
    fn undeclared_dependency_is_rejected() {
        let mut g = ModelGraph::new();
        g.add_model("a", &["missing"]).unwrap();
        let err = g.execution_order().unwrap_err();
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn duplicate_model_is_rejected() {
        let mut g = layered();
        assert!(g.add_model("stg", &["snapshot"]).is_err());
    }
}
