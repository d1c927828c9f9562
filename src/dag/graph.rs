// src/dag/graph.rs

use std::collections::{HashMap, HashSet, VecDeque};

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use tracing::{debug, warn};

use crate::config::model::ConfigFile;
use crate::errors::{ProcdagError, Result};
use crate::types::NodeName;

/// Internal node structure: stores immediate prerequisites and dependents.
#[derive(Debug, Clone)]
struct GraphNode {
    /// Direct prerequisites, deduplicated, in configured order.
    prereqs: Vec<NodeName>,
    /// Direct dependents (nodes that list this one as a prerequisite), in
    /// declaration order.
    dependents: Vec<NodeName>,
}

/// In-degree bookkeeping over a prerequisite map.
///
/// Each node starts with an in-degree equal to the number of its
/// prerequisites. [`GraphModel::mark_completed`] decrements the in-degree of
/// every dependent and hands back the ones that just reached zero, so every
/// node is reported ready at most once.
///
/// Declaration order (the iteration order of the map this was built from)
/// is the tie-break order for everything this type returns.
#[derive(Debug, Clone)]
pub struct GraphModel {
    order: Vec<NodeName>,
    nodes: HashMap<NodeName, GraphNode>,
    in_degree: HashMap<NodeName, usize>,
    completed: HashSet<NodeName>,
}

impl GraphModel {
    /// Build from `(node, prerequisites)` pairs.
    ///
    /// Prerequisites that are not themselves declared are kept: they count
    /// towards the in-degree (so the node can never become ready) and are
    /// reported by [`GraphModel::validate`].
    pub fn from_prerequisites<I, P>(entries: I) -> Self
    where
        I: IntoIterator<Item = (NodeName, P)>,
        P: IntoIterator<Item = NodeName>,
    {
        let mut order = Vec::new();
        let mut nodes: HashMap<NodeName, GraphNode> = HashMap::new();

        // First pass: create nodes with their prerequisite lists.
        for (name, prereqs) in entries {
            if nodes.contains_key(&name) {
                warn!(node = %name, "duplicate node declaration; keeping the first");
                continue;
            }

            let mut seen = HashSet::new();
            let prereqs: Vec<NodeName> = prereqs
                .into_iter()
                .filter(|p| seen.insert(p.clone()))
                .collect();

            order.push(name.clone());
            nodes.insert(
                name,
                GraphNode {
                    prereqs,
                    dependents: Vec::new(),
                },
            );
        }

        // Second pass: populate dependents in declaration order.
        for name in &order {
            let prereqs = nodes
                .get(name)
                .map(|n| n.prereqs.clone())
                .unwrap_or_default();

            for prereq in prereqs {
                if let Some(prereq_node) = nodes.get_mut(&prereq) {
                    prereq_node.dependents.push(name.clone());
                }
            }
        }

        let in_degree = nodes
            .iter()
            .map(|(name, node)| (name.clone(), node.prereqs.len()))
            .collect();

        Self {
            order,
            nodes,
            in_degree,
            completed: HashSet::new(),
        }
    }

    /// Build from the `[node.*]` sections of a validated [`ConfigFile`].
    pub fn from_config(cfg: &ConfigFile) -> Self {
        Self::from_prerequisites(cfg.prerequisites())
    }

    /// All node names in declaration order.
    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    /// Immediate prerequisites of a node (its `in = [...]` list).
    pub fn prerequisites_of(&self, name: &str) -> &[NodeName] {
        self.nodes
            .get(name)
            .map(|n| n.prereqs.as_slice())
            .unwrap_or(&[])
    }

    /// Immediate dependents of a node.
    pub fn dependents_of(&self, name: &str) -> &[NodeName] {
        self.nodes
            .get(name)
            .map(|n| n.dependents.as_slice())
            .unwrap_or(&[])
    }

    /// Current count of unmet prerequisites.
    pub fn in_degree(&self, name: &str) -> Option<usize> {
        self.in_degree.get(name).copied()
    }

    /// Nodes with no prerequisites at all, in declaration order.
    pub fn initial_ready_set(&self) -> Vec<NodeName> {
        self.order
            .iter()
            .filter(|name| self.prerequisites_of(name).is_empty())
            .cloned()
            .collect()
    }

    /// Record `node` as completed and return the dependents whose in-degree
    /// just reached zero, in declaration order.
    ///
    /// Must be called exactly once per node; a second call is rejected with
    /// [`ProcdagError::DuplicateCompletion`] and changes nothing.
    pub fn mark_completed(&mut self, node: &str) -> Result<Vec<NodeName>> {
        let dependents = match self.nodes.get(node) {
            Some(n) => n.dependents.clone(),
            None => return Err(ProcdagError::UnknownNode(node.to_string())),
        };

        if !self.completed.insert(node.to_string()) {
            return Err(ProcdagError::DuplicateCompletion(node.to_string()));
        }

        let mut newly_ready = Vec::new();
        for dependent in dependents {
            if let Some(degree) = self.in_degree.get_mut(&dependent) {
                *degree = degree.saturating_sub(1);
                if *degree == 0 {
                    debug!(node = %dependent, after = %node, "in-degree reached zero");
                    newly_ready.push(dependent);
                }
            }
        }

        Ok(newly_ready)
    }

    /// True iff every node is in `completed`.
    pub fn is_fully_resolved(&self, completed: &HashSet<NodeName>) -> bool {
        self.order.iter().all(|name| completed.contains(name))
    }

    /// Nodes not in `completed`, in declaration order.
    pub fn unresolved(&self, completed: &HashSet<NodeName>) -> Vec<NodeName> {
        self.order
            .iter()
            .filter(|name| !completed.contains(*name))
            .cloned()
            .collect()
    }

    /// Check for undeclared prerequisites, self-dependencies and cycles.
    ///
    /// All three leave some node with a residual in-degree forever, so they
    /// are reported as [`ProcdagError::GraphStructure`].
    pub fn validate(&self) -> Result<()> {
        for name in &self.order {
            for prereq in self.prerequisites_of(name) {
                if prereq == name {
                    return Err(ProcdagError::GraphStructure(format!(
                        "node '{}' lists itself as a prerequisite",
                        name
                    )));
                }
                if !self.nodes.contains_key(prereq) {
                    return Err(ProcdagError::GraphStructure(format!(
                        "node '{}' depends on undeclared prerequisite '{}'",
                        name, prereq
                    )));
                }
            }
        }

        // Edge direction: prereq -> node.
        let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
        for name in &self.order {
            graph.add_node(name.as_str());
        }
        for name in &self.order {
            for prereq in self.prerequisites_of(name) {
                graph.add_edge(prereq.as_str(), name.as_str(), ());
            }
        }

        // A topological sort will fail if there is a cycle.
        match toposort(&graph, None) {
            Ok(_order) => Ok(()),
            Err(cycle) => Err(ProcdagError::GraphStructure(format!(
                "cycle detected in node graph involving node '{}'",
                cycle.node_id()
            ))),
        }
    }

    /// The order nodes would launch in if each completed instantly, one at a
    /// time: Kahn's algorithm with declaration-order tie-breaks.
    ///
    /// Works on a fresh copy of the in-degree map, so it can be called on a
    /// model that is mid-run. Fails on graphs that [`GraphModel::validate`]
    /// rejects.
    pub fn launch_order(&self) -> Result<Vec<NodeName>> {
        self.validate()?;

        let mut scratch = Self::from_prerequisites(
            self.order
                .iter()
                .map(|name| (name.clone(), self.prerequisites_of(name).to_vec())),
        );
        let mut queue: VecDeque<NodeName> = scratch.initial_ready_set().into();
        let mut out = Vec::with_capacity(self.order.len());

        while let Some(name) = queue.pop_front() {
            queue.extend(scratch.mark_completed(&name)?);
            out.push(name);
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diamond() -> GraphModel {
        GraphModel::from_prerequisites(vec![
            ("A".to_string(), vec![]),
            ("B".to_string(), vec!["A".to_string()]),
            ("C".to_string(), vec!["A".to_string()]),
            ("D".to_string(), vec!["B".to_string(), "C".to_string()]),
        ])
    }

    #[test]
    fn initial_ready_set_is_roots_in_declaration_order() {
        let graph = GraphModel::from_prerequisites(vec![
            ("z".to_string(), vec![]),
            ("m".to_string(), vec!["z".to_string()]),
            ("a".to_string(), vec![]),
        ]);
        assert_eq!(graph.initial_ready_set(), vec!["z", "a"]);
    }

    #[test]
    fn mark_completed_releases_dependents_once() {
        let mut graph = diamond();
        assert_eq!(graph.dependents_of("A"), ["B", "C"]);
        assert_eq!(graph.prerequisites_of("D"), ["B", "C"]);
        assert!(graph.dependents_of("D").is_empty());

        assert_eq!(graph.mark_completed("A").unwrap(), vec!["B", "C"]);
        assert_eq!(graph.mark_completed("B").unwrap(), Vec::<String>::new());
        assert_eq!(graph.in_degree("D"), Some(1));
        assert_eq!(graph.mark_completed("C").unwrap(), vec!["D"]);
        assert_eq!(graph.mark_completed("D").unwrap(), Vec::<String>::new());
    }

    #[test]
    fn mark_completed_rejects_unknown_and_duplicate_nodes() {
        let mut graph = diamond();

        assert!(matches!(
            graph.mark_completed("nope"),
            Err(ProcdagError::UnknownNode(n)) if n == "nope"
        ));

        graph.mark_completed("A").unwrap();
        assert!(matches!(
            graph.mark_completed("A"),
            Err(ProcdagError::DuplicateCompletion(n)) if n == "A"
        ));
        // The rejected call must not decrement dependents a second time.
        assert_eq!(graph.in_degree("B"), Some(0));
        assert_eq!(graph.in_degree("D"), Some(2));
    }

    #[test]
    fn duplicate_prerequisites_count_once() {
        let mut graph = GraphModel::from_prerequisites(vec![
            ("A".to_string(), vec![]),
            ("B".to_string(), vec!["A".to_string(), "A".to_string()]),
        ]);
        assert_eq!(graph.in_degree("B"), Some(1));
        assert_eq!(graph.mark_completed("A").unwrap(), vec!["B"]);
    }

    #[test]
    fn fully_resolved_requires_every_node() {
        let graph = diamond();
        let mut done: HashSet<NodeName> = ["A", "B", "C"].iter().map(|s| s.to_string()).collect();
        assert!(!graph.is_fully_resolved(&done));
        assert_eq!(graph.unresolved(&done), vec!["D"]);
        done.insert("D".to_string());
        assert!(graph.is_fully_resolved(&done));
    }

    #[test]
    fn validate_reports_cycle() {
        let graph = GraphModel::from_prerequisites(vec![
            ("A".to_string(), vec!["B".to_string()]),
            ("B".to_string(), vec!["A".to_string()]),
        ]);
        assert!(graph.initial_ready_set().is_empty());
        match graph.validate() {
            Err(ProcdagError::GraphStructure(msg)) => assert!(msg.contains("cycle")),
            other => panic!("expected GraphStructure, got {other:?}"),
        }
    }

    #[test]
    fn validate_reports_undeclared_prerequisite() {
        let graph = GraphModel::from_prerequisites(vec![(
            "x.py".to_string(),
            vec!["missing.py".to_string()],
        )]);
        assert_eq!(graph.in_degree("x.py"), Some(1));
        match graph.validate() {
            Err(ProcdagError::GraphStructure(msg)) => assert!(msg.contains("missing.py")),
            other => panic!("expected GraphStructure, got {other:?}"),
        }
    }

    #[test]
    fn validate_reports_self_dependency() {
        let graph =
            GraphModel::from_prerequisites(vec![("A".to_string(), vec!["A".to_string()])]);
        assert!(matches!(
            graph.validate(),
            Err(ProcdagError::GraphStructure(_))
        ));
    }

    #[test]
    fn launch_order_is_deterministic_topological_order() {
        let graph = diamond();
        assert_eq!(graph.launch_order().unwrap(), vec!["A", "B", "C", "D"]);
        assert_eq!(graph.launch_order().unwrap(), graph.launch_order().unwrap());
    }
}
