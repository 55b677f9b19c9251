//! Dependency graph over main steps.
//!
//! Nodes are definition steps, global steps, and operation steps merged by
//! segment. Every edge runs from the node that must be understood first to
//! the node that uses it.

use crate::tour::models::{
    ChangeKind, ChangeUnit, DefinitionKind, EdgeKind, LineRange, NodeKind, TourGraph,
    TourGraphEdge, TourGraphNode, TourStep,
};
use std::collections::{BTreeSet, HashMap};

/// Whether the graph describes a diff or a whole-file overview.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GraphMode {
    #[default]
    Diff,
    /// Method nodes also point at their containing class.
    Overall,
}

/// A name a node refers to: a related call or an introduced definition.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Reference {
    name: String,
    qualified_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GraphNode {
    pub kind: NodeKind,
    pub label: String,
    pub file_path: String,
    pub range: LineRange,
    /// Indices into the step slice the graph was built from, in input order.
    pub members: Vec<usize>,
    name: Option<String>,
    qualified_name: Option<String>,
    container_name: Option<String>,
    element_kind: Option<DefinitionKind>,
    references: Vec<Reference>,
}

impl GraphNode {
    fn from_unit(index: usize, unit: &ChangeUnit) -> Self {
        let kind = match unit.change_kind {
            ChangeKind::Definition => NodeKind::Definition,
            ChangeKind::Global => NodeKind::Global,
            ChangeKind::Operation => NodeKind::Operation,
        };
        let mut node = Self {
            kind,
            label: unit.label(),
            file_path: unit.file_path.clone(),
            range: unit.range,
            members: vec![index],
            name: unit.simple_name().map(str::to_string),
            qualified_name: unit.qualified_name.clone(),
            container_name: unit.container_name.clone(),
            element_kind: unit.element_kind,
            references: Vec::new(),
        };
        node.absorb_references(unit);
        node
    }

    fn absorb_references(&mut self, unit: &ChangeUnit) {
        let mut add = |name: &str, qualified: Option<&str>| {
            let reference = Reference {
                name: name.to_string(),
                qualified_name: qualified.map(str::to_string),
            };
            if !self.references.contains(&reference) {
                self.references.push(reference);
            }
        };
        if unit.change_kind == ChangeKind::Operation {
            for def in &unit.introduced_definitions {
                add(&def.name, Some(&def.qualified_name));
            }
        }
        for call in &unit.related_calls {
            add(&call.name, call.qualified_name.as_deref());
        }
    }

    pub fn is_definition_like(&self) -> bool {
        matches!(self.kind, NodeKind::Definition | NodeKind::Global)
    }

    /// Narrative rank: globals, then definitions, then operations.
    pub fn rank(&self) -> u8 {
        match self.kind {
            NodeKind::Global => 0,
            NodeKind::Definition => 1,
            NodeKind::Operation => 2,
            NodeKind::Unknown => 3,
        }
    }
}

/// Resolution tables over definition and global nodes.
struct DefinitionIndex {
    by_file_qualified: HashMap<(String, String), Vec<usize>>,
    by_file_label: HashMap<(String, String), Vec<usize>>,
    by_label: HashMap<String, Vec<usize>>,
}

impl DefinitionIndex {
    fn new(nodes: &[GraphNode]) -> Self {
        let mut index = Self {
            by_file_qualified: HashMap::new(),
            by_file_label: HashMap::new(),
            by_label: HashMap::new(),
        };
        for (i, node) in nodes.iter().enumerate() {
            if !node.is_definition_like() {
                continue;
            }
            if let Some(q) = &node.qualified_name {
                index
                    .by_file_qualified
                    .entry((node.file_path.clone(), q.clone()))
                    .or_default()
                    .push(i);
            }
            if let Some(name) = &node.name {
                index
                    .by_file_label
                    .entry((node.file_path.clone(), name.clone()))
                    .or_default()
                    .push(i);
                index.by_label.entry(name.clone()).or_default().push(i);
            }
        }
        index
    }

    /// Qualified name in the same file, then simple name in the same file,
    /// then a globally unambiguous simple name.
    fn resolve(&self, file_path: &str, name: &str, qualified_name: Option<&str>) -> &[usize] {
        if let Some(found) = qualified_name
            .and_then(|q| self.by_file_qualified.get(&(file_path.to_string(), q.to_string())))
        {
            return found;
        }
        if let Some(found) = self
            .by_file_label
            .get(&(file_path.to_string(), name.to_string()))
        {
            return found;
        }
        match self.by_label.get(name) {
            Some(found) if found.len() == 1 => found,
            _ => &[],
        }
    }
}

/// Nodes plus a directed, deduplicated edge set `(from, to, kind)`.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    pub nodes: Vec<GraphNode>,
    pub edges: BTreeSet<(usize, usize, EdgeKind)>,
}

impl DependencyGraph {
    /// Build from main steps; non-unit steps are ignored.
    pub fn build(steps: &[TourStep], mode: GraphMode) -> Self {
        let mut nodes: Vec<GraphNode> = Vec::new();
        let mut operations: HashMap<String, usize> = HashMap::new();

        for (i, step) in steps.iter().enumerate() {
            let Some(unit) = step.unit() else {
                continue;
            };
            let merge_key = (unit.change_kind == ChangeKind::Operation)
                .then(|| {
                    unit.segment_id
                        .clone()
                        .or_else(|| unit.qualified_name.clone())
                        .or_else(|| unit.symbol_name.clone())
                })
                .flatten()
                .map(|key| format!("{}|{}", unit.file_path, key));

            match merge_key.as_ref().and_then(|k| operations.get(k)) {
                Some(&existing) => {
                    let node = &mut nodes[existing];
                    node.members.push(i);
                    node.range = node.range.union(&unit.range);
                    node.absorb_references(unit);
                }
                None => {
                    if let Some(key) = merge_key {
                        operations.insert(key, nodes.len());
                    }
                    nodes.push(GraphNode::from_unit(i, unit));
                }
            }
        }

        let edges = link(&nodes, mode);
        Self { nodes, edges }
    }

    /// Undirected connected components, each a sorted list of node indices.
    pub fn components(&self) -> Vec<Vec<usize>> {
        let mut parent: Vec<usize> = (0..self.nodes.len()).collect();
        fn find(parent: &mut [usize], x: usize) -> usize {
            let mut root = x;
            while parent[root] != root {
                root = parent[root];
            }
            let mut cur = x;
            while parent[cur] != root {
                let next = parent[cur];
                parent[cur] = root;
                cur = next;
            }
            root
        }
        for &(from, to, _) in &self.edges {
            let (a, b) = (find(&mut parent, from), find(&mut parent, to));
            if a != b {
                parent[a.max(b)] = a.min(b);
            }
        }

        let mut by_root: HashMap<usize, Vec<usize>> = HashMap::new();
        for i in 0..self.nodes.len() {
            let root = find(&mut parent, i);
            by_root.entry(root).or_default().push(i);
        }
        let mut components: Vec<Vec<usize>> = by_root.into_values().collect();
        components.sort_by_key(|c| c.first().copied());
        components
    }
}

fn link(nodes: &[GraphNode], mode: GraphMode) -> BTreeSet<(usize, usize, EdgeKind)> {
    let index = DefinitionIndex::new(nodes);
    let mut edges = BTreeSet::new();

    for (to, node) in nodes.iter().enumerate() {
        let kind = match node.kind {
            NodeKind::Operation => EdgeKind::OpToDef,
            NodeKind::Definition | NodeKind::Global => EdgeKind::DefToDef,
            NodeKind::Unknown => continue,
        };
        for reference in &node.references {
            for &from in index.resolve(
                &node.file_path,
                &reference.name,
                reference.qualified_name.as_deref(),
            ) {
                if from != to {
                    edges.insert((from, to, kind));
                }
            }
        }

        if mode == GraphMode::Overall && node.element_kind == Some(DefinitionKind::Method) {
            let Some(container) = &node.container_name else {
                continue;
            };
            let class_name = container.rsplit('.').next().unwrap_or(container);
            for &class in index.resolve(&node.file_path, class_name, Some(container)) {
                if class != to && nodes[class].element_kind == Some(DefinitionKind::Class) {
                    edges.insert((to, class, EdgeKind::DefToDef));
                }
            }
        }
    }
    edges
}

/// Build the externally exposed graph for already-ordered main steps.
///
/// Node ids are the id of the node's first step.
pub fn build_graph(main_steps: &[TourStep], mode: GraphMode) -> TourGraph {
    let graph = DependencyGraph::build(main_steps, mode);
    let id_of = |node: &GraphNode| main_steps[node.members[0]].id.clone();

    let nodes = graph
        .nodes
        .iter()
        .map(|node| TourGraphNode {
            id: id_of(node),
            kind: node.kind,
            label: node.label.clone(),
            file_path: node.file_path.clone(),
            range: node.range,
            step_ids: node
                .members
                .iter()
                .map(|&i| main_steps[i].id.clone())
                .collect(),
        })
        .collect();
    let edges = graph
        .edges
        .iter()
        .map(|&(from, to, kind)| TourGraphEdge {
            from: id_of(&graph.nodes[from]),
            to: id_of(&graph.nodes[to]),
            kind,
        })
        .collect();

    TourGraph { nodes, edges }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use crate::tour::models::IntroducedDefinition;

    #[test]
    fn test_operations_merge_by_segment() {
        let steps = steps(vec![
            operation("p.js", Some(("process", 1, 14)), 3),
            operation("p.js", Some(("process", 1, 14)), 12),
            operation("p.js", None, 20),
        ]);
        let graph = build_graph(&steps, GraphMode::Diff);
        assert_eq!(graph.nodes.len(), 2);
        assert_eq!(graph.nodes[0].step_ids, vec!["main-1", "main-2"]);
        assert_eq!(graph.nodes[0].range, LineRange::new(3, 12));
        assert_eq!(graph.nodes[0].kind, NodeKind::Operation);
        assert!(graph.edges.is_empty());
    }

    #[test]
    fn test_edges_point_from_dependency_to_dependent() {
        let steps = steps(vec![
            definition("a.py", "helper", 1, 2),
            calls(operation("a.py", Some(("caller", 4, 6)), 5), "helper"),
            calls(definition("a.py", "main", 8, 9), "caller"),
            calls(definition("a.py", "loop", 11, 12), "loop"),
        ]);
        let graph = build_graph(&steps, GraphMode::Diff);
        let edges: Vec<(&str, &str, EdgeKind)> = graph
            .edges
            .iter()
            .map(|e| (e.from.as_str(), e.to.as_str(), e.kind))
            .collect();
        assert_eq!(edges, vec![("main-1", "main-2", EdgeKind::OpToDef)]);
    }

    #[test]
    fn test_introduced_definitions_and_global_fallback() {
        let mut op = operation("b.js", Some(("run", 1, 30)), 10);
        op.introduced_definitions.push(IntroducedDefinition {
            name: "inner".into(),
            qualified_name: "inner".into(),
            kind: DefinitionKind::Function,
            range: LineRange::new(10, 12),
        });
        let steps = steps(vec![
            definition("b.js", "inner", 40, 41),
            calls(op, "shared"),
            definition("c.js", "shared", 1, 3),
        ]);
        let graph = DependencyGraph::build(&steps, GraphMode::Diff);
        let edges: Vec<(usize, usize)> = graph.edges.iter().map(|&(f, t, _)| (f, t)).collect();
        assert_eq!(edges, vec![(0, 1), (2, 1)]);
    }

    #[test]
    fn test_ambiguous_global_name_is_not_linked() {
        let steps = steps(vec![
            definition("x.js", "save", 1, 2),
            definition("y.js", "save", 1, 2),
            calls(operation("z.js", None, 4), "save"),
        ]);
        assert!(build_graph(&steps, GraphMode::Diff).edges.is_empty());
    }

    #[test]
    fn test_overall_mode_links_methods_to_class() {
        let mut class = definition("m.py", "Cart", 1, 10);
        class.element_kind = Some(DefinitionKind::Class);
        let mut method = definition("m.py", "Cart.total", 2, 4);
        method.element_kind = Some(DefinitionKind::Method);
        method.container_name = Some("Cart".into());
        let steps = steps(vec![class, method]);

        assert!(build_graph(&steps, GraphMode::Diff).edges.is_empty());
        let graph = build_graph(&steps, GraphMode::Overall);
        assert_eq!(graph.edges.len(), 1);
        assert_eq!(graph.edges[0].from, "main-2");
        assert_eq!(graph.edges[0].to, "main-1");
    }

    #[test]
    fn test_components() {
        let steps = steps(vec![
            definition("a.py", "helper", 1, 2),
            operation("a.py", None, 20),
            calls(operation("a.py", Some(("caller", 4, 6)), 5), "helper"),
        ]);
        let graph = DependencyGraph::build(&steps, GraphMode::Diff);
        assert_eq!(graph.components(), vec![vec![0, 2], vec![1]]);
    }
}
