use crate::tour::graph::{DependencyGraph, GraphMode, GraphNode};
use crate::tour::models::{ChangeKind, TourStep};
use std::cmp::Ordering;
use std::collections::VecDeque;

/// Order main steps into a narrative.
///
/// Globals lead, sorted by `(file, line)`. The rest is ordered per connected
/// component of the dependency graph: components containing an operation
/// first, then by their earliest `(file, line)`. Inside a component every
/// node comes after the nodes it depends on; ties are broken by
/// `(rank, file, line)` with globals before definitions before operations.
/// Cycles are flushed in tie-break order.
///
/// The result depends only on the set of steps, not on their input order.
pub fn order(main_steps: Vec<TourStep>, mode: GraphMode) -> Vec<TourStep> {
    let mut steps = main_steps;
    steps.sort_by(canonical);

    let (mut globals, rest): (Vec<TourStep>, Vec<TourStep>) = steps
        .into_iter()
        .partition(|s| s.unit().is_some_and(|u| u.change_kind == ChangeKind::Global));
    globals.sort_by(|a, b| position(a).cmp(&position(b)).then(canonical(a, b)));

    let graph = DependencyGraph::build(&rest, mode);
    let mut components = graph.components();
    components.sort_by(|a, b| {
        let key = |c: &Vec<usize>| {
            let has_operation = c.iter().any(|&i| graph.nodes[i].rank() == 2);
            let earliest = c.iter().map(|&i| node_position(&graph.nodes[i])).min();
            (!has_operation, earliest)
        };
        key(a).cmp(&key(b))
    });

    let mut order: Vec<usize> = Vec::with_capacity(rest.len());
    for component in &components {
        for node in order_component(&graph, component) {
            order.extend(graph.nodes[node].members.iter().copied());
        }
    }
    // Steps without a unit target never become nodes; keep them at the end.
    let mut placed = vec![false; rest.len()];
    for &i in &order {
        placed[i] = true;
    }
    order.extend((0..rest.len()).filter(|&i| !placed[i]));

    let mut slots: Vec<Option<TourStep>> = rest.into_iter().map(Some).collect();
    globals.extend(order.into_iter().filter_map(|i| slots[i].take()));
    globals
}

/// Dependency-first walk of one component.
fn order_component(graph: &DependencyGraph, component: &[usize]) -> Vec<usize> {
    let tie = |a: &usize, b: &usize| tie_break(&graph.nodes[*a], &graph.nodes[*b]).then(a.cmp(b));

    let mut indegree: std::collections::HashMap<usize, usize> =
        component.iter().map(|&i| (i, 0)).collect();
    for &(from, to, _) in &graph.edges {
        if from != to && indegree.contains_key(&from) {
            if let Some(d) = indegree.get_mut(&to) {
                *d += 1;
            }
        }
    }

    let mut roots: Vec<usize> = component
        .iter()
        .copied()
        .filter(|i| indegree[i] == 0)
        .collect();
    roots.sort_by(tie);
    let mut queue: VecDeque<usize> = roots.into();
    let mut emitted = vec![];
    let mut done = std::collections::HashSet::new();

    while emitted.len() < component.len() {
        let next = match queue.pop_front() {
            Some(n) => n,
            None => {
                // Cycle: release the best remaining node.
                let mut remaining: Vec<usize> = component
                    .iter()
                    .copied()
                    .filter(|i| !done.contains(i))
                    .collect();
                remaining.sort_by(tie);
                match remaining.first() {
                    Some(&n) => n,
                    None => break,
                }
            }
        };
        if !done.insert(next) {
            continue;
        }
        emitted.push(next);

        let mut successors: Vec<usize> = graph
            .edges
            .iter()
            .filter(|&&(from, to, _)| from == next && to != next)
            .map(|&(_, to, _)| to)
            .collect();
        successors.sort_by(tie);
        successors.dedup();
        for to in successors {
            if done.contains(&to) {
                continue;
            }
            if let Some(d) = indegree.get_mut(&to) {
                *d = d.saturating_sub(1);
                if *d == 0 {
                    queue.push_back(to);
                }
            }
        }
    }
    emitted
}

fn tie_break(a: &GraphNode, b: &GraphNode) -> Ordering {
    a.rank()
        .cmp(&b.rank())
        .then_with(|| node_position(a).cmp(&node_position(b)))
}

fn node_position(node: &GraphNode) -> (&str, usize) {
    (node.file_path.as_str(), node.range.start_line)
}

fn position(step: &TourStep) -> (&str, usize) {
    (step.target.file_path(), step.target.range().start_line)
}

/// Total order on steps used to make the result independent of input order.
fn canonical(a: &TourStep, b: &TourStep) -> Ordering {
    position(a)
        .cmp(&position(b))
        .then(a.target.range().end_line.cmp(&b.target.range().end_line))
        .then(a.kind.cmp(&b.kind))
        .then_with(|| a.id.cmp(&b.id))
}
