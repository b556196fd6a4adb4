use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use super::error::LayoutError;
use super::types::EdgeKey;

/// Edge set after cycle removal. `edges` is deduplicated, so a 2-cycle
/// collapses into a single edge.
#[derive(Debug, Clone, Default)]
pub struct AcyclicGraph {
    pub edges: Vec<EdgeKey>,
    pub reversed: BTreeSet<EdgeKey>,
}

#[derive(Debug, Clone)]
struct WorkEdge {
    from: usize,
    to: usize,
    original: EdgeKey,
    reversed: bool,
}

impl WorkEdge {
    fn flip(&mut self) {
        std::mem::swap(&mut self.from, &mut self.to);
        self.reversed = !self.reversed;
    }
}

struct WorkGraph<'a> {
    nodes: &'a [String],
    edges: Vec<WorkEdge>,
}

impl<'a> WorkGraph<'a> {
    fn new(nodes: &'a [String], edges: &[EdgeKey]) -> Self {
        let index: HashMap<&str, usize> = nodes
            .iter()
            .enumerate()
            .map(|(idx, id)| (id.as_str(), idx))
            .collect();
        let mut work = Vec::with_capacity(edges.len());
        for (from, to) in edges {
            let (Some(&a), Some(&b)) = (index.get(from.as_str()), index.get(to.as_str())) else {
                continue;
            };
            if a == b {
                continue;
            }
            work.push(WorkEdge {
                from: a,
                to: b,
                original: (from.clone(), to.clone()),
                reversed: false,
            });
        }
        Self { nodes, edges: work }
    }

    fn outgoing_edges(&self) -> Vec<Vec<usize>> {
        let mut out = vec![Vec::new(); self.nodes.len()];
        for (idx, edge) in self.edges.iter().enumerate() {
            out[edge.from].push(idx);
        }
        out
    }

    fn successors(&self) -> Vec<Vec<usize>> {
        let mut out = vec![Vec::new(); self.nodes.len()];
        for edge in &self.edges {
            out[edge.from].push(edge.to);
        }
        out
    }

    fn degrees(&self) -> Vec<usize> {
        let mut degree = vec![0usize; self.nodes.len()];
        for edge in &self.edges {
            degree[edge.from] += 1;
            degree[edge.to] += 1;
        }
        degree
    }

    /// Depth-first pass reversing every edge that closes onto the open path.
    fn reverse_back_edges(&mut self) -> usize {
        let out = self.outgoing_edges();
        let n = self.nodes.len();
        // 0 = unvisited, 1 = open, 2 = finished
        let mut state = vec![0u8; n];
        let mut reversed = 0usize;
        let mut stack: Vec<(usize, usize)> = Vec::new();

        for root in 0..n {
            if state[root] != 0 {
                continue;
            }
            state[root] = 1;
            stack.push((root, 0));
            while let Some(top) = stack.last_mut() {
                let node = top.0;
                if top.1 >= out[node].len() {
                    state[node] = 2;
                    stack.pop();
                    continue;
                }
                let edge_idx = out[node][top.1];
                top.1 += 1;
                let next = self.edges[edge_idx].to;
                match state[next] {
                    0 => {
                        state[next] = 1;
                        stack.push((next, 0));
                    }
                    1 => {
                        self.edges[edge_idx].flip();
                        reversed += 1;
                    }
                    _ => {}
                }
            }
        }
        reversed
    }

    fn is_acyclic(&self) -> bool {
        let n = self.nodes.len();
        let succ = self.successors();
        let mut indeg = vec![0usize; n];
        for edge in &self.edges {
            indeg[edge.to] += 1;
        }
        let mut queue: VecDeque<usize> = (0..n).filter(|&idx| indeg[idx] == 0).collect();
        let mut seen = 0usize;
        while let Some(node) = queue.pop_front() {
            seen += 1;
            for &next in &succ[node] {
                indeg[next] -= 1;
                if indeg[next] == 0 {
                    queue.push_back(next);
                }
            }
        }
        seen == n
    }

    /// Edge indices of one directed cycle, searched inside the first
    /// non-trivial strongly connected component.
    fn find_cycle(&self) -> Option<Vec<usize>> {
        let components = scc_indices(self.nodes.len(), &self.successors());
        let component = components.into_iter().find(|c| c.len() > 1)?;
        let members: HashSet<usize> = component.iter().copied().collect();
        let out = self.outgoing_edges();

        let n = self.nodes.len();
        let mut visited = vec![false; n];
        let mut stack_pos: Vec<Option<usize>> = vec![None; n];
        let mut stack: Vec<(usize, usize)> = vec![(component[0], 0)];
        let mut via: Vec<usize> = Vec::new();
        visited[component[0]] = true;
        stack_pos[component[0]] = Some(0);

        while let Some(top) = stack.last_mut() {
            let node = top.0;
            if top.1 >= out[node].len() {
                stack_pos[node] = None;
                stack.pop();
                via.pop();
                continue;
            }
            let edge_idx = out[node][top.1];
            top.1 += 1;
            let next = self.edges[edge_idx].to;
            if !members.contains(&next) {
                continue;
            }
            if let Some(pos) = stack_pos[next] {
                let mut cycle = via[pos..].to_vec();
                cycle.push(edge_idx);
                return Some(cycle);
            }
            if !visited[next] {
                visited[next] = true;
                stack_pos[next] = Some(stack.len());
                stack.push((next, 0));
                via.push(edge_idx);
            }
        }
        None
    }

    fn cyclic_node_count(&self) -> usize {
        scc_indices(self.nodes.len(), &self.successors())
            .into_iter()
            .filter(|c| c.len() > 1)
            .map(|c| c.len())
            .sum()
    }

    /// Repeatedly reverses the highest-degree edge of a detected cycle.
    fn greedy_reversal(&mut self, iterations: usize) -> usize {
        let mut reversed = 0usize;
        for _ in 0..iterations {
            let Some(cycle) = self.find_cycle() else {
                break;
            };
            let degree = self.degrees();
            let mut best = cycle[0];
            let mut best_score = 0usize;
            for &edge_idx in &cycle {
                let edge = &self.edges[edge_idx];
                let score = degree[edge.from] + degree[edge.to];
                if score > best_score {
                    best_score = score;
                    best = edge_idx;
                }
            }
            log::debug!(
                "greedy cycle removal: reversing {} -> {} (degree {best_score})",
                self.edges[best].original.0,
                self.edges[best].original.1
            );
            self.edges[best].flip();
            reversed += 1;
        }
        reversed
    }

    fn finish(self) -> AcyclicGraph {
        let mut seen: HashSet<(usize, usize)> = HashSet::new();
        let mut result = AcyclicGraph::default();
        for edge in self.edges {
            if edge.reversed {
                result.reversed.insert(edge.original.clone());
            }
            if seen.insert((edge.from, edge.to)) {
                result
                    .edges
                    .push((self.nodes[edge.from].clone(), self.nodes[edge.to].clone()));
            }
        }
        result
    }
}

/// Reverses a set of edges so the graph becomes acyclic. A depth-first pass
/// handles the common case; a bounded greedy pass follows if the result is
/// still cyclic, and the outcome is verified before returning.
pub fn remove_cycles(
    nodes: &[String],
    edges: &[EdgeKey],
    greedy_iterations: usize,
) -> Result<AcyclicGraph, LayoutError> {
    let mut work = WorkGraph::new(nodes, edges);
    let dfs_reversed = work.reverse_back_edges();
    log::debug!("cycle removal: dfs reversed {dfs_reversed} edges");
    if work.is_acyclic() {
        return Ok(work.finish());
    }
    finish_greedy(work, greedy_iterations)
}

fn finish_greedy(mut work: WorkGraph<'_>, iterations: usize) -> Result<AcyclicGraph, LayoutError> {
    let reversed = work.greedy_reversal(iterations);
    if !work.is_acyclic() {
        return Err(LayoutError::CycleRemovalFailed {
            remaining: work.cyclic_node_count(),
            iterations,
        });
    }
    log::debug!("cycle removal: greedy pass reversed {reversed} edges");
    Ok(work.finish())
}

/// Kahn topological order, or `None` when the edges contain a cycle.
pub fn topological_order(nodes: &[String], edges: &[EdgeKey]) -> Option<Vec<String>> {
    let work = WorkGraph::new(nodes, edges);
    let succ = work.successors();
    let mut indeg = vec![0usize; nodes.len()];
    for edge in &work.edges {
        indeg[edge.to] += 1;
    }
    let mut queue: VecDeque<usize> = (0..nodes.len()).filter(|&idx| indeg[idx] == 0).collect();
    let mut order = Vec::with_capacity(nodes.len());
    while let Some(node) = queue.pop_front() {
        order.push(nodes[node].clone());
        for &next in &succ[node] {
            indeg[next] -= 1;
            if indeg[next] == 0 {
                queue.push_back(next);
            }
        }
    }
    (order.len() == nodes.len()).then_some(order)
}

/// Strongly connected components (iterative Tarjan). Components are listed
/// in reverse topological order of the condensation.
pub fn strongly_connected_components(nodes: &[String], edges: &[EdgeKey]) -> Vec<Vec<String>> {
    let work = WorkGraph::new(nodes, edges);
    scc_indices(nodes.len(), &work.successors())
        .into_iter()
        .map(|component| component.into_iter().map(|idx| nodes[idx].clone()).collect())
        .collect()
}

fn scc_indices(n: usize, succ: &[Vec<usize>]) -> Vec<Vec<usize>> {
    const UNSEEN: usize = usize::MAX;
    let mut index = vec![UNSEEN; n];
    let mut low = vec![0usize; n];
    let mut on_stack = vec![false; n];
    let mut stack: Vec<usize> = Vec::new();
    let mut call: Vec<(usize, usize)> = Vec::new();
    let mut components = Vec::new();
    let mut counter = 0usize;

    for root in 0..n {
        if index[root] != UNSEEN {
            continue;
        }
        index[root] = counter;
        low[root] = counter;
        counter += 1;
        stack.push(root);
        on_stack[root] = true;
        call.push((root, 0));

        while let Some(top) = call.last_mut() {
            let node = top.0;
            if top.1 < succ[node].len() {
                let next = succ[node][top.1];
                top.1 += 1;
                if index[next] == UNSEEN {
                    index[next] = counter;
                    low[next] = counter;
                    counter += 1;
                    stack.push(next);
                    on_stack[next] = true;
                    call.push((next, 0));
                } else if on_stack[next] {
                    low[node] = low[node].min(index[next]);
                }
                continue;
            }
            call.pop();
            if let Some(&(parent, _)) = call.last() {
                low[parent] = low[parent].min(low[node]);
            }
            if low[node] == index[node] {
                let mut component = Vec::new();
                while let Some(member) = stack.pop() {
                    on_stack[member] = false;
                    component.push(member);
                    if member == node {
                        break;
                    }
                }
                component.reverse();
                components.push(component);
            }
        }
    }
    components
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn edges(list: &[(&str, &str)]) -> Vec<EdgeKey> {
        list.iter()
            .map(|(a, b)| (a.to_string(), b.to_string()))
            .collect()
    }

    #[test]
    fn dag_is_left_untouched() {
        let nodes = ids(&["A", "B", "C"]);
        let input = edges(&[("A", "B"), ("B", "C"), ("A", "C")]);
        let result = remove_cycles(&nodes, &input, 100).unwrap();
        assert!(result.reversed.is_empty());
        assert_eq!(result.edges, input);
    }

    #[test]
    fn two_cycle_reverses_exactly_one_edge() {
        let nodes = ids(&["A", "B"]);
        let result = remove_cycles(&nodes, &edges(&[("A", "B"), ("B", "A")]), 100).unwrap();
        assert_eq!(result.reversed.len(), 1);
        assert_eq!(result.edges.len(), 1);
        assert!(topological_order(&nodes, &result.edges).is_some());
    }

    #[test]
    fn dense_cycles_become_acyclic() {
        let nodes = ids(&["A", "B", "C", "D", "E"]);
        let mut input = Vec::new();
        for a in &nodes {
            for b in &nodes {
                if a != b {
                    input.push((a.clone(), b.clone()));
                }
            }
        }
        let result = remove_cycles(&nodes, &input, 100).unwrap();
        assert!(topological_order(&nodes, &result.edges).is_some());
        for edge in &result.reversed {
            assert!(input.contains(edge));
        }
    }

    #[test]
    fn greedy_breaks_triangle() {
        let nodes = ids(&["A", "B", "C"]);
        let input = edges(&[("A", "B"), ("B", "C"), ("C", "A")]);
        let result = finish_greedy(WorkGraph::new(&nodes, &input), 100).unwrap();
        assert_eq!(result.reversed.len(), 1);
        assert!(topological_order(&nodes, &result.edges).is_some());
    }

    #[test]
    fn greedy_without_budget_fails_loudly() {
        let nodes = ids(&["A", "B", "C"]);
        let input = edges(&[("A", "B"), ("B", "C"), ("C", "A")]);
        let err = finish_greedy(WorkGraph::new(&nodes, &input), 0).unwrap_err();
        assert_eq!(
            err,
            LayoutError::CycleRemovalFailed {
                remaining: 3,
                iterations: 0
            }
        );
    }

    #[test]
    fn greedy_prefers_high_degree_edge() {
        // Hub H sits on the cycle and has extra fan-out, so an edge touching
        // it gets reversed.
        let nodes = ids(&["A", "H", "X", "Y", "Z"]);
        let input = edges(&[("A", "H"), ("H", "A"), ("H", "X"), ("H", "Y"), ("H", "Z")]);
        let result = finish_greedy(WorkGraph::new(&nodes, &input), 10).unwrap();
        assert_eq!(result.reversed.len(), 1);
        let edge = result.reversed.iter().next().unwrap();
        assert!(edge.0 == "H" || edge.1 == "H");
    }

    #[test]
    fn scc_groups_cycles() {
        let nodes = ids(&["A", "B", "C", "D"]);
        let input = edges(&[("A", "B"), ("B", "A"), ("B", "C"), ("C", "D"), ("D", "C")]);
        let mut components = strongly_connected_components(&nodes, &input);
        for component in &mut components {
            component.sort();
        }
        components.sort();
        assert_eq!(components, vec![ids(&["A", "B"]), ids(&["C", "D"])]);
    }

    #[test]
    fn deep_chain_does_not_recurse() {
        let nodes: Vec<String> = (0..20_000).map(|i| format!("n{i}")).collect();
        let mut input: Vec<EdgeKey> = nodes
            .windows(2)
            .map(|w| (w[0].clone(), w[1].clone()))
            .collect();
        input.push((nodes[nodes.len() - 1].clone(), nodes[0].clone()));
        let result = remove_cycles(&nodes, &input, 100).unwrap();
        assert_eq!(result.reversed.len(), 1);
    }
}
