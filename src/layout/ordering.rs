use std::cmp::Ordering;
use std::collections::HashMap;

use super::types::EdgeKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Heuristic {
    Barycenter,
    Median,
}

impl Heuristic {
    /// Barycenter on even rounds, median on odd rounds.
    fn for_round(round: usize) -> Self {
        if round % 2 == 0 {
            Heuristic::Barycenter
        } else {
            Heuristic::Median
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrderingStats {
    pub initial_crossings: usize,
    pub final_crossings: usize,
    pub rounds: usize,
}

fn positions_of(rank_nodes: &[Vec<String>]) -> HashMap<String, usize> {
    let mut positions = HashMap::new();
    for bucket in rank_nodes {
        for (idx, node_id) in bucket.iter().enumerate() {
            positions.insert(node_id.clone(), idx);
        }
    }
    positions
}

fn neighbor_score(
    node_id: &str,
    heuristic: Heuristic,
    neighbors: &HashMap<String, Vec<String>>,
    positions: &HashMap<String, usize>,
    current: usize,
) -> f32 {
    let Some(list) = neighbors.get(node_id) else {
        return current as f32;
    };
    let mut values: Vec<f32> = list
        .iter()
        .filter_map(|n| positions.get(n))
        .map(|p| *p as f32)
        .collect();
    if values.is_empty() {
        return current as f32;
    }
    match heuristic {
        Heuristic::Barycenter => values.iter().sum::<f32>() / values.len() as f32,
        Heuristic::Median => {
            values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
            let mid = values.len() / 2;
            if values.len() % 2 == 1 {
                values[mid]
            } else {
                (values[mid - 1] + values[mid]) * 0.5
            }
        }
    }
}

fn sort_bucket(
    bucket: &mut [String],
    heuristic: Heuristic,
    neighbors: &HashMap<String, Vec<String>>,
    positions: &HashMap<String, usize>,
    tie_order: &HashMap<String, usize>,
) {
    let current: HashMap<String, usize> = bucket
        .iter()
        .enumerate()
        .map(|(idx, id)| (id.clone(), idx))
        .collect();
    let scores: HashMap<String, f32> = bucket
        .iter()
        .map(|id| {
            let pos = current.get(id).copied().unwrap_or(0);
            (id.clone(), neighbor_score(id, heuristic, neighbors, positions, pos))
        })
        .collect();
    bucket.sort_by(|a, b| {
        let a_score = scores.get(a).copied().unwrap_or(0.0);
        let b_score = scores.get(b).copied().unwrap_or(0.0);
        match a_score.partial_cmp(&b_score) {
            Some(Ordering::Equal) | None => {
                let a_pos = current.get(a).copied().unwrap_or(0);
                let b_pos = current.get(b).copied().unwrap_or(0);
                a_pos.cmp(&b_pos).then_with(|| {
                    tie_order
                        .get(a)
                        .copied()
                        .unwrap_or(usize::MAX)
                        .cmp(&tie_order.get(b).copied().unwrap_or(usize::MAX))
                })
            }
            Some(ordering) => ordering,
        }
    });
}

/// Crossings between two adjacent layers by pairwise inversion count.
pub(super) fn count_layer_crossings(
    upper: &[String],
    lower: &[String],
    edges: &[EdgeKey],
) -> usize {
    let upper_pos: HashMap<&str, usize> = upper
        .iter()
        .enumerate()
        .map(|(i, id)| (id.as_str(), i))
        .collect();
    let lower_pos: HashMap<&str, usize> = lower
        .iter()
        .enumerate()
        .map(|(i, id)| (id.as_str(), i))
        .collect();
    let mut pairs: Vec<(usize, usize)> = Vec::new();
    for (from, to) in edges {
        if let (Some(&u), Some(&l)) = (upper_pos.get(from.as_str()), lower_pos.get(to.as_str())) {
            pairs.push((u, l));
        }
    }
    let mut crossings = 0usize;
    for i in 0..pairs.len() {
        for j in (i + 1)..pairs.len() {
            let (a, b) = (pairs[i], pairs[j]);
            if (a.0 < b.0 && a.1 > b.1) || (a.0 > b.0 && a.1 < b.1) {
                crossings += 1;
            }
        }
    }
    crossings
}

pub fn count_crossings(rank_nodes: &[Vec<String>], edges: &[EdgeKey]) -> usize {
    rank_nodes
        .windows(2)
        .map(|pair| count_layer_crossings(&pair[0], &pair[1], edges))
        .sum()
}

/// Layer-by-layer sweep reduction. Each round sweeps down against the layer
/// above and then up against the layer below; the best ordering seen is kept.
pub fn reduce_crossings(
    rank_nodes: &mut [Vec<String>],
    edges: &[EdgeKey],
    tie_order: &HashMap<String, usize>,
    max_rounds: usize,
    threshold: f32,
) -> OrderingStats {
    let initial = count_crossings(rank_nodes, edges);
    let mut stats = OrderingStats {
        initial_crossings: initial,
        final_crossings: initial,
        rounds: 0,
    };
    if rank_nodes.len() <= 1 || initial == 0 {
        return stats;
    }

    let mut incoming: HashMap<String, Vec<String>> = HashMap::new();
    let mut outgoing: HashMap<String, Vec<String>> = HashMap::new();
    for (from, to) in edges {
        outgoing.entry(from.clone()).or_default().push(to.clone());
        incoming.entry(to.clone()).or_default().push(from.clone());
    }

    let mut best = rank_nodes.to_vec();
    let mut best_crossings = initial;
    let mut previous = initial;

    for round in 0..max_rounds {
        let heuristic = Heuristic::for_round(round);
        let mut positions = positions_of(rank_nodes);
        for rank in 1..rank_nodes.len() {
            if rank_nodes[rank].len() > 1 {
                sort_bucket(&mut rank_nodes[rank], heuristic, &incoming, &positions, tie_order);
                positions = positions_of(rank_nodes);
            }
        }
        for rank in (0..rank_nodes.len() - 1).rev() {
            if rank_nodes[rank].len() > 1 {
                sort_bucket(&mut rank_nodes[rank], heuristic, &outgoing, &positions, tie_order);
                positions = positions_of(rank_nodes);
            }
        }

        stats.rounds = round + 1;
        let crossings = count_crossings(rank_nodes, edges);
        log::debug!("crossing reduction round {round} ({heuristic:?}): {crossings} crossings");
        if crossings < best_crossings {
            best_crossings = crossings;
            best = rank_nodes.to_vec();
        }
        if crossings == 0 {
            break;
        }
        let improvement = if previous == 0 {
            0.0
        } else {
            (previous as f32 - crossings as f32) / previous as f32
        };
        if improvement < threshold {
            break;
        }
        previous = crossings;
    }

    for (slot, layer) in rank_nodes.iter_mut().zip(best) {
        *slot = layer;
    }
    stats.final_crossings = best_crossings;
    stats
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    fn edge(a: &str, b: &str) -> EdgeKey {
        (a.to_string(), b.to_string())
    }

    #[test]
    fn counts_single_inversion() {
        let upper = layer(&["a", "b"]);
        let lower = layer(&["c", "d"]);
        let edges = vec![edge("a", "d"), edge("b", "c")];
        assert_eq!(count_layer_crossings(&upper, &lower, &edges), 1);
        let straight = vec![edge("a", "c"), edge("b", "d")];
        assert_eq!(count_layer_crossings(&upper, &lower, &straight), 0);
    }

    #[test]
    fn shared_endpoint_is_not_a_crossing() {
        let upper = layer(&["a", "b"]);
        let lower = layer(&["c"]);
        let edges = vec![edge("a", "c"), edge("b", "c")];
        assert_eq!(count_layer_crossings(&upper, &lower, &edges), 0);
    }

    #[test]
    fn untangles_swapped_pair() {
        let mut ranks = vec![layer(&["a", "b"]), layer(&["c", "d"])];
        let edges = vec![edge("a", "d"), edge("b", "c")];
        let tie_order = HashMap::new();
        let stats = reduce_crossings(&mut ranks, &edges, &tie_order, 10, 0.01);
        assert_eq!(stats.initial_crossings, 1);
        assert_eq!(stats.final_crossings, 0);
        assert_eq!(count_crossings(&ranks, &edges), 0);
    }

    #[test]
    fn never_worse_than_initial() {
        let mut ranks = vec![
            layer(&["a", "b", "c"]),
            layer(&["d", "e", "f"]),
            layer(&["g", "h", "i"]),
        ];
        let edges = vec![
            edge("a", "f"),
            edge("b", "d"),
            edge("c", "e"),
            edge("a", "e"),
            edge("d", "i"),
            edge("e", "g"),
            edge("f", "h"),
            edge("f", "g"),
        ];
        let before = count_crossings(&ranks, &edges);
        let stats = reduce_crossings(&mut ranks, &edges, &HashMap::new(), 10, 0.01);
        assert!(stats.final_crossings <= before);
        assert_eq!(stats.final_crossings, count_crossings(&ranks, &edges));
        assert!(stats.rounds <= 10);
    }

    #[test]
    fn heuristics_alternate() {
        assert_eq!(Heuristic::for_round(0), Heuristic::Barycenter);
        assert_eq!(Heuristic::for_round(1), Heuristic::Median);
        assert_eq!(Heuristic::for_round(2), Heuristic::Barycenter);
    }

    #[test]
    fn median_and_barycenter_differ() {
        let mut neighbors = HashMap::new();
        neighbors.insert("x".to_string(), layer(&["a", "b", "c"]));
        let positions: HashMap<String, usize> =
            [("a", 0), ("b", 1), ("c", 8)].iter().map(|(k, v)| (k.to_string(), *v)).collect();
        let bary = neighbor_score("x", Heuristic::Barycenter, &neighbors, &positions, 0);
        let median = neighbor_score("x", Heuristic::Median, &neighbors, &positions, 0);
        assert!((bary - 3.0).abs() < 1e-6);
        assert!((median - 1.0).abs() < 1e-6);
    }
}
