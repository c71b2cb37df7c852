//! Modularity-based community detection (Louvain local-moving phase).
//!
//! Nodes are visited in index order and ties go to the lowest community id,
//! so the partition is deterministic for a given input. The number of sweeps
//! is bounded; when the bound is hit the current partition is returned.

use std::collections::BTreeMap;

/// Improvements smaller than this do not move a node
const MIN_GAIN: f64 = 1e-12;

#[derive(Debug, Clone, PartialEq)]
pub struct Partition {
    /// Member node indices per community, each sorted, communities ordered by
    /// their smallest member
    pub communities: Vec<Vec<usize>>,
    pub converged: bool,
    pub sweeps: usize,
}

/// Undirected weighted graph over `0..n`
#[derive(Debug, Clone, Default)]
pub struct WeightedGraph {
    adjacency: Vec<BTreeMap<usize, f64>>,
}

impl WeightedGraph {
    pub fn new(n: usize) -> Self {
        WeightedGraph {
            adjacency: vec![BTreeMap::new(); n],
        }
    }

    pub fn len(&self) -> usize {
        self.adjacency.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adjacency.is_empty()
    }

    pub fn add_edge(&mut self, a: usize, b: usize, weight: f64) {
        if a == b || weight <= 0.0 {
            return;
        }
        *self.adjacency[a].entry(b).or_default() += weight;
        *self.adjacency[b].entry(a).or_default() += weight;
    }

    pub fn weight(&self, a: usize, b: usize) -> Option<f64> {
        self.adjacency.get(a).and_then(|m| m.get(&b)).copied()
    }

    fn degree(&self, node: usize) -> f64 {
        self.adjacency[node].values().sum()
    }
}

pub fn detect_communities(graph: &WeightedGraph, max_sweeps: usize) -> Partition {
    let n = graph.len();
    let degrees: Vec<f64> = (0..n).map(|i| graph.degree(i)).collect();
    let two_m: f64 = degrees.iter().sum();

    let mut community: Vec<usize> = (0..n).collect();
    let mut totals = degrees.clone();
    let mut converged = two_m == 0.0;
    let mut sweeps = 0;

    while !converged && sweeps < max_sweeps {
        sweeps += 1;
        let mut moved = false;

        for node in 0..n {
            let own = community[node];
            let k = degrees[node];

            let mut links: BTreeMap<usize, f64> = BTreeMap::new();
            for (&neighbor, &w) in &graph.adjacency[node] {
                *links.entry(community[neighbor]).or_default() += w;
            }

            totals[own] -= k;
            let gain = |c: usize, w_in: f64| w_in - totals[c] * k / two_m;

            let mut best = own;
            let mut best_gain = gain(own, links.get(&own).copied().unwrap_or(0.0));
            for (&c, &w_in) in &links {
                let g = gain(c, w_in);
                if g > best_gain + MIN_GAIN {
                    best = c;
                    best_gain = g;
                }
            }

            totals[best] += k;
            if best != own {
                community[node] = best;
                moved = true;
            }
        }

        if !moved {
            converged = true;
        }
    }

    let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (node, &c) in community.iter().enumerate() {
        groups.entry(c).or_default().push(node);
    }
    let mut communities: Vec<Vec<usize>> = groups.into_values().collect();
    communities.sort();

    Partition {
        communities,
        converged,
        sweeps,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_triangles() -> WeightedGraph {
        let mut g = WeightedGraph::new(6);
        for (a, b) in [(0, 1), (1, 2), (0, 2), (3, 4), (4, 5), (3, 5), (2, 3)] {
            g.add_edge(a, b, 1.0);
        }
        g
    }

    #[test]
    fn test_two_triangles_split() {
        let partition = detect_communities(&two_triangles(), 50);

        assert!(partition.converged);
        assert_eq!(partition.communities, vec![vec![0, 1, 2], vec![3, 4, 5]]);
    }

    #[test]
    fn test_isolated_nodes_stay_alone() {
        let partition = detect_communities(&WeightedGraph::new(3), 50);
        assert_eq!(partition.communities, vec![vec![0], vec![1], vec![2]]);
        assert_eq!(partition.sweeps, 0);
    }

    #[test]
    fn test_sweep_budget_is_respected() {
        let partition = detect_communities(&two_triangles(), 1);
        assert_eq!(partition.sweeps, 1);
        assert!(!partition.converged);
    }
}
