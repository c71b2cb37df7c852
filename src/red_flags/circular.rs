// Circular subcontracting: money awarded to a prime contractor flows through
// SUBCONTRACTED_TO edges and comes back to it.
//
// Strongly connected components narrow the search, then a bounded DFS
// enumerates simple cycles inside each component. Each cycle is found once,
// starting from its smallest node, and reported rotated to start at the prime.

use super::{peso, CycleHop, DetectionContext, Detector, Evidence, FlagSubject, FlagType, RedFlag, Severity};
use crate::error::DetectorError;
use crate::relationships::{EdgeEvidence, EdgeType};
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::warn;

pub struct CircularSubcontractingDetector;

struct Search<'g> {
    flow: &'g DiGraph<&'g str, f64>,
    max_hops: usize,
    steps_left: usize,
}

impl Search<'_> {
    fn exhausted(&self) -> bool {
        self.steps_left == 0
    }

    fn cycles_from(&mut self, start: NodeIndex, members: &HashSet<NodeIndex>, out: &mut Vec<Vec<NodeIndex>>) {
        let mut path = vec![start];
        self.walk(start, start, members, &mut path, out);
    }

    fn walk(
        &mut self,
        start: NodeIndex,
        node: NodeIndex,
        members: &HashSet<NodeIndex>,
        path: &mut Vec<NodeIndex>,
        out: &mut Vec<Vec<NodeIndex>>,
    ) {
        let mut next: Vec<NodeIndex> = self
            .flow
            .neighbors_directed(node, Direction::Outgoing)
            .filter(|n| members.contains(n) && *n >= start)
            .collect();
        next.sort();
        next.dedup();

        for n in next {
            if self.exhausted() {
                return;
            }
            self.steps_left -= 1;

            if n == start {
                out.push(path.clone());
                continue;
            }
            if path.len() >= self.max_hops || path.contains(&n) {
                continue;
            }
            path.push(n);
            self.walk(start, n, members, path, out);
            path.pop();
        }
    }
}

impl Detector for CircularSubcontractingDetector {
    fn name(&self) -> &'static str {
        "circular_subcontracting"
    }

    fn detect(&self, ctx: &DetectionContext<'_>) -> Result<Vec<RedFlag>, DetectorError> {
        let graph = ctx.graph;

        let hops: Vec<(&str, &str, f64)> = graph
            .edges_of(EdgeType::SubcontractedTo)
            .filter_map(|e| match &e.evidence {
                EdgeEvidence::Subcontracting { total_value, .. } => {
                    Some((e.source.as_str(), e.target.as_str(), *total_value))
                }
                _ => None,
            })
            .collect();
        if hops.is_empty() {
            return Ok(Vec::new());
        }

        // Nodes added in id order so index order is id order
        let ids: BTreeSet<&str> = hops.iter().flat_map(|(s, t, _)| [*s, *t]).collect();
        let mut flow: DiGraph<&str, f64> = DiGraph::new();
        let index: BTreeMap<&str, NodeIndex> = ids.iter().map(|id| (*id, flow.add_node(*id))).collect();
        for (s, t, value) in &hops {
            flow.add_edge(index[s], index[t], *value);
        }

        let mut components: Vec<Vec<NodeIndex>> = tarjan_scc(&flow)
            .into_iter()
            .filter(|scc| scc.len() > 1)
            .map(|mut scc| {
                scc.sort();
                scc
            })
            .collect();
        components.sort();

        let mut search = Search {
            flow: &flow,
            max_hops: ctx.config.cycle_max_hops,
            steps_left: ctx.config.cycle_max_steps,
        };
        let mut cycles = Vec::new();
        for component in &components {
            let members: HashSet<NodeIndex> = component.iter().copied().collect();
            for &start in component {
                search.cycles_from(start, &members, &mut cycles);
            }
        }
        if search.exhausted() {
            warn!(
                cycles = cycles.len(),
                max_steps = ctx.config.cycle_max_steps,
                "cycle search budget exhausted, reporting partial results"
            );
        }

        let mut awarded: BTreeMap<&str, f64> = BTreeMap::new();
        for contract in &graph.contracts {
            if let Some(awardee) = contract.awardee.as_deref() {
                *awarded.entry(awardee).or_default() += contract.amount;
            }
        }

        let mut flags = Vec::new();
        for cycle in cycles {
            let names: Vec<&str> = cycle.iter().map(|&n| flow[n]).collect();

            // The prime is the cycle member holding the most awarded value
            let Some(prime_pos) = (0..names.len())
                .filter(|&i| awarded.contains_key(names[i]))
                .max_by(|&a, &b| {
                    awarded[names[a]]
                        .total_cmp(&awarded[names[b]])
                        .then_with(|| names[b].cmp(names[a]))
                })
            else {
                continue;
            };
            let prime = names[prime_pos];
            let prime_contract_value = awarded[prime];

            let mut rotated = names.clone();
            rotated.rotate_left(prime_pos);

            let hop_values: Vec<CycleHop> = (0..rotated.len())
                .map(|i| {
                    let (from, to) = (rotated[i], rotated[(i + 1) % rotated.len()]);
                    let value = flow
                        .find_edge(index[from], index[to])
                        .map(|e| flow[e])
                        .unwrap_or(0.0);
                    CycleHop {
                        from: from.to_string(),
                        to: to.to_string(),
                        value,
                    }
                })
                .collect();
            let net_retained = hop_values.iter().map(|h| h.value).fold(f64::INFINITY, f64::min);

            let mut path: Vec<String> = rotated.iter().map(|s| s.to_string()).collect();
            path.push(prime.to_string());
            let readable: Vec<&str> = path.iter().map(|id| graph.name_of(id)).collect();

            flags.push(ctx.flag(
                self.name(),
                FlagType::CircularSubcontracting,
                Severity::Critical,
                FlagSubject::entity(prime),
                format!(
                    "Subcontracting cycle {} returns {} to {} (prime contracts worth {})",
                    readable.join(" → "),
                    peso(net_retained),
                    graph.name_of(prime),
                    peso(prime_contract_value)
                ),
                Evidence::CircularSubcontracting {
                    prime_contractor: prime.to_string(),
                    cycle: path,
                    hops: hop_values,
                    net_retained,
                    prime_contract_value,
                },
            )?);
        }

        Ok(flags)
    }
}
