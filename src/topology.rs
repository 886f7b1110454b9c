// sdnbench: Automated Resilience Experiments for SDN Controller Platforms
// Copyright (C) 2024-2025 The sdnbench developers
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//! Deterministic generation of the emulated test network.

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

/// Number of core switches forming the ring.
const CORE_COUNT: usize = 3;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    Switch,
    Host,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    pub kind: NodeKind,
}

/// Description of the emulated network: named nodes and undirected edges between them.
/// Two graphs built from the same parameters compare equal, node for node and edge for edge.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Graph {
    nodes: Vec<Node>,
    edges: Vec<(String, String)>,
}

impl Graph {
    fn add_switch(&mut self, name: String) -> String {
        self.nodes.push(Node {
            name: name.clone(),
            kind: NodeKind::Switch,
        });
        name
    }

    fn add_host(&mut self, name: String) -> String {
        self.nodes.push(Node {
            name: name.clone(),
            kind: NodeKind::Host,
        });
        name
    }

    fn add_link(&mut self, a: &str, b: &str) {
        self.edges.push((a.to_string(), b.to_string()));
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[(String, String)] {
        &self.edges
    }

    pub fn num_switches(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| n.kind == NodeKind::Switch)
            .count()
    }

    pub fn num_hosts(&self) -> usize {
        self.nodes.iter().filter(|n| n.kind == NodeKind::Host).count()
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph contains an edge between `a` and `b`, in either orientation.
    pub fn has_edge(&self, a: &str, b: &str) -> bool {
        self.edges
            .iter()
            .any(|(x, y)| (x == a && y == b) || (x == b && y == a))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.iter().any(|n| n.name == name)
    }
}

/// Parametric test topologies.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Topology {
    /// Three core switches in a ring. Every core switch fans out into `branches` chains of
    /// `hops` switches, with one host attached to the end of each chain. With `hops = 0` the
    /// hosts attach directly to their core switch.
    TriangleStar { branches: usize, hops: usize },
}

impl Default for Topology {
    fn default() -> Self {
        Self::TriangleStar {
            branches: 1,
            hops: 1,
        }
    }
}

impl Topology {
    /// Readable (and filename-compatible) string representation of the topology.
    pub fn fmt(&self) -> String {
        match self {
            Self::TriangleStar { branches, hops } => format!("TriangleStar_{branches}_{hops}"),
        }
    }

    /// Construct the network graph. Pure function: identical parameters always reproduce an
    /// identical graph.
    pub fn build(&self) -> Result<Graph, ConfigError> {
        match *self {
            Self::TriangleStar { branches, hops } => {
                if branches < 1 {
                    return Err(ConfigError::InvalidTopology { branches });
                }

                let mut graph = Graph::default();
                let core: Vec<String> = (0..CORE_COUNT)
                    .map(|c| graph.add_switch(format!("core{c}")))
                    .collect();

                for c in 0..CORE_COUNT {
                    graph.add_link(&core[c], &core[(c + 1) % CORE_COUNT]);

                    for b in 0..branches {
                        let mut chain: Vec<String> = Vec::with_capacity(hops);
                        for h in 0..hops {
                            let switch =
                                graph.add_switch(format!("core{c}branch{b}switch{h}"));
                            if h > 0 {
                                graph.add_link(&chain[h - 1], &switch);
                            } else {
                                graph.add_link(&switch, &core[c]);
                            }
                            chain.push(switch);
                        }

                        let host = graph.add_host(format!("core{c}host{b}"));
                        match chain.last() {
                            Some(switch) => graph.add_link(&host, switch),
                            None => graph.add_link(&host, &core[c]),
                        }
                    }
                }

                Ok(graph)
            }
        }
    }

    /// The edge between the first two core switches, the default target for link
    /// failure-and-recovery events.
    pub fn core_edge(&self) -> (String, String) {
        ("core0".to_string(), "core1".to_string())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn build(branches: usize, hops: usize) -> Graph {
        Topology::TriangleStar { branches, hops }.build().unwrap()
    }

    #[test]
    fn test_node_counts() {
        for branches in 1..=3 {
            for hops in 0..=4 {
                let graph = build(branches, hops);
                assert_eq!(
                    graph.num_switches(),
                    CORE_COUNT + CORE_COUNT * branches * hops,
                    "wrong switch count for ({branches}, {hops})"
                );
                assert_eq!(
                    graph.num_hosts(),
                    CORE_COUNT * branches,
                    "wrong host count for ({branches}, {hops})"
                );
                assert_eq!(graph.num_nodes(), graph.num_switches() + graph.num_hosts());
            }
        }
    }

    #[test]
    fn test_edge_counts() {
        // ring + per branch: one chain link per hop (including the link to the core) plus the
        // host attachment
        for branches in 1..=3 {
            for hops in 0..=4 {
                let graph = build(branches, hops);
                assert_eq!(
                    graph.edges().len(),
                    CORE_COUNT + CORE_COUNT * branches * (hops + 1)
                );
            }
        }
    }

    #[test]
    fn test_core_ring() {
        let graph = build(1, 1);
        assert!(graph.has_edge("core0", "core1"));
        assert!(graph.has_edge("core1", "core2"));
        assert!(graph.has_edge("core2", "core0"));
    }

    #[test]
    fn test_branch_chain() {
        let graph = build(2, 3);
        assert!(graph.contains("core1branch1switch2"));
        assert!(!graph.contains("core1branch0switch3"));
        assert!(graph.has_edge("core1", "core1branch0switch0"));
        assert!(graph.has_edge("core1branch0switch0", "core1branch0switch1"));
        assert!(graph.has_edge("core1branch0switch1", "core1branch0switch2"));
        assert!(graph.has_edge("core1host0", "core1branch0switch2"));
        assert!(graph.has_edge("core1host1", "core1branch1switch2"));
    }

    #[test]
    fn test_zero_hops_attaches_hosts_to_core() {
        let graph = build(2, 0);
        for c in 0..CORE_COUNT {
            for b in 0..2 {
                assert!(graph.has_edge(&format!("core{c}host{b}"), &format!("core{c}")));
            }
        }
        assert!(!graph.nodes().iter().any(|n| n.name.contains("switch")));
    }

    #[test]
    fn test_deterministic() {
        assert_eq!(build(3, 2), build(3, 2));
        assert_ne!(build(3, 2), build(2, 3));
    }

    #[test]
    fn test_invalid_branches() {
        let result = Topology::TriangleStar {
            branches: 0,
            hops: 1,
        }
        .build();
        assert!(matches!(
            result,
            Err(ConfigError::InvalidTopology { branches: 0 })
        ));
    }

    #[test]
    fn test_fmt() {
        assert_eq!(
            Topology::TriangleStar {
                branches: 4,
                hops: 2
            }
            .fmt(),
            "TriangleStar_4_2"
        );
    }
}
