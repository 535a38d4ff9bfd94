/*
 * This source code is licensed under the Business Source License 1.1.
 */

//! Communication graph between agents.
//!
//! A trial draws a uniformly random labelled spanning tree by decoding a random
//! Prüfer sequence. Trees are acyclic, connected and carry exactly `n − 1`
//! edges, which is the minimum topology over which consensus still reaches
//! agreement.
//!
//! # Invariants
//! - Undirected and simple: no self-loops, no duplicate edges.
//! - `neighbors(v)` is O(1) to obtain and O(degree) to walk.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, VecDeque};

use hashbrown::HashSet;
use rand::Rng;

use crate::error::{DcgError, Result};

/// Undirected graph on nodes `0..n` stored as sorted adjacency lists.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommunicationGraph {
    adjacency: Vec<Vec<usize>>,
    edges: Vec<(usize, usize)>,
}

impl CommunicationGraph {
    /// Build a graph from an explicit edge list.
    ///
    /// Edges are normalised to `(min, max)`. Self-loops, duplicates and
    /// out-of-range endpoints are rejected.
    pub fn from_edges(n: usize, edges: &[(usize, usize)]) -> Result<Self> {
        if n == 0 {
            return Err(DcgError::InvalidGraph("graph must have at least one node".into()));
        }
        let mut adjacency = vec![Vec::new(); n];
        let mut seen = HashSet::with_capacity(edges.len());
        let mut normalised = Vec::with_capacity(edges.len());

        for &(u, v) in edges {
            if u >= n || v >= n {
                return Err(DcgError::InvalidGraph(format!(
                    "edge ({u}, {v}) references a node outside 0..{n}"
                )));
            }
            if u == v {
                return Err(DcgError::InvalidGraph(format!("self-loop on node {u}")));
            }
            let edge = (u.min(v), u.max(v));
            if !seen.insert(edge) {
                return Err(DcgError::InvalidGraph(format!("duplicate edge ({}, {})", edge.0, edge.1)));
            }
            adjacency[u].push(v);
            adjacency[v].push(u);
            normalised.push(edge);
        }
        for list in &mut adjacency {
            list.sort_unstable();
        }

        Ok(Self { adjacency, edges: normalised })
    }

    /// Draw a uniformly random labelled spanning tree on `n` nodes.
    pub fn random_tree<R: Rng + ?Sized>(n: usize, rng: &mut R) -> Result<Self> {
        match n {
            0 => return Self::from_edges(0, &[]),
            1 => return Self::from_edges(1, &[]),
            2 => return Self::from_edges(2, &[(0, 1)]),
            _ => {}
        }

        let prufer: Vec<usize> = (0..n - 2).map(|_| rng.gen_range(0..n)).collect();
        let mut degree = vec![1usize; n];
        for &v in &prufer {
            degree[v] += 1;
        }

        let mut leaves: BinaryHeap<Reverse<usize>> =
            (0..n).filter(|&v| degree[v] == 1).map(Reverse).collect();
        let mut edges = Vec::with_capacity(n - 1);
        let exhausted = || DcgError::InvalidGraph("prufer decoding ran out of leaves".into());

        for &v in &prufer {
            let Reverse(leaf) = leaves.pop().ok_or_else(exhausted)?;
            edges.push((leaf, v));
            degree[v] -= 1;
            if degree[v] == 1 {
                leaves.push(Reverse(v));
            }
        }
        let Reverse(u) = leaves.pop().ok_or_else(exhausted)?;
        let Reverse(w) = leaves.pop().ok_or_else(exhausted)?;
        edges.push((u, w));

        Self::from_edges(n, &edges)
    }

    /// Number of nodes.
    pub fn node_count(&self) -> usize {
        self.adjacency.len()
    }

    /// Number of undirected edges.
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Edges as `(min, max)` pairs in insertion order.
    pub fn edges(&self) -> &[(usize, usize)] {
        &self.edges
    }

    /// Sorted neighbours of `node`. Empty for out-of-range nodes.
    pub fn neighbors(&self, node: usize) -> &[usize] {
        self.adjacency.get(node).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Degree of `node`.
    pub fn degree(&self, node: usize) -> usize {
        self.neighbors(node).len()
    }

    /// Largest degree over all nodes.
    pub fn max_degree(&self) -> usize {
        self.adjacency.iter().map(Vec::len).max().unwrap_or(0)
    }

    /// Number of connected components (BFS).
    pub fn components(&self) -> usize {
        let n = self.node_count();
        let mut visited = vec![false; n];
        let mut queue = VecDeque::new();
        let mut components = 0;

        for start in 0..n {
            if visited[start] {
                continue;
            }
            components += 1;
            visited[start] = true;
            queue.push_back(start);
            while let Some(u) = queue.pop_front() {
                for &v in &self.adjacency[u] {
                    if !visited[v] {
                        visited[v] = true;
                        queue.push_back(v);
                    }
                }
            }
        }
        components
    }

    /// `true` when every node is reachable from every other.
    pub fn is_connected(&self) -> bool {
        self.components() == 1
    }

    /// `true` when the graph is a spanning tree.
    pub fn is_tree(&self) -> bool {
        self.edge_count() + 1 == self.node_count() && self.is_connected()
    }

    /// Fail with [`DcgError::DisconnectedGraph`] unless connected.
    pub fn ensure_connected(&self) -> Result<()> {
        let components = self.components();
        if components != 1 {
            return Err(DcgError::DisconnectedGraph { nodes: self.node_count(), components });
        }
        Ok(())
    }
}
