//! Minimal directed multigraph used to check pipelines for cycles.
//!
//! Vertices keep node input order and each vertex's outgoing arcs keep edge
//! input order, so traversal (and therefore the reported cycle) is
//! deterministic for a given submission.

use std::collections::HashMap;

#[derive(Debug, Clone, Copy)]
struct Arc {
    source: usize,
    target: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Finished,
}

#[derive(Debug, Default, Clone)]
pub struct DiGraph {
    index: HashMap<String, usize>,
    vertices: Vec<String>,
    adjacency: Vec<Vec<usize>>,
    arcs: Vec<Arc>,
}

impl DiGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a vertex, returning its index. Re-adding an id is a no-op.
    pub fn add_vertex(&mut self, id: &str) -> usize {
        if let Some(&idx) = self.index.get(id) {
            return idx;
        }
        let idx = self.vertices.len();
        self.index.insert(id.to_string(), idx);
        self.vertices.push(id.to_string());
        self.adjacency.push(Vec::new());
        idx
    }

    /// Adds an arc between two vertices, creating missing endpoints.
    /// Parallel arcs and self-loops are kept as separate arcs.
    pub fn add_arc(&mut self, source: &str, target: &str) {
        let source = self.add_vertex(source);
        let target = self.add_vertex(target);
        self.adjacency[source].push(self.arcs.len());
        self.arcs.push(Arc { source, target });
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn arc_count(&self) -> usize {
        self.arcs.len()
    }

    pub fn is_acyclic(&self) -> bool {
        self.find_cycle().is_none()
    }

    /// Depth-first search with three-state marking. The first arc that
    /// reaches an in-progress vertex closes a cycle; the witness runs from
    /// that vertex along the DFS tree and ends with the closing arc.
    ///
    /// The witness is the first one found in traversal order, not
    /// necessarily the shortest.
    pub fn find_cycle(&self) -> Option<Vec<(String, String)>> {
        let mut marks = vec![Mark::Unvisited; self.vertices.len()];
        let mut parent_arc: Vec<Option<usize>> = vec![None; self.vertices.len()];

        for root in 0..self.vertices.len() {
            if marks[root] != Mark::Unvisited {
                continue;
            }
            marks[root] = Mark::InProgress;
            // (vertex, position of the next outgoing arc to explore)
            let mut stack: Vec<(usize, usize)> = vec![(root, 0)];

            while let Some(frame) = stack.last_mut() {
                let (vertex, cursor) = *frame;
                let Some(&arc_idx) = self.adjacency[vertex].get(cursor) else {
                    marks[vertex] = Mark::Finished;
                    stack.pop();
                    continue;
                };
                frame.1 += 1;

                let next = self.arcs[arc_idx].target;
                match marks[next] {
                    Mark::Unvisited => {
                        marks[next] = Mark::InProgress;
                        parent_arc[next] = Some(arc_idx);
                        stack.push((next, 0));
                    }
                    Mark::InProgress => return Some(self.witness(arc_idx, &parent_arc)),
                    Mark::Finished => {}
                }
            }
        }

        None
    }

    fn witness(&self, closing: usize, parent_arc: &[Option<usize>]) -> Vec<(String, String)> {
        let start = self.arcs[closing].target;
        let mut path = vec![closing];
        let mut vertex = self.arcs[closing].source;
        while vertex != start {
            let Some(arc_idx) = parent_arc[vertex] else {
                break;
            };
            path.push(arc_idx);
            vertex = self.arcs[arc_idx].source;
        }
        path.reverse();
        path.into_iter()
            .map(|idx| {
                let arc = self.arcs[idx];
                (
                    self.vertices[arc.source].clone(),
                    self.vertices[arc.target].clone(),
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::DiGraph;

    fn graph(vertices: &[&str], arcs: &[(&str, &str)]) -> DiGraph {
        let mut graph = DiGraph::new();
        for v in vertices {
            graph.add_vertex(v);
        }
        for (s, t) in arcs {
            graph.add_arc(s, t);
        }
        graph
    }

    #[test]
    fn isolated_vertices_are_counted() {
        let g = graph(&["a", "b", "c"], &[]);
        assert_eq!(g.vertex_count(), 3);
        assert_eq!(g.arc_count(), 0);
        assert!(g.is_acyclic());
    }

    #[test]
    fn parallel_arcs_are_not_merged() {
        let g = graph(&["a", "b"], &[("a", "b"), ("a", "b")]);
        assert_eq!(g.arc_count(), 2);
        assert!(g.is_acyclic());
    }

    #[test]
    fn self_loop_is_a_single_arc_cycle() {
        let g = graph(&["a"], &[("a", "a")]);
        assert_eq!(g.find_cycle(), Some(vec![("a".into(), "a".into())]));
    }

    #[test]
    fn diamond_is_acyclic() {
        let g = graph(
            &["a", "b", "c", "d"],
            &[("a", "b"), ("a", "c"), ("b", "d"), ("c", "d")],
        );
        assert!(g.is_acyclic());
    }

    #[test]
    fn witness_skips_the_acyclic_prefix() {
        let g = graph(
            &["root", "x", "y", "z"],
            &[("root", "x"), ("x", "y"), ("y", "z"), ("z", "x")],
        );
        let cycle = g.find_cycle().unwrap();
        assert_eq!(
            cycle,
            vec![
                ("x".to_string(), "y".to_string()),
                ("y".to_string(), "z".to_string()),
                ("z".to_string(), "x".to_string()),
            ]
        );
    }

    #[test]
    fn two_vertex_cycle_through_parallel_arc() {
        let g = graph(&["a", "b"], &[("a", "b"), ("a", "b"), ("b", "a")]);
        let cycle = g.find_cycle().unwrap();
        assert_eq!(cycle.len(), 2);
        assert_eq!(cycle[0].0, cycle[1].1);
    }

    #[test]
    fn long_chain_does_not_overflow_the_stack() {
        let mut g = DiGraph::new();
        let ids: Vec<String> = (0..100_000).map(|i| format!("n{i}")).collect();
        for pair in ids.windows(2) {
            g.add_arc(&pair[0], &pair[1]);
        }
        assert!(g.is_acyclic());
        g.add_arc(&ids[ids.len() - 1], &ids[0]);
        assert_eq!(g.find_cycle().map(|c| c.len()), Some(ids.len()));
    }
}
