use crate::abstraction::ClusterAbstraction;
use crate::base_graph::step_cost;
use crate::error::QueryError;
use crate::graph::NodeId;
use crate::map::{Capability, Point};
use crate::search::AnnotatedSearch;
use serde::Serialize;

/// A concrete level-0 path: contiguous in the 8-connected sense, every
/// step admissible under the query's (capability, clearance).
#[derive(Clone, Debug, Serialize)]
pub struct ConcretePath {
    pub tiles: Vec<Point>,
    pub cost: f64,
}

/// Outcome of a plan query. `Unreachable` is a normal result, not an
/// error; validation failures surface as [`QueryError`].
#[derive(Clone, Debug, Serialize)]
pub enum PlanOutcome {
    Path(ConcretePath),
    Unreachable,
}

impl PlanOutcome {
    pub fn path(&self) -> Option<&ConcretePath> {
        match self {
            PlanOutcome::Path(p) => Some(p),
            PlanOutcome::Unreachable => None,
        }
    }
}

impl ClusterAbstraction {
    /// Answers a path query for an agent described by `(capability,
    /// clearance)`: inserts the endpoints, searches the abstract graph,
    /// expands the abstract edge sequence through the path cache, and
    /// removes the endpoints again before returning.
    pub fn plan(
        &mut self,
        start: Option<Point>,
        goal: Option<Point>,
        capability: Capability,
        clearance: u16,
    ) -> Result<PlanOutcome, QueryError> {
        let (abs_start, abs_goal) = self.insert_start_goal(start, goal)?;

        let mut search = AnnotatedSearch::new(capability, clearance);
        let abstract_path = search.abstract_path(&self.graph, abs_start, abs_goal, |e| {
            e.admits(capability, clearance)
        });
        self.stats.search = search.stats;

        let outcome = match abstract_path {
            None => PlanOutcome::Unreachable,
            Some(nodes) => PlanOutcome::Path(self.expand(&nodes, capability, clearance)),
        };

        // The surgeon always runs, also on the unreachable outcome.
        self.remove_start_goal()?;
        Ok(outcome)
    }

    /// Stitches the cached concrete segments of consecutive abstract edges
    /// into one contiguous path. Cached paths are stored oriented from the
    /// edge's `from` endpoint, so a segment traversed the other way is
    /// reversed once here. A missing cache entry or a junction mismatch
    /// means the cache no longer describes the graph, which is not a
    /// recoverable condition.
    fn expand(&self, nodes: &[NodeId], capability: Capability, clearance: u16) -> ConcretePath {
        let origin = |n: NodeId| self.graph.node(n).expect("abstract path node").origin;
        if nodes.len() == 1 {
            return ConcretePath {
                tiles: vec![origin(nodes[0])],
                cost: 0.0,
            };
        }

        let mut tiles: Vec<Point> = Vec::new();
        for pair in nodes.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            let edge = self
                .graph
                .find_annotated_edge(a, b, capability, clearance, f64::INFINITY)
                .unwrap_or_else(|| {
                    panic!(
                        "path cache corrupted: no admissible edge between {:?} and {:?}",
                        a, b
                    )
                });
            let mut segment = self
                .cache
                .get(edge.id)
                .unwrap_or_else(|| {
                    panic!("path cache corrupted: edge {:?} has no cached path", edge.id)
                })
                .clone();
            if edge.from != a {
                segment.reverse();
            }
            if tiles.is_empty() {
                tiles = segment;
            } else {
                assert_eq!(
                    tiles.last(),
                    segment.first(),
                    "path cache corrupted: segments do not overlap at {:?}",
                    a
                );
                tiles.extend(segment.into_iter().skip(1));
            }
        }

        let cost = tiles
            .windows(2)
            .map(|w| step_cost(w[1].x as i64 - w[0].x as i64, w[1].y as i64 - w[0].y as i64))
            .sum();
        ConcretePath { tiles, cost }
    }
}
