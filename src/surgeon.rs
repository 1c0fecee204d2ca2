use crate::abstraction::{BuildState, ClusterAbstraction, QueryStats};
use crate::build::intra_connector::pair_candidates;
use crate::error::QueryError;
use crate::graph::{EdgeId, EdgeKind, NodeId};
use crate::map::Point;
use crate::search::SearchStats;
use std::time::Instant;

/// Book-keeping for one query's transient graph surgery. The journal lists
/// exactly the ids created by the most recent insert, so removal can undo
/// it perfectly.
#[derive(Clone, Debug, Default)]
pub struct SurgeonState {
    /// Transient start node, or `None` when an existing abstract node was
    /// reused and there is nothing to remove later.
    pub(crate) start: Option<NodeId>,
    pub(crate) goal: Option<NodeId>,
    pub(crate) journal_nodes: Vec<NodeId>,
    pub(crate) journal_edges: Vec<EdgeId>,
}

impl ClusterAbstraction {
    /// Injects start and goal endpoints into the abstract graph.
    ///
    /// Validation is complete before any mutation, so a failed insert
    /// leaves the abstraction untouched. Tiles that already carry an
    /// abstract node are reused; fresh nodes are connected to every other
    /// parent in their cluster, each feasible connection installing an
    /// intra-edge and a cached path. Returns the abstract node ids the
    /// query should search between.
    pub fn insert_start_goal(
        &mut self,
        start: Option<Point>,
        goal: Option<Point>,
    ) -> Result<(NodeId, NodeId), QueryError> {
        if self.state != BuildState::Ready {
            return Err(QueryError::InvalidState(self.state));
        }
        let start = self.validate_endpoint(start)?;
        let goal = self.validate_endpoint(goal)?;

        self.stats = QueryStats::default();
        let t0 = Instant::now();

        let abs_start = self.ensure_transient(start);
        let abs_goal = self.ensure_transient(goal);
        self.surgeon.start = if self.surgeon.journal_nodes.contains(&abs_start) {
            Some(abs_start)
        } else {
            None
        };
        self.surgeon.goal = if self.surgeon.journal_nodes.contains(&abs_goal) {
            Some(abs_goal)
        } else {
            None
        };

        self.stats.insertion.search_time = t0.elapsed();
        self.state = BuildState::Querying;
        Ok((abs_start, abs_goal))
    }

    /// Perfect inverse of the most recent insert: removes the journaled
    /// edges, cache entries and nodes, restores the affected tiles'
    /// parent labels and resets the endpoint slots.
    pub fn remove_start_goal(&mut self) -> Result<(), QueryError> {
        if self.state != BuildState::Querying {
            return Err(QueryError::InvalidState(self.state));
        }
        let edges = std::mem::take(&mut self.surgeon.journal_edges);
        for eid in edges {
            self.graph.remove_edge(eid);
            self.cache.remove(eid);
        }
        let nodes = std::mem::take(&mut self.surgeon.journal_nodes);
        for nid in nodes {
            if let Some(node) = self.graph.remove_node(nid) {
                self.clusters[node.cluster.0].parents.retain(|p| *p != nid);
                let idx = self.map.index(node.origin);
                self.parents[idx] = None;
            }
        }
        self.surgeon.start = None;
        self.surgeon.goal = None;
        self.state = BuildState::Ready;
        Ok(())
    }

    /// The transient node ids recorded by the last insert; `None` in a slot
    /// means that endpoint reused a pre-existing abstract node.
    pub fn transient_ids(&self) -> (Option<NodeId>, Option<NodeId>) {
        (self.surgeon.start, self.surgeon.goal)
    }

    fn validate_endpoint(&self, p: Option<Point>) -> Result<Point, QueryError> {
        let p = p.ok_or(QueryError::NullEndpoint)?;
        if !self.map.contains(p) {
            return Err(QueryError::NullEndpoint);
        }
        let node = self
            .base
            .node_at(p)
            .ok_or(QueryError::NonTraversableEndpoint)?;
        if node.level != 0 {
            return Err(QueryError::NonZeroAbstractionLevel(node.level));
        }
        if self.table.clearance(&self.map, p, node.terrain_capability) == 0 {
            return Err(QueryError::NonTraversableEndpoint);
        }
        Ok(p)
    }

    /// Resolves the abstract node for `tile`, creating, labelling and
    /// connecting a transient one when the tile has no parent yet.
    fn ensure_transient(&mut self, tile: Point) -> NodeId {
        let idx = self.map.index(tile);
        if let Some(id) = self.parents[idx] {
            return id;
        }
        let cluster = self.cluster_of(tile);
        let id = self.graph.add_node(tile, cluster, 1);
        self.parents[idx] = Some(id);
        self.clusters[cluster.0].parents.push(id);
        self.surgeon.journal_nodes.push(id);
        self.connect_transient(id);
        id
    }

    fn connect_transient(&mut self, id: NodeId) {
        let node = self.graph.node(id).expect("freshly created node").clone();
        let bounds = self.cluster_rect(node.cluster);
        let caps: Vec<_> = self.table.classes().to_vec();
        let others: Vec<NodeId> = self.clusters[node.cluster.0]
            .parents
            .iter()
            .copied()
            .filter(|p| *p != id)
            .collect();

        let mut insertion = SearchStats::default();
        for other in others {
            let other_origin = self.graph.node(other).expect("cluster parent").origin;
            let candidates = pair_candidates(
                self,
                bounds,
                node.origin,
                other_origin,
                &caps,
                &mut insertion,
            );
            for c in candidates {
                let eid = self.graph.add_edge(
                    id,
                    other,
                    c.cost,
                    c.capability,
                    c.clearance,
                    EdgeKind::Intra,
                );
                self.cache.insert(eid, node.origin, c.path);
                self.surgeon.journal_edges.push(eid);
            }
        }
        self.stats.insertion.absorb(&insertion);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::Quality;
    use crate::config::BuildOptions;
    use crate::map::TileMap;

    const OPEN_10X10: &str = "..........\n..........\n..........\n..........\n..........\n\
                              ..........\n..........\n..........\n..........\n..........\n";

    fn ready(text: &str, s: u32) -> ClusterAbstraction {
        let map = TileMap::parse(text).unwrap();
        let opts = BuildOptions {
            cluster_size: s,
            quality: Quality::High,
            ..BuildOptions::default()
        };
        ClusterAbstraction::build(map, &opts).unwrap().0
    }

    fn p(x: u32, y: u32) -> Point {
        Point::new(x, y)
    }

    #[test]
    fn insert_adds_two_transient_nodes_and_their_edges() {
        let mut aca = ready(OPEN_10X10, 5);
        let (n0, e0, c0) = (
            aca.abstract_graph().num_nodes(),
            aca.abstract_graph().num_edges(),
            aca.cache_len(),
        );
        let (s, g) = aca.insert_start_goal(Some(p(2, 2)), Some(p(7, 7))).unwrap();
        assert_eq!(aca.abstract_graph().num_nodes(), n0 + 2);
        // One dominant connection per other parent: two in the start
        // cluster, five in the goal cluster.
        assert_eq!(aca.abstract_graph().num_edges(), e0 + 7);
        assert_eq!(aca.cache_len(), c0 + 7);
        assert_eq!(aca.parent_of(p(2, 2)), Some(s));
        assert_eq!(aca.parent_of(p(7, 7)), Some(g));
        let (sid, gid) = aca.transient_ids();
        assert_eq!(sid, Some(s));
        assert_eq!(gid, Some(g));
        assert_eq!(aca.state(), BuildState::Querying);
        let stats = aca.query_stats();
        assert!(stats.insertion.nodes_expanded > 0);
        assert!(stats.insertion.peak_memory > 0);
    }

    #[test]
    fn remove_is_a_perfect_inverse() {
        let mut aca = ready(OPEN_10X10, 5);
        let (n0, e0, c0) = (
            aca.abstract_graph().num_nodes(),
            aca.abstract_graph().num_edges(),
            aca.cache_len(),
        );
        let parent_counts: Vec<usize> =
            aca.clusters().iter().map(|c| c.parents.len()).collect();

        aca.insert_start_goal(Some(p(2, 2)), Some(p(7, 7))).unwrap();
        aca.remove_start_goal().unwrap();

        assert_eq!(aca.abstract_graph().num_nodes(), n0);
        assert_eq!(aca.abstract_graph().num_edges(), e0);
        assert_eq!(aca.cache_len(), c0);
        assert_eq!(aca.parent_of(p(2, 2)), None);
        assert_eq!(aca.parent_of(p(7, 7)), None);
        assert_eq!(aca.transient_ids(), (None, None));
        assert_eq!(aca.state(), BuildState::Ready);
        let after: Vec<usize> = aca.clusters().iter().map(|c| c.parents.len()).collect();
        assert_eq!(parent_counts, after);
    }

    #[test]
    fn existing_abstract_node_is_reused_not_duplicated() {
        let mut aca = ready(OPEN_10X10, 5);
        // (4,2) carries an entrance node from construction.
        let existing = aca.parent_of(p(4, 2)).expect("entrance node expected");
        let n0 = aca.abstract_graph().num_nodes();

        let (s, g) = aca.insert_start_goal(Some(p(4, 2)), Some(p(7, 7))).unwrap();
        assert_eq!(s, existing);
        assert_eq!(aca.abstract_graph().num_nodes(), n0 + 1);
        let (sid, gid) = aca.transient_ids();
        assert_eq!(sid, None, "reused endpoint must not be journaled");
        assert_eq!(gid, Some(g));

        aca.remove_start_goal().unwrap();
        // The pre-existing node survives removal.
        assert_eq!(aca.parent_of(p(4, 2)), Some(existing));
        assert_eq!(aca.abstract_graph().num_nodes(), n0);
    }

    #[test]
    fn same_cluster_endpoints_connect_to_each_other() {
        let mut aca = ready(OPEN_10X10, 5);
        let (s, g) = aca.insert_start_goal(Some(p(1, 1)), Some(p(3, 3))).unwrap();
        assert!(aca
            .abstract_graph()
            .find_annotated_edge(s, g, crate::map::Capability::GROUND, 1, f64::INFINITY)
            .is_some());
        aca.remove_start_goal().unwrap();
    }

    #[test]
    fn validation_failures_leave_state_untouched() {
        let mut aca = ready(OPEN_10X10, 5);
        let n0 = aca.abstract_graph().num_nodes();

        let err = aca.insert_start_goal(None, Some(p(1, 1))).unwrap_err();
        assert_eq!(err, QueryError::NullEndpoint);
        let err = aca
            .insert_start_goal(Some(p(50, 1)), Some(p(1, 1)))
            .unwrap_err();
        assert_eq!(err, QueryError::NullEndpoint);

        assert_eq!(aca.state(), BuildState::Ready);
        assert_eq!(aca.abstract_graph().num_nodes(), n0);
        assert_eq!(aca.transient_ids(), (None, None));
    }

    #[test]
    fn obstacle_endpoint_is_rejected() {
        let mut aca = ready("..@.\n....\n....\n....\n", 2);
        let err = aca
            .insert_start_goal(Some(p(2, 0)), Some(p(0, 0)))
            .unwrap_err();
        assert_eq!(err, QueryError::NonTraversableEndpoint);
        assert_eq!(aca.state(), BuildState::Ready);
    }

    #[test]
    fn double_remove_is_rejected() {
        let mut aca = ready(OPEN_10X10, 5);
        aca.insert_start_goal(Some(p(1, 1)), Some(p(8, 8))).unwrap();
        aca.remove_start_goal().unwrap();
        let err = aca.remove_start_goal().unwrap_err();
        assert_eq!(err, QueryError::InvalidState(BuildState::Ready));
    }
}
