use crate::clearance::ClearanceTable;
use crate::graph::{AbstractGraph, AnnotatedEdge, NodeId};
use crate::map::{Capability, Point, Rect, TileMap};
use crate::base_graph::{step_cost, DIAGONAL_COST, NEIGHBOUR_OFFSETS};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap};
use std::time::{Duration, Instant};

/// Effort counters for one or more searches. `peak_memory` is the largest
/// combined size of the open and closed sets seen during the search.
#[derive(Clone, Copy, Debug, Default, Serialize)]
pub struct SearchStats {
    pub nodes_expanded: u64,
    pub nodes_touched: u64,
    pub peak_memory: usize,
    #[serde(with = "duration_micros")]
    pub search_time: Duration,
}

mod duration_micros {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u128(d.as_micros())
    }
}

impl SearchStats {
    pub fn reset(&mut self) {
        *self = SearchStats::default();
    }

    pub fn absorb(&mut self, other: &SearchStats) {
        self.nodes_expanded += other.nodes_expanded;
        self.nodes_touched += other.nodes_touched;
        self.peak_memory = self.peak_memory.max(other.peak_memory);
        self.search_time += other.search_time;
    }
}

/// Octile distance: straight-line steps plus the diagonal correction.
pub fn octile(a: Point, b: Point) -> f64 {
    let dx = (a.x as i64 - b.x as i64).abs() as f64;
    let dy = (a.y as i64 - b.y as i64).abs() as f64;
    dx.max(dy) + (DIAGONAL_COST - 1.0) * dx.min(dy)
}

#[derive(Clone, Debug)]
pub struct GridPath {
    pub tiles: Vec<Point>,
    pub cost: f64,
}

/// A* parameterised by an agent profile. Relaxation only admits steps (or
/// abstract edges) whose clearance under `capability` is at least
/// `clearance`; everything else about the map stays visible but unusable.
#[derive(Debug)]
pub struct AnnotatedSearch {
    pub capability: Capability,
    pub clearance: u16,
    pub stats: SearchStats,
}

#[derive(Clone, Copy, PartialEq)]
struct GridEntry {
    f: f64,
    g: f64,
    tile: Point,
}

impl Eq for GridEntry {}

impl Ord for GridEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap: invert f for min-f, prefer larger g on
        // ties, then the smaller tile for determinism.
        other
            .f
            .total_cmp(&self.f)
            .then_with(|| self.g.total_cmp(&other.g))
            .then_with(|| other.tile.cmp(&self.tile))
    }
}

impl PartialOrd for GridEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Clone, Copy, PartialEq)]
struct GraphEntry {
    f: f64,
    g: f64,
    node: NodeId,
}

impl Eq for GraphEntry {}

impl Ord for GraphEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .f
            .total_cmp(&self.f)
            .then_with(|| self.g.total_cmp(&other.g))
            .then_with(|| other.node.cmp(&self.node))
    }
}

impl PartialOrd for GraphEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl AnnotatedSearch {
    pub fn new(capability: Capability, clearance: u16) -> AnnotatedSearch {
        AnnotatedSearch {
            capability,
            clearance,
            stats: SearchStats::default(),
        }
    }

    /// Least-cost path over the level-0 grid, optionally restricted to
    /// `bounds` (used for intra-cluster searches). Returns `None` when no
    /// admissible path exists.
    pub fn grid_path(
        &mut self,
        map: &TileMap,
        table: &ClearanceTable,
        bounds: Option<Rect>,
        start: Point,
        goal: Point,
    ) -> Option<GridPath> {
        let t0 = Instant::now();
        let out = self.grid_path_inner(map, table, bounds, start, goal);
        self.stats.search_time += t0.elapsed();
        out
    }

    fn grid_path_inner(
        &mut self,
        map: &TileMap,
        table: &ClearanceTable,
        bounds: Option<Rect>,
        start: Point,
        goal: Point,
    ) -> Option<GridPath> {
        let in_bounds = |p: Point| -> bool {
            map.contains(p) && bounds.map_or(true, |r| r.contains(p))
        };
        if !in_bounds(start) || !in_bounds(goal) {
            return None;
        }
        if table.clearance(map, start, self.capability) < self.clearance.max(1)
            || table.clearance(map, goal, self.capability) < self.clearance.max(1)
        {
            return None;
        }

        let mut open = BinaryHeap::new();
        let mut g_score: BTreeMap<Point, f64> = BTreeMap::new();
        let mut came_from: BTreeMap<Point, Point> = BTreeMap::new();
        let mut closed: BTreeSet<Point> = BTreeSet::new();

        g_score.insert(start, 0.0);
        open.push(GridEntry {
            f: octile(start, goal),
            g: 0.0,
            tile: start,
        });
        self.stats.nodes_touched += 1;

        while let Some(GridEntry { tile, g, .. }) = open.pop() {
            if closed.contains(&tile) {
                continue;
            }
            closed.insert(tile);
            self.stats.nodes_expanded += 1;
            self.stats.peak_memory = self.stats.peak_memory.max(open.len() + closed.len());

            if tile == goal {
                let mut tiles = vec![tile];
                let mut cur = tile;
                while let Some(&prev) = came_from.get(&cur) {
                    cur = prev;
                    tiles.push(cur);
                }
                tiles.reverse();
                return Some(GridPath { tiles, cost: g });
            }

            for &(dx, dy) in NEIGHBOUR_OFFSETS.iter() {
                let nx = tile.x as i64 + dx;
                let ny = tile.y as i64 + dy;
                if nx < 0 || ny < 0 {
                    continue;
                }
                let n = Point::new(nx as u32, ny as u32);
                if !in_bounds(n) || closed.contains(&n) {
                    continue;
                }
                if table.clearance(map, n, self.capability) < self.clearance.max(1) {
                    continue;
                }
                let tentative = g + step_cost(dx, dy);
                if tentative < *g_score.get(&n).unwrap_or(&f64::INFINITY) {
                    g_score.insert(n, tentative);
                    came_from.insert(n, tile);
                    self.stats.nodes_touched += 1;
                    open.push(GridEntry {
                        f: tentative + octile(n, goal),
                        g: tentative,
                        tile: n,
                    });
                }
            }
        }
        None
    }

    /// Least-cost node sequence over the abstract graph. `admit` is the
    /// edge-admissibility hook: a relaxation only considers edges for which
    /// it returns true. The usual predicate is
    /// `|e| e.admits(capability, clearance)`.
    pub fn abstract_path<F>(
        &mut self,
        graph: &AbstractGraph,
        from: NodeId,
        to: NodeId,
        admit: F,
    ) -> Option<Vec<NodeId>>
    where
        F: Fn(&AnnotatedEdge) -> bool,
    {
        let t0 = Instant::now();
        let out = self.abstract_path_inner(graph, from, to, admit);
        self.stats.search_time += t0.elapsed();
        out
    }

    fn abstract_path_inner<F>(
        &mut self,
        graph: &AbstractGraph,
        from: NodeId,
        to: NodeId,
        admit: F,
    ) -> Option<Vec<NodeId>>
    where
        F: Fn(&AnnotatedEdge) -> bool,
    {
        let origin = |n: NodeId| graph.node(n).map(|a| a.origin);
        let goal_origin = origin(to)?;
        origin(from)?;

        let mut open = BinaryHeap::new();
        let mut g_score: BTreeMap<NodeId, f64> = BTreeMap::new();
        let mut came_from: BTreeMap<NodeId, NodeId> = BTreeMap::new();
        let mut closed: BTreeSet<NodeId> = BTreeSet::new();

        g_score.insert(from, 0.0);
        open.push(GraphEntry {
            f: octile(origin(from)?, goal_origin),
            g: 0.0,
            node: from,
        });
        self.stats.nodes_touched += 1;

        while let Some(GraphEntry { node, g, .. }) = open.pop() {
            if closed.contains(&node) {
                continue;
            }
            closed.insert(node);
            self.stats.nodes_expanded += 1;
            self.stats.peak_memory = self.stats.peak_memory.max(open.len() + closed.len());

            if node == to {
                let mut path = vec![node];
                let mut cur = node;
                while let Some(&prev) = came_from.get(&cur) {
                    cur = prev;
                    path.push(cur);
                }
                path.reverse();
                return Some(path);
            }

            for (edge, other) in graph.neighbours(node) {
                if closed.contains(&other) || !admit(edge) {
                    continue;
                }
                let tentative = g + edge.weight;
                if tentative < *g_score.get(&other).unwrap_or(&f64::INFINITY) {
                    g_score.insert(other, tentative);
                    came_from.insert(other, node);
                    self.stats.nodes_touched += 1;
                    let h = match origin(other) {
                        Some(p) => octile(p, goal_origin),
                        None => continue,
                    };
                    open.push(GraphEntry {
                        f: tentative + h,
                        g: tentative,
                        node: other,
                    });
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{ClusterId, EdgeKind};
    use crate::map::Capability as Cap;

    fn setup(text: &str) -> (TileMap, ClearanceTable) {
        let map = TileMap::parse(text).unwrap();
        let classes = Cap::classes(Cap::GROUND | Cap::TREES);
        let table = ClearanceTable::build(&map, &classes);
        (map, table)
    }

    #[test]
    fn straight_corridor_costs_match_octile() {
        let (map, table) = setup("....\n....\n");
        let mut s = AnnotatedSearch::new(Cap::GROUND, 1);
        let p = s
            .grid_path(&map, &table, None, Point::new(0, 0), Point::new(3, 1))
            .unwrap();
        assert!((p.cost - (2.0 + DIAGONAL_COST)).abs() < 1e-9);
        assert_eq!(p.tiles.first(), Some(&Point::new(0, 0)));
        assert_eq!(p.tiles.last(), Some(&Point::new(3, 1)));
        assert!(s.stats.nodes_expanded > 0);
        assert!(s.stats.peak_memory > 0);
    }

    #[test]
    fn capability_blocks_terrain() {
        let (map, table) = setup(".T.\n.T.\n.T.\n");
        // Ground-only agent cannot cross the tree wall.
        let mut s = AnnotatedSearch::new(Cap::GROUND, 1);
        assert!(s
            .grid_path(&map, &table, None, Point::new(0, 1), Point::new(2, 1))
            .is_none());
        // Ground+trees agent walks straight through.
        let mut s = AnnotatedSearch::new(Cap::GROUND | Cap::TREES, 1);
        let p = s
            .grid_path(&map, &table, None, Point::new(0, 1), Point::new(2, 1))
            .unwrap();
        assert!((p.cost - 2.0).abs() < 1e-9);
    }

    #[test]
    fn clearance_blocks_narrow_gap() {
        // One-wide gap in an obstacle wall: passable at k=1, not at k=2.
        let (map, table) = setup("..@..\n..@..\n.....\n..@..\n..@..\n");
        let start = Point::new(0, 2);
        let goal = Point::new(4, 2);
        let mut s = AnnotatedSearch::new(Cap::GROUND, 1);
        assert!(s.grid_path(&map, &table, None, start, goal).is_some());
        let mut s = AnnotatedSearch::new(Cap::GROUND, 2);
        assert!(s.grid_path(&map, &table, None, start, goal).is_none());
    }

    #[test]
    fn bounds_restrict_the_search_area() {
        let (map, table) = setup("....\n@@..\n....\n");
        let bounds = Rect {
            min: Point::new(0, 0),
            max: Point::new(3, 0),
        };
        // Within the top row only, the detour around the wall is invisible.
        let mut s = AnnotatedSearch::new(Cap::GROUND, 1);
        let p = s
            .grid_path(&map, &table, Some(bounds), Point::new(0, 0), Point::new(3, 0))
            .unwrap();
        assert!((p.cost - 3.0).abs() < 1e-9);
        assert!(p.tiles.iter().all(|t| t.y == 0));
        // A goal outside the bounds is unreachable by definition.
        assert!(s
            .grid_path(&map, &table, Some(bounds), Point::new(0, 0), Point::new(0, 2))
            .is_none());
    }

    #[test]
    fn abstract_search_respects_edge_annotations() {
        let mut g = AbstractGraph::new();
        let a = g.add_node(Point::new(0, 0), ClusterId(0), 1);
        let b = g.add_node(Point::new(5, 0), ClusterId(1), 1);
        let c = g.add_node(Point::new(5, 5), ClusterId(2), 1);
        g.add_edge(a, b, 5.0, Cap::GROUND, 1, EdgeKind::Inter);
        g.add_edge(b, c, 5.0, Cap::GROUND, 1, EdgeKind::Inter);
        // Direct shortcut usable only by wide tree-capable agents.
        g.add_edge(a, c, 7.0, Cap::TREES, 3, EdgeKind::Inter);

        let mut s = AnnotatedSearch::new(Cap::GROUND, 1);
        let path = s
            .abstract_path(&g, a, c, |e| e.admits(Cap::GROUND, 1))
            .unwrap();
        assert_eq!(path, vec![a, b, c]);

        let mut s = AnnotatedSearch::new(Cap::GROUND | Cap::TREES, 3);
        let path = s
            .abstract_path(&g, a, c, |e| e.admits(Cap::GROUND | Cap::TREES, 3))
            .unwrap();
        assert_eq!(path, vec![a, c]);

        let mut s = AnnotatedSearch::new(Cap::TREES, 4);
        assert!(s
            .abstract_path(&g, a, c, |e| e.admits(Cap::TREES, 4))
            .is_none());
    }

    #[test]
    fn trivial_search_start_equals_goal() {
        let (map, table) = setup("..\n..\n");
        let mut s = AnnotatedSearch::new(Cap::GROUND, 1);
        let p = s
            .grid_path(&map, &table, None, Point::new(1, 1), Point::new(1, 1))
            .unwrap();
        assert_eq!(p.tiles, vec![Point::new(1, 1)]);
        assert_eq!(p.cost, 0.0);
    }
}
