use crate::clearance::ClearanceTable;
use crate::map::{Capability, Point, TileMap};
use crate::search::AnnotatedSearch;

pub const CARDINAL_COST: f64 = 1.0;
pub const DIAGONAL_COST: f64 = std::f64::consts::SQRT_2;

/// 8-connected neighbourhood, cardinals first.
pub const NEIGHBOUR_OFFSETS: [(i64, i64); 8] = [
    (1, 0),
    (-1, 0),
    (0, 1),
    (0, -1),
    (1, 1),
    (1, -1),
    (-1, 1),
    (-1, -1),
];

pub fn step_cost(dx: i64, dy: i64) -> f64 {
    if dx == 0 || dy == 0 {
        CARDINAL_COST
    } else {
        DIAGONAL_COST
    }
}

/// A level-0 graph node: one per non-obstacle tile.
#[derive(Clone, Debug)]
pub struct TileNode {
    pub pos: Point,
    pub terrain_capability: Capability,
    /// Always 0 for tiles; checked by the surgeon before insertion.
    pub level: u8,
}

/// The level-0 graph. Nodes are stored explicitly; edges are implicit grid
/// adjacency between non-obstacle tiles. No terrain filtering happens here:
/// whether an edge is usable is decided per-agent at search time, so one
/// base graph serves every (capability, clearance) profile.
#[derive(Clone, Debug)]
pub struct BaseGraph {
    width: u32,
    nodes: Vec<Option<TileNode>>,
    num_nodes: usize,
}

impl BaseGraph {
    pub fn build(map: &TileMap) -> BaseGraph {
        let mut nodes = Vec::with_capacity((map.width() * map.height()) as usize);
        let mut num_nodes = 0;
        for y in 0..map.height() {
            for x in 0..map.width() {
                let p = Point::new(x, y);
                let node = map.terrain(p).capability().map(|cap| {
                    num_nodes += 1;
                    TileNode {
                        pos: p,
                        terrain_capability: cap,
                        level: 0,
                    }
                });
                nodes.push(node);
            }
        }
        BaseGraph {
            width: map.width(),
            nodes,
            num_nodes,
        }
    }

    pub fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    pub fn node_at(&self, p: Point) -> Option<&TileNode> {
        self.nodes
            .get((p.y * self.width + p.x) as usize)
            .and_then(|n| n.as_ref())
    }

    /// Adjacent non-obstacle tiles of `p` with their step costs.
    pub fn neighbours<'a>(
        &'a self,
        map: &'a TileMap,
        p: Point,
    ) -> impl Iterator<Item = (Point, f64)> + 'a {
        NEIGHBOUR_OFFSETS.iter().filter_map(move |&(dx, dy)| {
            let nx = p.x as i64 + dx;
            let ny = p.y as i64 + dy;
            match map.get(nx, ny) {
                Some(t) if !t.is_obstacle() => {
                    Some((Point::new(nx as u32, ny as u32), step_cost(dx, dy)))
                }
                _ => None,
            }
        })
    }

    /// Clearance of the base edge `(a, b)` under capability `cap`: the
    /// minimum of the endpoint clearances.
    pub fn edge_clearance(
        &self,
        map: &TileMap,
        table: &ClearanceTable,
        a: Point,
        b: Point,
        cap: Capability,
    ) -> u16 {
        table
            .clearance(map, a, cap)
            .min(table.clearance(map, b, cap))
    }

    /// Whether a (capability, clearance)-constrained path exists between two
    /// tiles. This runs a full annotated A*; it exists as a convenience for
    /// callers probing reachability and plays no part in abstraction
    /// construction.
    pub fn pathable(
        &self,
        map: &TileMap,
        table: &ClearanceTable,
        from: Point,
        to: Point,
        cap: Capability,
        clearance: u16,
    ) -> bool {
        let mut search = AnnotatedSearch::new(cap, clearance);
        search.grid_path(map, table, None, from, to).is_some()
    }
}
