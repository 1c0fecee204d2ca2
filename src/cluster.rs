use crate::graph::{ClusterId, NodeId};
use crate::map::{Point, Rect};

/// An axis-aligned rectangular region of the grid, at most S x S tiles.
/// Clusters tile the map in row-major order; the rightmost column and the
/// bottom row may be narrower.
#[derive(Clone, Debug)]
pub struct Cluster {
    pub id: ClusterId,
    pub origin: Point,
    pub width: u32,
    pub height: u32,
    /// Abstract nodes currently belonging to this cluster, in creation
    /// order. Mutated by the entrance builder and the surgeon.
    pub parents: Vec<NodeId>,
}

impl Cluster {
    pub fn bounds(&self) -> Rect {
        Rect {
            min: self.origin,
            max: Point::new(
                self.origin.x + self.width - 1,
                self.origin.y + self.height - 1,
            ),
        }
    }

    pub fn contains(&self, p: Point) -> bool {
        self.bounds().contains(p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_are_inclusive() {
        let c = Cluster {
            id: ClusterId(0),
            origin: Point::new(5, 10),
            width: 5,
            height: 3,
            parents: Vec::new(),
        };
        assert!(c.contains(Point::new(5, 10)));
        assert!(c.contains(Point::new(9, 12)));
        assert!(!c.contains(Point::new(10, 10)));
        assert!(!c.contains(Point::new(5, 13)));
    }
}
