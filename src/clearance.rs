use crate::map::{Capability, Point, TileMap};

/// Per-tile, per-capability-class clearance values.
///
/// `clearance[t, C]` is the side length of the largest square of
/// C-traversable tiles whose top-left corner is `t`, or 0 when `t` itself is
/// not C-traversable. Values are produced by a single sweep from the
/// bottom-right corner:
///
/// ```text
/// clearance[t, C] = 1 + min(clearance[E], clearance[S], clearance[SE])
/// ```
///
/// where a missing neighbour (map border or obstacle) contributes 0.
#[derive(Clone, Debug)]
pub struct ClearanceTable {
    classes: Vec<Capability>,
    /// bits -> index into `classes`/`values`, or usize::MAX.
    class_slot: Vec<usize>,
    /// One row-major value grid per class.
    values: Vec<Vec<u16>>,
}

impl ClearanceTable {
    pub fn build(map: &TileMap, classes: &[Capability]) -> ClearanceTable {
        let mut class_slot = vec![usize::MAX; 1 << 8];
        for (i, c) in classes.iter().enumerate() {
            class_slot[c.bits() as usize] = i;
        }

        let w = map.width() as i64;
        let h = map.height() as i64;
        let mut values = vec![vec![0u16; (w * h) as usize]; classes.len()];

        for (slot, cap) in classes.iter().enumerate() {
            let grid = &mut values[slot];
            for y in (0..h).rev() {
                for x in (0..w).rev() {
                    let traversable = map
                        .get(x, y)
                        .and_then(|t| t.capability())
                        .map_or(false, |bit| cap.contains(bit));
                    if !traversable {
                        continue; // stays 0
                    }
                    let at = |nx: i64, ny: i64| -> u16 {
                        if nx >= w || ny >= h {
                            0
                        } else {
                            grid[(ny * w + nx) as usize]
                        }
                    };
                    let m = at(x + 1, y).min(at(x, y + 1)).min(at(x + 1, y + 1));
                    grid[(y * w + x) as usize] = m + 1;
                }
            }
        }

        ClearanceTable {
            classes: classes.to_vec(),
            class_slot,
            values,
        }
    }

    pub fn classes(&self) -> &[Capability] {
        &self.classes
    }

    /// Clearance of `p` under capability class `cap`; 0 for unknown classes.
    pub fn clearance(&self, map: &TileMap, p: Point, cap: Capability) -> u16 {
        let slot = self.class_slot[cap.bits() as usize];
        if slot == usize::MAX {
            return 0;
        }
        self.values[slot][map.index(p)]
    }

    /// True when `p` can be entered at all by an agent with capability `cap`.
    pub fn traversable(&self, map: &TileMap, p: Point, cap: Capability) -> bool {
        self.clearance(map, p, cap) >= 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::Capability as Cap;

    fn table(text: &str) -> (TileMap, ClearanceTable) {
        let map = TileMap::parse(text).unwrap();
        let classes = Cap::classes(Cap::GROUND | Cap::TREES);
        let t = ClearanceTable::build(&map, &classes);
        (map, t)
    }

    #[test]
    fn recurrence_on_open_three_by_three() {
        let (map, t) = table("...\n...\n...\n");
        let expected = [[3, 2, 1], [2, 2, 1], [1, 1, 1]];
        for y in 0..3u32 {
            for x in 0..3u32 {
                assert_eq!(
                    t.clearance(&map, Point::new(x, y), Cap::GROUND),
                    expected[y as usize][x as usize],
                    "clearance mismatch at ({},{})",
                    x,
                    y
                );
            }
        }
    }

    #[test]
    fn wrong_terrain_class_yields_zero() {
        let (map, t) = table("..\n.T\n");
        let trees_tile = Point::new(1, 1);
        assert_eq!(t.clearance(&map, trees_tile, Cap::GROUND), 0);
        assert_eq!(t.clearance(&map, trees_tile, Cap::TREES), 1);
        assert_eq!(t.clearance(&map, trees_tile, Cap::GROUND | Cap::TREES), 1);
        // The mixed class sees the whole 2x2 block as traversable.
        assert_eq!(
            t.clearance(&map, Point::new(0, 0), Cap::GROUND | Cap::TREES),
            2
        );
        // The ground-only class is interrupted by the trees tile.
        assert_eq!(t.clearance(&map, Point::new(0, 0), Cap::GROUND), 1);
    }

    #[test]
    fn obstacle_neighbour_caps_clearance_at_one() {
        let (map, t) = table("..\n.@\n");
        assert_eq!(t.clearance(&map, Point::new(0, 0), Cap::GROUND), 1);
        assert_eq!(t.clearance(&map, Point::new(1, 1), Cap::GROUND), 0);
        assert!(!t.traversable(&map, Point::new(1, 1), Cap::GROUND));
    }

    #[test]
    fn unknown_class_is_zero() {
        let map = TileMap::parse("..\n..\n").unwrap();
        let t = ClearanceTable::build(&map, &[Cap::GROUND]);
        assert_eq!(t.clearance(&map, Point::new(0, 0), Cap::TREES), 0);
    }
}
