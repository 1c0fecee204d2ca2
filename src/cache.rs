use crate::graph::EdgeId;
use crate::map::Point;
use std::collections::BTreeMap;

/// Concrete level-0 paths backing abstract edges, keyed by edge id.
///
/// Paths are canonicalised at insert time to run from the edge's `from`
/// endpoint to its `to` endpoint, so lookups reverse at most once and
/// re-entrant queries never double-reverse a stored path.
#[derive(Clone, Debug, Default)]
pub struct PathCache {
    paths: BTreeMap<EdgeId, Vec<Point>>,
}

impl PathCache {
    pub fn new() -> PathCache {
        PathCache::default()
    }

    /// Installs the path for `edge`. `from_origin` is the tile of the
    /// edge's `from` endpoint; a path arriving in the opposite orientation
    /// is reversed before storage. A path matching neither endpoint is a
    /// construction bug.
    pub fn insert(&mut self, edge: EdgeId, from_origin: Point, mut path: Vec<Point>) {
        assert!(!path.is_empty(), "refusing to cache an empty path");
        if path[0] != from_origin {
            path.reverse();
        }
        assert_eq!(
            path[0], from_origin,
            "cached path endpoints do not match the edge"
        );
        self.paths.insert(edge, path);
    }

    pub fn get(&self, edge: EdgeId) -> Option<&Vec<Point>> {
        self.paths.get(&edge)
    }

    pub fn remove(&mut self, edge: EdgeId) -> Option<Vec<Point>> {
        self.paths.remove(&edge)
    }

    pub fn contains(&self, edge: EdgeId) -> bool {
        self.paths.contains_key(&edge)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (EdgeId, &Vec<Point>)> + '_ {
        self.paths.iter().map(|(k, v)| (*k, v))
    }
}
