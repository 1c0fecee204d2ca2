use anyhow::{bail, Context, Result};
use bitflags::bitflags;
use serde::Serialize;
use std::fmt;
use std::path::Path;

bitflags! {
    /// Terrain capability mask. An agent's capability is the union of the
    /// terrain bits it may enter; a tile's terrain is always a single bit.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct Capability: u8 {
        const GROUND = 1 << 0;
        const TREES  = 1 << 1;
    }
}

impl Capability {
    /// All non-empty subsets of `valid`, in ascending bit order. These are
    /// the capability classes the clearance table is computed for.
    pub fn classes(valid: Capability) -> Vec<Capability> {
        let bits = valid.bits();
        (1..=bits)
            .filter(|m| m & bits == *m)
            .map(Capability::from_bits_truncate)
            .collect()
    }

    /// Parses a comma-separated capability list, e.g. "ground,trees".
    pub fn parse_list(input: &str) -> Result<Capability> {
        let mut cap = Capability::empty();
        for part in input.split(',') {
            let t = part.trim();
            if t.is_empty() {
                continue;
            }
            match t.to_ascii_lowercase().as_str() {
                "ground" => cap |= Capability::GROUND,
                "trees" => cap |= Capability::TREES,
                other => bail!("unknown terrain name: {}", other),
            }
        }
        if cap.is_empty() {
            bail!("capability list is empty: {:?}", input);
        }
        Ok(cap)
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = Vec::new();
        if self.contains(Capability::GROUND) {
            names.push("ground");
        }
        if self.contains(Capability::TREES) {
            names.push("trees");
        }
        write!(f, "{}", names.join("+"))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Terrain {
    Ground,
    Trees,
    Obstacle,
}

impl Terrain {
    pub fn from_glyph(c: char) -> Result<Terrain> {
        match c {
            '.' | 'G' => Ok(Terrain::Ground),
            'T' => Ok(Terrain::Trees),
            '@' | 'O' => Ok(Terrain::Obstacle),
            other => bail!("unknown map glyph: {:?}", other),
        }
    }

    /// The single capability bit for this terrain; `None` for obstacles.
    pub fn capability(self) -> Option<Capability> {
        match self {
            Terrain::Ground => Some(Capability::GROUND),
            Terrain::Trees => Some(Capability::TREES),
            Terrain::Obstacle => None,
        }
    }

    pub fn is_obstacle(self) -> bool {
        matches!(self, Terrain::Obstacle)
    }
}

/// Tile coordinates. `(0, 0)` is the top-left corner; x grows east, y south.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Point {
    pub x: u32,
    pub y: u32,
}

impl Point {
    pub fn new(x: u32, y: u32) -> Point {
        Point { x, y }
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.x, self.y)
    }
}

/// Inclusive axis-aligned rectangle of tiles.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rect {
    pub min: Point,
    pub max: Point,
}

impl Rect {
    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }
}

/// A rectangular terrain grid parsed from an ASCII description.
///
/// Accepts either a bare glyph grid or the four-line `type octile` header
/// used by the HOG benchmark maps.
#[derive(Clone, Debug)]
pub struct TileMap {
    width: u32,
    height: u32,
    terrain: Vec<Terrain>,
}

impl TileMap {
    pub fn parse(text: &str) -> Result<TileMap> {
        let mut lines = text.lines().map(str::trim_end).peekable();

        // Skip the benchmark header if present; dimensions are re-derived
        // from the glyph rows either way.
        if lines.peek().map_or(false, |l| l.starts_with("type ")) {
            for _ in 0..3 {
                lines.next();
            }
            match lines.next() {
                Some(l) if l.trim() == "map" => {}
                other => bail!("expected 'map' header line, got {:?}", other),
            }
        }

        let mut rows: Vec<Vec<Terrain>> = Vec::new();
        for line in lines {
            if line.trim().is_empty() {
                continue;
            }
            let row = line
                .trim()
                .chars()
                .map(Terrain::from_glyph)
                .collect::<Result<Vec<_>>>()?;
            rows.push(row);
        }
        if rows.is_empty() {
            bail!("map has no rows");
        }
        let width = rows[0].len();
        if rows.iter().any(|r| r.len() != width) {
            bail!("map rows have unequal widths");
        }

        Ok(TileMap {
            width: width as u32,
            height: rows.len() as u32,
            terrain: rows.into_iter().flatten().collect(),
        })
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<TileMap> {
        let text = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("reading map file {}", path.as_ref().display()))?;
        TileMap::parse(&text)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x < self.width && p.y < self.height
    }

    pub fn index(&self, p: Point) -> usize {
        (p.y * self.width + p.x) as usize
    }

    pub fn terrain(&self, p: Point) -> Terrain {
        self.terrain[self.index(p)]
    }

    /// Terrain lookup tolerant of out-of-range coordinates.
    pub fn get(&self, x: i64, y: i64) -> Option<Terrain> {
        if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
            return None;
        }
        Some(self.terrain[(y as u32 * self.width + x as u32) as usize])
    }

    /// Union of the capability bits of every non-obstacle tile present.
    pub fn terrain_union(&self) -> Capability {
        self.terrain
            .iter()
            .filter_map(|t| t.capability())
            .fold(Capability::empty(), |acc, c| acc | c)
    }
}
