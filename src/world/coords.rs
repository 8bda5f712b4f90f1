use serde::{Deserialize, Serialize};

/// Tiles per chunk axis. Kept even so local column parity always equals
/// global column parity and the hex offsets line up across chunk borders.
pub const CHUNK_TILES: usize = 16;

const CHUNK_SPAN: i64 = CHUNK_TILES as i64;

/// Neighbor offsets for an even column, indexed by direction. The four
/// column-changing directions shift one row further down when leaving an odd
/// column; that adjustment is what makes the neighbor relation involutive.
const EVEN_COLUMN_OFFSETS: [(i64, i64); 6] =
    [(1, -1), (0, -1), (-1, -1), (-1, 0), (0, 1), (1, 0)];

/// One of the six hex-neighbor directions, clockwise from the upper right.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Direction(u8);

impl Direction {
    pub const COUNT: usize = 6;

    pub const ALL: [Direction; 6] = [
        Direction(0),
        Direction(1),
        Direction(2),
        Direction(3),
        Direction(4),
        Direction(5),
    ];

    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// The direction pointing back along this one: `(d + 3) mod 6`.
    pub fn opposite(self) -> Direction {
        Direction((self.0 + 3) % 6)
    }

    fn offset(self, odd_column: bool) -> (i64, i64) {
        let (dx, dy) = EVEN_COLUMN_OFFSETS[self.index()];
        let adjust = (odd_column && dx != 0) as i64;
        (dx, dy + adjust)
    }
}

/// Address of one 16x16 chunk on the unbounded chunk lattice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChunkCoord {
    pub x: i64,
    pub y: i64,
}

impl ChunkCoord {
    pub fn new(x: i64, y: i64) -> ChunkCoord {
        ChunkCoord { x, y }
    }
}

/// Raw neighbor of a local tile address. Either axis may leave `[0, 16)`
/// when the step crosses a chunk border; `resolve_chunk_border` and
/// `wrap_local` split that raw value back into a chunk shift plus a wrapped
/// local coordinate.
pub fn neighbor_raw(local_x: usize, local_y: usize, dir: Direction) -> (i64, i64) {
    let (dx, dy) = dir.offset(local_x % 2 == 1);
    (local_x as i64 + dx, local_y as i64 + dy)
}

/// Which chunk a raw local coordinate lands in on one axis. The raw value
/// itself is not wrapped here.
pub fn resolve_chunk_border(raw: i64, chunk_axis: i64) -> i64 {
    if raw < 0 {
        chunk_axis.wrapping_sub(1)
    } else if raw >= CHUNK_SPAN {
        chunk_axis.wrapping_add(1)
    } else {
        chunk_axis
    }
}

/// Wrap a raw local coordinate into `[0, 16)` after a border crossing
/// (-1 becomes 15, 16 becomes 0).
pub fn wrap_local(raw: i64) -> usize {
    raw.rem_euclid(CHUNK_SPAN) as usize
}

/// A tile address on the unbounded global lattice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TilePos {
    pub x: i64,
    pub y: i64,
}

impl TilePos {
    pub fn new(x: i64, y: i64) -> TilePos {
        TilePos { x, y }
    }

    /// The owning chunk and the wrapped local address within it. Euclidean
    /// division keeps negative coordinates on the floor side, so tile -1
    /// lands in chunk -1 at local 15.
    pub fn split(self) -> (ChunkCoord, (usize, usize)) {
        let chunk = ChunkCoord::new(self.x.div_euclid(CHUNK_SPAN), self.y.div_euclid(CHUNK_SPAN));
        let local = (
            self.x.rem_euclid(CHUNK_SPAN) as usize,
            self.y.rem_euclid(CHUNK_SPAN) as usize,
        );
        (chunk, local)
    }

    pub fn from_parts(chunk: ChunkCoord, local: (usize, usize)) -> TilePos {
        TilePos {
            x: chunk.x.wrapping_mul(CHUNK_SPAN).wrapping_add(local.0 as i64),
            y: chunk.y.wrapping_mul(CHUNK_SPAN).wrapping_add(local.1 as i64),
        }
    }

    /// The adjacent tile in the given direction, routed through the local
    /// border-resolution step so chunk crossings and global addressing can
    /// never disagree.
    pub fn neighbor(self, dir: Direction) -> TilePos {
        let (chunk, (local_x, local_y)) = self.split();
        let (raw_x, raw_y) = neighbor_raw(local_x, local_y, dir);
        let neighbor_chunk = ChunkCoord::new(
            resolve_chunk_border(raw_x, chunk.x),
            resolve_chunk_border(raw_y, chunk.y),
        );
        TilePos::from_parts(neighbor_chunk, (wrap_local(raw_x), wrap_local(raw_y)))
    }
}

/// An inclusive axis-aligned rectangle on the global tile lattice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileRect {
    pub x_min: i64,
    pub x_max: i64,
    pub y_min: i64,
    pub y_max: i64,
}

impl TileRect {
    /// Build from endpoints given in any order; each axis is sorted so
    /// reversed ranges describe the same rectangle.
    pub fn normalized(x_a: i64, x_b: i64, y_a: i64, y_b: i64) -> TileRect {
        TileRect {
            x_min: x_a.min(x_b),
            x_max: x_a.max(x_b),
            y_min: y_a.min(y_b),
            y_max: y_a.max(y_b),
        }
    }

    /// Inclusive tile count. Computed in i128 so degenerate i64 spans cannot
    /// overflow before the size cap is applied.
    pub fn area(self) -> i128 {
        let width = self.x_max as i128 - self.x_min as i128 + 1;
        let height = self.y_max as i128 - self.y_min as i128 + 1;
        width * height
    }

    pub fn contains(self, pos: TilePos) -> bool {
        pos.x >= self.x_min && pos.x <= self.x_max && pos.y >= self.y_min && pos.y <= self.y_max
    }

    /// Grown by `margin` tiles on every side, saturating at the lattice edge.
    pub fn grown(self, margin: i64) -> TileRect {
        TileRect {
            x_min: self.x_min.saturating_sub(margin),
            x_max: self.x_max.saturating_add(margin),
            y_min: self.y_min.saturating_sub(margin),
            y_max: self.y_max.saturating_add(margin),
        }
    }

    /// All tiles in the rectangle, x ascending in the outer loop and y
    /// ascending in the inner loop.
    pub fn iter(self) -> impl Iterator<Item = TilePos> {
        (self.x_min..=self.x_max)
            .flat_map(move |x| (self.y_min..=self.y_max).map(move |y| TilePos::new(x, y)))
    }
}
