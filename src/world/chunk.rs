use serde::{Deserialize, Serialize};

use super::coords::{ChunkCoord, Direction, CHUNK_TILES};

/// Six per-direction passage flags for one tile; `true` is a walkable edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Passages([bool; 6]);

impl Passages {
    pub const CLOSED: Passages = Passages([false; 6]);

    /// The fixed origin passage set: directions 1 and 4 open. Every fresh
    /// world starts from this exact tile rather than from a random draw.
    pub const ORIGIN: Passages = Passages([false, true, false, false, true, false]);

    pub fn is_open(self, dir: Direction) -> bool {
        self.0[dir.index()]
    }

    pub fn open(&mut self, dir: Direction) {
        self.0[dir.index()] = true;
    }

    pub fn open_count(self) -> usize {
        self.0.iter().filter(|open| **open).count()
    }

    pub fn open_directions(self) -> impl Iterator<Item = Direction> {
        Direction::ALL.into_iter().filter(move |dir| self.0[dir.index()])
    }

    /// Protocol form: one 0/1 per direction in index order.
    pub fn to_wire(self) -> [u8; 6] {
        let mut wire = [0u8; 6];
        for (slot, open) in wire.iter_mut().zip(self.0) {
            *slot = open as u8;
        }
        wire
    }
}

/// Generation state of one tile. `Unset` marks a tile the frontier has not
/// reached yet; committed passage flags are final.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Tile {
    #[default]
    Unset,
    Committed(Passages),
}

impl Tile {
    pub fn is_committed(self) -> bool {
        matches!(self, Tile::Committed(_))
    }

    pub fn passages(self) -> Option<Passages> {
        match self {
            Tile::Committed(passages) => Some(passages),
            Tile::Unset => None,
        }
    }

    /// Wire flags; an unreached tile reports all-closed without ever being
    /// committed by the read.
    pub fn to_wire(self) -> [u8; 6] {
        self.passages().map(Passages::to_wire).unwrap_or([0; 6])
    }
}

/// A 16x16 block of tiles at one chunk coordinate, indexed `[x][y]` in local
/// space.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub coord: ChunkCoord,
    tiles: [[Tile; CHUNK_TILES]; CHUNK_TILES],
}

impl Chunk {
    pub fn empty(coord: ChunkCoord) -> Chunk {
        Chunk {
            coord,
            tiles: [[Tile::Unset; CHUNK_TILES]; CHUNK_TILES],
        }
    }

    pub fn tile(&self, local: (usize, usize)) -> Tile {
        self.tiles[local.0][local.1]
    }

    pub fn set_tile(&mut self, local: (usize, usize), tile: Tile) {
        self.tiles[local.0][local.1] = tile;
    }

    pub fn committed_tiles(&self) -> usize {
        self.tiles
            .iter()
            .flatten()
            .filter(|tile| tile.is_committed())
            .count()
    }
}
