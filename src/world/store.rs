use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::chunk::{Chunk, Tile};
use super::coords::{ChunkCoord, TilePos};

const SAVE_VERSION: u32 = 1;

/// On-disk chunk record. Files from a newer format version are refused
/// instead of misread.
#[derive(Serialize, Deserialize)]
struct ChunkFile {
    version: u32,
    saved_at: i64,
    chunk: Chunk,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("chunk i/o failed: {0}")]
    Io(#[from] io::Error),

    #[error("chunk codec failed: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("chunk file corrupt: {0}")]
    Corrupt(String),

    #[error("chunk ({0}, {1}) is not resident")]
    NotResident(i64, i64),
}

/// Durable home for chunks: one JSON file per chunk coordinate under the
/// data directory, plus a resident map for chunks in active use.
///
/// A read of a tile in a chunk that was never persisted answers `Unset`
/// without materializing anything; chunks only reach disk through `save`.
pub struct ChunkStore {
    dir: PathBuf,
    resident: HashMap<ChunkCoord, Chunk>,
    // Coordinates verified absent on disk and not resident; cleared by save.
    known_absent: HashSet<ChunkCoord>,
}

impl ChunkStore {
    /// Open a store rooted at `dir`, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<ChunkStore, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(ChunkStore {
            dir,
            resident: HashMap::new(),
            known_absent: HashSet::new(),
        })
    }

    fn chunk_path(&self, coord: ChunkCoord) -> PathBuf {
        self.dir.join(format!("{}_{}.json", coord.x, coord.y))
    }

    /// Whether a chunk at this coordinate has ever been persisted.
    pub fn exists(&self, coord: ChunkCoord) -> bool {
        self.chunk_path(coord).exists()
    }

    /// The resident chunk at `coord`, loading it from disk or materializing
    /// an all-unset chunk if none was ever persisted.
    pub fn load(&mut self, coord: ChunkCoord) -> Result<&mut Chunk, StoreError> {
        use std::collections::hash_map::Entry;

        let path = self.chunk_path(coord);
        self.known_absent.remove(&coord);
        match self.resident.entry(coord) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let chunk = match read_chunk_file(&path, coord)? {
                    Some(chunk) => chunk,
                    None => Chunk::empty(coord),
                };
                debug!(
                    chunk_x = coord.x,
                    chunk_y = coord.y,
                    committed = chunk.committed_tiles(),
                    "chunk loaded"
                );
                Ok(entry.insert(chunk))
            }
        }
    }

    /// Persist the resident chunk at `coord`, replacing any prior file. The
    /// record is written to a sibling temp file and renamed into place so a
    /// failed write cannot truncate the previous copy.
    pub fn save(&mut self, coord: ChunkCoord) -> Result<(), StoreError> {
        let chunk = self
            .resident
            .get(&coord)
            .ok_or(StoreError::NotResident(coord.x, coord.y))?;
        let record = ChunkFile {
            version: SAVE_VERSION,
            saved_at: chrono::Utc::now().timestamp(),
            chunk: chunk.clone(),
        };
        let body = serde_json::to_vec(&record)?;

        let path = self.chunk_path(coord);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, &body)?;
        fs::rename(&tmp, &path)?;
        self.known_absent.remove(&coord);
        debug!(
            chunk_x = coord.x,
            chunk_y = coord.y,
            bytes = body.len(),
            "chunk saved"
        );
        Ok(())
    }

    /// Resolve one global tile address, wrapping into the owning chunk's
    /// local space. Chunks with no file and no resident entry answer `Unset`
    /// without being created.
    pub fn tile_at(&mut self, pos: TilePos) -> Result<Tile, StoreError> {
        let (coord, local) = pos.split();
        if let Some(chunk) = self.resident.get(&coord) {
            return Ok(chunk.tile(local));
        }
        if self.known_absent.contains(&coord) {
            return Ok(Tile::Unset);
        }
        if !self.exists(coord) {
            self.known_absent.insert(coord);
            return Ok(Tile::Unset);
        }
        Ok(self.load(coord)?.tile(local))
    }

    pub fn resident_chunks(&self) -> usize {
        self.resident.len()
    }

    pub fn resident_committed_tiles(&self) -> usize {
        self.resident.values().map(Chunk::committed_tiles).sum()
    }

    /// Count of chunk files on disk. Answers 0 when the directory cannot be
    /// read; this feeds a stats endpoint, not correctness.
    pub fn persisted_chunks(&self) -> usize {
        let Ok(entries) = fs::read_dir(&self.dir) else {
            return 0;
        };
        entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "json"))
            .count()
    }
}

fn read_chunk_file(path: &Path, coord: ChunkCoord) -> Result<Option<Chunk>, StoreError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    let record: ChunkFile = serde_json::from_slice(&bytes)
        .map_err(|err| StoreError::Corrupt(format!("{}: {err}", path.display())))?;
    if record.version > SAVE_VERSION {
        return Err(StoreError::Corrupt(format!(
            "{} has version {} but at most {} is supported",
            path.display(),
            record.version,
            SAVE_VERSION
        )));
    }
    if record.chunk.coord != coord {
        return Err(StoreError::Corrupt(format!(
            "{} claims chunk ({}, {})",
            path.display(),
            record.chunk.coord.x,
            record.chunk.coord.y
        )));
    }
    Ok(Some(record.chunk))
}
