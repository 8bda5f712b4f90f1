use std::path::PathBuf;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

use super::coords::{TilePos, TileRect};
use super::generator::WorldGenerator;
use super::store::{ChunkStore, StoreError};

/// One tile of a rectangle query, in stream order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileRecord {
    pub pos: TilePos,
    pub data: [u8; 6],
}

#[derive(Debug, thiserror::Error)]
pub enum WorldError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("rectangle of {0} tiles exceeds the {1}-tile limit")]
    QueryTooLarge(i128, usize),

    #[error("world task unavailable")]
    Unavailable,
}

/// Commands served by the world task.
pub enum WorldCmd {
    QueryRect {
        rect: TileRect,
        reply: oneshot::Sender<Result<Vec<TileRecord>, WorldError>>,
    },
    Stats {
        reply: oneshot::Sender<WorldStats>,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct WorldStats {
    pub seed: u64,
    pub resident_chunks: usize,
    pub persisted_chunks: usize,
    pub resident_committed_tiles: usize,
}

/// Cloneable handle to the world task; every connection and HTTP endpoint
/// talks to the world through one of these.
#[derive(Clone)]
pub struct WorldHandle {
    tx: mpsc::Sender<WorldCmd>,
}

impl WorldHandle {
    /// Expand and read every tile in `rect`, x ascending outer and y
    /// ascending inner.
    pub async fn query_rect(&self, rect: TileRect) -> Result<Vec<TileRecord>, WorldError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(WorldCmd::QueryRect { rect, reply })
            .await
            .map_err(|_| WorldError::Unavailable)?;
        rx.await.map_err(|_| WorldError::Unavailable)?
    }

    pub async fn stats(&self) -> Result<WorldStats, WorldError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(WorldCmd::Stats { reply })
            .await
            .map_err(|_| WorldError::Unavailable)?;
        rx.await.map_err(|_| WorldError::Unavailable)
    }
}

pub fn world_channel(buffer: usize) -> (WorldHandle, mpsc::Receiver<WorldCmd>) {
    let (tx, rx) = mpsc::channel(buffer);
    (WorldHandle { tx }, rx)
}

/// World state owned by the task: the store, the generator, and the query
/// cap. Nothing else ever holds the store, which is what makes frontier
/// expansion atomic with respect to every connection.
pub struct World {
    store: ChunkStore,
    generator: WorldGenerator,
    max_query_tiles: usize,
}

impl World {
    /// Open the store under `data_dir` and seed the origin tile if this is a
    /// brand new world.
    pub fn open(data_dir: PathBuf, seed: u64, max_query_tiles: usize) -> Result<World, WorldError> {
        let mut store = ChunkStore::open(data_dir)?;
        let generator = WorldGenerator::new(seed);
        generator.seed_origin(&mut store)?;
        Ok(World {
            store,
            generator,
            max_query_tiles,
        })
    }

    pub fn seed(&self) -> u64 {
        self.generator.seed()
    }

    fn query_rect(&mut self, rect: TileRect) -> Result<Vec<TileRecord>, WorldError> {
        let area = rect.area();
        if area > self.max_query_tiles as i128 {
            return Err(WorldError::QueryTooLarge(area, self.max_query_tiles));
        }

        self.generator.expand_rect(&mut self.store, rect)?;

        let mut records = Vec::with_capacity(area as usize);
        for pos in rect.iter() {
            let tile = self.store.tile_at(pos)?;
            records.push(TileRecord {
                pos,
                data: tile.to_wire(),
            });
        }
        Ok(records)
    }

    fn stats(&self) -> WorldStats {
        WorldStats {
            seed: self.generator.seed(),
            resident_chunks: self.store.resident_chunks(),
            persisted_chunks: self.store.persisted_chunks(),
            resident_committed_tiles: self.store.resident_committed_tiles(),
        }
    }
}

/// Single-owner world loop; runs until every handle is dropped.
pub async fn run_world(mut rx: mpsc::Receiver<WorldCmd>, mut world: World) {
    info!(seed = world.seed(), "world task started");
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WorldCmd::QueryRect { rect, reply } => {
                let result = world.query_rect(rect);
                if let Err(err) = &result {
                    warn!(error = %err, "rectangle query failed");
                }
                let _ = reply.send(result);
            }
            WorldCmd::Stats { reply } => {
                let _ = reply.send(world.stats());
            }
        }
    }
    info!("world task stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;

    fn scratch_dir(label: &str) -> PathBuf {
        let dir =
            std::env::temp_dir().join(format!("hexcrawl_world_{label}_{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    fn spawn_world(dir: PathBuf, max_query_tiles: usize) -> WorldHandle {
        let world = World::open(dir, 4242, max_query_tiles).unwrap();
        let (handle, rx) = world_channel(64);
        tokio::spawn(run_world(rx, world));
        handle
    }

    #[tokio::test]
    async fn query_returns_every_tile_in_stream_order() {
        let dir = scratch_dir("order");
        let handle = spawn_world(dir.clone(), 65_536);

        let rect = TileRect::normalized(-2, 2, -2, 2);
        let records = handle.query_rect(rect).await.unwrap();
        assert_eq!(records.len(), 25);

        let positions: Vec<TilePos> = records.iter().map(|r| r.pos).collect();
        let expected: Vec<TilePos> = rect.iter().collect();
        assert_eq!(positions, expected);

        // The origin is inside the rectangle and keeps its fixed passages.
        let origin = records
            .iter()
            .find(|r| r.pos == TilePos::new(0, 0))
            .unwrap();
        assert_eq!(origin.data, [0, 1, 0, 0, 1, 0]);

        let _ = fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn repeated_queries_are_stable() {
        let dir = scratch_dir("stable");
        let handle = spawn_world(dir.clone(), 65_536);

        let rect = TileRect::normalized(0, 4, -4, 0);
        let first = handle.query_rect(rect).await.unwrap();
        let second = handle.query_rect(rect).await.unwrap();
        assert_eq!(first, second);

        let _ = fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn oversized_rectangles_are_rejected_before_generation() {
        let dir = scratch_dir("cap");
        let handle = spawn_world(dir.clone(), 100);

        let err = handle
            .query_rect(TileRect::normalized(0, 100, 0, 100))
            .await
            .unwrap_err();
        assert!(matches!(err, WorldError::QueryTooLarge(_, 100)));

        // A degenerate span cannot overflow the area computation.
        let err = handle
            .query_rect(TileRect::normalized(i64::MIN, i64::MAX, i64::MIN, i64::MAX))
            .await
            .unwrap_err();
        assert!(matches!(err, WorldError::QueryTooLarge(_, _)));

        // Within the cap still works.
        let records = handle
            .query_rect(TileRect::normalized(0, 9, 0, 9))
            .await
            .unwrap();
        assert_eq!(records.len(), 100);

        let _ = fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn dropped_task_reports_unavailable() {
        let dir = scratch_dir("gone");
        let world = World::open(dir.clone(), 1, 100).unwrap();
        let (handle, rx) = world_channel(4);
        drop(rx);
        drop(world);

        let err = handle
            .query_rect(TileRect::normalized(0, 0, 0, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, WorldError::Unavailable));

        let _ = fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn stats_reflect_generated_chunks() {
        let dir = scratch_dir("stats");
        let handle = spawn_world(dir.clone(), 65_536);

        handle
            .query_rect(TileRect::normalized(-1, 1, -1, 1))
            .await
            .unwrap();
        let stats = handle.stats().await.unwrap();
        assert_eq!(stats.seed, 4242);
        assert!(stats.resident_chunks >= 1);
        assert!(stats.persisted_chunks >= 1);
        assert!(stats.resident_committed_tiles >= 3);

        let _ = fs::remove_dir_all(&dir);
    }
}
