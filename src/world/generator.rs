use std::collections::VecDeque;

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, trace};

use super::chunk::{Passages, Tile};
use super::coords::{Direction, TilePos, TileRect};
use super::store::{ChunkStore, StoreError};

/// Cumulative thresholds for the number of fresh branches opened on a newly
/// generated tile: P(k) = {0.37, 0.43, 0.10, 0.05, 0.03, 0.02} for k = 0..=5.
const BRANCH_THRESHOLDS: [f64; 5] = [0.37, 0.80, 0.90, 0.95, 0.98];

/// How far beyond a queried rectangle the frontier may grow, keeping a thin
/// generated margin around whatever the viewer asked for.
const FRONTIER_MARGIN: i64 = 1;

/// Lazy maze grower. Holds only the world seed; all tile state lives in the
/// store, so any number of queries against the same store continue the same
/// world.
pub struct WorldGenerator {
    seed: u64,
}

impl WorldGenerator {
    pub fn new(seed: u64) -> WorldGenerator {
        WorldGenerator { seed }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Commit the fixed origin tile if this world has never been touched.
    pub fn seed_origin(&self, store: &mut ChunkStore) -> Result<(), StoreError> {
        let origin = TilePos::new(0, 0);
        if store.tile_at(origin)?.is_committed() {
            return Ok(());
        }
        commit_tile(store, origin, Passages::ORIGIN)?;
        debug!("origin tile seeded");
        Ok(())
    }

    /// Expand the committed region across `rect` grown by the frontier
    /// margin: breadth-first along open passages, generating each reached
    /// unset tile exactly once. Tiles outside the grown rectangle are never
    /// touched, so a query can never cascade across the whole world.
    pub fn expand_rect(&self, store: &mut ChunkStore, rect: TileRect) -> Result<(), StoreError> {
        let region = rect.grown(FRONTIER_MARGIN);

        let mut queue: VecDeque<TilePos> = VecDeque::new();
        for pos in region.iter() {
            if store.tile_at(pos)?.is_committed() {
                queue.push_back(pos);
            }
        }

        let mut generated = 0usize;
        while let Some(pos) = queue.pop_front() {
            let Some(passages) = store.tile_at(pos)?.passages() else {
                continue;
            };
            for dir in passages.open_directions() {
                let next = pos.neighbor(dir);
                if !region.contains(next) {
                    continue;
                }
                if store.tile_at(next)?.is_committed() {
                    continue;
                }
                self.generate_tile(store, next, dir)?;
                generated += 1;
                queue.push_back(next);
            }
        }

        if generated > 0 {
            debug!(tiles = generated, "frontier expanded");
        }
        Ok(())
    }

    /// Generate one tile reached by traveling `entry` out of a committed
    /// neighbor. The return edge of every committed neighbor already open
    /// toward this tile is forced, so edge symmetry holds by construction;
    /// fresh branches are then drawn only toward directions whose neighbor
    /// is still unset.
    fn generate_tile(
        &self,
        store: &mut ChunkStore,
        pos: TilePos,
        entry: Direction,
    ) -> Result<Passages, StoreError> {
        let mut passages = Passages::CLOSED;
        let mut candidates: Vec<Direction> = Vec::with_capacity(Direction::COUNT);

        for dir in Direction::ALL {
            match store.tile_at(pos.neighbor(dir))? {
                Tile::Committed(neighbor) => {
                    if neighbor.is_open(dir.opposite()) {
                        passages.open(dir);
                    }
                }
                Tile::Unset => candidates.push(dir),
            }
        }
        // The parent that reached us is committed and open toward us.
        debug_assert!(passages.is_open(entry.opposite()));
        let forced = passages.open_count();

        let mut rng = ChaCha8Rng::seed_from_u64(tile_seed(self.seed, pos));
        let branches = branch_count(&mut rng).min(candidates.len());
        for dir in candidates.choose_multiple(&mut rng, branches) {
            passages.open(*dir);
        }

        trace!(
            x = pos.x,
            y = pos.y,
            entry = entry.index(),
            forced,
            branches,
            "tile generated"
        );

        commit_tile(store, pos, passages)?;
        Ok(passages)
    }
}

/// Write a committed tile into its owning chunk and persist the chunk. On a
/// failed save the in-memory slot reverts so memory never disagrees with
/// disk.
fn commit_tile(store: &mut ChunkStore, pos: TilePos, passages: Passages) -> Result<(), StoreError> {
    let (coord, local) = pos.split();
    let chunk = store.load(coord)?;
    let prior = chunk.tile(local);
    chunk.set_tile(local, Tile::Committed(passages));
    if let Err(err) = store.save(coord) {
        if let Ok(chunk) = store.load(coord) {
            chunk.set_tile(local, prior);
        }
        return Err(err);
    }
    Ok(())
}

/// Draw the fresh-branch count from the fixed distribution.
fn branch_count(rng: &mut impl Rng) -> usize {
    branches_for_draw(rng.gen())
}

/// Thresholds at or below the draw; the cumulative form of the branch
/// distribution.
fn branches_for_draw(draw: f64) -> usize {
    BRANCH_THRESHOLDS.iter().filter(|&&t| draw >= t).count()
}

/// Mix the world seed with a tile's global coordinates. Per-tile draws stay
/// stable no matter what order the frontier reaches tiles in, and negative
/// coordinates spread as well as positive ones.
fn tile_seed(seed: u64, pos: TilePos) -> u64 {
    let x = pos.x as u64;
    let y = pos.y as u64;
    let mut mixed = seed ^ 0x9E37_79B9_7F4A_7C15;
    mixed ^= x.wrapping_mul(0xBF58_476D_1CE4_E5B9);
    mixed = mixed.rotate_left(27);
    mixed ^= y.wrapping_mul(0x94D0_49BB_1331_11EB);
    mixed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::chunk::Tile;
    use std::fs;
    use std::path::PathBuf;

    fn scratch_dir(label: &str) -> PathBuf {
        let dir =
            std::env::temp_dir().join(format!("hexcrawl_gen_{label}_{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    fn seeded_world(dir: &PathBuf, seed: u64) -> (ChunkStore, WorldGenerator) {
        let mut store = ChunkStore::open(dir).unwrap();
        let generator = WorldGenerator::new(seed);
        generator.seed_origin(&mut store).unwrap();
        (store, generator)
    }

    fn wire_snapshot(store: &mut ChunkStore, rect: TileRect) -> Vec<[u8; 6]> {
        rect.iter()
            .map(|pos| store.tile_at(pos).unwrap().to_wire())
            .collect()
    }

    #[test]
    fn fresh_worlds_start_from_the_fixed_origin() {
        let dir = scratch_dir("origin");
        let (mut store, _) = seeded_world(&dir, 777);
        assert_eq!(
            store.tile_at(TilePos::new(0, 0)).unwrap(),
            Tile::Committed(Passages::ORIGIN)
        );

        // Seeding again must not re-roll the origin.
        let generator = WorldGenerator::new(1);
        generator.seed_origin(&mut store).unwrap();
        assert_eq!(
            store.tile_at(TilePos::new(0, 0)).unwrap(),
            Tile::Committed(Passages::ORIGIN)
        );
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn expansion_reaches_the_origin_exits() {
        let dir = scratch_dir("exits");
        let (mut store, generator) = seeded_world(&dir, 41);
        generator
            .expand_rect(&mut store, TileRect::normalized(-2, 2, -2, 2))
            .unwrap();

        // Directions 1 and 4 from the origin are open, so both neighbors
        // must have been generated.
        for dir in [Direction::ALL[1], Direction::ALL[4]] {
            let neighbor = TilePos::new(0, 0).neighbor(dir);
            assert!(store.tile_at(neighbor).unwrap().is_committed());
        }
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn committed_edges_are_symmetric() {
        let dir = scratch_dir("symmetry");
        let (mut store, generator) = seeded_world(&dir, 90210);
        let rect = TileRect::normalized(-8, 8, -8, 8);
        generator.expand_rect(&mut store, rect).unwrap();

        // Between two committed tiles an edge is open on one side exactly
        // when it is open on the other.
        for pos in rect.grown(FRONTIER_MARGIN).iter() {
            let Some(passages) = store.tile_at(pos).unwrap().passages() else {
                continue;
            };
            for dir in Direction::ALL {
                let Some(neighbor) = store.tile_at(pos.neighbor(dir)).unwrap().passages() else {
                    continue;
                };
                assert_eq!(
                    passages.is_open(dir),
                    neighbor.is_open(dir.opposite()),
                    "asymmetric edge at {pos:?} direction {dir:?}"
                );
            }
        }
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn expansion_stays_inside_the_margin() {
        let dir = scratch_dir("bounded");
        let (mut store, generator) = seeded_world(&dir, 7);
        let rect = TileRect::normalized(-3, 3, -3, 3);
        generator.expand_rect(&mut store, rect).unwrap();

        let region = rect.grown(FRONTIER_MARGIN);
        for pos in rect.grown(FRONTIER_MARGIN + 2).iter() {
            if region.contains(pos) {
                continue;
            }
            assert_eq!(
                store.tile_at(pos).unwrap(),
                Tile::Unset,
                "tile outside the margin was generated at {pos:?}"
            );
        }
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn repeat_expansion_changes_nothing() {
        let dir = scratch_dir("repeat");
        let (mut store, generator) = seeded_world(&dir, 123);
        let rect = TileRect::normalized(-5, 5, -5, 5);

        generator.expand_rect(&mut store, rect).unwrap();
        let first = wire_snapshot(&mut store, rect);

        generator.expand_rect(&mut store, rect).unwrap();
        let second = wire_snapshot(&mut store, rect);

        assert_eq!(first, second);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn committed_tiles_survive_a_store_reopen() {
        let dir = scratch_dir("reopen");
        let rect = TileRect::normalized(-4, 4, -4, 4);
        let first = {
            let (mut store, generator) = seeded_world(&dir, 5150);
            generator.expand_rect(&mut store, rect).unwrap();
            wire_snapshot(&mut store, rect)
        };

        // A brand new store over the same directory serves identical tiles.
        let (mut store, generator) = seeded_world(&dir, 5150);
        generator.expand_rect(&mut store, rect).unwrap();
        assert_eq!(wire_snapshot(&mut store, rect), first);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn equal_seeds_agree_and_different_seeds_diverge() {
        let rect = TileRect::normalized(-6, 6, -6, 6);

        let dir_a = scratch_dir("seed_a");
        let (mut store_a, gen_a) = seeded_world(&dir_a, 2024);
        gen_a.expand_rect(&mut store_a, rect).unwrap();
        let world_a = wire_snapshot(&mut store_a, rect);

        let dir_b = scratch_dir("seed_b");
        let (mut store_b, gen_b) = seeded_world(&dir_b, 2024);
        gen_b.expand_rect(&mut store_b, rect).unwrap();
        assert_eq!(world_a, wire_snapshot(&mut store_b, rect));

        let dir_c = scratch_dir("seed_c");
        let (mut store_c, gen_c) = seeded_world(&dir_c, 2025);
        gen_c.expand_rect(&mut store_c, rect).unwrap();
        assert_ne!(world_a, wire_snapshot(&mut store_c, rect));

        for dir in [dir_a, dir_b, dir_c] {
            let _ = fs::remove_dir_all(&dir);
        }
    }

    #[test]
    fn branch_distribution_matches_thresholds() {
        let mut rng = ChaCha8Rng::seed_from_u64(99);
        let mut counts = [0usize; 6];
        let draws = 200_000;
        for _ in 0..draws {
            counts[branch_count(&mut rng)] += 1;
        }

        let expected = [0.37, 0.43, 0.10, 0.05, 0.03, 0.02];
        for (count, expected) in counts.iter().zip(expected) {
            let observed = *count as f64 / draws as f64;
            assert!(
                (observed - expected).abs() < 0.01,
                "observed {observed}, expected {expected}"
            );
        }
    }

    #[test]
    fn branch_thresholds_map_draws_to_counts() {
        assert_eq!(branches_for_draw(0.0), 0);
        assert_eq!(branches_for_draw(0.3699), 0);
        assert_eq!(branches_for_draw(0.37), 1);
        assert_eq!(branches_for_draw(0.7999), 1);
        assert_eq!(branches_for_draw(0.80), 2);
        assert_eq!(branches_for_draw(0.90), 3);
        assert_eq!(branches_for_draw(0.95), 4);
        assert_eq!(branches_for_draw(0.98), 5);
        assert_eq!(branches_for_draw(0.9999), 5);
    }

    #[test]
    fn tile_seed_spreads_neighboring_coordinates() {
        let a = tile_seed(1, TilePos::new(0, 0));
        let b = tile_seed(1, TilePos::new(1, 0));
        let c = tile_seed(1, TilePos::new(0, 1));
        let d = tile_seed(2, TilePos::new(0, 0));
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_ne!(b, c);
        assert_ne!(a, d);

        let negative = tile_seed(1, TilePos::new(-1, -1));
        assert_ne!(negative, a);
    }
}
