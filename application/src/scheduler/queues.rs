use std::collections::VecDeque;

use tracing::{debug, instrument};

use domain::tile::{MAX_TEMPERATURE, TileRecord};

use crate::error::AppResult;
use crate::ports::outgoing::tile_store::DynTileStorePort;

/// Computes temperature queue sizes for `total` eligible tiles, hottest
/// queue first. Shares follow a 1/i allocation over the number of queues:
/// the hottest queue gets the smallest share, the coldest the largest.
/// The queue count is the largest N whose rounded-up hottest share still
/// reaches `min_hottest`; anything smaller than `min_hottest` collapses to
/// a single queue.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn zipf_queue_sizes(total: usize, min_hottest: usize) -> Vec<usize> {
    if total == 0 {
        return Vec::new();
    }

    let mut queues = 1usize;
    let max_queues = usize::try_from(MAX_TEMPERATURE).unwrap_or(usize::MAX).min(total);
    for candidate in 2..=max_queues {
        let harmonic: f64 = (1..=candidate).map(|i| 1.0 / i as f64).sum();
        let hottest_share = total as f64 / (candidate as f64 * harmonic);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let hottest = hottest_share.ceil() as usize;
        // Shares shrink monotonically with the queue count, so the first
        // candidate below the floor ends the search.
        if hottest_share < 1.0 || hottest < min_hottest {
            break;
        }
        queues = candidate;
    }

    if queues == 1 {
        return vec![total];
    }

    let harmonic: f64 = (1..=queues).map(|i| 1.0 / i as f64).sum();
    let mut sizes = Vec::with_capacity(queues);
    let mut assigned = 0usize;
    for rank in 0..queues - 1 {
        // Hottest first: weight 1/queues down to 1/2; the coldest queue
        // absorbs the rounding residue.
        let weight = 1.0 / (queues - rank) as f64;
        let raw = total as f64 * weight / harmonic;
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let share = (raw.ceil() as usize).max(1).min(total - assigned);
        sizes.push(share);
        assigned += share;
    }
    sizes.push(total - assigned);
    sizes
}

/// Temperature-based multi-queue selector over the tile store.
///
/// Queue index 0 is the burning queue (heat 999, never yet observed to
/// change); indices 1..=N are temperature queues where a higher heat is
/// polled more often. A pass visits each queue once, yielding at most one
/// tile per queue, so a large burning pool can never starve the
/// temperature queues. Exhausting a pass triggers redistribution.
pub struct QueueSystem {
    tile_store: DynTileStorePort,
    min_hottest_size: usize,
    num_queues: i64,
    pass: VecDeque<i64>,
}

impl QueueSystem {
    #[must_use]
    pub fn new(tile_store: DynTileStorePort, min_hottest_size: usize) -> Self {
        Self {
            tile_store,
            min_hottest_size,
            num_queues: 0,
            pass: VecDeque::new(),
        }
    }

    #[must_use]
    pub fn num_queues(&self) -> i64 {
        self.num_queues
    }

    /// Loads the queue count persisted in the store, so a restart resumes
    /// with the existing heat assignments.
    pub async fn start(&mut self) -> AppResult<()> {
        self.num_queues = self.tile_store.num_temperature_queues().await?;
        debug!(num_queues = self.num_queues, "queue system started");
        Ok(())
    }

    /// Picks the next tile to poll, or `None` when nothing is schedulable
    /// even after a redistribution.
    #[instrument(skip(self))]
    pub async fn select_next_tile(&mut self) -> AppResult<Option<TileRecord>> {
        if self.pass.is_empty() {
            // The previous pass walked every queue; re-rank before the
            // next one starts.
            self.redistribute().await?;
            self.refill_pass();
        }

        for _ in 0..2 {
            while let Some(queue) = self.pass.pop_front() {
                let tile = if queue == 0 {
                    self.tile_store.next_burning().await?
                } else {
                    self.tile_store.coolest_in_heat(queue).await?
                };
                if tile.is_some() {
                    return Ok(tile);
                }
            }
            // Nothing yielded; redistribute once and walk a fresh pass
            // before giving up.
            self.redistribute().await?;
            self.refill_pass();
        }
        Ok(None)
    }

    /// Re-ranks every eligible tile by recency of last observed change and
    /// rewrites heat assignments. Checked burning tiles graduate here;
    /// unchecked burning and inactive tiles are untouched. Writes only the
    /// rows whose heat changes, so a repeat run with no other mutations
    /// writes nothing.
    #[instrument(skip(self))]
    pub async fn redistribute(&mut self) -> AppResult<()> {
        let tiles = self.tile_store.tiles_for_redistribution().await?;
        let sizes = zipf_queue_sizes(tiles.len(), self.min_hottest_size);
        let num_queues = sizes.len() as i64;

        let mut assignments = Vec::new();
        let mut remaining = tiles.as_slice();
        for (rank, &size) in sizes.iter().enumerate() {
            // The newest chunk lands in the hottest queue (highest heat).
            let heat = num_queues - rank as i64;
            let (chunk, rest) = remaining.split_at(size.min(remaining.len()));
            remaining = rest;
            for tile in chunk {
                if tile.heat != heat {
                    assignments.push((tile.tile_id(), heat));
                }
            }
        }

        if !assignments.is_empty() {
            debug!(changed = assignments.len(), num_queues, "redistributing queues");
            self.tile_store.apply_heat_assignments(&assignments).await?;
        }
        self.num_queues = num_queues;
        Ok(())
    }

    fn refill_pass(&mut self) {
        self.pass = (0..=self.num_queues).collect();
    }
}
