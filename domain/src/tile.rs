use serde::{Deserialize, Serialize};

use crate::geometry::TileCoord;

/// Heat value for tiles that have never been observed to change (or were
/// just added). Burning tiles are polled ahead of every temperature queue.
pub const BURNING_HEAT: i64 = 999;

/// Heat value for tiles no active project overlaps; excluded from
/// scheduling entirely.
pub const INACTIVE_HEAT: i64 = 0;

/// Highest heat a temperature queue may use; 999 stays reserved.
pub const MAX_TEMPERATURE: i64 = 998;

/// Persistent metadata for a single canvas tile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileRecord {
    pub coord: TileCoord,
    /// 0 = inactive, 1..=998 = temperature queue, 999 = burning.
    pub heat: i64,
    /// Unix seconds of the last completed poll; 0 = never polled.
    pub last_checked: i64,
    /// Unix seconds of the last observed content change; 0 = never seen
    /// to change.
    pub last_update: i64,
    /// Opaque validator from the remote; stored but not yet re-sent.
    pub etag: String,
}

impl TileRecord {
    #[must_use]
    pub fn burning(coord: TileCoord) -> Self {
        Self {
            coord,
            heat: BURNING_HEAT,
            last_checked: 0,
            last_update: 0,
            etag: String::new(),
        }
    }

    #[must_use]
    pub fn tile_id(&self) -> i64 {
        self.coord.tile_id()
    }

    #[must_use]
    pub fn is_burning(&self) -> bool {
        self.heat == BURNING_HEAT
    }

    /// A burning tile that has been polled at least once and observed to
    /// change; it graduates to a temperature queue at the next
    /// redistribution.
    #[must_use]
    pub fn awaits_graduation(&self) -> bool {
        self.is_burning() && self.last_update > 0
    }

    #[must_use]
    pub fn is_inactive(&self) -> bool {
        self.heat == INACTIVE_HEAT
    }

    #[must_use]
    pub fn in_temperature_queue(&self) -> bool {
        (1..=MAX_TEMPERATURE).contains(&self.heat)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn burning_tile_defaults() {
        let tile = TileRecord::burning(TileCoord::new(3, 7).unwrap());
        assert!(tile.is_burning());
        assert!(!tile.awaits_graduation());
        assert!(!tile.in_temperature_queue());
        assert_eq!(tile.tile_id(), 7 * 2048 + 3);
    }

    #[test]
    fn checked_burning_awaits_graduation() {
        let mut tile = TileRecord::burning(TileCoord::new(0, 0).unwrap());
        tile.last_checked = 1_700_000_000;
        tile.last_update = 1_700_000_000;
        assert!(tile.awaits_graduation());
        assert!(tile.is_burning());
    }

    #[test]
    fn heat_classification() {
        let mut tile = TileRecord::burning(TileCoord::new(0, 0).unwrap());
        tile.heat = INACTIVE_HEAT;
        assert!(tile.is_inactive());
        tile.heat = 4;
        assert!(tile.in_temperature_queue());
        tile.heat = MAX_TEMPERATURE;
        assert!(tile.in_temperature_queue());
        tile.heat = BURNING_HEAT;
        assert!(!tile.in_temperature_queue());
    }
}
