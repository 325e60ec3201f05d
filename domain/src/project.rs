use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::geometry::{PixelRect, Point, Size, TileCoord};

/// Seconds of tile-update history retained in the rolling window.
pub const UPDATE_WINDOW_SECS: i64 = 86_400;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProjectState {
    #[serde(rename = "active")]
    Active,
    #[serde(rename = "inactive")]
    Inactive,
}

impl ProjectState {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Self {
        if s == "inactive" {
            Self::Inactive
        } else {
            Self::Active
        }
    }
}

impl fmt::Display for ProjectState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Database row for a tracked project. Identity is `(owner_id, name)`;
/// the rectangle is immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectRecord {
    pub id: i64,
    pub owner_id: i64,
    pub name: String,
    pub state: ProjectState,
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
    pub first_seen: i64,
    pub last_check: i64,
    pub max_completion_pixels: i64,
    pub max_completion_percent: f64,
    pub max_completion_time: i64,
    pub total_progress: i64,
    pub total_regress: i64,
    pub largest_regress_pixels: i64,
    pub has_missing_tiles: bool,
}

impl ProjectRecord {
    #[must_use]
    pub fn rect(&self) -> PixelRect {
        PixelRect::from_origin_size(Point::new(self.x, self.y), Size::new(self.width, self.height))
    }

    #[must_use]
    pub fn tiles(&self) -> Vec<TileCoord> {
        self.rect().tiles()
    }
}

/// The full per-project record persisted as a keyed metadata file; a strict
/// superset of the aggregate columns on [`ProjectRecord`], adding the
/// per-tile update map and the rolling 24h window.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectMetadata {
    pub name: String,
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
    pub first_seen: i64,
    pub last_check: i64,
    #[serde(default)]
    pub last_snapshot: i64,
    #[serde(default)]
    pub max_completion_pixels: i64,
    #[serde(default)]
    pub max_completion_percent: f64,
    #[serde(default)]
    pub max_completion_time: i64,
    #[serde(default)]
    pub total_progress: i64,
    #[serde(default)]
    pub total_regress: i64,
    #[serde(default)]
    pub largest_regress_pixels: i64,
    #[serde(default)]
    pub has_missing_tiles: bool,
    /// Last observed change per covered tile, keyed by the tile's
    /// `tx_ty` string form.
    #[serde(default)]
    pub tile_last_update: BTreeMap<String, i64>,
    /// `(tile, timestamp)` pairs within the last 24 hours, oldest first.
    #[serde(default)]
    pub tile_updates_24h: Vec<(String, i64)>,
}

impl ProjectMetadata {
    #[must_use]
    pub fn from_rect(rect: PixelRect, name: &str, now: i64) -> Self {
        let origin = rect.origin();
        let size = rect.size();
        // Every covered tile gets a key up front; 0 means never seen to
        // change under this project.
        let tile_last_update = rect
            .tiles()
            .into_iter()
            .map(|tile| (tile.to_string(), 0))
            .collect();
        Self {
            name: name.to_string(),
            x: origin.x,
            y: origin.y,
            width: size.w,
            height: size.h,
            first_seen: now,
            last_check: now,
            tile_last_update,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn rect(&self) -> PixelRect {
        PixelRect::from_origin_size(Point::new(self.x, self.y), Size::new(self.width, self.height))
    }

    /// Records an observed change on `tile`, updating both the per-tile
    /// map and the rolling window.
    pub fn record_tile_update(&mut self, tile: TileCoord, timestamp: i64) {
        self.tile_last_update.insert(tile.to_string(), timestamp);
        self.tile_updates_24h.push((tile.to_string(), timestamp));
    }

    /// Drops window entries older than 24 hours before `last_check`.
    pub fn prune_old_updates(&mut self) {
        let cutoff = self.last_check - UPDATE_WINDOW_SECS;
        self.tile_updates_24h.retain(|(_, ts)| *ts >= cutoff);
    }

    /// Copies the aggregate columns onto the database row.
    pub fn apply_to_record(&self, record: &mut ProjectRecord) {
        record.last_check = self.last_check;
        record.max_completion_pixels = self.max_completion_pixels;
        record.max_completion_percent = self.max_completion_percent;
        record.max_completion_time = self.max_completion_time;
        record.total_progress = self.total_progress;
        record.total_regress = self.total_regress;
        record.largest_regress_pixels = self.largest_regress_pixels;
        record.has_missing_tiles = self.has_missing_tiles;
    }
}
