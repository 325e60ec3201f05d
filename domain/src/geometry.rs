use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::error::{DomainError, DomainResult};

/// Side length of a tile in pixels.
pub const TILE_PIXELS: i64 = 1000;

/// Number of tiles per canvas axis.
pub const TILE_LATTICE: i64 = 2048;

/// Side length of the whole canvas in pixels.
pub const CANVAS_SIZE: i64 = TILE_LATTICE * TILE_PIXELS;

/// Tile coordinate pair addressing a cell of the 2048x2048 tile lattice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileCoord {
    pub x: i64,
    pub y: i64,
}

impl TileCoord {
    pub fn new(x: i64, y: i64) -> DomainResult<Self> {
        let coord = Self { x, y };
        coord.validate()?;
        Ok(coord)
    }

    pub fn validate(&self) -> DomainResult<()> {
        if self.x < 0 || self.x >= TILE_LATTICE || self.y < 0 || self.y >= TILE_LATTICE {
            return Err(DomainError::InvalidTileCoordinates(format!(
                "({}, {}) outside the {TILE_LATTICE}x{TILE_LATTICE} lattice",
                self.x, self.y
            )));
        }
        Ok(())
    }

    /// Canonical scalar id used as the database primary key.
    #[must_use]
    pub fn tile_id(&self) -> i64 {
        self.y * TILE_LATTICE + self.x
    }

    pub fn from_tile_id(id: i64) -> DomainResult<Self> {
        Self::new(id.rem_euclid(TILE_LATTICE), id.div_euclid(TILE_LATTICE))
    }

    /// Canvas pixel of this tile's top-left corner.
    #[must_use]
    pub fn origin(&self) -> Point {
        Point::new(self.x * TILE_PIXELS, self.y * TILE_PIXELS)
    }

    /// The 1000x1000 pixel region this tile occupies.
    #[must_use]
    pub fn rect(&self) -> PixelRect {
        PixelRect::from_origin_size(self.origin(), Size::new(TILE_PIXELS, TILE_PIXELS))
    }
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.x, self.y)
    }
}

impl FromStr for TileCoord {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (x, y) = s.split_once('_').ok_or_else(|| {
            DomainError::InvalidTileCoordinates(format!("Expected format 'x_y', got '{s}'"))
        })?;
        let x = x.parse::<i64>().map_err(|e| {
            DomainError::InvalidTileCoordinates(format!("Invalid tile x '{x}': {e}"))
        })?;
        let y = y.parse::<i64>().map_err(|e| {
            DomainError::InvalidTileCoordinates(format!("Invalid tile y '{y}': {e}"))
        })?;
        Self::new(x, y)
    }
}

/// Pixel point in canvas space. Tile membership is implicit: every
/// 1000-pixel step along an axis crosses into the next tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: i64,
    pub y: i64,
}

impl Point {
    #[must_use]
    pub fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }

    /// Builds a canvas point from the `(tx, ty, px, py)` quadruple used in
    /// project file names.
    pub fn from_parts(tx: i64, ty: i64, px: i64, py: i64) -> DomainResult<Self> {
        if px < 0 || px >= TILE_PIXELS || py < 0 || py >= TILE_PIXELS {
            return Err(DomainError::InvalidCoordinates(format!(
                "pixel offset ({px}, {py}) must be within 0..{TILE_PIXELS}"
            )));
        }
        TileCoord::new(tx, ty)?;
        Ok(Self::new(tx * TILE_PIXELS + px, ty * TILE_PIXELS + py))
    }

    /// Decomposes into the `(tx, ty, px, py)` quadruple.
    #[must_use]
    pub fn to_parts(&self) -> (i64, i64, i64, i64) {
        (
            self.x.div_euclid(TILE_PIXELS),
            self.y.div_euclid(TILE_PIXELS),
            self.x.rem_euclid(TILE_PIXELS),
            self.y.rem_euclid(TILE_PIXELS),
        )
    }

    /// Inverse Web-Mercator projection over the canvas.
    #[must_use]
    pub fn to_geo(&self) -> GeoPoint {
        let size = CANVAS_SIZE as f64;
        let longitude = self.x as f64 / size * 360.0 - 180.0;
        let latitude = (std::f64::consts::PI * (1.0 - 2.0 * self.y as f64 / size))
            .sinh()
            .atan()
            .to_degrees();
        GeoPoint {
            latitude,
            longitude,
        }
    }

    #[must_use]
    pub fn offset(&self, other: Point) -> Point {
        Point::new(self.x - other.x, self.y - other.y)
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (tx, ty, px, py) = self.to_parts();
        write!(f, "{tx}_{ty}_{px}_{py}")
    }
}

/// Pixel dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Size {
    pub w: i64,
    pub h: i64,
}

impl Size {
    #[must_use]
    pub fn new(w: i64, h: i64) -> Self {
        Self { w, h }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.w <= 0 || self.h <= 0
    }

    #[must_use]
    pub fn area(&self) -> i64 {
        self.w * self.h
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.w, self.h)
    }
}

/// Axis-aligned pixel rectangle with exclusive right/bottom edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixelRect {
    pub left: i64,
    pub top: i64,
    pub right: i64,
    pub bottom: i64,
}

impl PixelRect {
    #[must_use]
    pub fn from_origin_size(origin: Point, size: Size) -> Self {
        Self {
            left: origin.x,
            top: origin.y,
            right: origin.x + size.w,
            bottom: origin.y + size.h,
        }
    }

    #[must_use]
    pub fn origin(&self) -> Point {
        Point::new(self.left.min(self.right), self.top.min(self.bottom))
    }

    #[must_use]
    pub fn size(&self) -> Size {
        Size::new(
            (self.right - self.left).abs(),
            (self.bottom - self.top).abs(),
        )
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.left == self.right || self.top == self.bottom
    }

    pub fn validate_in_canvas(&self) -> DomainResult<()> {
        if self.left < 0 || self.top < 0 || self.right > CANVAS_SIZE || self.bottom > CANVAS_SIZE {
            return Err(DomainError::RegionOutOfBounds(format!(
                "{self} extends past the {CANVAS_SIZE}x{CANVAS_SIZE} canvas"
            )));
        }
        Ok(())
    }

    /// Tiles covered by this rectangle, in row-major order.
    #[must_use]
    pub fn tiles(&self) -> Vec<TileCoord> {
        let left = self.left.div_euclid(TILE_PIXELS);
        let top = self.top.div_euclid(TILE_PIXELS);
        let right = (self.right + TILE_PIXELS - 1).div_euclid(TILE_PIXELS);
        let bottom = (self.bottom + TILE_PIXELS - 1).div_euclid(TILE_PIXELS);

        let mut tiles = Vec::new();
        for ty in top..bottom {
            for tx in left..right {
                tiles.push(TileCoord { x: tx, y: ty });
            }
        }
        tiles
    }
}

impl fmt::Display for PixelRect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.size(), self.origin())
    }
}

/// Geographic coordinate, produced by projecting canvas pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    /// Forward Web-Mercator projection back onto the canvas.
    #[must_use]
    pub fn to_pixel(&self) -> Point {
        let size = CANVAS_SIZE as f64;
        let x = (self.longitude + 180.0) / 360.0 * size;
        let lat_rad = self.latitude.to_radians();
        let y = (1.0 - lat_rad.tan().asinh() / std::f64::consts::PI) / 2.0 * size;
        Point::new(x.round() as i64, y.round() as i64)
    }
}
