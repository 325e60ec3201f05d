use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Invalid tile coordinates: {0}")]
    InvalidTileCoordinates(String),

    #[error("Invalid coordinates: {0}")]
    InvalidCoordinates(String),

    #[error("Region out of canvas bounds: {0}")]
    RegionOutOfBounds(String),

    #[error("Colors not in palette: {0}")]
    ColorNotInPalette(String),

    #[error("Invalid status: {0}")]
    InvalidStatus(String),

    #[error("Image dimension mismatch: {0}")]
    DimensionMismatch(String),
}

pub type DomainResult<T> = Result<T, DomainError>;
