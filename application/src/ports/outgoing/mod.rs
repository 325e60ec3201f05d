pub mod history_store;
pub mod metadata_store;
pub mod palette_codec;
pub mod project_source;
pub mod project_store;
pub mod snapshot_store;
pub mod tile_cache;
pub mod tile_fetcher;
pub mod tile_store;
