pub mod tile_fetcher_reqwest;
