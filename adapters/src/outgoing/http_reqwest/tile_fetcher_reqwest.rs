use std::time::Duration;

use reqwest::{Client, StatusCode, header};
use tracing::{instrument, trace};

use domain::geometry::TileCoord;
use tilehawk_application::{
    error::{AppError, AppResult},
    ports::outgoing::tile_fetcher::{TileDownload, TileFetcherPort},
};

/// Downloads tiles from the remote canvas backend. One GET with a hard
/// deadline per call; no retries and no conditional requests (the ETag is
/// recorded but never re-sent).
pub struct ReqwestTileFetcher {
    client: Client,
    base_url: String,
}

impl ReqwestTileFetcher {
    pub fn new(base_url: &str, request_timeout_secs: u64) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(request_timeout_secs))
            .build()
            .map_err(|e| AppError::ConfigError {
                message: format!("Failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn tile_url(&self, coord: TileCoord) -> String {
        format!("{}/{}/{}.png", self.base_url, coord.x, coord.y)
    }
}

#[async_trait::async_trait]
impl TileFetcherPort for ReqwestTileFetcher {
    #[instrument(skip(self))]
    async fn fetch_tile(&self, coord: TileCoord) -> AppResult<TileDownload> {
        let url = self.tile_url(coord);
        let response =
            self.client
                .get(&url)
                .send()
                .await
                .map_err(|e| AppError::TileUnavailable {
                    message: format!("request failed: {e}"),
                })?;

        if response.status() != StatusCode::OK {
            return Err(AppError::TileUnavailable {
                message: format!("HTTP {}", response.status().as_u16()),
            });
        }

        let etag = response
            .headers()
            .get(header::ETAG)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();

        let body = response
            .bytes()
            .await
            .map_err(|e| AppError::TileUnavailable {
                message: format!("body read failed: {e}"),
            })?
            .to_vec();

        trace!(%coord, bytes = body.len(), "tile downloaded");
        Ok(TileDownload { body, etag })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn url_layout_matches_remote_scheme() {
        let fetcher =
            ReqwestTileFetcher::new("https://backend.wplace.live/files/s0/tiles/", 5).unwrap();
        let coord = TileCoord::new(3, 7).unwrap();
        assert_eq!(
            fetcher.tile_url(coord),
            "https://backend.wplace.live/files/s0/tiles/3/7.png"
        );
    }
}
