use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
};

use tilehawk_adapters::outgoing::{
    fs::{
        metadata_store_fs::FsMetadataStoreAdapter, project_source_fs::FsProjectSourceAdapter,
        snapshot_store_fs::FsSnapshotStoreAdapter, tile_cache_fs::FsTileCacheAdapter,
    },
    http_reqwest::tile_fetcher_reqwest::ReqwestTileFetcher,
    image_rs::palette_codec_image::PngPaletteCodec,
    sqlite_sqlx::{
        history_store_sqlite::SqliteHistoryStoreAdapter,
        project_store_sqlite::SqliteProjectStoreAdapter, run_migrations,
        tile_store_sqlite::SqliteTileStoreAdapter,
    },
};
use tilehawk_application::error::AppError;
use tilehawk_application::infrastructure_config::Config;
use tilehawk_application::ports::outgoing::{
    history_store::DynHistoryStorePort, metadata_store::DynMetadataStorePort,
    palette_codec::DynPaletteCodecPort, project_source::DynProjectSourcePort,
    project_store::DynProjectStorePort, snapshot_store::DynSnapshotStorePort,
    tile_cache::DynTileCachePort, tile_fetcher::DynTileFetcherPort, tile_store::DynTileStorePort,
};
use tilehawk_application::{
    diff::service::DiffEngine, ingest::service::TilePoller, projects::service::ProjectSyncService,
    rebuild::service::RebuildService, scheduler::queues::QueueSystem, stitch::service::Stitcher,
    watch::service::WatchService,
};

pub struct AppState {
    pub config: Arc<Config>,
    pub watch_service: WatchService,
    pub rebuild_service: RebuildService,
}

impl AppState {
    pub async fn new(config: Config) -> Result<Self, AppError> {
        let config = Arc::new(config);

        let db_pool = Self::create_database_pool(&config).await?;
        run_migrations(&db_pool).await?;

        let codec: DynPaletteCodecPort = Arc::new(PngPaletteCodec::new());
        let tile_store: DynTileStorePort = Arc::new(SqliteTileStoreAdapter::new(
            db_pool.clone(),
            config.db.query_timeout_secs,
        ));
        let project_store: DynProjectStorePort = Arc::new(SqliteProjectStoreAdapter::new(
            db_pool.clone(),
            config.db.query_timeout_secs,
        ));
        let history_store: DynHistoryStorePort = Arc::new(SqliteHistoryStoreAdapter::new(
            db_pool.clone(),
            config.db.query_timeout_secs,
        ));

        let tile_cache: DynTileCachePort = Arc::new(FsTileCacheAdapter::new(
            &config.directories.tiles_dir,
            Arc::clone(&codec),
        ));
        let snapshots: DynSnapshotStorePort = Arc::new(FsSnapshotStoreAdapter::new(
            &config.directories.snapshots_dir,
            Arc::clone(&codec),
        ));
        let metadata: DynMetadataStorePort =
            Arc::new(FsMetadataStoreAdapter::new(&config.directories.metadata_dir));
        let source: DynProjectSourcePort = Arc::new(FsProjectSourceAdapter::new(
            &config.directories.projects_dir,
            &config.directories.rejected_dir,
            Arc::clone(&codec),
        ));
        let fetcher: DynTileFetcherPort = Arc::new(ReqwestTileFetcher::new(
            &config.remote.tile_base_url,
            config.remote.request_timeout_secs,
        )?);

        let scheduler = QueueSystem::new(Arc::clone(&tile_store), config.scheduler.min_hottest_size);
        let poller = TilePoller::new(fetcher, Arc::clone(&codec), Arc::clone(&tile_cache));
        let diff = DiffEngine::new(
            Arc::clone(&source),
            Stitcher::new(Arc::clone(&tile_cache)),
            Arc::clone(&snapshots),
            metadata,
            Arc::clone(&project_store),
            Arc::clone(&history_store),
        );
        let sync = ProjectSyncService::new(
            Arc::clone(&source),
            Arc::clone(&project_store),
            Arc::clone(&tile_store),
        );
        let watch_service = WatchService::new(
            scheduler,
            poller,
            diff,
            sync,
            Arc::clone(&tile_store),
            Arc::clone(&project_store),
        );
        let rebuild_service = RebuildService::new(
            source,
            tile_cache,
            snapshots,
            tile_store,
            project_store,
            history_store,
        );

        Ok(Self {
            config,
            watch_service,
            rebuild_service,
        })
    }

    async fn create_database_pool(config: &Config) -> Result<SqlitePool, AppError> {
        // SQLite will create the file, but not its directory.
        if let Some(path) = config.db.database_url.strip_prefix("sqlite://")
            && path != ":memory:"
            && let Some(parent) = Path::new(path).parent()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let options = SqliteConnectOptions::from_str(&config.db.database_url)
            .map_err(|e| AppError::ConfigError {
                message: format!("Invalid database URL: {e}"),
            })?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(config.db.query_timeout_secs))
            .foreign_keys(true);

        SqlitePoolOptions::new()
            .max_connections(config.db.pool_size)
            .connect_with(options)
            .await
            .map_err(|e| AppError::DatabaseError {
                message: format!("Failed to connect to database: {e}"),
            })
    }
}
