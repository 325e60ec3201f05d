//! Shared in-memory port fakes for service tests.

#![allow(clippy::unwrap_used, clippy::panic)]

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use domain::geometry::TileCoord;
use domain::history::HistoryChange;
use domain::image::IndexedImage;
use domain::project::{ProjectMetadata, ProjectRecord, ProjectState};
use domain::tile::{BURNING_HEAT, TileRecord};

use crate::error::{AppError, AppResult};
use crate::ports::outgoing::history_store::HistoryStorePort;
use crate::ports::outgoing::metadata_store::MetadataStorePort;
use crate::ports::outgoing::palette_codec::PaletteCodecPort;
use crate::ports::outgoing::project_source::{ProjectFile, ProjectSourcePort};
use crate::ports::outgoing::project_store::{NewProject, ProjectStorePort};
use crate::ports::outgoing::snapshot_store::SnapshotStorePort;
use crate::ports::outgoing::tile_cache::TileCachePort;
use crate::ports::outgoing::tile_fetcher::{TileDownload, TileFetcherPort};
use crate::ports::outgoing::tile_store::TileStorePort;

// -- tiles -------------------------------------------------------------------

#[derive(Default)]
pub(crate) struct FakeTileStore {
    pub(crate) tiles: Mutex<HashMap<i64, TileRecord>>,
    pub(crate) heat_writes: AtomicU64,
}

impl FakeTileStore {
    pub(crate) fn with_tiles(tiles: Vec<TileRecord>) -> Self {
        let store = Self::default();
        {
            let mut map = store.tiles.lock().unwrap();
            for tile in tiles {
                map.insert(tile.tile_id(), tile);
            }
        }
        store
    }

    pub(crate) fn heat_of(&self, coord: TileCoord) -> i64 {
        self.tiles.lock().unwrap()[&coord.tile_id()].heat
    }

    pub(crate) fn record_of(&self, coord: TileCoord) -> TileRecord {
        self.tiles.lock().unwrap()[&coord.tile_id()].clone()
    }

    pub(crate) fn set_checked(&self, coord: TileCoord, last_checked: i64, last_update: i64) {
        let mut map = self.tiles.lock().unwrap();
        let tile = map.get_mut(&coord.tile_id()).unwrap();
        tile.last_checked = last_checked;
        tile.last_update = last_update;
    }
}

#[async_trait::async_trait]
impl TileStorePort for FakeTileStore {
    async fn get_tile(&self, coord: TileCoord) -> AppResult<Option<TileRecord>> {
        Ok(self.tiles.lock().unwrap().get(&coord.tile_id()).cloned())
    }

    async fn insert_burning(&self, coords: &[TileCoord]) -> AppResult<()> {
        let mut map = self.tiles.lock().unwrap();
        for &coord in coords {
            map.entry(coord.tile_id())
                .and_modify(|t| {
                    if t.heat == 0 {
                        t.heat = BURNING_HEAT;
                    }
                })
                .or_insert_with(|| TileRecord::burning(coord));
        }
        Ok(())
    }

    async fn upsert_tile(&self, record: &TileRecord) -> AppResult<bool> {
        let mut map = self.tiles.lock().unwrap();
        if map.contains_key(&record.tile_id()) {
            return Ok(false);
        }
        map.insert(record.tile_id(), record.clone());
        Ok(true)
    }

    async fn mark_checked(
        &self,
        coord: TileCoord,
        last_checked: i64,
        last_update: i64,
        etag: &str,
    ) -> AppResult<()> {
        let mut map = self.tiles.lock().unwrap();
        if let Some(tile) = map.get_mut(&coord.tile_id()) {
            tile.last_checked = last_checked;
            tile.last_update = last_update;
            tile.etag = etag.to_string();
        }
        Ok(())
    }

    async fn next_burning(&self) -> AppResult<Option<TileRecord>> {
        let map = self.tiles.lock().unwrap();
        Ok(map
            .values()
            .filter(|t| t.heat == BURNING_HEAT && t.last_update == 0)
            .min_by_key(|t| t.tile_id())
            .cloned())
    }

    async fn coolest_in_heat(&self, heat: i64) -> AppResult<Option<TileRecord>> {
        let map = self.tiles.lock().unwrap();
        Ok(map
            .values()
            .filter(|t| t.heat == heat)
            .min_by_key(|t| (t.last_checked, t.tile_id()))
            .cloned())
    }

    async fn tiles_in_heat(&self, heat: i64) -> AppResult<Vec<TileRecord>> {
        let map = self.tiles.lock().unwrap();
        let mut tiles: Vec<_> = map.values().filter(|t| t.heat == heat).cloned().collect();
        tiles.sort_by_key(|t| (t.last_checked, t.tile_id()));
        Ok(tiles)
    }

    async fn tiles_for_redistribution(&self) -> AppResult<Vec<TileRecord>> {
        let map = self.tiles.lock().unwrap();
        let mut tiles: Vec<_> = map
            .values()
            .filter(|t| t.awaits_graduation() || t.in_temperature_queue())
            .cloned()
            .collect();
        tiles.sort_by_key(|t| (std::cmp::Reverse(t.last_update), t.tile_id()));
        Ok(tiles)
    }

    async fn num_temperature_queues(&self) -> AppResult<i64> {
        let map = self.tiles.lock().unwrap();
        Ok(map
            .values()
            .filter(|t| t.in_temperature_queue())
            .map(|t| t.heat)
            .max()
            .unwrap_or(0))
    }

    async fn apply_heat_assignments(&self, assignments: &[(i64, i64)]) -> AppResult<()> {
        let mut map = self.tiles.lock().unwrap();
        for &(id, heat) in assignments {
            if let Some(tile) = map.get_mut(&id) {
                tile.heat = heat;
                self.heat_writes.fetch_add(1, Ordering::Relaxed);
            }
        }
        Ok(())
    }

    async fn deactivate_orphan_tiles(&self) -> AppResult<u64> {
        Ok(0)
    }
}

// -- tile cache --------------------------------------------------------------

#[derive(Default)]
pub(crate) struct FakeTileCache {
    pub(crate) tiles: Mutex<HashMap<i64, IndexedImage>>,
    pub(crate) mtimes: Mutex<HashMap<i64, i64>>,
    pub(crate) broken: Mutex<HashSet<i64>>,
}

impl FakeTileCache {
    pub(crate) fn insert_solid(&self, coord: TileCoord, index: u8) {
        let image = IndexedImage::from_raw(1000, 1000, vec![index; 1_000_000]).unwrap();
        self.tiles.lock().unwrap().insert(coord.tile_id(), image);
    }

    pub(crate) fn mark_broken(&self, coord: TileCoord) {
        self.broken.lock().unwrap().insert(coord.tile_id());
    }
}

#[async_trait::async_trait]
impl TileCachePort for FakeTileCache {
    async fn load(&self, coord: TileCoord) -> AppResult<Option<IndexedImage>> {
        if self.broken.lock().unwrap().contains(&coord.tile_id()) {
            return Err(AppError::CodecError {
                message: "corrupt".to_string(),
            });
        }
        Ok(self.tiles.lock().unwrap().get(&coord.tile_id()).cloned())
    }

    async fn store(&self, coord: TileCoord, image: &IndexedImage) -> AppResult<()> {
        self.tiles.lock().unwrap().insert(coord.tile_id(), image.clone());
        Ok(())
    }

    async fn contains(&self, coord: TileCoord) -> AppResult<bool> {
        Ok(self.tiles.lock().unwrap().contains_key(&coord.tile_id()))
    }

    async fn list(&self) -> AppResult<Vec<(TileCoord, i64)>> {
        let tiles = self.tiles.lock().unwrap();
        let mtimes = self.mtimes.lock().unwrap();
        let mut listed = Vec::new();
        for id in tiles.keys() {
            let coord = TileCoord::from_tile_id(*id).unwrap();
            listed.push((coord, mtimes.get(id).copied().unwrap_or(0)));
        }
        listed.sort_by_key(|(coord, _)| coord.tile_id());
        Ok(listed)
    }
}

// -- codec -------------------------------------------------------------------

/// Treats payloads as raw index bytes for a fixed image size; anything of
/// the wrong length fails to decode.
pub(crate) struct RawCodec {
    pub(crate) width: u32,
    pub(crate) height: u32,
}

impl RawCodec {
    pub(crate) fn tile_sized() -> Self {
        Self {
            width: 1000,
            height: 1000,
        }
    }
}

impl PaletteCodecPort for RawCodec {
    fn decode_canonical(&self, bytes: &[u8]) -> AppResult<IndexedImage> {
        IndexedImage::from_raw(self.width, self.height, bytes.to_vec()).map_err(|e| {
            AppError::CodecError {
                message: e.to_string(),
            }
        })
    }

    fn encode_canonical(&self, image: &IndexedImage) -> AppResult<Vec<u8>> {
        Ok(image.as_bytes().to_vec())
    }
}

// -- fetcher -----------------------------------------------------------------

pub(crate) enum FetchPlan {
    Body { bytes: Vec<u8>, etag: String },
    Unavailable { message: String },
}

#[derive(Default)]
pub(crate) struct FakeFetcher {
    pub(crate) plans: Mutex<HashMap<i64, FetchPlan>>,
}

impl FakeFetcher {
    pub(crate) fn respond(&self, coord: TileCoord, bytes: Vec<u8>, etag: &str) {
        self.plans.lock().unwrap().insert(
            coord.tile_id(),
            FetchPlan::Body {
                bytes,
                etag: etag.to_string(),
            },
        );
    }

    pub(crate) fn unavailable(&self, coord: TileCoord, message: &str) {
        self.plans.lock().unwrap().insert(
            coord.tile_id(),
            FetchPlan::Unavailable {
                message: message.to_string(),
            },
        );
    }
}

#[async_trait::async_trait]
impl TileFetcherPort for FakeFetcher {
    async fn fetch_tile(&self, coord: TileCoord) -> AppResult<TileDownload> {
        match self.plans.lock().unwrap().get(&coord.tile_id()) {
            Some(FetchPlan::Body { bytes, etag }) => Ok(TileDownload {
                body: bytes.clone(),
                etag: etag.clone(),
            }),
            Some(FetchPlan::Unavailable { message }) => Err(AppError::TileUnavailable {
                message: message.clone(),
            }),
            None => Err(AppError::TileUnavailable {
                message: "no response planned".to_string(),
            }),
        }
    }
}

// -- snapshots / metadata / history ------------------------------------------

#[derive(Default)]
pub(crate) struct FakeSnapshots {
    pub(crate) images: Mutex<HashMap<(i64, String), IndexedImage>>,
}

#[async_trait::async_trait]
impl SnapshotStorePort for FakeSnapshots {
    async fn load(&self, owner_id: i64, name: &str) -> AppResult<Option<IndexedImage>> {
        Ok(self
            .images
            .lock()
            .unwrap()
            .get(&(owner_id, name.to_string()))
            .cloned())
    }

    async fn store(&self, owner_id: i64, name: &str, image: &IndexedImage) -> AppResult<()> {
        self.images
            .lock()
            .unwrap()
            .insert((owner_id, name.to_string()), image.clone());
        Ok(())
    }

    async fn remove(&self, owner_id: i64, name: &str) -> AppResult<()> {
        self.images.lock().unwrap().remove(&(owner_id, name.to_string()));
        Ok(())
    }

    async fn modified_at(&self, _owner_id: i64, _name: &str) -> AppResult<Option<i64>> {
        Ok(None)
    }
}

#[derive(Default)]
pub(crate) struct FakeMetadata {
    pub(crate) records: Mutex<HashMap<(i64, String), ProjectMetadata>>,
}

impl FakeMetadata {
    pub(crate) fn get(&self, owner_id: i64, name: &str) -> Option<ProjectMetadata> {
        self.records
            .lock()
            .unwrap()
            .get(&(owner_id, name.to_string()))
            .cloned()
    }
}

#[async_trait::async_trait]
impl MetadataStorePort for FakeMetadata {
    async fn load(&self, owner_id: i64, name: &str) -> AppResult<Option<ProjectMetadata>> {
        Ok(self.get(owner_id, name))
    }

    async fn store(
        &self,
        owner_id: i64,
        name: &str,
        metadata: &ProjectMetadata,
    ) -> AppResult<()> {
        self.records
            .lock()
            .unwrap()
            .insert((owner_id, name.to_string()), metadata.clone());
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct FakeHistory {
    pub(crate) rows: Mutex<Vec<(i64, HistoryChange)>>,
}

impl FakeHistory {
    pub(crate) fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl HistoryStorePort for FakeHistory {
    async fn append(&self, project_id: i64, change: &HistoryChange) -> AppResult<()> {
        self.rows.lock().unwrap().push((project_id, change.clone()));
        Ok(())
    }

    async fn latest(&self, project_id: i64) -> AppResult<Option<HistoryChange>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(id, _)| *id == project_id)
            .map(|(_, change)| change.clone()))
    }

    async fn history_for(&self, project_id: i64) -> AppResult<Vec<HistoryChange>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| *id == project_id)
            .map(|(_, change)| change.clone())
            .collect())
    }
}

// -- project store -----------------------------------------------------------

#[derive(Default)]
pub(crate) struct FakeProjects {
    pub(crate) rows: Mutex<HashMap<i64, ProjectRecord>>,
    pub(crate) links: Mutex<HashMap<i64, Vec<i64>>>,
    /// Remaining injected `DatabaseBusy` failures for `update_aggregates`.
    pub(crate) busy_update_failures: AtomicU64,
    /// Remaining injected fatal failures for `update_aggregates`.
    pub(crate) fatal_update_failures: AtomicU64,
    next_id: AtomicU64,
}

#[async_trait::async_trait]
impl ProjectStorePort for FakeProjects {
    async fn upsert_project(&self, project: &NewProject) -> AppResult<i64> {
        let mut rows = self.rows.lock().unwrap();
        let existing = rows
            .values()
            .find(|r| r.owner_id == project.owner_id && r.name == project.name)
            .map(|r| r.id);
        let id = match existing {
            Some(id) => id,
            None => self.next_id.fetch_add(1, Ordering::Relaxed) as i64 + 1,
        };
        let first_seen = rows.get(&id).map_or(project.first_seen, |r| r.first_seen);
        rows.insert(
            id,
            ProjectRecord {
                id,
                owner_id: project.owner_id,
                name: project.name.clone(),
                state: ProjectState::Active,
                x: project.x,
                y: project.y,
                width: project.width,
                height: project.height,
                first_seen,
                last_check: first_seen,
                max_completion_pixels: 0,
                max_completion_percent: 0.0,
                max_completion_time: 0,
                total_progress: 0,
                total_regress: 0,
                largest_regress_pixels: 0,
                has_missing_tiles: false,
            },
        );
        Ok(id)
    }

    async fn find_by_source(&self, owner_id: i64, name: &str) -> AppResult<Option<ProjectRecord>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .values()
            .find(|r| r.owner_id == owner_id && r.name == name)
            .cloned())
    }

    async fn get_project(&self, id: i64) -> AppResult<Option<ProjectRecord>> {
        Ok(self.rows.lock().unwrap().get(&id).cloned())
    }

    async fn active_projects(&self) -> AppResult<Vec<ProjectRecord>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.state == ProjectState::Active)
            .cloned()
            .collect())
    }

    async fn mark_inactive(&self, id: i64) -> AppResult<()> {
        if let Some(row) = self.rows.lock().unwrap().get_mut(&id) {
            row.state = ProjectState::Inactive;
        }
        Ok(())
    }

    async fn replace_tile_links(&self, id: i64, tiles: &[TileCoord]) -> AppResult<()> {
        self.links
            .lock()
            .unwrap()
            .insert(id, tiles.iter().map(TileCoord::tile_id).collect());
        Ok(())
    }

    async fn projects_overlapping(&self, coord: TileCoord) -> AppResult<Vec<ProjectRecord>> {
        let links = self.links.lock().unwrap();
        let rows = self.rows.lock().unwrap();
        let mut overlapping: Vec<ProjectRecord> = rows
            .values()
            .filter(|r| r.state == ProjectState::Active)
            .filter(|r| {
                links
                    .get(&r.id)
                    .is_some_and(|tiles| tiles.contains(&coord.tile_id()))
            })
            .cloned()
            .collect();
        overlapping.sort_by_key(|r| r.id);
        Ok(overlapping)
    }

    async fn update_aggregates(&self, project: &ProjectRecord) -> AppResult<()> {
        if self.busy_update_failures.load(Ordering::Relaxed) > 0 {
            self.busy_update_failures.fetch_sub(1, Ordering::Relaxed);
            return Err(AppError::DatabaseBusy {
                message: "injected contention".to_string(),
            });
        }
        if self.fatal_update_failures.load(Ordering::Relaxed) > 0 {
            self.fatal_update_failures.fetch_sub(1, Ordering::Relaxed);
            return Err(AppError::DatabaseError {
                message: "injected failure".to_string(),
            });
        }
        let mut rows = self.rows.lock().unwrap();
        if let Some(row) = rows.get_mut(&project.id) {
            *row = project.clone();
        } else {
            rows.insert(project.id, project.clone());
        }
        Ok(())
    }
}

// -- project source ----------------------------------------------------------

#[derive(Default)]
pub(crate) struct FakeSource {
    pub(crate) files: Mutex<Vec<ProjectFile>>,
    pub(crate) targets: Mutex<HashMap<(i64, String), IndexedImage>>,
    pub(crate) rejected: Mutex<Vec<PathBuf>>,
}

impl FakeSource {
    pub(crate) fn set_target(&self, owner_id: i64, name: &str, image: IndexedImage) {
        self.targets
            .lock()
            .unwrap()
            .insert((owner_id, name.to_string()), image);
    }
}

#[async_trait::async_trait]
impl ProjectSourcePort for FakeSource {
    async fn scan(&self) -> AppResult<Vec<ProjectFile>> {
        Ok(self.files.lock().unwrap().clone())
    }

    async fn open_target(&self, owner_id: i64, name: &str) -> AppResult<IndexedImage> {
        self.targets
            .lock()
            .unwrap()
            .get(&(owner_id, name.to_string()))
            .cloned()
            .ok_or_else(|| AppError::CodecError {
                message: format!("no target for {owner_id}/{name}"),
            })
    }

    async fn reject(&self, path: &Path) -> AppResult<()> {
        self.rejected.lock().unwrap().push(path.to_path_buf());
        let (mut files, mut targets) = (self.files.lock().unwrap(), self.targets.lock().unwrap());
        if let Some(position) = files.iter().position(|f| f.path == path) {
            let file = files.remove(position);
            targets.remove(&(file.owner_id, file.name));
        }
        Ok(())
    }
}
