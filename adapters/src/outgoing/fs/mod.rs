pub mod metadata_store_fs;
pub mod project_source_fs;
pub mod snapshot_store_fs;
pub mod tile_cache_fs;

use std::io::Write;
use std::path::Path;
use std::time::UNIX_EPOCH;

use tilehawk_application::error::{AppError, AppResult};

/// Writes a file by staging into a temp file in the same directory and
/// renaming over the target, so readers never observe a half-written
/// image or record.
pub(crate) async fn write_atomic(path: &Path, bytes: &[u8]) -> AppResult<()> {
    let dir = path
        .parent()
        .ok_or_else(|| AppError::IoError(std::io::Error::other("path has no parent")))?;
    tokio::fs::create_dir_all(dir).await?;

    let dir = dir.to_path_buf();
    let target = path.to_path_buf();
    let bytes = bytes.to_vec();
    tokio::task::spawn_blocking(move || -> std::io::Result<()> {
        let mut staged = tempfile::NamedTempFile::new_in(&dir)?;
        staged.write_all(&bytes)?;
        staged.persist(&target).map_err(|e| e.error)?;
        Ok(())
    })
    .await
    .map_err(|e| AppError::IoError(std::io::Error::other(e)))??;
    Ok(())
}

/// File mtime in unix seconds, 0 when the platform cannot say.
pub(crate) fn unix_mtime(metadata: &std::fs::Metadata) -> i64 {
    metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map_or(0, |d| d.as_secs() as i64)
}
