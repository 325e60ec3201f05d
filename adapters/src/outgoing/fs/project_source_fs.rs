use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, instrument, warn};

use domain::geometry::Point;
use domain::image::IndexedImage;
use tilehawk_application::{
    error::{AppError, AppResult},
    ports::outgoing::{
        palette_codec::DynPaletteCodecPort,
        project_source::{ProjectFile, ProjectSourcePort},
    },
};

use super::unix_mtime;

/// Trailing `{tx}_{ty}_{px}_{py}.png` placement coordinates; `-`, `_`,
/// and space all work as separators.
#[allow(clippy::unwrap_used)] // the pattern is a literal
static COORDS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)[-_ ](\d+)[-_ ](\d+)[-_ ](\d+)[-_ ](\d+)\.png$").unwrap());

/// Scans the project directory for target images. Flat files belong to
/// owner 0; numeric subdirectories hold one owner's projects each.
pub struct FsProjectSourceAdapter {
    projects_dir: PathBuf,
    rejected_dir: PathBuf,
    codec: DynPaletteCodecPort,
}

impl FsProjectSourceAdapter {
    #[must_use]
    pub fn new(projects_dir: &Path, rejected_dir: &Path, codec: DynPaletteCodecPort) -> Self {
        Self {
            projects_dir: projects_dir.to_path_buf(),
            rejected_dir: rejected_dir.to_path_buf(),
            codec,
        }
    }

    fn target_path(&self, owner_id: i64, name: &str) -> PathBuf {
        if owner_id == 0 {
            self.projects_dir.join(format!("{name}.png"))
        } else {
            self.projects_dir
                .join(owner_id.to_string())
                .join(format!("{name}.png"))
        }
    }

    fn parse_candidate(owner_id: i64, path: &Path, mtime: i64) -> Option<ProjectFile> {
        let file_name = path.file_name()?.to_str()?;
        let captures = COORDS_RE.captures(file_name)?;
        let mut parts = [0i64; 4];
        for (slot, capture) in parts.iter_mut().zip(captures.iter().skip(1)) {
            *slot = capture?.as_str().parse().ok()?;
        }
        let origin = match Point::from_parts(parts[0], parts[1], parts[2], parts[3]) {
            Ok(origin) => origin,
            Err(error) => {
                debug!(file = file_name, %error, "ignoring file with out-of-range coordinates");
                return None;
            }
        };
        Some(ProjectFile {
            owner_id,
            name: path.file_stem()?.to_str()?.to_string(),
            path: path.to_path_buf(),
            mtime,
            origin,
        })
    }

    async fn scan_dir(&self, owner_id: i64, dir: &Path, files: &mut Vec<ProjectFile>) -> AppResult<()> {
        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }
            if let Some(file) = Self::parse_candidate(owner_id, &path, unix_mtime(&metadata)) {
                files.push(file);
            }
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl ProjectSourcePort for FsProjectSourceAdapter {
    #[instrument(skip(self))]
    async fn scan(&self) -> AppResult<Vec<ProjectFile>> {
        tokio::fs::create_dir_all(&self.projects_dir).await?;

        let mut files = Vec::new();
        let mut owner_dirs = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.projects_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let metadata = entry.metadata().await?;
            if metadata.is_file() {
                if let Some(file) = Self::parse_candidate(0, &path, unix_mtime(&metadata)) {
                    files.push(file);
                }
            } else if metadata.is_dir() {
                let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                    continue;
                };
                if let Ok(owner_id) = name.parse::<i64>() {
                    owner_dirs.push((owner_id, path));
                }
            }
        }
        for (owner_id, dir) in owner_dirs {
            self.scan_dir(owner_id, &dir, &mut files).await?;
        }

        files.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(files)
    }

    #[instrument(skip(self))]
    async fn open_target(&self, owner_id: i64, name: &str) -> AppResult<IndexedImage> {
        let path = self.target_path(owner_id, name);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == ErrorKind::NotFound => {
                return Err(AppError::ProjectSourceError {
                    message: format!("target {} does not exist", path.display()),
                });
            }
            Err(error) => return Err(error.into()),
        };
        self.codec.decode_canonical(&bytes)
    }

    #[instrument(skip(self))]
    async fn reject(&self, path: &Path) -> AppResult<()> {
        let Some(file_name) = path.file_name() else {
            return Err(AppError::ProjectSourceError {
                message: format!("cannot reject pathless file {}", path.display()),
            });
        };
        tokio::fs::create_dir_all(&self.rejected_dir).await?;
        let target = self.rejected_dir.join(file_name);
        if let Err(error) = tokio::fs::rename(path, &target).await {
            // Rename can fail across filesystems; flag the file in place
            // so it stops matching the project pattern.
            warn!(%error, "move to rejected dir failed, renaming in place");
            tokio::fs::rename(path, path.with_extension("invalid.png")).await?;
        }
        Ok(())
    }
}
