use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub directories: DirectoryConfig,
    pub remote: RemoteConfig,
    pub db: DbConfig,
    pub scheduler: SchedulerConfig,
    pub watch: WatchConfig,
    pub logging: LoggingConfig,
    pub environment: EnvironmentConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryConfig {
    /// Where users drop project target images.
    pub projects_dir: PathBuf,
    /// Canonical tile cache, owned by ingest.
    pub tiles_dir: PathBuf,
    /// Per-project snapshots, owned by the diff engine.
    pub snapshots_dir: PathBuf,
    /// Per-project metadata records.
    pub metadata_dir: PathBuf,
    /// Invalid project files are moved here instead of deleted.
    pub rejected_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Base URL of the tile source; `/{tx}/{ty}.png` is appended.
    pub tile_base_url: String,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbConfig {
    pub database_url: String,
    pub pool_size: u32,
    #[serde(default = "default_query_timeout")]
    pub query_timeout_secs: u64,
}

fn default_query_timeout() -> u64 {
    5
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Lower bound on the size of the hottest temperature queue.
    pub min_hottest_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Base pause between full poll cycles, jittered upward so the remote
    /// never sees us on a fixed beat.
    pub cycle_seconds: u64,
    pub jitter_min_percent: u8,
    pub jitter_max_percent: u8,
    /// Tiles polled per cycle before sleeping.
    pub polls_per_cycle: u32,
    /// Pause when the scheduler has nothing to offer.
    pub idle_sleep_secs: u64,
    /// Pause after a store error before the loop resumes.
    pub error_sleep_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
    pub include_location: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LogFormat {
    #[serde(rename = "json")]
    Json,
    #[serde(rename = "pretty")]
    Pretty,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    pub env: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            directories: DirectoryConfig {
                projects_dir: PathBuf::from("data/projects"),
                tiles_dir: PathBuf::from("data/tiles"),
                snapshots_dir: PathBuf::from("data/snapshots"),
                metadata_dir: PathBuf::from("data/metadata"),
                rejected_dir: PathBuf::from("data/projects/rejected"),
            },
            remote: RemoteConfig {
                tile_base_url: "https://backend.wplace.live/files/s0/tiles".to_string(),
                request_timeout_secs: 5,
            },
            db: DbConfig {
                database_url: "sqlite://data/tilehawk.db".to_string(),
                pool_size: 5,
                query_timeout_secs: 5,
            },
            scheduler: SchedulerConfig {
                min_hottest_size: 5,
            },
            watch: WatchConfig {
                cycle_seconds: 127,
                jitter_min_percent: 0,
                jitter_max_percent: 10,
                polls_per_cycle: 32,
                idle_sleep_secs: 5,
                error_sleep_secs: 30,
            },
            logging: LoggingConfig {
                level: "debug".to_string(),
                format: LogFormat::Pretty,
                include_location: false,
            },
            environment: EnvironmentConfig {
                env: "development".to_string(),
            },
        }
    }
}

impl Config {
    pub fn validate(&self) -> AppResult<()> {
        if self.remote.tile_base_url.trim().is_empty() {
            return Err(AppError::ConfigError {
                message: "tile_base_url cannot be empty".to_string(),
            });
        }

        if url::Url::parse(&self.remote.tile_base_url).is_err() {
            return Err(AppError::ConfigError {
                message: format!("tile_base_url '{}' is not a valid URL", self.remote.tile_base_url),
            });
        }

        if self.remote.request_timeout_secs == 0 {
            return Err(AppError::ConfigError {
                message: "request_timeout_secs must be greater than 0".to_string(),
            });
        }

        if self.db.database_url.is_empty() {
            return Err(AppError::ConfigError {
                message: "database_url cannot be empty".to_string(),
            });
        }

        if self.db.pool_size == 0 {
            return Err(AppError::ConfigError {
                message: "db pool_size must be greater than 0".to_string(),
            });
        }

        if self.scheduler.min_hottest_size == 0 {
            return Err(AppError::ConfigError {
                message: "min_hottest_size must be greater than 0".to_string(),
            });
        }

        if self.watch.cycle_seconds == 0 {
            return Err(AppError::ConfigError {
                message: "cycle_seconds must be greater than 0".to_string(),
            });
        }

        if self.watch.polls_per_cycle == 0 {
            return Err(AppError::ConfigError {
                message: "polls_per_cycle must be greater than 0".to_string(),
            });
        }

        if self.watch.jitter_min_percent > self.watch.jitter_max_percent {
            return Err(AppError::ConfigError {
                message: "jitter_min_percent must be <= jitter_max_percent".to_string(),
            });
        }

        if self.watch.jitter_max_percent > 100 {
            return Err(AppError::ConfigError {
                message: "jitter_max_percent must be <= 100".to_string(),
            });
        }

        Ok(())
    }

    /// The inter-cycle pause with random upward jitter applied.
    #[must_use]
    pub fn cycle_sleep_with_jitter(&self) -> u64 {
        use rand::Rng;

        let min_percent = f64::from(self.watch.jitter_min_percent) / 100.0;
        let max_percent = f64::from(self.watch.jitter_max_percent) / 100.0;

        let mut rng = rand::rng();
        let jitter_factor = rng.random_range((1.0 + min_percent)..=(1.0 + max_percent));

        #[allow(clippy::cast_precision_loss)]
        let result = (self.watch.cycle_seconds as f64 * jitter_factor).round();
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let result_u64 = result as u64;
        result_u64
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn default_config_validates() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn rejects_bad_base_url() {
        let mut config = Config::default();
        config.remote.tile_base_url = "not a url".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_inverted_jitter() {
        let mut config = Config::default();
        config.watch.jitter_min_percent = 50;
        config.watch.jitter_max_percent = 10;
        assert!(config.validate().is_err());
    }

    #[test]
    fn jittered_sleep_stays_in_band() {
        let config = Config::default();
        for _ in 0..32 {
            let sleep = config.cycle_sleep_with_jitter();
            assert!(sleep >= config.watch.cycle_seconds);
            assert!(sleep <= config.watch.cycle_seconds * 2);
        }
    }
}
